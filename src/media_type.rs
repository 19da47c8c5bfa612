//! Media type parsing, matching, and payload decoding.
//!
//! Matching is case-insensitive on type and subtype; `;` parameters are
//! stripped for matching but `charset` is kept for decoding. Lookup
//! precedence is exact match, then `type/*` (including `type/*+suffix`),
//! then `*/*`. The same precedence orders a request `Content-Type` against
//! the media-type keys of a `content` map, where a `*/*` entry accepts any
//! payload.

use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use tracing::debug;

/// Decoder from raw payload bytes (plus optional charset) to a JSON value.
pub type DecodeFn = fn(&[u8], Option<&str>) -> Result<Value, String>;

/// A parsed `Content-Type` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub ty: String,
    pub subtype: String,
    pub charset: Option<String>,
}

impl MediaType {
    /// Parse a raw header value. Returns `None` when there is no `type/subtype`
    /// shape to work with.
    pub fn parse(raw: &str) -> Option<MediaType> {
        let mut parts = raw.split(';');
        let essence = parts.next()?.trim().to_ascii_lowercase();
        let (ty, subtype) = essence.split_once('/')?;
        if ty.is_empty() || subtype.is_empty() {
            return None;
        }
        let mut charset = None;
        for parameter in parts {
            if let Some((key, value)) = parameter.split_once('=') {
                if key.trim().eq_ignore_ascii_case("charset") {
                    charset = Some(value.trim().trim_matches('"').to_ascii_lowercase());
                }
            }
        }
        Some(MediaType {
            ty: ty.trim().to_string(),
            subtype: subtype.trim().to_string(),
            charset,
        })
    }

    pub fn essence(&self) -> String {
        format!("{}/{}", self.ty, self.subtype)
    }

    /// True for `application/json` and any `+json` suffix type.
    pub fn is_json(&self) -> bool {
        (self.ty == "application" && self.subtype == "json") || self.subtype.ends_with("+json")
    }

    /// Rank of `pattern` against this media type: `0` exact, `1` subtype
    /// wildcard (`type/*`, `type/*+suffix`), `2` full wildcard, `None` no
    /// match.
    pub fn match_rank(&self, pattern: &str) -> Option<u8> {
        let essence = pattern.split(';').next().unwrap_or(pattern).trim().to_ascii_lowercase();
        if essence == "*/*" {
            return Some(2);
        }
        let (pattern_ty, pattern_subtype) = essence.split_once('/')?;
        if pattern_ty != self.ty {
            return None;
        }
        if pattern_subtype == self.subtype {
            Some(0)
        } else if pattern_subtype == "*" {
            Some(1)
        } else if let Some(suffix) = pattern_subtype.strip_prefix("*+") {
            self.subtype.ends_with(&format!("+{suffix}")).then_some(1)
        } else {
            None
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.ty, self.subtype)
    }
}

/// Pick the best-matching key of a `content` map for `media_type`,
/// preferring exact matches, then subtype wildcards, then `*/*`; document
/// order breaks ties.
pub fn best_content_key<'a, I>(keys: I, media_type: &MediaType) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(u8, &'a str)> = None;
    for key in keys {
        if let Some(rank) = media_type.match_rank(key) {
            if best.map_or(true, |(r, _)| rank < r) {
                best = Some((rank, key));
            }
        }
    }
    best.map(|(_, key)| key)
}

static BUILTIN_DECODERS: Lazy<Vec<(&'static str, DecodeFn)>> = Lazy::new(|| {
    vec![
        ("application/json", decode_json as DecodeFn),
        ("application/*+json", decode_json as DecodeFn),
        ("text/*", decode_text as DecodeFn),
        ("application/x-www-form-urlencoded", decode_form as DecodeFn),
    ]
});

/// Process-configurable registry of media-type decoders. User-registered
/// entries take precedence over the built-ins at equal match rank.
#[derive(Clone)]
pub struct MediaTypeRegistry {
    entries: Vec<(String, DecodeFn)>,
}

impl Default for MediaTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaTypeRegistry {
    pub fn new() -> Self {
        MediaTypeRegistry {
            entries: BUILTIN_DECODERS
                .iter()
                .map(|(pattern, decode)| (pattern.to_string(), *decode))
                .collect(),
        }
    }

    /// Register a decoder for a media-type pattern (`type/subtype`,
    /// `type/*`, or `*/*`).
    pub fn register(&mut self, pattern: &str, decode: DecodeFn) {
        self.entries.insert(0, (pattern.to_ascii_lowercase(), decode));
    }

    fn decoder_for(&self, media_type: &MediaType) -> Option<DecodeFn> {
        let mut best: Option<(u8, usize, DecodeFn)> = None;
        for (index, (pattern, decode)) in self.entries.iter().enumerate() {
            if let Some(rank) = media_type.match_rank(pattern) {
                if best.map_or(true, |(r, i, _)| (rank, index) < (r, i)) {
                    best = Some((rank, index, *decode));
                }
            }
        }
        best.map(|(_, _, decode)| decode)
    }

    /// Decode `bytes` according to `media_type`. Types with no registered
    /// decoder decode leniently (JSON attempt, then lossy UTF-8 text) so
    /// that wildcard `content` entries can still feed the schema evaluator.
    pub fn decode(&self, media_type: &MediaType, bytes: &[u8]) -> Result<Value, String> {
        match self.decoder_for(media_type) {
            Some(decode) => decode(bytes, media_type.charset.as_deref()),
            None => {
                debug!(media_type = %media_type, "no decoder registered, decoding leniently");
                Ok(decode_lenient(bytes))
            }
        }
    }
}

fn decode_charset(bytes: &[u8], charset: Option<&str>) -> Result<String, String> {
    match charset.unwrap_or("utf-8") {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8(bytes.to_vec())
            .map_err(|e| format!("payload is not valid UTF-8: {e}")),
        "iso-8859-1" | "latin1" => Ok(bytes.iter().map(|&b| b as char).collect()),
        other => Err(format!("unsupported charset `{other}`")),
    }
}

fn decode_json(bytes: &[u8], charset: Option<&str>) -> Result<Value, String> {
    let text = decode_charset(bytes, charset)?;
    serde_json::from_str(&text).map_err(|e| format!("invalid JSON payload: {e}"))
}

fn decode_text(bytes: &[u8], charset: Option<&str>) -> Result<Value, String> {
    decode_charset(bytes, charset).map(Value::String)
}

fn decode_form(bytes: &[u8], _charset: Option<&str>) -> Result<Value, String> {
    let mut object = Map::new();
    for (key, value) in url::form_urlencoded::parse(bytes) {
        // first occurrence wins for repeated names
        object
            .entry(key.into_owned())
            .or_insert_with(|| Value::String(value.into_owned()));
    }
    Ok(Value::Object(object))
}

fn decode_lenient(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}
