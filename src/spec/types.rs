/// Where a parameter is carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub(crate) fn from_keyword(raw: &str) -> Option<Self> {
        match raw {
            "path" => Some(ParameterLocation::Path),
            "query" => Some(ParameterLocation::Query),
            "header" => Some(ParameterLocation::Header),
            "cookie" => Some(ParameterLocation::Cookie),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
        }
    }
}

impl std::fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OpenAPI serialization style for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterStyle {
    Simple,
    Form,
    Matrix,
    Label,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

impl ParameterStyle {
    pub(crate) fn from_keyword(raw: &str) -> Option<Self> {
        match raw {
            "simple" => Some(ParameterStyle::Simple),
            "form" => Some(ParameterStyle::Form),
            "matrix" => Some(ParameterStyle::Matrix),
            "label" => Some(ParameterStyle::Label),
            "spaceDelimited" => Some(ParameterStyle::SpaceDelimited),
            "pipeDelimited" => Some(ParameterStyle::PipeDelimited),
            "deepObject" => Some(ParameterStyle::DeepObject),
            _ => None,
        }
    }

    /// Default style for a location per the OpenAPI specification.
    pub fn default_for(location: ParameterLocation) -> Self {
        match location {
            ParameterLocation::Path | ParameterLocation::Header => ParameterStyle::Simple,
            ParameterLocation::Query | ParameterLocation::Cookie => ParameterStyle::Form,
        }
    }
}

/// One declared parameter (or response header), with document pointers
/// resolved past any `$ref`.
#[derive(Debug, Clone)]
pub struct ParameterMeta {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub style: ParameterStyle,
    pub explode: bool,
    /// Pointer to the parameter object itself.
    pub pointer: String,
    /// Pointer to the parameter's `schema`, when declared with one.
    pub schema_pointer: Option<String>,
    /// Pointer to the parameter's `content` map, when declared with one.
    pub content_pointer: Option<String>,
}

/// A response entry key: an exact status code or the `default` fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKey {
    Status(u16),
    Default,
}

impl ResponseKey {
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("default") {
            return Some(ResponseKey::Default);
        }
        raw.parse::<u16>().ok().map(ResponseKey::Status)
    }
}

/// One response entry of an operation.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub key: ResponseKey,
    /// Pointer to the response object, resolved past `$ref`.
    pub pointer: String,
    /// Declared response headers in canonical (case-folded, sorted) order.
    pub headers: Vec<ParameterMeta>,
    /// Pointer to the response's `content` map, when present.
    pub content_pointer: Option<String>,
}

/// The `requestBody` of an operation.
#[derive(Debug, Clone)]
pub struct RequestBodyMeta {
    pub pointer: String,
    pub required: bool,
    pub content_pointer: Option<String>,
}

/// One operation: a `(path item, method)` pair.
#[derive(Debug, Clone)]
pub struct OperationMeta {
    /// Lower-case HTTP method keyword.
    pub method: String,
    pub operation_id: Option<String>,
    /// Pointer to the operation object.
    pub pointer: String,
    /// Merged path-level and operation-level parameters, ordered for
    /// deterministic validation: path (declaration order), query
    /// (declaration order), headers (canonical sorted), cookies last.
    pub parameters: Vec<ParameterMeta>,
    pub request_body: Option<RequestBodyMeta>,
    pub responses: Vec<ResponseMeta>,
}

impl OperationMeta {
    /// Response entry for `status`, falling back to `default`.
    pub fn response_for(&self, status: u16) -> Option<&ResponseMeta> {
        self.responses
            .iter()
            .find(|r| r.key == ResponseKey::Status(status))
            .or_else(|| self.responses.iter().find(|r| r.key == ResponseKey::Default))
    }
}

/// One `paths` entry: template, capture names, and per-method operations.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    pub template: String,
    pub capture_names: Vec<String>,
    /// Pointer to the path item (`/paths/<escaped template>`).
    pub pointer: String,
    pub operations: Vec<OperationMeta>,
}

impl PathTemplate {
    /// Operation for a lower-cased method keyword, with its index.
    pub fn operation(&self, method: &str) -> Option<(usize, &OperationMeta)> {
        self.operations
            .iter()
            .enumerate()
            .find(|(_, op)| op.method == method)
    }
}
