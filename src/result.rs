//! Validation result model.
//!
//! A validation outcome is a tagged sum: either valid (possibly carrying
//! annotations) or invalid with one or more error records. Errors are
//! aggregated in evaluation order and serialize to a stable JSON shape with
//! `instanceLocation` / `keywordLocation` / `absoluteKeywordLocation` /
//! `error` keys. Callers must go through [`ValidationResult::is_valid`];
//! there is no truthiness shortcut.

use serde::Serialize;
use serde_json::Value;

/// Classification of an error record. The serialized form carries only the
/// locations and message; the kind is for programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // matching
    NoPathMatch,
    NoMatchingOperation,
    PathTemplateUnknown,
    OperationIdUnknown,
    PathCaptureMismatch,
    OptionsInconsistentWithRequest,
    // parameters
    MissingRequiredParameter,
    ParameterSchemaFailure,
    // body
    UnexpectedBodyForGetHead,
    MissingRequiredBody,
    NoMatchingContentType,
    DecodingFailed,
    BodySchemaFailure,
    EntityForbidden,
    NoMatchingResponse,
    // policy
    ReadOnlyInRequest,
    WriteOnlyInResponse,
    // evaluator
    InfiniteRecursion,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoPathMatch => "no-path-match",
            ErrorKind::NoMatchingOperation => "no-matching-operation",
            ErrorKind::PathTemplateUnknown => "path-template-unknown",
            ErrorKind::OperationIdUnknown => "operation-id-unknown",
            ErrorKind::PathCaptureMismatch => "path-capture-mismatch",
            ErrorKind::OptionsInconsistentWithRequest => "options-inconsistent-with-request",
            ErrorKind::MissingRequiredParameter => "missing-required-parameter",
            ErrorKind::ParameterSchemaFailure => "parameter-schema-failure",
            ErrorKind::UnexpectedBodyForGetHead => "unexpected-body-for-get-head",
            ErrorKind::MissingRequiredBody => "missing-required-body",
            ErrorKind::NoMatchingContentType => "no-matching-content-type",
            ErrorKind::DecodingFailed => "decoding-failed",
            ErrorKind::BodySchemaFailure => "body-schema-failure",
            ErrorKind::EntityForbidden => "entity-forbidden",
            ErrorKind::NoMatchingResponse => "no-matching-response",
            ErrorKind::ReadOnlyInRequest => "read-only-in-request",
            ErrorKind::WriteOnlyInResponse => "write-only-in-response",
            ErrorKind::InfiniteRecursion => "infinite-recursion",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One error record with paired locations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    #[serde(skip)]
    pub kind: ErrorKind,
    pub instance_location: String,
    pub keyword_location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_keyword_location: Option<String>,
    #[serde(rename = "error")]
    pub message: String,
}

impl ValidationError {
    pub fn new(
        kind: ErrorKind,
        instance_location: impl Into<String>,
        keyword_location: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ValidationError {
            kind,
            instance_location: instance_location.into(),
            keyword_location: keyword_location.into(),
            absolute_keyword_location: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} at {}: {}",
            self.kind, self.keyword_location, self.instance_location, self.message
        )
    }
}

/// Annotation collected during a successful evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub instance_location: String,
    pub keyword_location: String,
    pub annotation: Value,
}

/// Outcome of a validation call. Annotations survive only on the valid arm;
/// a result is invalid iff it carries at least one error record.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    Valid { annotations: Vec<Annotation> },
    Invalid { errors: Vec<ValidationError> },
}

impl ValidationResult {
    pub fn valid() -> Self {
        ValidationResult::Valid {
            annotations: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid { .. })
    }

    pub fn errors(&self) -> &[ValidationError] {
        match self {
            ValidationResult::Valid { .. } => &[],
            ValidationResult::Invalid { errors } => errors,
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        match self {
            ValidationResult::Valid { annotations } => annotations,
            ValidationResult::Invalid { .. } => &[],
        }
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        match self {
            ValidationResult::Valid { .. } => Vec::new(),
            ValidationResult::Invalid { errors } => errors,
        }
    }

    /// Serialize to the stable result shape.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for ValidationResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            ValidationResult::Valid { annotations } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("valid", &true)?;
                map.serialize_entry("errors", &[] as &[ValidationError])?;
                if !annotations.is_empty() {
                    map.serialize_entry("annotations", annotations)?;
                }
                map.end()
            }
            ValidationResult::Invalid { errors } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("valid", &false)?;
                map.serialize_entry("errors", errors)?;
                map.end()
            }
        }
    }
}

/// Ordered accumulator for error records and annotations.
#[derive(Debug, Default)]
pub struct ResultBuilder {
    errors: Vec<ValidationError>,
    annotations: Vec<Annotation>,
}

impl ResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn error(
        &mut self,
        kind: ErrorKind,
        instance_location: impl Into<String>,
        keyword_location: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.errors
            .push(ValidationError::new(kind, instance_location, keyword_location, message));
    }

    pub fn annotate(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Merge a child result, keeping its error order.
    pub fn merge(&mut self, result: ValidationResult) {
        match result {
            ValidationResult::Valid { annotations } => self.annotations.extend(annotations),
            ValidationResult::Invalid { errors } => self.errors.extend(errors),
        }
    }

    /// Merge a child result whose keyword locations are relative to
    /// `keyword_prefix` inside the document.
    pub fn merge_prefixed(&mut self, result: ValidationResult, keyword_prefix: &str) {
        match result {
            ValidationResult::Valid { annotations } => {
                for mut a in annotations {
                    a.keyword_location = format!("{}{}", keyword_prefix, a.keyword_location);
                    self.annotations.push(a);
                }
            }
            ValidationResult::Invalid { errors } => {
                for mut e in errors {
                    e.keyword_location = format!("{}{}", keyword_prefix, e.keyword_location);
                    self.errors.push(e);
                }
            }
        }
    }

    pub fn finish(self) -> ValidationResult {
        if self.errors.is_empty() {
            ValidationResult::Valid {
                annotations: self.annotations,
            }
        } else {
            ValidationResult::Invalid {
                errors: self.errors,
            }
        }
    }

    /// Finish, filling in absolute keyword locations for records that do
    /// not already carry one.
    pub fn finish_resolved(mut self, openapi_uri: &str, host: Option<&str>) -> ValidationResult {
        for error in &mut self.errors {
            if error.absolute_keyword_location.is_none() {
                error.absolute_keyword_location = Some(crate::location::absolute_location(
                    openapi_uri,
                    host,
                    &error.keyword_location,
                ));
            }
        }
        self.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_result_shape() {
        let result = ValidationResult::valid();
        assert!(result.is_valid());
        assert_eq!(result.to_json(), json!({ "valid": true, "errors": [] }));
    }

    #[test]
    fn test_invalid_result_shape() {
        let mut builder = ResultBuilder::new();
        builder.error(
            ErrorKind::NoPathMatch,
            "/request/uri/path",
            "/paths",
            "no path template matches /nope",
        );
        let result = builder.finish_resolved("https://example.com/api.yaml", None);
        assert!(!result.is_valid());
        assert_eq!(
            result.to_json(),
            json!({
                "valid": false,
                "errors": [{
                    "instanceLocation": "/request/uri/path",
                    "keywordLocation": "/paths",
                    "absoluteKeywordLocation": "https://example.com/api.yaml#/paths",
                    "error": "no path template matches /nope",
                }],
            })
        );
    }

    #[test]
    fn test_merge_prefixed_rewrites_keyword_location() {
        let mut child = ResultBuilder::new();
        child.error(ErrorKind::BodySchemaFailure, "/request/body", "/type", "boom");
        let mut parent = ResultBuilder::new();
        parent.merge_prefixed(child.finish(), "/paths/~1x/post/requestBody");
        let errors = parent.finish().into_errors();
        assert_eq!(errors[0].keyword_location, "/paths/~1x/post/requestBody/type");
    }

    #[test]
    fn test_annotations_survive_only_on_valid() {
        let mut builder = ResultBuilder::new();
        builder.annotate(Annotation {
            instance_location: "/request/body".into(),
            keyword_location: "/paths/~1x/post/requestBody/content".into(),
            annotation: json!({ "mediaType": "application/json" }),
        });
        let result = builder.finish();
        assert!(result.is_valid());
        assert_eq!(result.annotations().len(), 1);

        let mut builder = ResultBuilder::new();
        builder.annotate(Annotation {
            instance_location: "/request/body".into(),
            keyword_location: "/k".into(),
            annotation: json!(true),
        });
        builder.error(ErrorKind::DecodingFailed, "/request/body", "/k", "bad");
        assert!(builder.finish().annotations().is_empty());
    }

    #[test]
    fn test_error_kind_codes() {
        assert_eq!(ErrorKind::ReadOnlyInRequest.as_str(), "read-only-in-request");
        assert_eq!(
            ErrorKind::OptionsInconsistentWithRequest.as_str(),
            "options-inconsistent-with-request"
        );
    }
}
