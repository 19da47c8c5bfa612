//! Reverse path matching: concrete request URIs back to templated path items.
//!
//! Each template compiles to one anchored regex with a `([^/]+)` group per
//! `{name}` capture. Matching policy, in order: a caller-supplied template is
//! looked up directly; a caller-supplied operation id resolves through the
//! operation index; otherwise templates are tried in document order and the
//! first match wins. Captured values are percent-decoded before they are
//! returned, and every caller-supplied hint is cross-checked against the
//! request rather than trusted.

use std::collections::BTreeMap;

use regex::Regex;
use tracing::{debug, warn};

use crate::location::instance;
use crate::result::{ErrorKind, ValidationError};
use crate::spec::{Document, PathTemplate};

/// Caller hints for path resolution. Any subset may be supplied; everything
/// supplied is verified against the request.
#[derive(Debug, Clone, Default)]
pub struct PathHints {
    pub path_template: Option<String>,
    pub operation_id: Option<String>,
    pub path_captures: Option<BTreeMap<String, String>>,
    /// Case-insensitive; lower-cased during resolution.
    pub method: Option<String>,
}

impl PathHints {
    pub fn template(template: impl Into<String>) -> Self {
        PathHints {
            path_template: Some(template.into()),
            ..PathHints::default()
        }
    }

    pub fn operation(operation_id: impl Into<String>) -> Self {
        PathHints {
            operation_id: Some(operation_id.into()),
            ..PathHints::default()
        }
    }
}

/// A resolved `(template, captures, method, operation)` tuple. This value is
/// the memoization channel between `find_path`, `validate_request`, and
/// `validate_response`: the caller holds it for one request/response pair.
#[derive(Debug, Clone)]
pub struct PathMatch {
    pub path_template: String,
    /// Capture names mapped to percent-decoded values.
    pub path_captures: BTreeMap<String, String>,
    /// Lower-cased method keyword.
    pub method: String,
    /// Empty string when the operation declares no `operationId`.
    pub operation_id: String,
    pub(crate) template_index: usize,
    pub(crate) operation_index: usize,
    pub(crate) host: Option<String>,
}

impl PathMatch {
    /// Hints equivalent to this match, used to re-verify a memoized match
    /// against the message it is replayed with.
    pub(crate) fn as_hints(&self) -> PathHints {
        PathHints {
            path_template: Some(self.path_template.clone()),
            operation_id: (!self.operation_id.is_empty()).then(|| self.operation_id.clone()),
            path_captures: Some(self.path_captures.clone()),
            method: Some(self.method.clone()),
        }
    }
}

/// The facts of a concrete request that matter for routing.
#[derive(Debug, Clone)]
pub(crate) struct RequestFacts {
    /// Lower-cased method.
    pub method: String,
    /// Undecoded URI path.
    pub path: String,
    pub host: Option<String>,
}

pub struct Router {
    /// One compiled regex per document template, same order.
    routes: Vec<Regex>,
}

impl Router {
    pub fn new(document: &Document) -> Self {
        let routes = document
            .templates()
            .iter()
            .map(|t| path_to_regex(&t.template))
            .collect();
        Router { routes }
    }

    /// First template (document order) whose regex matches `path`.
    fn match_path<'d>(
        &self,
        document: &'d Document,
        path: &str,
    ) -> Option<(usize, &'d PathTemplate, BTreeMap<String, String>)> {
        for (index, regex) in self.routes.iter().enumerate() {
            if let Some(found) = regex.captures(path) {
                let template = &document.templates()[index];
                let captures = decode_captures(template, &found);
                return Some((index, template, captures));
            }
        }
        None
    }

    /// Resolve hints plus an optional request into a [`PathMatch`].
    pub(crate) fn resolve(
        &self,
        document: &Document,
        facts: Option<&RequestFacts>,
        hints: &PathHints,
    ) -> Result<PathMatch, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let hinted_method = hints.method.as_deref().map(str::to_ascii_lowercase);
        let method = match (hinted_method, facts.map(|f| f.method.clone())) {
            (Some(hinted), Some(actual)) if hinted != actual => {
                return Err(vec![matching_error(
                    ErrorKind::OptionsInconsistentWithRequest,
                    "/paths",
                    format!("method hint `{hinted}` does not match request method `{actual}`"),
                )]);
            }
            (Some(method), _) | (None, Some(method)) => method,
            (None, None) => {
                return Err(vec![matching_error(
                    ErrorKind::NoMatchingOperation,
                    "/paths",
                    "no HTTP method available to select an operation",
                )]);
            }
        };

        debug!(
            method = %method,
            path = facts.map(|f| f.path.as_str()).unwrap_or("<none>"),
            hinted_template = hints.path_template.as_deref().unwrap_or(""),
            hinted_operation = hints.operation_id.as_deref().unwrap_or(""),
            "path match attempt"
        );

        // Template selection: hinted template, then operation id, then scan.
        let mut selected: Option<(usize, &PathTemplate)> = None;
        if let Some(template) = &hints.path_template {
            match document.template(template) {
                Some(found) => selected = Some(found),
                None => errors.push(matching_error(
                    ErrorKind::PathTemplateUnknown,
                    "/paths",
                    format!("path template `{template}` is not in the document"),
                )),
            }
        }
        if let Some(operation_id) = &hints.operation_id {
            match document.operation_location(operation_id) {
                None => errors.push(matching_error(
                    ErrorKind::OperationIdUnknown,
                    "/paths",
                    format!("operation id `{operation_id}` is not in the document"),
                )),
                Some((template_index, operation_index)) => {
                    let template = &document.templates()[template_index];
                    let operation = document.operation_at(template_index, operation_index);
                    match selected {
                        Some((hinted_index, hinted_template)) if hinted_index != template_index => {
                            // Both hints were supplied and they disagree;
                            // surface both sides, neither wins.
                            errors.push(matching_error(
                                ErrorKind::OptionsInconsistentWithRequest,
                                &hinted_template.pointer,
                                format!(
                                    "path template `{}` does not contain operation `{operation_id}`",
                                    hinted_template.template
                                ),
                            ));
                            errors.push(matching_error(
                                ErrorKind::OptionsInconsistentWithRequest,
                                &operation.pointer,
                                format!(
                                    "operation `{operation_id}` belongs to path template `{}`",
                                    template.template
                                ),
                            ));
                        }
                        Some(_) => {}
                        None => {
                            if operation.method != method {
                                errors.push(matching_error(
                                    ErrorKind::OptionsInconsistentWithRequest,
                                    &operation.pointer,
                                    format!(
                                        "operation `{operation_id}` uses method `{}`, not `{method}`",
                                        operation.method
                                    ),
                                ));
                            } else {
                                selected = Some((template_index, template));
                            }
                        }
                    }
                }
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let (template_index, template, captures) = match selected {
            Some((template_index, template)) => {
                let captures = match facts {
                    Some(facts) => {
                        let Some(found) = self.routes[template_index].captures(&facts.path) else {
                            return Err(vec![matching_error(
                                ErrorKind::OptionsInconsistentWithRequest,
                                &template.pointer,
                                format!(
                                    "request path `{}` does not match path template `{}`",
                                    facts.path, template.template
                                ),
                            )]);
                        };
                        decode_captures(template, &found)
                    }
                    None => hints.path_captures.clone().unwrap_or_default(),
                };
                (template_index, template, captures)
            }
            None => {
                let Some(facts) = facts else {
                    return Err(vec![matching_error(
                        ErrorKind::NoPathMatch,
                        "/paths",
                        "neither a request nor a path template or operation id was supplied",
                    )]);
                };
                let Some(matched) = self.match_path(document, &facts.path) else {
                    warn!(method = %method, path = %facts.path, "no path template matched");
                    return Err(vec![matching_error(
                        ErrorKind::NoPathMatch,
                        "/paths",
                        format!("no path template matches `{}`", facts.path),
                    )]);
                };
                matched
            }
        };

        // Cross-check hinted captures against the request-derived values.
        if facts.is_some() {
            if let Some(hinted) = &hints.path_captures {
                for (name, value) in hinted {
                    match captures.get(name) {
                        Some(actual) if actual == value => {}
                        Some(actual) => errors.push(matching_error(
                            ErrorKind::PathCaptureMismatch,
                            &template.pointer,
                            format!(
                                "capture `{name}` is `{actual}` in the request path, not `{value}`"
                            ),
                        )),
                        None => errors.push(matching_error(
                            ErrorKind::PathCaptureMismatch,
                            &template.pointer,
                            format!(
                                "capture `{name}` is not defined by path template `{}`",
                                template.template
                            ),
                        )),
                    }
                }
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let Some((operation_index, operation)) = template.operation(&method) else {
            return Err(vec![matching_error(
                ErrorKind::NoMatchingOperation,
                &template.pointer,
                format!(
                    "no `{method}` operation for path template `{}`",
                    template.template
                ),
            )]);
        };

        // The operation picked by template+method must also be the hinted
        // one; a stale operation id hint is an inconsistency, not a win.
        if let Some(operation_id) = &hints.operation_id {
            if operation.operation_id.as_deref() != Some(operation_id) {
                return Err(vec![matching_error(
                    ErrorKind::OptionsInconsistentWithRequest,
                    &operation.pointer,
                    format!(
                        "`{method}` on path template `{}` is operation `{}`, not `{operation_id}`",
                        template.template,
                        operation.operation_id.as_deref().unwrap_or(""),
                    ),
                )]);
            }
        }

        debug!(
            method = %method,
            template = %template.template,
            operation_id = operation.operation_id.as_deref().unwrap_or(""),
            captures = ?captures,
            "path matched"
        );

        Ok(PathMatch {
            path_template: template.template.clone(),
            path_captures: captures,
            method,
            operation_id: operation.operation_id.clone().unwrap_or_default(),
            template_index,
            operation_index,
            host: facts.and_then(|f| f.host.clone()),
        })
    }
}

/// Matching errors are anchored at the request path in the instance tree.
fn matching_error(kind: ErrorKind, keyword: &str, message: impl Into<String>) -> ValidationError {
    ValidationError::new(kind, instance::REQUEST_PATH, keyword, message)
}

fn decode_captures(template: &PathTemplate, found: &regex::Captures<'_>) -> BTreeMap<String, String> {
    template
        .capture_names
        .iter()
        .enumerate()
        .filter_map(|(index, name)| {
            found.get(index + 1).map(|m| {
                let raw = m.as_str();
                let decoded = urlencoding::decode(raw)
                    .map(|cow| cow.into_owned())
                    .unwrap_or_else(|_| raw.to_string());
                (name.clone(), decoded)
            })
        })
        .collect()
}

/// Compile a path template to an anchored regex with one non-slash capture
/// group per `{name}` segment.
pub(crate) fn path_to_regex(template: &str) -> Regex {
    if template == "/" {
        #[allow(clippy::expect_used)]
        return Regex::new(r"^/$").expect("static regex");
    }

    let mut pattern = String::with_capacity(template.len() + 8);
    pattern.push('^');
    for segment in template.split('/') {
        if segment.is_empty() {
            continue;
        }
        pattern.push('/');
        if segment.starts_with('{') && segment.ends_with('}') {
            pattern.push_str("([^/]+)");
        } else {
            pattern.push_str(&regex::escape(segment));
        }
    }
    pattern.push('$');
    #[allow(clippy::expect_used)]
    Regex::new(&pattern).expect("template segments are escaped")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_to_regex_captures_segments() {
        let regex = path_to_regex("/users/{id}/posts/{post_id}");
        let found = regex.captures("/users/42/posts/7").unwrap();
        assert_eq!(&found[1], "42");
        assert_eq!(&found[2], "7");
        assert!(!regex.is_match("/users/42"));
        assert!(!regex.is_match("/users/42/posts/7/extra"));
    }

    #[test]
    fn test_path_to_regex_escapes_literal_segments() {
        let regex = path_to_regex("/v1.0/pets");
        assert!(regex.is_match("/v1.0/pets"));
        assert!(!regex.is_match("/v1x0/pets"));
    }

    #[test]
    fn test_capture_does_not_cross_slash() {
        let regex = path_to_regex("/files/{name}");
        assert!(!regex.is_match("/files/a/b"));
    }

    #[test]
    fn test_root_template() {
        let regex = path_to_regex("/");
        assert!(regex.is_match("/"));
        assert!(!regex.is_match("/x"));
    }
}
