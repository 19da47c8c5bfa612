//! Document loading and indexing.
//!
//! The document is kept as a raw JSON tree so every keyword location in an
//! error record is a plain JSON pointer into what the author wrote. Loading
//! walks `paths` once, resolves local `$ref`s for path items, operations,
//! parameters, request bodies, and responses, and freezes two indexes: the
//! ordered path-template list and the `operationId` map. Structural
//! problems (duplicate capture names, duplicate operation ids, unresolvable
//! references) are fatal here; nothing later mutates the document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::types::{
    OperationMeta, ParameterLocation, ParameterMeta, ParameterStyle, PathTemplate,
    RequestBodyMeta, ResponseKey, ResponseMeta,
};
use crate::location::{escape_token, push_token};

/// HTTP method keywords recognized on a path item.
const METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// Fatal document-construction errors.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to read OpenAPI document {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse OpenAPI document {uri}: {message}")]
    Parse { uri: String, message: String },
    #[error("OpenAPI document {uri} has no `paths` object")]
    MissingPaths { uri: String },
    #[error("duplicate capture name `{name}` in path template `{template}`")]
    DuplicateCaptureName { template: String, name: String },
    #[error("duplicate operationId `{operation_id}` at {first} and {second}")]
    DuplicateOperationId {
        operation_id: String,
        first: String,
        second: String,
    },
    #[error("cannot resolve reference `{reference}` at {pointer}")]
    UnresolvableRef { reference: String, pointer: String },
}

/// A loaded, indexed, immutable OpenAPI document.
#[derive(Debug)]
pub struct Document {
    uri: String,
    root: Value,
    templates: Vec<PathTemplate>,
    /// `operationId` -> (template index, operation index)
    operation_index: HashMap<String, (usize, usize)>,
}

impl Document {
    /// Load from a file, detecting YAML vs JSON by extension. The file path
    /// becomes the document URI.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SpecError> {
        let path = path.as_ref();
        let uri = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| SpecError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if is_yaml {
            Self::from_yaml(&content, uri)
        } else {
            Self::from_json(&content, uri)
        }
    }

    pub fn from_yaml(content: &str, uri: impl Into<String>) -> Result<Self, SpecError> {
        let uri = uri.into();
        let root: Value = serde_yaml::from_str(content).map_err(|e| SpecError::Parse {
            uri: uri.clone(),
            message: e.to_string(),
        })?;
        Self::from_value(root, uri)
    }

    pub fn from_json(content: &str, uri: impl Into<String>) -> Result<Self, SpecError> {
        let uri = uri.into();
        let root: Value = serde_json::from_str(content).map_err(|e| SpecError::Parse {
            uri: uri.clone(),
            message: e.to_string(),
        })?;
        Self::from_value(root, uri)
    }

    /// Index an already-parsed document. `uri` may be relative; it is
    /// resolved against the request `Host` when absolute keyword locations
    /// are produced.
    pub fn from_value(root: Value, uri: impl Into<String>) -> Result<Self, SpecError> {
        let uri = uri.into();
        let (templates, operation_index) = index_paths(&root, &uri)?;
        debug!(
            uri = %uri,
            templates = templates.len(),
            operations = operation_index.len(),
            "OpenAPI document indexed"
        );
        Ok(Document {
            uri,
            root,
            templates,
            operation_index,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Path templates in document order.
    pub fn templates(&self) -> &[PathTemplate] {
        &self.templates
    }

    pub fn template(&self, template: &str) -> Option<(usize, &PathTemplate)> {
        self.templates
            .iter()
            .enumerate()
            .find(|(_, t)| t.template == template)
    }

    /// Locate an operation by `operationId`.
    pub fn operation_location(&self, operation_id: &str) -> Option<(usize, usize)> {
        self.operation_index.get(operation_id).copied()
    }

    pub fn operation_at(&self, template_index: usize, operation_index: usize) -> &OperationMeta {
        &self.templates[template_index].operations[operation_index]
    }

    /// Resolve a JSON pointer inside the document.
    pub fn resolve_pointer(&self, pointer: &str) -> Option<&Value> {
        self.root.pointer(pointer)
    }
}

/// Follow a chain of local `$ref`s starting at (`node`, `pointer`),
/// returning the final node with its pointer. Only document-local
/// fragment references are supported.
fn resolve_ref<'a>(
    root: &'a Value,
    mut node: &'a Value,
    mut pointer: String,
) -> Result<(&'a Value, String), SpecError> {
    let mut seen: Vec<String> = Vec::new();
    while let Some(reference) = node.get("$ref").and_then(Value::as_str) {
        let target = reference
            .strip_prefix('#')
            .ok_or_else(|| SpecError::UnresolvableRef {
                reference: reference.to_string(),
                pointer: pointer.clone(),
            })?;
        if seen.iter().any(|p| p == target) {
            return Err(SpecError::UnresolvableRef {
                reference: format!("{reference} (circular)"),
                pointer,
            });
        }
        seen.push(target.to_string());
        node = root
            .pointer(target)
            .ok_or_else(|| SpecError::UnresolvableRef {
                reference: reference.to_string(),
                pointer: pointer.clone(),
            })?;
        pointer = target.to_string();
    }
    Ok((node, pointer))
}

fn capture_names(template: &str) -> Result<Vec<String>, SpecError> {
    let mut names = Vec::new();
    for segment in template.split('/') {
        if let Some(name) = segment
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
        {
            if names.iter().any(|n| n == name) {
                return Err(SpecError::DuplicateCaptureName {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }
            names.push(name.to_string());
        }
    }
    Ok(names)
}

fn parse_parameter(
    root: &Value,
    raw: &Value,
    pointer: String,
) -> Result<Option<ParameterMeta>, SpecError> {
    let (node, pointer) = resolve_ref(root, raw, pointer)?;
    let Some(obj) = node.as_object() else {
        return Ok(None);
    };
    let Some(name) = obj.get("name").and_then(Value::as_str) else {
        return Ok(None);
    };
    let Some(location) = obj
        .get("in")
        .and_then(Value::as_str)
        .and_then(ParameterLocation::from_keyword)
    else {
        debug!(parameter = name, "parameter has unknown `in`, skipping");
        return Ok(None);
    };

    let mut required = obj.get("required").and_then(Value::as_bool).unwrap_or(false);
    if location == ParameterLocation::Path {
        required = true;
    }
    let style = obj
        .get("style")
        .and_then(Value::as_str)
        .and_then(ParameterStyle::from_keyword)
        .unwrap_or_else(|| ParameterStyle::default_for(location));
    let explode = obj
        .get("explode")
        .and_then(Value::as_bool)
        .unwrap_or(style == ParameterStyle::Form);

    let schema_pointer = obj.get("schema").map(|_| push_token(&pointer, "schema"));
    let content_pointer = obj.get("content").map(|_| push_token(&pointer, "content"));

    Ok(Some(ParameterMeta {
        name: name.to_string(),
        location,
        required,
        style,
        explode,
        pointer,
        schema_pointer,
        content_pointer,
    }))
}

/// Merge path-level and operation-level parameters; the operation wins on a
/// `(name, in)` collision.
fn merge_parameters(path_level: &[ParameterMeta], op_level: Vec<ParameterMeta>) -> Vec<ParameterMeta> {
    let mut merged: Vec<ParameterMeta> = path_level.to_vec();
    for parameter in op_level {
        if let Some(existing) = merged
            .iter_mut()
            .find(|p| p.name == parameter.name && p.location == parameter.location)
        {
            *existing = parameter;
        } else {
            merged.push(parameter);
        }
    }
    order_parameters(merged)
}

/// Fix the validation (and therefore error) order: path parameters first in
/// declaration order, then query in declaration order, then headers in
/// canonical sorted order, then cookies.
fn order_parameters(parameters: Vec<ParameterMeta>) -> Vec<ParameterMeta> {
    let mut path = Vec::new();
    let mut query = Vec::new();
    let mut header = Vec::new();
    let mut cookie = Vec::new();
    for parameter in parameters {
        match parameter.location {
            ParameterLocation::Path => path.push(parameter),
            ParameterLocation::Query => query.push(parameter),
            ParameterLocation::Header => header.push(parameter),
            ParameterLocation::Cookie => cookie.push(parameter),
        }
    }
    header.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));
    path.into_iter()
        .chain(query)
        .chain(header)
        .chain(cookie)
        .collect()
}

fn collect_parameters(
    root: &Value,
    owner: &Value,
    owner_pointer: &str,
) -> Result<Vec<ParameterMeta>, SpecError> {
    let mut parameters = Vec::new();
    if let Some(list) = owner.get("parameters").and_then(Value::as_array) {
        for (index, raw) in list.iter().enumerate() {
            let pointer = format!("{owner_pointer}/parameters/{index}");
            if let Some(parameter) = parse_parameter(root, raw, pointer)? {
                parameters.push(parameter);
            }
        }
    }
    Ok(parameters)
}

fn parse_request_body(
    root: &Value,
    operation: &Value,
    operation_pointer: &str,
) -> Result<Option<RequestBodyMeta>, SpecError> {
    let Some(raw) = operation.get("requestBody") else {
        return Ok(None);
    };
    let pointer = push_token(operation_pointer, "requestBody");
    let (node, pointer) = resolve_ref(root, raw, pointer)?;
    let required = node
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let content_pointer = node
        .get("content")
        .and_then(Value::as_object)
        .map(|_| push_token(&pointer, "content"));
    Ok(Some(RequestBodyMeta {
        pointer,
        required,
        content_pointer,
    }))
}

fn parse_responses(
    root: &Value,
    operation: &Value,
    operation_pointer: &str,
) -> Result<Vec<ResponseMeta>, SpecError> {
    let mut responses = Vec::new();
    let Some(map) = operation.get("responses").and_then(Value::as_object) else {
        return Ok(responses);
    };
    let responses_pointer = push_token(operation_pointer, "responses");
    for (status_key, raw) in map {
        let Some(key) = ResponseKey::parse(status_key) else {
            debug!(status = %status_key, "unsupported response key, skipping");
            continue;
        };
        let pointer = push_token(&responses_pointer, status_key);
        let (node, pointer) = resolve_ref(root, raw, pointer)?;

        let mut headers = Vec::new();
        if let Some(declared) = node.get("headers").and_then(Value::as_object) {
            for (name, raw_header) in declared {
                let header_pointer = format!("{}/headers/{}", pointer, escape_token(name));
                let (header, header_pointer) = resolve_ref(root, raw_header, header_pointer)?;
                let Some(obj) = header.as_object() else {
                    continue;
                };
                headers.push(ParameterMeta {
                    name: name.clone(),
                    location: ParameterLocation::Header,
                    required: obj.get("required").and_then(Value::as_bool).unwrap_or(false),
                    style: ParameterStyle::Simple,
                    explode: false,
                    schema_pointer: obj.get("schema").map(|_| push_token(&header_pointer, "schema")),
                    content_pointer: obj
                        .get("content")
                        .map(|_| push_token(&header_pointer, "content")),
                    pointer: header_pointer,
                });
            }
        }
        headers.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));

        let content_pointer = node
            .get("content")
            .and_then(Value::as_object)
            .map(|_| push_token(&pointer, "content"));

        responses.push(ResponseMeta {
            key,
            pointer,
            headers,
            content_pointer,
        });
    }
    Ok(responses)
}

type PathIndexes = (Vec<PathTemplate>, HashMap<String, (usize, usize)>);

fn index_paths(root: &Value, uri: &str) -> Result<PathIndexes, SpecError> {
    let Some(paths) = root.get("paths").and_then(Value::as_object) else {
        return Err(SpecError::MissingPaths {
            uri: uri.to_string(),
        });
    };

    let mut templates: Vec<PathTemplate> = Vec::new();
    let mut operation_index: HashMap<String, (usize, usize)> = HashMap::new();

    for (template, raw_item) in paths {
        let pointer = format!("/paths/{}", escape_token(template));
        let (item, pointer) = resolve_ref(root, raw_item, pointer)?;
        let capture_names = capture_names(template)?;
        let path_level = collect_parameters(root, item, &pointer)?;

        let mut operations = Vec::new();
        for method in METHODS {
            let Some(raw_operation) = item.get(method) else {
                continue;
            };
            if !raw_operation.is_object() {
                continue;
            }
            let operation_pointer = format!("{pointer}/{method}");
            let (operation, operation_pointer) =
                resolve_ref(root, raw_operation, operation_pointer)?;

            let op_level = collect_parameters(root, operation, &operation_pointer)?;
            let parameters = merge_parameters(&path_level, op_level);
            let request_body = parse_request_body(root, operation, &operation_pointer)?;
            let responses = parse_responses(root, operation, &operation_pointer)?;
            let operation_id = operation
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string);

            if let Some(id) = &operation_id {
                let location = (templates.len(), operations.len());
                if let Some(&(first_template, first_op)) = operation_index.get(id) {
                    // the first occurrence may live on the path item still
                    // being assembled
                    let first = if first_template < templates.len() {
                        &templates[first_template].operations[first_op]
                    } else {
                        &operations[first_op]
                    };
                    return Err(SpecError::DuplicateOperationId {
                        operation_id: id.clone(),
                        first: first.pointer.clone(),
                        second: operation_pointer,
                    });
                }
                operation_index.insert(id.clone(), location);
            }

            operations.push(OperationMeta {
                method: method.to_string(),
                operation_id,
                pointer: operation_pointer,
                parameters,
                request_body,
                responses,
            });
        }

        templates.push(PathTemplate {
            template: template.clone(),
            capture_names,
            pointer,
            operations,
        });
    }

    Ok((templates, operation_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML_SPEC: &str = r#"openapi: 3.1.0
info:
  title: Test API
  version: "1.0.0"
components:
  parameters:
    IdParam:
      name: id
      in: path
      required: true
      schema: { type: string }
paths:
  /items/{id}:
    parameters:
      - $ref: '#/components/parameters/IdParam'
    get:
      operationId: get_item
      parameters:
        - name: verbose
          in: query
          schema: { type: boolean }
        - name: X-Tenant
          in: header
          required: true
          schema: { type: string }
      responses:
        "200":
          description: OK
"#;

    #[test]
    fn test_yaml_document_indexes_operations() {
        let document = Document::from_yaml(YAML_SPEC, "test.yaml").unwrap();
        assert_eq!(document.templates().len(), 1);
        let (index, template) = document.template("/items/{id}").unwrap();
        assert_eq!(index, 0);
        assert_eq!(template.capture_names, vec!["id"]);
        assert_eq!(document.operation_location("get_item"), Some((0, 0)));

        let operation = document.operation_at(0, 0);
        assert_eq!(operation.method, "get");
        // path-level $ref parameter resolved to its components pointer
        let id = &operation.parameters[0];
        assert_eq!(id.name, "id");
        assert_eq!(id.pointer, "/components/parameters/IdParam");
        assert!(id.required);
    }

    #[test]
    fn test_parameter_ordering_is_path_query_header() {
        let document = Document::from_yaml(YAML_SPEC, "test.yaml").unwrap();
        let order: Vec<_> = document
            .operation_at(0, 0)
            .parameters
            .iter()
            .map(|p| (p.location, p.name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (ParameterLocation::Path, "id"),
                (ParameterLocation::Query, "verbose"),
                (ParameterLocation::Header, "X-Tenant"),
            ]
        );
    }

    #[test]
    fn test_duplicate_capture_name_is_fatal() {
        let document = json!({
            "openapi": "3.1.0",
            "paths": { "/x/{id}/y/{id}": { "get": { "responses": {} } } }
        });
        let error = Document::from_value(document, "dup.json").unwrap_err();
        assert!(matches!(error, SpecError::DuplicateCaptureName { ref name, .. } if name == "id"));
    }

    #[test]
    fn test_duplicate_operation_id_is_fatal() {
        let document = json!({
            "openapi": "3.1.0",
            "paths": {
                "/a": { "get": { "operationId": "dup", "responses": {} } },
                "/b": { "get": { "operationId": "dup", "responses": {} } }
            }
        });
        let error = Document::from_value(document, "dup.json").unwrap_err();
        assert!(matches!(error, SpecError::DuplicateOperationId { ref operation_id, .. } if operation_id == "dup"));
    }

    #[test]
    fn test_missing_paths_is_fatal() {
        let error = Document::from_value(json!({ "openapi": "3.1.0" }), "empty.json").unwrap_err();
        assert!(matches!(error, SpecError::MissingPaths { .. }));
    }

    #[test]
    fn test_circular_ref_is_fatal() {
        let document = json!({
            "openapi": "3.1.0",
            "components": {
                "parameters": { "A": { "$ref": "#/components/parameters/A" } }
            },
            "paths": {
                "/x": {
                    "get": {
                        "parameters": [ { "$ref": "#/components/parameters/A" } ],
                        "responses": {}
                    }
                }
            }
        });
        let error = Document::from_value(document, "cyc.json").unwrap_err();
        assert!(matches!(error, SpecError::UnresolvableRef { .. }));
    }

    #[test]
    fn test_response_index_parses_status_and_default() {
        let document = json!({
            "openapi": "3.1.0",
            "paths": {
                "/x": {
                    "get": {
                        "responses": {
                            "200": { "description": "OK" },
                            "default": { "description": "fallback" }
                        }
                    }
                }
            }
        });
        let document = Document::from_value(document, "resp.json").unwrap();
        let operation = document.operation_at(0, 0);
        assert!(operation.response_for(200).is_some());
        // unlisted status falls back to default
        let fallback = operation.response_for(503).unwrap();
        assert_eq!(fallback.key, ResponseKey::Default);
    }
}
