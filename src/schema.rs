//! JSON Schema evaluation against document subschemas.
//!
//! The whole OpenAPI document is registered with the `jsonschema` crate as a
//! single resource under a synthetic `$id`; a subschema at any JSON pointer
//! is then evaluated through a one-line `$ref` wrapper, so `$ref`s inside
//! the document resolve exactly as written. Compiled validators are cached
//! per pointer behind an `RwLock` with a double-checked insert.
//!
//! `readOnly`/`writeOnly` are annotations to the embedded evaluator, so the
//! access-mode policy is a separate schema+instance walk here. That walk
//! follows `$ref` chains with an active `(schema pointer, instance pointer)`
//! set; re-entering the same pair means the chain cannot terminate and is
//! surfaced as an `infinite-recursion` error record, never a crash.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use jsonschema::{Draft, Resource, ValidationOptions, Validator as CompiledSchema};
use serde_json::{json, Value};
use tracing::debug;

use crate::location::{encode_fragment, escape_token};
use crate::result::ErrorKind;
use crate::spec::{Document, SpecError};

/// Synthetic `$id` the document is registered under.
const DOCUMENT_ID: &str = "@@document";

/// One failed keyword from the embedded evaluator, with the keyword path
/// rebased to a document-absolute pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    /// Pointer into the instance (relative to the evaluated value).
    pub instance_path: String,
    /// Pointer into the document.
    pub keyword_location: String,
    pub message: String,
}

pub struct SchemaEvaluator {
    options: ValidationOptions,
    cache: RwLock<HashMap<String, Arc<CompiledSchema>>>,
}

impl SchemaEvaluator {
    pub(crate) fn new(document: &Document) -> Result<Self, SpecError> {
        let mut root = document.root().clone();
        if let Value::Object(map) = &mut root {
            map.insert("$id".to_string(), json!(DOCUMENT_ID));
        }
        let resource = Resource::from_contents(root).map_err(|e| SpecError::Parse {
            uri: document.uri().to_string(),
            message: format!("cannot register document as a schema resource: {e}"),
        })?;
        let options = CompiledSchema::options()
            .with_draft(Draft::Draft202012)
            .with_resource(DOCUMENT_ID, resource);
        Ok(SchemaEvaluator {
            options,
            cache: RwLock::new(HashMap::new()),
        })
    }

    fn compiled_for(&self, pointer: &str) -> Result<Arc<CompiledSchema>, String> {
        {
            let cache = self
                .cache
                .read()
                .map_err(|_| "validator cache lock poisoned".to_string())?;
            if let Some(compiled) = cache.get(pointer) {
                return Ok(Arc::clone(compiled));
            }
        }

        let wrapper = json!({ "$ref": format!("{DOCUMENT_ID}#{}", encode_fragment(pointer)) });
        let compiled = self
            .options
            .build(&wrapper)
            .map_err(|e| format!("cannot compile schema at `{pointer}`: {e}"))?;
        let compiled = Arc::new(compiled);

        let mut cache = self
            .cache
            .write()
            .map_err(|_| "validator cache lock poisoned".to_string())?;
        // another thread may have compiled while we waited on the lock
        if let Some(existing) = cache.get(pointer) {
            return Ok(Arc::clone(existing));
        }
        cache.insert(pointer.to_string(), Arc::clone(&compiled));
        debug!(pointer = pointer, cache_size = cache.len(), "schema validator compiled");
        Ok(compiled)
    }

    /// Evaluate `instance` against the subschema at `pointer`. Keyword
    /// locations are rebased so they resolve inside the document; when a
    /// reported path cannot be anchored (a `$ref` was crossed mid-schema)
    /// the subschema pointer itself is used.
    pub fn evaluate(
        &self,
        document: &Document,
        pointer: &str,
        instance: &Value,
    ) -> Result<Vec<SchemaViolation>, String> {
        let compiled = self.compiled_for(pointer)?;
        Ok(compiled
            .iter_errors(instance)
            .map(|error| {
                let schema_path = error.schema_path.to_string();
                SchemaViolation {
                    instance_path: error.instance_path.to_string(),
                    keyword_location: rebase_keyword_location(document, pointer, &schema_path),
                    message: error.to_string(),
                }
            })
            .collect())
    }

    /// Number of compiled validators currently cached.
    pub fn cache_size(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }
}

/// Rebase an evaluator-reported schema path onto a document pointer,
/// preferring the first candidate that actually resolves in the document.
fn rebase_keyword_location(document: &Document, pointer: &str, schema_path: &str) -> String {
    let path = schema_path.strip_prefix("/$ref").unwrap_or(schema_path);
    if path.is_empty() {
        return pointer.to_string();
    }
    let joined = format!("{pointer}{path}");
    if document.resolve_pointer(&joined).is_some() {
        return joined;
    }
    if document.resolve_pointer(path).is_some() {
        return path.to_string();
    }
    pointer.to_string()
}

/// Outcome of resolving the schema node at a pointer past its `$ref` chain.
pub(crate) enum SchemaNode<'a> {
    Resolved { node: &'a Value, pointer: String },
    /// The `$ref` chain revisits a pointer without consuming instance;
    /// `pointer` addresses the offending `$ref` keyword.
    Cycle { pointer: String },
    Missing,
}

/// Chase the `$ref` chain starting at `pointer`.
pub(crate) fn resolve_schema<'a>(document: &'a Document, pointer: &str) -> SchemaNode<'a> {
    let mut pointer = pointer.to_string();
    let mut seen: Vec<String> = Vec::new();
    loop {
        let Some(node) = document.resolve_pointer(&pointer) else {
            return SchemaNode::Missing;
        };
        let Some(reference) = node.get("$ref").and_then(Value::as_str) else {
            return SchemaNode::Resolved { node, pointer };
        };
        let Some(target) = reference.strip_prefix('#') else {
            // external references are not resolvable here
            return SchemaNode::Resolved { node, pointer };
        };
        if seen.iter().any(|p| p == target) {
            return SchemaNode::Cycle {
                pointer: format!("{pointer}/$ref"),
            };
        }
        seen.push(target.to_string());
        pointer = target.to_string();
    }
}

/// True for the empty schema (`true` or `{}`), which accepts anything.
pub(crate) fn is_empty_schema(node: &Value) -> bool {
    match node {
        Value::Bool(accept) => *accept,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// True for the `false` schema, which rejects every instance.
pub(crate) fn is_false_schema(node: &Value) -> bool {
    matches!(node, Value::Bool(false))
}

/// Which side of the exchange a body belongs to; requests reject `readOnly`
/// values, responses reject `writeOnly` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccessMode {
    Request,
    Response,
}

/// A policy-walk finding: an access-mode violation or a detected cycle.
#[derive(Debug, Clone)]
pub(crate) struct PolicyViolation {
    pub kind: ErrorKind,
    /// Relative to the evaluated body root.
    pub instance_path: String,
    pub keyword_location: String,
    pub message: String,
}

/// Walk schema and instance together, flagging `readOnly` values in
/// requests and `writeOnly` values in responses.
pub(crate) fn check_access_mode(
    document: &Document,
    schema_pointer: &str,
    instance: &Value,
    mode: AccessMode,
) -> Vec<PolicyViolation> {
    let mut violations = Vec::new();
    let mut active = Vec::new();
    walk_access_mode(document, schema_pointer, instance, "", mode, &mut active, &mut violations);
    violations
}

#[allow(clippy::too_many_arguments)]
fn walk_access_mode(
    document: &Document,
    pointer: &str,
    instance: &Value,
    instance_path: &str,
    mode: AccessMode,
    active: &mut Vec<(String, String)>,
    out: &mut Vec<PolicyViolation>,
) {
    let (node, pointer) = match resolve_schema(document, pointer) {
        SchemaNode::Missing => return,
        SchemaNode::Cycle { pointer } => {
            out.push(PolicyViolation {
                kind: ErrorKind::InfiniteRecursion,
                instance_path: instance_path.to_string(),
                keyword_location: pointer,
                message: "$ref chain re-enters itself for the same instance location".to_string(),
            });
            return;
        }
        SchemaNode::Resolved { node, pointer } => (node, pointer),
    };
    let Some(schema) = node.as_object() else {
        return;
    };

    // Combinators recurse without consuming instance, so a `$ref` cycle
    // through `allOf`/`anyOf`/`oneOf` never trips the per-chain check
    // above. Re-entering the same (schema pointer, instance pointer) pair
    // while it is still active cannot terminate.
    let key = (pointer.clone(), instance_path.to_string());
    if active.contains(&key) {
        out.push(PolicyViolation {
            kind: ErrorKind::InfiniteRecursion,
            instance_path: instance_path.to_string(),
            keyword_location: pointer,
            message: "$ref chain re-enters itself for the same instance location".to_string(),
        });
        return;
    }
    active.push(key);

    let flagged = match mode {
        AccessMode::Request => ("readOnly", ErrorKind::ReadOnlyInRequest, "value is read-only and cannot appear in a request"),
        AccessMode::Response => ("writeOnly", ErrorKind::WriteOnlyInResponse, "value is write-only and cannot appear in a response"),
    };
    if schema.get(flagged.0) == Some(&Value::Bool(true)) {
        out.push(PolicyViolation {
            kind: flagged.1,
            instance_path: instance_path.to_string(),
            keyword_location: format!("{pointer}/{}", flagged.0),
            message: flagged.2.to_string(),
        });
    }

    for combinator in ["allOf", "anyOf", "oneOf"] {
        if let Some(branches) = schema.get(combinator).and_then(Value::as_array) {
            for index in 0..branches.len() {
                walk_access_mode(
                    document,
                    &format!("{pointer}/{combinator}/{index}"),
                    instance,
                    instance_path,
                    mode,
                    active,
                    out,
                );
            }
        }
    }

    match instance {
        Value::Object(fields) => {
            if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
                for (name, value) in fields {
                    if properties.contains_key(name) {
                        walk_access_mode(
                            document,
                            &format!("{pointer}/properties/{}", escape_token(name)),
                            value,
                            &format!("{instance_path}/{}", escape_token(name)),
                            mode,
                            active,
                            out,
                        );
                    }
                }
            }
        }
        Value::Array(items) => {
            let prefix_len = schema
                .get("prefixItems")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            for (index, item) in items.iter().enumerate() {
                if index < prefix_len {
                    walk_access_mode(
                        document,
                        &format!("{pointer}/prefixItems/{index}"),
                        item,
                        &format!("{instance_path}/{index}"),
                        mode,
                        active,
                        out,
                    );
                } else if schema.contains_key("items") {
                    walk_access_mode(
                        document,
                        &format!("{pointer}/items"),
                        item,
                        &format!("{instance_path}/{index}"),
                        mode,
                        active,
                        out,
                    );
                }
            }
        }
        _ => {}
    }

    active.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(paths: Value, components: Value) -> Document {
        Document::from_value(
            json!({
                "openapi": "3.1.0",
                "info": { "title": "t", "version": "1" },
                "paths": paths,
                "components": components,
            }),
            "test.json",
        )
        .unwrap()
    }

    fn body_schema_document(schema: Value) -> Document {
        document(
            json!({
                "/things": {
                    "post": {
                        "requestBody": {
                            "content": { "application/json": { "schema": schema } }
                        },
                        "responses": { "200": { "description": "OK" } }
                    }
                }
            }),
            json!({}),
        )
    }

    const SCHEMA_PTR: &str =
        "/paths/~1things/post/requestBody/content/application~1json/schema";

    #[test]
    fn test_evaluate_reports_instance_and_keyword_paths() {
        let document = body_schema_document(json!({
            "type": "object",
            "properties": { "hello": { "type": "string" } }
        }));
        let evaluator = SchemaEvaluator::new(&document).unwrap();
        let violations = evaluator
            .evaluate(&document, SCHEMA_PTR, &json!({ "hello": 123 }))
            .unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].instance_path, "/hello");
        assert!(violations[0].keyword_location.ends_with("/type"));
        // the keyword location resolves inside the document
        assert!(document.resolve_pointer(&violations[0].keyword_location).is_some());
    }

    #[test]
    fn test_evaluate_resolves_component_refs() {
        let document = document(
            json!({
                "/things": {
                    "post": {
                        "requestBody": {
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Thing" }
                                }
                            }
                        },
                        "responses": { "200": { "description": "OK" } }
                    }
                }
            }),
            json!({
                "schemas": {
                    "Thing": {
                        "type": "object",
                        "required": ["name"],
                        "properties": { "name": { "type": "string" } }
                    }
                }
            }),
        );
        let evaluator = SchemaEvaluator::new(&document).unwrap();
        assert!(evaluator
            .evaluate(&document, SCHEMA_PTR, &json!({ "name": "ok" }))
            .unwrap()
            .is_empty());
        assert!(!evaluator
            .evaluate(&document, SCHEMA_PTR, &json!({}))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_compiled_validators_are_cached() {
        let document = body_schema_document(json!({ "type": "object" }));
        let evaluator = SchemaEvaluator::new(&document).unwrap();
        let _ = evaluator.evaluate(&document, SCHEMA_PTR, &json!({}));
        let _ = evaluator.evaluate(&document, SCHEMA_PTR, &json!({}));
        assert_eq!(evaluator.cache_size(), 1);
    }

    #[test]
    fn test_resolve_schema_detects_cycles() {
        let document = document(
            json!({ "/x": { "get": { "responses": {} } } }),
            json!({ "schemas": { "Loop": { "$ref": "#/components/schemas/Loop" } } }),
        );
        match resolve_schema(&document, "/components/schemas/Loop") {
            SchemaNode::Cycle { pointer } => {
                assert_eq!(pointer, "/components/schemas/Loop/$ref");
            }
            _ => panic!("expected a cycle"),
        }
    }

    #[test]
    fn test_access_mode_walk_reports_combinator_ref_cycle() {
        // Node -> allOf/0 -> Node consumes no instance; each hop resolves
        // cleanly on its own, so only the active set can catch it.
        let document = document(
            json!({
                "/things": {
                    "post": {
                        "requestBody": {
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Node" }
                                }
                            }
                        },
                        "responses": { "200": { "description": "OK" } }
                    }
                }
            }),
            json!({
                "schemas": {
                    "Node": { "allOf": [ { "$ref": "#/components/schemas/Node" } ] }
                }
            }),
        );
        let violations =
            check_access_mode(&document, SCHEMA_PTR, &json!({}), AccessMode::Request);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ErrorKind::InfiniteRecursion);
        assert_eq!(violations[0].instance_path, "");
        assert_eq!(violations[0].keyword_location, "/components/schemas/Node");
    }

    #[test]
    fn test_access_mode_walk_allows_repeated_schema_at_sibling_instances() {
        // the same component applied at two different instance locations
        // is not a cycle
        let document = document(
            json!({
                "/things": {
                    "post": {
                        "requestBody": {
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "object",
                                        "properties": {
                                            "a": { "$ref": "#/components/schemas/Audited" },
                                            "b": { "$ref": "#/components/schemas/Audited" }
                                        }
                                    }
                                }
                            }
                        },
                        "responses": { "200": { "description": "OK" } }
                    }
                }
            }),
            json!({
                "schemas": {
                    "Audited": {
                        "type": "object",
                        "properties": {
                            "created": { "type": "string", "readOnly": true }
                        }
                    }
                }
            }),
        );
        let instance = json!({ "a": { "created": "x" }, "b": { "created": "y" } });
        let violations =
            check_access_mode(&document, SCHEMA_PTR, &instance, AccessMode::Request);
        let paths: Vec<_> = violations.iter().map(|v| v.instance_path.as_str()).collect();
        assert_eq!(paths, vec!["/a/created", "/b/created"]);
        assert!(violations.iter().all(|v| v.kind == ErrorKind::ReadOnlyInRequest));
    }

    #[test]
    fn test_access_mode_walk_flags_read_only_in_request() {
        let document = body_schema_document(json!({
            "type": "object",
            "properties": {
                "id": { "type": "string", "readOnly": true },
                "name": { "type": "string" }
            }
        }));
        let instance = json!({ "id": "abc", "name": "n" });
        let violations =
            check_access_mode(&document, SCHEMA_PTR, &instance, AccessMode::Request);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ErrorKind::ReadOnlyInRequest);
        assert_eq!(violations[0].instance_path, "/id");
        assert!(violations[0].keyword_location.ends_with("/readOnly"));

        // the same value in a response is fine
        assert!(check_access_mode(&document, SCHEMA_PTR, &instance, AccessMode::Response)
            .is_empty());
    }

    #[test]
    fn test_access_mode_walk_descends_arrays_and_all_of() {
        let document = body_schema_document(json!({
            "allOf": [{
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": { "secret": { "type": "string", "writeOnly": true } }
                }
            }]
        }));
        let instance = json!([{ "secret": "x" }, {}]);
        let violations =
            check_access_mode(&document, SCHEMA_PTR, &instance, AccessMode::Response);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].instance_path, "/0/secret");
    }

    #[test]
    fn test_empty_and_false_schema_predicates() {
        assert!(is_empty_schema(&json!(true)));
        assert!(is_empty_schema(&json!({})));
        assert!(!is_empty_schema(&json!({ "type": "string" })));
        assert!(is_false_schema(&json!(false)));
        assert!(!is_false_schema(&json!(true)));
    }
}
