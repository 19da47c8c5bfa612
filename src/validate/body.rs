//! Body dispatch: media type selection, charset decoding, schema dispatch.
//!
//! The request and response sides share one dispatcher. A message body is
//! matched against the operation's `content` keys with the registry
//! precedence (exact, then `type/*`, then `*/*`), decoded by charset, run
//! through numeric coercion when the top-level schema asks for it, and
//! handed to the schema evaluator. Requests additionally reject bodies on
//! GET/HEAD operations that declare no `requestBody`, and enforce
//! `readOnly`; responses enforce `writeOnly`.

use serde_json::{json, Value};
use tracing::debug;

use crate::coerce;
use crate::location::{instance, push_token};
use crate::media_type::{best_content_key, MediaType};
use crate::message::{HttpRequest, HttpResponse};
use crate::result::{Annotation, ErrorKind, ResultBuilder};
use crate::schema::{
    check_access_mode, is_empty_schema, is_false_schema, resolve_schema, AccessMode, SchemaNode,
};
use crate::spec::{OperationMeta, ResponseMeta};

use super::ValidateCx;

struct BodyTarget<'a> {
    instance_root: &'a str,
    content_type_instance: &'a str,
    mode: AccessMode,
}

pub(crate) fn validate_request_body(
    cx: &ValidateCx<'_>,
    operation: &OperationMeta,
    request: &impl HttpRequest,
    out: &mut ResultBuilder,
) {
    let body = request.body_bytes();
    let content_length = request
        .header("content-length")
        .and_then(|v| v.trim().parse::<u64>().ok());
    let has_body = !body.is_empty() || content_length.is_some_and(|n| n > 0);

    if (operation.method == "get" || operation.method == "head")
        && has_body
        && operation.request_body.is_none()
    {
        out.error(
            ErrorKind::UnexpectedBodyForGetHead,
            instance::REQUEST_BODY,
            operation.pointer.clone(),
            format!(
                "`{}` request carries a body but the operation declares no requestBody",
                operation.method
            ),
        );
        return;
    }

    let Some(request_body) = &operation.request_body else {
        return;
    };
    let target = BodyTarget {
        instance_root: instance::REQUEST_BODY,
        content_type_instance: "/request/header/Content-Type",
        mode: AccessMode::Request,
    };

    if !has_body {
        if !request_body.required {
            return;
        }
        // a required body whose matching media type has the empty schema is
        // still satisfiable by an empty payload
        if matched_schema_is_empty(
            cx,
            request_body.content_pointer.as_deref(),
            request.header("content-type"),
        ) {
            return;
        }
        let keyword = push_token(&request_body.pointer, "required");
        let keyword = if cx.document.resolve_pointer(&keyword).is_some() {
            keyword
        } else {
            request_body.pointer.clone()
        };
        out.error(
            ErrorKind::MissingRequiredBody,
            instance::REQUEST_BODY,
            keyword,
            "request body is required",
        );
        return;
    }

    dispatch_body(
        cx,
        &target,
        request_body.content_pointer.as_deref(),
        request.header("content-type"),
        body,
        out,
    );
}

pub(crate) fn validate_response_body(
    cx: &ValidateCx<'_>,
    response_meta: &ResponseMeta,
    response: &impl HttpResponse,
    out: &mut ResultBuilder,
) {
    let body = response.body_bytes();
    // a missing Content-Length alongside a non-empty body is tolerated;
    // only the bytes themselves matter here
    if body.is_empty() {
        return;
    }
    dispatch_body(
        cx,
        &BodyTarget {
            instance_root: instance::RESPONSE_BODY,
            content_type_instance: "/response/header/Content-Type",
            mode: AccessMode::Response,
        },
        response_meta.content_pointer.as_deref(),
        response.header("content-type"),
        body,
        out,
    );
}

fn matched_schema_is_empty(
    cx: &ValidateCx<'_>,
    content_pointer: Option<&str>,
    content_type: Option<&str>,
) -> bool {
    let Some(content_pointer) = content_pointer else {
        return false;
    };
    let Some(content) = cx
        .document
        .resolve_pointer(content_pointer)
        .and_then(Value::as_object)
    else {
        return false;
    };
    let Some(media_type) = content_type.and_then(MediaType::parse) else {
        return false;
    };
    let Some(key) = best_content_key(content.keys().map(String::as_str), &media_type) else {
        return false;
    };
    let schema_pointer = push_token(&push_token(content_pointer, key), "schema");
    match resolve_schema(cx.document, &schema_pointer) {
        SchemaNode::Resolved { node, .. } => is_empty_schema(node),
        SchemaNode::Missing => true,
        SchemaNode::Cycle { .. } => false,
    }
}

fn dispatch_body(
    cx: &ValidateCx<'_>,
    target: &BodyTarget<'_>,
    content_pointer: Option<&str>,
    content_type: Option<&str>,
    body: &[u8],
    out: &mut ResultBuilder,
) {
    let Some(content_pointer) = content_pointer else {
        return;
    };
    let Some(content) = cx
        .document
        .resolve_pointer(content_pointer)
        .and_then(Value::as_object)
    else {
        return;
    };

    let Some(media_type) = content_type.and_then(MediaType::parse) else {
        out.error(
            ErrorKind::NoMatchingContentType,
            target.content_type_instance,
            content_pointer,
            "message has a body but no parseable Content-Type header",
        );
        return;
    };
    let Some(key) = best_content_key(content.keys().map(String::as_str), &media_type) else {
        out.error(
            ErrorKind::NoMatchingContentType,
            target.content_type_instance,
            content_pointer,
            format!("content type `{media_type}` does not match any media type entry"),
        );
        return;
    };
    debug!(content_type = %media_type, matched = key, "media type entry selected");
    let media_pointer = push_token(content_pointer, key);
    out.annotate(Annotation {
        instance_location: target.instance_root.to_string(),
        keyword_location: media_pointer.clone(),
        annotation: json!({ "mediaType": key }),
    });

    let schema_pointer = push_token(&media_pointer, "schema");
    let resolved = if cx.document.resolve_pointer(&schema_pointer).is_some() {
        match resolve_schema(cx.document, &schema_pointer) {
            SchemaNode::Cycle { pointer } => {
                out.error(
                    ErrorKind::InfiniteRecursion,
                    target.instance_root,
                    pointer,
                    "$ref chain re-enters itself for the same instance location",
                );
                return;
            }
            SchemaNode::Resolved { node, pointer } => Some((node, pointer)),
            SchemaNode::Missing => None,
        }
    } else {
        None
    };

    if let Some((node, pointer)) = &resolved {
        if is_false_schema(node) {
            out.error(
                ErrorKind::EntityForbidden,
                target.instance_root,
                pointer.clone(),
                "the entity is forbidden",
            );
            return;
        }
    }

    let decoded = match cx.registry.decode(&media_type, body) {
        Ok(decoded) => decoded,
        Err(message) => {
            out.error(ErrorKind::DecodingFailed, target.instance_root, media_pointer, message);
            return;
        }
    };

    let Some((schema_node, resolved_pointer)) = resolved else {
        return;
    };
    let decoded = coerce::coerce_instance(decoded, schema_node);

    match cx.evaluator.evaluate(cx.document, &schema_pointer, &decoded) {
        Ok(violations) => {
            let nested: Vec<_> = violations
                .iter()
                .filter(|v| !v.instance_path.is_empty())
                .collect();
            let summary = if nested.is_empty() {
                None
            } else if nested.iter().all(|v| v.keyword_location.contains("/properties/")) {
                Some((resolved_keyword(cx, &resolved_pointer, "properties"), "not all properties are valid"))
            } else if nested.iter().all(|v| v.keyword_location.contains("/items")) {
                Some((resolved_keyword(cx, &resolved_pointer, "items"), "not all items are valid"))
            } else {
                Some((resolved_pointer.clone(), "subschema is not valid"))
            };
            for violation in &violations {
                out.error(
                    ErrorKind::BodySchemaFailure,
                    format!("{}{}", target.instance_root, violation.instance_path),
                    violation.keyword_location.clone(),
                    violation.message.clone(),
                );
            }
            if let Some((keyword, message)) = summary {
                out.error(ErrorKind::BodySchemaFailure, target.instance_root, keyword, message);
            }
        }
        Err(message) => {
            out.error(
                ErrorKind::BodySchemaFailure,
                target.instance_root,
                schema_pointer.clone(),
                message,
            );
            return;
        }
    }

    for violation in check_access_mode(cx.document, &schema_pointer, &decoded, target.mode) {
        out.error(
            violation.kind,
            format!("{}{}", target.instance_root, violation.instance_path),
            violation.keyword_location,
            violation.message,
        );
    }
}

/// Keyword under the resolved schema when it exists there, else the schema
/// itself; keeps summary locations resolvable in the document.
fn resolved_keyword(cx: &ValidateCx<'_>, schema_pointer: &str, keyword: &str) -> String {
    let candidate = push_token(schema_pointer, keyword);
    if cx.document.resolve_pointer(&candidate).is_some() {
        candidate
    } else {
        schema_pointer.to_string()
    }
}
