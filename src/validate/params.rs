//! Parameter and header projection.
//!
//! Declared parameters are projected off the wire in reverse: the serialized
//! string (path capture, first query occurrence, first header value) is
//! coerced when the schema asks for a number, then handed to the schema
//! evaluator. Only `simple` path/header and exploded `form` query styles are
//! supported; anything else is skipped, as are cookies and the
//! `Content-Type`/`Accept`/`Authorization` headers, which are handled
//! elsewhere or deliberately ignored.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::coerce;
use crate::location::{instance, push_token};
use crate::media_type::MediaType;
use crate::message::{HttpRequest, HttpResponse};
use crate::result::{ErrorKind, ResultBuilder};
use crate::schema::{resolve_schema, SchemaNode};
use crate::spec::{OperationMeta, ParameterLocation, ParameterMeta, ParameterStyle, ResponseMeta};

use super::ValidateCx;

const SKIPPED_HEADERS: [&str; 3] = ["content-type", "accept", "authorization"];

/// Validate every declared parameter of `operation` against the request.
/// The parameter list is pre-ordered (path, query, headers sorted
/// case-folded), which fixes the error stream order.
pub(crate) fn validate_parameters(
    cx: &ValidateCx<'_>,
    operation: &OperationMeta,
    captures: &BTreeMap<String, String>,
    request: &impl HttpRequest,
    out: &mut ResultBuilder,
) {
    let query_values = parse_query(request.uri().query());

    for parameter in &operation.parameters {
        if !supported_style(parameter) {
            debug!(
                parameter = %parameter.name,
                location = %parameter.location,
                "unsupported parameter style, skipping"
            );
            continue;
        }
        let (raw, instance_location) = match parameter.location {
            ParameterLocation::Cookie => {
                debug!(parameter = %parameter.name, "cookie parameters are not validated");
                continue;
            }
            ParameterLocation::Path => (
                captures.get(&parameter.name).map(String::as_str),
                instance::REQUEST_PATH.to_string(),
            ),
            ParameterLocation::Query => (
                first_query_value(&query_values, &parameter.name),
                instance::request_query(&parameter.name),
            ),
            ParameterLocation::Header => {
                if SKIPPED_HEADERS.contains(&parameter.name.to_ascii_lowercase().as_str()) {
                    continue;
                }
                (
                    request.header(&parameter.name),
                    instance::request_header(&parameter.name),
                )
            }
        };
        validate_parameter_value(cx, parameter, raw, &instance_location, out);
    }
}

/// Validate the declared headers of a response entry. `Content-Type` is
/// described by the `content` map, not its header entry, and is skipped.
pub(crate) fn validate_response_headers(
    cx: &ValidateCx<'_>,
    response: &ResponseMeta,
    message: &impl HttpResponse,
    out: &mut ResultBuilder,
) {
    for header in &response.headers {
        if header.name.eq_ignore_ascii_case("content-type") {
            continue;
        }
        validate_parameter_value(
            cx,
            header,
            message.header(&header.name),
            &instance::response_header(&header.name),
            out,
        );
    }
}

fn supported_style(parameter: &ParameterMeta) -> bool {
    match parameter.location {
        ParameterLocation::Path | ParameterLocation::Header => {
            parameter.style == ParameterStyle::Simple
        }
        ParameterLocation::Query => parameter.style == ParameterStyle::Form && parameter.explode,
        ParameterLocation::Cookie => true,
    }
}

fn parse_query(query: Option<&str>) -> Vec<(String, String)> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

/// Only the first occurrence of a repeated query name is considered.
fn first_query_value<'a>(values: &'a [(String, String)], name: &str) -> Option<&'a str> {
    values
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn validate_parameter_value(
    cx: &ValidateCx<'_>,
    parameter: &ParameterMeta,
    raw: Option<&str>,
    instance_location: &str,
    out: &mut ResultBuilder,
) {
    let Some(raw) = raw else {
        if parameter.required {
            out.error(
                ErrorKind::MissingRequiredParameter,
                instance_location,
                required_keyword(cx, parameter),
                format!("missing required {} parameter `{}`", parameter.location, parameter.name),
            );
        }
        return;
    };

    if let Some(content_pointer) = &parameter.content_pointer {
        validate_content_parameter(cx, content_pointer, raw, instance_location, out);
        return;
    }

    let Some(schema_pointer) = &parameter.schema_pointer else {
        return;
    };
    let value = match resolve_schema(cx.document, schema_pointer) {
        SchemaNode::Cycle { pointer } => {
            out.error(
                ErrorKind::InfiniteRecursion,
                instance_location,
                pointer,
                "$ref chain re-enters itself for the same instance location",
            );
            return;
        }
        SchemaNode::Resolved { node, .. } => coerce::coerce_value(raw, node),
        SchemaNode::Missing => Value::String(raw.to_string()),
    };
    evaluate_parameter(cx, schema_pointer, &value, instance_location, out);
}

/// A parameter declared with `content` instead of `schema` carries an
/// encoded body; decode it with the single declared media type and evaluate.
fn validate_content_parameter(
    cx: &ValidateCx<'_>,
    content_pointer: &str,
    raw: &str,
    instance_location: &str,
    out: &mut ResultBuilder,
) {
    let Some(content) = cx
        .document
        .resolve_pointer(content_pointer)
        .and_then(Value::as_object)
    else {
        return;
    };
    let Some(key) = content.keys().next() else {
        return;
    };
    let media_pointer = push_token(content_pointer, key);
    let Some(media_type) = MediaType::parse(key) else {
        return;
    };
    let decoded = match cx.registry.decode(&media_type, raw.as_bytes()) {
        Ok(decoded) => decoded,
        Err(message) => {
            out.error(ErrorKind::DecodingFailed, instance_location, media_pointer, message);
            return;
        }
    };
    let schema_pointer = push_token(&media_pointer, "schema");
    if cx.document.resolve_pointer(&schema_pointer).is_none() {
        return;
    }
    let decoded = match resolve_schema(cx.document, &schema_pointer) {
        SchemaNode::Cycle { pointer } => {
            out.error(
                ErrorKind::InfiniteRecursion,
                instance_location,
                pointer,
                "$ref chain re-enters itself for the same instance location",
            );
            return;
        }
        SchemaNode::Resolved { node, .. } => coerce::coerce_instance(decoded, node),
        SchemaNode::Missing => decoded,
    };
    evaluate_parameter(cx, &schema_pointer, &decoded, instance_location, out);
}

fn evaluate_parameter(
    cx: &ValidateCx<'_>,
    schema_pointer: &str,
    value: &Value,
    instance_location: &str,
    out: &mut ResultBuilder,
) {
    match cx.evaluator.evaluate(cx.document, schema_pointer, value) {
        Ok(violations) => {
            for violation in violations {
                out.error(
                    ErrorKind::ParameterSchemaFailure,
                    format!("{instance_location}{}", violation.instance_path),
                    violation.keyword_location,
                    violation.message,
                );
            }
        }
        Err(message) => out.error(
            ErrorKind::ParameterSchemaFailure,
            instance_location,
            schema_pointer,
            message,
        ),
    }
}

/// Point at the parameter's `required` keyword when it is spelled out;
/// path parameters are implicitly required and may omit it.
fn required_keyword(cx: &ValidateCx<'_>, parameter: &ParameterMeta) -> String {
    let keyword = push_token(&parameter.pointer, "required");
    if cx.document.resolve_pointer(&keyword).is_some() {
        keyword
    } else {
        parameter.pointer.clone()
    }
}
