//! Request-side orchestration: route, project parameters, dispatch body.

use crate::message::HttpRequest;
use crate::result::ResultBuilder;
use crate::router::{PathHints, PathMatch, RequestFacts, Router};

use super::body::validate_request_body;
use super::params::validate_parameters;
use super::ValidateCx;

pub(crate) fn request_facts(request: &impl HttpRequest) -> RequestFacts {
    RequestFacts {
        method: request.method().as_str().to_ascii_lowercase(),
        path: request.uri().path().to_string(),
        host: request.host().map(str::to_string),
    }
}

/// Validate a request. Errors accumulate in a fixed order: matching, then
/// path parameters, query parameters, headers, body.
pub(crate) fn validate_request_inner(
    cx: &ValidateCx<'_>,
    router: &Router,
    request: &impl HttpRequest,
    hints: &PathHints,
) -> (ResultBuilder, Option<PathMatch>) {
    let mut out = ResultBuilder::new();
    let facts = request_facts(request);

    let matched = match router.resolve(cx.document, Some(&facts), hints) {
        Ok(matched) => matched,
        Err(errors) => {
            for error in errors {
                out.push(error);
            }
            return (out, None);
        }
    };

    let operation = cx
        .document
        .operation_at(matched.template_index, matched.operation_index);
    validate_parameters(cx, operation, &matched.path_captures, request, &mut out);
    validate_request_body(cx, operation, request, &mut out);

    (out, Some(matched))
}
