//! Response-side orchestration: select the response entry by status code
//! (falling back to `default`), then validate declared headers and body.

use crate::location::{instance, push_token};
use crate::message::HttpResponse;
use crate::result::{ErrorKind, ResultBuilder};
use crate::router::PathMatch;

use super::body::validate_response_body;
use super::params::validate_response_headers;
use super::ValidateCx;

pub(crate) fn validate_response_inner(
    cx: &ValidateCx<'_>,
    matched: &PathMatch,
    response: &impl HttpResponse,
    out: &mut ResultBuilder,
) {
    let operation = cx
        .document
        .operation_at(matched.template_index, matched.operation_index);

    let status = response.status();
    let Some(response_meta) = operation.response_for(status) else {
        out.error(
            ErrorKind::NoMatchingResponse,
            instance::RESPONSE_STATUS,
            push_token(&operation.pointer, "responses"),
            format!("no response entry for status {status} and no `default` entry"),
        );
        return;
    };

    validate_response_headers(cx, response_meta, response, out);
    validate_response_body(cx, response_meta, response, out);
}
