//! Handlers for validated requests, keyed by operationId.

use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::Full;
use serde_json::json;

use palisade_validator::ValidationResult;

use crate::response;

/// Signature shared by all handlers. They only ever see valid requests.
pub type Handler = fn(&ValidationResult) -> Response<Full<Bytes>>;

/// The handler for an operation, if one exists.
pub fn lookup(operation_id: &str) -> Option<Handler> {
    match operation_id {
        "login" => Some(login as Handler),
        "getNote" => Some(get_note as Handler),
        _ => None,
    }
}

/// Echo the validated username.
pub fn login(validated: &ValidationResult) -> Response<Full<Bytes>> {
    let username = validated
        .body
        .as_ref()
        .and_then(|body| body.get("username"))
        .cloned()
        .unwrap_or_default();
    response::json(StatusCode::OK, &json!({ "username": username }))
}

/// Every identifier resolves to the same note.
pub fn get_note(_validated: &ValidationResult) -> Response<Full<Bytes>> {
    response::json(
        StatusCode::OK,
        &json!({
            "subject": "Shopping list",
            "body": (["- Dish soap", "- Potatoes", "- Milk"].join("\n")),
        }),
    )
}
