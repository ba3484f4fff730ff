//! Request/response types for the account endpoints.
//!
//! Every response uses the `{ok, ...}` envelope: `message` for plain
//! acknowledgements, `data` for payloads, `error` for failures (either a
//! string or a field→message map for validation errors).

use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RecoverRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetRequest {
    pub token: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Ack {
    pub ok: bool,
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenData {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginOk {
    pub ok: bool,
    pub data: TokenData,
}

/// `{ok: true, message}` acknowledgement body.
pub(crate) fn ack(message: &str) -> Json<Value> {
    Json(json!({ "ok": true, "message": message }))
}

/// `{ok: false, error}` failure body; `error` may be a string or a
/// field→message map.
pub(crate) fn failure(error: impl Serialize) -> Json<Value> {
    Json(json!({ "ok": false, "error": error }))
}
