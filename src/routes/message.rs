//! HTTP Routes for the shared message
//!
//! - GET /api/v1/message - Read the shared message (Bearer)
//! - PUT /api/v1/message - Replace the shared message (Bearer)
//!
//! Callers present a JWT; the resource service re-checks that the user
//! behind the token still exists before every read or write.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Credential;
use crate::routes::auth_routes::{authenticate_request, parse_json_body};
use crate::server::AppState;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

#[derive(Debug, Deserialize)]
pub struct WriteMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            Full::new(Bytes::from(json))
                .map_err(|never| match never {})
                .boxed(),
        )
        .unwrap()
}

fn error_response(status: StatusCode, message: &str) -> Response<BoxBody> {
    json_response(status, &serde_json::json!({ "error": message }))
}

/// GET /api/v1/message
async fn handle_get_message(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match authenticate_request(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let credential = Credential::user(claims.sub);
    match state.messages.get_message(&credential) {
        Ok(message) => json_response(StatusCode::OK, &MessageResponse { message }),
        Err(e) => error_response(e.status_code(), &e.to_string()),
    }
}

/// PUT /api/v1/message
async fn handle_put_message(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match authenticate_request(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let body: WriteMessageRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let credential = Credential::user(claims.sub);
    match state.messages.set_message(&body.message, &credential) {
        Ok(message) => json_response(StatusCode::OK, &MessageResponse { message }),
        Err(e) => error_response(e.status_code(), &e.to_string()),
    }
}

/// Handle message HTTP requests.
///
/// Returns Some(response) if request was handled, None if not a message route.
pub async fn handle_message_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if path.split('?').next().unwrap_or(path) != "/api/v1/message" {
        return None;
    }

    let response = match method {
        &Method::GET => handle_get_message(req, state).await,
        &Method::PUT => handle_put_message(req, state).await,
        _ => error_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
    };

    Some(response)
}
