//! HTTP Route for the slash-command webhook
//!
//! - POST /commands - Slack-compatible slash-command payload (form-urlencoded)
//!
//! The webhook is acknowledged immediately with an in-channel marker; the
//! command itself is dispatched on a spawned task and its reply text POSTed
//! to the payload's `response_url`. The chat platform only waits for the
//! acknowledgement, never for the dispatch.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::server::AppState;
use crate::types::LiaisonError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

const MAX_BODY_BYTES: usize = 10 * 1024;

/// Inbound slash-command payload
///
/// Only the fields the dispatcher needs; the platform sends more and serde
/// ignores the rest.
#[derive(Debug, Deserialize)]
pub struct SlashCommandPayload {
    #[serde(default)]
    pub token: String,
    pub user_id: String,
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub response_url: String,
}

#[derive(Debug, Serialize)]
struct DeferredResponse<'a> {
    response_type: &'a str,
    text: &'a str,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(
            Full::new(Bytes::from(json))
                .map_err(|never| match never {})
                .boxed(),
        )
        .unwrap()
}

/// Read a form-urlencoded body, aborting as soon as the size cap is hit
async fn parse_form_body<T, B>(req: Request<B>) -> Result<T, LiaisonError>
where
    T: for<'de> Deserialize<'de>,
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| LiaisonError::Http(format!("Failed to read body: {}", e)))?
        .to_bytes();

    serde_urlencoded::from_bytes(&bytes)
        .map_err(|e| LiaisonError::Http(format!("Invalid form body: {}", e)))
}

/// Compare the payload token against the configured one without leaking
/// where the first mismatching byte sits
fn verification_token_matches(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// POST /commands
async fn handle_command(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let payload: SlashCommandPayload = match parse_form_body(req).await {
        Ok(p) => p,
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({ "error": e.to_string() }),
            )
        }
    };

    // The payload token proves the request came from the configured workspace
    if let Some(ref expected) = state.args.slack_verification_token {
        if !verification_token_matches(&payload.token, expected) {
            warn!(user_id = %payload.user_id, "Webhook verification failed");
            return json_response(
                StatusCode::UNAUTHORIZED,
                &serde_json::json!({ "error": "Could not verify the request originated from Slack." }),
            );
        }
    } else {
        debug!("Verification token not configured; accepting webhook unchecked");
    }

    debug!(
        user_id = %payload.user_id,
        command = %payload.command,
        "Slash command received"
    );

    tokio::spawn(async move {
        let text = state
            .dispatcher
            .dispatch(&payload.user_id, &payload.command, &payload.text)
            .await;
        deliver_deferred(&state, &payload.response_url, &text).await;
    });

    json_response(
        StatusCode::OK,
        &serde_json::json!({ "response_type": "in_channel" }),
    )
}

/// POST the dispatch outcome back to the platform's response_url
async fn deliver_deferred(state: &AppState, response_url: &str, text: &str) {
    if response_url.is_empty() {
        warn!("No response_url on command payload; dropping deferred reply");
        return;
    }

    let body = DeferredResponse {
        response_type: "in_channel",
        text,
    };

    match state.webhook_client.post(response_url).json(&body).send().await {
        Ok(resp) if !resp.status().is_success() => {
            warn!(status = %resp.status(), "Deferred response rejected")
        }
        Ok(_) => debug!("Deferred response delivered"),
        Err(e) => warn!(error = %e, "Deferred response delivery failed"),
    }
}

/// Handle slash-command webhook requests.
///
/// Returns Some(response) if request was handled, None if not the webhook path.
pub async fn handle_command_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if path.split('?').next().unwrap_or(path) != "/commands" {
        return None;
    }

    let response = match method {
        &Method::POST => handle_command(req, state).await,
        _ => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &serde_json::json!({ "error": "Method not allowed" }),
        ),
    };

    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_parses_platform_form() {
        let form = "token=verif-123&team_id=T0001&channel_id=C2147&user_id=U2147&\
                    command=%2Fread-message&text=&response_url=https%3A%2F%2Fhooks.example%2Fabc";
        let payload: SlashCommandPayload = serde_urlencoded::from_str(form).unwrap();

        assert_eq!(payload.token, "verif-123");
        assert_eq!(payload.user_id, "U2147");
        assert_eq!(payload.command, "/read-message");
        assert_eq!(payload.text, "");
        assert_eq!(payload.response_url, "https://hooks.example/abc");
    }

    #[test]
    fn test_payload_rejects_missing_user_id() {
        let form = "token=verif-123&command=%2Fread-message";
        let result: Result<SlashCommandPayload, _> = serde_urlencoded::from_str(form);
        assert!(result.is_err());
    }

    #[test]
    fn test_verification_token_comparison() {
        assert!(verification_token_matches("verif-123", "verif-123"));
        assert!(!verification_token_matches("verif-124", "verif-123"));
        assert!(!verification_token_matches("verif-1234", "verif-123"));
        assert!(!verification_token_matches("", "verif-123"));
    }

    #[tokio::test]
    async fn test_parse_form_body_caps_oversized_payloads() {
        let form = format!("user_id=U1&command=%2Fread-message&text={}", "x".repeat(20_000));
        let req = Request::builder()
            .body(Full::new(Bytes::from(form)))
            .unwrap();

        let err = parse_form_body::<SlashCommandPayload, _>(req)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("length limit"));
    }
}
