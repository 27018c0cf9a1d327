//! HTTP Routes for association completion
//!
//! - GET  /link?token=...        - Association step reached from the DM
//!   invitation link; completes the association for the authenticated caller.
//! - POST /api/v1/link/complete  - API variant taking `{token}` in the body.
//!
//! Both paths refuse to consume a token when the caller is already linked,
//! so a stray click cannot burn someone else's invitation.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{extract_token_from_header, extract_token_from_url};
use crate::db::users::User;
use crate::linking::Completer;
use crate::routes::auth_routes::{get_auth_header, parse_json_body, SuccessResponse};
use crate::server::AppState;
use crate::types::LiaisonError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

const ALREADY_LINKED: &str = "Your user account is already associated with a Slack user.";
const LINK_SUCCESS: &str = "Your user account has successfully been associated with your Slack user.";

#[derive(Debug, Deserialize)]
pub struct CompleteLinkRequest {
    pub token: String,
}

/// Association page body, JSON-rendered
#[derive(Debug, Serialize)]
pub struct LinkPageResponse {
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

fn page_response(status: StatusCode, message: impl Into<String>) -> Response<BoxBody> {
    json_response(
        status,
        &LinkPageResponse {
            message: message.into(),
        },
    )
}

/// Resolve the caller to a user record
///
/// Missing or stale sessions come back as `Unauthorized`; anything else
/// keeps its own error so storage trouble is not mistaken for a login
/// problem.
fn resolve_caller<B>(req: &Request<B>, state: &AppState) -> Result<User, LiaisonError> {
    let token = extract_token_from_header(get_auth_header(req))
        .ok_or_else(|| LiaisonError::Unauthorized("No token provided".into()))?;

    let result = state.jwt.verify_token(token);
    if !result.valid {
        return Err(LiaisonError::Unauthorized(
            result.error.unwrap_or_else(|| "Invalid token".into()),
        ));
    }
    let claims = result.claims.ok_or_else(|| {
        LiaisonError::Unauthorized("Invalid token".into())
    })?;

    match state.users.find_by_id(&claims.sub) {
        Ok(user) => Ok(user),
        Err(e) if e.is_not_found() => {
            Err(LiaisonError::Unauthorized("User no longer exists".into()))
        }
        Err(e) => Err(e),
    }
}

/// Outcome of a redemption attempt, shared by both endpoints
enum RedeemOutcome {
    Linked,
    AlreadyLinked,
    Failed(LiaisonError),
}

/// Redeem a token for the caller, refusing before the token is consumed
/// when the caller already holds a link
async fn redeem(completer: &Completer, user: &User, token: &str) -> RedeemOutcome {
    if user.chat_link.is_some() {
        return RedeemOutcome::AlreadyLinked;
    }

    match completer.complete(&user.id, token).await {
        Ok(_) => RedeemOutcome::Linked,
        Err(e) => RedeemOutcome::Failed(e),
    }
}

/// GET /link?token=...
///
/// The page a user lands on from the DM invitation. Follows the original
/// association flow: require login, refuse if already linked, then redeem
/// the token from the query string.
async fn handle_association_page(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let user = match resolve_caller(&req, &state) {
        Ok(u) => u,
        Err(LiaisonError::Unauthorized(_)) => {
            return page_response(
                StatusCode::UNAUTHORIZED,
                "You must login before user association can be completed.",
            )
        }
        Err(e) => return page_response(e.status_code(), format!("An error occurred: {}", e)),
    };

    let token = match extract_token_from_url(&req.uri().to_string(), "token") {
        Some(t) => t,
        None => {
            return page_response(
                StatusCode::BAD_REQUEST,
                "You must begin the user association process before visiting this page.",
            )
        }
    };

    match redeem(&state.completer, &user, &token).await {
        RedeemOutcome::Linked => page_response(StatusCode::OK, LINK_SUCCESS),
        RedeemOutcome::AlreadyLinked => page_response(StatusCode::CONFLICT, ALREADY_LINKED),
        RedeemOutcome::Failed(e) => {
            page_response(e.status_code(), format!("An error occurred: {}", e))
        }
    }
}

/// POST /api/v1/link/complete
async fn handle_complete(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let user = match resolve_caller(&req, &state) {
        Ok(u) => u,
        Err(e) => {
            return json_response(
                e.status_code(),
                &serde_json::json!({ "error": e.to_string() }),
            )
        }
    };

    let body: CompleteLinkRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({ "error": e.to_string() }),
            )
        }
    };

    match redeem(&state.completer, &user, &body.token).await {
        RedeemOutcome::Linked => json_response(
            StatusCode::OK,
            &SuccessResponse {
                success: true,
                message: LINK_SUCCESS.into(),
            },
        ),
        RedeemOutcome::AlreadyLinked => json_response(
            StatusCode::CONFLICT,
            &serde_json::json!({ "error": ALREADY_LINKED }),
        ),
        RedeemOutcome::Failed(e) => json_response(
            e.status_code(),
            &serde_json::json!({ "error": e.to_string() }),
        ),
    }
}

/// Handle association HTTP requests.
///
/// Returns Some(response) if request was handled, None if not a link route.
pub async fn handle_link_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();
    let path = path.split('?').next().unwrap_or(path);

    let response = match (method, path) {
        (&Method::GET, "/link") => handle_association_page(req, state).await,
        (&Method::POST, "/api/v1/link/complete") => handle_complete(req, state).await,

        (_, "/link") | (_, "/api/v1/link/complete") => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &serde_json::json!({ "error": "Method not allowed" }),
        ),

        _ => return None,
    };

    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenInput;
    use crate::chat::{ChatTransport, MessageAttachment};
    use crate::config::Args;
    use crate::db::links::LinkLedger;
    use crate::db::users::UserStore;
    use crate::db::Database;
    use crate::linking::Linker;
    use crate::types::Result;
    use async_trait::async_trait;
    use clap::Parser;

    struct SilentTransport;

    #[async_trait]
    impl ChatTransport for SilentTransport {
        async fn open_channel(&self, chat_id: &str) -> Result<String> {
            Ok(format!("D-{}", chat_id))
        }

        async fn post_message(
            &self,
            _channel_id: &str,
            _text: &str,
            _attachments: &[MessageAttachment],
        ) -> Result<()> {
            Ok(())
        }
    }

    fn test_args() -> Args {
        let mut args = Args::parse_from(["liaison", "--dev-mode"]);
        args.public_url = "http://localhost:8080".into();
        args
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        users: UserStore,
        ledger: LinkLedger,
        linker: Linker,
        completer: Completer,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let transport = Arc::new(SilentTransport);
        let users = db.user_store();
        let ledger = db.link_ledger();
        let linker = Linker::new(test_args(), ledger.clone(), transport.clone());
        let completer = Completer::new(users.clone(), ledger.clone(), transport);

        Fixture {
            _dir: dir,
            users,
            ledger,
            linker,
            completer,
        }
    }

    #[tokio::test]
    async fn test_redeem_refuses_linked_caller_before_consuming_token() {
        let fx = fixture();
        let user = fx.users.create("alice", "secret123").unwrap();
        let linked = fx.users.attach_chat_link(&user.id, "U1", "D1").unwrap();

        // A fresh invitation is pending while the caller is already linked
        let token = fx.linker.begin("U2").await.unwrap();

        let outcome = redeem(&fx.completer, &linked, &token).await;
        assert!(matches!(outcome, RedeemOutcome::AlreadyLinked));

        // The refusal happened before consumption: the token still redeems
        assert!(fx.ledger.take(&token).is_ok());
    }

    #[tokio::test]
    async fn test_redeem_links_fresh_caller() {
        let fx = fixture();
        let user = fx.users.create("alice", "secret123").unwrap();
        let token = fx.linker.begin("U1").await.unwrap();

        let outcome = redeem(&fx.completer, &user, &token).await;
        assert!(matches!(outcome, RedeemOutcome::Linked));
        assert_eq!(fx.users.find_by_chat_id("U1").unwrap().id, user.id);
    }

    #[tokio::test]
    async fn test_redeem_surfaces_invalid_token() {
        let fx = fixture();
        let user = fx.users.create("alice", "secret123").unwrap();

        match redeem(&fx.completer, &user, "never-issued").await {
            RedeemOutcome::Failed(e) => {
                assert!(matches!(e, LiaisonError::InvalidToken(_)));
                assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
            }
            _ => panic!("expected redemption to fail"),
        }
    }

    fn test_state() -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let state = AppState::new(test_args(), db, Arc::new(SilentTransport)).unwrap();
        (dir, Arc::new(state))
    }

    fn request_with_bearer(token: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri("/link");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_resolve_caller_without_session_is_unauthorized() {
        let (_dir, state) = test_state();

        let err = resolve_caller(&request_with_bearer(None), &state).unwrap_err();
        assert!(matches!(err, LiaisonError::Unauthorized(_)));
    }

    #[test]
    fn test_resolve_caller_with_stale_subject_is_unauthorized() {
        let (_dir, state) = test_state();

        // A signed session whose account no longer exists
        let token = state
            .jwt
            .generate_token(TokenInput {
                user_id: "ghost".into(),
                username: "ghost".into(),
            })
            .unwrap();

        let err = resolve_caller(&request_with_bearer(Some(&token)), &state).unwrap_err();
        assert!(matches!(err, LiaisonError::Unauthorized(_)));
        assert_eq!(err.to_string(), "Unauthorized: User no longer exists");
    }

    #[test]
    fn test_resolve_caller_with_live_session() {
        let (_dir, state) = test_state();
        let user = state.users.create("alice", "secret123").unwrap();

        let token = state
            .jwt
            .generate_token(TokenInput {
                user_id: user.id.clone(),
                username: user.username.clone(),
            })
            .unwrap();

        let resolved = resolve_caller(&request_with_bearer(Some(&token)), &state).unwrap();
        assert_eq!(resolved.id, user.id);
    }
}
