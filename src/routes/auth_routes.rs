//! HTTP Routes for Authentication
//!
//! Provides REST API endpoints for web account authentication:
//! - POST /auth/register - Create an account and get a JWT token
//! - POST /auth/login    - Authenticate and get a JWT token
//! - POST /auth/logout   - Logout (stateless tokens, client-side mainly)
//! - GET  /auth/me       - Get current user info from token

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{extract_token_from_header, Claims, TokenInput};
use crate::db::users::{check_password, User, UserStore};
use crate::server::AppState;
use crate::types::LiaisonError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

const MAX_BODY_BYTES: usize = 10 * 1024;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Public view of a user record
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            chat_id: user.chat_link.as_ref().map(|link| link.chat_id.clone()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user: UserSummary,
    pub expires_at: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

// =============================================================================
// Response Helpers
// =============================================================================

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// Read a JSON body, aborting as soon as the size cap is hit rather than
/// buffering the whole payload first
pub(crate) async fn parse_json_body<T, B>(req: Request<B>) -> Result<T, LiaisonError>
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

    serde_json::from_slice(&bytes)
        .map_err(|e| LiaisonError::Http(format!("Invalid JSON: {}", e)))
}

pub(crate) fn get_auth_header<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Resolve the Bearer token on a request to verified claims.
///
/// Returns the claims on success, or the error response to send back.
/// Shared with the message and link routes.
pub(crate) fn authenticate_request<B>(
    req: &Request<B>,
    state: &AppState,
) -> Result<Claims, Response<BoxBody>> {
    let token = match extract_token_from_header(get_auth_header(req)) {
        Some(t) => t,
        None => {
            return Err(json_response(
                StatusCode::UNAUTHORIZED,
                &ErrorResponse {
                    error: "No token provided".into(),
                    code: None,
                },
            ))
        }
    };

    let result = state.jwt.verify_token(token);
    if !result.valid {
        return Err(json_response(
            StatusCode::UNAUTHORIZED,
            &ErrorResponse {
                error: result.error.unwrap_or_else(|| "Invalid token".into()),
                code: Some("INVALID_TOKEN".into()),
            },
        ));
    }

    Ok(result.claims.unwrap())
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /auth/register
///
/// Create a web account. Field validation and the duplicate-username check
/// live in the identity store; this handler maps its errors onto statuses.
async fn handle_register(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: RegisterRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &ErrorResponse {
                    error: format!("Invalid JSON body: {}", e),
                    code: None,
                },
            )
        }
    };

    match state.users.create(&body.username, &body.password) {
        Ok(user) => {
            info!("Registered new user: {}", user.username);
            generate_auth_response(&state, &user, StatusCode::CREATED)
        }
        Err(e) => json_response(
            e.status_code(),
            &ErrorResponse {
                error: e.to_string(),
                code: None,
            },
        ),
    }
}

/// POST /auth/login
///
/// Authenticate with username and password. Unknown users and wrong
/// passwords both produce the same generic error to prevent enumeration.
async fn handle_login(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: LoginRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => {
            return json_response(
                StatusCode::BAD_REQUEST,
                &ErrorResponse {
                    error: format!("Invalid JSON body: {}", e),
                    code: None,
                },
            )
        }
    };

    if body.username.is_empty() || body.password.is_empty() {
        return json_response(
            StatusCode::BAD_REQUEST,
            &ErrorResponse {
                error: "Missing required fields: username, password".into(),
                code: None,
            },
        );
    }

    let user = match check_login(&state.users, &body.username, &body.password) {
        Ok(u) => u,
        Err(LiaisonError::Unauthorized(_)) => {
            warn!("Login failed: {}", body.username);
            return json_response(
                StatusCode::UNAUTHORIZED,
                &ErrorResponse {
                    error: "Invalid credentials".into(),
                    code: Some("INVALID_CREDENTIALS".into()),
                },
            );
        }
        Err(LiaisonError::Auth(e)) => {
            warn!("Password verification error: {}", e);
            return json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorResponse {
                    error: "Authentication error".into(),
                    code: Some("AUTH_ERROR".into()),
                },
            );
        }
        Err(e) => {
            return json_response(
                e.status_code(),
                &ErrorResponse {
                    error: e.to_string(),
                    code: None,
                },
            )
        }
    };

    info!("Login successful: {}", body.username);

    generate_auth_response(&state, &user, StatusCode::OK)
}

/// Resolve a login attempt to the user record
///
/// Unknown usernames and wrong passwords both come back as the same
/// `Unauthorized` error, so a caller cannot probe which usernames exist.
fn check_login(users: &UserStore, username: &str, password: &str) -> Result<User, LiaisonError> {
    let invalid = || LiaisonError::Unauthorized("Invalid credentials".into());

    let user = match users.find_by_username(username) {
        Ok(u) => u,
        Err(e) if e.is_not_found() => return Err(invalid()),
        Err(e) => return Err(e),
    };

    if check_password(password, &user.password_hash)? {
        Ok(user)
    } else {
        Err(invalid())
    }
}

/// POST /auth/logout
///
/// Tokens are stateless, so logout is handled client-side by discarding
/// the token.
async fn handle_logout(
    _req: Request<hyper::body::Incoming>,
    _state: Arc<AppState>,
) -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &SuccessResponse {
            success: true,
            message: "Logged out successfully".into(),
        },
    )
}

/// GET /auth/me
///
/// Get current user info from token.
async fn handle_me(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match authenticate_request(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match state.users.find_by_id(&claims.sub) {
        Ok(user) => json_response(StatusCode::OK, &UserSummary::from(&user)),
        Err(e) if e.is_not_found() => json_response(
            StatusCode::UNAUTHORIZED,
            &ErrorResponse {
                error: "User no longer exists".into(),
                code: None,
            },
        ),
        Err(e) => json_response(
            e.status_code(),
            &ErrorResponse {
                error: e.to_string(),
                code: None,
            },
        ),
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Generate a successful auth response with JWT token
fn generate_auth_response(state: &AppState, user: &User, status: StatusCode) -> Response<BoxBody> {
    let input = TokenInput {
        user_id: user.id.clone(),
        username: user.username.clone(),
    };

    match state.jwt.generate_token(input) {
        Ok(token) => {
            let claims = state.jwt.verify_token(&token);
            let expires_at = claims.claims.map(|c| c.exp).unwrap_or(0);

            json_response(
                status,
                &AuthResponse {
                    token,
                    user: UserSummary::from(user),
                    expires_at,
                },
            )
        }
        Err(e) => json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &ErrorResponse {
                error: format!("Failed to generate token: {}", e),
                code: Some("TOKEN_ERROR".into()),
            },
        ),
    }
}

// =============================================================================
// Main Router
// =============================================================================

/// Handle auth-related HTTP requests.
///
/// Returns Some(response) if request was handled, None if not an auth route.
pub async fn handle_auth_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    // Only handle /auth/* routes
    if !path.starts_with("/auth") {
        return None;
    }

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    // Remove query string for matching
    let path = path.split('?').next().unwrap_or(path);

    let response = match (method, path) {
        (&Method::POST, "/auth/register") => handle_register(req, state).await,
        (&Method::POST, "/auth/login") => handle_login(req, state).await,
        (&Method::POST, "/auth/logout") => handle_logout(req, state).await,
        (&Method::GET, "/auth/me") => handle_me(req, state).await,

        // Method not allowed
        (_, "/auth/register") | (_, "/auth/login") | (_, "/auth/logout") | (_, "/auth/me") => {
            json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                &ErrorResponse {
                    error: "Method not allowed".into(),
                    code: None,
                },
            )
        }

        // Auth endpoint not found
        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "Auth endpoint not found".into(),
                code: None,
            },
        ),
    };

    Some(response)
}
