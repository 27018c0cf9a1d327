//! HTTP server
//!
//! hyper 1.x http1 server with manual routing. Shared state travels as
//! `Arc<AppState>` through `service_fn` into the route handlers. Prefix
//! routers consume the request when the path is theirs; everything else
//! falls through to the probe endpoints and a JSON 404.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::JwtValidator;
use crate::chat::ChatTransport;
use crate::config::Args;
use crate::db::users::UserStore;
use crate::db::Database;
use crate::dispatch::CommandDispatcher;
use crate::linking::{Completer, Linker};
use crate::resource::MessageService;
use crate::routes;
use crate::types::LiaisonError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Embedded database handle
    pub db: Database,
    /// Identity store
    pub users: UserStore,
    /// Authorization-gated access to the shared message
    pub messages: MessageService,
    /// Web-side association completion
    pub completer: Arc<Completer>,
    /// Chat-side command dispatch (owns the Linker)
    pub dispatcher: Arc<CommandDispatcher>,
    /// Token issue and verification
    pub jwt: JwtValidator,
    /// Client for deferred webhook replies
    pub webhook_client: reqwest::Client,
}

impl AppState {
    /// Wire stores and services over an open database and a chat transport
    pub fn new(
        args: Args,
        db: Database,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self, LiaisonError> {
        let users = db.user_store();
        let ledger = db.link_ledger();
        let messages = MessageService::new(users.clone(), db.message_store());

        let linker = Arc::new(Linker::new(args.clone(), ledger.clone(), transport.clone()));
        let completer = Arc::new(Completer::new(users.clone(), ledger, transport));
        let dispatcher = Arc::new(CommandDispatcher::new(
            users.clone(),
            messages.clone(),
            linker,
        ));

        // validate() guarantees a secret outside dev mode
        let jwt = match &args.jwt_secret {
            Some(secret) => JwtValidator::new(secret.clone(), args.jwt_expiry_seconds)?,
            None => JwtValidator::new_dev(),
        };

        let webhook_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(args.request_timeout_ms))
            .user_agent("liaison/1.0")
            .build()
            .unwrap_or_default();

        Ok(Self {
            args,
            db,
            users,
            messages,
            completer,
            dispatcher,
            jwt,
            webhook_client,
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), LiaisonError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Liaison listening on {} as node {}",
        state.args.listen, state.args.node_id
    );

    if state.args.dev_mode {
        warn!("Development mode enabled - dev JWT secret and unchecked webhooks permitted");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    // Auth routes handle their own CORS preflight
    if path.starts_with("/auth") {
        if let Some(response) = routes::handle_auth_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    // CORS preflight for everything else
    if method == Method::OPTIONS {
        return Ok(to_boxed(preflight_response()));
    }

    if path == "/api/v1/message" {
        if let Some(response) = routes::handle_message_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    if path == "/link" || path == "/api/v1/link/complete" {
        if let Some(response) = routes::handle_link_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    if path == "/commands" {
        if let Some(response) = routes::handle_command_request(req, Arc::clone(&state)).await {
            return Ok(response);
        }
        return Ok(to_boxed(not_found_response(&path)));
    }

    let response = match (method, path.as_str()) {
        // Liveness probe
        (Method::GET, "/health") | (Method::GET, "/healthz") => {
            to_boxed(routes::health_check(Arc::clone(&state)))
        }

        // Version info for deployment verification
        (Method::GET, "/version") => to_boxed(routes::version_info()),

        _ => to_boxed(not_found_response(&path)),
    };

    Ok(response)
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "error": "Not Found",
        "path": path,
    });

    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}
