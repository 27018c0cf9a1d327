//! Liaison - identity-linking gateway for chat workspaces
//!
//! Liaison binds chat identities (Slack users) to local web accounts through
//! single-use association tokens delivered out-of-band over DM, then gates a
//! shared protected resource behind that binding.
//!
//! ## Services
//!
//! - **Auth**: username/password accounts with Argon2 hashing and JWT sessions
//! - **Linking**: single-use token issuance and chat-to-account association
//! - **Dispatch**: slash-command handling with deferred webhook responses
//! - **Resource**: capability-gated shared message storage

pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod linking;
pub mod resource;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{LiaisonError, Result};
