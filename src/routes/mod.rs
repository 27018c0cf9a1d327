//! HTTP routes for Liaison

pub mod auth_routes;
pub mod commands;
pub mod health;
pub mod link;
pub mod message;

pub use auth_routes::handle_auth_request;
pub use commands::handle_command_request;
pub use health::{health_check, version_info};
pub use link::handle_link_request;
pub use message::handle_message_request;
