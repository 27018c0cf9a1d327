//! Configuration for Liaison
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Liaison - identity-linking gateway
///
/// Binds chat-platform identities to web accounts through single-use link
/// tokens and gates a shared message behind capability checks.
#[derive(Parser, Debug, Clone)]
#[command(name = "liaison")]
#[command(about = "Identity-linking gateway for chat and web callers")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Directory for the sled database
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Public base URL of this instance, embedded in association links
    /// sent over chat (e.g. "https://liaison.example.com")
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:8080")]
    pub public_url: String,

    /// Enable development mode (permits missing secrets, dev JWT fallback)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Base URL of the Slack-compatible Web API
    #[arg(long, env = "SLACK_API_URL", default_value = "https://slack.com/api")]
    pub slack_api_url: String,

    /// Bot token for outbound chat API calls (required in production)
    #[arg(long, env = "SLACK_BOT_TOKEN")]
    pub slack_bot_token: Option<String>,

    /// Verification token expected on inbound slash-command webhooks
    /// (required in production)
    #[arg(long, env = "SLACK_VERIFICATION_TOKEN")]
    pub slack_verification_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Outbound HTTP request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,
}

impl Args {
    /// URL a user follows to complete an association, with the token appended
    pub fn association_url(&self, token: &str) -> String {
        format!(
            "{}/link?token={}",
            self.public_url.trim_end_matches('/'),
            token
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            if self.jwt_secret.is_none() {
                return Err("JWT_SECRET is required in production mode".to_string());
            }
            if self.slack_bot_token.is_none() {
                return Err("SLACK_BOT_TOKEN is required in production mode".to_string());
            }
            if self.slack_verification_token.is_none() {
                return Err(
                    "SLACK_VERIFICATION_TOKEN is required in production mode".to_string()
                );
            }
        }

        if let Some(ref secret) = self.jwt_secret {
            if secret.len() < 32 {
                return Err("JWT_SECRET must be at least 32 characters".to_string());
            }
        }

        if self.public_url.is_empty() {
            return Err("PUBLIC_URL must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["liaison", "--dev-mode"])
    }

    #[test]
    fn test_dev_mode_permits_missing_secrets() {
        let args = base_args();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_production_requires_secrets() {
        let mut args = base_args();
        args.dev_mode = false;
        args.jwt_secret = None;
        let err = args.validate().unwrap_err();
        assert!(err.contains("JWT_SECRET"));
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        let args = Args::parse_from(["liaison", "--dev-mode", "--jwt-secret", "short"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_association_url_trims_trailing_slash() {
        let mut args = base_args();
        args.public_url = "http://localhost:8080/".into();
        assert_eq!(
            args.association_url("abc123"),
            "http://localhost:8080/link?token=abc123"
        );
    }
}
