//! Association ledger
//!
//! Pending-link records keyed by single-use token. `take` is the only read
//! path and deletes the record in the same per-key operation, so a token can
//! never be redeemed twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LiaisonError, Result};

/// A link waiting to be completed by an authenticated web user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLink {
    pub chat_id: String,
    pub channel_id: String,
    pub created_at: DateTime<Utc>,
}

/// Association ledger backed by a sled tree
#[derive(Clone)]
pub struct LinkLedger {
    tree: sled::Tree,
}

impl LinkLedger {
    pub fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    /// Record a pending link under its token
    pub fn put(&self, token: &str, chat_id: &str, channel_id: &str) -> Result<()> {
        let link = PendingLink {
            chat_id: chat_id.to_string(),
            channel_id: channel_id.to_string(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_vec(&link)
            .map_err(|e| LiaisonError::Storage(format!("Serialization error: {}", e)))?;
        self.tree.insert(token.as_bytes(), value)?;
        Ok(())
    }

    /// Consume a pending link
    ///
    /// `remove` returns the prior value, making the read and the delete one
    /// atomic per-key operation: of two concurrent takers of the same token,
    /// at most one sees the record.
    pub fn take(&self, token: &str) -> Result<PendingLink> {
        match self.tree.remove(token.as_bytes())? {
            Some(value) => serde_json::from_slice(&value)
                .map_err(|e| LiaisonError::Storage(format!("Deserialization error: {}", e))),
            None => Err(LiaisonError::InvalidToken(
                "The user association link was not valid.".into(),
            )),
        }
    }
}
