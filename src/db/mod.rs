//! Durable storage for Liaison
//!
//! One sled database holding three independent trees:
//! - `users`: identity records keyed by user id
//! - `links`: pending-link ledger entries keyed by token
//! - `resource`: the single shared value
//!
//! Username and chat-id lookups are realized as scans over the users tree;
//! no secondary index structures are maintained.

pub mod links;
pub mod message;
pub mod users;

pub use links::{LinkLedger, PendingLink};
pub use message::MessageStore;
pub use users::{ChatLink, User, UserStore};

use std::path::Path;
use tracing::info;

use crate::types::Result;

const USERS_TREE: &str = "users";
const LINKS_TREE: &str = "links";
const RESOURCE_TREE: &str = "resource";

/// Handle to the sled database and its named trees
#[derive(Clone)]
pub struct Database {
    db: sled::Db,
    users: sled::Tree,
    links: sled::Tree,
    resource: sled::Tree,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::Config::new().path(path.as_ref()).open()?;

        let users = db.open_tree(USERS_TREE)?;
        let links = db.open_tree(LINKS_TREE)?;
        let resource = db.open_tree(RESOURCE_TREE)?;

        info!(path = %path.as_ref().display(), "Database opened");

        Ok(Self {
            db,
            users,
            links,
            resource,
        })
    }

    /// Identity store over the users tree
    pub fn user_store(&self) -> UserStore {
        UserStore::new(self.users.clone())
    }

    /// Association ledger over the links tree
    pub fn link_ledger(&self) -> LinkLedger {
        LinkLedger::new(self.links.clone())
    }

    /// Raw store over the resource tree
    pub fn message_store(&self) -> MessageStore {
        MessageStore::new(self.resource.clone())
    }

    /// On-disk size in bytes, for health reporting
    pub fn size_on_disk(&self) -> Result<u64> {
        Ok(self.db.size_on_disk()?)
    }

    /// Flush all trees to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
