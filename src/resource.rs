//! The shared resource: one mutable text value behind the capability gate
//!
//! The value is installed with a default on first authorized read. Every
//! operation authorizes first and only then acts; a denial is reported as
//! `NotAuthorized`, distinct from storage errors.

use tracing::debug;

use crate::auth::{authorize, Credential};
use crate::db::{MessageStore, UserStore};
use crate::types::{LiaisonError, Result};

/// Value installed on first access
pub const DEFAULT_MESSAGE: &str = "Hello World";

/// Gated access to the shared message
#[derive(Clone)]
pub struct MessageService {
    users: UserStore,
    store: MessageStore,
}

impl MessageService {
    pub fn new(users: UserStore, store: MessageStore) -> Self {
        Self { users, store }
    }

    /// Read the message, installing the default if no value is stored yet
    pub fn get_message(&self, credential: &Credential) -> Result<String> {
        self.check(credential)?;

        match self.store.get()? {
            Some(value) => Ok(value),
            None => {
                debug!("Message unset, installing default");
                self.store.set(DEFAULT_MESSAGE)?;
                Ok(DEFAULT_MESSAGE.to_string())
            }
        }
    }

    /// Overwrite the message (last write wins), returning the stored value
    pub fn set_message(&self, value: &str, credential: &Credential) -> Result<String> {
        self.check(credential)?;

        self.store.set(value)?;
        Ok(value.to_string())
    }

    fn check(&self, credential: &Credential) -> Result<()> {
        if authorize(&self.users, credential)? {
            Ok(())
        } else {
            Err(LiaisonError::NotAuthorized("Not Authorized".into()))
        }
    }
}
