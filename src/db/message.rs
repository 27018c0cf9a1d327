//! Raw storage for the shared resource value
//!
//! One key in its own tree. Default-value and authorization policy live in
//! the resource service, not here.

use crate::types::{LiaisonError, Result};

const MESSAGE_KEY: &str = "message";

/// Raw store over the resource tree
#[derive(Clone)]
pub struct MessageStore {
    tree: sled::Tree,
}

impl MessageStore {
    pub fn new(tree: sled::Tree) -> Self {
        Self { tree }
    }

    /// Read the stored value, if any
    pub fn get(&self) -> Result<Option<String>> {
        match self.tree.get(MESSAGE_KEY)? {
            Some(value) => String::from_utf8(value.to_vec())
                .map(Some)
                .map_err(|e| LiaisonError::Storage(format!("Invalid stored message: {}", e))),
            None => Ok(None),
        }
    }

    /// Overwrite the stored value (last write wins)
    pub fn set(&self, value: &str) -> Result<()> {
        self.tree.insert(MESSAGE_KEY, value.as_bytes())?;
        Ok(())
    }
}
