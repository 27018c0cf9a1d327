//! Authorization gate for the shared resource
//!
//! Stateless predicate over the caller's credential. Every resource
//! operation is a two-step pipeline: authorize, then act; the act step only
//! runs when the gate resolves true.

use crate::db::UserStore;
use crate::types::Result;

/// Token of authority presented to the gate
#[derive(Debug, Clone)]
pub enum Credential {
    /// Process-internal capability, always authorized
    SelfCap,
    /// A caller resolved to a user id; authorized only while the record
    /// still exists (deletion revokes access)
    User(String),
}

impl Credential {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }
}

/// Decide whether a credential may touch the resource
///
/// A `NotFound` on the user lookup collapses to `false`; any other lookup
/// failure propagates to the caller.
pub fn authorize(users: &UserStore, credential: &Credential) -> Result<bool> {
    match credential {
        Credential::SelfCap => Ok(true),
        Credential::User(id) => match users.find_by_id(id) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn test_users() -> (tempfile::TempDir, UserStore) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let users = db.user_store();
        (dir, users)
    }

    #[test]
    fn test_self_capability_always_authorized() {
        let (_dir, users) = test_users();
        assert!(authorize(&users, &Credential::SelfCap).unwrap());
    }

    #[test]
    fn test_user_authorized_iff_record_exists() {
        let (_dir, users) = test_users();
        let user = users.create("alice", "secret123").unwrap();

        assert!(authorize(&users, &Credential::user(user.id)).unwrap());
        assert!(!authorize(&users, &Credential::user("unknown-id")).unwrap());
    }
}
