//! Link-token lifecycle
//!
//! `Linker` starts an association from the chat side: it mints a single-use
//! token, records the pending link, and invites the user over DM to
//! authenticate. `Completer` finishes it from the web side: it consumes the
//! token, binds the chat identity to the authenticated user, and confirms
//! over DM. The token travels only through the chat channel, so redeeming it
//! proves control of both identities.

use std::sync::Arc;

use rand::{rngs::OsRng, RngCore};
use tracing::{info, warn};

use crate::chat::{ChatTransport, MessageAttachment};
use crate::config::Args;
use crate::db::links::LinkLedger;
use crate::db::users::{User, UserStore};
use crate::types::{LiaisonError, Result};

/// Opening line of the DM invitation
pub const INTRO_TEXT: &str = "Hello, new friend! I think it's time we introduce ourselves. \
     I'm a bot that helps you access your internal protected resources.";

/// Confirmation sent after the association completes
pub const THANKS_TEXT: &str =
    "Well, it's nice to meet you! Thanks for completing authentication.";

/// Mint a single-use association token (32 random bytes, hex-encoded)
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Starts associations from the chat side
pub struct Linker {
    args: Args,
    ledger: LinkLedger,
    transport: Arc<dyn ChatTransport>,
}

impl Linker {
    pub fn new(args: Args, ledger: LinkLedger, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            args,
            ledger,
            transport,
        }
    }

    /// Begin an association for a chat user
    ///
    /// Opens a DM channel, then records the pending link and delivers the
    /// invitation. Both must succeed for the call to succeed; a stale record
    /// left by a failed delivery is unreachable without its token.
    pub async fn begin(&self, chat_id: &str) -> Result<String> {
        let token = generate_token();
        let channel_id = self.transport.open_channel(chat_id).await?;

        let attachments = [MessageAttachment::new(format!(
            "<{}|Click here> to introduce yourself to me by authenticating.",
            self.args.association_url(&token)
        ))];

        tokio::try_join!(
            async { self.ledger.put(&token, chat_id, &channel_id) },
            self.transport
                .post_message(&channel_id, INTRO_TEXT, &attachments),
        )?;

        info!(%chat_id, %channel_id, "Association started");
        Ok(token)
    }
}

/// Completes associations from the web side
pub struct Completer {
    users: UserStore,
    ledger: LinkLedger,
    transport: Arc<dyn ChatTransport>,
}

impl Completer {
    pub fn new(users: UserStore, ledger: LinkLedger, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            users,
            ledger,
            transport,
        }
    }

    /// Complete an association for an authenticated user
    ///
    /// Consumes the token before touching the user record, so a token can
    /// redeem at most once no matter how the rest of the call goes. A chat
    /// identity binds to at most one account: if another account already
    /// holds it, the call fails and that binding stands. Once the link is
    /// durably attached the association has succeeded; the DM confirmation
    /// is best-effort.
    pub async fn complete(&self, user_id: &str, token: &str) -> Result<User> {
        let link = self.ledger.take(token)?;

        match self.users.find_by_chat_id(&link.chat_id) {
            // Same account redeeming a second invitation: re-attach is fine
            Ok(owner) if owner.id == user_id => {}
            Ok(_) => {
                return Err(LiaisonError::AlreadyLinked(
                    "That Slack user is already associated with another user account.".into(),
                ))
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let user = self
            .users
            .attach_chat_link(user_id, &link.chat_id, &link.channel_id)?;

        if let Err(e) = self
            .transport
            .post_message(&link.channel_id, THANKS_TEXT, &[])
            .await
        {
            warn!(error = %e, channel_id = %link.channel_id, "Confirmation delivery failed");
        }

        info!(user_id = %user.id, chat_id = %link.chat_id, "Association completed");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::types::LiaisonError;
    use async_trait::async_trait;
    use clap::Parser;
    use std::sync::Mutex;

    struct MockTransport {
        fail_post: bool,
        posts: Mutex<Vec<(String, String, Vec<MessageAttachment>)>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                fail_post: false,
                posts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail_post: true,
                posts: Mutex::new(Vec::new()),
            }
        }

        fn posts(&self) -> Vec<(String, String, Vec<MessageAttachment>)> {
            self.posts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for MockTransport {
        async fn open_channel(&self, chat_id: &str) -> Result<String> {
            Ok(format!("D-{}", chat_id))
        }

        async fn post_message(
            &self,
            channel_id: &str,
            text: &str,
            attachments: &[MessageAttachment],
        ) -> Result<()> {
            if self.fail_post {
                return Err(LiaisonError::Delivery("mock delivery failure".into()));
            }
            self.posts.lock().unwrap().push((
                channel_id.to_string(),
                text.to_string(),
                attachments.to_vec(),
            ));
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        users: UserStore,
        ledger: LinkLedger,
        transport: Arc<MockTransport>,
        linker: Linker,
        completer: Completer,
    }

    fn fixture(transport: MockTransport) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let users = db.user_store();
        let ledger = db.link_ledger();

        let mut args = Args::parse_from(["liaison", "--dev-mode"]);
        args.public_url = "http://localhost:8080".into();

        let transport = Arc::new(transport);
        let linker = Linker::new(args, ledger.clone(), transport.clone());
        let completer = Completer::new(users.clone(), ledger.clone(), transport.clone());

        Fixture {
            _dir: dir,
            users,
            ledger,
            transport,
            linker,
            completer,
        }
    }

    #[test]
    fn test_generate_token_shape() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_begin_records_link_and_sends_invitation() {
        let fx = fixture(MockTransport::new());

        let token = fx.linker.begin("U123").await.unwrap();
        assert_eq!(token.len(), 64);

        let posts = fx.transport.posts();
        assert_eq!(posts.len(), 1);
        let (channel, text, attachments) = &posts[0];
        assert_eq!(channel, "D-U123");
        assert_eq!(text, INTRO_TEXT);
        assert_eq!(attachments.len(), 1);
        assert!(attachments[0].text.contains(&token));
        assert!(attachments[0].text.contains("Click here"));

        let link = fx.ledger.take(&token).unwrap();
        assert_eq!(link.chat_id, "U123");
        assert_eq!(link.channel_id, "D-U123");
    }

    #[tokio::test]
    async fn test_begin_fails_when_delivery_fails() {
        let fx = fixture(MockTransport::failing());

        let err = fx.linker.begin("U123").await.unwrap_err();
        assert!(matches!(err, LiaisonError::Delivery(_)));
    }

    #[tokio::test]
    async fn test_complete_binds_user_and_confirms() {
        let fx = fixture(MockTransport::new());

        let user = fx.users.create("alice", "secret123").unwrap();
        let token = fx.linker.begin("U123").await.unwrap();

        let linked = fx.completer.complete(&user.id, &token).await.unwrap();
        let link = linked.chat_link.unwrap();
        assert_eq!(link.chat_id, "U123");
        assert_eq!(link.channel_id, "D-U123");

        let found = fx.users.find_by_chat_id("U123").unwrap();
        assert_eq!(found.id, user.id);

        let posts = fx.transport.posts();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[1].1, THANKS_TEXT);
    }

    #[tokio::test]
    async fn test_complete_rejects_reused_token() {
        let fx = fixture(MockTransport::new());

        let user = fx.users.create("alice", "secret123").unwrap();
        let token = fx.linker.begin("U123").await.unwrap();
        fx.completer.complete(&user.id, &token).await.unwrap();

        let err = fx.completer.complete(&user.id, &token).await.unwrap_err();
        assert!(matches!(err, LiaisonError::InvalidToken(_)));

        let unchanged = fx.users.find_by_id(&user.id).unwrap();
        assert_eq!(unchanged.chat_link.unwrap().chat_id, "U123");
    }

    #[tokio::test]
    async fn test_complete_rejects_chat_id_owned_by_another_account() {
        let fx = fixture(MockTransport::new());

        let ana = fx.users.create("ana", "secret123").unwrap();
        let ben = fx.users.create("ben", "secret123").unwrap();

        // Two pending invitations for the same chat user, oldest redeemed first
        let first = fx.linker.begin("U123").await.unwrap();
        let second = fx.linker.begin("U123").await.unwrap();

        fx.completer.complete(&ana.id, &first).await.unwrap();
        let err = fx.completer.complete(&ben.id, &second).await.unwrap_err();
        assert!(matches!(err, LiaisonError::AlreadyLinked(_)));

        // The original binding stands; the loser stays unlinked
        assert_eq!(fx.users.find_by_chat_id("U123").unwrap().id, ana.id);
        assert!(fx.users.find_by_id(&ben.id).unwrap().chat_link.is_none());
    }

    #[tokio::test]
    async fn test_complete_allows_same_account_to_redeem_again() {
        let fx = fixture(MockTransport::new());

        let ana = fx.users.create("ana", "secret123").unwrap();
        let first = fx.linker.begin("U123").await.unwrap();
        let second = fx.linker.begin("U123").await.unwrap();

        fx.completer.complete(&ana.id, &first).await.unwrap();
        let relinked = fx.completer.complete(&ana.id, &second).await.unwrap();
        assert_eq!(relinked.chat_link.unwrap().chat_id, "U123");
    }

    #[tokio::test]
    async fn test_complete_consumes_token_even_when_user_is_unknown() {
        let fx = fixture(MockTransport::new());

        let token = fx.linker.begin("U123").await.unwrap();
        let err = fx.completer.complete("no-such-id", &token).await.unwrap_err();
        assert!(err.is_not_found());

        let err = fx.completer.complete("no-such-id", &token).await.unwrap_err();
        assert!(matches!(err, LiaisonError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_complete_succeeds_when_confirmation_delivery_fails() {
        let fx = fixture(MockTransport::new());
        let user = fx.users.create("alice", "secret123").unwrap();
        let token = fx.linker.begin("U123").await.unwrap();

        let failing = Arc::new(MockTransport::failing());
        let completer = Completer::new(fx.users.clone(), fx.ledger.clone(), failing);

        let linked = completer.complete(&user.id, &token).await.unwrap();
        assert_eq!(linked.chat_link.unwrap().chat_id, "U123");
    }
}
