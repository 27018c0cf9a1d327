//! Chat command dispatch
//!
//! Turns an inbound slash command into the reply text the chat caller sees.
//! An unlinked caller never gets a bare error: dispatch starts an association
//! for them and explains how to continue. Every other failure surfaces its
//! message text to the caller verbatim.

use std::sync::Arc;

use tracing::warn;

use crate::auth::Credential;
use crate::db::users::{User, UserStore};
use crate::linking::Linker;
use crate::resource::MessageService;

pub const READ_COMMAND: &str = "/read-message";
pub const WRITE_COMMAND: &str = "/write-message";

/// Resolves chat callers and runs their commands
pub struct CommandDispatcher {
    users: UserStore,
    messages: MessageService,
    linker: Arc<Linker>,
}

impl CommandDispatcher {
    pub fn new(users: UserStore, messages: MessageService, linker: Arc<Linker>) -> Self {
        Self {
            users,
            messages,
            linker,
        }
    }

    /// Dispatch a command for a chat caller, always producing reply text
    pub async fn dispatch(&self, chat_id: &str, command: &str, text: &str) -> String {
        match self.users.find_by_chat_id(chat_id) {
            Ok(user) => self.run(&user, command, text),
            Err(e) if e.is_not_found() => self.defer(chat_id, command).await,
            Err(e) => {
                warn!(error = %e, %chat_id, "Caller resolution failed");
                e.to_string()
            }
        }
    }

    fn run(&self, user: &User, command: &str, text: &str) -> String {
        let credential = Credential::user(user.id.as_str());

        let result = match command {
            READ_COMMAND => self
                .messages
                .get_message(&credential)
                .map(|m| format!("The message is: {}", m)),
            WRITE_COMMAND => self
                .messages
                .set_message(text, &credential)
                .map(|m| format!("The message has been set: {}", m)),
            other => return format!("Cannot understand the command: `{}`", other),
        };

        match result {
            Ok(reply) => reply,
            Err(e) => e.to_string(),
        }
    }

    /// Start an association for an unlinked caller and tell them what to do
    async fn defer(&self, chat_id: &str, command: &str) -> String {
        match self.linker.begin(chat_id).await {
            Ok(_) => format!(
                "Sorry <@{}>, you cannot run `{}` until after you authenticate. \
                 I can help you, just check my DM for the next step, and then you \
                 can try the command again.",
                chat_id, command
            ),
            Err(e) => {
                warn!(error = %e, %chat_id, "Could not start association");
                e.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatTransport, MessageAttachment};
    use crate::db::Database;
    use crate::linking::INTRO_TEXT;
    use crate::types::{LiaisonError, Result};
    use async_trait::async_trait;
    use clap::Parser;
    use std::sync::Mutex;

    struct RecordingTransport {
        fail_post: bool,
        posts: Mutex<Vec<(String, String)>>,
    }

    impl RecordingTransport {
        fn new(fail_post: bool) -> Self {
            Self {
                fail_post,
                posts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn open_channel(&self, chat_id: &str) -> Result<String> {
            Ok(format!("D-{}", chat_id))
        }

        async fn post_message(
            &self,
            channel_id: &str,
            text: &str,
            _attachments: &[MessageAttachment],
        ) -> Result<()> {
            if self.fail_post {
                return Err(LiaisonError::Delivery("mock delivery failure".into()));
            }
            self.posts
                .lock()
                .unwrap()
                .push((channel_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        users: UserStore,
        transport: Arc<RecordingTransport>,
        dispatcher: CommandDispatcher,
    }

    fn fixture(fail_post: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();
        let users = db.user_store();
        let messages = MessageService::new(users.clone(), db.message_store());

        let mut args = crate::config::Args::parse_from(["liaison", "--dev-mode"]);
        args.public_url = "http://localhost:8080".into();

        let transport = Arc::new(RecordingTransport::new(fail_post));
        let linker = Arc::new(Linker::new(args, db.link_ledger(), transport.clone()));
        let dispatcher = CommandDispatcher::new(users.clone(), messages, linker);

        Fixture {
            _dir: dir,
            users,
            transport,
            dispatcher,
        }
    }

    fn linked_user(fx: &Fixture, chat_id: &str) -> User {
        let user = fx.users.create("alice", "secret123").unwrap();
        fx.users
            .attach_chat_link(&user.id, chat_id, "D-linked")
            .unwrap()
    }

    #[tokio::test]
    async fn test_linked_caller_reads_default_message() {
        let fx = fixture(false);
        linked_user(&fx, "U123");

        let reply = fx.dispatcher.dispatch("U123", READ_COMMAND, "").await;
        assert_eq!(reply, "The message is: Hello World");
    }

    #[tokio::test]
    async fn test_linked_caller_writes_then_reads() {
        let fx = fixture(false);
        linked_user(&fx, "U123");

        let reply = fx.dispatcher.dispatch("U123", WRITE_COMMAND, "bonjour").await;
        assert_eq!(reply, "The message has been set: bonjour");

        let reply = fx.dispatcher.dispatch("U123", READ_COMMAND, "").await;
        assert_eq!(reply, "The message is: bonjour");
    }

    #[tokio::test]
    async fn test_unknown_command_for_linked_caller() {
        let fx = fixture(false);
        linked_user(&fx, "U123");

        let reply = fx.dispatcher.dispatch("U123", "/destroy", "").await;
        assert_eq!(reply, "Cannot understand the command: `/destroy`");
    }

    #[tokio::test]
    async fn test_unlinked_caller_gets_deferred_instruction() {
        let fx = fixture(false);

        let reply = fx.dispatcher.dispatch("U999", READ_COMMAND, "").await;
        assert!(reply.starts_with("Sorry <@U999>, you cannot run `/read-message`"));

        let posts = fx.transport.posts.lock().unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, "D-U999");
        assert_eq!(posts[0].1, INTRO_TEXT);
    }

    #[tokio::test]
    async fn test_unlinked_caller_sees_delivery_failure_text() {
        let fx = fixture(true);

        let reply = fx.dispatcher.dispatch("U999", READ_COMMAND, "").await;
        assert!(reply.contains("Delivery failure"));
    }
}
