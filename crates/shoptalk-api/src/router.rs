use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;
use tracing::{debug, error, warn};

use shoptalk_db::Database;
use shoptalk_gateway::ConnectionRegistry;
use shoptalk_intelligence::IntelligenceGateway;
use shoptalk_types::models::{Message, Participant};

/// Errors from the message write path. Validation failures are the caller's
/// to fix and write nothing; storage failures abort the operation.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// The single write path for messages. Every message, direct or assistant,
/// is persisted before anything else happens; live delivery is attempted
/// afterwards and is allowed to miss.
#[derive(Clone)]
pub struct MessageRouter {
    store: Arc<Database>,
    registry: ConnectionRegistry,
    intelligence: Arc<IntelligenceGateway>,
}

impl MessageRouter {
    pub fn new(
        store: Arc<Database>,
        registry: ConnectionRegistry,
        intelligence: Arc<IntelligenceGateway>,
    ) -> Self {
        Self {
            store,
            registry,
            intelligence,
        }
    }

    /// Validate, persist, then best-effort push to the recipient's live
    /// channel. The returned message is the stored row either way.
    pub async fn send_direct(
        &self,
        from_id: i64,
        to_id: i64,
        content: &str,
    ) -> Result<Message, RouterError> {
        let from = Participant::from_id(from_id)
            .ok_or_else(|| RouterError::Validation(format!("invalid sender id {}", from_id)))?;
        let to = Participant::from_id(to_id)
            .ok_or_else(|| RouterError::Validation(format!("invalid recipient id {}", to_id)))?;
        if from == to {
            return Err(RouterError::Validation(
                "sender and recipient must differ".to_string(),
            ));
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(RouterError::Validation(
                "message content must not be empty".to_string(),
            ));
        }

        let store = self.store.clone();
        let body = content.to_string();
        let message =
            tokio::task::spawn_blocking(move || store.create_message(from, to, &body))
                .await
                .map_err(join_error)??;

        // Best-effort live push; the row above is the source of truth.
        if let Participant::Human(recipient) = message.to_id {
            match serde_json::to_string(&message) {
                Ok(frame) => {
                    if !self.registry.deliver(recipient, frame) {
                        debug!(
                            "User {} has no live channel, message {} stored only",
                            recipient, message.id
                        );
                    }
                }
                Err(e) => warn!("Failed to encode message {} for live push: {}", message.id, e),
            }
        }

        Ok(message)
    }

    /// One assistant exchange: persist the user's turn, build the reply from
    /// the stored conversation, persist the reply, return both in order.
    /// Reply generation degrades inside the intelligence layer, so a model
    /// outage still produces a well-formed pair.
    pub async fn run_assistant_turn(
        &self,
        user_id: i64,
        content: &str,
    ) -> Result<(Message, Message), RouterError> {
        let user = Participant::from_id(user_id)
            .filter(|p| !p.is_assistant())
            .ok_or_else(|| RouterError::Validation(format!("invalid user id {}", user_id)))?;

        let content = content.trim();
        if content.is_empty() {
            return Err(RouterError::Validation(
                "message content must not be empty".to_string(),
            ));
        }

        // Persist first so the reply context includes this turn.
        let store = self.store.clone();
        let body = content.to_string();
        let user_message = tokio::task::spawn_blocking(move || {
            store.create_message(user, Participant::Assistant, &body)
        })
        .await
        .map_err(join_error)??;

        let store = self.store.clone();
        let history =
            tokio::task::spawn_blocking(move || store.get_messages(user, Participant::Assistant))
                .await
                .map_err(join_error)??;

        let reply = self.intelligence.generate_reply(&history).await;

        let store = self.store.clone();
        let assistant_message = tokio::task::spawn_blocking(move || {
            store.create_message(Participant::Assistant, user, &reply)
        })
        .await
        .map_err(join_error)??;

        Ok((user_message, assistant_message))
    }
}

fn join_error(e: JoinError) -> RouterError {
    error!("blocking task join error: {}", e);
    RouterError::Storage(anyhow::anyhow!("blocking task failed: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shoptalk_intelligence::FALLBACK_REPLY;
    use shoptalk_intelligence::provider::{CompletionRequest, Provider, ProviderError};
    use std::sync::Mutex;

    struct Scripted {
        body: String,
        seen: Arc<Mutex<Vec<CompletionRequest>>>,
    }

    impl Scripted {
        fn fixed(body: &str) -> Self {
            Self {
                body: body.to_string(),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
            self.seen.lock().unwrap().push(request);
            Ok(self.body.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl Provider for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<String, ProviderError> {
            Err(ProviderError::Api {
                status: 500,
                body: "upstream down".to_string(),
            })
        }
    }

    fn test_router(
        provider: Box<dyn Provider>,
    ) -> (MessageRouter, Arc<Database>, ConnectionRegistry) {
        let store = Arc::new(Database::open_in_memory().unwrap());
        let registry = ConnectionRegistry::new();
        let router = MessageRouter::new(
            store.clone(),
            registry.clone(),
            Arc::new(IntelligenceGateway::new(provider)),
        );
        (router, store, registry)
    }

    fn human(id: i64) -> Participant {
        Participant::from_id(id).unwrap()
    }

    #[tokio::test]
    async fn direct_send_persists_and_returns() {
        let (router, store, _registry) = test_router(Box::new(Scripted::fixed("unused")));

        let first = router.send_direct(10, 11, "hello").await.unwrap();
        let second = router.send_direct(11, 10, "hi back").await.unwrap();

        assert!(second.id > first.id);
        assert!(!first.is_ai_assistant);

        let thread = store.get_messages(human(10), human(11)).unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].content, "hello");
    }

    #[tokio::test]
    async fn rejects_invalid_sends_without_writing() {
        let (router, store, _registry) = test_router(Box::new(Scripted::fixed("unused")));

        let blank = router.send_direct(10, 11, "   ").await;
        assert!(matches!(blank, Err(RouterError::Validation(_))));

        let self_send = router.send_direct(10, 10, "hi me").await;
        assert!(matches!(self_send, Err(RouterError::Validation(_))));

        let negative = router.send_direct(-3, 11, "hi").await;
        assert!(matches!(negative, Err(RouterError::Validation(_))));

        let thread = store.get_messages(human(10), human(11)).unwrap();
        assert!(thread.is_empty());
    }

    #[tokio::test]
    async fn live_recipient_gets_the_stored_frame() {
        let (router, _store, registry) = test_router(Box::new(Scripted::fixed("unused")));
        let (_conn, mut rx) = registry.register(11);

        let message = router.send_direct(10, 11, "ping").await.unwrap();

        let frame = rx.try_recv().unwrap();
        assert_eq!(frame, serde_json::to_string(&message).unwrap());
    }

    #[tokio::test]
    async fn offline_recipient_still_succeeds() {
        let (router, _store, _registry) = test_router(Box::new(Scripted::fixed("unused")));

        let message = router.send_direct(10, 11, "ping").await.unwrap();
        assert_eq!(message.content, "ping");
    }

    #[tokio::test]
    async fn sender_channel_gets_nothing() {
        let (router, _store, registry) = test_router(Box::new(Scripted::fixed("unused")));
        let (_conn, mut sender_rx) = registry.register(10);

        router.send_direct(10, 11, "ping").await.unwrap();

        assert!(sender_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn assistant_turn_returns_persisted_pair() {
        let (router, _store, _registry) = test_router(Box::new(Scripted::fixed(
            "Let me assist you. Check the hinges.",
        )));

        let (user_msg, reply) = router
            .run_assistant_turn(42, "My door squeaks")
            .await
            .unwrap();

        assert!(user_msg.id < reply.id);
        assert!(!user_msg.is_ai_assistant);
        assert!(reply.is_ai_assistant);
        assert_eq!(user_msg.from_id, human(42));
        assert_eq!(user_msg.to_id, Participant::Assistant);
        assert_eq!(reply.from_id, Participant::Assistant);
        assert_eq!(reply.to_id, human(42));
        assert_eq!(reply.content, "Let me assist you. Check the hinges.");
    }

    #[tokio::test]
    async fn assistant_outage_persists_apology() {
        let (router, store, _registry) = test_router(Box::new(Failing));

        let (_user_msg, reply) = router.run_assistant_turn(42, "Anyone there?").await.unwrap();
        assert_eq!(reply.content, FALLBACK_REPLY);

        let thread = store.get_messages(human(42), Participant::Assistant).unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[1].content, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn assistant_context_includes_current_turn() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let provider = Scripted {
            body: "Done.".to_string(),
            seen: seen.clone(),
        };
        let (router, _store, _registry) = test_router(Box::new(provider));

        router.run_assistant_turn(42, "First question").await.unwrap();

        let requests = seen.lock().unwrap();
        let turns = &requests[0].turns;
        assert_eq!(turns.last().unwrap().content, "First question");
    }

    #[tokio::test]
    async fn assistant_history_grows_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let provider = Scripted {
            body: "Reply.".to_string(),
            seen: seen.clone(),
        };
        let (router, _store, _registry) = test_router(Box::new(provider));

        router.run_assistant_turn(42, "q1").await.unwrap();
        router.run_assistant_turn(42, "q2").await.unwrap();

        let requests = seen.lock().unwrap();
        let contents: Vec<&str> = requests[1]
            .turns
            .iter()
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(contents, vec!["q1", "Reply.", "q2"]);
    }

    #[tokio::test]
    async fn assistant_turn_rejects_reserved_id() {
        let (router, _store, _registry) = test_router(Box::new(Scripted::fixed("unused")));

        assert!(matches!(
            router.run_assistant_turn(0, "hi").await,
            Err(RouterError::Validation(_))
        ));
        assert!(matches!(
            router.run_assistant_turn(-1, "hi").await,
            Err(RouterError::Validation(_))
        ));
    }
}
