use sqlite_mcp_protocol::JsonRpcResponse;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    UnknownSession(Uuid),
    Closed(Uuid),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownSession(id) => write!(f, "unknown session: {id}"),
            Self::Closed(id) => write!(f, "session closed: {id}"),
        }
    }
}
impl std::error::Error for SessionError {}

/// Live SSE sessions. Each session owns a bounded channel; the stream side
/// drains it, the `POST /messages/` side feeds it.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, mpsc::Sender<JsonRpcResponse>>>,
    buffer: usize,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            buffer,
        })
    }

    pub async fn register(&self) -> (Uuid, mpsc::Receiver<JsonRpcResponse>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.buffer);
        self.sessions.lock().await.insert(id, tx);
        (id, rx)
    }

    pub async fn contains(&self, id: &Uuid) -> bool {
        self.sessions.lock().await.contains_key(id)
    }

    /// Returns true when the session was still registered.
    pub async fn remove(&self, id: &Uuid) -> bool {
        self.sessions.lock().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Drop every session sender, ending the attached SSE streams. Used by
    /// shutdown so graceful drain is not held open by long-lived streams.
    pub async fn close_all(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();
        sessions.clear();
        count
    }

    /// Queue a response on the session's stream. A send to a closed channel
    /// deregisters the session.
    pub async fn deliver(&self, id: &Uuid, response: JsonRpcResponse) -> Result<(), SessionError> {
        let tx = {
            let sessions = self.sessions.lock().await;
            sessions
                .get(id)
                .cloned()
                .ok_or(SessionError::UnknownSession(*id))?
        };
        if tx.send(response).await.is_err() {
            self.sessions.lock().await.remove(id);
            return Err(SessionError::Closed(*id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlite_mcp_protocol::{JsonRpcResponse, RequestId};

    fn response(id: i64) -> JsonRpcResponse {
        JsonRpcResponse::result(RequestId::Number(id), serde_json::json!({"ok": true}))
    }

    #[tokio::test]
    async fn register_deliver_receive_roundtrip() {
        let registry = SessionRegistry::new(8);
        let (id, mut rx) = registry.register().await;
        assert!(registry.contains(&id).await);

        registry.deliver(&id, response(1)).await.expect("deliver");
        let received = rx.recv().await.expect("receive");
        assert_eq!(received.id, RequestId::Number(1));
    }

    #[tokio::test]
    async fn deliver_to_unknown_session_fails() {
        let registry = SessionRegistry::new(8);
        let id = Uuid::new_v4();
        assert_eq!(
            registry.deliver(&id, response(1)).await,
            Err(SessionError::UnknownSession(id))
        );
    }

    #[tokio::test]
    async fn deliver_after_receiver_drop_deregisters() {
        let registry = SessionRegistry::new(8);
        let (id, rx) = registry.register().await;
        drop(rx);
        assert_eq!(
            registry.deliver(&id, response(1)).await,
            Err(SessionError::Closed(id))
        );
        assert!(!registry.contains(&id).await);
    }

    #[tokio::test]
    async fn remove_reports_whether_the_session_existed() {
        let registry = SessionRegistry::new(8);
        let (id, _rx) = registry.register().await;
        assert!(registry.remove(&id).await);
        assert!(!registry.remove(&id).await);
        assert!(registry.is_empty().await);
    }
}
