use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::session::{Session, UserId};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, user: UserId) -> Result<Option<Session>>;
    async fn put(&self, user: UserId, session: Session) -> Result<()>;
    /// Returns whether a session existed.
    async fn delete(&self, user: UserId) -> Result<bool>;
}

/// Process-local store; sessions are lost on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<UserId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user: UserId) -> Result<Option<Session>> {
        Ok(self.sessions.read().await.get(&user).cloned())
    }

    async fn put(&self, user: UserId, session: Session) -> Result<()> {
        self.sessions.write().await.insert(user, session);
        Ok(())
    }

    async fn delete(&self, user: UserId) -> Result<bool> {
        Ok(self.sessions.write().await.remove(&user).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::Step;

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemorySessionStore::new();
        assert!(store.get(1).await.unwrap().is_none());

        let mut session = Session::new();
        session.step = Step::AwaitingPosition;
        store.put(1, session).await.unwrap();

        let loaded = store.get(1).await.unwrap().unwrap();
        assert_eq!(loaded.step, Step::AwaitingPosition);
        assert!(store.get(2).await.unwrap().is_none());

        assert!(store.delete(1).await.unwrap());
        assert!(!store.delete(1).await.unwrap());
        assert_eq!(store.len().await, 0);
    }
}
