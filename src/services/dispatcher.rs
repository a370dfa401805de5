use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::error::Result;
use crate::models::session::UserId;
use crate::models::telegram::IncomingMessage;
use crate::services::conversation::{ConversationService, ReplySink};

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: &IncomingMessage, sink: &dyn ReplySink) -> Result<()>;
}

#[async_trait]
impl MessageHandler for ConversationService {
    async fn handle(&self, msg: &IncomingMessage, sink: &dyn ReplySink) -> Result<()> {
        ConversationService::handle(self, msg, sink).await
    }
}

type Workers = HashMap<UserId, UnboundedSender<IncomingMessage>>;

struct Inner {
    handler: Arc<dyn MessageHandler>,
    sink: Arc<dyn ReplySink>,
    idle: Duration,
    workers: Mutex<Workers>,
}

/// Routes each message to its sender's queue. One worker task per active
/// user drains the queue in arrival order; different users run concurrently.
#[derive(Clone)]
pub struct UpdateDispatcher {
    inner: Arc<Inner>,
}

impl UpdateDispatcher {
    pub fn new(handler: Arc<dyn MessageHandler>, sink: Arc<dyn ReplySink>, idle: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                handler,
                sink,
                idle,
                workers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn dispatch(&self, msg: IncomingMessage) {
        let user_id = msg.user_id;
        let mut workers = self.inner.lock_workers();

        let msg = match workers.get(&user_id) {
            Some(tx) => match tx.send(msg) {
                Ok(()) => return,
                // worker died; start a fresh one below
                Err(mpsc::error::SendError(msg)) => msg,
            },
            None => msg,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(msg).is_err() {
            return;
        }
        workers.insert(user_id, tx);
        drop(workers);

        tracing::debug!(user_id, "Spawning conversation worker");
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run_worker(user_id, rx).await });
    }

    pub fn active_workers(&self) -> usize {
        self.inner.lock_workers().len()
    }
}

impl Inner {
    fn lock_workers(&self) -> MutexGuard<'_, Workers> {
        self.workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run_worker(&self, user_id: UserId, mut rx: UnboundedReceiver<IncomingMessage>) {
        loop {
            let msg = match tokio::time::timeout(self.idle, rx.recv()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(_) => {
                    // Senders only push while holding the lock, so an empty
                    // queue here stays empty once the entry is removed.
                    let mut workers = self.lock_workers();
                    match rx.try_recv() {
                        Ok(msg) => msg,
                        Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {
                            workers.remove(&user_id);
                            tracing::debug!(user_id, "Conversation worker idle, exiting");
                            break;
                        }
                    }
                }
            };
            self.process(msg).await;
        }
    }

    async fn process(&self, msg: IncomingMessage) {
        let user_id = msg.user_id;
        if let Err(e) = self.handler.handle(&msg, self.sink.as_ref()).await {
            tracing::error!(user_id, error = %e, "Failed to handle message");
        }
    }
}
