pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::{Config, QuestionSourceKind, ReferenceSourceKind};
use crate::error::Result;
use crate::services::{
    completion_service::{CompletionService, MistralCompletionService},
    conversation::{ConversationService, ReplySink},
    dispatcher::UpdateDispatcher,
    embed_service::{EmbedService, Embedder},
    interview_agent::InterviewAgent,
    knowledge_base::KnowledgeBase,
    question_source::{QuestionSource, RetrievalQuestionSource, TemplateQuestionBank},
    reference_service::{ArxivLookup, ReferenceLookup},
    retry::RetryPolicy,
    session_store::{InMemorySessionStore, SessionStore},
};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: UpdateDispatcher,
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(dispatcher: UpdateDispatcher, webhook_secret: Option<String>) -> Self {
        Self {
            dispatcher,
            webhook_secret,
        }
    }

    /// Wires the interview pipeline; replies go out through `sink`.
    pub async fn from_config(config: &Config, sink: Arc<dyn ReplySink>) -> Result<Self> {
        let http_client = Client::builder().timeout(config.http_timeout()).build()?;

        let completion: Arc<dyn CompletionService> =
            Arc::new(MistralCompletionService::from_config(config, http_client.clone()));

        let needs_knowledge_base = config.question_source == QuestionSourceKind::Retrieval
            || config.reference_source == ReferenceSourceKind::KnowledgeBase;
        let knowledge_base = if needs_knowledge_base {
            let embedder: Arc<dyn Embedder> =
                Arc::new(EmbedService::from_config(config, http_client.clone()));
            let kb = KnowledgeBase::load(&config.knowledge_base_dir, embedder, completion.clone()).await?;
            Some(Arc::new(kb))
        } else {
            None
        };

        let questions: Arc<dyn QuestionSource> = match &knowledge_base {
            Some(kb) if config.question_source == QuestionSourceKind::Retrieval => {
                Arc::new(RetrievalQuestionSource::new(kb.clone()))
            }
            _ => Arc::new(TemplateQuestionBank),
        };
        let references: Arc<dyn ReferenceLookup> = match &knowledge_base {
            Some(kb) if config.reference_source == ReferenceSourceKind::KnowledgeBase => kb.clone(),
            _ => Arc::new(ArxivLookup::from_config(config, http_client.clone())),
        };

        tracing::info!(
            question_source = ?config.question_source,
            reference_source = ?config.reference_source,
            model = %config.completion_model,
            "Interview pipeline configured"
        );

        let agent = Arc::new(InterviewAgent::new(
            questions,
            references,
            completion,
            RetryPolicy::from_config(config),
        ));
        let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let conversation = Arc::new(ConversationService::new(store, agent));
        let dispatcher = UpdateDispatcher::new(conversation, sink, config.session_idle());

        Ok(Self::new(dispatcher, config.telegram_webhook_secret.clone()))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/webhook/telegram", post(routes::telegram::handle_webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
