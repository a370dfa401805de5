pub mod completion_service;
pub mod conversation;
pub mod dispatcher;
pub mod embed_service;
pub mod interview_agent;
pub mod knowledge_base;
pub mod question_bank;
pub mod question_source;
pub mod reference_service;
pub mod retry;
pub mod session_store;
pub mod telegram_service;
