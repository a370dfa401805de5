use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::question::{AskedQuestions, InterviewQuestion};
use crate::models::session::Identity;
use crate::services::knowledge_base::RetrievalService;
use crate::services::question_bank;

/// How many previously asked questions are quoted back to the retrieval prompt.
const RECENT_QUESTIONS_IN_PROMPT: usize = 10;

/// Produces raw candidate questions; novelty is checked by the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionSource: Send + Sync {
    async fn fetch(&self, identity: &Identity, asked: &AskedQuestions) -> Result<InterviewQuestion>;
}

/// Static per-topic, per-level bank. Offers questions in order and repeats
/// the first one once every question has been asked.
#[derive(Debug, Clone, Default)]
pub struct TemplateQuestionBank;

#[async_trait]
impl QuestionSource for TemplateQuestionBank {
    async fn fetch(&self, identity: &Identity, asked: &AskedQuestions) -> Result<InterviewQuestion> {
        let list = question_bank::questions(identity.topic, identity.level);
        let question = list
            .iter()
            .find(|q| !asked.contains(q))
            .or_else(|| list.first())
            .ok_or_else(|| Error::Internal("question bank is empty".into()))?;
        Ok(InterviewQuestion::new(*question, ""))
    }
}

/// Generates questions through the knowledge base.
pub struct RetrievalQuestionSource {
    retrieval: Arc<dyn RetrievalService>,
}

impl RetrievalQuestionSource {
    pub fn new(retrieval: Arc<dyn RetrievalService>) -> Self {
        Self { retrieval }
    }
}

pub(crate) fn question_prompt(identity: &Identity, asked: &AskedQuestions) -> String {
    let mut prompt = format!(
        "Теперь ты выступаешь в роли системы-интервьюера, в которой хранится много вопросов с технических собеседований. \
Задай мне вопрос из сферы {} со сложностью {}. \
Если возможно - приведи ПОДРОБНЫЙ, но ЛАКОНИЧНЫЙ ответ на этот вопрос, который ожидает интервьюер. \
Будь максимально аккуратен и не добавляй лишний текст. \
ФОРМАТ: json с полями question и answer. \
Оставь в поле answer \"\", если у тебя нет ответа на заданный вопрос. \
Вопрос нужно задать на РУССКОМ языке (общеупотребимые термины сферы можно оставить на английском)",
        identity.topic, identity.level
    );

    let recent = asked.recent(RECENT_QUESTIONS_IN_PROMPT);
    if !recent.is_empty() {
        prompt.push_str("\n\nНЕ повторяй уже заданные вопросы:\n");
        for q in recent {
            prompt.push_str("- ");
            prompt.push_str(q);
            prompt.push('\n');
        }
    }
    prompt
}

#[derive(Deserialize)]
struct RawQuestion {
    question: Option<String>,
    #[serde(default)]
    answer: Option<String>,
}

/// Strictly decodes `{"question": .., "answer": ..}`, tolerating only
/// surrounding Markdown code fences.
pub fn decode_question(text: &str) -> Result<InterviewQuestion> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let raw: RawQuestion = serde_json::from_str(cleaned.trim())
        .map_err(|e| Error::malformed(format!("question is not valid JSON: {}", e)))?;

    let question = raw
        .question
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| Error::malformed("question field is missing or empty"))?;
    let answer = raw.answer.map(|a| a.trim().to_string()).unwrap_or_default();

    Ok(InterviewQuestion::new(question, answer))
}

#[async_trait]
impl QuestionSource for RetrievalQuestionSource {
    async fn fetch(&self, identity: &Identity, asked: &AskedQuestions) -> Result<InterviewQuestion> {
        let raw = self.retrieval.query(&question_prompt(identity, asked)).await?;
        decode_question(&raw).map_err(|e| {
            tracing::warn!(error = %e, raw = %raw, "Retrieval returned an unusable question");
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{Level, Topic};
    use crate::services::knowledge_base::MockRetrievalService;

    fn identity() -> Identity {
        Identity {
            name: "Alice".into(),
            topic: Topic::SoftwareEngineering,
            level: Level::Junior,
        }
    }

    #[test]
    fn decodes_fenced_json() {
        let q = decode_question("```json\n{\"question\": \"Что такое REST?\", \"answer\": \"Стиль API\"}\n```")
            .unwrap();
        assert_eq!(q, InterviewQuestion::new("Что такое REST?", "Стиль API"));
    }

    #[test]
    fn missing_answer_means_no_reference() {
        let q = decode_question(r#"{"question": "Что такое Git?"}"#).unwrap();
        assert_eq!(q.answer, "");
        assert!(!q.has_reference());
    }

    #[test]
    fn rejects_prose_and_empty_questions() {
        assert!(decode_question("Вот вопрос: что такое Git?").unwrap_err().is_malformed());
        assert!(decode_question(r#"{"question": "  ", "answer": "x"}"#)
            .unwrap_err()
            .is_malformed());
        assert!(decode_question(r#"{"answer": "x"}"#).unwrap_err().is_malformed());
        assert!(decode_question(r#"["question"]"#).unwrap_err().is_malformed());
    }

    #[test]
    fn prompt_names_topic_level_and_recent_questions() {
        let mut asked = AskedQuestions::new();
        asked.insert("Что такое ООП?");
        let prompt = question_prompt(&identity(), &asked);
        assert!(prompt.contains("Software Engineering"));
        assert!(prompt.contains("Junior"));
        assert!(prompt.contains("- Что такое ООП?"));
    }

    #[tokio::test]
    async fn template_bank_walks_the_list_then_repeats() {
        let bank = TemplateQuestionBank;
        let mut asked = AskedQuestions::new();
        let all = question_bank::questions(Topic::SoftwareEngineering, Level::Junior);

        for expected in all {
            let q = bank.fetch(&identity(), &asked).await.unwrap();
            assert_eq!(q.question, *expected);
            assert!(asked.insert(q.question));
        }

        let repeat = bank.fetch(&identity(), &asked).await.unwrap();
        assert!(asked.contains(&repeat.question));
    }

    #[tokio::test]
    async fn retrieval_source_decodes_the_answer_document() {
        let mut retrieval = MockRetrievalService::new();
        retrieval
            .expect_query()
            .times(1)
            .returning(|_| Ok(r#"{"question": "Что такое SOLID?", "answer": "Пять принципов"}"#.into()));

        let source = RetrievalQuestionSource::new(Arc::new(retrieval));
        let q = source.fetch(&identity(), &AskedQuestions::new()).await.unwrap();
        assert_eq!(q.question, "Что такое SOLID?");
        assert!(q.has_reference());
    }
}
