use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::question::{AskedQuestions, InterviewQuestion, Level, Topic, ANSWER_UNAVAILABLE};
use crate::models::session::{HistoryEntry, Identity};
use crate::services::completion_service::CompletionService;
use crate::services::question_bank;
use crate::services::question_source::QuestionSource;
use crate::services::reference_service::ReferenceLookup;
use crate::services::retry::{retry, RetryPolicy};

pub const MAX_NOVELTY_ATTEMPTS: usize = 500;
pub const ANSWER_SYNTHESIS_ATTEMPTS: u32 = 3;
pub const REFERENCE_DOCS: usize = 2;
const HISTORY_IN_PROMPT: usize = 10;

pub const GRADE_SECTIONS: [&str; 4] = [
    "ОЦЕНКА",
    "НЕДОЧЕТЫ",
    "ПРАВИЛЬНЫЙ ОТВЕТ",
    "ДОПОЛНИТЕЛЬНАЯ ИНФОРМАЦИЯ",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionOutcome {
    Question(InterviewQuestion),
    /// Every attempt produced an already asked question.
    Exhausted,
}

/// Holds the collaborators; a configured [`Interviewer`] runs the interview.
pub struct InterviewAgent {
    questions: Arc<dyn QuestionSource>,
    references: Arc<dyn ReferenceLookup>,
    completion: Arc<dyn CompletionService>,
    retry: RetryPolicy,
}

impl InterviewAgent {
    pub fn new(
        questions: Arc<dyn QuestionSource>,
        references: Arc<dyn ReferenceLookup>,
        completion: Arc<dyn CompletionService>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            questions,
            references,
            completion,
            retry,
        }
    }

    pub fn configure(&self, name: &str, topic: Topic, level: Level) -> Identity {
        let identity = Identity {
            name: name.trim().to_string(),
            topic,
            level,
        };
        tracing::debug!(topic = %topic, level = %level, "Interviewer configured");
        identity
    }

    pub fn interviewer<'a>(&'a self, identity: &'a Identity) -> Interviewer<'a> {
        Interviewer {
            agent: self,
            identity,
        }
    }

    pub fn welcome(identity: &Identity) -> String {
        question_bank::welcome(&identity.name, identity.topic, identity.level)
    }
}

/// An [`InterviewAgent`] bound to a candidate identity.
pub struct Interviewer<'a> {
    agent: &'a InterviewAgent,
    identity: &'a Identity,
}

impl<'a> Interviewer<'a> {
    pub fn identity(&self) -> &Identity {
        self.identity
    }

    /// Fetches a question not yet in `asked` and records it there.
    pub async fn next_question(
        &self,
        asked: &mut AskedQuestions,
        history: &[HistoryEntry],
    ) -> Result<QuestionOutcome> {
        for attempt in 1..=MAX_NOVELTY_ATTEMPTS {
            let seen: &AskedQuestions = asked;
            let candidate = retry(&self.agent.retry, "next_question", move || {
                self.fetch_novel(seen, history)
            })
            .await?;

            if let Some(question) = candidate {
                asked.insert(question.question.clone());
                tracing::info!(
                    attempt,
                    asked = asked.len(),
                    has_reference = question.has_reference(),
                    "Issued interview question"
                );
                return Ok(QuestionOutcome::Question(question));
            }
        }

        tracing::info!(
            attempts = MAX_NOVELTY_ATTEMPTS,
            asked = asked.len(),
            "No novel question left in this sub-session"
        );
        Ok(QuestionOutcome::Exhausted)
    }

    /// One attempt: `None` when the source repeated itself.
    async fn fetch_novel(
        &self,
        asked: &AskedQuestions,
        history: &[HistoryEntry],
    ) -> Result<Option<InterviewQuestion>> {
        let mut question = self.agent.questions.fetch(self.identity, asked).await?;
        if asked.contains(&question.question) {
            tracing::debug!(question = %question.question, "Skipping repeated question");
            return Ok(None);
        }

        if question.answer.trim().is_empty() {
            question.answer = self.synthesize_answer(&question.question, history).await?;
        }
        Ok(Some(question))
    }

    async fn synthesize_answer(&self, question: &str, history: &[HistoryEntry]) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.detailed_answer(question, history).await {
                Ok(answer) => return Ok(answer),
                Err(e) if attempt >= ANSWER_SYNTHESIS_ATTEMPTS => {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        placeholder = ANSWER_UNAVAILABLE,
                        "Reference answer could not be synthesized"
                    );
                    return Err(Error::AnswerUnavailable {
                        question: question.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Reference answer attempt failed");
                }
            }
        }
    }

    /// Full explanatory answer grounded in reference documents.
    pub async fn detailed_answer(&self, question: &str, history: &[HistoryEntry]) -> Result<String> {
        let docs = self.agent.references.lookup(question, REFERENCE_DOCS).await?;
        let docs_text = docs
            .iter()
            .take(REFERENCE_DOCS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = detailed_answer_prompt(self.identity.topic, &docs_text, &render_history(history));
        self.agent.completion.complete(&prompt, question).await
    }

    /// Four-part critique of the candidate's answer.
    pub async fn grade_answer(
        &self,
        question: &str,
        reference_answer: &str,
        candidate_answer: &str,
    ) -> Result<String> {
        let reference = reference_answer.trim();
        let has_reference = !reference.is_empty() && reference != ANSWER_UNAVAILABLE;
        let prompt = grading_prompt(self.identity, has_reference);
        let request = if has_reference {
            format!(
                "'question': {}, 'rag_answer': {}, 'user_answer': {}",
                question, reference, candidate_answer
            )
        } else {
            format!("'question': {}, 'user_answer': {}", question, candidate_answer)
        };

        let feedback = self.agent.completion.complete(&prompt, &request).await?;
        let missing = missing_sections(&feedback);
        if !missing.is_empty() {
            tracing::warn!(missing = ?missing, "Grading feedback is missing sections");
        }
        Ok(feedback)
    }

    pub async fn answer_question(&self, question: &str, history: &[HistoryEntry]) -> Result<String> {
        retry(&self.agent.retry, "detailed_answer", move || {
            self.detailed_answer(question, history)
        })
        .await
    }

    pub async fn review_answer(
        &self,
        question: &str,
        reference_answer: &str,
        candidate_answer: &str,
    ) -> Result<String> {
        retry(&self.agent.retry, "grade_answer", move || {
            self.grade_answer(question, reference_answer, candidate_answer)
        })
        .await
    }
}

pub fn missing_sections(feedback: &str) -> Vec<&'static str> {
    let upper = feedback.to_uppercase();
    GRADE_SECTIONS
        .into_iter()
        .filter(|s| !upper.contains(s))
        .collect()
}

fn render_history(history: &[HistoryEntry]) -> String {
    let start = history.len().saturating_sub(HISTORY_IN_PROMPT);
    history[start..]
        .iter()
        .map(|h| format!("{}: {}", h.role.as_str(), h.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn detailed_answer_prompt(topic: Topic, docs_text: &str, history: &str) -> String {
    format!(
        "Ты - эксперт IT в области {topic}, который подробно и полно, доступным языком отвечает на вопросы технических собеседований и дает справочную информацию. \
Твоя задача - дать полный развернутый ответ на задаваемый вопрос или дополнить ответ, если он уже есть в запросе. \
Отвечай только на вопросы по теме собеседования!\n\n\
ФОРМАТ ОТВЕТА: ПОЛНЫЙ ОТВЕТ С ПОДРОБНЫМ ОБЪЯСНЕНИЕМ, КОТОРЫЙ УСТРОИТ ИНТЕРВЬЮЕРА. \
Весь ответ должен быть дан на РУССКОМ языке (общеупотребимые термины сферы можно оставить на английском).\n\n\
ЗАМЕЧАНИЕ: Если тебя спросят на отвлеченную тему, вежливо ПРЕДЛОЖИ ВЕРНУТЬСЯ К СОБЕСЕДОВАНИЮ и расскажи про какую-нибудь другую полезную IT штуку, связанную с {topic} \
(ВЕЖЛИВО ПРЕДЛОЖИ ВЕРНУТЬСЯ К СОБЕСЕДОВАНИЮ, а потом используй слова: Давайте я лучше расскажу вам про...)\n\n\
## Docs\n{docs_text}\n\n\
Если для ответа на вопрос нужно обратиться к истории сообщений:\n\
## Message_history\n{history}"
    )
}

fn grading_prompt(identity: &Identity, has_reference: bool) -> String {
    let comparison = if has_reference {
        "Сравни ответ пользователя и ответ rag. \
Дай оценку, укажи на ошибки, если они есть, а затем приведи эталонный ответ на основе ответа rag и дополнительную справочную информацию, если она есть. \
ФОРМАТ ВХОДА: json с полями question, rag_answer, user_answer."
    } else {
        "Эталонного ответа нет, опирайся на собственные знания. \
Дай оценку, укажи на ошибки, если они есть, а затем приведи эталонный ответ и дополнительную справочную информацию, если она есть. \
ФОРМАТ ВХОДА: json с полями question, user_answer."
    };

    format!(
        "Ты - эксперт IT в области {topic}, который проверяет правильность и полноту ответов на вопросы собеседований. \
Тебе следует проверить, насколько качественный ответ для уровня сложности {level} был дан пользователем на вопрос. \
{comparison} \
ОБЯЗАТЕЛЬНО давай оценку так, как будто говоришь напрямую с учеником, обращаясь на вы. \
Окажи поддержку, если ответ неверный, но не забывай про здоровую критику. Похвали, если ответ верный. \
ФОРМАТ ОТВЕТА:\n{sections}\n\
Весь ответ должен быть дан на РУССКОМ языке (общеупотребимые термины сферы можно оставить на английском).",
        topic = identity.topic,
        level = identity.level,
        comparison = comparison,
        sections = GRADE_SECTIONS.join("\n\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::Role;
    use crate::services::completion_service::MockCompletionService;
    use crate::services::question_source::MockQuestionSource;
    use crate::services::reference_service::MockReferenceLookup;
    use chrono::Utc;

    const FEEDBACK: &str = "ОЦЕНКА\nХорошо.\n\nНЕДОЧЕТЫ\nНет примеров.\n\nПРАВИЛЬНЫЙ ОТВЕТ\nREST - архитектурный стиль.\n\nДОПОЛНИТЕЛЬНАЯ ИНФОРМАЦИЯ\nСм. Fielding, 2000.";

    fn agent(
        questions: MockQuestionSource,
        references: MockReferenceLookup,
        completion: MockCompletionService,
    ) -> InterviewAgent {
        InterviewAgent::new(
            Arc::new(questions),
            Arc::new(references),
            Arc::new(completion),
            RetryPolicy::immediate(5),
        )
    }

    fn alice(agent: &InterviewAgent) -> Identity {
        agent.configure(" Alice ", Topic::SoftwareEngineering, Level::Junior)
    }

    #[tokio::test]
    async fn returns_novel_question_and_records_it() {
        let mut questions = MockQuestionSource::new();
        questions
            .expect_fetch()
            .times(1)
            .returning(|_, _| Ok(InterviewQuestion::new("Что такое REST API?", "Стиль API")));
        let agent = agent(questions, MockReferenceLookup::new(), MockCompletionService::new());
        let identity = alice(&agent);
        assert_eq!(identity.name, "Alice");

        let mut asked = AskedQuestions::new();
        let outcome = agent
            .interviewer(&identity)
            .next_question(&mut asked, &[])
            .await
            .unwrap();

        assert_eq!(
            outcome,
            QuestionOutcome::Question(InterviewQuestion::new("Что такое REST API?", "Стиль API"))
        );
        assert!(asked.contains("Что такое REST API?"));
    }

    #[tokio::test]
    async fn repeated_questions_are_skipped_without_synthesis() {
        let mut questions = MockQuestionSource::new();
        let mut calls = 0;
        questions.expect_fetch().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Ok(InterviewQuestion::new("Что такое Git?", ""))
            } else {
                Ok(InterviewQuestion::new("Что такое SOLID?", "Пять принципов"))
            }
        });
        let mut completion = MockCompletionService::new();
        completion.expect_complete().never();
        let agent = agent(questions, MockReferenceLookup::new(), completion);
        let identity = alice(&agent);

        let mut asked = AskedQuestions::new();
        asked.insert("Что такое Git?");
        let outcome = agent
            .interviewer(&identity)
            .next_question(&mut asked, &[])
            .await
            .unwrap();

        assert!(matches!(outcome, QuestionOutcome::Question(q) if q.question == "Что такое SOLID?"));
        assert_eq!(asked.len(), 2);
    }

    #[tokio::test]
    async fn exhausted_after_every_attempt_repeats() {
        let mut questions = MockQuestionSource::new();
        questions
            .expect_fetch()
            .times(MAX_NOVELTY_ATTEMPTS)
            .returning(|_, _| Ok(InterviewQuestion::new("Что такое Git?", "VCS")));
        let agent = agent(questions, MockReferenceLookup::new(), MockCompletionService::new());
        let identity = alice(&agent);

        let mut asked = AskedQuestions::new();
        asked.insert("Что такое Git?");
        let outcome = agent
            .interviewer(&identity)
            .next_question(&mut asked, &[])
            .await
            .unwrap();

        assert_eq!(outcome, QuestionOutcome::Exhausted);
        assert_eq!(asked.len(), 1);
    }

    #[tokio::test]
    async fn empty_answer_is_synthesized_from_references() {
        let mut questions = MockQuestionSource::new();
        questions
            .expect_fetch()
            .returning(|_, _| Ok(InterviewQuestion::new("Что такое ООП?", "")));
        let mut references = MockReferenceLookup::new();
        references
            .expect_lookup()
            .withf(|query, max| query.contains("Что такое ООП?") && *max == REFERENCE_DOCS)
            .times(1)
            .returning(|_, _| Ok(vec!["Objects and classes".into()]));
        let mut completion = MockCompletionService::new();
        completion
            .expect_complete()
            .withf(|system, _| system.contains("Objects and classes") && system.contains("Software Engineering"))
            .times(1)
            .returning(|_, _| Ok("ООП - парадигма, основанная на объектах.".into()));

        let agent = agent(questions, references, completion);
        let identity = alice(&agent);
        let mut asked = AskedQuestions::new();
        let outcome = agent
            .interviewer(&identity)
            .next_question(&mut asked, &[])
            .await
            .unwrap();

        match outcome {
            QuestionOutcome::Question(q) => {
                assert_eq!(q.answer, "ООП - парадигма, основанная на объектах.");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_synthesis_surfaces_as_answer_unavailable() {
        let mut questions = MockQuestionSource::new();
        questions
            .expect_fetch()
            .times(1)
            .returning(|_, _| Ok(InterviewQuestion::new("Что такое ООП?", "")));
        let mut references = MockReferenceLookup::new();
        references
            .expect_lookup()
            .times(ANSWER_SYNTHESIS_ATTEMPTS as usize)
            .returning(|_, _| Ok(vec![]));
        let mut completion = MockCompletionService::new();
        completion
            .expect_complete()
            .times(ANSWER_SYNTHESIS_ATTEMPTS as usize)
            .returning(|_, _| Err(Error::upstream("completion", 503, "down")));

        let agent = InterviewAgent::new(
            Arc::new(questions),
            Arc::new(references),
            Arc::new(completion),
            RetryPolicy::immediate(1),
        );
        let identity = alice(&agent);
        let mut asked = AskedQuestions::new();
        let err = agent
            .interviewer(&identity)
            .next_question(&mut asked, &[])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::AnswerUnavailable { ref question, .. } if question == "Что такое ООП?"));
        assert!(err.is_transient());
        assert!(asked.is_empty());
    }

    #[tokio::test]
    async fn malformed_source_output_is_retried() {
        let mut questions = MockQuestionSource::new();
        let mut calls = 0;
        questions.expect_fetch().times(2).returning(move |_, _| {
            calls += 1;
            if calls == 1 {
                Err(Error::malformed("not json"))
            } else {
                Ok(InterviewQuestion::new("Что такое Git?", "VCS"))
            }
        });
        let agent = agent(questions, MockReferenceLookup::new(), MockCompletionService::new());
        let identity = alice(&agent);

        let outcome = agent
            .interviewer(&identity)
            .next_question(&mut AskedQuestions::new(), &[])
            .await
            .unwrap();
        assert!(matches!(outcome, QuestionOutcome::Question(_)));
    }

    #[tokio::test]
    async fn grading_compares_against_the_reference() {
        let mut completion = MockCompletionService::new();
        completion
            .expect_complete()
            .withf(|system, request| {
                system.contains("Junior")
                    && system.contains("rag_answer")
                    && request.contains("'rag_answer': Архитектурный стиль")
                    && request.contains("'user_answer': Это протокол")
            })
            .times(1)
            .returning(|_, _| Ok(FEEDBACK.into()));
        let agent = agent(MockQuestionSource::new(), MockReferenceLookup::new(), completion);
        let identity = alice(&agent);

        let feedback = agent
            .interviewer(&identity)
            .review_answer("Что такое REST?", "Архитектурный стиль", "Это протокол")
            .await
            .unwrap();

        assert!(missing_sections(&feedback).is_empty());
        for section in GRADE_SECTIONS {
            assert!(feedback.contains(section));
        }
    }

    #[tokio::test]
    async fn grading_without_reference_uses_own_knowledge() {
        let mut completion = MockCompletionService::new();
        completion
            .expect_complete()
            .withf(|system, request| {
                system.contains("Эталонного ответа нет") && !request.contains("rag_answer")
            })
            .times(1)
            .returning(|_, _| Ok(FEEDBACK.into()));
        let agent = agent(MockQuestionSource::new(), MockReferenceLookup::new(), completion);
        let identity = alice(&agent);

        agent
            .interviewer(&identity)
            .grade_answer("Что такое Git?", ANSWER_UNAVAILABLE, "Система контроля версий")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn detailed_answer_includes_recent_history() {
        let history: Vec<HistoryEntry> = (0..15)
            .map(|i| HistoryEntry {
                role: if i % 2 == 0 { Role::Interviewer } else { Role::Candidate },
                content: format!("message {}", i),
                at: Utc::now(),
            })
            .collect();

        let mut references = MockReferenceLookup::new();
        references.expect_lookup().returning(|_, _| Ok(vec!["doc".into()]));
        let mut completion = MockCompletionService::new();
        completion
            .expect_complete()
            .withf(|system, user| {
                system.contains("candidate: message 13")
                    && !system.contains("message 4\n")
                    && system.contains("Давайте я лучше расскажу вам про")
                    && user.trim() == "Как варить борщ?"
            })
            .times(1)
            .returning(|_, _| Ok("Давайте вернемся к собеседованию.".into()));
        let agent = agent(MockQuestionSource::new(), references, completion);
        let identity = alice(&agent);

        let answer = agent
            .interviewer(&identity)
            .answer_question("Как варить борщ?", &history)
            .await
            .unwrap();
        assert!(answer.contains("собеседованию"));
    }

    #[test]
    fn detects_missing_sections() {
        assert_eq!(
            missing_sections("ОЦЕНКА: отлично\nПРАВИЛЬНЫЙ ОТВЕТ: ..."),
            vec!["НЕДОЧЕТЫ", "ДОПОЛНИТЕЛЬНАЯ ИНФОРМАЦИЯ"]
        );
    }

    #[test]
    fn welcome_uses_the_identity() {
        let identity = Identity {
            name: "Alice".into(),
            topic: Topic::DataAnalysis,
            level: Level::Senior,
        };
        assert!(InterviewAgent::welcome(&identity).contains("Alice"));
        assert!(InterviewAgent::welcome(&identity).contains("senior data analyst"));
    }
}
