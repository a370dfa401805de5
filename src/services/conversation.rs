use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::question::{Level, Topic};
use crate::models::reply::{
    ChoiceSet, Reply, BTN_ASK_QUESTION, BTN_BACK, BTN_CHANGE_LEVEL, BTN_CHANGE_TOPIC, BTN_FINISH,
    BTN_NEXT_QUESTION,
};
use crate::models::session::{Role, Session, Step};
use crate::models::telegram::IncomingMessage;
use crate::services::interview_agent::{InterviewAgent, QuestionOutcome};
use crate::services::session_store::SessionStore;

pub const MSG_GREETING: &str =
    "🎯 Добро пожаловать на техническое собеседование!\n\nДавайте познакомимся. Как вас зовут?";
pub const MSG_USE_START: &str = "Для начала интервью используйте /start";
pub const MSG_START_FIRST: &str = "Сначала начните интервью командой /start";
pub const MSG_NOT_STARTED: &str = "Интервью еще не начато";
pub const MSG_EXHAUSTED: &str =
    "Отлично! Мы обсудили основные темы. Хотите задать свой вопрос или завершить интервью?";
pub const MSG_TECHNICAL_ERROR: &str = "Произошла техническая ошибка! Проверьте подключение к интернету и попробуйте снова через некоторое время";
pub const MSG_MALFORMED: &str =
    "Не удалось разобрать ответ сервиса вопросов. Попробуйте еще раз чуть позже.";
pub const MSG_NO_QUESTION_YET: &str =
    "Сначала запросите вопрос кнопкой «Следующий вопрос ➡️», а затем отправьте ответ.";

/// Delivers replies to a chat.
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn send(&self, chat_id: i64, reply: Reply) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    NextQuestion,
    AskQuestion,
    ChangeLevel,
    ChangeTopic,
    BackToInterview,
    Finish,
}

impl Command {
    /// Slash commands (with an optional `@botname` suffix) and quick-reply labels.
    pub fn parse(text: &str) -> Option<Command> {
        let text = text.trim();
        if let Some(rest) = text.strip_prefix('/') {
            let word = rest.split_whitespace().next().unwrap_or_default();
            let name = word.split('@').next().unwrap_or_default();
            return match name {
                "start" | "start_interview" => Some(Command::Start),
                "next_question" => Some(Command::NextQuestion),
                "ask_question" => Some(Command::AskQuestion),
                "change_level" => Some(Command::ChangeLevel),
                "change_topic" => Some(Command::ChangeTopic),
                "finish" => Some(Command::Finish),
                _ => None,
            };
        }

        match text {
            BTN_NEXT_QUESTION => Some(Command::NextQuestion),
            BTN_ASK_QUESTION => Some(Command::AskQuestion),
            BTN_CHANGE_LEVEL => Some(Command::ChangeLevel),
            BTN_CHANGE_TOPIC => Some(Command::ChangeTopic),
            BTN_BACK => Some(Command::BackToInterview),
            BTN_FINISH => Some(Command::Finish),
            _ => None,
        }
    }
}

/// The per-user interview state machine.
pub struct ConversationService {
    store: Arc<dyn SessionStore>,
    agent: Arc<InterviewAgent>,
}

impl ConversationService {
    pub fn new(store: Arc<dyn SessionStore>, agent: Arc<InterviewAgent>) -> Self {
        Self { store, agent }
    }

    pub async fn handle(&self, msg: &IncomingMessage, sink: &dyn ReplySink) -> Result<()> {
        let out = Outbox {
            sink,
            chat_id: msg.chat_id,
        };
        let command = Command::parse(&msg.text);

        let Some(mut session) = self.store.get(msg.user_id).await? else {
            let text = match command {
                Some(Command::Start) => return self.start(msg, &out).await,
                Some(Command::Finish) => MSG_NOT_STARTED,
                _ => MSG_USE_START,
            };
            out.say(Reply::text(text)).await;
            return Ok(());
        };

        if command != Some(Command::Start)
            && session.step.is_interview_phase()
            && session.identity.is_none()
        {
            tracing::error!(
                user_id = msg.user_id,
                step = ?session.step,
                "Session is in an interview step without a configured interviewer"
            );
            debug_assert!(session.identity.is_some(), "interview step reached without identity");
            self.store.delete(msg.user_id).await?;
            out.say(Reply::removing_keyboard(MSG_USE_START)).await;
            return Ok(());
        }

        match command {
            Some(Command::Start) => return self.start(msg, &out).await,
            Some(Command::Finish) => return self.finish(msg, session, &out).await,
            Some(cmd) if !session.step.is_interview_phase() => {
                tracing::debug!(user_id = msg.user_id, command = ?cmd, "Command before interview setup");
                out.say(Reply::text(MSG_START_FIRST)).await;
                return Ok(());
            }
            Some(Command::NextQuestion) => {
                session.step = Step::Interview;
                self.issue_next_question(&mut session, &out).await;
            }
            Some(Command::AskQuestion) => {
                session.step = Step::AwaitingQuestion;
                out.say(Reply::with_choices(
                    "Какой теоретический вопрос вас интересует?",
                    ChoiceSet::Back,
                ))
                .await;
            }
            Some(Command::ChangeLevel) => {
                session.step = Step::AwaitingLevelChange;
                out.say(Reply::with_choices(
                    "Выберите новый уровень сложности:",
                    ChoiceSet::LevelChange,
                ))
                .await;
            }
            Some(Command::ChangeTopic) => {
                session.step = Step::AwaitingPositionChange;
                out.say(Reply::with_choices(
                    "Выберите новую тему для собеседования:",
                    ChoiceSet::TopicChange,
                ))
                .await;
            }
            Some(Command::BackToInterview) => {
                session.step = Step::Interview;
                match &session.current_question {
                    Some(q) => {
                        let text = format!("Продолжаем интервью!\n\nТекущий вопрос: {}", q.question);
                        out.say(Reply::with_choices(text, ChoiceSet::Interview)).await;
                    }
                    None => self.issue_next_question(&mut session, &out).await,
                }
            }
            None => self.handle_text(msg, &mut session, &out).await,
        }

        self.store.put(msg.user_id, session).await
    }

    async fn start(&self, msg: &IncomingMessage, out: &Outbox<'_>) -> Result<()> {
        self.store.put(msg.user_id, Session::new()).await?;
        tracing::info!(user_id = msg.user_id, "Interview session started");
        out.say(Reply::removing_keyboard(MSG_GREETING)).await;
        Ok(())
    }

    async fn handle_text(&self, msg: &IncomingMessage, session: &mut Session, out: &Outbox<'_>) {
        let text = msg.text.trim();
        match session.step {
            Step::AwaitingName => {
                if text.is_empty() {
                    out.say(Reply::text("Как вас зовут?")).await;
                    return;
                }
                session.user_data.name = Some(text.to_string());
                session.step = Step::AwaitingPosition;
                out.say(Reply::with_choices(
                    format!("Приятно познакомиться, {}!\nВыберите сферу для собеседования:", text),
                    ChoiceSet::Topics,
                ))
                .await;
            }
            Step::AwaitingPosition => {
                let Ok(topic) = text.parse::<Topic>() else {
                    out.say(Reply::with_choices(
                        "Пожалуйста, выберите сферу из предложенных вариантов:",
                        ChoiceSet::Topics,
                    ))
                    .await;
                    return;
                };
                session.user_data.position = Some(topic);
                session.step = Step::AwaitingLevel;
                out.say(Reply::with_choices(
                    format!("Отлично! Сфера: {}\nТеперь выберите ваш уровень:", topic),
                    ChoiceSet::Levels,
                ))
                .await;
            }
            Step::AwaitingLevel => {
                let Ok(level) = text.parse::<Level>() else {
                    out.say(Reply::with_choices(
                        "Пожалуйста, выберите уровень из предложенных вариантов:",
                        ChoiceSet::Levels,
                    ))
                    .await;
                    return;
                };
                self.begin_interview(msg, session, level, out).await;
            }
            Step::Interview => self.grade(msg, session, out).await,
            Step::AwaitingQuestion => self.answer_theory(msg, session, out).await,
            Step::AwaitingLevelChange => {
                let Ok(level) = text.parse::<Level>() else {
                    out.say(Reply::with_choices(
                        "Пожалуйста, выберите уровень из предложенных вариантов:",
                        ChoiceSet::LevelChange,
                    ))
                    .await;
                    return;
                };
                // identity is present in every interview step, checked in `handle`
                let Some(topic) = session.identity.as_ref().map(|i| i.topic) else {
                    return;
                };
                self.restart_sub_session(session, topic, level);
                out.say(Reply::with_choices(
                    format!(
                        "✅ Уровень сложности изменен на: {}\nНачинаем новую сессию вопросов...",
                        level
                    ),
                    ChoiceSet::Interview,
                ))
                .await;
                self.issue_next_question(session, out).await;
            }
            Step::AwaitingPositionChange => {
                let Ok(topic) = text.parse::<Topic>() else {
                    out.say(Reply::with_choices(
                        "Пожалуйста, выберите сферу из предложенных вариантов:",
                        ChoiceSet::TopicChange,
                    ))
                    .await;
                    return;
                };
                let Some(level) = session.identity.as_ref().map(|i| i.level) else {
                    return;
                };
                self.restart_sub_session(session, topic, level);
                out.say(Reply::with_choices(
                    format!("✅ Тема изменена на: {}\nНачинаем новую сессию вопросов...", topic),
                    ChoiceSet::Interview,
                ))
                .await;
                self.issue_next_question(session, out).await;
            }
        }
    }

    async fn begin_interview(
        &self,
        msg: &IncomingMessage,
        session: &mut Session,
        level: Level,
        out: &Outbox<'_>,
    ) {
        let Some(topic) = session.user_data.position else {
            tracing::warn!(user_id = msg.user_id, "Level chosen before a topic, asking for the topic again");
            session.step = Step::AwaitingPosition;
            out.say(Reply::with_choices(
                "Пожалуйста, выберите сферу из предложенных вариантов:",
                ChoiceSet::Topics,
            ))
            .await;
            return;
        };
        self.restart_sub_session(session, topic, level);
        session.started_at = Utc::now();

        out.say(Reply::text("🔄 Начинаем интервью...")).await;

        let Some(identity) = session.identity.as_ref() else {
            return;
        };
        let welcome = InterviewAgent::welcome(identity);
        let outcome = self
            .agent
            .interviewer(identity)
            .next_question(
                &mut session.user_data.asked_questions,
                &session.conversation_history,
            )
            .await;

        match outcome {
            Ok(QuestionOutcome::Question(question)) => {
                let text = format!("{}{}", welcome, question.question);
                session.issue_question(question, text.clone());
                out.say(Reply::with_choices(text, ChoiceSet::Interview)).await;
            }
            Ok(QuestionOutcome::Exhausted) => {
                let text = format!("{}{}", welcome, MSG_EXHAUSTED);
                session.record(Role::Interviewer, text.clone());
                out.say(Reply::with_choices(text, ChoiceSet::Interview)).await;
            }
            Err(e) => {
                report_failure(msg, "first_question", &e);
                out.say(Reply::with_choices(
                    format!("{}\n\n{}", welcome.trim_end(), failure_text(&e)),
                    ChoiceSet::Interview,
                ))
                .await;
            }
        }
    }

    /// Records the choice, reconfigures the interviewer and forgets asked questions.
    fn restart_sub_session(&self, session: &mut Session, topic: Topic, level: Level) {
        session.user_data.position = Some(topic);
        session.user_data.level = Some(level);
        let name = session.display_name().to_string();
        session.identity = Some(self.agent.configure(&name, topic, level));
        session.start_sub_session();
        session.step = Step::Interview;
    }

    async fn issue_next_question(&self, session: &mut Session, out: &Outbox<'_>) {
        out.say(Reply::text("🔄 Формирую следующий вопрос...")).await;

        let Some(identity) = session.identity.as_ref() else {
            out.say(Reply::removing_keyboard(MSG_START_FIRST)).await;
            return;
        };
        let outcome = self
            .agent
            .interviewer(identity)
            .next_question(
                &mut session.user_data.asked_questions,
                &session.conversation_history,
            )
            .await;

        match outcome {
            Ok(QuestionOutcome::Question(question)) => {
                let text = question.question.clone();
                session.issue_question(question, text.clone());
                out.say(Reply::with_choices(text, ChoiceSet::Interview)).await;
            }
            Ok(QuestionOutcome::Exhausted) => {
                session.current_question = None;
                session.record(Role::Interviewer, MSG_EXHAUSTED);
                out.say(Reply::with_choices(MSG_EXHAUSTED, ChoiceSet::Interview))
                    .await;
            }
            Err(e) => {
                tracing::error!(operation = "next_question", error = %e, "Question fetch failed");
                out.say(Reply::with_choices(failure_text(&e), ChoiceSet::Interview))
                    .await;
            }
        }
    }

    async fn grade(&self, msg: &IncomingMessage, session: &mut Session, out: &Outbox<'_>) {
        let (Some(identity), Some(question)) =
            (session.identity.as_ref(), session.current_question.as_ref())
        else {
            out.say(Reply::with_choices(MSG_NO_QUESTION_YET, ChoiceSet::Interview))
                .await;
            return;
        };

        out.say(Reply::text("🔄 Анализирую ваш ответ...")).await;
        let result = self
            .agent
            .interviewer(identity)
            .review_answer(&question.question, &question.answer, &msg.text)
            .await;
        session.record(Role::Candidate, msg.text.clone());

        match result {
            Ok(feedback) => {
                session.stats.answers_graded += 1;
                session.record(Role::Interviewer, feedback.clone());
                out.say(Reply::text(format!("📝 Обратная связь:\n\n{}", feedback)))
                    .await;
                out.say(Reply::with_choices(
                    "Используйте кнопки для продолжения:",
                    ChoiceSet::Interview,
                ))
                .await;
            }
            Err(e) => {
                report_failure(msg, "grade_answer", &e);
                out.say(Reply::with_choices(failure_text(&e), ChoiceSet::Interview))
                    .await;
            }
        }
    }

    async fn answer_theory(&self, msg: &IncomingMessage, session: &mut Session, out: &Outbox<'_>) {
        session.step = Step::Interview;
        session.record(Role::Candidate, msg.text.clone());
        let Some(identity) = session.identity.as_ref() else {
            return;
        };

        out.say(Reply::text("🔄 Ищу ответ на ваш вопрос...")).await;
        let result = self
            .agent
            .interviewer(identity)
            .answer_question(&msg.text, &session.conversation_history)
            .await;

        match result {
            Ok(answer) => {
                session.stats.theory_questions += 1;
                session.record(Role::Interviewer, answer.clone());
                out.say(Reply::text(format!("📚 Ответ на ваш вопрос:\n\n{}", answer)))
                    .await;
                out.say(Reply::with_choices("Продолжаем интервью:", ChoiceSet::Interview))
                    .await;
            }
            Err(e) => {
                report_failure(msg, "detailed_answer", &e);
                out.say(Reply::with_choices(failure_text(&e), ChoiceSet::Interview))
                    .await;
            }
        }
    }

    async fn finish(&self, msg: &IncomingMessage, session: Session, out: &Outbox<'_>) -> Result<()> {
        self.store.delete(msg.user_id).await?;

        let position = session
            .user_data
            .position
            .map(|t| t.label())
            .unwrap_or("технический специалист");
        let level = session.user_data.level.map(|l| l.label()).unwrap_or("");
        let stats = session.stats;
        let text = format!(
            "🎉 Спасибо, {}!\n\n\
Интервью на позицию {} ({}) завершено.\n\n\
Вопросов задано: {}\n\
Ответов проверено: {}\n\
Теоретических вопросов: {}\n\
Длительность: {} мин.\n\n\
Для нового собеседования используйте /start",
            session.display_name(),
            position,
            level,
            stats.questions_issued,
            stats.answers_graded,
            stats.theory_questions,
            session.elapsed_minutes(Utc::now()),
        );

        tracing::info!(
            user_id = msg.user_id,
            questions = stats.questions_issued,
            graded = stats.answers_graded,
            "Interview finished"
        );
        out.say(Reply::removing_keyboard(text)).await;
        Ok(())
    }
}

/// Sends replies to one chat; delivery failures are logged and swallowed.
struct Outbox<'a> {
    sink: &'a dyn ReplySink,
    chat_id: i64,
}

impl Outbox<'_> {
    async fn say(&self, reply: Reply) {
        if let Err(e) = self.sink.send(self.chat_id, reply).await {
            tracing::warn!(chat_id = self.chat_id, error = %e, "Failed to deliver reply");
        }
    }
}

fn failure_text(e: &Error) -> &'static str {
    if e.is_malformed() {
        MSG_MALFORMED
    } else {
        MSG_TECHNICAL_ERROR
    }
}

fn report_failure(msg: &IncomingMessage, operation: &str, e: &Error) {
    tracing::error!(user_id = msg.user_id, operation, error = %e, "All attempts failed");
}
