use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::question::{AskedQuestions, InterviewQuestion, Level, Topic};

pub type UserId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    AwaitingName,
    AwaitingPosition,
    AwaitingLevel,
    Interview,
    AwaitingQuestion,
    AwaitingLevelChange,
    AwaitingPositionChange,
}

impl Step {
    /// Steps reachable only after the interviewer has been configured.
    pub fn is_interview_phase(self) -> bool {
        matches!(
            self,
            Step::Interview
                | Step::AwaitingQuestion
                | Step::AwaitingLevelChange
                | Step::AwaitingPositionChange
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Interviewer,
    Candidate,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Interviewer => "interviewer",
            Role::Candidate => "candidate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

/// Who the interviewer is talking to and at what depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub topic: Topic,
    pub level: Level,
}

#[derive(Debug, Clone, Default)]
pub struct UserData {
    pub name: Option<String>,
    pub position: Option<Topic>,
    pub level: Option<Level>,
    pub asked_questions: AskedQuestions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterviewStats {
    pub questions_issued: u32,
    pub answers_graded: u32,
    pub theory_questions: u32,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub step: Step,
    pub conversation_history: Vec<HistoryEntry>,
    pub current_question: Option<InterviewQuestion>,
    pub user_data: UserData,
    pub identity: Option<Identity>,
    pub stats: InterviewStats,
    pub started_at: DateTime<Utc>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            step: Step::AwaitingName,
            conversation_history: Vec::new(),
            current_question: None,
            user_data: UserData::default(),
            identity: None,
            stats: InterviewStats::default(),
            started_at: Utc::now(),
        }
    }

    pub fn record(&mut self, role: Role, content: impl Into<String>) {
        self.conversation_history.push(HistoryEntry {
            role,
            content: content.into(),
            at: Utc::now(),
        });
    }

    /// Makes `question` the active one and counts it.
    pub fn issue_question(&mut self, question: InterviewQuestion, rendered: impl Into<String>) {
        self.record(Role::Interviewer, rendered);
        self.current_question = Some(question);
        self.stats.questions_issued += 1;
    }

    /// Forgets asked questions so that a new topic/level starts fresh.
    pub fn start_sub_session(&mut self) {
        self.user_data.asked_questions.clear();
        self.current_question = None;
    }

    pub fn display_name(&self) -> &str {
        self.user_data
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("Кандидат")
    }

    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_minutes().max(0)
    }
}
