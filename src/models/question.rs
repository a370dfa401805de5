use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Placed in `answer` when a reference answer could not be synthesized.
pub const ANSWER_UNAVAILABLE: &str = "Не удалось получить ответ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    DataScience,
    MachineLearning,
    DataAnalysis,
    SoftwareEngineering,
}

impl Topic {
    pub const ALL: [Topic; 4] = [
        Topic::DataScience,
        Topic::MachineLearning,
        Topic::DataAnalysis,
        Topic::SoftwareEngineering,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Topic::DataScience => "Data Science",
            Topic::MachineLearning => "Machine Learning",
            Topic::DataAnalysis => "Data Analysis",
            Topic::SoftwareEngineering => "Software Engineering",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Topic::ALL
            .into_iter()
            .find(|t| t.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown topic '{}'", wanted))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Junior,
    Middle,
    Senior,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Junior, Level::Middle, Level::Senior];

    pub fn label(self) -> &'static str {
        match self {
            Level::Junior => "Junior",
            Level::Middle => "Middle",
            Level::Senior => "Senior",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Level::ALL
            .into_iter()
            .find(|l| l.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown level '{}'", wanted))
    }
}

/// A question together with the answer the interviewer expects.
///
/// An empty `answer` means there is no reference to grade against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewQuestion {
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

impl InterviewQuestion {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    pub fn has_reference(&self) -> bool {
        !self.answer.trim().is_empty() && self.answer != ANSWER_UNAVAILABLE
    }
}

/// Question texts issued in the current sub-session, in issue order, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AskedQuestions {
    ordered: Vec<String>,
    seen: HashSet<String>,
}

impl AskedQuestions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` (and changes nothing) if the question was already asked.
    pub fn insert(&mut self, question: impl Into<String>) -> bool {
        let question = question.into();
        if self.seen.contains(&question) {
            return false;
        }
        self.seen.insert(question.clone());
        self.ordered.push(question);
        true
    }

    pub fn contains(&self, question: &str) -> bool {
        self.seen.contains(question)
    }

    pub fn clear(&mut self) {
        self.ordered.clear();
        self.seen.clear();
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }

    /// The last `n` questions, oldest first.
    pub fn recent(&self, n: usize) -> &[String] {
        let start = self.ordered.len().saturating_sub(n);
        &self.ordered[start..]
    }
}
