use serde_json::{json, Value as JsonValue};

use super::question::{Level, Topic};

pub const BTN_NEXT_QUESTION: &str = "Следующий вопрос ➡️";
pub const BTN_ASK_QUESTION: &str = "Задать вопрос ❓";
pub const BTN_CHANGE_LEVEL: &str = "Сменить сложность 📊";
pub const BTN_CHANGE_TOPIC: &str = "Сменить тему 🔄";
pub const BTN_FINISH: &str = "Закончить интервью 🏁";
pub const BTN_BACK: &str = "Назад к интервью ↩️";

/// Quick-reply keyboards offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceSet {
    Topics,
    Levels,
    Interview,
    TopicChange,
    LevelChange,
    Back,
}

impl ChoiceSet {
    pub fn rows(self) -> Vec<Vec<&'static str>> {
        match self {
            ChoiceSet::Topics => vec![
                vec![Topic::DataScience.label(), Topic::MachineLearning.label()],
                vec![Topic::DataAnalysis.label(), Topic::SoftwareEngineering.label()],
            ],
            ChoiceSet::Levels => vec![Level::ALL.iter().map(|l| l.label()).collect()],
            ChoiceSet::Interview => vec![
                vec![BTN_NEXT_QUESTION, BTN_ASK_QUESTION],
                vec![BTN_CHANGE_LEVEL, BTN_CHANGE_TOPIC],
                vec![BTN_FINISH],
            ],
            ChoiceSet::TopicChange => {
                let mut rows = ChoiceSet::Topics.rows();
                rows.push(vec![BTN_BACK]);
                rows
            }
            ChoiceSet::LevelChange => {
                let mut rows = ChoiceSet::Levels.rows();
                rows.push(vec![BTN_BACK]);
                rows
            }
            ChoiceSet::Back => vec![vec![BTN_BACK]],
        }
    }

    pub fn contains(self, label: &str) -> bool {
        self.rows().iter().flatten().any(|b| *b == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMarkup {
    /// Leave whatever keyboard the client currently shows.
    Keep,
    Remove,
    Keyboard(ChoiceSet),
}

impl ReplyMarkup {
    /// Bot API `reply_markup` object, if any.
    pub fn to_telegram(self) -> Option<JsonValue> {
        match self {
            ReplyMarkup::Keep => None,
            ReplyMarkup::Remove => Some(json!({ "remove_keyboard": true })),
            ReplyMarkup::Keyboard(set) => {
                let keyboard: Vec<Vec<JsonValue>> = set
                    .rows()
                    .into_iter()
                    .map(|row| row.into_iter().map(|text| json!({ "text": text })).collect())
                    .collect();
                Some(json!({ "keyboard": keyboard, "resize_keyboard": true }))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub markup: ReplyMarkup,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: ReplyMarkup::Keep,
        }
    }

    pub fn with_choices(text: impl Into<String>, choices: ChoiceSet) -> Self {
        Self {
            text: text.into(),
            markup: ReplyMarkup::Keyboard(choices),
        }
    }

    pub fn removing_keyboard(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: ReplyMarkup::Remove,
        }
    }

    pub fn choices(&self) -> Option<ChoiceSet> {
        match self.markup {
            ReplyMarkup::Keyboard(set) => Some(set),
            _ => None,
        }
    }
}
