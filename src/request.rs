//! Run-scoped research configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_QUESTIONS: usize = 5;
pub const DEFAULT_THREAD_COUNT: usize = 50;
pub const DEFAULT_QUESTIONS: [&str; 2] = ["What tropes feel over-used?", "What excites this audience?"];

/// Forum used when a topic has no known default
pub const FALLBACK_FORUM: &str = "movies";

const TOPIC_FORUMS: &[(&str, &str)] = &[
    ("horror", "horror"),
    ("sci-fi", "scifi"),
    ("rom-com", "romcom"),
    ("superhero", "marvelstudios"),
    ("documentary", "documentaries"),
    ("animation", "animation"),
    ("crime", "TrueFilm"),
    ("thriller", "Thrillers"),
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("a forum must be specified")]
    MissingForum,
    #[error("at least one research question is required")]
    NoQuestions,
    #[error("{0} research questions given, at most {MAX_QUESTIONS} are allowed")]
    TooManyQuestions(usize),
}

/// Everything a single research run needs to know. Not mutated during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    pub forum: String,
    pub thread_count: usize,
    /// Between one and five questions, in order
    pub questions: Vec<String>,
    /// Caller override for the report instruction; `{topic}` is substituted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

impl ResearchRequest {
    /// Build a request; questions are trimmed, blanks dropped and capped at five.
    pub fn new(
        topic: impl Into<String>,
        forum: impl Into<String>,
        thread_count: usize,
        questions: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            topic: topic.into().trim().to_lowercase(),
            forum: forum.into().trim().to_string(),
            thread_count,
            questions: clean_questions(questions),
            instruction: None,
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.forum.is_empty() {
            return Err(RequestError::MissingForum);
        }
        if self.questions.is_empty() {
            return Err(RequestError::NoQuestions);
        }
        if self.questions.len() > MAX_QUESTIONS {
            return Err(RequestError::TooManyQuestions(self.questions.len()));
        }
        Ok(())
    }
}

/// Default forum for a topic label
pub fn default_forum_for(topic: &str) -> &'static str {
    let topic = topic.trim().to_lowercase();
    TOPIC_FORUMS
        .iter()
        .find(|(t, _)| *t == topic)
        .map(|(_, forum)| *forum)
        .unwrap_or(FALLBACK_FORUM)
}

/// Parse free text with one question per line
pub fn parse_questions(text: &str) -> Vec<String> {
    clean_questions(text.lines())
}

fn clean_questions(questions: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    questions
        .into_iter()
        .map(|q| q.as_ref().trim().to_string())
        .filter(|q| !q.is_empty())
        .take(MAX_QUESTIONS)
        .collect()
}
