//! Thread and summary types - the records that flow through a research run.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Overall tone of a thread as judged by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Mixed,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
            Sentiment::Mixed => "mixed",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            "mixed" => Ok(Sentiment::Mixed),
            other => Err(format!("unknown sentiment label: {}", other)),
        }
    }
}

/// Structured summary of one thread.
///
/// The default value is the empty summary a thread carries until its batch
/// has been decoded, or permanently if the batch could not be parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Short distillation of the thread, around 50 words
    #[serde(default)]
    pub gist: String,
    /// Discrete takeaways from the discussion
    #[serde(default)]
    pub insights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
}

impl Summary {
    pub fn new(gist: String, insights: Vec<String>, sentiment: Option<Sentiment>) -> Self {
        Self {
            gist,
            insights,
            sentiment,
        }
    }

    /// Check if the summary has any content
    pub fn is_empty(&self) -> bool {
        self.gist.trim().is_empty() && self.insights.is_empty() && self.sentiment.is_none()
    }
}

/// One discussion item plus its comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    /// Platform-assigned id, unique within a run
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// All comment bodies joined with single spaces
    #[serde(default)]
    pub comments: String,
    pub url: String,
    /// Creation date (UTC)
    pub created: NaiveDate,
    #[serde(default)]
    pub summary: Summary,
}

impl Thread {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        comments: impl Into<String>,
        url: impl Into<String>,
        created: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            comments: comments.into(),
            url: url.into(),
            created,
            summary: Summary::default(),
        }
    }

    pub fn is_summarized(&self) -> bool {
        !self.summary.is_empty()
    }
}

/// A flattened view of a summarised thread for display.
#[derive(Debug, Clone, Serialize)]
pub struct GistEntry<'a> {
    pub title: &'a str,
    pub gist: &'a str,
    pub insights: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    pub url: &'a str,
}

impl<'a> From<&'a Thread> for GistEntry<'a> {
    fn from(thread: &'a Thread) -> Self {
        Self {
            title: &thread.title,
            gist: &thread.summary.gist,
            insights: &thread.summary.insights,
            sentiment: thread.summary.sentiment,
            url: &thread.url,
        }
    }
}

/// Collect the gist listing for a set of threads
pub fn gist_listing(threads: &[Thread]) -> Vec<GistEntry<'_>> {
    threads.iter().map(GistEntry::from).collect()
}
