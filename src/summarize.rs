//! Batched thread summarisation.
//!
//! Threads are sent to the model in consecutive, order-preserving batches.
//! Each batch is one request keyed by thread id; the reply is decoded into a
//! per-id [`Summary`] map. A reply that cannot be decoded leaves that batch's
//! threads with empty summaries and the run moves on to the next batch.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::ops::Range;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::{strip_markdown_json, ChatMessage, LanguageModel, LlmError};
use crate::progress::{BatchPreview, ThreadSampler};
use crate::thread::{Sentiment, Summary, Thread};

pub const DEFAULT_BATCH_SIZE: usize = 6;
/// Characters of the post body included in a thread excerpt
pub const BODY_EXCERPT_CHARS: usize = 4000;
/// Characters of joined comment text included in a thread excerpt
pub const COMMENT_EXCERPT_CHARS: usize = 6000;

#[derive(Error, Debug)]
pub enum SummarizeError {
    #[error("batch size must be at least 1")]
    InvalidBatchSize,
    #[error("summarisation request failed: {0}")]
    Model(#[from] LlmError),
}

/// Why a batch reply could not be used
#[derive(Error, Debug)]
pub enum SummaryParseError {
    #[error("model output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("model output is a JSON {0}, expected an object keyed by thread id")]
    NotAnObject(&'static str),
}

/// Expected shape of each value in a batch reply.
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ThreadDigest {
    /// About 50 words capturing what the thread is about
    pub gist: Option<String>,
    /// First takeaway about what the community wants
    pub insight1: Option<String>,
    /// Second takeaway about what the community wants
    pub insight2: Option<String>,
    #[schemars(with = "Sentiment")]
    pub sentiment: Option<String>,
}

impl From<ThreadDigest> for Summary {
    fn from(digest: ThreadDigest) -> Self {
        let insights = [digest.insight1, digest.insight2]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let sentiment = digest.sentiment.and_then(|s| s.parse().ok());
        Summary::new(
            digest.gist.unwrap_or_default().trim().to_string(),
            insights,
            sentiment,
        )
    }
}

/// Settings for one summarisation pass
#[derive(Debug, Clone)]
pub struct SummarizeOptions {
    pub model: String,
    pub batch_size: usize,
    /// System instruction sent with every batch
    pub instruction: String,
    /// Pause between batches
    pub pause: Duration,
}

impl SummarizeOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            instruction: default_summary_instruction("online discussion"),
            pause: Duration::ZERO,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }
}

/// Outcome counters for a summarisation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryStats {
    pub batches: usize,
    /// Batches whose reply could not be decoded
    pub failed_batches: usize,
    /// Threads that ended up with a non-empty summary
    pub summarized: usize,
}

pub fn default_summary_instruction(topic: &str) -> String {
    format!(
        "You are a research assistant trying to understand what today's audience wants from {topic}. \
         Infer what the community wants from the discussions you are given. \
         For each thread in the JSON object {{id: text}} return a JSON object keyed by the same ids, \
         each value having the keys gist (50 words), insight1, insight2 and \
         sentiment (positive/neutral/negative/mixed)."
    )
}

/// Split `len` items into consecutive ranges of at most `size`
pub fn batch_ranges(len: usize, size: usize) -> Vec<Range<usize>> {
    (0..len)
        .step_by(size.max(1))
        .map(|start| start..(start + size.max(1)).min(len))
        .collect()
}

/// Bounded text sent to the model for one thread
pub fn excerpt(thread: &Thread) -> String {
    format!(
        "{}\n\n{}\n\nComments:\n{}",
        thread.title,
        truncate_chars(&thread.body, BODY_EXCERPT_CHARS),
        truncate_chars(&thread.comments, COMMENT_EXCERPT_CHARS)
    )
}

/// Build the request for one batch
pub fn batch_messages(instruction: &str, batch: &[Thread]) -> Vec<ChatMessage> {
    let payload: Map<String, Value> = batch
        .iter()
        .map(|t| (t.id.clone(), Value::String(excerpt(t))))
        .collect();

    let schema = serde_json::to_string(&schemars::schema_for!(ThreadDigest)).unwrap_or_default();
    let system = format!(
        "{instruction}\n\nEach value MUST match this JSON schema:\n{schema}\n\n\
         Do not include any markdown formatting, code blocks, or explanations. Only output the raw JSON object."
    );

    vec![
        ChatMessage::system(system),
        ChatMessage::user(Value::Object(payload).to_string()),
    ]
}

/// Decode a batch reply into summaries keyed by thread id.
///
/// The reply must be a JSON object. Individual values that do not look like
/// a digest are skipped, so those ids keep an empty summary.
pub fn decode_batch(text: &str) -> Result<HashMap<String, Summary>, SummaryParseError> {
    let value: Value = serde_json::from_str(strip_markdown_json(text))?;
    let entries = match value {
        Value::Object(entries) => entries,
        Value::Array(_) => return Err(SummaryParseError::NotAnObject("array")),
        Value::String(_) => return Err(SummaryParseError::NotAnObject("string")),
        Value::Number(_) => return Err(SummaryParseError::NotAnObject("number")),
        Value::Bool(_) => return Err(SummaryParseError::NotAnObject("boolean")),
        Value::Null => return Err(SummaryParseError::NotAnObject("null")),
    };

    let mut summaries = HashMap::with_capacity(entries.len());
    for (id, entry) in entries {
        match serde_json::from_value::<ThreadDigest>(entry) {
            Ok(digest) => {
                summaries.insert(id, Summary::from(digest));
            }
            Err(e) => warn!(id = %id, error = %e, "skipping malformed summary entry"),
        }
    }
    Ok(summaries)
}

/// Summarise threads in place, one model call per batch.
///
/// `on_progress` receives `done / total` after every batch and `on_batch`
/// receives the batch preview. Only model transport errors abort the pass.
pub async fn summarize_threads<M>(
    model: &M,
    threads: &mut [Thread],
    options: &SummarizeOptions,
    sampler: &mut dyn ThreadSampler,
    mut on_progress: impl FnMut(f64),
    mut on_batch: impl FnMut(&BatchPreview),
) -> Result<SummaryStats, SummarizeError>
where
    M: LanguageModel + ?Sized,
{
    if options.batch_size == 0 {
        return Err(SummarizeError::InvalidBatchSize);
    }

    let total = threads.len();
    let ranges = batch_ranges(total, options.batch_size);
    let mut stats = SummaryStats {
        batches: ranges.len(),
        ..SummaryStats::default()
    };

    for (index, range) in ranges.iter().enumerate() {
        let batch = &mut threads[range.clone()];
        let messages = batch_messages(&options.instruction, batch);
        debug!(batch = index + 1, threads = batch.len(), "summarising batch");

        let reply = model.complete(&options.model, &messages).await?;
        match decode_batch(&reply) {
            Ok(mut summaries) => {
                for thread in batch.iter_mut() {
                    thread.summary = summaries.remove(&thread.id).unwrap_or_default();
                }
            }
            Err(e) => {
                warn!(batch = index + 1, error = %e, "could not decode batch summaries");
                stats.failed_batches += 1;
                for thread in batch.iter_mut() {
                    thread.summary = Summary::default();
                }
            }
        }

        let done = range.end;
        on_progress(done as f64 / total as f64);

        let sample = sampler.pick(total).min(total - 1);
        on_batch(&BatchPreview {
            batch: index + 1,
            batches: ranges.len(),
            lead_title: threads[range.start].title.clone(),
            sample_title: threads[sample].title.clone(),
        });

        if index + 1 < ranges.len() && !options.pause.is_zero() {
            tokio::time::sleep(options.pause).await;
        }
    }

    stats.summarized = threads.iter().filter(|t| t.is_summarized()).count();
    info!(
        threads = total,
        batches = stats.batches,
        failed = stats.failed_batches,
        summarized = stats.summarized,
        "summarisation complete"
    );
    Ok(stats)
}

/// Truncate to at most `max` characters without splitting a code point
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
