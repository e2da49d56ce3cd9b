//! Report synthesis.
//!
//! One model call turns the summarised threads and the research questions
//! into a narrative report with `[Title](URL)` citations.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::llm::{ChatMessage, LanguageModel, LlmError};
use crate::summarize::truncate_chars;
use crate::thread::Thread;

/// Character budget for the joined corpus
pub const CORPUS_BUDGET: usize = 15_000;

#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("report synthesis failed: {0}")]
    Model(#[from] LlmError),
}

/// The final artifact of a research run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub topic: String,
    pub forum: String,
    /// Model output, verbatim
    pub text: String,
    pub thread_count: usize,
    /// Threads that contributed a non-empty summary
    pub summarized_count: usize,
}

impl Report {
    /// True when some threads reached synthesis without a summary
    pub fn is_degraded(&self) -> bool {
        self.summarized_count < self.thread_count
    }
}

/// Default report instruction for a topic
pub fn default_report_instruction(topic: &str) -> String {
    format!(
        "You are a senior story analyst assisting film *writers* and *producers* who are exploring the \
         **{topic}** genre. You have mined Reddit audience discussions. \
         First, give a one-paragraph snapshot of overall audience sentiment for this genre. \
         Then, answer each research question in its own subsection (≤2 paragraphs each), \
         adding citations in [Title](URL) form right after every key evidence point. \
         Finish with a bold **list of ACTIONABLE INSIGHTS**: 3 points for script-story writers \
         (what to emphasise / avoid in a script), each with a citation, 3 points for movie \
         producers / marketers / distributors and 3 points for directors.",
        topic = title_case(topic)
    )
}

/// Render the report instruction, substituting `{topic}` in custom templates
pub fn render_instruction(template: Option<&str>, topic: &str) -> String {
    match template {
        Some(custom) => custom.replace("{topic}", &title_case(topic)),
        None => default_report_instruction(topic),
    }
}

/// Join per-thread corpus entries and cut the result to `budget` characters.
///
/// Truncation applies to the joined string, so earlier threads survive intact
/// before later ones are cut.
pub fn build_corpus(threads: &[Thread], budget: usize) -> String {
    let joined = threads
        .iter()
        .map(|t| format!("{} – {} [URL]({})", t.title, t.summary.gist, t.url))
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&joined, budget).to_string()
}

/// Number the questions as `Q1. ...`, one per line
pub fn question_block(questions: &[String]) -> String {
    questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("Q{}. {}", i + 1, q))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assemble the three-part synthesis prompt
pub fn report_messages(
    instruction: &str,
    threads: &[Thread],
    questions: &[String],
    budget: usize,
) -> Vec<ChatMessage> {
    let corpus = build_corpus(threads, budget);
    vec![
        ChatMessage::system(instruction),
        ChatMessage::assistant(format!("CORPUS ({} threads):\n{}", threads.len(), corpus)),
        ChatMessage::user(question_block(questions)),
    ]
}

/// Generate the report text with exactly one model call.
///
/// `template` overrides the default instruction; `{topic}` in it is replaced
/// with the title-cased topic.
pub async fn generate_report<M>(
    model: &M,
    model_name: &str,
    topic: &str,
    threads: &[Thread],
    questions: &[String],
    template: Option<&str>,
    budget: usize,
) -> Result<String, SynthesisError>
where
    M: LanguageModel + ?Sized,
{
    let instruction = render_instruction(template, topic);
    let messages = report_messages(&instruction, threads, questions, budget);
    let text = model.complete(model_name, &messages).await?;
    info!(topic, threads = threads.len(), chars = text.len(), "report generated");
    Ok(text)
}

/// Capitalise the first letter of each word, lowercase the rest
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
