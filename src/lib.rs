//! # Threadscribe
//!
//! Forum research assistant: fetches discussion threads, condenses each into a
//! structured summary with an LLM, and synthesises a cited report that answers
//! a set of research questions.
//!
//! ## Pipeline
//!
//! - **Fetch**: [`forum::fetch_threads`] over any [`forum::ForumSource`] (Reddit via [`forum::RedditClient`])
//! - **Summarise**: [`summarize::summarize_threads`] in order-preserving batches, tolerant of bad model output
//! - **Synthesise**: [`report::generate_report`], one model call over a bounded corpus
//!
//! [`pipeline::ResearchPipeline`] drives the three stages into a caller-owned
//! [`pipeline::ResearchSession`].

pub mod config;
pub mod export;
pub mod forum;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod request;
pub mod summarize;
pub mod thread;

/// Log target for language model traffic
pub const TARGET_LLM_REQUEST: &str = "llm_request";
/// Log target for forum HTTP traffic
pub const TARGET_WEB_REQUEST: &str = "web_request";

pub use config::Config;
pub use pipeline::{ResearchPipeline, ResearchSession, Stage};
pub use report::Report;
pub use request::ResearchRequest;
pub use thread::{Sentiment, Summary, Thread};
