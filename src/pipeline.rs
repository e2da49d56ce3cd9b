//! Research pipeline driver.
//!
//! Runs fetch, summarise and synthesise strictly in sequence. All state for a
//! run lives in a caller-owned [`ResearchSession`]; the pipeline itself keeps
//! nothing between runs.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::forum::{fetch_threads, FetchError, ForumSource};
use crate::llm::LanguageModel;
use crate::progress::{ProgressEvent, ProgressObserver, ThreadSampler};
use crate::report::{generate_report, Report, SynthesisError, CORPUS_BUDGET};
use crate::request::{RequestError, ResearchRequest};
use crate::summarize::{
    default_summary_instruction, summarize_threads, SummarizeError, SummarizeOptions,
    SummaryStats, DEFAULT_BATCH_SIZE,
};
use crate::thread::Thread;

/// Where a run currently is. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Idle,
    Fetching,
    Summarizing,
    Synthesizing,
    Done,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::Fetching => "fetching",
            Stage::Summarizing => "summarizing",
            Stage::Synthesizing => "synthesizing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid research request: {0}")]
    InvalidRequest(#[from] RequestError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Summarize(#[from] SummarizeError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error("session already used (stage: {0})")]
    SessionInUse(Stage),
}

/// Results of one run, owned by the caller.
#[derive(Debug)]
pub struct ResearchSession {
    stage: Stage,
    threads: Vec<Thread>,
    stats: Option<SummaryStats>,
    report: Option<Report>,
}

impl ResearchSession {
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            threads: Vec::new(),
            stats: None,
            report: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Threads fetched so far, summarised once the run passes summarisation
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn stats(&self) -> Option<SummaryStats> {
        self.stats
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }
}

impl Default for ResearchSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Model names and tuning for a pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub summary_model: String,
    pub report_model: String,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub corpus_budget: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            summary_model: "o3".to_string(),
            report_model: "o3".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: Duration::ZERO,
            corpus_budget: CORPUS_BUDGET,
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            summary_model: config.llm.summary_model.clone(),
            report_model: config.llm.report_model.clone(),
            batch_size: config.research.batch_size,
            batch_pause: config.research.batch_pause(),
            corpus_budget: config.research.corpus_budget,
        }
    }
}

type Observer<'o> = RefCell<&'o mut dyn ProgressObserver>;

pub struct ResearchPipeline<'a, S: ?Sized, M: ?Sized> {
    source: &'a S,
    model: &'a M,
    settings: PipelineSettings,
}

impl<'a, S, M> ResearchPipeline<'a, S, M>
where
    S: ForumSource + ?Sized,
    M: LanguageModel + ?Sized,
{
    pub fn new(source: &'a S, model: &'a M, settings: PipelineSettings) -> Self {
        Self {
            source,
            model,
            settings,
        }
    }

    /// Run the whole pipeline once into a fresh session.
    ///
    /// On error the session is left in [`Stage::Failed`] with whatever threads
    /// were gathered before the failure.
    pub async fn run(
        &self,
        request: &ResearchRequest,
        session: &mut ResearchSession,
        observer: &mut dyn ProgressObserver,
        sampler: &mut dyn ThreadSampler,
    ) -> Result<Report, PipelineError> {
        if session.stage != Stage::Idle {
            return Err(PipelineError::SessionInUse(session.stage));
        }

        let observer: Observer<'_> = RefCell::new(observer);
        let result = self.execute(request, session, &observer, sampler).await;
        if let Err(e) = &result {
            error!(stage = %session.stage, error = %e, "research run failed");
            enter(session, Stage::Failed, &observer);
        }
        result
    }

    async fn execute(
        &self,
        request: &ResearchRequest,
        session: &mut ResearchSession,
        observer: &Observer<'_>,
        sampler: &mut dyn ThreadSampler,
    ) -> Result<Report, PipelineError> {
        request.validate()?;

        enter(session, Stage::Fetching, observer);
        let mut index = 0;
        session.threads = fetch_threads(self.source, &request.forum, request.thread_count, |t| {
            index += 1;
            notify(
                observer,
                ProgressEvent::ThreadFetched {
                    index,
                    title: t.title.clone(),
                },
            );
        })
        .await?;

        enter(session, Stage::Summarizing, observer);
        let options = SummarizeOptions::new(self.settings.summary_model.as_str())
            .batch_size(self.settings.batch_size)
            .instruction(default_summary_instruction(&request.topic))
            .pause(self.settings.batch_pause);
        let stats = summarize_threads(
            self.model,
            &mut session.threads,
            &options,
            sampler,
            |fraction| notify(observer, ProgressEvent::SummaryProgress(fraction)),
            |preview| notify(observer, ProgressEvent::BatchCompleted(preview.clone())),
        )
        .await?;
        session.stats = Some(stats);

        enter(session, Stage::Synthesizing, observer);
        let text = generate_report(
            self.model,
            &self.settings.report_model,
            &request.topic,
            &session.threads,
            &request.questions,
            request.instruction.as_deref(),
            self.settings.corpus_budget,
        )
        .await?;

        let report = Report {
            topic: request.topic.clone(),
            forum: request.forum.clone(),
            text,
            thread_count: session.threads.len(),
            summarized_count: stats.summarized,
        };
        if report.is_degraded() {
            warn!(
                missing = report.thread_count - report.summarized_count,
                "report generated from incomplete summaries"
            );
        }
        session.report = Some(report.clone());

        enter(session, Stage::Done, observer);
        Ok(report)
    }
}

fn notify(observer: &Observer<'_>, event: ProgressEvent) {
    observer.borrow_mut().on_event(&event);
}

fn enter(session: &mut ResearchSession, stage: Stage, observer: &Observer<'_>) {
    info!(from = %session.stage, to = %stage, "stage transition");
    session.stage = stage;
    notify(observer, ProgressEvent::StageChanged(stage));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forum::RawItem;
    use crate::llm::{ChatMessage, LlmError};
    use crate::progress::Silent;
    use async_trait::async_trait;

    struct EmptyForum;

    #[async_trait]
    impl ForumSource for EmptyForum {
        async fn fetch(&self, forum_id: &str, _limit: usize) -> Result<Vec<RawItem>, FetchError> {
            if forum_id == "private" {
                return Err(FetchError::NotFoundOrForbidden(forum_id.to_string()));
            }
            Ok(Vec::new())
        }
    }

    struct Echo;

    #[async_trait]
    impl LanguageModel for Echo {
        async fn complete(&self, _model: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
            Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn empty_forum_still_produces_a_report() {
        let pipeline = ResearchPipeline::new(&EmptyForum, &Echo, PipelineSettings::default());
        let request = ResearchRequest::new("horror", "horror", 10, ["Why?"]);
        let mut session = ResearchSession::new();
        let mut stages = Vec::new();
        let mut observer = |e: &ProgressEvent| {
            if let ProgressEvent::StageChanged(s) = e {
                stages.push(*s);
            }
        };
        let mut sampler = |_: usize| 0usize;

        let report = pipeline
            .run(&request, &mut session, &mut observer, &mut sampler)
            .await
            .unwrap();

        assert_eq!(report.text, "Q1. Why?");
        assert_eq!(report.thread_count, 0);
        assert_eq!(session.stage(), Stage::Done);
        assert_eq!(
            stages,
            [Stage::Fetching, Stage::Summarizing, Stage::Synthesizing, Stage::Done]
        );
    }

    #[tokio::test]
    async fn fetch_failure_marks_session_failed() {
        let pipeline = ResearchPipeline::new(&EmptyForum, &Echo, PipelineSettings::default());
        let request = ResearchRequest::new("horror", "private", 10, ["Why?"]);
        let mut session = ResearchSession::new();
        let mut sampler = |_: usize| 0usize;

        let err = pipeline
            .run(&request, &mut session, &mut Silent, &mut sampler)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Fetch(FetchError::NotFoundOrForbidden(_))));
        assert_eq!(session.stage(), Stage::Failed);
        assert!(session.report().is_none());
    }

    #[tokio::test]
    async fn sessions_are_single_use() {
        let pipeline = ResearchPipeline::new(&EmptyForum, &Echo, PipelineSettings::default());
        let request = ResearchRequest::new("horror", "horror", 1, ["Why?"]);
        let mut session = ResearchSession::new();
        let mut sampler = |_: usize| 0usize;

        pipeline
            .run(&request, &mut session, &mut Silent, &mut sampler)
            .await
            .unwrap();
        let err = pipeline
            .run(&request, &mut session, &mut Silent, &mut sampler)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SessionInUse(Stage::Done)));
    }

    #[tokio::test]
    async fn invalid_request_fails_before_fetching() {
        let pipeline = ResearchPipeline::new(&EmptyForum, &Echo, PipelineSettings::default());
        let request = ResearchRequest::new("horror", "horror", 1, Vec::<String>::new());
        let mut session = ResearchSession::new();
        let mut sampler = |_: usize| 0usize;

        let err = pipeline
            .run(&request, &mut session, &mut Silent, &mut sampler)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(RequestError::NoQuestions)));
        assert_eq!(session.stage(), Stage::Failed);
    }
}
