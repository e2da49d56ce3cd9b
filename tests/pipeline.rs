//! End-to-end runs of the research pipeline against in-memory collaborators.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

use threadscribe::forum::{fetch_threads, FetchError, ForumSource, RawComment, RawItem};
use threadscribe::llm::{ChatMessage, LanguageModel, LlmError, Role};
use threadscribe::pipeline::{PipelineError, PipelineSettings};
use threadscribe::progress::{ProgressEvent, RandomSampler};
use threadscribe::report::{generate_report, SynthesisError, CORPUS_BUDGET};
use threadscribe::{ResearchPipeline, ResearchRequest, ResearchSession, Stage, Thread};

/// Forum with `n` posts, newest first
struct FakeForum {
    items: Vec<RawItem>,
}

impl FakeForum {
    fn with_posts(n: usize) -> Self {
        let items = (0..n)
            .map(|i| {
                let letter = (b'A' + (i % 26) as u8) as char;
                RawItem {
                    id: format!("t{}", i),
                    title: format!("Thread {}", letter),
                    body: format!("Body of post {}", i),
                    comments: vec![RawComment {
                        body: format!("comment on {}", i),
                    }],
                    url: format!("https://www.reddit.com/r/horror/comments/t{}/", i),
                    created_utc: 1_750_000_000 - (i as i64) * 3600,
                }
            })
            .collect();
        Self { items }
    }
}

#[async_trait]
impl ForumSource for FakeForum {
    async fn fetch(&self, _forum_id: &str, limit: usize) -> Result<Vec<RawItem>, FetchError> {
        Ok(self.items.iter().take(limit).cloned().collect())
    }
}

/// Model that answers summary batches with a fixed reply and records requests
struct RecordingModel {
    summary_reply: Box<dyn Fn(&[ChatMessage]) -> String + Send + Sync>,
    report_error: bool,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl RecordingModel {
    fn new(summary_reply: impl Fn(&[ChatMessage]) -> String + Send + Sync + 'static) -> Self {
        Self {
            summary_reply: Box::new(summary_reply),
            report_error: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

fn is_report_request(messages: &[ChatMessage]) -> bool {
    messages.len() == 3 && messages[1].role == Role::Assistant
}

#[async_trait]
impl LanguageModel for RecordingModel {
    async fn complete(&self, _model: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        if is_report_request(messages) {
            if self.report_error {
                return Err(LlmError::EmptyResponse);
            }
            return Ok("## Report\nSee [Thread A](https://example)".to_string());
        }
        Ok((self.summary_reply)(messages))
    }
}

/// Summarise every id in the batch payload
fn summarise_all(messages: &[ChatMessage]) -> String {
    let payload: serde_json::Value = serde_json::from_str(&messages[1].content).unwrap();
    let entries: serde_json::Map<String, serde_json::Value> = payload
        .as_object()
        .unwrap()
        .keys()
        .map(|id| {
            (
                id.clone(),
                serde_json::json!({
                    "gist": format!("gist for {}", id),
                    "insight1": "one",
                    "insight2": "two",
                    "sentiment": "mixed"
                }),
            )
        })
        .collect();
    serde_json::Value::Object(entries).to_string()
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        batch_size: 6,
        ..PipelineSettings::default()
    }
}

fn request(threads: usize) -> ResearchRequest {
    ResearchRequest::new(
        "horror",
        "horror",
        threads,
        ["What tropes feel over-used?", "What excites this audience?"],
    )
}

#[tokio::test]
async fn twelve_threads_take_two_batches() {
    let forum = FakeForum::with_posts(12);
    let model = RecordingModel::new(summarise_all);
    let pipeline = ResearchPipeline::new(&forum, &model, settings());

    let mut session = ResearchSession::new();
    let mut events = Vec::new();
    let mut observer = |e: &ProgressEvent| events.push(e.clone());
    let mut sampler = RandomSampler::seeded(42);

    let report = pipeline
        .run(&request(12), &mut session, &mut observer, &mut sampler)
        .await
        .unwrap();

    let requests = model.requests();
    let summary_calls = requests.iter().filter(|m| !is_report_request(m)).count();
    let report_calls = requests.iter().filter(|m| is_report_request(m)).count();
    assert_eq!(summary_calls, 2);
    assert_eq!(report_calls, 1);

    let progress: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::SummaryProgress(f) => Some(*f),
            _ => None,
        })
        .collect();
    assert_eq!(progress, [0.5, 1.0]);

    let fetched = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::ThreadFetched { .. }))
        .count();
    assert_eq!(fetched, 12);

    let leads: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::BatchCompleted(p) => Some(p.lead_title.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(leads, ["Thread A", "Thread G"]);

    assert_eq!(session.stage(), Stage::Done);
    assert!(session.threads().iter().all(Thread::is_summarized));
    assert!(!report.is_degraded());
    assert_eq!(report.text, "## Report\nSee [Thread A](https://example)");

    let synthesis = requests.last().unwrap();
    assert!(synthesis[0].content.contains("**Horror**"));
    assert!(synthesis[1].content.starts_with("CORPUS (12 threads):\nThread A – gist for t0 [URL]("));
    assert_eq!(
        synthesis[2].content,
        "Q1. What tropes feel over-used?\nQ2. What excites this audience?"
    );
}

#[tokio::test]
async fn empty_mappings_degrade_to_blank_gists() {
    let forum = FakeForum::with_posts(3);
    let model = RecordingModel::new(|_| "{}".to_string());
    let pipeline = ResearchPipeline::new(&forum, &model, settings());

    let mut session = ResearchSession::new();
    let mut sampler = RandomSampler::seeded(1);
    let report = pipeline
        .run(&request(3), &mut session, &mut |_: &ProgressEvent| {}, &mut sampler)
        .await
        .unwrap();

    assert!(report.is_degraded());
    assert_eq!(report.summarized_count, 0);
    assert!(session.threads().iter().all(|t| t.summary.is_empty()));

    let requests = model.requests();
    let corpus = &requests.last().unwrap()[1].content;
    assert!(corpus.contains("Thread A –  [URL](https://www.reddit.com/r/horror/comments/t0/)"));
    assert!(corpus.contains("Thread C –  [URL]("));
}

#[tokio::test]
async fn garbage_batch_is_isolated() {
    let forum = FakeForum::with_posts(8);
    let calls = Mutex::new(0usize);
    let model = RecordingModel::new(move |messages| {
        let mut n = calls.lock().unwrap();
        *n += 1;
        if *n == 1 {
            "The threads discuss horror.".to_string()
        } else {
            summarise_all(messages)
        }
    });
    let pipeline = ResearchPipeline::new(&forum, &model, settings());

    let mut session = ResearchSession::new();
    let mut sampler = RandomSampler::seeded(3);
    let report = pipeline
        .run(&request(8), &mut session, &mut |_: &ProgressEvent| {}, &mut sampler)
        .await
        .unwrap();

    let threads = session.threads();
    assert!(threads[..6].iter().all(|t| t.summary.is_empty()));
    assert!(threads[6..].iter().all(Thread::is_summarized));
    assert_eq!(report.summarized_count, 2);
    assert_eq!(session.stats().unwrap().failed_batches, 1);
}

#[tokio::test]
async fn synthesis_failure_aborts_without_report() {
    let forum = FakeForum::with_posts(2);
    let mut model = RecordingModel::new(summarise_all);
    model.report_error = true;
    let pipeline = ResearchPipeline::new(&forum, &model, settings());

    let mut session = ResearchSession::new();
    let mut sampler = RandomSampler::seeded(5);
    let err = pipeline
        .run(&request(2), &mut session, &mut |_: &ProgressEvent| {}, &mut sampler)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Synthesis(SynthesisError::Model(_))));
    assert_eq!(session.stage(), Stage::Failed);
    assert!(session.report().is_none());
    assert_eq!(session.threads().len(), 2);
}

#[tokio::test]
async fn zero_questions_still_make_one_call() {
    let model = RecordingModel::new(summarise_all);
    let threads: Vec<Thread> = Vec::new();

    generate_report(&model, "o3", "horror", &threads, &[], Some("instr"), CORPUS_BUDGET)
        .await
        .unwrap();

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0][0].content, "instr");
    assert_eq!(requests[0][2].content, "");
}

#[tokio::test]
async fn fetch_respects_limit_order_and_uniqueness() {
    let forum = FakeForum::with_posts(20);
    for limit in [0, 1, 7, 20, 50] {
        let threads = fetch_threads(&forum, "horror", limit, |_| {}).await.unwrap();
        assert!(threads.len() <= limit);
        assert_eq!(threads.len(), limit.min(20));

        let ids: HashSet<&str> = threads.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), threads.len());
        assert!(threads.windows(2).all(|w| w[0].created >= w[1].created));
    }
}
