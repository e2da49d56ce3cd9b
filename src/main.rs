//! Threadscribe CLI - forum research reports
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Instant;
use threadscribe::forum::{fetch_threads, RedditClient};
use threadscribe::llm::OpenAiClient;
use threadscribe::pipeline::PipelineSettings;
use threadscribe::progress::{ProgressEvent, RandomSampler};
use threadscribe::request::{default_forum_for, parse_questions, DEFAULT_QUESTIONS, DEFAULT_THREAD_COUNT};
use threadscribe::{export, logging, thread, Config, ResearchPipeline, ResearchRequest, ResearchSession};

#[derive(Parser)]
#[command(name = "threadscribe")]
#[command(author, version, about = "Forum research reports with cited LLM synthesis", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Path to a threadscribe.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, summarise and write a cited report
    Research {
        /// Topic or genre being researched
        #[arg(long, default_value = "horror")]
        topic: String,
        /// Forum (subreddit) to mine; defaults to one matching the topic
        #[arg(long)]
        forum: Option<String>,
        /// Number of threads to fetch
        #[arg(long, default_value_t = DEFAULT_THREAD_COUNT)]
        threads: usize,
        /// Research question (repeatable, at most five are used)
        #[arg(short, long = "question")]
        questions: Vec<String>,
        /// File with one research question per line
        #[arg(long)]
        questions_file: Option<PathBuf>,
        /// File holding a custom report instruction; `{topic}` is substituted
        #[arg(long)]
        instruction_file: Option<PathBuf>,
        /// Threads per summarisation request
        #[arg(long)]
        batch_size: Option<usize>,
        /// Output directory for threads.json and report.md
        #[arg(long)]
        out: Option<PathBuf>,
        /// Show the gist of every thread before the report
        #[arg(long)]
        gists: bool,
    },
    /// Fetch threads and print them as JSON
    Fetch {
        /// Forum (subreddit) to fetch from
        #[arg(long)]
        forum: String,
        /// Number of threads to fetch
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::configure_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Research {
            topic,
            forum,
            threads,
            questions,
            questions_file,
            instruction_file,
            batch_size,
            out,
            gists,
        } => {
            let forum = forum.unwrap_or_else(|| default_forum_for(&topic).to_string());

            let mut questions = questions;
            if let Some(path) = questions_file {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                questions.extend(parse_questions(&text));
            }
            if questions.is_empty() {
                questions = DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect();
            }

            let mut request = ResearchRequest::new(&topic, &forum, threads, questions);
            if let Some(path) = instruction_file {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                request = request.with_instruction(text);
            }

            let (client_id, client_secret) = config.reddit_credentials()?;
            let reddit = RedditClient::new(config.reddit.clone(), client_id, client_secret)?;
            let llm = OpenAiClient::new(
                config.llm.base_url.as_str(),
                config.openai_key()?,
                config.llm.request_timeout(),
            )?;

            let mut settings = PipelineSettings::from(&config);
            if let Some(size) = batch_size {
                settings.batch_size = size;
            }
            let pipeline = ResearchPipeline::new(&reddit, &llm, settings);

            println!(
                "Researching {} on r/{} ({} threads)...",
                request.topic.bold(),
                request.forum,
                request.thread_count
            );

            let started = Instant::now();
            let mut observer = |event: &ProgressEvent| print_progress(event, started);
            let mut sampler = RandomSampler::new();
            let mut session = ResearchSession::new();

            let report = pipeline
                .run(&request, &mut session, &mut observer, &mut sampler)
                .await
                .with_context(|| format!("research run failed while {}", session.stage()))?;

            println!(
                "{}",
                format!(
                    "Summarised {} of {} threads from r/{}.",
                    report.summarized_count, report.thread_count, report.forum
                )
                .green()
            );
            if report.is_degraded() {
                eprintln!(
                    "{}",
                    format!(
                        "Warning: {} threads had no usable summary; the report may be incomplete.",
                        report.thread_count - report.summarized_count
                    )
                    .yellow()
                );
            }

            if gists {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&thread::gist_listing(session.threads()))?
                );
            }

            let out_dir = out.unwrap_or_else(|| config.research.output_dir.join(&request.forum));
            let artifacts = export::write_artifacts(&out_dir, session.threads(), &report)?;

            println!("\n=== Audience-Driven Report ===\n");
            println!("{}", report.text);
            println!(
                "\nSaved {} and {} ({})",
                artifacts.threads.display(),
                artifacts.report.display(),
                elapsed(started)
            );
        }
        Commands::Fetch { forum, limit } => {
            let (client_id, client_secret) = config.reddit_credentials()?;
            let reddit = RedditClient::new(config.reddit.clone(), client_id, client_secret)?;

            let started = Instant::now();
            let threads = fetch_threads(&reddit, &forum, limit, |t| {
                eprintln!("[{}] fetched: {}", elapsed(started), preview(&t.title, 90));
            })
            .await?;

            println!("{}", serde_json::to_string_pretty(&threads)?);
        }
    }

    Ok(())
}

fn print_progress(event: &ProgressEvent, started: Instant) {
    let clock = elapsed(started);
    match event {
        ProgressEvent::StageChanged(stage) => {
            eprintln!("[{}] {}", clock, stage.to_string().cyan());
        }
        ProgressEvent::ThreadFetched { index, title } => {
            eprintln!("[{}] #{} {}", clock, index, preview(title, 90));
        }
        ProgressEvent::SummaryProgress(fraction) => {
            eprintln!("[{}] summarised {:.0}%", clock, fraction * 100.0);
        }
        ProgressEvent::BatchCompleted(batch) => {
            eprintln!(
                "[{}] batch {}/{}: {}… | random thread: {}",
                clock,
                batch.batch,
                batch.batches,
                preview(&batch.lead_title, 80),
                preview(&batch.sample_title, 90).italic()
            );
        }
    }
}

/// Elapsed time as mm:ss
fn elapsed(started: Instant) -> String {
    let secs = started.elapsed().as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
