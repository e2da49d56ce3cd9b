//! Run artifacts written at the end of a CLI research run.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::report::Report;
use crate::thread::Thread;

pub const THREADS_FILE: &str = "threads.json";
pub const REPORT_FILE: &str = "report.md";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Paths of the files written for a run
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub threads: PathBuf,
    pub report: PathBuf,
}

/// Write the fetched threads as JSON and the report as markdown into `dir`
pub fn write_artifacts<P: AsRef<Path>>(
    dir: P,
    threads: &[Thread],
    report: &Report,
) -> Result<Artifacts, ExportError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let threads_path = dir.join(THREADS_FILE);
    fs::write(&threads_path, serde_json::to_vec_pretty(threads)?)?;

    let report_path = dir.join(REPORT_FILE);
    fs::write(&report_path, &report.text)?;

    Ok(Artifacts {
        threads: threads_path,
        report: report_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn writes_threads_and_report() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run");
        let threads = vec![Thread::new(
            "t1",
            "Title",
            "body",
            "comments",
            "https://reddit.test/t1",
            NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        )];
        let report = Report {
            topic: "horror".into(),
            forum: "horror".into(),
            text: "# Report\n".into(),
            thread_count: 1,
            summarized_count: 0,
        };

        let artifacts = write_artifacts(&out, &threads, &report).unwrap();

        let saved: Vec<Thread> =
            serde_json::from_slice(&fs::read(&artifacts.threads).unwrap()).unwrap();
        assert_eq!(saved, threads);
        assert_eq!(fs::read_to_string(&artifacts.report).unwrap(), "# Report\n");
    }
}
