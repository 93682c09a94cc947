//! Search provider backed by the `yt-dlp` command line tool.
//!
//! Runs `yt-dlp --flat-playlist --dump-json ytsearchN:<query>` and turns each
//! JSON line into a candidate as it arrives. The child process is killed when
//! the returned stream is dropped.

use super::{CandidateStream, RateLimiter, SearchProvider};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use shared::config::SearchConfig;
use shared::{CandidateVideo, SearchError};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One line of `--dump-json` output in flat-playlist mode
#[derive(Debug, Deserialize)]
struct SearchEntry {
    id: String,
    title: Option<String>,
    duration: Option<f64>,
    url: Option<String>,
    webpage_url: Option<String>,
}

/// Parse one output line; entries without a title or duration are skipped.
fn parse_entry(line: &str) -> Option<CandidateVideo> {
    let entry: SearchEntry = serde_json::from_str(line).ok()?;
    let duration = entry.duration.filter(|d| d.is_finite() && *d >= 0.0)?;
    let title = entry.title?;

    let source_url = entry
        .webpage_url
        .or(entry.url)
        .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={}", entry.id));

    Some(CandidateVideo {
        title,
        duration_seconds: duration.round() as u32,
        source_id: entry.id,
        source_url,
    })
}

/// Map a failed run to a search error using its exit code and stderr.
fn classify_failure(exit_code: Option<i32>, stderr: &str) -> SearchError {
    let message = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("no error output")
        .to_string();

    if stderr.contains("HTTP Error 429") || stderr.contains("Too Many Requests") {
        return SearchError::RateLimited(message);
    }

    match exit_code {
        Some(code) => SearchError::Unavailable(format!("yt-dlp exited with code {}: {}", code, message)),
        None => SearchError::Unavailable(format!("yt-dlp was terminated: {}", message)),
    }
}

/// A running search whose output has not been fully read
struct SearchProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: JoinHandle<String>,
    finished: bool,
}

async fn next_candidate(
    mut process: SearchProcess,
) -> Option<(Result<CandidateVideo, SearchError>, SearchProcess)> {
    if process.finished {
        return None;
    }

    loop {
        match process.lines.next_line().await {
            Ok(Some(line)) => match parse_entry(&line) {
                Some(candidate) => return Some((Ok(candidate), process)),
                None => debug!(line = %line, "Skipping search entry without title or duration"),
            },
            Ok(None) => {
                process.finished = true;
                let status = match process.child.wait().await {
                    Ok(status) => status,
                    Err(e) => {
                        let error = SearchError::Unavailable(format!("failed to wait for yt-dlp: {}", e));
                        return Some((Err(error), process));
                    }
                };

                if status.success() {
                    return None;
                }

                let stderr = (&mut process.stderr).await.unwrap_or_default();
                let error = classify_failure(status.code(), &stderr);
                warn!(error = %error, "yt-dlp search failed");
                return Some((Err(error), process));
            }
            Err(e) => {
                process.finished = true;
                let error = SearchError::Unavailable(format!("failed to read yt-dlp output: {}", e));
                return Some((Err(error), process));
            }
        }
    }
}

/// `yt-dlp` search with a client-side rate limit
pub struct YtDlpSearchProvider {
    program: String,
    limiter: Mutex<RateLimiter>,
}

impl YtDlpSearchProvider {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            program: config.yt_dlp_path.clone(),
            limiter: Mutex::new(RateLimiter::from_config(&config.rate_limit)),
        }
    }
}

#[async_trait]
impl SearchProvider for YtDlpSearchProvider {
    async fn search(&self, query: &str, limit: usize) -> Result<CandidateStream, SearchError> {
        self.limiter.lock().await.acquire().await;

        let search_term = format!("ytsearch{}:{}", limit.max(1), query);
        info!(query = %query, limit = limit, "Searching catalog");

        let mut child = Command::new(&self.program)
            .args(["--flat-playlist", "--dump-json", "--no-warnings", "--ignore-config"])
            .arg(&search_term)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SearchError::Unavailable(format!("{} not found", self.program))
                } else {
                    SearchError::Unavailable(format!("failed to start {}: {}", self.program, e))
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SearchError::Unavailable("yt-dlp stdout not captured".to_string()))?;

        let mut stderr_pipe = child.stderr.take();
        let stderr = tokio::spawn(async move {
            let mut output = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut output).await;
            }
            output
        });

        let process = SearchProcess {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr,
            finished: false,
        };

        Ok(stream::unfold(process, next_candidate).boxed())
    }
}
