//! External-process strategy: last resort via a yt-dlp subprocess.
//!
//! A fresh process brings its own cookie jar, DNS cache, and extractor
//! retries, which sometimes succeeds after every in-process path has
//! exhausted itself. The binary is located in PATH at construction; the
//! JSON dump (`-J`) is parsed for the best audio format.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::resolver::error::ErrorKind;
use crate::resolver::model::{
    CandidateRelay, ResolutionRequest, ResolutionResult, StrategyDescriptor, StrategyOutcome,
};
use crate::resolver::strategy::{ResolveStrategy, EXTERNAL_TIMEOUT};

pub struct ExternalProcessStrategy {
    /// Path to the yt-dlp binary.
    binary: String,
    /// Additional arguments appended before the URL.
    extra_args: Vec<String>,
}

impl ExternalProcessStrategy {
    /// Create the strategy, searching for the binary in PATH.
    #[must_use]
    pub fn new() -> Self {
        let binary = which::which("yt-dlp")
            .map_or_else(|_| "yt-dlp".to_string(), |p| p.to_string_lossy().to_string());
        Self {
            binary,
            extra_args: Vec::new(),
        }
    }

    /// Specify a custom binary path.
    #[must_use]
    pub fn with_binary_path(mut self, path: &str) -> Self {
        self.binary = path.to_string();
        self
    }

    /// Append extra yt-dlp arguments.
    #[must_use]
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn build_args(&self, request: &ResolutionRequest, relay: Option<&CandidateRelay>) -> Vec<String> {
        let mut args = vec![
            "-J".to_string(),
            "--no-warnings".to_string(),
            "--format".to_string(),
            "bestaudio/best".to_string(),
            "--geo-bypass".to_string(),
            "--socket-timeout".to_string(),
            "15".to_string(),
        ];

        if let Some(relay) = relay {
            args.push("--proxy".to_string());
            args.push(relay.proxy_url());
        }

        args.extend(self.extra_args.clone());
        args.push(request.media.watch_url());
        args
    }

    /// Map yt-dlp stderr to the closed failure set.
    fn classify_stderr(stderr: &str) -> ErrorKind {
        let lowered = stderr.to_lowercase();
        if lowered.contains("sign in") || lowered.contains("login") || lowered.contains("cookies") {
            ErrorKind::AuthRequired
        } else if lowered.contains("country") || lowered.contains("geo restriction") {
            ErrorKind::GeoRestricted
        } else if lowered.contains("429") || lowered.contains("rate-limit") {
            ErrorKind::RateLimited
        } else if lowered.contains("timed out") || lowered.contains("timeout") {
            ErrorKind::NetworkTimeout
        } else if lowered.contains("video unavailable") || lowered.contains("no video formats") {
            ErrorKind::NoMediaFound
        } else {
            ErrorKind::Unclassified
        }
    }

    /// Extract the best audio URL plus metadata from a `-J` info dump:
    /// audio-only formats by descending bitrate, then the top-level URL.
    fn parse_info(info: &Value) -> Option<(String, Option<String>)> {
        if let Some(formats) = info["formats"].as_array() {
            let mut audio: Vec<&Value> = formats
                .iter()
                .filter(|f| {
                    f["acodec"].as_str().is_some_and(|a| a != "none")
                        && f["vcodec"].as_str().map_or(true, |v| v == "none")
                        && f["url"].is_string()
                })
                .collect();

            audio.sort_by(|a, b| {
                let abr_a = a["abr"].as_f64().unwrap_or(0.0);
                let abr_b = b["abr"].as_f64().unwrap_or(0.0);
                abr_b.partial_cmp(&abr_a).unwrap_or(std::cmp::Ordering::Equal)
            });

            if let Some(best) = audio.first() {
                let ext = best["ext"].as_str().map(|e| format!("audio/{e}"));
                return Some((best["url"].as_str().unwrap_or_default().to_string(), ext));
            }
        }

        info["url"].as_str().map(|url| (url.to_string(), None))
    }
}

impl Default for ExternalProcessStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResolveStrategy for ExternalProcessStrategy {
    fn descriptor(&self) -> StrategyDescriptor {
        StrategyDescriptor {
            name: "external-process",
            priority: 4,
            attempt_timeout: EXTERNAL_TIMEOUT,
            needs_relay: false,
            needs_credentials: false,
        }
    }

    async fn attempt(
        &self,
        request: &ResolutionRequest,
        relay: Option<&CandidateRelay>,
    ) -> StrategyOutcome {
        let start = Instant::now();
        let name = self.descriptor().name;
        let args = self.build_args(request, relay);
        debug!(request = %request.id, binary = %self.binary, ?args, "spawning extractor process");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                return StrategyOutcome::failure(
                    name,
                    ErrorKind::Unclassified,
                    format!("failed to spawn {}: {err}", self.binary),
                    start.elapsed(),
                );
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let kind = Self::classify_stderr(&stderr);
            warn!(request = %request.id, %kind, "extractor process failed");
            let detail = stderr.lines().last().unwrap_or("process failed").to_string();
            return StrategyOutcome::failure(name, kind, detail, start.elapsed());
        }

        let info: Value = match serde_json::from_slice(&output.stdout) {
            Ok(info) => info,
            Err(err) => {
                return StrategyOutcome::failure(
                    name,
                    ErrorKind::Unclassified,
                    format!("info dump parse: {err}"),
                    start.elapsed(),
                );
            }
        };

        match Self::parse_info(&info) {
            Some((url, mime)) if !url.is_empty() => {
                let elapsed = start.elapsed();
                let result = ResolutionResult {
                    url,
                    title: info["title"].as_str().unwrap_or("Unknown Title").to_string(),
                    author: info["uploader"].as_str().unwrap_or("Unknown Artist").to_string(),
                    thumbnail: info["thumbnail"].as_str().map(String::from),
                    duration_seconds: info["duration"].as_u64().unwrap_or(0),
                    mime_type: mime,
                    strategy: name,
                    elapsed,
                };
                StrategyOutcome::success(name, result, elapsed)
            }
            _ => StrategyOutcome::failure(
                name,
                ErrorKind::NoMediaFound,
                "no audio URL in extractor output",
                start.elapsed(),
            ),
        }
    }
}
