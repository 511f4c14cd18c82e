//! Black-box upstream provider client.
//!
//! The engine depends only on the [`UpstreamClient`] trait: give it an
//! identifier plus request-shape options (identity, optional relay,
//! optional credentials) and get back a media candidate or a classified
//! error. The shipped implementation speaks the innertube player shape:
//! one POST to the player endpoint, then audio format selection from the
//! streaming data in the response.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, Proxy, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::credentials::CredentialBundle;
use crate::identity::ClientIdentity;
use crate::resolver::error::ErrorKind;
use crate::resolver::model::{CandidateRelay, MediaId};

/// Classified failure of one upstream call.
#[derive(Debug, Clone)]
pub struct CallError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl CallError {
    #[must_use]
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Stream candidate as reported by the upstream, before validation.
#[derive(Debug, Clone)]
pub struct MediaCandidate {
    pub url: String,
    pub title: String,
    pub author: String,
    pub thumbnail: Option<String>,
    pub duration_seconds: u64,
    pub mime_type: Option<String>,
}

/// Request-shape options for one call.
pub struct CallOptions<'a> {
    pub identity: &'a ClientIdentity,
    pub relay: Option<&'a CandidateRelay>,
    pub credentials: Option<&'a CredentialBundle>,
    /// Internal timeout for this call; the deadline governor still bounds
    /// the attempt from outside.
    pub timeout: Duration,
}

/// Abstract upstream provider.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn player(
        &self,
        media: &MediaId,
        opts: &CallOptions<'_>,
    ) -> std::result::Result<MediaCandidate, CallError>;
}

/// Innertube-speaking implementation.
pub struct InnerTubeClient {
    /// Shared client for relay-less calls.
    direct: Client,
    connect_timeout: Duration,
}

impl InnerTubeClient {
    pub fn new() -> Result<Self> {
        let connect_timeout = Duration::from_secs(8);
        Ok(Self {
            direct: Self::build_client(connect_timeout, None)?,
            connect_timeout,
        })
    }

    fn build_client(connect_timeout: Duration, relay: Option<&CandidateRelay>) -> Result<Client> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .http2_adaptive_window(true)
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .gzip(true)
            .brotli(true)
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(5));

        if let Some(relay) = relay {
            builder = builder.proxy(Proxy::all(relay.proxy_url())?);
        }

        Ok(builder.build()?)
    }

    fn payload(media: &MediaId, identity: &ClientIdentity) -> Value {
        json!({
            "context": identity.context(),
            "videoId": media.as_str(),
            "playbackContext": {
                "contentPlaybackContext": {
                    "html5Preference": "HTML5_PREF_WANTS",
                    "referer": format!("https://{}/watch?v={}", identity.host, media.as_str()),
                }
            },
            "racyCheckOk": true,
            "contentCheckOk": true,
        })
    }

    fn classify_status(status: StatusCode) -> ErrorKind {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::AuthRequired,
            StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimited,
            StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => ErrorKind::GeoRestricted,
            _ => ErrorKind::Unclassified,
        }
    }

    fn classify_playability(data: &Value) -> Option<CallError> {
        let playability = &data["playabilityStatus"];
        let status = playability["status"].as_str().unwrap_or("OK");
        if status == "OK" {
            return None;
        }

        let reason = playability["reason"].as_str().unwrap_or(status).to_string();
        let lowered = reason.to_lowercase();

        let kind = match status {
            "LOGIN_REQUIRED" | "AGE_VERIFICATION_REQUIRED" => ErrorKind::AuthRequired,
            _ if lowered.contains("country") || lowered.contains("region") || lowered.contains("location") => {
                ErrorKind::GeoRestricted
            }
            _ => ErrorKind::NoMediaFound,
        };

        Some(CallError::new(kind, reason))
    }

    /// Pick the best audio stream: audio-only adaptive formats first
    /// (highest bitrate wins), then any adaptive format carrying audio,
    /// then the first muxed format as a last resort.
    fn select_audio(data: &Value) -> Option<(String, Option<String>)> {
        let streaming = &data["streamingData"];
        let adaptive = streaming["adaptiveFormats"].as_array();

        if let Some(formats) = adaptive {
            let mut audio: Vec<&Value> = formats
                .iter()
                .filter(|f| {
                    f["mimeType"].as_str().is_some_and(|m| m.starts_with("audio/"))
                        && f["url"].is_string()
                })
                .collect();

            if audio.is_empty() {
                audio = formats
                    .iter()
                    .filter(|f| {
                        f["mimeType"].as_str().is_some_and(|m| m.contains("audio"))
                            && f["url"].is_string()
                    })
                    .collect();
            }

            audio.sort_by_key(|f| std::cmp::Reverse(f["bitrate"].as_u64().unwrap_or(0)));

            if let Some(best) = audio.first() {
                let mime = best["mimeType"]
                    .as_str()
                    .map(|m| m.split(';').next().unwrap_or(m).trim().to_string());
                return Some((best["url"].as_str().unwrap_or_default().to_string(), mime));
            }
        }

        // Muxed fallback.
        streaming["formats"]
            .as_array()
            .and_then(|formats| formats.iter().find(|f| f["url"].is_string()))
            .map(|f| {
                let mime = f["mimeType"]
                    .as_str()
                    .map(|m| m.split(';').next().unwrap_or(m).trim().to_string());
                (f["url"].as_str().unwrap_or_default().to_string(), mime)
            })
    }

    fn candidate_from(data: &Value, url: String, mime: Option<String>) -> MediaCandidate {
        let details = &data["videoDetails"];
        let thumbnail = details["thumbnail"]["thumbnails"]
            .as_array()
            .and_then(|t| t.last())
            .and_then(|t| t["url"].as_str())
            .map(String::from);

        MediaCandidate {
            url,
            title: details["title"].as_str().unwrap_or("Unknown Title").to_string(),
            author: details["author"].as_str().unwrap_or("Unknown Artist").to_string(),
            thumbnail,
            duration_seconds: details["lengthSeconds"]
                .as_str()
                .and_then(|s| s.parse().ok())
                .or_else(|| details["lengthSeconds"].as_u64())
                .unwrap_or(0),
            mime_type: mime,
        }
    }
}

#[async_trait]
impl UpstreamClient for InnerTubeClient {
    async fn player(
        &self,
        media: &MediaId,
        opts: &CallOptions<'_>,
    ) -> std::result::Result<MediaCandidate, CallError> {
        // Relayed calls need a per-call client carrying the proxy; the
        // shared pooled client serves everything else.
        let scratch;
        let client = match opts.relay {
            Some(relay) => {
                scratch = Self::build_client(self.connect_timeout, Some(relay)).map_err(|e| {
                    CallError::new(ErrorKind::Unclassified, format!("relay client: {e}"))
                })?;
                &scratch
            }
            None => &self.direct,
        };

        let visitor = opts.credentials.and_then(CredentialBundle::visitor_id);
        let mut request = client
            .post(opts.identity.player_endpoint())
            .headers(opts.identity.to_headers(visitor))
            .timeout(opts.timeout)
            .json(&Self::payload(media, opts.identity));

        if let Some(bundle) = opts.credentials {
            if !bundle.is_empty() {
                request = request.header(reqwest::header::COOKIE, bundle.cookie_header());
            }
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                CallError::new(ErrorKind::NetworkTimeout, err.to_string())
            } else {
                CallError::new(ErrorKind::Unclassified, err.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let kind = Self::classify_status(status);
            warn!(%status, media = %media, "player endpoint rejected call");
            return Err(CallError::new(kind, format!("upstream status {status}")));
        }

        let data: Value = response.json().await.map_err(|err| {
            CallError::new(ErrorKind::Unclassified, format!("response parse: {err}"))
        })?;

        if let Some(err) = Self::classify_playability(&data) {
            debug!(media = %media, kind = %err.kind, detail = %err.detail, "unplayable");
            return Err(err);
        }

        match Self::select_audio(&data) {
            Some((url, _)) if url.is_empty() => Err(CallError::new(
                ErrorKind::NoMediaFound,
                "format listed without a direct URL",
            )),
            Some((url, mime)) => Ok(Self::candidate_from(&data, url, mime)),
            None => Err(CallError::new(
                ErrorKind::NoMediaFound,
                "no audio formats in streaming data",
            )),
        }
    }
}
