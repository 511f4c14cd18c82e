//! Client identity profiles for upstream requests.
//!
//! The upstream provider reacts differently depending on the declared
//! client: the default web shape trips restrictions the android and
//! music shapes sometimes bypass. Each profile carries the client
//! name/version pair, the host form to target, and a realistic
//! user agent picked from a small rotating pool.

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT};
use serde_json::{json, Value};

/// Desktop and mobile user agents with real market share.
static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
        "Mozilla/5.0 (Linux; Android 13; SM-S901B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/134.0.0.0 Mobile Safari/537.36",
    ]
});

/// One request shape the upstream recognizes.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// Short lowercase profile name (e.g. `"web"`, `"android"`).
    pub name: &'static str,
    /// Declared client name in the request context.
    pub client_name: &'static str,
    /// Numeric client id sent as a header.
    pub client_id: &'static str,
    /// Declared client version.
    pub client_version: &'static str,
    /// Host form to target.
    pub host: &'static str,
    /// User agent for this session.
    pub user_agent: String,
}

/// Default web client.
#[must_use]
pub fn web_identity() -> ClientIdentity {
    ClientIdentity {
        name: "web",
        client_name: "WEB",
        client_id: "1",
        client_version: "2.20250310.01.00",
        host: "www.youtube.com",
        user_agent: random_user_agent(),
    }
}

/// Android client; historically the most permissive shape for plain
/// stream extraction.
#[must_use]
pub fn android_identity() -> ClientIdentity {
    ClientIdentity {
        name: "android",
        client_name: "ANDROID",
        client_id: "3",
        client_version: "19.09.37",
        host: "www.youtube.com",
        user_agent: "com.google.android.youtube/19.09.37 (Linux; U; Android 13) gzip".to_string(),
    }
}

/// Music web client; alternate host and context known to bypass some
/// restrictions the primary shape triggers.
#[must_use]
pub fn music_identity() -> ClientIdentity {
    ClientIdentity {
        name: "web-remix",
        client_name: "WEB_REMIX",
        client_id: "67",
        client_version: "1.20250310.01.00",
        host: "music.youtube.com",
        user_agent: random_user_agent(),
    }
}

/// Pick a user agent from the pool.
#[must_use]
pub fn random_user_agent() -> String {
    let mut rng = rand::thread_rng();
    (*USER_AGENTS.choose(&mut rng).expect("pool is non-empty")).to_string()
}

impl ClientIdentity {
    /// Player endpoint for this identity's host form.
    #[must_use]
    pub fn player_endpoint(&self) -> String {
        format!("https://{}/youtubei/v1/player?prettyPrint=false", self.host)
    }

    /// Request headers for this identity. `visitor_id` comes from the
    /// credential bundle when one is attached.
    #[must_use]
    pub fn to_headers(&self, visitor_id: Option<&str>) -> HeaderMap {
        let origin = format!("https://{}", self.host);
        let referer = format!("https://{}/", self.host);

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&self.user_agent));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-GB,en-US;q=0.9,en;q=0.8"),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ORIGIN, header_value(&origin));
        headers.insert(REFERER, header_value(&referer));
        headers.insert("X-YouTube-Client-Name", HeaderValue::from_static(self.client_id));
        headers.insert(
            "X-YouTube-Client-Version",
            HeaderValue::from_static(self.client_version),
        );
        headers.insert("X-Origin", header_value(&origin));
        if let Some(visitor) = visitor_id {
            headers.insert("X-Goog-Visitor-Id", header_value(visitor));
        }
        headers
    }

    /// Innertube request context for this identity.
    #[must_use]
    pub fn context(&self) -> Value {
        json!({
            "client": {
                "clientName": self.client_name,
                "clientVersion": self.client_version,
                "hl": "en",
                "gl": "US",
                "utcOffsetMinutes": 0,
            },
            "user": { "lockedSafetyMode": false },
            "request": {
                "useSsl": true,
                "internalExperimentFlags": [],
                "consistencyTokenJars": [],
            }
        })
    }
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}
