//! Relay registry client.
//!
//! Fetches candidate relay addresses from a remote directory endpoint.
//! Its contract is absorbent: any fetch, parse, or timeout failure is
//! logged and degrades to the configured static fallback list (or empty),
//! never an error. The fetch carries its own short timeout so a dead
//! registry cannot eat into the caller's global budget.

use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::resolver::model::{CandidateRelay, RelayOrigin};

pub struct RelayRegistry {
    endpoint: Option<String>,
    static_fallback: Vec<String>,
    client: Client,
}

impl RelayRegistry {
    pub fn new(endpoint: Option<String>, static_fallback: Vec<String>) -> Result<Self> {
        let client = Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(3))
            .build()?;
        Ok(Self {
            endpoint,
            static_fallback,
            client,
        })
    }

    /// Fetch the current candidate list. Never errors.
    pub async fn fetch_relays(&self, timeout: Duration) -> Vec<CandidateRelay> {
        let Some(endpoint) = &self.endpoint else {
            debug!("no registry endpoint configured, using static fallback");
            return self.fallback();
        };

        let response = self
            .client
            .get(endpoint)
            .timeout(timeout)
            .send()
            .await;

        let body: Value = match response {
            Ok(response) if response.status().is_success() => match response.json().await {
                Ok(body) => body,
                Err(err) => {
                    warn!(%endpoint, error = %err, "registry response unparsable, degrading");
                    return self.fallback();
                }
            },
            Ok(response) => {
                warn!(%endpoint, status = %response.status(), "registry fetch rejected, degrading");
                return self.fallback();
            }
            Err(err) => {
                warn!(%endpoint, error = %err, "registry fetch failed, degrading");
                return self.fallback();
            }
        };

        match Self::parse_addresses(&body) {
            Some(addresses) if !addresses.is_empty() => {
                debug!(count = addresses.len(), "registry returned relays");
                addresses
                    .into_iter()
                    .map(|addr| CandidateRelay::new(addr, RelayOrigin::Registry))
                    .collect()
            }
            _ => {
                warn!(%endpoint, "registry returned no usable relays, degrading");
                self.fallback()
            }
        }
    }

    /// Accepted wire shapes: a bare JSON array of address strings, or an
    /// object wrapping it under `"relays"`.
    fn parse_addresses(body: &Value) -> Option<Vec<String>> {
        let array = body.as_array().or_else(|| body["relays"].as_array())?;
        Some(
            array
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    fn fallback(&self) -> Vec<CandidateRelay> {
        self.static_fallback
            .iter()
            .map(|addr| CandidateRelay::new(addr.clone(), RelayOrigin::StaticFallback))
            .collect()
    }
}
