//! Session credential material (Netscape `cookies.txt`).
//!
//! Loaded once at process start and read-only afterwards; no component
//! mutates the bundle. Parse errors on individual lines are logged and
//! skipped, never fatal — a half-usable cookie jar beats none.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Cookie domain suffix worth keeping; everything else is dropped.
const DOMAIN_FILTER: &str = ".youtube.com";

/// Cookie name carrying the visitor id the upstream expects back in a
/// request header.
const VISITOR_COOKIE: &str = "VISITOR_INFO1_LIVE";

/// Opaque key-value session material.
#[derive(Debug, Clone, Default)]
pub struct CredentialBundle {
    values: HashMap<String, String>,
}

impl CredentialBundle {
    /// Load and parse a Netscape-format cookies file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read credential file {}", path.display()))?;
        let bundle = Self::parse(&content);
        debug!(
            path = %path.display(),
            cookies = bundle.len(),
            "loaded credential bundle"
        );
        Ok(bundle)
    }

    /// Parse Netscape cookie lines: 7 tab-separated fields, `#` comments,
    /// blank lines skipped. Only cookies under the upstream domain are kept.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut values = HashMap::new();

        for line in content.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 7 {
                warn!("skipping malformed cookie line ({} fields)", fields.len());
                continue;
            }

            let (domain, name, value) = (fields[0], fields[5], fields[6]);
            if domain.contains(DOMAIN_FILTER) {
                values.insert(name.to_string(), value.to_string());
            }
        }

        Self { values }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// `Cookie` header value for a credentialed request.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        let mut pairs: Vec<_> = self
            .values
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        pairs.sort();
        pairs.join("; ")
    }

    /// Visitor id the upstream correlates with the session, if present.
    #[must_use]
    pub fn visitor_id(&self) -> Option<&str> {
        self.get(VISITOR_COOKIE)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
