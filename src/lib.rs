//! `tunegrab` - Bounded-time audio stream URL resolver
//!
//! # Features
//!
//! - **Strategy Chain**: direct, credentialed, relayed, alternate-path,
//!   and external-process attempts in a fixed order
//! - **Hard Deadlines**: a global budget bounds the whole chain; every
//!   attempt is clamped to what remains
//! - **Relay Ranking**: concurrent health probing with latency ordering
//!   and good-enough early stop
//! - **URL Validation**: every candidate URL is probed before it is
//!   returned
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tunegrab::{MediaId, Resolver, ResolverConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let resolver = Resolver::new(ResolverConfig::default())?;
//!     let media = MediaId::parse("dQw4w9WgXcQ")?;
//!     let result = resolver.resolve(media, Duration::from_secs(30)).await?;
//!     println!("{} via {}", result.url, result.strategy);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod identity;
pub mod probe;
pub mod relay;
pub mod resolver;
pub mod upstream;

pub use config::ResolverConfig;
pub use credentials::CredentialBundle;
pub use identity::{android_identity, music_identity, web_identity, ClientIdentity};
pub use probe::{ProbeResult, ReachabilityProbe, UrlValidator};
pub use relay::{HealthChecker, RelayFinder, RelayPool, RelayRegistry};
pub use resolver::{
    AttemptRecord, CandidateRelay, ErrorKind, MediaId, ResolutionResult, ResolveError,
    ResolveStrategy, Resolver,
};
pub use upstream::{InnerTubeClient, UpstreamClient};

/// Version of tunegrab
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
