//! Concrete resolution strategies, in chain order.

mod alternate;
mod credentialed;
mod direct;
mod external;
mod relayed;

pub use alternate::AlternatePathStrategy;
pub use credentialed::CredentialedStrategy;
pub use direct::DirectStrategy;
pub use external::ExternalProcessStrategy;
pub use relayed::RelayedStrategy;
