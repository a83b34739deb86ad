//! One-stop re-exports of the crate's error types.

pub use crate::archive::ArchiveError;
pub use crate::config::SecretError;
pub use crate::registry::BootError;
pub use crate::service::ServiceError;
pub use crate::throttle::ThrottleError;
