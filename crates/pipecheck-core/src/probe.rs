//! Single-shot observation of one external system.

use async_trait::async_trait;

use crate::outcome::Outcome;

/// One round trip against one external system.
///
/// Implementations perform exactly one request with their own bounded timeout
/// and never retry; retrying is the poller's job. Transport failures become
/// `Outcome::Error`, a well-formed answer lacking the expected content becomes
/// `Outcome::Absent`.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Human-readable name of the resource observed, e.g. `GET http://api:8000/health`.
    fn target(&self) -> String;

    /// Perform the observation.
    async fn observe(&self) -> Outcome;
}

#[async_trait]
impl<P: Probe + ?Sized> Probe for Box<P> {
    fn target(&self) -> String {
        (**self).target()
    }

    async fn observe(&self) -> Outcome {
        (**self).observe().await
    }
}
