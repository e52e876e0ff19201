//! BusPublisher trait definition (Port)

use async_trait::async_trait;
use inlet_domain::BusEvent;
use thiserror::Error;

/// A publish that was not acknowledged by the bus.
///
/// Always retryable: the relay leaves the source message undeleted so
/// the visibility timeout redelivers it.
#[derive(Debug, Error)]
#[error("Bus publish not acknowledged: {0}")]
pub struct PublishError(pub String);

/// Event bus publishing interface.
///
/// `publish` returning `Ok` is the acknowledgment the relay requires
/// before it may delete the source message. Publishing is safe to
/// retry; subscribers tolerate duplicates.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Publish one event onto the bus.
    async fn publish(&self, event: BusEvent) -> Result<(), PublishError>;
}
