//! Radio abstraction for the characteristic-based lock link.
//!
//! Models a short-range GATT-style radio: a client connects to one lock, the
//! link has a small MTU, writes go to named characteristics and the lock
//! pushes notifications on others. Production binds a platform radio stack;
//! tests use the simulated radio from the harness.

use async_trait::async_trait;
use keyway_proto::Characteristic;

use crate::error::TransportError;

/// Something that can open links to locks.
#[async_trait]
pub trait Radio: Send + Sync + 'static {
    /// Link type for one connection.
    type Link: RadioLink;

    /// Connect to the lock advertising `lock_id`.
    ///
    /// Returns once the link is up and notifications are subscribed.
    async fn connect(&self, lock_id: u32) -> Result<Self::Link, TransportError>;
}

/// One connection to one lock.
///
/// Dropping a link without calling [`RadioLink::disconnect`] must still tear
/// it down.
#[async_trait]
pub trait RadioLink: Send + 'static {
    /// Largest single write the link carries.
    fn mtu(&self) -> usize;

    /// Write one chunk to `characteristic`.
    async fn write(
        &mut self,
        characteristic: Characteristic,
        value: &[u8],
    ) -> Result<(), TransportError>;

    /// Wait for the next notification on `characteristic`.
    ///
    /// Never times out on its own; callers bound it.
    async fn next_notification(
        &mut self,
        characteristic: Characteristic,
    ) -> Result<Vec<u8>, TransportError>;

    /// Tear down the link. Best effort, never fails.
    async fn disconnect(&mut self);
}
