//! Cooperative cancellation for in-flight queries.
//!
//! An [`Invalidation`] is a cloneable token a query host hands to the engine;
//! the paired [`InvalidateHandle`] fires it when the consumer re-runs or
//! discards the query. Database clients receive the token through
//! [`crate::client::QueryOptions`] and are expected to stop work once it
//! fires. Dropping the handle counts as firing, so an abandoned host never
//! leaves a query running.

use std::fmt;

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};

/// A cloneable "stop now" token.
#[derive(Clone)]
pub struct Invalidation {
    inner: Shared<oneshot::Receiver<()>>,
}

/// The firing side of an [`Invalidation`].
pub struct InvalidateHandle {
    sender: Option<oneshot::Sender<()>>,
}

impl Invalidation {
    pub fn new() -> (Invalidation, InvalidateHandle) {
        let (sender, receiver) = oneshot::channel();
        (
            Invalidation {
                inner: receiver.shared(),
            },
            InvalidateHandle {
                sender: Some(sender),
            },
        )
    }

    /// True once the handle fired or was dropped.
    pub fn fired(&self) -> bool {
        self.inner.clone().now_or_never().is_some()
    }

    /// Resolves when the handle fires or is dropped.
    pub async fn invalidated(&self) {
        let _ = self.inner.clone().await;
    }
}

impl InvalidateHandle {
    /// Fires the token. Idempotent.
    pub fn invalidate(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(());
        }
    }
}

impl fmt::Debug for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invalidation")
            .field("fired", &self.fired())
            .finish()
    }
}

impl fmt::Debug for InvalidateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidateHandle")
            .field("fired", &self.sender.is_none())
            .finish()
    }
}
