//! Event publishing/subscription abstraction (mechanics only).
//!
//! The store publishes low-stock alerts here **after** the movement that caused
//! them has committed. Notification collaborators (a CLI printer, a mailer, a
//! dashboard feed) subscribe; none of them can reach back into the store.
//!
//! Delivery is at-least-once and in publish order per subscriber. A bus is for
//! distribution, not storage: the `movements` table remains the source of
//! truth, and a missed alert can always be recomputed from
//! `low_stock_products()`.

use std::sync::Arc;
use std::sync::mpsc::Receiver;

/// A subscription to an event stream.
///
/// ```ignore
/// let alerts = bus.subscribe();
/// while let Ok(alert) = alerts.try_recv() {
///     notify(alert);
/// }
/// ```
///
/// Designed for single-threaded consumption.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Collect everything already delivered without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// Broadcast semantics: every subscriber receives a copy of every message
/// published after it subscribed. `publish` may fail; the caller decides what a
/// failure means (the store logs it, because the movement is already durable).
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
