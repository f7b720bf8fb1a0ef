//! Scoped ownership of the two engine push channels.

use crate::engine::{EventSource, Subscription};
use crate::model::EngineChannel;
use serde_json::Value;

/// Holds the rate and algorithm subscriptions of one session.
///
/// Both are acquired together on attach and released together exactly once,
/// either through [`EventSubscriber::release`] or on drop.
pub struct EventSubscriber {
    rate: Option<Subscription>,
    algorithm: Option<Subscription>,
}

impl EventSubscriber {
    pub fn attach<S: EventSource + ?Sized>(source: &S) -> Self {
        let rate = source.subscribe(EngineChannel::Rate);
        let algorithm = source.subscribe(EngineChannel::Algorithm);
        tracing::debug!("attached engine event listeners");
        Self {
            rate: Some(rate),
            algorithm: Some(algorithm),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.rate.is_some() || self.algorithm.is_some()
    }

    /// Wait for the next payload on either channel.
    ///
    /// No ordering is implied between the two channels. Never resolves once
    /// released or once both streams have ended.
    pub async fn recv(&mut self) -> (EngineChannel, Value) {
        loop {
            let (channel, payload) = tokio::select! {
                v = next_payload(&mut self.rate) => (EngineChannel::Rate, v),
                v = next_payload(&mut self.algorithm) => (EngineChannel::Algorithm, v),
            };
            match payload {
                Some(payload) => return (channel, payload),
                None => tracing::warn!(channel = channel.as_str(), "engine event stream ended"),
            }
        }
    }

    /// Detach both listeners. Returns `false` if they were already released.
    pub fn release(&mut self) -> bool {
        let rate = self.rate.take();
        let algorithm = self.algorithm.take();
        if rate.is_none() && algorithm.is_none() {
            return false;
        }
        for mut sub in rate.into_iter().chain(algorithm) {
            sub.release();
            tracing::debug!(channel = sub.channel().as_str(), "released engine event listener");
        }
        true
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        self.release();
    }
}

async fn next_payload(sub: &mut Option<Subscription>) -> Option<Value> {
    match sub {
        Some(sub) => sub.recv().await,
        None => futures::future::pending().await,
    }
}
