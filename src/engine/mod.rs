//! Engine-facing seams.
//!
//! The mining engine is reached through two narrow contracts: a request/response
//! [`CommandGateway`] and a push-based [`EventSource`]. The HTTP binding lives in
//! [`http`]; tests use the scripted engine in `fake`.

#[cfg(test)]
pub(crate) mod fake;
mod http;
mod sse;

pub use http::HttpEngine;

use crate::error::GatewayError;
use crate::model::EngineChannel;
use std::future::Future;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Request/response control of the engine.
pub trait CommandGateway: Send + Sync + 'static {
    fn start(&self) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn stop(&self) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn query_running(&self) -> impl Future<Output = Result<bool, GatewayError>> + Send;

    fn query_algorithm(&self) -> impl Future<Output = Result<Option<String>, GatewayError>> + Send;

    fn query_hashrate(&self) -> impl Future<Output = Result<Option<f64>, GatewayError>> + Send;
}

/// Push channels of the engine. Payloads are delivered raw; validation is the
/// subscriber's job.
pub trait EventSource {
    fn subscribe(&self, channel: EngineChannel) -> Subscription;
}

/// Handle for one attached push channel.
///
/// Owns the receiving end and, when the source needs one, the task feeding it.
/// Dropping or releasing the handle detaches the listener.
pub struct Subscription {
    channel: EngineChannel,
    rx: mpsc::UnboundedReceiver<serde_json::Value>,
    feeder: Option<JoinHandle<()>>,
    ended: bool,
}

impl Subscription {
    pub fn new(
        channel: EngineChannel,
        rx: mpsc::UnboundedReceiver<serde_json::Value>,
        feeder: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            channel,
            rx,
            feeder,
            ended: false,
        }
    }

    pub fn channel(&self) -> EngineChannel {
        self.channel
    }

    /// Wait for the next payload.
    ///
    /// Returns `None` exactly once when the stream ends; afterwards it never
    /// resolves, so a closed channel cannot spin a `select!` loop.
    pub async fn recv(&mut self) -> Option<serde_json::Value> {
        if self.ended {
            return futures::future::pending().await;
        }
        match self.rx.recv().await {
            Some(v) => Some(v),
            None => {
                self.ended = true;
                None
            }
        }
    }

    /// Detach from the engine. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            // Dropping a JoinHandle does not stop the task; abort it explicitly.
            feeder.abort();
        }
        self.rx.close();
        self.ended = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
