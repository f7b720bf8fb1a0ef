use super::sse::{payload_for, FrameLimit};
use super::{CommandGateway, EventSource, Subscription};
use crate::error::GatewayError;
use crate::model::{Command, EngineChannel, SessionConfig};
use anyhow::{Context, Result};
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

/// Command gateway and event source backed by the engine's local HTTP API.
#[derive(Clone)]
pub struct HttpEngine {
    json_client: Client,
    stream_client: Client,
    base_url: String,
}

impl HttpEngine {
    pub fn new(cfg: &SessionConfig) -> Result<Self> {
        let json_client = Client::builder()
            .user_agent(&cfg.user_agent)
            .timeout(cfg.request_timeout)
            .build()
            .context("failed to build HTTP JSON client")?;

        // Event streams stay open indefinitely; no global request timeout.
        let stream_client = Client::builder()
            .user_agent(&cfg.user_agent)
            .connect_timeout(cfg.request_timeout)
            .build()
            .context("failed to build HTTP stream client")?;

        Ok(Self {
            json_client,
            stream_client,
            base_url: cfg.engine_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/miner/{}", self.base_url, path)
    }

    async fn command(&self, command: Command) -> Result<(), GatewayError> {
        let operation = match command {
            Command::Start => "start",
            Command::Stop => "stop",
        };
        let resp = self
            .json_client
            .post(self.url(operation))
            .send()
            .await
            .map_err(|e| GatewayError::unreachable(operation, e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        let reason = if body.trim().is_empty() {
            status.to_string()
        } else {
            body.trim().to_string()
        };
        Err(GatewayError::rejected(operation, reason))
    }

    async fn query<T: DeserializeOwned>(
        &self,
        path: &str,
        operation: &'static str,
    ) -> Result<T, GatewayError> {
        let resp = self
            .json_client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| GatewayError::unreachable(operation, e.to_string()))?;
        decode_query(resp, operation).await
    }
}

async fn decode_query<T: DeserializeOwned>(
    resp: Response,
    operation: &'static str,
) -> Result<T, GatewayError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(GatewayError::unreachable(
            operation,
            format!("unexpected status {status}"),
        ));
    }
    resp.json::<T>()
        .await
        .map_err(|e| GatewayError::unreachable(operation, format!("undecodable body: {e}")))
}

impl CommandGateway for HttpEngine {
    async fn start(&self) -> Result<(), GatewayError> {
        self.command(Command::Start).await
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        self.command(Command::Stop).await
    }

    async fn query_running(&self) -> Result<bool, GatewayError> {
        self.query("running", "query running").await
    }

    async fn query_algorithm(&self) -> Result<Option<String>, GatewayError> {
        self.query("algorithm", "query algorithm").await
    }

    async fn query_hashrate(&self) -> Result<Option<f64>, GatewayError> {
        self.query("hashrate", "query hashrate").await
    }
}

impl EventSource for HttpEngine {
    fn subscribe(&self, channel: EngineChannel) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.stream_client.clone();
        let url = format!("{}?channel={}", self.url("events"), channel.as_str());
        let feeder = tokio::spawn(async move {
            match pump_events(&client, &url, channel, &tx).await {
                Ok(()) => tracing::debug!(channel = channel.as_str(), "event stream closed"),
                Err(e) => {
                    tracing::warn!(channel = channel.as_str(), "event stream failed: {e:#}")
                }
            }
        });
        Subscription::new(channel, rx, Some(feeder))
    }
}

/// Forward decoded payloads for `channel` until the stream ends or the
/// subscription is dropped.
async fn pump_events(
    client: &Client,
    url: &str,
    channel: EngineChannel,
    tx: &mpsc::UnboundedSender<serde_json::Value>,
) -> Result<()> {
    let resp = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
        .context("event stream request failed")?
        .error_for_status()
        .context("event stream refused")?;

    let mut limit = FrameLimit::default();
    let bytes = resp.bytes_stream().map(move |chunk| {
        let chunk = chunk.map_err(std::io::Error::other)?;
        if !limit.admit(&chunk) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "event frame too large",
            ));
        }
        Ok(chunk)
    });
    let events = bytes.eventsource();
    futures::pin_mut!(events);
    while let Some(event) = events.next().await {
        let event = event.map_err(|e| anyhow::anyhow!("event stream read failed: {e}"))?;
        let Some(payload) = payload_for(channel, &event.event, &event.data) else {
            continue;
        };
        if tx.send(payload).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn engine_for(server: &MockServer) -> HttpEngine {
        let cfg = SessionConfig {
            engine_url: format!("{}/", server.base_url()),
            request_timeout: Duration::from_secs(2),
            warmup_notice: None,
            hint_path: None,
            stop_on_exit: false,
            start_on_launch: false,
            user_agent: "mining-control-test".into(),
        };
        HttpEngine::new(&cfg).unwrap()
    }

    #[tokio::test]
    async fn accepted_commands_post_to_their_endpoints() {
        let server = MockServer::start_async().await;
        let start = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/miner/start");
                then.status(204);
            })
            .await;
        let stop = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/miner/stop");
                then.status(200).body("ok");
            })
            .await;
        let engine = engine_for(&server);

        engine.start().await.unwrap();
        engine.stop().await.unwrap();
        assert_eq!(start.hits_async().await, 1);
        assert_eq!(stop.hits_async().await, 1);
    }

    #[tokio::test]
    async fn refused_command_carries_the_engine_reason() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/miner/start");
                then.status(409).body("  already mining\n");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/miner/stop");
                then.status(500);
            })
            .await;
        let engine = engine_for(&server);

        match engine.start().await {
            Err(GatewayError::Rejected { operation, reason }) => {
                assert_eq!(operation, "start");
                assert_eq!(reason, "already mining");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        match engine.stop().await {
            Err(GatewayError::Rejected { reason, .. }) => assert!(reason.contains("500")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn queries_decode_values_and_nulls() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/miner/running");
                then.status(200).json_body(json!(true));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/miner/algorithm");
                then.status(200).json_body(json!("rx/0"));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/miner/hashrate");
                then.status(200).json_body(json!(null));
            })
            .await;
        let engine = engine_for(&server);

        assert!(engine.query_running().await.unwrap());
        assert_eq!(engine.query_algorithm().await.unwrap().as_deref(), Some("rx/0"));
        assert_eq!(engine.query_hashrate().await.unwrap(), None);
    }

    #[tokio::test]
    async fn bad_query_answers_count_as_unreachable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/miner/running");
                then.status(200).body("yes please");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/miner/hashrate");
                then.status(503);
            })
            .await;
        let engine = engine_for(&server);

        assert!(matches!(
            engine.query_running().await,
            Err(GatewayError::Unreachable { operation: "query running", .. })
        ));
        assert!(matches!(
            engine.query_hashrate().await,
            Err(GatewayError::Unreachable { operation: "query hashrate", .. })
        ));
    }

    #[tokio::test]
    async fn event_stream_delivers_only_the_subscribed_channel() {
        let server = MockServer::start_async().await;
        let events = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/miner/events")
                    .query_param("channel", "rate");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body("event: rate\ndata: 812.1\n\nevent: algorithm\ndata: \"rx\"\n\n: ping\n\ndata: 900\n\n");
            })
            .await;
        let engine = engine_for(&server);

        let mut sub = engine.subscribe(EngineChannel::Rate);
        assert_eq!(sub.recv().await, Some(json!(812.1)));
        assert_eq!(sub.recv().await, Some(json!(900)));
        // The engine closed the stream.
        assert_eq!(sub.recv().await, None);
        sub.release();
        assert_eq!(events.hits_async().await, 1);
    }

    #[tokio::test]
    async fn numeric_algorithm_label_survives_the_wire() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/miner/events")
                    .query_param("channel", "algorithm");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body("event: algorithm\ndata: 2\n\n");
            })
            .await;
        let engine = engine_for(&server);

        let mut sub = engine.subscribe(EngineChannel::Algorithm);
        assert_eq!(sub.recv().await, Some(json!("2")));
        assert_eq!(sub.recv().await, None);
    }
}
