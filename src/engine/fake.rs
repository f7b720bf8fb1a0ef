//! Scripted in-process engine used by the session and controller tests.

use super::{CommandGateway, EventSource, Subscription};
use crate::error::GatewayError;
use crate::model::EngineChannel;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Start,
    Stop,
    Running,
    Algorithm,
    Hashrate,
}

struct Script {
    running: Result<bool, GatewayError>,
    algorithm: Result<Option<String>, GatewayError>,
    hashrate: Result<Option<f64>, GatewayError>,
    start: Result<(), GatewayError>,
    stop: Result<(), GatewayError>,
    calls: HashMap<Op, usize>,
    commands_in_flight: usize,
    max_commands_in_flight: usize,
    listeners: Vec<(EngineChannel, mpsc::UnboundedSender<Value>)>,
    gates: HashMap<Op, Arc<Notify>>,
}

pub(crate) struct FakeEngine {
    script: Mutex<Script>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self {
            script: Mutex::new(Script {
                running: Ok(false),
                algorithm: Ok(None),
                hashrate: Ok(None),
                start: Ok(()),
                stop: Ok(()),
                calls: HashMap::new(),
                commands_in_flight: 0,
                max_commands_in_flight: 0,
                listeners: Vec::new(),
                gates: HashMap::new(),
            }),
        }
    }
}

impl FakeEngine {
    fn with<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.script.lock().expect("fake engine lock");
        f(&mut script)
    }

    pub fn set_running(&self, r: Result<bool, GatewayError>) {
        self.with(|s| s.running = r);
    }

    pub fn set_algorithm(&self, r: Result<Option<String>, GatewayError>) {
        self.with(|s| s.algorithm = r);
    }

    pub fn set_hashrate(&self, r: Result<Option<f64>, GatewayError>) {
        self.with(|s| s.hashrate = r);
    }

    pub fn set_start(&self, r: Result<(), GatewayError>) {
        self.with(|s| s.start = r);
    }

    pub fn set_stop(&self, r: Result<(), GatewayError>) {
        self.with(|s| s.stop = r);
    }

    /// Make `op` wait until the returned gate is notified.
    pub fn hold(&self, op: Op) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.with(|s| s.gates.insert(op, Arc::clone(&gate)));
        gate
    }

    pub fn calls(&self, op: Op) -> usize {
        self.with(|s| s.calls.get(&op).copied().unwrap_or(0))
    }

    pub fn max_commands_in_flight(&self) -> usize {
        self.with(|s| s.max_commands_in_flight)
    }

    /// Push a payload to every open listener of `channel`; returns how many got it.
    pub fn emit(&self, channel: EngineChannel, payload: Value) -> usize {
        self.with(|s| {
            s.listeners.retain(|(_, tx)| !tx.is_closed());
            s.listeners
                .iter()
                .filter(|(c, _)| *c == channel)
                .filter(|(_, tx)| tx.send(payload.clone()).is_ok())
                .count()
        })
    }

    pub fn active_listeners(&self, channel: EngineChannel) -> usize {
        self.with(|s| {
            s.listeners
                .iter()
                .filter(|(c, tx)| *c == channel && !tx.is_closed())
                .count()
        })
    }

    async fn enter(&self, op: Op) {
        let gate = self.with(|s| {
            *s.calls.entry(op).or_insert(0) += 1;
            if matches!(op, Op::Start | Op::Stop) {
                s.commands_in_flight += 1;
                s.max_commands_in_flight = s.max_commands_in_flight.max(s.commands_in_flight);
            }
            s.gates.get(&op).cloned()
        });
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn leave_command(&self) {
        self.with(|s| s.commands_in_flight -= 1);
    }
}

impl CommandGateway for FakeEngine {
    async fn start(&self) -> Result<(), GatewayError> {
        self.enter(Op::Start).await;
        self.leave_command();
        self.with(|s| s.start.clone())
    }

    async fn stop(&self) -> Result<(), GatewayError> {
        self.enter(Op::Stop).await;
        self.leave_command();
        self.with(|s| s.stop.clone())
    }

    async fn query_running(&self) -> Result<bool, GatewayError> {
        self.enter(Op::Running).await;
        self.with(|s| s.running.clone())
    }

    async fn query_algorithm(&self) -> Result<Option<String>, GatewayError> {
        self.enter(Op::Algorithm).await;
        self.with(|s| s.algorithm.clone())
    }

    async fn query_hashrate(&self) -> Result<Option<f64>, GatewayError> {
        self.enter(Op::Hashrate).await;
        self.with(|s| s.hashrate.clone())
    }
}

impl EventSource for FakeEngine {
    fn subscribe(&self, channel: EngineChannel) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.with(|s| s.listeners.push((channel, tx)));
        Subscription::new(channel, rx, None)
    }
}
