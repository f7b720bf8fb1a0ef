//! Session state store and the start/stop state machine.
//!
//! `Session` owns the [`MiningSession`] record. It is mutated from three places
//! only: reconciliation answers, command settlement, and engine events. Each
//! mutation returns an [`Outcome`] telling the caller what to persist.
//!
//! Invariant: `Idle` always carries `hashrate == 0` and an empty algorithm.

use crate::error::{GatewayError, ToggleError};
use crate::model::{
    Command, ConfirmedBy, EngineChannel, HashrateDisplay, MiningSession, SessionStatus,
    SessionView,
};
use serde_json::Value;

/// What a mutation asks of the caller.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Outcome {
    /// The UI projection may have changed.
    pub changed: bool,
    /// Confirmed transition into `Running` (`true`) or `Idle` (`false`).
    pub write_hint: Option<bool>,
}

impl Outcome {
    fn changed() -> Self {
        Self {
            changed: true,
            write_hint: None,
        }
    }

    fn confirmed(running: bool) -> Self {
        Self {
            changed: true,
            write_hint: Some(running),
        }
    }
}

/// Query answers held back while the provisional status is `Idle`.
#[derive(Debug, Default)]
struct Buffered {
    algorithm: Option<String>,
    hashrate: Option<f64>,
}

#[derive(Debug)]
pub struct Session {
    data: MiningSession,
    reconciling: bool,
    buffered: Buffered,
    in_flight: Option<Command>,
    /// Status to restore if a stop is rejected.
    before_stop: Option<(SessionStatus, ConfirmedBy)>,
    metrics_seen: bool,
    algorithm_from_event: bool,
    hashrate_from_event: bool,
}

impl Session {
    /// Mount a session from the persisted hint.
    ///
    /// A `true` hint paints `Running` immediately but tagged unverified; it is
    /// replaced as soon as the running query answers.
    pub fn mount(hint: Option<bool>) -> Self {
        let status = if hint == Some(true) {
            SessionStatus::Running
        } else {
            SessionStatus::Idle
        };
        Self {
            data: MiningSession {
                status,
                last_confirmed_by: ConfirmedBy::Unverified,
                ..MiningSession::default()
            },
            reconciling: true,
            buffered: Buffered::default(),
            in_flight: None,
            before_stop: None,
            metrics_seen: false,
            algorithm_from_event: false,
            hashrate_from_event: false,
        }
    }

    pub fn snapshot(&self) -> &MiningSession {
        &self.data
    }

    pub fn status(&self) -> SessionStatus {
        self.data.status
    }

    pub fn is_reconciling(&self) -> bool {
        self.reconciling
    }

    pub fn in_flight(&self) -> Option<Command> {
        self.in_flight
    }

    /// Start accepted by the engine, first metric not yet seen.
    pub fn in_warmup(&self) -> bool {
        self.data.status == SessionStatus::Starting && self.in_flight.is_none()
    }

    pub fn view(&self) -> SessionView {
        let status = self.data.status;
        let hashrate = if status == SessionStatus::Starting && !self.metrics_seen {
            HashrateDisplay::Pending
        } else {
            HashrateDisplay::Rate(self.data.hashrate)
        };
        let algorithm = if self.data.algorithm.is_empty() {
            None
        } else {
            Some(self.data.algorithm.clone())
        };
        let toggle_label = match status {
            SessionStatus::Idle => "Start mining",
            SessionStatus::Starting if self.in_flight.is_none() => "Cancel start",
            SessionStatus::Starting => "Starting…",
            SessionStatus::Running => "Stop mining",
            SessionStatus::Stopping => "Stopping…",
        };
        SessionView {
            status,
            algorithm,
            hashrate,
            verified: self.data.last_confirmed_by != ConfirmedBy::Unverified,
            reconciling: self.reconciling,
            toggle_enabled: !self.reconciling && self.in_flight.is_none(),
            toggle_label: toggle_label.to_string(),
        }
    }

    fn reset_to_idle(&mut self, by: ConfirmedBy) {
        self.data = MiningSession {
            status: SessionStatus::Idle,
            last_confirmed_by: by,
            ..MiningSession::default()
        };
        self.metrics_seen = false;
        self.algorithm_from_event = false;
        self.hashrate_from_event = false;
    }

    fn apply_buffered(&mut self) {
        let buffered = std::mem::take(&mut self.buffered);
        if let Some(algorithm) = buffered.algorithm {
            if !self.algorithm_from_event {
                self.data.algorithm = algorithm;
            }
        }
        if let Some(hashrate) = buffered.hashrate {
            if !self.hashrate_from_event {
                self.data.hashrate = hashrate;
            }
        }
    }

    // --- reconciliation -------------------------------------------------

    /// Apply the authoritative "is running" answer.
    pub fn apply_running_answer(&mut self, answer: Result<bool, GatewayError>) -> Outcome {
        self.reconciling = false;
        match answer {
            Ok(true) => {
                self.data.status = SessionStatus::Running;
                self.data.last_confirmed_by = ConfirmedBy::Query;
                self.apply_buffered();
                tracing::info!("engine confirmed running");
                Outcome::confirmed(true)
            }
            Ok(false) => {
                self.buffered = Buffered::default();
                self.reset_to_idle(ConfirmedBy::Query);
                tracing::info!("engine confirmed idle");
                Outcome::confirmed(false)
            }
            Err(e) => {
                tracing::warn!("running query failed, keeping last known state: {e}");
                self.data.last_confirmed_by = ConfirmedBy::Unverified;
                if self.data.status == SessionStatus::Running {
                    self.apply_buffered();
                }
                self.buffered = Buffered::default();
                Outcome::changed()
            }
        }
    }

    pub fn apply_algorithm_answer(
        &mut self,
        answer: Result<Option<String>, GatewayError>,
    ) -> Outcome {
        let algorithm = match answer {
            Ok(Some(a)) if !a.is_empty() => a,
            Ok(_) => return Outcome::default(),
            Err(e) => {
                tracing::debug!("algorithm query failed: {e}");
                return Outcome::default();
            }
        };
        if self.reconciling && self.data.status == SessionStatus::Idle {
            self.buffered.algorithm = Some(algorithm);
            return Outcome::default();
        }
        if self.data.status != SessionStatus::Running || self.algorithm_from_event {
            return Outcome::default();
        }
        self.data.algorithm = algorithm;
        Outcome::changed()
    }

    pub fn apply_hashrate_answer(&mut self, answer: Result<Option<f64>, GatewayError>) -> Outcome {
        let hashrate = match answer {
            Ok(Some(h)) if h.is_finite() && h >= 0.0 => h,
            Ok(Some(h)) => {
                tracing::debug!("ignoring invalid hashrate answer {h}");
                return Outcome::default();
            }
            Ok(None) => return Outcome::default(),
            Err(e) => {
                tracing::debug!("hashrate query failed: {e}");
                return Outcome::default();
            }
        };
        if self.reconciling && self.data.status == SessionStatus::Idle {
            self.buffered.hashrate = Some(hashrate);
            return Outcome::default();
        }
        if self.data.status != SessionStatus::Running || self.hashrate_from_event {
            return Outcome::default();
        }
        self.data.hashrate = hashrate;
        Outcome::changed()
    }

    // --- toggle ---------------------------------------------------------

    /// Accept a user toggle and return the command to issue.
    ///
    /// At most one command is in flight; the warm-up window (start accepted,
    /// no metric yet) accepts a stop.
    pub fn request_toggle(&mut self) -> Result<Command, ToggleError> {
        if self.reconciling {
            return Err(ToggleError::Reconciling);
        }
        if let Some(command) = self.in_flight {
            return Err(ToggleError::Busy(command));
        }
        let command = match self.data.status {
            SessionStatus::Idle => {
                self.data.status = SessionStatus::Starting;
                self.data.last_confirmed_by = ConfirmedBy::Optimistic;
                self.metrics_seen = false;
                Command::Start
            }
            SessionStatus::Starting | SessionStatus::Running => {
                self.before_stop = Some((self.data.status, self.data.last_confirmed_by));
                self.data.status = SessionStatus::Stopping;
                self.data.last_confirmed_by = ConfirmedBy::Optimistic;
                Command::Stop
            }
            // Stopping always has a stop in flight.
            SessionStatus::Stopping => return Err(ToggleError::Busy(Command::Stop)),
        };
        self.in_flight = Some(command);
        Ok(command)
    }

    /// Apply the engine's answer to the in-flight command.
    pub fn settle(&mut self, command: Command, result: Result<(), GatewayError>) -> Outcome {
        if self.in_flight != Some(command) {
            tracing::warn!(%command, "settlement for a command that is not in flight");
        }
        self.in_flight = None;
        match (command, result) {
            (Command::Start, Ok(())) => {
                if self.data.status == SessionStatus::Starting {
                    tracing::info!("start accepted, waiting for first metric");
                }
                Outcome::changed()
            }
            // No answer is not a refusal: the engine may well be mining.
            (Command::Start, Err(e @ GatewayError::Unreachable { .. })) => {
                if self.data.status == SessionStatus::Starting {
                    self.data.last_confirmed_by = ConfirmedBy::Unverified;
                }
                tracing::warn!("start outcome unknown, waiting for metrics: {e}");
                Outcome::changed()
            }
            (Command::Start, Err(e)) => {
                if self.data.status == SessionStatus::Running
                    && self.data.last_confirmed_by == ConfirmedBy::Event
                {
                    tracing::warn!("start rejected but metrics are flowing, keeping running: {e}");
                    return Outcome::changed();
                }
                tracing::warn!("start rejected: {e}");
                self.reset_to_idle(ConfirmedBy::Command);
                Outcome::confirmed(false)
            }
            (Command::Stop, Ok(())) => {
                self.before_stop = None;
                self.reset_to_idle(ConfirmedBy::Command);
                tracing::info!("engine stopped");
                Outcome::confirmed(false)
            }
            (Command::Stop, Err(e)) => {
                tracing::warn!("stop rejected: {e}");
                let (status, by) = self
                    .before_stop
                    .take()
                    .unwrap_or((SessionStatus::Running, ConfirmedBy::Unverified));
                self.data.status = status;
                self.data.last_confirmed_by = by;
                Outcome::changed()
            }
        }
    }

    // --- events -----------------------------------------------------------

    /// Apply a raw push payload. Malformed or stale payloads are dropped.
    pub fn apply_event(&mut self, channel: EngineChannel, payload: &Value) -> Outcome {
        match channel {
            EngineChannel::Rate => match parse_rate(payload) {
                Some(rate) => self.apply_rate(rate),
                None => {
                    tracing::debug!(%payload, "dropping malformed rate payload");
                    Outcome::default()
                }
            },
            EngineChannel::Algorithm => match payload.as_str() {
                Some(label) => self.apply_algorithm(label),
                None => {
                    tracing::debug!(%payload, "dropping malformed algorithm payload");
                    Outcome::default()
                }
            },
        }
    }

    fn apply_rate(&mut self, rate: f64) -> Outcome {
        match self.data.status {
            SessionStatus::Idle | SessionStatus::Stopping => {
                tracing::debug!(rate, status = %self.data.status, "dropping stale rate event");
                Outcome::default()
            }
            SessionStatus::Starting => {
                self.data.status = SessionStatus::Running;
                self.data.last_confirmed_by = ConfirmedBy::Event;
                self.data.hashrate = rate;
                self.metrics_seen = true;
                self.hashrate_from_event = true;
                tracing::info!(rate, "first metric received, engine running");
                Outcome::confirmed(true)
            }
            SessionStatus::Running => {
                self.data.hashrate = rate;
                self.metrics_seen = true;
                self.hashrate_from_event = true;
                if self.data.last_confirmed_by == ConfirmedBy::Unverified {
                    self.data.last_confirmed_by = ConfirmedBy::Event;
                    return Outcome::confirmed(true);
                }
                Outcome::changed()
            }
        }
    }

    fn apply_algorithm(&mut self, label: &str) -> Outcome {
        match self.data.status {
            SessionStatus::Idle | SessionStatus::Stopping => {
                tracing::debug!(label, "dropping stale algorithm event");
                Outcome::default()
            }
            SessionStatus::Starting | SessionStatus::Running => {
                self.data.algorithm = label.to_string();
                self.algorithm_from_event = true;
                Outcome::changed()
            }
        }
    }
}

/// A rate payload must be a finite, non-negative JSON number.
fn parse_rate(payload: &Value) -> Option<f64> {
    payload
        .as_f64()
        .filter(|rate| rate.is_finite() && *rate >= 0.0)
}
