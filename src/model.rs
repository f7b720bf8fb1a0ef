use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub engine_url: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Informational nudge while waiting for the first metric; `None` disables it.
    #[serde(default, with = "humantime_serde")]
    pub warmup_notice: Option<Duration>,
    #[serde(default)]
    pub hint_path: Option<PathBuf>,
    pub stop_on_exit: bool,
    pub start_on_launch: bool,
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Starting => "starting",
            SessionStatus::Running => "running",
            SessionStatus::Stopping => "stopping",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the current `status` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmedBy {
    /// Authoritative "is running" query.
    Query,
    /// A metric pushed by the engine.
    Event,
    /// Settlement of a start/stop command.
    Command,
    /// Taken from the persisted hint and not (yet) backed by the engine.
    Unverified,
    /// Local transition issued ahead of any engine answer.
    Optimistic,
}

/// Engine-side commands issued by the toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Start,
    Stop,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Start => f.write_str("start"),
            Command::Stop => f.write_str("stop"),
        }
    }
}

/// Push channels exposed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineChannel {
    Rate,
    Algorithm,
}

impl EngineChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineChannel::Rate => "rate",
            EngineChannel::Algorithm => "algorithm",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningSession {
    pub status: SessionStatus,
    pub algorithm: String,
    pub hashrate: f64,
    pub last_confirmed_by: ConfirmedBy,
}

impl Default for MiningSession {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            algorithm: String::new(),
            hashrate: 0.0,
            last_confirmed_by: ConfirmedBy::Unverified,
        }
    }
}

/// Hashrate as presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum HashrateDisplay {
    /// Start accepted, no metric seen yet. Not the same as zero.
    Pending,
    Rate(f64),
}

/// UI-facing projection of the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub status: SessionStatus,
    pub algorithm: Option<String>,
    pub hashrate: HashrateDisplay,
    pub verified: bool,
    pub reconciling: bool,
    pub toggle_enabled: bool,
    pub toggle_label: String,
}

impl SessionView {
    pub fn status_line(&self) -> String {
        match (self.status, self.hashrate) {
            (SessionStatus::Starting, HashrateDisplay::Pending) => {
                "Starting, metrics pending…".to_string()
            }
            (SessionStatus::Starting, _) => "Starting…".to_string(),
            (SessionStatus::Stopping, _) => "Stopping…".to_string(),
            (SessionStatus::Idle, _) if self.reconciling => "Checking engine…".to_string(),
            (SessionStatus::Idle, _) => "Idle".to_string(),
            (SessionStatus::Running, _) if !self.verified => "Running (unverified)".to_string(),
            (SessionStatus::Running, _) => "Running".to_string(),
        }
    }
}

/// Events emitted by the session controller and consumed by UI/CLI layers.
#[derive(Debug, Clone, Serialize)]
pub enum SessionEvent {
    Changed {
        view: SessionView,
    },
    RateSample {
        hashrate: f64,
    },
    CommandFailed {
        command: Command,
        error: String,
    },
    Info(InfoEvent),
}

#[derive(Debug, Clone, Serialize)]
pub enum InfoEvent {
    Message(String),
    /// The "is running" query settled; `None` when the engine was unreachable.
    Reconciled { running: Option<bool> },
    ToggleIgnored { reason: String },
    WarmupStalled { waited_secs: u64 },
}

impl InfoEvent {
    /// Render a human-readable message for UI/CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Reconciled { running: Some(true) } => "Engine reports running".to_string(),
            InfoEvent::Reconciled {
                running: Some(false),
            } => "Engine reports idle".to_string(),
            InfoEvent::Reconciled { running: None } => {
                "Engine unreachable; showing last known state (unverified)".to_string()
            }
            InfoEvent::ToggleIgnored { reason } => format!("Toggle ignored: {reason}"),
            InfoEvent::WarmupStalled { waited_secs } => {
                format!("Still waiting for first metrics ({waited_secs}s)…")
            }
        }
    }
}
