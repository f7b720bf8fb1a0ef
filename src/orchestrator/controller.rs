//! Session lifecycle controller.
//!
//! Runs the single event loop that owns the session: reconciliation answers,
//! command settlement, engine events and UI commands are all applied here, one
//! at a time, and the resulting views are emitted for presentation layers.

use crate::engine::{CommandGateway, EventSource};
use crate::error::GatewayError;
use crate::model::{
    Command, EngineChannel, InfoEvent, MiningSession, SessionConfig, SessionEvent, SessionStatus,
};
use crate::session::{self, EventSubscriber, Outcome, ReconcileAnswer, Session};
use crate::storage::HintStore;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Instant};

/// Commands emitted by UI layers to control the session.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Toggle,
    Quit,
}

/// A start/stop command awaiting the engine's answer.
struct InFlight {
    command: Command,
    handle: Option<tokio::task::JoinHandle<Result<(), GatewayError>>>,
}

fn issue<G: CommandGateway>(engine: &Arc<G>, command: Command) -> InFlight {
    let gw = Arc::clone(engine);
    let handle = tokio::spawn(async move {
        match command {
            Command::Start => gw.start().await,
            Command::Stop => gw.stop().await,
        }
    });
    InFlight {
        command,
        handle: Some(handle),
    }
}

fn publish<H: HintStore>(
    event_tx: &UnboundedSender<SessionEvent>,
    hints: &H,
    session: &Session,
    outcome: Outcome,
) {
    session::persist(hints, outcome);
    if outcome.changed {
        let _ = event_tx.send(SessionEvent::Changed {
            view: session.view(),
        });
    }
}

/// Run a user toggle through the state machine and issue the resulting command.
fn toggle<G: CommandGateway>(
    engine: &Arc<G>,
    session: &mut Session,
    event_tx: &UnboundedSender<SessionEvent>,
) -> Option<InFlight> {
    match session.request_toggle() {
        Ok(command) => {
            tracing::info!(%command, "issuing command");
            let _ = event_tx.send(SessionEvent::Changed {
                view: session.view(),
            });
            Some(issue(engine, command))
        }
        Err(e) => {
            tracing::debug!("toggle ignored: {e}");
            let _ = event_tx.send(SessionEvent::Info(InfoEvent::ToggleIgnored {
                reason: e.to_string(),
            }));
            None
        }
    }
}

/// Orchestrate one session and emit events back to presentation layers.
///
/// Returns the final session record once a quit has been requested and every
/// in-flight command has settled.
pub(crate) async fn run_controller<G, H>(
    cfg: &SessionConfig,
    engine: Arc<G>,
    hints: H,
    event_tx: UnboundedSender<SessionEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<MiningSession>
where
    G: CommandGateway + EventSource,
    H: HintStore,
{
    // Provisional first paint from the hint, then ground truth from the engine.
    let mut session = Session::mount(session::read_hint(&hints));
    let _ = event_tx.send(SessionEvent::Changed {
        view: session.view(),
    });
    let mut answers = session::spawn_queries(&engine);
    let mut answers_open = true;
    let mut subscriber = EventSubscriber::attach(engine.as_ref());
    tracing::debug!(attached = subscriber.is_attached(), "session mounted");

    let mut in_flight: Option<InFlight> = None;
    let mut start_pending = cfg.start_on_launch;
    let mut quit_pending = false;
    let mut exit_stop_issued = false;
    // Warm-up has no deadline; the watchdog only keeps the user informed.
    let mut warmup_since: Option<Instant> = None;
    let mut warmup_noticed = false;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    // Stop the engine on the way out when asked to; at most once per session.
    let mut begin_exit = |session: &mut Session| -> Option<InFlight> {
        if !cfg.stop_on_exit || exit_stop_issued || session.is_reconciling() {
            return None;
        }
        if !matches!(
            session.status(),
            SessionStatus::Starting | SessionStatus::Running
        ) {
            return None;
        }
        exit_stop_issued = true;
        let _ = event_tx.send(SessionEvent::Info(InfoEvent::Message(
            "Stopping engine before exit…".into(),
        )));
        toggle(&engine, session, &event_tx)
    };

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::Toggle) => {
                        if let Some(issued) = toggle(&engine, &mut session, &event_tx) {
                            in_flight = Some(issued);
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        // Quit waits for the in-flight command so the final state and hint agree.
                        quit_pending = true;
                        if in_flight.is_none() {
                            match begin_exit(&mut session) {
                                Some(issued) => in_flight = Some(issued),
                                None => break,
                            }
                        }
                    }
                }
            }
            answer = answers.recv(), if answers_open => {
                let Some(answer) = answer else {
                    answers_open = false;
                    continue;
                };
                let running = match &answer {
                    ReconcileAnswer::Running(r) => Some(r.as_ref().ok().copied()),
                    _ => None,
                };
                let outcome = answer.apply_to(&mut session);
                publish(&event_tx, &hints, &session, outcome);
                if let Some(running) = running {
                    let _ = event_tx.send(SessionEvent::Info(InfoEvent::Reconciled { running }));
                    if std::mem::take(&mut start_pending)
                        && running == Some(false)
                        && !quit_pending
                        && session.in_flight().is_none()
                    {
                        in_flight = toggle(&engine, &mut session, &event_tx);
                    }
                }
            }
            (channel, payload) = subscriber.recv() => {
                let outcome = session.apply_event(channel, &payload);
                publish(&event_tx, &hints, &session, outcome);
                if outcome.changed && channel == EngineChannel::Rate {
                    let _ = event_tx.send(SessionEvent::RateSample {
                        hashrate: session.snapshot().hashrate,
                    });
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(f) = &mut in_flight {
                    if let Some(h) = f.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                let (Some(join_res), Some(done)) = (maybe_done, in_flight.take()) else {
                    continue;
                };
                let command = done.command;
                let result = join_res.unwrap_or_else(|e| {
                    Err(GatewayError::unreachable(
                        match command {
                            Command::Start => "start",
                            Command::Stop => "stop",
                        },
                        format!("command task failed: {e}"),
                    ))
                });
                let outcome = session.settle(command, result.clone());
                if let Err(e) = result {
                    let _ = event_tx.send(SessionEvent::CommandFailed {
                        command,
                        error: e.to_string(),
                    });
                }
                publish(&event_tx, &hints, &session, outcome);
                if quit_pending {
                    match begin_exit(&mut session) {
                        Some(issued) => in_flight = Some(issued),
                        None => break,
                    }
                }
            }
            _ = watchdog.tick() => {
                if session.in_warmup() {
                    let since = *warmup_since.get_or_insert_with(Instant::now);
                    if let Some(limit) = cfg.warmup_notice {
                        if !warmup_noticed && since.elapsed() >= limit {
                            warmup_noticed = true;
                            let _ = event_tx.send(SessionEvent::Info(InfoEvent::WarmupStalled {
                                waited_secs: since.elapsed().as_secs(),
                            }));
                        }
                    }
                } else {
                    warmup_since = None;
                    warmup_noticed = false;
                }
            }
        }
    }

    subscriber.release();
    tracing::info!(status = %session.status(), "session closed");
    Ok(session.snapshot().clone())
}
