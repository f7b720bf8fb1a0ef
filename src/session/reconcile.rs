//! Startup reconciliation against the engine.
//!
//! The three queries run as independent tasks and each answer is handed to the
//! session as soon as it arrives, so a slow or failing query never holds back
//! the others.

use super::state::{Outcome, Session};
use crate::engine::CommandGateway;
use crate::error::GatewayError;
use crate::storage::HintStore;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum ReconcileAnswer {
    Running(Result<bool, GatewayError>),
    Algorithm(Result<Option<String>, GatewayError>),
    Hashrate(Result<Option<f64>, GatewayError>),
}

impl ReconcileAnswer {
    pub fn apply_to(self, session: &mut Session) -> Outcome {
        match self {
            ReconcileAnswer::Running(r) => session.apply_running_answer(r),
            ReconcileAnswer::Algorithm(r) => session.apply_algorithm_answer(r),
            ReconcileAnswer::Hashrate(r) => session.apply_hashrate_answer(r),
        }
    }
}

/// Issue each query exactly once. The receiver closes after the third answer.
pub fn spawn_queries<G: CommandGateway>(gateway: &Arc<G>) -> mpsc::UnboundedReceiver<ReconcileAnswer> {
    let (tx, rx) = mpsc::unbounded_channel();

    let gw = Arc::clone(gateway);
    let running_tx = tx.clone();
    tokio::spawn(async move {
        let _ = running_tx.send(ReconcileAnswer::Running(gw.query_running().await));
    });

    let gw = Arc::clone(gateway);
    let algorithm_tx = tx.clone();
    tokio::spawn(async move {
        let _ = algorithm_tx.send(ReconcileAnswer::Algorithm(gw.query_algorithm().await));
    });

    let gw = Arc::clone(gateway);
    tokio::spawn(async move {
        let _ = tx.send(ReconcileAnswer::Hashrate(gw.query_hashrate().await));
    });

    rx
}

/// Read the hint for the provisional first paint. Unreadable hints count as absent.
pub fn read_hint<H: HintStore + ?Sized>(hints: &H) -> Option<bool> {
    match hints.load() {
        Ok(hint) => hint,
        Err(e) => {
            tracing::warn!("ignoring unreadable session hint: {e}");
            None
        }
    }
}

/// Mirror a confirmed transition into the hint store.
pub fn persist<H: HintStore + ?Sized>(hints: &H, outcome: Outcome) {
    if let Some(was_running) = outcome.write_hint {
        if let Err(e) = hints.store(was_running) {
            tracing::warn!("failed to persist session hint: {e}");
        }
    }
}

/// Mount and fully reconcile a session without attaching to events.
pub async fn reconcile_once<G, H>(gateway: &Arc<G>, hints: &H) -> Session
where
    G: CommandGateway,
    H: HintStore + ?Sized,
{
    let mut session = Session::mount(read_hint(hints));
    let mut answers = spawn_queries(gateway);
    while let Some(answer) = answers.recv().await {
        let outcome = answer.apply_to(&mut session);
        persist(hints, outcome);
    }
    session
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{FakeEngine, Op};
    use crate::model::{ConfirmedBy, SessionStatus};
    use crate::storage::MemoryHintStore;

    #[tokio::test]
    async fn reconciles_running_engine_without_a_hint() {
        let engine = Arc::new(FakeEngine::default());
        engine.set_running(Ok(true));
        engine.set_algorithm(Ok(Some("rx".into())));
        engine.set_hashrate(Ok(Some(523.4)));
        let hints = MemoryHintStore::with_hint(None);

        let session = reconcile_once(&engine, &hints).await;

        let data = session.snapshot();
        assert_eq!(data.status, SessionStatus::Running);
        assert_eq!(data.algorithm, "rx");
        assert_eq!(data.hashrate, 523.4);
        assert_eq!(data.last_confirmed_by, ConfirmedBy::Query);
        assert_eq!(hints.current(), Some(true));
        for op in [Op::Running, Op::Algorithm, Op::Hashrate] {
            assert_eq!(engine.calls(op), 1);
        }
    }

    #[tokio::test]
    async fn authoritative_idle_beats_a_stale_hint() {
        let engine = Arc::new(FakeEngine::default());
        engine.set_running(Ok(false));
        engine.set_algorithm(Ok(Some("rx".into())));
        let hints = MemoryHintStore::with_hint(Some(true));

        let session = reconcile_once(&engine, &hints).await;

        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.snapshot().algorithm.is_empty());
        assert_eq!(hints.writes(), vec![false]);
    }

    #[tokio::test]
    async fn one_failing_query_does_not_spoil_the_others() {
        let engine = Arc::new(FakeEngine::default());
        engine.set_running(Ok(true));
        engine.set_algorithm(Err(GatewayError::unreachable("query algorithm", "timeout")));
        engine.set_hashrate(Ok(Some(99.0)));
        let hints = MemoryHintStore::default();

        let session = reconcile_once(&engine, &hints).await;

        assert_eq!(session.status(), SessionStatus::Running);
        assert!(session.snapshot().algorithm.is_empty());
        assert_eq!(session.snapshot().hashrate, 99.0);
    }

    #[tokio::test]
    async fn unreachable_engine_leaves_hint_untouched() {
        let engine = Arc::new(FakeEngine::default());
        engine.set_running(Err(GatewayError::unreachable("query running", "refused")));
        let hints = MemoryHintStore::with_hint(Some(true));

        let session = reconcile_once(&engine, &hints).await;

        assert_eq!(session.status(), SessionStatus::Running);
        assert!(!session.view().verified);
        assert!(hints.writes().is_empty());
    }

    #[tokio::test]
    async fn answers_are_applied_as_they_arrive() {
        let engine = Arc::new(FakeEngine::default());
        engine.set_running(Ok(true));
        engine.set_algorithm(Ok(Some("rx".into())));
        let gate = engine.hold(Op::Algorithm);

        let mut session = Session::mount(None);
        let mut answers = spawn_queries(&engine);
        let mut seen = 0;
        while seen < 2 {
            if let Some(answer) = answers.recv().await {
                assert!(!matches!(answer, ReconcileAnswer::Algorithm(_)));
                let _ = answer.apply_to(&mut session);
                seen += 1;
            }
        }
        assert_eq!(session.status(), SessionStatus::Running);

        gate.notify_one();
        let answer = answers.recv().await.expect("algorithm answer");
        let _ = answer.apply_to(&mut session);
        assert_eq!(session.snapshot().algorithm, "rx");
        assert!(answers.recv().await.is_none());
    }
}
