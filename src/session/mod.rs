//! Mining session synchronization.
//!
//! `state` holds the session record and its state machine, `reconcile` brings
//! it in line with the engine at startup, and `subscriber` owns the push
//! channels that keep it live.

mod reconcile;
mod state;
mod subscriber;

pub use reconcile::{persist, read_hint, reconcile_once, spawn_queries, ReconcileAnswer};
pub use state::{Outcome, Session};
pub use subscriber::EventSubscriber;
