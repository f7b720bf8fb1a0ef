//! Application-level orchestration.
//!
//! This module owns the session lifecycle loop (mount, reconcile, toggle,
//! teardown). UI/CLI layers talk to it through `UiCommand`s and receive
//! `SessionEvent`s back, which keeps presentation and state separated.

mod controller;

pub(crate) use controller::{run_controller, UiCommand};
