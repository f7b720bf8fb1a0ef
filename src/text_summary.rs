//! Text output for CLI mode.
//!
//! Formats a one-line description per session change and the exit summary.

use crate::metrics;
use crate::model::{HashrateDisplay, MiningSession, SessionStatus, SessionView};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Format a hashrate the way every presentation layer shows it.
pub(crate) fn format_hashrate(display: HashrateDisplay) -> String {
    match display {
        HashrateDisplay::Pending => "metrics pending".to_string(),
        HashrateDisplay::Rate(h) => format!("{h:.1} H/s"),
    }
}

/// One status line for a session view.
pub(crate) fn describe_view(view: &SessionView) -> String {
    let mut line = view.status_line();
    if let Some(algorithm) = view.algorithm.as_deref() {
        line.push_str(&format!(" | algo {algorithm}"));
    }
    // The status line already says "metrics pending" during warm-up.
    match view.hashrate {
        HashrateDisplay::Pending => {}
        HashrateDisplay::Rate(h) if h == 0.0 && view.status != SessionStatus::Running => {}
        display => line.push_str(&format!(" | {}", format_hashrate(display))),
    }
    line
}

/// Build the exit summary from the final session and the observed rate samples.
pub(crate) fn build_text_summary(session: &MiningSession, samples: &[f64]) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!(
        "Final status: {} ({:?})",
        session.status, session.last_confirmed_by
    ));
    if !session.algorithm.is_empty() {
        lines.push(format!("Algorithm: {}", session.algorithm));
    }

    match metrics::compute_metrics(samples) {
        Some((mean, median, p25, p75)) => {
            lines.push(format!(
                "Hashrate: avg {:.1} med {:.1} p25 {:.1} p75 {:.1} H/s over {} samples",
                mean,
                median,
                p25,
                p75,
                samples.len()
            ));
            if let Some(peak) = metrics::peak(samples) {
                lines.push(format!("Peak: {peak:.1} H/s"));
            }
        }
        None => lines.push("Hashrate: no samples observed".to_string()),
    }

    TextSummary { lines }
}
