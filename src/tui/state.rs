use crate::model::{HashrateDisplay, InfoEvent, SessionEvent, SessionStatus, SessionView};
use crate::session::Session;
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};

/// Sparkline history length.
const MAX_SERIES: usize = 120;
/// Samples behind the average shown over the sparkline.
const MAX_SAMPLES: usize = 3600;

pub struct UiState {
    pub tab: usize,
    pub view: SessionView,
    pub info: String,
    /// Last command failure, kept until the next command is issued.
    pub last_error: Option<String>,
    pub rate_series: Vec<u64>,
    pub rate_samples: Vec<f64>,
    pub quitting: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: 0,
            // Same first paint the controller produces before any hint is read.
            view: Session::mount(None).view(),
            info: "Connecting to engine…".into(),
            last_error: None,
            rate_series: Vec::new(),
            rate_samples: Vec::new(),
            quitting: false,
        }
    }
}

impl UiState {
    fn push_capped<T>(series: &mut Vec<T>, v: T, cap: usize) {
        series.push(v);
        if series.len() > cap {
            let _ = series.drain(0..(series.len() - cap));
        }
    }

    pub fn apply_event(&mut self, ev: SessionEvent) {
        match ev {
            SessionEvent::Changed { view } => {
                let issued = matches!(view.status, SessionStatus::Starting | SessionStatus::Stopping)
                    && view.status != self.view.status;
                if issued {
                    self.last_error = None;
                }
                self.view = view;
            }
            SessionEvent::RateSample { hashrate } => {
                Self::push_capped(&mut self.rate_series, hashrate.round() as u64, MAX_SERIES);
                Self::push_capped(&mut self.rate_samples, hashrate, MAX_SAMPLES);
            }
            SessionEvent::CommandFailed { command, error } => {
                let msg = format!("{command} failed: {error}");
                self.info = msg.clone();
                self.last_error = Some(msg);
            }
            SessionEvent::Info(InfoEvent::Reconciled { running }) => {
                self.info = InfoEvent::Reconciled { running }.to_message();
                // A fresh reconciliation starts a fresh chart.
                if running != Some(true) {
                    self.rate_series.clear();
                }
            }
            SessionEvent::Info(info) => {
                self.info = info.to_message();
            }
        }
    }

    pub fn hashrate_text(&self) -> String {
        match self.view.hashrate {
            HashrateDisplay::Pending => "waiting for first metric…".into(),
            HashrateDisplay::Rate(_) => crate::text_summary::format_hashrate(self.view.hashrate),
        }
    }

    pub fn status_color(&self) -> Color {
        match self.view.status {
            SessionStatus::Running if self.view.verified => Color::Green,
            SessionStatus::Running => Color::Yellow,
            SessionStatus::Starting | SessionStatus::Stopping => Color::Cyan,
            SessionStatus::Idle => Color::Gray,
        }
    }
}

pub fn push_wrapped_status_kv(
    out: &mut Vec<Line<'static>>,
    label: &str,
    value: &str,
    status_area_width: u16,
) {
    let value = value.trim();
    if value.is_empty() {
        return;
    }

    // Account for borders (2 chars on each side)
    let usable_width = status_area_width.saturating_sub(4).max(1);
    let label_text = format!("{label}:");
    let label_width = label_text.chars().count() as u16;

    let value_chars: Vec<char> = value.chars().collect();
    let mut remaining = value_chars.as_slice();
    let mut first = true;

    while !remaining.is_empty() {
        let line_width = if first {
            usable_width.saturating_sub(label_width + 1).max(1)
        } else {
            usable_width.saturating_sub(2).max(1)
        };

        let chars_to_take = (remaining.len() as u16).min(line_width) as usize;
        let (line_chars, rest) = remaining.split_at(chars_to_take);
        let line_text: String = line_chars.iter().collect();

        if first {
            out.push(Line::from(vec![
                Span::styled(label_text.clone(), Style::default().fg(Color::Gray)),
                Span::raw(" "),
                Span::raw(line_text),
            ]));
            first = false;
        } else {
            out.push(Line::from(vec![Span::raw("  "), Span::raw(line_text)]));
        }

        remaining = rest;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Command;

    fn running_view() -> SessionView {
        SessionView {
            status: SessionStatus::Running,
            algorithm: Some("rx".into()),
            hashrate: HashrateDisplay::Rate(10.0),
            verified: true,
            reconciling: false,
            toggle_enabled: true,
            toggle_label: "Stop mining".into(),
        }
    }

    #[test]
    fn series_is_capped() {
        let mut state = UiState::default();
        for i in 0..(MAX_SERIES + 30) {
            state.apply_event(SessionEvent::RateSample {
                hashrate: i as f64,
            });
        }
        assert_eq!(state.rate_series.len(), MAX_SERIES);
        assert_eq!(state.rate_series[0], 30);
        assert_eq!(state.rate_samples.len(), MAX_SERIES + 30);
    }

    #[test]
    fn long_sessions_keep_a_bounded_sample_window() {
        let mut state = UiState::default();
        for i in 0..(MAX_SAMPLES + 500) {
            state.apply_event(SessionEvent::RateSample {
                hashrate: i as f64,
            });
        }
        assert_eq!(state.rate_samples.len(), MAX_SAMPLES);
        assert_eq!(state.rate_samples[0], 500.0);
        assert_eq!(state.rate_series.len(), MAX_SERIES);
    }

    #[test]
    fn failure_sticks_until_the_next_command() {
        let mut state = UiState::default();
        state.apply_event(SessionEvent::CommandFailed {
            command: Command::Start,
            error: "engine rejected start: no GPU".into(),
        });
        assert!(state.info.contains("no GPU"));

        // The revert that follows a failed start keeps the error visible.
        let mut idle = running_view();
        idle.status = SessionStatus::Idle;
        idle.hashrate = HashrateDisplay::Rate(0.0);
        state.apply_event(SessionEvent::Changed { view: idle });
        assert!(state.last_error.is_some());

        let mut starting = running_view();
        starting.status = SessionStatus::Starting;
        starting.toggle_enabled = false;
        state.apply_event(SessionEvent::Changed { view: starting });
        assert!(state.last_error.is_none());
    }

    #[test]
    fn warmup_hashrate_reads_as_pending() {
        let mut state = UiState::default();
        let mut view = running_view();
        view.status = SessionStatus::Starting;
        view.hashrate = HashrateDisplay::Pending;
        state.apply_event(SessionEvent::Changed { view });
        assert_eq!(state.hashrate_text(), "waiting for first metric…");
        assert_eq!(state.status_color(), Color::Cyan);
    }

    #[test]
    fn wraps_long_values_under_label() {
        let mut out = Vec::new();
        push_wrapped_status_kv(&mut out, "Info", &"x".repeat(30), 20);
        assert!(out.len() > 1);
        push_wrapped_status_kv(&mut out, "Empty", "   ", 20);
        assert!(out.len() > 1);
    }
}
