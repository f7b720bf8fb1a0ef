mod help;
mod state;

use crate::engine::HttpEngine;
use crate::model::{SessionConfig, SessionEvent};
use crate::orchestrator::{self, UiCommand};
use crate::storage::FileHintStore;
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use help::draw_help;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Sparkline, Tabs},
    Terminal,
};
use state::{push_wrapped_status_kv, UiState};
use std::sync::Arc;
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

const TAB_COUNT: usize = 2;

pub async fn run(cfg: SessionConfig, hints: FileHintStore) -> Result<()> {
    let engine = Arc::new(HttpEngine::new(&cfg)?);
    // Unbounded channels keep the controller from ever waiting on the UI.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<SessionEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let engine_url = cfg.engine_url.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(engine_url, event_rx, cmd_tx));

    let res = orchestrator::run_controller(&cfg, engine, hints, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res.map(|_| ())
}

/// Run the TUI loop on a dedicated thread.
///
/// Returns once the controller has wound down and closed the event channel, so
/// a stop-on-exit stays visible until it settles.
pub fn run_threaded(
    engine_url: String,
    mut event_rx: UnboundedReceiver<SessionEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::default();

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = loop {
        // Drain events without blocking to keep UI responsive.
        let closed = loop {
            match event_rx.try_recv() {
                Ok(ev) => state.apply_event(ev),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };
        if closed {
            break Ok(());
        }

        if last_tick.elapsed() >= tick_rate {
            terminal
                .draw(|f| draw(f.area(), f, &state, &engine_url))
                .ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                match (k.modifiers, k.code) {
                    (_, KeyCode::Char('q')) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                        if state.quitting {
                            // Second request: leave without waiting for the controller.
                            break Ok(());
                        }
                        state.quitting = true;
                        state.info = "Quitting…".into();
                        let _ = cmd_tx.send(UiCommand::Quit);
                    }
                    (_, KeyCode::Char(' ')) | (_, KeyCode::Enter) | (_, KeyCode::Char('t')) => {
                        if state.tab == 0 && !state.quitting {
                            // The controller decides; refusals come back as info events.
                            let _ = cmd_tx.send(UiCommand::Toggle);
                        }
                    }
                    (_, KeyCode::Tab) => {
                        state.tab = (state.tab + 1) % TAB_COUNT;
                    }
                    (_, KeyCode::Char('?')) => {
                        state.tab = 1;
                    }
                    _ => {}
                }
            }
        }
    };

    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, LeaveAlternateScreen).ok();
    res
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState, engine_url: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)].as_ref())
        .split(area);

    let tabs = Tabs::new(vec![Line::from("Dashboard"), Line::from("Help")])
        .select(state.tab)
        .block(Block::default().borders(Borders::ALL).title("mining-control"))
        .highlight_style(Style::default().fg(Color::Yellow));
    f.render_widget(tabs, chunks[0]);

    match state.tab {
        0 => draw_dashboard(chunks[1], f, state, engine_url),
        _ => draw_help(chunks[1], f),
    }
}

fn draw_dashboard(area: Rect, f: &mut ratatui::Frame, state: &UiState, engine_url: &str) {
    let main = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(7), // Session card + toggle
                Constraint::Min(5),    // Hashrate sparkline
                Constraint::Length(6), // Status row
            ]
            .as_ref(),
        )
        .split(area);

    let top_row = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(70), Constraint::Percentage(30)].as_ref())
        .split(main[0]);

    let view = &state.view;
    let session_lines = vec![
        Line::from(vec![
            Span::styled("Status:    ", Style::default().fg(Color::Gray)),
            Span::styled(view.status_line(), Style::default().fg(state.status_color())),
        ]),
        Line::from(vec![
            Span::styled("Algorithm: ", Style::default().fg(Color::Gray)),
            Span::raw(view.algorithm.clone().unwrap_or_else(|| "-".into())),
        ]),
        Line::from(vec![
            Span::styled("Hashrate:  ", Style::default().fg(Color::Gray)),
            Span::styled(state.hashrate_text(), Style::default().fg(Color::Green)),
        ]),
        Line::from(vec![
            Span::styled("Engine:    ", Style::default().fg(Color::Gray)),
            Span::raw(engine_url.to_string()),
        ]),
    ];
    f.render_widget(
        Paragraph::new(session_lines).block(Block::default().borders(Borders::ALL).title("Session")),
        top_row[0],
    );

    let toggle_style = if view.toggle_enabled && !state.quitting {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let toggle = Paragraph::new(vec![
        Line::from(""),
        Line::from(Span::styled(format!(" {} ", view.toggle_label), toggle_style)).centered(),
        Line::from(""),
        Line::from(Span::styled(
            "space / enter",
            Style::default().fg(Color::DarkGray),
        ))
        .centered(),
    ])
    .block(Block::default().borders(Borders::ALL).title("Toggle"));
    f.render_widget(toggle, top_row[1]);

    let avg = crate::metrics::compute_metrics(&state.rate_samples).map(|(mean, _, _, _)| mean);
    let spark_title = Line::from(vec![
        Span::raw("Hashrate (avg "),
        Span::styled(
            avg.map(|a| format!("{a:.1}")).unwrap_or_else(|| "-".into()),
            Style::default().fg(Color::Green),
        ),
        Span::raw(" H/s)"),
    ]);
    f.render_widget(
        Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title(spark_title))
            .data(&state.rate_series)
            .style(Style::default().fg(Color::Green)),
        main[1],
    );

    let mut status_lines = Vec::new();
    push_wrapped_status_kv(&mut status_lines, "Info", &state.info, main[2].width);
    if let Some(err) = state.last_error.as_deref() {
        push_wrapped_status_kv(&mut status_lines, "Error", err, main[2].width);
    }
    status_lines.push(Line::from(vec![
        Span::styled("Keys: ", Style::default().fg(Color::Gray)),
        Span::raw("space toggle · tab switch · ? help · q quit"),
    ]));
    f.render_widget(
        Paragraph::new(status_lines).block(Block::default().borders(Borders::ALL).title("Status")),
        main[2],
    );
}
