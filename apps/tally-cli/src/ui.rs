use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};
use tally_types::update::{TrackerState, TrackerUpdate};

const MAX_LOG_ENTRIES: usize = 120;

pub enum UiMessage {
    Update(TrackerUpdate),
    Shutdown,
}

pub fn run(receiver: Receiver<UiMessage>, summary: String) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, summary.as_str());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    summary: &str,
) -> Result<()> {
    let mut logs: VecDeque<String> = VecDeque::with_capacity(MAX_LOG_ENTRIES);
    let mut latest: Option<TrackerUpdate> = None;
    let mut should_close = false;

    loop {
        let mut receiver_closed = false;
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::Update(update)) => {
                    let formatted = format_update(&update);
                    if logs.len() == MAX_LOG_ENTRIES {
                        logs.pop_front();
                    }
                    logs.push_back(formatted);
                    latest = Some(update);
                }
                Ok(UiMessage::Shutdown) => {
                    should_close = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    receiver_closed = true;
                    should_close = true;
                    break;
                }
            }
        }

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints(
                    [
                        Constraint::Length(3),
                        Constraint::Length(9),
                        Constraint::Min(0),
                        Constraint::Length(3),
                    ]
                    .as_ref(),
                )
                .split(f.size());

            let header = Paragraph::new(Line::from(vec![
                Span::styled(
                    "Tally",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::raw(latest.as_ref().map(summarize_status).unwrap_or_else(|| {
                    "waiting for first update".to_string()
                })),
                Span::raw("  "),
                Span::styled("tracking:", Style::default().fg(Color::Magenta)),
                Span::raw(" "),
                Span::raw(summary),
                Span::raw("  "),
                Span::styled("q", Style::default().fg(Color::Yellow)),
                Span::raw(" to quit"),
            ]))
            .block(Block::default().borders(Borders::ALL).title("Status"));
            f.render_widget(header, chunks[0]);

            let stats = Paragraph::new(stat_lines(latest.as_ref())).block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Lifetime | Session"),
            );
            f.render_widget(stats, chunks[1]);

            let items: Vec<ListItem> = logs
                .iter()
                .rev()
                .map(|entry| ListItem::new(entry.clone()))
                .collect();

            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL).title("Recent updates"))
                .highlight_style(Style::default().fg(Color::Yellow));

            f.render_widget(list, chunks[2]);

            let footer = Paragraph::new(metrics_line(latest.as_ref()))
                .block(Block::default().borders(Borders::ALL).title("Cycles"));
            f.render_widget(footer, chunks[3]);
        })?;

        if should_close && receiver_closed {
            break;
        }

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn stat_lines(latest: Option<&TrackerUpdate>) -> Vec<Line<'static>> {
    let Some(update) = latest else {
        return vec![Line::from("Loading stats...")];
    };
    match &update.state {
        TrackerState::Loading => vec![Line::from("Loading stats...")],
        TrackerState::PlayerMissing { player } => {
            vec![Line::from(format!("Player {player} not found"))]
        }
        TrackerState::Live { snapshot, delta } => {
            let green = Style::default().fg(Color::Green);
            let mut lines = vec![
                Line::from(Span::styled(
                    format!("Kills:     {} | {}", snapshot.kills, delta.kills),
                    green,
                )),
                Line::from(Span::styled(
                    format!("Deaths:    {} | {}", snapshot.deaths, delta.deaths),
                    green,
                )),
                Line::from(Span::styled(
                    format!("Headshots: {} | {}", snapshot.headshots, delta.headshots),
                    green,
                )),
                Line::from(Span::styled(
                    format!(
                        "Damage:    {:.0} | {:.0}",
                        snapshot.damage_dealt, delta.damage_dealt
                    ),
                    green,
                )),
                Line::from(Span::styled(
                    format!(
                        "Hours:     {:.1} | {:.1}",
                        snapshot.playtime_hours, delta.playtime_hours
                    ),
                    green,
                )),
                Line::from(format!("Favorite weapon: {}", snapshot.favorite_weapon)),
            ];
            if delta.counter_reset {
                lines.push(Line::from(Span::styled(
                    "lifetime counters were reset server-side today",
                    Style::default().fg(Color::Yellow),
                )));
            }
            lines
        }
    }
}

fn metrics_line(latest: Option<&TrackerUpdate>) -> Line<'static> {
    let Some(update) = latest else {
        return Line::from("no cycles yet");
    };
    let metrics = &update.metrics;
    let mut spans = vec![Span::raw(format!(
        "ok {} / failed {}",
        metrics.successful_cycles, metrics.failed_cycles
    ))];
    if let Some(err) = &metrics.last_error {
        spans.push(Span::styled(
            format!("  last error: {err}"),
            Style::default().fg(Color::Red),
        ));
    }
    Line::from(spans)
}

fn summarize_status(update: &TrackerUpdate) -> String {
    let base = match &update.state {
        TrackerState::Loading => "loading".to_string(),
        TrackerState::Live { snapshot, delta } => {
            format!("{}: +{} kills today", snapshot.name, delta.kills)
        }
        TrackerState::PlayerMissing { player } => format!("{player} not found"),
    };
    match &update.metrics.last_error {
        Some(err) => format!("{base} (last error: {err})"),
        None => base,
    }
}

fn format_update(update: &TrackerUpdate) -> String {
    let timestamp = update.timestamp.format("%H:%M:%S");
    let body = match &update.state {
        TrackerState::Loading => "loading".to_string(),
        TrackerState::Live { snapshot, delta } => format!(
            "{} kills={}({:+}) deaths={}({:+}) headshots={}({:+})",
            snapshot.name,
            snapshot.kills,
            delta.kills as i64,
            snapshot.deaths,
            delta.deaths as i64,
            snapshot.headshots,
            delta.headshots as i64,
        ),
        TrackerState::PlayerMissing { player } => format!("{player} missing from fetch"),
    };
    match &update.metrics.last_error {
        Some(err) => format!("[{timestamp}] {body} | error: {err}"),
        None => format!("[{timestamp}] {body}"),
    }
}
