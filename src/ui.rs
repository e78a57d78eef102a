use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};

use crate::keywords::highlight_line;
use crate::session::Session;
use crate::stats::{RunStats, RunStatus};

const INFO_PANEL_HEIGHT: u16 = 6;

/// Draw the entire UI: info panel, output viewport, status bar.
///
/// A pure function of the session state; redrawing with unchanged state
/// produces the identical frame.
pub fn draw(frame: &mut Frame, session: &mut Session) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(INFO_PANEL_HEIGHT),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    // The output block spends two rows on borders; the panel_height
    // setting caps how many history lines show inside it.
    let inner_height = chunks[1].height.saturating_sub(2) as usize;
    let panel_cap = session.config.panel_height as usize;
    session.set_viewport_height(inner_height.min(panel_cap).max(1));

    let stats = session.stats();
    draw_info_panel(frame, session, &stats, chunks[0]);
    draw_output(frame, session, chunks[1]);
    draw_status_bar(frame, session, &stats, chunks[2]);

    if session.show_help {
        draw_help_overlay(frame);
    }
}

fn status_span(status: RunStatus) -> Span<'static> {
    match status {
        RunStatus::Running => Span::styled("● Running", Style::default().fg(Color::Yellow)),
        RunStatus::Succeeded => Span::styled("✓ Completed", Style::default().fg(Color::Green)),
        RunStatus::Failed => Span::styled("✗ Failed", Style::default().fg(Color::Red)),
        RunStatus::Interrupted => Span::styled("! Interrupted", Style::default().fg(Color::Yellow)),
    }
}

fn draw_info_panel(frame: &mut Frame, session: &Session, stats: &RunStats, area: Rect) {
    let config = &session.config;

    let mut profile_line = vec![
        Span::raw("Profile: "),
        Span::styled(config.profile.clone(), Style::default().fg(Color::Cyan)),
    ];
    if !config.description.is_empty() {
        profile_line.push(Span::styled(
            format!(" - {}", config.description),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let log_marker = if session.logging_active() || session.finished() {
        session.log_path().display().to_string()
    } else {
        format!("{} (disabled)", session.log_path().display())
    };
    let flags_line = Line::from(Span::raw(format!(
        "Log: {}  Timestamp: {}",
        log_marker,
        if config.timestamp { "✓" } else { "✗" },
    )));

    let stats_line = Line::from(vec![
        Span::raw("Status: "),
        status_span(stats.status),
        Span::raw(format!(
            ", Time: {:.2}s, Lines: {} ({} stdout / {} stderr)",
            stats.elapsed.as_secs_f64(),
            stats.total_lines(),
            stats.stdout_lines,
            stats.stderr_lines,
        )),
    ]);

    let mut lines = vec![Line::from(profile_line), flags_line, stats_line];

    let mut keyword_spans: Vec<Span> = Vec::new();
    for (keyword, count) in &stats.keyword_counts {
        if !keyword_spans.is_empty() {
            keyword_spans.push(Span::raw(", "));
        }
        let color = config.keywords.color_for(keyword).unwrap_or(Color::White);
        keyword_spans.push(Span::styled(
            format!("{keyword}: {count}"),
            Style::default().fg(color),
        ));
    }
    if !keyword_spans.is_empty() {
        let mut spans = vec![Span::raw("Keywords: ")];
        spans.extend(keyword_spans);
        lines.push(Line::from(spans));
    }

    let (title, border) = if session.finished() {
        (" Final Statistics ", Color::Green)
    } else {
        (" Run Information ", Color::Blue)
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_output(frame: &mut Frame, session: &Session, area: Rect) {
    let total = session.history.len();
    let height = session.viewport_height();
    let visible = session.visible();

    let scroll_info = if session.history.is_empty() {
        " [0-0/0]".to_string()
    } else {
        let start = session.scroll + 1;
        let end = (session.scroll + visible.len()).min(total);
        format!(" [{start}-{end}/{total}]")
    };
    // The denominator only counts retained lines; note the full tally once
    // eviction has kicked in.
    let seen = if session.history.dropped() > 0 {
        format!(" ({} seen)", session.history.total_seen())
    } else {
        String::new()
    };
    let follow = if session.follow_tail { " [F]" } else { "" };

    let block = Block::default()
        .title(format!(" Output{scroll_info}{seen}{follow} "))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if total == 0 {
        let msg =
            Paragraph::new("Waiting for output...").style(Style::default().fg(Color::DarkGray));
        frame.render_widget(msg, inner);
        return;
    }

    let lines: Vec<Line> = visible
        .iter()
        .map(|line| highlight_line(&line.text, &session.config.keywords))
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);

    if total > height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut scrollbar_state = ScrollbarState::new(total).position(session.scroll);
        frame.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
    }
}

fn draw_status_bar(frame: &mut Frame, session: &Session, stats: &RunStats, area: Rect) {
    let mode = Span::styled(
        format!(" {} ", stats.status.label().to_uppercase()),
        Style::default().bg(Color::Blue).fg(Color::White),
    );

    let message = session
        .status_message
        .as_deref()
        .map(|m| format!(" {m} "))
        .unwrap_or_default();

    let help_text = if session.finished() {
        " ?:help  q:exit "
    } else {
        " ?:help  q/Ctrl+C:interrupt "
    };

    let status = Line::from(vec![
        mode,
        Span::styled(message, Style::default().fg(Color::Yellow)),
        Span::styled(help_text, Style::default().fg(Color::DarkGray)),
    ]);

    let paragraph = Paragraph::new(status).style(Style::default().bg(Color::Black));
    frame.render_widget(paragraph, area);
}

fn draw_help_overlay(frame: &mut Frame) {
    let area = frame.area();

    let width = 44.min(area.width.saturating_sub(4));
    let height = 16.min(area.height.saturating_sub(4));
    let x = (area.width - width) / 2;
    let y = (area.height - height) / 2;
    let help_area = Rect::new(x, y, width, height);

    frame.render_widget(Clear, help_area);

    let help_text = vec![
        Line::from(Span::styled(
            "Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from("Navigation:"),
        Line::from("  j/k, ↑/↓     Scroll up/down"),
        Line::from("  g/G          Go to top/bottom"),
        Line::from("  PgUp/PgDn    Page up/down"),
        Line::from("  Mouse wheel  Scroll"),
        Line::from(""),
        Line::from("  G also re-enables follow-tail"),
        Line::from(""),
        Line::from("Run control:"),
        Line::from("  q, Ctrl+C    Interrupt the child"),
        Line::from("               (quit once finished)"),
        Line::from("  ?            Toggle this help"),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .style(Style::default().bg(Color::Black));

    frame.render_widget(Paragraph::new(help_text).block(block), help_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureEvent, CapturedLine, StreamOrigin};
    use crate::config::{ConfigFile, SessionConfig};
    use ratatui::{Terminal, backend::TestBackend};
    use std::path::PathBuf;

    fn session() -> Session {
        let config = SessionConfig::resolve(&ConfigFile::default(), None).unwrap();
        Session::new(config, None, PathBuf::from("/tmp/run.log"))
    }

    fn line(sequence: u64, text: &str) -> CapturedLine {
        CapturedLine {
            sequence,
            origin: StreamOrigin::Stdout,
            text: text.to_string(),
            at: chrono::Local::now(),
            tags: vec!["error".to_string()],
        }
    }

    #[test]
    fn test_redraw_without_new_input_is_identical() {
        let mut session = session();
        for i in 0..8u64 {
            session.ingest(line(i, &format!("line {i} hit an error")));
        }
        // A terminal status freezes the elapsed time, so the panel content
        // is a pure function of the session state.
        session.handle_event(CaptureEvent::Exited {
            code: Some(0),
            interrupted: false,
        });

        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|frame| draw(frame, &mut session)).unwrap();
        let first = terminal.backend().buffer().clone();

        terminal.draw(|frame| draw(frame, &mut session)).unwrap();
        assert_eq!(terminal.backend().buffer(), &first);
    }

    #[test]
    fn test_draw_handles_empty_history_and_small_areas() {
        let mut session = session();
        let mut terminal = Terminal::new(TestBackend::new(40, 12)).unwrap();
        terminal.draw(|frame| draw(frame, &mut session)).unwrap();

        session.show_help = true;
        terminal.draw(|frame| draw(frame, &mut session)).unwrap();
    }
}
