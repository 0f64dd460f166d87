// ABOUTME: Renders the session list, status line, key help and errors
// ABOUTME: Pure function of App state; never touches the filesystem

use super::app::{App, SessionRow};
use claudes_core::{truncate, Status};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};
use std::time::Duration;

pub const HELP: &str = "[↑↓] navigate  [enter] attach  [d] delete  [r] refresh  [q] quit";

const PROMPT_WIDTH: usize = 20;
const BRANCH_WIDTH: usize = 30;
const PREVIEW_WIDTH: usize = 50;

fn status_color(status: Status) -> Color {
    match status {
        Status::Running => Color::Yellow,
        Status::Complete => Color::Green,
        Status::Failed => Color::Red,
    }
}

/// Go-style duration: `45s`, `3m7s`, `2h0m5s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{s}s")
    }
}

/// One line of transcript tail: whitespace collapsed, cut at 50 chars
pub fn format_preview(tail: &str) -> String {
    let flat = tail.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PREVIEW_WIDTH {
        let kept: String = flat.chars().take(PREVIEW_WIDTH).collect();
        format!("{kept}...")
    } else {
        flat
    }
}

fn session_line(index: usize, row: &SessionRow, selected: bool) -> Line<'static> {
    let session = &row.session;
    let cursor = if selected { ">" } else { " " };
    let branch = session
        .branch_name
        .as_deref()
        .map(|b| format!(" [{}]", truncate(b, BRANCH_WIDTH)))
        .unwrap_or_default();

    let base = if selected {
        Style::default().add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    Line::from(vec![
        Span::styled(
            format!(
                "{cursor} {index}  {:<width$}  ",
                truncate(&session.prompt, PROMPT_WIDTH),
                width = PROMPT_WIDTH
            ),
            base,
        ),
        Span::styled(
            format!("{:<10}", session.status.to_string()),
            Style::default().fg(status_color(session.status)),
        ),
        Span::styled(format!("  {:>8}", format_elapsed(session.elapsed())), base),
        Span::styled(branch, Style::default().fg(Color::Cyan)),
        Span::styled(
            format!("  {}", format_preview(&row.preview)),
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(1),    // Sessions
            Constraint::Length(1), // Status line
            Constraint::Length(1), // Help
            Constraint::Length(if app.error.is_some() { 1 } else { 0 }),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], app.rows.len());
    render_sessions(frame, chunks[1], app);

    if let Some(status) = &app.status {
        frame.render_widget(
            Paragraph::new(status.as_str()).style(Style::default().fg(Color::Gray)),
            chunks[2],
        );
    }

    frame.render_widget(
        Paragraph::new(HELP).style(Style::default().fg(Color::DarkGray)),
        chunks[3],
    );

    if let Some(error) = &app.error {
        frame.render_widget(
            Paragraph::new(format!("Error: {error}")).style(Style::default().fg(Color::Red)),
            chunks[4],
        );
    }
}

fn render_header(frame: &mut Frame, area: Rect, count: usize) {
    let title = Line::from(vec![
        Span::styled(
            " Claudes ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(
            format!("{count} sessions"),
            Style::default().fg(Color::Green),
        ),
    ]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    frame.render_widget(Paragraph::new(title).block(block), area);
}

fn render_sessions(frame: &mut Frame, area: Rect, app: &App) {
    if app.rows.is_empty() {
        frame.render_widget(Paragraph::new("No active sessions"), area);
        return;
    }

    // keep the cursor on screen
    let visible = area.height as usize;
    let skip = (app.cursor + 1).saturating_sub(visible);

    let items: Vec<ListItem> = app
        .rows
        .iter()
        .enumerate()
        .skip(skip)
        .map(|(i, row)| ListItem::new(session_line(i, row, i == app.cursor)))
        .collect();
    frame.render_widget(List::new(items), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::app::Msg;
    use claudes_core::Session;
    use ratatui::{backend::TestBackend, Terminal};

    fn draw(app: &App, width: u16, height: u16) -> Vec<String> {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| render(f, app)).unwrap();
        let buffer = terminal.backend().buffer();
        (0..buffer.area.height)
            .map(|y| {
                (0..buffer.area.width)
                    .map(|x| buffer[(x, y)].symbol())
                    .collect::<String>()
                    .trim_end()
                    .to_string()
            })
            .collect()
    }

    fn row(prompt: &str, status: Status, preview: &str) -> SessionRow {
        let mut session = Session::new(prompt);
        session.status = status;
        SessionRow {
            session,
            preview: preview.to_string(),
        }
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0s");
        assert_eq!(format_elapsed(Duration::from_secs(45)), "45s");
        assert_eq!(format_elapsed(Duration::from_secs(187)), "3m7s");
        assert_eq!(format_elapsed(Duration::from_secs(7205)), "2h0m5s");
    }

    #[test]
    fn test_format_preview() {
        assert_eq!(format_preview("  done.\n"), "done.");
        assert_eq!(format_preview("line one\nline two"), "line one line two");
        let long = "x".repeat(80);
        assert_eq!(format_preview(&long), format!("{}...", "x".repeat(50)));
    }

    #[test]
    fn test_empty_list_view() {
        let lines = draw(&App::new(), 80, 10);
        assert!(lines[1].contains("Claudes"));
        assert!(lines[1].contains("0 sessions"));
        assert_eq!(lines[3], "No active sessions");
        assert!(lines.iter().any(|l| l == HELP));
    }

    #[test]
    fn test_session_rows() {
        let mut app = App::new();
        let mut branched = row("add authentication to the api", Status::Running, "Working on it\n");
        branched.session.branch_name = Some("claude/add-auth-1a2b3".to_string());
        app.update(Msg::Loaded(Ok(vec![
            branched,
            row("fix bug", Status::Complete, "All tests pass."),
        ])));

        let lines = draw(&app, 140, 10);
        let first = &lines[3];
        assert!(first.starts_with("> 0  add authenticatio...  Running"), "{first:?}");
        assert!(first.contains("[claude/add-auth-1a2b3]"));
        assert!(first.ends_with("Working on it"));

        let second = &lines[4];
        assert!(second.starts_with("  1  fix bug"), "{second:?}");
        assert!(second.contains("Complete"));
        assert!(second.ends_with("All tests pass."));
    }

    #[test]
    fn test_status_colors() {
        let mut app = App::new();
        app.update(Msg::Loaded(Ok(vec![row("p", Status::Failed, "")])));

        let mut terminal = Terminal::new(TestBackend::new(80, 8)).unwrap();
        terminal.draw(|f| render(f, &app)).unwrap();
        let buffer = terminal.backend().buffer();
        // "> 0  " + 20-char prompt + two spaces puts the status at column 27
        assert_eq!(buffer[(27, 3)].symbol(), "F");
        assert_eq!(buffer[(27, 3)].fg, Color::Red);
    }

    #[test]
    fn test_error_renders_below_help() {
        let mut app = App::new();
        app.update(Msg::Loaded(Err("store unreadable".to_string())));
        let lines = draw(&app, 80, 10);
        let help = lines.iter().position(|l| l == HELP).unwrap();
        assert_eq!(lines[help + 1], "Error: store unreadable");
    }

    #[test]
    fn test_status_line_shows_latest_event() {
        let mut app = App::new();
        app.status = Some("Started: hello (1a2b3c4d)".to_string());
        let lines = draw(&app, 80, 10);
        let help = lines.iter().position(|l| l == HELP).unwrap();
        assert_eq!(lines[help - 1], "Started: hello (1a2b3c4d)");
    }
}
