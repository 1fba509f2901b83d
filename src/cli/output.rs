//! Output formatting utilities for CLI

use serde::Serialize;

use crate::events::{Notice, NoticeLevel};
use crate::session::Session;
use crate::session_types;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print a serializable value as JSON or use custom text formatter
pub fn print_formatted<T, F>(value: &T, format: OutputFormat, text_formatter: F)
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Text => println!("{}", text_formatter(value)),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message (suppressed in quiet mode)
pub fn print_success(message: &str, quiet: bool) {
    if !quiet {
        println!("{}", message);
    }
}

/// Print an error message (never suppressed)
pub fn print_error(message: &str) {
    eprintln!("Error: {}", message);
}

/// Format a notice as a single status line
pub fn format_notice(notice: &Notice) -> String {
    let marker = match notice.level {
        NoticeLevel::Busy => "[..]",
        NoticeLevel::Info => "[--]",
        NoticeLevel::Success => "[OK]",
        NoticeLevel::Error => "[!!]",
    };
    let mut line = format!("{} {}: {}", marker, notice.title, notice.message);
    if notice.offer_reload {
        line.push_str(" (run 'session list' to reload)");
    }
    line
}

/// Print a notice to stderr; errors are shown even in quiet mode
pub fn print_notice(notice: &Notice, quiet: bool) {
    if quiet && notice.level != NoticeLevel::Error {
        return;
    }
    eprintln!("{}", format_notice(notice));
}

/// Format a session list as an aligned table
pub fn format_sessions(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No active sessions".to_string();
    }

    let mut lines = vec![format!(
        "{:<12} {:<20} {:<10} {:<12} {}",
        "ID", "NAME", "TYPE", "STATUS", "STARTED"
    )];
    for s in sessions {
        let started = s
            .started_at()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "{:<12} {:<20} {:<10} {:<12} {}",
            s.id,
            s.name,
            session_types::label(&s.session_type),
            s.status.as_str(),
            started
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;
    use crate::testing::session;

    #[test]
    fn test_format_notice() {
        let notice = Notice::error("Session delete pending", "Still terminating.").with_reload();
        assert_eq!(
            format_notice(&notice),
            "[!!] Session delete pending: Still terminating. (run 'session list' to reload)"
        );
        assert_eq!(
            format_notice(&Notice::busy("Polling", "Waiting")),
            "[..] Polling: Waiting"
        );
    }

    #[test]
    fn test_format_sessions() {
        assert_eq!(format_sessions(&[]), "No active sessions");

        let mut running = session("a1", "analysis", "carta", SessionStatus::Running);
        running.start_time = Some("2021-03-02T18:02:45Z".to_string());
        let table = format_sessions(&[running]);
        let rows: Vec<&str> = table.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("ID"));
        assert!(rows[1].contains("CARTA"));
        assert!(rows[1].contains("Running"));
        assert!(rows[1].ends_with("2021-03-02 18:02"));
    }
}
