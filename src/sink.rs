use std::fs::OpenOptions;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::model::{ActionKind, ActionRecord, Press};
use crate::scheduler::SessionStats;
use crate::window::WindowHandle;

pub const DEFAULT_LOG_FILE: &str = "antiidle.log";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn press_text(press: &Press) -> String {
    format!("{} ({}ms)", press.direction, press.hold_ms())
}

/// The per-turn description, without the timestamp prefix.
pub fn describe_action(record: &ActionRecord) -> String {
    let body = match &record.kind {
        ActionKind::Normal { press } => press_text(press),
        ActionKind::DoubleTap { first, second } => {
            format!("{} {} (double-tap)", press_text(first), press_text(second))
        }
        ActionKind::Misclick { wrong, corrected } => {
            format!("{} -> {} (corrected)", press_text(wrong), press_text(corrected))
        }
    };
    format!("Action #{}: {body}", record.turn)
}

pub fn describe_stats(
    elapsed: Duration,
    stats: &SessionStats,
    next_at: DateTime<Local>,
    delay_secs: u64,
) -> String {
    let secs = elapsed.as_secs();
    format!(
        "Stats: {}m {}s elapsed | {} actions | {} keys | Next action at {} (in {}s)",
        secs / 60,
        secs % 60,
        stats.actions,
        stats.keys,
        next_at.format("%H:%M:%S"),
        delay_secs
    )
}

pub fn timestamped(at: DateTime<Local>, text: &str) -> String {
    format!("[{}] {text}", at.format(TIMESTAMP_FORMAT))
}

fn colorize(line: &str) -> String {
    const RESET: &str = "\x1b[0m";
    const CORRECTED: &str = "\x1b[33m";
    const DOUBLE_TAP: &str = "\x1b[36m";
    const BREAK: &str = "\x1b[35m";

    if line.ends_with("(corrected)") {
        line.replace("(corrected)", &format!("{CORRECTED}(corrected){RESET}"))
    } else if line.ends_with("(double-tap)") {
        line.replace("(double-tap)", &format!("{DOUBLE_TAP}(double-tap){RESET}"))
    } else if line.contains("Extended break") {
        line.replace("Extended break", &format!("{BREAK}Extended break{RESET}"))
    } else {
        line.to_string()
    }
}

/// Append-only, line-oriented event log with a console echo.
///
/// The log file is opened, appended to and closed for every line, so it can be
/// rotated or inspected while a session sleeps. A failed file write never stops the
/// console echo, and vice versa.
pub struct LogSink {
    path: Option<PathBuf>,
    console: Option<Box<dyn Write>>,
    color: bool,
}

impl LogSink {
    /// File at `path` (if any) plus stdout.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            console: Some(Box::new(io::stdout())),
            color: io::stdout().is_terminal(),
        }
    }

    pub fn with_console(path: Option<PathBuf>, console: Box<dyn Write>) -> Self {
        Self {
            path,
            console: Some(console),
            color: false,
        }
    }

    /// Discards everything.
    pub fn silent() -> Self {
        Self {
            path: None,
            console: None,
            color: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn append_file(&self, line: &str) {
        let Some(path) = &self.path else {
            return;
        };

        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{line}"));

        if let Err(err) = result {
            log::warn!("could not append to {}: {err}", path.display());
        }
    }

    /// Console only, no timestamp.
    pub fn console(&mut self, text: &str) {
        let color = self.color;
        let Some(out) = self.console.as_mut() else {
            return;
        };
        let line = if color {
            colorize(text)
        } else {
            text.to_string()
        };
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }

    /// One timestamped line to both the file and the console.
    pub fn line(&mut self, at: DateTime<Local>, text: &str) {
        let line = timestamped(at, text);
        self.append_file(&line);
        self.console(&line);
    }

    pub fn session_started(&mut self, at: DateTime<Local>, target: WindowHandle, title: &str) {
        // Blank separator between sessions in the file.
        self.append_file("");
        self.line(at, "=== SESSION STARTED ===");
        self.line(at, &format!("Target window: {target} ({title})"));
    }

    pub fn session_ended(&mut self, at: DateTime<Local>, stats: &SessionStats) {
        self.line(
            at,
            &format!(
                "=== SESSION ENDED === ({} actions, {} keys)",
                stats.actions, stats.keys
            ),
        );
    }

    pub fn test_started(&mut self, at: DateTime<Local>) {
        self.line(at, "=== TEST MODE STARTED ===");
    }

    pub fn test_completed(&mut self, at: DateTime<Local>) {
        self.line(at, "=== TEST MODE COMPLETED ===");
    }

    pub fn action(&mut self, record: &ActionRecord) {
        self.line(record.at, &describe_action(record));
    }

    pub fn extended_break(&mut self, at: DateTime<Local>, extra_secs: u64, total_secs: i64) {
        self.line(
            at,
            &format!("Extended break: +{extra_secs}s (total: {total_secs}s)"),
        );
    }

    pub fn stats(
        &mut self,
        at: DateTime<Local>,
        elapsed: Duration,
        stats: &SessionStats,
        next_at: DateTime<Local>,
        delay_secs: u64,
    ) {
        self.line(at, &describe_stats(elapsed, stats, next_at, delay_secs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Direction, Press};

    fn press(direction: Direction, hold_micros: u64) -> Press {
        Press {
            direction,
            hold_micros,
        }
    }

    #[test]
    fn each_variant_has_its_own_wording() {
        let at = Local::now();
        let normal = ActionRecord {
            turn: 1,
            at,
            kind: ActionKind::Normal {
                press: press(Direction::Left, 45_900),
            },
        };
        let double = ActionRecord {
            turn: 2,
            at,
            kind: ActionKind::DoubleTap {
                first: press(Direction::Up, 31_000),
                second: press(Direction::Up, 79_999),
            },
        };
        let misclick = ActionRecord {
            turn: 3,
            at,
            kind: ActionKind::Misclick {
                wrong: press(Direction::Down, 50_000),
                corrected: press(Direction::Right, 60_000),
            },
        };

        assert_eq!(describe_action(&normal), "Action #1: LEFT (45ms)");
        assert_eq!(
            describe_action(&double),
            "Action #2: UP (31ms) UP (79ms) (double-tap)"
        );
        assert_eq!(
            describe_action(&misclick),
            "Action #3: DOWN (50ms) -> RIGHT (60ms) (corrected)"
        );
    }

    #[test]
    fn colorize_only_touches_tags() {
        assert_eq!(colorize("Action #1: LEFT (45ms)"), "Action #1: LEFT (45ms)");
        assert!(colorize("x (corrected)").contains("\x1b[33m(corrected)\x1b[0m"));
    }
}
