//! Timeline command: prints the persisted session's entries.

use std::io::Write;

use anyhow::Result;
use chrono::DateTime;

use tabtime_core::{Millis, Session};
use tabtime_db::KeyValueStore;

pub fn run<W: Write>(writer: &mut W, store: &dyn KeyValueStore, json: bool) -> Result<()> {
    let session = store.load_session()?;
    if json {
        return write_json(writer, session.as_ref());
    }
    match session {
        Some(session) => render(writer, &session),
        None => {
            writeln!(writer, "No session recorded.")?;
            Ok(())
        }
    }
}

/// Writes the session in the UI's timeline payload shape.
pub fn write_json<W: Write>(writer: &mut W, session: Option<&Session>) -> Result<()> {
    let value = match session {
        Some(session) => serde_json::to_value(session)?,
        None => serde_json::json!({ "sessionId": null, "timeline": [] }),
    };
    writeln!(writer, "{}", serde_json::to_string_pretty(&value)?)?;
    Ok(())
}

/// Human-readable listing, newest first, followed by a one-line summary.
pub fn render<W: Write>(writer: &mut W, session: &Session) -> Result<()> {
    writeln!(writer, "Session {}", session.session_id)?;

    if session.timeline.is_empty() {
        writeln!(writer, "No entries.")?;
        return Ok(());
    }

    for entry in session.timeline.entries() {
        let title = if entry.title.is_empty() { "-" } else { entry.title.as_str() };
        writeln!(
            writer,
            "{} - {}  {:>7}  {:>7}  {:<20} {}",
            format_timestamp(entry.timestamp, "%Y-%m-%d %H:%M:%S"),
            format_timestamp(entry.end(), "%H:%M:%S"),
            format_duration(entry.duration),
            format_duration(entry.active_duration),
            entry.domain,
            title
        )?;
    }

    let stats = session.timeline.stats();
    writeln!(
        writer,
        "{} entries, {} domains, {} total",
        stats.total_entries,
        stats.unique_domains,
        format_duration(stats.total_duration)
    )?;
    Ok(())
}

fn format_timestamp(ms: Millis, pattern: &str) -> String {
    DateTime::from_timestamp_millis(ms)
        .map_or_else(|| ms.to_string(), |ts| ts.format(pattern).to_string())
}

/// Formats milliseconds as "Xh YYm", "Ym SSs" or "Ss".
pub fn format_duration(ms: Millis) -> String {
    let secs = ms.max(0) / 1000;
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use tabtime_core::{EngineConfig, Observation};
    use tabtime_db::MemoryStore;

    const T0: i64 = 1_736_931_600_000;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(999), "0s");
        assert_eq!(format_duration(8_000), "8s");
        assert_eq!(format_duration(65_000), "1m 05s");
        assert_eq!(format_duration(3_600_000), "1h 00m");
        assert_eq!(format_duration(5_430_000), "1h 30m");
        assert_eq!(format_duration(-5), "0s");
    }

    #[test]
    fn timeline_lists_entries_newest_first() {
        let store = MemoryStore::new();
        let config = EngineConfig::default();
        let mut session = Session::start(T0).unwrap();
        session.timeline.submit(
            Observation::new("github.com", T0, T0 + 90_000).with_title("Pulls"),
            T0 + 90_000,
            &config,
        );
        session.timeline.submit(
            Observation::new("docs.rs", T0 + 90_000, T0 + 3_900_000),
            T0 + 3_900_000,
            &config,
        );
        store.save_session(&session).unwrap();

        let mut output = Vec::new();
        run(&mut output, &store, false).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Session 2025-01-15T09:00:00.000Z
        2025-01-15 09:01:30 - 10:05:00   1h 03m   1h 03m  docs.rs              -
        2025-01-15 09:00:00 - 09:01:30   1m 30s   1m 30s  github.com           Pulls
        2 entries, 2 domains, 1h 05m total
        ");
    }

    #[test]
    fn timeline_json_without_session_has_empty_shape() {
        let store = MemoryStore::new();
        let mut output = Vec::new();
        run(&mut output, &store, true).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value, serde_json::json!({"sessionId": null, "timeline": []}));
    }

    #[test]
    fn timeline_text_without_session() {
        let store = MemoryStore::new();
        let mut output = Vec::new();
        run(&mut output, &store, false).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "No session recorded.\n");
    }
}
