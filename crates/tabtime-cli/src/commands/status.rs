//! Status command for showing the persisted session and recorder state.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use tabtime_db::KeyValueStore;

use crate::commands::timeline::format_duration;

pub fn run<W: Write>(
    writer: &mut W,
    store: &dyn KeyValueStore,
    database_path: &Path,
) -> Result<()> {
    writeln!(writer, "Tabtime status")?;
    writeln!(writer, "Database: {}", database_path.display())?;

    match store.load_session()? {
        Some(session) => {
            let stats = session.timeline.stats();
            writeln!(writer, "Session: {}", session.session_id)?;
            writeln!(
                writer,
                "Entries: {} ({} domains, {} total)",
                stats.total_entries,
                stats.unique_domains,
                format_duration(stats.total_duration)
            )?;
        }
        None => writeln!(writer, "No session recorded.")?,
    }

    let recording = store.recording_state()?;
    let recording_line = match (recording.is_recording, recording.has_recording) {
        (true, _) => "in progress".to_string(),
        (false, true) => format!("stopped, {} events kept", recording.events.len()),
        (false, false) => "none".to_string(),
    };
    writeln!(writer, "Recording: {recording_line}")?;

    if let Some(enabled) = store.settings()?.and_then(|settings| settings.screenshots_enabled()) {
        writeln!(writer, "Screenshots: {}", if enabled { "on" } else { "off" })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tabtime_core::{EngineConfig, Observation, RecordingState, Session, Settings};
    use tabtime_db::Database;

    use insta::assert_snapshot;

    const T0: i64 = 1_736_931_600_000;

    #[test]
    fn status_command_outputs_session_and_recorder() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("tabtime.db");
        let db = Database::open(&db_path).unwrap();

        let mut session = Session::start(T0).unwrap();
        let config = EngineConfig::default();
        session.timeline.submit(
            Observation::new("github.com", T0, T0 + 90_000).with_title("Pulls"),
            T0 + 90_000,
            &config,
        );
        session.timeline.submit(
            Observation::new("docs.rs", T0 + 90_000, T0 + 120_000).with_title("tokio"),
            T0 + 120_000,
            &config,
        );
        db.save_session(&session).unwrap();
        db.save_recording_state(&RecordingState {
            is_recording: false,
            events: vec![serde_json::json!({"t": 1}), serde_json::json!({"t": 2})],
            has_recording: true,
        })
        .unwrap();
        db.save_settings(&Settings {
            disable_screenshots: Some(true),
            ..Settings::default()
        })
        .unwrap();

        let mut output = Vec::new();
        run(&mut output, &db, &db_path).unwrap();

        let output = String::from_utf8(output).unwrap();
        let output = output.replace(temp.path().to_str().unwrap(), "[TEMP]");
        assert_snapshot!(output, @r"
        Tabtime status
        Database: [TEMP]/tabtime.db
        Session: 2025-01-15T09:00:00.000Z
        Entries: 2 (2 domains, 2m 00s total)
        Recording: stopped, 2 events kept
        Screenshots: off
        ");
    }

    #[test]
    fn status_command_on_empty_store() {
        let store = tabtime_db::MemoryStore::new();
        let mut output = Vec::new();
        run(&mut output, &store, Path::new("/data/tabtime.db")).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Tabtime status
        Database: /data/tabtime.db
        No session recorded.
        Recording: none
        ");
    }
}
