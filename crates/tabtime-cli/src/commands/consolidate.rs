//! Consolidate command: runs the merge sweep over the persisted timeline.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;

use tabtime_core::EngineConfig;
use tabtime_db::KeyValueStore;
use tabtime_engine::{Clock, TimelineStore};

pub fn run<W: Write>(
    writer: &mut W,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
) -> Result<()> {
    let timeline = TimelineStore::new(store, clock, config);
    if !timeline.restore()? {
        writeln!(writer, "No session recorded.")?;
        return Ok(());
    }

    let before = timeline.stats().total_entries;
    if timeline.consolidate_entries()? {
        let after = timeline.stats().total_entries;
        writeln!(writer, "Merged {before} entries into {after}.")?;
    } else {
        writeln!(writer, "Nothing to consolidate ({before} entries).")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use tabtime_core::{Entry, EntryId, Session, Timeline};
    use tabtime_db::MemoryStore;
    use tabtime_engine::ManualClock;

    const T0: i64 = 1_736_931_600_000;

    fn entry(id: &str, domain: &str, start: i64, end: i64) -> Entry {
        Entry {
            id: EntryId::new(id).unwrap(),
            timestamp: start,
            end_time: Some(end),
            duration: end - start,
            active_duration: end - start,
            url: format!("https://{domain}/"),
            domain: domain.to_string(),
            title: domain.to_string(),
            icon: None,
            snapshot: None,
        }
    }

    fn run_with(store: &Arc<MemoryStore>) -> String {
        let mut output = Vec::new();
        run(
            &mut output,
            store.clone(),
            Arc::new(ManualClock::new(T0 + 600_000)),
            EngineConfig::default(),
        )
        .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn merges_adjacent_fragments() {
        let store = Arc::new(MemoryStore::new());
        let mut session = Session::start(T0).unwrap();
        session.timeline = Timeline::from(vec![
            entry("c", "github.com", T0 + 62_000, T0 + 90_000),
            entry("b", "github.com", T0 + 30_000, T0 + 60_000),
            entry("a", "docs.rs", T0, T0 + 30_000),
        ]);
        store.save_session(&session).unwrap();

        assert_eq!(run_with(&store), "Merged 3 entries into 2.\n");
        let saved = store.load_session().unwrap().unwrap();
        assert_eq!(saved.timeline.len(), 2);
    }

    #[test]
    fn reports_when_nothing_merges() {
        let store = Arc::new(MemoryStore::new());
        let mut session = Session::start(T0).unwrap();
        session.timeline = Timeline::from(vec![entry("a", "docs.rs", T0, T0 + 30_000)]);
        store.save_session(&session).unwrap();
        let writes = store.write_count();

        assert_eq!(run_with(&store), "Nothing to consolidate (1 entries).\n");
        assert_eq!(store.write_count(), writes);
    }

    #[test]
    fn empty_store_has_no_session() {
        let store = Arc::new(MemoryStore::new());
        assert_eq!(run_with(&store), "No session recorded.\n");
    }
}
