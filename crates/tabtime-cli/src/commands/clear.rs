//! Clear command: empties the timeline and starts a fresh session.

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
    let dropped = if timeline.restore()? {
        let dropped = timeline.stats().total_entries;
        timeline.clear_timeline()?;
        dropped
    } else {
        0
    };
    let session = timeline.initialize()?;
    writeln!(writer, "Cleared {dropped} entries; new session {}.", session.session_id)?;
    Ok(())
}
