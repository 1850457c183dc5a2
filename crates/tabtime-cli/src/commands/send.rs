//! Send command: handles one protocol message against the persisted state.
//!
//! There is no live browser behind the CLI, so the engine runs against a
//! host with no open surfaces. Messages that only touch storage behave
//! exactly as they would in the browser; `forceRefreshActiveTab` reports
//! that no tab is active.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};

use tabtime_core::EngineConfig;
use tabtime_db::KeyValueStore;
use tabtime_engine::{BackgroundService, Clock, Response, ScriptedHost};

/// Dispatches `message` and writes the reply as a single JSON line.
///
/// Returns the reply so callers can inspect it.
pub fn run<W: Write>(
    writer: &mut W,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    message: &str,
) -> Result<Response> {
    let request: serde_json::Value =
        serde_json::from_str(message).context("message is not valid JSON")?;

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let response = runtime.block_on(async {
        let service = BackgroundService::new(Arc::new(ScriptedHost::new()), store, clock, config);
        service.restore_state().await.context("failed to restore engine state")?;
        let response = service.dispatch_value(request).await;
        service.shutdown().await;
        anyhow::Ok(response)
    })?;

    if response.is_error() {
        tracing::debug!(?response, "message rejected");
    }
    writeln!(writer, "{}", serde_json::to_string(&response)?)?;
    Ok(response)
}
