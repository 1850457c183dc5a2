//! Replay command: drives the engine with a scripted browsing session.
//!
//! A script is JSON lines, one step per line:
//!
//! ```text
//! {"at": 1736931600000, "op": "open", "surface": 1, "window": 1, "url": "https://x.com/"}
//! {"at": 1736931604000, "op": "navigate", "surface": 1, "url": "https://x.com/t", "title": "T"}
//! {"at": 1736931604500, "op": "loaded", "surface": 1}
//! {"at": 1736931611000, "op": "activate", "surface": 2}
//! {"at": 1736931625000, "op": "blur"}
//! {"at": 1736931640000, "op": "focus", "window": 1}
//! {"at": 1736931650000, "op": "close", "surface": 1}
//! ```
//!
//! `at` is the wall clock in epoch milliseconds and must not go backwards.
//! Blank lines and lines starting with `#` are skipped. The replay runs
//! against in-memory storage, so the persisted timeline is never touched.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use tabtime_core::{EngineConfig, Millis, SurfaceId, WindowId};
use tabtime_db::MemoryStore;
use tabtime_engine::{BackgroundService, HostEvent, ManualClock, ScriptedHost};

use crate::commands::timeline::{render, write_json};

/// One scripted host action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Op {
    Open {
        surface: SurfaceId,
        window: WindowId,
        url: String,
        #[serde(default)]
        title: String,
    },
    Activate {
        surface: SurfaceId,
    },
    Navigate {
        surface: SurfaceId,
        url: String,
        #[serde(default)]
        title: String,
    },
    Loaded {
        surface: SurfaceId,
    },
    Close {
        surface: SurfaceId,
    },
    Blur,
    Focus {
        window: WindowId,
    },
}

/// A host action at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub at: Millis,
    pub op: Op,
}

/// Parses a script, rejecting malformed lines and clocks that run backwards.
pub fn parse_script(script: &str) -> Result<Vec<Step>> {
    let mut steps: Vec<Step> = Vec::new();
    for (index, line) in script.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let value: serde_json::Value =
            serde_json::from_str(line).with_context(|| format!("line {line_no}: invalid JSON"))?;
        let Some(at) = value.get("at").and_then(serde_json::Value::as_i64) else {
            bail!("line {line_no}: missing numeric `at`");
        };
        let op: Op = serde_json::from_value(value)
            .with_context(|| format!("line {line_no}: invalid step"))?;

        if let Some(previous) = steps.last() {
            if at < previous.at {
                bail!("line {line_no}: time runs backwards ({at} < {})", previous.at);
            }
        }
        steps.push(Step { at, op });
    }
    Ok(steps)
}

fn apply(host: &ScriptedHost, op: &Op) -> HostEvent {
    match op {
        Op::Open {
            surface,
            window,
            url,
            title,
        } => host.open(*surface, *window, url, title),
        Op::Activate { surface } => host.activate(*surface),
        Op::Navigate { surface, url, title } => host.navigate(*surface, url, title),
        Op::Loaded { surface } => host.loaded(*surface),
        Op::Close { surface } => host.close(*surface),
        Op::Blur => host.blur(),
        Op::Focus { window } => host.focus(*window),
    }
}

pub fn run<W: Write>(
    writer: &mut W,
    script: &str,
    mut config: EngineConfig,
    json: bool,
) -> Result<()> {
    let steps = parse_script(script)?;
    let Some(start) = steps.first().map(|step| step.at) else {
        bail!("script has no steps");
    };

    // Captures fire as soon as each step settles.
    config.snapshot_delay_ms = 0;

    let clock = Arc::new(ManualClock::new(start));
    let host = Arc::new(ScriptedHost::new());
    let store = Arc::new(MemoryStore::new());

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let session = runtime.block_on(async {
        let service = BackgroundService::new(Arc::clone(&host), store, clock.clone(), config);
        service.restore_state().await.context("failed to start engine")?;

        for step in &steps {
            clock.set(step.at);
            tracing::debug!(at = step.at, op = ?step.op, "replaying step");
            let event = apply(&host, &step.op);
            service.handle_host_event(event).await;
            service.tracker().settle().await;
        }

        service.shutdown().await;
        service
            .timeline()
            .consolidate_entries()
            .context("failed to consolidate timeline")?;
        anyhow::Ok(service.timeline().current_session())
    })?;

    tracing::info!(steps = steps.len(), captures = host.capture_count(), "replay finished");

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

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    const SCRIPT: &str = r#"
# two domains, a blur and a closed tab
{"at":1736931600000,"op":"open","surface":1,"window":1,"url":"https://x.com/home","title":"Home"}
{"at":1736931604000,"op":"navigate","surface":1,"url":"https://x.com/thread","title":"Thread"}
{"at":1736931604500,"op":"loaded","surface":1}
{"at":1736931610000,"op":"open","surface":2,"window":1,"url":"https://docs.rs/","title":"tokio"}
{"at":1736931611000,"op":"activate","surface":1}
{"at":1736931625000,"op":"blur"}
{"at":1736931640000,"op":"focus","window":1}
{"at":1736931650000,"op":"close","surface":1}
{"at":1736931656000,"op":"blur"}
"#;

    #[test]
    fn parse_script_skips_comments_and_blank_lines() {
        let steps = parse_script(SCRIPT).unwrap();
        assert_eq!(steps.len(), 9);
        assert_eq!(
            steps[0],
            Step {
                at: 1_736_931_600_000,
                op: Op::Open {
                    surface: SurfaceId(1),
                    window: WindowId(1),
                    url: "https://x.com/home".to_string(),
                    title: "Home".to_string(),
                },
            }
        );
        assert_eq!(steps[5].op, Op::Blur);
    }

    #[test]
    fn parse_script_rejects_bad_lines() {
        let err = parse_script("{\"at\": 5, \"op\": \"teleport\"}").unwrap_err();
        assert!(err.to_string().starts_with("line 1:"), "{err}");

        let err = parse_script("{\"op\": \"blur\"}").unwrap_err();
        assert_eq!(err.to_string(), "line 1: missing numeric `at`");

        let err = parse_script("{\"at\": 10, \"op\": \"blur\"}\n{\"at\": 5, \"op\": \"blur\"}")
            .unwrap_err();
        assert_eq!(err.to_string(), "line 2: time runs backwards (5 < 10)");
    }

    #[test]
    fn replay_builds_timeline() {
        let mut output = Vec::new();
        run(&mut output, SCRIPT, EngineConfig::default(), false).unwrap();

        let output = String::from_utf8(output).unwrap();
        assert_snapshot!(output, @r"
        Session 2025-01-15T09:00:00.000Z
        2025-01-15 09:00:50 - 09:00:56       6s       6s  docs.rs              tokio
        2025-01-15 09:00:00 - 09:00:50      50s      34s  x.com                Thread
        2 entries, 2 domains, 56s total
        ");
    }

    #[test]
    fn replay_json_keeps_snapshots() {
        let mut output = Vec::new();
        run(&mut output, SCRIPT, EngineConfig::default(), true).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        let timeline = value["timeline"].as_array().unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[1]["domain"], "x.com");
        assert_eq!(timeline[1]["activeDuration"], 34_000);
        assert_eq!(timeline[1]["screenshot"], "data:image/jpeg;base64,snapshot-1");
        assert_eq!(timeline[0]["domain"], "docs.rs");
        assert!(timeline[0].get("screenshot").is_none());
    }

    #[test]
    fn empty_script_is_an_error() {
        let mut output = Vec::new();
        let err = run(&mut output, "# nothing\n", EngineConfig::default(), false).unwrap_err();
        assert_eq!(err.to_string(), "script has no steps");
    }
}
