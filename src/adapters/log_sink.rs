//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one tagged line per application
//! event through the `log` facade.  A message-bus adapter would implement
//! the same trait.

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { fleet_size, warm } => {
                info!(
                    "START | sensors={} warm={} cold={}",
                    fleet_size,
                    warm,
                    fleet_size.saturating_sub(*warm)
                );
            }
            AppEvent::Overflow {
                sensor_id,
                overflow_count,
                at,
            } => {
                warn!(
                    "OVERFLOW | {} | count={} | at={}",
                    sensor_id,
                    overflow_count,
                    at.to_rfc3339()
                );
            }
            AppEvent::Emptied { sensor_id, at } => {
                info!("EMPTY | {} | at={}", sensor_id, at.to_rfc3339());
            }
            AppEvent::Cycle(s) if s.errors > 0 => {
                warn!(
                    "CYCLE | due={} advanced={} written={} skipped={} | \
                     overflow={} empty={} enriched={} nudged={} | errors={}",
                    s.due,
                    s.advanced,
                    s.written,
                    s.skipped,
                    s.overflows,
                    s.empties,
                    s.enriched,
                    s.nudged,
                    s.errors,
                );
            }
            AppEvent::Cycle(s) => {
                info!(
                    "CYCLE | due={} advanced={} written={} skipped={} | \
                     overflow={} empty={} enriched={} nudged={}",
                    s.due, s.advanced, s.written, s.skipped, s.overflows, s.empties, s.enriched, s.nudged,
                );
                debug!("CYCLE | {:?}", s);
            }
        }
    }
}
