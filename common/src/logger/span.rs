use std::time::{Duration, Instant};

use tracing::{Span, field};

use super::TraceId;

/// Root span for one inbound event.
///
/// `symbol` starts empty and is recorded once the payload has been decoded.
pub fn event_span(stage: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "event",
        stage = %stage,
        trace_id = %trace_id,
        symbol = field::Empty
    )
}

/// Awaits `fut` and emits a `performance` warning when it ran longer than `max`.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
