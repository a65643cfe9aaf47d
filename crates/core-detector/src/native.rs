//! Native font loading path.
//!
//! Two tasks race on the attempt's latch: a poller asking the host whether
//! the face is loaded, and a deadline timer. A rejected query fails the
//! attempt at once.

use std::sync::Arc;
use std::time::Duration;

use core_host::LayoutHost;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until};
use tracing::{Instrument, debug, trace, warn};

use crate::Attempt;
use crate::latch::{AttemptState, CompletionLatch};
use crate::telemetry::{self, NATIVE_QUERIES, NATIVE_QUERY_REJECTIONS};

pub(crate) fn spawn<H: LayoutHost>(
    attempt: Attempt<H>,
    font: String,
    poll_interval: Duration,
    latch: Arc<CompletionLatch>,
) -> Vec<JoinHandle<()>> {
    let span = tracing::Span::current();
    let deadline = {
        let latch = Arc::clone(&latch);
        let at = attempt.deadline();
        tokio::spawn(
            async move {
                sleep_until(at).await;
                if latch.settle(AttemptState::Failed) {
                    debug!(target: "detector.native", "deadline_elapsed");
                }
            }
            .instrument(span.clone()),
        )
    };
    let poller = tokio::spawn(poll(attempt, font, poll_interval, latch).instrument(span));
    vec![deadline, poller]
}

async fn poll<H: LayoutHost>(
    attempt: Attempt<H>,
    font: String,
    poll_interval: Duration,
    latch: Arc<CompletionLatch>,
) {
    loop {
        if latch.is_settled() {
            return;
        }
        if attempt.elapsed() >= attempt.timeout {
            latch.settle(AttemptState::Failed);
            return;
        }
        telemetry::incr(&NATIVE_QUERIES);
        match attempt.host.load_fonts(&font, &attempt.text).await {
            Ok(faces) if faces >= 1 => {
                if latch.settle(AttemptState::Succeeded) {
                    debug!(target: "detector.native", faces, elapsed_ms = attempt.elapsed().as_millis() as u64, "native_font_loaded");
                }
                return;
            }
            Ok(_) => {
                trace!(target: "detector.native", "native_font_pending");
                sleep(poll_interval).await;
            }
            Err(error) => {
                telemetry::incr(&NATIVE_QUERY_REJECTIONS);
                if latch.settle(AttemptState::Failed) {
                    warn!(target: "detector.native", %error, "native_query_rejected");
                }
                return;
            }
        }
    }
}
