//! Web font load detection.
//!
//! [`Detector::load`] settles once the awaited face is confirmed in use, or
//! fails after the timeout. Two strategies:
//!
//! * native: the host answers "is this face loaded" directly; the detector
//!   polls it against a deadline timer.
//! * measurement: three invisible probes render the family over sans-serif,
//!   serif and monospace fallbacks; agreement of two probe widths means the
//!   fallbacks are no longer in use (see [`consensus`]).
//!
//! Each call is an independent attempt with its own latch, tasks and probes.
//! The attempt's tasks run on the tokio runtime and stop at their own
//! deadline even if the caller drops the returned future.

use std::sync::Arc;
use std::time::Duration;

use core_config::ObserverConfig;
use core_host::{HostCapabilities, LayoutHost};
use tokio::time::Instant;
use tracing::{Instrument, info, info_span};

pub mod consensus;
mod descriptor;
pub mod latch;
mod measure;
mod native;
pub mod telemetry;

pub use consensus::{ConsensusState, ProbeSlot, Verdict};
pub use descriptor::{Descriptors, FontDescriptor, PROBE_FONT_SIZE, quote_family};
pub use latch::{AttemptState, CompletionLatch};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(core_config::DEFAULT_TIMEOUT_MS);
pub const DEFAULT_SAMPLE_TEXT: &str = core_config::DEFAULT_SAMPLE_TEXT;

/// Latest deadline an attempt schedules (about 30 years out).
const MAX_DEADLINE_OFFSET: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The face was not confirmed in use within the timeout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("font {descriptor} not loaded within {}ms", .timeout.as_millis())]
pub struct DetectionFailure {
    pub descriptor: FontDescriptor,
    pub timeout: Duration,
}

pub type DetectionResult = Result<FontDescriptor, DetectionFailure>;

/// Per-attempt context shared by the strategy tasks.
pub(crate) struct Attempt<H: LayoutHost> {
    pub(crate) host: Arc<H>,
    pub(crate) text: String,
    pub(crate) timeout: Duration,
    pub(crate) start: Instant,
}

impl<H: LayoutHost> Attempt<H> {
    pub(crate) fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// `start + timeout`, capped where the clock cannot represent it.
    pub(crate) fn deadline(&self) -> Instant {
        self.start
            .checked_add(self.timeout)
            .or_else(|| self.start.checked_add(MAX_DEADLINE_OFFSET))
            .unwrap_or(self.start)
    }
}

/// Waits for one font face on one host; every `load` call is a fresh attempt.
pub struct Detector<H: LayoutHost> {
    host: Arc<H>,
    descriptor: FontDescriptor,
    config: ObserverConfig,
    capabilities: Arc<HostCapabilities>,
}

impl<H: LayoutHost> std::fmt::Debug for Detector<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("descriptor", &self.descriptor)
            .field("config", &self.config)
            .finish()
    }
}

impl<H: LayoutHost> Detector<H> {
    pub fn new(host: Arc<H>, family: impl Into<String>, descriptors: Descriptors) -> Self {
        Self {
            host,
            descriptor: FontDescriptor::new(family, descriptors),
            config: ObserverConfig::default(),
            capabilities: HostCapabilities::global(),
        }
    }

    /// Use `config` for defaults and poll intervals.
    pub fn with_config(mut self, mut config: ObserverConfig) -> Self {
        config.normalize();
        self.config = config;
        self
    }

    /// Use a capability state other than the process-wide one.
    pub fn with_capabilities(mut self, capabilities: Arc<HostCapabilities>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn family(&self) -> &str {
        &self.descriptor.family
    }

    pub fn descriptor(&self) -> &FontDescriptor {
        &self.descriptor
    }

    fn shorthand(&self, stack: &str) -> String {
        let stretch = self.capabilities.supports_stretch(&*self.host);
        self.descriptor.shorthand(stack, stretch)
    }

    /// Wait for the face to be usable for `sample_text` (default `BESbswy`)
    /// for at most `timeout` (default 3s). Empty text and a zero timeout
    /// select the defaults.
    pub async fn load(&self, sample_text: Option<&str>, timeout: Option<Duration>) -> DetectionResult {
        let start = Instant::now();
        let text = sample_text
            .filter(|text| !text.is_empty())
            .unwrap_or(&self.config.sample_text)
            .to_owned();
        let timeout = timeout
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or_else(|| self.config.timeout());
        let attempt_id = telemetry::incr(&telemetry::ATTEMPTS_STARTED);
        let native = self.capabilities.supports_native_font_loading(&*self.host);
        let span = info_span!(
            target: "detector",
            "font_load",
            attempt = attempt_id,
            family = %self.descriptor.family,
            native
        );

        let attempt = Attempt {
            host: Arc::clone(&self.host),
            text,
            timeout,
            start,
        };
        let latch = Arc::new(CompletionLatch::new());

        let outcome = async {
            info!(target: "detector", timeout_ms = timeout.as_millis() as u64, "attempt_started");
            let tasks = if native {
                let font = self.shorthand(&quote_family(&self.descriptor.family));
                native::spawn(
                    attempt,
                    font,
                    self.config.native_poll_interval(),
                    Arc::clone(&latch),
                )
            } else {
                let plan = measure::MeasurePlan {
                    fallback_fonts: ProbeSlot::ALL.map(|slot| self.shorthand(slot.fallback_family())),
                    target_fonts: ProbeSlot::ALL
                        .map(|slot| self.shorthand(&self.descriptor.stack_with(slot.fallback_family()))),
                    poll_interval: self.config.measure_poll_interval(),
                    fallback_bug: self.capabilities.has_fallback_bug(&*self.host),
                };
                vec![measure::spawn(attempt, plan, Arc::clone(&latch))]
            };
            let outcome = latch.wait().await;
            for task in tasks {
                task.abort();
            }
            info!(
                target: "detector",
                ?outcome,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "attempt_settled"
            );
            outcome
        }
        .instrument(span)
        .await;

        match outcome {
            AttemptState::Succeeded => {
                telemetry::incr(&telemetry::ATTEMPTS_SUCCEEDED);
                Ok(self.descriptor.clone())
            }
            AttemptState::Failed | AttemptState::Pending => {
                telemetry::incr(&telemetry::ATTEMPTS_FAILED);
                Err(DetectionFailure {
                    descriptor: self.descriptor.clone(),
                    timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_host::HeadlessHost;

    fn attempt(timeout: Duration) -> Attempt<HeadlessHost> {
        Attempt {
            host: Arc::new(HeadlessHost::new()),
            text: DEFAULT_SAMPLE_TEXT.to_owned(),
            timeout,
            start: Instant::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_start_plus_timeout() {
        let attempt = attempt(Duration::from_millis(250));
        assert_eq!(attempt.deadline() - attempt.start, Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_deadline_is_capped() {
        let attempt = attempt(Duration::MAX);
        assert_eq!(attempt.deadline() - attempt.start, MAX_DEADLINE_OFFSET);
    }
}
