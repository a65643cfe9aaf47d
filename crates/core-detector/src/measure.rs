//! Measurement path: three probes, one per fallback family.
//!
//! Each probe first renders its bare fallback stack to record a baseline,
//! then `"<family>",<fallback>`. While the web font downloads every probe
//! keeps its fallback width; once it lands the widths move and the scroll
//! signals report them. A polling loop re-measures as well, for hosts whose
//! scroll signal cannot be trusted, and enforces the deadline.

use std::sync::Arc;
use std::time::Duration;

use core_host::{ElementId, HostError, LayoutHost, Visibility};
use core_probe::{Probe, ResizeSubscription};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout_at};
use tracing::{Instrument, debug, trace, warn};

use crate::Attempt;
use crate::consensus::{ConsensusState, ProbeSlot, Verdict};
use crate::latch::{AttemptState, CompletionLatch};
use crate::telemetry::{self, FALLBACK_BUG_SUPPRESSIONS, REFLOW_SIGNALS};

pub(crate) struct MeasurePlan {
    pub(crate) fallback_fonts: [String; 3],
    pub(crate) target_fonts: [String; 3],
    pub(crate) poll_interval: Duration,
    pub(crate) fallback_bug: bool,
}

/// The attempt's mounted probes. Dropping it unsubscribes and removes the
/// container from the document.
struct ProbeRig<H: LayoutHost> {
    host: Arc<H>,
    container: ElementId,
    probes: Vec<Probe<H>>,
    subscriptions: Vec<ResizeSubscription<H>>,
}

impl<H: LayoutHost> ProbeRig<H> {
    fn mount(
        host: &Arc<H>,
        body: ElementId,
        text: &str,
        fallback_fonts: &[String; 3],
    ) -> Result<Self, HostError> {
        let container = host.create_element("div");
        // Fixed direction so scroll offsets grow to the right.
        host.set_attribute(container, "dir", "ltr");
        let mut rig = Self {
            host: Arc::clone(host),
            container,
            probes: Vec::with_capacity(ProbeSlot::ALL.len()),
            subscriptions: Vec::with_capacity(ProbeSlot::ALL.len()),
        };
        for slot in ProbeSlot::ALL {
            let mut probe = Probe::new(Arc::clone(host), text)?;
            probe.set_font(&fallback_fonts[slot.index()]);
            host.append_child(container, probe.element())?;
            rig.probes.push(probe);
        }
        host.append_child(body, container)?;
        Ok(rig)
    }

    fn widths(&self) -> [i32; 3] {
        ProbeSlot::ALL.map(|slot| self.probes[slot.index()].width())
    }

    /// Subscribe each probe to resize signals, then switch it to the target
    /// stack.
    fn arm(&mut self, target_fonts: &[String; 3], tx: &mpsc::UnboundedSender<(ProbeSlot, i32)>) {
        for slot in ProbeSlot::ALL {
            let tx = tx.clone();
            let probe = &mut self.probes[slot.index()];
            let subscription = probe.on_resize(move |width| {
                let _ = tx.send((slot, width));
            });
            self.subscriptions.push(subscription);
            probe.set_font(&target_fonts[slot.index()]);
        }
    }
}

impl<H: LayoutHost> Drop for ProbeRig<H> {
    fn drop(&mut self) {
        self.subscriptions.clear();
        if let Some(parent) = self.host.parent(self.container) {
            if let Err(error) = self.host.remove_child(parent, self.container) {
                warn!(target: "detector.measure", %error, "container_remove_failed");
            }
        }
        trace!(target: "detector.measure", container = ?self.container, "probes_detached");
    }
}

pub(crate) fn spawn<H: LayoutHost>(
    attempt: Attempt<H>,
    plan: MeasurePlan,
    latch: Arc<CompletionLatch>,
) -> JoinHandle<()> {
    let span = tracing::Span::current();
    tokio::spawn(
        async move {
            let latch = FailOnDrop(latch);
            let outcome = run(&attempt, &plan).await;
            latch.0.settle(outcome);
        }
        .instrument(span),
    )
}

/// Fails the attempt if the measuring task ends without settling it.
struct FailOnDrop(Arc<CompletionLatch>);

impl Drop for FailOnDrop {
    fn drop(&mut self) {
        if self.0.settle(AttemptState::Failed) {
            warn!(target: "detector.measure", "measure_task_ended_unsettled");
        }
    }
}

fn record_signal(consensus: &mut ConsensusState, slot: ProbeSlot, width: i32) {
    telemetry::incr(&REFLOW_SIGNALS);
    trace!(target: "detector.measure", ?slot, width, "reflow_signal");
    consensus.record(slot, width);
}

async fn run<H: LayoutHost>(attempt: &Attempt<H>, plan: &MeasurePlan) -> AttemptState {
    let host = &attempt.host;
    let Ok(body) = timeout_at(attempt.deadline(), host.wait_for_body()).await else {
        debug!(target: "detector.measure", "body_never_attached");
        return AttemptState::Failed;
    };

    let mut rig = match ProbeRig::mount(host, body, &attempt.text, &plan.fallback_fonts) {
        Ok(rig) => rig,
        Err(error) => {
            warn!(target: "detector.measure", %error, "probe_mount_failed");
            return AttemptState::Failed;
        }
    };
    let mut consensus = ConsensusState::new(rig.widths());
    debug!(
        target: "detector.measure",
        baseline = ?consensus.baseline(),
        fallback_bug = plan.fallback_bug,
        "baseline_captured"
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    rig.arm(&plan.target_fonts, &tx);
    drop(tx);

    let mut ticker = interval(plan.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if attempt.elapsed() >= attempt.timeout {
                    debug!(target: "detector.measure", widths = ?consensus.widths(), "deadline_elapsed");
                    break AttemptState::Failed;
                }
                if host.visibility() == Visibility::Hidden {
                    continue;
                }
                consensus.observe_all(rig.widths());
            }
            Some((slot, width)) = rx.recv() => {
                record_signal(&mut consensus, slot, width);
                // One relayout reports every probe it moved; take the whole
                // batch before judging it.
                while let Ok((slot, width)) = rx.try_recv() {
                    record_signal(&mut consensus, slot, width);
                }
                if plan.fallback_bug {
                    // Probes that stayed silent keep their last polled width,
                    // which may predate the relayout.
                    consensus.observe_all(rig.widths());
                }
            }
        }
        match consensus.evaluate(plan.fallback_bug) {
            Verdict::Loaded => {
                debug!(
                    target: "detector.measure",
                    widths = ?consensus.widths(),
                    elapsed_ms = attempt.elapsed().as_millis() as u64,
                    "consensus_reached"
                );
                break AttemptState::Succeeded;
            }
            Verdict::Suppressed => {
                telemetry::incr(&FALLBACK_BUG_SUPPRESSIONS);
                trace!(target: "detector.measure", widths = ?consensus.widths(), "fallback_consensus_suppressed");
            }
            Verdict::Waiting => {}
        }
    };
    drop(rig);
    outcome
}
