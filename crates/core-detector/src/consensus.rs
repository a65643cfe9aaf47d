//! Three-probe width consensus.
//!
//! A metric-compatible web font may leave one probe's width unchanged, so
//! that probe never reports. The font therefore counts as loaded once any two
//! measured widths agree; with three stacks that still rules out chance
//! agreement between different fallbacks.
//!
//! Legacy WebKit (<= 536.11) renders the last-resort font while a web font
//! downloads, which can make all three probes agree on a fallback width. On
//! such hosts a unanimous width equal to one of the baselines is ignored.

use core_probe::UNSET_WIDTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeSlot {
    SansSerif,
    Serif,
    Monospace,
}

impl ProbeSlot {
    pub const ALL: [ProbeSlot; 3] = [ProbeSlot::SansSerif, ProbeSlot::Serif, ProbeSlot::Monospace];

    pub fn index(self) -> usize {
        match self {
            ProbeSlot::SansSerif => 0,
            ProbeSlot::Serif => 1,
            ProbeSlot::Monospace => 2,
        }
    }

    pub fn fallback_family(self) -> &'static str {
        match self {
            ProbeSlot::SansSerif => "sans-serif",
            ProbeSlot::Serif => "serif",
            ProbeSlot::Monospace => "monospace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Waiting,
    Loaded,
    /// Agreement found, but on a fallback width under the WebKit bug.
    Suppressed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusState {
    widths: [i32; 3],
    baseline: [i32; 3],
}

impl ConsensusState {
    /// Baseline widths are fixed here and never change afterwards.
    pub fn new(baseline: [i32; 3]) -> Self {
        Self {
            widths: [UNSET_WIDTH; 3],
            baseline,
        }
    }

    pub fn record(&mut self, slot: ProbeSlot, width: i32) {
        self.widths[slot.index()] = width;
    }

    pub fn observe_all(&mut self, widths: [i32; 3]) {
        self.widths = widths;
    }

    pub fn widths(&self) -> [i32; 3] {
        self.widths
    }

    pub fn baseline(&self) -> [i32; 3] {
        self.baseline
    }

    pub fn evaluate(&self, fallback_bug: bool) -> Verdict {
        let [a, b, c] = self.widths;
        let agree = |x: i32, y: i32| x != UNSET_WIDTH && x == y;
        if !(agree(a, b) || agree(a, c) || agree(b, c)) {
            return Verdict::Waiting;
        }
        if fallback_bug
            && self
                .baseline
                .iter()
                .any(|fallback| a == *fallback && b == *fallback && c == *fallback)
        {
            return Verdict::Suppressed;
        }
        Verdict::Loaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: [i32; 3] = [418, 395, 420];

    fn state(widths: [i32; 3]) -> ConsensusState {
        let mut s = ConsensusState::new(BASE);
        s.observe_all(widths);
        s
    }

    #[test]
    fn starts_unset() {
        let s = ConsensusState::new(BASE);
        assert_eq!(s.widths(), [-1, -1, -1]);
        assert_eq!(s.evaluate(false), Verdict::Waiting);
    }

    #[test]
    fn single_report_is_not_enough() {
        let mut s = ConsensusState::new(BASE);
        s.record(ProbeSlot::Serif, 471);
        assert_eq!(s.evaluate(false), Verdict::Waiting);
    }

    #[test]
    fn two_equal_reports_load() {
        let mut s = ConsensusState::new(BASE);
        s.record(ProbeSlot::Serif, 471);
        s.record(ProbeSlot::Monospace, 471);
        assert_eq!(s.evaluate(false), Verdict::Loaded);
    }

    #[test]
    fn metric_compatible_font_loads_on_two_probes() {
        // Target matches sans-serif metrics: that probe never moves.
        let mut s = ConsensusState::new(BASE);
        s.record(ProbeSlot::Serif, 418);
        s.record(ProbeSlot::Monospace, 418);
        assert_eq!(s.evaluate(false), Verdict::Loaded);
    }

    #[test]
    fn distinct_widths_wait() {
        assert_eq!(state([418, 395, 420]).evaluate(false), Verdict::Waiting);
        assert_eq!(state([430, 431, -1]).evaluate(false), Verdict::Waiting);
    }

    #[test]
    fn fallback_bug_suppresses_unanimous_baseline() {
        for fallback in BASE {
            let s = state([fallback; 3]);
            assert_eq!(s.evaluate(true), Verdict::Suppressed);
            assert_eq!(s.evaluate(false), Verdict::Loaded);
        }
        // Two matching a baseline is not unanimous: still a load.
        assert_eq!(state([418, 418, 471]).evaluate(true), Verdict::Loaded);
        assert_eq!(state([471, 471, 471]).evaluate(true), Verdict::Loaded);
    }

    #[test]
    fn baseline_is_fixed() {
        let mut s = ConsensusState::new(BASE);
        s.observe_all([1, 2, 3]);
        s.record(ProbeSlot::SansSerif, 9);
        assert_eq!(s.baseline(), BASE);
    }
}
