//! Host capability probing.
//!
//! Three independent booleans the detector consults when choosing a strategy
//! and building font shorthands:
//! * native font loading query present;
//! * `font-stretch` accepted inside the `font` shorthand;
//! * legacy WebKit fallback bug (WebKit 536.11 and earlier report the
//!   last-resort font width while a web font is still loading).
//!
//! Each flag starts unknown and is computed lazily on first use, then frozen
//! for the lifetime of the [`HostCapabilities`] value. Later changes in host
//! state are not observed. [`HostCapabilities::global`] is the process-wide
//! instance shared by detectors that do not inject their own.

use std::sync::{Arc, LazyLock, OnceLock};

use regex::Regex;
use tracing::debug;

use crate::LayoutHost;

/// Shorthand used to check whether the host understands `font-stretch`.
const STRETCH_PROBE_FONT: &str = "condensed 100px sans-serif";

static WEBKIT_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"AppleWebKit/([0-9]+)(?:\.([0-9]+))").expect("static regex is valid")
});

static GLOBAL: LazyLock<Arc<HostCapabilities>> =
    LazyLock::new(|| Arc::new(HostCapabilities::new()));

#[derive(Debug, Default)]
pub struct HostCapabilities {
    native_font_loading: OnceLock<bool>,
    stretch: OnceLock<bool>,
    fallback_bug: OnceLock<bool>,
}

impl HostCapabilities {
    /// All flags unknown.
    pub const fn new() -> Self {
        Self {
            native_font_loading: OnceLock::new(),
            stretch: OnceLock::new(),
            fallback_bug: OnceLock::new(),
        }
    }

    /// Flags already resolved; no host probing will happen.
    pub fn preset(native_font_loading: bool, stretch: bool, fallback_bug: bool) -> Self {
        let caps = Self::new();
        let _ = caps.native_font_loading.set(native_font_loading);
        let _ = caps.stretch.set(stretch);
        let _ = caps.fallback_bug.set(fallback_bug);
        caps
    }

    /// Process-wide capability state.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    pub fn supports_native_font_loading<H: LayoutHost + ?Sized>(&self, host: &H) -> bool {
        *self.native_font_loading.get_or_init(|| {
            let supported = host.supports_native_font_loading();
            debug!(target: "host.capabilities", supported, "native_font_loading_detected");
            supported
        })
    }

    pub fn supports_stretch<H: LayoutHost + ?Sized>(&self, host: &H) -> bool {
        *self.stretch.get_or_init(|| {
            let supported = host.accepts_font_shorthand(STRETCH_PROBE_FONT);
            debug!(target: "host.capabilities", supported, "stretch_detected");
            supported
        })
    }

    pub fn has_fallback_bug<H: LayoutHost + ?Sized>(&self, host: &H) -> bool {
        *self.fallback_bug.get_or_init(|| {
            let ua = host.user_agent();
            let affected = webkit_fallback_bug(&ua);
            debug!(target: "host.capabilities", affected, user_agent = ua.as_str(), "fallback_bug_detected");
            affected
        })
    }
}

/// Whether `user_agent` names a WebKit build at or below 536.11.
pub fn webkit_fallback_bug(user_agent: &str) -> bool {
    let Some(caps) = WEBKIT_VERSION.captures(user_agent) else {
        return false;
    };
    let major = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
    let minor = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
    match (major, minor) {
        (Some(major), Some(minor)) => major < 536 || (major == 536 && minor <= 11),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeadlessHost, Visibility};

    #[test]
    fn webkit_versions_around_the_cutoff() {
        assert!(webkit_fallback_bug(
            "Mozilla/5.0 (Macintosh) AppleWebKit/534.59.10 (KHTML, like Gecko) Safari/534.59.10"
        ));
        assert!(webkit_fallback_bug("AppleWebKit/536.11"));
        assert!(!webkit_fallback_bug("AppleWebKit/536.12"));
        assert!(!webkit_fallback_bug("AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0"));
        assert!(!webkit_fallback_bug("Mozilla/5.0 (X11; Linux x86_64; rv:120.0) Gecko Firefox/120.0"));
        // Minor version is mandatory in the pattern.
        assert!(!webkit_fallback_bug("AppleWebKit/420"));
    }

    #[test]
    fn flags_freeze_after_first_query() {
        let host = HeadlessHost::new();
        host.set_user_agent("AppleWebKit/535.1");
        host.set_native_font_loading(false);
        host.set_stretch_support(true);
        let caps = HostCapabilities::new();

        assert!(caps.has_fallback_bug(&host));
        assert!(!caps.supports_native_font_loading(&host));
        assert!(caps.supports_stretch(&host));

        host.set_user_agent("AppleWebKit/605.1.15");
        host.set_native_font_loading(true);
        host.set_stretch_support(false);
        host.set_visibility(Visibility::Hidden);

        for _ in 0..3 {
            assert!(caps.has_fallback_bug(&host));
            assert!(!caps.supports_native_font_loading(&host));
            assert!(caps.supports_stretch(&host));
        }
    }

    #[test]
    fn flags_are_independent() {
        let host = HeadlessHost::new();
        host.set_stretch_support(false);
        let caps = HostCapabilities::new();
        assert!(!caps.supports_stretch(&host));
        // Native flag still unknown; picks up the current host value.
        host.set_native_font_loading(true);
        assert!(caps.supports_native_font_loading(&host));
    }

    #[test]
    fn preset_skips_probing() {
        let host = HeadlessHost::new();
        host.set_user_agent("AppleWebKit/500.1");
        let caps = HostCapabilities::preset(true, false, false);
        assert!(!caps.has_fallback_bug(&host));
        assert!(caps.supports_native_font_loading(&host));
        assert!(!caps.supports_stretch(&host));
    }

    #[test]
    fn global_is_shared() {
        assert!(Arc::ptr_eq(&HostCapabilities::global(), &HostCapabilities::global()));
    }
}
