//! Invisible text measurement probe.
//!
//! A probe renders a sample string in a caller supplied font shorthand and
//! reports its pixel width. It can also report width *changes* without
//! polling: two overflow containers sized to the measurement element are kept
//! scrolled to their extremes, so any change of the element's width clamps
//! one of the two scroll offsets and the host fires a scroll event.
//!
//! * collapsible: inner child at 200%, scrolled fully right. A narrower
//!   element lowers the maximum offset below the current one.
//! * expandable: inner child at `width + 100px`, scrolled fully right. A wider
//!   element lowers the maximum offset below the current one.
//!
//! Every scroll re-arms both containers against the current width (`reset`)
//! and compares that width with the last one seen, which filters out the
//! scroll events the re-arming itself produces.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use core_host::{ElementId, HostError, LayoutHost, ListenerId, ScrollListener};
use tracing::trace;

/// Extra room given to the expandable container past the measured width.
pub const SCROLL_PADDING_PX: i32 = 100;

/// Width reported before the first measurement.
pub const UNSET_WIDTH: i32 = -1;

const SCROLLER_STYLE: &str = "max-width:none;\
     display:inline-block;\
     position:absolute;\
     height:100%;\
     width:100%;\
     overflow:scroll;\
     font-size:16px;";

const COLLAPSIBLE_INNER_STYLE: &str = "display:inline-block;\
     width:200%;\
     height:200%;\
     font-size:16px;\
     max-width:none;";

const MEASURE_STYLE: &str = "max-width:none;\
     min-width:20px;\
     min-height:20px;\
     display:inline-block;\
     overflow:hidden;\
     position:absolute;\
     width:auto;\
     margin:0;\
     padding:0;\
     top:-999px;\
     left:-999px;\
     white-space:nowrap;";

#[derive(Debug, Clone, Copy)]
struct Parts {
    root: ElementId,
    collapsible: ElementId,
    collapsible_inner: ElementId,
    expandable: ElementId,
    expandable_inner: ElementId,
}

impl Parts {
    fn set_expandable_width<H: LayoutHost + ?Sized>(&self, host: &H, px: i32) {
        host.set_style_property(self.expandable_inner, "width", &format!("{px}px"));
    }

    /// Re-arm both scroll containers against the current width. Returns the
    /// width when it differs from the last recorded one.
    fn rearm<H: LayoutHost + ?Sized>(&self, host: &H, last_width: &AtomicI32) -> Option<i32> {
        let width = host.offset_width(self.root);
        let expanded = width + SCROLL_PADDING_PX;
        self.set_expandable_width(host, expanded);
        host.set_scroll_left(self.expandable, expanded);
        let collapsed = host.scroll_width(self.collapsible) + SCROLL_PADDING_PX;
        host.set_scroll_left(self.collapsible, collapsed);
        (last_width.swap(width, Ordering::SeqCst) != width).then_some(width)
    }
}

/// Off-screen element measuring one sample string in one font shorthand.
pub struct Probe<H: LayoutHost> {
    host: Arc<H>,
    parts: Parts,
    current_font: String,
    last_width: Arc<AtomicI32>,
}

impl<H: LayoutHost> std::fmt::Debug for Probe<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("root", &self.parts.root)
            .field("current_font", &self.current_font)
            .field("last_width", &self.last_width())
            .finish()
    }
}

impl<H: LayoutHost> Probe<H> {
    /// Build the element subtree for `text`. The probe is not attached; the
    /// caller appends [`element`](Self::element) wherever it measures.
    pub fn new(host: Arc<H>, text: &str) -> Result<Self, HostError> {
        let root = host.create_element("div");
        host.set_attribute(root, "aria-hidden", "true");
        let text_node = host.create_text(text);
        host.append_child(root, text_node)?;

        let parts = Parts {
            root,
            collapsible: host.create_element("span"),
            collapsible_inner: host.create_element("span"),
            expandable: host.create_element("span"),
            expandable_inner: host.create_element("span"),
        };
        host.set_style(parts.collapsible, SCROLLER_STYLE);
        host.set_style(parts.expandable, SCROLLER_STYLE);
        host.set_style(parts.expandable_inner, SCROLLER_STYLE);
        host.set_style(parts.collapsible_inner, COLLAPSIBLE_INNER_STYLE);

        host.append_child(parts.collapsible, parts.collapsible_inner)?;
        host.append_child(parts.expandable, parts.expandable_inner)?;
        host.append_child(root, parts.collapsible)?;
        host.append_child(root, parts.expandable)?;

        Ok(Self {
            host,
            parts,
            current_font: String::new(),
            last_width: Arc::new(AtomicI32::new(UNSET_WIDTH)),
        })
    }

    /// Root element to insert into the document.
    pub fn element(&self) -> ElementId {
        self.parts.root
    }

    /// Apply a complete CSS font shorthand to the measurement element.
    pub fn set_font(&mut self, font: &str) {
        self.host
            .set_style(self.parts.root, &format!("{MEASURE_STYLE}font:{font};"));
        self.current_font = font.to_owned();
        trace!(target: "probe", root = ?self.parts.root, font, "probe_font_set");
    }

    pub fn current_font(&self) -> &str {
        &self.current_font
    }

    /// Current rendered width in pixels.
    pub fn width(&self) -> i32 {
        self.host.offset_width(self.parts.root)
    }

    /// Force the expandable container's inner sizing reference.
    pub fn set_width(&self, px: i32) {
        self.parts.set_expandable_width(&*self.host, px);
    }

    /// Last width recorded by a reset, [`UNSET_WIDTH`] before the first one.
    pub fn last_width(&self) -> i32 {
        self.last_width.load(Ordering::SeqCst)
    }

    pub fn is_attached(&self) -> bool {
        self.host.is_connected(self.parts.root)
    }

    /// Re-arm the scroll containers; true when the width changed since the
    /// previous reset.
    fn reset(&self) -> bool {
        self.parts.rearm(&*self.host, &self.last_width).is_some()
    }

    /// Call `callback(new_width)` on every genuine width change signalled by
    /// a scroll event while the probe is connected to the live tree.
    ///
    /// The returned subscription unregisters both listeners when dropped.
    pub fn on_resize<F>(&self, callback: F) -> ResizeSubscription<H>
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        let listener: ScrollListener = {
            let host = Arc::clone(&self.host);
            let parts = self.parts;
            let last_width = Arc::clone(&self.last_width);
            Arc::new(move || {
                let Some(width) = parts.rearm(&*host, &last_width) else {
                    return;
                };
                if !host.is_connected(parts.root) {
                    trace!(target: "probe", root = ?parts.root, width, "resize_ignored_detached");
                    return;
                }
                trace!(target: "probe", root = ?parts.root, width, "resize");
                callback(width);
            })
        };
        let listeners = [self.parts.collapsible, self.parts.expandable]
            .into_iter()
            .map(|element| {
                self.host
                    .add_scroll_listener(element, Arc::clone(&listener))
            })
            .collect();
        self.reset();
        ResizeSubscription {
            host: Arc::clone(&self.host),
            listeners,
        }
    }
}

/// Live registration of a probe's resize listeners.
#[must_use = "dropping the subscription unregisters the resize listeners"]
pub struct ResizeSubscription<H: LayoutHost> {
    host: Arc<H>,
    listeners: Vec<ListenerId>,
}

impl<H: LayoutHost> ResizeSubscription<H> {
    /// Unregister now instead of at drop.
    pub fn cancel(self) {}
}

impl<H: LayoutHost> Drop for ResizeSubscription<H> {
    fn drop(&mut self) {
        for id in self.listeners.drain(..) {
            self.host.remove_listener(id);
        }
    }
}
