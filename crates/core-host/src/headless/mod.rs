//! Deterministic in-memory `LayoutHost`.
//!
//! Used by the test suites and the `fontwatch` binary. Fonts are synthetic
//! (see [`FaceMetrics`]); web fonts are registered pending and switched on
//! with [`HeadlessHost::activate_font`], which relayouts the tree the way a
//! browser does when a font swap lands.
//!
//! Scroll events are queued, coalesced per element and dispatched from a
//! task on the current tokio runtime, never from inside the mutation that
//! caused them. Without a runtime they stay queued until
//! [`HeadlessHost::flush_scroll_events`] is called.

mod dom;
mod fonts;

pub use fonts::{FaceMetrics, GENERIC_FAMILIES};

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, trace};

use crate::{ElementId, HostError, LayoutHost, ListenerId, ScrollListener, Visibility};
use dom::Dom;
use fonts::parse_font_shorthand;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) fontwatch-headless/0.1";

#[derive(Debug, Clone)]
struct Settings {
    visibility: Visibility,
    user_agent: String,
    stretch: bool,
    native_font_loading: bool,
    native_failure: Option<String>,
    native_latency: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            visibility: Visibility::Visible,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            stretch: true,
            native_font_loading: false,
            native_failure: None,
            native_latency: Duration::ZERO,
        }
    }
}

struct Registration {
    id: ListenerId,
    element: ElementId,
    listener: ScrollListener,
}

#[derive(Default)]
struct State {
    dom: Dom,
    listeners: Vec<Registration>,
    next_listener: u64,
    pending_scrolls: Vec<ElementId>,
    dispatch_scheduled: bool,
    settings: Settings,
}

struct Shared {
    state: Mutex<State>,
    body: watch::Sender<Option<ElementId>>,
}

/// Cheaply clonable handle; clones share one document.
#[derive(Clone)]
pub struct HeadlessHost {
    shared: Arc<Shared>,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HeadlessHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("HeadlessHost")
            .field("body", &state.dom.body())
            .field("listeners", &state.listeners.len())
            .field("pending_scrolls", &state.pending_scrolls.len())
            .field("settings", &state.settings)
            .finish()
    }
}

impl HeadlessHost {
    /// Document with a body already attached.
    pub fn new() -> Self {
        let host = Self::without_body();
        host.attach_body();
        host
    }

    /// Document whose body appears only after [`attach_body`](Self::attach_body).
    pub fn without_body() -> Self {
        let (body, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                body,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn attach_body(&self) -> ElementId {
        let body = self.state().dom.create_body();
        self.shared.body.send_replace(Some(body));
        debug!(target: "host.headless", ?body, "body_attached");
        body
    }

    pub fn body(&self) -> Option<ElementId> {
        self.state().dom.body()
    }

    pub fn children(&self, element: ElementId) -> Vec<ElementId> {
        self.state().dom.children(element).to_vec()
    }

    pub fn attribute(&self, element: ElementId, name: &str) -> Option<String> {
        self.state().dom.attribute(element, name).map(str::to_owned)
    }

    pub fn style_value(&self, element: ElementId, property: &str) -> Option<String> {
        self.state()
            .dom
            .style_value(element, property)
            .map(str::to_owned)
    }

    pub fn listener_count(&self) -> usize {
        self.state().listeners.len()
    }

    pub fn set_visibility(&self, visibility: Visibility) {
        self.state().settings.visibility = visibility;
    }

    pub fn set_user_agent(&self, user_agent: &str) {
        self.state().settings.user_agent = user_agent.to_owned();
    }

    pub fn set_stretch_support(&self, supported: bool) {
        self.state().settings.stretch = supported;
    }

    pub fn set_native_font_loading(&self, supported: bool) {
        self.state().settings.native_font_loading = supported;
    }

    /// Make every native font query reject with `reason` (`None` restores).
    pub fn set_native_failure(&self, reason: Option<&str>) {
        self.state().settings.native_failure = reason.map(str::to_owned);
    }

    /// Delay applied to each native font query before it answers.
    pub fn set_native_latency(&self, latency: Duration) {
        self.state().settings.native_latency = latency;
    }

    /// Register a family that is usable immediately.
    pub fn install_font(&self, family: &str, metrics: FaceMetrics) {
        let mut state = self.state();
        state.dom.fonts.install(family, metrics);
        self.relayout(&mut state);
    }

    /// Register a web font that is still downloading.
    pub fn register_web_font(&self, family: &str, metrics: FaceMetrics) {
        self.state().dom.fonts.register_pending(family, metrics);
    }

    /// Finish a pending download; text using the family reflows.
    pub fn activate_font(&self, family: &str) -> bool {
        let mut state = self.state();
        let known = state.dom.fonts.activate(family);
        if known {
            debug!(target: "host.headless", family, "font_activated");
            self.relayout(&mut state);
        }
        known
    }

    pub fn is_font_active(&self, family: &str) -> bool {
        self.state().dom.fonts.is_active(family)
    }

    /// Queue a scroll event regardless of layout (a stray reflow signal).
    pub fn emit_scroll(&self, element: ElementId) {
        let mut state = self.state();
        state.pending_scrolls.push(element);
        self.schedule_dispatch(&mut state);
    }

    /// Dispatch queued scroll events on the calling thread until none remain.
    /// Returns the number of listener invocations.
    pub fn flush_scroll_events(&self) -> usize {
        let mut invoked = 0;
        while let Some(batch) = self.take_batch() {
            invoked += batch.len();
            for listener in batch {
                listener();
            }
        }
        invoked
    }

    fn relayout(&self, state: &mut State) {
        let moved = state.dom.clamp_scroll_offsets();
        if moved.is_empty() {
            return;
        }
        trace!(target: "host.headless", moved = moved.len(), "scroll_offsets_clamped");
        state.pending_scrolls.extend(moved);
        self.schedule_dispatch(state);
    }

    fn schedule_dispatch(&self, state: &mut State) {
        if state.dispatch_scheduled || state.pending_scrolls.is_empty() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        state.dispatch_scheduled = true;
        let host = self.clone();
        handle.spawn(async move {
            loop {
                // Scroll events fire on a later turn, like a browser frame.
                tokio::task::yield_now().await;
                let Some(batch) = host.take_batch() else {
                    break;
                };
                for listener in batch {
                    listener();
                }
            }
        });
    }

    /// Drain the queue into the listeners to call, outside the lock.
    fn take_batch(&self) -> Option<Vec<ScrollListener>> {
        let mut state = self.state();
        if state.pending_scrolls.is_empty() {
            state.dispatch_scheduled = false;
            return None;
        }
        let mut elements = std::mem::take(&mut state.pending_scrolls);
        let mut seen = Vec::with_capacity(elements.len());
        elements.retain(|id| {
            let fresh = !seen.contains(id);
            seen.push(*id);
            fresh
        });
        let batch = elements
            .iter()
            .flat_map(|element| {
                state
                    .listeners
                    .iter()
                    .filter(move |reg| reg.element == *element)
                    .map(|reg| Arc::clone(&reg.listener))
            })
            .collect::<Vec<_>>();
        trace!(target: "host.headless", elements = elements.len(), listeners = batch.len(), "scroll_dispatch");
        Some(batch)
    }
}

impl LayoutHost for HeadlessHost {
    fn create_element(&self, tag: &str) -> ElementId {
        self.state().dom.create_element(tag)
    }

    fn create_text(&self, text: &str) -> ElementId {
        self.state().dom.create_text(text)
    }

    fn set_attribute(&self, element: ElementId, name: &str, value: &str) {
        self.state().dom.set_attribute(element, name, value);
    }

    fn set_style(&self, element: ElementId, css: &str) {
        let mut state = self.state();
        state.dom.set_style(element, css);
        self.relayout(&mut state);
    }

    fn set_style_property(&self, element: ElementId, property: &str, value: &str) {
        let mut state = self.state();
        state.dom.set_style_property(element, property, value);
        self.relayout(&mut state);
    }

    fn append_child(&self, parent: ElementId, child: ElementId) -> Result<(), HostError> {
        let mut state = self.state();
        state.dom.append_child(parent, child)?;
        self.relayout(&mut state);
        Ok(())
    }

    fn remove_child(&self, parent: ElementId, child: ElementId) -> Result<(), HostError> {
        let mut state = self.state();
        state.dom.remove_child(parent, child)?;
        self.relayout(&mut state);
        Ok(())
    }

    fn parent(&self, element: ElementId) -> Option<ElementId> {
        self.state().dom.parent(element)
    }

    fn is_connected(&self, element: ElementId) -> bool {
        self.state().dom.is_connected(element)
    }

    fn offset_width(&self, element: ElementId) -> i32 {
        self.state().dom.offset_width(element)
    }

    fn scroll_width(&self, element: ElementId) -> i32 {
        self.state().dom.scroll_width(element)
    }

    fn scroll_left(&self, element: ElementId) -> i32 {
        self.state().dom.scroll_left(element)
    }

    fn set_scroll_left(&self, element: ElementId, px: i32) {
        let mut state = self.state();
        if state.dom.is_connected(element) && state.dom.set_scroll_left(element, px) {
            state.pending_scrolls.push(element);
            self.schedule_dispatch(&mut state);
        }
    }

    fn add_scroll_listener(&self, element: ElementId, listener: ScrollListener) -> ListenerId {
        let mut state = self.state();
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state.listeners.push(Registration {
            id,
            element,
            listener,
        });
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.state().listeners.retain(|reg| reg.id != id);
    }

    fn visibility(&self) -> Visibility {
        self.state().settings.visibility
    }

    fn user_agent(&self) -> String {
        self.state().settings.user_agent.clone()
    }

    fn accepts_font_shorthand(&self, font: &str) -> bool {
        let stretch = self.state().settings.stretch;
        match parse_font_shorthand(font) {
            Some(parsed) => stretch || parsed.stretch.is_none(),
            None => false,
        }
    }

    fn wait_for_body(&self) -> impl Future<Output = ElementId> + Send {
        let mut body = self.shared.body.subscribe();
        async move {
            loop {
                if let Some(id) = *body.borrow_and_update() {
                    return id;
                }
                if body.changed().await.is_err() {
                    // Host dropped without ever attaching a body.
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    fn supports_native_font_loading(&self) -> bool {
        self.state().settings.native_font_loading
    }

    fn load_fonts(
        &self,
        font: &str,
        _text: &str,
    ) -> impl Future<Output = Result<usize, HostError>> + Send {
        let host = self.clone();
        let font = font.to_owned();
        async move {
            let latency = host.state().settings.native_latency;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let state = host.state();
            if !state.settings.native_font_loading {
                return Err(HostError::Unsupported("native font loading"));
            }
            if let Some(reason) = &state.settings.native_failure {
                return Err(HostError::QueryRejected(reason.clone()));
            }
            let parsed = parse_font_shorthand(&font)
                .ok_or_else(|| HostError::QueryRejected(format!("invalid font '{font}'")))?;
            Ok(state.dom.fonts.loaded_faces(&parsed.families))
        }
    }
}
