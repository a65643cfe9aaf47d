//! Host layout environment abstraction.
//!
//! The observer never talks to a rendering engine directly. Everything it
//! needs (element creation, inline styles, pixel measurement, scroll offsets,
//! scroll notifications, visibility, the optional native font query) goes
//! through [`LayoutHost`]. A browser binding implements the trait over the
//! DOM; [`headless::HeadlessHost`] implements it over an in-memory layout
//! tree so the detection algorithm can run without a live renderer.

use std::future::Future;
use std::sync::Arc;

pub mod capabilities;
pub mod headless;

pub use capabilities::HostCapabilities;
pub use headless::HeadlessHost;

/// Opaque handle to a node (element or text) owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

/// Handle returned when registering a scroll listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Callback invoked by the host when a scroll event reaches an element.
pub type ScrollListener = Arc<dyn Fn() + Send + Sync + 'static>;

/// Page visibility as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    Visible,
    Hidden,
    /// The host gives no visibility signal.
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("unknown element {0:?}")]
    UnknownElement(ElementId),
    #[error("{child:?} is not a child of {parent:?}")]
    NotAChild { parent: ElementId, child: ElementId },
    #[error("font query rejected: {0}")]
    QueryRejected(String),
    #[error("{0} is not supported by this host")]
    Unsupported(&'static str),
}

/// Capabilities consumed from the rendering environment.
///
/// Setters mirror DOM style assignment and never fail; unknown ids are
/// ignored by implementations. Tree mutations report misuse through
/// [`HostError`].
pub trait LayoutHost: Send + Sync + 'static {
    fn create_element(&self, tag: &str) -> ElementId;
    fn create_text(&self, text: &str) -> ElementId;
    fn set_attribute(&self, element: ElementId, name: &str, value: &str);
    /// Replace the whole inline style (`cssText`).
    fn set_style(&self, element: ElementId, css: &str);
    /// Assign one inline style property, keeping the others.
    fn set_style_property(&self, element: ElementId, property: &str, value: &str);
    fn append_child(&self, parent: ElementId, child: ElementId) -> Result<(), HostError>;
    fn remove_child(&self, parent: ElementId, child: ElementId) -> Result<(), HostError>;
    fn parent(&self, element: ElementId) -> Option<ElementId>;
    /// Whether the node is part of the live layout tree.
    fn is_connected(&self, element: ElementId) -> bool;
    fn offset_width(&self, element: ElementId) -> i32;
    fn scroll_width(&self, element: ElementId) -> i32;
    fn scroll_left(&self, element: ElementId) -> i32;
    fn set_scroll_left(&self, element: ElementId, px: i32);
    fn add_scroll_listener(&self, element: ElementId, listener: ScrollListener) -> ListenerId;
    fn remove_listener(&self, id: ListenerId);
    fn visibility(&self) -> Visibility;
    fn user_agent(&self) -> String;
    /// Whether assigning `font` as a CSS font shorthand is accepted.
    fn accepts_font_shorthand(&self, font: &str) -> bool;
    /// Resolves once the document body exists.
    fn wait_for_body(&self) -> impl Future<Output = ElementId> + Send;
    /// Whether the host exposes a native font loading query.
    fn supports_native_font_loading(&self) -> bool {
        false
    }
    /// Native `fonts.load(font, text)`: number of loaded faces matching `font`.
    fn load_fonts(
        &self,
        font: &str,
        text: &str,
    ) -> impl Future<Output = Result<usize, HostError>> + Send {
        let _ = (font, text);
        async { Err(HostError::Unsupported("native font loading")) }
    }
}
