//! In-memory node arena and the minimal layout model behind `HeadlessHost`.
//!
//! Layout rules (enough for overflow probes, nothing more):
//! * `width: <n>px` is used as is, `width: <p>%` resolves against the parent;
//! * otherwise the width is the advance of the element's text children in its
//!   resolved font plus any in-flow (non absolute) element children, raised to
//!   `min-width`;
//! * nodes outside the live tree measure 0 and do not scroll.

use std::collections::{BTreeSet, HashMap};

use crate::headless::fonts::{FontBook, ParsedFont, parse_font_shorthand};
use crate::{ElementId, HostError};

#[derive(Debug, Clone)]
enum NodeKind {
    Element { tag: String },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    style: Vec<(String, String)>,
    attributes: HashMap<String, String>,
    scroll_left: i32,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            style: Vec::new(),
            attributes: HashMap::new(),
            scroll_left: 0,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Dom {
    nodes: HashMap<ElementId, Node>,
    next_id: u64,
    body: Option<ElementId>,
    /// Nodes with a non-zero scroll offset.
    scrolled: BTreeSet<ElementId>,
    pub(crate) fonts: FontBook,
}

impl Dom {
    fn insert(&mut self, kind: NodeKind) -> ElementId {
        self.next_id += 1;
        let id = ElementId(self.next_id);
        self.nodes.insert(id, Node::new(kind));
        id
    }

    pub(crate) fn create_element(&mut self, tag: &str) -> ElementId {
        self.insert(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
        })
    }

    pub(crate) fn create_text(&mut self, text: &str) -> ElementId {
        self.insert(NodeKind::Text(text.to_owned()))
    }

    pub(crate) fn create_body(&mut self) -> ElementId {
        if let Some(body) = self.body {
            return body;
        }
        let body = self.create_element("body");
        self.body = Some(body);
        body
    }

    pub(crate) fn body(&self) -> Option<ElementId> {
        self.body
    }

    pub(crate) fn contains(&self, id: ElementId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub(crate) fn tag(&self, id: ElementId) -> Option<&str> {
        match &self.nodes.get(&id)?.kind {
            NodeKind::Element { tag } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    pub(crate) fn children(&self, id: ElementId) -> &[ElementId] {
        self.nodes
            .get(&id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    pub(crate) fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(&id)?.parent
    }

    pub(crate) fn attribute(&self, id: ElementId, name: &str) -> Option<&str> {
        self.nodes.get(&id)?.attributes.get(name).map(String::as_str)
    }

    pub(crate) fn set_attribute(&mut self, id: ElementId, name: &str, value: &str) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.attributes.insert(name.to_owned(), value.to_owned());
        }
    }

    pub(crate) fn append_child(
        &mut self,
        parent: ElementId,
        child: ElementId,
    ) -> Result<(), HostError> {
        if self.tag(parent).is_none() {
            return Err(HostError::UnknownElement(parent));
        }
        if !self.contains(child) {
            return Err(HostError::UnknownElement(child));
        }
        // Refuse cycles: the parent may not live inside the child.
        let mut cursor = Some(parent);
        while let Some(id) = cursor {
            if id == child {
                return Err(HostError::NotAChild { parent, child });
            }
            cursor = self.parent(id);
        }
        if let Some(old) = self.parent(child) {
            self.detach(old, child);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        Ok(())
    }

    pub(crate) fn remove_child(
        &mut self,
        parent: ElementId,
        child: ElementId,
    ) -> Result<(), HostError> {
        if !self.contains(parent) {
            return Err(HostError::UnknownElement(parent));
        }
        if self.parent(child) != Some(parent) {
            return Err(HostError::NotAChild { parent, child });
        }
        self.detach(parent, child);
        Ok(())
    }

    fn detach(&mut self, parent: ElementId, child: ElementId) {
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|c| *c != child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
        // Leaving the tree drops the layout box, and its scroll offsets.
        let mut stack = vec![child];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            node.scroll_left = 0;
            stack.extend(node.children.iter().copied());
            self.scrolled.remove(&id);
        }
    }

    pub(crate) fn is_connected(&self, id: ElementId) -> bool {
        let Some(body) = self.body else {
            return false;
        };
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == body {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    pub(crate) fn style_value(&self, id: ElementId, property: &str) -> Option<&str> {
        self.nodes
            .get(&id)?
            .style
            .iter()
            .rev()
            .find(|(name, _)| name == property)
            .map(|(_, value)| value.as_str())
    }

    pub(crate) fn set_style(&mut self, id: ElementId, css: &str) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        node.style = css
            .split(';')
            .filter_map(|decl| {
                let (name, value) = decl.split_once(':')?;
                let name = name.trim().to_ascii_lowercase();
                let value = value.trim();
                (!name.is_empty() && !value.is_empty()).then(|| (name, value.to_owned()))
            })
            .collect();
    }

    pub(crate) fn set_style_property(&mut self, id: ElementId, property: &str, value: &str) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let property = property.trim().to_ascii_lowercase();
        node.style.retain(|(name, _)| *name != property);
        if !value.trim().is_empty() {
            node.style.push((property, value.trim().to_owned()));
        }
    }

    /// Font in effect for `id`, inherited from the nearest styled ancestor.
    fn resolved_font(&self, id: ElementId) -> ParsedFont {
        let mut cursor = Some(id);
        let mut size_override: Option<f32> = None;
        while let Some(current) = cursor {
            if let Some(parsed) = self
                .style_value(current, "font")
                .and_then(parse_font_shorthand)
            {
                return ParsedFont {
                    size_px: size_override.unwrap_or(parsed.size_px),
                    ..parsed
                };
            }
            if size_override.is_none() {
                size_override = self.style_value(current, "font-size").and_then(parse_px);
            }
            cursor = self.parent(current);
        }
        let mut font = ParsedFont::default();
        if let Some(size) = size_override {
            font.size_px = size;
        }
        font
    }

    fn layout_width(&self, id: ElementId) -> f32 {
        let Some(node) = self.nodes.get(&id) else {
            return 0.0;
        };
        match &node.kind {
            NodeKind::Text(text) => {
                let Some(parent) = node.parent else {
                    return 0.0;
                };
                let font = self.resolved_font(parent);
                self.fonts.resolve(&font.families).measure(text, font.size_px)
            }
            NodeKind::Element { .. } => {
                if self.style_value(id, "display") == Some("none") {
                    return 0.0;
                }
                let explicit = self.style_value(id, "width").and_then(|width| {
                    if let Some(px) = parse_px(width) {
                        Some(px)
                    } else {
                        let pct = width.strip_suffix('%')?.trim().parse::<f32>().ok()?;
                        let parent_width = node.parent.map(|p| self.layout_width(p)).unwrap_or(0.0);
                        Some(parent_width * pct / 100.0)
                    }
                });
                let width = explicit.unwrap_or_else(|| {
                    node.children
                        .iter()
                        .filter(|child| self.style_value(**child, "position") != Some("absolute"))
                        .map(|child| self.layout_width(*child))
                        .sum()
                });
                let min = self
                    .style_value(id, "min-width")
                    .and_then(parse_px)
                    .unwrap_or(0.0);
                width.max(min).max(0.0)
            }
        }
    }

    pub(crate) fn offset_width(&self, id: ElementId) -> i32 {
        if !self.is_connected(id) {
            return 0;
        }
        self.layout_width(id).round() as i32
    }

    pub(crate) fn scroll_width(&self, id: ElementId) -> i32 {
        if !self.is_connected(id) {
            return 0;
        }
        let own = self.layout_width(id).round() as i32;
        self.children(id)
            .iter()
            .filter(|child| self.tag(**child).is_some())
            .map(|child| self.layout_width(*child).round() as i32)
            .fold(own, i32::max)
    }

    fn max_scroll(&self, id: ElementId) -> i32 {
        (self.scroll_width(id) - self.offset_width(id)).max(0)
    }

    pub(crate) fn scroll_left(&self, id: ElementId) -> i32 {
        self.nodes.get(&id).map(|n| n.scroll_left).unwrap_or(0)
    }

    /// Clamp and store a programmatic scroll; returns whether it moved.
    pub(crate) fn set_scroll_left(&mut self, id: ElementId, px: i32) -> bool {
        let max = self.max_scroll(id);
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        let clamped = px.clamp(0, max);
        if clamped == node.scroll_left {
            return false;
        }
        node.scroll_left = clamped;
        if clamped > 0 {
            self.scrolled.insert(id);
        } else {
            self.scrolled.remove(&id);
        }
        true
    }

    /// Re-clamp every connected scroll offset after a layout change. Returns
    /// the elements whose offset moved; each owes a scroll event.
    pub(crate) fn clamp_scroll_offsets(&mut self) -> Vec<ElementId> {
        let candidates: Vec<ElementId> = self.scrolled.iter().copied().collect();
        let mut moved = Vec::new();
        for id in candidates {
            if !self.is_connected(id) {
                continue;
            }
            let max = self.max_scroll(id);
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if node.scroll_left > max {
                node.scroll_left = max;
                if max == 0 {
                    self.scrolled.remove(&id);
                }
                moved.push(id);
            }
        }
        moved
    }
}

fn parse_px(value: &str) -> Option<f32> {
    value.trim().strip_suffix("px")?.trim().parse::<f32>().ok()
}
