//! Synthetic font metrics for the headless host.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

pub const GENERIC_FAMILIES: [&str; 3] = ["sans-serif", "serif", "monospace"];

const STRETCH_KEYWORDS: [&str; 8] = [
    "ultra-condensed",
    "extra-condensed",
    "condensed",
    "semi-condensed",
    "semi-expanded",
    "expanded",
    "extra-expanded",
    "ultra-expanded",
];

const DEFAULT_FONT_SIZE_PX: f32 = 16.0;

// `<prefix> <size>px[/<line-height>] <family list>`
static SHORTHAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(.*?)\s+)?([0-9]+(?:\.[0-9]+)?)px(?:/\S+)?\s+(.+?)\s*$")
        .expect("static regex is valid")
});

/// Horizontal metrics of a face: average advance in em units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMetrics {
    pub advance_em: f32,
    pub monospaced: bool,
}

impl FaceMetrics {
    pub const fn proportional(advance_em: f32) -> Self {
        Self {
            advance_em,
            monospaced: false,
        }
    }

    pub const fn monospaced(advance_em: f32) -> Self {
        Self {
            advance_em,
            monospaced: true,
        }
    }

    fn glyph_factor(&self, ch: char) -> f32 {
        if self.monospaced {
            return 1.0;
        }
        match ch {
            'i' | 'j' | 'l' | 'f' | 't' | 'r' | '.' | ',' | ';' | ':' | '\'' | '!' | '|' | ' ' => {
                0.5
            }
            c if c.is_uppercase() => 1.2,
            _ => 1.0,
        }
    }

    /// Unrounded advance width of `text` at `size_px`.
    pub fn measure(&self, text: &str, size_px: f32) -> f32 {
        text.chars()
            .map(|ch| self.glyph_factor(ch) * self.advance_em * size_px)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaceState {
    Active,
    Pending,
}

#[derive(Debug, Clone)]
pub(crate) struct FontBook {
    faces: HashMap<String, (FaceMetrics, FaceState)>,
}

impl Default for FontBook {
    fn default() -> Self {
        let mut faces = HashMap::new();
        faces.insert(
            "sans-serif".to_owned(),
            (FaceMetrics::proportional(0.55), FaceState::Active),
        );
        faces.insert(
            "serif".to_owned(),
            (FaceMetrics::proportional(0.52), FaceState::Active),
        );
        faces.insert(
            "monospace".to_owned(),
            (FaceMetrics::monospaced(0.60), FaceState::Active),
        );
        Self { faces }
    }
}

impl FontBook {
    pub(crate) fn install(&mut self, family: &str, metrics: FaceMetrics) {
        self.faces
            .insert(family.to_lowercase(), (metrics, FaceState::Active));
    }

    pub(crate) fn register_pending(&mut self, family: &str, metrics: FaceMetrics) {
        self.faces
            .insert(family.to_lowercase(), (metrics, FaceState::Pending));
    }

    /// Returns false when the family is unknown.
    pub(crate) fn activate(&mut self, family: &str) -> bool {
        match self.faces.get_mut(&family.to_lowercase()) {
            Some((_, state)) => {
                *state = FaceState::Active;
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_active(&self, family: &str) -> bool {
        matches!(
            self.faces.get(&family.to_lowercase()),
            Some((_, FaceState::Active))
        )
    }

    /// First active face in the stack; `serif` when nothing matches.
    pub(crate) fn resolve(&self, families: &[String]) -> FaceMetrics {
        families
            .iter()
            .find_map(|family| match self.faces.get(&family.to_lowercase()) {
                Some((metrics, FaceState::Active)) => Some(*metrics),
                _ => None,
            })
            .unwrap_or(FaceMetrics::proportional(0.52))
    }

    /// Loaded faces matching the named (non-generic) families of a stack.
    pub(crate) fn loaded_faces(&self, families: &[String]) -> usize {
        families
            .iter()
            .filter(|family| !is_generic(family))
            .filter(|family| self.is_active(family))
            .count()
    }
}

pub(crate) fn is_generic(family: &str) -> bool {
    GENERIC_FAMILIES
        .iter()
        .any(|generic| generic.eq_ignore_ascii_case(family))
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ParsedFont {
    pub(crate) size_px: f32,
    pub(crate) families: Vec<String>,
    pub(crate) stretch: Option<String>,
}

impl Default for ParsedFont {
    fn default() -> Self {
        Self {
            size_px: DEFAULT_FONT_SIZE_PX,
            families: vec!["serif".to_owned()],
            stretch: None,
        }
    }
}

pub(crate) fn parse_font_shorthand(value: &str) -> Option<ParsedFont> {
    let caps = SHORTHAND.captures(value)?;
    let size_px = caps.get(2)?.as_str().parse::<f32>().ok()?;
    let families = split_families(caps.get(3)?.as_str());
    if families.is_empty() {
        return None;
    }
    let stretch = caps.get(1).and_then(|prefix| {
        prefix
            .as_str()
            .split_whitespace()
            .find(|token| STRETCH_KEYWORDS.contains(token))
            .map(str::to_owned)
    });
    Some(ParsedFont {
        size_px,
        families,
        stretch,
    })
}

/// Split a family list on commas outside quotes, unquoting names.
fn split_families(list: &str) -> Vec<String> {
    let mut families = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = list.chars();
    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Some(_), '\\') => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => quote = Some(ch),
            (None, ',') => {
                let name = current.trim();
                if !name.is_empty() {
                    families.push(name.to_owned());
                }
                current.clear();
            }
            (None, c) => current.push(c),
        }
    }
    let name = current.trim();
    if !name.is_empty() {
        families.push(name.to_owned());
    }
    families
}
