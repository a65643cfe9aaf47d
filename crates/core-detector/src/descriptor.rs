//! Font face identity and CSS font shorthand construction.

use std::fmt;

/// Size used for every probe shorthand; large enough that metric differences
/// between faces show up as whole pixels.
pub const PROBE_FONT_SIZE: &str = "100px";

const NORMAL: &str = "normal";

/// Optional face descriptors supplied at construction. Empty strings count as
/// absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptors {
    pub style: Option<String>,
    pub weight: Option<String>,
    pub stretch: Option<String>,
}

impl Descriptors {
    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn weight(mut self, weight: impl Into<String>) -> Self {
        self.weight = Some(weight.into());
        self
    }

    pub fn stretch(mut self, stretch: impl Into<String>) -> Self {
        self.stretch = Some(stretch.into());
        self
    }
}

/// The exact face being awaited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontDescriptor {
    pub family: String,
    pub style: String,
    pub weight: String,
    pub stretch: String,
}

fn or_normal(value: Option<String>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| NORMAL.to_owned())
}

impl FontDescriptor {
    pub fn new(family: impl Into<String>, descriptors: Descriptors) -> Self {
        Self {
            family: family.into(),
            style: or_normal(descriptors.style),
            weight: or_normal(descriptors.weight),
            stretch: or_normal(descriptors.stretch),
        }
    }

    /// `font` shorthand for `stack` at the probe size. Stretch is left out
    /// when the host cannot render it.
    pub fn shorthand(&self, stack: &str, stretch_supported: bool) -> String {
        let mut parts = vec![self.style.as_str(), self.weight.as_str()];
        if stretch_supported {
            parts.push(self.stretch.as_str());
        }
        parts.push(PROBE_FONT_SIZE);
        parts.push(stack);
        parts.join(" ")
    }

    /// `"<family>",<fallback>`
    pub fn stack_with(&self, fallback: &str) -> String {
        format!("{},{fallback}", quote_family(&self.family))
    }
}

impl fmt::Display for FontDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.style,
            self.weight,
            self.stretch,
            quote_family(&self.family)
        )
    }
}

/// Double-quote a family name for use in a CSS family list.
pub fn quote_family(family: &str) -> String {
    let mut quoted = String::with_capacity(family.len() + 2);
    quoted.push('"');
    for ch in family.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}
