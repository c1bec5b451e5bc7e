//! Text placement operations and the committed annotation history
//!
//! A [`PositionedTextOp`] describes one block of text to draw on one page.
//! The [`AnnotationHistory`] keeps the committed ops in apply order: later ops
//! are drawn over earlier ones.

use crate::error::{Result, StampError};
use serde::{Deserialize, Serialize};

/// A point in page space: origin at the top-left corner of the visible page
/// box, x to the right, y downward, in PDF points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// RGB colour with channels in [0, 1]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const RED: Rgb = Rgb {
        r: 1.0,
        g: 0.0,
        b: 0.0,
    };

    /// Build a colour, clamping every channel into [0, 1]
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        let clamp = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        Self {
            r: clamp(r),
            g: clamp(g),
            b: clamp(b),
        }
    }

    /// Parse a hex colour string ("#FF0000" or "FF0000")
    pub fn from_hex(color: &str) -> Result<Self> {
        let hex = color.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(StampError::InvalidOperation(format!(
                "Invalid colour '{}', expected #RRGGBB",
                color
            )));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|_| {
                    StampError::InvalidOperation(format!(
                        "Invalid colour '{}', expected #RRGGBB",
                        color
                    ))
                })
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    pub fn to_hex(&self) -> String {
        let byte = |v: f32| (v * 255.0).round() as u8;
        format!("#{:02X}{:02X}{:02X}", byte(self.r), byte(self.g), byte(self.b))
    }

    fn is_valid(&self) -> bool {
        [self.r, self.g, self.b]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }
}

/// Fonts every PDF viewer provides without embedding
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StandardFont {
    Helvetica,
    TimesRoman,
    Courier,
}

impl StandardFont {
    pub fn base_font(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::TimesRoman => "Times-Roman",
            StandardFont::Courier => "Courier",
        }
    }

    /// Map a font family name to the closest standard font.
    /// Handles CSS generic families as well as common face names.
    pub fn from_family(name: &str) -> Self {
        let lower = name.to_lowercase();

        match lower.as_str() {
            "serif" => return StandardFont::TimesRoman,
            "monospace" => return StandardFont::Courier,
            "sans-serif" | "cursive" | "fantasy" => return StandardFont::Helvetica,
            _ => {}
        }

        if lower.contains("times") || lower.contains("georgia") || lower.contains("garamond") {
            return StandardFont::TimesRoman;
        }

        if lower.contains("courier")
            || lower.contains("mono")
            || lower.contains("consolas")
            || lower.contains("monaco")
        {
            return StandardFont::Courier;
        }

        StandardFont::Helvetica
    }
}

/// How an op names its font
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FontReference {
    /// A human-readable name resolved through the [`crate::fonts::FontCatalog`]
    Named(String),
    /// A standard font, always available
    Builtin(StandardFont),
}

impl FontReference {
    pub fn named(name: impl Into<String>) -> Self {
        FontReference::Named(name.into())
    }

    /// Stable key used to derive resource names on the page
    pub fn key(&self) -> String {
        match self {
            FontReference::Named(name) => format!("named:{}", name),
            FontReference::Builtin(font) => format!("builtin:{}", font.base_font()),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            FontReference::Named(name) => name,
            FontReference::Builtin(font) => font.base_font(),
        }
    }
}

impl Default for FontReference {
    fn default() -> Self {
        FontReference::Builtin(StandardFont::Helvetica)
    }
}

/// One text placement instruction.
///
/// `page_index` is zero-based and is only checked against a document when the
/// op is applied, since the op may be replayed onto any document instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionedTextOp {
    pub page_index: usize,
    /// May contain line breaks; every line gets its own baseline
    pub text: String,
    /// Baseline origin of the first line
    pub origin: Point,
    pub font: FontReference,
    pub font_size: f64,
    /// Multiplier on `font_size` giving the distance between baselines
    pub line_spacing: f64,
    pub color: Rgb,
}

impl PositionedTextOp {
    /// Check the op is structurally sound. Page bounds are not checked here.
    pub fn validate(&self) -> Result<()> {
        if !(self.font_size.is_finite() && self.font_size > 0.0) {
            return Err(StampError::InvalidOperation(format!(
                "font size must be positive, got {}",
                self.font_size
            )));
        }
        if !(self.line_spacing.is_finite() && self.line_spacing > 0.0) {
            return Err(StampError::InvalidOperation(format!(
                "line spacing must be positive, got {}",
                self.line_spacing
            )));
        }
        if !(self.origin.x.is_finite() && self.origin.y.is_finite()) {
            return Err(StampError::InvalidOperation(
                "origin must be finite".to_string(),
            ));
        }
        if !self.color.is_valid() {
            return Err(StampError::InvalidOperation(
                "colour channels must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Vertical distance between consecutive baselines
    pub fn line_advance(&self) -> f64 {
        self.font_size * self.line_spacing
    }

    /// Lines of text paired with their baseline y (top-down page space)
    pub fn line_layout(&self) -> Vec<(f64, &str)> {
        let advance = self.line_advance();
        self.text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .enumerate()
            .map(|(i, line)| (self.origin.y + advance * i as f64, line))
            .collect()
    }
}

/// Ordered list of committed ops. Insertion order is apply order.
///
/// Entries are addressed by their current position; removing an entry shifts
/// everything after it down by one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct AnnotationHistory {
    operations: Vec<PositionedTextOp>,
}

impl AnnotationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an op and return its index
    pub fn append(&mut self, op: PositionedTextOp) -> Result<usize> {
        op.validate()?;
        self.operations.push(op);
        Ok(self.operations.len() - 1)
    }

    /// Remove the op at `index`. A stale index leaves the history untouched.
    pub fn remove_at(&mut self, index: usize) -> Result<PositionedTextOp> {
        if index >= self.operations.len() {
            return Err(StampError::IndexOutOfRange {
                index,
                len: self.operations.len(),
            });
        }
        Ok(self.operations.remove(index))
    }

    /// Remove the most recently appended op
    pub fn pop(&mut self) -> Option<PositionedTextOp> {
        self.operations.pop()
    }

    pub fn clear(&mut self) {
        self.operations.clear();
    }

    /// Read-only view for rendering. Do not hold it across mutations.
    pub fn snapshot(&self) -> &[PositionedTextOp] {
        &self.operations
    }

    pub fn get(&self, index: usize) -> Option<&PositionedTextOp> {
        self.operations.get(index)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations_for_page(&self, page_index: usize) -> Vec<&PositionedTextOp> {
        self.operations
            .iter()
            .filter(|op| op.page_index == page_index)
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| StampError::Serialization(e.to_string()))
    }

    /// Parse a history, rejecting any structurally invalid op
    pub fn from_json(json: &str) -> Result<Self> {
        let history: AnnotationHistory =
            serde_json::from_str(json).map_err(|e| StampError::Serialization(e.to_string()))?;
        for op in &history.operations {
            op.validate()?;
        }
        Ok(history)
    }
}
