//! Item types for the document model.
//!
//! All types derive `Serialize + Deserialize` so the same types work for
//! both Rust API construction and JSON deserialization.

use serde::{Deserialize, Serialize};

use crate::protocol::text::{Alignment, TextSize};
use crate::render::raster::PixelGrid;

fn default_image_alignment() -> Alignment {
    Alignment::Center
}

fn default_divider_character() -> char {
    '-'
}

fn default_divider_width() -> usize {
    32
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// An ordered list of print items. Order is preserved in the output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub items: Vec<DocumentItem>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item, builder style.
    pub fn with(mut self, item: impl Into<DocumentItem>) -> Self {
        self.items.push(item.into());
        self
    }

    pub fn push(&mut self, item: impl Into<DocumentItem>) {
        self.items.push(item.into());
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<Vec<DocumentItem>> for Document {
    fn from(items: Vec<DocumentItem>) -> Self {
        Self { items }
    }
}

/// One item in a [`Document`].
///
/// ```
/// use silver_printer::document::DocumentItem;
///
/// let item: DocumentItem =
///     serde_json::from_str(r#"{"type":"divider","character":"=","width":10}"#).unwrap();
/// assert_eq!(item, DocumentItem::Divider { character: '=', width: 10 });
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentItem {
    Text(TextRun),
    Image(ImageItem),
    LineFeed {
        #[serde(default = "one")]
        lines: usize,
    },
    Divider {
        #[serde(default = "default_divider_character")]
        character: char,
        #[serde(default = "default_divider_width")]
        width: usize,
    },
    Raw {
        data: Vec<u8>,
    },
}

fn one() -> usize {
    1
}

impl DocumentItem {
    /// A divider of `width` copies of `character`.
    pub fn divider(character: char, width: usize) -> Self {
        DocumentItem::Divider { character, width }
    }

    pub fn line_feed(lines: usize) -> Self {
        DocumentItem::LineFeed { lines }
    }

    pub fn raw(data: impl Into<Vec<u8>>) -> Self {
        DocumentItem::Raw { data: data.into() }
    }
}

impl From<TextRun> for DocumentItem {
    fn from(run: TextRun) -> Self {
        DocumentItem::Text(run)
    }
}

impl From<ImageItem> for DocumentItem {
    fn from(image: ImageItem) -> Self {
        DocumentItem::Image(image)
    }
}

// ============================================================================
// TEXT
// ============================================================================

/// A run of text with its formatting.
///
/// Formatting applies to this run only; the encoder resets every attribute
/// after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub content: String,
    #[serde(default)]
    pub alignment: Alignment,
    #[serde(default)]
    pub size: TextSize,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub underline: bool,
}

impl TextRun {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn underline(mut self) -> Self {
        self.underline = true;
        self
    }

    pub fn align(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn center(self) -> Self {
        self.align(Alignment::Center)
    }

    pub fn size(mut self, size: TextSize) -> Self {
        self.size = size;
        self
    }
}

// ============================================================================
// IMAGE
// ============================================================================

/// A raster image item.
///
/// Without a target width the image spans the paper width. Images are
/// centered unless told otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageItem {
    pub pixels: PixelGrid,
    #[serde(default)]
    pub target_width: Option<u32>,
    #[serde(default)]
    pub target_height: Option<u32>,
    #[serde(default = "default_image_alignment")]
    pub alignment: Alignment,
}

impl ImageItem {
    pub fn new(pixels: PixelGrid) -> Self {
        Self {
            pixels,
            target_width: None,
            target_height: None,
            alignment: default_image_alignment(),
        }
    }

    pub fn width(mut self, width: u32) -> Self {
        self.target_width = Some(width);
        self
    }

    pub fn height(mut self, height: u32) -> Self {
        self.target_height = Some(height);
        self
    }

    pub fn align(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }
}

// ============================================================================
// PRINT SETTINGS
// ============================================================================

/// Per-call options for the print operations. Every field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintSettings {
    pub font_size: Option<TextSize>,
    pub bold: Option<bool>,
    pub alignment: Option<Alignment>,
    /// Line feeds appended after the content
    pub feed_lines: Option<usize>,
}

impl PrintSettings {
    /// Build a text run from `content` using these settings.
    pub fn text_run(&self, content: impl Into<String>) -> TextRun {
        TextRun {
            content: content.into(),
            alignment: self.alignment.unwrap_or_default(),
            size: self.font_size.unwrap_or_default(),
            bold: self.bold.unwrap_or(false),
            underline: false,
        }
    }

    /// The trailing feed item, when `feed_lines` is set and non-zero.
    pub fn feed_item(&self) -> Option<DocumentItem> {
        self.feed_lines
            .filter(|&n| n > 0)
            .map(DocumentItem::line_feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_run_json_defaults() {
        let item: DocumentItem = serde_json::from_str(r#"{"type":"text","content":"Hi"}"#).unwrap();
        assert_eq!(item, DocumentItem::Text(TextRun::new("Hi")));
    }

    #[test]
    fn test_text_run_json_full() {
        let item: DocumentItem = serde_json::from_str(
            r#"{"type":"text","content":"Hi","alignment":"right","size":"extraLarge","bold":true,"underline":true}"#,
        )
        .unwrap();
        let expected = TextRun::new("Hi")
            .align(Alignment::Right)
            .size(TextSize::ExtraLarge)
            .bold()
            .underline();
        assert_eq!(item, DocumentItem::Text(expected));
    }

    #[test]
    fn test_line_feed_defaults_to_one() {
        let item: DocumentItem = serde_json::from_str(r#"{"type":"line_feed"}"#).unwrap();
        assert_eq!(item, DocumentItem::LineFeed { lines: 1 });
    }

    #[test]
    fn test_image_json_validates_grid() {
        let ok = r#"{"type":"image","pixels":{"width":1,"height":1,"rgba":[0,0,0,255]}}"#;
        let item: DocumentItem = serde_json::from_str(ok).unwrap();
        match item {
            DocumentItem::Image(image) => assert_eq!(image.alignment, Alignment::Center),
            other => panic!("expected image, got {:?}", other),
        }

        let bad = r#"{"type":"image","pixels":{"width":2,"height":1,"rgba":[0,0,0,255]}}"#;
        assert!(serde_json::from_str::<DocumentItem>(bad).is_err());
    }

    #[test]
    fn test_settings_text_run() {
        let settings = PrintSettings {
            alignment: Some(Alignment::Center),
            bold: Some(true),
            ..Default::default()
        };
        let run = settings.text_run("Hello");
        assert_eq!(run, TextRun::new("Hello").center().bold());
        assert_eq!(settings.feed_item(), None);
    }

    #[test]
    fn test_settings_zero_feed_is_none() {
        let settings = PrintSettings {
            feed_lines: Some(0),
            ..Default::default()
        };
        assert_eq!(settings.feed_item(), None);
    }
}
