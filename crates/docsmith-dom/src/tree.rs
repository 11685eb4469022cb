//! The finished, owned document tree.
//!
//! A [`DocumentTree`] is produced once per execution by
//! [`DocumentBuilder::finalize`](crate::DocumentBuilder::finalize) and handed
//! to a [`DocumentCodec`](crate::DocumentCodec). Ownership is strictly
//! hierarchical: document → sections → blocks → runs / rows → cells →
//! paragraphs.

use crate::style::{
    Alignment, BreakKind, LineSpacing, Orientation, ParagraphStyle, SectionStart, TableStyle,
};
use crate::units::{Color, Length};

/// Root of a built document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentTree {
    pub properties: CoreProperties,
    pub sections: Vec<Section>,
}

impl DocumentTree {
    /// Body-level paragraphs across all sections, in order.
    pub fn paragraph_count(&self) -> usize {
        self.blocks()
            .filter(|b| matches!(b, Block::Paragraph(_)))
            .count()
    }

    /// Body-level tables across all sections, in order.
    pub fn table_count(&self) -> usize {
        self.blocks().filter(|b| matches!(b, Block::Table(_))).count()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.sections.iter().flat_map(|s| s.blocks.iter())
    }
}

/// Descriptive metadata stored alongside the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreProperties {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub comments: Option<String>,
    pub category: Option<String>,
}

/// A run of pages sharing one page setup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    pub setup: PageSetup,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSetup {
    pub start: SectionStart,
    pub orientation: Orientation,
    pub page_width: Length,
    pub page_height: Length,
    pub top_margin: Length,
    pub right_margin: Length,
    pub bottom_margin: Length,
    pub left_margin: Length,
}

impl Default for PageSetup {
    /// US Letter, portrait, one-inch margins.
    fn default() -> Self {
        Self {
            start: SectionStart::NewPage,
            orientation: Orientation::Portrait,
            page_width: Length::raw(7_772_400),
            page_height: Length::whole_inches(11),
            top_margin: Length::whole_inches(1),
            right_margin: Length::whole_inches(1),
            bottom_margin: Length::whole_inches(1),
            left_margin: Length::whole_inches(1),
        }
    }
}

impl PageSetup {
    /// Width available to body content.
    pub fn content_width(&self) -> Length {
        self.page_width
            .checked_sub(self.left_margin)
            .and_then(|w| w.checked_sub(self.right_margin))
            .unwrap_or(Length::ZERO)
    }
}

/// A body-level element.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    pub style: Option<ParagraphStyle>,
    pub format: ParagraphFormat,
    pub runs: Vec<Run>,
}

impl Paragraph {
    pub fn text(&self) -> String {
        self.runs.iter().map(Run::text).collect()
    }
}

/// Direct paragraph formatting; `None` inherits from the style.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ParagraphFormat {
    pub alignment: Option<Alignment>,
    pub space_before: Option<Length>,
    pub space_after: Option<Length>,
    pub line_spacing: Option<LineSpacing>,
    pub left_indent: Option<Length>,
    pub right_indent: Option<Length>,
    pub first_line_indent: Option<Length>,
    pub keep_with_next: Option<bool>,
    pub page_break_before: Option<bool>,
}

impl ParagraphFormat {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Run {
    pub format: RunFormat,
    pub content: Vec<RunContent>,
}

impl Run {
    /// Text as a script reads it back: tabs as `\t`, line breaks as `\n`.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for item in &self.content {
            match item {
                RunContent::Text(t) => text.push_str(t),
                RunContent::Tab => text.push('\t'),
                RunContent::Break(BreakKind::Line) => text.push('\n'),
                RunContent::Break(_) => {}
            }
        }
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunContent {
    Text(String),
    Tab,
    Break(BreakKind),
}

/// Direct character formatting; `None` inherits from the style.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFormat {
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub strike: Option<bool>,
    pub font_name: Option<String>,
    pub size: Option<Length>,
    pub color: Option<Color>,
}

impl RunFormat {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub style: Option<TableStyle>,
    pub alignment: Option<Alignment>,
    pub autofit: bool,
    /// One entry per column; the length is the table's column count.
    pub column_widths: Vec<Option<Length>>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn column_count(&self) -> usize {
        self.column_widths.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub height: Option<Length>,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub width: Option<Length>,
    pub paragraphs: Vec<Paragraph>,
}

impl Cell {
    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page_is_us_letter() {
        let setup = PageSetup::default();
        assert_eq!(setup.page_width.twips(), 12240);
        assert_eq!(setup.page_height.twips(), 15840);
        assert_eq!(setup.content_width(), Length::inches(6.5).unwrap());
    }

    #[test]
    fn run_text_renders_tabs_and_line_breaks() {
        let run = Run {
            format: RunFormat::default(),
            content: vec![
                RunContent::Text("a".into()),
                RunContent::Tab,
                RunContent::Text("b".into()),
                RunContent::Break(BreakKind::Line),
                RunContent::Break(BreakKind::Page),
                RunContent::Text("c".into()),
            ],
        };
        assert_eq!(run.text(), "a\tb\nc");
    }

    #[test]
    fn counts_blocks_across_sections() {
        let tree = DocumentTree {
            properties: CoreProperties::default(),
            sections: vec![
                Section {
                    setup: PageSetup::default(),
                    blocks: vec![
                        Block::Paragraph(Paragraph::default()),
                        Block::Table(Table::default()),
                    ],
                },
                Section {
                    setup: PageSetup::default(),
                    blocks: vec![Block::Paragraph(Paragraph::default())],
                },
            ],
        };
        assert_eq!(tree.paragraph_count(), 2);
        assert_eq!(tree.table_count(), 1);
    }
}
