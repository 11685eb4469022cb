//! Document package codec.
//!
//! A [`DocumentCodec`] turns a finished [`DocumentTree`] into package bytes
//! and reads packages back into a text-level [`DocumentOutline`]. The default
//! implementation, [`DocxCodec`], writes WordprocessingML (`.docx`).

mod reader;
mod writer;

use serde::Serialize;

use crate::error::PackageError;
use crate::tree::{Block, DocumentTree};

pub use reader::read_outline;
pub use writer::write_package;

/// Encodes document trees into package bytes and decodes them back.
pub trait DocumentCodec: Send + Sync {
    /// Short name used in logs, e.g. `"docx"`.
    fn name(&self) -> &'static str;

    /// Serialize a tree. Fails with [`PackageError::Incomplete`] when the
    /// tree cannot form a valid package.
    fn encode(&self, tree: &DocumentTree) -> Result<Vec<u8>, PackageError>;

    /// Read a package back into its outline.
    fn decode(&self, bytes: &[u8]) -> Result<DocumentOutline, PackageError>;
}

/// Office Open XML WordprocessingML codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxCodec;

impl DocumentCodec for DocxCodec {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn encode(&self, tree: &DocumentTree) -> Result<Vec<u8>, PackageError> {
        validate(tree)?;
        write_package(tree)
    }

    fn decode(&self, bytes: &[u8]) -> Result<DocumentOutline, PackageError> {
        read_outline(bytes)
    }
}

/// Reject trees that are well-typed but would produce a broken package.
pub fn validate(tree: &DocumentTree) -> Result<(), PackageError> {
    if tree.sections.is_empty() {
        return Err(PackageError::Incomplete(
            "the document has no sections; add at least one paragraph or table".into(),
        ));
    }
    for (t, table) in tree
        .blocks()
        .filter_map(|b| match b {
            Block::Table(t) => Some(t),
            Block::Paragraph(_) => None,
        })
        .enumerate()
    {
        let cols = table.column_count();
        if table.rows.is_empty() {
            return Err(PackageError::Incomplete(format!(
                "table {t} has no rows; call table.add_row() before saving"
            )));
        }
        if cols == 0 {
            return Err(PackageError::Incomplete(format!("table {t} has no columns")));
        }
        for (r, row) in table.rows.iter().enumerate() {
            if row.cells.len() != cols {
                return Err(PackageError::Incomplete(format!(
                    "table {t} row {r} has {} cells but the table has {cols} columns",
                    row.cells.len()
                )));
            }
            if let Some(c) = row.cells.iter().position(|c| c.paragraphs.is_empty()) {
                return Err(PackageError::Incomplete(format!(
                    "table {t} cell ({r}, {c}) has no paragraphs"
                )));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Outline
// ---------------------------------------------------------------------------

/// Text-level view of a decoded package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentOutline {
    pub title: Option<String>,
    pub author: Option<String>,
    pub sections: Vec<SectionOutline>,
}

impl DocumentOutline {
    pub fn paragraphs(&self) -> impl Iterator<Item = &ParagraphOutline> {
        self.sections
            .iter()
            .flat_map(|s| s.blocks.iter())
            .filter_map(|b| match b {
                BlockOutline::Paragraph(p) => Some(p),
                BlockOutline::Table(_) => None,
            })
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableOutline> {
        self.sections
            .iter()
            .flat_map(|s| s.blocks.iter())
            .filter_map(|b| match b {
                BlockOutline::Table(t) => Some(t),
                BlockOutline::Paragraph(_) => None,
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SectionOutline {
    pub orientation: String,
    pub blocks: Vec<BlockOutline>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockOutline {
    Paragraph(ParagraphOutline),
    Table(TableOutline),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParagraphOutline {
    pub style: Option<String>,
    /// Text of each run, tabs as `\t` and line breaks as `\n`.
    pub runs: Vec<String>,
    pub page_break: bool,
}

impl ParagraphOutline {
    pub fn text(&self) -> String {
        self.runs.concat()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableOutline {
    pub style: Option<String>,
    /// Cell texts, row by row.
    pub rows: Vec<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Cell, Paragraph, Row, Section, Table};

    fn tree_with(blocks: Vec<Block>) -> DocumentTree {
        DocumentTree {
            sections: vec![Section {
                blocks,
                ..Section::default()
            }],
            ..DocumentTree::default()
        }
    }

    #[test]
    fn zero_sections_is_incomplete() {
        let err = DocxCodec.encode(&DocumentTree::default()).unwrap_err();
        assert!(matches!(err, PackageError::Incomplete(_)));
        assert!(err.to_string().contains("no sections"));
    }

    #[test]
    fn table_without_rows_is_incomplete() {
        let tree = tree_with(vec![Block::Table(Table {
            column_widths: vec![None; 2],
            ..Table::default()
        })]);
        let err = validate(&tree).unwrap_err();
        assert!(err.to_string().contains("no rows"));
    }

    #[test]
    fn cell_without_paragraph_is_incomplete() {
        let tree = tree_with(vec![Block::Table(Table {
            column_widths: vec![None],
            rows: vec![Row {
                height: None,
                cells: vec![Cell::default()],
            }],
            ..Table::default()
        })]);
        let err = validate(&tree).unwrap_err();
        assert!(err.to_string().contains("(0, 0)"));
    }

    #[test]
    fn ragged_row_is_incomplete() {
        let cell = Cell {
            width: None,
            paragraphs: vec![Paragraph::default()],
        };
        let tree = tree_with(vec![Block::Table(Table {
            column_widths: vec![None; 2],
            rows: vec![Row {
                height: None,
                cells: vec![cell],
            }],
            ..Table::default()
        })]);
        assert!(validate(&tree).is_err());
    }

    #[test]
    fn outline_serializes_with_block_tags() {
        let outline = DocumentOutline {
            title: None,
            author: None,
            sections: vec![SectionOutline {
                orientation: "portrait".into(),
                blocks: vec![BlockOutline::Paragraph(ParagraphOutline {
                    style: Some("Normal".into()),
                    runs: vec!["Hi".into()],
                    page_break: false,
                })],
            }],
        };
        let json = serde_json::to_value(&outline).unwrap();
        assert_eq!(json["sections"][0]["blocks"][0]["type"], "paragraph");
        assert_eq!(outline.paragraphs().count(), 1);
        assert_eq!(outline.tables().count(), 0);
    }
}
