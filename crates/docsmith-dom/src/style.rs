//! Validated formatting vocabulary.
//!
//! Everything in this module is immutable, process-wide data: the style
//! catalog and the keyword enumerations scripts may choose from. It is the
//! only state shared between concurrent executions and is read without
//! locking.

use serde::{Deserialize, Serialize};

use crate::error::{DomError, Result, quoted};
use crate::units::Length;

// ---------------------------------------------------------------------------
// Keyword enumerations
// ---------------------------------------------------------------------------

/// Horizontal alignment of a paragraph or table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
    Distribute,
}

impl Alignment {
    pub const ALL: [Alignment; 5] = [
        Self::Left,
        Self::Center,
        Self::Right,
        Self::Justify,
        Self::Distribute,
    ];

    /// Parse a keyword such as `"center"`; matching ignores ASCII case.
    pub fn from_keyword(operation: &str, keyword: &str) -> Result<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "center" | "centre" => Ok(Self::Center),
            "right" => Ok(Self::Right),
            "justify" => Ok(Self::Justify),
            "distribute" => Ok(Self::Distribute),
            _ => Err(DomError::InvalidValue {
                operation: operation.to_string(),
                value: quoted(keyword),
                expected: "one of left, center, right, justify, distribute".into(),
            }),
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justify => "justify",
            Self::Distribute => "distribute",
        }
    }

    /// Value of the `w:jc` element.
    pub fn ooxml(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Center => "center",
            Self::Right => "right",
            Self::Justify => "both",
            Self::Distribute => "distribute",
        }
    }

    /// Tables only align left, center or right.
    pub fn is_table_alignment(self) -> bool {
        matches!(self, Self::Left | Self::Center | Self::Right)
    }
}

/// Page orientation of a section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn ooxml(self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
        }
    }
}

/// How a section begins relative to the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStart {
    Continuous,
    NewColumn,
    #[default]
    NewPage,
    EvenPage,
    OddPage,
}

impl SectionStart {
    pub fn ooxml(self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::NewColumn => "nextColumn",
            Self::NewPage => "nextPage",
            Self::EvenPage => "evenPage",
            Self::OddPage => "oddPage",
        }
    }
}

/// Break inserted into a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    Line,
    Page,
    Column,
}

/// Paragraph line spacing: a multiple of single spacing, or an exact height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineSpacing {
    Multiple(f64),
    Exact(Length),
}

// ---------------------------------------------------------------------------
// Style catalog
// ---------------------------------------------------------------------------

/// Whether a catalog entry styles paragraphs or tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleKind {
    Paragraph,
    Table,
}

/// One entry of the built-in style catalog.
#[derive(Debug)]
pub struct StyleDef {
    pub name: &'static str,
    pub kind: StyleKind,
    pub based_on: Option<&'static str>,
    pub bold: bool,
    pub italic: bool,
    /// Font size in half points.
    pub size: Option<u32>,
    /// Hex color.
    pub color: Option<&'static str>,
    /// Table styles only: draw cell borders.
    pub borders: bool,
}

const fn paragraph(
    name: &'static str,
    bold: bool,
    italic: bool,
    size: Option<u32>,
    color: Option<&'static str>,
) -> StyleDef {
    StyleDef {
        name,
        kind: StyleKind::Paragraph,
        based_on: Some("Normal"),
        bold,
        italic,
        size,
        color,
        borders: false,
    }
}

const fn table(name: &'static str, borders: bool) -> StyleDef {
    StyleDef {
        name,
        kind: StyleKind::Table,
        based_on: Some("Normal Table"),
        bold: false,
        italic: false,
        size: None,
        color: None,
        borders,
    }
}

const HEADING_BLUE: Option<&str> = Some("2F5496");

/// Paragraph styles scripts may name.
pub static PARAGRAPH_STYLES: &[StyleDef] = &[
    StyleDef {
        name: "Normal",
        kind: StyleKind::Paragraph,
        based_on: None,
        bold: false,
        italic: false,
        size: None,
        color: None,
        borders: false,
    },
    paragraph("Title", false, false, Some(56), None),
    paragraph("Subtitle", false, true, Some(30), Some("5A5A5A")),
    paragraph("Heading 1", true, false, Some(32), HEADING_BLUE),
    paragraph("Heading 2", true, false, Some(26), HEADING_BLUE),
    paragraph("Heading 3", true, false, Some(24), HEADING_BLUE),
    paragraph("Heading 4", true, true, Some(22), HEADING_BLUE),
    paragraph("Heading 5", false, false, Some(22), HEADING_BLUE),
    paragraph("Heading 6", false, true, Some(22), HEADING_BLUE),
    paragraph("Heading 7", false, true, Some(22), None),
    paragraph("Heading 8", false, false, Some(21), None),
    paragraph("Heading 9", false, true, Some(21), None),
    paragraph("List Bullet", false, false, None, None),
    paragraph("List Number", false, false, None, None),
    paragraph("List Paragraph", false, false, None, None),
    paragraph("Quote", false, true, None, Some("404040")),
    paragraph("Intense Quote", true, true, None, HEADING_BLUE),
    paragraph("Caption", false, true, Some(18), None),
    paragraph("No Spacing", false, false, None, None),
    paragraph("Body Text", false, false, None, None),
];

/// Table styles scripts may name.
pub static TABLE_STYLES: &[StyleDef] = &[
    StyleDef {
        name: "Normal Table",
        kind: StyleKind::Table,
        based_on: None,
        bold: false,
        italic: false,
        size: None,
        color: None,
        borders: false,
    },
    table("Table Grid", true),
    table("Light Shading", false),
    table("Light Shading Accent 1", false),
    table("Light List", true),
    table("Light List Accent 1", true),
    table("Light Grid", true),
    table("Light Grid Accent 1", true),
    table("Medium Shading 1", true),
    table("Medium Shading 1 Accent 1", true),
    table("Medium Grid 1 Accent 1", true),
];

/// Identifier of a style inside the package: its name without spaces.
pub fn style_id(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

fn lookup(
    catalog: &'static [StyleDef],
    operation: &str,
    name: &str,
) -> Result<&'static StyleDef> {
    catalog
        .iter()
        .find(|def| def.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| DomError::InvalidValue {
            operation: operation.to_string(),
            value: quoted(name),
            expected: format!(
                "one of: {}",
                catalog
                    .iter()
                    .map(|def| def.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
}

/// A paragraph style from [`PARAGRAPH_STYLES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParagraphStyle(&'static str);

impl ParagraphStyle {
    /// Resolve a catalog name, ignoring ASCII case.
    pub fn named(operation: &str, name: &str) -> Result<Self> {
        lookup(PARAGRAPH_STYLES, operation, name).map(|def| Self(def.name))
    }

    /// Style used by `add_heading`: level 0 is `Title`, 1 through 9 are
    /// `Heading n`.
    pub fn heading(level: i64) -> Result<Self> {
        match level {
            0 => Ok(Self("Title")),
            1..=9 => {
                let name = format!("Heading {level}");
                lookup(PARAGRAPH_STYLES, "add_heading()", &name).map(|def| Self(def.name))
            }
            _ => Err(DomError::InvalidValue {
                operation: "add_heading()".into(),
                value: format!("level={level}"),
                expected: "a heading level between 0 and 9".into(),
            }),
        }
    }

    /// Map a package style id back to its catalog entry.
    pub fn from_style_id(id: &str) -> Option<Self> {
        PARAGRAPH_STYLES
            .iter()
            .find(|def| style_id(def.name) == id)
            .map(|def| Self(def.name))
    }

    pub fn name(self) -> &'static str {
        self.0
    }

    pub fn style_id(self) -> String {
        style_id(self.0)
    }
}

/// A table style from [`TABLE_STYLES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableStyle(&'static str);

impl TableStyle {
    pub fn named(operation: &str, name: &str) -> Result<Self> {
        lookup(TABLE_STYLES, operation, name).map(|def| Self(def.name))
    }

    pub fn from_style_id(id: &str) -> Option<Self> {
        TABLE_STYLES
            .iter()
            .find(|def| style_id(def.name) == id)
            .map(|def| Self(def.name))
    }

    pub fn name(self) -> &'static str {
        self.0
    }

    pub fn style_id(self) -> String {
        style_id(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_keywords() {
        assert_eq!(
            Alignment::from_keyword("p.alignment", "CENTRE").unwrap(),
            Alignment::Center
        );
        assert_eq!(Alignment::Justify.ooxml(), "both");
        let err = Alignment::from_keyword("p.alignment", "middle").unwrap_err();
        assert!(err.to_string().contains("'middle'"));
    }

    #[test]
    fn style_lookup_is_case_insensitive_and_canonical() {
        let style = ParagraphStyle::named("style", "heading 2").unwrap();
        assert_eq!(style.name(), "Heading 2");
        assert_eq!(style.style_id(), "Heading2");
        assert_eq!(ParagraphStyle::from_style_id("Heading2"), Some(style));
    }

    #[test]
    fn unknown_style_lists_choices() {
        let err = ParagraphStyle::named("add_paragraph()", "Fancy").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("'Fancy'"));
        assert!(text.contains("List Bullet"));
    }

    #[test]
    fn heading_levels() {
        assert_eq!(ParagraphStyle::heading(0).unwrap().name(), "Title");
        assert_eq!(ParagraphStyle::heading(9).unwrap().name(), "Heading 9");
        assert!(ParagraphStyle::heading(10).is_err());
        assert!(ParagraphStyle::heading(-1).is_err());
    }

    #[test]
    fn table_styles() {
        assert_eq!(
            TableStyle::named("table.style", "table grid").unwrap().style_id(),
            "TableGrid"
        );
        assert!(TableStyle::named("table.style", "Heading 1").is_err());
    }

    #[test]
    fn catalog_ids_are_unique() {
        let mut ids: Vec<String> = PARAGRAPH_STYLES
            .iter()
            .chain(TABLE_STYLES)
            .map(|d| style_id(d.name))
            .collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total);
    }
}
