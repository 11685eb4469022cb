//! The invariant-enforcing document builder.
//!
//! [`DocumentBuilder`] is the single mutable object a script works against.
//! Nodes live in per-kind arenas and are addressed by small copyable ids, so
//! handles held by the script never alias mutable state. Every operation
//! validates its preconditions first and only then mutates; a rejected call
//! leaves the builder exactly as it was.
//!
//! Index lookups resolve against the *materialized* shape of the tree: a row
//! exists only once it has been appended, a cell only once its row exists
//! with that column populated. Negative indices count from the end but must
//! still land on an existing element.

use crate::error::{DomError, Result, quoted};
use crate::style::{
    Alignment, BreakKind, LineSpacing, Orientation, ParagraphStyle, SectionStart, TableStyle,
};
use crate::tree::{
    Block, Cell, CoreProperties, DocumentTree, PageSetup, Paragraph, ParagraphFormat, Row, Run,
    RunContent, RunFormat, Section, Table,
};
use crate::units::{Color, Length, MAX_LENGTH_EMU};

/// Largest column count a table may have.
pub const MAX_TABLE_COLUMNS: usize = 63;

const MIN_FONT_SIZE: Length = Length::whole_points(1);
const MAX_FONT_SIZE: Length = Length::whole_points(1584);
const MAX_SPACING: Length = Length::whole_points(1584);
const MAX_FONT_NAME_CHARS: usize = 64;
const MIN_LINE_MULTIPLE: f64 = 0.25;
const MAX_LINE_MULTIPLE: f64 = 10.0;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

macro_rules! node_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

node_id!(
    /// A section of the document.
    SectionId
);
node_id!(
    /// A paragraph, either in the body or inside a cell.
    ParagraphId
);
node_id!(RunId);
node_id!(TableId);
node_id!(CellId);

/// A materialized row of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowRef {
    pub table: TableId,
    pub index: usize,
}

/// A materialized column of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub table: TableId,
    pub index: usize,
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// One paragraph-format property assignment. `None` clears the direct
/// formatting so the style's value applies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParagraphSetting {
    Alignment(Option<Alignment>),
    SpaceBefore(Option<Length>),
    SpaceAfter(Option<Length>),
    LineSpacing(Option<LineSpacing>),
    LeftIndent(Option<Length>),
    RightIndent(Option<Length>),
    FirstLineIndent(Option<Length>),
    KeepWithNext(Option<bool>),
    PageBreakBefore(Option<bool>),
}

/// One character-format property assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum RunSetting {
    Bold(Option<bool>),
    Italic(Option<bool>),
    Underline(Option<bool>),
    Strike(Option<bool>),
    FontName(Option<String>),
    Size(Option<Length>),
    Color(Option<Color>),
}

/// One page-setup property assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSetting {
    Start(SectionStart),
    Orientation(Orientation),
    PageWidth(Length),
    PageHeight(Length),
    TopMargin(Length),
    RightMargin(Length),
    BottomMargin(Length),
    LeftMargin(Length),
}

/// Core document properties a script can set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreProperty {
    Title,
    Author,
    Subject,
    Keywords,
    Comments,
    Category,
}

impl CoreProperty {
    pub const ALL: [CoreProperty; 6] = [
        Self::Title,
        Self::Author,
        Self::Subject,
        Self::Keywords,
        Self::Comments,
        Self::Category,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Author => "author",
            Self::Subject => "subject",
            Self::Keywords => "keywords",
            Self::Comments => "comments",
            Self::Category => "category",
        }
    }

    fn slot(self, properties: &mut CoreProperties) -> &mut Option<String> {
        match self {
            Self::Title => &mut properties.title,
            Self::Author => &mut properties.author,
            Self::Subject => &mut properties.subject,
            Self::Keywords => &mut properties.keywords,
            Self::Comments => &mut properties.comments,
            Self::Category => &mut properties.category,
        }
    }
}

// ---------------------------------------------------------------------------
// Arena nodes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum BlockRef {
    Paragraph(ParagraphId),
    Table(TableId),
}

#[derive(Debug, Default)]
struct SectionNode {
    setup: PageSetup,
    blocks: Vec<BlockRef>,
}

#[derive(Debug, Default)]
struct ParagraphNode {
    style: Option<ParagraphStyle>,
    format: ParagraphFormat,
    runs: Vec<RunId>,
}

#[derive(Debug, Default)]
struct RunNode {
    format: RunFormat,
    content: Vec<RunContent>,
}

#[derive(Debug, Default)]
struct TableNode {
    style: Option<TableStyle>,
    alignment: Option<Alignment>,
    autofit: bool,
    column_widths: Vec<Option<Length>>,
    rows: Vec<RowNode>,
}

#[derive(Debug, Default)]
struct RowNode {
    height: Option<Length>,
    cells: Vec<CellId>,
}

#[derive(Debug, Default)]
struct CellNode {
    width: Option<Length>,
    paragraphs: Vec<ParagraphId>,
}

// ---------------------------------------------------------------------------
// DocumentBuilder
// ---------------------------------------------------------------------------

/// Accumulates exactly one document tree for one execution.
#[derive(Debug)]
pub struct DocumentBuilder {
    max_objects: usize,
    objects: usize,
    opened: bool,
    finalized: bool,
    properties: CoreProperties,
    sections: Vec<SectionNode>,
    paragraphs: Vec<ParagraphNode>,
    runs: Vec<RunNode>,
    tables: Vec<TableNode>,
    cells: Vec<CellNode>,
}

impl DocumentBuilder {
    /// Create an empty builder that allows at most `max_objects` document
    /// objects (document, sections, paragraphs, runs, tables, rows, cells).
    pub fn new(max_objects: usize) -> Self {
        Self {
            max_objects,
            objects: 0,
            opened: false,
            finalized: false,
            properties: CoreProperties::default(),
            sections: Vec::new(),
            paragraphs: Vec::new(),
            runs: Vec::new(),
            tables: Vec::new(),
            cells: Vec::new(),
        }
    }

    /// Number of objects created so far.
    pub fn object_count(&self) -> usize {
        self.objects
    }

    pub fn max_objects(&self) -> usize {
        self.max_objects
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    // -- lifecycle ----------------------------------------------------------

    /// Create the document root. Only one document may exist per builder.
    pub fn open_document(&mut self) -> Result<()> {
        if self.finalized {
            return Err(finalized("Document()"));
        }
        if self.opened {
            return Err(DomError::DuplicateDocument);
        }
        self.reserve("Document()", 1)?;
        self.opened = true;
        tracing::trace!("document opened");
        Ok(())
    }

    /// Hand over the finished tree. The builder is inert afterwards.
    pub fn finalize(&mut self) -> Result<DocumentTree> {
        if self.finalized {
            return Err(finalized("finalize()"));
        }
        self.finalized = true;
        if !self.opened {
            return Err(DomError::NoDocument);
        }

        let sections = std::mem::take(&mut self.sections);
        let mut tree = DocumentTree {
            properties: std::mem::take(&mut self.properties),
            sections: Vec::with_capacity(sections.len()),
        };
        for node in sections {
            let mut blocks = Vec::with_capacity(node.blocks.len());
            for block in node.blocks {
                blocks.push(match block {
                    BlockRef::Paragraph(id) => Block::Paragraph(self.take_paragraph(id)?),
                    BlockRef::Table(id) => Block::Table(self.take_table(id)?),
                });
            }
            tree.sections.push(Section {
                setup: node.setup,
                blocks,
            });
        }
        self.paragraphs.clear();
        self.runs.clear();
        self.tables.clear();
        self.cells.clear();
        tracing::debug!(
            objects = self.objects,
            sections = tree.sections.len(),
            "document finalized"
        );
        Ok(tree)
    }

    fn take_paragraph(&mut self, id: ParagraphId) -> Result<Paragraph> {
        let node = std::mem::take(self.paragraph_node_mut(id)?);
        let mut runs = Vec::with_capacity(node.runs.len());
        for run in node.runs {
            let run = std::mem::take(self.run_node_mut(run)?);
            runs.push(Run {
                format: run.format,
                content: run.content,
            });
        }
        Ok(Paragraph {
            style: node.style,
            format: node.format,
            runs,
        })
    }

    fn take_table(&mut self, id: TableId) -> Result<Table> {
        let node = std::mem::take(self.table_node_mut(id)?);
        let mut rows = Vec::with_capacity(node.rows.len());
        for row in node.rows {
            let mut cells = Vec::with_capacity(row.cells.len());
            for cell in row.cells {
                let cell = std::mem::take(self.cell_node_mut(cell)?);
                let mut paragraphs = Vec::with_capacity(cell.paragraphs.len());
                for paragraph in cell.paragraphs {
                    paragraphs.push(self.take_paragraph(paragraph)?);
                }
                cells.push(Cell {
                    width: cell.width,
                    paragraphs,
                });
            }
            rows.push(Row {
                height: row.height,
                cells,
            });
        }
        Ok(Table {
            style: node.style,
            alignment: node.alignment,
            autofit: node.autofit,
            column_widths: node.column_widths,
            rows,
        })
    }

    // -- document level -----------------------------------------------------

    /// Append a body paragraph to the last section.
    pub fn add_paragraph(&mut self, text: &str, style: Option<ParagraphStyle>) -> Result<ParagraphId> {
        const OP: &str = "doc.add_paragraph()";
        self.ensure_open(OP)?;
        let content = parse_text(OP, text)?;
        self.reserve(OP, 1 + self.section_cost() + usize::from(!content.is_empty()))?;
        let paragraph = self.new_paragraph(style, content);
        self.push_block(BlockRef::Paragraph(paragraph));
        Ok(paragraph)
    }

    /// Append a heading; level 0 is the title, 1 through 9 are headings.
    pub fn add_heading(&mut self, text: &str, level: i64) -> Result<ParagraphId> {
        const OP: &str = "doc.add_heading()";
        self.ensure_open(OP)?;
        let style = ParagraphStyle::heading(level)?;
        let content = parse_text(OP, text)?;
        self.reserve(OP, 1 + self.section_cost() + usize::from(!content.is_empty()))?;
        let paragraph = self.new_paragraph(Some(style), content);
        self.push_block(BlockRef::Paragraph(paragraph));
        Ok(paragraph)
    }

    /// Append a paragraph holding a single page break.
    pub fn add_page_break(&mut self) -> Result<ParagraphId> {
        const OP: &str = "doc.add_page_break()";
        self.ensure_open(OP)?;
        self.reserve(OP, 2 + self.section_cost())?;
        let paragraph = self.new_paragraph(None, vec![RunContent::Break(BreakKind::Page)]);
        self.push_block(BlockRef::Paragraph(paragraph));
        Ok(paragraph)
    }

    /// Append a table with `rows` materialized rows of `cols` cells, each
    /// cell holding one empty paragraph.
    pub fn add_table(&mut self, rows: i64, cols: i64) -> Result<TableId> {
        const OP: &str = "doc.add_table()";
        self.ensure_open(OP)?;
        let rows = usize::try_from(rows).map_err(|_| DomError::InvalidValue {
            operation: OP.into(),
            value: format!("rows={rows}"),
            expected: "a row count of 0 or more".into(),
        })?;
        let cols = usize::try_from(cols)
            .ok()
            .filter(|c| (1..=MAX_TABLE_COLUMNS).contains(c))
            .ok_or_else(|| DomError::InvalidValue {
                operation: OP.into(),
                value: format!("cols={cols}"),
                expected: format!("a column count between 1 and {MAX_TABLE_COLUMNS}"),
            })?;
        // Table, then per row: the row plus a cell and a paragraph per column.
        let cost = rows
            .checked_mul(1 + 2 * cols)
            .and_then(|c| c.checked_add(1 + self.section_cost()))
            .unwrap_or(usize::MAX);
        self.reserve(OP, cost)?;

        let table = TableId(self.tables.len());
        self.tables.push(TableNode {
            autofit: true,
            column_widths: vec![None; cols],
            ..TableNode::default()
        });
        for _ in 0..rows {
            let row = self.new_row(cols);
            self.tables[table.0].rows.push(row);
        }
        self.push_block(BlockRef::Table(table));
        tracing::trace!(rows, cols, "table added");
        Ok(table)
    }

    /// Start a new section; subsequent body content goes into it.
    pub fn add_section(&mut self, start: SectionStart) -> Result<SectionId> {
        const OP: &str = "doc.add_section()";
        self.ensure_open(OP)?;
        self.reserve(OP, 1 + self.section_cost())?;
        self.ensure_section();
        let setup = PageSetup {
            start,
            ..self.sections.last().map(|s| s.setup).unwrap_or_default()
        };
        self.sections.push(SectionNode {
            setup,
            blocks: Vec::new(),
        });
        Ok(SectionId(self.sections.len() - 1))
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// `doc.sections[index]`. Touching the section list opens the first
    /// section, as any body content would.
    pub fn section_at(&mut self, index: i64) -> Result<SectionId> {
        let operation = format!("doc.sections[{index}]");
        self.ensure_open(&operation)?;
        if self.sections.is_empty() {
            self.reserve(&operation, 1)?;
            self.ensure_section();
        }
        resolve(index, self.sections.len())
            .map(SectionId)
            .ok_or_else(|| out_of_range(operation, "section", index, self.sections.len(), "document", ""))
    }

    /// Body paragraphs across all sections, in document order.
    pub fn body_paragraphs(&self) -> Vec<ParagraphId> {
        self.sections
            .iter()
            .flat_map(|s| s.blocks.iter())
            .filter_map(|b| match b {
                BlockRef::Paragraph(id) => Some(*id),
                BlockRef::Table(_) => None,
            })
            .collect()
    }

    /// Body tables across all sections, in document order.
    pub fn body_tables(&self) -> Vec<TableId> {
        self.sections
            .iter()
            .flat_map(|s| s.blocks.iter())
            .filter_map(|b| match b {
                BlockRef::Table(id) => Some(*id),
                BlockRef::Paragraph(_) => None,
            })
            .collect()
    }

    pub fn body_paragraph_at(&self, index: i64) -> Result<ParagraphId> {
        let all = self.body_paragraphs();
        resolve(index, all.len())
            .map(|i| all[i])
            .ok_or_else(|| {
                out_of_range(
                    format!("doc.paragraphs[{index}]"),
                    "paragraph",
                    index,
                    all.len(),
                    "document",
                    "",
                )
            })
    }

    pub fn body_table_at(&self, index: i64) -> Result<TableId> {
        let all = self.body_tables();
        resolve(index, all.len())
            .map(|i| all[i])
            .ok_or_else(|| {
                out_of_range(
                    format!("doc.tables[{index}]"),
                    "table",
                    index,
                    all.len(),
                    "document",
                    "; call doc.add_table() first",
                )
            })
    }

    pub fn property(&self, property: CoreProperty) -> Option<&str> {
        let properties = &self.properties;
        match property {
            CoreProperty::Title => properties.title.as_deref(),
            CoreProperty::Author => properties.author.as_deref(),
            CoreProperty::Subject => properties.subject.as_deref(),
            CoreProperty::Keywords => properties.keywords.as_deref(),
            CoreProperty::Comments => properties.comments.as_deref(),
            CoreProperty::Category => properties.category.as_deref(),
        }
    }

    pub fn set_property(&mut self, property: CoreProperty, value: &str) -> Result<()> {
        let operation = format!("core_properties.{}", property.name());
        self.ensure_open(&operation)?;
        check_plain_text(&operation, value)?;
        *property.slot(&mut self.properties) = Some(value.to_string());
        Ok(())
    }

    // -- sections -----------------------------------------------------------

    pub fn page_setup(&self, section: SectionId) -> Result<&PageSetup> {
        self.sections
            .get(section.0)
            .map(|s| &s.setup)
            .ok_or(unknown("section", section.0))
    }

    pub fn update_page_setup(&mut self, section: SectionId, setting: PageSetting) -> Result<()> {
        let operation = format!("section.{}", page_setting_name(&setting));
        self.ensure_open(&operation)?;
        match setting {
            PageSetting::PageWidth(v) | PageSetting::PageHeight(v) => {
                check_length(&operation, v, Length::raw(1), max_length(), "a length above 0 and at most 22 inches")?;
            }
            PageSetting::TopMargin(v)
            | PageSetting::RightMargin(v)
            | PageSetting::BottomMargin(v)
            | PageSetting::LeftMargin(v) => {
                check_length(&operation, v, Length::ZERO, max_length(), "a margin between 0 and 22 inches")?;
            }
            PageSetting::Start(_) | PageSetting::Orientation(_) => {}
        }
        let setup = &mut self
            .sections
            .get_mut(section.0)
            .ok_or(unknown("section", section.0))?
            .setup;
        match setting {
            PageSetting::Start(v) => setup.start = v,
            PageSetting::Orientation(v) => setup.orientation = v,
            PageSetting::PageWidth(v) => setup.page_width = v,
            PageSetting::PageHeight(v) => setup.page_height = v,
            PageSetting::TopMargin(v) => setup.top_margin = v,
            PageSetting::RightMargin(v) => setup.right_margin = v,
            PageSetting::BottomMargin(v) => setup.bottom_margin = v,
            PageSetting::LeftMargin(v) => setup.left_margin = v,
        }
        Ok(())
    }

    // -- paragraphs ---------------------------------------------------------

    pub fn paragraph_text(&self, paragraph: ParagraphId) -> Result<String> {
        let node = self.paragraph_node(paragraph)?;
        let mut text = String::new();
        for run in &node.runs {
            text.push_str(&self.run_text(*run)?);
        }
        Ok(text)
    }

    /// Replace the paragraph's runs with a single run holding `text`.
    pub fn set_paragraph_text(&mut self, paragraph: ParagraphId, text: &str) -> Result<()> {
        const OP: &str = "paragraph.text";
        self.ensure_open(OP)?;
        let content = parse_text(OP, text)?;
        self.paragraph_node(paragraph)?;
        self.reserve(OP, 1)?;
        let run = self.new_run(content);
        self.paragraph_node_mut(paragraph)?.runs = vec![run];
        Ok(())
    }

    /// Remove every run, keeping paragraph formatting.
    pub fn clear_paragraph(&mut self, paragraph: ParagraphId) -> Result<()> {
        self.ensure_open("paragraph.clear()")?;
        self.paragraph_node_mut(paragraph)?.runs.clear();
        Ok(())
    }

    pub fn paragraph_style(&self, paragraph: ParagraphId) -> Result<Option<ParagraphStyle>> {
        Ok(self.paragraph_node(paragraph)?.style)
    }

    pub fn set_paragraph_style(
        &mut self,
        paragraph: ParagraphId,
        style: Option<ParagraphStyle>,
    ) -> Result<()> {
        self.ensure_open("paragraph.style")?;
        self.paragraph_node_mut(paragraph)?.style = style;
        Ok(())
    }

    pub fn paragraph_format(&self, paragraph: ParagraphId) -> Result<&ParagraphFormat> {
        Ok(&self.paragraph_node(paragraph)?.format)
    }

    pub fn update_paragraph_format(
        &mut self,
        paragraph: ParagraphId,
        setting: ParagraphSetting,
    ) -> Result<()> {
        let operation = format!("paragraph_format.{}", paragraph_setting_name(&setting));
        self.ensure_open(&operation)?;
        match setting {
            ParagraphSetting::SpaceBefore(Some(v)) | ParagraphSetting::SpaceAfter(Some(v)) => {
                check_length(&operation, v, Length::ZERO, MAX_SPACING, "spacing between 0 and 1584pt")?;
            }
            ParagraphSetting::LineSpacing(Some(LineSpacing::Exact(v))) => {
                check_length(&operation, v, Length::raw(1), MAX_SPACING, "an exact line height above 0 and at most 1584pt")?;
            }
            ParagraphSetting::LineSpacing(Some(LineSpacing::Multiple(m))) => {
                if !(MIN_LINE_MULTIPLE..=MAX_LINE_MULTIPLE).contains(&m) {
                    return Err(DomError::InvalidValue {
                        operation,
                        value: crate::units::format_number(m),
                        expected: "a line spacing multiple between 0.25 and 10".into(),
                    });
                }
            }
            _ => {}
        }
        let format = &mut self.paragraph_node_mut(paragraph)?.format;
        match setting {
            ParagraphSetting::Alignment(v) => format.alignment = v,
            ParagraphSetting::SpaceBefore(v) => format.space_before = v,
            ParagraphSetting::SpaceAfter(v) => format.space_after = v,
            ParagraphSetting::LineSpacing(v) => format.line_spacing = v,
            ParagraphSetting::LeftIndent(v) => format.left_indent = v,
            ParagraphSetting::RightIndent(v) => format.right_indent = v,
            ParagraphSetting::FirstLineIndent(v) => format.first_line_indent = v,
            ParagraphSetting::KeepWithNext(v) => format.keep_with_next = v,
            ParagraphSetting::PageBreakBefore(v) => format.page_break_before = v,
        }
        Ok(())
    }

    // -- runs ---------------------------------------------------------------

    /// Append a run to an existing paragraph.
    pub fn add_run(&mut self, paragraph: ParagraphId, text: &str) -> Result<RunId> {
        const OP: &str = "paragraph.add_run()";
        self.ensure_open(OP)?;
        let content = parse_text(OP, text)?;
        self.paragraph_node(paragraph)?;
        self.reserve(OP, 1)?;
        let run = self.new_run(content);
        self.paragraph_node_mut(paragraph)?.runs.push(run);
        Ok(run)
    }

    pub fn run_count(&self, paragraph: ParagraphId) -> Result<usize> {
        Ok(self.paragraph_node(paragraph)?.runs.len())
    }

    /// `paragraph.runs[index]`.
    pub fn run_at(&self, paragraph: ParagraphId, index: i64) -> Result<RunId> {
        let runs = &self.paragraph_node(paragraph)?.runs;
        resolve(index, runs.len()).map(|i| runs[i]).ok_or_else(|| {
            out_of_range(
                format!("paragraph.runs[{index}]"),
                "run",
                index,
                runs.len(),
                "paragraph",
                "; call paragraph.add_run() first",
            )
        })
    }

    pub fn run_text(&self, run: RunId) -> Result<String> {
        let node = self.run_node(run)?;
        Ok(Run {
            format: RunFormat::default(),
            content: node.content.clone(),
        }
        .text())
    }

    pub fn set_run_text(&mut self, run: RunId, text: &str) -> Result<()> {
        const OP: &str = "run.text";
        self.ensure_open(OP)?;
        let content = parse_text(OP, text)?;
        self.run_node_mut(run)?.content = content;
        Ok(())
    }

    pub fn add_run_text(&mut self, run: RunId, text: &str) -> Result<()> {
        const OP: &str = "run.add_text()";
        self.ensure_open(OP)?;
        let content = parse_text(OP, text)?;
        self.run_node_mut(run)?.content.extend(content);
        Ok(())
    }

    pub fn add_break(&mut self, run: RunId, kind: BreakKind) -> Result<()> {
        self.ensure_open("run.add_break()")?;
        self.run_node_mut(run)?.content.push(RunContent::Break(kind));
        Ok(())
    }

    pub fn add_tab(&mut self, run: RunId) -> Result<()> {
        self.ensure_open("run.add_tab()")?;
        self.run_node_mut(run)?.content.push(RunContent::Tab);
        Ok(())
    }

    pub fn run_format(&self, run: RunId) -> Result<&RunFormat> {
        Ok(&self.run_node(run)?.format)
    }

    pub fn update_run_format(&mut self, run: RunId, setting: RunSetting) -> Result<()> {
        let operation = format!("font.{}", run_setting_name(&setting));
        self.ensure_open(&operation)?;
        match &setting {
            RunSetting::Size(Some(v)) => {
                check_length(&operation, *v, MIN_FONT_SIZE, MAX_FONT_SIZE, "a font size between 1pt and 1584pt")?;
            }
            RunSetting::FontName(Some(name)) => check_font_name(&operation, name)?,
            _ => {}
        }
        let format = &mut self.run_node_mut(run)?.format;
        match setting {
            RunSetting::Bold(v) => format.bold = v,
            RunSetting::Italic(v) => format.italic = v,
            RunSetting::Underline(v) => format.underline = v,
            RunSetting::Strike(v) => format.strike = v,
            RunSetting::FontName(v) => format.font_name = v,
            RunSetting::Size(v) => format.size = v,
            RunSetting::Color(v) => format.color = v,
        }
        Ok(())
    }

    // -- tables -------------------------------------------------------------

    pub fn table_style(&self, table: TableId) -> Result<Option<TableStyle>> {
        Ok(self.table_node(table)?.style)
    }

    pub fn set_table_style(&mut self, table: TableId, style: Option<TableStyle>) -> Result<()> {
        self.ensure_open("table.style")?;
        self.table_node_mut(table)?.style = style;
        Ok(())
    }

    pub fn table_alignment(&self, table: TableId) -> Result<Option<Alignment>> {
        Ok(self.table_node(table)?.alignment)
    }

    pub fn set_table_alignment(&mut self, table: TableId, alignment: Option<Alignment>) -> Result<()> {
        const OP: &str = "table.alignment";
        self.ensure_open(OP)?;
        if let Some(a) = alignment
            && !a.is_table_alignment()
        {
            return Err(DomError::InvalidValue {
                operation: OP.into(),
                value: quoted(a.keyword()),
                expected: "one of left, center, right".into(),
            });
        }
        self.table_node_mut(table)?.alignment = alignment;
        Ok(())
    }

    pub fn table_autofit(&self, table: TableId) -> Result<bool> {
        Ok(self.table_node(table)?.autofit)
    }

    pub fn set_table_autofit(&mut self, table: TableId, autofit: bool) -> Result<()> {
        self.ensure_open("table.autofit")?;
        self.table_node_mut(table)?.autofit = autofit;
        Ok(())
    }

    pub fn row_count(&self, table: TableId) -> Result<usize> {
        Ok(self.table_node(table)?.rows.len())
    }

    pub fn column_count(&self, table: TableId) -> Result<usize> {
        Ok(self.table_node(table)?.column_widths.len())
    }

    /// Append a row with one cell per column.
    pub fn add_row(&mut self, table: TableId) -> Result<RowRef> {
        const OP: &str = "table.add_row()";
        self.ensure_open(OP)?;
        let cols = self.table_node(table)?.column_widths.len();
        self.reserve(OP, 1 + 2 * cols)?;
        let row = self.new_row(cols);
        let rows = &mut self.tables[table.0].rows;
        rows.push(row);
        Ok(RowRef {
            table,
            index: rows.len() - 1,
        })
    }

    /// Append a column, adding a cell to every existing row.
    pub fn add_column(&mut self, table: TableId, width: Option<Length>) -> Result<ColumnRef> {
        const OP: &str = "table.add_column()";
        self.ensure_open(OP)?;
        if let Some(w) = width {
            check_extent(OP, w)?;
        }
        let node = self.table_node(table)?;
        let cols = node.column_widths.len();
        if cols >= MAX_TABLE_COLUMNS {
            return Err(DomError::Structure {
                operation: OP.into(),
                detail: format!("the table already has the maximum of {MAX_TABLE_COLUMNS} columns"),
            });
        }
        let rows = node.rows.len();
        self.reserve(OP, 2 * rows)?;
        for r in 0..rows {
            let cell = self.new_cell(width);
            self.tables[table.0].rows[r].cells.push(cell);
        }
        self.tables[table.0].column_widths.push(width);
        Ok(ColumnRef { table, index: cols })
    }

    /// `table.rows[index]`.
    pub fn row_at(&self, table: TableId, index: i64) -> Result<RowRef> {
        let rows = self.table_node(table)?.rows.len();
        resolve(index, rows)
            .map(|index| RowRef { table, index })
            .ok_or_else(|| {
                out_of_range(
                    format!("table.rows[{index}]"),
                    "row",
                    index,
                    rows,
                    "table",
                    "; call table.add_row() first",
                )
            })
    }

    /// `table.columns[index]`.
    pub fn column_at(&self, table: TableId, index: i64) -> Result<ColumnRef> {
        let cols = self.table_node(table)?.column_widths.len();
        resolve(index, cols)
            .map(|index| ColumnRef { table, index })
            .ok_or_else(|| {
                out_of_range(
                    format!("table.columns[{index}]"),
                    "column",
                    index,
                    cols,
                    "table",
                    "",
                )
            })
    }

    /// `table.cell(row, col)`.
    pub fn cell_at(&self, table: TableId, row: i64, col: i64) -> Result<CellId> {
        let operation = || format!("table.cell({row}, {col})");
        let node = self.table_node(table)?;
        let r = resolve(row, node.rows.len()).ok_or_else(|| {
            out_of_range(
                operation(),
                "row",
                row,
                node.rows.len(),
                "table",
                "; call table.add_row() first",
            )
        })?;
        let cells = &node.rows[r].cells;
        resolve(col, cells.len()).map(|c| cells[c]).ok_or_else(|| DomError::Structure {
            operation: operation(),
            detail: format!(
                "column index {col} is out of range, row {r} has {}",
                plural(cells.len(), "cell")
            ),
        })
    }

    /// `row.cells[index]`.
    pub fn row_cell_at(&self, row: RowRef, index: i64) -> Result<CellId> {
        let cells = &self.row_node(row)?.cells;
        resolve(index, cells.len()).map(|c| cells[c]).ok_or_else(|| DomError::Structure {
            operation: format!("row.cells[{index}]"),
            detail: format!(
                "column index {index} is out of range, the row has {}",
                plural(cells.len(), "cell")
            ),
        })
    }

    pub fn row_cells(&self, row: RowRef) -> Result<Vec<CellId>> {
        Ok(self.row_node(row)?.cells.clone())
    }

    /// `column.cells[index]`: the cell of this column in row `index`.
    pub fn column_cell_at(&self, column: ColumnRef, index: i64) -> Result<CellId> {
        let node = self.table_node(column.table)?;
        let r = resolve(index, node.rows.len()).ok_or_else(|| {
            out_of_range(
                format!("column.cells[{index}]"),
                "row",
                index,
                node.rows.len(),
                "table",
                "; call table.add_row() first",
            )
        })?;
        node.rows[r]
            .cells
            .get(column.index)
            .copied()
            .ok_or(unknown("column", column.index))
    }

    pub fn column_cells(&self, column: ColumnRef) -> Result<Vec<CellId>> {
        let node = self.table_node(column.table)?;
        node.rows
            .iter()
            .map(|r| r.cells.get(column.index).copied().ok_or(unknown("column", column.index)))
            .collect()
    }

    pub fn row_height(&self, row: RowRef) -> Result<Option<Length>> {
        Ok(self.row_node(row)?.height)
    }

    pub fn set_row_height(&mut self, row: RowRef, height: Option<Length>) -> Result<()> {
        const OP: &str = "row.height";
        self.ensure_open(OP)?;
        if let Some(h) = height {
            check_extent(OP, h)?;
        }
        self.row_node_mut(row)?.height = height;
        Ok(())
    }

    pub fn column_width(&self, column: ColumnRef) -> Result<Option<Length>> {
        self.table_node(column.table)?
            .column_widths
            .get(column.index)
            .copied()
            .ok_or(unknown("column", column.index))
    }

    pub fn set_column_width(&mut self, column: ColumnRef, width: Option<Length>) -> Result<()> {
        const OP: &str = "column.width";
        self.ensure_open(OP)?;
        if let Some(w) = width {
            check_extent(OP, w)?;
        }
        let slot = self
            .table_node_mut(column.table)?
            .column_widths
            .get_mut(column.index)
            .ok_or(unknown("column", column.index))?;
        *slot = width;
        Ok(())
    }

    // -- cells --------------------------------------------------------------

    pub fn cell_text(&self, cell: CellId) -> Result<String> {
        let node = self.cell_node(cell)?;
        let texts = node
            .paragraphs
            .iter()
            .map(|p| self.paragraph_text(*p))
            .collect::<Result<Vec<_>>>()?;
        Ok(texts.join("\n"))
    }

    /// Replace the cell's content with a single paragraph holding `text`.
    pub fn set_cell_text(&mut self, cell: CellId, text: &str) -> Result<()> {
        const OP: &str = "cell.text";
        self.ensure_open(OP)?;
        let content = parse_text(OP, text)?;
        let first = self.cell_node(cell)?.paragraphs.first().copied();
        let needs_paragraph = first.is_none();
        self.reserve(OP, usize::from(needs_paragraph) + usize::from(!content.is_empty()))?;
        let paragraph = match first {
            Some(p) => p,
            None => self.new_paragraph(None, Vec::new()),
        };
        let runs = if content.is_empty() {
            Vec::new()
        } else {
            vec![self.new_run(content)]
        };
        self.paragraph_node_mut(paragraph)?.runs = runs;
        self.cell_node_mut(cell)?.paragraphs = vec![paragraph];
        Ok(())
    }

    pub fn add_cell_paragraph(
        &mut self,
        cell: CellId,
        text: &str,
        style: Option<ParagraphStyle>,
    ) -> Result<ParagraphId> {
        const OP: &str = "cell.add_paragraph()";
        self.ensure_open(OP)?;
        let content = parse_text(OP, text)?;
        self.cell_node(cell)?;
        self.reserve(OP, 1 + usize::from(!content.is_empty()))?;
        let paragraph = self.new_paragraph(style, content);
        self.cell_node_mut(cell)?.paragraphs.push(paragraph);
        Ok(paragraph)
    }

    pub fn cell_paragraph_count(&self, cell: CellId) -> Result<usize> {
        Ok(self.cell_node(cell)?.paragraphs.len())
    }

    /// `cell.paragraphs[index]`.
    pub fn cell_paragraph_at(&self, cell: CellId, index: i64) -> Result<ParagraphId> {
        let paragraphs = &self.cell_node(cell)?.paragraphs;
        resolve(index, paragraphs.len()).map(|i| paragraphs[i]).ok_or_else(|| {
            out_of_range(
                format!("cell.paragraphs[{index}]"),
                "paragraph",
                index,
                paragraphs.len(),
                "cell",
                "",
            )
        })
    }

    pub fn cell_width(&self, cell: CellId) -> Result<Option<Length>> {
        Ok(self.cell_node(cell)?.width)
    }

    pub fn set_cell_width(&mut self, cell: CellId, width: Option<Length>) -> Result<()> {
        const OP: &str = "cell.width";
        self.ensure_open(OP)?;
        if let Some(w) = width {
            check_extent(OP, w)?;
        }
        self.cell_node_mut(cell)?.width = width;
        Ok(())
    }

    // -- internals ----------------------------------------------------------

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.finalized {
            return Err(finalized(operation));
        }
        if !self.opened {
            return Err(DomError::Structure {
                operation: operation.to_string(),
                detail: "no document exists yet; call Document() first".into(),
            });
        }
        Ok(())
    }

    fn reserve(&mut self, operation: &str, count: usize) -> Result<()> {
        match self.objects.checked_add(count) {
            Some(total) if total <= self.max_objects => {
                self.objects = total;
                Ok(())
            }
            _ => {
                tracing::debug!(
                    operation,
                    objects = self.objects,
                    requested = count,
                    limit = self.max_objects,
                    "object limit reached"
                );
                Err(DomError::ObjectLimit {
                    operation: operation.to_string(),
                    limit: self.max_objects,
                })
            }
        }
    }

    /// Objects the next body insertion must pay for the implicit first
    /// section.
    fn section_cost(&self) -> usize {
        usize::from(self.sections.is_empty())
    }

    fn ensure_section(&mut self) {
        if self.sections.is_empty() {
            self.sections.push(SectionNode::default());
        }
    }

    fn push_block(&mut self, block: BlockRef) {
        self.ensure_section();
        if let Some(section) = self.sections.last_mut() {
            section.blocks.push(block);
        }
    }

    fn new_run(&mut self, content: Vec<RunContent>) -> RunId {
        self.runs.push(RunNode {
            format: RunFormat::default(),
            content,
        });
        RunId(self.runs.len() - 1)
    }

    /// A paragraph with one run when `content` is non-empty.
    fn new_paragraph(&mut self, style: Option<ParagraphStyle>, content: Vec<RunContent>) -> ParagraphId {
        let runs = if content.is_empty() {
            Vec::new()
        } else {
            vec![self.new_run(content)]
        };
        self.paragraphs.push(ParagraphNode {
            style,
            format: ParagraphFormat::default(),
            runs,
        });
        ParagraphId(self.paragraphs.len() - 1)
    }

    fn new_cell(&mut self, width: Option<Length>) -> CellId {
        let paragraph = self.new_paragraph(None, Vec::new());
        self.cells.push(CellNode {
            width,
            paragraphs: vec![paragraph],
        });
        CellId(self.cells.len() - 1)
    }

    fn new_row(&mut self, cols: usize) -> RowNode {
        let cells = (0..cols).map(|_| self.new_cell(None)).collect();
        RowNode {
            height: None,
            cells,
        }
    }

    fn paragraph_node(&self, id: ParagraphId) -> Result<&ParagraphNode> {
        self.paragraphs.get(id.0).ok_or(unknown("paragraph", id.0))
    }

    fn paragraph_node_mut(&mut self, id: ParagraphId) -> Result<&mut ParagraphNode> {
        self.paragraphs.get_mut(id.0).ok_or(unknown("paragraph", id.0))
    }

    fn run_node(&self, id: RunId) -> Result<&RunNode> {
        self.runs.get(id.0).ok_or(unknown("run", id.0))
    }

    fn run_node_mut(&mut self, id: RunId) -> Result<&mut RunNode> {
        self.runs.get_mut(id.0).ok_or(unknown("run", id.0))
    }

    fn table_node(&self, id: TableId) -> Result<&TableNode> {
        self.tables.get(id.0).ok_or(unknown("table", id.0))
    }

    fn table_node_mut(&mut self, id: TableId) -> Result<&mut TableNode> {
        self.tables.get_mut(id.0).ok_or(unknown("table", id.0))
    }

    fn row_node(&self, row: RowRef) -> Result<&RowNode> {
        self.table_node(row.table)?
            .rows
            .get(row.index)
            .ok_or(unknown("row", row.index))
    }

    fn row_node_mut(&mut self, row: RowRef) -> Result<&mut RowNode> {
        self.table_node_mut(row.table)?
            .rows
            .get_mut(row.index)
            .ok_or(unknown("row", row.index))
    }

    fn cell_node(&self, id: CellId) -> Result<&CellNode> {
        self.cells.get(id.0).ok_or(unknown("cell", id.0))
    }

    fn cell_node_mut(&mut self, id: CellId) -> Result<&mut CellNode> {
        self.cells.get_mut(id.0).ok_or(unknown("cell", id.0))
    }
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Resolve a possibly negative index against a materialized length.
fn resolve(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index.checked_add(len)? } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

fn out_of_range(
    operation: String,
    noun: &str,
    index: i64,
    len: usize,
    owner: &str,
    hint: &str,
) -> DomError {
    DomError::Structure {
        operation,
        detail: format!(
            "{noun} index {index} is out of range, the {owner} has {}{hint}",
            plural(len, noun)
        ),
    }
}

fn finalized(operation: &str) -> DomError {
    DomError::Finalized {
        operation: operation.to_string(),
    }
}

fn unknown(kind: &'static str, index: usize) -> DomError {
    DomError::UnknownHandle { kind, index }
}

const fn max_length() -> Length {
    Length::raw(MAX_LENGTH_EMU)
}

fn check_length(operation: &str, value: Length, min: Length, max: Length, expected: &str) -> Result<()> {
    if value < min || value > max {
        return Err(DomError::InvalidValue {
            operation: operation.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// Row heights and widths: above zero, at most 22 inches.
fn check_extent(operation: &str, value: Length) -> Result<()> {
    check_length(
        operation,
        value,
        Length::raw(1),
        max_length(),
        "a length above 0 and at most 22 inches",
    )
}

fn check_font_name(operation: &str, name: &str) -> Result<()> {
    let count = name.chars().count();
    if count == 0 || count > MAX_FONT_NAME_CHARS || name.chars().any(char::is_control) {
        return Err(DomError::InvalidValue {
            operation: operation.to_string(),
            value: quoted(name),
            expected: format!("a font name of 1 to {MAX_FONT_NAME_CHARS} printable characters"),
        });
    }
    Ok(())
}

/// Characters the package's XML cannot carry.
fn is_xml_illegal(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}')
}

fn illegal_char(operation: &str, c: char) -> DomError {
    DomError::InvalidValue {
        operation: operation.to_string(),
        value: format!("U+{:04X}", c as u32),
        expected: "text without control characters".into(),
    }
}

fn check_plain_text(operation: &str, text: &str) -> Result<()> {
    match text.chars().find(|c| is_xml_illegal(*c)) {
        Some(c) => Err(illegal_char(operation, c)),
        None => Ok(()),
    }
}

/// Split script text into run content: `\t` becomes a tab, `\n`, `\r\n` and
/// `\r` become line breaks.
pub(crate) fn parse_text(operation: &str, text: &str) -> Result<Vec<RunContent>> {
    let mut content = Vec::new();
    let mut pending = String::new();
    let mut chars = text.chars().peekable();
    let flush = |pending: &mut String, content: &mut Vec<RunContent>| {
        if !pending.is_empty() {
            content.push(RunContent::Text(std::mem::take(pending)));
        }
    };
    while let Some(c) = chars.next() {
        match c {
            '\t' => {
                flush(&mut pending, &mut content);
                content.push(RunContent::Tab);
            }
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                flush(&mut pending, &mut content);
                content.push(RunContent::Break(BreakKind::Line));
            }
            c if is_xml_illegal(c) => return Err(illegal_char(operation, c)),
            c => pending.push(c),
        }
    }
    flush(&mut pending, &mut content);
    Ok(content)
}

fn paragraph_setting_name(setting: &ParagraphSetting) -> &'static str {
    match setting {
        ParagraphSetting::Alignment(_) => "alignment",
        ParagraphSetting::SpaceBefore(_) => "space_before",
        ParagraphSetting::SpaceAfter(_) => "space_after",
        ParagraphSetting::LineSpacing(_) => "line_spacing",
        ParagraphSetting::LeftIndent(_) => "left_indent",
        ParagraphSetting::RightIndent(_) => "right_indent",
        ParagraphSetting::FirstLineIndent(_) => "first_line_indent",
        ParagraphSetting::KeepWithNext(_) => "keep_with_next",
        ParagraphSetting::PageBreakBefore(_) => "page_break_before",
    }
}

fn run_setting_name(setting: &RunSetting) -> &'static str {
    match setting {
        RunSetting::Bold(_) => "bold",
        RunSetting::Italic(_) => "italic",
        RunSetting::Underline(_) => "underline",
        RunSetting::Strike(_) => "strike",
        RunSetting::FontName(_) => "name",
        RunSetting::Size(_) => "size",
        RunSetting::Color(_) => "color.rgb",
    }
}

fn page_setting_name(setting: &PageSetting) -> &'static str {
    match setting {
        PageSetting::Start(_) => "start_type",
        PageSetting::Orientation(_) => "orientation",
        PageSetting::PageWidth(_) => "page_width",
        PageSetting::PageHeight(_) => "page_height",
        PageSetting::TopMargin(_) => "top_margin",
        PageSetting::RightMargin(_) => "right_margin",
        PageSetting::BottomMargin(_) => "bottom_margin",
        PageSetting::LeftMargin(_) => "left_margin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> DocumentBuilder {
        let mut b = DocumentBuilder::new(1_000);
        b.open_document().unwrap();
        b
    }

    #[test]
    fn second_document_is_rejected() {
        let mut b = builder();
        assert_eq!(b.open_document().unwrap_err(), DomError::DuplicateDocument);
    }

    #[test]
    fn content_requires_a_document() {
        let mut b = DocumentBuilder::new(10);
        let err = b.add_paragraph("x", None).unwrap_err();
        assert!(err.to_string().contains("call Document() first"));
    }

    #[test]
    fn first_body_call_opens_a_section() {
        let mut b = builder();
        assert_eq!(b.section_count(), 0);
        b.add_paragraph("Hello", None).unwrap();
        assert_eq!(b.section_count(), 1);
        // document + section + paragraph + run
        assert_eq!(b.object_count(), 4);
    }

    #[test]
    fn row_index_before_any_row_is_structural() {
        let mut b = builder();
        let t = b.add_table(0, 3).unwrap();
        let err = b.row_at(t, 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "table.rows[0]: row index 0 is out of range, the table has 0 rows; call table.add_row() first"
        );
        let row = b.add_row(t).unwrap();
        assert_eq!(b.row_at(t, 0).unwrap(), row);
        assert_eq!(b.row_at(t, -1).unwrap(), row);
        assert!(b.row_at(t, -2).is_err());
    }

    #[test]
    fn column_beyond_row_width_is_structural() {
        let mut b = builder();
        let t = b.add_table(2, 3).unwrap();
        let err = b.cell_at(t, 0, 5).unwrap_err();
        assert!(matches!(err, DomError::Structure { .. }));
        assert_eq!(
            err.to_string(),
            "table.cell(0, 5): column index 5 is out of range, row 0 has 3 cells"
        );
        let row = b.row_at(t, 1).unwrap();
        assert!(b.row_cell_at(row, 3).is_err());
        assert!(b.row_cell_at(row, 2).is_ok());
    }

    #[test]
    fn table_shape_is_validated() {
        let mut b = builder();
        assert!(matches!(b.add_table(1, 0), Err(DomError::InvalidValue { .. })));
        assert!(matches!(b.add_table(-1, 2), Err(DomError::InvalidValue { .. })));
        assert!(b.add_table(1, 64).is_err());
        assert!(b.add_table(1, 63).is_ok());
    }

    #[test]
    fn add_table_is_charged_atomically() {
        let mut b = DocumentBuilder::new(10);
        b.open_document().unwrap();
        let before = b.object_count();
        let err = b.add_table(3, 3).unwrap_err();
        assert!(matches!(err, DomError::ObjectLimit { limit: 10, .. }));
        assert_eq!(b.object_count(), before);
        assert_eq!(b.section_count(), 0);
    }

    #[test]
    fn add_column_extends_every_row() {
        let mut b = builder();
        let t = b.add_table(2, 1).unwrap();
        let col = b.add_column(t, Some(Length::inches(1.0).unwrap())).unwrap();
        assert_eq!(col.index, 1);
        assert_eq!(b.column_count(t).unwrap(), 2);
        let cell = b.cell_at(t, 1, 1).unwrap();
        assert_eq!(b.cell_paragraph_count(cell).unwrap(), 1);
        assert_eq!(b.column_cells(col).unwrap().len(), 2);
    }

    #[test]
    fn cell_text_round_trips() {
        let mut b = builder();
        let t = b.add_table(1, 2).unwrap();
        let cell = b.cell_at(t, 0, 1).unwrap();
        b.add_cell_paragraph(cell, "second", None).unwrap();
        b.set_cell_text(cell, "a\tb").unwrap();
        assert_eq!(b.cell_text(cell).unwrap(), "a\tb");
        assert_eq!(b.cell_paragraph_count(cell).unwrap(), 1);
    }

    #[test]
    fn control_characters_are_rejected() {
        let mut b = builder();
        let err = b.add_paragraph("bad\u{7}", None).unwrap_err();
        assert!(err.to_string().contains("U+0007"));
        assert_eq!(b.section_count(), 0);
    }

    #[test]
    fn text_splits_into_tabs_and_breaks() {
        let content = parse_text("t", "a\tb\r\nc\rd").unwrap();
        assert_eq!(
            content,
            vec![
                RunContent::Text("a".into()),
                RunContent::Tab,
                RunContent::Text("b".into()),
                RunContent::Break(BreakKind::Line),
                RunContent::Text("c".into()),
                RunContent::Break(BreakKind::Line),
                RunContent::Text("d".into()),
            ]
        );
    }

    #[test]
    fn formatting_ranges_are_enforced() {
        let mut b = builder();
        let p = b.add_paragraph("", None).unwrap();
        let r = b.add_run(p, "x").unwrap();
        let err = b
            .update_run_format(r, RunSetting::Size(Some(Length::points(0.5).unwrap())))
            .unwrap_err();
        assert!(err.to_string().contains("0.5pt"));
        assert!(b.update_run_format(r, RunSetting::FontName(Some(String::new()))).is_err());
        b.update_run_format(r, RunSetting::FontName(Some("Calibri".into()))).unwrap();
        assert_eq!(b.run_format(r).unwrap().font_name.as_deref(), Some("Calibri"));

        let negative = Length::points(-1.0).unwrap();
        assert!(b
            .update_paragraph_format(p, ParagraphSetting::SpaceAfter(Some(negative)))
            .is_err());
        assert!(b
            .update_paragraph_format(p, ParagraphSetting::LineSpacing(Some(LineSpacing::Multiple(0.1))))
            .is_err());
        b.update_paragraph_format(p, ParagraphSetting::FirstLineIndent(Some(negative)))
            .unwrap();
    }

    #[test]
    fn table_alignment_rejects_justify() {
        let mut b = builder();
        let t = b.add_table(1, 1).unwrap();
        assert!(b.set_table_alignment(t, Some(Alignment::Justify)).is_err());
        b.set_table_alignment(t, Some(Alignment::Center)).unwrap();
        assert_eq!(b.table_alignment(t).unwrap(), Some(Alignment::Center));
    }

    #[test]
    fn page_setup_bounds() {
        let mut b = builder();
        let s = b.section_at(0).unwrap();
        assert!(b
            .update_page_setup(s, PageSetting::LeftMargin(Length::inches(-1.0).unwrap()))
            .is_err());
        assert!(b.update_page_setup(s, PageSetting::PageWidth(Length::ZERO)).is_err());
        b.update_page_setup(s, PageSetting::Orientation(Orientation::Landscape))
            .unwrap();
        assert_eq!(b.page_setup(s).unwrap().orientation, Orientation::Landscape);
        assert!(b.section_at(1).is_err());
    }

    #[test]
    fn finalize_builds_tree_and_goes_inert() {
        let mut b = builder();
        b.add_heading("Report", 1).unwrap();
        let t = b.add_table(2, 2).unwrap();
        let c = b.cell_at(t, 1, 1).unwrap();
        b.set_cell_text(c, "x").unwrap();
        b.add_section(SectionStart::NewPage).unwrap();
        b.add_paragraph("tail", None).unwrap();

        let tree = b.finalize().unwrap();
        assert_eq!(tree.sections.len(), 2);
        assert_eq!(tree.paragraph_count(), 2);
        assert_eq!(tree.table_count(), 1);
        match &tree.sections[0].blocks[1] {
            Block::Table(table) => assert_eq!(table.rows[1].cells[1].text(), "x"),
            other => panic!("expected table, got {other:?}"),
        }

        assert!(matches!(
            b.add_paragraph("late", None),
            Err(DomError::Finalized { .. })
        ));
        assert!(matches!(b.finalize(), Err(DomError::Finalized { .. })));
    }

    #[test]
    fn finalize_without_document() {
        let mut b = DocumentBuilder::new(10);
        assert_eq!(b.finalize().unwrap_err(), DomError::NoDocument);
    }

    #[test]
    fn core_properties() {
        let mut b = builder();
        b.set_property(CoreProperty::Title, "Quarterly").unwrap();
        assert_eq!(b.property(CoreProperty::Title), Some("Quarterly"));
        assert_eq!(CoreProperty::from_name("author"), Some(CoreProperty::Author));
        let tree = b.finalize().unwrap();
        assert_eq!(tree.properties.title.as_deref(), Some("Quarterly"));
    }
}
