//! Document object model for docsmith.
//!
//! This crate owns everything a generated script can build: the
//! invariant-enforcing [`DocumentBuilder`] facade, the finished
//! [`DocumentTree`] it hands over, the validated formatting vocabulary
//! (units, colors, alignments, the style catalog) and the
//! [`DocumentCodec`] that turns a tree into `.docx` bytes.

pub mod error;
pub mod facade;
pub mod package;
pub mod style;
pub mod tree;
pub mod units;

pub use error::{DomError, PackageError, Result};
pub use facade::{
    CellId, ColumnRef, CoreProperty, DocumentBuilder, MAX_TABLE_COLUMNS, PageSetting, ParagraphId,
    ParagraphSetting, RowRef, RunId, RunSetting, SectionId, TableId,
};
pub use package::{
    BlockOutline, DocumentCodec, DocumentOutline, DocxCodec, ParagraphOutline, SectionOutline,
    TableOutline,
};
pub use style::{
    Alignment, BreakKind, LineSpacing, Orientation, ParagraphStyle, SectionStart, TableStyle,
};
pub use tree::{
    Block, Cell, CoreProperties, DocumentTree, PageSetup, Paragraph, ParagraphFormat, Row, Run,
    RunContent, RunFormat, Section, Table,
};
pub use units::{Color, Length, Unit};
