//! WordprocessingML package reader.
//!
//! Reads `word/document.xml` (and the title and author from
//! `docProps/core.xml`) back into a [`DocumentOutline`]. Section-break
//! carrier paragraphs are recognised and skipped so an outline reproduces
//! the sections, paragraphs and tables that were written.

use std::io::{Cursor, Read, Seek};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, BytesText, Event};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::PackageError;
use crate::style::{ParagraphStyle, TableStyle};

use super::{BlockOutline, DocumentOutline, ParagraphOutline, SectionOutline, TableOutline};

/// Decode package bytes into an outline.
pub fn read_outline(bytes: &[u8]) -> Result<DocumentOutline, PackageError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let document = read_part(&mut archive, "word/document.xml")?
        .ok_or_else(|| PackageError::Malformed("missing part word/document.xml".into()))?;

    let mut outline = DocumentOutline {
        sections: parse_document(&document)?,
        ..DocumentOutline::default()
    };
    if let Some(core) = read_part(&mut archive, "docProps/core.xml")? {
        let (title, author) = parse_core(&core)?;
        outline.title = title;
        outline.author = author;
    }
    tracing::trace!(sections = outline.sections.len(), "package read");
    Ok(outline)
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, PackageError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(Some(text))
}

fn xml_error(err: impl std::fmt::Display) -> PackageError {
    PackageError::Xml(err.to_string())
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, PackageError> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return attr
                .unescape_value()
                .map(|v| Some(v.into_owned()))
                .map_err(xml_error);
        }
    }
    Ok(None)
}

fn parse_document(xml: &str) -> Result<Vec<SectionOutline>, PackageError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut parser = BodyParser::default();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => parser.start(&e)?,
            Event::Empty(e) => {
                parser.start(&e)?;
                parser.end(e.name().as_ref());
            }
            Event::End(e) => parser.end(e.name().as_ref()),
            Event::Text(e) => parser.text(&e)?,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(parser.sections)
}

fn parse_core(xml: &str) -> Result<(Option<String>, Option<String>), PackageError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut title = None;
    let mut author = None;
    let mut current: Option<Vec<u8>> = None;
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => current = Some(e.name().as_ref().to_vec()),
            Event::End(_) => current = None,
            Event::Text(e) => {
                let text = e.unescape().map_err(xml_error)?.into_owned();
                match current.as_deref() {
                    Some(b"dc:title") => title = Some(text),
                    Some(b"dc:creator") => author = Some(text),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok((title, author))
}

#[derive(Default)]
struct ParagraphState {
    style: Option<String>,
    runs: Vec<String>,
    page_break: bool,
    carrier: bool,
}

#[derive(Default)]
struct TableState {
    style: Option<String>,
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: Vec<String>,
}

#[derive(Default)]
struct BodyParser {
    sections: Vec<SectionOutline>,
    blocks: Vec<BlockOutline>,
    orientation: Option<String>,
    paragraph: Option<ParagraphState>,
    run: Option<String>,
    in_text: bool,
    /// Open tables, innermost last. Only outermost tables become blocks.
    tables: Vec<TableState>,
}

impl BodyParser {
    fn start(&mut self, e: &BytesStart<'_>) -> Result<(), PackageError> {
        match e.name().as_ref() {
            b"w:p" => self.paragraph = Some(ParagraphState::default()),
            b"w:pStyle" => {
                let id = attribute(e, b"w:val")?;
                if let (Some(p), Some(id)) = (self.paragraph.as_mut(), id) {
                    p.style = Some(
                        ParagraphStyle::from_style_id(&id)
                            .map(|s| s.name().to_string())
                            .unwrap_or(id),
                    );
                }
            }
            b"w:sectPr" => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.carrier = true;
                }
            }
            b"w:pgSz" => {
                if let Some(orient) = attribute(e, b"w:orient")? {
                    self.orientation = Some(orient);
                }
            }
            b"w:r" => {
                if self.paragraph.is_some() {
                    self.run = Some(String::new());
                }
            }
            b"w:t" => self.in_text = self.run.is_some(),
            b"w:tab" => {
                if let Some(run) = self.run.as_mut() {
                    run.push('\t');
                }
            }
            b"w:br" => {
                let kind = attribute(e, b"w:type")?;
                if let (Some(run), Some(p)) = (self.run.as_mut(), self.paragraph.as_mut()) {
                    match kind.as_deref() {
                        Some("page") => p.page_break = true,
                        Some("column") => {}
                        _ => run.push('\n'),
                    }
                }
            }
            b"w:tbl" => self.tables.push(TableState::default()),
            b"w:tblStyle" => {
                let id = attribute(e, b"w:val")?;
                if let (Some(t), Some(id)) = (self.tables.last_mut(), id) {
                    t.style = Some(
                        TableStyle::from_style_id(&id)
                            .map(|s| s.name().to_string())
                            .unwrap_or(id),
                    );
                }
            }
            b"w:tr" => {
                if let Some(t) = self.tables.last_mut() {
                    t.row.clear();
                }
            }
            b"w:tc" => {
                if let Some(t) = self.tables.last_mut() {
                    t.cell.clear();
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, e: &BytesText<'_>) -> Result<(), PackageError> {
        if self.in_text
            && let Some(run) = self.run.as_mut()
        {
            run.push_str(&e.unescape().map_err(xml_error)?);
        }
        Ok(())
    }

    fn end(&mut self, name: &[u8]) {
        match name {
            b"w:t" => self.in_text = false,
            b"w:r" => {
                if let (Some(run), Some(p)) = (self.run.take(), self.paragraph.as_mut()) {
                    p.runs.push(run);
                }
            }
            b"w:p" => {
                let Some(p) = self.paragraph.take() else {
                    return;
                };
                if let Some(t) = self.tables.last_mut() {
                    t.cell.push(p.runs.concat());
                } else if !p.carrier {
                    self.blocks.push(BlockOutline::Paragraph(ParagraphOutline {
                        style: p.style,
                        runs: p.runs,
                        page_break: p.page_break,
                    }));
                }
            }
            b"w:tc" => {
                if let Some(t) = self.tables.last_mut() {
                    let text = std::mem::take(&mut t.cell).join("\n");
                    t.row.push(text);
                }
            }
            b"w:tr" => {
                if let Some(t) = self.tables.last_mut() {
                    let row = std::mem::take(&mut t.row);
                    t.rows.push(row);
                }
            }
            b"w:tbl" => {
                if let Some(t) = self.tables.pop()
                    && self.tables.is_empty()
                {
                    self.blocks.push(BlockOutline::Table(TableOutline {
                        style: t.style,
                        rows: t.rows,
                    }));
                }
            }
            b"w:sectPr" => self.close_section(),
            b"w:body" => {
                if !self.blocks.is_empty() {
                    self.close_section();
                }
            }
            _ => {}
        }
    }

    fn close_section(&mut self) {
        self.sections.push(SectionOutline {
            orientation: self
                .orientation
                .take()
                .unwrap_or_else(|| "portrait".to_string()),
            blocks: std::mem::take(&mut self.blocks),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::write_package;
    use crate::style::{BreakKind, Orientation};
    use crate::tree::{
        Block, Cell, CoreProperties, DocumentTree, PageSetup, Paragraph, Row, Run, RunContent,
        Section, Table,
    };

    fn text_paragraph(text: &str) -> Paragraph {
        Paragraph {
            runs: vec![Run {
                content: vec![RunContent::Text(text.into())],
                ..Run::default()
            }],
            ..Paragraph::default()
        }
    }

    #[test]
    fn decodes_sections_blocks_and_properties() {
        let cell = |t: &str| Cell {
            width: None,
            paragraphs: vec![text_paragraph(t)],
        };
        let tree = DocumentTree {
            properties: CoreProperties {
                title: Some("Plan".into()),
                author: Some("Ops".into()),
                ..CoreProperties::default()
            },
            sections: vec![
                Section {
                    setup: PageSetup::default(),
                    blocks: vec![
                        Block::Paragraph(text_paragraph("  spaced  ")),
                        Block::Table(Table {
                            autofit: true,
                            column_widths: vec![None; 2],
                            rows: vec![Row {
                                height: None,
                                cells: vec![cell("a & b"), cell("c")],
                            }],
                            ..Table::default()
                        }),
                    ],
                },
                Section {
                    setup: PageSetup {
                        orientation: Orientation::Landscape,
                        ..PageSetup::default()
                    },
                    blocks: vec![Block::Paragraph(Paragraph {
                        runs: vec![Run {
                            content: vec![RunContent::Break(BreakKind::Page)],
                            ..Run::default()
                        }],
                        ..Paragraph::default()
                    })],
                },
            ],
        };

        let outline = read_outline(&write_package(&tree).unwrap()).unwrap();
        assert_eq!(outline.title.as_deref(), Some("Plan"));
        assert_eq!(outline.author.as_deref(), Some("Ops"));
        assert_eq!(outline.sections.len(), 2);
        assert_eq!(outline.sections[0].orientation, "portrait");
        assert_eq!(outline.sections[1].orientation, "landscape");
        assert_eq!(outline.sections[0].blocks.len(), 2);
        match &outline.sections[0].blocks[0] {
            BlockOutline::Paragraph(p) => assert_eq!(p.text(), "  spaced  "),
            other => panic!("unexpected block {other:?}"),
        }
        match &outline.sections[0].blocks[1] {
            BlockOutline::Table(t) => assert_eq!(t.rows, vec![vec!["a & b".to_string(), "c".into()]]),
            other => panic!("unexpected block {other:?}"),
        }
        match &outline.sections[1].blocks[0] {
            BlockOutline::Paragraph(p) => assert!(p.page_break),
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[test]
    fn rejects_non_zip_bytes() {
        assert!(matches!(
            read_outline(b"not a zip"),
            Err(PackageError::Zip(_))
        ));
    }
}
