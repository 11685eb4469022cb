//! WordprocessingML package writer.
//!
//! Output is byte-deterministic: parts are written in a fixed order, every
//! ZIP entry carries the same timestamp and no part embeds a clock value.

use std::io::{Cursor, Write};

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::PackageError;
use crate::style::{
    BreakKind, LineSpacing, Orientation, PARAGRAPH_STYLES, StyleDef, TABLE_STYLES, style_id,
};
use crate::tree::{
    Block, CoreProperties, DocumentTree, PageSetup, Paragraph, ParagraphFormat, Run, RunContent,
    RunFormat, Table,
};

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const NS_PACKAGE_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const REL_CORE: &str =
    "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
const REL_EXTENDED: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties";
const REL_STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";

/// Grid width used when the section gives no usable content width.
const FALLBACK_CONTENT_TWIPS: i64 = 9360;
const HEADER_FOOTER_TWIPS: &str = "720";

/// Serialize a validated tree into `.docx` bytes.
pub fn write_package(tree: &DocumentTree) -> Result<Vec<u8>, PackageError> {
    let parts = [
        ("[Content_Types].xml", content_types()?),
        ("_rels/.rels", package_rels()?),
        ("docProps/app.xml", app_properties()?),
        ("docProps/core.xml", core_properties(&tree.properties)?),
        ("word/_rels/document.xml.rels", document_rels()?),
        ("word/document.xml", document(tree)?),
        ("word/styles.xml", styles()?),
    ];

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in parts {
        zip.start_file(name, file_options())?;
        zip.write_all(&bytes)?;
    }
    let bytes = zip.finish()?.into_inner();
    tracing::trace!(bytes = bytes.len(), "package written");
    Ok(bytes)
}

fn file_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

// ---------------------------------------------------------------------------
// XML helper
// ---------------------------------------------------------------------------

struct Xml {
    inner: Writer<Vec<u8>>,
}

impl Xml {
    fn new() -> Result<Self, PackageError> {
        let mut inner = Writer::new(Vec::new());
        inner
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(xml_error)?;
        Ok(Self { inner })
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), PackageError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.inner.write_event(Event::Start(start)).map_err(xml_error)
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), PackageError> {
        let start = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.inner.write_event(Event::Empty(start)).map_err(xml_error)
    }

    fn close(&mut self, name: &str) -> Result<(), PackageError> {
        self.inner
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(xml_error)
    }

    fn text(&mut self, text: &str) -> Result<(), PackageError> {
        self.inner
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml_error)
    }

    /// `<name>text</name>`
    fn element(&mut self, name: &str, text: &str) -> Result<(), PackageError> {
        self.open(name, &[])?;
        self.text(text)?;
        self.close(name)
    }

    /// `<name w:val="value"/>`
    fn val(&mut self, name: &str, value: &str) -> Result<(), PackageError> {
        self.empty(name, &[("w:val", value)])
    }

    /// On/off property: `<w:b/>` or `<w:b w:val="0"/>`.
    fn toggle(&mut self, name: &str, value: Option<bool>) -> Result<(), PackageError> {
        match value {
            Some(true) => self.empty(name, &[]),
            Some(false) => self.val(name, "0"),
            None => Ok(()),
        }
    }

    fn finish(self) -> Vec<u8> {
        self.inner.into_inner()
    }
}

fn xml_error(err: impl std::fmt::Display) -> PackageError {
    PackageError::Xml(err.to_string())
}

// ---------------------------------------------------------------------------
// Package plumbing parts
// ---------------------------------------------------------------------------

fn content_types() -> Result<Vec<u8>, PackageError> {
    let mut x = Xml::new()?;
    x.open("Types", &[("xmlns", NS_CONTENT_TYPES)])?;
    x.empty(
        "Default",
        &[
            ("Extension", "rels"),
            ("ContentType", "application/vnd.openxmlformats-package.relationships+xml"),
        ],
    )?;
    x.empty("Default", &[("Extension", "xml"), ("ContentType", "application/xml")])?;
    let overrides = [
        (
            "/word/document.xml",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
        ),
        (
            "/word/styles.xml",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml",
        ),
        (
            "/docProps/core.xml",
            "application/vnd.openxmlformats-package.core-properties+xml",
        ),
        (
            "/docProps/app.xml",
            "application/vnd.openxmlformats-officedocument.extended-properties+xml",
        ),
    ];
    for (part, content_type) in overrides {
        x.empty("Override", &[("PartName", part), ("ContentType", content_type)])?;
    }
    x.close("Types")?;
    Ok(x.finish())
}

fn relationships(entries: &[(&str, &str, &str)]) -> Result<Vec<u8>, PackageError> {
    let mut x = Xml::new()?;
    x.open("Relationships", &[("xmlns", NS_PACKAGE_RELS)])?;
    for &(id, kind, target) in entries {
        x.empty("Relationship", &[("Id", id), ("Type", kind), ("Target", target)])?;
    }
    x.close("Relationships")?;
    Ok(x.finish())
}

fn package_rels() -> Result<Vec<u8>, PackageError> {
    relationships(&[
        ("rId1", REL_OFFICE_DOCUMENT, "word/document.xml"),
        ("rId2", REL_CORE, "docProps/core.xml"),
        ("rId3", REL_EXTENDED, "docProps/app.xml"),
    ])
}

fn document_rels() -> Result<Vec<u8>, PackageError> {
    relationships(&[("rId1", REL_STYLES, "styles.xml")])
}

fn app_properties() -> Result<Vec<u8>, PackageError> {
    let mut x = Xml::new()?;
    x.open(
        "Properties",
        &[
            (
                "xmlns",
                "http://schemas.openxmlformats.org/officeDocument/2006/extended-properties",
            ),
            (
                "xmlns:vt",
                "http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes",
            ),
        ],
    )?;
    x.element("Application", "docsmith")?;
    x.close("Properties")?;
    Ok(x.finish())
}

fn core_properties(properties: &CoreProperties) -> Result<Vec<u8>, PackageError> {
    let mut x = Xml::new()?;
    x.open(
        "cp:coreProperties",
        &[
            (
                "xmlns:cp",
                "http://schemas.openxmlformats.org/package/2006/metadata/core-properties",
            ),
            ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
            ("xmlns:dcterms", "http://purl.org/dc/terms/"),
            ("xmlns:dcmitype", "http://purl.org/dc/dcmitype/"),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
        ],
    )?;
    let fields = [
        ("dc:title", &properties.title),
        ("dc:subject", &properties.subject),
        ("dc:creator", &properties.author),
        ("cp:keywords", &properties.keywords),
        ("dc:description", &properties.comments),
        ("cp:category", &properties.category),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            x.element(name, value)?;
        }
    }
    x.close("cp:coreProperties")?;
    Ok(x.finish())
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

fn document(tree: &DocumentTree) -> Result<Vec<u8>, PackageError> {
    let mut x = Xml::new()?;
    x.open("w:document", &[("xmlns:w", NS_W), ("xmlns:r", NS_R)])?;
    x.open("w:body", &[])?;
    let last = tree.sections.len().saturating_sub(1);
    for (i, section) in tree.sections.iter().enumerate() {
        for block in &section.blocks {
            match block {
                Block::Paragraph(p) => paragraph(&mut x, p)?,
                Block::Table(t) => table(&mut x, t, &section.setup)?,
            }
        }
        if i == last {
            section_properties(&mut x, &section.setup)?;
        } else {
            // Carrier paragraph: ends this section.
            x.open("w:p", &[])?;
            x.open("w:pPr", &[])?;
            section_properties(&mut x, &section.setup)?;
            x.close("w:pPr")?;
            x.close("w:p")?;
        }
    }
    x.close("w:body")?;
    x.close("w:document")?;
    Ok(x.finish())
}

fn paragraph(x: &mut Xml, p: &Paragraph) -> Result<(), PackageError> {
    x.open("w:p", &[])?;
    if p.style.is_some() || !p.format.is_empty() {
        x.open("w:pPr", &[])?;
        if let Some(style) = p.style {
            x.val("w:pStyle", &style.style_id())?;
        }
        paragraph_format(x, &p.format)?;
        x.close("w:pPr")?;
    }
    for r in &p.runs {
        run(x, r)?;
    }
    x.close("w:p")
}

fn paragraph_format(x: &mut Xml, f: &ParagraphFormat) -> Result<(), PackageError> {
    x.toggle("w:keepNext", f.keep_with_next)?;
    x.toggle("w:pageBreakBefore", f.page_break_before)?;

    let before = f.space_before.map(|l| l.twips().to_string());
    let after = f.space_after.map(|l| l.twips().to_string());
    let line = f.line_spacing.map(|s| match s {
        LineSpacing::Multiple(m) => (((m * 240.0).round() as i64).to_string(), "auto"),
        LineSpacing::Exact(l) => (l.twips().to_string(), "exact"),
    });
    if before.is_some() || after.is_some() || line.is_some() {
        let mut attrs = Vec::new();
        if let Some(v) = &before {
            attrs.push(("w:before", v.as_str()));
        }
        if let Some(v) = &after {
            attrs.push(("w:after", v.as_str()));
        }
        if let Some((v, rule)) = &line {
            attrs.push(("w:line", v.as_str()));
            attrs.push(("w:lineRule", *rule));
        }
        x.empty("w:spacing", &attrs)?;
    }

    let left = f.left_indent.map(|l| l.twips().to_string());
    let right = f.right_indent.map(|l| l.twips().to_string());
    let first = f.first_line_indent.map(|l| {
        if l.is_negative() {
            ("w:hanging", (-l.twips()).to_string())
        } else {
            ("w:firstLine", l.twips().to_string())
        }
    });
    if left.is_some() || right.is_some() || first.is_some() {
        let mut attrs = Vec::new();
        if let Some(v) = &left {
            attrs.push(("w:left", v.as_str()));
        }
        if let Some(v) = &right {
            attrs.push(("w:right", v.as_str()));
        }
        if let Some((name, v)) = &first {
            attrs.push((*name, v.as_str()));
        }
        x.empty("w:ind", &attrs)?;
    }

    if let Some(alignment) = f.alignment {
        x.val("w:jc", alignment.ooxml())?;
    }
    Ok(())
}

fn run(x: &mut Xml, r: &Run) -> Result<(), PackageError> {
    x.open("w:r", &[])?;
    if !r.format.is_empty() {
        x.open("w:rPr", &[])?;
        run_format(x, &r.format)?;
        x.close("w:rPr")?;
    }
    for item in &r.content {
        match item {
            RunContent::Text(text) => {
                x.open("w:t", &[("xml:space", "preserve")])?;
                x.text(text)?;
                x.close("w:t")?;
            }
            RunContent::Tab => x.empty("w:tab", &[])?,
            RunContent::Break(BreakKind::Line) => x.empty("w:br", &[])?,
            RunContent::Break(BreakKind::Page) => x.empty("w:br", &[("w:type", "page")])?,
            RunContent::Break(BreakKind::Column) => x.empty("w:br", &[("w:type", "column")])?,
        }
    }
    x.close("w:r")
}

fn run_format(x: &mut Xml, f: &RunFormat) -> Result<(), PackageError> {
    if let Some(name) = &f.font_name {
        x.empty(
            "w:rFonts",
            &[
                ("w:ascii", name.as_str()),
                ("w:hAnsi", name.as_str()),
                ("w:cs", name.as_str()),
            ],
        )?;
    }
    x.toggle("w:b", f.bold)?;
    x.toggle("w:i", f.italic)?;
    x.toggle("w:strike", f.strike)?;
    if let Some(color) = f.color {
        x.val("w:color", &color.to_hex())?;
    }
    if let Some(size) = f.size {
        let half_points = size.half_points().to_string();
        x.val("w:sz", &half_points)?;
        x.val("w:szCs", &half_points)?;
    }
    match f.underline {
        Some(true) => x.val("w:u", "single")?,
        Some(false) => x.val("w:u", "none")?,
        None => {}
    }
    Ok(())
}

fn table(x: &mut Xml, t: &Table, setup: &PageSetup) -> Result<(), PackageError> {
    let cols = t.column_count().max(1) as i64;
    let content = setup.content_width().twips();
    let default_width = (if content > 0 { content } else { FALLBACK_CONTENT_TWIPS }) / cols;
    let widths: Vec<i64> = t
        .column_widths
        .iter()
        .map(|w| w.map_or(default_width, |w| w.twips()))
        .collect();

    x.open("w:tbl", &[])?;
    x.open("w:tblPr", &[])?;
    if let Some(style) = t.style {
        x.val("w:tblStyle", &style.style_id())?;
    }
    x.empty("w:tblW", &[("w:w", "0"), ("w:type", "auto")])?;
    if let Some(alignment) = t.alignment {
        x.val("w:jc", alignment.ooxml())?;
    }
    if !t.autofit {
        x.empty("w:tblLayout", &[("w:type", "fixed")])?;
    }
    x.close("w:tblPr")?;

    x.open("w:tblGrid", &[])?;
    for w in &widths {
        let w = w.to_string();
        x.empty("w:gridCol", &[("w:w", w.as_str())])?;
    }
    x.close("w:tblGrid")?;

    for row in &t.rows {
        x.open("w:tr", &[])?;
        if let Some(height) = row.height {
            let height = height.twips().to_string();
            x.open("w:trPr", &[])?;
            x.empty("w:trHeight", &[("w:val", height.as_str()), ("w:hRule", "atLeast")])?;
            x.close("w:trPr")?;
        }
        for (c, cell) in row.cells.iter().enumerate() {
            let width = cell
                .width
                .map(|w| w.twips())
                .or_else(|| widths.get(c).copied())
                .unwrap_or(default_width)
                .to_string();
            x.open("w:tc", &[])?;
            x.open("w:tcPr", &[])?;
            x.empty("w:tcW", &[("w:w", width.as_str()), ("w:type", "dxa")])?;
            x.close("w:tcPr")?;
            for p in &cell.paragraphs {
                paragraph(x, p)?;
            }
            x.close("w:tc")?;
        }
        x.close("w:tr")?;
    }
    x.close("w:tbl")
}

fn section_properties(x: &mut Xml, setup: &PageSetup) -> Result<(), PackageError> {
    x.open("w:sectPr", &[])?;
    x.val("w:type", setup.start.ooxml())?;

    let width = setup.page_width.twips().to_string();
    let height = setup.page_height.twips().to_string();
    let mut size = vec![("w:w", width.as_str()), ("w:h", height.as_str())];
    if setup.orientation == Orientation::Landscape {
        size.push(("w:orient", "landscape"));
    }
    x.empty("w:pgSz", &size)?;

    let top = setup.top_margin.twips().to_string();
    let right = setup.right_margin.twips().to_string();
    let bottom = setup.bottom_margin.twips().to_string();
    let left = setup.left_margin.twips().to_string();
    x.empty(
        "w:pgMar",
        &[
            ("w:top", top.as_str()),
            ("w:right", right.as_str()),
            ("w:bottom", bottom.as_str()),
            ("w:left", left.as_str()),
            ("w:header", HEADER_FOOTER_TWIPS),
            ("w:footer", HEADER_FOOTER_TWIPS),
            ("w:gutter", "0"),
        ],
    )?;
    x.close("w:sectPr")
}

// ---------------------------------------------------------------------------
// Styles
// ---------------------------------------------------------------------------

fn styles() -> Result<Vec<u8>, PackageError> {
    let mut x = Xml::new()?;
    x.open("w:styles", &[("xmlns:w", NS_W)])?;

    x.open("w:docDefaults", &[])?;
    x.open("w:rPrDefault", &[])?;
    x.open("w:rPr", &[])?;
    x.empty(
        "w:rFonts",
        &[
            ("w:ascii", "Calibri"),
            ("w:hAnsi", "Calibri"),
            ("w:eastAsia", "Calibri"),
            ("w:cs", "Calibri"),
        ],
    )?;
    x.val("w:sz", "22")?;
    x.val("w:szCs", "22")?;
    x.close("w:rPr")?;
    x.close("w:rPrDefault")?;
    x.open("w:pPrDefault", &[])?;
    x.open("w:pPr", &[])?;
    x.empty(
        "w:spacing",
        &[("w:after", "160"), ("w:line", "259"), ("w:lineRule", "auto")],
    )?;
    x.close("w:pPr")?;
    x.close("w:pPrDefault")?;
    x.close("w:docDefaults")?;

    for def in PARAGRAPH_STYLES {
        paragraph_style(&mut x, def)?;
    }
    for def in TABLE_STYLES {
        table_style(&mut x, def)?;
    }
    x.close("w:styles")?;
    Ok(x.finish())
}

fn style_open(x: &mut Xml, kind: &str, def: &StyleDef, default: bool) -> Result<(), PackageError> {
    let id = style_id(def.name);
    let mut attrs = vec![("w:type", kind), ("w:styleId", id.as_str())];
    if default {
        attrs.push(("w:default", "1"));
    }
    x.open("w:style", &attrs)?;
    x.val("w:name", def.name)?;
    if let Some(parent) = def.based_on {
        x.val("w:basedOn", &style_id(parent))?;
    }
    Ok(())
}

fn paragraph_style(x: &mut Xml, def: &StyleDef) -> Result<(), PackageError> {
    style_open(x, "paragraph", def, def.based_on.is_none())?;
    x.empty("w:qFormat", &[])?;
    if let Some(level) = def.name.strip_prefix("Heading ") {
        let outline = level.parse::<u8>().map(|l| l.saturating_sub(1)).unwrap_or(0);
        x.open("w:pPr", &[])?;
        x.empty("w:keepNext", &[])?;
        x.val("w:outlineLvl", &outline.to_string())?;
        x.close("w:pPr")?;
    }
    if def.bold || def.italic || def.color.is_some() || def.size.is_some() {
        x.open("w:rPr", &[])?;
        if def.bold {
            x.empty("w:b", &[])?;
        }
        if def.italic {
            x.empty("w:i", &[])?;
        }
        if let Some(color) = def.color {
            x.val("w:color", color)?;
        }
        if let Some(size) = def.size {
            x.val("w:sz", &size.to_string())?;
            x.val("w:szCs", &size.to_string())?;
        }
        x.close("w:rPr")?;
    }
    x.close("w:style")
}

fn table_style(x: &mut Xml, def: &StyleDef) -> Result<(), PackageError> {
    style_open(x, "table", def, def.based_on.is_none())?;
    if def.borders {
        x.open("w:tblPr", &[])?;
        x.open("w:tblBorders", &[])?;
        for edge in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
            x.empty(
                edge,
                &[
                    ("w:val", "single"),
                    ("w:sz", "4"),
                    ("w:space", "0"),
                    ("w:color", "auto"),
                ],
            )?;
        }
        x.close("w:tblBorders")?;
        x.close("w:tblPr")?;
    }
    x.close("w:style")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::{Alignment, ParagraphStyle};
    use crate::tree::Section;
    use crate::units::Length;

    fn hello_tree() -> DocumentTree {
        DocumentTree {
            properties: CoreProperties {
                title: Some("T & C".into()),
                ..CoreProperties::default()
            },
            sections: vec![Section {
                setup: PageSetup::default(),
                blocks: vec![Block::Paragraph(Paragraph {
                    style: Some(ParagraphStyle::heading(1).unwrap()),
                    format: ParagraphFormat {
                        alignment: Some(Alignment::Justify),
                        first_line_indent: Some(Length::inches(-0.5).unwrap()),
                        ..ParagraphFormat::default()
                    },
                    runs: vec![Run {
                        format: RunFormat {
                            bold: Some(true),
                            ..RunFormat::default()
                        },
                        content: vec![RunContent::Text("Hello <world>".into())],
                    }],
                })],
            }],
        }
    }

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn output_is_deterministic() {
        let tree = hello_tree();
        assert_eq!(write_package(&tree).unwrap(), write_package(&tree).unwrap());
    }

    #[test]
    fn document_part_escapes_and_orders_properties() {
        let xml = text(document(&hello_tree()).unwrap());
        assert!(xml.contains("Hello &lt;world&gt;"));
        assert!(xml.contains(r#"<w:pStyle w:val="Heading1"/>"#));
        assert!(xml.contains(r#"<w:ind w:hanging="720"/>"#));
        assert!(xml.contains(r#"<w:jc w:val="both"/>"#));
        assert!(xml.contains("<w:b/>"));
        let body_end = xml.rfind("</w:body>").unwrap();
        let sect = xml.rfind("<w:sectPr>").unwrap();
        assert!(sect < body_end);
    }

    #[test]
    fn non_final_sections_use_carrier_paragraphs() {
        let mut tree = hello_tree();
        tree.sections.push(Section::default());
        let xml = text(document(&tree).unwrap());
        assert_eq!(xml.matches("<w:sectPr>").count(), 2);
        assert!(xml.contains("<w:p><w:pPr><w:sectPr>"));
    }

    #[test]
    fn core_properties_escape_values() {
        let xml = text(core_properties(&hello_tree().properties).unwrap());
        assert!(xml.contains("<dc:title>T &amp; C</dc:title>"));
        assert!(!xml.contains("dc:creator"));
    }

    #[test]
    fn styles_part_marks_defaults() {
        let xml = text(styles().unwrap());
        assert!(xml.contains(r#"w:styleId="Normal" w:default="1""#));
        assert!(xml.contains(r#"w:styleId="NormalTable" w:default="1""#));
        assert!(xml.contains(r#"w:styleId="TableGrid""#));
    }
}
