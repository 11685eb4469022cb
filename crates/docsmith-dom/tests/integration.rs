//! Integration tests for the docsmith-dom crate.
//!
//! These tests drive the builder facade end to end and push the finished
//! tree through the docx codec and back.

use docsmith_dom::{
    Alignment, BlockOutline, BreakKind, DocumentBuilder, DocumentCodec, DocxCodec, DomError,
    Length, Orientation, PackageError, PageSetting, ParagraphSetting, ParagraphStyle, RunSetting,
    SectionStart, TableStyle,
};

fn open(max_objects: usize) -> DocumentBuilder {
    let mut builder = DocumentBuilder::new(max_objects);
    builder.open_document().unwrap();
    builder
}

// ═══════════════════════════════════════════════════════════════════════
//  Round trip
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn sections_paragraphs_and_tables_survive_round_trip() {
    let mut b = open(10_000);
    b.add_heading("Quarterly report", 0).unwrap();
    b.add_paragraph("Intro", Some(ParagraphStyle::named("style", "Quote").unwrap()))
        .unwrap();
    let t = b.add_table(2, 3).unwrap();
    b.set_table_style(t, Some(TableStyle::named("style", "Table Grid").unwrap()))
        .unwrap();
    for r in 0..2 {
        for c in 0..3 {
            let cell = b.cell_at(t, r, c).unwrap();
            b.set_cell_text(cell, &format!("r{r}c{c}")).unwrap();
        }
    }
    let s = b.add_section(SectionStart::NewPage).unwrap();
    b.update_page_setup(s, PageSetting::Orientation(Orientation::Landscape))
        .unwrap();
    b.add_paragraph("Appendix", None).unwrap();
    b.add_page_break().unwrap();
    b.add_table(1, 1).unwrap();

    let tree = b.finalize().unwrap();
    let bytes = DocxCodec.encode(&tree).unwrap();
    let outline = DocxCodec.decode(&bytes).unwrap();

    assert_eq!(outline.sections.len(), 2);
    assert_eq!(outline.paragraphs().count(), 4);
    assert_eq!(outline.tables().count(), 2);
    assert_eq!(outline.sections[1].orientation, "landscape");

    let kinds: Vec<&str> = outline.sections[0]
        .blocks
        .iter()
        .map(|b| match b {
            BlockOutline::Paragraph(_) => "p",
            BlockOutline::Table(_) => "t",
        })
        .collect();
    assert_eq!(kinds, ["p", "p", "t"]);

    let first = outline.paragraphs().next().unwrap();
    assert_eq!(first.style.as_deref(), Some("Title"));
    assert_eq!(first.text(), "Quarterly report");

    let table = outline.tables().next().unwrap();
    assert_eq!(table.style.as_deref(), Some("Table Grid"));
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[1][2], "r1c2");
}

#[test]
fn formatting_reaches_the_package() {
    let mut b = open(1_000);
    let p = b.add_paragraph("", None).unwrap();
    let r = b.add_run(p, "Bold").unwrap();
    b.update_run_format(r, RunSetting::Bold(Some(true))).unwrap();
    b.update_run_format(r, RunSetting::Size(Some(Length::points(14.0).unwrap())))
        .unwrap();
    b.update_paragraph_format(p, ParagraphSetting::Alignment(Some(Alignment::Center)))
        .unwrap();
    b.add_break(r, BreakKind::Line).unwrap();
    b.add_run_text(r, "next").unwrap();

    let bytes = DocxCodec.encode(&b.finalize().unwrap()).unwrap();
    let outline = DocxCodec.decode(&bytes).unwrap();
    let paragraph = outline.paragraphs().next().unwrap();
    assert_eq!(paragraph.runs, ["Bold\nnext"]);
}

#[test]
fn encoding_is_byte_deterministic() {
    let build = || {
        let mut b = open(1_000);
        b.add_paragraph("Hello", None).unwrap();
        b.add_table(2, 2).unwrap();
        DocxCodec.encode(&b.finalize().unwrap()).unwrap()
    };
    assert_eq!(build(), build());
}

// ═══════════════════════════════════════════════════════════════════════
//  Structural guards
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn premature_row_access_names_the_call() {
    let mut b = open(1_000);
    let t = b.add_table(0, 2).unwrap();
    match b.row_at(t, 0) {
        Err(DomError::Structure { operation, detail }) => {
            assert_eq!(operation, "table.rows[0]");
            assert!(detail.contains("the table has 0 rows"));
        }
        other => panic!("expected structure error, got {other:?}"),
    }
}

#[test]
fn empty_table_fails_at_encode_not_before() {
    let mut b = open(1_000);
    b.add_table(0, 2).unwrap();
    let tree = b.finalize().unwrap();
    assert!(matches!(
        DocxCodec.encode(&tree),
        Err(PackageError::Incomplete(_))
    ));
}

#[test]
fn document_without_content_has_no_sections() {
    let mut b = open(10);
    let tree = b.finalize().unwrap();
    assert!(tree.sections.is_empty());
    assert!(DocxCodec.encode(&tree).is_err());
}

#[test]
fn object_cap_stops_a_runaway_builder() {
    let mut b = open(50);
    let mut created = 0;
    let err = loop {
        match b.add_paragraph("x", None) {
            Ok(_) => created += 1,
            Err(e) => break e,
        }
    };
    assert!(matches!(err, DomError::ObjectLimit { limit: 50, .. }));
    assert!(b.object_count() <= 50);
    assert!(created > 0);
}
