//! Integration tests for the docsmith-sandbox crate.
//!
//! Scripts are run through the public [`SandboxRuntime`] the way the engine
//! runs them, and the populated builder is inspected afterwards.

use docsmith_dom::{DomError, Length, ParagraphStyle};
use docsmith_sandbox::{CancelToken, SandboxConfig, SandboxError, SandboxRuntime, ScriptFault};

fn run(code: &str) -> Result<docsmith_sandbox::Execution, ScriptFault> {
    SandboxRuntime::default().execute(code, &CancelToken::new())
}

fn run_with(config: SandboxConfig, code: &str) -> ScriptFault {
    SandboxRuntime::new(config)
        .execute(code, &CancelToken::new())
        .unwrap_err()
}

// ═══════════════════════════════════════════════════════════════════════
//  Document building
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn typical_generated_report() {
    let code = r#"
from docx import Document
from docx.shared import Pt, Inches, RGBColor
from docx.enum.text import WD_ALIGN_PARAGRAPH
from io import BytesIO

doc = Document()
doc.core_properties.title = "Sales"
doc.add_heading("Quarterly Sales", 0)

rows = [("North", 1200), ("South", 950), ("West", 1430)]
total = sum(amount for _, amount in rows)
intro = doc.add_paragraph(f"Total revenue: {total:,} units across {len(rows)} regions.")
intro.alignment = WD_ALIGN_PARAGRAPH.JUSTIFY

table = doc.add_table(rows=1, cols=2)
table.style = "Table Grid"
header = table.rows[0].cells
header[0].text = "Region"
header[1].text = "Units"
for name, amount in sorted(rows):
    cells = table.add_row().cells
    cells[0].text = name
    cells[1].text = str(amount)

note = doc.add_paragraph()
run = note.add_run("Prepared automatically.")
run.italic = True
run.font.size = Pt(9)
run.font.color.rgb = RGBColor(0x80, 0x80, 0x80)

buffer = BytesIO()
doc.save(buffer)
"#;
    let exec = run(code).unwrap();
    let b = &exec.builder;
    let paragraphs = b.body_paragraphs();
    assert_eq!(paragraphs.len(), 3);
    assert_eq!(
        b.paragraph_text(paragraphs[1]).unwrap(),
        "Total revenue: 3,580 units across 3 regions."
    );
    assert_eq!(
        b.paragraph_style(paragraphs[0]).unwrap(),
        Some(ParagraphStyle::heading(0).unwrap())
    );
    let table = b.body_table_at(0).unwrap();
    assert_eq!(b.row_count(table).unwrap(), 4);
    let cell = b.cell_at(table, 3, 0).unwrap();
    assert_eq!(b.cell_text(cell).unwrap(), "West");
    let run = b.run_at(paragraphs[2], 0).unwrap();
    assert_eq!(b.run_format(run).unwrap().size, Some(Length::whole_points(9)));
}

#[test]
fn indexing_beyond_materialized_rows_names_the_call() {
    let fault = run(
        "from docx import Document\ndoc = Document()\ntable = doc.add_table(rows=0, cols=3)\ncell = table.rows[0].cells[0]\n",
    )
    .unwrap_err();
    assert_eq!(fault.line, Some(4));
    assert_eq!(
        fault.error.to_string(),
        "table.rows[0]: row index 0 is out of range, the table has 0 rows; call table.add_row() first"
    );
}

#[test]
fn cell_column_beyond_width_is_structural() {
    let fault = run(
        "from docx import Document\ndoc = Document()\nt = doc.add_table(rows=2, cols=3)\nt.cell(0, 5).text = 'x'\n",
    )
    .unwrap_err();
    assert!(matches!(fault.error, SandboxError::Dom(DomError::Structure { .. })));
}

#[test]
fn second_document_is_rejected() {
    let fault = run("from docx import Document\na = Document()\nb = Document()\n").unwrap_err();
    assert_eq!(fault.error, SandboxError::Dom(DomError::DuplicateDocument));
    assert_eq!(fault.line, Some(3));
}

// ═══════════════════════════════════════════════════════════════════════
//  Capability guard
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn dangerous_names_are_denied_with_a_reason() {
    let fault = run("f = open('/etc/passwd')\n").unwrap_err();
    assert!(matches!(
        fault.error,
        SandboxError::Denied { ref name, reason } if name == "open" && reason.contains("filesystem")
    ));

    let fault = run("import os\n").unwrap_err();
    assert!(matches!(fault.error, SandboxError::ImportDenied { .. }));

    let fault = run("x = ().__class__\n").unwrap_err();
    assert!(matches!(fault.error, SandboxError::Denied { .. }));

    let fault = run("from docx import Document\nDocument('template.docx')\n").unwrap_err();
    assert!(matches!(fault.error, SandboxError::Denied { .. }));
}

#[test]
fn unknown_names_are_undefined() {
    let fault = run("x = 1\ny = mystery(x)\n").unwrap_err();
    assert_eq!(fault.line, Some(2));
    assert!(matches!(fault.error, SandboxError::UndefinedName(ref n) if n == "mystery"));
}

#[test]
fn unsupported_constructs_fail_to_parse() {
    let rt = SandboxRuntime::default();
    for code in [
        "def f():\n    pass\n",
        "class A:\n    pass\n",
        "f = lambda x: x\n",
        "try:\n    x = 1\nexcept Exception:\n    pass\n",
        "with x as y:\n    pass\n",
    ] {
        let err = rt.parse(code).unwrap_err();
        assert_eq!(err.line, 1, "{code}");
    }
}

#[test]
fn long_operator_chains_fail_cleanly() {
    for op in ["+1", " and 1", " or x", " - n * 2"] {
        let code = format!("n = 1\nx = 1{}\n", op.repeat(10_000));
        let fault = run(&code).unwrap_err();
        match fault.error {
            SandboxError::Syntax(e) => {
                assert_eq!(e.message, "expression is too long", "{op}");
                assert_eq!(e.line, 2);
            }
            other => panic!("expected a syntax error for {op:?}, got {other}"),
        }
    }

    let code = format!("x = 0{}\n", " + 1".repeat(80));
    assert!(run(&code).is_ok());
}

// ═══════════════════════════════════════════════════════════════════════
//  Resource guard
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn step_budget_stops_infinite_loop() {
    let fault = run_with(
        SandboxConfig::new().with_max_steps(10_000),
        "while True:\n    pass\n",
    );
    assert_eq!(fault.error, SandboxError::StepLimit { limit: 10_000 });
}

#[test]
fn deadline_stops_infinite_loop() {
    let fault = run_with(
        SandboxConfig::new()
            .with_timeout_ms(50)
            .with_max_steps(u64::MAX),
        "x = 0\nwhile True:\n    x = x + 1\n    if x > 1000000000:\n        x = 0\n",
    );
    assert_eq!(fault.error, SandboxError::Timeout { limit_ms: 50 });
}

#[test]
fn object_cap_stops_paragraph_flood() {
    let fault = run_with(
        SandboxConfig::new().with_max_objects(100),
        "from docx import Document\ndoc = Document()\nfor i in range(1000):\n    doc.add_paragraph('row')\n",
    );
    assert!(matches!(fault.error, SandboxError::Dom(DomError::ObjectLimit { .. })));
    assert_eq!(fault.line, Some(4));
}

#[test]
fn heap_caps_stop_growth() {
    let fault = run_with(
        SandboxConfig::new().with_max_collection_len(1_000),
        "xs = list(range(5000))\n",
    );
    assert!(matches!(fault.error, SandboxError::Limit { .. }));

    let fault = run_with(
        SandboxConfig::new().with_max_string_bytes(1_024),
        "s = 'a'\nwhile True:\n    s = s + s\n",
    );
    assert!(matches!(fault.error, SandboxError::Limit { .. }));
}

#[test]
fn cancellation_from_another_thread() {
    let rt = SandboxRuntime::new(SandboxConfig::new().with_max_steps(u64::MAX));
    let token = CancelToken::new();
    let remote = token.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        remote.cancel();
    });
    let fault = rt.execute("while True:\n    pass\n", &token).unwrap_err();
    canceller.join().unwrap();
    assert_eq!(fault.error, SandboxError::Cancelled);
}

// ═══════════════════════════════════════════════════════════════════════
//  Determinism
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn identical_code_gives_identical_faults() {
    let code = "from docx import Document\ndoc = Document()\nt = doc.add_table(rows=1, cols=2)\nt.rows[3]\n";
    let first = run(code).unwrap_err();
    let second = run(code).unwrap_err();
    assert_eq!(first, second);
}
