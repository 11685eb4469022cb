//! Integration tests for the docsmith-engine crate.
//!
//! Every test submits script text to an [`Engine`] and checks either the
//! decoded package or the diagnostic that came back.

use docsmith_dom::{BlockOutline, DocumentCodec, DocumentOutline, DocxCodec};
use docsmith_engine::{CancelToken, DiagnosticKind, Engine, EngineConfig, ExecutionResult};

fn engine() -> Engine {
    Engine::with_defaults().unwrap()
}

fn decode(result: ExecutionResult) -> DocumentOutline {
    let bytes = result.into_result().unwrap();
    DocxCodec.decode(&bytes).unwrap()
}

fn failure(result: &ExecutionResult) -> (DiagnosticKind, Option<u32>) {
    let d = result.diagnostic().expect("expected a failure");
    assert!(result.bytes().is_none());
    (d.kind, d.line)
}

fn table_script(rows: usize) -> String {
    format!(
        "\
from docx import Document
doc = Document()
t = doc.add_table(rows=0, cols=2)
for i in range({rows}):
    cells = t.add_row().cells
    cells[0].text = f'row {{i}}'
    cells[1].text = str(i * i)
"
    )
}

// ═══════════════════════════════════════════════════════════════════════
//  Concrete scenarios
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn hello_paragraph_round_trips() {
    let outline = decode(engine().execute(
        "from docx import Document\ndoc = Document()\ndoc.add_paragraph('Hello')\n",
    ));
    let paragraphs: Vec<_> = outline.paragraphs().collect();
    assert_eq!(paragraphs.len(), 1);
    assert_eq!(paragraphs[0].runs, vec!["Hello".to_string()]);
}

#[test]
fn formatting_row_before_append_is_structural() {
    let code = "\
from docx import Document
from docx.shared import Pt
doc = Document()
table = doc.add_table(rows=0, cols=3)
table.rows[0].height = Pt(20)
table.add_row()
";
    let result = engine().execute(code);
    assert_eq!(
        failure(&result),
        (DiagnosticKind::StructuralViolation, Some(5))
    );
    let d = result.diagnostic().unwrap();
    assert_eq!(d.source.as_deref(), Some("table.rows[0].height = Pt(20)"));
    assert!(d.message.starts_with("table.rows[0]:"), "{}", d.message);
}

#[test]
fn endless_loop_hits_the_deadline() {
    let engine = Engine::new(
        EngineConfig::new()
            .with_timeout_ms(200)
            .with_max_steps(u64::MAX),
    )
    .unwrap();
    let started = std::time::Instant::now();
    let result = engine.execute("while True:\n    pass\n");
    assert_eq!(failure(&result).0, DiagnosticKind::ResourceExceeded);
    assert!(started.elapsed() >= std::time::Duration::from_millis(200));
    assert!(result.diagnostic().unwrap().message.contains("time limit"));
}

#[test]
fn opening_a_file_is_a_capability_violation() {
    let code = "from docx import Document\ndoc = Document()\ndata = open('/etc/passwd').read()\n";
    assert_eq!(
        failure(&engine().execute(code)),
        (DiagnosticKind::CapabilityViolation, Some(3))
    );
}

#[test]
fn concurrent_tables_do_not_mix() {
    let engine = engine();
    let (two, five) = std::thread::scope(|s| {
        let a = s.spawn(|| engine.execute(&table_script(2)));
        let b = s.spawn(|| engine.execute(&table_script(5)));
        (a.join().unwrap(), b.join().unwrap())
    });
    let two = decode(two);
    let five = decode(five);
    assert_eq!(two.tables().next().unwrap().rows.len(), 2);
    assert_eq!(five.tables().next().unwrap().rows.len(), 5);
    assert_eq!(five.tables().next().unwrap().rows[4], vec!["row 4", "16"]);
}

// ═══════════════════════════════════════════════════════════════════════
//  Properties
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn sections_paragraphs_and_tables_keep_order() {
    let code = "\
from docx import Document
from docx.enum.section import WD_SECTION
doc = Document()
doc.add_heading('Title', 0)
doc.add_paragraph('one')
doc.add_table(rows=1, cols=1).cell(0, 0).text = 'a'
doc.add_section(WD_SECTION.NEW_PAGE)
doc.add_paragraph('two')
doc.add_table(rows=2, cols=2)
doc.add_paragraph('three')
";
    let outline = decode(engine().execute(code));
    assert_eq!(outline.sections.len(), 2);
    assert_eq!(outline.paragraphs().count(), 4);
    assert_eq!(outline.tables().count(), 2);
    let texts: Vec<String> = outline.paragraphs().map(|p| p.text()).collect();
    assert_eq!(texts, ["Title", "one", "two", "three"]);
    let second: Vec<&str> = outline.sections[1]
        .blocks
        .iter()
        .map(|b| match b {
            BlockOutline::Paragraph(_) => "p",
            BlockOutline::Table(_) => "t",
        })
        .collect();
    assert_eq!(second, ["p", "t", "p"]);
}

#[test]
fn column_beyond_row_width_is_structural() {
    let code = "\
from docx import Document
doc = Document()
t = doc.add_table(rows=1, cols=3)
row = t.rows[0]
row.cells[5].text = 'x'
";
    assert_eq!(
        failure(&engine().execute(code)),
        (DiagnosticKind::StructuralViolation, Some(5))
    );
}

#[test]
fn object_flood_hits_the_object_cap() {
    let engine = Engine::new(EngineConfig::new().with_max_objects(500)).unwrap();
    let code = "\
from docx import Document
doc = Document()
while True:
    doc.add_paragraph('more')
";
    let (kind, line) = failure(&engine.execute(code));
    assert_eq!(kind, DiagnosticKind::ResourceExceeded);
    assert_eq!(line, Some(4));
}

#[test]
fn failures_are_idempotent() {
    let engine = engine();
    let code = "from docx import Document\ndoc = Document()\np = doc.add_paragraph('x')\np.runs[2].bold = True\n";
    let first = engine.execute(code);
    for _ in 0..5 {
        assert_eq!(engine.execute(code), first);
    }
    assert_eq!(failure(&first), (DiagnosticKind::StructuralViolation, Some(4)));
}

#[test]
fn concurrent_runs_match_sequential_runs() {
    let engine = engine();
    let scripts = [table_script(3), table_script(7)];
    let sequential: Vec<ExecutionResult> = scripts.iter().map(|s| engine.execute(s)).collect();
    let concurrent: Vec<Vec<ExecutionResult>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| scripts.iter().map(|c| engine.execute(c)).collect::<Vec<_>>()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for results in concurrent {
        assert_eq!(results, sequential);
    }
}

#[test]
fn type_errors_echo_the_value() {
    let code = "\
from docx import Document
from docx.shared import Pt
doc = Document()
run = doc.add_paragraph().add_run('x')
run.font.size = Pt(5000)
";
    let result = engine().execute(code);
    assert_eq!(failure(&result), (DiagnosticKind::TypeMismatch, Some(5)));
}

#[test]
fn syntax_errors_report_line_and_column() {
    let result = engine().execute("from docx import Document\ndoc = Document(\n");
    let d = result.diagnostic().unwrap();
    assert_eq!(d.kind, DiagnosticKind::SyntaxError);
    assert!(d.line.is_some());
    assert!(d.column.is_some());
}

#[test]
fn long_operator_chain_is_a_syntax_error() {
    let engine = engine();
    for op in ["+1", " and 1"] {
        let chain = op.repeat(10_000);
        let code = format!("from docx import Document\ndoc = Document()\nx = 1{chain}\n");
        let result = engine.execute(&code);
        assert_eq!(failure(&result), (DiagnosticKind::SyntaxError, Some(3)));
        assert_eq!(result.diagnostic().unwrap().message, "expression is too long");
    }
}

#[test]
fn incomplete_tree_is_a_serialization_failure() {
    // A table with no rows cannot be written as a valid package.
    let code = "from docx import Document\ndoc = Document()\ndoc.add_table(rows=0, cols=2)\n";
    assert_eq!(
        failure(&engine().execute(code)).0,
        DiagnosticKind::SerializationFailure
    );
}

// ═══════════════════════════════════════════════════════════════════════
//  Async
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn async_runs_are_independent() {
    let engine = engine();
    let (a, b) = tokio::join!(
        engine.execute_async(table_script(2)),
        engine.execute_async(table_script(5))
    );
    assert_eq!(decode(a).tables().next().unwrap().rows.len(), 2);
    assert_eq!(decode(b).tables().next().unwrap().rows.len(), 5);
}

#[tokio::test]
async fn dropped_future_cancels_the_worker() {
    let engine = Engine::new(
        EngineConfig::new()
            .with_timeout_ms(60_000)
            .with_max_steps(u64::MAX),
    )
    .unwrap();
    let run = engine.execute_async("while True:\n    pass\n");
    let outcome = tokio::time::timeout(std::time::Duration::from_millis(50), run).await;
    assert!(outcome.is_err());
    // The worker observes the cancellation and the runtime can shut down
    // without waiting out the 60 s deadline.
}

#[test]
fn caller_token_cancels() {
    let engine = Engine::new(EngineConfig::new().with_max_steps(u64::MAX)).unwrap();
    let token = CancelToken::new();
    token.cancel();
    let result = engine.execute_with_token("while True:\n    pass\n", &token);
    assert_eq!(failure(&result).0, DiagnosticKind::ResourceExceeded);
}
