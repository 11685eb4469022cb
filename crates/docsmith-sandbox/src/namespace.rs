//! The execution namespace: every symbol a script can reach.
//!
//! The tables here are immutable and enumerate the whole surface. A name is
//! either pre-bound, importable from one of the allowed modules, explicitly
//! denied with a reason, or undefined. Nothing else is reachable.

use serde::Serialize;

use docsmith_dom::Unit;

use crate::error::{Result, SandboxError};
use crate::value::{Builtin, EnumClass, EnumKind, Value};

pub(crate) const FILESYSTEM: &str = "filesystem access is not available";
const NETWORK: &str = "network access is not available";
const PROCESS: &str = "process control is not available";
const THREADS: &str = "threads and async runtimes are not available";
const EVALUATION: &str = "dynamic code evaluation is not available";
const DYNAMIC_IMPORT: &str = "dynamic import is not available";
const REFLECTION: &str = "reflection is not available";
const INTERNALS: &str = "low-level package access is not available";

/// A symbol an allowed module or the global scope exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Export {
    Builtin(Builtin),
    Enum(EnumKind, &'static str),
    Module(&'static str),
}

impl Export {
    fn value(self) -> Value {
        match self {
            Self::Builtin(b) => Value::Builtin(b),
            Self::Enum(kind, name) => Value::EnumClass(EnumClass { kind, name }),
            Self::Module(name) => Value::Module(name),
        }
    }

    fn kind(self) -> &'static str {
        match self {
            Self::Builtin(Builtin::Document) => "constructor",
            Self::Builtin(Builtin::Unit(_) | Builtin::RgbColor) => "measurement",
            Self::Builtin(Builtin::BytesIO) => "buffer",
            Self::Builtin(_) => "builtin",
            Self::Enum(..) => "enumeration",
            Self::Module(_) => "module",
        }
    }
}

const SAFE_BUILTINS: &[(&str, Export)] = &[
    ("len", Export::Builtin(Builtin::Len)),
    ("range", Export::Builtin(Builtin::Range)),
    ("str", Export::Builtin(Builtin::Str)),
    ("int", Export::Builtin(Builtin::Int)),
    ("float", Export::Builtin(Builtin::Float)),
    ("bool", Export::Builtin(Builtin::Bool)),
    ("list", Export::Builtin(Builtin::List)),
    ("tuple", Export::Builtin(Builtin::Tuple)),
    ("dict", Export::Builtin(Builtin::Dict)),
    ("enumerate", Export::Builtin(Builtin::Enumerate)),
    ("zip", Export::Builtin(Builtin::Zip)),
    ("min", Export::Builtin(Builtin::Min)),
    ("max", Export::Builtin(Builtin::Max)),
    ("abs", Export::Builtin(Builtin::Abs)),
    ("round", Export::Builtin(Builtin::Round)),
    ("sum", Export::Builtin(Builtin::Sum)),
    ("sorted", Export::Builtin(Builtin::Sorted)),
    ("reversed", Export::Builtin(Builtin::Reversed)),
    ("any", Export::Builtin(Builtin::Any)),
    ("all", Export::Builtin(Builtin::All)),
    ("print", Export::Builtin(Builtin::Print)),
];

const DOCX_SHARED: &[(&str, Export)] = &[
    ("Pt", Export::Builtin(Builtin::Unit(Unit::Point))),
    ("Inches", Export::Builtin(Builtin::Unit(Unit::Inch))),
    ("Cm", Export::Builtin(Builtin::Unit(Unit::Centimeter))),
    ("Mm", Export::Builtin(Builtin::Unit(Unit::Millimeter))),
    ("Emu", Export::Builtin(Builtin::Unit(Unit::Emu))),
    ("Twips", Export::Builtin(Builtin::Unit(Unit::Twip))),
    ("Length", Export::Builtin(Builtin::Unit(Unit::Emu))),
    ("RGBColor", Export::Builtin(Builtin::RgbColor)),
];

const DOCX_ENUM_TEXT: &[(&str, Export)] = &[
    (
        "WD_ALIGN_PARAGRAPH",
        Export::Enum(EnumKind::ParagraphAlignment, "WD_ALIGN_PARAGRAPH"),
    ),
    (
        "WD_PARAGRAPH_ALIGNMENT",
        Export::Enum(EnumKind::ParagraphAlignment, "WD_PARAGRAPH_ALIGNMENT"),
    ),
    ("WD_BREAK", Export::Enum(EnumKind::Break, "WD_BREAK")),
    ("WD_BREAK_TYPE", Export::Enum(EnumKind::Break, "WD_BREAK_TYPE")),
];

const DOCX_ENUM_SECTION: &[(&str, Export)] = &[
    ("WD_ORIENT", Export::Enum(EnumKind::Orientation, "WD_ORIENT")),
    ("WD_ORIENTATION", Export::Enum(EnumKind::Orientation, "WD_ORIENTATION")),
    ("WD_SECTION", Export::Enum(EnumKind::SectionStart, "WD_SECTION")),
    ("WD_SECTION_START", Export::Enum(EnumKind::SectionStart, "WD_SECTION_START")),
];

const DOCX_ENUM_TABLE: &[(&str, Export)] = &[(
    "WD_TABLE_ALIGNMENT",
    Export::Enum(EnumKind::TableAlignment, "WD_TABLE_ALIGNMENT"),
)];

/// Allowed modules and their exports.
const MODULES: &[(&str, &[(&str, Export)])] = &[
    (
        "docx",
        &[
            ("Document", Export::Builtin(Builtin::Document)),
            ("shared", Export::Module("docx.shared")),
            ("enum", Export::Module("docx.enum")),
        ],
    ),
    ("docx.shared", DOCX_SHARED),
    (
        "docx.enum",
        &[
            ("text", Export::Module("docx.enum.text")),
            ("section", Export::Module("docx.enum.section")),
            ("table", Export::Module("docx.enum.table")),
        ],
    ),
    ("docx.enum.text", DOCX_ENUM_TEXT),
    ("docx.enum.section", DOCX_ENUM_SECTION),
    ("docx.enum.table", DOCX_ENUM_TABLE),
    ("io", &[("BytesIO", Export::Builtin(Builtin::BytesIO))]),
];

/// Modules that exist in the language ecosystem but are refused, keyed by
/// dotted prefix.
const DENIED_MODULES: &[(&str, &str)] = &[
    ("os", FILESYSTEM),
    ("pathlib", FILESYSTEM),
    ("shutil", FILESYSTEM),
    ("glob", FILESYSTEM),
    ("tempfile", FILESYSTEM),
    ("fileinput", FILESYSTEM),
    ("pickle", FILESYSTEM),
    ("subprocess", PROCESS),
    ("multiprocessing", PROCESS),
    ("signal", PROCESS),
    ("pty", PROCESS),
    ("threading", THREADS),
    ("_thread", THREADS),
    ("asyncio", THREADS),
    ("concurrent", THREADS),
    ("socket", NETWORK),
    ("ssl", NETWORK),
    ("requests", NETWORK),
    ("urllib", NETWORK),
    ("http", NETWORK),
    ("ftplib", NETWORK),
    ("smtplib", NETWORK),
    ("sys", REFLECTION),
    ("inspect", REFLECTION),
    ("ctypes", REFLECTION),
    ("gc", REFLECTION),
    ("builtins", REFLECTION),
    ("types", REFLECTION),
    ("importlib", DYNAMIC_IMPORT),
    ("runpy", EVALUATION),
    ("code", EVALUATION),
    ("docx.oxml", INTERNALS),
    ("docx.opc", INTERNALS),
    ("docx.parts", INTERNALS),
    ("lxml", INTERNALS),
];

/// Builtin names refused with a specific reason.
const DENIED_NAMES: &[(&str, &str)] = &[
    ("open", FILESYSTEM),
    ("eval", EVALUATION),
    ("exec", EVALUATION),
    ("compile", EVALUATION),
    ("__import__", DYNAMIC_IMPORT),
    ("getattr", REFLECTION),
    ("setattr", REFLECTION),
    ("delattr", REFLECTION),
    ("hasattr", REFLECTION),
    ("globals", REFLECTION),
    ("locals", REFLECTION),
    ("vars", REFLECTION),
    ("dir", REFLECTION),
    ("type", REFLECTION),
    ("id", REFLECTION),
    ("object", REFLECTION),
    ("super", REFLECTION),
    ("isinstance", REFLECTION),
    ("issubclass", REFLECTION),
    ("input", "interactive input is not available"),
    ("exit", PROCESS),
    ("quit", PROCESS),
    ("breakpoint", "debugging is not available"),
    ("help", "interactive help is not available"),
];

pub(crate) const SPECIAL: &str = "special names are not accessible";

/// Reason why `name` is refused, if it is a known dangerous name.
pub fn denied_name(name: &str) -> Option<&'static str> {
    if let Some((_, reason)) = DENIED_NAMES.iter().find(|(n, _)| *n == name) {
        return Some(*reason);
    }
    if let Some(reason) = denied_module(name) {
        return Some(reason);
    }
    name.starts_with("__").then_some(SPECIAL)
}

/// Reason why an attribute is refused: every `_`-prefixed attribute is.
pub fn denied_attribute(name: &str) -> Option<&'static str> {
    if name.starts_with("__") {
        Some(SPECIAL)
    } else if name.starts_with('_') {
        Some("private attributes are not accessible")
    } else {
        None
    }
}

fn denied_module(module: &str) -> Option<&'static str> {
    DENIED_MODULES
        .iter()
        .find(|(prefix, _)| {
            module == *prefix
                || module
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('.'))
        })
        .map(|(_, reason)| *reason)
}

/// Value of a pre-bound global: the safe builtins plus the document names.
pub fn builtin_global(name: &str) -> Option<Value> {
    if name == "Document" {
        return Some(Value::Builtin(Builtin::Document));
    }
    SAFE_BUILTINS
        .iter()
        .chain(DOCX_SHARED)
        .chain(DOCX_ENUM_TEXT)
        .chain(DOCX_ENUM_SECTION)
        .chain(DOCX_ENUM_TABLE)
        .find(|(n, _)| *n == name)
        .map(|(_, export)| export.value())
}

/// Resolve an import, returning the canonical module name.
pub fn import_module(module: &str) -> Result<&'static str> {
    if let Some((name, _)) = MODULES.iter().find(|(name, _)| *name == module) {
        return Ok(*name);
    }
    let reason = denied_module(module).unwrap_or(
        "only docx, docx.shared, docx.enum.text, docx.enum.section, docx.enum.table and io can be imported",
    );
    tracing::debug!(module, reason, "import denied");
    Err(SandboxError::ImportDenied {
        module: module.to_string(),
        reason: reason.to_string(),
    })
}

/// An export of an allowed module.
pub fn module_attr(module: &str, name: &str) -> Option<Value> {
    MODULES
        .iter()
        .find(|(m, _)| *m == module)
        .and_then(|(_, exports)| exports.iter().find(|(n, _)| *n == name))
        .map(|(_, export)| export.value())
}

/// `from module import name`.
pub fn import_name(module: &'static str, name: &str) -> Result<Value> {
    if let Some(value) = module_attr(module, name) {
        return Ok(value);
    }
    let dotted = format!("{module}.{name}");
    if let Some(reason) = denied_module(&dotted) {
        return Err(SandboxError::ImportDenied {
            module: dotted,
            reason: reason.to_string(),
        });
    }
    Err(SandboxError::ImportDenied {
        module: dotted,
        reason: format!("'{module}' does not export '{name}'"),
    })
}

// ---------------------------------------------------------------------------
// Description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SymbolInfo {
    pub name: &'static str,
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub name: &'static str,
    pub exports: Vec<SymbolInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeniedInfo {
    pub name: &'static str,
    pub reason: &'static str,
}

/// The full namespace surface, for tooling and documentation.
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceDescription {
    pub globals: Vec<SymbolInfo>,
    pub modules: Vec<ModuleInfo>,
    pub denied_names: Vec<DeniedInfo>,
    pub denied_modules: Vec<DeniedInfo>,
}

pub fn describe() -> NamespaceDescription {
    let symbols = |table: &[(&'static str, Export)]| {
        table
            .iter()
            .map(|(name, export)| SymbolInfo {
                name: *name,
                kind: export.kind(),
            })
            .collect::<Vec<_>>()
    };
    let mut globals = vec![SymbolInfo {
        name: "Document",
        kind: Export::Builtin(Builtin::Document).kind(),
    }];
    for table in [
        SAFE_BUILTINS,
        DOCX_SHARED,
        DOCX_ENUM_TEXT,
        DOCX_ENUM_SECTION,
        DOCX_ENUM_TABLE,
    ] {
        globals.extend(symbols(table));
    }
    let denied = |table: &[(&'static str, &'static str)]| {
        table
            .iter()
            .map(|(name, reason)| DeniedInfo {
                name: *name,
                reason: *reason,
            })
            .collect::<Vec<_>>()
    };
    NamespaceDescription {
        globals,
        modules: MODULES
            .iter()
            .map(|(name, exports)| ModuleInfo {
                name: *name,
                exports: symbols(exports),
            })
            .collect(),
        denied_names: denied(DENIED_NAMES),
        denied_modules: denied(DENIED_MODULES),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_names_are_prebound() {
        assert!(matches!(builtin_global("Document"), Some(Value::Builtin(Builtin::Document))));
        assert!(matches!(
            builtin_global("Pt"),
            Some(Value::Builtin(Builtin::Unit(Unit::Point)))
        ));
        assert!(matches!(builtin_global("WD_ORIENT"), Some(Value::EnumClass(_))));
        assert!(builtin_global("open").is_none());
        assert!(builtin_global("BytesIO").is_none());
    }

    #[test]
    fn dangerous_names_have_reasons() {
        assert_eq!(denied_name("open"), Some(FILESYSTEM));
        assert_eq!(denied_name("eval"), Some(EVALUATION));
        assert_eq!(denied_name("os"), Some(FILESYSTEM));
        assert_eq!(denied_name("__builtins__"), Some(SPECIAL));
        assert_eq!(denied_name("table"), None);
        assert_eq!(denied_attribute("__class__"), Some(SPECIAL));
        assert!(denied_attribute("_element").is_some());
        assert_eq!(denied_attribute("text"), None);
    }

    #[test]
    fn imports_resolve_or_explain() {
        assert_eq!(import_module("docx.enum.text").unwrap(), "docx.enum.text");
        match import_module("os.path").unwrap_err() {
            SandboxError::ImportDenied { reason, .. } => assert_eq!(reason, FILESYSTEM),
            other => panic!("{other:?}"),
        }
        match import_module("numpy").unwrap_err() {
            SandboxError::ImportDenied { reason, .. } => assert!(reason.contains("can be imported")),
            other => panic!("{other:?}"),
        }
        assert!(matches!(import_module("docx.oxml.ns"), Err(SandboxError::ImportDenied { .. })));
        assert!(import_module("osmosis").is_err());
    }

    #[test]
    fn from_imports_check_exports() {
        assert!(matches!(
            import_name("docx.shared", "Inches").unwrap(),
            Value::Builtin(Builtin::Unit(Unit::Inch))
        ));
        let err = import_name("io", "StringIO").unwrap_err();
        assert!(err.to_string().contains("'io' does not export 'StringIO'"));
        match import_name("docx", "oxml").unwrap_err() {
            SandboxError::ImportDenied { reason, .. } => assert_eq!(reason, INTERNALS),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn description_covers_modules() {
        let description = describe();
        assert!(description.globals.iter().any(|s| s.name == "Document"));
        assert_eq!(description.modules.len(), MODULES.len());
        assert!(description.denied_names.iter().any(|d| d.name == "open"));
    }
}
