//! Runtime values and the per-execution heap.
//!
//! Scalars, strings and tuples are immutable and live inline in [`Value`].
//! Lists and dicts are mutable and shared by reference, so they are stored
//! in a [`Heap`] arena and addressed by [`HeapId`]. The arena is dropped as a
//! whole when the execution ends; reference cycles between containers
//! therefore cannot leak.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use docsmith_dom::{
    Alignment, BreakKind, CellId, Color, ColumnRef, Length, Orientation, ParagraphId,
    ParagraphStyle, RowRef, RunId, SectionId, SectionStart, TableId, TableStyle, Unit,
};

use crate::config::MAX_VALUE_DEPTH;
use crate::error::{Result, SandboxError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapId(usize);

/// A script value.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(HeapId),
    Dict(HeapId),
    Tuple(Rc<[Value]>),
    /// A lazy `range(start, stop, step)`; `step` is never zero.
    Range { start: i64, stop: i64, step: i64 },
    Length(Length),
    Color(Color),
    Enum(EnumValue),
    EnumClass(EnumClass),
    Module(&'static str),
    Builtin(Builtin),
    Handle(Handle),
    Method(Rc<Method>),
}

impl Value {
    pub fn str(text: impl Into<Rc<str>>) -> Self {
        Self::Str(text.into())
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Self::Tuple(Rc::from(items))
    }

    pub fn opt_bool(value: Option<bool>) -> Self {
        value.map_or(Self::None, Self::Bool)
    }

    pub fn opt_length(value: Option<Length>) -> Self {
        value.map_or(Self::None, Self::Length)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Python-style type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Tuple(_) => "tuple",
            Self::Range { .. } => "range",
            Self::Length(_) => "Length",
            Self::Color(_) => "RGBColor",
            Self::Enum(e) => e.class_name(),
            Self::EnumClass(_) => "EnumMeta",
            Self::Module(_) => "module",
            Self::Builtin(_) | Self::Method(_) => "builtin_function_or_method",
            Self::Handle(h) => h.type_name(),
        }
    }
}

/// An attribute of a receiver that is callable, resolved at access time.
#[derive(Debug, Clone)]
pub struct Method {
    pub receiver: Value,
    pub name: &'static str,
}

// ---------------------------------------------------------------------------
// Builtins and enumerations
// ---------------------------------------------------------------------------

/// Callable names the namespace hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Len,
    Range,
    Str,
    Int,
    Float,
    Bool,
    List,
    Tuple,
    Dict,
    Enumerate,
    Zip,
    Min,
    Max,
    Abs,
    Round,
    Sum,
    Sorted,
    Reversed,
    Any,
    All,
    Print,
    Document,
    BytesIO,
    Unit(Unit),
    RgbColor,
    RgbFromString,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Self::Len => "len",
            Self::Range => "range",
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Dict => "dict",
            Self::Enumerate => "enumerate",
            Self::Zip => "zip",
            Self::Min => "min",
            Self::Max => "max",
            Self::Abs => "abs",
            Self::Round => "round",
            Self::Sum => "sum",
            Self::Sorted => "sorted",
            Self::Reversed => "reversed",
            Self::Any => "any",
            Self::All => "all",
            Self::Print => "print",
            Self::Document => "Document",
            Self::BytesIO => "BytesIO",
            Self::Unit(unit) => unit.helper_name(),
            Self::RgbColor => "RGBColor",
            Self::RgbFromString => "RGBColor.from_string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumKind {
    ParagraphAlignment,
    TableAlignment,
    Orientation,
    Break,
    SectionStart,
}

/// An enumeration class such as `WD_ALIGN_PARAGRAPH`, under the name it was
/// imported as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumClass {
    pub kind: EnumKind,
    pub name: &'static str,
}

impl EnumClass {
    pub fn members(self) -> Vec<(&'static str, EnumValue)> {
        match self.kind {
            EnumKind::ParagraphAlignment => Alignment::ALL
                .into_iter()
                .map(|a| (alignment_member(a), EnumValue::Align(a)))
                .collect(),
            EnumKind::TableAlignment => [Alignment::Left, Alignment::Center, Alignment::Right]
                .into_iter()
                .map(|a| (alignment_member(a), EnumValue::TableAlign(a)))
                .collect(),
            EnumKind::Orientation => vec![
                ("PORTRAIT", EnumValue::Orient(Orientation::Portrait)),
                ("LANDSCAPE", EnumValue::Orient(Orientation::Landscape)),
            ],
            EnumKind::Break => vec![
                ("LINE", EnumValue::Break(BreakKind::Line)),
                ("PAGE", EnumValue::Break(BreakKind::Page)),
                ("COLUMN", EnumValue::Break(BreakKind::Column)),
            ],
            EnumKind::SectionStart => [
                SectionStart::Continuous,
                SectionStart::NewColumn,
                SectionStart::NewPage,
                SectionStart::EvenPage,
                SectionStart::OddPage,
            ]
            .into_iter()
            .map(|s| (section_member(s), EnumValue::Section(s)))
            .collect(),
        }
    }

    pub fn member(self, name: &str) -> Option<EnumValue> {
        self.members()
            .into_iter()
            .find(|(member, _)| *member == name)
            .map(|(_, value)| value)
    }
}

/// A member of one of the exposed enumerations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumValue {
    Align(Alignment),
    TableAlign(Alignment),
    Orient(Orientation),
    Break(BreakKind),
    Section(SectionStart),
}

impl EnumValue {
    pub fn class_name(self) -> &'static str {
        match self {
            Self::Align(_) => "WD_PARAGRAPH_ALIGNMENT",
            Self::TableAlign(_) => "WD_TABLE_ALIGNMENT",
            Self::Orient(_) => "WD_ORIENTATION",
            Self::Break(_) => "WD_BREAK",
            Self::Section(_) => "WD_SECTION_START",
        }
    }

    pub fn member_name(self) -> &'static str {
        match self {
            Self::Align(a) | Self::TableAlign(a) => alignment_member(a),
            Self::Orient(Orientation::Portrait) => "PORTRAIT",
            Self::Orient(Orientation::Landscape) => "LANDSCAPE",
            Self::Break(BreakKind::Line) => "LINE",
            Self::Break(BreakKind::Page) => "PAGE",
            Self::Break(BreakKind::Column) => "COLUMN",
            Self::Section(s) => section_member(s),
        }
    }
}

fn alignment_member(alignment: Alignment) -> &'static str {
    match alignment {
        Alignment::Left => "LEFT",
        Alignment::Center => "CENTER",
        Alignment::Right => "RIGHT",
        Alignment::Justify => "JUSTIFY",
        Alignment::Distribute => "DISTRIBUTE",
    }
}

fn section_member(start: SectionStart) -> &'static str {
    match start {
        SectionStart::Continuous => "CONTINUOUS",
        SectionStart::NewColumn => "NEW_COLUMN",
        SectionStart::NewPage => "NEW_PAGE",
        SectionStart::EvenPage => "EVEN_PAGE",
        SectionStart::OddPage => "ODD_PAGE",
    }
}

// ---------------------------------------------------------------------------
// Document handles
// ---------------------------------------------------------------------------

/// A script-side reference into the document builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handle {
    Document,
    CoreProperties,
    Styles,
    Sections,
    Section(SectionId),
    Paragraphs,
    Tables,
    Paragraph(ParagraphId),
    ParagraphFormat(ParagraphId),
    Runs(ParagraphId),
    Run(RunId),
    Font(RunId),
    FontColor(RunId),
    Table(TableId),
    Rows(TableId),
    Row(RowRef),
    RowCells(RowRef),
    Columns(TableId),
    Column(ColumnRef),
    ColumnCells(ColumnRef),
    Cell(CellId),
    CellParagraphs(CellId),
    Buffer,
    ParagraphStyle(ParagraphStyle),
    TableStyle(TableStyle),
}

impl Handle {
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::CoreProperties => "CoreProperties",
            Self::Styles => "Styles",
            Self::Sections => "Sections",
            Self::Section(_) => "Section",
            Self::Paragraphs | Self::Runs(_) | Self::Tables | Self::CellParagraphs(_) => "list",
            Self::Paragraph(_) => "Paragraph",
            Self::ParagraphFormat(_) => "ParagraphFormat",
            Self::Run(_) => "Run",
            Self::Font(_) => "Font",
            Self::FontColor(_) => "ColorFormat",
            Self::Table(_) => "Table",
            Self::Rows(_) => "_Rows",
            Self::Row(_) => "_Row",
            Self::RowCells(_) | Self::ColumnCells(_) => "tuple",
            Self::Columns(_) => "_Columns",
            Self::Column(_) => "_Column",
            Self::Cell(_) => "_Cell",
            Self::Buffer => "BytesIO",
            Self::ParagraphStyle(_) => "ParagraphStyle",
            Self::TableStyle(_) => "TableStyle",
        }
    }

    /// Whether the handle is an indexable collection of other handles.
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            Self::Sections
                | Self::Paragraphs
                | Self::Tables
                | Self::Runs(_)
                | Self::Rows(_)
                | Self::RowCells(_)
                | Self::Columns(_)
                | Self::ColumnCells(_)
                | Self::CellParagraphs(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Normalized dict key: equal values produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
    Length(i64),
    Color(Color),
    Enum(EnumValue),
    Handle(Handle),
    Other(&'static str),
}

impl HashKey {
    pub fn from_value(value: &Value) -> Result<Self> {
        Self::build(value, 0)
    }

    fn build(value: &Value, depth: usize) -> Result<Self> {
        if depth > MAX_VALUE_DEPTH {
            return Err(depth_exceeded());
        }
        Ok(match value {
            Value::None => Self::None,
            Value::Bool(b) => Self::Int(i64::from(*b)),
            Value::Int(i) => Self::Int(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.0e15 {
                    Self::Int(*f as i64)
                } else {
                    Self::Float(f.to_bits())
                }
            }
            Value::Str(s) => Self::Str(s.clone()),
            Value::Tuple(items) => Self::Tuple(
                items
                    .iter()
                    .map(|v| Self::build(v, depth + 1))
                    .collect::<Result<_>>()?,
            ),
            Value::Length(l) => Self::Int(l.emu()),
            Value::Color(c) => Self::Color(*c),
            Value::Enum(e) => Self::Enum(*e),
            Value::Handle(h) => Self::Handle(*h),
            Value::Module(name) => Self::Other(name),
            Value::Builtin(b) => Self::Other(b.name()),
            Value::EnumClass(c) => Self::Other(c.name),
            Value::List(_) | Value::Dict(_) | Value::Range { .. } | Value::Method(_) => {
                return Err(SandboxError::type_error(format!(
                    "unhashable type: '{}'",
                    value.type_name()
                )));
            }
        })
    }
}

fn depth_exceeded() -> SandboxError {
    SandboxError::Limit {
        what: "value nesting depth",
        limit: MAX_VALUE_DEPTH,
    }
}

/// Insertion-ordered dictionary.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
    index: HashMap<HashKey, usize>,
}

impl Dict {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &HashKey) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains(&self, key: &HashKey) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or replace; an existing key keeps its position.
    pub fn insert(&mut self, hash: HashKey, key: Value, value: Value) {
        match self.index.get(&hash) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(hash, self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn remove(&mut self, hash: &HashKey) -> Option<Value> {
        let position = self.index.remove(hash)?;
        let (_, value) = self.entries.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(value)
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Heap
// ---------------------------------------------------------------------------

/// Arena of the lists and dicts one execution allocates.
#[derive(Debug)]
pub struct Heap {
    lists: Vec<Vec<Value>>,
    dicts: Vec<Dict>,
    max_objects: usize,
    max_len: usize,
}

impl Heap {
    pub fn new(max_objects: usize, max_len: usize) -> Self {
        Self {
            lists: Vec::new(),
            dicts: Vec::new(),
            max_objects,
            max_len,
        }
    }

    /// Number of containers allocated so far.
    pub fn allocated(&self) -> usize {
        self.lists.len() + self.dicts.len()
    }

    fn reserve(&self) -> Result<()> {
        if self.allocated() >= self.max_objects {
            return Err(SandboxError::Limit {
                what: "list and dict allocation",
                limit: self.max_objects,
            });
        }
        Ok(())
    }

    /// Fail if a collection of `len` elements would exceed the length cap.
    pub fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_len {
            return Err(SandboxError::Limit {
                what: "collection length",
                limit: self.max_len,
            });
        }
        Ok(())
    }

    pub fn alloc_list(&mut self, items: Vec<Value>) -> Result<Value> {
        self.reserve()?;
        self.check_len(items.len())?;
        self.lists.push(items);
        Ok(Value::List(HeapId(self.lists.len() - 1)))
    }

    pub fn alloc_dict(&mut self, dict: Dict) -> Result<Value> {
        self.reserve()?;
        self.check_len(dict.len())?;
        self.dicts.push(dict);
        Ok(Value::Dict(HeapId(self.dicts.len() - 1)))
    }

    pub fn list(&self, id: HeapId) -> Result<&Vec<Value>> {
        self.lists.get(id.0).ok_or_else(|| dangling("list"))
    }

    pub fn list_mut(&mut self, id: HeapId) -> Result<&mut Vec<Value>> {
        self.lists.get_mut(id.0).ok_or_else(|| dangling("list"))
    }

    /// Append with the length cap enforced.
    pub fn push(&mut self, id: HeapId, value: Value) -> Result<()> {
        let max = self.max_len;
        let list = self.list_mut(id)?;
        if list.len() >= max {
            return Err(SandboxError::Limit {
                what: "collection length",
                limit: max,
            });
        }
        list.push(value);
        Ok(())
    }

    pub fn dict(&self, id: HeapId) -> Result<&Dict> {
        self.dicts.get(id.0).ok_or_else(|| dangling("dict"))
    }

    pub fn dict_mut(&mut self, id: HeapId) -> Result<&mut Dict> {
        self.dicts.get_mut(id.0).ok_or_else(|| dangling("dict"))
    }

    pub fn dict_insert(&mut self, id: HeapId, key: Value, value: Value) -> Result<()> {
        let hash = HashKey::from_value(&key)?;
        let max = self.max_len;
        let dict = self.dict_mut(id)?;
        if !dict.contains(&hash) && dict.len() >= max {
            return Err(SandboxError::Limit {
                what: "collection length",
                limit: max,
            });
        }
        dict.insert(hash, key, value);
        Ok(())
    }

    /// Python equality.
    pub fn equal(&self, a: &Value, b: &Value) -> Result<bool> {
        self.equal_at(a, b, 0)
    }

    fn equal_at(&self, a: &Value, b: &Value, depth: usize) -> Result<bool> {
        if depth > MAX_VALUE_DEPTH {
            return Err(depth_exceeded());
        }
        if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
            return Ok(x.eq(y));
        }
        Ok(match (a, b) {
            (Value::None, Value::None) => true,
            (Value::Str(x), Value::Str(y)) => x == y,
            (Value::Tuple(x), Value::Tuple(y)) => self.seq_equal(x, y, depth)?,
            (Value::List(x), Value::List(y)) => {
                x == y || self.seq_equal(self.list(*x)?, self.list(*y)?, depth)?
            }
            (Value::Dict(x), Value::Dict(y)) => {
                if x == y {
                    return Ok(true);
                }
                let (x, y) = (self.dict(*x)?, self.dict(*y)?);
                if x.len() != y.len() {
                    return Ok(false);
                }
                for (key, value) in x.entries() {
                    match y.get(&HashKey::from_value(key)?) {
                        Some(other) if self.equal_at(value, other, depth + 1)? => {}
                        _ => return Ok(false),
                    }
                }
                true
            }
            (
                Value::Range { start, stop, step },
                Value::Range {
                    start: s2,
                    stop: e2,
                    step: t2,
                },
            ) => (start, stop, step) == (s2, e2, t2),
            (Value::Color(x), Value::Color(y)) => x == y,
            (Value::Enum(x), Value::Enum(y)) => x == y,
            (Value::EnumClass(x), Value::EnumClass(y)) => x.kind == y.kind,
            (Value::Module(x), Value::Module(y)) => x == y,
            (Value::Builtin(x), Value::Builtin(y)) => x == y,
            (Value::Handle(x), Value::Handle(y)) => x == y,
            _ => false,
        })
    }

    fn seq_equal(&self, x: &[Value], y: &[Value], depth: usize) -> Result<bool> {
        if x.len() != y.len() {
            return Ok(false);
        }
        for (a, b) in x.iter().zip(y) {
            if !self.equal_at(a, b, depth + 1)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Python ordering for `<`, `sorted`, `min` and `max`.
    pub fn compare(&self, a: &Value, b: &Value, op: &str) -> Result<Ordering> {
        self.compare_at(a, b, op, 0)
    }

    fn compare_at(&self, a: &Value, b: &Value, op: &str, depth: usize) -> Result<Ordering> {
        if depth > MAX_VALUE_DEPTH {
            return Err(depth_exceeded());
        }
        if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
            return x.cmp(y).ok_or_else(|| {
                SandboxError::type_error(format!("'{op}' is not defined for NaN"))
            });
        }
        match (a, b) {
            (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
            (Value::Tuple(x), Value::Tuple(y)) => self.seq_compare(x, y, op, depth),
            (Value::List(x), Value::List(y)) => {
                self.seq_compare(self.list(*x)?, self.list(*y)?, op, depth)
            }
            _ => Err(SandboxError::type_error(format!(
                "'{op}' not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ))),
        }
    }

    fn seq_compare(&self, x: &[Value], y: &[Value], op: &str, depth: usize) -> Result<Ordering> {
        for (a, b) in x.iter().zip(y) {
            if !self.equal_at(a, b, depth + 1)? {
                return self.compare_at(a, b, op, depth + 1);
            }
        }
        Ok(x.len().cmp(&y.len()))
    }
}

fn dangling(kind: &str) -> SandboxError {
    SandboxError::Internal(format!("dangling {kind} reference"))
}

/// Numeric view used for cross-type comparison. Lengths compare as their
/// EMU value, booleans as 0 and 1.
#[derive(Debug, Clone, Copy)]
enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    fn eq(self, other: Numeric) -> bool {
        matches!(self.cmp(other), Some(Ordering::Equal))
    }

    fn cmp(self, other: Numeric) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (Self::Int(a), Self::Float(b)) => (a as f64).partial_cmp(&b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(b as f64)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(&b),
        }
    }
}

fn numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Bool(b) => Some(Numeric::Int(i64::from(*b))),
        Value::Int(i) => Some(Numeric::Int(*i)),
        Value::Float(f) => Some(Numeric::Float(*f)),
        Value::Length(l) => Some(Numeric::Int(l.emu())),
        _ => None,
    }
}

/// Number of elements `range(start, stop, step)` yields.
pub fn range_len(start: i64, stop: i64, step: i64) -> usize {
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let len = if step > 0 && start < stop {
        (stop - start + step - 1) / step
    } else if step < 0 && start > stop {
        (start - stop - step - 1) / -step
    } else {
        0
    };
    usize::try_from(len).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_equality_crosses_types() {
        let heap = Heap::new(10, 10);
        assert!(heap.equal(&Value::Int(1), &Value::Float(1.0)).unwrap());
        assert!(heap.equal(&Value::Bool(true), &Value::Int(1)).unwrap());
        assert!(heap
            .equal(&Value::Length(Length::whole_points(1)), &Value::Int(12_700))
            .unwrap());
        assert!(!heap.equal(&Value::str("1"), &Value::Int(1)).unwrap());
    }

    #[test]
    fn hash_keys_normalize_numbers() {
        assert_eq!(
            HashKey::from_value(&Value::Float(2.0)).unwrap(),
            HashKey::from_value(&Value::Int(2)).unwrap()
        );
        assert_eq!(
            HashKey::from_value(&Value::Bool(true)).unwrap(),
            HashKey::Int(1)
        );
        let mut heap = Heap::new(10, 10);
        let list = heap.alloc_list(vec![]).unwrap();
        let err = HashKey::from_value(&list).unwrap_err();
        assert_eq!(err.to_string(), "unhashable type: 'list'");
    }

    #[test]
    fn dict_keeps_insertion_order_across_removal() {
        let mut dict = Dict::default();
        for (i, key) in ["a", "b", "c"].into_iter().enumerate() {
            let k = Value::str(key);
            dict.insert(HashKey::from_value(&k).unwrap(), k, Value::Int(i as i64));
        }
        dict.remove(&HashKey::Str(Rc::from("a")));
        let keys: Vec<String> = dict
            .keys()
            .iter()
            .map(|k| match k {
                Value::Str(s) => s.to_string(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(keys, ["b", "c"]);
        assert!(matches!(dict.get(&HashKey::Str(Rc::from("c"))), Some(Value::Int(2))));
    }

    #[test]
    fn heap_caps_allocation_and_length() {
        let mut heap = Heap::new(2, 3);
        let list = heap.alloc_list(vec![Value::None; 3]).unwrap();
        let Value::List(id) = list else { unreachable!() };
        assert!(matches!(
            heap.push(id, Value::None),
            Err(SandboxError::Limit { what: "collection length", .. })
        ));
        heap.alloc_dict(Dict::default()).unwrap();
        assert!(matches!(
            heap.alloc_list(vec![]),
            Err(SandboxError::Limit { limit: 2, .. })
        ));
    }

    #[test]
    fn ordering_of_sequences() {
        let heap = Heap::new(10, 10);
        let a = Value::tuple(vec![Value::Int(1), Value::str("b")]);
        let b = Value::tuple(vec![Value::Int(1), Value::str("c")]);
        assert_eq!(heap.compare(&a, &b, "<").unwrap(), Ordering::Less);
        let err = heap.compare(&Value::Int(1), &Value::str("x"), "<").unwrap_err();
        assert!(err.to_string().contains("'int' and 'str'"));
    }

    #[test]
    fn range_lengths() {
        assert_eq!(range_len(0, 10, 3), 4);
        assert_eq!(range_len(10, 0, -2), 5);
        assert_eq!(range_len(5, 5, 1), 0);
        assert_eq!(range_len(0, -3, 1), 0);
    }

    #[test]
    fn enum_members() {
        let class = EnumClass {
            kind: EnumKind::TableAlignment,
            name: "WD_TABLE_ALIGNMENT",
        };
        assert_eq!(class.member("CENTER"), Some(EnumValue::TableAlign(Alignment::Center)));
        assert_eq!(class.member("JUSTIFY"), None);
        assert_eq!(EnumValue::Section(SectionStart::OddPage).member_name(), "ODD_PAGE");
    }
}
