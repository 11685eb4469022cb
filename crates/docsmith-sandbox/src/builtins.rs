//! Builtin functions and the methods of plain values.
//!
//! Builtins are resolved by the namespace into [`Builtin`] values and invoked
//! through [`Interp::call_builtin`]. String, list, dict and tuple methods
//! are dispatched by [`Interp::call_value_method`]. Every operation that
//! produces a string or walks a collection charges the budget in proportion
//! to the work done.

use std::cmp::Ordering;
use std::rc::Rc;

use docsmith_dom::{Color, Length, Unit};

use crate::ast::BinOp;
use crate::error::{Result, SandboxError};
use crate::format;
use crate::interp::Interp;
use crate::namespace;
use crate::value::{Builtin, Dict, HashKey, HeapId, Value};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Evaluated call arguments.
#[derive(Debug, Default)]
pub(crate) struct Args {
    pub(crate) positional: Vec<Value>,
    pub(crate) keywords: Vec<(String, Value)>,
}

impl Args {
    pub(crate) fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    /// Bind the arguments to named parameters. The first `required`
    /// parameters must be supplied, positionally or by keyword.
    pub(crate) fn bind<const N: usize>(
        self,
        call: &str,
        params: [&str; N],
        required: usize,
    ) -> Result<[Option<Value>; N]> {
        let given = self.positional.len();
        if given > N {
            return Err(SandboxError::type_error(if N == 0 {
                format!("{call} takes no arguments ({given} given)")
            } else {
                format!("{call} takes at most {N} arguments ({given} given)")
            }));
        }
        let mut slots: [Option<Value>; N] = std::array::from_fn(|_| None);
        for (slot, value) in slots.iter_mut().zip(self.positional) {
            *slot = Some(value);
        }
        for (name, value) in self.keywords {
            let Some(position) = params.iter().position(|p| *p == name) else {
                return Err(SandboxError::type_error(format!(
                    "{call} got an unexpected keyword argument '{name}'"
                )));
            };
            if slots[position].is_some() {
                return Err(SandboxError::type_error(format!(
                    "{call} got multiple values for argument '{name}'"
                )));
            }
            slots[position] = Some(value);
        }
        if let Some((param, _)) = params
            .iter()
            .zip(&slots)
            .take(required)
            .find(|(_, slot)| slot.is_none())
        {
            return Err(SandboxError::type_error(format!(
                "{call} missing required argument '{param}'"
            )));
        }
        Ok(slots)
    }

    fn reject_keywords(&self, call: &str) -> Result<()> {
        match self.keywords.first() {
            Some((name, _)) => Err(SandboxError::type_error(format!(
                "{call} got an unexpected keyword argument '{name}'"
            ))),
            None => Ok(()),
        }
    }
}

/// A bound argument, `None` when it was optional and not supplied.
pub(crate) fn arg(slot: Option<Value>) -> Value {
    slot.unwrap_or(Value::None)
}

// -- conversions ------------------------------------------------------------

pub(crate) fn expect_int(what: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(SandboxError::type_error(format!(
            "{what} must be an int, not '{}'",
            other.type_name()
        ))),
    }
}

pub(crate) fn expect_str<'a>(what: &str, value: &'a Value) -> Result<&'a str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(SandboxError::type_error(format!(
            "{what} must be a str, not '{}'",
            other.type_name()
        ))),
    }
}

pub(crate) fn expect_number(what: &str, value: &Value) -> Result<f64> {
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(SandboxError::type_error(format!(
            "{what} must be a number, not '{}'",
            other.type_name()
        ))),
    }
}

pub(crate) fn expect_bool(what: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(SandboxError::type_error(format!(
            "{what} must be True or False, not '{}'",
            other.type_name()
        ))),
    }
}

fn overflow() -> SandboxError {
    SandboxError::type_error("integer overflow")
}

// ---------------------------------------------------------------------------
// Builtin functions
// ---------------------------------------------------------------------------

impl Interp {
    pub(crate) fn call_builtin(&mut self, builtin: Builtin, args: Args) -> Result<Value> {
        let call = format!("{}()", builtin.name());
        let call = call.as_str();
        match builtin {
            Builtin::Len => {
                let [object] = args.bind(call, ["obj"], 1)?;
                let len = self.len_of(&arg(object))?;
                Ok(Value::Int(len as i64))
            }
            Builtin::Range => {
                let [first, second, third] = args.bind(call, ["start", "stop", "step"], 1)?;
                let first = expect_int("range() argument", &arg(first))?;
                let (start, stop) = match second {
                    Some(stop) => (first, expect_int("range() argument", &stop)?),
                    None => (0, first),
                };
                let step = match third {
                    Some(step) => expect_int("range() argument", &step)?,
                    None => 1,
                };
                if step == 0 {
                    return Err(SandboxError::type_error("range() arg 3 must not be zero"));
                }
                Ok(Value::Range { start, stop, step })
            }
            Builtin::Str => {
                let [object] = args.bind(call, ["object"], 0)?;
                match object {
                    None => Ok(Value::str("")),
                    Some(value) => Ok(Value::str(self.display(&value)?)),
                }
            }
            Builtin::Int => {
                let [x, base] = args.bind(call, ["x", "base"], 0)?;
                to_int(&arg(x), base.as_ref())
            }
            Builtin::Float => {
                let [x] = args.bind(call, ["x"], 0)?;
                to_float(&arg(x))
            }
            Builtin::Bool => {
                let [x] = args.bind(call, ["x"], 0)?;
                Ok(Value::Bool(match x {
                    Some(value) => self.truthy(&value)?,
                    None => false,
                }))
            }
            Builtin::List => {
                let [iterable] = args.bind(call, ["iterable"], 0)?;
                let items = match iterable {
                    Some(value) => self.iterate(&value)?,
                    None => Vec::new(),
                };
                self.heap.alloc_list(items)
            }
            Builtin::Tuple => {
                let [iterable] = args.bind(call, ["iterable"], 0)?;
                let items = match iterable {
                    Some(value) => self.iterate(&value)?,
                    None => Vec::new(),
                };
                Ok(Value::tuple(items))
            }
            Builtin::Dict => {
                if args.positional.len() > 1 {
                    return Err(SandboxError::type_error(format!(
                        "dict expected at most 1 argument, got {}",
                        args.positional.len()
                    )));
                }
                let mut dict = Dict::default();
                if let Some(source) = args.positional.first() {
                    for (key, value) in self.dict_entries(source)? {
                        dict.insert(HashKey::from_value(&key)?, key, value);
                    }
                }
                for (name, value) in args.keywords {
                    let key = Value::str(name);
                    dict.insert(HashKey::from_value(&key)?, key, value);
                }
                self.heap.alloc_dict(dict)
            }
            Builtin::Enumerate => {
                let [iterable, start] = args.bind(call, ["iterable", "start"], 1)?;
                let mut counter = match start {
                    Some(start) => expect_int("enumerate() start", &start)?,
                    None => 0,
                };
                let items = self.iterate(&arg(iterable))?;
                let mut pairs = Vec::with_capacity(items.len());
                for item in items {
                    pairs.push(Value::tuple(vec![Value::Int(counter), item]));
                    counter = counter.checked_add(1).ok_or_else(overflow)?;
                }
                self.heap.alloc_list(pairs)
            }
            Builtin::Zip => {
                args.reject_keywords(call)?;
                let columns = args
                    .positional
                    .iter()
                    .map(|iterable| self.iterate(iterable))
                    .collect::<Result<Vec<_>>>()?;
                let len = columns.iter().map(Vec::len).min().unwrap_or(0);
                let rows = (0..len)
                    .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                    .collect();
                self.heap.alloc_list(rows)
            }
            Builtin::Min => self.extremum(call, args, Ordering::Less, "<"),
            Builtin::Max => self.extremum(call, args, Ordering::Greater, ">"),
            Builtin::Abs => {
                let [x] = args.bind(call, ["x"], 1)?;
                match arg(x) {
                    Value::Int(i) => Ok(Value::Int(i.checked_abs().ok_or_else(overflow)?)),
                    Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    Value::Length(l) => Ok(Value::Length(Length::from_emu(l.emu().abs())?)),
                    other => Err(SandboxError::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        other.type_name()
                    ))),
                }
            }
            Builtin::Round => {
                let [number, ndigits] = args.bind(call, ["number", "ndigits"], 1)?;
                let ndigits = match ndigits {
                    None | Some(Value::None) => None,
                    Some(n) => Some(expect_int("round() ndigits", &n)?),
                };
                round(&arg(number), ndigits)
            }
            Builtin::Sum => {
                let [iterable, start] = args.bind(call, ["iterable", "start"], 1)?;
                let start = start.unwrap_or(Value::Int(0));
                if let Value::Str(_) = start {
                    return Err(SandboxError::type_error(
                        "sum() can't sum strings, use ''.join(seq) instead",
                    ));
                }
                let items = self.iterate(&arg(iterable))?;
                items
                    .into_iter()
                    .try_fold(start, |total, item| self.binary(BinOp::Add, total, item))
            }
            Builtin::Sorted => {
                let [iterable, key, reverse] = args.bind(call, ["iterable", "key", "reverse"], 1)?;
                let mut items = self.iterate(&arg(iterable))?;
                let reverse = match reverse {
                    Some(flag) => self.truthy(&flag)?,
                    None => false,
                };
                self.sort_values(&mut items, key, reverse)?;
                self.heap.alloc_list(items)
            }
            Builtin::Reversed => {
                let [sequence] = args.bind(call, ["sequence"], 1)?;
                let mut items = self.iterate(&arg(sequence))?;
                items.reverse();
                self.heap.alloc_list(items)
            }
            Builtin::Any | Builtin::All => {
                let [iterable] = args.bind(call, ["iterable"], 1)?;
                let want = builtin == Builtin::Any;
                for item in self.iterate(&arg(iterable))? {
                    if self.truthy(&item)? == want {
                        return Ok(Value::Bool(want));
                    }
                }
                Ok(Value::Bool(!want))
            }
            Builtin::Print => self.print(args),
            Builtin::Document => {
                let [source] = args.bind(call, ["docx"], 0)?;
                if source.is_some_and(|s| !s.is_none()) {
                    return Err(SandboxError::Denied {
                        name: "Document(path)".into(),
                        reason: namespace::FILESYSTEM,
                    });
                }
                self.builder.open_document()?;
                tracing::debug!("document opened");
                Ok(Value::Handle(crate::value::Handle::Document))
            }
            Builtin::BytesIO => {
                let [initial] = args.bind(call, ["initial_bytes"], 0)?;
                if initial.is_some_and(|v| !v.is_none()) {
                    return Err(SandboxError::type_error(
                        "BytesIO() only supports an empty in-memory buffer",
                    ));
                }
                Ok(Value::Handle(crate::value::Handle::Buffer))
            }
            Builtin::Unit(unit) => {
                let [value] = args.bind(call, ["value"], 1)?;
                let length = match arg(value) {
                    Value::Int(i) if unit == Unit::Emu => Length::from_emu(i)?,
                    Value::Int(i) => Length::from_unit(i as f64, unit)?,
                    Value::Float(f) => Length::from_unit(f, unit)?,
                    other => {
                        return Err(SandboxError::type_error(format!(
                            "{}() expects a number, not '{}'",
                            unit.helper_name(),
                            other.type_name()
                        )));
                    }
                };
                Ok(Value::Length(length))
            }
            Builtin::RgbColor => {
                let [r, g, b] = args.bind(call, ["r", "g", "b"], 3)?;
                let r = expect_int("RGBColor() component", &arg(r))?;
                let g = expect_int("RGBColor() component", &arg(g))?;
                let b = expect_int("RGBColor() component", &arg(b))?;
                Ok(Value::Color(Color::from_components(r, g, b)?))
            }
            Builtin::RgbFromString => {
                let [hex] = args.bind(call, ["rgb_hex_str"], 1)?;
                let hex = arg(hex);
                let hex = expect_str("RGBColor.from_string() argument", &hex)?;
                Ok(Value::Color(Color::from_hex(hex)?))
            }
        }
    }

    fn print(&mut self, args: Args) -> Result<Value> {
        let mut sep = " ".to_string();
        for (name, value) in &args.keywords {
            match (name.as_str(), value) {
                ("sep", Value::Str(s)) => sep = s.to_string(),
                ("sep" | "end", Value::None) => {}
                ("end", Value::Str(_)) => {}
                ("sep" | "end", other) => {
                    return Err(SandboxError::type_error(format!(
                        "print() {name} must be None or a string, not '{}'",
                        other.type_name()
                    )));
                }
                _ => {
                    return Err(SandboxError::type_error(format!(
                        "print() got an unexpected keyword argument '{name}'"
                    )));
                }
            }
        }
        let mut line = String::new();
        for (i, value) in args.positional.iter().enumerate() {
            if i > 0 {
                line.push_str(&sep);
            }
            line.push_str(&self.display(value)?);
            self.budget.string(line.len())?;
        }
        tracing::debug!(target: "docsmith::script", output = %line, "print");
        Ok(Value::None)
    }

    /// `min()` and `max()`: the first item whose key compares `want` against
    /// every earlier candidate.
    fn extremum(&mut self, call: &str, args: Args, want: Ordering, op: &str) -> Result<Value> {
        let Args {
            positional,
            keywords,
        } = args;
        let mut key = None;
        let mut default = None;
        for (name, value) in keywords {
            match name.as_str() {
                "key" => key = Some(value).filter(|v| !v.is_none()),
                "default" => default = Some(value),
                _ => {
                    return Err(SandboxError::type_error(format!(
                        "{call} got an unexpected keyword argument '{name}'"
                    )));
                }
            }
        }
        let items = match positional.len() {
            0 => {
                return Err(SandboxError::type_error(format!(
                    "{call} expected at least 1 argument, got 0"
                )));
            }
            1 => self.iterate(&positional[0])?,
            _ if default.is_some() => {
                return Err(SandboxError::type_error(format!(
                    "cannot specify a default for {call} with multiple positional arguments"
                )));
            }
            _ => positional,
        };
        let mut best: Option<(Value, Value)> = None;
        for item in items {
            let rank = match &key {
                Some(function) => self.call_value(function.clone(), Args::new(vec![item.clone()]))?,
                None => item.clone(),
            };
            let better = match &best {
                None => true,
                Some((_, leader)) => self.heap.compare(&rank, leader, op)? == want,
            };
            if better {
                best = Some((item, rank));
            }
        }
        match best {
            Some((item, _)) => Ok(item),
            None => default.ok_or_else(|| {
                SandboxError::type_error(format!("{call} arg is an empty sequence"))
            }),
        }
    }

    /// Stable in-place sort by `key`, as `sorted()` and `list.sort()` do.
    fn sort_values(&mut self, items: &mut Vec<Value>, key: Option<Value>, reverse: bool) -> Result<()> {
        let n = items.len();
        let log = u64::from(usize::BITS - n.leading_zeros());
        self.budget.charge((n as u64).saturating_mul(log.max(1)))?;
        let keys = match key.filter(|k| !k.is_none()) {
            Some(function) => items
                .iter()
                .map(|item| self.call_value(function.clone(), Args::new(vec![item.clone()])))
                .collect::<Result<Vec<_>>>()?,
            None => items.clone(),
        };
        let heap = &self.heap;
        let mut compare = |a: usize, b: usize| -> Result<Ordering> {
            let ordering = heap.compare(&keys[a], &keys[b], "<")?;
            Ok(if reverse { ordering.reverse() } else { ordering })
        };
        let order = merge_sort((0..n).collect(), &mut compare)?;
        let sorted: Vec<Value> = order.iter().map(|&i| items[i].clone()).collect();
        *items = sorted;
        Ok(())
    }

    /// Key/value pairs of a mapping or of an iterable of pairs.
    fn dict_entries(&mut self, source: &Value) -> Result<Vec<(Value, Value)>> {
        if let Value::Dict(id) = source {
            let entries = self.heap.dict(*id)?.entries().to_vec();
            self.budget.elements(entries.len())?;
            return Ok(entries);
        }
        let items = self.iterate(source)?;
        let mut entries = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let pair = self.iterate(item)?;
            let [key, value]: [Value; 2] = pair.try_into().map_err(|pair: Vec<Value>| {
                SandboxError::type_error(format!(
                    "dictionary update sequence element #{i} has length {}; 2 is required",
                    pair.len()
                ))
            })?;
            entries.push((key, value));
        }
        Ok(entries)
    }
}

/// Stable merge sort over indices with a fallible comparison.
fn merge_sort(
    mut indices: Vec<usize>,
    compare: &mut dyn FnMut(usize, usize) -> Result<Ordering>,
) -> Result<Vec<usize>> {
    if indices.len() <= 1 {
        return Ok(indices);
    }
    let right = indices.split_off(indices.len() / 2);
    let left = merge_sort(indices, compare)?;
    let right = merge_sort(right, compare)?;
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if compare(right[j], left[i])? == Ordering::Less {
            merged.push(right[j]);
            j += 1;
        } else {
            merged.push(left[i]);
            i += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    Ok(merged)
}

fn to_int(value: &Value, base: Option<&Value>) -> Result<Value> {
    if base.is_some() && !matches!(value, Value::Str(_)) {
        return Err(SandboxError::type_error(
            "int() can't convert non-string with explicit base",
        ));
    }
    match value {
        Value::None if base.is_none() => Ok(Value::Int(0)),
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Length(l) => Ok(Value::Int(l.emu())),
        Value::Float(f) => float_to_int(*f).map(Value::Int),
        Value::Str(text) => {
            let base = match base {
                Some(b) => expect_int("int() base", b)?,
                None => 10,
            };
            parse_int(text, base).map(Value::Int)
        }
        other => Err(SandboxError::type_error(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn float_to_int(f: f64) -> Result<i64> {
    let truncated = f.trunc();
    if !f.is_finite() || truncated < -9.223_372_036_854_775_808e18 || truncated >= 9.223_372_036_854_775_808e18 {
        return Err(SandboxError::type_error(format!(
            "cannot convert float {} to integer",
            format::float_repr(f)
        )));
    }
    Ok(truncated as i64)
}

/// `int(text, base)` with prefixes, signs and digit separators.
fn parse_int(text: &str, base: i64) -> Result<i64> {
    let invalid = || {
        SandboxError::type_error(format!("invalid literal for int() with base {base}: '{text}'"))
    };
    if base != 0 && !(2..=36).contains(&base) {
        return Err(SandboxError::type_error(
            "int() base must be >= 2 and <= 36, or 0",
        ));
    }
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lower = unsigned.to_ascii_lowercase();
    let mut digits = lower.as_str();
    let mut radix = base;
    for (prefix, prefix_radix) in [("0x", 16), ("0o", 8), ("0b", 2)] {
        if (base == 0 || base == prefix_radix)
            && let Some(rest) = digits.strip_prefix(prefix)
        {
            digits = rest.strip_prefix('_').unwrap_or(rest);
            radix = prefix_radix;
            break;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
        || !digits.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(invalid());
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    let magnitude = u128::from_str_radix(&cleaned, radix as u32).map_err(|_| invalid())?;
    let magnitude = i128::try_from(magnitude).map_err(|_| overflow())?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value).map_err(|_| overflow())
}

fn to_float(value: &Value) -> Result<Value> {
    match value {
        Value::None => Ok(Value::Float(0.0)),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Bool(b) => Ok(Value::Float(f64::from(u8::from(*b)))),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Length(l) => Ok(Value::Float(l.emu() as f64)),
        Value::Str(text) => {
            let trimmed = text.trim();
            let invalid =
                || SandboxError::type_error(format!("could not convert string to float: '{text}'"));
            if trimmed.starts_with('_') || trimmed.ends_with('_') || trimmed.contains("__") {
                return Err(invalid());
            }
            trimmed
                .replace('_', "")
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| invalid())
        }
        other => Err(SandboxError::type_error(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn round(number: &Value, ndigits: Option<i64>) -> Result<Value> {
    match (number, ndigits) {
        (Value::Int(i), None) => Ok(Value::Int(*i)),
        (Value::Bool(b), None) => Ok(Value::Int(i64::from(*b))),
        (Value::Length(l), None) => Ok(Value::Int(l.emu())),
        (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Value::Int(i), Some(n)) => round_int(*i, n).map(Value::Int),
        (Value::Bool(b), Some(n)) => round_int(i64::from(*b), n).map(Value::Int),
        (Value::Float(f), Some(n)) => {
            if !f.is_finite() || n > 300 {
                return Ok(Value::Float(*f));
            }
            if n < -308 {
                return Ok(Value::Float(0.0));
            }
            let factor = 10f64.powi(n as i32);
            Ok(Value::Float((f * factor).round_ties_even() / factor))
        }
        (other, _) => Err(SandboxError::type_error(format!(
            "type '{}' doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

/// Round an integer to `10^-ndigits`, ties to even.
fn round_int(value: i64, ndigits: i64) -> Result<i64> {
    if ndigits >= 0 {
        return Ok(value);
    }
    let Some(factor) = u32::try_from(-ndigits)
        .ok()
        .and_then(|exp| 10i128.checked_pow(exp))
        .filter(|f| *f <= i128::from(i64::MAX))
    else {
        return Ok(0);
    };
    let value = i128::from(value);
    let remainder = value.rem_euclid(factor);
    let floor = value - remainder;
    let rounded = match (remainder * 2).cmp(&factor) {
        Ordering::Greater => floor + factor,
        Ordering::Equal if (floor / factor) % 2 != 0 => floor + factor,
        _ => floor,
    };
    i64::try_from(rounded).map_err(|_| overflow())
}

// ---------------------------------------------------------------------------
// Value methods
// ---------------------------------------------------------------------------

const STR_METHODS: &[&str] = &[
    "upper",
    "lower",
    "strip",
    "lstrip",
    "rstrip",
    "title",
    "capitalize",
    "split",
    "splitlines",
    "join",
    "replace",
    "startswith",
    "endswith",
    "format",
    "find",
    "count",
    "isdigit",
    "isalpha",
    "zfill",
    "ljust",
    "rjust",
    "center",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "index", "count", "reverse", "sort", "clear", "copy",
    "remove",
];

const DICT_METHODS: &[&str] = &["items", "keys", "values", "get", "update", "pop"];

const TUPLE_METHODS: &[&str] = &["index", "count"];

/// The canonical name of a method plain values of this type support.
pub(crate) fn value_method_name(value: &Value, name: &str) -> Option<&'static str> {
    let table = match value {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        _ => return None,
    };
    table.iter().copied().find(|m| *m == name)
}

impl Interp {
    /// Invoke a method of a string, list, dict or tuple.
    pub(crate) fn call_value_method(&mut self, receiver: &Value, name: &str, args: Args) -> Result<Value> {
        match receiver {
            Value::Str(s) => self.str_method(s.clone(), name, args),
            Value::List(id) => self.list_method(*id, name, args),
            Value::Dict(id) => self.dict_method(*id, name, args),
            Value::Tuple(items) => self.tuple_method(items.clone(), name, args),
            other => Err(SandboxError::NoAttribute {
                type_name: other.type_name().to_string(),
                attribute: name.to_string(),
            }),
        }
    }

    fn check_width(&self, width: i64) -> Result<usize> {
        let width = usize::try_from(width).unwrap_or(0);
        if width > self.max_string_bytes {
            return Err(SandboxError::Limit {
                what: "string size in bytes",
                limit: self.max_string_bytes,
            });
        }
        Ok(width)
    }

    fn str_method(&mut self, s: Rc<str>, name: &str, args: Args) -> Result<Value> {
        let call = format!("str.{name}()");
        let call = call.as_str();
        match name {
            "upper" | "lower" | "title" | "capitalize" => {
                args.bind(call, [], 0)?;
                let text = match name {
                    "upper" => s.to_uppercase(),
                    "lower" => s.to_lowercase(),
                    "title" => title_case(&s),
                    _ => capitalize(&s),
                };
                self.new_str(text)
            }
            "strip" | "lstrip" | "rstrip" => {
                let [chars] = args.bind(call, ["chars"], 0)?;
                let chars = match chars {
                    None | Some(Value::None) => None,
                    Some(value) => Some(expect_str("strip() chars", &value)?.to_string()),
                };
                let matcher = |c: char| match &chars {
                    Some(set) => set.contains(c),
                    None => c.is_whitespace(),
                };
                let text = match name {
                    "strip" => s.trim_matches(matcher),
                    "lstrip" => s.trim_start_matches(matcher),
                    _ => s.trim_end_matches(matcher),
                };
                Ok(Value::str(text))
            }
            "split" => {
                let [sep, maxsplit] = args.bind(call, ["sep", "maxsplit"], 0)?;
                let maxsplit = match maxsplit {
                    Some(m) => expect_int("split() maxsplit", &m)?,
                    None => -1,
                };
                let parts: Vec<String> = match sep {
                    None | Some(Value::None) => split_whitespace(&s, maxsplit),
                    Some(sep) => {
                        let sep = expect_str("split() separator", &sep)?;
                        if sep.is_empty() {
                            return Err(SandboxError::type_error("empty separator"));
                        }
                        match usize::try_from(maxsplit) {
                            Ok(m) => s.splitn(m.saturating_add(1), sep).map(str::to_string).collect(),
                            Err(_) => s.split(sep).map(str::to_string).collect(),
                        }
                    }
                };
                self.string_list(parts)
            }
            "splitlines" => {
                args.bind(call, [], 0)?;
                let parts = s.lines().map(str::to_string).collect();
                self.string_list(parts)
            }
            "join" => {
                let [iterable] = args.bind(call, ["iterable"], 1)?;
                let items = self.iterate(&arg(iterable))?;
                let mut out = String::new();
                for (i, item) in items.iter().enumerate() {
                    let Value::Str(piece) = item else {
                        return Err(SandboxError::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            item.type_name()
                        )));
                    };
                    if i > 0 {
                        out.push_str(&s);
                    }
                    out.push_str(piece);
                    self.budget.string(out.len())?;
                }
                Ok(Value::str(out))
            }
            "replace" => {
                let [old, new, count] = args.bind(call, ["old", "new", "count"], 2)?;
                let (old, new) = (arg(old), arg(new));
                let old = expect_str("replace() argument 1", &old)?;
                let new = expect_str("replace() argument 2", &new)?;
                let count = match count {
                    Some(c) => expect_int("replace() count", &c)?,
                    None => -1,
                };
                let occurrences = if old.is_empty() {
                    s.chars().count() + 1
                } else {
                    s.matches(old).count()
                };
                self.budget
                    .string(s.len().saturating_add(occurrences.saturating_mul(new.len())))?;
                let text = match usize::try_from(count) {
                    Ok(n) => s.replacen(old, new, n),
                    Err(_) => s.replace(old, new),
                };
                Ok(Value::str(text))
            }
            "startswith" | "endswith" => {
                let [affix] = args.bind(call, ["prefix"], 1)?;
                let candidates = match arg(affix) {
                    Value::Tuple(items) => items.to_vec(),
                    other => vec![other],
                };
                for candidate in &candidates {
                    let candidate = expect_str(&format!("{name}() argument"), candidate)?;
                    let hit = if name == "startswith" {
                        s.starts_with(candidate)
                    } else {
                        s.ends_with(candidate)
                    };
                    if hit {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            "format" => {
                let text = format::format_template(
                    &self.heap,
                    &s,
                    &args.positional,
                    &args.keywords,
                    self.max_string_bytes,
                )?;
                self.new_str(text)
            }
            "find" => {
                let [sub] = args.bind(call, ["sub"], 1)?;
                let sub = arg(sub);
                let sub = expect_str("find() argument", &sub)?;
                Ok(Value::Int(match s.find(sub) {
                    Some(byte) => s[..byte].chars().count() as i64,
                    None => -1,
                }))
            }
            "count" => {
                let [sub] = args.bind(call, ["sub"], 1)?;
                let sub = arg(sub);
                let sub = expect_str("count() argument", &sub)?;
                let count = if sub.is_empty() {
                    s.chars().count() + 1
                } else {
                    s.matches(sub).count()
                };
                Ok(Value::Int(count as i64))
            }
            "isdigit" | "isalpha" => {
                args.bind(call, [], 0)?;
                let test: fn(char) -> bool = if name == "isdigit" {
                    |c| c.is_ascii_digit()
                } else {
                    char::is_alphabetic
                };
                Ok(Value::Bool(!s.is_empty() && s.chars().all(test)))
            }
            "zfill" => {
                let [width] = args.bind(call, ["width"], 1)?;
                let width = self.check_width(expect_int("zfill() width", &arg(width))?)?;
                let len = s.chars().count();
                if width <= len {
                    return Ok(Value::Str(s));
                }
                let (sign, digits) = match s.chars().next() {
                    Some(c @ ('+' | '-')) => (Some(c), &s[1..]),
                    _ => (None, &s[..]),
                };
                let mut text = String::with_capacity(width);
                text.extend(sign);
                text.extend(std::iter::repeat_n('0', width - len));
                text.push_str(digits);
                self.new_str(text)
            }
            "ljust" | "rjust" | "center" => {
                let [width, fill] = args.bind(call, ["width", "fillchar"], 1)?;
                let width = self.check_width(expect_int(&format!("{name}() width"), &arg(width))?)?;
                let fill = match fill {
                    None => ' ',
                    Some(value) => {
                        let text = expect_str(&format!("{name}() fillchar"), &value)?;
                        let mut chars = text.chars();
                        match (chars.next(), chars.next()) {
                            (Some(c), None) => c,
                            _ => {
                                return Err(SandboxError::type_error(
                                    "the fill character must be exactly one character long",
                                ));
                            }
                        }
                    }
                };
                let len = s.chars().count();
                if width <= len {
                    return Ok(Value::Str(s));
                }
                let pad = width - len;
                let (left, right) = match name {
                    "ljust" => (0, pad),
                    "rjust" => (pad, 0),
                    _ => {
                        let left = pad / 2 + (pad & width & 1);
                        (left, pad - left)
                    }
                };
                let mut text = String::with_capacity(width);
                text.extend(std::iter::repeat_n(fill, left));
                text.push_str(&s);
                text.extend(std::iter::repeat_n(fill, right));
                self.new_str(text)
            }
            _ => Err(SandboxError::NoAttribute {
                type_name: "str".into(),
                attribute: name.to_string(),
            }),
        }
    }

    fn string_list(&mut self, parts: Vec<String>) -> Result<Value> {
        self.heap.check_len(parts.len())?;
        self.budget.elements(parts.len())?;
        let items = parts.into_iter().map(Value::str).collect();
        self.heap.alloc_list(items)
    }

    fn position_of(&self, items: &[Value], item: &Value) -> Result<Option<usize>> {
        for (i, candidate) in items.iter().enumerate() {
            if self.heap.equal(candidate, item)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn count_of(&self, items: &[Value], item: &Value) -> Result<usize> {
        let mut count = 0;
        for candidate in items {
            if self.heap.equal(candidate, item)? {
                count += 1;
            }
        }
        Ok(count)
    }

    fn not_in_sequence(&self, kind: &str, item: &Value) -> SandboxError {
        let shown = format::repr(&self.heap, item, 256).unwrap_or_else(|_| item.type_name().into());
        SandboxError::Index(format!("{shown} is not in {kind}"))
    }

    fn list_method(&mut self, id: HeapId, name: &str, args: Args) -> Result<Value> {
        let call = format!("list.{name}()");
        let call = call.as_str();
        match name {
            "append" => {
                let [item] = args.bind(call, ["object"], 1)?;
                self.heap.push(id, arg(item))?;
                Ok(Value::None)
            }
            "extend" => {
                let [iterable] = args.bind(call, ["iterable"], 1)?;
                let items = self.iterate(&arg(iterable))?;
                self.extend_list(id, items)?;
                Ok(Value::None)
            }
            "insert" => {
                let [index, item] = args.bind(call, ["index", "object"], 2)?;
                let index = expect_int("insert() index", &arg(index))?;
                let len = self.heap.list(id)?.len();
                self.heap.check_len(len + 1)?;
                let count = len as i64;
                let position = if index < 0 {
                    (index + count).max(0)
                } else {
                    index.min(count)
                } as usize;
                self.heap.list_mut(id)?.insert(position, arg(item));
                Ok(Value::None)
            }
            "pop" => {
                let [index] = args.bind(call, ["index"], 0)?;
                let list = self.heap.list(id)?;
                if list.is_empty() {
                    return Err(SandboxError::Index("pop from empty list".into()));
                }
                let len = list.len() as i64;
                let index = match index {
                    Some(i) => expect_int("pop() index", &i)?,
                    None => -1,
                };
                let position = if index < 0 { index + len } else { index };
                if !(0..len).contains(&position) {
                    return Err(SandboxError::Index("pop index out of range".into()));
                }
                Ok(self.heap.list_mut(id)?.remove(position as usize))
            }
            "index" => {
                let [item] = args.bind(call, ["value"], 1)?;
                let item = arg(item);
                let list = self.heap.list(id)?;
                self.budget.elements(list.len())?;
                match self.position_of(list, &item)? {
                    Some(i) => Ok(Value::Int(i as i64)),
                    None => Err(self.not_in_sequence("list", &item)),
                }
            }
            "count" => {
                let [item] = args.bind(call, ["value"], 1)?;
                let list = self.heap.list(id)?;
                self.budget.elements(list.len())?;
                Ok(Value::Int(self.count_of(list, &arg(item))? as i64))
            }
            "reverse" => {
                args.bind(call, [], 0)?;
                self.heap.list_mut(id)?.reverse();
                Ok(Value::None)
            }
            "sort" => {
                if !args.positional.is_empty() {
                    return Err(SandboxError::type_error(
                        "list.sort() takes no positional arguments",
                    ));
                }
                let [key, reverse] = args.bind(call, ["key", "reverse"], 0)?;
                let reverse = match reverse {
                    Some(flag) => self.truthy(&flag)?,
                    None => false,
                };
                let mut items = self.heap.list(id)?.clone();
                self.sort_values(&mut items, key, reverse)?;
                *self.heap.list_mut(id)? = items;
                Ok(Value::None)
            }
            "clear" => {
                args.bind(call, [], 0)?;
                self.heap.list_mut(id)?.clear();
                Ok(Value::None)
            }
            "copy" => {
                args.bind(call, [], 0)?;
                let items = self.heap.list(id)?.clone();
                self.budget.elements(items.len())?;
                self.heap.alloc_list(items)
            }
            "remove" => {
                let [item] = args.bind(call, ["value"], 1)?;
                let item = arg(item);
                let list = self.heap.list(id)?;
                match self.position_of(list, &item)? {
                    Some(i) => {
                        self.heap.list_mut(id)?.remove(i);
                        Ok(Value::None)
                    }
                    None => Err(self.not_in_sequence("list", &item)),
                }
            }
            _ => Err(SandboxError::NoAttribute {
                type_name: "list".into(),
                attribute: name.to_string(),
            }),
        }
    }

    fn dict_method(&mut self, id: HeapId, name: &str, args: Args) -> Result<Value> {
        let call = format!("dict.{name}()");
        let call = call.as_str();
        match name {
            "items" | "keys" | "values" => {
                args.bind(call, [], 0)?;
                let dict = self.heap.dict(id)?;
                let items: Vec<Value> = dict
                    .entries()
                    .iter()
                    .map(|(key, value)| match name {
                        "items" => Value::tuple(vec![key.clone(), value.clone()]),
                        "keys" => key.clone(),
                        _ => value.clone(),
                    })
                    .collect();
                self.budget.elements(items.len())?;
                self.heap.alloc_list(items)
            }
            "get" => {
                let [key, default] = args.bind(call, ["key", "default"], 1)?;
                let hash = HashKey::from_value(&arg(key))?;
                Ok(self
                    .heap
                    .dict(id)?
                    .get(&hash)
                    .cloned()
                    .unwrap_or_else(|| arg(default)))
            }
            "update" => {
                if args.positional.len() > 1 {
                    return Err(SandboxError::type_error(format!(
                        "update expected at most 1 argument, got {}",
                        args.positional.len()
                    )));
                }
                let mut entries = match args.positional.first() {
                    Some(source) => self.dict_entries(source)?,
                    None => Vec::new(),
                };
                entries.extend(args.keywords.into_iter().map(|(k, v)| (Value::str(k), v)));
                for (key, value) in entries {
                    self.heap.dict_insert(id, key, value)?;
                }
                Ok(Value::None)
            }
            "pop" => {
                let [key, default] = args.bind(call, ["key", "default"], 1)?;
                let key = arg(key);
                let hash = HashKey::from_value(&key)?;
                let removed = self.heap.dict_mut(id)?.remove(&hash);
                match removed {
                    Some(value) => Ok(value),
                    None => match default {
                        Some(default) => Ok(default),
                        None => {
                            let shown = format::repr(&self.heap, &key, 256)?;
                            Err(SandboxError::Key(format!("key {shown} is not in the dict")))
                        }
                    },
                }
            }
            _ => Err(SandboxError::NoAttribute {
                type_name: "dict".into(),
                attribute: name.to_string(),
            }),
        }
    }

    fn tuple_method(&mut self, items: Rc<[Value]>, name: &str, args: Args) -> Result<Value> {
        let call = format!("tuple.{name}()");
        let [item] = args.bind(&call, ["value"], 1)?;
        let item = arg(item);
        self.budget.elements(items.len())?;
        match name {
            "index" => match self.position_of(&items, &item)? {
                Some(i) => Ok(Value::Int(i as i64)),
                None => Err(self.not_in_sequence("tuple", &item)),
            },
            "count" => Ok(Value::Int(self.count_of(&items, &item)? as i64)),
            _ => Err(SandboxError::NoAttribute {
                type_name: "tuple".into(),
                attribute: name.to_string(),
            }),
        }
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_cased = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_cased = true;
        } else {
            out.push(c);
            previous_cased = false;
        }
    }
    out
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn split_whitespace(text: &str, maxsplit: i64) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        if maxsplit >= 0 && parts.len() as i64 == maxsplit {
            parts.push(rest.to_string());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(rest.to_string());
                break;
            }
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::CancelToken;
    use crate::config::SandboxConfig;
    use crate::parser::parse;

    fn eval(source: &str) -> Interp {
        let program = parse(source).unwrap();
        let mut interp = Interp::new(&SandboxConfig::default(), CancelToken::new());
        interp.run(&program).unwrap();
        interp
    }

    fn fails(source: &str) -> SandboxError {
        let program = parse(source).unwrap();
        let mut interp = Interp::new(&SandboxConfig::default(), CancelToken::new());
        interp.run(&program).unwrap_err().error
    }

    fn shown(interp: &Interp, name: &str) -> String {
        let value = interp.global(name).unwrap();
        format::repr(&interp.heap, &value, 4096).unwrap()
    }

    #[test]
    fn binding_reports_python_style_errors() {
        let args = Args {
            positional: vec![Value::Int(1)],
            keywords: vec![("a".into(), Value::Int(2))],
        };
        let err = args.bind("f()", ["a", "b"], 1).unwrap_err();
        assert_eq!(err.to_string(), "f() got multiple values for argument 'a'");

        let err = Args::new(vec![]).bind("f()", ["a"], 1).unwrap_err();
        assert_eq!(err.to_string(), "f() missing required argument 'a'");

        let err = Args::new(vec![Value::None]).bind("f()", [], 0).unwrap_err();
        assert_eq!(err.to_string(), "f() takes no arguments (1 given)");
    }

    #[test]
    fn int_parsing() {
        assert_eq!(parse_int(" 42 ", 10).unwrap(), 42);
        assert_eq!(parse_int("-0x1F", 0).unwrap(), -31);
        assert_eq!(parse_int("1_000", 10).unwrap(), 1000);
        assert_eq!(parse_int("ff", 16).unwrap(), 255);
        assert!(parse_int("1__0", 10).is_err());
        assert!(parse_int("12a", 10).is_err());
        assert!(parse_int("--5", 10).is_err());
        assert_eq!(
            parse_int("99999999999999999999", 10).unwrap_err(),
            SandboxError::Type("integer overflow".into())
        );
    }

    #[test]
    fn rounding_is_bankers() {
        assert!(matches!(round(&Value::Float(2.5), None).unwrap(), Value::Int(2)));
        assert!(matches!(round(&Value::Float(3.5), None).unwrap(), Value::Int(4)));
        assert_eq!(round_int(1250, -2).unwrap(), 1200);
        assert_eq!(round_int(1350, -2).unwrap(), 1400);
        assert_eq!(round_int(-151, -1).unwrap(), -150);
    }

    #[test]
    fn conversions() {
        let interp = eval("a = int(3.9)\nb = float('1_5.5')\nc = str(12)\nd = bool([])\ne = int('-7')\n");
        assert_eq!(shown(&interp, "a"), "3");
        assert_eq!(shown(&interp, "b"), "15.5");
        assert_eq!(shown(&interp, "c"), "'12'");
        assert_eq!(shown(&interp, "d"), "False");
        assert_eq!(shown(&interp, "e"), "-7");
        assert!(matches!(fails("int('x')\n"), SandboxError::Type(m) if m.contains("invalid literal")));
    }

    #[test]
    fn sequence_builtins() {
        let interp = eval(
            "\
pairs = list(enumerate(['a', 'b'], 1))
z = list(zip([1, 2, 3], 'xy'))
m = max([3, 9, 2])
k = min(['apple', 'fig', 'kiwi'], key=len)
s = sorted([3, 1, 2], reverse=True)
t = sum([1, 2, 3], 10)
r = list(reversed(range(3)))
d = dict([('a', 1)], b=2)
",
        );
        assert_eq!(shown(&interp, "pairs"), "[(1, 'a'), (2, 'b')]");
        assert_eq!(shown(&interp, "z"), "[(1, 'x'), (2, 'y')]");
        assert_eq!(shown(&interp, "m"), "9");
        assert_eq!(shown(&interp, "k"), "'fig'");
        assert_eq!(shown(&interp, "s"), "[3, 2, 1]");
        assert_eq!(shown(&interp, "t"), "16");
        assert_eq!(shown(&interp, "r"), "[2, 1, 0]");
        assert_eq!(shown(&interp, "d"), "{'a': 1, 'b': 2}");
    }

    #[test]
    fn sorting_is_stable_and_reports_mixed_types() {
        let interp = eval("rows = sorted([('b', 1), ('a', 2), ('b', 0)], key=len)\n");
        assert_eq!(shown(&interp, "rows"), "[('b', 1), ('a', 2), ('b', 0)]");
        assert!(matches!(
            fails("sorted([1, 'a'])\n"),
            SandboxError::Type(m) if m.contains("'<' not supported")
        ));
        assert!(matches!(fails("max([])\n"), SandboxError::Type(_)));
    }

    #[test]
    fn string_methods() {
        let interp = eval(
            "\
a = '  Hello World  '.strip().lower()
b = 'a,b,,c'.split(',')
c = ' x  y z '.split(None, 1)
d = '-'.join(['1', '2', '3'])
e = 'quarterly report'.title()
f = '{} is {:>5}'.format('pi', 3)
g = '7'.zfill(3)
h = 'ab'.center(6, '*')
i = 'banana'.replace('a', 'o', 2)
j = 'report.docx'.endswith(('.docx', '.doc'))
",
        );
        assert_eq!(shown(&interp, "a"), "'hello world'");
        assert_eq!(shown(&interp, "b"), "['a', 'b', '', 'c']");
        assert_eq!(shown(&interp, "c"), "['x', 'y z ']");
        assert_eq!(shown(&interp, "d"), "'1-2-3'");
        assert_eq!(shown(&interp, "e"), "'Quarterly Report'");
        assert_eq!(shown(&interp, "f"), "'pi is     3'");
        assert_eq!(shown(&interp, "g"), "'007'");
        assert_eq!(shown(&interp, "h"), "'**ab**'");
        assert_eq!(shown(&interp, "i"), "'bonona'");
        assert_eq!(shown(&interp, "j"), "True");
    }

    #[test]
    fn list_and_dict_methods() {
        let interp = eval(
            "\
xs = [3, 1, 2]
xs.append(4)
xs.sort()
xs.insert(0, 0)
last = xs.pop()
where = xs.index(2)
d = {'a': 1}
d.update(b=2)
missing = d.get('z', 'none')
popped = d.pop('a')
keys = d.keys()
",
        );
        assert_eq!(shown(&interp, "xs"), "[0, 1, 2, 3]");
        assert_eq!(shown(&interp, "last"), "4");
        assert_eq!(shown(&interp, "where"), "2");
        assert_eq!(shown(&interp, "missing"), "'none'");
        assert_eq!(shown(&interp, "popped"), "1");
        assert_eq!(shown(&interp, "keys"), "['b']");
        assert!(matches!(fails("[1].remove(5)\n"), SandboxError::Index(_)));
        assert!(matches!(fails("[].pop()\n"), SandboxError::Index(_)));
    }

    #[test]
    fn measurement_helpers_validate_input() {
        let interp = eval("from docx.shared import Pt, Inches, RGBColor\na = Pt(12)\nb = Inches(0.5)\nc = RGBColor(255, 0, 0)\n");
        assert_eq!(shown(&interp, "a"), "152400");
        assert_eq!(shown(&interp, "b"), "457200");
        assert!(matches!(
            fails("from docx.shared import Pt\nPt('12')\n"),
            SandboxError::Type(m) if m == "Pt() expects a number, not 'str'"
        ));
        assert!(matches!(
            fails("from docx.shared import RGBColor\nRGBColor(300, 0, 0)\n"),
            SandboxError::Dom(_)
        ));
    }

    #[test]
    fn document_constructor_refuses_paths() {
        assert!(matches!(
            fails("from docx import Document\nDocument('template.docx')\n"),
            SandboxError::Denied { ref name, .. } if name == "Document(path)"
        ));
        assert!(matches!(
            fails("Document()\nDocument()\n"),
            SandboxError::Dom(docsmith_dom::DomError::DuplicateDocument)
        ));
    }
}
