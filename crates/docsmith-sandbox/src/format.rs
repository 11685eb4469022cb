//! Text rendering of values: `str()`, `repr()`, format specs and
//! `str.format` templates.
//!
//! Rendering is bounded twice over: nesting depth by [`MAX_VALUE_DEPTH`] and
//! output size by the caller's byte limit, which is checked while the text
//! is produced so a huge container is never rendered in full.

use std::fmt::Write as _;

use crate::config::MAX_VALUE_DEPTH;
use crate::error::{Result, SandboxError};
use crate::value::{Handle, Heap, Value};

pub(crate) fn to_str(heap: &Heap, value: &Value, limit: usize) -> Result<String> {
    match value {
        Value::Str(s) => Ok(s.to_string()),
        _ => {
            let mut r = Renderer::new(heap, limit);
            r.value(value, false, 0)?;
            Ok(r.out)
        }
    }
}

pub(crate) fn repr(heap: &Heap, value: &Value, limit: usize) -> Result<String> {
    let mut r = Renderer::new(heap, limit);
    r.value(value, true, 0)?;
    Ok(r.out)
}

struct Renderer<'h> {
    heap: &'h Heap,
    out: String,
    limit: usize,
}

impl<'h> Renderer<'h> {
    fn new(heap: &'h Heap, limit: usize) -> Self {
        Self {
            heap,
            out: String::new(),
            limit,
        }
    }

    fn push(&mut self, text: &str) -> Result<()> {
        if self.out.len() + text.len() > self.limit {
            return Err(SandboxError::Limit {
                what: "string size in bytes",
                limit: self.limit,
            });
        }
        self.out.push_str(text);
        Ok(())
    }

    fn value(&mut self, value: &Value, quoted: bool, depth: usize) -> Result<()> {
        if depth > MAX_VALUE_DEPTH {
            return Err(SandboxError::Limit {
                what: "value nesting depth",
                limit: MAX_VALUE_DEPTH,
            });
        }
        match value {
            Value::None => self.push("None"),
            Value::Bool(true) => self.push("True"),
            Value::Bool(false) => self.push("False"),
            Value::Int(i) => self.push(&i.to_string()),
            Value::Float(f) => self.push(&float_repr(*f)),
            Value::Str(s) if quoted => self.push(&quote(s)),
            Value::Str(s) => self.push(s),
            Value::List(id) => {
                let items = self.heap.list(*id)?;
                self.sequence("[", items, "]", depth)
            }
            Value::Tuple(items) => {
                if items.len() == 1 {
                    self.push("(")?;
                    self.value(&items[0], true, depth + 1)?;
                    self.push(",)")
                } else {
                    self.sequence("(", items, ")", depth)
                }
            }
            Value::Dict(id) => {
                let dict = self.heap.dict(*id)?;
                self.push("{")?;
                for (i, (k, v)) in dict.entries().iter().enumerate() {
                    if i > 0 {
                        self.push(", ")?;
                    }
                    self.value(k, true, depth + 1)?;
                    self.push(": ")?;
                    self.value(v, true, depth + 1)?;
                }
                self.push("}")
            }
            Value::Range { start, stop, step } => {
                if *step == 1 {
                    self.push(&format!("range({start}, {stop})"))
                } else {
                    self.push(&format!("range({start}, {stop}, {step})"))
                }
            }
            Value::Length(l) => self.push(&l.emu().to_string()),
            Value::Color(c) if quoted => self.push(&c.to_string()),
            Value::Color(c) => self.push(&c.to_hex()),
            Value::Enum(e) => self.push(&format!("{}.{}", e.class_name(), e.member_name())),
            Value::EnumClass(c) => self.push(&format!("<enum '{}'>", c.name)),
            Value::Module(name) => self.push(&format!("<module '{name}'>")),
            Value::Builtin(b) => self.push(&format!("<built-in function {}>", b.name())),
            Value::Method(m) => self.push(&format!("<built-in method {}>", m.name)),
            Value::Handle(Handle::ParagraphStyle(s)) => {
                self.push(&format!("ParagraphStyle('{}')", s.name()))
            }
            Value::Handle(Handle::TableStyle(s)) => self.push(&format!("TableStyle('{}')", s.name())),
            Value::Handle(h) => self.push(&format!("<docx.{} object>", h.type_name())),
        }
    }

    fn sequence(&mut self, open: &str, items: &[Value], close: &str, depth: usize) -> Result<()> {
        self.push(open)?;
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ")?;
            }
            self.value(item, true, depth + 1)?;
        }
        self.push(close)
    }
}

/// Quote a string the way `repr()` does.
fn quote(text: &str) -> String {
    let delimiter = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(delimiter);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push(delimiter);
    out
}

/// Shortest round-trip rendering of a float, in Python's notation.
pub(crate) fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".into() } else { "-inf".into() };
    }
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        let text = format!("{value:e}");
        let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exponent.abs());
    }
    let text = value.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

// ---------------------------------------------------------------------------
// Format specs
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: bool,
    precision: Option<usize>,
    kind: Option<char>,
}

fn invalid_spec(spec: &str) -> SandboxError {
    SandboxError::type_error(format!("invalid format specifier '{spec}'"))
}

fn parse_spec(spec: &str) -> Result<Spec> {
    let chars: Vec<char> = spec.chars().collect();
    let mut parsed = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

    if chars.len() >= 2 && is_align(chars[1]) {
        parsed.fill = Some(chars[0]);
        parsed.align = Some(chars[1]);
        i = 2;
    } else if chars.first().is_some_and(|c| is_align(*c)) {
        parsed.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c @ ('+' | '-' | ' ')) = chars.get(i) {
        parsed.sign = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        parsed.zero = true;
        i += 1;
    }
    let digits = |i: &mut usize| -> Result<Option<usize>> {
        let start = *i;
        while chars.get(*i).is_some_and(|c| c.is_ascii_digit()) {
            *i += 1;
        }
        if start == *i {
            return Ok(None);
        }
        let text: String = chars[start..*i].iter().collect();
        text.parse().map(Some).map_err(|_| invalid_spec(spec))
    };
    parsed.width = digits(&mut i)?.unwrap_or(0);
    if chars.get(i) == Some(&',') {
        parsed.grouping = true;
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        parsed.precision = Some(digits(&mut i)?.ok_or_else(|| invalid_spec(spec))?);
    }
    if let Some(&c) = chars.get(i) {
        if !matches!(c, 's' | 'd' | 'f' | 'F' | '%') {
            return Err(SandboxError::type_error(format!(
                "unsupported format code '{c}'; use one of s, d, f, %"
            )));
        }
        parsed.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(invalid_spec(spec));
    }
    Ok(parsed)
}

fn unknown_code(code: char, value: &Value) -> SandboxError {
    SandboxError::type_error(format!(
        "unknown format code '{code}' for object of type '{}'",
        value.type_name()
    ))
}

/// Apply a format spec such as `>10` or `,.2f` to a value.
pub(crate) fn format_value(heap: &Heap, value: &Value, spec: &str, limit: usize) -> Result<String> {
    if spec.is_empty() {
        return to_str(heap, value, limit);
    }
    let spec_parsed = parse_spec(spec)?;
    if spec_parsed.width > limit {
        return Err(SandboxError::Limit {
            what: "string size in bytes",
            limit,
        });
    }
    let s = &spec_parsed;

    let (negative, body, numeric) = match value {
        Value::Int(_) | Value::Bool(_) | Value::Length(_) => {
            let n = match value {
                Value::Int(i) => *i,
                Value::Bool(b) => i64::from(*b),
                Value::Length(l) => l.emu(),
                _ => 0,
            };
            match s.kind {
                None | Some('d') => {
                    if s.precision.is_some() {
                        return Err(SandboxError::type_error(
                            "precision not allowed in integer format specifier",
                        ));
                    }
                    (n < 0, group(&n.unsigned_abs().to_string(), s.grouping), true)
                }
                Some('f' | 'F' | '%') => fixed(n as f64, s),
                Some(code) => return Err(unknown_code(code, value)),
            }
        }
        Value::Float(f) => match s.kind {
            Some('f' | 'F' | '%') => fixed(*f, s),
            None if s.precision.is_some() => {
                (f.is_sign_negative(), general(f.abs(), s.precision.unwrap_or(6)), true)
            }
            None => {
                let text = float_repr(f.abs());
                (f.is_sign_negative() && !f.is_nan(), group_decimal(&text, s.grouping), true)
            }
            Some(code) => return Err(unknown_code(code, value)),
        },
        Value::Str(text) => {
            if let Some(code) = s.kind.filter(|c| *c != 's') {
                return Err(unknown_code(code, value));
            }
            if s.sign.is_some() || s.grouping || s.align == Some('=') {
                return Err(invalid_spec(spec));
            }
            let body = match s.precision {
                Some(p) => text.chars().take(p).collect(),
                None => text.to_string(),
            };
            (false, body, false)
        }
        other => {
            return Err(SandboxError::type_error(format!(
                "unsupported format string passed to {}.__format__",
                other.type_name()
            )));
        }
    };

    let sign = match (negative, s.sign) {
        (true, _) => "-",
        (false, Some('+')) => "+",
        (false, Some(' ')) => " ",
        _ => "",
    };
    let (fill, align) = match (s.fill, s.align) {
        (fill, Some(align)) => (fill.unwrap_or(' '), align),
        (None, None) if s.zero && numeric => ('0', '='),
        _ => (' ', if numeric { '>' } else { '<' }),
    };
    let content = sign.chars().count() + body.chars().count();
    let pad = s.width.saturating_sub(content);
    let padding = |n: usize| std::iter::repeat_n(fill, n).collect::<String>();
    let out = match align {
        '<' => format!("{sign}{body}{}", padding(pad)),
        '^' => format!("{}{sign}{body}{}", padding(pad / 2), padding(pad - pad / 2)),
        '=' => format!("{sign}{}{body}", padding(pad)),
        _ => format!("{}{sign}{body}", padding(pad)),
    };
    if out.len() > limit {
        return Err(SandboxError::Limit {
            what: "string size in bytes",
            limit,
        });
    }
    Ok(out)
}

/// Fixed-point rendering for `f` and `%`, returning (negative, digits, numeric).
fn fixed(value: f64, spec: &Spec) -> (bool, String, bool) {
    let precision = spec.precision.unwrap_or(6).min(100);
    let (scaled, suffix) = if spec.kind == Some('%') {
        (value * 100.0, "%")
    } else {
        (value, "")
    };
    if !scaled.is_finite() {
        let text = if scaled.is_nan() { "nan" } else { "inf" };
        return (scaled < 0.0, format!("{text}{suffix}"), true);
    }
    let text = format!("{:.*}", precision, scaled.abs());
    let negative = scaled < 0.0 && text.chars().any(|c| c.is_ascii_digit() && c != '0');
    (negative, format!("{}{suffix}", group_decimal(&text, spec.grouping)), true)
}

/// Significant-digit rendering for a float spec without a type.
fn general(value: f64, precision: usize) -> String {
    let precision = precision.clamp(1, 100);
    if value == 0.0 || !value.is_finite() {
        return float_repr(value);
    }
    let exponent = value.log10().floor() as i32;
    if exponent < -4 || exponent >= precision as i32 {
        let text = format!("{:.*e}", precision - 1, value);
        let (mantissa, exp) = text.split_once('e').unwrap_or((&text, "0"));
        let mantissa = trim_zeros(mantissa);
        let exp: i32 = exp.parse().unwrap_or(0);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_zeros(&format!("{value:.decimals$}"))
    }
}

fn trim_zeros(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text.to_string()
    }
}

fn group(digits: &str, grouping: bool) -> String {
    if !grouping || digits.len() <= 3 {
        return digits.to_string();
    }
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn group_decimal(text: &str, grouping: bool) -> String {
    match text.split_once('.') {
        Some((int, frac)) => format!("{}.{frac}", group(int, grouping)),
        None => group(text, grouping),
    }
}

// ---------------------------------------------------------------------------
// str.format
// ---------------------------------------------------------------------------

/// Expand a `str.format` template.
pub(crate) fn format_template(
    heap: &Heap,
    template: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
    limit: usize,
) -> Result<String> {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut next_auto = 0usize;
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                out.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                out.push('}');
                i += 2;
            }
            '}' => {
                return Err(SandboxError::type_error(
                    "single '}' encountered in format string",
                ));
            }
            '{' => {
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == '}')
                    .map(|p| i + p)
                    .ok_or_else(|| {
                        SandboxError::type_error("single '{' encountered in format string")
                    })?;
                let field: String = chars[i + 1..close].iter().collect();
                i = close + 1;

                let (head, spec) = field.split_once(':').unwrap_or((&field, ""));
                let (name, conversion) = match head.split_once('!') {
                    Some((name, conv)) => (name, Some(conv)),
                    None => (head, None),
                };
                if name.contains(['.', '[']) {
                    return Err(SandboxError::type_error(
                        "attribute and index lookups in format fields are not supported",
                    ));
                }
                let value = if name.is_empty() {
                    let value = args.get(next_auto).ok_or_else(|| {
                        SandboxError::Index(format!(
                            "replacement index {next_auto} out of range for positional args tuple"
                        ))
                    })?;
                    next_auto += 1;
                    value
                } else if let Ok(index) = name.parse::<usize>() {
                    args.get(index).ok_or_else(|| {
                        SandboxError::Index(format!(
                            "replacement index {index} out of range for positional args tuple"
                        ))
                    })?
                } else {
                    kwargs
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| SandboxError::Key(format!("'{name}'")))?
                };
                let text = match conversion {
                    None | Some("s") => format_value(heap, value, spec, limit)?,
                    Some("r") | Some("a") => {
                        let text = repr(heap, value, limit)?;
                        format_value(heap, &Value::str(text), spec, limit)?
                    }
                    Some(other) => {
                        return Err(SandboxError::type_error(format!(
                            "unknown conversion specifier {other}"
                        )));
                    }
                };
                if out.len() + text.len() > limit {
                    return Err(SandboxError::Limit {
                        what: "string size in bytes",
                        limit,
                    });
                }
                out.push_str(&text);
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}
