//! Script-side view of the document builder.
//!
//! Attribute reads, attribute writes and method calls on [`Handle`] values
//! are translated here into [`DocumentBuilder`](docsmith_dom::DocumentBuilder)
//! calls. The builder validates every value; this layer only converts
//! script values into the facade's typed vocabulary and rejects anything
//! that is not one of the exposed attributes.

use std::rc::Rc;

use docsmith_dom::{
    Alignment, BreakKind, CoreProperty, DomError, Length, LineSpacing, Orientation, PageSetting,
    ParagraphSetting, ParagraphStyle, RunSetting, SectionStart, TableStyle, Unit,
};

use crate::builtins::{self, Args, arg, expect_bool, expect_int, expect_number, expect_str};
use crate::error::{Result, SandboxError};
use crate::format;
use crate::interp::Interp;
use crate::namespace;
use crate::value::{Builtin, EnumValue, Handle, Method, Value};

const READ_ONLY_STYLES: &str = "the style catalog is read-only";
const NO_IMAGES: &str = "images are not available";
const BYTES_AFTER_RUN: &str = "the document bytes are returned by the engine after the script finishes";

/// Attributes that can be read but never assigned.
const READ_ONLY: &[&str] = &[
    "sections",
    "paragraphs",
    "tables",
    "core_properties",
    "styles",
    "paragraph_format",
    "runs",
    "font",
    "color",
    "rows",
    "columns",
    "cells",
    "name",
];

fn check_attribute(name: &str) -> Result<()> {
    match namespace::denied_attribute(name) {
        Some(reason) => Err(SandboxError::Denied {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn no_attribute(type_name: &str, name: &str) -> SandboxError {
    SandboxError::NoAttribute {
        type_name: type_name.to_string(),
        attribute: name.to_string(),
    }
}

/// Prefix used for the handle in operation names such as `table.cell()`.
fn handle_label(handle: Handle) -> &'static str {
    match handle {
        Handle::Document => "doc",
        Handle::CoreProperties => "core_properties",
        Handle::Styles => "styles",
        Handle::Sections => "sections",
        Handle::Section(_) => "section",
        Handle::Paragraphs | Handle::CellParagraphs(_) => "paragraphs",
        Handle::Tables => "tables",
        Handle::Paragraph(_) => "paragraph",
        Handle::ParagraphFormat(_) => "paragraph_format",
        Handle::Runs(_) => "runs",
        Handle::Run(_) => "run",
        Handle::Font(_) => "font",
        Handle::FontColor(_) => "font.color",
        Handle::Table(_) => "table",
        Handle::Rows(_) => "rows",
        Handle::Row(_) => "row",
        Handle::RowCells(_) | Handle::ColumnCells(_) => "cells",
        Handle::Columns(_) => "columns",
        Handle::Column(_) => "column",
        Handle::Cell(_) => "cell",
        Handle::Buffer => "buffer",
        Handle::ParagraphStyle(_) | Handle::TableStyle(_) => "style",
    }
}

fn handle_methods(handle: Handle) -> &'static [&'static str] {
    match handle {
        Handle::Document => &[
            "add_heading",
            "add_paragraph",
            "add_table",
            "add_page_break",
            "add_section",
            "add_picture",
            "save",
        ],
        Handle::Paragraph(_) => &["add_run", "clear"],
        Handle::Run(_) => &["add_text", "add_break", "add_tab", "add_picture"],
        Handle::Table(_) => &["add_row", "add_column", "cell"],
        Handle::Cell(_) => &["add_paragraph"],
        Handle::Buffer => &["seek", "tell", "getvalue", "read"],
        _ => &[],
    }
}

/// Name of the bound method `name` on `object`, if it has one.
fn method_name(object: &Value, name: &str) -> Option<&'static str> {
    if let Some(method) = builtins::value_method_name(object, name) {
        return Some(method);
    }
    let Value::Handle(handle) = object else {
        return None;
    };
    handle_methods(*handle).iter().copied().find(|m| *m == name)
}

fn length_attr(length: Length, name: &str) -> Option<Value> {
    Some(match name {
        "pt" => Value::Float(length.to_unit(Unit::Point)),
        "inches" => Value::Float(length.to_unit(Unit::Inch)),
        "cm" => Value::Float(length.to_unit(Unit::Centimeter)),
        "mm" => Value::Float(length.to_unit(Unit::Millimeter)),
        "emu" => Value::Int(length.emu()),
        "twips" => Value::Int(length.twips()),
        _ => return None,
    })
}

// -- value conversions ------------------------------------------------------

fn text_value(label: &str, value: &Value) -> Result<String> {
    Ok(expect_str(label, value)?.to_string())
}

/// Optional text argument: omitted or `None` is the empty string.
fn opt_text(label: &str, value: Option<Value>) -> Result<String> {
    match value {
        None | Some(Value::None) => Ok(String::new()),
        Some(value) => text_value(label, &value),
    }
}

fn length_value(label: &str, value: &Value) -> Result<Length> {
    match value {
        Value::Length(length) => Ok(*length),
        Value::Int(emu) => Ok(Length::from_emu(*emu)?),
        other => Err(SandboxError::type_error(format!(
            "{label} must be a Length such as Pt(12) or Inches(1), not '{}'",
            other.type_name()
        ))),
    }
}

fn opt_length_value(label: &str, value: &Value) -> Result<Option<Length>> {
    match value {
        Value::None => Ok(None),
        other => length_value(label, other).map(Some),
    }
}

fn opt_bool_value(label: &str, value: &Value) -> Result<Option<bool>> {
    match value {
        Value::None => Ok(None),
        other => expect_bool(label, other).map(Some),
    }
}

fn alignment_value(label: &str, value: &Value) -> Result<Option<Alignment>> {
    match value {
        Value::None => Ok(None),
        Value::Enum(EnumValue::Align(a) | EnumValue::TableAlign(a)) => Ok(Some(*a)),
        Value::Str(keyword) => Ok(Some(Alignment::from_keyword(label, keyword)?)),
        other => Err(SandboxError::type_error(format!(
            "{label} must be a WD_ALIGN_PARAGRAPH member, not '{}'",
            other.type_name()
        ))),
    }
}

fn section_start_value(label: &str, value: &Value) -> Result<SectionStart> {
    match value {
        Value::Enum(EnumValue::Section(start)) => Ok(*start),
        other => Err(SandboxError::type_error(format!(
            "{label} must be a WD_SECTION_START member, not '{}'",
            other.type_name()
        ))),
    }
}

fn orientation_value(label: &str, value: &Value) -> Result<Orientation> {
    match value {
        Value::Enum(EnumValue::Orient(orientation)) => Ok(*orientation),
        other => Err(SandboxError::type_error(format!(
            "{label} must be a WD_ORIENT member, not '{}'",
            other.type_name()
        ))),
    }
}

fn break_value(label: &str, value: &Value) -> Result<BreakKind> {
    match value {
        Value::Enum(EnumValue::Break(kind)) => Ok(*kind),
        other => Err(SandboxError::type_error(format!(
            "{label} must be a WD_BREAK member, not '{}'",
            other.type_name()
        ))),
    }
}

fn paragraph_style_value(label: &str, value: &Value) -> Result<Option<ParagraphStyle>> {
    match value {
        Value::None => Ok(None),
        Value::Str(name) => Ok(Some(ParagraphStyle::named(label, name)?)),
        Value::Handle(Handle::ParagraphStyle(style)) => Ok(Some(*style)),
        other => Err(SandboxError::type_error(format!(
            "{label} must be a style name, not '{}'",
            other.type_name()
        ))),
    }
}

fn table_style_value(label: &str, value: &Value) -> Result<Option<TableStyle>> {
    match value {
        Value::None => Ok(None),
        Value::Str(name) => Ok(Some(TableStyle::named(label, name)?)),
        Value::Handle(Handle::TableStyle(style)) => Ok(Some(*style)),
        other => Err(SandboxError::type_error(format!(
            "{label} must be a table style name, not '{}'",
            other.type_name()
        ))),
    }
}

fn line_spacing_value(label: &str, value: &Value) -> Result<Option<LineSpacing>> {
    match value {
        Value::None => Ok(None),
        Value::Length(length) => Ok(Some(LineSpacing::Exact(*length))),
        other => Ok(Some(LineSpacing::Multiple(expect_number(label, other)?))),
    }
}

fn opt_enum<T>(value: Option<T>, wrap: fn(T) -> EnumValue) -> Value {
    value.map_or(Value::None, |v| Value::Enum(wrap(v)))
}

// ---------------------------------------------------------------------------
// Attribute access
// ---------------------------------------------------------------------------

impl Interp {
    pub(crate) fn get_attr(&mut self, object: &Value, name: &str) -> Result<Value> {
        check_attribute(name)?;
        if let Some(method) = method_name(object, name) {
            return Ok(Value::Method(Rc::new(Method {
                receiver: object.clone(),
                name: method,
            })));
        }
        match object {
            Value::Handle(handle) => self.handle_attr(*handle, name),
            Value::Length(length) => {
                length_attr(*length, name).ok_or_else(|| no_attribute("Length", name))
            }
            Value::Enum(member) if name == "name" => Ok(Value::str(member.member_name())),
            Value::EnumClass(class) => class
                .member(name)
                .map(Value::Enum)
                .ok_or_else(|| no_attribute(class.name, name)),
            Value::Module(module) => namespace::import_name(*module, name),
            Value::Builtin(Builtin::RgbColor) if name == "from_string" => {
                Ok(Value::Builtin(Builtin::RgbFromString))
            }
            other => Err(no_attribute(other.type_name(), name)),
        }
    }

    /// `receiver.name(*args)`.
    pub(crate) fn call_method(&mut self, receiver: Value, name: &str, args: Args) -> Result<Value> {
        check_attribute(name)?;
        if builtins::value_method_name(&receiver, name).is_some() {
            return self.call_value_method(&receiver, name, args);
        }
        if let Value::Handle(handle) = &receiver
            && handle_methods(*handle).contains(&name)
        {
            return self.handle_method(*handle, name, args);
        }
        let callee = self.get_attr(&receiver, name)?;
        self.call_value(callee, args)
    }

    fn handle_attr(&mut self, handle: Handle, name: &str) -> Result<Value> {
        let missing = || no_attribute(handle.type_name(), name);
        let value = match handle {
            Handle::Document => match name {
                "sections" => {
                    self.builder.section_at(0)?;
                    Value::Handle(Handle::Sections)
                }
                "paragraphs" => Value::Handle(Handle::Paragraphs),
                "tables" => Value::Handle(Handle::Tables),
                "core_properties" => Value::Handle(Handle::CoreProperties),
                "styles" => Value::Handle(Handle::Styles),
                _ => return Err(missing()),
            },
            Handle::CoreProperties => {
                let property = CoreProperty::from_name(name).ok_or_else(missing)?;
                Value::str(self.builder.property(property).unwrap_or(""))
            }
            Handle::Section(id) => {
                let setup = *self.builder.page_setup(id)?;
                match name {
                    "start_type" => Value::Enum(EnumValue::Section(setup.start)),
                    "orientation" => Value::Enum(EnumValue::Orient(setup.orientation)),
                    "page_width" => Value::Length(setup.page_width),
                    "page_height" => Value::Length(setup.page_height),
                    "top_margin" => Value::Length(setup.top_margin),
                    "right_margin" => Value::Length(setup.right_margin),
                    "bottom_margin" => Value::Length(setup.bottom_margin),
                    "left_margin" => Value::Length(setup.left_margin),
                    _ => return Err(missing()),
                }
            }
            Handle::Paragraph(id) => match name {
                "text" => {
                    let text = self.builder.paragraph_text(id)?;
                    self.new_str(text)?
                }
                "style" => {
                    let style = match self.builder.paragraph_style(id)? {
                        Some(style) => style,
                        None => ParagraphStyle::named("paragraph.style", "Normal")?,
                    };
                    Value::Handle(Handle::ParagraphStyle(style))
                }
                "alignment" => opt_enum(
                    self.builder.paragraph_format(id)?.alignment,
                    EnumValue::Align,
                ),
                "paragraph_format" => Value::Handle(Handle::ParagraphFormat(id)),
                "runs" => Value::Handle(Handle::Runs(id)),
                _ => return Err(missing()),
            },
            Handle::ParagraphFormat(id) => {
                let format = self.builder.paragraph_format(id)?;
                match name {
                    "alignment" => opt_enum(format.alignment, EnumValue::Align),
                    "space_before" => Value::opt_length(format.space_before),
                    "space_after" => Value::opt_length(format.space_after),
                    "line_spacing" => match format.line_spacing {
                        Some(LineSpacing::Multiple(m)) => Value::Float(m),
                        Some(LineSpacing::Exact(l)) => Value::Length(l),
                        None => Value::None,
                    },
                    "left_indent" => Value::opt_length(format.left_indent),
                    "right_indent" => Value::opt_length(format.right_indent),
                    "first_line_indent" => Value::opt_length(format.first_line_indent),
                    "keep_with_next" => Value::opt_bool(format.keep_with_next),
                    "page_break_before" => Value::opt_bool(format.page_break_before),
                    _ => return Err(missing()),
                }
            }
            Handle::Run(id) => match name {
                "text" => {
                    let text = self.builder.run_text(id)?;
                    self.new_str(text)?
                }
                "bold" => Value::opt_bool(self.builder.run_format(id)?.bold),
                "italic" => Value::opt_bool(self.builder.run_format(id)?.italic),
                "underline" => Value::opt_bool(self.builder.run_format(id)?.underline),
                "strike" => Value::opt_bool(self.builder.run_format(id)?.strike),
                "font" => Value::Handle(Handle::Font(id)),
                "style" => Value::None,
                _ => return Err(missing()),
            },
            Handle::Font(id) => {
                let format = self.builder.run_format(id)?;
                match name {
                    "name" => format.font_name.as_deref().map_or(Value::None, Value::str),
                    "size" => Value::opt_length(format.size),
                    "bold" => Value::opt_bool(format.bold),
                    "italic" => Value::opt_bool(format.italic),
                    "underline" => Value::opt_bool(format.underline),
                    "strike" => Value::opt_bool(format.strike),
                    "color" => Value::Handle(Handle::FontColor(id)),
                    _ => return Err(missing()),
                }
            }
            Handle::FontColor(id) => match name {
                "rgb" => self
                    .builder
                    .run_format(id)?
                    .color
                    .map_or(Value::None, Value::Color),
                _ => return Err(missing()),
            },
            Handle::Table(id) => match name {
                "style" => self
                    .builder
                    .table_style(id)?
                    .map_or(Value::None, |s| Value::Handle(Handle::TableStyle(s))),
                "alignment" => opt_enum(self.builder.table_alignment(id)?, EnumValue::TableAlign),
                "autofit" => Value::Bool(self.builder.table_autofit(id)?),
                "rows" => Value::Handle(Handle::Rows(id)),
                "columns" => Value::Handle(Handle::Columns(id)),
                _ => return Err(missing()),
            },
            Handle::Row(row) => match name {
                "cells" => Value::Handle(Handle::RowCells(row)),
                "height" => Value::opt_length(self.builder.row_height(row)?),
                _ => return Err(missing()),
            },
            Handle::Column(column) => match name {
                "cells" => Value::Handle(Handle::ColumnCells(column)),
                "width" => Value::opt_length(self.builder.column_width(column)?),
                _ => return Err(missing()),
            },
            Handle::Cell(cell) => match name {
                "text" => {
                    let text = self.builder.cell_text(cell)?;
                    self.new_str(text)?
                }
                "paragraphs" => Value::Handle(Handle::CellParagraphs(cell)),
                "width" => Value::opt_length(self.builder.cell_width(cell)?),
                _ => return Err(missing()),
            },
            Handle::ParagraphStyle(style) => style_attr(style.name(), name).ok_or_else(missing)??,
            Handle::TableStyle(style) => style_attr(style.name(), name).ok_or_else(missing)??,
            Handle::Styles
            | Handle::Sections
            | Handle::Paragraphs
            | Handle::Tables
            | Handle::Runs(_)
            | Handle::Rows(_)
            | Handle::RowCells(_)
            | Handle::Columns(_)
            | Handle::ColumnCells(_)
            | Handle::CellParagraphs(_)
            | Handle::Buffer => return Err(missing()),
        };
        Ok(value)
    }

    /// `object.name = value`.
    pub(crate) fn set_attr(&mut self, object: &Value, name: &str, value: Value) -> Result<()> {
        check_attribute(name)?;
        let Value::Handle(handle) = object else {
            return Err(match object {
                Value::Module(_) | Value::EnumClass(_) | Value::Builtin(_) => SandboxError::Denied {
                    name: name.to_string(),
                    reason: "module attributes are read-only",
                },
                other => no_attribute(other.type_name(), name),
            });
        };
        let handle = *handle;
        let label = format!("{}.{name}", handle_label(handle));
        let label = label.as_str();
        match handle {
            Handle::CoreProperties => {
                let property = CoreProperty::from_name(name)
                    .ok_or_else(|| no_attribute(handle.type_name(), name))?;
                let text = expect_str(label, &value)?;
                self.builder.set_property(property, text)?;
            }
            Handle::Section(id) => {
                let setting = match name {
                    "start_type" => PageSetting::Start(section_start_value(label, &value)?),
                    "orientation" => PageSetting::Orientation(orientation_value(label, &value)?),
                    "page_width" => PageSetting::PageWidth(length_value(label, &value)?),
                    "page_height" => PageSetting::PageHeight(length_value(label, &value)?),
                    "top_margin" => PageSetting::TopMargin(length_value(label, &value)?),
                    "right_margin" => PageSetting::RightMargin(length_value(label, &value)?),
                    "bottom_margin" => PageSetting::BottomMargin(length_value(label, &value)?),
                    "left_margin" => PageSetting::LeftMargin(length_value(label, &value)?),
                    _ => return Err(unsettable(handle, name)),
                };
                self.builder.update_page_setup(id, setting)?;
            }
            Handle::Paragraph(id) => match name {
                "text" => {
                    let text = text_value(label, &value)?;
                    self.builder.set_paragraph_text(id, &text)?;
                }
                "style" => {
                    let style = paragraph_style_value(label, &value)?;
                    self.builder.set_paragraph_style(id, style)?;
                }
                "alignment" => {
                    let alignment = alignment_value(label, &value)?;
                    self.builder
                        .update_paragraph_format(id, ParagraphSetting::Alignment(alignment))?;
                }
                _ => return Err(unsettable(handle, name)),
            },
            Handle::ParagraphFormat(id) => {
                let setting = match name {
                    "alignment" => ParagraphSetting::Alignment(alignment_value(label, &value)?),
                    "space_before" => ParagraphSetting::SpaceBefore(opt_length_value(label, &value)?),
                    "space_after" => ParagraphSetting::SpaceAfter(opt_length_value(label, &value)?),
                    "line_spacing" => ParagraphSetting::LineSpacing(line_spacing_value(label, &value)?),
                    "left_indent" => ParagraphSetting::LeftIndent(opt_length_value(label, &value)?),
                    "right_indent" => ParagraphSetting::RightIndent(opt_length_value(label, &value)?),
                    "first_line_indent" => {
                        ParagraphSetting::FirstLineIndent(opt_length_value(label, &value)?)
                    }
                    "keep_with_next" => ParagraphSetting::KeepWithNext(opt_bool_value(label, &value)?),
                    "page_break_before" => {
                        ParagraphSetting::PageBreakBefore(opt_bool_value(label, &value)?)
                    }
                    _ => return Err(unsettable(handle, name)),
                };
                self.builder.update_paragraph_format(id, setting)?;
            }
            Handle::Run(id) | Handle::Font(id) => {
                let is_run = matches!(handle, Handle::Run(_));
                let setting = match name {
                    "text" if is_run => {
                        let text = text_value(label, &value)?;
                        self.builder.set_run_text(id, &text)?;
                        return Ok(());
                    }
                    "style" if is_run => {
                        if value.is_none() {
                            return Ok(());
                        }
                        return Err(DomError::InvalidValue {
                            operation: label.to_string(),
                            value: format::repr(&self.heap, &value, 256)?,
                            expected: "None; character styles are not available".into(),
                        }
                        .into());
                    }
                    "bold" => RunSetting::Bold(opt_bool_value(label, &value)?),
                    "italic" => RunSetting::Italic(opt_bool_value(label, &value)?),
                    "underline" => RunSetting::Underline(opt_bool_value(label, &value)?),
                    "strike" => RunSetting::Strike(opt_bool_value(label, &value)?),
                    "name" if !is_run => RunSetting::FontName(match &value {
                        Value::None => None,
                        other => Some(text_value(label, other)?),
                    }),
                    "size" if !is_run => RunSetting::Size(opt_length_value(label, &value)?),
                    "color" if !is_run => {
                        return Err(SandboxError::type_error(format!(
                            "{label} cannot be replaced; assign font.color.rgb = RGBColor(...) instead"
                        )));
                    }
                    _ => return Err(unsettable(handle, name)),
                };
                self.builder.update_run_format(id, setting)?;
            }
            Handle::FontColor(id) => match name {
                "rgb" => {
                    let color = match &value {
                        Value::None => None,
                        Value::Color(color) => Some(*color),
                        other => {
                            return Err(SandboxError::type_error(format!(
                                "{label} must be an RGBColor, not '{}'",
                                other.type_name()
                            )));
                        }
                    };
                    self.builder.update_run_format(id, RunSetting::Color(color))?;
                }
                _ => return Err(unsettable(handle, name)),
            },
            Handle::Table(id) => match name {
                "style" => {
                    let style = table_style_value(label, &value)?;
                    self.builder.set_table_style(id, style)?;
                }
                "alignment" => {
                    let alignment = alignment_value(label, &value)?;
                    self.builder.set_table_alignment(id, alignment)?;
                }
                "autofit" => {
                    let autofit = expect_bool(label, &value)?;
                    self.builder.set_table_autofit(id, autofit)?;
                }
                _ => return Err(unsettable(handle, name)),
            },
            Handle::Row(row) => match name {
                "height" => {
                    let height = opt_length_value(label, &value)?;
                    self.builder.set_row_height(row, height)?;
                }
                _ => return Err(unsettable(handle, name)),
            },
            Handle::Column(column) => match name {
                "width" => {
                    let width = opt_length_value(label, &value)?;
                    self.builder.set_column_width(column, width)?;
                }
                _ => return Err(unsettable(handle, name)),
            },
            Handle::Cell(cell) => match name {
                "text" => {
                    let text = text_value(label, &value)?;
                    self.builder.set_cell_text(cell, &text)?;
                }
                "width" => {
                    let width = opt_length_value(label, &value)?;
                    self.builder.set_cell_width(cell, width)?;
                }
                _ => return Err(unsettable(handle, name)),
            },
            Handle::Styles | Handle::ParagraphStyle(_) | Handle::TableStyle(_) => {
                return Err(SandboxError::Denied {
                    name: format!("style.{name}"),
                    reason: READ_ONLY_STYLES,
                });
            }
            _ => return Err(unsettable(handle, name)),
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Methods
    // -----------------------------------------------------------------------

    fn handle_method(&mut self, handle: Handle, name: &str, args: Args) -> Result<Value> {
        let call = format!("{}.{name}()", handle_label(handle));
        let call = call.as_str();
        let value = match (handle, name) {
            (Handle::Document, "add_heading") => {
                let [text, level] = args.bind(call, ["text", "level"], 0)?;
                let text = opt_text(call, text)?;
                let level = match level {
                    Some(level) => expect_int("add_heading() level", &level)?,
                    None => 1,
                };
                Value::Handle(Handle::Paragraph(self.builder.add_heading(&text, level)?))
            }
            (Handle::Document, "add_paragraph") => {
                let [text, style] = args.bind(call, ["text", "style"], 0)?;
                let text = opt_text(call, text)?;
                let style = paragraph_style_value(call, &arg(style))?;
                Value::Handle(Handle::Paragraph(self.builder.add_paragraph(&text, style)?))
            }
            (Handle::Document, "add_table") => {
                let [rows, cols, style] = args.bind(call, ["rows", "cols", "style"], 2)?;
                let rows = expect_int("add_table() rows", &arg(rows))?;
                let cols = expect_int("add_table() cols", &arg(cols))?;
                let style = table_style_value(call, &arg(style))?;
                let table = self.builder.add_table(rows, cols)?;
                if style.is_some() {
                    self.builder.set_table_style(table, style)?;
                }
                Value::Handle(Handle::Table(table))
            }
            (Handle::Document, "add_page_break") => {
                args.bind(call, [], 0)?;
                Value::Handle(Handle::Paragraph(self.builder.add_page_break()?))
            }
            (Handle::Document, "add_section") => {
                let [start] = args.bind(call, ["start_type"], 0)?;
                let start = match start {
                    Some(start) => section_start_value(call, &start)?,
                    None => SectionStart::NewPage,
                };
                Value::Handle(Handle::Section(self.builder.add_section(start)?))
            }
            (Handle::Document, "save") => {
                let [target] = args.bind(call, ["path_or_stream"], 1)?;
                match arg(target) {
                    Value::Handle(Handle::Buffer) => {
                        tracing::debug!("save to in-memory buffer accepted");
                        Value::None
                    }
                    Value::Str(_) => {
                        return Err(SandboxError::Denied {
                            name: "save(path)".into(),
                            reason: namespace::FILESYSTEM,
                        });
                    }
                    other => {
                        return Err(SandboxError::type_error(format!(
                            "{call} expects a BytesIO() buffer, not '{}'",
                            other.type_name()
                        )));
                    }
                }
            }
            (Handle::Document | Handle::Run(_), "add_picture") => {
                return Err(SandboxError::Denied {
                    name: call.to_string(),
                    reason: NO_IMAGES,
                });
            }
            (Handle::Paragraph(id), "add_run") => {
                let [text, style] = args.bind(call, ["text", "style"], 0)?;
                let text = opt_text(call, text)?;
                let style = arg(style);
                if !style.is_none() {
                    return Err(DomError::InvalidValue {
                        operation: call.to_string(),
                        value: format::repr(&self.heap, &style, 256)?,
                        expected: "None; character styles are not available".into(),
                    }
                    .into());
                }
                Value::Handle(Handle::Run(self.builder.add_run(id, &text)?))
            }
            (Handle::Paragraph(id), "clear") => {
                args.bind(call, [], 0)?;
                self.builder.clear_paragraph(id)?;
                Value::Handle(handle)
            }
            (Handle::Run(id), "add_text") => {
                let [text] = args.bind(call, ["text"], 1)?;
                let text = text_value(call, &arg(text))?;
                self.builder.add_run_text(id, &text)?;
                Value::None
            }
            (Handle::Run(id), "add_break") => {
                let [kind] = args.bind(call, ["break_type"], 0)?;
                let kind = match kind {
                    Some(kind) => break_value(call, &kind)?,
                    None => BreakKind::Line,
                };
                self.builder.add_break(id, kind)?;
                Value::None
            }
            (Handle::Run(id), "add_tab") => {
                args.bind(call, [], 0)?;
                self.builder.add_tab(id)?;
                Value::None
            }
            (Handle::Table(id), "add_row") => {
                args.bind(call, [], 0)?;
                Value::Handle(Handle::Row(self.builder.add_row(id)?))
            }
            (Handle::Table(id), "add_column") => {
                let [width] = args.bind(call, ["width"], 0)?;
                let width = opt_length_value(call, &arg(width))?;
                Value::Handle(Handle::Column(self.builder.add_column(id, width)?))
            }
            (Handle::Table(id), "cell") => {
                let [row, col] = args.bind(call, ["row_idx", "col_idx"], 2)?;
                let row = expect_int("table.cell() row_idx", &arg(row))?;
                let col = expect_int("table.cell() col_idx", &arg(col))?;
                Value::Handle(Handle::Cell(self.builder.cell_at(id, row, col)?))
            }
            (Handle::Cell(id), "add_paragraph") => {
                let [text, style] = args.bind(call, ["text", "style"], 0)?;
                let text = opt_text(call, text)?;
                let style = paragraph_style_value(call, &arg(style))?;
                Value::Handle(Handle::Paragraph(
                    self.builder.add_cell_paragraph(id, &text, style)?,
                ))
            }
            (Handle::Buffer, "seek" | "tell") => {
                args.bind(call, ["offset", "whence"], 0)?;
                Value::Int(0)
            }
            (Handle::Buffer, "getvalue" | "read") => {
                return Err(SandboxError::Denied {
                    name: format!("BytesIO.{name}()"),
                    reason: BYTES_AFTER_RUN,
                });
            }
            _ => return Err(no_attribute(handle.type_name(), name)),
        };
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Collections
    // -----------------------------------------------------------------------

    pub(crate) fn collection_len(&self, handle: Handle) -> Result<usize> {
        Ok(match handle {
            Handle::Sections => self.builder.section_count(),
            Handle::Paragraphs => self.builder.body_paragraphs().len(),
            Handle::Tables => self.builder.body_tables().len(),
            Handle::Runs(paragraph) => self.builder.run_count(paragraph)?,
            Handle::Rows(table) => self.builder.row_count(table)?,
            Handle::Columns(table) => self.builder.column_count(table)?,
            Handle::RowCells(row) => self.builder.row_cells(row)?.len(),
            Handle::ColumnCells(column) => self.builder.column_cells(column)?.len(),
            Handle::CellParagraphs(cell) => self.builder.cell_paragraph_count(cell)?,
            other => {
                return Err(SandboxError::type_error(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                )));
            }
        })
    }

    /// `collection[index]`, resolved against the materialized tree.
    pub(crate) fn collection_item(&mut self, handle: Handle, index: i64) -> Result<Value> {
        Ok(Value::Handle(match handle {
            Handle::Sections => Handle::Section(self.builder.section_at(index)?),
            Handle::Paragraphs => Handle::Paragraph(self.builder.body_paragraph_at(index)?),
            Handle::Tables => Handle::Table(self.builder.body_table_at(index)?),
            Handle::Runs(paragraph) => Handle::Run(self.builder.run_at(paragraph, index)?),
            Handle::Rows(table) => Handle::Row(self.builder.row_at(table, index)?),
            Handle::Columns(table) => Handle::Column(self.builder.column_at(table, index)?),
            Handle::RowCells(row) => Handle::Cell(self.builder.row_cell_at(row, index)?),
            Handle::ColumnCells(column) => Handle::Cell(self.builder.column_cell_at(column, index)?),
            Handle::CellParagraphs(cell) => {
                Handle::Paragraph(self.builder.cell_paragraph_at(cell, index)?)
            }
            other => {
                return Err(SandboxError::type_error(format!(
                    "'{}' object is not subscriptable",
                    other.type_name()
                )));
            }
        }))
    }

    /// Every element of a collection handle, in order.
    pub(crate) fn collection_items(&mut self, handle: Handle) -> Result<Vec<Value>> {
        let handles: Vec<Handle> = match handle {
            Handle::Paragraphs => self
                .builder
                .body_paragraphs()
                .into_iter()
                .map(Handle::Paragraph)
                .collect(),
            Handle::Tables => self
                .builder
                .body_tables()
                .into_iter()
                .map(Handle::Table)
                .collect(),
            Handle::RowCells(row) => self
                .builder
                .row_cells(row)?
                .into_iter()
                .map(Handle::Cell)
                .collect(),
            Handle::ColumnCells(column) => self
                .builder
                .column_cells(column)?
                .into_iter()
                .map(Handle::Cell)
                .collect(),
            _ => {
                let len = self.collection_len(handle)?;
                let mut items = Vec::with_capacity(len);
                for index in 0..len as i64 {
                    items.push(self.collection_item(handle, index)?);
                }
                return Ok(items);
            }
        };
        Ok(handles.into_iter().map(Value::Handle).collect())
    }

    /// `doc.styles[name]`.
    pub(crate) fn style_by_name(&self, key: &Value) -> Result<Value> {
        let Value::Str(name) = key else {
            return Err(SandboxError::type_error(format!(
                "style names must be str, not '{}'",
                key.type_name()
            )));
        };
        if let Ok(style) = ParagraphStyle::named("doc.styles[]", name) {
            return Ok(Value::Handle(Handle::ParagraphStyle(style)));
        }
        if let Ok(style) = TableStyle::named("doc.styles[]", name) {
            return Ok(Value::Handle(Handle::TableStyle(style)));
        }
        Err(SandboxError::Key(format!("no style with name '{name}'")))
    }
}

/// Attributes shared by paragraph and table style handles.
fn style_attr(style: &'static str, name: &str) -> Option<Result<Value>> {
    match name {
        "name" => Some(Ok(Value::str(style))),
        "font" | "paragraph_format" => Some(Err(SandboxError::Denied {
            name: format!("style.{name}"),
            reason: READ_ONLY_STYLES,
        })),
        _ => None,
    }
}

/// Error for assigning an attribute that cannot be assigned.
fn unsettable(handle: Handle, name: &str) -> SandboxError {
    if READ_ONLY.contains(&name) {
        SandboxError::type_error(format!(
            "cannot assign to {}.{name}; it is read-only",
            handle_label(handle)
        ))
    } else {
        no_attribute(handle.type_name(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::CancelToken;
    use crate::config::SandboxConfig;
    use crate::error::ScriptFault;
    use crate::parser::parse;

    fn run(source: &str) -> (Interp, std::result::Result<(), ScriptFault>) {
        let program = parse(source).unwrap();
        let mut interp = Interp::new(&SandboxConfig::default(), CancelToken::new());
        let result = interp.run(&program);
        (interp, result)
    }

    fn build(source: &str) -> Interp {
        let (interp, result) = run(source);
        result.unwrap();
        interp
    }

    fn fails(source: &str) -> ScriptFault {
        run(source).1.unwrap_err()
    }

    const PRELUDE: &str = "from docx import Document\nfrom docx.shared import Pt, Inches, RGBColor\ndoc = Document()\n";

    fn script(body: &str) -> String {
        format!("{PRELUDE}{body}")
    }

    #[test]
    fn paragraphs_and_runs_reach_the_builder() {
        let interp = build(&script(
            "\
doc.add_heading('Report', level=1)
p = doc.add_paragraph('Intro: ')
r = p.add_run('bold part')
r.bold = True
r.font.size = Pt(14)
r.font.color.rgb = RGBColor(0x33, 0x66, 0x99)
size = r.font.size.pt
",
        ));
        let paragraphs = interp.builder.body_paragraphs();
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(interp.builder.paragraph_text(paragraphs[1]).unwrap(), "Intro: bold part");
        let run = interp.builder.run_at(paragraphs[1], -1).unwrap();
        let format = interp.builder.run_format(run).unwrap();
        assert_eq!(format.bold, Some(true));
        assert_eq!(format.size, Some(Length::whole_points(14)));
        assert!(matches!(interp.global("size"), Some(Value::Float(f)) if f == 14.0));
    }

    #[test]
    fn tables_index_against_materialized_shape() {
        let interp = build(&script(
            "\
t = doc.add_table(rows=1, cols=3)
t.style = 'Table Grid'
t.cell(0, 0).text = 'Name'
row = t.add_row()
row.cells[2].text = 'x'
n = len(t.rows)
texts = [c.text for c in t.rows[1].cells]
",
        ));
        let table = interp.builder.body_table_at(0).unwrap();
        assert_eq!(interp.builder.row_count(table).unwrap(), 2);
        assert_eq!(
            interp.builder.table_style(table).unwrap().map(TableStyle::name),
            Some("Table Grid")
        );
        assert!(matches!(interp.global("n"), Some(Value::Int(2))));

        let fault = fails(&script("t = doc.add_table(rows=0, cols=3)\nt.rows[0]\n"));
        assert_eq!(fault.line, Some(5));
        assert!(matches!(
            fault.error,
            SandboxError::Dom(DomError::Structure { ref operation, .. }) if operation == "table.rows[0]"
        ));
        let fault = fails(&script("t = doc.add_table(rows=2, cols=3)\nt.cell(0, 5)\n"));
        assert!(matches!(fault.error, SandboxError::Dom(DomError::Structure { .. })));
    }

    #[test]
    fn paragraph_format_and_sections() {
        let interp = build(&script(
            "\
from docx.enum.text import WD_ALIGN_PARAGRAPH
from docx.enum.section import WD_ORIENT
p = doc.add_paragraph('x', style='Quote')
p.alignment = WD_ALIGN_PARAGRAPH.CENTER
p.paragraph_format.space_after = Pt(6)
p.paragraph_format.line_spacing = 1.5
s = doc.sections[0]
s.orientation = WD_ORIENT.LANDSCAPE
s.left_margin = Inches(0.5)
style_name = p.style.name
",
        ));
        let p = interp.builder.body_paragraph_at(0).unwrap();
        let format = interp.builder.paragraph_format(p).unwrap();
        assert_eq!(format.alignment, Some(Alignment::Center));
        assert_eq!(format.space_after, Some(Length::whole_points(6)));
        assert_eq!(format.line_spacing, Some(LineSpacing::Multiple(1.5)));
        assert!(matches!(interp.global("style_name"), Some(Value::Str(s)) if &*s == "Quote"));
        assert_eq!(interp.builder.section_count(), 1);
    }

    #[test]
    fn private_and_unknown_attributes_are_rejected() {
        let fault = fails(&script("doc._element\n"));
        assert!(matches!(fault.error, SandboxError::Denied { .. }));
        let fault = fails(&script("doc.__class__\n"));
        assert!(matches!(fault.error, SandboxError::Denied { .. }));
        let fault = fails(&script("doc.part\n"));
        assert!(matches!(fault.error, SandboxError::NoAttribute { .. }));
        let fault = fails(&script("doc.paragraphs = []\n"));
        assert!(matches!(fault.error, SandboxError::Type(m) if m.contains("read-only")));
    }

    #[test]
    fn saving_only_reaches_memory() {
        build(&script("from io import BytesIO\nbuf = BytesIO()\ndoc.save(buf)\nbuf.seek(0)\n"));
        let fault = fails(&script("doc.save('out.docx')\n"));
        assert!(matches!(
            fault.error,
            SandboxError::Denied { ref name, reason } if name == "save(path)" && reason == namespace::FILESYSTEM
        ));
        let fault = fails(&script("from io import BytesIO\nb = BytesIO()\nb.getvalue()\n"));
        assert!(matches!(fault.error, SandboxError::Denied { .. }));
    }

    #[test]
    fn invalid_values_are_not_coerced() {
        let fault = fails(&script("p = doc.add_paragraph('x')\np.runs\nr = p.add_run('y')\nr.bold = 'yes'\n"));
        assert!(matches!(fault.error, SandboxError::Type(_)));
        let fault = fails(&script("doc.add_paragraph('x', style='Fancy')\n"));
        assert!(matches!(fault.error, SandboxError::Dom(DomError::InvalidValue { .. })));
        let fault = fails(&script("r = doc.add_paragraph('x').add_run('y')\nr.font.color = 'red'\n"));
        assert!(matches!(fault.error, SandboxError::Type(m) if m.contains("font.color.rgb")));
    }

    #[test]
    fn styles_lookup_by_name() {
        let interp = build(&script("h = doc.styles['Heading 1']\nok = 'Table Grid' in doc.styles\n"));
        assert!(matches!(
            interp.global("h"),
            Some(Value::Handle(Handle::ParagraphStyle(s))) if s.name() == "Heading 1"
        ));
        assert!(matches!(interp.global("ok"), Some(Value::Bool(true))));
        let fault = fails(&script("doc.styles['Nope']\n"));
        assert!(matches!(fault.error, SandboxError::Key(_)));
    }

    #[test]
    fn core_properties_round_trip() {
        let interp = build(&script("doc.core_properties.title = 'Q3'\nt = doc.core_properties.title\n"));
        assert_eq!(interp.builder.property(CoreProperty::Title), Some("Q3"));
        assert!(matches!(interp.global("t"), Some(Value::Str(s)) if &*s == "Q3"));
    }
}
