//! Tree-walking evaluator.
//!
//! [`Interp`] owns everything one execution touches: the document builder,
//! the heap, the budget and the global scope. Statements and expressions
//! return [`Eval`], which carries the source line of the innermost node that
//! failed. Helpers below the expression level return the plain crate
//! [`Result`] and get their line attached by the caller.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use docsmith_dom::{DocumentBuilder, Length};

use crate::ast::{
    BinOp, BoolOp, CmpOp, CompClause, Expr, ExprKind, FStringPart, Index, Program, Stmt, StmtKind,
    Target, UnaryOp,
};
use crate::budget::{Budget, CancelToken};
use crate::builtins::Args;
use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError, ScriptFault};
use crate::format;
use crate::namespace;
use crate::value::{Dict, Handle, HashKey, Heap, HeapId, Value, range_len};

/// Result of evaluating a statement or expression.
pub(crate) type Eval<T> = std::result::Result<T, ScriptFault>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Position inside an iterable during a `for` loop or comprehension.
pub(crate) enum Cursor {
    Range { next: i64, stop: i64, step: i64 },
    /// Lists are walked live so appends during the loop are seen.
    List { id: HeapId, position: usize },
    Items(std::vec::IntoIter<Value>),
}

pub(crate) struct Interp {
    pub(crate) builder: DocumentBuilder,
    pub(crate) heap: Heap,
    pub(crate) budget: Budget,
    pub(crate) max_string_bytes: usize,
    globals: HashMap<String, Value>,
}

impl Interp {
    pub(crate) fn new(config: &SandboxConfig, token: CancelToken) -> Self {
        Self {
            builder: DocumentBuilder::new(config.max_objects),
            heap: Heap::new(config.max_heap_objects, config.max_collection_len),
            budget: Budget::new(config, token),
            max_string_bytes: config.max_string_bytes,
            globals: HashMap::new(),
        }
    }

    pub(crate) fn run(&mut self, program: &Program) -> Eval<()> {
        self.exec_block(&program.body)?;
        Ok(())
    }

    pub(crate) fn into_builder(self) -> DocumentBuilder {
        self.builder
    }

    #[cfg(test)]
    pub(crate) fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    fn exec_block(&mut self, body: &[Stmt]) -> Eval<Flow> {
        for stmt in body {
            let flow = self.exec(stmt)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Eval<Flow> {
        self.exec_kind(stmt).map_err(|fault| fault.at(stmt.line))
    }

    fn exec_kind(&mut self, stmt: &Stmt) -> Eval<Flow> {
        self.budget.tick()?;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value)?,
            StmtKind::If { branches, orelse } => {
                for (test, body) in branches {
                    let condition = self.eval(test)?;
                    if self.truthy(&condition)? {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::While { test, body } => loop {
                let condition = self.eval(test)?;
                if !self.truthy(&condition)? {
                    break;
                }
                if self.exec_block(body)? == Flow::Break {
                    break;
                }
            },
            StmtKind::For { target, iter, body } => {
                let iterable = self.eval(iter)?;
                let mut cursor = self.cursor(iterable)?;
                while let Some(item) = self.advance(&mut cursor)? {
                    self.budget.tick()?;
                    self.assign(target, item)?;
                    if self.exec_block(body)? == Flow::Break {
                        break;
                    }
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::Import { module, alias } => self.import(module, alias.as_deref())?,
            StmtKind::ImportFrom { module, names } => {
                let resolved = namespace::import_module(module)?;
                for (name, alias) in names {
                    let value = namespace::import_name(resolved, name)?;
                    self.bind(alias.as_deref().unwrap_or(name), value)?;
                }
                tracing::trace!(module = resolved, names = names.len(), "names imported");
            }
        }
        Ok(Flow::Normal)
    }

    fn import(&mut self, module: &str, alias: Option<&str>) -> Result<()> {
        let resolved = namespace::import_module(module)?;
        match alias {
            Some(alias) => self.bind(alias, Value::Module(resolved))?,
            None => {
                // `import docx.shared` binds `docx`.
                let head = module.split('.').next().unwrap_or(module);
                let root = namespace::import_module(head)?;
                self.bind(head, Value::Module(root))?;
            }
        }
        tracing::trace!(module = resolved, "module imported");
        Ok(())
    }

    fn bind(&mut self, name: &str, value: Value) -> Result<()> {
        if name.starts_with("__") {
            return Err(SandboxError::Denied {
                name: name.to_string(),
                reason: namespace::SPECIAL,
            });
        }
        self.globals.insert(name.to_string(), value);
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = namespace::builtin_global(name) {
            return Ok(value);
        }
        if let Some(reason) = namespace::denied_name(name) {
            tracing::debug!(name, reason, "denied name referenced");
            return Err(SandboxError::Denied {
                name: name.to_string(),
                reason,
            });
        }
        Err(SandboxError::UndefinedName(name.to_string()))
    }

    fn assign(&mut self, target: &Target, value: Value) -> Eval<()> {
        match target {
            Target::Name(name) => self.bind(name, value)?,
            Target::Attr(object, name) => {
                let object = self.eval(object)?;
                self.set_attr(&object, name, value)?;
            }
            Target::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                self.set_item(&object, index, value)?;
            }
            Target::Tuple(targets) => {
                let items = self.iterate(&value)?;
                if items.len() != targets.len() {
                    return Err(SandboxError::type_error(format!(
                        "cannot unpack {} values into {} targets",
                        items.len(),
                        targets.len()
                    ))
                    .into());
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item)?;
                }
            }
        }
        Ok(())
    }

    fn aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr) -> Eval<()> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name)?;
                let operand = self.eval(value)?;
                let result = self.in_place(op, current, operand)?;
                self.bind(name, result)?;
            }
            Target::Attr(object, name) => {
                let object = self.eval(object)?;
                let current = self.get_attr(&object, name)?;
                let operand = self.eval(value)?;
                let result = self.in_place(op, current, operand)?;
                self.set_attr(&object, name, result)?;
            }
            Target::Index(object, index) => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                let current = self.get_item(&object, &index)?;
                let operand = self.eval(value)?;
                let result = self.in_place(op, current, operand)?;
                self.set_item(&object, index, result)?;
            }
            Target::Tuple(_) => {
                return Err(SandboxError::type_error(
                    "illegal expression for augmented assignment",
                )
                .into());
            }
        }
        Ok(())
    }

    /// `a op= b`: lists extend in place, everything else rebinds.
    fn in_place(&mut self, op: BinOp, current: Value, operand: Value) -> Result<Value> {
        if op == BinOp::Add
            && let Value::List(id) = &current
        {
            let items = self.iterate(&operand)?;
            self.extend_list(*id, items)?;
            return Ok(current);
        }
        self.binary(op, current, operand)
    }

    fn set_item(&mut self, object: &Value, index: Value, value: Value) -> Result<()> {
        match object {
            Value::List(id) => {
                let len = self.heap.list(*id)?.len();
                let position = resolve_index(&index, len, "list")?;
                self.heap.list_mut(*id)?[position] = value;
                Ok(())
            }
            Value::Dict(id) => self.heap.dict_insert(*id, index, value),
            other => Err(SandboxError::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn extend_list(&mut self, id: HeapId, items: Vec<Value>) -> Result<()> {
        let len = self.heap.list(id)?.len();
        self.heap.check_len(len.saturating_add(items.len()))?;
        self.budget.elements(items.len())?;
        self.heap.list_mut(id)?.extend(items);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    pub(crate) fn eval(&mut self, expr: &Expr) -> Eval<Value> {
        self.eval_kind(expr).map_err(|fault| fault.at(expr.line))
    }

    fn eval_kind(&mut self, expr: &Expr) -> Eval<Value> {
        self.budget.tick()?;
        let value = match &expr.kind {
            ExprKind::None => Value::None,
            ExprKind::Bool(b) => Value::Bool(*b),
            ExprKind::Int(i) => Value::Int(*i),
            ExprKind::Float(f) => Value::Float(*f),
            ExprKind::Str(s) => Value::Str(s.clone()),
            ExprKind::FString(parts) => self.fstring(parts)?,
            ExprKind::Name(name) => self.lookup(name)?,
            ExprKind::List(items) => {
                let values = self.eval_all(items)?;
                self.heap.alloc_list(values)?
            }
            ExprKind::Tuple(items) => Value::tuple(self.eval_all(items)?),
            ExprKind::Dict(entries) => {
                let mut dict = Dict::default();
                for (key, value) in entries {
                    let key = self.eval(key)?;
                    let value = self.eval(value)?;
                    let hash = HashKey::from_value(&key).map_err(ScriptFault::from)?;
                    dict.insert(hash, key, value);
                }
                self.heap.alloc_dict(dict)?
            }
            ExprKind::Attr(object, name) => {
                let object = self.eval(object)?;
                self.get_attr(&object, name)?
            }
            ExprKind::Subscript(object, index) => {
                let object = self.eval(object)?;
                match index.as_ref() {
                    Index::Single(index) => {
                        let index = self.eval(index)?;
                        self.get_item(&object, &index)?
                    }
                    Index::Slice { lower, upper, step } => {
                        let lower = self.eval_opt(lower.as_ref())?;
                        let upper = self.eval_opt(upper.as_ref())?;
                        let step = self.eval_opt(step.as_ref())?;
                        self.get_slice(&object, lower, upper, step)?
                    }
                }
            }
            ExprKind::Call { func, args, kwargs } => self.eval_call(func, args, kwargs)?,
            ExprKind::Unary(op, operand) => {
                let operand = self.eval(operand)?;
                self.unary(*op, operand)?
            }
            ExprKind::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, left, right)?
            }
            ExprKind::Compare(first, rest) => {
                let mut left = self.eval(first)?;
                for (op, right) in rest {
                    let right = self.eval(right)?;
                    if !self.compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Value::Bool(true)
            }
            ExprKind::BoolOp(op, left, right) => {
                let left = self.eval(left)?;
                let decided = match op {
                    BoolOp::And => !self.truthy(&left)?,
                    BoolOp::Or => self.truthy(&left)?,
                };
                if decided { left } else { self.eval(right)? }
            }
            ExprKind::Not(operand) => {
                let operand = self.eval(operand)?;
                Value::Bool(!self.truthy(&operand)?)
            }
            ExprKind::IfExp { test, body, orelse } => {
                let test = self.eval(test)?;
                if self.truthy(&test)? {
                    self.eval(body)?
                } else {
                    self.eval(orelse)?
                }
            }
            ExprKind::ListComp { elt, clauses } => self.list_comp(elt, clauses)?,
        };
        Ok(value)
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Eval<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn eval_opt(&mut self, expr: Option<&Expr>) -> Eval<Option<Value>> {
        expr.map(|e| self.eval(e)).transpose()
    }

    fn eval_call(&mut self, func: &Expr, args: &[Expr], kwargs: &[(String, Expr)]) -> Eval<Value> {
        if let ExprKind::Attr(object, name) = &func.kind {
            let receiver = self.eval(object)?;
            let args = self.eval_args(args, kwargs)?;
            return Ok(self.call_method(receiver, name, args)?);
        }
        let callee = self.eval(func)?;
        let args = self.eval_args(args, kwargs)?;
        Ok(self.call_value(callee, args)?)
    }

    fn eval_args(&mut self, args: &[Expr], kwargs: &[(String, Expr)]) -> Eval<Args> {
        let positional = self.eval_all(args)?;
        let mut keywords: Vec<(String, Value)> = Vec::with_capacity(kwargs.len());
        for (name, expr) in kwargs {
            if keywords.iter().any(|(k, _)| k == name) {
                return Err(
                    SandboxError::type_error(format!("keyword argument repeated: {name}")).into(),
                );
            }
            let value = self.eval(expr)?;
            keywords.push((name.clone(), value));
        }
        Ok(Args {
            positional,
            keywords,
        })
    }

    /// Call a first-class callable value.
    pub(crate) fn call_value(&mut self, callee: Value, args: Args) -> Result<Value> {
        match callee {
            Value::Builtin(builtin) => self.call_builtin(builtin, args),
            Value::Method(method) => self.call_method(method.receiver.clone(), method.name, args),
            other => Err(SandboxError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn fstring(&mut self, parts: &[FStringPart]) -> Eval<Value> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(text) => out.push_str(text),
                FStringPart::Field { expr, repr, spec } => {
                    let value = self.eval(expr)?;
                    let text = if *repr {
                        let text = self.repr_of(&value)?;
                        format::format_value(&self.heap, &Value::str(text), spec, self.max_string_bytes)?
                    } else {
                        format::format_value(&self.heap, &value, spec, self.max_string_bytes)?
                    };
                    self.budget.string(text.len())?;
                    out.push_str(&text);
                }
            }
        }
        Ok(self.new_str(out)?)
    }

    fn list_comp(&mut self, elt: &Expr, clauses: &[CompClause]) -> Eval<Value> {
        let mut names = Vec::new();
        for clause in clauses {
            if let CompClause::For { target, .. } = clause {
                target_names(target, &mut names);
            }
        }
        // Loop variables do not leak out of the comprehension.
        let saved: Vec<(String, Option<Value>)> = names
            .into_iter()
            .map(|name| {
                let previous = self.globals.get(&name).cloned();
                (name, previous)
            })
            .collect();
        let mut out = Vec::new();
        let result = self.comprehend(elt, clauses, &mut out);
        for (name, previous) in saved {
            match previous {
                Some(value) => {
                    self.globals.insert(name, value);
                }
                None => {
                    self.globals.remove(&name);
                }
            }
        }
        result?;
        Ok(self.heap.alloc_list(out)?)
    }

    fn comprehend(&mut self, elt: &Expr, clauses: &[CompClause], out: &mut Vec<Value>) -> Eval<()> {
        let Some((clause, rest)) = clauses.split_first() else {
            let value = self.eval(elt)?;
            self.heap.check_len(out.len() + 1)?;
            out.push(value);
            return Ok(());
        };
        match clause {
            CompClause::If(test) => {
                let test = self.eval(test)?;
                if self.truthy(&test)? {
                    self.comprehend(elt, rest, out)?;
                }
            }
            CompClause::For { target, iter } => {
                let iterable = self.eval(iter)?;
                let mut cursor = self.cursor(iterable)?;
                while let Some(item) = self.advance(&mut cursor)? {
                    self.budget.tick()?;
                    self.assign(target, item)?;
                    self.comprehend(elt, rest, out)?;
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Strings
    // -----------------------------------------------------------------------

    /// Wrap a freshly built string, enforcing the size cap.
    pub(crate) fn new_str(&mut self, text: String) -> Result<Value> {
        self.budget.string(text.len())?;
        Ok(Value::str(text))
    }

    /// `str(value)`.
    pub(crate) fn display(&mut self, value: &Value) -> Result<String> {
        let text = format::to_str(&self.heap, value, self.max_string_bytes)?;
        self.budget.string(text.len())?;
        Ok(text)
    }

    /// `repr(value)`.
    pub(crate) fn repr_of(&mut self, value: &Value) -> Result<String> {
        let text = format::repr(&self.heap, value, self.max_string_bytes)?;
        self.budget.string(text.len())?;
        Ok(text)
    }

    // -----------------------------------------------------------------------
    // Iteration and containers
    // -----------------------------------------------------------------------

    pub(crate) fn cursor(&mut self, value: Value) -> Result<Cursor> {
        Ok(match value {
            Value::Range { start, stop, step } => Cursor::Range {
                next: start,
                stop,
                step,
            },
            Value::List(id) => Cursor::List { id, position: 0 },
            other => Cursor::Items(self.iterate(&other)?.into_iter()),
        })
    }

    pub(crate) fn advance(&mut self, cursor: &mut Cursor) -> Result<Option<Value>> {
        Ok(match cursor {
            Cursor::Range { next, stop, step } => {
                let more = if *step > 0 { *next < *stop } else { *next > *stop };
                if !more {
                    return Ok(None);
                }
                let current = *next;
                *next = next.checked_add(*step).unwrap_or(*stop);
                Some(Value::Int(current))
            }
            Cursor::List { id, position } => {
                let item = self.heap.list(*id)?.get(*position).cloned();
                *position += 1;
                item
            }
            Cursor::Items(items) => items.next(),
        })
    }

    /// Materialize an iterable.
    pub(crate) fn iterate(&mut self, value: &Value) -> Result<Vec<Value>> {
        let items = match value {
            Value::List(id) => self.heap.list(*id)?.clone(),
            Value::Tuple(items) => items.to_vec(),
            Value::Dict(id) => self.heap.dict(*id)?.keys(),
            Value::Str(s) => {
                self.heap.check_len(s.chars().count())?;
                s.chars().map(|c| Value::str(c.to_string())).collect()
            }
            Value::Range { start, stop, step } => {
                let len = range_len(*start, *stop, *step);
                self.heap.check_len(len)?;
                (0..len)
                    .map(|i| Value::Int(start + step * i as i64))
                    .collect()
            }
            Value::Handle(handle) if handle.is_collection() => self.collection_items(*handle)?,
            other => {
                return Err(SandboxError::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )));
            }
        };
        self.budget.elements(items.len())?;
        Ok(items)
    }

    pub(crate) fn truthy(&self, value: &Value) -> Result<bool> {
        Ok(match value {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(id) => !self.heap.list(*id)?.is_empty(),
            Value::Dict(id) => !self.heap.dict(*id)?.is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Range { start, stop, step } => range_len(*start, *stop, *step) > 0,
            Value::Length(l) => l.emu() != 0,
            Value::Handle(handle) if handle.is_collection() => self.collection_len(*handle)? > 0,
            _ => true,
        })
    }

    /// `len(value)`.
    pub(crate) fn len_of(&self, value: &Value) -> Result<usize> {
        Ok(match value {
            Value::Str(s) => s.chars().count(),
            Value::List(id) => self.heap.list(*id)?.len(),
            Value::Dict(id) => self.heap.dict(*id)?.len(),
            Value::Tuple(items) => items.len(),
            Value::Range { start, stop, step } => range_len(*start, *stop, *step),
            Value::Handle(handle) if handle.is_collection() => self.collection_len(*handle)?,
            other => {
                return Err(SandboxError::type_error(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                )));
            }
        })
    }

    pub(crate) fn get_item(&mut self, object: &Value, index: &Value) -> Result<Value> {
        match object {
            Value::List(id) => {
                let list = self.heap.list(*id)?;
                let position = resolve_index(index, list.len(), "list")?;
                Ok(list[position].clone())
            }
            Value::Tuple(items) => {
                let position = resolve_index(index, items.len(), "tuple")?;
                Ok(items[position].clone())
            }
            Value::Str(s) => {
                let position = resolve_index(index, s.chars().count(), "string")?;
                Ok(s.chars()
                    .nth(position)
                    .map(|c| Value::str(c.to_string()))
                    .unwrap_or(Value::None))
            }
            Value::Range { start, stop, step } => {
                let position = resolve_index(index, range_len(*start, *stop, *step), "range")?;
                Ok(Value::Int(start + step * position as i64))
            }
            Value::Dict(id) => {
                let key = HashKey::from_value(index)?;
                match self.heap.dict(*id)?.get(&key) {
                    Some(value) => Ok(value.clone()),
                    None => {
                        let shown = format::repr(&self.heap, index, 256)
                            .unwrap_or_else(|_| index.type_name().to_string());
                        Err(SandboxError::Key(format!("key {shown} is not in the dict")))
                    }
                }
            }
            Value::Handle(Handle::Styles) => self.style_by_name(index),
            Value::Handle(handle) if handle.is_collection() => {
                let position = match index {
                    Value::Int(i) => *i,
                    Value::Bool(b) => i64::from(*b),
                    other => {
                        return Err(SandboxError::type_error(format!(
                            "indices must be integers, not '{}'",
                            other.type_name()
                        )));
                    }
                };
                self.collection_item(*handle, position)
            }
            other => Err(SandboxError::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn get_slice(
        &mut self,
        object: &Value,
        lower: Option<Value>,
        upper: Option<Value>,
        step: Option<Value>,
    ) -> Result<Value> {
        let lower = slice_bound(lower)?;
        let upper = slice_bound(upper)?;
        let step = slice_bound(step)?.unwrap_or(1);
        if step == 0 {
            return Err(SandboxError::type_error("slice step cannot be zero"));
        }
        let pick = |items: &[Value]| -> Vec<Value> {
            slice_indices(items.len(), lower, upper, step)
                .into_iter()
                .map(|i| items[i].clone())
                .collect()
        };
        let picked = match object {
            Value::List(id) => pick(self.heap.list(*id)?.as_slice()),
            Value::Tuple(items) => {
                let picked = pick(items);
                self.budget.elements(picked.len())?;
                return Ok(Value::tuple(picked));
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let text: String = slice_indices(chars.len(), lower, upper, step)
                    .into_iter()
                    .map(|i| chars[i])
                    .collect();
                return self.new_str(text);
            }
            Value::Range { .. } => {
                let items = self.iterate(object)?;
                pick(&items)
            }
            Value::Handle(handle) if handle.is_collection() => {
                let items = self.collection_items(*handle)?;
                pick(&items)
            }
            other => {
                return Err(SandboxError::type_error(format!(
                    "'{}' object is not subscriptable",
                    other.type_name()
                )));
            }
        };
        self.budget.elements(picked.len())?;
        self.heap.alloc_list(picked)
    }

    fn contains(&mut self, container: &Value, item: &Value) -> Result<bool> {
        match container {
            Value::Str(text) => match item {
                Value::Str(needle) => Ok(text.contains(&**needle)),
                other => Err(SandboxError::type_error(format!(
                    "'in <string>' requires string as left operand, not '{}'",
                    other.type_name()
                ))),
            },
            Value::List(id) => {
                let list = self.heap.list(*id)?;
                self.budget.elements(list.len())?;
                for element in list {
                    if self.heap.equal(element, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Tuple(items) => {
                for element in items.iter() {
                    if self.heap.equal(element, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Dict(id) => {
                let key = HashKey::from_value(item)?;
                Ok(self.heap.dict(*id)?.contains(&key))
            }
            Value::Range { start, stop, step } => {
                let candidate = match item {
                    Value::Int(i) => *i,
                    Value::Bool(b) => i64::from(*b),
                    _ => return Ok(false),
                };
                let (start, stop, step, candidate) = (
                    i128::from(*start),
                    i128::from(*stop),
                    i128::from(*step),
                    i128::from(candidate),
                );
                let within = if step > 0 {
                    start <= candidate && candidate < stop
                } else {
                    stop < candidate && candidate <= start
                };
                Ok(within && (candidate - start) % step == 0)
            }
            Value::Handle(Handle::Styles) => Ok(self.style_by_name(item).is_ok()),
            Value::Handle(handle) if handle.is_collection() => {
                let items = self.collection_items(*handle)?;
                for element in &items {
                    if self.heap.equal(element, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            other => Err(SandboxError::type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------------

    pub(crate) fn compare(&mut self, op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
        let symbol = op.symbol();
        Ok(match op {
            CmpOp::Eq => self.heap.equal(left, right)?,
            CmpOp::NotEq => !self.heap.equal(left, right)?,
            CmpOp::Lt => self.heap.compare(left, right, symbol)? == Ordering::Less,
            CmpOp::LtE => self.heap.compare(left, right, symbol)? != Ordering::Greater,
            CmpOp::Gt => self.heap.compare(left, right, symbol)? == Ordering::Greater,
            CmpOp::GtE => self.heap.compare(left, right, symbol)? != Ordering::Less,
            CmpOp::In => self.contains(right, left)?,
            CmpOp::NotIn => !self.contains(right, left)?,
            CmpOp::Is => identical(left, right),
            CmpOp::IsNot => !identical(left, right),
        })
    }

    fn unary(&mut self, op: UnaryOp, operand: Value) -> Result<Value> {
        let overflow = || SandboxError::type_error("integer overflow");
        Ok(match (op, &operand) {
            (UnaryOp::Neg, Value::Int(i)) => Value::Int(i.checked_neg().ok_or_else(overflow)?),
            (UnaryOp::Neg, Value::Bool(b)) => Value::Int(-i64::from(*b)),
            (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
            (UnaryOp::Neg, Value::Length(l)) => Value::Length(Length::from_emu(-l.emu())?),
            (UnaryOp::Pos, Value::Int(_) | Value::Float(_) | Value::Length(_)) => operand.clone(),
            (UnaryOp::Pos, Value::Bool(b)) => Value::Int(i64::from(*b)),
            (UnaryOp::Invert, Value::Int(i)) => Value::Int(!i),
            (UnaryOp::Invert, Value::Bool(b)) => Value::Int(!i64::from(*b)),
            _ => {
                let symbol = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Pos => "+",
                    UnaryOp::Invert => "~",
                };
                return Err(SandboxError::type_error(format!(
                    "bad operand type for unary {symbol}: '{}'",
                    operand.type_name()
                )));
            }
        })
    }

    pub(crate) fn binary(&mut self, op: BinOp, left: Value, right: Value) -> Result<Value> {
        match (op, &left, &right) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => {
                self.budget.string(a.len().saturating_add(b.len()))?;
                let mut text = String::with_capacity(a.len() + b.len());
                text.push_str(a);
                text.push_str(b);
                return Ok(Value::str(text));
            }
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                let (a, b) = (self.heap.list(*a)?, self.heap.list(*b)?);
                self.heap.check_len(a.len().saturating_add(b.len()))?;
                let items: Vec<Value> = a.iter().chain(b.iter()).cloned().collect();
                self.budget.elements(items.len())?;
                return self.heap.alloc_list(items);
            }
            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
                self.heap.check_len(a.len().saturating_add(b.len()))?;
                let items: Vec<Value> = a.iter().chain(b.iter()).cloned().collect();
                self.budget.elements(items.len())?;
                return Ok(Value::tuple(items));
            }
            (BinOp::Mul, Value::Str(_) | Value::List(_) | Value::Tuple(_), Value::Int(_) | Value::Bool(_)) => {
                return self.repeat(&left, &right);
            }
            (BinOp::Mul, Value::Int(_) | Value::Bool(_), Value::Str(_) | Value::List(_) | Value::Tuple(_)) => {
                return self.repeat(&right, &left);
            }
            (BinOp::Mod, Value::Str(_), _) => {
                return Err(SandboxError::type_error(
                    "printf-style formatting is not supported; use an f-string or str.format()",
                ));
            }
            (
                BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor,
                Value::Bool(a),
                Value::Bool(b),
            ) => {
                return Ok(Value::Bool(match op {
                    BinOp::BitAnd => a & b,
                    BinOp::BitOr => a | b,
                    _ => a ^ b,
                }));
            }
            _ => {}
        }
        if let Some(value) = length_arithmetic(op, &left, &right)? {
            return Ok(value);
        }
        match (number(&left), number(&right)) {
            (Some(Number::Int(a)), Some(Number::Int(b))) => int_arithmetic(op, a, b),
            (Some(a), Some(b)) if !is_bitwise(op) => float_arithmetic(op, a.as_f64(), b.as_f64()),
            _ => Err(SandboxError::type_error(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn repeat(&mut self, sequence: &Value, count: &Value) -> Result<Value> {
        let count = match count {
            Value::Int(i) => usize::try_from(*i).unwrap_or(0),
            Value::Bool(b) => usize::from(*b),
            _ => 0,
        };
        match sequence {
            Value::Str(s) => {
                self.budget.string(s.len().saturating_mul(count))?;
                Ok(Value::str(s.repeat(count)))
            }
            Value::List(id) => {
                let items = self.heap.list(*id)?;
                self.heap.check_len(items.len().saturating_mul(count))?;
                let repeated: Vec<Value> = std::iter::repeat_n(items.iter(), count)
                    .flatten()
                    .cloned()
                    .collect();
                self.budget.elements(repeated.len())?;
                self.heap.alloc_list(repeated)
            }
            Value::Tuple(items) => {
                self.heap.check_len(items.len().saturating_mul(count))?;
                let repeated: Vec<Value> = std::iter::repeat_n(items.iter(), count)
                    .flatten()
                    .cloned()
                    .collect();
                self.budget.elements(repeated.len())?;
                Ok(Value::tuple(repeated))
            }
            other => Err(SandboxError::type_error(format!(
                "can't multiply sequence of type '{}'",
                other.type_name()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn target_names(target: &Target, out: &mut Vec<String>) {
    match target {
        Target::Name(name) => out.push(name.clone()),
        Target::Tuple(targets) => {
            for target in targets {
                target_names(target, out);
            }
        }
        Target::Attr(..) | Target::Index(..) => {}
    }
}

/// Resolve a possibly negative sequence index against `len`.
pub(crate) fn resolve_index(index: &Value, len: usize, kind: &str) -> Result<usize> {
    let i = match index {
        Value::Int(i) => *i,
        Value::Bool(b) => i64::from(*b),
        other => {
            return Err(SandboxError::type_error(format!(
                "{kind} indices must be integers, not '{}'",
                other.type_name()
            )));
        }
    };
    let count = len as i64;
    let resolved = if i < 0 { i + count } else { i };
    if resolved < 0 || resolved >= count {
        let items = if len == 1 { "item" } else { "items" };
        return Err(SandboxError::Index(format!(
            "{kind} index {i} is out of range, the {kind} has {len} {items}"
        )));
    }
    Ok(resolved as usize)
}

fn slice_bound(value: Option<Value>) -> Result<Option<i64>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(Value::Int(i)) => Ok(Some(i)),
        Some(Value::Bool(b)) => Ok(Some(i64::from(b))),
        Some(other) => Err(SandboxError::type_error(format!(
            "slice indices must be integers or None, not '{}'",
            other.type_name()
        ))),
    }
}

/// Positions selected by `[lower:upper:step]` on a sequence of `len` items.
fn slice_indices(len: usize, lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let adjust = |v: i64| if v < 0 { v.saturating_add(len) } else { v };
    let (start, stop) = if step > 0 {
        (
            lower.map_or(0, |v| adjust(v).clamp(0, len)),
            upper.map_or(len, |v| adjust(v).clamp(0, len)),
        )
    } else {
        (
            lower.map_or(len - 1, |v| adjust(v).clamp(-1, len - 1)),
            upper.map_or(-1, |v| adjust(v).clamp(-1, len - 1)),
        )
    };
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i as usize);
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    out
}

fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y) || x == y,
        (Value::List(x), Value::List(y)) | (Value::Dict(x), Value::Dict(y)) => x == y,
        (Value::Tuple(x), Value::Tuple(y)) => Rc::ptr_eq(x, y),
        (Value::Enum(x), Value::Enum(y)) => x == y,
        (Value::EnumClass(x), Value::EnumClass(y)) => x.kind == y.kind,
        (Value::Handle(x), Value::Handle(y)) => x == y,
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::Module(x), Value::Module(y)) => x == y,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }
}

/// Arithmetic view of a value. Lengths take part as their EMU count.
fn number(value: &Value) -> Option<Number> {
    match value {
        Value::Bool(b) => Some(Number::Int(i64::from(*b))),
        Value::Int(i) => Some(Number::Int(*i)),
        Value::Float(f) => Some(Number::Float(*f)),
        Value::Length(l) => Some(Number::Int(l.emu())),
        _ => None,
    }
}

fn is_bitwise(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::BitOr | BinOp::BitXor | BinOp::BitAnd | BinOp::LShift | BinOp::RShift
    )
}

fn division_by_zero() -> SandboxError {
    SandboxError::type_error("division by zero")
}

/// Length-preserving arithmetic: lengths add to lengths and scale by
/// numbers. Other mixes fall through to plain arithmetic on EMU.
fn length_arithmetic(op: BinOp, left: &Value, right: &Value) -> Result<Option<Value>> {
    let scalar = |value: &Value| match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    };
    Ok(Some(match (op, left, right) {
        (BinOp::Add, Value::Length(a), Value::Length(b)) => Value::Length(a.checked_add(*b)?),
        (BinOp::Sub, Value::Length(a), Value::Length(b)) => Value::Length(a.checked_sub(*b)?),
        (BinOp::Div, Value::Length(a), Value::Length(b)) => {
            if b.emu() == 0 {
                return Err(division_by_zero());
            }
            Value::Float(a.emu() as f64 / b.emu() as f64)
        }
        (BinOp::Mul, Value::Length(a), other) | (BinOp::Mul, other, Value::Length(a)) => {
            match scalar(other) {
                Some(factor) => Value::Length(a.scale(factor)?),
                None => return Ok(None),
            }
        }
        (BinOp::Div, Value::Length(a), other) => match scalar(other) {
            Some(divisor) if divisor == 0.0 => return Err(division_by_zero()),
            Some(divisor) => Value::Length(a.scale(1.0 / divisor)?),
            None => return Ok(None),
        },
        _ => return Ok(None),
    }))
}

fn int_arithmetic(op: BinOp, a: i64, b: i64) -> Result<Value> {
    let overflow = || SandboxError::type_error("integer overflow");
    let value = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => return float_arithmetic(op, a as f64, b as f64),
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(division_by_zero());
            }
            let quotient = a.checked_div(b).ok_or_else(overflow)?;
            let remainder = a.wrapping_rem(b);
            if remainder != 0 && ((remainder < 0) != (b < 0)) {
                quotient - 1
            } else {
                quotient
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(division_by_zero());
            }
            let remainder = a.wrapping_rem(b);
            if remainder != 0 && ((remainder < 0) != (b < 0)) {
                remainder + b
            } else {
                remainder
            }
        }
        BinOp::Pow => {
            if b < 0 {
                return float_arithmetic(op, a as f64, b as f64);
            }
            match a {
                0 => i64::from(b == 0),
                1 => 1,
                -1 => {
                    if b % 2 == 0 {
                        1
                    } else {
                        -1
                    }
                }
                _ => {
                    let exponent = u32::try_from(b).map_err(|_| overflow())?;
                    a.checked_pow(exponent).ok_or_else(overflow)?
                }
            }
        }
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::BitAnd => a & b,
        BinOp::LShift => {
            if b < 0 {
                return Err(SandboxError::type_error("negative shift count"));
            }
            if a == 0 {
                0
            } else if b >= 64 {
                return Err(overflow());
            } else {
                i64::try_from(i128::from(a) << b).map_err(|_| overflow())?
            }
        }
        BinOp::RShift => {
            if b < 0 {
                return Err(SandboxError::type_error("negative shift count"));
            }
            if b >= 64 {
                if a < 0 { -1 } else { 0 }
            } else {
                a >> b
            }
        }
    };
    Ok(Value::Int(value))
}

fn float_arithmetic(op: BinOp, a: f64, b: f64) -> Result<Value> {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(division_by_zero());
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(division_by_zero());
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(division_by_zero());
            }
            let remainder = a % b;
            if remainder != 0.0 && ((remainder < 0.0) != (b < 0.0)) {
                remainder + b
            } else {
                remainder
            }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(SandboxError::type_error(
                    "zero cannot be raised to a negative power",
                ));
            }
            let result = a.powf(b);
            if result.is_nan() && !a.is_nan() && !b.is_nan() {
                return Err(SandboxError::type_error(
                    "a negative number cannot be raised to a fractional power",
                ));
            }
            result
        }
        _ => {
            return Err(SandboxError::type_error(format!(
                "unsupported operand type(s) for {}: 'float'",
                op.symbol()
            )));
        }
    };
    Ok(Value::Float(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn run(source: &str) -> (Interp, Eval<()>) {
        let program = parse(source).unwrap();
        let mut interp = Interp::new(&SandboxConfig::default(), CancelToken::new());
        let result = interp.run(&program);
        (interp, result)
    }

    fn global(interp: &Interp, name: &str) -> Value {
        interp.global(name).unwrap()
    }

    fn int(interp: &Interp, name: &str) -> i64 {
        match global(interp, name) {
            Value::Int(i) => i,
            other => panic!("{name} is {other:?}"),
        }
    }

    fn text(interp: &Interp, name: &str) -> String {
        match global(interp, name) {
            Value::Str(s) => s.to_string(),
            other => panic!("{name} is {other:?}"),
        }
    }

    #[test]
    fn python_integer_semantics() {
        let (interp, result) = run("a = -7 // 2\nb = -7 % 3\nc = 2 ** 10\nd = 7 / 2\ne = 1 << 4\n");
        result.unwrap();
        assert_eq!(int(&interp, "a"), -4);
        assert_eq!(int(&interp, "b"), 2);
        assert_eq!(int(&interp, "c"), 1024);
        assert!(matches!(global(&interp, "d"), Value::Float(f) if f == 3.5));
        assert_eq!(int(&interp, "e"), 16);
    }

    #[test]
    fn overflow_and_zero_division_are_type_errors() {
        let (_, result) = run("x = 9223372036854775807 + 1\n");
        let fault = result.unwrap_err();
        assert_eq!(fault.line, Some(1));
        assert_eq!(fault.error, SandboxError::Type("integer overflow".into()));

        let (_, result) = run("x = 1\ny = x / 0\n");
        let fault = result.unwrap_err();
        assert_eq!(fault.line, Some(2));
        assert_eq!(fault.error, SandboxError::Type("division by zero".into()));
    }

    #[test]
    fn loops_and_control_flow() {
        let source = "\
total = 0
for i in range(10):
    if i == 7:
        break
    if i % 2:
        continue
    total += i
n = 0
while n < 5:
    n += 1
";
        let (interp, result) = run(source);
        result.unwrap();
        assert_eq!(int(&interp, "total"), 12);
        assert_eq!(int(&interp, "n"), 5);
    }

    #[test]
    fn comprehension_variables_do_not_leak() {
        let (interp, result) = run("i = 'kept'\nsquares = [i * i for i in range(4) if i != 2]\n");
        result.unwrap();
        assert_eq!(text(&interp, "i"), "kept");
        let Value::List(id) = global(&interp, "squares") else { panic!() };
        let values: Vec<i64> = interp
            .heap
            .list(id)
            .unwrap()
            .iter()
            .map(|v| match v {
                Value::Int(i) => *i,
                _ => -1,
            })
            .collect();
        assert_eq!(values, [0, 1, 9]);
    }

    #[test]
    fn list_plus_equals_extends_in_place() {
        let (interp, result) = run("a = [1]\nb = a\na += [2, 3]\nn = len(b)\n");
        result.unwrap();
        assert_eq!(int(&interp, "n"), 3);
    }

    #[test]
    fn unpacking_checks_arity() {
        let (interp, result) = run("a, (b, c) = 1, (2, 3)\n");
        result.unwrap();
        assert_eq!(int(&interp, "c"), 3);
        let (_, result) = run("a, b = [1, 2, 3]\n");
        assert!(matches!(result.unwrap_err().error, SandboxError::Type(_)));
    }

    #[test]
    fn slicing_follows_python() {
        let (interp, result) = run("s = 'abcdef'[::-2]\nt = 'abcdef'[1:-1]\nn = len([1, 2, 3, 4][-3:])\n");
        result.unwrap();
        assert_eq!(text(&interp, "s"), "fdb");
        assert_eq!(text(&interp, "t"), "bcde");
        assert_eq!(int(&interp, "n"), 3);
    }

    #[test]
    fn index_errors_name_the_sequence() {
        let (_, result) = run("x = [1, 2]\ny = x[5]\n");
        let fault = result.unwrap_err();
        assert_eq!(
            fault.error,
            SandboxError::Index("list index 5 is out of range, the list has 2 items".into())
        );
        let (_, result) = run("d = {'a': 1}\nd['b']\n");
        assert!(matches!(result.unwrap_err().error, SandboxError::Key(m) if m.contains("'b'")));
    }

    #[test]
    fn names_resolve_through_the_namespace() {
        let (_, result) = run("open('x')\n");
        assert!(matches!(
            result.unwrap_err().error,
            SandboxError::Denied { ref name, .. } if name == "open"
        ));
        let (_, result) = run("undefined_thing\n");
        assert!(matches!(result.unwrap_err().error, SandboxError::UndefinedName(_)));
        let (_, result) = run("__builtins__ = 1\n");
        assert!(matches!(result.unwrap_err().error, SandboxError::Denied { .. }));
    }

    #[test]
    fn chained_comparisons_short_circuit() {
        let (interp, result) = run("a = 1 < 2 < 3\nb = 3 > 2 > 2\nc = 'b' in 'abc'\nd = None is None\n");
        result.unwrap();
        assert!(matches!(global(&interp, "a"), Value::Bool(true)));
        assert!(matches!(global(&interp, "b"), Value::Bool(false)));
        assert!(matches!(global(&interp, "c"), Value::Bool(true)));
        assert!(matches!(global(&interp, "d"), Value::Bool(true)));
    }

    #[test]
    fn step_budget_stops_infinite_loops() {
        let program = parse("while True:\n    pass\n").unwrap();
        let config = SandboxConfig::default().with_max_steps(10_000);
        let mut interp = Interp::new(&config, CancelToken::new());
        let fault = interp.run(&program).unwrap_err();
        assert_eq!(fault.error, SandboxError::StepLimit { limit: 10_000 });
        assert!(fault.line.is_some());
    }

    #[test]
    fn string_growth_is_capped() {
        let program = parse("s = 'x'\nwhile True:\n    s = s + s\n").unwrap();
        let config = SandboxConfig::default().with_max_string_bytes(1024);
        let mut interp = Interp::new(&config, CancelToken::new());
        let fault = interp.run(&program).unwrap_err();
        assert!(matches!(fault.error, SandboxError::Limit { what: "string size in bytes", .. }));
        assert_eq!(fault.line, Some(3));
    }

    #[test]
    fn repr_conversion_in_fstrings() {
        let (interp, result) = run("a = f\"{'x'!r} {[1, 'b']!r:>12}\"\n");
        result.unwrap();
        assert_eq!(text(&interp, "a"), "'x'     [1, 'b']");

        let program = parse("s = 'x' * 600\nt = f'{s!r}'\n").unwrap();
        let config = SandboxConfig::default().with_max_string_bytes(601);
        let mut interp = Interp::new(&config, CancelToken::new());
        let fault = interp.run(&program).unwrap_err();
        assert!(matches!(fault.error, SandboxError::Limit { what: "string size in bytes", .. }));
        assert_eq!(fault.line, Some(2));
    }

    #[test]
    fn slice_index_math() {
        assert_eq!(slice_indices(5, None, None, 1), [0, 1, 2, 3, 4]);
        assert_eq!(slice_indices(5, Some(-2), None, 1), [3, 4]);
        assert_eq!(slice_indices(5, None, None, -1), [4, 3, 2, 1, 0]);
        assert_eq!(slice_indices(5, Some(10), Some(20), 1), Vec::<usize>::new());
        assert_eq!(slice_indices(5, Some(1), Some(4), 2), [1, 3]);
    }
}
