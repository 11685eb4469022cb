//! Recursive-descent parser producing a [`Program`].
//!
//! The accepted grammar is the statement and expression core of Python.
//! Constructs outside it (function and class definitions, exception
//! handling, context managers and similar) are reported as syntax errors
//! naming the construct rather than as generic parse failures.

use std::rc::Rc;

use crate::ast::{
    BinOp, BoolOp, CmpOp, CompClause, Expr, ExprKind, FStringPart, Index, Program, Stmt, StmtKind,
    Target, UnaryOp,
};
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind, tokenize, unescape};

/// Maximum nesting of blocks and expressions.
pub const MAX_NESTING: usize = 64;

/// Maximum height of one expression tree. Operator chains such as
/// `a + b + c` grow the tree without opening a nesting level, and the
/// evaluator recurses once per level of height.
pub const MAX_EXPR_HEIGHT: u32 = 100;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

/// Keywords that open constructs the script language does not have.
const UNSUPPORTED: &[(&str, &str)] = &[
    ("def", "function definitions are not available"),
    ("class", "class definitions are not available"),
    ("lambda", "lambda expressions are not available"),
    ("try", "exception handling is not available"),
    ("except", "exception handling is not available"),
    ("finally", "exception handling is not available"),
    ("raise", "exception handling is not available"),
    ("with", "'with' blocks are not available"),
    ("return", "'return' is not available outside functions"),
    ("yield", "generators are not available"),
    ("global", "'global' declarations are not available"),
    ("nonlocal", "'nonlocal' declarations are not available"),
    ("del", "'del' statements are not available"),
    ("assert", "'assert' statements are not available"),
    ("async", "async code is not available"),
    ("await", "async code is not available"),
];

pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).program()
}

fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

fn unsupported(keyword: &str) -> Option<&'static str> {
    UNSUPPORTED
        .iter()
        .find(|(k, _)| *k == keyword)
        .map(|(_, what)| *what)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    loops: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            loops: 0,
        }
    }

    // -- token helpers ------------------------------------------------------

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<Token, ParseError> {
        if self.is_op(op) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!("expected '{op}'")))
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Name(n) if n == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{keyword}'")))
        }
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        match &self.peek().kind {
            TokenKind::Name(n) if !is_keyword(n) => {
                let name = n.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here("expected a name")),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self.peek();
        ParseError::new(message, token.line, token.column)
    }

    fn unexpected(&self) -> ParseError {
        let token = self.peek();
        if let TokenKind::Name(n) = &token.kind
            && let Some(what) = unsupported(n)
        {
            return self.error_here(format!("unsupported syntax: {what}"));
        }
        let found = match &token.kind {
            TokenKind::Name(n) => format!("'{n}'"),
            TokenKind::Int(_) | TokenKind::Float(_) => "number".to_string(),
            TokenKind::Str(_) | TokenKind::FString { .. } => "string".to_string(),
            TokenKind::Op(op) => format!("'{op}'"),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => return self.error_here("unexpected indent"),
            TokenKind::Dedent => return self.error_here("unexpected dedent"),
            TokenKind::Eof => "end of input".to_string(),
        };
        self.error_here(format!("invalid syntax: unexpected {found}"))
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error_here(format!(
                "code is nested more than {MAX_NESTING} levels deep"
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Build a compound node, rejecting trees taller than
    /// [`MAX_EXPR_HEIGHT`].
    fn node(&self, line: u32, kind: ExprKind) -> Result<Expr, ParseError> {
        let expr = Expr::new(line, kind);
        if expr.height > MAX_EXPR_HEIGHT {
            return Err(self.error_here("expression is too long"));
        }
        Ok(expr)
    }

    // -- statements ---------------------------------------------------------

    fn program(mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Newline => {
                    self.advance();
                }
                _ => body.extend(self.statement()?),
            }
        }
        Ok(Program { body })
    }

    fn statement(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Name(n) if n == "if" => Ok(vec![self.if_stmt()?]),
            TokenKind::Name(n) if n == "while" => Ok(vec![self.while_stmt()?]),
            TokenKind::Name(n) if n == "for" => Ok(vec![self.for_stmt()?]),
            TokenKind::Name(n) if unsupported(n).is_some() && n != "lambda" && n != "await" => {
                Err(self.unexpected())
            }
            TokenKind::Op("@") => Err(self.error_here("unsupported syntax: decorators are not available")),
            TokenKind::Indent => Err(self.unexpected()),
            _ => self.simple_line(),
        }
    }

    /// One or more `;`-separated simple statements ending the line.
    fn simple_line(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            stmts.extend(self.simple_stmt()?);
            if !self.eat_op(";") {
                break;
            }
            if matches!(self.peek().kind, TokenKind::Newline | TokenKind::Eof) {
                break;
            }
        }
        match self.peek().kind {
            TokenKind::Newline => {
                self.advance();
                Ok(stmts)
            }
            TokenKind::Eof => Ok(stmts),
            _ => Err(self.unexpected()),
        }
    }

    fn simple_stmt(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let line = self.peek().line;
        let stmt = |kind| Stmt { line, kind };

        if self.eat_keyword("pass") {
            return Ok(vec![stmt(StmtKind::Pass)]);
        }
        for (keyword, kind) in [("break", StmtKind::Break), ("continue", StmtKind::Continue)] {
            if self.is_keyword(keyword) {
                if self.loops == 0 {
                    return Err(self.error_here(format!("'{keyword}' outside loop")));
                }
                self.advance();
                return Ok(vec![stmt(kind)]);
            }
        }
        if self.eat_keyword("import") {
            let mut stmts = Vec::new();
            loop {
                let module = self.dotted_name()?;
                let alias = if self.eat_keyword("as") {
                    Some(self.identifier()?)
                } else {
                    None
                };
                stmts.push(stmt(StmtKind::Import { module, alias }));
                if !self.eat_op(",") {
                    break;
                }
            }
            return Ok(stmts);
        }
        if self.eat_keyword("from") {
            if self.is_op(".") || self.is_op("...") {
                return Err(self.error_here("unsupported syntax: relative imports are not available"));
            }
            let module = self.dotted_name()?;
            self.expect_keyword("import")?;
            if self.is_op("*") {
                return Err(self.error_here("unsupported syntax: wildcard imports are not available"));
            }
            let parenthesized = self.eat_op("(");
            let mut names = Vec::new();
            loop {
                let name = self.identifier()?;
                let alias = if self.eat_keyword("as") {
                    Some(self.identifier()?)
                } else {
                    None
                };
                names.push((name, alias));
                if !self.eat_op(",") {
                    break;
                }
                if parenthesized && self.is_op(")") {
                    break;
                }
            }
            if parenthesized {
                self.expect_op(")")?;
            }
            return Ok(vec![stmt(StmtKind::ImportFrom { module, names })]);
        }

        let first = self.testlist()?;
        if self.is_op("=") {
            let mut exprs = vec![first];
            while self.eat_op("=") {
                exprs.push(self.testlist()?);
            }
            let value = exprs.pop().ok_or_else(|| self.error_here("invalid syntax"))?;
            let targets = exprs
                .into_iter()
                .map(|e| self.to_target(e))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(vec![stmt(StmtKind::Assign { targets, value })]);
        }
        if let TokenKind::Op(op) = self.peek().kind
            && let Some(bin) = aug_op(op)
        {
            if op == "@=" {
                return Err(self.error_here("unsupported syntax: matrix multiplication is not available"));
            }
            self.advance();
            let target = self.to_target(first)?;
            if matches!(target, Target::Tuple(_)) {
                return Err(self.error_here("illegal expression for augmented assignment"));
            }
            let value = self.testlist()?;
            return Ok(vec![stmt(StmtKind::AugAssign {
                target,
                op: bin,
                value,
            })]);
        }
        if self.is_op(":") {
            return Err(self.error_here("unsupported syntax: variable annotations are not available"));
        }
        Ok(vec![stmt(StmtKind::Expr(first))])
    }

    fn dotted_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.identifier()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.identifier()?);
        }
        Ok(name)
    }

    fn to_target(&self, expr: Expr) -> Result<Target, ParseError> {
        let line = expr.line;
        match expr.kind {
            ExprKind::Name(n) => Ok(Target::Name(n)),
            ExprKind::Attr(obj, attr) => Ok(Target::Attr(obj, attr)),
            ExprKind::Subscript(obj, index) => match *index {
                Index::Single(i) => Ok(Target::Index(obj, Box::new(i))),
                Index::Slice { .. } => Err(ParseError::new(
                    "unsupported syntax: slice assignment is not available",
                    line,
                    1,
                )),
            },
            ExprKind::Tuple(items) | ExprKind::List(items) => Ok(Target::Tuple(
                items
                    .into_iter()
                    .map(|e| self.to_target(e))
                    .collect::<Result<_, _>>()?,
            )),
            _ => Err(ParseError::new("cannot assign to expression", line, 1)),
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_op(":")?;
        self.enter()?;
        let body = if matches!(self.peek().kind, TokenKind::Newline) {
            self.advance();
            if !matches!(self.peek().kind, TokenKind::Indent) {
                return Err(self.error_here("expected an indented block"));
            }
            self.advance();
            let mut body = Vec::new();
            loop {
                match self.peek().kind {
                    TokenKind::Dedent => {
                        self.advance();
                        break;
                    }
                    TokenKind::Eof => break,
                    TokenKind::Newline => {
                        self.advance();
                    }
                    _ => body.extend(self.statement()?),
                }
            }
            body
        } else {
            self.simple_line()?
        };
        self.leave();
        Ok(body)
    }

    fn if_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.advance().line;
        let mut branches = Vec::new();
        let test = self.test()?;
        branches.push((test, self.block()?));
        let mut orelse = Vec::new();
        loop {
            if self.eat_keyword("elif") {
                let test = self.test()?;
                branches.push((test, self.block()?));
            } else if self.eat_keyword("else") {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            line,
            kind: StmtKind::If { branches, orelse },
        })
    }

    fn loop_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.loops += 1;
        let body = self.block();
        self.loops -= 1;
        let body = body?;
        if self.is_keyword("else") {
            return Err(self.error_here("unsupported syntax: loop 'else' clauses are not available"));
        }
        Ok(body)
    }

    fn while_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.advance().line;
        let test = self.test()?;
        let body = self.loop_body()?;
        Ok(Stmt {
            line,
            kind: StmtKind::While { test, body },
        })
    }

    fn for_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.advance().line;
        let target = self.target_list()?;
        self.expect_keyword("in")?;
        let iter = self.testlist()?;
        let body = self.loop_body()?;
        Ok(Stmt {
            line,
            kind: StmtKind::For { target, iter, body },
        })
    }

    /// Loop targets stop before `in`, so they are parsed below comparisons.
    fn target_list(&mut self) -> Result<Target, ParseError> {
        let line = self.peek().line;
        let first = self.bitor()?;
        if !self.is_op(",") {
            return self.to_target(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_keyword("in") {
                break;
            }
            items.push(self.bitor()?);
        }
        self.to_target(self.node(line, ExprKind::Tuple(items))?)
    }

    // -- expressions --------------------------------------------------------

    /// `test (',' test)* [',']`, a bare tuple when commas are present.
    fn testlist(&mut self) -> Result<Expr, ParseError> {
        let line = self.peek().line;
        let first = self.test()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_expression_end() {
                break;
            }
            items.push(self.test()?);
        }
        self.node(line, ExprKind::Tuple(items))
    }

    fn at_expression_end(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Newline | TokenKind::Eof => true,
            TokenKind::Op(op) => matches!(*op, "=" | ")" | "]" | "}" | ":" | ";") || aug_op(op).is_some(),
            _ => false,
        }
    }

    fn test(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let result = self.test_inner();
        self.leave();
        result
    }

    fn test_inner(&mut self) -> Result<Expr, ParseError> {
        if self.is_keyword("lambda") {
            return Err(self.unexpected());
        }
        let body = self.or_test()?;
        if !self.is_keyword("if") {
            return Ok(body);
        }
        self.advance();
        let test = self.or_test()?;
        self.expect_keyword("else")?;
        let orelse = self.test()?;
        self.node(
            body.line,
            ExprKind::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            },
        )
    }

    fn or_test(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and_test()?;
        let line = left.line;
        while self.eat_keyword("or") {
            let right = self.and_test()?;
            let kind = ExprKind::BoolOp(BoolOp::Or, Box::new(left), Box::new(right));
            left = self.node(line, kind)?;
        }
        Ok(left)
    }

    fn and_test(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.not_test()?;
        let line = left.line;
        while self.eat_keyword("and") {
            let right = self.not_test()?;
            let kind = ExprKind::BoolOp(BoolOp::And, Box::new(left), Box::new(right));
            left = self.node(line, kind)?;
        }
        Ok(left)
    }

    fn not_test(&mut self) -> Result<Expr, ParseError> {
        if self.is_keyword("not") {
            let line = self.advance().line;
            self.enter()?;
            let operand = self.not_test();
            self.leave();
            return self.node(line, ExprKind::Not(Box::new(operand?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.bitor()?;
        let mut ops = Vec::new();
        while let Some(op) = self.comparison_op() {
            let right = self.bitor()?;
            ops.push((op, right));
        }
        if ops.is_empty() {
            return Ok(left);
        }
        self.node(left.line, ExprKind::Compare(Box::new(left), ops))
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match &self.peek().kind {
            TokenKind::Op("==") => CmpOp::Eq,
            TokenKind::Op("!=") => CmpOp::NotEq,
            TokenKind::Op("<") => CmpOp::Lt,
            TokenKind::Op("<=") => CmpOp::LtE,
            TokenKind::Op(">") => CmpOp::Gt,
            TokenKind::Op(">=") => CmpOp::GtE,
            TokenKind::Name(n) if n == "in" => CmpOp::In,
            TokenKind::Name(n) if n == "is" => {
                self.advance();
                return Some(if self.eat_keyword("not") {
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                });
            }
            TokenKind::Name(n)
                if n == "not"
                    && matches!(self.peek_kind_at(1), Some(TokenKind::Name(m)) if m == "in") =>
            {
                self.advance();
                CmpOp::NotIn
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinOp)],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;
        let line = left.line;
        'outer: loop {
            for (symbol, op) in ops {
                if self.eat_op(symbol) {
                    let right = next(self)?;
                    let kind = ExprKind::Binary(*op, Box::new(left), Box::new(right));
                    left = self.node(line, kind)?;
                    continue 'outer;
                }
            }
            break;
        }
        Ok(left)
    }

    fn bitor(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("|", BinOp::BitOr)], Self::bitxor)
    }

    fn bitxor(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("^", BinOp::BitXor)], Self::bitand)
    }

    fn bitand(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("&", BinOp::BitAnd)], Self::shift)
    }

    fn shift(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("<<", BinOp::LShift), (">>", BinOp::RShift)], Self::arith)
    }

    fn arith(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Self::term)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        if self.is_op("@") {
            return Err(self.error_here("unsupported syntax: matrix multiplication is not available"));
        }
        let left = self.binary_level(
            &[
                ("*", BinOp::Mul),
                ("//", BinOp::FloorDiv),
                ("/", BinOp::Div),
                ("%", BinOp::Mod),
            ],
            Self::factor,
        )?;
        if self.is_op("@") {
            return Err(self.error_here("unsupported syntax: matrix multiplication is not available"));
        }
        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek().kind {
            TokenKind::Op("-") => UnaryOp::Neg,
            TokenKind::Op("+") => UnaryOp::Pos,
            TokenKind::Op("~") => UnaryOp::Invert,
            _ => return self.power(),
        };
        let line = self.advance().line;
        self.enter()?;
        let operand = self.factor();
        self.leave();
        let operand = operand?;
        // Negative literals fold into constants. The lexer caps integer
        // literals at i64::MAX, so i64::MIN is only reachable by arithmetic.
        if op == UnaryOp::Neg {
            match operand.kind {
                ExprKind::Int(i) => return Ok(Expr::new(line, ExprKind::Int(-i))),
                ExprKind::Float(f) => return Ok(Expr::new(line, ExprKind::Float(-f))),
                _ => {}
            }
        }
        self.node(line, ExprKind::Unary(op, Box::new(operand)))
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.postfix()?;
        if !self.eat_op("**") {
            return Ok(base);
        }
        self.enter()?;
        let exponent = self.factor();
        self.leave();
        let line = base.line;
        self.node(line, ExprKind::Binary(BinOp::Pow, Box::new(base), Box::new(exponent?)))
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.atom()?;
        loop {
            let line = expr.line;
            if self.eat_op("(") {
                let (args, kwargs) = self.arguments()?;
                let kind = ExprKind::Call {
                    func: Box::new(expr),
                    args,
                    kwargs,
                };
                expr = self.node(line, kind)?;
            } else if self.eat_op("[") {
                let index = self.subscript()?;
                self.expect_op("]")?;
                let kind = ExprKind::Subscript(Box::new(expr), Box::new(index));
                expr = self.node(line, kind)?;
            } else if self.eat_op(".") {
                let attr = match &self.peek().kind {
                    TokenKind::Name(n) => n.clone(),
                    _ => return Err(self.error_here("expected an attribute name")),
                };
                self.advance();
                expr = self.node(line, ExprKind::Attr(Box::new(expr), attr))?;
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn arguments(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.is_op(")") {
            if self.is_op("*") || self.is_op("**") {
                return Err(self.error_here("unsupported syntax: star-arguments are not available"));
            }
            let keyword = match (&self.peek().kind, self.peek_kind_at(1)) {
                (TokenKind::Name(n), Some(TokenKind::Op("="))) if !is_keyword(n) => Some(n.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.error_here(format!("keyword argument repeated: {name}")));
                }
                self.advance();
                self.advance();
                kwargs.push((name, self.test()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error_here("positional argument follows keyword argument"));
                }
                let arg = self.test()?;
                if self.is_keyword("for") {
                    if !args.is_empty() {
                        return Err(self.error_here("generator expression must be parenthesized"));
                    }
                    let comp = self.comprehension(arg)?;
                    if !self.is_op(")") {
                        return Err(self.error_here("generator expression must be parenthesized"));
                    }
                    args.push(comp);
                    break;
                }
                args.push(arg);
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok((args, kwargs))
    }

    fn subscript(&mut self) -> Result<Index, ParseError> {
        let lower = if self.is_op(":") {
            None
        } else {
            let line = self.peek().line;
            let first = self.test()?;
            if !self.is_op(":") {
                if self.is_op(",") {
                    let mut items = vec![first];
                    while self.eat_op(",") && !self.is_op("]") {
                        items.push(self.test()?);
                    }
                    return Ok(Index::Single(self.node(line, ExprKind::Tuple(items))?));
                }
                return Ok(Index::Single(first));
            }
            Some(first)
        };
        self.expect_op(":")?;
        let upper = if self.is_op(":") || self.is_op("]") {
            None
        } else {
            Some(self.test()?)
        };
        let step = if self.eat_op(":") && !self.is_op("]") {
            Some(self.test()?)
        } else {
            None
        };
        Ok(Index::Slice { lower, upper, step })
    }

    fn comprehension(&mut self, elt: Expr) -> Result<Expr, ParseError> {
        let line = elt.line;
        let mut clauses = Vec::new();
        loop {
            if self.eat_keyword("for") {
                let target = self.target_list()?;
                self.expect_keyword("in")?;
                let iter = self.or_test()?;
                clauses.push(CompClause::For { target, iter });
            } else if self.eat_keyword("if") {
                clauses.push(CompClause::If(self.or_test()?));
            } else {
                break;
            }
        }
        self.node(
            line,
            ExprKind::ListComp {
                elt: Box::new(elt),
                clauses,
            },
        )
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let line = token.line;
        let expr = |kind| Ok(Expr::new(line, kind));
        match token.kind {
            TokenKind::Int(i) => {
                self.advance();
                expr(ExprKind::Int(i))
            }
            TokenKind::Float(f) => {
                self.advance();
                expr(ExprKind::Float(f))
            }
            TokenKind::Str(_) | TokenKind::FString { .. } => self.strings(),
            TokenKind::Name(ref n) => match n.as_str() {
                "True" => {
                    self.advance();
                    expr(ExprKind::Bool(true))
                }
                "False" => {
                    self.advance();
                    expr(ExprKind::Bool(false))
                }
                "None" => {
                    self.advance();
                    expr(ExprKind::None)
                }
                n if is_keyword(n) => Err(self.unexpected()),
                n => {
                    let name = n.to_string();
                    self.advance();
                    expr(ExprKind::Name(name))
                }
            },
            TokenKind::Op("(") => {
                self.advance();
                if self.eat_op(")") {
                    return expr(ExprKind::Tuple(Vec::new()));
                }
                let first = self.test()?;
                if self.is_keyword("for") {
                    let comp = self.comprehension(first)?;
                    self.expect_op(")")?;
                    return Ok(comp);
                }
                if !self.is_op(",") {
                    self.expect_op(")")?;
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") && !self.is_op(")") {
                    items.push(self.test()?);
                }
                self.expect_op(")")?;
                self.node(line, ExprKind::Tuple(items))
            }
            TokenKind::Op("[") => {
                self.advance();
                if self.eat_op("]") {
                    return expr(ExprKind::List(Vec::new()));
                }
                let first = self.test()?;
                if self.is_keyword("for") {
                    let comp = self.comprehension(first)?;
                    self.expect_op("]")?;
                    return Ok(comp);
                }
                let mut items = vec![first];
                while self.eat_op(",") && !self.is_op("]") {
                    items.push(self.test()?);
                }
                self.expect_op("]")?;
                self.node(line, ExprKind::List(items))
            }
            TokenKind::Op("{") => {
                self.advance();
                if self.eat_op("}") {
                    return expr(ExprKind::Dict(Vec::new()));
                }
                if self.is_op("**") {
                    return Err(self.error_here("unsupported syntax: dict unpacking is not available"));
                }
                let key = self.test()?;
                if !self.is_op(":") {
                    return Err(self.error_here("unsupported syntax: set literals are not available"));
                }
                self.advance();
                let value = self.test()?;
                if self.is_keyword("for") {
                    return Err(self.error_here("unsupported syntax: dict comprehensions are not available"));
                }
                let mut entries = vec![(key, value)];
                while self.eat_op(",") && !self.is_op("}") {
                    let key = self.test()?;
                    self.expect_op(":")?;
                    entries.push((key, self.test()?));
                }
                self.expect_op("}")?;
                self.node(line, ExprKind::Dict(entries))
            }
            TokenKind::Op("...") => Err(self.error_here("unsupported syntax: Ellipsis is not available")),
            _ => Err(self.unexpected()),
        }
    }

    /// Adjacent string literals concatenate; any f-string in the run makes
    /// the whole literal an f-string.
    fn strings(&mut self) -> Result<Expr, ParseError> {
        let line = self.peek().line;
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut formatted = false;
        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Str(s) => {
                    self.advance();
                    push_literal(&mut parts, &s);
                }
                TokenKind::FString { body, raw } => {
                    self.advance();
                    formatted = true;
                    for part in fstring_parts(&body, raw, token.line, token.column)? {
                        match part {
                            FStringPart::Literal(s) => push_literal(&mut parts, &s),
                            field => parts.push(field),
                        }
                    }
                }
                _ => break,
            }
        }
        if !formatted {
            let text = match parts.pop() {
                Some(FStringPart::Literal(s)) => s,
                _ => String::new(),
            };
            return Ok(Expr::new(line, ExprKind::Str(Rc::from(text))));
        }
        self.node(line, ExprKind::FString(parts))
    }
}

fn aug_op(op: &str) -> Option<BinOp> {
    Some(match op {
        "+=" => BinOp::Add,
        "-=" => BinOp::Sub,
        "*=" => BinOp::Mul,
        "/=" => BinOp::Div,
        "//=" => BinOp::FloorDiv,
        "%=" => BinOp::Mod,
        "**=" => BinOp::Pow,
        "|=" => BinOp::BitOr,
        "^=" => BinOp::BitXor,
        "&=" => BinOp::BitAnd,
        "<<=" => BinOp::LShift,
        ">>=" => BinOp::RShift,
        "@=" => BinOp::Mul,
        _ => return None,
    })
}

fn push_literal(parts: &mut Vec<FStringPart>, text: &str) {
    if let Some(FStringPart::Literal(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(FStringPart::Literal(text.to_string()));
    }
}

/// Split an f-string body into literal text and replacement fields.
fn fstring_parts(body: &str, raw: bool, line: u32, column: u32) -> Result<Vec<FStringPart>, ParseError> {
    let error = |message: &str| ParseError::new(format!("f-string: {message}"), line, column);
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    let flush = |literal: &mut String, parts: &mut Vec<FStringPart>| -> Result<(), ParseError> {
        if !literal.is_empty() {
            let text = if raw {
                std::mem::take(literal)
            } else {
                let text = unescape(literal, line, column)?;
                literal.clear();
                text
            };
            parts.push(FStringPart::Literal(text));
        }
        Ok(())
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => return Err(error("single '}' is not allowed")),
            '{' => {
                flush(&mut literal, &mut parts)?;
                i += 1;
                let start = i;
                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                while i < chars.len() {
                    let c = chars[i];
                    if let Some(q) = quote {
                        if c == q {
                            quote = None;
                        }
                    } else {
                        match c {
                            '\'' | '"' => quote = Some(c),
                            '(' | '[' | '{' => depth += 1,
                            ')' | ']' | '}' if depth > 0 => depth -= 1,
                            '}' | ':' if depth == 0 => break,
                            '!' if depth == 0 && chars.get(i + 1) != Some(&'=') => break,
                            _ => {}
                        }
                    }
                    i += 1;
                }
                let source: String = chars[start..i].iter().collect();
                if source.trim().is_empty() {
                    return Err(error("empty expression not allowed"));
                }

                let mut repr = false;
                if chars.get(i) == Some(&'!') {
                    match chars.get(i + 1) {
                        Some('r') | Some('a') => repr = true,
                        Some('s') => {}
                        _ => return Err(error("invalid conversion character")),
                    }
                    i += 2;
                }
                let mut spec = String::new();
                if chars.get(i) == Some(&':') {
                    i += 1;
                    while i < chars.len() && chars[i] != '}' {
                        if chars[i] == '{' {
                            return Err(error("nested replacement fields are not supported"));
                        }
                        spec.push(chars[i]);
                        i += 1;
                    }
                }
                if chars.get(i) != Some(&'}') {
                    return Err(error("expecting '}'"));
                }
                i += 1;

                let expr = parse_field(source.trim(), line, column)?;
                parts.push(FStringPart::Field { expr, repr, spec });
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut literal, &mut parts)?;
    Ok(parts)
}

/// Parse the expression inside an f-string field, reporting positions at
/// the enclosing literal.
fn parse_field(source: &str, line: u32, column: u32) -> Result<Expr, ParseError> {
    let relocate = |mut e: ParseError| {
        e.message = format!("f-string: {}", e.message);
        e.line = line;
        e.column = column;
        e
    };
    let mut tokens = tokenize(source).map_err(relocate)?;
    for token in &mut tokens {
        token.line = line;
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.testlist().map_err(relocate)?;
    match parser.peek().kind {
        TokenKind::Newline | TokenKind::Eof => Ok(expr),
        _ => Err(relocate(parser.unexpected())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(source: &str) -> StmtKind {
        let mut program = parse(source).unwrap();
        assert_eq!(program.body.len(), 1, "{source}");
        program.body.remove(0).kind
    }

    fn expr(source: &str) -> ExprKind {
        match stmt(source) {
            StmtKind::Expr(e) => e.kind,
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn precedence() {
        match expr("1 + 2 * 3") {
            ExprKind::Binary(BinOp::Add, _, right) => {
                assert!(matches!(right.kind, ExprKind::Binary(BinOp::Mul, _, _)));
            }
            other => panic!("{other:?}"),
        }
        match expr("-2 ** 2") {
            ExprKind::Unary(UnaryOp::Neg, inner) => {
                assert!(matches!(inner.kind, ExprKind::Binary(BinOp::Pow, _, _)));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn negative_literals_fold() {
        assert_eq!(expr("-5"), ExprKind::Int(-5));
        assert_eq!(expr("-2.5"), ExprKind::Float(-2.5));
        assert_eq!(expr("-9223372036854775807"), ExprKind::Int(-i64::MAX));
        let err = parse("x = -9223372036854775808\n").unwrap_err();
        assert_eq!(err.message, "integer literal is too large");
    }

    #[test]
    fn calls_with_keywords_and_chains() {
        match expr("doc.add_heading('Title', level=1).style") {
            ExprKind::Attr(call, attr) => {
                assert_eq!(attr, "style");
                match call.kind {
                    ExprKind::Call { args, kwargs, .. } => {
                        assert_eq!(args.len(), 1);
                        assert_eq!(kwargs[0].0, "level");
                    }
                    other => panic!("{other:?}"),
                }
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn assignments() {
        assert!(matches!(
            stmt("a = b = 1"),
            StmtKind::Assign { ref targets, .. } if targets.len() == 2
        ));
        assert!(matches!(
            stmt("a, b = 1, 2"),
            StmtKind::Assign { ref targets, .. } if matches!(targets[0], Target::Tuple(_))
        ));
        assert!(matches!(
            stmt("cell.text += 'x'"),
            StmtKind::AugAssign { target: Target::Attr(..), op: BinOp::Add, .. }
        ));
        assert!(parse("f() = 1").is_err());
    }

    #[test]
    fn compound_statements() {
        let program = parse(
            "for i, row in enumerate(rows):\n    if i % 2:\n        continue\n    elif i > 3:\n        break\n    else:\n        pass\n",
        )
        .unwrap();
        match &program.body[0].kind {
            StmtKind::For { target, body, .. } => {
                assert!(matches!(target, Target::Tuple(t) if t.len() == 2));
                assert!(matches!(&body[0].kind, StmtKind::If { branches, orelse } if branches.len() == 2 && orelse.len() == 1));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn imports() {
        assert_eq!(
            stmt("from docx.shared import Pt, Inches as In"),
            StmtKind::ImportFrom {
                module: "docx.shared".into(),
                names: vec![("Pt".into(), None), ("Inches".into(), Some("In".into()))],
            }
        );
        assert_eq!(
            stmt("import docx"),
            StmtKind::Import {
                module: "docx".into(),
                alias: None
            }
        );
        assert!(parse("from os import *").is_err());
    }

    #[test]
    fn comprehensions_and_slices() {
        assert!(matches!(
            expr("[x * 2 for x in range(3) if x]"),
            ExprKind::ListComp { ref clauses, .. } if clauses.len() == 2
        ));
        assert!(matches!(expr("sum(x for x in y)"), ExprKind::Call { .. }));
        assert!(matches!(
            expr("items[1:-1]"),
            ExprKind::Subscript(_, ref index) if matches!(**index, Index::Slice { .. })
        ));
    }

    #[test]
    fn fstrings() {
        match expr("f'{name!r:>10} and {{braces}} {a + 1}'") {
            ExprKind::FString(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(&parts[0], FStringPart::Field { repr: true, spec, .. } if spec == ">10"));
                assert_eq!(parts[1], FStringPart::Literal(" and {braces} ".into()));
            }
            other => panic!("{other:?}"),
        }
        assert!(parse("f'{}'").is_err());
        assert!(matches!(expr("'a' 'b'"), ExprKind::Str(s) if &*s == "ab"));
    }

    #[test]
    fn unsupported_constructs_are_named() {
        for (source, needle) in [
            ("def f():\n    pass\n", "function definitions"),
            ("class A:\n    pass\n", "class definitions"),
            ("x = lambda: 1\n", "lambda"),
            ("try:\n    pass\nexcept:\n    pass\n", "exception handling"),
            ("with x:\n    pass\n", "'with' blocks"),
            ("s = {1, 2}\n", "set literals"),
            ("f(*args)\n", "star-arguments"),
            ("while x:\n    pass\nelse:\n    pass\n", "loop 'else'"),
        ] {
            let err = parse(source).unwrap_err();
            assert!(err.message.contains(needle), "{source}: {}", err.message);
            assert!(err.message.starts_with("unsupported syntax"), "{source}");
        }
    }

    #[test]
    fn break_outside_loop() {
        let err = parse("break\n").unwrap_err();
        assert_eq!(err.message, "'break' outside loop");
    }

    #[test]
    fn syntax_errors_report_line() {
        let err = parse("doc = Document()\ndoc.add_paragraph('x'\n").unwrap_err();
        assert_eq!(err.line, 2);
        let err = parse("x = 1\ny = (2 +\n").unwrap_err();
        assert!(err.line >= 2);
        let err = parse("if x\n    y\n").unwrap_err();
        assert_eq!((err.line, err.message.as_str()), (1, "expected ':'"));
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("x = {}1{}\n", "-(".repeat(40), ")".repeat(40));
        assert!(parse(&deep).is_err());
        let unary = format!("x = {}1\n", "-".repeat(200));
        assert!(parse(&unary).is_err());
        let ok = format!("x = {}1{}\n", "(".repeat(10), ")".repeat(10));
        assert!(parse(&ok).is_ok());
    }

    #[test]
    fn operator_chains_are_bounded() {
        for op in [" + 1", " and 1", " or 1", " * 1", " | 1", ".real"] {
            let long = format!("x = 1{}\n", op.repeat(10_000));
            let err = parse(&long).unwrap_err();
            assert_eq!(err.message, "expression is too long", "{op}");
            assert_eq!(err.line, 1);
        }
        let short = format!("x = 1{}\n", " + 1".repeat(50));
        assert!(parse(&short).is_ok());
    }

    #[test]
    fn chains_across_precedence_levels_share_one_bound() {
        // Each level stays under the bound, the combined tree does not.
        let mixed = format!("x = 1{}{}\n", " * 1".repeat(60), " + 1".repeat(60));
        assert!(parse(&mixed).is_err());

        let wrapped = format!("x = ({}){}\n", "1 + ".repeat(60) + "1", " + 1".repeat(60));
        assert!(parse(&wrapped).is_err());
    }

    #[test]
    fn recorded_height_matches_tree_shape() {
        match stmt("x = 1 + 2 * 3\n") {
            StmtKind::Assign { value, .. } => assert_eq!(value.height, 3),
            other => panic!("expected assignment, got {other:?}"),
        }
        match stmt("f(a.b, [c])\n") {
            StmtKind::Expr(e) => assert_eq!(e.height, 3),
            other => panic!("expected expression, got {other:?}"),
        }
    }
}
