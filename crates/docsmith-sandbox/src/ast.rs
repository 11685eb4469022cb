//! Syntax tree of a parsed script.

use std::rc::Rc;

/// A parsed script, ready to run any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: u32,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// `a = b = value`; targets are assigned left to right.
    Assign {
        targets: Vec<Target>,
        value: Expr,
    },
    AugAssign {
        target: Target,
        op: BinOp,
        value: Expr,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Pass,
    /// `import a.b as c`
    Import {
        module: String,
        alias: Option<String>,
    },
    /// `from a.b import x as y, z`
    ImportFrom {
        module: String,
        names: Vec<(String, Option<String>)>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Attr(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Tuple(Vec<Target>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub line: u32,
    /// Height of the subtree rooted here; leaves are 1.
    pub height: u32,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(line: u32, kind: ExprKind) -> Self {
        let height = kind.height();
        Self { line, height, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    FString(Vec<FStringPart>),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attr(Box<Expr>, String),
    Subscript(Box<Expr>, Box<Index>),
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c`
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    BoolOp(BoolOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    ListComp {
        elt: Box<Expr>,
        clauses: Vec<CompClause>,
    },
}

impl ExprKind {
    /// Height of a node with these children, read from the children's
    /// recorded heights.
    fn height(&self) -> u32 {
        let child = match self {
            Self::None
            | Self::Bool(_)
            | Self::Int(_)
            | Self::Float(_)
            | Self::Str(_)
            | Self::Name(_) => 0,
            Self::FString(parts) => parts
                .iter()
                .map(|part| match part {
                    FStringPart::Literal(_) => 0,
                    FStringPart::Field { expr, .. } => expr.height,
                })
                .max()
                .unwrap_or(0),
            Self::List(items) | Self::Tuple(items) => max_height(items),
            Self::Dict(entries) => entries
                .iter()
                .map(|(k, v)| k.height.max(v.height))
                .max()
                .unwrap_or(0),
            Self::Attr(object, _) => object.height,
            Self::Subscript(object, index) => object.height.max(index.height()),
            Self::Call { func, args, kwargs } => func
                .height
                .max(max_height(args))
                .max(kwargs.iter().map(|(_, e)| e.height).max().unwrap_or(0)),
            Self::Unary(_, operand) | Self::Not(operand) => operand.height,
            Self::Binary(_, left, right) | Self::BoolOp(_, left, right) => {
                left.height.max(right.height)
            }
            Self::Compare(left, ops) => left
                .height
                .max(ops.iter().map(|(_, e)| e.height).max().unwrap_or(0)),
            Self::IfExp { test, body, orelse } => {
                test.height.max(body.height).max(orelse.height)
            }
            Self::ListComp { elt, clauses } => clauses
                .iter()
                .map(|clause| match clause {
                    CompClause::For { target, iter } => target.height().max(iter.height),
                    CompClause::If(cond) => cond.height,
                })
                .max()
                .unwrap_or(0)
                .max(elt.height),
        };
        child.saturating_add(1)
    }
}

fn max_height(exprs: &[Expr]) -> u32 {
    exprs.iter().map(|e| e.height).max().unwrap_or(0)
}

impl Target {
    fn height(&self) -> u32 {
        match self {
            Self::Name(_) => 1,
            Self::Attr(object, _) => object.height.saturating_add(1),
            Self::Index(object, index) => object.height.max(index.height).saturating_add(1),
            Self::Tuple(items) => items
                .iter()
                .map(Target::height)
                .max()
                .unwrap_or(0)
                .saturating_add(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Index {
    Single(Expr),
    Slice {
        lower: Option<Expr>,
        upper: Option<Expr>,
        step: Option<Expr>,
    },
}

impl Index {
    fn height(&self) -> u32 {
        match self {
            Self::Single(e) => e.height,
            Self::Slice { lower, upper, step } => [lower, upper, step]
                .into_iter()
                .flatten()
                .map(|e| e.height)
                .max()
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompClause {
    For { target: Target, iter: Expr },
    If(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    Field {
        expr: Expr,
        repr: bool,
        spec: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitOr,
    BitXor,
    BitAnd,
    LShift,
    RShift,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitAnd => "&",
            Self::LShift => "<<",
            Self::RShift => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtE => "<=",
            Self::Gt => ">",
            Self::GtE => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Is => "is",
            Self::IsNot => "is not",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}
