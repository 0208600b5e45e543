//! Syntax tree

use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    /// `+=`, `-=`, ... carry their arithmetic operator
    Compound(BinaryOp),
    Logical(LogicalOp),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateChunk {
    Lit(String),
    Expr(Expr),
}

/// Element of an array literal or argument list
#[derive(Debug, Clone, PartialEq)]
pub enum ListItem {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    Static(String),
    Computed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prop {
    KeyValue(PropKey, Expr),
    Shorthand(String),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProp {
    Static(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrowBody {
    Expr(Box<Expr>),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrowFn {
    pub params: Vec<String>,
    pub body: ArrowBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Template(Vec<TemplateChunk>),
    Bool(bool),
    Null,
    This,
    Ident(String),
    Array(Vec<ListItem>),
    Object(Vec<Prop>),
    Member {
        object: Box<Expr>,
        property: MemberProp,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<ListItem>,
        optional: bool,
    },
    Arrow(Rc<ArrowFn>),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Sequence(Vec<Expr>),
}

impl Expr {
    /// Valid left-hand side of an assignment
    pub fn is_assignable(&self) -> bool {
        match self {
            Expr::Ident(_) => true,
            Expr::Member { optional, .. } => !optional,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Const,
    Var,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Decl {
        kind: DeclKind,
        decls: Vec<(String, Option<Expr>)>,
    },
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Return(Option<Expr>),
    Block(Vec<Stmt>),
    Empty,
}

/// Parsed source: a statement list whose last expression is the result
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}
