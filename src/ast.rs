// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::ParseError;
use crate::lexer::*;
use crate::number::Number;
use crate::parser::Parser;
use crate::*;

use core::{cmp, fmt, ops::Deref};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BoolOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum UnaryOp {
    Not,
    Neg,
}

pub struct NodeRef<T> {
    r: Rc<T>,
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self { r: self.r.clone() }
    }
}

impl<T: fmt::Debug> fmt::Debug for NodeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.r.as_ref().fmt(f)
    }
}

impl<T> cmp::PartialEq for NodeRef<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::as_ptr(&self.r).eq(&Rc::as_ptr(&other.r))
    }
}

impl<T> cmp::Eq for NodeRef<T> {}

impl<T> Deref for NodeRef<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.r
    }
}

impl<T> AsRef<T> for NodeRef<T> {
    fn as_ref(&self) -> &T {
        self.deref()
    }
}

impl<T> NodeRef<T> {
    pub fn new(t: T) -> Self {
        Self { r: Rc::new(t) }
    }
}

pub type Ref<T> = NodeRef<T>;

pub type ExprRef = Ref<Expr>;

#[derive(Debug)]
pub enum TemplatePart {
    Literal(Rc<str>),
    Interpolation(ExprRef),
}

#[derive(Debug)]
pub enum Expr {
    Null(Span),

    Bool {
        span: Span,
        value: bool,
    },

    Number {
        span: Span,
        value: Number,
    },

    // A quoted string without interpolations, escapes already resolved.
    String {
        span: Span,
        value: Rc<str>,
    },

    Template {
        span: Span,
        parts: Vec<TemplatePart>,
    },

    Var(Span),

    GetAttr {
        span: Span,
        target: ExprRef,
        name: Span,
    },

    Index {
        span: Span,
        target: ExprRef,
        index: ExprRef,
    },

    // `source[*].each` / `source.*.each`. `each` is built on top of
    // `SplatItem`, which evaluates to the current element.
    Splat {
        span: Span,
        source: ExprRef,
        each: ExprRef,
    },

    SplatItem(Span),

    Call {
        span: Span,
        name: Span,
        args: Vec<ExprRef>,
        expand_final: bool,
    },

    Unary {
        span: Span,
        op: UnaryOp,
        expr: ExprRef,
    },

    ArithExpr {
        span: Span,
        op: ArithOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },

    BoolExpr {
        span: Span,
        op: BoolOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },

    LogicalExpr {
        span: Span,
        op: LogicalOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },

    Conditional {
        span: Span,
        cond: ExprRef,
        then: ExprRef,
        otherwise: ExprRef,
    },

    Tuple {
        span: Span,
        items: Vec<ExprRef>,
    },

    Object {
        span: Span,
        fields: Vec<(ExprRef, ExprRef)>,
    },

    ForTuple {
        span: Span,
        key_var: Option<Span>,
        value_var: Span,
        collection: ExprRef,
        value: ExprRef,
        cond: Option<ExprRef>,
    },

    ForObject {
        span: Span,
        key_var: Option<Span>,
        value_var: Span,
        collection: ExprRef,
        key: ExprRef,
        value: ExprRef,
        group: bool,
        cond: Option<ExprRef>,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        use Expr::*;
        match self {
            Null(span) | Var(span) | SplatItem(span) => span,
            Bool { span, .. }
            | Number { span, .. }
            | String { span, .. }
            | Template { span, .. }
            | GetAttr { span, .. }
            | Index { span, .. }
            | Splat { span, .. }
            | Call { span, .. }
            | Unary { span, .. }
            | ArithExpr { span, .. }
            | BoolExpr { span, .. }
            | LogicalExpr { span, .. }
            | Conditional { span, .. }
            | Tuple { span, .. }
            | Object { span, .. }
            | ForTuple { span, .. }
            | ForObject { span, .. } => span,
        }
    }

    /// Direct sub-expressions, in source order.
    pub fn children(&self) -> Vec<&ExprRef> {
        use Expr::*;
        match self {
            Null(_) | Bool { .. } | Number { .. } | String { .. } | Var(_) | SplatItem(_) => {
                vec![]
            }
            Template { parts, .. } => parts
                .iter()
                .filter_map(|p| match p {
                    TemplatePart::Interpolation(e) => Some(e),
                    TemplatePart::Literal(_) => None,
                })
                .collect(),
            GetAttr { target, .. } => vec![target],
            Index { target, index, .. } => vec![target, index],
            Splat { source, each, .. } => vec![source, each],
            Call { args, .. } => args.iter().collect(),
            Unary { expr, .. } => vec![expr],
            ArithExpr { lhs, rhs, .. } | BoolExpr { lhs, rhs, .. } | LogicalExpr { lhs, rhs, .. } => {
                vec![lhs, rhs]
            }
            Conditional {
                cond,
                then,
                otherwise,
                ..
            } => vec![cond, then, otherwise],
            Tuple { items, .. } => items.iter().collect(),
            Object { fields, .. } => fields.iter().flat_map(|(k, v)| [k, v]).collect(),
            ForTuple {
                collection,
                value,
                cond,
                ..
            } => {
                let mut v = vec![collection, value];
                v.extend(cond.iter());
                v
            }
            ForObject {
                collection,
                key,
                value,
                cond,
                ..
            } => {
                let mut v = vec![collection, key, value];
                v.extend(cond.iter());
                v
            }
        }
    }
}

/// A parsed expression together with its source text.
#[derive(Debug, Clone)]
pub struct Expression {
    text: Rc<str>,
    expr: ExprRef,
}

impl Expression {
    /// Parse `text`. `name` identifies the expression in error messages.
    pub fn parse(name: &str, text: &str) -> Result<Expression, ParseError> {
        let source = Source::from_contents(name.to_string(), text.to_string())
            .map_err(|e| ParseError::new(e.to_string()))?;
        let mut parser = Parser::new(&source).map_err(|e| ParseError::new(e.to_string()))?;
        let expr = parser
            .parse_complete()
            .map_err(|e| ParseError::new(e.to_string()))?;
        Ok(Expression {
            text: text.into(),
            expr: Ref::new(expr),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> &ExprRef {
        &self.expr
    }

    /// Whether the expression contains a call to `fcn` anywhere.
    pub fn calls_function(&self, fcn: &str) -> bool {
        let mut stack = vec![&self.expr];
        while let Some(e) = stack.pop() {
            if let Expr::Call { name, .. } = e.as_ref() {
                if name.text() == fcn {
                    return true;
                }
            }
            stack.extend(e.children());
        }
        false
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
