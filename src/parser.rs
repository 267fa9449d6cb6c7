// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::lexer::*;
use crate::number::*;
use crate::*;

use core::str::FromStr;

use anyhow::{bail, Result};

/// Maximum nesting of sub-expressions accepted by the parser.
pub const MAX_NESTING_DEPTH: usize = 64;

#[derive(Clone)]
pub struct Parser<'source> {
    source: Source,
    lexer: Lexer<'source>,
    tok: Token,
    line: u32,
    end: u32,
    depth: usize,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source Source) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let tok = lexer.next_token()?;
        Ok(Self {
            source: source.clone(),
            lexer,
            tok,
            line: 0,
            end: 0,
            depth: 0,
        })
    }

    fn new_range(
        source: &'source Source,
        start: u32,
        end: u32,
        line: u32,
        col: u32,
        depth: usize,
    ) -> Result<Self> {
        let mut lexer = Lexer::new_range(source, start, end, line, col);
        let tok = lexer.next_token()?;
        Ok(Self {
            source: source.clone(),
            lexer,
            tok,
            line,
            end: start,
            depth,
        })
    }

    pub fn token_text(&self) -> &str {
        match self.tok.0 {
            TokenKind::Symbol | TokenKind::Number | TokenKind::Ident | TokenKind::Eof => {
                self.tok.1.text()
            }
            TokenKind::String => "",
        }
    }

    fn is_symbol(&self, s: &str) -> bool {
        self.tok.0 == TokenKind::Symbol && self.tok.1.text() == s
    }

    fn is_keyword(&self, kw: &str) -> bool {
        self.tok.0 == TokenKind::Ident && self.tok.1.text() == kw
    }

    pub fn next_token(&mut self) -> Result<()> {
        self.line = self.tok.1.line;
        self.end = self.tok.1.end;
        self.tok = self.lexer.next_token()?;
        Ok(())
    }

    fn error_here(&self, msg: &str) -> anyhow::Error {
        self.source.error(self.tok.1.line, self.tok.1.col, msg)
    }

    fn expect(&mut self, text: &str, context: &str) -> Result<()> {
        if self.tok.0 == TokenKind::Symbol && self.token_text() == text {
            self.next_token()
        } else {
            Err(self.error_here(&format!("expecting `{text}` {context}")))
        }
    }

    fn parse_ident(&mut self, context: &str) -> Result<Span> {
        if self.tok.0 != TokenKind::Ident {
            return Err(self.error_here(&format!("expecting identifier {context}")));
        }
        let span = self.tok.1.clone();
        self.next_token()?;
        Ok(span)
    }

    /// Parse a complete expression; anything left over is an error.
    pub fn parse_complete(&mut self) -> Result<Expr> {
        if self.tok.0 == TokenKind::Eof {
            bail!(self.error_here("empty expression"));
        }
        let expr = self.parse_expr()?;
        if self.tok.0 != TokenKind::Eof {
            bail!(self.error_here("unexpected token after expression"));
        }
        Ok(expr)
    }

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error_here("expression nesting too deep"));
        }
        let expr = self.parse_conditional_expr();
        self.depth -= 1;
        expr
    }

    fn parse_conditional_expr(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let cond = self.parse_or_expr()?;
        if !self.is_symbol("?") {
            return Ok(cond);
        }
        let mut span = self.tok.1.clone();
        span.start = start;
        self.next_token()?;
        let then = self.parse_expr()?;
        self.expect(":", "while parsing conditional expression")?;
        let otherwise = self.parse_expr()?;
        span.end = self.end;
        Ok(Expr::Conditional {
            span,
            cond: Ref::new(cond),
            then: Ref::new(then),
            otherwise: Ref::new(otherwise),
        })
    }

    fn parse_or_expr(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let mut expr = self.parse_and_expr()?;
        while self.is_symbol("||") {
            let mut span = self.tok.1.clone();
            span.start = start;
            self.next_token()?;
            let right = self.parse_and_expr()?;
            span.end = self.end;
            expr = Expr::LogicalExpr {
                span,
                op: LogicalOp::Or,
                lhs: Ref::new(expr),
                rhs: Ref::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_and_expr(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let mut expr = self.parse_equality_expr()?;
        while self.is_symbol("&&") {
            let mut span = self.tok.1.clone();
            span.start = start;
            self.next_token()?;
            let right = self.parse_equality_expr()?;
            span.end = self.end;
            expr = Expr::LogicalExpr {
                span,
                op: LogicalOp::And,
                lhs: Ref::new(expr),
                rhs: Ref::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_equality_expr(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let mut expr = self.parse_comparison_expr()?;

        loop {
            let mut span = self.tok.1.clone();
            span.start = start;
            let op = match self.token_text() {
                "==" => BoolOp::Eq,
                "!=" => BoolOp::Ne,
                _ => return Ok(expr),
            };
            self.next_token()?;
            let right = self.parse_comparison_expr()?;
            span.end = self.end;
            expr = Expr::BoolExpr {
                span,
                op,
                lhs: Ref::new(expr),
                rhs: Ref::new(right),
            };
        }
    }

    fn parse_comparison_expr(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let mut expr = self.parse_arith_expr()?;

        loop {
            let mut span = self.tok.1.clone();
            span.start = start;
            let op = match self.token_text() {
                "<" => BoolOp::Lt,
                "<=" => BoolOp::Le,
                ">" => BoolOp::Gt,
                ">=" => BoolOp::Ge,
                _ => return Ok(expr),
            };
            self.next_token()?;
            let right = self.parse_arith_expr()?;
            span.end = self.end;
            expr = Expr::BoolExpr {
                span,
                op,
                lhs: Ref::new(expr),
                rhs: Ref::new(right),
            };
        }
    }

    fn parse_arith_expr(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let mut expr = self.parse_mul_div_mod_expr()?;

        loop {
            let mut span = self.tok.1.clone();
            span.start = start;
            let op = match self.token_text() {
                "+" => ArithOp::Add,
                "-" => ArithOp::Sub,
                _ => return Ok(expr),
            };
            self.next_token()?;
            let right = self.parse_mul_div_mod_expr()?;
            span.end = self.end;
            expr = Expr::ArithExpr {
                span,
                op,
                lhs: Ref::new(expr),
                rhs: Ref::new(right),
            };
        }
    }

    fn parse_mul_div_mod_expr(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let mut expr = self.parse_unary_expr()?;

        loop {
            let mut span = self.tok.1.clone();
            span.start = start;
            let op = match self.token_text() {
                "*" => ArithOp::Mul,
                "/" => ArithOp::Div,
                "%" => ArithOp::Mod,
                _ => return Ok(expr),
            };
            self.next_token()?;
            let right = self.parse_unary_expr()?;
            span.end = self.end;
            expr = Expr::ArithExpr {
                span,
                op,
                lhs: Ref::new(expr),
                rhs: Ref::new(right),
            };
        }
    }

    fn parse_unary_expr(&mut self) -> Result<Expr> {
        let op = match self.token_text() {
            "!" if self.tok.0 == TokenKind::Symbol => UnaryOp::Not,
            "-" if self.tok.0 == TokenKind::Symbol => UnaryOp::Neg,
            _ => return self.parse_postfix_expr(),
        };

        let mut span = self.tok.1.clone();
        self.next_token()?;
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(self.error_here("expression nesting too deep"));
        }
        let expr = self.parse_unary_expr();
        self.depth -= 1;
        let expr = expr?;
        span.end = self.end;

        // Fold negative literals so that `-1` is a constant.
        if let (UnaryOp::Neg, Expr::Number { value, .. }) = (op, &expr) {
            return Ok(Expr::Number {
                value: value.neg(),
                span,
            });
        }

        Ok(Expr::Unary {
            span,
            op,
            expr: Ref::new(expr),
        })
    }

    fn parse_postfix_expr(&mut self) -> Result<Expr> {
        let start = self.tok.1.start;
        let mut term = self.parse_primary_expr()?;

        loop {
            let mut span = self.tok.1.clone();
            span.start = start;
            match self.token_text() {
                "." if self.tok.0 == TokenKind::Symbol => {
                    self.next_token()?;
                    if self.is_symbol("*") {
                        let item = self.tok.1.clone();
                        self.next_token()?;
                        let each = self.parse_splat_traversals(item, false)?;
                        span.end = self.end;
                        term = Expr::Splat {
                            span,
                            source: Ref::new(term),
                            each: Ref::new(each),
                        };
                    } else {
                        term = self.parse_dot_traversal(term, span)?;
                    }
                }
                "[" if self.tok.0 == TokenKind::Symbol => {
                    self.next_token()?;
                    if self.is_symbol("*") {
                        let item = self.tok.1.clone();
                        self.next_token()?;
                        self.expect("]", "after splat operator")?;
                        let each = self.parse_splat_traversals(item, true)?;
                        span.end = self.end;
                        term = Expr::Splat {
                            span,
                            source: Ref::new(term),
                            each: Ref::new(each),
                        };
                    } else {
                        let index = self.parse_expr()?;
                        self.expect("]", "while parsing index expression")?;
                        span.end = self.end;
                        term = Expr::Index {
                            span,
                            target: Ref::new(term),
                            index: Ref::new(index),
                        };
                    }
                }
                _ => return Ok(term),
            }
        }
    }

    // Handles `.name` and the legacy `.0`. The `.` has been consumed.
    fn parse_dot_traversal(&mut self, term: Expr, mut span: Span) -> Result<Expr> {
        match self.tok.0 {
            TokenKind::Ident => {
                let name = self.tok.1.clone();
                self.next_token()?;
                span.end = self.end;
                Ok(Expr::GetAttr {
                    span,
                    target: Ref::new(term),
                    name,
                })
            }
            TokenKind::Number => {
                let index = Self::read_number(self.tok.1.clone())?;
                self.next_token()?;
                span.end = self.end;
                Ok(Expr::Index {
                    span,
                    target: Ref::new(term),
                    index: Ref::new(index),
                })
            }
            _ => Err(self.error_here("expecting attribute name after `.`")),
        }
    }

    // Traversals applied to every element of a splat. An attribute-only
    // splat (`.*`) stops at the first index traversal.
    fn parse_splat_traversals(&mut self, item: Span, allow_index: bool) -> Result<Expr> {
        let start = self.tok.1.start;
        let mut each = Expr::SplatItem(item);
        loop {
            let mut span = self.tok.1.clone();
            span.start = start;
            if self.is_symbol(".") {
                let mut ahead = self.lexer.clone();
                if ahead.next_token()?.1.text() == "*" {
                    return Ok(each);
                }
                self.next_token()?;
                each = self.parse_dot_traversal(each, span)?;
            } else if self.is_symbol("[") && allow_index {
                let mut ahead = self.lexer.clone();
                if ahead.next_token()?.1.text() == "*" {
                    return Ok(each);
                }
                self.next_token()?;
                let index = self.parse_expr()?;
                self.expect("]", "while parsing index expression")?;
                span.end = self.end;
                each = Expr::Index {
                    span,
                    target: Ref::new(each),
                    index: Ref::new(index),
                };
            } else {
                return Ok(each);
            }
        }
    }

    fn read_number(span: Span) -> Result<Expr> {
        match Number::from_str(span.text()) {
            Ok(value) => Ok(Expr::Number { span, value }),
            Err(_) => bail!(span.error("could not parse number")),
        }
    }

    fn parse_primary_expr(&mut self) -> Result<Expr> {
        let span = self.tok.1.clone();
        match self.tok.0 {
            TokenKind::Number => {
                self.next_token()?;
                Self::read_number(span)
            }
            TokenKind::String => {
                self.next_token()?;
                self.parse_template(span)
            }
            TokenKind::Ident => {
                self.next_token()?;
                match span.text() {
                    "null" => Ok(Expr::Null(span)),
                    "true" => Ok(Expr::Bool { span, value: true }),
                    "false" => Ok(Expr::Bool { span, value: false }),
                    _ if self.is_symbol("(") => self.parse_call(span),
                    _ => Ok(Expr::Var(span)),
                }
            }
            TokenKind::Symbol => match self.token_text() {
                "(" => {
                    self.next_token()?;
                    let expr = self.parse_expr()?;
                    self.expect(")", "while parsing parenthesized expression")?;
                    Ok(expr)
                }
                "[" => self.parse_tuple_or_for(),
                "{" => self.parse_object_or_for(),
                _ => Err(self.error_here("expecting expression")),
            },
            TokenKind::Eof => Err(self.error_here("unexpected end of expression")),
        }
    }

    fn parse_call(&mut self, name: Span) -> Result<Expr> {
        let mut span = name.clone();
        self.expect("(", "while parsing call expr")?;
        let mut args = vec![];
        let mut expand_final = false;
        while !self.is_symbol(")") {
            if self.tok.0 == TokenKind::Eof {
                break;
            }
            args.push(Ref::new(self.parse_expr()?));
            if self.is_symbol("...") {
                self.next_token()?;
                expand_final = true;
                break;
            }
            if !self.is_symbol(",") {
                break;
            }
            self.next_token()?;
        }
        self.expect(")", "while parsing call expr")?;
        span.end = self.end;
        Ok(Expr::Call {
            span,
            name,
            args,
            expand_final,
        })
    }

    fn parse_tuple_or_for(&mut self) -> Result<Expr> {
        let mut span = self.tok.1.clone();
        self.expect("[", "while parsing tuple")?;

        if self.is_keyword("for") {
            return self.parse_for(span, "]");
        }

        let mut items = vec![];
        while !self.is_symbol("]") {
            if self.tok.0 == TokenKind::Eof {
                break;
            }
            items.push(Ref::new(self.parse_expr()?));
            if !self.is_symbol(",") {
                break;
            }
            self.next_token()?;
        }
        self.expect("]", "while parsing tuple")?;
        span.end = self.end;
        Ok(Expr::Tuple { span, items })
    }

    fn parse_object_or_for(&mut self) -> Result<Expr> {
        let mut span = self.tok.1.clone();
        self.expect("{", "while parsing object")?;

        if self.is_keyword("for") {
            return self.parse_for(span, "}");
        }

        let mut fields = vec![];
        while !self.is_symbol("}") {
            if self.tok.0 == TokenKind::Eof {
                break;
            }

            // A bare identifier key is a literal name; `(expr)` forces evaluation.
            let parenthesized = self.is_symbol("(");
            let key = match self.parse_expr()? {
                Expr::Var(s) if !parenthesized => Expr::String {
                    value: s.text().into(),
                    span: s,
                },
                key => key,
            };

            if self.is_symbol("=") || self.is_symbol(":") {
                self.next_token()?;
            } else {
                bail!(self.error_here("expecting `=` or `:` after object key"));
            }
            let value = self.parse_expr()?;
            fields.push((Ref::new(key), Ref::new(value)));

            // Items are separated by newlines or commas.
            if self.is_symbol(",") {
                self.next_token()?;
            }
        }
        self.expect("}", "while parsing object")?;
        span.end = self.end;
        Ok(Expr::Object { span, fields })
    }

    fn parse_for(&mut self, mut span: Span, close: &str) -> Result<Expr> {
        // Skip `for`.
        self.next_token()?;
        let first = self.parse_ident("in for expression")?;
        let (key_var, value_var) = if self.is_symbol(",") {
            self.next_token()?;
            (Some(first), self.parse_ident("in for expression")?)
        } else {
            (None, first)
        };

        if !self.is_keyword("in") {
            bail!(self.error_here("expecting `in` in for expression"));
        }
        self.next_token()?;
        let collection = Ref::new(self.parse_expr()?);
        self.expect(":", "in for expression")?;

        if close == "]" {
            let value = Ref::new(self.parse_expr()?);
            let cond = self.parse_for_cond()?;
            self.expect("]", "at end of for expression")?;
            span.end = self.end;
            return Ok(Expr::ForTuple {
                span,
                key_var,
                value_var,
                collection,
                value,
                cond,
            });
        }

        let key = Ref::new(self.parse_expr()?);
        self.expect("=>", "in object for expression")?;
        let value = Ref::new(self.parse_expr()?);
        let group = if self.is_symbol("...") {
            self.next_token()?;
            true
        } else {
            false
        };
        let cond = self.parse_for_cond()?;
        self.expect("}", "at end of for expression")?;
        span.end = self.end;
        Ok(Expr::ForObject {
            span,
            key_var,
            value_var,
            collection,
            key,
            value,
            group,
            cond,
        })
    }

    fn parse_for_cond(&mut self) -> Result<Option<ExprRef>> {
        if self.is_keyword("if") {
            self.next_token()?;
            Ok(Some(Ref::new(self.parse_expr()?)))
        } else {
            Ok(None)
        }
    }

    // Resolve escapes and split the template into literal text and
    // interpolations. Interpolations are parsed in place by a parser over
    // the same source, so spans stay accurate.
    fn parse_template(&mut self, span: Span) -> Result<Expr> {
        let source = self.source.clone();
        let text = &source.contents()[span.start as usize..span.end as usize];
        let mut parts = vec![];
        let mut literal = String::new();
        let mut chars = text.char_indices().peekable();
        let (mut line, mut col) = (span.line, span.col);

        while let Some((i, ch)) = chars.next() {
            match ch {
                '\\' => {
                    let esc = chars.next().map(|(_, c)| c).unwrap_or('\\');
                    let c = match esc {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        'u' | 'U' => {
                            let n = if esc == 'u' { 4 } else { 8 };
                            let mut hex = String::new();
                            for _ in 0..n {
                                if let Some((_, h)) = chars.next() {
                                    hex.push(h);
                                }
                            }
                            col += n as u32;
                            match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                                Some(c) => c,
                                None => bail!(source.error(line, col, "invalid unicode code point")),
                            }
                        }
                        c => c,
                    };
                    col += 2;
                    literal.push(c);
                }
                '$' if text[i..].starts_with("$${") => {
                    chars.next();
                    chars.next();
                    col += 3;
                    literal.push_str("${");
                }
                '$' if text[i..].starts_with("${") => {
                    chars.next();
                    col += 2;
                    if !literal.is_empty() {
                        parts.push(TemplatePart::Literal(core::mem::take(&mut literal).into()));
                    }

                    let start = span.start + i as u32 + 2;
                    let mut parser =
                        Parser::new_range(&source, start, span.end, line, col, self.depth)?;
                    let expr = parser.parse_expr()?;
                    if !parser.is_symbol("}") {
                        bail!(parser.error_here("expecting `}` to close interpolation"));
                    }
                    parts.push(TemplatePart::Interpolation(Ref::new(expr)));

                    let close = parser.tok.1.clone();
                    let resume = (close.end - span.start) as usize;
                    while let Some(&(j, _)) = chars.peek() {
                        if j >= resume {
                            break;
                        }
                        chars.next();
                    }
                    line = close.line;
                    col = close.col + 1;
                }
                _ => {
                    col += 1;
                    literal.push(ch);
                }
            }
        }

        if parts.is_empty() {
            return Ok(Expr::String {
                span,
                value: literal.into(),
            });
        }
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal.into()));
        }
        Ok(Expr::Template { span, parts })
    }
}
