// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::Rc;

use core::cmp;
use core::fmt::{self, Debug, Formatter};
use core::iter::Peekable;
use core::str::CharIndices;

use anyhow::{anyhow, bail, Result};

#[derive(Clone)]
struct SourceInternal {
    pub file: String,
    pub contents: String,
    pub lines: Vec<(u32, u32)>,
}

/// Text of one expression together with the name it is reported under
/// (for example `rule.s3_public_acl.condition[0]`).
#[derive(Clone)]
pub struct Source {
    src: Rc<SourceInternal>,
}

impl cmp::PartialEq for Source {
    fn eq(&self, other: &Source) -> bool {
        Rc::ptr_eq(&self.src, &other.src)
    }
}

impl cmp::Eq for Source {}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        self.src.file.fmt(f)
    }
}

impl Source {
    pub fn from_contents(file: String, contents: String) -> Result<Source> {
        let max_size = u32::MAX as usize - 2; // Account for rows, cols possibly starting at 1, EOF etc.
        if contents.len() > max_size {
            bail!("{file} exceeds maximum allowed expression size {max_size}");
        }
        let mut lines = vec![];
        let mut prev_ch = ' ';
        let mut prev_pos = 0u32;
        let mut start = 0u32;
        for (i, ch) in contents.char_indices() {
            if ch == '\n' {
                let end = match prev_ch {
                    '\r' => prev_pos,
                    _ => i as u32,
                };
                lines.push((start, end));
                start = i as u32 + 1;
            }
            prev_ch = ch;
            prev_pos = i as u32;
        }

        if (start as usize) < contents.len() {
            lines.push((start, contents.len() as u32));
        } else if contents.is_empty() {
            lines.push((0, 0));
        } else {
            let s = contents.len() as u32;
            lines.push((s, s));
        }
        Ok(Self {
            src: Rc::new(SourceInternal {
                file,
                contents,
                lines,
            }),
        })
    }

    pub fn file(&self) -> &String {
        &self.src.file
    }

    pub fn contents(&self) -> &String {
        &self.src.contents
    }

    pub fn line(&self, idx: u32) -> &str {
        let idx = idx as usize;
        if idx < self.src.lines.len() {
            let (start, end) = self.src.lines[idx];
            &self.src.contents[start as usize..end as usize]
        } else {
            ""
        }
    }

    pub fn message(&self, line: u32, col: u32, kind: &str, msg: &str) -> String {
        if line == 0 || line as usize > self.src.lines.len() {
            return format!("{}: invalid line {} specified", self.src.file, line);
        }

        let line_str = format!("{line}");
        let line_num_width = line_str.len() + 1;
        let col_spaces = col.saturating_sub(1) as usize;

        format!(
            "\n--> {}:{}:{}\n{:<line_num_width$}|\n\
             {:<line_num_width$}| {}\n\
             {:<line_num_width$}| {:<col_spaces$}^\n\
             {}: {}",
            self.src.file,
            line,
            col,
            "",
            line,
            self.line(line - 1),
            "",
            "",
            kind,
            msg
        )
    }

    pub fn error(&self, line: u32, col: u32, msg: &str) -> anyhow::Error {
        anyhow!(self.message(line, col, "error", msg))
    }
}

#[derive(Clone)]
pub struct Span {
    pub source: Source,
    pub line: u32,
    pub col: u32,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn text(&self) -> &str {
        &self.source.contents()[self.start as usize..self.end as usize]
    }

    pub fn message(&self, kind: &str, msg: &str) -> String {
        self.source.message(self.line, self.col, kind, msg)
    }

    pub fn error(&self, msg: &str) -> anyhow::Error {
        self.source.error(self.line, self.col, msg)
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let t = self.text().escape_debug().to_string();
        let max = 32;
        let (txt, trailer) = match t.char_indices().nth(max) {
            Some((end, _)) => (&t[0..end], "..."),
            None => (t.as_str(), ""),
        };

        f.write_fmt(format_args!(
            "{}:{}:{}:{}, \"{}{}\"",
            self.line, self.col, self.start, self.end, txt, trailer
        ))
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
    Symbol,
    /// Contents of a quoted template, without the quotes. Escapes and
    /// interpolations are resolved by the parser.
    String,
    Number,
    Ident,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token(pub TokenKind, pub Span);

#[derive(Clone)]
pub struct Lexer<'source> {
    source: Source,
    iter: Peekable<CharIndices<'source>>,
    base: usize,
    end: usize,
    line: u32,
    col: u32,
    after_dot: bool,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source Source) -> Self {
        Self::new_range(source, 0, source.contents().len() as u32, 1, 1)
    }

    /// Lex only `start..end` of the source; used for template interpolations.
    pub fn new_range(source: &'source Source, start: u32, end: u32, line: u32, col: u32) -> Self {
        let (start, end) = (start as usize, end as usize);
        Self {
            source: source.clone(),
            iter: source.contents()[start..end].char_indices().peekable(),
            base: start,
            end,
            line,
            col,
            after_dot: false,
        }
    }

    fn peek(&mut self) -> (usize, char) {
        match self.iter.peek() {
            Some((index, chr)) => (*index + self.base, *chr),
            _ => (self.end, '\x00'),
        }
    }

    fn peekahead(&mut self, n: usize) -> (usize, char) {
        match self.iter.clone().nth(n) {
            Some((index, chr)) => (index + self.base, chr),
            _ => (self.end, '\x00'),
        }
    }

    // Consume one character, tracking line and column.
    fn bump(&mut self) -> char {
        match self.iter.next() {
            Some((_, '\n')) => {
                self.line += 1;
                self.col = 1;
                '\n'
            }
            Some((_, ch)) => {
                self.col += 1;
                ch
            }
            None => '\x00',
        }
    }

    fn make_token(&self, kind: TokenKind, line: u32, col: u32, start: usize, end: usize) -> Token {
        Token(
            kind,
            Span {
                source: self.source.clone(),
                line,
                col,
                start: start as u32,
                end: end as u32,
            },
        )
    }

    fn read_ident(&mut self) -> Result<Token> {
        let (start, _) = self.peek();
        let (line, col) = (self.line, self.col);
        loop {
            let ch = self.peek().1;
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.peek().0;
        Ok(self.make_token(TokenKind::Ident, line, col, start, end))
    }

    fn read_digits(&mut self) {
        while self.peek().1.is_ascii_digit() {
            self.bump();
        }
    }

    // See https://www.json.org/json-en.html for number's grammar.
    // After a `.` only digits are read so that `list.0.name` is a legacy
    // index traversal rather than the number `0.`.
    fn read_number(&mut self) -> Result<Token> {
        let (start, _) = self.peek();
        let (line, col) = (self.line, self.col);
        self.read_digits();

        if !self.after_dot {
            // . must be followed by at least 1 digit.
            if self.peek().1 == '.' && self.peekahead(1).1.is_ascii_digit() {
                self.bump();
                self.read_digits();
            }

            let ch = self.peek().1;
            if ch == 'e' || ch == 'E' {
                self.bump();
                if matches!(self.peek().1, '+' | '-') {
                    self.bump();
                }
                if !self.peek().1.is_ascii_digit() {
                    return Err(self.source.error(self.line, self.col, "invalid number exponent"));
                }
                self.read_digits();
            }
        }

        let ch = self.peek().1;
        if ch == '_' || ch.is_ascii_alphabetic() {
            return Err(self.source.error(self.line, self.col, "invalid number"));
        }

        let end = self.peek().0;
        Ok(self.make_token(TokenKind::Number, line, col, start, end))
    }

    // Consume a template body up to and including the closing quote.
    fn skip_template(&mut self, line: u32, col: u32) -> Result<()> {
        loop {
            match self.peek().1 {
                '"' => {
                    self.bump();
                    return Ok(());
                }
                '\x00' | '\n' => return Err(self.source.error(line, col, "unterminated string")),
                '\\' => {
                    self.bump();
                    let (esc_line, esc_col) = (self.line, self.col);
                    match self.bump() {
                        '"' | '\\' | 'n' | 'r' | 't' => (),
                        'u' => self.skip_hex_digits(4, esc_line, esc_col)?,
                        'U' => self.skip_hex_digits(8, esc_line, esc_col)?,
                        _ => {
                            return Err(self.source.error(
                                esc_line,
                                esc_col - 1,
                                "invalid escape sequence",
                            ))
                        }
                    }
                }
                '$' if self.peekahead(1).1 == '$' && self.peekahead(2).1 == '{' => {
                    self.bump();
                    self.bump();
                    self.bump();
                }
                '$' if self.peekahead(1).1 == '{' => {
                    let (l, c) = (self.line, self.col);
                    self.bump();
                    self.bump();
                    self.skip_interpolation(l, c)?;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn skip_hex_digits(&mut self, n: usize, line: u32, col: u32) -> Result<()> {
        for _ in 0..n {
            if !self.peek().1.is_ascii_hexdigit() {
                return Err(self.source.error(line, col, "invalid unicode escape sequence"));
            }
            self.bump();
        }
        Ok(())
    }

    // Consume an interpolation body up to and including the matching `}`.
    fn skip_interpolation(&mut self, line: u32, col: u32) -> Result<()> {
        let mut depth = 1usize;
        loop {
            match self.peek().1 {
                '\x00' => return Err(self.source.error(line, col, "unterminated interpolation")),
                '"' => {
                    let (l, c) = (self.line, self.col);
                    self.bump();
                    self.skip_template(l, c)?;
                }
                '{' => {
                    depth += 1;
                    self.bump();
                }
                '}' => {
                    depth -= 1;
                    self.bump();
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn read_string(&mut self) -> Result<Token> {
        let (line, col) = (self.line, self.col);
        self.bump();
        let start = self.peek().0;
        let (content_line, content_col) = (self.line, self.col);
        self.skip_template(line, col)?;
        // The closing quote has been consumed.
        let end = self.peek().0 - 1;
        Ok(self.make_token(TokenKind::String, content_line, content_col, start, end))
    }

    fn skip_ws(&mut self) -> Result<()> {
        loop {
            match self.peek().1 {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '#' => self.skip_line_comment(),
                '/' if self.peekahead(1).1 == '/' => self.skip_line_comment(),
                '/' if self.peekahead(1).1 == '*' => {
                    let (line, col) = (self.line, self.col);
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek().1 {
                            '*' if self.peekahead(1).1 == '/' => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            '\x00' => {
                                return Err(self.source.error(line, col, "unterminated comment"))
                            }
                            _ => {
                                self.bump();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn skip_line_comment(&mut self) {
        while !matches!(self.peek().1, '\n' | '\x00') {
            self.bump();
        }
    }

    fn read_symbol(&mut self, len: usize) -> Token {
        let (start, _) = self.peek();
        let (line, col) = (self.line, self.col);
        for _ in 0..len {
            self.bump();
        }
        let end = self.peek().0;
        self.make_token(TokenKind::Symbol, line, col, start, end)
    }

    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_ws()?;

        let (start, chr) = self.peek();
        let next = self.peekahead(1).1;

        let tok = match chr {
            // grouping characters
            '{' | '}' | '[' | ']' | '(' | ')' |
            // arith operator
            '+' | '-' | '*' | '/' | '%' |
            // separators
            ',' | ':' | '?' => self.read_symbol(1),
            '.' if next == '.' && self.peekahead(2).1 == '.' => self.read_symbol(3),
            '.' => self.read_symbol(1),
            // == =>
            '=' if next == '=' || next == '>' => self.read_symbol(2),
            '=' => self.read_symbol(1),
            // != <= >=
            '!' | '<' | '>' if next == '=' => self.read_symbol(2),
            '!' | '<' | '>' => self.read_symbol(1),
            '&' if next == '&' => self.read_symbol(2),
            '|' if next == '|' => self.read_symbol(2),
            '"' => self.read_string()?,
            '\x00' => self.make_token(TokenKind::Eof, self.line, self.col, start, start),
            _ if chr.is_ascii_digit() => self.read_number()?,
            _ if chr.is_ascii_alphabetic() || chr == '_' => self.read_ident()?,
            _ => return Err(self.source.error(self.line, self.col, "invalid character")),
        };

        self.after_dot = tok.0 == TokenKind::Symbol && tok.1.text() == ".";
        Ok(tok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Result<Vec<(TokenKind, String)>> {
        let source = Source::from_contents("test".to_string(), text.to_string())?;
        let mut lexer = Lexer::new(&source);
        let mut tokens = vec![];
        loop {
            let tok = lexer.next_token()?;
            if tok.0 == TokenKind::Eof {
                break;
            }
            tokens.push((tok.0, tok.1.text().to_string()));
        }
        Ok(tokens)
    }

    #[test]
    fn operators_and_identifiers() -> Result<()> {
        let toks = tokens("self.acl == \"public-read\" && !x || a >= 1.5e2")?;
        let texts: Vec<&str> = toks.iter().map(|t| t.1.as_str()).collect();
        assert_eq!(
            texts,
            vec!["self", ".", "acl", "==", "public-read", "&&", "!", "x", "||", "a", ">=", "1.5e2"]
        );
        assert_eq!(toks[4].0, TokenKind::String);
        assert_eq!(toks[11].0, TokenKind::Number);
        Ok(())
    }

    #[test]
    fn debug_truncates_on_char_boundary() -> Result<()> {
        let text = format!("\"{}\"", "€".repeat(40));
        let source = Source::from_contents("test".to_string(), text)?;
        let tok = Lexer::new(&source).next_token()?;
        let shown = format!("{:?}", tok.1);
        assert!(shown.ends_with(&format!("\"{}...\"", "€".repeat(32))));

        let source = Source::from_contents("test".to_string(), "\"ab\"".to_string())?;
        let tok = Lexer::new(&source).next_token()?;
        assert!(format!("{:?}", tok.1).ends_with("\"ab\""));
        Ok(())
    }

    #[test]
    fn legacy_index_after_dot() -> Result<()> {
        let toks = tokens("a.0.b")?;
        let texts: Vec<&str> = toks.iter().map(|t| t.1.as_str()).collect();
        assert_eq!(texts, vec!["a", ".", "0", ".", "b"]);
        Ok(())
    }

    #[test]
    fn template_with_nested_quotes() -> Result<()> {
        let toks = tokens(r#""a-${lower("B}")}-c" x"#)?;
        assert_eq!(toks[0], (TokenKind::String, r#"a-${lower("B}")}-c"#.to_string()));
        assert_eq!(toks[1].1, "x");
        Ok(())
    }

    #[test]
    fn comments_and_ellipsis() -> Result<()> {
        let toks = tokens("f(a...) # trailing\n// line\n/* block */ =>")?;
        let texts: Vec<&str> = toks.iter().map(|t| t.1.as_str()).collect();
        assert_eq!(texts, vec!["f", "(", "a", "...", ")", "=>"]);
        Ok(())
    }

    #[test]
    fn errors() {
        assert!(tokens("\"open").is_err());
        assert!(tokens("a & b").is_err());
        assert!(tokens("\"bad \\q\"").is_err());
        assert!(tokens("12abc").is_err());
        assert!(tokens("\"${ x \"").is_err());
    }
}
