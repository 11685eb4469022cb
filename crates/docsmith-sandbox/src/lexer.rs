//! Tokenizer for the script language.
//!
//! Produces a flat token stream with explicit `Newline`, `Indent` and
//! `Dedent` tokens. Newlines inside brackets and after a trailing backslash
//! are joined, comments and blank lines are dropped.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// Unprocessed body of an f-string; `raw` records an `rf` prefix.
    FString {
        body: String,
        raw: bool,
    },
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

/// Operators, longest first so greedy matching works.
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "+=", "-=",
    "*=", "/=", "%=", "&=", "|=", "^=", "@=", "->", ":=", "+", "-", "*", "/", "%", "&", "|", "^",
    "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=", "@",
];

const TAB_WIDTH: usize = 8;

pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    /// Open indentation levels as (width with tab stops of 8, width with
    /// tabs counted as one column).
    indents: Vec<(usize, usize)>,
    brackets: Vec<(char, u32, u32)>,
    tokens: Vec<Token>,
    at_line_start: bool,
}

impl Lexer {
    fn new(source: &str) -> Self {
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            indents: vec![(0, 0)],
            brackets: Vec::new(),
            tokens: Vec::new(),
            at_line_start: true,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.column)
    }

    fn push(&mut self, kind: TokenKind, line: u32, column: u32) {
        self.tokens.push(Token { kind, line, column });
    }

    fn last_is_newline(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline) | Some(TokenKind::Indent) | Some(TokenKind::Dedent)
        )
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        loop {
            if self.at_line_start && self.brackets.is_empty() {
                self.at_line_start = false;
                if !self.indentation()? {
                    continue;
                }
            }
            let Some(c) = self.peek() else { break };
            match c {
                ' ' | '\t' | '\x0c' => {
                    self.advance();
                }
                '\r' | '\n' => self.newline(),
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n' && c != '\r') {
                        self.advance();
                    }
                }
                '\\' => {
                    self.advance();
                    match self.peek() {
                        Some('\n') => {
                            self.advance();
                        }
                        Some('\r') => {
                            self.advance();
                            if self.peek() == Some('\n') {
                                self.advance();
                            }
                        }
                        _ => return Err(self.error("unexpected character after line continuation")),
                    }
                }
                '0'..='9' => self.number()?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number()?,
                '"' | '\'' => self.string(false, false)?,
                c if c == '_' || c.is_alphabetic() => self.name_or_prefixed_string()?,
                _ => self.operator()?,
            }
        }

        if let Some(&(open, line, column)) = self.brackets.last() {
            return Err(ParseError::new(format!("'{open}' was never closed"), line, column));
        }
        let (line, column) = (self.line, self.column);
        if !self.last_is_newline() {
            self.push(TokenKind::Newline, line, column);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, line, column);
        }
        self.push(TokenKind::Eof, line, column);
        Ok(self.tokens)
    }

    fn newline(&mut self) {
        let (line, column) = (self.line, self.column);
        if self.advance() == Some('\r') && self.peek() == Some('\n') {
            self.advance();
        } else if self.chars.get(self.pos - 1) == Some(&'\r') {
            // Lone carriage return ends a line too.
            self.line += 1;
            self.column = 1;
        }
        if self.brackets.is_empty() {
            if !self.last_is_newline() {
                self.push(TokenKind::Newline, line, column);
            }
            self.at_line_start = true;
        }
    }

    /// Measure leading whitespace and emit indent tokens. Returns `false`
    /// for blank or comment-only lines, which carry no tokens.
    fn indentation(&mut self) -> Result<bool, ParseError> {
        let mut width = 0;
        let mut alt = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => {
                    width += 1;
                    alt += 1;
                }
                '\t' => {
                    width = (width / TAB_WIDTH + 1) * TAB_WIDTH;
                    alt += 1;
                }
                '\x0c' => {
                    width = 0;
                    alt = 0;
                }
                _ => break,
            }
            self.advance();
        }
        match self.peek() {
            None => return Ok(true),
            Some('#') => {
                while self.peek().is_some_and(|c| c != '\n' && c != '\r') {
                    self.advance();
                }
                if self.peek().is_some() {
                    self.newline_blank();
                }
                return Ok(false);
            }
            Some('\n') | Some('\r') => {
                self.newline_blank();
                return Ok(false);
            }
            _ => {}
        }

        // The level must compare the same way whether a tab is a tab stop
        // or a single column; otherwise the meaning depends on tab size.
        let inconsistent = |line, column| {
            ParseError::new("inconsistent use of tabs and spaces in indentation", line, column)
        };
        let (current, current_alt) = self.indents.last().copied().unwrap_or((0, 0));
        let (line, column) = (self.line, self.column);
        if width > current {
            if alt <= current_alt {
                return Err(inconsistent(line, column));
            }
            self.indents.push((width, alt));
            self.push(TokenKind::Indent, line, column);
        } else if width < current {
            while self.indents.last().is_some_and(|&(w, _)| w > width) {
                self.indents.pop();
                self.push(TokenKind::Dedent, line, column);
            }
            match self.indents.last() {
                Some(&(w, a)) if w == width => {
                    if a != alt {
                        return Err(inconsistent(line, column));
                    }
                }
                _ => {
                    return Err(ParseError::new(
                        "unindent does not match any outer indentation level",
                        line,
                        column,
                    ));
                }
            }
        } else if alt != current_alt {
            return Err(inconsistent(line, column));
        }
        Ok(true)
    }

    fn newline_blank(&mut self) {
        if self.advance() == Some('\r') {
            if self.peek() == Some('\n') {
                self.advance();
            } else {
                self.line += 1;
                self.column = 1;
            }
        }
        self.at_line_start = true;
    }

    fn number(&mut self) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column);
        let mut text = String::new();

        if self.peek() == Some('0')
            && let Some(radix) = match self.peek_at(1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            }
        {
            self.advance();
            self.advance();
            while let Some(c) = self.peek() {
                if c == '_' {
                    self.advance();
                } else if c.is_digit(radix) {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            if self.peek().is_some_and(|c| c.is_alphanumeric()) || text.is_empty() {
                return Err(ParseError::new("invalid integer literal", line, column));
            }
            let value = i64::from_str_radix(&text, radix)
                .map_err(|_| ParseError::new("integer literal is too large", line, column))?;
            self.push(TokenKind::Int(value), line, column);
            return Ok(());
        }

        let mut is_float = false;
        self.digits(&mut text);
        if self.peek() == Some('.') {
            is_float = true;
            text.push('.');
            self.advance();
            self.digits(&mut text);
        }
        if matches!(self.peek(), Some('e' | 'E'))
            && (self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
                || (matches!(self.peek_at(1), Some('+' | '-'))
                    && self.peek_at(2).is_some_and(|c| c.is_ascii_digit())))
        {
            is_float = true;
            text.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.advance();
            }
            self.digits(&mut text);
        }
        match self.peek() {
            Some('j' | 'J') => {
                return Err(ParseError::new("complex literals are not supported", line, column));
            }
            Some(c) if c.is_alphanumeric() || c == '_' => {
                return Err(ParseError::new("invalid decimal literal", line, column));
            }
            _ => {}
        }

        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| ParseError::new("invalid float literal", line, column))?;
            self.push(TokenKind::Float(value), line, column);
        } else {
            if text.len() > 1 && text.starts_with('0') && text.chars().any(|c| c != '0') {
                return Err(ParseError::new(
                    "leading zeros in decimal integer literals are not permitted",
                    line,
                    column,
                ));
            }
            let value: i64 = text
                .parse()
                .map_err(|_| ParseError::new("integer literal is too large", line, column))?;
            self.push(TokenKind::Int(value), line, column);
        }
        Ok(())
    }

    fn digits(&mut self, text: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
            } else if c != '_' || !self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) {
                break;
            }
            self.advance();
        }
    }

    fn name_or_prefixed_string(&mut self) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column);
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if matches!(self.peek(), Some('"' | '\'')) {
            let prefix = name.to_ascii_lowercase();
            match prefix.as_str() {
                "r" => return self.string_at(true, false, line, column),
                "u" => return self.string_at(false, false, line, column),
                "f" => return self.string_at(false, true, line, column),
                "rf" | "fr" => return self.string_at(true, true, line, column),
                "b" | "rb" | "br" => {
                    return Err(ParseError::new("bytes literals are not supported", line, column));
                }
                _ => {}
            }
        }
        self.push(TokenKind::Name(name), line, column);
        Ok(())
    }

    fn string(&mut self, raw: bool, fstring: bool) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column);
        self.string_at(raw, fstring, line, column)
    }

    fn string_at(&mut self, raw: bool, fstring: bool, line: u32, column: u32) -> Result<(), ParseError> {
        let Some(quote) = self.advance() else {
            return Err(ParseError::new("unterminated string literal", line, column));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.advance();
            self.advance();
        }

        let mut body = String::new();
        loop {
            let Some(c) = self.advance() else {
                return Err(ParseError::new("unterminated string literal", line, column));
            };
            if c == quote {
                if !triple {
                    break;
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.advance();
                    self.advance();
                    break;
                }
                body.push(c);
            } else if c == '\\' {
                body.push(c);
                if let Some(next) = self.advance() {
                    body.push(next);
                }
            } else if (c == '\n' || c == '\r') && !triple {
                return Err(ParseError::new("unterminated string literal", line, column));
            } else {
                body.push(c);
            }
        }

        let kind = if fstring {
            TokenKind::FString { body, raw }
        } else if raw {
            TokenKind::Str(body)
        } else {
            TokenKind::Str(unescape(&body, line, column)?)
        };
        self.push(kind, line, column);
        Ok(())
    }

    fn operator(&mut self) -> Result<(), ParseError> {
        let (line, column) = (self.line, self.column);
        let op = OPERATORS.iter().copied().find(|op| {
            op.chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c))
        });
        let Some(op) = op else {
            let c = self.peek().unwrap_or(' ');
            return Err(ParseError::new(format!("invalid character '{c}'"), line, column));
        };
        for _ in 0..op.chars().count() {
            self.advance();
        }

        match op {
            "(" | "[" | "{" => {
                if self.brackets.len() >= crate::parser::MAX_NESTING {
                    return Err(ParseError::new("too many nested brackets", line, column));
                }
                let open = op.chars().next().unwrap_or('(');
                self.brackets.push((open, line, column));
            }
            ")" | "]" | "}" => {
                let close = op.chars().next().unwrap_or(')');
                let expected = match self.brackets.pop() {
                    Some(('(', ..)) => ')',
                    Some(('[', ..)) => ']',
                    Some(('{', ..)) => '}',
                    _ => {
                        return Err(ParseError::new(format!("unmatched '{close}'"), line, column));
                    }
                };
                if close != expected {
                    return Err(ParseError::new(
                        format!("closing '{close}' does not match the open bracket"),
                        line,
                        column,
                    ));
                }
            }
            _ => {}
        }
        self.push(TokenKind::Op(op), line, column);
        Ok(())
    }
}

/// Resolve backslash escapes in a non-raw string body.
pub(crate) fn unescape(body: &str, line: u32, column: u32) -> Result<String, ParseError> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(e) = chars.next() else {
            out.push('\\');
            break;
        };
        match e {
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{7}'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' => out.push('\0'),
            'x' | 'u' | 'U' => {
                let len = match e {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let hex: String = (0..len).filter_map(|_| chars.next()).collect();
                let decoded = (hex.len() == len)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32)
                    .ok_or_else(|| ParseError::new(format!("invalid \\{e} escape"), line, column))?;
                out.push(decoded);
            }
            'N' => {
                return Err(ParseError::new("named unicode escapes are not supported", line, column));
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn indentation_produces_block_tokens() {
        let k = kinds("if x:\n    y = 1\nz\n");
        assert_eq!(
            k,
            vec![
                TokenKind::Name("if".into()),
                TokenKind::Name("x".into()),
                TokenKind::Op(":"),
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Name("y".into()),
                TokenKind::Op("="),
                TokenKind::Int(1),
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::Name("z".into()),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn inconsistent_tabs_and_spaces_are_rejected() {
        for source in [
            "if True:\n\tx = 1\n        y = 2\n",
            "if True:\n        x = 1\n\ty = 2\n",
            "if a:\n    if b:\n\tx = 1\n",
        ] {
            let err = tokenize(source).unwrap_err();
            assert_eq!(err.message, "inconsistent use of tabs and spaces in indentation");
            assert_eq!(err.line, 3, "{source:?}");
        }
        let tabs = kinds("if a:\n\tif b:\n\t\tx = 1\n\ty = 2\n");
        assert_eq!(tabs.iter().filter(|t| **t == TokenKind::Indent).count(), 2);
        assert!(tokenize("if a:\n  \tx = 1\n  \ty = 2\n").is_ok());
    }

    #[test]
    fn brackets_join_lines_and_comments_vanish() {
        let k = kinds("f(1,  # one\n  2)\n\n# trailing\n");
        assert!(!k[..k.len() - 2].contains(&TokenKind::Newline));
        assert_eq!(k.iter().filter(|t| **t == TokenKind::Newline).count(), 1);
    }

    #[test]
    fn numbers() {
        assert_eq!(
            kinds("0x1F 1_000 2.5 1e3 .5")[..5],
            [
                TokenKind::Int(31),
                TokenKind::Int(1000),
                TokenKind::Float(2.5),
                TokenKind::Float(1000.0),
                TokenKind::Float(0.5),
            ]
        );
        assert!(tokenize("99999999999999999999").is_err());
        assert!(tokenize("3j").is_err());
        assert!(tokenize("012").is_err());
    }

    #[test]
    fn strings_and_escapes() {
        assert_eq!(kinds(r#""a\tb""#)[0], TokenKind::Str("a\tb".into()));
        assert_eq!(kinds(r#"r"a\tb""#)[0], TokenKind::Str("a\\tb".into()));
        assert_eq!(kinds("'''x\ny'''")[0], TokenKind::Str("x\ny".into()));
        assert_eq!(
            kinds("f'{a}!'")[0],
            TokenKind::FString {
                body: "{a}!".into(),
                raw: false
            }
        );
        assert!(tokenize("b'x'").is_err());
        assert!(tokenize("'open").is_err());
    }

    #[test]
    fn positions_are_one_indexed() {
        let tokens = tokenize("a\n  \nbb = 2").unwrap();
        let bb = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Name("bb".into()))
            .unwrap();
        assert_eq!((bb.line, bb.column), (3, 1));
    }

    #[test]
    fn bad_dedent_and_unclosed_bracket() {
        let err = tokenize("if a:\n    b\n  c\n").unwrap_err();
        assert_eq!(err.line, 3);
        let err = tokenize("f(1,\n2\n").unwrap_err();
        assert!(err.message.contains("never closed"));
        assert_eq!((err.line, err.column), (1, 2));
    }
}
