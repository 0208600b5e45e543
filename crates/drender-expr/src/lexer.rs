//! Lexer
//!
//! Turns a source string into a token vector up front; the parser needs
//! arbitrary lookahead to tell arrow parameter lists from parenthesized
//! expressions.

use crate::error::CompileError;
use crate::token::{PUNCTUATORS, TemplatePart, Token, TokenKind};

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    /// Offset added to every reported position (template substitutions)
    base: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0, base: 0 }
    }

    pub fn with_offset(src: &'a str, base: usize) -> Self {
        Self { src, pos: 0, base }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            if let Some(c) = self.peek().filter(|c| c.is_whitespace()) {
                self.pos += c.len_utf8();
            } else if rest.starts_with("//") {
                self.pos += rest.find('\n').unwrap_or(rest.len());
            } else if rest.starts_with("/*") {
                self.pos += rest[2..].find("*/").map_or(rest.len(), |i| i + 4);
            } else {
                return;
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, CompileError> {
        self.skip_trivia();
        let start = self.pos;
        let Some(c) = self.peek() else { return Ok(None) };
        let pos = self.base + start;

        let kind = if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) {
            self.number()?
        } else if c == '"' || c == '\'' {
            TokenKind::String(self.string(c)?)
        } else if c == '`' {
            TokenKind::Template(self.template()?)
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let len = self.rest()
                .find(|ch: char| !(ch.is_alphanumeric() || ch == '_' || ch == '$'))
                .unwrap_or(self.rest().len());
            let ident = self.rest()[..len].to_string();
            self.pos += len;
            TokenKind::Ident(ident)
        } else {
            let rest = self.rest();
            let punct = PUNCTUATORS.iter()
                .find(|p| rest.starts_with(**p))
                .ok_or(CompileError::InvalidCharacter { ch: c, pos })?;
            // `a?.5:b` is a conditional, not optional chaining
            let punct = if *punct == "?." && self.peek_at(2).is_some_and(|d| d.is_ascii_digit()) {
                "?"
            } else {
                punct
            };
            self.pos += punct.len();
            TokenKind::Punct(punct)
        };
        Ok(Some(Token { kind, pos }))
    }

    fn number(&mut self) -> Result<TokenKind, CompileError> {
        let rest = self.rest();
        if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            let len = hex.find(|c: char| !c.is_ascii_hexdigit()).unwrap_or(hex.len());
            let digits = &hex[..len];
            self.pos += 2 + len;
            return i64::from_str_radix(digits, 16)
                .map(|n| TokenKind::Number(n as f64))
                .map_err(|_| CompileError::InvalidNumber(format!("0x{digits}")));
        }

        let mut len = 0;
        let bytes = rest.as_bytes();
        let mut seen_exp = false;
        while len < bytes.len() {
            let b = bytes[len];
            let ok = b.is_ascii_digit()
                || b == b'_'
                || (b == b'.' && !seen_exp)
                || ((b == b'e' || b == b'E') && !seen_exp)
                || ((b == b'+' || b == b'-') && len > 0 && matches!(bytes[len - 1], b'e' | b'E'));
            if !ok {
                break;
            }
            if b == b'e' || b == b'E' {
                seen_exp = true;
            }
            len += 1;
        }
        let text: String = rest[..len].chars().filter(|&c| c != '_').collect();
        self.pos += len;
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| CompileError::InvalidNumber(text))
    }

    fn escape(&mut self, out: &mut String) {
        match self.bump() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = self.rest().chars().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) if hex.len() == 4 => {
                        self.pos += 4;
                        out.push(ch);
                    }
                    _ => out.push('u'),
                }
            }
            Some('\n') => {}
            Some(other) => out.push(other),
            None => {}
        }
    }

    fn string(&mut self, quote: char) -> Result<String, CompileError> {
        let start = self.base + self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => self.escape(&mut out),
                Some(c) => out.push(c),
                None => return Err(CompileError::UnterminatedString(start)),
            }
        }
    }

    fn template(&mut self) -> Result<Vec<TemplatePart>, CompileError> {
        let start = self.base + self.pos;
        self.bump();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('`') => break,
                Some('\\') => self.escape(&mut text),
                Some('$') if self.peek() == Some('{') => {
                    self.bump();
                    if !text.is_empty() {
                        parts.push(TemplatePart::Str(std::mem::take(&mut text)));
                    }
                    let inner_start = self.pos;
                    let inner_end = self.skip_substitution()
                        .ok_or(CompileError::UnterminatedTemplate(start))?;
                    parts.push(TemplatePart::Expr {
                        source: self.src[inner_start..inner_end].to_string(),
                        offset: self.base + inner_start,
                    });
                }
                Some(c) => text.push(c),
                None => return Err(CompileError::UnterminatedTemplate(start)),
            }
        }
        if !text.is_empty() || parts.is_empty() {
            parts.push(TemplatePart::Str(text));
        }
        Ok(parts)
    }

    /// Advance past the `}` closing a substitution; returns the offset of that `}`
    fn skip_substitution(&mut self) -> Option<usize> {
        let mut depth = 0usize;
        loop {
            let c = self.peek()?;
            match c {
                '{' => depth += 1,
                '}' if depth == 0 => {
                    let end = self.pos;
                    self.bump();
                    return Some(end);
                }
                '}' => depth -= 1,
                '"' | '\'' => {
                    self.string(c).ok()?;
                    continue;
                }
                '`' => {
                    self.template().ok()?;
                    continue;
                }
                _ => {}
            }
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_punctuators_longest_match() {
        assert_eq!(kinds("a === b ?? c"), vec![
            TokenKind::Ident("a".into()),
            TokenKind::Punct("==="),
            TokenKind::Ident("b".into()),
            TokenKind::Punct("??"),
            TokenKind::Ident("c".into()),
        ]);
        assert_eq!(kinds("x?.y")[1], TokenKind::Punct("?."));
        assert_eq!(kinds("x?.5:1")[1], TokenKind::Punct("?"));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("1 2.5 .5 1e3 0xff 1_000"), vec![
            TokenKind::Number(1.0),
            TokenKind::Number(2.5),
            TokenKind::Number(0.5),
            TokenKind::Number(1000.0),
            TokenKind::Number(255.0),
            TokenKind::Number(1000.0),
        ]);
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(kinds(r#"'it\'s' "a\nb" "A""#), vec![
            TokenKind::String("it's".into()),
            TokenKind::String("a\nb".into()),
            TokenKind::String("A".into()),
        ]);
        assert!(matches!(Lexer::new("'open").tokenize(), Err(CompileError::UnterminatedString(0))));
    }

    #[test]
    fn test_template_parts() {
        let toks = kinds("`a ${ {x: 1}.x } b ${`in${c}`}`");
        let TokenKind::Template(parts) = &toks[0] else { panic!("expected template") };
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], TemplatePart::Str("a ".into()));
        assert!(matches!(&parts[1], TemplatePart::Expr { source, .. } if source.trim() == "{x: 1}.x"));
        assert!(matches!(&parts[3], TemplatePart::Expr { source, .. } if source == "`in${c}`"));
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(kinds("a /* note */ + // tail\n b").len(), 3);
    }

    #[test]
    fn test_invalid_character() {
        assert!(matches!(Lexer::new("a # b").tokenize(), Err(CompileError::InvalidCharacter { ch: '#', pos: 2 })));
    }
}
