//! Tokens

/// Piece of a template literal before parsing
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Str(String),
    /// Source of a `${...}` substitution
    Expr { source: String, offset: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    String(String),
    Template(Vec<TemplatePart>),
    Ident(String),
    Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset in the source
    pub pos: usize,
}

impl Token {
    pub fn is_punct(&self, p: &str) -> bool {
        matches!(&self.kind, TokenKind::Punct(q) if *q == p)
    }

    pub fn is_ident(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Ident(n) if n == name)
    }

    /// Short human-readable form for error messages
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Number(n) => n.to_string(),
            TokenKind::String(s) => format!("{s:?}"),
            TokenKind::Template(_) => "template literal".to_string(),
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Punct(p) => p.to_string(),
        }
    }
}

/// Reserved words that can never be a binding name
pub const KEYWORDS: &[&str] = &[
    "true", "false", "null", "this", "typeof", "void", "let", "const", "var",
    "if", "else", "return", "function", "new", "delete", "in", "instanceof",
    "for", "while", "do", "switch", "case", "break", "continue", "class",
];

/// Operators ordered longest first so the lexer can take the first match
pub const PUNCTUATORS: &[&str] = &[
    "...", "===", "!==", "**=", "??=", "||=", "&&=",
    "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--",
    "+=", "-=", "*=", "/=", "%=", "**",
    "+", "-", "*", "/", "%", "<", ">", "=", "!", "?", ":", ".", ",", ";",
    "(", ")", "[", "]", "{", "}",
];
