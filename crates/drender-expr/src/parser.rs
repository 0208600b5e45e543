//! Recursive-descent parser with JavaScript operator precedence.
//!
//! At statement level a leading `{` is an object literal, so `{ count: 1 }`
//! means an object and not a block. Braces only open blocks after `if`,
//! `else` and `=>`.

use crate::ast::*;
use crate::error::CompileError;
use crate::lexer::Lexer;
use crate::token::{KEYWORDS, TemplatePart, Token, TokenKind};
use std::rc::Rc;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

type PResult<T> = Result<T, CompileError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Tokenize and parse a whole program
    pub fn parse_source(source: &str) -> PResult<Program> {
        let tokens = Lexer::new(source).tokenize()?;
        Parser::new(tokens).parse_program()
    }

    fn parse_sub_expression(source: &str, offset: usize) -> PResult<Expr> {
        let tokens = Lexer::with_offset(source, offset).tokenize()?;
        let mut parser = Parser::new(tokens);
        let expr = parser.parse_expression()?;
        parser.expect_end()?;
        Ok(expr)
    }

    pub fn parse_program(&mut self) -> PResult<Program> {
        let mut body = Vec::new();
        while !self.at_end() {
            if self.eat_punct(";") {
                continue;
            }
            body.push(self.parse_statement(false)?);
        }
        Ok(Program { body })
    }

    // ---- token helpers ----

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    fn check_punct(&self, p: &str) -> bool {
        self.peek().is_some_and(|t| t.is_punct(p))
    }

    fn check_ident(&self, name: &str) -> bool {
        self.peek().is_some_and(|t| t.is_ident(name))
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.check_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.check_ident(name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn next(&mut self) -> PResult<Token> {
        let token = self.peek().cloned().ok_or_else(|| CompileError::UnexpectedEnd("more input".into()))?;
        self.pos += 1;
        Ok(token)
    }

    fn unexpected<T>(&self, expected: &str) -> PResult<T> {
        match self.peek() {
            Some(t) => Err(CompileError::UnexpectedToken {
                found: t.describe(),
                pos: t.pos,
                expected: expected.to_string(),
            }),
            None => Err(CompileError::UnexpectedEnd(expected.to_string())),
        }
    }

    fn expect_punct(&mut self, p: &str) -> PResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            self.unexpected(&format!("`{p}`"))
        }
    }

    fn expect_end(&self) -> PResult<()> {
        if self.at_end() { Ok(()) } else { self.unexpected("end of expression") }
    }

    fn binding_name(&mut self) -> PResult<String> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Ident(name)) if !KEYWORDS.contains(&name.as_str()) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => self.unexpected("identifier"),
        }
    }

    // ---- statements ----

    fn parse_statement(&mut self, braces_are_blocks: bool) -> PResult<Stmt> {
        let stmt = if self.check_ident("let") || self.check_ident("const") || self.check_ident("var") {
            self.parse_declaration()?
        } else if self.eat_ident("if") {
            self.expect_punct("(")?;
            let test = self.parse_expression()?;
            self.expect_punct(")")?;
            let consequent = Box::new(self.parse_statement(true)?);
            let alternate = if self.eat_ident("else") {
                Some(Box::new(self.parse_statement(true)?))
            } else {
                None
            };
            return Ok(Stmt::If { test, consequent, alternate });
        } else if self.eat_ident("return") {
            if self.at_end() || self.check_punct(";") || self.check_punct("}") {
                Stmt::Return(None)
            } else {
                Stmt::Return(Some(self.parse_expression()?))
            }
        } else if braces_are_blocks && self.check_punct("{") {
            return Ok(Stmt::Block(self.parse_block()?));
        } else if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        } else {
            Stmt::Expr(self.parse_expression()?)
        };
        self.eat_punct(";");
        Ok(stmt)
    }

    fn parse_declaration(&mut self) -> PResult<Stmt> {
        let kind = match self.next()?.kind {
            TokenKind::Ident(k) if k == "let" => DeclKind::Let,
            TokenKind::Ident(k) if k == "const" => DeclKind::Const,
            _ => DeclKind::Var,
        };
        let mut decls = Vec::new();
        loop {
            let name = self.binding_name()?;
            let init = if self.eat_punct("=") { Some(self.parse_assignment()?) } else { None };
            decls.push((name, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Decl { kind, decls })
    }

    fn parse_block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.eat_punct("}") {
            if self.at_end() {
                return self.unexpected("`}`");
            }
            if self.eat_punct(";") {
                continue;
            }
            body.push(self.parse_statement(true)?);
        }
        Ok(body)
    }

    // ---- expressions ----

    /// Comma-separated sequence
    pub fn parse_expression(&mut self) -> PResult<Expr> {
        let first = self.parse_assignment()?;
        if !self.check_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.parse_assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        if let Some(arrow) = self.try_arrow()? {
            return Ok(arrow);
        }

        let target = self.parse_conditional()?;
        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Punct(p)) => match *p {
                "=" => Some(AssignOp::Assign),
                "+=" => Some(AssignOp::Compound(BinaryOp::Add)),
                "-=" => Some(AssignOp::Compound(BinaryOp::Sub)),
                "*=" => Some(AssignOp::Compound(BinaryOp::Mul)),
                "/=" => Some(AssignOp::Compound(BinaryOp::Div)),
                "%=" => Some(AssignOp::Compound(BinaryOp::Rem)),
                "**=" => Some(AssignOp::Compound(BinaryOp::Pow)),
                "||=" => Some(AssignOp::Logical(LogicalOp::Or)),
                "&&=" => Some(AssignOp::Logical(LogicalOp::And)),
                "??=" => Some(AssignOp::Logical(LogicalOp::Nullish)),
                _ => None,
            },
            _ => None,
        };
        let Some(op) = op else { return Ok(target) };
        if !target.is_assignable() {
            return Err(CompileError::InvalidAssignmentTarget);
        }
        self.pos += 1;
        let value = self.parse_assignment()?;
        Ok(Expr::Assign { op, target: Box::new(target), value: Box::new(value) })
    }

    /// Parse `x => ...` or `(a, b) => ...` when the lookahead says so
    fn try_arrow(&mut self) -> PResult<Option<Expr>> {
        let params = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Ident(_)) if self.peek_at(1).is_some_and(|t| t.is_punct("=>")) => {
                let name = self.binding_name()?;
                self.pos += 1;
                vec![name]
            }
            Some(TokenKind::Punct("(")) => {
                let Some(close) = self.matching_paren(self.pos) else { return Ok(None) };
                if !self.tokens.get(close + 1).is_some_and(|t| t.is_punct("=>")) {
                    return Ok(None);
                }
                self.pos += 1;
                let mut params = Vec::new();
                while !self.eat_punct(")") {
                    params.push(self.binding_name()?);
                    if !self.eat_punct(",") {
                        self.expect_punct(")")?;
                        break;
                    }
                }
                self.expect_punct("=>")?;
                params
            }
            _ => return Ok(None),
        };

        let body = if self.check_punct("{") {
            ArrowBody::Block(self.parse_block()?)
        } else {
            ArrowBody::Expr(Box::new(self.parse_assignment()?))
        };
        Ok(Some(Expr::Arrow(Rc::new(ArrowFn { params, body }))))
    }

    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open) {
            match &token.kind {
                TokenKind::Punct("(") | TokenKind::Punct("[") | TokenKind::Punct("{") => depth += 1,
                TokenKind::Punct(")") | TokenKind::Punct("]") | TokenKind::Punct("}") => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return token.is_punct(")").then_some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let test = self.parse_logical_or()?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.parse_assignment()?;
        self.expect_punct(":")?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn parse_logical_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_logical_and()?;
        loop {
            let op = if self.eat_punct("||") {
                LogicalOp::Or
            } else if self.eat_punct("??") {
                LogicalOp::Nullish
            } else {
                return Ok(left);
            };
            let right = self.parse_logical_and()?;
            left = Expr::Logical { op, left: Box::new(left), right: Box::new(right) };
        }
    }

    fn parse_logical_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat_punct("&&") {
            let right = self.parse_equality()?;
            left = Expr::Logical { op: LogicalOp::And, left: Box::new(left), right: Box::new(right) };
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> PResult<Expr>,
    ) -> PResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (p, op) in ops {
                if self.eat_punct(p) {
                    let right = next(self)?;
                    left = Expr::Binary { op: *op, left: Box::new(left), right: Box::new(right) };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        self.binary_level(
            &[("===", BinaryOp::StrictEq), ("!==", BinaryOp::StrictNe), ("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        self.binary_level(
            &[("<=", BinaryOp::Le), (">=", BinaryOp::Ge), ("<", BinaryOp::Lt), (">", BinaryOp::Gt)],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        self.binary_level(&[("+", BinaryOp::Add), ("-", BinaryOp::Sub)], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        self.binary_level(
            &[("*", BinaryOp::Mul), ("/", BinaryOp::Div), ("%", BinaryOp::Rem)],
            Self::parse_exponent,
        )
    }

    fn parse_exponent(&mut self) -> PResult<Expr> {
        let base = self.parse_unary()?;
        if self.eat_punct("**") {
            // right-associative
            let exp = self.parse_exponent()?;
            return Ok(Expr::Binary { op: BinaryOp::Pow, left: Box::new(base), right: Box::new(exp) });
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = if self.eat_punct("!") {
            Some(UnaryOp::Not)
        } else if self.eat_punct("-") {
            Some(UnaryOp::Neg)
        } else if self.eat_punct("+") {
            Some(UnaryOp::Plus)
        } else if self.eat_ident("typeof") {
            Some(UnaryOp::TypeOf)
        } else if self.eat_ident("void") {
            Some(UnaryOp::Void)
        } else {
            None
        };
        if let Some(op) = op {
            let arg = self.parse_unary()?;
            return Ok(Expr::Unary { op, arg: Box::new(arg) });
        }

        for (p, increment) in [("++", true), ("--", false)] {
            if self.eat_punct(p) {
                let target = self.parse_unary()?;
                if !target.is_assignable() {
                    return Err(CompileError::InvalidAssignmentTarget);
                }
                return Ok(Expr::Update { increment, prefix: true, target: Box::new(target) });
            }
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let expr = self.parse_call_member()?;
        for (p, increment) in [("++", true), ("--", false)] {
            if self.check_punct(p) {
                if !expr.is_assignable() {
                    return Err(CompileError::InvalidAssignmentTarget);
                }
                self.pos += 1;
                return Ok(Expr::Update { increment, prefix: false, target: Box::new(expr) });
            }
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(".") {
                let name = self.property_name()?;
                expr = Expr::Member { object: Box::new(expr), property: MemberProp::Static(name), optional: false };
            } else if self.eat_punct("?.") {
                if self.eat_punct("(") {
                    let args = self.parse_list(")")?;
                    expr = Expr::Call { callee: Box::new(expr), args, optional: true };
                } else if self.eat_punct("[") {
                    let index = self.parse_expression()?;
                    self.expect_punct("]")?;
                    expr = Expr::Member { object: Box::new(expr), property: MemberProp::Computed(Box::new(index)), optional: true };
                } else {
                    let name = self.property_name()?;
                    expr = Expr::Member { object: Box::new(expr), property: MemberProp::Static(name), optional: true };
                }
            } else if self.eat_punct("[") {
                let index = self.parse_expression()?;
                self.expect_punct("]")?;
                expr = Expr::Member { object: Box::new(expr), property: MemberProp::Computed(Box::new(index)), optional: false };
            } else if self.eat_punct("(") {
                let args = self.parse_list(")")?;
                expr = Expr::Call { callee: Box::new(expr), args, optional: false };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Any identifier (keywords included) after `.`
    fn property_name(&mut self) -> PResult<String> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => self.unexpected("property name"),
        }
    }

    /// Comma list with spread, up to and including `close`
    fn parse_list(&mut self, close: &str) -> PResult<Vec<ListItem>> {
        let mut items = Vec::new();
        while !self.eat_punct(close) {
            if self.eat_punct("...") {
                items.push(ListItem::Spread(self.parse_assignment()?));
            } else {
                items.push(ListItem::Item(self.parse_assignment()?));
            }
            if !self.eat_punct(",") {
                self.expect_punct(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn parse_object(&mut self) -> PResult<Expr> {
        let mut props = Vec::new();
        while !self.eat_punct("}") {
            if self.eat_punct("...") {
                props.push(Prop::Spread(self.parse_assignment()?));
            } else {
                let token = self.next()?;
                let key = match token.kind {
                    TokenKind::Ident(name) => {
                        if self.check_punct(",") || self.check_punct("}") {
                            props.push(Prop::Shorthand(name));
                            if !self.eat_punct(",") {
                                self.expect_punct("}")?;
                                break;
                            }
                            continue;
                        }
                        PropKey::Static(name)
                    }
                    TokenKind::String(s) => PropKey::Static(s),
                    TokenKind::Number(n) => PropKey::Static(crate::value::number_to_string(n)),
                    TokenKind::Punct("[") => {
                        let key = self.parse_assignment()?;
                        self.expect_punct("]")?;
                        PropKey::Computed(key)
                    }
                    _ => {
                        self.pos -= 1;
                        return self.unexpected("property key");
                    }
                };
                self.expect_punct(":")?;
                let value = self.parse_assignment()?;
                props.push(Prop::KeyValue(key, value));
            }
            if !self.eat_punct(",") {
                self.expect_punct("}")?;
                break;
            }
        }
        Ok(Expr::Object(props))
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::String(s) => Ok(Expr::Str(s)),
            TokenKind::Template(parts) => {
                let mut chunks = Vec::with_capacity(parts.len());
                for part in parts {
                    chunks.push(match part {
                        TemplatePart::Str(s) => TemplateChunk::Lit(s),
                        TemplatePart::Expr { source, offset } => {
                            TemplateChunk::Expr(Self::parse_sub_expression(&source, offset)?)
                        }
                    });
                }
                Ok(Expr::Template(chunks))
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "this" => Ok(Expr::This),
                kw if KEYWORDS.contains(&kw) => Err(CompileError::Unsupported(name)),
                _ => Ok(Expr::Ident(name)),
            },
            TokenKind::Punct("(") => {
                let expr = self.parse_expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punct("[") => Ok(Expr::Array(self.parse_list("]")?)),
            TokenKind::Punct("{") => self.parse_object(),
            _ => {
                self.pos -= 1;
                self.unexpected("expression")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(src: &str) -> Expr {
        let program = Parser::parse_source(src).unwrap();
        match program.body.into_iter().last() {
            Some(Stmt::Expr(e)) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let e = expr("1 + 2 * 3");
        let Expr::Binary { op: BinaryOp::Add, right, .. } = e else { panic!() };
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));

        let e = expr("a || b && c");
        let Expr::Logical { op: LogicalOp::Or, right, .. } = e else { panic!() };
        assert!(matches!(*right, Expr::Logical { op: LogicalOp::And, .. }));
    }

    #[test]
    fn test_leading_brace_is_object() {
        let e = expr("{ count: count + 1, done }");
        let Expr::Object(props) = e else { panic!("expected object") };
        assert_eq!(props.len(), 2);
        assert!(matches!(&props[1], Prop::Shorthand(n) if n == "done"));
    }

    #[test]
    fn test_arrow_functions() {
        assert!(matches!(expr("x => x + 1"), Expr::Arrow(_)));
        let Expr::Arrow(f) = expr("(a, b) => { return a }") else { panic!() };
        assert_eq!(f.params, vec!["a", "b"]);
        assert!(matches!(f.body, ArrowBody::Block(_)));
        // parenthesized expression is not an arrow
        assert!(matches!(expr("(a, b)"), Expr::Sequence(_)));
    }

    #[test]
    fn test_statements() {
        let program = Parser::parse_source("let a = 1; if (a) { a = 2 } else a = 3; a").unwrap();
        assert_eq!(program.body.len(), 3);
        assert!(matches!(program.body[0], Stmt::Decl { kind: DeclKind::Let, .. }));
        assert!(matches!(program.body[1], Stmt::If { alternate: Some(_), .. }));
    }

    #[test]
    fn test_optional_chaining_and_calls() {
        let e = expr("this.setState({ a: 1 }, { flag: true })");
        let Expr::Call { args, callee, .. } = e else { panic!() };
        assert_eq!(args.len(), 2);
        assert!(matches!(*callee, Expr::Member { .. }));
        assert!(matches!(expr("a?.b"), Expr::Member { optional: true, .. }));
    }

    #[test]
    fn test_template_substitution() {
        let Expr::Template(chunks) = expr("`n = ${n + 1}`") else { panic!() };
        assert!(matches!(&chunks[1], TemplateChunk::Expr(Expr::Binary { .. })));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(Parser::parse_source("1 +"), Err(CompileError::UnexpectedEnd(_))));
        assert!(matches!(Parser::parse_source("1 = 2"), Err(CompileError::InvalidAssignmentTarget)));
        assert!(matches!(Parser::parse_source("new Foo()"), Err(CompileError::Unsupported(_))));
        assert!(Parser::parse_source("{ a: 1 ").is_err());
    }
}
