//! Static scope analysis
//!
//! Collects the identifiers a program reads or writes without declaring
//! them. Declarations are hoisted to the top of their statement list, and
//! arrow parameters open a new scope.

use crate::ast::*;
use std::collections::{BTreeSet, HashSet};

/// Identifiers that `program` references but never binds
pub fn free_identifiers(program: &Program, params: &[&str]) -> BTreeSet<String> {
    let mut walker = ScopeWalker::default();
    walker.scopes.push(params.iter().map(|p| p.to_string()).collect());
    walker.statements(&program.body);
    walker.free
}

#[derive(Default)]
struct ScopeWalker {
    scopes: Vec<HashSet<String>>,
    free: BTreeSet<String>,
}

impl ScopeWalker {
    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    fn reference(&mut self, name: &str) {
        if !self.is_bound(name) {
            self.free.insert(name.to_string());
        }
    }

    fn statements(&mut self, body: &[Stmt]) {
        let mut declared = HashSet::new();
        for stmt in body {
            if let Stmt::Decl { decls, .. } = stmt {
                declared.extend(decls.iter().map(|(name, _)| name.clone()));
            }
        }
        self.scopes.push(declared);
        for stmt in body {
            self.statement(stmt);
        }
        self.scopes.pop();
    }

    fn statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) => self.expr(e),
            Stmt::Decl { decls, .. } => {
                for (_, init) in decls {
                    if let Some(init) = init {
                        self.expr(init);
                    }
                }
            }
            Stmt::If { test, consequent, alternate } => {
                self.expr(test);
                self.branch(consequent);
                if let Some(alternate) = alternate {
                    self.branch(alternate);
                }
            }
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            Stmt::Block(body) => self.statements(body),
            Stmt::Empty => {}
        }
    }

    /// `if (x) let y = 1` still scopes `y` to the branch
    fn branch(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(_) => self.statement(stmt),
            other => self.statements(std::slice::from_ref(other)),
        }
    }

    fn list(&mut self, items: &[ListItem]) {
        for item in items {
            match item {
                ListItem::Item(e) | ListItem::Spread(e) => self.expr(e),
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null | Expr::This => {}
            Expr::Ident(name) => self.reference(name),
            Expr::Template(chunks) => {
                for chunk in chunks {
                    if let TemplateChunk::Expr(e) = chunk {
                        self.expr(e);
                    }
                }
            }
            Expr::Array(items) => self.list(items),
            Expr::Object(props) => {
                for prop in props {
                    match prop {
                        Prop::KeyValue(key, value) => {
                            if let PropKey::Computed(k) = key {
                                self.expr(k);
                            }
                            self.expr(value);
                        }
                        Prop::Shorthand(name) => self.reference(name),
                        Prop::Spread(e) => self.expr(e),
                    }
                }
            }
            Expr::Member { object, property, .. } => {
                self.expr(object);
                if let MemberProp::Computed(index) = property {
                    self.expr(index);
                }
            }
            Expr::Call { callee, args, .. } => {
                self.expr(callee);
                self.list(args);
            }
            Expr::Arrow(f) => {
                self.scopes.push(f.params.iter().cloned().collect());
                match &f.body {
                    ArrowBody::Expr(e) => self.expr(e),
                    ArrowBody::Block(body) => self.statements(body),
                }
                self.scopes.pop();
            }
            Expr::Unary { arg, .. } => self.expr(arg),
            Expr::Update { target, .. } => self.expr(target),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::Conditional { test, consequent, alternate } => {
                self.expr(test);
                self.expr(consequent);
                self.expr(alternate);
            }
            Expr::Assign { target, value, .. } => {
                self.expr(target);
                self.expr(value);
            }
            Expr::Sequence(items) => {
                for e in items {
                    self.expr(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn free(src: &str, params: &[&str]) -> Vec<String> {
        let program = Parser::parse_source(src).unwrap();
        free_identifiers(&program, params).into_iter().collect()
    }

    #[test]
    fn test_simple_references() {
        assert_eq!(free("count + step", &[]), vec!["count", "step"]);
        assert_eq!(free("event.target.value", &["event"]), Vec::<String>::new());
    }

    #[test]
    fn test_members_are_not_free() {
        assert_eq!(free("user.name + this.label", &[]), vec!["user"]);
    }

    #[test]
    fn test_declarations_hoist() {
        assert_eq!(free("let total = items.length; total * 2", &[]), vec!["items"]);
        assert_eq!(free("x = 1; let x", &[]), Vec::<String>::new());
    }

    #[test]
    fn test_arrow_params_shadow() {
        assert_eq!(free("items.map(item => item.id + offset)", &[]), vec!["items", "offset"]);
        assert_eq!(free("(a) => { const b = a; return c }", &[]), vec!["c"]);
    }

    #[test]
    fn test_shorthand_and_templates() {
        assert_eq!(free("({ name, [key]: `${prefix}-x` })", &[]), vec!["key", "name", "prefix"]);
    }
}
