//! Tree-walking interpreter
//!
//! Scope chain, innermost first: program locals, formal parameters, caller
//! bindings, frozen globals.

use crate::ast::*;
use crate::builtins;
use crate::error::{CompileError, EvalError};
use crate::parser::Parser;
use crate::scope::free_identifiers;
use crate::value::{Function, Object, Value, number_to_string};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

const MAX_CALL_DEPTH: usize = 64;

/// Largest array an assignment may grow to
const MAX_ARRAY_LENGTH: usize = 1 << 20;

thread_local! {
    static GLOBALS: Rc<Env> = Rc::new(Env::frozen(builtins::globals()));
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// A compiled source, callable any number of times
#[derive(Clone)]
pub struct Compiled {
    source: String,
    program: Rc<Program>,
    free: BTreeSet<String>,
    params: Vec<String>,
}

impl std::fmt::Debug for Compiled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiled")
            .field("source", &self.source)
            .field("params", &self.params)
            .finish()
    }
}

impl Compiled {
    pub fn new(source: &str, params: &[&str]) -> Result<Self, CompileError> {
        let program = Parser::parse_source(source)?;
        let free = free_identifiers(&program, params);
        Ok(Self {
            source: source.to_string(),
            program: Rc::new(program),
            free,
            params: params.iter().map(|p| p.to_string()).collect(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Names the caller may bind; formal parameters are already excluded
    pub fn free_identifiers(&self) -> &BTreeSet<String> {
        &self.free
    }

    /// Run with `this`, positional arguments for the formal parameters and
    /// the caller's name bindings
    pub fn call(&self, this: Value, args: Vec<Value>, bindings: Vec<(String, Value)>) -> Result<Value, EvalError> {
        let _depth = DepthGuard::enter()?;
        let globals = GLOBALS.with(Rc::clone);
        let bound = Env::child(&globals, bindings);
        let mut args = args.into_iter();
        let params = Env::child(&bound, self.params.iter().map(|p| (p.clone(), args.next().unwrap_or_default())));
        let locals = Env::child(&params, std::iter::empty());

        let scope = Scope { env: locals, this };
        let mut result = Value::Undefined;
        for stmt in &self.program.body {
            match scope.exec(stmt)? {
                Flow::Return(value) => return Ok(value),
                Flow::Normal(value) => result = value,
            }
        }
        Ok(result)
    }
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<Self, EvalError> {
        DEPTH.with(|d| {
            if d.get() >= MAX_CALL_DEPTH {
                Err(EvalError::StackOverflow)
            } else {
                d.set(d.get() + 1);
                Ok(DepthGuard)
            }
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}

struct Binding {
    value: Value,
    constant: bool,
}

struct Env {
    vars: RefCell<HashMap<String, Binding>>,
    parent: Option<Rc<Env>>,
    frozen: bool,
}

impl Env {
    fn frozen(vars: Vec<(String, Value)>) -> Self {
        Self {
            vars: RefCell::new(vars.into_iter().map(|(k, value)| (k, Binding { value, constant: true })).collect()),
            parent: None,
            frozen: true,
        }
    }

    fn child(parent: &Rc<Env>, vars: impl IntoIterator<Item = (String, Value)>) -> Rc<Env> {
        Rc::new(Self {
            vars: RefCell::new(vars.into_iter().map(|(k, value)| (k, Binding { value, constant: false })).collect()),
            parent: Some(Rc::clone(parent)),
            frozen: false,
        })
    }

    fn declare(&self, name: &str, value: Value, constant: bool) {
        self.vars.borrow_mut().insert(name.to_string(), Binding { value, constant });
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(binding) = self.vars.borrow().get(name) {
            return Some(binding.value.clone());
        }
        self.parent.as_ref()?.lookup(name)
    }

    fn assign(&self, name: &str, value: Value) -> Result<(), EvalError> {
        {
            let mut vars = self.vars.borrow_mut();
            if let Some(binding) = vars.get_mut(name) {
                if self.frozen {
                    return Err(EvalError::type_error(format!("Cannot assign to global '{name}'")));
                }
                if binding.constant {
                    return Err(EvalError::type_error("Assignment to constant variable."));
                }
                binding.value = value;
                return Ok(());
            }
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(EvalError::Reference(name.to_string())),
        }
    }
}

enum Flow {
    Normal(Value),
    Return(Value),
}

struct Scope {
    env: Rc<Env>,
    this: Value,
}

impl Scope {
    fn nested(&self) -> Scope {
        Scope { env: Env::child(&self.env, std::iter::empty()), this: self.this.clone() }
    }

    fn exec_block(&self, body: &[Stmt]) -> Result<Flow, EvalError> {
        let mut last = Value::Undefined;
        for stmt in body {
            match self.exec(stmt)? {
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal(value) => last = value,
            }
        }
        Ok(Flow::Normal(last))
    }

    fn exec(&self, stmt: &Stmt) -> Result<Flow, EvalError> {
        match stmt {
            Stmt::Expr(e) => Ok(Flow::Normal(self.eval(e)?)),
            Stmt::Decl { kind, decls } => {
                for (name, init) in decls {
                    let value = match init {
                        Some(init) => self.eval(init)?,
                        None => Value::Undefined,
                    };
                    self.env.declare(name, value, *kind == DeclKind::Const);
                }
                Ok(Flow::Normal(Value::Undefined))
            }
            Stmt::If { test, consequent, alternate } => {
                if self.eval(test)?.truthy() {
                    self.nested().exec(consequent)
                } else if let Some(alternate) = alternate {
                    self.nested().exec(alternate)
                } else {
                    Ok(Flow::Normal(Value::Undefined))
                }
            }
            Stmt::Return(value) => Ok(Flow::Return(match value {
                Some(e) => self.eval(e)?,
                None => Value::Undefined,
            })),
            Stmt::Block(body) => self.nested().exec_block(body),
            Stmt::Empty => Ok(Flow::Normal(Value::Undefined)),
        }
    }

    fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        Ok(self.eval_chain(expr)?.unwrap_or_default())
    }

    /// `None` when an optional chain short-circuited
    fn eval_chain(&self, expr: &Expr) -> Result<Option<Value>, EvalError> {
        let value = match expr {
            Expr::Number(n) => Value::Number(*n),
            Expr::Str(s) => Value::String(s.clone()),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Null => Value::Null,
            Expr::This => self.this.clone(),
            Expr::Ident(name) => self.lookup(name)?,
            Expr::Template(chunks) => {
                let mut out = String::new();
                for chunk in chunks {
                    match chunk {
                        TemplateChunk::Lit(s) => out.push_str(s),
                        TemplateChunk::Expr(e) => out.push_str(&self.eval(e)?.to_js_string()),
                    }
                }
                Value::String(out)
            }
            Expr::Array(items) => Value::Array(self.eval_list(items)?),
            Expr::Object(props) => Value::Object(self.eval_object(props)?),
            Expr::Member { object, property, optional } => {
                let Some(target) = self.eval_chain(object)? else { return Ok(None) };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.property_key(property)?;
                get_member(&target, &key)?
            }
            Expr::Call { callee, args, optional } => return self.eval_call(callee, args, *optional),
            Expr::Arrow(f) => self.make_closure(f),
            Expr::Unary { op, arg } => self.eval_unary(*op, arg)?,
            Expr::Update { increment, prefix, target } => {
                let old = self.eval(target)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.assign_to(target, Value::Number(new))?;
                Value::Number(if *prefix { new } else { old })
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                binary(*op, &l, &r)
            }
            Expr::Logical { op, left, right } => {
                let l = self.eval(left)?;
                let take_left = match op {
                    LogicalOp::And => !l.truthy(),
                    LogicalOp::Or => l.truthy(),
                    LogicalOp::Nullish => !l.is_nullish(),
                };
                if take_left { l } else { self.eval(right)? }
            }
            Expr::Conditional { test, consequent, alternate } => {
                if self.eval(test)?.truthy() {
                    self.eval(consequent)?
                } else {
                    self.eval(alternate)?
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value)?,
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for e in items {
                    last = self.eval(e)?;
                }
                last
            }
        };
        Ok(Some(value))
    }

    fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        self.env.lookup(name).ok_or_else(|| EvalError::Reference(name.to_string()))
    }

    fn property_key(&self, property: &MemberProp) -> Result<String, EvalError> {
        Ok(match property {
            MemberProp::Static(name) => name.clone(),
            MemberProp::Computed(e) => to_property_key(&self.eval(e)?),
        })
    }

    fn eval_list(&self, items: &[ListItem]) -> Result<Vec<Value>, EvalError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ListItem::Item(e) => out.push(self.eval(e)?),
                ListItem::Spread(e) => match self.eval(e)? {
                    Value::Array(values) => out.extend(values),
                    Value::String(s) => out.extend(s.chars().map(|c| Value::String(c.to_string()))),
                    other => {
                        return Err(EvalError::type_error(format!("{} is not iterable", other.to_js_string())));
                    }
                },
            }
        }
        Ok(out)
    }

    fn eval_object(&self, props: &[Prop]) -> Result<Object, EvalError> {
        let mut object = Object::new();
        for prop in props {
            match prop {
                Prop::KeyValue(key, value) => {
                    let key = match key {
                        PropKey::Static(k) => k.clone(),
                        PropKey::Computed(e) => to_property_key(&self.eval(e)?),
                    };
                    object.set(key, self.eval(value)?);
                }
                Prop::Shorthand(name) => object.set(name.clone(), self.lookup(name)?),
                Prop::Spread(e) => match self.eval(e)? {
                    Value::Object(source) => {
                        for (k, v) in source {
                            object.set(k, v);
                        }
                    }
                    Value::Array(items) => {
                        for (i, v) in items.into_iter().enumerate() {
                            object.set(i.to_string(), v);
                        }
                    }
                    Value::Host(host) => {
                        for k in host.keys() {
                            let v = host.get(&k)?;
                            object.set(k, v);
                        }
                    }
                    _ => {}
                },
            }
        }
        Ok(object)
    }

    fn eval_call(&self, callee: &Expr, args: &[ListItem], optional: bool) -> Result<Option<Value>, EvalError> {
        let (func, this, label) = match callee {
            Expr::Member { object, property, optional: member_optional } => {
                let Some(target) = self.eval_chain(object)? else { return Ok(None) };
                if *member_optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.property_key(property)?;
                if builtins::has_method(&target, &key) {
                    let args = self.eval_list(args)?;
                    return builtins::call_method(&target, &key, args).map(Some);
                }
                let func = get_member(&target, &key)?;
                (func, target, key)
            }
            other => {
                let Some(func) = self.eval_chain(other)? else { return Ok(None) };
                let label = match other {
                    Expr::Ident(name) => name.clone(),
                    _ => "expression".to_string(),
                };
                (func, Value::Undefined, label)
            }
        };
        if optional && func.is_nullish() {
            return Ok(None);
        }
        let Value::Function(func) = func else {
            return Err(EvalError::type_error(format!("{label} is not a function")));
        };
        let args = self.eval_list(args)?;
        func.call(&this, args).map(Some)
    }

    fn make_closure(&self, f: &Rc<ArrowFn>) -> Value {
        let f = Rc::clone(f);
        let env = Rc::clone(&self.env);
        let this = self.this.clone();
        Value::Function(Function::new("", move |_this, args| {
            let _depth = DepthGuard::enter()?;
            let mut args = args.into_iter();
            let frame = Env::child(&env, f.params.iter().map(|p| (p.clone(), args.next().unwrap_or_default())));
            let scope = Scope { env: frame, this: this.clone() };
            match &f.body {
                ArrowBody::Expr(e) => scope.eval(e),
                ArrowBody::Block(body) => match scope.exec_block(body)? {
                    Flow::Return(value) => Ok(value),
                    Flow::Normal(_) => Ok(Value::Undefined),
                },
            }
        }))
    }

    fn eval_unary(&self, op: UnaryOp, arg: &Expr) -> Result<Value, EvalError> {
        if op == UnaryOp::TypeOf {
            if let Expr::Ident(name) = arg {
                // typeof on an undeclared name is not an error
                return Ok(Value::from(self.env.lookup(name).map_or("undefined", |v| v.type_of())));
            }
        }
        let value = self.eval(arg)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::TypeOf => Value::from(value.type_of()),
            UnaryOp::Void => Value::Undefined,
        })
    }

    fn eval_assign(&self, op: AssignOp, target: &Expr, value: &Expr) -> Result<Value, EvalError> {
        let new_value = match op {
            AssignOp::Assign => self.eval(value)?,
            AssignOp::Compound(bin) => {
                let current = self.eval(target)?;
                binary(bin, &current, &self.eval(value)?)
            }
            AssignOp::Logical(logical) => {
                let current = self.eval(target)?;
                let keep = match logical {
                    LogicalOp::And => !current.truthy(),
                    LogicalOp::Or => current.truthy(),
                    LogicalOp::Nullish => !current.is_nullish(),
                };
                if keep {
                    return Ok(current);
                }
                self.eval(value)?
            }
        };
        self.assign_to(target, new_value.clone())?;
        Ok(new_value)
    }

    /// Write through a member chain. Value-type containers are rebuilt and
    /// rebound to the root name; host objects receive the write directly.
    fn assign_to(&self, target: &Expr, value: Value) -> Result<(), EvalError> {
        let mut keys = Vec::new();
        let mut root = target;
        while let Expr::Member { object, property, .. } = root {
            keys.push(self.property_key(property)?);
            root = object;
        }
        keys.reverse();

        if keys.is_empty() {
            let Expr::Ident(name) = root else { return Err(EvalError::type_error("Invalid assignment target")) };
            return self.env.assign(name, value);
        }

        match root {
            Expr::Ident(name) => {
                let container = self.lookup(name)?;
                if let Some(updated) = set_path(container, &keys, value)? {
                    self.env.assign(name, updated)?;
                }
                Ok(())
            }
            other => {
                let container = self.eval(other)?;
                set_path(container, &keys, value).map(|_| ())
            }
        }
    }
}

/// Returns the rebuilt container, or `None` when a host took the write
fn set_path(container: Value, keys: &[String], value: Value) -> Result<Option<Value>, EvalError> {
    let Some((key, rest)) = keys.split_first() else { return Ok(Some(value)) };
    if container.is_nullish() {
        return Err(EvalError::type_error(format!(
            "Cannot set properties of {} (setting '{key}')",
            container.to_js_string()
        )));
    }

    let child_value = if rest.is_empty() {
        Some(value)
    } else {
        let child = get_member(&container, key)?;
        set_path(child, rest, value)?
    };
    let Some(child_value) = child_value else { return Ok(None) };

    match container {
        Value::Host(host) => {
            host.set(key, child_value)?;
            Ok(None)
        }
        Value::Object(mut object) => {
            object.set(key.clone(), child_value);
            Ok(Some(Value::Object(object)))
        }
        Value::Array(mut items) => {
            if key == "length" {
                let len = child_value.to_number();
                if !(0.0..=MAX_ARRAY_LENGTH as f64).contains(&len) || len.fract() != 0.0 {
                    return Err(EvalError::Range("Invalid array length".into()));
                }
                items.resize(len as usize, Value::Undefined);
            } else if let Some(index) = array_index(key) {
                if index >= items.len() {
                    let len = index
                        .checked_add(1)
                        .filter(|len| *len <= MAX_ARRAY_LENGTH)
                        .ok_or_else(|| EvalError::Range(format!("Array index {key} out of range")))?;
                    items.resize(len, Value::Undefined);
                }
                items[index] = child_value;
            }
            Ok(Some(Value::Array(items)))
        }
        // writes to primitives are dropped
        other => Ok(Some(other)),
    }
}

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

pub(crate) fn to_property_key(value: &Value) -> String {
    match value {
        Value::Number(n) => number_to_string(*n),
        other => other.to_js_string(),
    }
}

/// Property read following JavaScript's rules for the supported types
pub(crate) fn get_member(target: &Value, key: &str) -> Result<Value, EvalError> {
    match target {
        Value::Undefined | Value::Null => Err(EvalError::type_error(format!(
            "Cannot read properties of {} (reading '{key}')",
            target.to_js_string()
        ))),
        Value::Object(object) => Ok(object.get(key).cloned().unwrap_or_default()),
        Value::Array(items) => Ok(match key {
            "length" => Value::from(items.len()),
            _ => match array_index(key) {
                Some(i) => items.get(i).cloned().unwrap_or_default(),
                None => builtins::bound_method(target, key),
            },
        }),
        Value::String(s) => Ok(match key {
            "length" => Value::from(s.chars().count()),
            _ => match array_index(key) {
                Some(i) => s.chars().nth(i).map(|c| Value::String(c.to_string())).unwrap_or_default(),
                None => builtins::bound_method(target, key),
            },
        }),
        Value::Number(_) => Ok(builtins::bound_method(target, key)),
        Value::Function(f) if key == "name" => Ok(Value::from(f.name.as_str())),
        Value::Host(host) => host.get(key),
        Value::Bool(_) | Value::Function(_) => Ok(Value::Undefined),
    }
}

fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Host(_) => {
            Value::String(value.to_js_string())
        }
        other => other.clone(),
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let (l, r) = (to_primitive(l), to_primitive(r));
            if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
                Value::String(l.to_js_string() + &r.to_js_string())
            } else {
                Value::Number(l.to_number() + r.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(l.to_number() - r.to_number()),
        BinaryOp::Mul => Value::Number(l.to_number() * r.to_number()),
        BinaryOp::Div => Value::Number(l.to_number() / r.to_number()),
        BinaryOp::Rem => Value::Number(l.to_number() % r.to_number()),
        BinaryOp::Pow => Value::Number(l.to_number().powf(r.to_number())),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let (l, r) = (to_primitive(l), to_primitive(r));
            let ordering = match (&l, &r) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => l.to_number().partial_cmp(&r.to_number()),
            };
            let Some(ordering) = ordering else { return Value::Bool(false) };
            Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Le => ordering.is_le(),
                _ => ordering.is_ge(),
            })
        }
        BinaryOp::Eq => Value::Bool(l.loose_eq(r)),
        BinaryOp::Ne => Value::Bool(!l.loose_eq(r)),
        BinaryOp::StrictEq => Value::Bool(l.strict_eq(r)),
        BinaryOp::StrictNe => Value::Bool(!l.strict_eq(r)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::HostObject;
    use serde_json::json;

    fn run(src: &str) -> Value {
        Compiled::new(src, &[]).unwrap().call(Value::Undefined, vec![], vec![]).unwrap()
    }

    fn run_with(src: &str, bindings: Vec<(&str, Value)>) -> Result<Value, EvalError> {
        let bindings = bindings.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        Compiled::new(src, &[]).unwrap().call(Value::Undefined, vec![], bindings)
    }

    #[test]
    fn test_arithmetic_and_strings() {
        assert_eq!(run("1 + 2 * 3"), Value::Number(7.0));
        assert_eq!(run("2 ** 3 ** 2"), Value::Number(512.0));
        assert_eq!(run("'a' + 1 + 2"), Value::from("a12"));
        assert_eq!(run("`${1 + 1} items`"), Value::from("2 items"));
        assert_eq!(run("7 % 4"), Value::Number(3.0));
    }

    #[test]
    fn test_last_statement_is_result() {
        assert_eq!(run("let a = 2; const b = 3; a * b"), Value::Number(6.0));
        assert_eq!(run("let a = 1; if (a) { return 'early' } 'late'"), Value::from("early"));
        assert_eq!(run("let x = 1"), Value::Undefined);
    }

    #[test]
    fn test_params_shadow_bindings() {
        let compiled = Compiled::new("value + 1", &["value"]).unwrap();
        let result = compiled
            .call(Value::Undefined, vec![Value::Number(10.0)], vec![("value".into(), Value::Number(1.0))])
            .unwrap();
        assert_eq!(result, Value::Number(11.0));
        assert!(compiled.free_identifiers().is_empty());
    }

    #[test]
    fn test_reference_error() {
        let err = run_with("missing + 1", vec![]).unwrap_err();
        assert_eq!(err, EvalError::Reference("missing".into()));
        assert_eq!(run("typeof missing"), Value::from("undefined"));
    }

    #[test]
    fn test_value_semantics() {
        let items = Value::from_json(&json!([1, 2]));
        let result = run_with("let copy = items; copy[0] = 9; [items[0], copy[0]]", vec![("items", items)]).unwrap();
        assert_eq!(result.to_json(), json!([1, 9]));

        let result = run_with("user.name = 'b'; user", vec![("user", Value::from_json(&json!({"name": "a"})))]).unwrap();
        assert_eq!(result.to_json(), json!({"name": "b"}));
    }

    #[test]
    fn test_closures_and_array_methods() {
        let result = run_with(
            "items.filter(i => i.done).map(i => i.id * factor)",
            vec![
                ("items", Value::from_json(&json!([{"id": 1, "done": true}, {"id": 2, "done": false}, {"id": 3, "done": true}]))),
                ("factor", Value::Number(10.0)),
            ],
        )
        .unwrap();
        assert_eq!(result.to_json(), json!([10, 30]));
        assert_eq!(run("[1, 2, 3].reduce((a, b) => a + b, 0)"), Value::Number(6.0));
    }

    #[test]
    fn test_optional_chaining() {
        assert_eq!(run_with("user?.address.street", vec![("user", Value::Null)]).unwrap(), Value::Undefined);
        assert_eq!(run_with("fn?.()", vec![("fn", Value::Undefined)]).unwrap(), Value::Undefined);
        assert!(run_with("user.address", vec![("user", Value::Null)]).is_err());
    }

    #[test]
    fn test_logical_assignment_and_update() {
        assert_eq!(run("let a = null; a ??= 5; a"), Value::Number(5.0));
        assert_eq!(run("let a = 1; a ||= 5; a"), Value::Number(1.0));
        assert_eq!(run("let i = 1; let j = i++; [i, j]").to_json(), json!([2, 1]));
        assert_eq!(run("let o = {n: 1}; o.n += 2; o.n"), Value::Number(3.0));
    }

    #[test]
    fn test_globals_are_frozen() {
        let err = run_with("Math = 1", vec![]).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
        let err = run_with("const a = 1; a = 2", vec![]).unwrap_err();
        assert!(matches!(err, EvalError::Type(_)));
    }

    #[test]
    fn test_object_literal_statement() {
        assert_eq!(run("{ a: 1, b: 'x' }").to_json(), json!({"a": 1, "b": "x"}));
        let result = run_with("({ ...base, b: 2 })", vec![("base", Value::from_json(&json!({"a": 1, "b": 1})))]).unwrap();
        assert_eq!(result.to_json(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_stack_overflow_is_an_error() {
        let err = run_with("let f = n => f(n + 1); f(0)", vec![]).unwrap_err();
        assert_eq!(err, EvalError::StackOverflow);
    }

    struct Counter(RefCell<f64>);

    impl HostObject for Counter {
        fn type_name(&self) -> &str {
            "Counter"
        }

        fn get(&self, key: &str) -> Result<Value, EvalError> {
            Ok(match key {
                "count" => Value::Number(*self.0.borrow()),
                _ => Value::Undefined,
            })
        }

        fn set(&self, key: &str, value: Value) -> Result<(), EvalError> {
            if key == "count" {
                *self.0.borrow_mut() = value.to_number();
            }
            Ok(())
        }
    }

    #[test]
    fn test_host_objects_receive_writes() {
        let counter = Rc::new(Counter(RefCell::new(1.0)));
        let this = Value::Host(counter.clone());
        let compiled = Compiled::new("this.count += 4; this.count", &[]).unwrap();
        assert_eq!(compiled.call(this, vec![], vec![]).unwrap(), Value::Number(5.0));
        assert_eq!(*counter.0.borrow(), 5.0);
    }

    #[test]
    fn test_array_growth_is_bounded() {
        assert_eq!(run("let a = []; a[2] = 1; a.length"), Value::Number(3.0));
        for src in [
            "let a = []; a['18446744073709551615'] = 1",
            "let a = []; a[4e9] = 1",
            "let a = [1]; a.length = 1e12",
        ] {
            assert!(matches!(run_with(src, vec![]), Err(EvalError::Range(_))), "{src}");
        }
    }
}
