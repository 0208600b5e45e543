//! Expression compiler
//!
//! Turns an attribute value into something callable against a component.
//! Free identifiers are known after parsing, so each call binds only those
//! names: state keys first, then context keys, then component members.
//! Whatever stays unbound falls through to the language globals.

use crate::component::Component;
use crate::{Error, Result};
use drender_expr::{Compiled, Value};
use std::rc::Rc;

#[derive(Clone, Debug)]
enum Kind {
    /// Source named a component method
    Method(String),
    Program(Compiled),
}

/// Compiled attribute expression
#[derive(Clone, Debug)]
pub struct Expression {
    code: String,
    kind: Kind,
}

/// Compile `source` for `component` with the given formal parameters
pub fn compile(component: &Rc<Component>, source: &str, params: &[&str]) -> Result<Expression> {
    compile_with(component, source, params, str::to_string)
}

/// Like [`compile`], rewriting the source before it is parsed. A source
/// that names a method is returned as that method and is not rewritten.
pub fn compile_with(
    component: &Rc<Component>,
    source: &str,
    params: &[&str],
    transform: impl FnOnce(&str) -> String,
) -> Result<Expression> {
    let trimmed = source.trim();
    if component.has_method(trimmed) {
        return Ok(Expression { code: trimmed.to_string(), kind: Kind::Method(trimmed.to_string()) });
    }

    let code = transform(trimmed);
    match drender_expr::compile(&code, params) {
        Ok(compiled) => Ok(Expression { code, kind: Kind::Program(compiled) }),
        Err(error) => {
            tracing::error!("Error occurred when compiling expression: {}\n{}", error, code);
            Err(Error::Compile { code, error })
        }
    }
}

impl Expression {
    pub fn source(&self) -> &str {
        &self.code
    }

    pub fn is_method(&self) -> bool {
        matches!(self.kind, Kind::Method(_))
    }

    /// Evaluate with positional arguments for the formal parameters
    pub fn call(&self, component: &Rc<Component>, args: Vec<Value>) -> Result<Value> {
        match &self.kind {
            Kind::Method(name) => component.call_method(name, args),
            Kind::Program(compiled) => {
                let bindings = compiled
                    .free_identifiers()
                    .iter()
                    .filter_map(|name| component.resolve_identifier(name).map(|value| (name.clone(), value)))
                    .collect();
                compiled.call(component.this_value(), args, bindings).map_err(|error| {
                    tracing::error!("Error occurred when executing expression: {}\n{}", error, self.code);
                    Error::Eval { code: self.code.clone(), error }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ComponentClass;
    use crate::config::Config;
    use crate::runtime::Runtime;

    fn calc() -> (Runtime, Rc<Component>) {
        let rt = Runtime::from_html(r#"<div d-component="Calc" d-state="{ n: 3 }"></div>"#, Config::default()).unwrap();
        rt.register_component(ComponentClass::new("Calc").method("twice", |_, args| {
            Ok(Value::Number(args.first().map(Value::to_number).unwrap_or(0.0) * 2.0))
        }))
        .unwrap();
        rt.start().unwrap();
        let component = rt.component_for(rt.query("div").unwrap().unwrap()).unwrap();
        (rt, component)
    }

    #[test]
    fn test_state_methods_and_globals_resolve() {
        let (_rt, component) = calc();
        let expression = compile(&component, "Math.max(n, 1) + twice(2)", &[]).unwrap();
        assert_eq!(expression.call(&component, vec![]).unwrap(), Value::Number(7.0));
    }

    #[test]
    fn test_params_shadow_state() {
        let (_rt, component) = calc();
        let expression = compile(&component, "n * 10", &["n"]).unwrap();
        assert_eq!(expression.call(&component, vec![Value::Number(2.0)]).unwrap(), Value::Number(20.0));
    }

    #[test]
    fn test_method_name_skips_the_transform() {
        let (_rt, component) = calc();
        let expression = compile_with(&component, "twice", &["event"], |s| format!("({s})()")).unwrap();
        assert!(expression.is_method());
        assert_eq!(expression.source(), "twice");
        assert_eq!(expression.call(&component, vec![Value::Number(4.0)]).unwrap(), Value::Number(8.0));

        let wrapped = compile_with(&component, "{ n: 1 }", &[], |s| format!("this.setState({s})")).unwrap();
        assert_eq!(wrapped.source(), "this.setState({ n: 1 })");
    }

    #[test]
    fn test_failures_keep_their_source() {
        let (_rt, component) = calc();
        assert!(matches!(compile(&component, "1 +", &[]), Err(Error::Compile { code, .. }) if code == "1 +"));
        let missing = compile(&component, "nothing + 1", &[]).unwrap();
        assert!(matches!(missing.call(&component, vec![]), Err(Error::Eval { code, .. }) if code == "nothing + 1"));
    }
}
