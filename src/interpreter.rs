// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::ast::*;
use crate::builtins::{self, BuiltinFcn, VARIADIC};
use crate::context::{ResourceIndex, TypePattern};
use crate::environment::ScanEnvironment;
use crate::error::EvalError;
use crate::functions::{FunctionTable, UserFunction};
use crate::lexer::Span;
use crate::number::Number;
use crate::resource::Resource;
use crate::value::*;
use crate::*;

/// Maximum nesting of user-defined function calls.
pub const MAX_CALL_DEPTH: usize = 32;

/// Maximum number of for-expression iterations in one evaluation.
pub const MAX_ITERATIONS: usize = 1_000_000;

/// Maximum number of user-defined function calls in one evaluation.
pub const MAX_FUNCTION_CALLS: usize = 100_000;

/// What an expression can see: `self`, the cross-resource index, the scan
/// environment and user-defined functions.
#[derive(Clone, Copy, Default)]
pub struct Scope<'a> {
    resource: Option<&'a Resource>,
    self_value: Option<&'a Value>,
    index: Option<&'a dyn ResourceIndex>,
    environment: Option<&'a ScanEnvironment>,
    functions: Option<&'a FunctionTable>,
}

impl<'a> Scope<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `self` to the resource's attributes.
    pub fn with_resource(mut self, resource: &'a Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Bind `self` to an arbitrary value, overriding any resource binding.
    pub fn with_self(mut self, value: &'a Value) -> Self {
        self.self_value = Some(value);
        self
    }

    pub fn with_index(mut self, index: &'a dyn ResourceIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_environment(mut self, environment: &'a ScanEnvironment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_functions(mut self, functions: &'a FunctionTable) -> Self {
        self.functions = Some(functions);
        self
    }

    fn self_value(&self) -> Value {
        match (self.self_value, self.resource) {
            (Some(v), _) => v.clone(),
            (None, Some(r)) => r.attributes_value(),
            (None, None) => Value::Undefined,
        }
    }
}

/// Evaluate `expr` within `scope`.
pub fn evaluate(expr: &Expression, scope: &Scope) -> Result<Value, EvalError> {
    Interpreter::new(scope).eval_expr(expr.expr())
}

struct Interpreter<'s, 'a> {
    scope: &'s Scope<'a>,
    self_value: Value,
    vars: Vec<(Rc<str>, Value)>,
    splat_items: Vec<Value>,
    call_depth: usize,
    calls: usize,
    iterations: usize,
}

type EvalResult = Result<Value, EvalError>;

impl<'s, 'a> Interpreter<'s, 'a> {
    fn new(scope: &'s Scope<'a>) -> Self {
        Self {
            scope,
            self_value: scope.self_value(),
            vars: vec![],
            splat_items: vec![],
            call_depth: 0,
            calls: 0,
            iterations: 0,
        }
    }

    fn lookup_var(&self, span: &Span) -> EvalResult {
        let name = span.text();
        if let Some((_, v)) = self.vars.iter().rev().find(|(n, _)| n.as_ref() == name) {
            return Ok(v.clone());
        }
        match name {
            "self" => Ok(self.self_value.clone()),
            _ => Err(EvalError::at(span, &format!("unknown variable `{name}`"))),
        }
    }

    fn to_bool(&self, expr: &Expr, v: &Value) -> Result<bool, EvalError> {
        match v {
            Value::Undefined => Err(EvalError::absent_at(
                expr.span(),
                "boolean operand is absent",
            )),
            _ => v.coerce_to_bool().map_err(|e| {
                EvalError::at(expr.span(), &format!("expected a bool: {e}"))
            }),
        }
    }

    fn to_number(&self, expr: &Expr, v: &Value) -> Result<Number, EvalError> {
        match v {
            Value::Undefined => Err(EvalError::absent_at(
                expr.span(),
                "arithmetic operand is absent",
            )),
            _ => v.coerce_to_number().map_err(|e| {
                EvalError::at(expr.span(), &format!("expected a number: {e}"))
            }),
        }
    }

    // Collections never hold the absent signal; it is stored as null.
    fn stored(v: Value) -> Value {
        match v {
            Value::Undefined => Value::Null,
            v => v,
        }
    }

    fn eval_template(&mut self, span: &Span, parts: &[TemplatePart]) -> EvalResult {
        // A lone interpolation yields its value unconverted.
        if let [TemplatePart::Interpolation(e)] = parts {
            return self.eval_expr(e);
        }

        let mut s = String::new();
        for part in parts {
            match part {
                TemplatePart::Literal(l) => s.push_str(l),
                TemplatePart::Interpolation(e) => match self.eval_expr(e)? {
                    Value::Undefined => {
                        return Err(EvalError::absent_at(
                            e.span(),
                            "template interpolation is absent",
                        ))
                    }
                    v => s.push_str(&v.coerce_to_string().map_err(|err| {
                        EvalError::at(span, &format!("invalid template interpolation: {err}"))
                    })?),
                },
            }
        }
        Ok(Value::from(s))
    }

    fn eval_arith(&mut self, span: &Span, op: &ArithOp, lhs: &ExprRef, rhs: &ExprRef) -> EvalResult {
        let l = self.eval_expr(lhs)?;
        let r = self.eval_expr(rhs)?;
        let l = self.to_number(lhs, &l)?;
        let r = self.to_number(rhs, &r)?;
        let result = match op {
            ArithOp::Add => l.add(&r),
            ArithOp::Sub => l.sub(&r),
            ArithOp::Mul => l.mul(&r),
            ArithOp::Div => l.divide(&r),
            ArithOp::Mod => l.modulo(&r),
        };
        result
            .map(Value::from)
            .map_err(|e| EvalError::at(span, &e.to_string()))
    }

    fn eval_bool_expr(&mut self, op: &BoolOp, lhs: &ExprRef, rhs: &ExprRef) -> EvalResult {
        let l = self.eval_expr(lhs)?;
        let r = self.eval_expr(rhs)?;
        let ordering = match op {
            BoolOp::Eq => return Ok(Value::Bool(l == r)),
            BoolOp::Ne => return Ok(Value::Bool(l != r)),
            _ => self.to_number(lhs, &l)?.cmp(&self.to_number(rhs, &r)?),
        };
        Ok(Value::Bool(match op {
            BoolOp::Lt => ordering.is_lt(),
            BoolOp::Le => ordering.is_le(),
            BoolOp::Gt => ordering.is_gt(),
            _ => ordering.is_ge(),
        }))
    }

    fn eval_logical_expr(&mut self, op: &LogicalOp, lhs: &ExprRef, rhs: &ExprRef) -> EvalResult {
        let l = self.eval_expr(lhs)?;
        let l = self.to_bool(lhs, &l)?;
        match (op, l) {
            (LogicalOp::And, false) => Ok(Value::Bool(false)),
            (LogicalOp::Or, true) => Ok(Value::Bool(true)),
            _ => {
                let r = self.eval_expr(rhs)?;
                Ok(Value::Bool(self.to_bool(rhs, &r)?))
            }
        }
    }

    fn eval_splat(&mut self, source: &ExprRef, each: &ExprRef) -> EvalResult {
        let items = match self.eval_expr(source)? {
            Value::Undefined | Value::Null => return Ok(Value::new_array()),
            Value::Array(items) => items,
            v => Rc::new(vec![v]),
        };

        let mut result = Vec::with_capacity(items.len());
        for item in items.iter() {
            self.splat_items.push(item.clone());
            let v = self.eval_expr(each);
            self.splat_items.pop();
            result.push(Self::stored(v?));
        }
        Ok(Value::from(result))
    }

    fn count_iteration(&mut self, span: &Span) -> Result<(), EvalError> {
        self.iterations += 1;
        if self.iterations > MAX_ITERATIONS {
            return Err(EvalError::Limit(span.message(
                "error",
                &format!("more than {MAX_ITERATIONS} for-expression iterations"),
            )));
        }
        Ok(())
    }

    // Lists iterate as (index, element); maps as (key, value) in key order.
    fn for_entries(&mut self, collection: &ExprRef) -> Result<Vec<(Value, Value)>, EvalError> {
        match self.eval_expr(collection)? {
            Value::Array(items) => Ok(items
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v.clone()))
                .collect()),
            Value::Object(fields) => {
                let mut entries: Vec<_> = fields
                    .iter()
                    .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                    .collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                Ok(entries)
            }
            Value::Undefined => Err(EvalError::absent_at(
                collection.span(),
                "for expression collection is absent",
            )),
            v => Err(EvalError::at(
                collection.span(),
                &format!("cannot iterate over a {}", v.type_name()),
            )),
        }
    }

    fn bind(&mut self, key_var: &Option<Span>, value_var: &Span, key: Value, value: Value) -> usize {
        let mark = self.vars.len();
        if let Some(k) = key_var {
            self.vars.push((k.text().into(), key));
        }
        self.vars.push((value_var.text().into(), value));
        mark
    }

    fn eval_for_cond(&mut self, cond: &Option<ExprRef>) -> Result<bool, EvalError> {
        match cond {
            Some(c) => {
                let v = self.eval_expr(c)?;
                self.to_bool(c, &v)
            }
            None => Ok(true),
        }
    }

    fn eval_for_tuple(
        &mut self,
        span: &Span,
        key_var: &Option<Span>,
        value_var: &Span,
        collection: &ExprRef,
        value: &ExprRef,
        cond: &Option<ExprRef>,
    ) -> EvalResult {
        let mut result = vec![];
        for (k, v) in self.for_entries(collection)? {
            self.count_iteration(span)?;
            let mark = self.bind(key_var, value_var, k, v);
            let item = match self.eval_for_cond(cond) {
                Ok(true) => self.eval_expr(value).map(Some),
                Ok(false) => Ok(None),
                Err(e) => Err(e),
            };
            self.vars.truncate(mark);
            if let Some(item) = item? {
                result.push(Self::stored(item));
            }
        }
        Ok(Value::from(result))
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_for_object(
        &mut self,
        span: &Span,
        key_var: &Option<Span>,
        value_var: &Span,
        collection: &ExprRef,
        key: &ExprRef,
        value: &ExprRef,
        group: bool,
        cond: &Option<ExprRef>,
    ) -> EvalResult {
        let mut result = Map::new();
        for (k, v) in self.for_entries(collection)? {
            self.count_iteration(span)?;
            let mark = self.bind(key_var, value_var, k, v);
            let entry = match self.eval_for_cond(cond) {
                Ok(true) => self.eval_object_key(key).and_then(|k| {
                    self.eval_expr(value).map(|v| Some((k, Self::stored(v))))
                }),
                Ok(false) => Ok(None),
                Err(e) => Err(e),
            };
            self.vars.truncate(mark);

            let Some((k, v)) = entry? else {
                continue;
            };
            if group {
                match result.get_mut(&k) {
                    Some(Value::Array(items)) => Rc::make_mut(items).push(v),
                    _ => {
                        result.insert(k, Value::from(vec![v]));
                    }
                }
            } else if result.contains_key(&k) {
                return Err(EvalError::at(
                    key.span(),
                    &format!("duplicate key `{k}` in for expression; use `...` to group values"),
                ));
            } else {
                result.insert(k, v);
            }
        }
        Ok(Value::from(result))
    }

    fn eval_object_key(&mut self, key: &ExprRef) -> Result<Rc<str>, EvalError> {
        match self.eval_expr(key)? {
            Value::Undefined => Err(EvalError::absent_at(key.span(), "object key is absent")),
            v => v
                .coerce_to_string()
                .map_err(|e| EvalError::at(key.span(), &format!("invalid object key: {e}"))),
        }
    }

    fn eval_object(&mut self, fields: &[(ExprRef, ExprRef)]) -> EvalResult {
        let mut map = Map::new();
        for (key, value) in fields {
            let k = self.eval_object_key(key)?;
            let v = self.eval_expr(value)?;
            map.insert(k, Self::stored(v));
        }
        Ok(Value::from(map))
    }

    fn eval_args(&mut self, args: &[ExprRef], expand_final: bool) -> Result<Vec<Value>, EvalError> {
        let mut values = Vec::with_capacity(args.len());
        for a in args {
            values.push(self.eval_expr(a)?);
        }
        if expand_final {
            let last = args.last().map(|a| a.span());
            match (values.pop(), last) {
                (Some(Value::Array(items)), _) => values.extend(items.iter().cloned()),
                (Some(v), Some(span)) => {
                    return Err(EvalError::at(
                        span,
                        &format!("cannot expand a {} into arguments", v.type_name()),
                    ))
                }
                _ => (),
            }
        }
        Ok(values)
    }

    fn ensure_arity(fcn: &str, args: &[Value], expected: usize) -> Result<(), EvalError> {
        if args.len() != expected {
            return Err(EvalError::Arity {
                function: fcn.to_string(),
                expected: match expected {
                    1 => "1 argument".to_string(),
                    n => format!("{n} arguments"),
                },
                actual: args.len(),
            });
        }
        Ok(())
    }

    fn string_arg(span: &Span, fcn: &str, v: &Value) -> Result<Rc<str>, EvalError> {
        match v {
            Value::String(s) => Ok(s.clone()),
            Value::Undefined => Err(EvalError::absent_at(
                span,
                &format!("`{fcn}` argument is absent"),
            )),
            _ => Err(EvalError::at(
                span,
                &format!("`{fcn}` expects string argument. Got `{v}` instead"),
            )),
        }
    }

    // try() and can() catch errors from their arguments, which therefore
    // are evaluated one at a time.
    fn eval_lazy_call(&mut self, span: &Span, fcn: &str, args: &[ExprRef]) -> EvalResult {
        if fcn == "can" {
            if args.len() != 1 {
                return Err(EvalError::Arity {
                    function: fcn.to_string(),
                    expected: "1 argument".to_string(),
                    actual: args.len(),
                });
            }
            return match self.eval_expr(&args[0]) {
                Ok(v) => Ok(Value::Bool(!v.is_undefined())),
                Err(e @ EvalError::Limit(_)) => Err(e),
                Err(_) => Ok(Value::Bool(false)),
            };
        }

        if args.is_empty() {
            return Err(EvalError::Arity {
                function: fcn.to_string(),
                expected: "at least 1 argument".to_string(),
                actual: 0,
            });
        }
        for a in args {
            match self.eval_expr(a) {
                Ok(v) if !v.is_undefined() => return Ok(v),
                Err(e @ EvalError::Limit(_)) => return Err(e),
                _ => (),
            }
        }
        Err(EvalError::at(
            span,
            "no expression given to `try` produced a result",
        ))
    }

    fn eval_domain_call(&mut self, span: &Span, fcn: &str, args: &[Value]) -> EvalResult {
        match fcn {
            "resources" => {
                Self::ensure_arity(fcn, args, 1)?;
                let pattern = Self::string_arg(span, fcn, &args[0])?;
                let pattern = pattern
                    .parse::<TypePattern>()
                    .map_err(|e| EvalError::at(span, &e))?;
                Ok(Value::from(match self.scope.index {
                    Some(index) => index.resources_by_type_pattern(&pattern),
                    None => vec![],
                }))
            }
            "resources_in_file" => {
                Self::ensure_arity(fcn, args, 1)?;
                let file = Self::string_arg(span, fcn, &args[0])?;
                Ok(Value::from(match self.scope.index {
                    Some(index) => index.resources_by_file(&file),
                    None => vec![],
                }))
            }
            "day_of_week" | "git_branch" => {
                Self::ensure_arity(fcn, args, 0)?;
                let env = self.scope.environment.ok_or_else(|| {
                    EvalError::at(span, &format!("`{fcn}` requires a scan environment"))
                })?;
                Ok(Value::from(match fcn {
                    "day_of_week" => env.day_of_week.as_str(),
                    _ => env.git_branch.as_str(),
                }))
            }
            "raw_expression" => {
                Self::ensure_arity(fcn, args, 1)?;
                let attr = Self::string_arg(span, fcn, &args[0])?;
                Ok(self
                    .scope
                    .resource
                    .and_then(|r| r.raw_expression(&attr))
                    .map(|raw| Value::from(raw.text()))
                    .unwrap_or(Value::Undefined))
            }
            "calls_function" => {
                Self::ensure_arity(fcn, args, 2)?;
                let attr = Self::string_arg(span, fcn, &args[0])?;
                let name = Self::string_arg(span, fcn, &args[1])?;
                Ok(Value::Bool(
                    self.scope
                        .resource
                        .and_then(|r| r.raw_expression(&attr))
                        .is_some_and(|raw| raw.calls_function(&name)),
                ))
            }
            _ => Err(EvalError::UnknownFunction(fcn.to_string())),
        }
    }

    fn call_user_function(&mut self, span: &Span, f: &UserFunction, args: Vec<Value>) -> EvalResult {
        Self::ensure_arity(&f.name, &args, f.params.len())?;
        if self.call_depth >= MAX_CALL_DEPTH {
            return Err(EvalError::Limit(span.message(
                "error",
                &format!("function calls nested deeper than {MAX_CALL_DEPTH}"),
            )));
        }
        self.calls += 1;
        if self.calls > MAX_FUNCTION_CALLS {
            return Err(EvalError::Limit(span.message(
                "error",
                &format!("more than {MAX_FUNCTION_CALLS} user function calls"),
            )));
        }

        // The body sees only its parameters and `self`.
        let bindings = f.params.iter().cloned().zip(args).collect();
        let saved_vars = core::mem::replace(&mut self.vars, bindings);
        let saved_splat = core::mem::take(&mut self.splat_items);
        self.call_depth += 1;
        let result = self.eval_expr(f.body.expr());
        self.call_depth -= 1;
        self.vars = saved_vars;
        self.splat_items = saved_splat;
        result
    }

    fn eval_call(&mut self, span: &Span, name: &Span, args: &[ExprRef], expand_final: bool) -> EvalResult {
        let fcn = name.text();
        if matches!(fcn, "try" | "can") {
            return self.eval_lazy_call(span, fcn, args);
        }

        let args = self.eval_args(args, expand_final)?;

        if builtins::DOMAIN_FUNCTIONS.contains(&fcn) {
            return self.eval_domain_call(span, fcn, &args);
        }

        if let Some(f) = self.scope.functions.and_then(|t| t.get(fcn)) {
            return self.call_user_function(span, f, args);
        }

        let (builtin, nargs): BuiltinFcn = match builtins::BUILTINS.get(fcn) {
            Some(b) => *b,
            None => {
                log::debug!("{}", name.message("error", "unknown function"));
                return Err(EvalError::UnknownFunction(fcn.to_string()));
            }
        };
        if nargs != VARIADIC {
            Self::ensure_arity(fcn, &args, nargs as usize)?;
        }
        builtin(&args).map_err(|e| EvalError::from_builtin(span, fcn, e))
    }

    fn eval_expr(&mut self, expr: &ExprRef) -> EvalResult {
        match expr.as_ref() {
            Expr::Null(_) => Ok(Value::Null),
            Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
            Expr::Number { value, .. } => Ok(Value::Number(value.clone())),
            Expr::String { value, .. } => Ok(Value::String(value.clone())),
            Expr::Template { span, parts } => self.eval_template(span, parts),
            Expr::Var(span) => self.lookup_var(span),

            Expr::GetAttr { target, name, .. } => {
                Ok(self.eval_expr(target)?.get(name.text()).clone())
            }
            Expr::Index { target, index, .. } => {
                let t = self.eval_expr(target)?;
                let i = self.eval_expr(index)?;
                Ok(t[&i].clone())
            }
            Expr::Splat { source, each, .. } => self.eval_splat(source, each),
            Expr::SplatItem(span) => self
                .splat_items
                .last()
                .cloned()
                .ok_or_else(|| EvalError::at(span, "splat item used outside of a splat")),

            Expr::Call {
                span,
                name,
                args,
                expand_final,
            } => self.eval_call(span, name, args, *expand_final),

            Expr::Unary { op, expr: e, .. } => {
                let v = self.eval_expr(e)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!self.to_bool(e, &v)?)),
                    UnaryOp::Neg => Ok(Value::from(self.to_number(e, &v)?.neg())),
                }
            }
            Expr::ArithExpr { span, op, lhs, rhs } => self.eval_arith(span, op, lhs, rhs),
            Expr::BoolExpr { op, lhs, rhs, .. } => self.eval_bool_expr(op, lhs, rhs),
            Expr::LogicalExpr { op, lhs, rhs, .. } => self.eval_logical_expr(op, lhs, rhs),
            Expr::Conditional {
                cond,
                then,
                otherwise,
                ..
            } => {
                let c = self.eval_expr(cond)?;
                if self.to_bool(cond, &c)? {
                    self.eval_expr(then)
                } else {
                    self.eval_expr(otherwise)
                }
            }

            Expr::Tuple { items, .. } => {
                let mut result = Vec::with_capacity(items.len());
                for item in items {
                    result.push(Self::stored(self.eval_expr(item)?));
                }
                Ok(Value::from(result))
            }
            Expr::Object { fields, .. } => self.eval_object(fields),
            Expr::ForTuple {
                span,
                key_var,
                value_var,
                collection,
                value,
                cond,
            } => self.eval_for_tuple(span, key_var, value_var, collection, value, cond),
            Expr::ForObject {
                span,
                key_var,
                value_var,
                collection,
                key,
                value,
                group,
                cond,
            } => self.eval_for_object(span, key_var, value_var, collection, key, value, *group, cond),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ScanContext;
    use crate::functions::UserFunction;

    fn eval_in(text: &str, scope: &Scope) -> Result<Value, EvalError> {
        let expr = Expression::parse("test", text).map_err(|e| EvalError::Message(e.to_string()))?;
        evaluate(&expr, scope)
    }

    fn eval(text: &str) -> Result<Value, EvalError> {
        eval_in(text, &Scope::new())
    }

    fn bucket() -> Resource {
        let attrs = Value::from_json_str(r#"{"acl": "private", "tags": {"env": "prod"}, "rules": [{"port": 22}, {"port": 443}]}"#);
        let attrs = match attrs {
            Ok(Value::Object(m)) => m.as_ref().clone(),
            _ => Map::new(),
        };
        Resource::new("aws_s3_bucket", "logs", attrs)
            .at("main.tf", 3, 1)
            .with_raw_expression("policy", "jsonencode({Version = \"2012-10-17\"})")
    }

    #[test]
    fn self_attributes() -> Result<(), EvalError> {
        let r = bucket();
        let scope = Scope::new().with_resource(&r);
        assert_eq!(eval_in("self.acl", &scope)?, Value::from("private"));
        assert_eq!(eval_in("self.tags.env == \"prod\"", &scope)?, Value::Bool(true));
        assert!(eval_in("self.missing.deeper", &scope)?.is_undefined());
        assert_eq!(
            eval_in("self.rules[*].port", &scope)?,
            Value::from(vec![Value::from(22u64), Value::from(443u64)])
        );
        Ok(())
    }

    #[test]
    fn absent_operands() {
        let r = bucket();
        let scope = Scope::new().with_resource(&r);
        assert!(matches!(
            eval_in("self.missing + 1", &scope),
            Err(EvalError::Absent(_))
        ));
        assert!(matches!(
            eval_in("self.missing && true", &scope),
            Err(EvalError::Absent(_))
        ));
        assert!(matches!(eval_in("self.missing == null", &scope), Ok(Value::Bool(false))));
    }

    #[test]
    fn short_circuit() -> Result<(), EvalError> {
        assert_eq!(eval("false && (1 / 0 > 0)")?, Value::Bool(false));
        assert_eq!(eval("true || undefined_fn()")?, Value::Bool(true));
        assert_eq!(eval("true ? 1 : 1 / 0")?, Value::from(1i64));
        Ok(())
    }

    #[test]
    fn try_and_can() -> Result<(), EvalError> {
        assert_eq!(eval("try(1 / 0, \"fallback\")")?, Value::from("fallback"));
        assert_eq!(eval("can(tonumber(\"x\"))")?, Value::Bool(false));
        assert_eq!(eval("can(tonumber(\"1\"))")?, Value::Bool(true));
        assert!(eval("try(1 / 0)").is_err());
        Ok(())
    }

    #[test]
    fn domain_functions() -> Result<(), EvalError> {
        let r = bucket();
        let ctx = ScanContext::new(vec![r.clone()]);
        let env = ScanEnvironment::new("Friday", "main");
        let scope = Scope::new()
            .with_resource(&r)
            .with_index(&ctx)
            .with_environment(&env);

        assert_eq!(eval_in("length(resources(\"aws_*\"))", &scope)?, Value::from(1u64));
        assert_eq!(eval_in("resources(\"google_*\")", &scope)?, Value::new_array());
        assert_eq!(eval_in("length(resources_in_file(\"./main.tf\"))", &scope)?, Value::from(1u64));
        assert_eq!(eval_in("day_of_week()", &scope)?, Value::from("Friday"));
        assert_eq!(eval_in("git_branch()", &scope)?, Value::from("main"));
        assert_eq!(
            eval_in("calls_function(\"policy\", \"jsonencode\")", &scope)?,
            Value::Bool(true)
        );
        assert!(eval_in("raw_expression(\"acl\")", &scope)?.is_undefined());
        assert!(eval_in("resources(\"a*b\")", &scope).is_err());
        assert!(eval("day_of_week()").is_err());
        Ok(())
    }

    #[test]
    fn user_functions() -> Result<(), Box<dyn std::error::Error>> {
        let mut table = FunctionTable::new();
        table.add(UserFunction::new(
            "is_prod",
            &["tags".to_string()],
            "lookup(tags, \"env\", \"\") == \"prod\"",
        )?)?;
        table.add(UserFunction::new("forever", &["n".to_string()], "forever(n)")?)?;

        let r = bucket();
        let scope = Scope::new().with_resource(&r).with_functions(&table);
        assert_eq!(eval_in("is_prod(self.tags)", &scope)?, Value::Bool(true));
        assert!(matches!(
            eval_in("is_prod()", &scope),
            Err(EvalError::Arity { .. })
        ));
        assert!(matches!(
            eval_in("forever(1)", &scope),
            Err(EvalError::Limit(_))
        ));
        Ok(())
    }

    #[test]
    fn total_function_calls_are_bounded() -> Result<(), Box<dyn std::error::Error>> {
        let mut table = FunctionTable::new();
        table.add(UserFunction::new(
            "fan",
            &["n".to_string()],
            "n > 0 ? fan(n - 1) + fan(n - 1) : 1",
        )?)?;
        let scope = Scope::new().with_functions(&table);

        assert_eq!(eval_in("fan(10)", &scope)?, Value::from(1024u64));
        match eval_in("try(fan(22), 0)", &scope) {
            Err(EvalError::Limit(m)) => assert!(m.contains("user function calls")),
            other => panic!("unexpected result {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn for_expressions() -> Result<(), EvalError> {
        assert_eq!(
            eval("[for i, v in [\"a\", \"b\"] : \"${i}${v}\" if v != \"b\"]")?,
            Value::from(vec![Value::from("0a")])
        );
        assert_eq!(
            eval("{for k, v in {b = 2, a = 1} : v => k...}")?,
            Value::from_json_str(r#"{"1": ["a"], "2": ["b"]}"#).unwrap()
        );
        assert!(eval("{for v in [\"a\", \"a\"] : v => v}").is_err());
        assert!(eval("[for v in null : v]").is_err());
        Ok(())
    }

    #[test]
    fn unknown_function() {
        assert_eq!(
            eval("nope(1)"),
            Err(EvalError::UnknownFunction("nope".to_string()))
        );
    }
}
