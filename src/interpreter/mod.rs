//! Tree-walking evaluator over the AST.

use std::rc::Rc;

use crate::ast::{ArmMode, BinOp, Expr, ExprKind, Pattern, Program, Span};
use crate::error::{ErrorKind, EvalError, EvalResult, Origin};
use crate::module;
use crate::pattern::{match_pattern, Bindings};
use crate::runtime::ops::{eval_binop, eval_unary};
use crate::runtime::{
    builtins, check_key, Accepted, Closure, ClosureBody, Curry, Env, Host, Value, ValueMap,
};
use crate::session::{ensure_sufficient_stack, Session};
use crate::vm::Vm;

pub struct Interpreter {
    session: Rc<Session>,
    origin: Rc<Origin>,
    trace_depth: usize,
}

impl Interpreter {
    pub fn new(session: Rc<Session>, origin: Rc<Origin>) -> Self {
        Interpreter { session, origin, trace_depth: 0 }
    }

    /// Evaluates a program in a fresh scope over the builtins; the value
    /// of the last item is the result.
    pub fn run(&mut self, program: &Program) -> EvalResult<Value> {
        let env = Env::child(&builtins::scope());
        self.run_in(program, &env)
    }

    pub fn run_in(&mut self, program: &Program, env: &Env) -> EvalResult<Value> {
        let mut result = Value::Unit;
        for item in &program.items {
            result = self.eval_in(item, env)?;
        }
        Ok(result)
    }

    pub fn eval_in(&mut self, expr: &Expr, env: &Env) -> EvalResult<Value> {
        if self.session.tracing() {
            self.trace_depth += 1;
            self.trace_line(&format!("→ {}", expr.label()));
        }
        let result = ensure_sufficient_stack(|| self.eval_kind(expr, env))
            .map_err(|e| e.with_location(Some(expr.span), &self.origin));
        if self.session.tracing() {
            if let Ok(v) = &result {
                self.trace_line(&format!("← {} = {v}", expr.label()));
            }
            self.trace_depth = self.trace_depth.saturating_sub(1);
        }
        result
    }

    fn eval_kind(&mut self, expr: &Expr, env: &Env) -> EvalResult<Value> {
        match &expr.node {
            ExprKind::Unit => Ok(Value::Unit),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(i) => Ok(Value::Int(i.clone())),
            ExprKind::Dec(d) => Ok(Value::Dec(*d)),
            ExprKind::Text(s) => Ok(Value::text(s)),
            ExprKind::Name(name) => Ok(env.lookup(name)?),

            ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_all(items, env)?)),
            ExprKind::List(items) => Ok(Value::list(self.eval_all(items, env)?)),
            ExprKind::Map(entries) => {
                let mut map = ValueMap::new();
                for (k, v) in entries {
                    let key = self.eval_in(k, env)?;
                    check_key(&key).map_err(|e| e.with_location(Some(k.span), &self.origin))?;
                    let value = self.eval_in(v, env)?;
                    let kind = key.kind_name();
                    map.insert(key, value).map_err(|_| {
                        EvalError::new(ErrorKind::Unhashable, format!("Unhashable map key: {kind}"))
                    })?;
                }
                Ok(Value::Map(Rc::new(map)))
            }
            ExprKind::Variant { tag, payload } => Ok(Value::variant(tag, self.eval_in(payload, env)?)),

            ExprKind::Bind { name, value } => {
                let v = self.eval_in(value, env)?.named(name);
                env.define(name, v.clone())?;
                Ok(v)
            }
            ExprKind::Mutate { name, value } => {
                let v = self.eval_in(value, env)?;
                env.mutate(name, v.clone())?;
                Ok(v)
            }
            ExprKind::Block(items) => {
                let scope = Env::child(env);
                let mut result = Value::Unit;
                for item in items {
                    result = self.eval_in(item, &scope)?;
                }
                Ok(result)
            }
            ExprKind::Lambda { params, body } => Ok(Value::Closure(Rc::new(Closure::new(
                Rc::clone(params),
                ClosureBody::Ast(Rc::clone(body)),
                env.clone(),
                Rc::clone(&self.origin),
            )))),
            ExprKind::Call { func, arg } => {
                let f = self.eval_in(func, env)?;
                let a = self.eval_in(arg, env)?;
                self.apply(f, a, Some(expr.span))
            }

            ExprKind::Unary { op, operand } => {
                let v = self.eval_in(operand, env)?;
                eval_unary(*op, &v)
            }
            ExprKind::Binary { op: BinOp::And, left, right } => {
                if !self.eval_in(left, env)?.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_in(right, env)?.is_truthy()))
            }
            ExprKind::Binary { op: BinOp::Or, left, right } => {
                if self.eval_in(left, env)?.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_in(right, env)?.is_truthy()))
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.eval_in(left, env)?;
                let r = self.eval_in(right, env)?;
                eval_binop(*op, &l, &r)
            }

            ExprKind::Dispatch { scrutinee, arms } => {
                let value = self.eval_in(scrutinee, env)?;
                for arm in arms {
                    if let Some(bindings) = self.match_arm(&arm.pattern, &value, arm.span)? {
                        let scope = Env::child(env);
                        scope.define_all(bindings)?;
                        return self.eval_in(&arm.body, &scope);
                    }
                }
                Err(EvalError::new(ErrorKind::NoArmMatched, "No dispatch arm matched"))
            }
            ExprKind::Cycle { seed, arms } => {
                let mut state = self.eval_in(seed, env)?;
                'cycle: loop {
                    for arm in arms {
                        if let Some(bindings) = self.match_arm(&arm.pattern, &state, arm.span)? {
                            let scope = Env::child(env);
                            scope.define_all(bindings)?;
                            let result = self.eval_in(&arm.body, &scope)?;
                            match arm.mode {
                                ArmMode::Continue => {
                                    state = result;
                                    continue 'cycle;
                                }
                                ArmMode::Finish => return Ok(result),
                            }
                        }
                    }
                    return Err(EvalError::new(ErrorKind::NoArmMatched, "No cycle arm matched"));
                }
            }
        }
    }

    fn eval_all(&mut self, items: &[Expr], env: &Env) -> EvalResult<Vec<Value>> {
        items.iter().map(|item| self.eval_in(item, env)).collect()
    }

    fn match_arm(&self, pattern: &Pattern, value: &Value, span: Span) -> EvalResult<Option<Bindings>> {
        match_pattern(pattern, value).map_err(|e| e.with_location(Some(span), &self.origin))
    }

    /// Applies one argument to a callable value.
    pub fn apply(&mut self, func: Value, arg: Value, call_span: Option<Span>) -> EvalResult<Value> {
        let origin = Rc::clone(&self.origin);
        match func {
            Value::Builtin(b) => match b.bind(arg).map_err(|e| e.with_location(call_span, &origin))? {
                Curry::Partial(partial) => Ok(Value::Builtin(Rc::new(partial))),
                Curry::Saturated(args) => {
                    (b.func)(self, &args, call_span).map_err(|e| e.with_location(call_span, &origin))
                }
            },
            Value::Closure(c) => match c.accept(&arg, call_span).map_err(|e| e.with_location(call_span, &origin))? {
                Accepted::Partial(next) => Ok(Value::Closure(Rc::new(next))),
                Accepted::Saturated(scope) => {
                    let _depth = self.session.enter().map_err(|e| e.with_location(call_span, &origin))?;
                    self.call_body(&c, &scope)
                        .map_err(|e| e.with_frame(format!("call {}", c.label()), call_span))
                }
            },
            other => Err(EvalError::new(
                ErrorKind::NotCallable,
                format!("Value is not callable: {}", other.kind_name()),
            )
            .with_location(call_span, &origin)),
        }
    }

    fn call_body(&mut self, closure: &Closure, scope: &Env) -> EvalResult<Value> {
        match &closure.body {
            ClosureBody::Ast(body) => {
                let saved = std::mem::replace(&mut self.origin, Rc::clone(&closure.origin));
                let result = self.eval_in(body, scope);
                self.origin = saved;
                result
            }
            ClosureBody::Code(code) => {
                Vm::new(Rc::clone(&self.session), Rc::clone(&closure.origin)).run_in(code, scope.clone())
            }
        }
    }

    fn trace_line(&self, text: &str) {
        let pad = "  ".repeat(self.trace_depth.saturating_sub(1));
        self.session.trace(&format!("{pad}{text}"));
    }
}

impl Host for Interpreter {
    fn apply(&mut self, func: Value, arg: Value, call_span: Option<Span>) -> EvalResult<Value> {
        Interpreter::apply(self, func, arg, call_span)
    }

    fn say(&mut self, line: &str) -> EvalResult<()> {
        self.session.say(line)
    }

    fn hear(&mut self, prompt: &str) -> EvalResult<String> {
        self.session.hear(prompt)
    }

    fn link(&mut self, path: &str, member: &str, call_span: Option<Span>) -> EvalResult<Value> {
        let session = Rc::clone(&self.session);
        let mut evaluate = |program: &Program, env: &Env, origin: Rc<Origin>| -> EvalResult<()> {
            Interpreter::new(Rc::clone(&session), origin).run_in(program, env)?;
            Ok(())
        };
        module::link(&session, &self.origin, path, member, call_span, &mut evaluate)
    }
}
