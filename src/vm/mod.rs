//! Stack virtual machine for compiled [`Code`].

use std::rc::Rc;

use crate::ast::{Program, Span};
use crate::error::{ErrorKind, EvalError, EvalResult, Origin};
use crate::interpreter::Interpreter;
use crate::module;
use crate::pattern::{match_pattern, Bindings};
use crate::runtime::ops::{eval_binop, eval_unary};
use crate::runtime::{
    builtins, check_key, Accepted, Closure, ClosureBody, Curry, Env, Host, Value, ValueMap,
};
use crate::session::{ensure_sufficient_stack, Session};

pub mod bytecode;
pub mod compiler;

pub use bytecode::{Code, Instr, Op};
pub use compiler::{compile, CompileError};

/// Result of running a program on the VM.
#[derive(Debug, Clone)]
pub struct Execution {
    pub value: Value,
    /// Instructions executed, including closure bodies and module loads.
    pub instructions: u64,
}

/// Per-invocation machine state: one per code object being run.
struct Frame {
    stack: Vec<Value>,
    env: Env,
    /// Bindings from the last `MATCH`; `None` after a failed match.
    matched: Option<Bindings>,
}

impl Frame {
    fn pop(&mut self) -> EvalResult<Value> {
        self.stack.pop().ok_or_else(underflow)
    }

    fn peek(&self) -> EvalResult<&Value> {
        self.stack.last().ok_or_else(underflow)
    }

    fn pop_n(&mut self, n: usize) -> EvalResult<Vec<Value>> {
        let at = self.stack.len().checked_sub(n).ok_or_else(underflow)?;
        Ok(self.stack.split_off(at))
    }
}

fn underflow() -> EvalError {
    EvalError::internal("Internal VM error: operand stack underflow")
}

enum Flow {
    Next,
    Jump(usize),
    Halt(Value),
}

pub struct Vm {
    session: Rc<Session>,
    origin: Rc<Origin>,
}

impl Vm {
    pub fn new(session: Rc<Session>, origin: Rc<Origin>) -> Self {
        Vm { session, origin }
    }

    /// Runs top-level code in a fresh program scope over the builtins.
    pub fn execute(&mut self, code: &Code) -> EvalResult<Execution> {
        let start = self.session.instructions();
        let env = Env::child(&builtins::scope());
        let value = self.run_in(code, env)?;
        Ok(Execution { value, instructions: self.session.instructions() - start })
    }

    /// Runs `code` with `env` as the live scope.
    pub fn run_in(&mut self, code: &Code, env: Env) -> EvalResult<Value> {
        ensure_sufficient_stack(|| self.run_frame(code, env))
    }

    fn run_frame(&mut self, code: &Code, env: Env) -> EvalResult<Value> {
        let mut frame = Frame { stack: Vec::with_capacity(16), env, matched: None };
        let mut pc = 0;
        while let Some(instr) = code.instrs.get(pc) {
            if self.session.tracing() {
                self.trace_step(code, pc, instr, &frame.stack);
            }
            self.session.count_instruction();
            match self.step(instr, &mut frame) {
                Ok(Flow::Next) => pc += 1,
                Ok(Flow::Jump(target)) => pc = target,
                Ok(Flow::Halt(value)) => return Ok(value),
                Err(e) => return Err(e.with_location(instr.span, &self.origin)),
            }
        }
        Ok(frame.stack.pop().unwrap_or(Value::Unit))
    }

    fn step(&mut self, instr: &Instr, frame: &mut Frame) -> EvalResult<Flow> {
        match &instr.op {
            Op::Const(v) => frame.stack.push(v.clone()),
            Op::Load(name) => {
                let v = frame.env.lookup(name)?;
                frame.stack.push(v);
            }
            Op::Def(name) => {
                let v = frame.pop()?.named(name);
                frame.env.define(name, v.clone())?;
                frame.stack.push(v);
            }
            Op::Set(name) => {
                let v = frame.pop()?;
                frame.env.mutate(name, v.clone())?;
                frame.stack.push(v);
            }
            Op::Pop => {
                frame.pop()?;
            }
            Op::Dup => {
                let v = frame.peek()?.clone();
                frame.stack.push(v);
            }
            Op::PushEnv => frame.env = Env::child(&frame.env),
            Op::PopEnv => {
                frame.env = frame
                    .env
                    .parent()
                    .ok_or_else(|| EvalError::internal("Internal VM error: POP_ENV at the outermost scope"))?;
            }
            Op::PushEnvBind => {
                let bindings = frame
                    .matched
                    .take()
                    .ok_or_else(|| EvalError::internal("Internal VM error: PUSH_ENV_BIND without a match"))?;
                let scope = Env::child(&frame.env);
                scope.define_all(bindings)?;
                frame.env = scope;
            }
            Op::MakeTuple(n) => {
                let items = frame.pop_n(*n)?;
                frame.stack.push(Value::tuple(items));
            }
            Op::MakeList(n) => {
                let items = frame.pop_n(*n)?;
                frame.stack.push(Value::list(items));
            }
            Op::MakeMap(n) => {
                let flat = frame.pop_n(n * 2)?;
                let mut map = ValueMap::new();
                let mut it = flat.into_iter();
                while let (Some(k), Some(v)) = (it.next(), it.next()) {
                    let kind = k.kind_name();
                    map.insert(k, v).map_err(|_| {
                        EvalError::new(ErrorKind::Unhashable, format!("Unhashable map key: {kind}"))
                    })?;
                }
                frame.stack.push(Value::Map(Rc::new(map)));
            }
            Op::CheckKey => check_key(frame.peek()?)?,
            Op::MakeVariant(tag) => {
                let payload = frame.pop()?;
                frame.stack.push(Value::variant(tag, payload));
            }
            Op::MakeClosure { code, params } => {
                let closure = Closure::new(
                    Rc::clone(params),
                    ClosureBody::Code(Rc::clone(code)),
                    frame.env.clone(),
                    Rc::clone(&self.origin),
                );
                frame.stack.push(Value::Closure(Rc::new(closure)));
            }
            Op::Call => {
                let arg = frame.pop()?;
                let func = frame.pop()?;
                let result = self.apply(func, arg, instr.span)?;
                frame.stack.push(result);
            }
            Op::Unary(op) => {
                let v = frame.pop()?;
                frame.stack.push(eval_unary(*op, &v)?);
            }
            Op::Binary(op) => {
                let right = frame.pop()?;
                let left = frame.pop()?;
                frame.stack.push(eval_binop(*op, &left, &right)?);
            }
            Op::ToBool => {
                let v = frame.pop()?;
                frame.stack.push(Value::Bool(v.is_truthy()));
            }
            Op::Jmp(target) => return Ok(Flow::Jump(*target)),
            Op::JmpIfFalse(target) => {
                if !frame.pop()?.is_truthy() {
                    return Ok(Flow::Jump(*target));
                }
            }
            Op::JmpIfTrue(target) => {
                if frame.pop()?.is_truthy() {
                    return Ok(Flow::Jump(*target));
                }
            }
            Op::JmpIfNone(target) => {
                if frame.matched.is_none() {
                    return Ok(Flow::Jump(*target));
                }
            }
            Op::Match(pattern) => {
                let v = frame.pop()?;
                frame.matched = match_pattern(pattern, &v)?;
            }
            Op::Raise(kind, message) => return Err(EvalError::new(*kind, *message)),
            Op::Halt => return Ok(Flow::Halt(frame.stack.pop().unwrap_or(Value::Unit))),
        }
        Ok(Flow::Next)
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
                    self.call_body(&c, scope)
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

    fn call_body(&mut self, closure: &Closure, scope: Env) -> EvalResult<Value> {
        match &closure.body {
            ClosureBody::Code(code) => {
                let saved = std::mem::replace(&mut self.origin, Rc::clone(&closure.origin));
                let result = self.run_in(code, scope);
                self.origin = saved;
                result
            }
            ClosureBody::Ast(body) => {
                Interpreter::new(Rc::clone(&self.session), Rc::clone(&closure.origin)).eval_in(body, &scope)
            }
        }
    }

    fn trace_step(&self, code: &Code, pc: usize, instr: &Instr, stack: &[Value]) {
        let pad = "  ".repeat(self.session.call_depth());
        let top = stack.last().map(Value::to_string).unwrap_or_default();
        self.session.trace(&format!("{pad}{}:{pc:04} {} | top={top}", code.name, instr.op));
    }
}

impl Host for Vm {
    fn apply(&mut self, func: Value, arg: Value, call_span: Option<Span>) -> EvalResult<Value> {
        Vm::apply(self, func, arg, call_span)
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
            let code = compile(program, &origin.name())?;
            Vm::new(Rc::clone(&session), origin).run_in(&code, env.clone())?;
            Ok(())
        };
        module::link(&session, &self.origin, path, member, call_span, &mut evaluate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::Expr;
    use crate::session::{Console, SessionConfig};

    fn session(config: SessionConfig) -> Rc<Session> {
        Rc::new(Session::new(config).with_console(Console::capture()))
    }

    fn run(program: &Program) -> EvalResult<Execution> {
        let s = session(SessionConfig::default());
        let code = compile(program, "<main>")?;
        Vm::new(s, Rc::new(Origin::anonymous())).execute(&code)
    }

    #[test]
    fn adds_and_counts_instructions() {
        let out = run(&program(vec![add(int(1), int(2))])).unwrap();
        assert_eq!(out.value, Value::int(3));
        assert_eq!(out.instructions, 4);
    }

    #[test]
    fn curried_closure_call() {
        let p = program(vec![
            bind("add", lambda(vec![p_name("a"), p_name("b")], add(name("a"), name("b")))),
            bind("inc", call(name("add"), int(1))),
            call(name("inc"), int(41)),
        ]);
        assert_eq!(run(&p).unwrap().value, Value::int(42));
    }

    #[test]
    fn bound_closure_is_named() {
        let p = program(vec![bind("f", lambda(vec![p_wild()], unit())), name("f")]);
        assert_eq!(run(&p).unwrap().value.to_string(), "<⌁ f>");
    }

    #[test]
    fn dispatch_picks_first_matching_arm() {
        let d = |v: Expr| {
            dispatch(
                v,
                vec![
                    arm(p_variant("Ok", p_name("x")), add(name("x"), int(1))),
                    arm(p_variant("Err", p_name("x")), add(name("x"), int(2))),
                ],
            )
        };
        assert_eq!(run(&program(vec![d(variant("Ok", int(41)))])).unwrap().value, Value::int(42));
        assert_eq!(run(&program(vec![d(variant("Err", int(41)))])).unwrap().value, Value::int(43));
        let err = run(&program(vec![d(int(0).at(2, 1)).at(2, 1)])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoArmMatched);
        assert_eq!(err.line_col(), Some((2, 1)));
    }

    #[test]
    fn block_scope_is_dropped_on_exit() {
        let p = program(vec![block(vec![bind("x", int(1))]), name("x").at(1, 9)]);
        let err = run(&p).unwrap_err();
        assert_eq!(err.message, "Undefined name 'x'");
        assert_eq!(err.line_col(), Some((1, 9)));
    }

    #[test]
    fn runaway_recursion_is_stack_exceeded() {
        let s = session(SessionConfig { max_call_depth: 50, ..Default::default() });
        let p = program(vec![
            bind("f", lambda(vec![p_name("n")], call(name("f"), name("n")))),
            call(name("f"), int(0)).at(3, 1),
        ]);
        let code = compile(&p, "<main>").unwrap();
        let err = Vm::new(Rc::clone(&s), Rc::new(Origin::anonymous())).execute(&code).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StackExceeded);
        assert_eq!(s.call_depth(), 0);
    }

    #[test]
    fn stack_underflow_is_internal_not_a_panic() {
        let code = Code {
            name: "bad".into(),
            instrs: vec![Instr { op: Op::Pop, span: Some(Span::at(1, 1)) }],
        };
        let s = session(SessionConfig::default());
        let err = Vm::new(s, Rc::new(Origin::anonymous())).execute(&code).unwrap_err();
        assert_eq!(err.code(), "E-INTERNAL");
        assert_eq!(err.line_col(), Some((1, 1)));
    }

    #[test]
    fn trace_lines_go_to_the_trace_channel() {
        let s = session(SessionConfig { trace: true, ..Default::default() });
        let code = compile(&program(vec![call(name("say"), text("hi"))]), "<main>").unwrap();
        Vm::new(Rc::clone(&s), Rc::new(Origin::anonymous())).execute(&code).unwrap();
        let console = s.console();
        assert_eq!(console.output(), "hi\n");
        let trace: Vec<&str> = console.trace_output().lines().collect();
        assert_eq!(trace[0], "<main>:0000 LOAD say | top=");
        assert_eq!(trace[2], "<main>:0002 CALL | top=hi");
    }
}
