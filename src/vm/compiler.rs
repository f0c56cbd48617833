use std::rc::Rc;

use crate::ast::{ArmMode, BinOp, Expr, ExprKind, Program, Span};
use crate::error::{ErrorKind, EvalError};
use crate::runtime::Value;
use crate::session::ensure_sufficient_stack;

use super::bytecode::{Code, Instr, Op};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("unresolved jump label L{label} at {code}:{pc:04}")]
    UnresolvedLabel { code: String, label: usize, pc: usize },
    #[error("jump at {code}:{pc:04} targets {target}, past the end of the code")]
    TargetOutOfRange { code: String, pc: usize, target: usize },
}

impl From<CompileError> for EvalError {
    fn from(e: CompileError) -> Self {
        EvalError::internal(format!("Internal compiler error: {e}"))
    }
}

// ── Builder ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Label(usize);

/// Instruction buffer for one code object. Jumps name labels; targets are
/// filled in by `finalize`.
struct Builder {
    name: String,
    instrs: Vec<Instr>,
    labels: Vec<Option<usize>>,
    patches: Vec<(usize, Label)>,
}

impl Builder {
    fn new(name: impl Into<String>) -> Self {
        Builder { name: name.into(), instrs: Vec::new(), labels: Vec::new(), patches: Vec::new() }
    }

    fn emit(&mut self, op: Op, span: Span) -> usize {
        self.instrs.push(Instr { op, span: Some(span) });
        self.instrs.len() - 1
    }

    fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    fn mark(&mut self, label: Label) {
        self.labels[label.0] = Some(self.instrs.len());
    }

    fn jump(&mut self, op: fn(usize) -> Op, label: Label, span: Span) {
        let pc = self.emit(op(usize::MAX), span);
        self.patches.push((pc, label));
    }

    fn finalize(mut self) -> Result<Code, CompileError> {
        for &(pc, label) in &self.patches {
            let target = self.labels[label.0].ok_or_else(|| CompileError::UnresolvedLabel {
                code: self.name.clone(),
                label: label.0,
                pc,
            })?;
            self.instrs[pc].op.retarget(target);
        }
        for (pc, instr) in self.instrs.iter().enumerate() {
            if let Some(target) = instr.op.target().filter(|t| *t > self.instrs.len()) {
                return Err(CompileError::TargetOutOfRange { code: self.name.clone(), pc, target });
            }
        }
        Ok(Code { name: self.name, instrs: self.instrs })
    }
}

// ── Compiler ─────────────────────────────────────────────────────────

/// Lowers a program into a named code object.
pub fn compile(program: &Program, name: &str) -> Result<Code, CompileError> {
    let code = Compiler::default().program(program, name)?;
    tracing::debug!(code = name, instructions = code.len(), "compiled program");
    Ok(code)
}

#[derive(Default)]
struct Compiler {
    lambdas: usize,
    /// Nearest known span around the node being lowered.
    enclosing: Span,
}

/// Nodes without a position report at the nearest positioned ancestor.
fn known_or(span: Span, fallback: Span) -> Span {
    if span.is_known() { span } else { fallback }
}

impl Compiler {
    fn program(&mut self, program: &Program, name: &str) -> Result<Code, CompileError> {
        let mut b = Builder::new(name);
        if program.items.is_empty() {
            b.emit(Op::Const(Value::Unit), program.span);
        }
        self.sequence(&mut b, &program.items)?;
        b.emit(Op::Halt, program.span);
        b.finalize()
    }

    /// Evaluates items in order, keeping only the last value.
    fn sequence(&mut self, b: &mut Builder, items: &[Expr]) -> Result<(), CompileError> {
        for (i, item) in items.iter().enumerate() {
            self.expr(b, item)?;
            if i + 1 != items.len() {
                b.emit(Op::Pop, item.span);
            }
        }
        Ok(())
    }

    fn expr(&mut self, b: &mut Builder, e: &Expr) -> Result<(), CompileError> {
        let span = known_or(e.span, self.enclosing);
        let outer = std::mem::replace(&mut self.enclosing, span);
        let lowered = ensure_sufficient_stack(|| self.lower(b, e, span));
        self.enclosing = outer;
        lowered
    }

    fn lower(&mut self, b: &mut Builder, e: &Expr, span: Span) -> Result<(), CompileError> {
        match &e.node {
            ExprKind::Unit => {
                b.emit(Op::Const(Value::Unit), span);
            }
            ExprKind::Bool(v) => {
                b.emit(Op::Const(Value::Bool(*v)), span);
            }
            ExprKind::Int(i) => {
                b.emit(Op::Const(Value::Int(i.clone())), span);
            }
            ExprKind::Dec(d) => {
                b.emit(Op::Const(Value::Dec(*d)), span);
            }
            ExprKind::Text(s) => {
                b.emit(Op::Const(Value::text(s)), span);
            }
            ExprKind::Name(name) => {
                b.emit(Op::Load(Rc::from(name.as_str())), span);
            }
            ExprKind::Bind { name, value } => {
                self.expr(b, value)?;
                b.emit(Op::Def(Rc::from(name.as_str())), span);
            }
            ExprKind::Mutate { name, value } => {
                self.expr(b, value)?;
                b.emit(Op::Set(Rc::from(name.as_str())), span);
            }
            ExprKind::Block(items) => {
                b.emit(Op::PushEnv, span);
                if items.is_empty() {
                    b.emit(Op::Const(Value::Unit), span);
                }
                self.sequence(b, items)?;
                b.emit(Op::PopEnv, span);
            }
            ExprKind::Tuple(items) => {
                for item in items {
                    self.expr(b, item)?;
                }
                b.emit(Op::MakeTuple(items.len()), span);
            }
            ExprKind::List(items) => {
                for item in items {
                    self.expr(b, item)?;
                }
                b.emit(Op::MakeList(items.len()), span);
            }
            ExprKind::Map(entries) => {
                for (key, value) in entries {
                    self.expr(b, key)?;
                    b.emit(Op::CheckKey, known_or(key.span, span));
                    self.expr(b, value)?;
                }
                b.emit(Op::MakeMap(entries.len()), span);
            }
            ExprKind::Variant { tag, payload } => {
                self.expr(b, payload)?;
                b.emit(Op::MakeVariant(Rc::from(tag.as_str())), span);
            }
            ExprKind::Lambda { params, body } => {
                self.lambdas += 1;
                let mut inner = Builder::new(format!("<lambda:{}>", self.lambdas));
                // Errors in a body without positions surface at the call site instead.
                let outer = std::mem::take(&mut self.enclosing);
                let lowered = self.expr(&mut inner, body);
                self.enclosing = outer;
                lowered?;
                inner.emit(Op::Halt, body.span);
                let code = Rc::new(inner.finalize()?);
                b.emit(Op::MakeClosure { code, params: Rc::clone(params) }, span);
            }
            ExprKind::Call { func, arg } => {
                self.expr(b, func)?;
                self.expr(b, arg)?;
                b.emit(Op::Call, span);
            }
            ExprKind::Unary { op, operand } => {
                self.expr(b, operand)?;
                b.emit(Op::Unary(*op), span);
            }
            ExprKind::Binary { op: op @ (BinOp::And | BinOp::Or), left, right } => {
                let (branch, short_value): (fn(usize) -> Op, bool) = match op {
                    BinOp::And => (Op::JmpIfFalse, false),
                    _ => (Op::JmpIfTrue, true),
                };
                let short = b.label();
                let end = b.label();
                self.expr(b, left)?;
                b.jump(branch, short, span);
                self.expr(b, right)?;
                b.emit(Op::ToBool, span);
                b.jump(Op::Jmp, end, span);
                b.mark(short);
                b.emit(Op::Const(Value::Bool(short_value)), span);
                b.mark(end);
            }
            ExprKind::Binary { op, left, right } => {
                self.expr(b, left)?;
                self.expr(b, right)?;
                b.emit(Op::Binary(*op), span);
            }
            ExprKind::Dispatch { scrutinee, arms } => {
                let end = b.label();
                self.expr(b, scrutinee)?;
                for arm in arms {
                    let next = b.label();
                    let arm_span = known_or(arm.span, span);
                    self.arm_head(b, &arm.pattern, arm_span, next);
                    self.expr(b, &arm.body)?;
                    b.emit(Op::PopEnv, arm_span);
                    b.jump(Op::Jmp, end, arm_span);
                    b.mark(next);
                }
                b.emit(Op::Pop, span);
                b.emit(Op::Raise(ErrorKind::NoArmMatched, "No dispatch arm matched"), span);
                b.mark(end);
            }
            ExprKind::Cycle { seed, arms } => {
                let top = b.label();
                let end = b.label();
                self.expr(b, seed)?;
                b.mark(top);
                for arm in arms {
                    let next = b.label();
                    let arm_span = known_or(arm.span, span);
                    self.arm_head(b, &arm.pattern, arm_span, next);
                    self.expr(b, &arm.body)?;
                    b.emit(Op::PopEnv, arm_span);
                    let exit = match arm.mode {
                        ArmMode::Continue => top,
                        ArmMode::Finish => end,
                    };
                    b.jump(Op::Jmp, exit, arm_span);
                    b.mark(next);
                }
                b.emit(Op::Pop, span);
                b.emit(Op::Raise(ErrorKind::NoArmMatched, "No cycle arm matched"), span);
                b.mark(end);
            }
        }
        Ok(())
    }

    /// Tests the value on the stack top against one arm; on success the
    /// bindings are in scope and the value is gone, on failure control
    /// reaches `next` with the value still on the stack.
    fn arm_head(&mut self, b: &mut Builder, pattern: &crate::ast::Pattern, span: Span, next: Label) {
        b.emit(Op::Dup, span);
        b.emit(Op::Match(Rc::new(pattern.clone())), span);
        b.jump(Op::JmpIfNone, next, span);
        b.emit(Op::PushEnvBind, span);
        b.emit(Op::Pop, span);
    }
}
