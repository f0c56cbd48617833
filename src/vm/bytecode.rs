use std::fmt;
use std::rc::Rc;

use crate::ast::{BinOp, Pattern, Span, UnaryOp};
use crate::error::ErrorKind;
use crate::runtime::Value;

// ── Instructions ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Op {
    Const(Value),
    Load(Rc<str>),
    /// Binds the stack top in the current scope; the value stays on the stack.
    Def(Rc<str>),
    /// Overwrites the nearest binding; the value stays on the stack.
    Set(Rc<str>),
    Pop,
    Dup,
    PushEnv,
    PopEnv,
    /// Opens a scope holding the bindings of the last successful `Match`.
    PushEnvBind,
    MakeTuple(usize),
    MakeList(usize),
    MakeMap(usize),
    /// Rejects an unhashable map key sitting on the stack top.
    CheckKey,
    MakeVariant(Rc<str>),
    MakeClosure {
        code: Rc<Code>,
        params: Rc<Vec<Pattern>>,
    },
    Call,
    Unary(UnaryOp),
    Binary(BinOp),
    ToBool,
    Jmp(usize),
    JmpIfFalse(usize),
    JmpIfTrue(usize),
    /// Jumps when the last `Match` failed.
    JmpIfNone(usize),
    Match(Rc<Pattern>),
    Raise(ErrorKind, &'static str),
    Halt,
}

impl Op {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Const(_) => "CONST",
            Op::Load(_) => "LOAD",
            Op::Def(_) => "DEF",
            Op::Set(_) => "SET",
            Op::Pop => "POP",
            Op::Dup => "DUP",
            Op::PushEnv => "PUSH_ENV",
            Op::PopEnv => "POP_ENV",
            Op::PushEnvBind => "PUSH_ENV_BIND",
            Op::MakeTuple(_) => "MAKE_TUPLE",
            Op::MakeList(_) => "MAKE_LIST",
            Op::MakeMap(_) => "MAKE_MAP",
            Op::CheckKey => "CHECK_KEY",
            Op::MakeVariant(_) => "MAKE_VARIANT",
            Op::MakeClosure { .. } => "MAKE_CLOSURE",
            Op::Call => "CALL",
            Op::Unary(_) => "UNARY",
            Op::Binary(_) => "BINARY",
            Op::ToBool => "TO_BOOL",
            Op::Jmp(_) => "JMP",
            Op::JmpIfFalse(_) => "JMP_IF_FALSE",
            Op::JmpIfTrue(_) => "JMP_IF_TRUE",
            Op::JmpIfNone(_) => "JMP_IF_NONE",
            Op::Match(_) => "MATCH",
            Op::Raise(..) => "RAISE",
            Op::Halt => "HALT",
        }
    }

    /// Jump target, for the instructions that have one.
    pub fn target(&self) -> Option<usize> {
        match self {
            Op::Jmp(t) | Op::JmpIfFalse(t) | Op::JmpIfTrue(t) | Op::JmpIfNone(t) => Some(*t),
            _ => None,
        }
    }

    pub(crate) fn retarget(&mut self, pc: usize) {
        if let Op::Jmp(t) | Op::JmpIfFalse(t) | Op::JmpIfTrue(t) | Op::JmpIfNone(t) = self {
            *t = pc;
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())?;
        match self {
            Op::Const(Value::Text(s)) => write!(f, " {s:?}"),
            Op::Const(v) => write!(f, " {v}"),
            Op::Load(n) | Op::Def(n) | Op::Set(n) | Op::MakeVariant(n) => write!(f, " {n}"),
            Op::MakeTuple(n) | Op::MakeList(n) | Op::MakeMap(n) => write!(f, " {n}"),
            Op::MakeClosure { code, params } => write!(f, " {} /{}", code.name, params.len()),
            Op::Unary(op) => write!(f, " {op}"),
            Op::Binary(op) => write!(f, " {op}"),
            Op::Jmp(t) | Op::JmpIfFalse(t) | Op::JmpIfTrue(t) | Op::JmpIfNone(t) => write!(f, " {t}"),
            Op::Match(p) => write!(f, " {}", pattern_text(p)),
            Op::Raise(_, msg) => write!(f, " {msg:?}"),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instr {
    pub op: Op,
    pub span: Option<Span>,
}

// ── Code objects ─────────────────────────────────────────────────────

/// A named, linear instruction sequence. Closure bodies are nested `Code`
/// objects owned by the `MakeClosure` instruction that creates them.
#[derive(Debug, Clone)]
pub struct Code {
    pub name: String,
    pub instrs: Vec<Instr>,
}

impl Code {
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Human-readable listing, nested closure bodies after their parent.
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out);
        out
    }

    fn disassemble_into(&self, out: &mut String) {
        out.push_str(&format!("== {} ==\n", self.name));
        for (pc, instr) in self.instrs.iter().enumerate() {
            let pos = instr
                .span
                .filter(|s| s.is_known())
                .map(|s| format!("{}:{}", s.line, s.column))
                .unwrap_or_default();
            out.push_str(&format!("{pc:04}  {:<28} {pos}\n", instr.op.to_string()));
        }
        for instr in &self.instrs {
            if let Op::MakeClosure { code, .. } = &instr.op {
                out.push('\n');
                code.disassemble_into(out);
            }
        }
    }
}

fn pattern_text(p: &Pattern) -> String {
    use crate::ast::PatternKind as P;
    let join = |items: &[Pattern]| items.iter().map(pattern_text).collect::<Vec<_>>().join(" ");
    match &p.node {
        P::Wildcard => "_".to_string(),
        P::Name(n) => n.clone(),
        P::Unit => "ø".to_string(),
        P::Bool(b) => if *b { "⊤" } else { "⊥" }.to_string(),
        P::Int(i) => i.to_string(),
        P::Dec(d) => crate::runtime::format_dec(*d),
        P::Text(s) => format!("{s:?}"),
        P::Tuple(items) => format!("({})", join(items)),
        P::List { items, tail } => match tail {
            Some(t) => format!("[{} …{}]", join(items), pattern_text(t)),
            None => format!("[{}]", join(items)),
        },
        P::Variant { tag, payload } => format!("{tag}•{}", pattern_text(payload)),
    }
}
