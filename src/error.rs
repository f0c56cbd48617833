use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use crate::ast::{SourceMap, Span};

/// Which stage of the pipeline produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lex,
    Syntax,
    Runtime,
    Internal,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Lex => "lex",
            Phase::Syntax => "syntax",
            Phase::Runtime => "runtime",
            Phase::Internal => "internal",
        }
    }
}

/// Structural error condition. Each kind maps to one stable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lex,
    Syntax,
    Undefined,
    AlreadyBound,
    Unbound,
    TypeMismatch,
    DivisionByZero,
    Overflow,
    Unhashable,
    IndexOutOfRange,
    NoArmMatched,
    ParamMismatch,
    DuplicateBinder,
    NotCallable,
    OverApplied,
    PrivateMember,
    CircularLoad,
    ModuleLoad,
    MissingExport,
    StackExceeded,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Lex => "E-LEX",
            ErrorKind::Syntax => "E-SYNTAX",
            ErrorKind::Undefined | ErrorKind::AlreadyBound | ErrorKind::Unbound => "E-NAME",
            ErrorKind::TypeMismatch => "E-TYPE",
            ErrorKind::DivisionByZero => "E-DIV0",
            ErrorKind::Overflow => "E-OVERFLOW",
            ErrorKind::Unhashable => "E-UNHASHABLE",
            ErrorKind::IndexOutOfRange => "E-INDEX",
            ErrorKind::NoArmMatched => "E-NOMATCH",
            ErrorKind::ParamMismatch => "E-PARAM",
            ErrorKind::DuplicateBinder => "E-PATTERN",
            ErrorKind::NotCallable => "E-CALL",
            ErrorKind::OverApplied => "E-ARITY",
            ErrorKind::PrivateMember => "E-PRIVATE",
            ErrorKind::CircularLoad => "E-IMPORT-CYCLE",
            ErrorKind::ModuleLoad => "E-IMPORT",
            ErrorKind::MissingExport => "E-EXPORT",
            ErrorKind::StackExceeded => "E-STACK",
            ErrorKind::Internal => "E-INTERNAL",
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            ErrorKind::Lex => Phase::Lex,
            ErrorKind::Syntax => Phase::Syntax,
            ErrorKind::Internal => Phase::Internal,
            _ => Phase::Runtime,
        }
    }
}

/// Where a piece of code came from: a file path, its text, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Origin {
    pub path: Option<PathBuf>,
    pub source: Option<Rc<str>>,
}

impl Origin {
    pub fn file(path: impl Into<PathBuf>, source: &str) -> Self {
        Origin { path: Some(path.into()), source: Some(Rc::from(source)) }
    }

    pub fn anonymous() -> Self {
        Origin::default()
    }

    /// Display name used in diagnostics.
    pub fn name(&self) -> String {
        match &self.path {
            Some(p) => p.display().to_string(),
            None => "<input>".to_string(),
        }
    }
}

/// One call-site entry accumulated while an error unwinds.
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub label: String,
    pub span: Span,
}

/// Every failure the engine reports: position, unwinding frames, and the stable kind.
#[derive(Debug, Clone)]
pub struct EvalError {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
    pub frames: Vec<StackFrame>,
    pub origin: Option<Rc<Origin>>,
}

pub type EvalResult<T> = Result<T, EvalError>;

impl EvalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        EvalError { kind, message: message.into(), span: None, frames: Vec::new(), origin: None }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EvalError::new(ErrorKind::Internal, message)
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        EvalError::new(ErrorKind::TypeMismatch, message)
    }

    /// Positions the error; unknown spans leave it unpositioned.
    pub fn at(mut self, span: Span) -> Self {
        if span.is_known() {
            self.span = Some(span);
        }
        self
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn phase(&self) -> Phase {
        self.kind.phase()
    }

    /// Fills in position details the error does not carry yet.
    pub fn with_location(mut self, span: Option<Span>, origin: &Rc<Origin>) -> Self {
        if self.span.is_none() {
            self.span = span.filter(Span::is_known);
        }
        if self.origin.is_none() {
            self.origin = Some(Rc::clone(origin));
        }
        self
    }

    /// Records a call-site frame while unwinding. Each frame goes in front of
    /// the ones already recorded, so the trace reads outermost call first.
    /// Front-end failures pass through untouched.
    pub fn with_frame(mut self, label: impl Into<String>, span: Option<Span>) -> Self {
        if matches!(self.phase(), Phase::Lex | Phase::Syntax) {
            return self;
        }
        if let Some(span) = span.filter(Span::is_known) {
            self.frames.insert(0, StackFrame { label: label.into(), span });
        }
        self
    }

    pub fn line_col(&self) -> Option<(usize, usize)> {
        self.span.map(|s| (s.line, s.column))
    }

    fn prefix(&self, span: Option<Span>) -> String {
        let file = self.origin.as_deref().map(Origin::name).unwrap_or_else(|| "<input>".to_string());
        match span {
            Some(s) => format!("{file}:{}:{}", s.line, s.column),
            None => file,
        }
    }

    /// Renders the error, optionally tagging the headline with its stable code.
    pub fn render(&self, with_code: bool) -> String {
        let mut out = self.prefix(self.span);
        out.push_str(&format!(": {} error", self.phase().as_str()));
        if with_code {
            out.push_str(&format!(" [{}]", self.code()));
        }
        out.push_str(&format!(": {}", self.message));

        let source = self.origin.as_deref().and_then(|o| o.source.as_deref());
        if let (Some(span), Some(source)) = (self.span, source) {
            let line = SourceMap::new(source).line(span.line);
            if !line.is_empty() {
                out.push('\n');
                out.push_str(line);
                out.push('\n');
                out.push_str(&" ".repeat(span.column.saturating_sub(1)));
                out.push('^');
            }
        }

        if !self.frames.is_empty() {
            out.push_str("\nstack:");
            for frame in &self.frames {
                out.push_str(&format!("\n- {}: {}", self.prefix(Some(frame.span)), frame.label));
            }
        }
        out
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

impl std::error::Error for EvalError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(src: &str) -> Rc<Origin> {
        Rc::new(Origin::file("main.suay", src))
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorKind::DivisionByZero.code(), "E-DIV0");
        assert_eq!(ErrorKind::Undefined.code(), "E-NAME");
        assert_eq!(ErrorKind::Unbound.code(), "E-NAME");
        assert_eq!(ErrorKind::NoArmMatched.code(), "E-NOMATCH");
        assert_eq!(ErrorKind::PrivateMember.code(), "E-PRIVATE");
        assert_eq!(ErrorKind::CircularLoad.code(), "E-IMPORT-CYCLE");
        assert_eq!(ErrorKind::StackExceeded.code(), "E-STACK");
        assert_eq!(ErrorKind::Unhashable.code(), "E-UNHASHABLE");
        assert_eq!(ErrorKind::TypeMismatch.code(), "E-TYPE");
    }

    #[test]
    fn location_fills_only_missing_fields() {
        let o = origin("x");
        let e = EvalError::new(ErrorKind::Undefined, "Undefined name 'y'")
            .at(Span::at(3, 4))
            .with_location(Some(Span::at(1, 1)), &o);
        assert_eq!(e.line_col(), Some((3, 4)));
        assert!(e.origin.is_some());
    }

    #[test]
    fn unknown_span_is_not_recorded() {
        let o = origin("x");
        let e = EvalError::internal("boom").with_location(Some(Span::UNKNOWN), &o);
        assert_eq!(e.span, None);
    }

    #[test]
    fn render_has_caret_and_stack() {
        let src = "f ← λ x ⇒ x ÷ 0\nf 1";
        let e = EvalError::new(ErrorKind::DivisionByZero, "Runtime error for operator '÷': division by zero")
            .at(Span::at(1, 11))
            .with_location(None, &origin(src))
            .with_frame("call f", Some(Span::at(2, 1)));
        let out = e.render(false);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "main.suay:1:11: runtime error: Runtime error for operator '÷': division by zero");
        assert_eq!(lines[1], "f ← λ x ⇒ x ÷ 0");
        assert_eq!(lines[2], "          ^");
        assert_eq!(lines[3], "stack:");
        assert_eq!(lines[4], "- main.suay:2:1: call f");
    }

    #[test]
    fn render_with_code_tags_headline() {
        let e = EvalError::new(ErrorKind::NoArmMatched, "No dispatch arm matched").at(Span::at(1, 1));
        assert!(e.render(true).starts_with("<input>:1:1: runtime error [E-NOMATCH]: No dispatch arm matched"));
    }

    #[test]
    fn frames_read_outermost_first() {
        let src = "f ← λ x ⇒ x ÷ 0\ng ← λ y ⇒ f y\ng 1";
        let e = EvalError::new(ErrorKind::DivisionByZero, "Runtime error for operator '÷': division by zero")
            .at(Span::at(1, 11))
            .with_location(None, &origin(src))
            .with_frame("call f", Some(Span::at(2, 10)))
            .with_frame("call g", Some(Span::at(3, 1)));
        let labels: Vec<&str> = e.frames.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["call g", "call f"]);
        let out = e.render(false);
        assert!(out.ends_with("stack:\n- main.suay:3:1: call g\n- main.suay:2:10: call f"), "got:\n{out}");
    }

    #[test]
    fn syntax_errors_skip_frames() {
        let e = EvalError::new(ErrorKind::Syntax, "expected expression")
            .at(Span::at(1, 1))
            .with_frame("load module m.suay", Some(Span::at(2, 2)));
        assert!(e.frames.is_empty());
        assert_eq!(e.phase(), Phase::Syntax);
    }
}
