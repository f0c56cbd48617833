pub mod ansi;
pub mod json;
pub mod registry;

use std::rc::Rc;

use crate::ast::Span;
use crate::error::{EvalError, Phase};

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    pub is_primary: bool,
}

/// A renderer-neutral view of an error: where it happened, the frames it
/// unwound through, and the stable code tooling keys on.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub phase: Phase,
    pub code: Option<&'static str>,
    pub message: String,
    pub file: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<Rc<str>>,
}

impl Diagnostic {
    pub fn error(phase: Phase, message: impl Into<String>) -> Self {
        Diagnostic {
            phase,
            code: None,
            message: message.into(),
            file: "<input>".to_string(),
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: true });
        self
    }

    pub fn with_secondary_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: false });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, file: impl Into<String>, source: Option<Rc<str>>) -> Self {
        self.file = file.into();
        self.source = source;
        self
    }
}

impl From<&EvalError> for Diagnostic {
    fn from(e: &EvalError) -> Self {
        let origin = e.origin.as_deref();
        let mut d = Diagnostic::error(e.phase(), &e.message)
            .with_code(e.code())
            .with_source(
                origin.map(|o| o.name()).unwrap_or_else(|| "<input>".to_string()),
                origin.and_then(|o| o.source.clone()),
            );
        if let Some(span) = e.span {
            d = d.with_span(span, "here");
        }
        for frame in &e.frames {
            d = d.with_secondary_span(frame.span, frame.label.clone());
        }
        if e.phase() == Phase::Internal {
            d = d.with_note("this is a defect in the engine, not in the program");
        }
        if let Some(entry) = registry::lookup(e.code()) {
            d = d.with_suggestion(format!("{} (run `suay explain {}`)", entry.short, entry.code));
        }
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Origin};

    #[test]
    fn builder_collects_labels_in_order() {
        let d = Diagnostic::error(Phase::Runtime, "No dispatch arm matched")
            .with_code("E-NOMATCH")
            .with_span(Span::new(5, 8, 1, 6), "here")
            .with_secondary_span(Span::at(4, 2), "call classify");
        assert_eq!(d.file, "<input>");
        assert_eq!(d.code, Some("E-NOMATCH"));
        let spans: Vec<_> = d.labels.iter().map(|l| (l.span.line, l.span.column, l.is_primary)).collect();
        assert_eq!(spans, vec![(1, 6, true), (4, 2, false)]);
        assert!(d.notes.is_empty() && d.suggestion.is_none());
    }

    #[test]
    fn from_eval_error_keeps_code_span_and_frames() {
        let origin = Rc::new(Origin::file("main.suay", "f ← λ x ⇒ x ÷ 0\nf 1\n"));
        let e = EvalError::new(ErrorKind::DivisionByZero, "Runtime error for operator '÷': division by zero")
            .with_location(Some(Span::at(1, 11)), &origin)
            .with_frame("call f", Some(Span::at(2, 1)));
        let d = Diagnostic::from(&e);
        assert_eq!(d.code, Some("E-DIV0"));
        assert_eq!(d.file, "main.suay");
        assert_eq!(d.labels.len(), 2);
        assert!(d.labels[0].is_primary);
        assert_eq!(d.labels[1].message, "call f");
        assert!(d.suggestion.as_deref().is_some_and(|s| s.contains("suay explain E-DIV0")));
    }

    #[test]
    fn internal_errors_get_a_note() {
        let d = Diagnostic::from(&EvalError::internal("Internal VM error: operand stack underflow"));
        assert_eq!(d.phase, Phase::Internal);
        assert_eq!(d.notes.len(), 1);
        assert!(d.labels.is_empty());
    }
}
