use crate::ast::SourceMap;
use super::Diagnostic;

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn bold(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold_red(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[1;31m{s}\x1b[0m") } else { s.to_string() }
    }

    fn cyan(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[36m{s}\x1b[0m") } else { s.to_string() }
    }

    fn dim(&self, s: &str) -> String {
        if self.use_color { format!("\x1b[2m{s}\x1b[0m") } else { s.to_string() }
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = String::new();

        // "runtime error[E-DIV0]: message"
        let mut heading = format!("{} error", d.phase.as_str());
        if let Some(code) = d.code {
            heading.push_str(&format!("[{code}]"));
        }
        out.push_str(&format!("{}: {}\n", self.bold_red(&heading), self.bold(&d.message)));

        let primary = d.labels.iter().find(|l| l.is_primary);
        if let Some(label) = primary {
            let (line, col) = (label.span.line, label.span.column);
            out.push_str(&format!("  {} {}:{line}:{col}\n", self.cyan("-->"), d.file));

            let source = d.source.as_deref().unwrap_or("");
            let map = SourceMap::new(source);
            let line_text = map.line(line);
            if !line_text.is_empty() {
                let gutter = line.to_string().len();
                let pipe = self.cyan("|");
                let pad = " ".repeat(gutter);

                out.push_str(&format!("{pad} {pipe}\n"));
                let line_num = self.cyan(&format!("{line:>gutter$}"));
                out.push_str(&format!("{line_num} {pipe} {line_text}\n"));

                let indent = " ".repeat(col.saturating_sub(1));
                // Underline the span's text up to the end of its first line.
                let span_len = map
                    .snippet(label.span)
                    .map(|s| s.chars().count())
                    .filter(|n| *n > 0)
                    .unwrap_or(1);
                let carets = self.bold_red(&"^".repeat(span_len));
                if label.message.is_empty() {
                    out.push_str(&format!("{pad} {pipe} {indent}{carets}\n"));
                } else {
                    out.push_str(&format!("{pad} {pipe} {indent}{carets} {}\n", self.bold_red(&label.message)));
                }
                out.push_str(&format!("{pad} {pipe}\n"));
            }
        }

        // Secondary labels are the unwound call frames, outermost first.
        for label in d.labels.iter().filter(|l| !l.is_primary) {
            out.push_str(&format!(
                "  {} {}:{}:{}: {}\n",
                self.dim("="),
                d.file,
                label.span.line,
                label.span.column,
                label.message
            ));
        }

        for note in &d.notes {
            out.push_str(&format!("  {} note: {}\n", self.dim("="), note));
        }

        if let Some(suggestion) = &d.suggestion {
            out.push_str(&format!("  {} help: {}\n", self.dim("="), suggestion));
        }

        out
    }
}
