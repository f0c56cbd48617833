use super::Diagnostic;

pub fn render(d: &Diagnostic) -> String {
    let labels: Vec<serde_json::Value> = d
        .labels
        .iter()
        .map(|l| {
            serde_json::json!({
                "line": l.span.line,
                "col": l.span.column,
                "start": l.span.start,
                "end": l.span.end,
                "message": l.message,
                "primary": l.is_primary,
            })
        })
        .collect();

    let mut obj = serde_json::json!({
        "phase": d.phase.as_str(),
        "file": d.file,
        "message": d.message,
        "labels": labels,
        "notes": d.notes,
    });

    if let Some(code) = d.code {
        obj["code"] = serde_json::Value::String(code.to_string());
    }

    if let Some(s) = &d.suggestion {
        obj["suggestion"] = serde_json::Value::String(s.clone());
    }

    serde_json::to_string(&obj)
        .unwrap_or_else(|_| r#"{"phase":"internal","message":"internal error serializing diagnostic"}"#.to_string())
}
