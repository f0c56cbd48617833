//! Boundary to the lexer/parser, which live outside this crate.

use std::path::Path;
use std::rc::Rc;

use serde::Deserialize;

use crate::ast::{Program, Span};
use crate::error::{ErrorKind, EvalError, EvalResult, Origin};

/// Turns source text into a validated AST, or a positioned lex/syntax error.
pub trait Frontend {
    fn parse(&self, source: &str, path: Option<&Path>) -> EvalResult<Program>;
}

/// Reads the JSON form of [`Program`] that the external parser emits.
/// Nesting depth is unbounded; the stack grows on demand while reading.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFrontend;

fn read_program(source: &str) -> serde_json::Result<Program> {
    let mut de = serde_json::Deserializer::from_str(source);
    de.disable_recursion_limit();
    let program = Program::deserialize(serde_stacker::Deserializer::new(&mut de))?;
    de.end()?;
    Ok(program)
}

impl Frontend for JsonFrontend {
    fn parse(&self, source: &str, path: Option<&Path>) -> EvalResult<Program> {
        read_program(source).map_err(|e| {
            let origin = Origin { path: path.map(Path::to_path_buf), source: Some(Rc::from(source)) };
            let mut err = EvalError::new(ErrorKind::Syntax, format!("malformed program: {e}"));
            if e.line() > 0 {
                err = err.at(Span::at(e.line(), e.column().max(1)));
            }
            err.origin = Some(Rc::new(origin));
            err
        })
    }
}
