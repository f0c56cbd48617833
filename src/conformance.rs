//! Observable behaviour of a run, for checking that both backends agree.

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use serde::Serialize;

use crate::ast::Program;
use crate::error::{EvalError, Origin, Phase};
use crate::frontend::Frontend;
use crate::module::{self, InFlight};
use crate::runtime::Value;
use crate::session::{Backend, Console, Session, SessionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Termination {
    Ok,
    Lex,
    Parse,
    Runtime,
    Internal,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Termination::Ok => "ok",
            Termination::Lex => "lex",
            Termination::Parse => "parse",
            Termination::Runtime => "runtime",
            Termination::Internal => "internal",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub termination: Termination,
    pub stdout: String,
    /// Text form of the result; `None` unless the run finished normally.
    pub value: Option<String>,
    /// The result was a closure or builtin, whose text form is not compared.
    pub opaque: bool,
    pub error_code: Option<&'static str>,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl Observation {
    fn finished(stdout: String, value: &Value) -> Self {
        Observation {
            termination: Termination::Ok,
            stdout,
            value: Some(value.to_string()),
            opaque: value.is_opaque(),
            error_code: None,
            line: None,
            column: None,
        }
    }

    fn failed(stdout: String, err: &EvalError) -> Self {
        let termination = match err.phase() {
            Phase::Lex => Termination::Lex,
            Phase::Syntax => Termination::Parse,
            Phase::Runtime => Termination::Runtime,
            Phase::Internal => Termination::Internal,
        };
        Observation {
            termination,
            stdout,
            value: None,
            opaque: false,
            error_code: Some(err.code()),
            line: err.line_col().map(|(l, _)| l),
            column: err.line_col().map(|(_, c)| c),
        }
    }
}

/// Runs `program` on one backend in a fresh session with captured output.
pub fn observe(program: &Program, origin: Origin, backend: Backend, config: SessionConfig) -> Observation {
    let session = Rc::new(Session::new(config).with_console(Console::capture()));
    let _in_flight = origin.path.as_deref().map(|p| InFlight::push(&session, module::absolute(p)));
    let result = match backend {
        Backend::Interpreter => session.evaluate_program(program, origin),
        Backend::Vm => session
            .compile(program, &origin.name())
            .map_err(EvalError::from)
            .and_then(|code| session.execute(&code, origin))
            .map(|run| run.value),
    };
    let stdout = session.console().output().to_string();
    match result {
        Ok(value) => Observation::finished(stdout, &value),
        Err(err) => Observation::failed(stdout, &err),
    }
}

pub fn observe_interpreter(program: &Program, origin: Origin) -> Observation {
    observe(program, origin, Backend::Interpreter, SessionConfig::default())
}

pub fn observe_vm(program: &Program, origin: Origin) -> Observation {
    observe(program, origin, Backend::Vm, SessionConfig::default())
}

/// Parses `source` first, so front-end failures are observed as lex/parse terminations.
pub fn observe_source(
    frontend: &dyn Frontend,
    source: &str,
    path: Option<&Path>,
    backend: Backend,
    config: SessionConfig,
) -> Observation {
    match frontend.parse(source, path) {
        Ok(program) => {
            let origin = Origin { path: path.map(Path::to_path_buf), source: Some(Rc::from(source)) };
            observe(&program, origin, backend, config)
        }
        Err(err) => Observation::failed(String::new(), &err),
    }
}

/// First observable difference between two runs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct Mismatch(pub String);

pub fn compare(interp: &Observation, vm: &Observation) -> Result<(), Mismatch> {
    if interp.termination != vm.termination {
        return Err(Mismatch(format!(
            "termination differs: interp={} vm={}",
            interp.termination, vm.termination
        )));
    }
    if interp.stdout.replace("\r\n", "\n") != vm.stdout.replace("\r\n", "\n") {
        return Err(Mismatch("stdout differs".to_string()));
    }
    if interp.termination == Termination::Ok {
        if interp.opaque && vm.opaque {
            return Ok(());
        }
        if interp.value != vm.value {
            return Err(Mismatch(format!(
                "result differs: interp={} vm={}",
                interp.value.as_deref().unwrap_or("-"),
                vm.value.as_deref().unwrap_or("-")
            )));
        }
        return Ok(());
    }
    if interp.error_code != vm.error_code {
        return Err(Mismatch(format!(
            "error code differs: interp={} vm={}",
            interp.error_code.unwrap_or("-"),
            vm.error_code.unwrap_or("-")
        )));
    }
    if (interp.line, interp.column) != (vm.line, vm.column) {
        let at = |o: &Observation| format!("{}:{}", o.line.unwrap_or(0), o.column.unwrap_or(0));
        return Err(Mismatch(format!("error location differs: interp={} vm={}", at(interp), at(vm))));
    }
    Ok(())
}
