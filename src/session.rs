//! One top-level run: configuration, console, module table, recursion budget.
//!
//! Every interpreter and VM instance created during a run (including the
//! ones spun up for module loads) shares the same `Rc<Session>`. Separate
//! runs build separate sessions and never share module state.

use std::cell::{Cell, Ref, RefCell};
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::rc::Rc;

use crate::ast::Program;
use crate::error::{ErrorKind, EvalError, EvalResult, Origin};
use crate::frontend::{Frontend, JsonFrontend};
use crate::interpreter::Interpreter;
use crate::module::{self, InFlight, ModuleTable};
use crate::runtime::Value;
use crate::vm::{self, CompileError, Code, Execution, Vm};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;
pub const DEFAULT_MODULE_EXTENSION: &str = "suay";

/// Minimum stack space to keep available before recursing (100KB).
const RED_ZONE: usize = 100 * 1024;

/// Stack space to allocate when growing (1MB).
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Grows the host stack on demand so deep evaluation hits the call-depth
/// limit instead of overflowing.
#[inline]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Emit one trace line per evaluated node / executed instruction.
    pub trace: bool,
    /// Nested closure-body evaluations and module loads allowed before `E-STACK`.
    pub max_call_depth: usize,
    /// Appended to `link` paths that have no extension.
    pub module_extension: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            trace: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            module_extension: DEFAULT_MODULE_EXTENSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Interpreter,
    Vm,
}

/// Where `say`/`hear` and the execution trace go.
pub enum Console {
    /// stdout for output, stdin for input, stderr for trace.
    Stdio,
    /// Everything buffered; input is served from a queue.
    Capture {
        output: String,
        input: VecDeque<String>,
        trace: String,
    },
}

impl Console {
    pub fn capture() -> Self {
        Console::Capture { output: String::new(), input: VecDeque::new(), trace: String::new() }
    }

    pub fn capture_with_input<I: IntoIterator<Item = String>>(lines: I) -> Self {
        Console::Capture { output: String::new(), input: lines.into_iter().collect(), trace: String::new() }
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            Console::Stdio => writeln!(io::stdout().lock(), "{line}"),
            Console::Capture { output, .. } => {
                output.push_str(line);
                output.push('\n');
                Ok(())
            }
        }
    }

    /// Shows `prompt` without a newline and reads one line; end of input reads as empty.
    pub fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        match self {
            Console::Stdio => {
                {
                    let mut out = io::stdout().lock();
                    write!(out, "{prompt}")?;
                    out.flush()?;
                }
                let mut line = String::new();
                io::stdin().lock().read_line(&mut line)?;
                Ok(line.trim_end_matches(['\n', '\r']).to_string())
            }
            Console::Capture { output, input, .. } => {
                output.push_str(prompt);
                Ok(input.pop_front().unwrap_or_default())
            }
        }
    }

    pub fn trace_line(&mut self, line: &str) -> io::Result<()> {
        match self {
            Console::Stdio => writeln!(io::stderr().lock(), "{line}"),
            Console::Capture { trace, .. } => {
                trace.push_str(line);
                trace.push('\n');
                Ok(())
            }
        }
    }

    /// Captured program output; empty for stdio.
    pub fn output(&self) -> &str {
        match self {
            Console::Stdio => "",
            Console::Capture { output, .. } => output,
        }
    }

    pub fn trace_output(&self) -> &str {
        match self {
            Console::Stdio => "",
            Console::Capture { trace, .. } => trace,
        }
    }
}

pub struct Session {
    config: SessionConfig,
    console: RefCell<Console>,
    frontend: Box<dyn Frontend>,
    pub(crate) modules: RefCell<ModuleTable>,
    depth: Cell<usize>,
    instructions: Cell<u64>,
}

/// Holds one unit of the call-depth budget; released on drop.
pub(crate) struct DepthGuard {
    session: Rc<Session>,
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        let d = self.session.depth.get();
        self.session.depth.set(d.saturating_sub(1));
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        tracing::debug!(max_call_depth = config.max_call_depth, trace = config.trace, "new session");
        Session {
            config,
            console: RefCell::new(Console::Stdio),
            frontend: Box::new(JsonFrontend),
            modules: RefCell::new(ModuleTable::default()),
            depth: Cell::new(0),
            instructions: Cell::new(0),
        }
    }

    pub fn with_console(mut self, console: Console) -> Self {
        self.console = RefCell::new(console);
        self
    }

    pub fn with_frontend(mut self, frontend: Box<dyn Frontend>) -> Self {
        self.frontend = frontend;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn console(&self) -> Ref<'_, Console> {
        self.console.borrow()
    }

    pub fn frontend(&self) -> &dyn Frontend {
        self.frontend.as_ref()
    }

    /// Read-only view of this run's module cache and in-flight stack.
    pub fn modules(&self) -> Ref<'_, ModuleTable> {
        self.modules.borrow()
    }

    pub(crate) fn say(&self, line: &str) -> EvalResult<()> {
        self.console.borrow_mut().write_line(line).map_err(|e| console_failure("write output", e))
    }

    pub(crate) fn hear(&self, prompt: &str) -> EvalResult<String> {
        self.console.borrow_mut().read_line(prompt).map_err(|e| console_failure("read input", e))
    }

    pub(crate) fn tracing(&self) -> bool {
        self.config.trace
    }

    pub(crate) fn trace(&self, line: &str) {
        // A lost trace line does not change the run's outcome.
        if let Err(e) = self.console.borrow_mut().trace_line(line) {
            tracing::warn!(error = %e, "trace line dropped");
        }
    }

    pub(crate) fn call_depth(&self) -> usize {
        self.depth.get()
    }

    pub(crate) fn count_instruction(&self) {
        self.instructions.set(self.instructions.get() + 1);
    }

    /// VM instructions executed so far in this run, module loads included.
    pub fn instructions(&self) -> u64 {
        self.instructions.get()
    }

    /// Claims one level of the call-depth budget.
    pub(crate) fn enter(self: &Rc<Self>) -> EvalResult<DepthGuard> {
        let d = self.depth.get();
        if d >= self.config.max_call_depth {
            return Err(EvalError::new(ErrorKind::StackExceeded, "Maximum recursion depth exceeded"));
        }
        self.depth.set(d + 1);
        Ok(DepthGuard { session: Rc::clone(self) })
    }

    /// Evaluates a program with the tree-walking interpreter.
    pub fn evaluate_program(self: &Rc<Self>, program: &Program, origin: Origin) -> EvalResult<Value> {
        Interpreter::new(Rc::clone(self), Rc::new(origin)).run(program)
    }

    /// Lowers a program to bytecode.
    pub fn compile(&self, program: &Program, name: &str) -> Result<Code, CompileError> {
        vm::compile(program, name)
    }

    /// Runs compiled code on the VM.
    pub fn execute(self: &Rc<Self>, code: &Code, origin: Origin) -> EvalResult<Execution> {
        Vm::new(Rc::clone(self), Rc::new(origin)).execute(code)
    }

    /// Reads and parses a source file through the session's front end.
    pub fn load_source(&self, path: &Path) -> EvalResult<(Program, Origin)> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            EvalError::new(ErrorKind::ModuleLoad, format!("Cannot load module '{}': {e}", path.display()))
        })?;
        let program = self.frontend.parse(&source, Some(path))?;
        Ok((program, Origin::file(path, &source)))
    }

    /// Loads a file and runs it on the chosen backend.
    pub fn run_file(self: &Rc<Self>, path: &Path, backend: Backend) -> EvalResult<Value> {
        let (program, origin) = self.load_source(path)?;
        // The entry file counts as mid-load, so a module linking back to it is a cycle.
        let _in_flight = InFlight::push(self, module::absolute(path));
        match backend {
            Backend::Interpreter => self.evaluate_program(&program, origin),
            Backend::Vm => {
                let code = self.compile(&program, &path.display().to_string())?;
                Ok(self.execute(&code, origin)?.value)
            }
        }
    }
}

fn console_failure(action: &str, e: io::Error) -> EvalError {
    tracing::warn!(error = %e, action, "console failure");
    EvalError::internal(format!("cannot {action}: {e}"))
}
