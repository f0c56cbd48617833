use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;
use std::rc::Rc;

use clap::{Args, Parser, Subcommand};

use suay::conformance::{self, Observation};
use suay::diagnostic::{ansi::AnsiRenderer, json, registry, Diagnostic};
use suay::session::DEFAULT_MAX_CALL_DEPTH;
use suay::{Backend, EvalError, Frontend, JsonFrontend, Session, SessionConfig, Value};

#[derive(Parser, Debug)]
#[command(name = "suay", version, about = "Run suay programs on the interpreter or the bytecode VM")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a program and print its result.
    Run(RunArgs),
    /// Run a program on both backends and report the first difference.
    Compare {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
        max_depth: usize,
    },
    /// Print the bytecode a program compiles to.
    Disasm { file: PathBuf },
    /// Explain an error code, e.g. `suay explain E-NOMATCH`.
    Explain { code: String },
}

#[derive(Args, Debug)]
struct RunArgs {
    file: PathBuf,
    /// Execute on the bytecode VM instead of the interpreter.
    #[arg(long)]
    vm: bool,
    /// Write one line per evaluated node or executed instruction to stderr.
    #[arg(long)]
    trace: bool,
    #[arg(long, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_depth: usize,
    /// Tag error headlines with their stable code.
    #[arg(long)]
    error_codes: bool,
    /// Report errors as JSON.
    #[arg(long, conflicts_with = "pretty")]
    json: bool,
    /// Report errors with a highlighted source snippet.
    #[arg(long)]
    pretty: bool,
}

fn main() {
    suay::init_tracing();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Run(args) => run(&args),
        Commands::Compare { file, max_depth } => compare(&file, max_depth),
        Commands::Disasm { file } => disasm(&file),
        Commands::Explain { code } => explain(&code),
    };
    process::exit(code);
}

fn run(args: &RunArgs) -> i32 {
    let config = SessionConfig { trace: args.trace, max_call_depth: args.max_depth, ..SessionConfig::default() };
    let session = Rc::new(Session::new(config));
    let backend = if args.vm { Backend::Vm } else { Backend::Interpreter };

    match session.run_file(&args.file, backend) {
        Ok(Value::Unit) => 0,
        Ok(value) => {
            println!("{value}");
            0
        }
        Err(e) => {
            report(&e, args);
            1
        }
    }
}

fn report(e: &EvalError, args: &RunArgs) {
    if args.json {
        eprintln!("{}", json::render(&Diagnostic::from(e)));
    } else if args.pretty {
        let renderer = AnsiRenderer { use_color: std::io::stderr().is_terminal() };
        eprint!("{}", renderer.render(&Diagnostic::from(e)));
    } else {
        eprintln!("{}", e.render(args.error_codes));
    }
}

fn compare(file: &Path, max_depth: usize) -> i32 {
    let source = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {e}", file.display());
            return 1;
        }
    };
    let config = SessionConfig { max_call_depth: max_depth, ..SessionConfig::default() };
    let observe = |backend| conformance::observe_source(&JsonFrontend, &source, Some(file), backend, config.clone());
    let interp = observe(Backend::Interpreter);
    let vm = observe(Backend::Vm);

    match conformance::compare(&interp, &vm) {
        Ok(()) => {
            println!("ok: {}", summary(&interp));
            0
        }
        Err(mismatch) => {
            eprintln!("mismatch: {mismatch}");
            for (label, obs) in [("interp", &interp), ("vm", &vm)] {
                let line = serde_json::to_string(obs).unwrap_or_else(|e| format!("<unserializable: {e}>"));
                eprintln!("  {label}: {line}");
            }
            1
        }
    }
}

fn summary(obs: &Observation) -> String {
    match (&obs.value, obs.error_code) {
        (Some(v), _) if obs.opaque => format!("{} (opaque {v})", obs.termination),
        (Some(v), _) => format!("{} {v}", obs.termination),
        (None, Some(code)) => format!("{} [{code}]", obs.termination),
        (None, None) => obs.termination.to_string(),
    }
}

fn disasm(file: &Path) -> i32 {
    let parsed = std::fs::read_to_string(file)
        .map_err(|e| format!("Error reading {}: {e}", file.display()))
        .and_then(|source| JsonFrontend.parse(&source, Some(file)).map_err(|e| e.to_string()));
    let program = match parsed {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("{msg}");
            return 1;
        }
    };
    match suay::vm::compile(&program, &file.display().to_string()) {
        Ok(code) => {
            print!("{}", code.disassemble());
            0
        }
        Err(e) => {
            eprintln!("{}", EvalError::from(e));
            1
        }
    }
}

fn explain(code: &str) -> i32 {
    match registry::lookup(&code.to_ascii_uppercase()) {
        Some(entry) => {
            print!("{}", entry.long);
            0
        }
        None => {
            eprintln!("Unknown error code '{code}'. Known codes:");
            for entry in registry::REGISTRY {
                eprintln!("  {:<16} {}", entry.code, entry.short);
            }
            1
        }
    }
}
