//! Execution core for suay: a tree-walking interpreter and a bytecode VM
//! that agree on every observable result.
//!
//! Programs arrive as an [`ast::Program`] from a [`Frontend`]; a [`Session`]
//! runs them on either backend and owns the state shared by one run.

pub mod ast;
pub mod conformance;
pub mod diagnostic;
pub mod error;
pub mod frontend;
pub mod interpreter;
pub mod module;
pub mod pattern;
pub mod runtime;
pub mod session;
pub mod vm;

pub use ast::{Program, Span};
pub use error::{ErrorKind, EvalError, EvalResult, Origin, Phase};
pub use frontend::{Frontend, JsonFrontend};
pub use runtime::Value;
pub use session::{Backend, Console, Session, SessionConfig};
pub use vm::{Code, CompileError, Execution};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Installs a log subscriber for `tracing` output, only when `RUST_LOG` is set.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}
