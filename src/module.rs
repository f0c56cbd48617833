//! File-based modules: resolution, cycle detection, per-run caching.

use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::ast::{Program, Span};
use crate::error::{ErrorKind, EvalError, EvalResult, Origin};
use crate::runtime::{builtins, Env, Value};
use crate::session::Session;

/// Completed module scopes plus the stack of modules mid-load.
#[derive(Debug, Default)]
pub struct ModuleTable {
    cache: FxHashMap<PathBuf, Env>,
    loading: Vec<PathBuf>,
}

impl ModuleTable {
    /// Whether `path` (absolute, normalized) finished loading in this run.
    pub fn is_cached(&self, path: &Path) -> bool {
        self.cache.contains_key(path)
    }

    /// Modules currently mid-load, outermost first.
    pub fn in_flight(&self) -> &[PathBuf] {
        &self.loading
    }
}

/// Keeps a path on the in-flight stack until dropped, success or not.
pub(crate) struct InFlight {
    session: Rc<Session>,
}

impl InFlight {
    pub(crate) fn push(session: &Rc<Session>, path: PathBuf) -> Self {
        session.modules.borrow_mut().loading.push(path);
        InFlight { session: Rc::clone(session) }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.session.modules.borrow_mut().loading.pop();
    }
}

/// Resolves `raw` against the importing file's directory (or the working
/// directory), adding `extension` when the path has none.
pub fn resolve(raw: &str, importer: Option<&Path>, extension: &str) -> PathBuf {
    let mut rel = PathBuf::from(raw);
    if rel.extension().is_none() {
        rel.set_extension(extension);
    }
    let joined = if rel.is_absolute() {
        rel
    } else {
        let base = importer
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        base.join(rel)
    };
    absolute(&joined)
}

/// Absolute, lexically normalized form of `path`; the module cache key.
pub fn absolute(path: &Path) -> PathBuf {
    normalize(&std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Evaluates a parsed module's items into the given scope.
pub(crate) type Evaluate<'a> = dyn FnMut(&Program, &Env, Rc<Origin>) -> EvalResult<()> + 'a;

/// `link path member`: load the module (once per run) and export one name.
pub(crate) fn link(
    session: &Rc<Session>,
    importer: &Rc<Origin>,
    raw: &str,
    member: &str,
    call_span: Option<Span>,
    evaluate: &mut Evaluate<'_>,
) -> EvalResult<Value> {
    let path = resolve(raw, importer.path.as_deref(), &session.config().module_extension);
    let env = load(session, importer, &path, call_span, evaluate)?;
    env.lookup_local(member).ok_or_else(|| {
        EvalError::new(
            ErrorKind::MissingExport,
            format!("Module '{}' has no exported name '{member}'", path.display()),
        )
        .with_location(call_span, importer)
    })
}

fn load(
    session: &Rc<Session>,
    importer: &Rc<Origin>,
    path: &Path,
    call_span: Option<Span>,
    evaluate: &mut Evaluate<'_>,
) -> EvalResult<Env> {
    {
        let table = session.modules.borrow();
        if let Some(env) = table.cache.get(path) {
            tracing::trace!(module = %path.display(), "module cache hit");
            return Ok(env.clone());
        }
        if table.loading.iter().any(|p| p == path) {
            let chain: Vec<String> = table
                .loading
                .iter()
                .chain(std::iter::once(&path.to_path_buf()))
                .map(|p| p.display().to_string())
                .collect();
            return Err(EvalError::new(
                ErrorKind::CircularLoad,
                format!("Circular module load detected: {}", chain.join(" -> ")),
            )
            .with_location(call_span, importer));
        }
    }

    let _in_flight = InFlight::push(session, path.to_path_buf());
    tracing::debug!(module = %path.display(), "loading module");
    match evaluate_module(session, path, evaluate) {
        Ok(env) => {
            session.modules.borrow_mut().cache.insert(path.to_path_buf(), env.clone());
            Ok(env)
        }
        Err(e) => Err(e
            .with_location(call_span, importer)
            .with_frame(format!("load module {}", path.display()), call_span)),
    }
}

/// Runs a module file in a fresh scope parented only by the builtins.
fn evaluate_module(session: &Rc<Session>, path: &Path, evaluate: &mut Evaluate<'_>) -> EvalResult<Env> {
    let _depth = session.enter()?;
    let (program, origin) = session.load_source(path)?;
    let env = Env::child(&builtins::scope());
    evaluate(&program, &env, Rc::new(origin))?;
    Ok(env)
}
