use std::path::{Path, PathBuf};
use std::rc::Rc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use suay::ast::build::*;
use suay::ast::{Expr, Program};
use suay::{Backend, Console, ErrorKind, EvalError, Origin, Session, SessionConfig, Value};

const BACKENDS: [Backend; 2] = [Backend::Interpreter, Backend::Vm];

fn write(dir: &TempDir, file: &str, items: Vec<Expr>) -> PathBuf {
    let path = dir.path().join(file);
    let json = serde_json::to_string(&program(items)).expect("serialize program");
    std::fs::write(&path, json).expect("write module");
    path
}

fn link(path: &str, member: &str) -> Expr {
    apply(name("link"), vec![text(path), text(member)])
}

fn session() -> Rc<Session> {
    Rc::new(Session::new(SessionConfig::default()).with_console(Console::capture()))
}

fn run(path: &Path, backend: Backend) -> (Result<Value, EvalError>, String) {
    let s = session();
    let result = s.run_file(path, backend);
    let out = s.console().output().to_string();
    (result, out)
}

fn library(dir: &TempDir) -> PathBuf {
    write(
        dir,
        "lib.suay",
        vec![
            call(name("say"), text("loaded")),
            bind("double", lambda(vec![p_name("x")], mul(name("x"), int(2)))),
            bind("_secret", int(7)),
        ],
    )
}

#[test]
fn linked_closure_is_callable() {
    let dir = TempDir::new().unwrap();
    library(&dir);
    let main = write(&dir, "main.suay", vec![bind("d", link("lib", "double")), call(name("d"), int(21))]);
    for backend in BACKENDS {
        let (result, out) = run(&main, backend);
        assert_eq!(result.unwrap(), Value::int(42), "{backend:?}");
        assert_eq!(out, "loaded\n");
    }
}

#[test]
fn modules_load_once_per_run() {
    let dir = TempDir::new().unwrap();
    library(&dir);
    let main = write(
        &dir,
        "main.suay",
        vec![link("lib", "double"), link("./lib.suay", "double"), link("lib", "double")],
    );
    for backend in BACKENDS {
        let (result, out) = run(&main, backend);
        assert!(result.is_ok(), "{backend:?}: {result:?}");
        assert_eq!(out, "loaded\n", "{backend:?}");
    }
}

#[test]
fn separate_runs_do_not_share_the_cache() {
    let dir = TempDir::new().unwrap();
    library(&dir);
    let main = write(&dir, "main.suay", vec![link("lib", "double")]);
    assert_eq!(run(&main, Backend::Vm).1, "loaded\n");
    assert_eq!(run(&main, Backend::Vm).1, "loaded\n");
}

#[test]
fn private_members_are_refused() {
    let dir = TempDir::new().unwrap();
    library(&dir);
    let main = write(&dir, "main.suay", vec![link("lib", "_secret").at(1, 1)]);
    for backend in BACKENDS {
        let err = run(&main, backend).0.unwrap_err();
        assert_eq!(err.kind, ErrorKind::PrivateMember, "{backend:?}");
        assert_eq!(err.line_col(), Some((1, 1)));
    }
}

#[test]
fn missing_export_names_module_and_member() {
    let dir = TempDir::new().unwrap();
    let lib = library(&dir);
    let main = write(&dir, "main.suay", vec![link("lib", "nope").at(3, 2)]);
    for backend in BACKENDS {
        let err = run(&main, backend).0.unwrap_err();
        assert_eq!(err.code(), "E-EXPORT");
        assert_eq!(err.message, format!("Module '{}' has no exported name 'nope'", lib.display()));
        assert_eq!(err.line_col(), Some((3, 2)));
    }
}

#[test]
fn circular_load_names_both_paths() {
    let dir = TempDir::new().unwrap();
    let a = write(&dir, "a.suay", vec![link("b", "y").at(1, 1), bind("x", int(1))]);
    let b = write(&dir, "b.suay", vec![link("a", "x").at(1, 1), bind("y", int(2))]);
    let expected = format!(
        "Circular module load detected: {} -> {} -> {}",
        a.display(),
        b.display(),
        a.display()
    );
    for backend in BACKENDS {
        let err = run(&a, backend).0.unwrap_err();
        assert_eq!(err.kind, ErrorKind::CircularLoad, "{backend:?}");
        assert_eq!(err.message, expected);
        // Raised inside b, then unwound through a's load of b.
        assert_eq!(err.origin.as_ref().and_then(|o| o.path.clone()), Some(b.clone()));
        assert_eq!(err.frames.len(), 1);
        assert_eq!(err.frames[0].label, format!("load module {}", b.display()));
    }
}

#[test]
fn errors_inside_a_module_point_into_it() {
    let dir = TempDir::new().unwrap();
    let bad = write(&dir, "bad.suay", vec![bind("z", div(int(1), int(0)).at(2, 5))]);
    let main = write(&dir, "main.suay", vec![link("bad", "z").at(4, 1)]);
    for backend in BACKENDS {
        let err = run(&main, backend).0.unwrap_err();
        assert_eq!(err.code(), "E-DIV0", "{backend:?}");
        assert_eq!(err.line_col(), Some((2, 5)));
        assert_eq!(err.origin.as_ref().and_then(|o| o.path.clone()), Some(bad.clone()));
        assert_eq!(err.frames.len(), 1);
        assert_eq!(err.frames[0].label, format!("load module {}", bad.display()));
        assert_eq!((err.frames[0].span.line, err.frames[0].span.column), (4, 1));
    }
}

#[test]
fn modules_cannot_see_importer_bindings() {
    let dir = TempDir::new().unwrap();
    write(&dir, "peek.suay", vec![bind("seen", name("hidden").at(1, 8))]);
    let main = write(&dir, "main.suay", vec![bind("hidden", int(1)), link("peek", "seen")]);
    for backend in BACKENDS {
        let err = run(&main, backend).0.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Undefined, "{backend:?}");
        assert_eq!(err.line_col(), Some((1, 8)));
    }
}

#[test]
fn unreadable_and_malformed_modules() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.suay"), "{ not json").unwrap();
    let missing = write(&dir, "m1.suay", vec![link("absent", "x").at(1, 1)]);
    let broken = write(&dir, "m2.suay", vec![link("broken", "x").at(1, 1)]);
    for backend in BACKENDS {
        let err = run(&missing, backend).0.unwrap_err();
        assert_eq!(err.code(), "E-IMPORT", "{backend:?}");
        assert!(err.message.contains("absent.suay"), "{}", err.message);

        let err = run(&broken, backend).0.unwrap_err();
        assert_eq!(err.code(), "E-SYNTAX", "{backend:?}");
        assert!(err.frames.is_empty());
    }
}

#[test]
fn closures_cross_backends_through_the_shared_cache() {
    let dir = TempDir::new().unwrap();
    library(&dir);
    let s = session();
    let origin = || Origin::file(dir.path().join("main.suay"), "");

    // The interpreter loads the module, so `double` is an AST closure.
    let first = program(vec![link("lib", "double")]);
    assert!(matches!(s.evaluate_program(&first, origin()).unwrap(), Value::Closure(_)));

    // The VM reuses the cached scope and calls that closure.
    let second: Program = program(vec![call(link("lib", "double"), int(5))]);
    let code = s.compile(&second, "main").unwrap();
    assert_eq!(s.execute(&code, origin()).unwrap().value, Value::int(10));
    assert_eq!(s.console().output(), "loaded\n");
}

#[test]
fn deep_module_chains_hit_the_depth_limit() {
    let dir = TempDir::new().unwrap();
    for i in 0..5 {
        write(&dir, &format!("m{i}.suay"), vec![link(&format!("m{}", i + 1), "v").at(1, 1), bind("v", int(i))]);
    }
    write(&dir, "m5.suay", vec![bind("v", int(5))]);
    let main = dir.path().join("m0.suay");
    let config = SessionConfig { max_call_depth: 3, ..SessionConfig::default() };
    for backend in BACKENDS {
        let s = Rc::new(Session::new(config.clone()).with_console(Console::capture()));
        let err = s.run_file(&main, backend).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StackExceeded, "{backend:?}");
        // m4 is refused, then every load on the way back out adds its frame;
        // the trace reads from the entry file inwards.
        let labels: Vec<&str> = err.frames.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels.len(), 4);
        assert!(labels[0].ends_with("m1.suay"), "{labels:?}");
        assert!(labels[3].ends_with("m4.suay"), "{labels:?}");
    }
}
