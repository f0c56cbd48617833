/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    pub short: &'static str,  // brief description for diagnostics
    pub long: &'static str,   // full explanation for `suay explain`
}

/// All stable error codes the engine reports.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Front end ────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "E-LEX",
        short: "unreadable source text",
        long: r#"## E-LEX: unreadable source text

The front end could not split the source into tokens. The engine never
lexes source itself; this code is passed through from the parser that
produced the program, usually while loading a module with `link`.
"#,
    },
    ErrorEntry {
        code: "E-SYNTAX",
        short: "malformed program",
        long: r#"## E-SYNTAX: malformed program

The front end could not build a program from the source. With the
bundled JSON front end this means the file is not a valid serialized
program; the reported line and column point into the JSON text.
"#,
    },
    // ── Names ────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "E-NAME",
        short: "undefined, rebound, or unbound name",
        long: r#"## E-NAME: name error

Raised in three situations:

- a name is read but is not bound in any enclosing scope;
- `x ← …` binds a name already bound in the *same* scope;
- a mutation targets a name that is not bound anywhere.

**Example:**

    x ← 1
    x ← 2

Mutate the existing binding instead, or bind in an inner block.
"#,
    },
    // ── Values ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "E-TYPE",
        short: "operand of the wrong kind",
        long: r#"## E-TYPE: type mismatch

An operator or builtin received a value it does not accept, such as
`1 + "a"` or `count 3`. The message names the operator and the kinds
it was given.
"#,
    },
    ErrorEntry {
        code: "E-DIV0",
        short: "division by zero",
        long: r#"## E-DIV0: division by zero

`÷` or `%` was applied with a zero divisor. Both Int and Dec zero
divisors raise this error; Dec division never produces `inf` silently.
"#,
    },
    ErrorEntry {
        code: "E-OVERFLOW",
        short: "number out of range",
        long: r#"## E-OVERFLOW: number out of range

An Int was combined with a Dec but is too large to represent as a
64-bit float. Ints themselves are arbitrary precision and never
overflow on their own.
"#,
    },
    ErrorEntry {
        code: "E-UNHASHABLE",
        short: "value cannot be a map key",
        long: r#"## E-UNHASHABLE: unhashable map key

Map keys must be built from Unit, Bool, Int, Dec and Text, possibly
nested inside tuples and variants. Lists, maps, closures and builtins
cannot be keys.

**Example:**

    ⟦[1 2] ↦ 3⟧

The error points at the offending key expression.
"#,
    },
    ErrorEntry {
        code: "E-INDEX",
        short: "index out of range",
        long: r#"## E-INDEX: index out of range

`at` was given an index past either end of a text, list or tuple.
Negative indices count from the end, so `at [1 2 3] -1` is `3` but
`at [1 2 3] 3` fails.
"#,
    },
    // ── Matching ─────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "E-NOMATCH",
        short: "no dispatch arm matched",
        long: r#"## E-NOMATCH: no arm matched

A dispatch or cycle was given a value that none of its arms accept.
Add an arm for the missing shape, or a final wildcard arm `_ ⇒ …`.
"#,
    },
    ErrorEntry {
        code: "E-PARAM",
        short: "argument does not fit parameter pattern",
        long: r#"## E-PARAM: parameter mismatch

A closure was applied to an argument its parameter pattern rejects,
for example a tuple pattern `(a b)` given an Int.
"#,
    },
    ErrorEntry {
        code: "E-PATTERN",
        short: "name bound twice in one pattern",
        long: r#"## E-PATTERN: duplicate binder

A single pattern binds the same name more than once, as in `(x x)`.
Use `_` for positions whose value is not needed.
"#,
    },
    // ── Calls ────────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "E-CALL",
        short: "value is not callable",
        long: r#"## E-CALL: not callable

Only closures and builtins can be applied. The message names the kind
of value that appeared in call position.
"#,
    },
    ErrorEntry {
        code: "E-ARITY",
        short: "too many arguments",
        long: r#"## E-ARITY: over-applied

A closure or builtin received more arguments than it has parameters.
Application is curried, so this only happens once every parameter has
been supplied and the result is applied again.
"#,
    },
    // ── Modules ──────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "E-PRIVATE",
        short: "member is private to its module",
        long: r#"## E-PRIVATE: private member

Names beginning with `_` are private to the module that binds them.
`link` refuses to export them.
"#,
    },
    ErrorEntry {
        code: "E-IMPORT-CYCLE",
        short: "circular module load",
        long: r#"## E-IMPORT-CYCLE: circular module load

A module was requested while it was still being loaded. The message
lists the chain of paths from the first load back to the repeat, e.g.

    Circular module load detected: a.suay -> b.suay -> a.suay

Move the shared definitions into a third module both can link.
"#,
    },
    ErrorEntry {
        code: "E-IMPORT",
        short: "module could not be loaded",
        long: r#"## E-IMPORT: module load failed

The module file could not be read. Paths are resolved relative to the
directory of the importing file and the `.suay` extension is added
when missing.
"#,
    },
    ErrorEntry {
        code: "E-EXPORT",
        short: "module has no such export",
        long: r#"## E-EXPORT: missing export

The module loaded, but its top-level scope does not bind the requested
name.
"#,
    },
    // ── Engine ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "E-STACK",
        short: "maximum recursion depth exceeded",
        long: r#"## E-STACK: recursion too deep

Closure calls and module loads nested deeper than the configured limit
(default 1000, `--max-depth` on the command line). Loops written as a
cycle do not count towards the limit.
"#,
    },
    ErrorEntry {
        code: "E-INTERNAL",
        short: "internal engine error",
        long: r#"## E-INTERNAL: internal error

The compiler or virtual machine reached a state it should never be in,
such as an operand stack underflow or an unresolved jump. This is a
defect in the engine, not in the program.
"#,
    },
];

/// Look up an error entry by code (e.g. `"E-DIV0"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn lookup_known_code() {
        let e = lookup("E-NOMATCH").expect("E-NOMATCH should be in registry");
        assert_eq!(e.code, "E-NOMATCH");
        assert!(!e.short.is_empty());
        assert!(e.long.contains("E-NOMATCH"));
    }

    #[test]
    fn lookup_unknown_returns_none() {
        assert!(lookup("E-XXXX").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn all_codes_unique() {
        let mut codes: Vec<&str> = REGISTRY.iter().map(|e| e.code).collect();
        codes.sort_unstable();
        let len_before = codes.len();
        codes.dedup();
        assert_eq!(codes.len(), len_before, "duplicate codes in registry");
    }

    #[test]
    fn all_codes_have_content() {
        for entry in REGISTRY {
            assert!(!entry.short.is_empty(), "{} missing short description", entry.code);
            assert!(entry.long.contains(entry.code), "{} long text missing its heading", entry.code);
        }
    }

    #[test]
    fn every_kind_is_documented() {
        let kinds = [
            ErrorKind::Lex,
            ErrorKind::Syntax,
            ErrorKind::Undefined,
            ErrorKind::AlreadyBound,
            ErrorKind::Unbound,
            ErrorKind::TypeMismatch,
            ErrorKind::DivisionByZero,
            ErrorKind::Overflow,
            ErrorKind::Unhashable,
            ErrorKind::IndexOutOfRange,
            ErrorKind::NoArmMatched,
            ErrorKind::ParamMismatch,
            ErrorKind::DuplicateBinder,
            ErrorKind::NotCallable,
            ErrorKind::OverApplied,
            ErrorKind::PrivateMember,
            ErrorKind::CircularLoad,
            ErrorKind::ModuleLoad,
            ErrorKind::MissingExport,
            ErrorKind::StackExceeded,
            ErrorKind::Internal,
        ];
        for kind in kinds {
            assert!(lookup(kind.code()).is_some(), "{kind:?} has no registry entry");
        }
    }
}
