//! Static capability screening for snippets
//!
//! Runs before any process is spawned. A snippet is denied when it:
//! - imports a module outside [`APPROVED_MODULES`]
//! - touches dunder attributes or private attributes (`__`, `._`)
//! - reaches for an attribute on [`FORBIDDEN_ATTRIBUTES`] (`statistics.sys`)
//! - calls a forbidden builtin (`open(`, `exec(`, `eval(`, ...)
//! - exceeds [`MAX_SNIPPET_LENGTH`]
//!
//! The interpreter prelude enforces the same rules at runtime: imports return
//! proxies without module attributes, and an audit hook refuses file, process
//! and network events. A snippet that slips past these patterns still cannot
//! reach the filesystem or the network.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::SandboxError;

/// Modules a snippet may import
pub const APPROVED_MODULES: &[&str] = &[
    "json",
    "math",
    "statistics",
    "re",
    "collections",
    "itertools",
    "functools",
    "datetime",
    "operator",
    "string",
    "decimal",
    "fractions",
];

pub const MAX_SNIPPET_LENGTH: usize = 20_000;

/// Substrings that are never legitimate in a data transformation
const FORBIDDEN_TOKENS: &[&str] = &["__", "._"];

const FORBIDDEN_CALLS: &[&str] = &[
    "open",
    "exec",
    "eval",
    "compile",
    "input",
    "breakpoint",
    "getattr",
    "setattr",
    "delattr",
    "globals",
    "locals",
    "vars",
    "memoryview",
    "help",
    "exit",
    "quit",
];

/// Attribute names that lead from a harmless object to the host
pub const FORBIDDEN_ATTRIBUTES: &[&str] = &[
    "sys",
    "os",
    "io",
    "codecs",
    "builtins",
    "modules",
    "importlib",
    "subprocess",
    "socket",
    "shutil",
    "pathlib",
    "posix",
    "system",
    "popen",
    "mro",
    "gi_frame",
    "gi_code",
    "cr_frame",
    "ag_frame",
    "tb_frame",
    "tb_next",
    "f_back",
    "f_globals",
    "f_locals",
    "f_builtins",
    "f_code",
];

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\.\s*([A-Za-z_][A-Za-z0-9_]*)").expect("attribute pattern is a valid regex")
});

static IMPORT_STMT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*import\s+([^\n#]+)").expect("import pattern is a valid regex")
});

static FROM_IMPORT_STMT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*from\s+([A-Za-z_.][A-Za-z0-9_.]*)\s+import\b")
        .expect("from-import pattern is a valid regex")
});

static CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\s*\(").expect("call pattern is a valid regex")
});

fn root_module(name: &str) -> &str {
    name.trim().split('.').next().unwrap_or_default()
}

pub fn is_approved(module: &str) -> bool {
    APPROVED_MODULES.contains(&root_module(module))
}

/// Screen a snippet against the capability policy
pub fn screen(snippet: &str) -> Result<(), SandboxError> {
    if snippet.trim().is_empty() {
        return Err(SandboxError::denied("empty snippet"));
    }
    if snippet.len() > MAX_SNIPPET_LENGTH {
        return Err(SandboxError::denied(format!(
            "snippet exceeds {} bytes",
            MAX_SNIPPET_LENGTH
        )));
    }

    for token in FORBIDDEN_TOKENS {
        if snippet.contains(token) {
            return Err(SandboxError::denied(format!(
                "'{}' is not allowed in snippets",
                token
            )));
        }
    }

    for caps in ATTRIBUTE.captures_iter(snippet) {
        let name = &caps[1];
        if FORBIDDEN_ATTRIBUTES.contains(&name) {
            return Err(SandboxError::denied(format!(
                "attribute '.{}' is not allowed",
                name
            )));
        }
    }

    for m in CALL.find_iter(snippet) {
        // `re.compile(` and friends are attribute calls, not the builtins
        if snippet[..m.start()].ends_with('.') {
            continue;
        }
        let name = m.as_str().trim_end_matches('(').trim_end();
        if FORBIDDEN_CALLS.contains(&name) {
            return Err(SandboxError::denied(format!("call to '{}' is not allowed", name)));
        }
    }

    for caps in IMPORT_STMT.captures_iter(snippet) {
        for item in caps[1].split(',') {
            let module = item.split_whitespace().next().unwrap_or_default();
            if !is_approved(module) {
                return Err(SandboxError::denied(format!(
                    "import of '{}' is not allowed",
                    module
                )));
            }
        }
    }

    for caps in FROM_IMPORT_STMT.captures_iter(snippet) {
        let module = &caps[1];
        if !is_approved(module) {
            return Err(SandboxError::denied(format!(
                "import from '{}' is not allowed",
                module
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SandboxErrorKind;

    #[test]
    fn test_allows_data_manipulation() {
        let snippet = r#"
import json, statistics
from collections import Counter
names = [o["fvTenant"]["attributes"]["name"] for o in data["imdata"]]
print(len(names), statistics.mean([len(n) for n in names]))
print(Counter(names).most_common(1))
"#;
        assert!(screen(snippet).is_ok());
    }

    #[test]
    fn test_denies_filesystem_and_network() {
        for snippet in [
            "import os\nprint(os.listdir('/'))",
            "import socket",
            "from urllib.request import urlopen",
            "import json, subprocess",
            "print(open('/etc/passwd').read())",
            "eval('1+1')",
            "x = ().__class__.__bases__",
            "getattr(data, 'keys')",
            "import os.path",
        ] {
            let err = screen(snippet).unwrap_err();
            assert_eq!(err.kind, SandboxErrorKind::Denied, "allowed: {}", snippet);
        }
    }

    #[test]
    fn test_method_names_are_not_calls_to_builtins() {
        // `.read(` or `.format(` are attribute calls, not the forbidden builtins
        assert!(screen("print('{}'.format(len(data)))").is_ok());
        assert!(screen("import datetime\nprint(datetime.date(2024, 1, 1).isoformat())").is_ok());
        assert!(screen("import re\npat = re.compile(r'tn-(.*)')").is_ok());
        assert!(screen("print(open('x'))").is_err());
    }

    #[test]
    fn test_denies_module_attributes_of_approved_modules() {
        for snippet in [
            "import statistics\nstatistics.sys.modules['os'].system('id')",
            "import json\nprint(json.codecs.open('/etc/hostname').read())",
            "import collections\nprint(collections . os)",
            "g = (x for x in data)\nprint(g.gi_frame.f_back)",
        ] {
            let err = screen(snippet).unwrap_err();
            assert_eq!(err.kind, SandboxErrorKind::Denied, "allowed: {}", snippet);
            assert!(err.message.contains("attribute"), "{}", err.message);
        }
        // Ordinary attribute use on approved modules still passes
        assert!(screen("import statistics\nprint(statistics.median([1, 2, 3]))").is_ok());
        assert!(screen("import json\nprint(json.dumps(data, indent=2))").is_ok());
    }

    #[test]
    fn test_denies_empty_and_oversized() {
        assert!(screen("   ").is_err());
        assert!(screen(&"x = 1\n".repeat(5_000)).is_err());
    }
}
