//! Sandboxed snippet execution with resource limits
//!
//! Provides an isolated interpreter run with:
//! - Static capability screening before spawn
//! - Timeout enforcement (process killed on expiry)
//! - Address-space limit (`RLIMIT_AS`, Unix)
//! - Output size limit
//! - Empty environment and a throwaway working directory

use fab_core::config::SandboxSettings;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::SandboxError;
use crate::policy::{self, APPROVED_MODULES};

const PRELUDE: &str = include_str!("prelude.py");

/// Resource limits for one snippet run
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    /// Maximum execution time
    pub timeout: Duration,

    /// Maximum address space in bytes
    pub max_memory: u64,

    /// Maximum stdout size in bytes
    pub max_output: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_memory: 128 * 1024 * 1024, // 128MB
            max_output: 64 * 1024,         // 64KiB
        }
    }
}

impl From<&SandboxSettings> for SandboxLimits {
    fn from(settings: &SandboxSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs),
            max_memory: settings.memory_mb * 1024 * 1024,
            max_output: settings.max_output_bytes,
        }
    }
}

/// Snippet runner
#[derive(Debug, Clone)]
pub struct CodeSandbox {
    interpreter: String,
    limits: SandboxLimits,
}

impl Default for CodeSandbox {
    fn default() -> Self {
        Self::new("python3", SandboxLimits::default())
    }
}

impl CodeSandbox {
    pub fn new(interpreter: impl Into<String>, limits: SandboxLimits) -> Self {
        Self {
            interpreter: interpreter.into(),
            limits,
        }
    }

    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self::new(settings.interpreter.clone(), SandboxLimits::from(settings))
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Run a snippet with `bindings` available as `data`; returns stdout
    pub async fn run(&self, snippet: &str, bindings: &Value) -> Result<String, SandboxError> {
        policy::screen(snippet)?;
        self.execute(snippet, bindings).await
    }

    /// Interpreter run without the static screen; the prelude still applies
    async fn execute(&self, snippet: &str, bindings: &Value) -> Result<String, SandboxError> {
        let start = Instant::now();
        let workdir = tempfile::tempdir()
            .map_err(|e| SandboxError::exception(format!("cannot create working directory: {}", e)))?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg("-I")
            .arg("-c")
            .arg(PRELUDE)
            .arg(APPROVED_MODULES.join(","));

        cmd.env_clear();
        cmd.env("PATH", "/usr/local/bin:/usr/bin:/bin");
        cmd.env("LANG", "C.UTF-8");
        cmd.current_dir(workdir.path());

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        #[cfg(unix)]
        {
            let max_memory = self.limits.max_memory;
            // SAFETY: only async-signal-safe setrlimit runs between fork and exec
            unsafe {
                cmd.pre_exec(move || {
                    let limit = libc::rlimit {
                        rlim_cur: max_memory as libc::rlim_t,
                        rlim_max: max_memory as libc::rlim_t,
                    };
                    if libc::setrlimit(libc::RLIMIT_AS, &limit) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SandboxError::exception(format!("failed to start {}: {}", self.interpreter, e)))?;

        let request = json!({ "code": snippet, "data": bindings }).to_string();
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::exception("no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::exception("no stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SandboxError::exception("no stderr"))?;

        let max_output = self.limits.max_output;
        let timeout = self.limits.timeout;

        let result = tokio::time::timeout(timeout, async {
            let write = async move {
                // A snippet that exits early closes stdin; that is not our failure
                let _ = stdin.write_all(request.as_bytes()).await;
                drop(stdin);
            };
            // Reading one byte past the cap detects overflow; dropping the
            // handle then breaks the pipe so the interpreter stops.
            let read_out = async move {
                let mut buf = Vec::new();
                let _ = stdout.take(max_output as u64 + 1).read_to_end(&mut buf).await;
                buf
            };
            // stderr past the cap is drained, or a chatty snippet would block
            // on a full pipe and surface as a timeout
            let read_err = async move {
                let mut buf = Vec::new();
                let mut capped = (&mut stderr).take(max_output as u64);
                let _ = capped.read_to_end(&mut buf).await;
                let _ = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await;
                buf
            };

            let ((), out, err) = tokio::join!(write, read_out, read_err);
            let status = child.wait().await;
            (out, err, status)
        })
        .await;

        let (out, err, status) = match result {
            Ok(finished) => finished,
            Err(_) => {
                warn!("Snippet timed out after {:?}", timeout);
                let _ = child.kill().await;
                return Err(SandboxError::timeout(timeout.as_secs()));
            }
        };

        debug!("Snippet finished in {:?}", start.elapsed());

        if out.len() > max_output {
            return Err(SandboxError::memory(format!(
                "output exceeded {} bytes",
                max_output
            )));
        }

        let stdout = String::from_utf8_lossy(&out).to_string();
        let stderr = String::from_utf8_lossy(&err).to_string();

        let status = status.map_err(|e| SandboxError::exception(e.to_string()))?;
        if status.success() {
            return Ok(stdout.trim_end().to_string());
        }

        Err(classify_failure(&stderr, status.code()))
    }
}

/// Map a failed run's stderr to an error kind
fn classify_failure(stderr: &str, code: Option<i32>) -> SandboxError {
    let message = last_error_line(stderr)
        .unwrap_or_else(|| format!("interpreter exited with {:?}", code));

    if stderr.contains("MemoryError") {
        SandboxError::memory(message)
    } else if stderr.contains("ImportError: import of") || stderr.contains("capability denied") {
        SandboxError::denied(message)
    } else {
        SandboxError::exception(message)
    }
}

/// The final `Type: message` line of a traceback
fn last_error_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SandboxErrorKind;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn sandbox() -> CodeSandbox {
        CodeSandbox::new(
            "python3",
            SandboxLimits {
                timeout: Duration::from_secs(5),
                max_memory: 256 * 1024 * 1024,
                max_output: 4096,
            },
        )
    }

    #[test]
    fn test_classify_failure() {
        let err = classify_failure(
            "Traceback (most recent call last):\n  File \"<snippet>\"\nKeyError: 'imdata'\n",
            Some(1),
        );
        assert_eq!(err.kind, SandboxErrorKind::Exception);
        assert_eq!(err.message, "KeyError: 'imdata'");

        assert_eq!(classify_failure("MemoryError\n", Some(1)).kind, SandboxErrorKind::Memory);
        assert_eq!(classify_failure("", Some(2)).message, "interpreter exited with Some(2)");
    }

    #[tokio::test]
    async fn test_denied_before_spawn() {
        // No interpreter is needed: screening rejects before spawning
        let sandbox = CodeSandbox::new("/nonexistent/python", SandboxLimits::default());
        let err = sandbox
            .run("import os\nprint(os.listdir('/'))", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, SandboxErrorKind::Denied);
    }

    #[tokio::test]
    async fn test_counts_bound_data() {
        if !python_available() {
            eprintln!("python3 not available, skipping");
            return;
        }
        let data = json!({"imdata": [
            {"fvTenant": {"attributes": {"name": "a"}}},
            {"fvTenant": {"attributes": {"name": "b"}}},
            {"fvTenant": {"attributes": {"name": "c"}}}
        ]});
        let out = sandbox().run("print(len(data['imdata']))", &data).await.unwrap();
        assert_eq!(out, "3");

        let out = sandbox()
            .run("result = sorted(o['fvTenant']['attributes']['name'] for o in data['imdata'])", &data)
            .await
            .unwrap();
        assert!(out.contains("\"c\""));
    }

    #[tokio::test]
    async fn test_exception_is_reported() {
        if !python_available() {
            return;
        }
        let err = sandbox().run("print(data['missing'])", &json!({})).await.unwrap_err();
        assert_eq!(err.kind, SandboxErrorKind::Exception);
        assert!(err.message.contains("KeyError"));
    }

    #[tokio::test]
    async fn test_timeout_kills_snippet() {
        if !python_available() {
            return;
        }
        let sandbox = CodeSandbox::new(
            "python3",
            SandboxLimits {
                timeout: Duration::from_secs(1),
                ..SandboxLimits::default()
            },
        );
        let err = sandbox.run("while True:\n    pass", &json!(null)).await.unwrap_err();
        assert_eq!(err.kind, SandboxErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_output_cap() {
        if !python_available() {
            return;
        }
        let err = sandbox()
            .run("for i in range(100000):\n    print('x' * 80)", &json!(null))
            .await
            .unwrap_err();
        assert_eq!(err.kind, SandboxErrorKind::Memory);
    }

    #[tokio::test]
    async fn test_approved_imports_run() {
        if !python_available() {
            return;
        }
        let out = sandbox()
            .run(
                "import json\nimport math as m\nprint(json.dumps(sorted(data)), m.floor(2.5))",
                &json!({"b": 1, "a": 2}),
            )
            .await
            .unwrap();
        assert_eq!(out, "[\"a\", \"b\"] 2");
    }

    #[tokio::test]
    async fn test_approved_module_exposes_no_modules() {
        if !python_available() {
            return;
        }
        let marker_dir = tempfile::tempdir().unwrap();
        let marker = marker_dir.path().join("touched");
        let snippet = format!(
            "import statistics\nstatistics.sys.modules['os'].system('touch {}')",
            marker.display()
        );

        let err = sandbox().execute(&snippet, &json!(null)).await.unwrap_err();
        assert_eq!(err.kind, SandboxErrorKind::Exception);
        assert!(err.message.contains("AttributeError"), "{}", err.message);
        assert!(!marker.exists());

        let err = sandbox()
            .execute("import json\nprint(json.codecs.open('/etc/hostname').read())", &json!(null))
            .await
            .unwrap_err();
        assert!(err.message.contains("AttributeError"), "{}", err.message);

        // from-imports go through the same proxy
        let err = sandbox()
            .execute("from json import decoder", &json!(null))
            .await
            .unwrap_err();
        assert!(err.message.contains("ImportError"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_audit_hook_blocks_host_access() {
        if !python_available() {
            return;
        }
        let marker_dir = tempfile::tempdir().unwrap();
        let marker = marker_dir.path().join("touched");
        // Walks object subclasses to the os module's globals, which the
        // static screen would reject on sight
        let snippet = format!(
            "w = [c for c in object.__subclasses__() if c.__name__ == '_wrap_close'][0]\n\
             w.__init__.__globals__['system']('touch {}')",
            marker.display()
        );

        let err = sandbox().execute(&snippet, &json!(null)).await.unwrap_err();
        assert!(!marker.exists());
        assert_ne!(err.kind, SandboxErrorKind::Timeout);

        let err = sandbox()
            .execute("__import__('os').listdir('/')", &json!(null))
            .await
            .unwrap_err();
        assert_eq!(err.kind, SandboxErrorKind::Denied);
    }

    #[tokio::test]
    async fn test_lazy_helpers_still_work() {
        if !python_available() {
            return;
        }
        let out = sandbox()
            .run(
                "import datetime\nprint(datetime.datetime.strptime('2024-03-01', '%Y-%m-%d').year)",
                &json!(null),
            )
            .await
            .unwrap();
        assert_eq!(out, "2024");
    }

    #[tokio::test]
    async fn test_stderr_flood_is_an_exception() {
        if !python_available() {
            return;
        }
        let err = sandbox()
            .run("print(data['missing' * 100000])", &json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, SandboxErrorKind::Exception);
    }

    #[tokio::test]
    async fn test_memory_ceiling() {
        if !python_available() {
            return;
        }
        let err = sandbox()
            .run("blob = 'a' * (1024 * 1024 * 1024)\nprint(len(blob))", &json!(null))
            .await
            .unwrap_err();
        assert_eq!(err.kind, SandboxErrorKind::Memory);
    }
}
