//! Command execution port: plain and privileged process execution plus
//! the filesystem/PATH probes the trust stores use for discovery.

use std::borrow::Cow;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, Once};

use crate::error::{Error, Result, Warning};

/// A command to run. Built by the stores, executed by a [`System`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmd {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
}

impl Cmd {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Bare program name, e.g. `certutil` for `/usr/bin/certutil`.
    pub fn name(&self) -> Cow<'_, str> {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| self.program.to_string_lossy())
    }

    /// Check the exit status; anything but success is fatal.
    pub fn expect_success(&self, out: Output, label: &str) -> Result<Output> {
        if out.success {
            Ok(out)
        } else {
            Err(Error::CommandFailed {
                command: label.to_string(),
                code: out.code,
                output: out.text().into_owned(),
            })
        }
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

/// Exit state and combined stdout+stderr of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub success: bool,
    pub code: Option<i32>,
    pub combined: Vec<u8>,
}

impl Output {
    pub fn ok(combined: impl Into<Vec<u8>>) -> Self {
        Self {
            success: true,
            code: Some(0),
            combined: combined.into(),
        }
    }

    pub fn failed(code: i32, combined: impl Into<Vec<u8>>) -> Self {
        Self {
            success: false,
            code: Some(code),
            combined: combined.into(),
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.combined)
    }

    pub fn contains(&self, needle: &str) -> bool {
        let needle = needle.as_bytes();
        !needle.is_empty()
            && self
                .combined
                .windows(needle.len())
                .any(|w| w == needle)
    }
}

/// Process and filesystem access used by every trust store.
pub trait System: Send + Sync {
    /// Run to completion. `Err` only when the process could not start.
    fn exec(&self, cmd: &Cmd) -> Result<Output>;
    /// Run with privilege escalation when not already root.
    fn sudo_exec(&self, cmd: &Cmd) -> Result<Output>;
    /// Resolve a binary on PATH.
    fn look_path(&self, name: &str) -> Option<PathBuf>;
    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
    /// Sorted entries of a directory; empty when it cannot be read.
    fn list_dir(&self, path: &Path) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(path) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        };
        entries.sort();
        entries
    }
    /// Drain warnings raised while executing commands.
    fn take_warnings(&self) -> Vec<Warning> {
        Vec::new()
    }
}

/// How `sudo_exec` obtains privileges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Escalation {
    /// Already running as root; run commands as-is.
    Root,
    /// Wrap commands with the given sudo binary.
    Sudo(PathBuf),
    /// No way to escalate; warn once and try anyway.
    Unavailable,
}

impl Escalation {
    pub fn detect() -> Self {
        if is_root() {
            Escalation::Root
        } else if let Ok(sudo) = which::which("sudo") {
            Escalation::Sudo(sudo)
        } else {
            Escalation::Unavailable
        }
    }
}

#[cfg(unix)]
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

/// The real machine.
pub struct HostSystem {
    escalation: Escalation,
    sudo_warning: Once,
    pending: Mutex<Vec<Warning>>,
}

impl HostSystem {
    pub fn detect() -> Self {
        Self::with_escalation(Escalation::detect())
    }

    pub fn with_escalation(escalation: Escalation) -> Self {
        tracing::debug!(?escalation, "privilege escalation strategy");
        Self {
            escalation,
            sudo_warning: Once::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    fn run(&self, cmd: &Cmd) -> Result<Output> {
        tracing::debug!(command = %cmd, "exec");
        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args);
        for (k, v) in &cmd.env {
            command.env(k, v);
        }
        command
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let spawn_err = |source| Error::Spawn {
            command: cmd.to_string(),
            source,
        };
        let mut child = command.spawn().map_err(spawn_err)?;
        if let (Some(input), Some(mut pipe)) = (&cmd.stdin, child.stdin.take()) {
            pipe.write_all(input).map_err(spawn_err)?;
        }
        let out = child.wait_with_output().map_err(spawn_err)?;

        let mut combined = out.stdout;
        combined.extend_from_slice(&out.stderr);
        tracing::debug!(command = %cmd.name(), code = ?out.status.code(), "exited");
        Ok(Output {
            success: out.status.success(),
            code: out.status.code(),
            combined,
        })
    }
}

impl System for HostSystem {
    fn exec(&self, cmd: &Cmd) -> Result<Output> {
        self.run(cmd)
    }

    fn sudo_exec(&self, cmd: &Cmd) -> Result<Output> {
        match &self.escalation {
            Escalation::Root => self.run(cmd),
            Escalation::Unavailable => {
                self.sudo_warning.call_once(|| {
                    if let Ok(mut p) = self.pending.lock() {
                        p.push(Warning::NoSudo);
                    }
                });
                self.run(cmd)
            }
            Escalation::Sudo(sudo) => {
                let wrapped = Cmd {
                    program: sudo.clone(),
                    args: ["--prompt=Sudo password:".to_string(), "--".to_string()]
                        .into_iter()
                        .chain(std::iter::once(cmd.program.to_string_lossy().into_owned()))
                        .chain(cmd.args.iter().cloned())
                        .collect(),
                    env: cmd.env.clone(),
                    stdin: cmd.stdin.clone(),
                };
                self.run(&wrapped)
            }
        }
    }

    fn look_path(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn take_warnings(&self) -> Vec<Warning> {
        self.pending
            .lock()
            .map(|mut p| std::mem::take(&mut *p))
            .unwrap_or_default()
    }
}
