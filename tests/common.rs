//! Shared test helpers.
#![allow(dead_code)]

use localca::ca::RootCa;
use localca::error::Warning;
use localca::exec::{Cmd, Output, System};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Create a temp directory under the workspace.
pub fn temp_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("localca_test_")
        .tempdir_in(std::env::current_dir().unwrap_or_else(|_| Path::new(".").into()))
        .expect("temp dir")
}

/// Create a CA in `<dir>/caroot`.
pub fn new_ca(dir: &Path) -> RootCa {
    let (ca, created) = RootCa::load_or_create(&dir.join("caroot")).unwrap();
    assert!(created);
    ca
}

/// One recorded command.
#[derive(Debug, Clone)]
pub struct Call {
    pub cmd: Cmd,
    pub sudo: bool,
}

impl Call {
    /// `program-name arg arg ...`, with a `sudo ` prefix for privileged runs.
    pub fn line(&self) -> String {
        let mut s = String::new();
        if self.sudo {
            s.push_str("sudo ");
        }
        s.push_str(&self.cmd.name());
        for a in &self.cmd.args {
            s.push(' ');
            s.push_str(a);
        }
        s
    }
}

type Handler = Box<dyn Fn(&Cmd, bool) -> Output + Send + Sync>;

/// A scripted [`System`]. Commands are answered by a closure and recorded.
/// Only paths registered with `with_path`, or under a directory registered
/// with `with_real_dir`, exist.
pub struct FakeSystem {
    handler: Handler,
    calls: Mutex<Vec<Call>>,
    binaries: HashMap<String, PathBuf>,
    paths: HashSet<PathBuf>,
    real_dirs: Vec<PathBuf>,
    warnings: Mutex<Vec<Warning>>,
}

impl FakeSystem {
    pub fn new(handler: impl Fn(&Cmd, bool) -> Output + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            binaries: HashMap::new(),
            paths: HashSet::new(),
            real_dirs: Vec::new(),
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Every command succeeds with empty output.
    pub fn succeeding() -> Self {
        Self::new(|_, _| Output::ok(""))
    }

    pub fn with_binary(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.binaries.insert(name.to_string(), path.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(path.into());
        self
    }

    pub fn with_real_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.real_dirs.push(dir.into());
        self
    }

    /// Queue a warning, as a real system does when sudo is missing.
    pub fn warn(&self, w: Warning) {
        self.warnings.lock().unwrap().push(w);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(Call::line).collect()
    }

    fn under_real_dir(&self, path: &Path) -> bool {
        self.real_dirs.iter().any(|d| path.starts_with(d))
    }

    fn record(&self, cmd: &Cmd, sudo: bool) -> Output {
        self.calls.lock().unwrap().push(Call {
            cmd: cmd.clone(),
            sudo,
        });
        (self.handler)(cmd, sudo)
    }
}

impl System for FakeSystem {
    fn exec(&self, cmd: &Cmd) -> localca::Result<Output> {
        Ok(self.record(cmd, false))
    }

    fn sudo_exec(&self, cmd: &Cmd) -> localca::Result<Output> {
        Ok(self.record(cmd, true))
    }

    fn look_path(&self, name: &str) -> Option<PathBuf> {
        self.binaries.get(name).cloned()
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.paths.contains(path) || (self.under_real_dir(path) && path.exists())
    }

    /// Registered paths count as directories when something is registered
    /// below them.
    fn is_dir(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p != path && p.starts_with(path))
            || (self.under_real_dir(path) && path.is_dir())
    }

    fn list_dir(&self, path: &Path) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = self
            .paths
            .iter()
            .filter_map(|p| p.strip_prefix(path).ok())
            .filter_map(|rest| rest.components().next())
            .map(|first| path.join(first))
            .collect();
        if self.under_real_dir(path) {
            if let Ok(dir) = std::fs::read_dir(path) {
                entries.extend(dir.filter_map(|e| e.ok()).map(|e| e.path()));
            }
        }
        entries.sort();
        entries.dedup();
        entries
    }

    fn take_warnings(&self) -> Vec<Warning> {
        std::mem::take(&mut *self.warnings.lock().unwrap())
    }
}

/// Create an empty file, making parent directories.
pub fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, b"").unwrap();
}
