//! Settings resolution and trust-store allow-list.
//!
//! Supports the CAROOT env var override (also used by tests).

use std::path::{Path, PathBuf};

use crate::error::Backend;

/// Subdirectory of the platform data dir used when CAROOT is unset.
pub const APP_DIR: &str = "localca";

/// Everything the engine reads from the environment, resolved once.
#[derive(Debug, Clone)]
pub struct Settings {
    pub caroot: PathBuf,
    pub home: PathBuf,
    pub java_home: Option<PathBuf>,
    pub trust_stores: TrustStores,
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn from_env() -> Option<Self> {
        let caroot = default_caroot()?;
        let home = directories::BaseDirs::new()
            .map(|d| d.home_dir().to_path_buf())
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))?;
        let java_home = std::env::var_os("JAVA_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let trust_stores = std::env::var("TRUST_STORES")
            .map(|v| TrustStores::parse(&v))
            .unwrap_or_default();
        Some(Self {
            caroot,
            home,
            java_home,
            trust_stores,
        })
    }

    /// Settings for testing: no Java, every store enabled.
    pub fn for_test(caroot: impl AsRef<Path>, home: impl AsRef<Path>) -> Self {
        Self {
            caroot: caroot.as_ref().to_path_buf(),
            home: home.as_ref().to_path_buf(),
            java_home: None,
            trust_stores: TrustStores::default(),
        }
    }
}

/// CA storage location (respects CAROOT).
pub fn default_caroot() -> Option<PathBuf> {
    if let Some(env) = std::env::var_os("CAROOT").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(env));
    }
    directories::BaseDirs::new().map(|d| d.data_local_dir().join(APP_DIR))
}

/// Which trust stores a run may touch. Read from TRUST_STORES.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustStores {
    pub system: bool,
    pub nss: bool,
    pub java: bool,
}

impl Default for TrustStores {
    fn default() -> Self {
        Self {
            system: true,
            nss: true,
            java: true,
        }
    }
}

impl TrustStores {
    /// Parse a comma-separated list of `system`, `nss`, `java`.
    /// Blank input enables everything; unknown names are ignored.
    pub fn parse(value: &str) -> Self {
        if value.trim().is_empty() {
            return Self::default();
        }
        let mut stores = Self {
            system: false,
            nss: false,
            java: false,
        };
        for name in value.split(',') {
            match Backend::from_name(name) {
                Some(Backend::System) => stores.system = true,
                Some(Backend::Nss) => stores.nss = true,
                Some(Backend::Java) => stores.java = true,
                None => tracing::debug!(store = name.trim(), "ignoring unknown trust store"),
            }
        }
        stores
    }

    pub fn only(backends: &[Backend]) -> Self {
        let mut stores = Self {
            system: false,
            nss: false,
            java: false,
        };
        for b in backends {
            match b {
                Backend::System => stores.system = true,
                Backend::Nss => stores.nss = true,
                Backend::Java => stores.java = true,
            }
        }
        stores
    }

    pub fn enabled(&self, backend: Backend) -> bool {
        match backend {
            Backend::System => self.system,
            Backend::Nss => self.nss,
            Backend::Java => self.java,
        }
    }
}
