//! Error and warning taxonomy shared by the CA engine and every trust store.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal conditions. The invocation cannot proceed past one of these.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to create the CAROOT {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unexpected content in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("the CA key is missing at {0}; restore it or remove the CA certificate to create a new CA")]
    MissingKey(PathBuf),

    #[error("{name:?} is not a valid hostname, IP, URL or email{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    InvalidName {
        name: String,
        reason: Option<String>,
    },

    #[error("failed to start \"{command}\": {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("failed to execute \"{command}\": {}\n\n{output}\n", .code.map(|c| format!("exit status {c}")).unwrap_or_else(|| "terminated by signal".to_string()))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("certificate generation failed: {0}")]
    CertGen(#[from] rcgen::Error),

    #[error("key generation failed: {0}")]
    KeyGen(String),

    #[error("invalid CSR: {0}")]
    Csr(String),

    #[error("trust settings: {0}")]
    TrustSettings(String),

    #[error("unsupported trust settings version: {0}")]
    TrustSettingsVersion(u64),

    #[error("failed to create PKCS#12 bundle: {0}")]
    Pkcs12(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal conditions. They degrade one store but never its siblings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    #[error("\"sudo\" is not available and the process is not running as root")]
    NoSudo,

    #[error("\"certutil\" is not available")]
    NoCertutil {
        browsers: String,
        install_hint: Option<String>,
    },

    #[error("no {browsers} security databases found")]
    NoNssDatabase { browsers: String },

    #[error("the CA was imported but {browsers} still does not report it")]
    InstallVerificationFailed { browsers: String },

    #[error("\"keytool\" is not available")]
    NoKeytool,

    #[error("installing to the system store is not supported on this platform")]
    UnsupportedPlatform { browsers: String, root_ca: PathBuf },
}

/// The trust backends a session can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    System,
    Nss,
    Java,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::System, Backend::Nss, Backend::Java];

    pub fn as_str(self) -> &'static str {
        match self {
            Backend::System => "system",
            Backend::Nss => "nss",
            Backend::Java => "java",
        }
    }

    pub fn from_name(name: &str) -> Option<Backend> {
        Backend::ALL
            .into_iter()
            .find(|b| b.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Check,
    Install,
    Uninstall,
}

/// A warning tagged with where it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub backend: Backend,
    pub op: Op,
    pub warning: Warning,
}

impl Notice {
    /// Remediation text for the user, specific to the operation.
    pub fn hint(&self) -> String {
        match (&self.warning, self.op) {
            (Warning::NoSudo, _) => {
                "\"sudo\" is not available, and localca is not running as root. The (un)install operation might fail.".to_string()
            }
            (Warning::NoCertutil { browsers, install_hint }, Op::Uninstall) => {
                let mut s = format!(
                    "\"certutil\" is not available, so the CA can't be automatically uninstalled from {browsers} (if it was ever installed)."
                );
                if let Some(h) = install_hint {
                    s.push_str(&format!("\nYou can install \"certutil\" with \"{h}\" and re-run \"localca --uninstall\"."));
                }
                s
            }
            (Warning::NoCertutil { browsers, install_hint }, _) => {
                let mut s = format!(
                    "\"certutil\" is not available, so the CA can't be automatically installed in {browsers}."
                );
                if let Some(h) = install_hint {
                    s.push_str(&format!("\nInstall \"certutil\" with \"{h}\" and re-run \"localca --install\"."));
                }
                s
            }
            (Warning::NoNssDatabase { browsers }, _) => {
                format!("no {browsers} security databases found")
            }
            (Warning::InstallVerificationFailed { browsers }, _) => format!(
                "Installing in {browsers} failed.\nNote that if you never started {browsers}, you need to do that at least once."
            ),
            (Warning::NoKeytool, Op::Uninstall) => {
                "\"keytool\" is not available, so the CA can't be automatically uninstalled from Java's trust store (if it was ever installed).".to_string()
            }
            (Warning::NoKeytool, _) => {
                "\"keytool\" is not available, so the CA can't be automatically installed in Java's trust store.".to_string()
            }
            (Warning::UnsupportedPlatform { browsers, root_ca }, _) => format!(
                "Installing to the system store is not yet supported on this platform, but {browsers} will still work.\nYou can also manually install the root certificate at {:?}.",
                root_ca
            ),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_round_trip() {
        for b in Backend::ALL {
            assert_eq!(Backend::from_name(b.as_str()), Some(b));
        }
        assert_eq!(Backend::from_name(" NSS "), Some(Backend::Nss));
        assert_eq!(Backend::from_name("keychain"), None);
    }

    #[test]
    fn keytool_hint_depends_on_operation() {
        let install = Notice {
            backend: Backend::Java,
            op: Op::Install,
            warning: Warning::NoKeytool,
        };
        let uninstall = Notice {
            op: Op::Uninstall,
            ..install.clone()
        };
        assert!(install.hint().contains("installed in Java"));
        assert!(uninstall.hint().contains("uninstalled from Java"));
    }

    #[test]
    fn invalid_name_quotes_input() {
        let e = Error::InvalidName {
            name: "!".into(),
            reason: None,
        };
        assert_eq!(e.to_string(), "\"!\" is not a valid hostname, IP, URL or email");
    }
}
