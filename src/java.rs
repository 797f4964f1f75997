//! Java `cacerts` keystore, driven through `keytool`.

use once_cell::sync::OnceCell;
use ring::digest;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ca::RootCa;
use crate::error::{Backend, Result, Warning};
use crate::exec::{Cmd, Output, System};
use crate::platform::{Outcome, TrustStore};

/// Default password of every JDK `cacerts` file.
pub const STORE_PASS: &str = "changeit";

#[cfg(windows)]
const KEYTOOL: &str = "bin/keytool.exe";
#[cfg(not(windows))]
const KEYTOOL: &str = "bin/keytool";

#[derive(Debug)]
struct JavaState {
    keytool: Option<PathBuf>,
    cacerts: PathBuf,
}

pub struct JavaStore {
    sys: Arc<dyn System>,
    java_home: Option<PathBuf>,
    state: OnceCell<JavaState>,
}

impl JavaStore {
    pub fn new(sys: Arc<dyn System>, java_home: Option<PathBuf>) -> Self {
        Self {
            sys,
            java_home,
            state: OnceCell::new(),
        }
    }

    fn state(&self) -> &JavaState {
        self.state.get_or_init(|| {
            let Some(home) = self.java_home.as_deref() else {
                return JavaState {
                    keytool: None,
                    cacerts: PathBuf::new(),
                };
            };
            let keytool = Some(home.join(KEYTOOL)).filter(|p| self.sys.path_exists(p));
            // JDK 8 nests the keystore under jre/.
            let jre = home.join("jre/lib/security/cacerts");
            let cacerts = if self.sys.path_exists(&jre) {
                jre
            } else {
                home.join("lib/security/cacerts")
            };
            tracing::debug!(keytool = ?keytool, cacerts = %cacerts.display(), "Java discovery");
            JavaState { keytool, cacerts }
        })
    }

    /// Path of the keystore that will be edited.
    pub fn cacerts(&self) -> &Path {
        &self.state().cacerts
    }

    fn store_args(&self) -> [String; 4] {
        [
            "-keystore".to_string(),
            self.state().cacerts.to_string_lossy().into_owned(),
            "-storepass".to_string(),
            STORE_PASS.to_string(),
        ]
    }

    /// Retry once with privileges when the keystore could not be opened
    /// for writing.
    fn exec_keytool(&self, cmd: &Cmd) -> Result<Output> {
        let out = self.sys.exec(cmd)?;
        if !out.success && out.contains("java.io.FileNotFoundException") && !cfg!(windows) {
            let mut cmd = cmd.clone();
            if let Some(home) = &self.java_home {
                cmd = cmd.env("JAVA_HOME", home.to_string_lossy());
            }
            tracing::debug!(command = %cmd, "keystore not writable, retrying with sudo");
            return self.sys.sudo_exec(&cmd);
        }
        Ok(out)
    }
}

/// Uppercase hex digests of `der`, as keytool prints them without colons.
pub fn fingerprints(der: &[u8]) -> [String; 2] {
    [
        hex::encode_upper(digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, der)),
        hex::encode_upper(digest::digest(&digest::SHA256, der)),
    ]
}

/// True if `keytool -list` output mentions either fingerprint of `der`.
/// Older keytools print SHA-1, newer ones SHA-256.
pub fn listing_contains(listing: &str, der: &[u8]) -> bool {
    let listing = listing.replace(':', "");
    fingerprints(der).iter().any(|fp| listing.contains(fp.as_str()))
}

impl TrustStore for JavaStore {
    fn backend(&self) -> Backend {
        Backend::Java
    }

    fn display_name(&self) -> &str {
        "Java"
    }

    fn is_present(&self) -> bool {
        self.java_home.is_some()
    }

    fn check(&self, ca: &RootCa) -> Result<Outcome> {
        let Some(keytool) = self.state().keytool.as_deref() else {
            return Ok(Outcome::degraded(Warning::NoKeytool));
        };
        let cmd = Cmd::new(keytool).arg("-list").args(self.store_args());
        let out = self.sys.exec(&cmd)?;
        let out = cmd.expect_success(out, "keytool -list")?;
        Ok(if listing_contains(&out.text(), ca.der()) {
            Outcome::yes()
        } else {
            Outcome::no()
        })
    }

    fn install(&self, ca: &RootCa) -> Result<Outcome> {
        let Some(keytool) = self.state().keytool.as_deref() else {
            return Ok(Outcome::degraded(Warning::NoKeytool));
        };
        let cmd = Cmd::new(keytool)
            .args(["-importcert", "-noprompt"])
            .args(self.store_args())
            .arg("-file")
            .arg(ca.cert_path().to_string_lossy())
            .arg("-alias")
            .arg(ca.unique_name());
        let out = self.exec_keytool(&cmd)?;
        cmd.expect_success(out, "keytool -importcert")?;
        tracing::info!(keystore = %self.cacerts().display(), "imported CA into Java keystore");
        Ok(Outcome::yes())
    }

    fn uninstall(&self, ca: &RootCa) -> Result<Outcome> {
        let Some(keytool) = self.state().keytool.as_deref() else {
            return Ok(Outcome::degraded(Warning::NoKeytool));
        };
        let cmd = Cmd::new(keytool)
            .arg("-delete")
            .arg("-alias")
            .arg(ca.unique_name())
            .args(self.store_args());
        let out = self.exec_keytool(&cmd)?;
        if out.contains("does not exist") {
            tracing::debug!(alias = ca.unique_name(), "alias not in Java keystore");
            return Ok(Outcome::no());
        }
        cmd.expect_success(out, "keytool -delete")?;
        tracing::info!(keystore = %self.cacerts().display(), "deleted CA from Java keystore");
        Ok(Outcome::yes())
    }
}
