//! macOS system store: the System keychain plus explicit admin trust
//! settings.

use std::sync::Arc;

use super::trust_settings::TrustSettings;
use super::{NativeRoots, Outcome, TrustStore};
use crate::ca::RootCa;
use crate::error::{Backend, Error, Result};
use crate::exec::{Cmd, System};
use crate::store;

const SYSTEM_KEYCHAIN: &str = "/Library/Keychains/System.keychain";

pub struct KeychainStore {
    sys: Arc<dyn System>,
    roots: NativeRoots,
}

impl KeychainStore {
    pub fn new(sys: Arc<dyn System>, roots: NativeRoots) -> Self {
        Self { sys, roots }
    }

    fn security(&self, args: &[&str], label: &str) -> Result<()> {
        let cmd = Cmd::new("security").args(args.iter().copied());
        let out = self.sys.sudo_exec(&cmd)?;
        cmd.expect_success(out, label)?;
        Ok(())
    }

    /// Write explicit sslServer and basicX509 trust for the CA subject.
    fn pin_trust_settings(&self, ca: &RootCa) -> Result<()> {
        let plist_file = tempfile::Builder::new()
            .prefix("trust-settings")
            .tempfile()
            .map_err(|e| Error::TrustSettings(format!("failed to create temp file: {e}")))?;
        let path = plist_file.path().to_string_lossy().into_owned();

        self.security(
            &["trust-settings-export", "-d", &path],
            "security trust-settings-export",
        )?;

        let data = store::read(plist_file.path())?;
        let mut settings = TrustSettings::parse(&data)?;
        if !settings.trust_issuer(ca.subject_der()) {
            tracing::debug!("no trust settings entry for the CA subject");
        }
        store::write_secret(plist_file.path(), &settings.to_xml()?)?;

        self.security(
            &["trust-settings-import", "-d", &path],
            "security trust-settings-import",
        )
    }
}

impl TrustStore for KeychainStore {
    fn backend(&self) -> Backend {
        Backend::System
    }

    fn display_name(&self) -> &str {
        "system"
    }

    fn check(&self, ca: &RootCa) -> Result<Outcome> {
        Ok(if self.roots.contains(ca) {
            Outcome::yes()
        } else {
            Outcome::no()
        })
    }

    fn install(&self, ca: &RootCa) -> Result<Outcome> {
        let cert = ca.cert_path().to_string_lossy().into_owned();
        self.security(
            &["add-trusted-cert", "-d", "-k", SYSTEM_KEYCHAIN, &cert],
            "security add-trusted-cert",
        )?;
        self.pin_trust_settings(ca)?;
        tracing::info!(keychain = SYSTEM_KEYCHAIN, "installed CA in keychain");
        Ok(Outcome::yes())
    }

    fn uninstall(&self, ca: &RootCa) -> Result<Outcome> {
        let cert = ca.cert_path().to_string_lossy().into_owned();
        self.security(
            &["remove-trusted-cert", "-d", &cert],
            "security remove-trusted-cert",
        )?;
        tracing::info!("removed CA from keychain");
        Ok(Outcome::yes())
    }
}
