//! Windows system store: the current user's ROOT store via certutil.exe.

use std::sync::Arc;

use super::{NativeRoots, Outcome, TrustStore};
use crate::ca::RootCa;
use crate::error::{Backend, Result};
use crate::exec::{Cmd, System};

pub struct WindowsStore {
    sys: Arc<dyn System>,
    roots: NativeRoots,
}

impl WindowsStore {
    pub fn new(sys: Arc<dyn System>, roots: NativeRoots) -> Self {
        Self { sys, roots }
    }
}

impl TrustStore for WindowsStore {
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
        let cmd = Cmd::new("certutil")
            .args(["-addstore", "-user", "ROOT"])
            .arg(ca.cert_path().to_string_lossy());
        let out = self.sys.exec(&cmd)?;
        cmd.expect_success(out, "certutil -addstore")?;
        tracing::info!("installed CA in the user ROOT store");
        Ok(Outcome::yes())
    }

    /// Certificates are deleted by serial, which certutil prints in hex.
    fn uninstall(&self, ca: &RootCa) -> Result<Outcome> {
        let cmd = Cmd::new("certutil")
            .args(["-delstore", "-user", "ROOT"])
            .arg(ca.serial_hex());
        let out = self.sys.exec(&cmd)?;
        cmd.expect_success(out, "certutil -delstore")?;
        tracing::info!("removed CA from the user ROOT store");
        Ok(Outcome::yes())
    }
}
