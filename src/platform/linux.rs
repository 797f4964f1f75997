//! System store for Linux and other Unix: a CA anchor directory plus the
//! distribution's refresh command.

use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{NativeRoots, Outcome, TrustStore, NSS_BROWSERS};
use crate::ca::RootCa;
use crate::error::{Backend, Result, Warning};
use crate::exec::{Cmd, System};

/// Filename used before anchors were named after the CA serial.
pub const LEGACY_ANCHOR_NAME: &str = "localca-rootCA";

/// One distribution family's anchor layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorDir {
    pub dir: &'static str,
    pub extension: &'static str,
    pub refresh: &'static [&'static str],
}

/// Probed in order; the first existing directory wins.
pub const ANCHOR_DIRS: [AnchorDir; 4] = [
    AnchorDir {
        dir: "/etc/pki/ca-trust/source/anchors/",
        extension: "pem",
        refresh: &["update-ca-trust", "extract"],
    },
    AnchorDir {
        dir: "/usr/local/share/ca-certificates/",
        extension: "crt",
        refresh: &["update-ca-certificates"],
    },
    AnchorDir {
        dir: "/etc/ca-certificates/trust-source/anchors/",
        extension: "crt",
        refresh: &["trust", "extract-compat"],
    },
    AnchorDir {
        dir: "/usr/share/pki/trust/anchors",
        extension: "pem",
        refresh: &["update-ca-certificates"],
    },
];

impl AnchorDir {
    /// Anchor path for a file stem.
    pub fn file_for(&self, stem: &str) -> PathBuf {
        Path::new(self.dir).join(format!("{stem}.{}", self.extension))
    }

    fn refresh_cmd(&self) -> Cmd {
        Cmd::new(self.refresh[0]).args(self.refresh[1..].iter().copied())
    }

    fn refresh_label(&self) -> String {
        self.refresh.join(" ")
    }
}

pub struct AnchorDirStore {
    sys: Arc<dyn System>,
    roots: NativeRoots,
    anchor: OnceCell<Option<AnchorDir>>,
}

impl AnchorDirStore {
    pub fn new(sys: Arc<dyn System>, roots: NativeRoots) -> Self {
        Self {
            sys,
            roots,
            anchor: OnceCell::new(),
        }
    }

    /// The detected anchor layout, `None` on unsupported distributions.
    pub fn anchor(&self) -> Option<AnchorDir> {
        *self.anchor.get_or_init(|| {
            let found = ANCHOR_DIRS
                .iter()
                .find(|a| self.sys.path_exists(Path::new(a.dir)))
                .copied();
            tracing::debug!(anchor = ?found.map(|a| a.dir), "system trust anchor directory");
            found
        })
    }

    fn anchor_file(anchor: &AnchorDir, ca: &RootCa) -> PathBuf {
        anchor.file_for(&ca.unique_name().replace(' ', "_"))
    }

    fn refresh(&self, anchor: &AnchorDir) -> Result<()> {
        let cmd = anchor.refresh_cmd();
        let out = self.sys.sudo_exec(&cmd)?;
        cmd.expect_success(out, &anchor.refresh_label())?;
        Ok(())
    }
}

impl TrustStore for AnchorDirStore {
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
        let Some(anchor) = self.anchor() else {
            return Ok(Outcome::degraded(Warning::UnsupportedPlatform {
                browsers: NSS_BROWSERS.to_string(),
                root_ca: ca.cert_path().to_path_buf(),
            }));
        };

        let target = Self::anchor_file(&anchor, ca);
        let tee = Cmd::new("tee")
            .arg(target.to_string_lossy())
            .stdin(ca.cert_pem().as_bytes());
        let out = self.sys.sudo_exec(&tee)?;
        tee.expect_success(out, "tee")?;

        self.refresh(&anchor)?;
        tracing::info!(path = %target.display(), "installed CA anchor");
        Ok(Outcome::yes())
    }

    fn uninstall(&self, ca: &RootCa) -> Result<Outcome> {
        let Some(anchor) = self.anchor() else {
            return Ok(Outcome::no());
        };

        let target = Self::anchor_file(&anchor, ca);
        let rm = Cmd::new("rm").arg("-f").arg(target.to_string_lossy());
        let out = self.sys.sudo_exec(&rm)?;
        rm.expect_success(out, "rm")?;

        let legacy = anchor.file_for(LEGACY_ANCHOR_NAME);
        if self.sys.path_exists(&legacy) {
            let rm = Cmd::new("rm").arg("-f").arg(legacy.to_string_lossy());
            let out = self.sys.sudo_exec(&rm)?;
            rm.expect_success(out, "rm (legacy filename)")?;
        }

        self.refresh(&anchor)?;
        tracing::info!(path = %target.display(), "removed CA anchor");
        Ok(Outcome::yes())
    }
}
