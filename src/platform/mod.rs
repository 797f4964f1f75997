//! Trust store abstraction and the OS system store implementations.

use once_cell::sync::OnceCell;
use std::sync::Arc;

#[cfg(not(any(target_os = "macos", windows)))]
pub mod linux;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(any(target_os = "macos", test))]
pub mod trust_settings;

#[cfg(windows)]
pub mod windows;

use crate::ca::RootCa;
use crate::error::{Backend, Result, Warning};
use crate::exec::System;

/// Browsers served by the NSS store on this OS.
#[cfg(not(any(target_os = "macos", windows)))]
pub const NSS_BROWSERS: &str = "Firefox and/or Chrome/Chromium";
#[cfg(any(target_os = "macos", windows))]
pub const NSS_BROWSERS: &str = "Firefox";

/// Result of one store operation that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Outcome {
    /// The CA is trusted (check) or the change was applied.
    pub done: bool,
    /// Set when the store was skipped or degraded.
    pub warning: Option<Warning>,
}

impl Outcome {
    pub fn yes() -> Self {
        Self {
            done: true,
            warning: None,
        }
    }

    pub fn no() -> Self {
        Self::default()
    }

    pub fn degraded(warning: Warning) -> Self {
        Self {
            done: false,
            warning: Some(warning),
        }
    }
}

/// Check, install and uninstall a root CA in one kind of trust store.
///
/// `Err` is fatal for the operation; degraded results travel in
/// [`Outcome::warning`]. Implementations never print.
pub trait TrustStore: Send + Sync {
    fn backend(&self) -> Backend;
    /// Human readable name, e.g. "Java" or "Firefox".
    fn display_name(&self) -> &str;
    /// Whether the store exists on this machine at all.
    fn is_present(&self) -> bool {
        true
    }
    fn check(&self, ca: &RootCa) -> Result<Outcome>;
    fn install(&self, ca: &RootCa) -> Result<Outcome>;
    fn uninstall(&self, ca: &RootCa) -> Result<Outcome>;
}

/// The OS store for the target platform.
pub fn system_store(sys: Arc<dyn System>) -> Box<dyn TrustStore> {
    #[cfg(target_os = "macos")]
    return Box::new(macos::KeychainStore::new(sys, NativeRoots::new()));

    #[cfg(windows)]
    return Box::new(windows::WindowsStore::new(sys, NativeRoots::new()));

    #[cfg(not(any(target_os = "macos", windows)))]
    return Box::new(linux::AnchorDirStore::new(sys, NativeRoots::new()));
}

/// The OS trust roots as seen by this process. Loaded once; roots added
/// later by this same process stay invisible until the next run.
#[derive(Debug, Default)]
pub struct NativeRoots {
    roots: OnceCell<Vec<RootId>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RootId {
    der: Vec<u8>,
    subject: Vec<u8>,
    spki: Vec<u8>,
}

impl RootId {
    fn parse(der: &[u8]) -> Option<RootId> {
        let (_, x509) = x509_parser::parse_x509_certificate(der).ok()?;
        Some(RootId {
            der: der.to_vec(),
            subject: x509.subject().as_raw().to_vec(),
            spki: x509.public_key().raw.to_vec(),
        })
    }
}

impl NativeRoots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed roots, for tests.
    pub fn from_der<I: IntoIterator<Item = Vec<u8>>>(certs: I) -> Self {
        let roots = OnceCell::new();
        let _ = roots.set(certs.into_iter().filter_map(|d| RootId::parse(&d)).collect());
        Self { roots }
    }

    fn roots(&self) -> &[RootId] {
        self.roots.get_or_init(|| {
            let loaded = rustls_native_certs::load_native_certs();
            for e in &loaded.errors {
                tracing::debug!(error = %e, "skipping unreadable native root");
            }
            let roots: Vec<RootId> = loaded
                .certs
                .iter()
                .filter_map(|c| RootId::parse(c.as_ref()))
                .collect();
            tracing::debug!(count = roots.len(), "loaded native trust roots");
            roots
        })
    }

    /// True if `ca` (or a certificate with its subject and key) is a root.
    pub fn contains(&self, ca: &RootCa) -> bool {
        let Some(id) = RootId::parse(ca.der()) else {
            return false;
        };
        self.roots()
            .iter()
            .any(|r| r.der == id.der || (r.subject == id.subject && r.spki == id.spki))
    }
}
