//! One CAROOT session: the root CA plus every enabled trust store behind a
//! single check/install/uninstall entry point.

use std::fmt;
use std::sync::Arc;

use crate::ca::RootCa;
use crate::cert::{self, IssuedCert, LeafOptions};
use crate::config::{Settings, TrustStores};
use crate::error::{Backend, Error, Notice, Op, Result};
use crate::exec::System;
use crate::java::JavaStore;
use crate::name::SubjectName;
use crate::nss::{NssConfig, NssStore};
use crate::platform::{self, Outcome, TrustStore};

/// Per-store result of a session operation.
#[derive(Debug)]
pub enum StoreStatus {
    Trusted,
    NotTrusted,
    AlreadyInstalled,
    Installed,
    Uninstalled,
    /// Uninstall found nothing to remove.
    NotInstalled,
    /// The store could not be used; see the report's notices.
    Skipped,
    Failed(Error),
}

impl StoreStatus {
    /// The CA is trusted by this store after the operation.
    pub fn is_trusted(&self) -> bool {
        matches!(
            self,
            StoreStatus::Trusted | StoreStatus::AlreadyInstalled | StoreStatus::Installed
        )
    }
}

#[derive(Debug)]
pub struct StoreReport {
    pub backend: Backend,
    pub name: String,
    pub status: StoreStatus,
}

/// Overall trust of the CA across the enabled stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustState {
    Installed,
    PartiallyInstalled,
    Uninstalled,
}

impl fmt::Display for TrustState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrustState::Installed => "installed",
            TrustState::PartiallyInstalled => "partially installed",
            TrustState::Uninstalled => "not installed",
        })
    }
}

#[derive(Debug)]
pub struct Report {
    pub op: Op,
    pub stores: Vec<StoreReport>,
    pub notices: Vec<Notice>,
}

impl Report {
    fn new(op: Op) -> Self {
        Self {
            op,
            stores: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn store(&self, backend: Backend) -> Option<&StoreReport> {
        self.stores.iter().find(|s| s.backend == backend)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&StoreReport, &Error)> {
        self.stores.iter().filter_map(|s| match &s.status {
            StoreStatus::Failed(e) => Some((s, e)),
            _ => None,
        })
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn trust_state(&self) -> TrustState {
        let trusted = self.stores.iter().filter(|s| s.status.is_trusted()).count();
        match trusted {
            0 => TrustState::Uninstalled,
            n if n == self.stores.len() => TrustState::Installed,
            _ => TrustState::PartiallyInstalled,
        }
    }

    fn push_notice(&mut self, notice: Notice) {
        if !self.notices.contains(&notice) {
            self.notices.push(notice);
        }
    }
}

pub struct Session {
    ca: RootCa,
    created: bool,
    enabled: TrustStores,
    sys: Arc<dyn System>,
    stores: Vec<Box<dyn TrustStore>>,
    /// Set after a system install in this process; the loaded OS roots
    /// will not show it until the next run.
    system_installed: bool,
}

impl Session {
    /// Load or create the CA in `settings.caroot` and set up every store.
    pub fn open(settings: &Settings, sys: Arc<dyn System>) -> Result<Session> {
        let (ca, created) = RootCa::load_or_create(&settings.caroot)?;
        let stores: Vec<Box<dyn TrustStore>> = vec![
            platform::system_store(sys.clone()),
            Box::new(NssStore::new(sys.clone(), NssConfig::for_home(&settings.home))),
            Box::new(JavaStore::new(sys.clone(), settings.java_home.clone())),
        ];
        Ok(Self::with_stores(
            ca,
            created,
            settings.trust_stores.clone(),
            sys,
            stores,
        ))
    }

    pub fn with_stores(
        ca: RootCa,
        created: bool,
        enabled: TrustStores,
        sys: Arc<dyn System>,
        stores: Vec<Box<dyn TrustStore>>,
    ) -> Session {
        Session {
            ca,
            created,
            enabled,
            sys,
            stores,
            system_installed: false,
        }
    }

    pub fn ca(&self) -> &RootCa {
        &self.ca
    }

    /// True when this session generated a new CA.
    pub fn created(&self) -> bool {
        self.created
    }

    fn active(&self) -> impl Iterator<Item = &dyn TrustStore> {
        self.stores
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| {
                let on = self.enabled.enabled(s.backend()) && s.is_present();
                if !on {
                    tracing::debug!(store = %s.backend(), "store disabled or absent");
                }
                on
            })
    }

    fn collect_warnings(&self, report: &mut Report, backend: Backend, op: Op) {
        for warning in self.sys.take_warnings() {
            report.push_notice(Notice {
                backend,
                op,
                warning,
            });
        }
    }

    fn record(
        report: &mut Report,
        store: &dyn TrustStore,
        op: Op,
        outcome: Outcome,
        done: StoreStatus,
        not_done: StoreStatus,
    ) {
        let status = match outcome.warning {
            Some(warning) if !outcome.done => {
                report.push_notice(Notice {
                    backend: store.backend(),
                    op,
                    warning,
                });
                StoreStatus::Skipped
            }
            _ if outcome.done => done,
            _ => not_done,
        };
        report.stores.push(StoreReport {
            backend: store.backend(),
            name: store.display_name().to_string(),
            status,
        });
    }

    fn failed(report: &mut Report, store: &dyn TrustStore, err: Error) {
        tracing::debug!(store = %store.backend(), error = %err, "store operation failed");
        report.stores.push(StoreReport {
            backend: store.backend(),
            name: store.display_name().to_string(),
            status: StoreStatus::Failed(err),
        });
    }

    /// Query every enabled store. Never changes anything.
    pub fn check(&self) -> Report {
        let mut report = Report::new(Op::Check);
        for store in self.active() {
            if store.backend() == Backend::System && self.system_installed {
                Self::record(
                    &mut report,
                    store,
                    Op::Check,
                    Outcome::yes(),
                    StoreStatus::Trusted,
                    StoreStatus::NotTrusted,
                );
                continue;
            }
            match store.check(&self.ca) {
                Ok(o) => Self::record(
                    &mut report,
                    store,
                    Op::Check,
                    o,
                    StoreStatus::Trusted,
                    StoreStatus::NotTrusted,
                ),
                Err(e) => Self::failed(&mut report, store, e),
            }
            self.collect_warnings(&mut report, store.backend(), Op::Check);
        }
        report
    }

    /// Install into every enabled store that does not trust the CA yet.
    /// A failing store does not stop the others.
    pub fn install(&mut self) -> Report {
        let mut report = Report::new(Op::Install);
        let mut system_installed = self.system_installed;
        for store in self.active() {
            let already = if store.backend() == Backend::System && system_installed {
                true
            } else {
                match store.check(&self.ca) {
                    Ok(o) => o.done,
                    Err(e) => {
                        tracing::debug!(store = %store.backend(), error = %e, "pre-install check failed");
                        false
                    }
                }
            };
            if already {
                Self::record(
                    &mut report,
                    store,
                    Op::Install,
                    Outcome::yes(),
                    StoreStatus::AlreadyInstalled,
                    StoreStatus::NotInstalled,
                );
                self.collect_warnings(&mut report, store.backend(), Op::Install);
                continue;
            }

            match store.install(&self.ca) {
                Ok(o) => {
                    if store.backend() == Backend::System && o.done {
                        system_installed = true;
                    }
                    Self::record(
                        &mut report,
                        store,
                        Op::Install,
                        o,
                        StoreStatus::Installed,
                        StoreStatus::NotInstalled,
                    );
                }
                Err(e) => Self::failed(&mut report, store, e),
            }
            self.collect_warnings(&mut report, store.backend(), Op::Install);
        }
        self.system_installed = system_installed;
        report
    }

    /// Remove the CA from every enabled store, the system store last.
    /// The CA files in the CAROOT are kept.
    pub fn uninstall(&mut self) -> Report {
        let mut report = Report::new(Op::Uninstall);
        let mut system_installed = self.system_installed;
        for store in self.active().collect::<Vec<_>>().into_iter().rev() {
            match store.uninstall(&self.ca) {
                Ok(o) => {
                    if store.backend() == Backend::System && o.done {
                        system_installed = false;
                    }
                    Self::record(
                        &mut report,
                        store,
                        Op::Uninstall,
                        o,
                        StoreStatus::Uninstalled,
                        StoreStatus::NotInstalled,
                    );
                }
                Err(e) => Self::failed(&mut report, store, e),
            }
            self.collect_warnings(&mut report, store.backend(), Op::Uninstall);
        }
        self.system_installed = system_installed;
        report
    }

    /// Issue a leaf certificate for `names`.
    pub fn issue(&self, names: &[SubjectName], opts: &LeafOptions) -> Result<IssuedCert> {
        cert::issue_leaf(&self.ca, names, opts)
    }

    /// Sign a PEM encoded CSR.
    pub fn sign_csr(&self, csr_pem: &str) -> Result<IssuedCert> {
        cert::sign_csr(&self.ca, csr_pem)
    }
}
