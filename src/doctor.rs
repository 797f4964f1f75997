//! Turns a trust check into user-facing health lines.

use crate::error::Op;
use crate::trust::{Report, StoreStatus};

/// Result of a single check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub ok: bool,
    pub message: String,
}

/// One line per checked store, plus one per notice. Failed stores are
/// left to the caller, which reports them as errors.
pub fn run_checks(report: &Report) -> Vec<CheckResult> {
    let mut results = Vec::new();

    for store in &report.stores {
        let where_ = format!("the {} trust store", store.name);
        let (ok, message) = match &store.status {
            StoreStatus::Trusted | StoreStatus::AlreadyInstalled | StoreStatus::Installed => {
                (true, format!("the local CA is installed in {where_}"))
            }
            StoreStatus::NotTrusted | StoreStatus::NotInstalled | StoreStatus::Uninstalled => {
                (false, format!("the local CA is not installed in {where_}."))
            }
            StoreStatus::Skipped => (false, format!("{where_} could not be checked.")),
            StoreStatus::Failed(_) => continue,
        };
        results.push(CheckResult { ok, message });
    }

    for notice in report.notices.iter().filter(|n| n.op == Op::Check) {
        results.push(CheckResult {
            ok: false,
            message: notice.hint(),
        });
    }

    results
}

/// True when some check wants the user to run an install.
pub fn needs_install(results: &[CheckResult]) -> bool {
    results.iter().any(|r| !r.ok)
}
