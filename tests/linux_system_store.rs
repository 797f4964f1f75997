//! Anchor-directory system store with a scripted sudo.
#![cfg(all(unix, not(target_os = "macos")))]

mod common;

use common::FakeSystem;
use localca::error::Warning;
use localca::platform::linux::{AnchorDirStore, ANCHOR_DIRS, LEGACY_ANCHOR_NAME};
use localca::platform::{NativeRoots, TrustStore};
use std::sync::Arc;

const DEBIAN: &str = "/usr/local/share/ca-certificates/";

fn no_roots() -> NativeRoots {
    NativeRoots::from_der(Vec::<Vec<u8>>::new())
}

#[test]
fn first_existing_anchor_dir_wins() {
    let sys = Arc::new(
        FakeSystem::succeeding()
            .with_path(ANCHOR_DIRS[3].dir)
            .with_path(DEBIAN),
    );
    let store = AnchorDirStore::new(sys, no_roots());
    assert_eq!(store.anchor(), Some(ANCHOR_DIRS[1]));
}

#[test]
fn install_tees_the_pem_then_refreshes() {
    let dir = common::temp_dir();
    let ca = common::new_ca(dir.path());
    let sys = Arc::new(FakeSystem::succeeding().with_path(DEBIAN));
    let store = AnchorDirStore::new(sys.clone(), no_roots());

    assert!(store.install(&ca).unwrap().done);

    let expected = format!(
        "{DEBIAN}localca_development_CA_{}.crt",
        ca.serial()
    );
    let calls = sys.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.sudo));
    assert_eq!(calls[0].line(), format!("sudo tee {expected}"));
    assert_eq!(
        calls[0].cmd.stdin.as_deref(),
        Some(ca.cert_pem().as_bytes())
    );
    assert_eq!(calls[1].line(), "sudo update-ca-certificates");
}

#[test]
fn unknown_distribution_is_a_warning() {
    let dir = common::temp_dir();
    let ca = common::new_ca(dir.path());
    let sys = Arc::new(FakeSystem::succeeding());
    let store = AnchorDirStore::new(sys.clone(), no_roots());

    let outcome = store.install(&ca).unwrap();
    assert!(!outcome.done);
    match outcome.warning {
        Some(Warning::UnsupportedPlatform { root_ca, .. }) => {
            assert_eq!(root_ca, ca.cert_path())
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(!store.uninstall(&ca).unwrap().done);
    assert!(sys.calls().is_empty());
}

#[test]
fn uninstall_removes_current_and_legacy_anchors() {
    let dir = common::temp_dir();
    let ca = common::new_ca(dir.path());
    let fedora = ANCHOR_DIRS[0];
    let legacy = fedora.file_for(LEGACY_ANCHOR_NAME);
    let sys = Arc::new(
        FakeSystem::succeeding()
            .with_path(fedora.dir)
            .with_path(legacy.clone()),
    );
    let store = AnchorDirStore::new(sys.clone(), no_roots());

    assert!(store.uninstall(&ca).unwrap().done);
    assert_eq!(
        sys.lines(),
        vec![
            format!(
                "sudo rm -f {}localca_development_CA_{}.pem",
                fedora.dir,
                ca.serial()
            ),
            format!("sudo rm -f {}", legacy.display()),
            "sudo update-ca-trust extract".to_string(),
        ]
    );
    assert!(ca.cert_path().is_file() && ca.key_path().is_file());
}

#[test]
fn failed_refresh_is_fatal() {
    let dir = common::temp_dir();
    let ca = common::new_ca(dir.path());
    let sys = Arc::new(
        FakeSystem::new(|cmd, _| {
            if cmd.name() == "update-ca-certificates" {
                localca::exec::Output::failed(1, "permission denied")
            } else {
                localca::exec::Output::ok("")
            }
        })
        .with_path(DEBIAN),
    );
    let store = AnchorDirStore::new(sys, no_roots());

    let err = store.install(&ca).unwrap_err();
    assert!(err.to_string().contains("update-ca-certificates"));
}

#[test]
fn check_reads_native_roots() {
    let dir = common::temp_dir();
    let ca = common::new_ca(dir.path());
    let other = common::new_ca(&dir.path().join("other"));
    let sys = Arc::new(FakeSystem::succeeding());

    let trusting = AnchorDirStore::new(sys.clone(), NativeRoots::from_der([ca.der().to_vec()]));
    assert!(trusting.check(&ca).unwrap().done);

    let unrelated = AnchorDirStore::new(sys.clone(), NativeRoots::from_der([other.der().to_vec()]));
    assert!(!unrelated.check(&ca).unwrap().done);
    assert!(sys.calls().is_empty());
}
