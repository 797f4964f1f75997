//! Root CA creation and reload.

mod common;

use localca::ca::{RootCa, ROOT_KEY_NAME, ROOT_NAME};
use std::fs;
use x509_parser::extensions::ParsedExtension;

#[test]
fn creates_pem_files_once() {
    let dir = common::temp_dir();
    let root = dir.path().join("caroot");

    let (ca, created) = RootCa::load_or_create(&root).unwrap();
    assert!(created);
    assert!(root.join(ROOT_NAME).is_file());
    assert!(root.join(ROOT_KEY_NAME).is_file());

    let cert = fs::read_to_string(root.join(ROOT_NAME)).unwrap();
    let key = fs::read_to_string(root.join(ROOT_KEY_NAME)).unwrap();
    assert!(cert.contains("-----BEGIN CERTIFICATE-----"));
    assert!(key.contains("-----BEGIN") && key.contains("PRIVATE KEY-----"));

    let (again, created) = RootCa::load_or_create(&root).unwrap();
    assert!(!created);
    assert_eq!(again.serial(), ca.serial());
    assert_eq!(again.unique_name(), ca.unique_name());
    assert_eq!(again.der(), ca.der());
}

#[test]
fn unique_name_is_label_and_decimal_serial() {
    let dir = common::temp_dir();
    let ca = common::new_ca(dir.path());

    assert_eq!(
        ca.unique_name(),
        format!("localca development CA {}", ca.serial())
    );
    assert!(ca.serial().chars().all(|c| c.is_ascii_digit()));
}

#[test]
fn distinct_roots_get_distinct_names() {
    let a = common::temp_dir();
    let b = common::temp_dir();
    assert_ne!(
        common::new_ca(a.path()).unique_name(),
        common::new_ca(b.path()).unique_name()
    );
}

#[test]
fn root_is_constrained_signing_ca() {
    let dir = common::temp_dir();
    let ca = common::new_ca(dir.path());
    let (_, x509) = x509_parser::parse_x509_certificate(ca.der()).unwrap();

    assert!(x509.is_ca());
    let mut saw_constraints = false;
    let mut saw_key_usage = false;
    for ext in x509.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::BasicConstraints(bc) => {
                saw_constraints = true;
                assert!(bc.ca);
                assert_eq!(bc.path_len_constraint, Some(0));
            }
            ParsedExtension::KeyUsage(ku) => {
                saw_key_usage = true;
                assert!(ku.key_cert_sign());
                assert!(!ku.digital_signature());
            }
            _ => {}
        }
    }
    assert!(saw_constraints && saw_key_usage);

    let org = x509
        .subject()
        .iter_organization()
        .next()
        .and_then(|o| o.as_str().ok())
        .map(String::from);
    assert_eq!(org.as_deref(), Some("localca development CA"));
    assert_eq!(x509.subject().as_raw(), ca.subject_der());
}

#[cfg(unix)]
#[test]
fn key_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = common::temp_dir();
    let ca = common::new_ca(dir.path());
    let mode = fs::metadata(ca.key_path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
