//! Classification of requested names.

use localca::name::{parse_names, SubjectName};
use localca::Error;
use std::net::IpAddr;

#[test]
fn plain_and_wildcard_hostnames() {
    assert_eq!(
        SubjectName::parse("example.org").unwrap(),
        SubjectName::Dns("example.org".into())
    );
    let wildcard = SubjectName::parse("*.example.it").unwrap();
    assert_eq!(wildcard, SubjectName::Dns("*.example.it".into()));
    assert!(wildcard.is_wildcard());
    assert!(SubjectName::parse("localhost").is_ok());
}

#[test]
fn bang_is_rejected_verbatim() {
    let err = SubjectName::parse("!").unwrap_err();
    match &err {
        Error::InvalidName { name, .. } => assert_eq!(name, "!"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("\"!\" is not a valid hostname"));
}

#[test]
fn double_wildcard_is_rejected() {
    assert!(matches!(
        SubjectName::parse("*.*.example.it"),
        Err(Error::InvalidName { .. })
    ));
}

#[test]
fn ip_addresses() {
    assert_eq!(
        SubjectName::parse("127.0.0.1").unwrap(),
        SubjectName::Ip("127.0.0.1".parse::<IpAddr>().unwrap())
    );
    assert!(matches!(
        SubjectName::parse("::1").unwrap(),
        SubjectName::Ip(IpAddr::V6(_))
    ));
}

#[test]
fn email_skips_hostname_grammar() {
    assert_eq!(
        SubjectName::parse("filippo@example.com").unwrap(),
        SubjectName::Email("filippo@example.com".into())
    );
    assert!(matches!(
        SubjectName::parse("dev@localhost").unwrap(),
        SubjectName::Email(_)
    ));
}

#[test]
fn uri_needs_scheme_and_host() {
    assert_eq!(
        SubjectName::parse("https://example.com/path").unwrap(),
        SubjectName::Uri("https://example.com/path".into())
    );
    assert!(SubjectName::parse("spiffe://cluster.local/ns/default").is_ok());
    assert!(SubjectName::parse("mailto:someone").is_err());
}

#[test]
fn first_bad_name_aborts_the_list() {
    let err = parse_names(&["example.com", "bad name", "127.0.0.1"]).unwrap_err();
    assert!(matches!(err, Error::InvalidName { ref name, .. } if name == "bad name"));
}
