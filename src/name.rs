//! Classification and validation of certificate subject names.

use once_cell::sync::Lazy;
use rcgen::{Ia5String, SanType};
use regex::Regex;
use std::fmt;
use std::net::IpAddr;

use crate::error::{Error, Result};

static HOSTNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(\*\.)?[0-9a-z_-]([0-9a-z._-]*[0-9a-z_-])?$").expect("hostname regex")
});

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+(\.[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+)*@[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?)*$")
        .expect("email regex")
});

/// One requested Subject Alternative Name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectName {
    /// Hostname, possibly with a leading `*.` label, already in ASCII form.
    Dns(String),
    Ip(IpAddr),
    Email(String),
    Uri(String),
}

impl SubjectName {
    /// Classify `input` as IP, email, URI or hostname, in that order.
    pub fn parse(input: &str) -> Result<SubjectName> {
        if let Ok(ip) = input.parse::<IpAddr>() {
            return Ok(SubjectName::Ip(ip));
        }
        if EMAIL_REGEX.is_match(input) {
            return Ok(SubjectName::Email(input.to_string()));
        }
        if let Ok(uri) = url::Url::parse(input) {
            if !uri.scheme().is_empty() && uri.host_str().is_some_and(|h| !h.is_empty()) {
                return Ok(SubjectName::Uri(input.to_string()));
            }
        }

        let ascii = idna::domain_to_ascii(input).map_err(|e| Error::InvalidName {
            name: input.to_string(),
            reason: Some(e.to_string()),
        })?;
        if !HOSTNAME_REGEX.is_match(&ascii) {
            return Err(Error::InvalidName {
                name: input.to_string(),
                reason: None,
            });
        }
        Ok(SubjectName::Dns(ascii))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, SubjectName::Dns(h) if h.starts_with("*."))
    }

    pub(crate) fn to_san(&self) -> Result<SanType> {
        Ok(match self {
            SubjectName::Dns(h) => SanType::DnsName(Ia5String::try_from(h.as_str())?),
            SubjectName::Ip(ip) => SanType::IpAddress(*ip),
            SubjectName::Email(e) => SanType::Rfc822Name(Ia5String::try_from(e.as_str())?),
            SubjectName::Uri(u) => SanType::URI(Ia5String::try_from(u.as_str())?),
        })
    }
}

impl fmt::Display for SubjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectName::Dns(s) | SubjectName::Email(s) | SubjectName::Uri(s) => f.write_str(s),
            SubjectName::Ip(ip) => write!(f, "{ip}"),
        }
    }
}

/// Parse every input; the first rejected one aborts.
pub fn parse_names<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<SubjectName>> {
    inputs.iter().map(|s| SubjectName::parse(s.as_ref())).collect()
}
