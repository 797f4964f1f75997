//! Editing of exported macOS admin trust settings.
//!
//! Layout: a dictionary with `trustVersion` (must be 1) and `trustList`,
//! a dictionary of entries keyed by certificate hash. Each entry carries
//! `issuerName` (DER RDN sequence) and an optional `trustSettings` array.

use plist::{Dictionary, Value};
use std::io::Cursor;

use crate::error::{Error, Result};

const SUPPORTED_VERSION: u64 = 1;

/// OID 1.2.840.113635.100.1.3, Apple SSL policy.
const POLICY_SSL_SERVER: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x63, 0x64, 0x01, 0x03];
/// OID 1.2.840.113635.100.1.2, Apple X.509 basic policy.
const POLICY_BASIC_X509: [u8; 9] = [0x2a, 0x86, 0x48, 0x86, 0xf7, 0x63, 0x64, 0x01, 0x02];
/// kSecTrustSettingsResultTrustRoot
const RESULT_TRUST_ROOT: u64 = 1;

#[derive(Debug, Clone)]
pub struct TrustSettings {
    root: Dictionary,
}

impl TrustSettings {
    /// Parse an exported settings file. Rejects unknown versions before
    /// looking at anything else.
    pub fn parse(data: &[u8]) -> Result<TrustSettings> {
        let value = Value::from_reader(Cursor::new(data))
            .map_err(|e| Error::TrustSettings(format!("failed to parse trust settings: {e}")))?;
        let root = value
            .into_dictionary()
            .ok_or_else(|| Error::TrustSettings("trust settings are not a dictionary".into()))?;

        let version = root
            .get("trustVersion")
            .and_then(Value::as_unsigned_integer)
            .ok_or_else(|| Error::TrustSettings("missing trustVersion".into()))?;
        if version != SUPPORTED_VERSION {
            return Err(Error::TrustSettingsVersion(version));
        }
        if root.get("trustList").and_then(Value::as_dictionary).is_none() {
            return Err(Error::TrustSettings("missing trustList".into()));
        }
        Ok(TrustSettings { root })
    }

    /// Mark the entry issued by `subject_der` as a trusted SSL and X.509
    /// root. Returns false when no entry matches.
    pub fn trust_issuer(&mut self, subject_der: &[u8]) -> bool {
        let Some(list) = self
            .root
            .get_mut("trustList")
            .and_then(Value::as_dictionary_mut)
        else {
            return false;
        };
        for entry in list.values_mut() {
            let Some(entry) = entry.as_dictionary_mut() else {
                continue;
            };
            if entry.get("issuerName").and_then(Value::as_data) != Some(subject_der) {
                continue;
            }
            entry.insert("trustSettings".to_string(), root_trust_settings());
            return true;
        }
        false
    }

    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        Value::Dictionary(self.root.clone())
            .to_writer_xml(&mut out)
            .map_err(|e| Error::TrustSettings(format!("failed to serialize trust settings: {e}")))?;
        Ok(out)
    }
}

fn policy(oid: &[u8], name: &str) -> Value {
    let mut d = Dictionary::new();
    d.insert("kSecTrustSettingsPolicy".to_string(), Value::Data(oid.to_vec()));
    d.insert(
        "kSecTrustSettingsPolicyName".to_string(),
        Value::String(name.to_string()),
    );
    d.insert(
        "kSecTrustSettingsResult".to_string(),
        Value::Integer(RESULT_TRUST_ROOT.into()),
    );
    Value::Dictionary(d)
}

fn root_trust_settings() -> Value {
    Value::Array(vec![
        policy(&POLICY_SSL_SERVER, "sslServer"),
        policy(&POLICY_BASIC_X509, "basicX509"),
    ])
}
