//! Root CA creation, loading, and identity.

use rand::RngCore;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, DnValue, IsCa,
    KeyPair, KeyUsagePurpose, SerialNumber,
};
use rsa::pkcs8::EncodePrivateKey;
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};
use x509_parser::pem::Pem;

use crate::error::{Error, Result};
use crate::store;

pub const ROOT_NAME: &str = "rootCA.pem";
pub const ROOT_KEY_NAME: &str = "rootCA-key.pem";

/// Fixed label for CA subjects and every backend lookup key.
pub const CA_LABEL: &str = "localca development CA";

const CA_KEY_BITS: usize = 3072;
const CA_VALIDITY_DAYS: i64 = 3650;

/// The root CA of one CAROOT: certificate, key and derived identity.
#[derive(Debug, Clone)]
pub struct RootCa {
    cert_pem: String,
    key_pem: String,
    der: Vec<u8>,
    subject_der: Vec<u8>,
    serial: String,
    serial_hex: String,
    not_after: OffsetDateTime,
    cert_path: PathBuf,
    key_path: PathBuf,
    unique_name: String,
}

impl RootCa {
    /// Load the CA in `root`, creating one if no certificate exists yet.
    /// The flag is true when a new CA was created.
    pub fn load_or_create(root: &Path) -> Result<(RootCa, bool)> {
        store::ensure_root_dir(root)?;
        if !root.join(ROOT_NAME).exists() {
            return Ok((Self::create(root)?, true));
        }
        Ok((Self::load(root)?, false))
    }

    /// Load an existing CA.
    pub fn load(root: &Path) -> Result<RootCa> {
        let cert_path = root.join(ROOT_NAME);
        let key_path = root.join(ROOT_KEY_NAME);

        let cert_bytes = store::read(&cert_path)?;
        let key_pem = match store::read_optional(&key_path)? {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => String::from_utf8(bytes)
                .map_err(|_| unexpected(&key_path, "key is not valid UTF-8 PEM"))?,
            _ => {
                // Still report a corrupt certificate first.
                parse_ca_cert(&cert_path, &cert_bytes)?;
                return Err(Error::MissingKey(key_path));
            }
        };
        KeyPair::from_pem(&key_pem).map_err(|e| unexpected(&key_path, e))?;

        Self::from_pem(cert_path, key_path, &cert_bytes, key_pem)
    }

    /// Generate a new CA and write it to `root`, replacing any old files.
    pub fn create(root: &Path) -> Result<RootCa> {
        store::ensure_root_dir(root)?;
        let key_pair = generate_rsa_key(CA_KEY_BITS)?;

        let user = user_and_hostname();
        let mut params = CertificateParams::default();
        params.serial_number = Some(random_serial());
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(
            DnType::OrganizationName,
            DnValue::Utf8String(CA_LABEL.to_string()),
        );
        params.distinguished_name.push(
            DnType::OrganizationalUnitName,
            DnValue::Utf8String(user.clone()),
        );
        params.distinguished_name.push(
            DnType::CommonName,
            DnValue::Utf8String(format!("localca {user}")),
        );
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign];

        let now = OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now.saturating_add(Duration::days(CA_VALIDITY_DAYS));

        let cert = params.self_signed(&key_pair)?;
        let cert_pem = cert.pem();
        let key_pem = key_pair.serialize_pem();

        let cert_path = root.join(ROOT_NAME);
        let key_path = root.join(ROOT_KEY_NAME);
        store::write_secret(&key_path, key_pem.as_bytes())?;
        store::write_public(&cert_path, cert_pem.as_bytes())?;

        let ca = Self::from_pem(cert_path, key_path, cert_pem.as_bytes(), key_pem)?;
        tracing::info!(root = %root.display(), name = %ca.unique_name, "created a new local CA");
        Ok(ca)
    }

    fn from_pem(
        cert_path: PathBuf,
        key_path: PathBuf,
        cert_bytes: &[u8],
        key_pem: String,
    ) -> Result<RootCa> {
        let info = parse_ca_cert(&cert_path, cert_bytes)?;
        Ok(RootCa {
            cert_pem: String::from_utf8_lossy(cert_bytes).into_owned(),
            key_pem,
            unique_name: unique_name(&info.serial),
            der: info.der,
            subject_der: info.subject_der,
            serial: info.serial,
            serial_hex: info.serial_hex,
            not_after: info.not_after,
            cert_path,
            key_path,
        })
    }

    /// Lookup key used by every trust store (NSS nickname, Java alias,
    /// system anchor filename).
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// DER encoding of the subject RDN sequence.
    pub fn subject_der(&self) -> &[u8] {
        &self.subject_der
    }

    /// Decimal serial number.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Serial number as uppercase hex, as certutil.exe prints it.
    pub fn serial_hex(&self) -> &str {
        &self.serial_hex
    }

    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// Rebuild an rcgen issuer from the stored PEM files.
    pub(crate) fn issuer(&self) -> Result<(Certificate, KeyPair)> {
        let key = KeyPair::from_pem(&self.key_pem).map_err(|e| unexpected(&self.key_path, e))?;
        let params = CertificateParams::from_ca_cert_pem(&self.cert_pem)
            .map_err(|e| unexpected(&self.cert_path, e))?;
        let cert = params.self_signed(&key)?;
        Ok((cert, key))
    }
}

/// Label plus decimal serial.
pub fn unique_name(serial: &str) -> String {
    format!("{CA_LABEL} {serial}")
}

struct CaCertInfo {
    der: Vec<u8>,
    subject_der: Vec<u8>,
    serial: String,
    serial_hex: String,
    not_after: OffsetDateTime,
}

fn parse_ca_cert(path: &Path, bytes: &[u8]) -> Result<CaCertInfo> {
    let pem = Pem::iter_from_buffer(bytes)
        .next()
        .ok_or_else(|| unexpected(path, "no PEM block"))?
        .map_err(|e| unexpected(path, e))?;
    if pem.label != "CERTIFICATE" {
        return Err(unexpected(path, format!("found {} instead of a certificate", pem.label)));
    }
    let x509 = pem.parse_x509().map_err(|e| unexpected(path, e))?;
    if !x509.is_ca() {
        return Err(unexpected(path, "not a CA certificate"));
    }
    Ok(CaCertInfo {
        subject_der: x509.subject().as_raw().to_vec(),
        serial: x509.tbs_certificate.serial.to_string(),
        serial_hex: hex::encode_upper(x509.raw_serial()),
        not_after: x509.validity().not_after.to_datetime(),
        der: pem.contents.clone(),
    })
}

fn unexpected(path: &Path, reason: impl ToString) -> Error {
    Error::Parse {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

pub(crate) fn generate_rsa_key(bits: usize) -> Result<KeyPair> {
    let private = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
        .map_err(|e| Error::KeyGen(e.to_string()))?;
    let der = private
        .to_pkcs8_der()
        .map_err(|e| Error::KeyGen(e.to_string()))?;
    Ok(KeyPair::try_from(der.as_bytes())?)
}

/// 128 random bits.
pub(crate) fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes[0] &= 0x7f;
    SerialNumber::from_slice(&bytes)
}

/// `user@host`, used in the OU of every certificate we issue.
pub(crate) fn user_and_hostname() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default();
    match hostname() {
        Some(host) if !user.is_empty() => format!("{user}@{host}"),
        Some(host) => host,
        None => user,
    }
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let host = String::from_utf8_lossy(&buf[..end]).into_owned();
    (!host.is_empty()).then_some(host)
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok().filter(|h| !h.is_empty())
}
