//! Leaf certificate issuance, CSR signing, and output files.

use rcgen::{
    CertificateParams, CertificateSigningRequestParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, Ia5String, KeyPair, KeyUsagePurpose, SanType,
};
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};

use crate::ca::{generate_rsa_key, random_serial, user_and_hostname, RootCa};
use crate::error::{Error, Result};
use crate::name::SubjectName;
use crate::store;

/// Organization of every leaf certificate.
pub const LEAF_ORG: &str = "localca development certificate";

/// Password of generated PKCS#12 bundles.
pub const PKCS12_PASSWORD: &str = "changeit";

const LEAF_KEY_BITS: usize = 2048;
/// Two years and three months, under the 825 day limit of Apple platforms.
const LEAF_VALIDITY_DAYS: i64 = 820;

#[derive(Debug, Clone, Copy, Default)]
pub struct LeafOptions {
    pub ecdsa: bool,
    pub client: bool,
    /// Also put the first name in the CN, for tools that only show that.
    pub pkcs12: bool,
}

/// A freshly signed certificate. `key_pem` is `None` for CSR signing.
#[derive(Debug, Clone)]
pub struct IssuedCert {
    pub cert_pem: String,
    pub key_pem: Option<String>,
    pub not_after: OffsetDateTime,
}

/// Issue a leaf for `names`, signed by `ca`.
pub fn issue_leaf(ca: &RootCa, names: &[SubjectName], opts: &LeafOptions) -> Result<IssuedCert> {
    if names.is_empty() {
        return Err(Error::InvalidName {
            name: String::new(),
            reason: Some("no names given".into()),
        });
    }
    let (issuer_cert, issuer_key) = ca.issuer()?;

    let subject_key = if opts.ecdsa {
        KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?
    } else {
        generate_rsa_key(LEAF_KEY_BITS)?
    };

    let mut params = CertificateParams::default();
    params.serial_number = Some(random_serial());
    params.distinguished_name = DistinguishedName::new();
    params.distinguished_name.push(
        DnType::OrganizationName,
        DnValue::Utf8String(LEAF_ORG.to_string()),
    );
    params.distinguished_name.push(
        DnType::OrganizationalUnitName,
        DnValue::Utf8String(user_and_hostname()),
    );
    if opts.pkcs12 {
        params.distinguished_name.push(
            DnType::CommonName,
            DnValue::Utf8String(names[0].to_string()),
        );
    }
    params.subject_alt_names = names
        .iter()
        .map(SubjectName::to_san)
        .collect::<Result<Vec<_>>>()?;

    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    if !opts.ecdsa {
        params.key_usages.push(KeyUsagePurpose::KeyEncipherment);
    }
    if opts.client {
        params
            .extended_key_usages
            .push(ExtendedKeyUsagePurpose::ClientAuth);
    }
    if names.iter().any(|n| !matches!(n, SubjectName::Email(_))) {
        params
            .extended_key_usages
            .push(ExtendedKeyUsagePurpose::ServerAuth);
    }
    if names.iter().any(|n| matches!(n, SubjectName::Email(_))) {
        params
            .extended_key_usages
            .push(ExtendedKeyUsagePurpose::EmailProtection);
    }
    params.use_authority_key_identifier_extension = true;

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now.saturating_add(Duration::days(LEAF_VALIDITY_DAYS));
    let not_after = params.not_after;

    let cert = params.signed_by(&subject_key, &issuer_cert, &issuer_key)?;
    tracing::debug!(names = names.len(), ecdsa = opts.ecdsa, client = opts.client, "issued leaf");

    Ok(IssuedCert {
        cert_pem: cert.pem(),
        key_pem: Some(subject_key.serialize_pem()),
        not_after,
    })
}

/// Sign an externally generated CSR as-is, filling in what browsers need.
pub fn sign_csr(ca: &RootCa, csr_pem: &str) -> Result<IssuedCert> {
    let csr = CertificateSigningRequestParams::from_pem(csr_pem)
        .map_err(|e| Error::Csr(e.to_string()))?;
    let (issuer_cert, issuer_key) = ca.issuer()?;

    let mut params = csr.params;
    params.serial_number = Some(random_serial());

    // The Common Name alone does not work in modern browsers.
    if params.subject_alt_names.is_empty() {
        let cn = match params.distinguished_name.get(&DnType::CommonName) {
            Some(DnValue::Utf8String(s)) => Some(s.clone()),
            Some(DnValue::PrintableString(s)) => Some(s.as_str().to_string()),
            _ => None,
        };
        let cn = cn.ok_or_else(|| Error::Csr("no Subject Alternative Names or Common Name".into()))?;
        params.subject_alt_names = vec![SanType::DnsName(Ia5String::try_from(cn)?)];
    }
    if params.key_usages.is_empty() {
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
    }
    if params.extended_key_usages.is_empty() {
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        if params
            .subject_alt_names
            .iter()
            .any(|s| matches!(s, SanType::Rfc822Name(_)))
        {
            params
                .extended_key_usages
                .push(ExtendedKeyUsagePurpose::EmailProtection);
        }
    }
    params.use_authority_key_identifier_extension = true;

    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now.saturating_add(Duration::days(LEAF_VALIDITY_DAYS));
    let not_after = params.not_after;

    let csr = CertificateSigningRequestParams {
        params,
        public_key: csr.public_key,
    };
    let cert = csr.signed_by(&issuer_cert, &issuer_key)?;

    Ok(IssuedCert {
        cert_pem: cert.pem(),
        key_pem: None,
        not_after,
    })
}

/// Default file stem for a name list: `*` becomes `_wildcard`, `:`
/// becomes `_`, extra names add `+N`, client certs add `-client`.
pub fn file_stem<S: AsRef<str>>(names: &[S], client: bool) -> String {
    let mut stem = names
        .first()
        .map(|n| n.as_ref().replace(':', "_").replace('*', "_wildcard"))
        .unwrap_or_default();
    if names.len() > 1 {
        stem.push_str(&format!("+{}", names.len() - 1));
    }
    if client {
        stem.push_str("-client");
    }
    stem
}

/// Where a leaf gets written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
    pub p12: PathBuf,
}

/// User supplied output paths; unset ones fall back to the stem.
#[derive(Debug, Clone, Default)]
pub struct OutputOverrides {
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub p12_file: Option<PathBuf>,
}

impl OutputFiles {
    pub fn for_names<S: AsRef<str>>(names: &[S], client: bool, overrides: &OutputOverrides) -> Self {
        let stem = file_stem(names, client);
        Self {
            cert: overrides
                .cert_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("./{stem}.pem"))),
            key: overrides
                .key_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("./{stem}-key.pem"))),
            p12: overrides
                .p12_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("./{stem}.p12"))),
        }
    }
}

/// Default output for a CSR: the CSR file name with a `.pem` extension.
pub fn csr_output_file(csr_path: &Path, cert_file: Option<&Path>) -> PathBuf {
    if let Some(p) = cert_file {
        return p.to_path_buf();
    }
    let stem = csr_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csr".to_string());
    PathBuf::from(format!("./{stem}.pem"))
}

/// Write certificate and key PEM files. The same path for both gets one
/// owner-only file with the certificate followed by the key.
pub fn write_pem_files(issued: &IssuedCert, files: &OutputFiles) -> Result<()> {
    let key_pem = issued.key_pem.as_deref().unwrap_or_default();
    if files.cert == files.key {
        let mut both = issued.cert_pem.clone().into_bytes();
        both.extend_from_slice(key_pem.as_bytes());
        return store::write_secret(&files.key, &both);
    }
    store::write_public(&files.cert, issued.cert_pem.as_bytes())?;
    if issued.key_pem.is_some() {
        store::write_secret(&files.key, key_pem.as_bytes())?;
    }
    Ok(())
}

/// Bundle leaf, key and CA certificate into a PKCS#12 file.
pub fn to_pkcs12(issued: &IssuedCert, ca: &RootCa) -> Result<Vec<u8>> {
    use p12_keystore::{Certificate, KeyStore, KeyStoreEntry, PrivateKeyChain};

    let key_pem = issued
        .key_pem
        .as_deref()
        .ok_or_else(|| Error::Pkcs12("no private key to bundle".into()))?;
    let key_der = rustls_pemfile::private_key(&mut key_pem.as_bytes())
        .map_err(|e| Error::Pkcs12(format!("parse private key PEM: {e}")))?
        .ok_or_else(|| Error::Pkcs12("no private key in PEM".into()))?;

    let leaf_der = first_cert_der(&issued.cert_pem)?;
    let leaf = Certificate::from_der(&leaf_der)
        .map_err(|e| Error::Pkcs12(format!("parse certificate DER: {e}")))?;
    let root = Certificate::from_der(ca.der())
        .map_err(|e| Error::Pkcs12(format!("parse CA certificate DER: {e}")))?;

    let mut keystore = KeyStore::new();
    let chain = PrivateKeyChain::new(key_der.secret_der(), [], vec![leaf, root]);
    keystore.add_entry("localca", KeyStoreEntry::PrivateKeyChain(chain));

    keystore
        .writer(PKCS12_PASSWORD)
        .write()
        .map_err(|e| Error::Pkcs12(e.to_string()))
}

fn first_cert_der(pem: &str) -> Result<Vec<u8>> {
    rustls_pemfile::certs(&mut pem.as_bytes())
        .next()
        .and_then(|r| r.ok())
        .map(|der| der.as_ref().to_vec())
        .ok_or_else(|| Error::Pkcs12("no certificate in PEM".into()))
}
