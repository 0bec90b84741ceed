// Copyright (c) 2023 The MobileCoin Foundation

//! X.509 certificates as seen by the engine.
//!
//! A [`Certificate`] is decoded and its extensions interpreted once, when it
//! is created. Afterwards it is an immutable, cheap to clone handle.

use super::{DistinguishedName, Error, Result};
use crate::asn1::SignedEnvelope;
use crate::oid;
use const_oid::ObjectIdentifier;
use core::fmt::{Debug, Formatter};
use core::hash::{Hash, Hasher};
use core::time::Duration;
use der::asn1::{BitString, OctetString};
use der::{Decode, Encode};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use x509_cert::ext::pkix::name::{DistributionPointName, GeneralName};
use x509_cert::ext::pkix::{
    AuthorityInfoAccessSyntax, AuthorityKeyIdentifier, BasicConstraints, CrlDistributionPoints,
    ExtendedKeyUsage, SubjectKeyIdentifier,
};
use x509_cert::ext::Extension;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

const BEGIN_CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----";
const END_CERTIFICATE: &str = "-----END CERTIFICATE-----";

/// The `KeyUsage` bits of a certificate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct KeyUsage(u16);

impl KeyUsage {
    const DIGITAL_SIGNATURE: u16 = 0;
    const NON_REPUDIATION: u16 = 1;
    const KEY_CERT_SIGN: u16 = 5;
    const CRL_SIGN: u16 = 6;

    fn from_bit_string(bits: &BitString) -> Self {
        let bytes = bits.raw_bytes();
        let value = (0..9u16)
            .filter(|bit| {
                let byte = bytes.get(usize::from(bit / 8)).copied().unwrap_or_default();
                byte & (0x80 >> (bit % 8)) != 0
            })
            .fold(0, |acc, bit| acc | 1 << bit);
        Self(value)
    }

    fn is_set(&self, bit: u16) -> bool {
        self.0 & (1 << bit) != 0
    }

    /// `digitalSignature`
    pub fn digital_signature(&self) -> bool {
        self.is_set(Self::DIGITAL_SIGNATURE)
    }

    /// `nonRepudiation`, also called `contentCommitment`
    pub fn non_repudiation(&self) -> bool {
        self.is_set(Self::NON_REPUDIATION)
    }

    /// `keyCertSign`
    pub fn key_cert_sign(&self) -> bool {
        self.is_set(Self::KEY_CERT_SIGN)
    }

    /// `cRLSign`
    pub fn crl_sign(&self) -> bool {
        self.is_set(Self::CRL_SIGN)
    }
}

#[derive(Default)]
struct Extensions {
    basic_constraints: Option<BasicConstraints>,
    key_usage: Option<KeyUsage>,
    extended_key_usage: Option<Vec<ObjectIdentifier>>,
    subject_key_id: Option<Vec<u8>>,
    authority_key_id: Option<Vec<u8>>,
    ocsp_urls: Vec<String>,
    crl_urls: Vec<String>,
}

impl Extensions {
    fn decode(extensions: &[Extension]) -> Result<Self> {
        let mut decoded = Self::default();
        for extension in extensions {
            let value = extension.extn_value.as_bytes();
            let context = || Error::ExtensionDecoding(oid::name(&extension.extn_id).unwrap_or("?"));
            match extension.extn_id {
                oid::BASIC_CONSTRAINTS => {
                    decoded.basic_constraints =
                        Some(BasicConstraints::from_der(value).map_err(|_| context())?);
                }
                oid::KEY_USAGE => {
                    let bits = BitString::from_der(value).map_err(|_| context())?;
                    decoded.key_usage = Some(KeyUsage::from_bit_string(&bits));
                }
                oid::EXTENDED_KEY_USAGE => {
                    let usages = ExtendedKeyUsage::from_der(value).map_err(|_| context())?;
                    decoded.extended_key_usage = Some(usages.0);
                }
                oid::SUBJECT_KEY_IDENTIFIER => {
                    let id = SubjectKeyIdentifier::from_der(value).map_err(|_| context())?;
                    decoded.subject_key_id = Some(id.0.as_bytes().to_vec());
                }
                oid::AUTHORITY_KEY_IDENTIFIER => {
                    let id = AuthorityKeyIdentifier::from_der(value).map_err(|_| context())?;
                    decoded.authority_key_id =
                        id.key_identifier.map(|id: OctetString| id.as_bytes().to_vec());
                }
                oid::AUTHORITY_INFO_ACCESS => {
                    let access = AuthorityInfoAccessSyntax::from_der(value).map_err(|_| context())?;
                    decoded.ocsp_urls = access
                        .0
                        .into_iter()
                        .filter(|description| description.access_method == oid::AD_OCSP)
                        .filter_map(|description| match description.access_location {
                            GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
                            _ => None,
                        })
                        .collect();
                }
                oid::CRL_DISTRIBUTION_POINTS => {
                    let points = CrlDistributionPoints::from_der(value).map_err(|_| context())?;
                    decoded.crl_urls = points
                        .0
                        .into_iter()
                        .filter_map(|point| match point.distribution_point {
                            Some(DistributionPointName::FullName(names)) => Some(names),
                            _ => None,
                        })
                        .flatten()
                        .filter_map(|name| match name {
                            GeneralName::UniformResourceIdentifier(uri) => Some(uri.to_string()),
                            _ => None,
                        })
                        .collect();
                }
                _ => {}
            }
        }
        Ok(decoded)
    }
}

struct Inner {
    der: Vec<u8>,
    tbs_der: Vec<u8>,
    certificate: x509_cert::Certificate,
    subject: DistinguishedName,
    issuer: DistinguishedName,
    fingerprint: [u8; 32],
    extensions: Extensions,
}

/// An immutable X.509 certificate.
///
/// Equality and hashing use the SHA-256 fingerprint of the DER encoding.
#[derive(Clone)]
pub struct Certificate(Arc<Inner>);

impl Certificate {
    /// Decode a DER certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let certificate = x509_cert::Certificate::from_der(der)?;
        let envelope = SignedEnvelope::from_der(der)?;
        let tbs_der = envelope.tbs.to_der()?;
        let tbs = &certificate.tbs_certificate;
        let extensions = Extensions::decode(tbs.extensions.as_deref().unwrap_or_default())?;
        let subject = DistinguishedName::from(&tbs.subject);
        let issuer = DistinguishedName::from(&tbs.issuer);
        let fingerprint = Sha256::digest(der).into();

        Ok(Self(Arc::new(Inner {
            der: der.to_vec(),
            tbs_der,
            certificate,
            subject,
            issuer,
            fingerprint,
            extensions,
        })))
    }

    /// Decode a single PEM certificate
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (label, der) = pem_rfc7468::decode_vec(pem.trim().as_bytes())
            .map_err(|e| Error::PemDecoding(e.to_string()))?;
        if label != "CERTIFICATE" {
            return Err(Error::PemDecoding(format!("unexpected label {label}")));
        }
        Self::from_der(&der)
    }

    /// Decode every certificate of a PEM bundle.
    ///
    /// Text outside the `CERTIFICATE` blocks is ignored.
    pub fn pem_bundle(pem: &str) -> Result<Vec<Self>> {
        let mut certificates = Vec::new();
        let mut rest = pem;
        while let Some(start) = rest.find(BEGIN_CERTIFICATE) {
            let block = &rest[start..];
            let end = block
                .find(END_CERTIFICATE)
                .ok_or_else(|| Error::PemDecoding("unterminated certificate block".into()))?
                + END_CERTIFICATE.len();
            certificates.push(Self::from_pem(&block[..end])?);
            rest = &block[end..];
        }
        if certificates.is_empty() {
            return Err(Error::NoCertificate);
        }
        Ok(certificates)
    }

    /// The DER encoding
    pub fn der(&self) -> &[u8] {
        &self.0.der
    }

    /// The DER encoding of the `TBSCertificate`, as signed by the issuer
    pub fn tbs_der(&self) -> &[u8] {
        &self.0.tbs_der
    }

    /// The decoded certificate
    pub fn x509(&self) -> &x509_cert::Certificate {
        &self.0.certificate
    }

    /// The issuer's signature over [`Certificate::tbs_der()`]
    pub fn signature(&self) -> &[u8] {
        self.0.certificate.signature.raw_bytes()
    }

    /// Algorithm of [`Certificate::signature()`]
    pub fn signature_algorithm(&self) -> &AlgorithmIdentifierOwned {
        &self.0.certificate.signature_algorithm
    }

    /// The subject public key
    pub fn public_key(&self) -> &SubjectPublicKeyInfoOwned {
        &self.0.certificate.tbs_certificate.subject_public_key_info
    }

    /// The subject name
    pub fn subject(&self) -> &DistinguishedName {
        &self.0.subject
    }

    /// The issuer name
    pub fn issuer(&self) -> &DistinguishedName {
        &self.0.issuer
    }

    /// The serial number
    pub fn serial(&self) -> &SerialNumber {
        &self.0.certificate.tbs_certificate.serial_number
    }

    /// The serial number as upper case hex
    pub fn serial_hex(&self) -> String {
        hex::encode_upper(self.serial().as_bytes())
    }

    /// Start of the validity period
    pub fn not_before(&self) -> Duration {
        self.0
            .certificate
            .tbs_certificate
            .validity
            .not_before
            .to_unix_duration()
    }

    /// End of the validity period
    pub fn not_after(&self) -> Duration {
        self.0
            .certificate
            .tbs_certificate
            .validity
            .not_after
            .to_unix_duration()
    }

    /// `true` when `time` is within the validity period, bounds included
    pub fn is_valid_at(&self, time: Duration) -> bool {
        self.not_before() <= time && time <= self.not_after()
    }

    /// The CA flag of the basic constraints
    pub fn is_ca(&self) -> bool {
        self.0
            .extensions
            .basic_constraints
            .as_ref()
            .map_or(false, |constraints| constraints.ca)
    }

    /// The path length constraint of a CA certificate
    pub fn path_len(&self) -> Option<u8> {
        self.0
            .extensions
            .basic_constraints
            .as_ref()
            .and_then(|constraints| constraints.path_len_constraint)
    }

    /// The key usage, `None` when the extension is absent
    pub fn key_usage(&self) -> Option<KeyUsage> {
        self.0.extensions.key_usage
    }

    /// The extended key usages, `None` when the extension is absent
    pub fn extended_key_usage(&self) -> Option<&[ObjectIdentifier]> {
        self.0.extensions.extended_key_usage.as_deref()
    }

    /// `true` when the extended key usage lists `usage`
    pub fn has_extended_key_usage(&self, usage: ObjectIdentifier) -> bool {
        self.extended_key_usage()
            .map_or(false, |usages| usages.contains(&usage))
    }

    /// OCSP responder URLs from the authority information access
    pub fn ocsp_urls(&self) -> &[String] {
        &self.0.extensions.ocsp_urls
    }

    /// Full-name URIs of the CRL distribution points
    pub fn crl_urls(&self) -> &[String] {
        &self.0.extensions.crl_urls
    }

    /// Subject key identifier
    pub fn subject_key_id(&self) -> Option<&[u8]> {
        self.0.extensions.subject_key_id.as_deref()
    }

    /// Key identifier of the authority key identifier
    pub fn authority_key_id(&self) -> Option<&[u8]> {
        self.0.extensions.authority_key_id.as_deref()
    }

    /// `true` when subject and issuer are the same name
    pub fn is_self_issued(&self) -> bool {
        self.subject() == self.issuer()
    }

    /// SHA-256 of the DER encoding
    pub fn fingerprint(&self) -> &[u8; 32] {
        &self.0.fingerprint
    }

    /// [`Certificate::fingerprint()`] as upper case hex
    pub fn fingerprint_hex(&self) -> String {
        hex::encode_upper(self.fingerprint())
    }
}

impl Debug for Certificate {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject().to_string())
            .field("serial", &self.serial_hex())
            .finish()
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint() == other.fingerprint()
    }
}

impl Eq for Certificate {}

impl Hash for Certificate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint().hash(state);
    }
}

impl TryFrom<&str> for Certificate {
    type Error = Error;

    fn try_from(pem: &str) -> Result<Self> {
        Self::from_pem(pem)
    }
}
