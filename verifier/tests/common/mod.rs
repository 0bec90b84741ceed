// Copyright (c) 2023 The MobileCoin Foundation

//! A synthetic PKI built in memory and a transport answering from a script.
//!
//! Not every test binary uses every helper.
#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use const_oid::ObjectIdentifier;
use der::asn1::{Any, BitString, Ia5String, Null, OctetString, UtcTime};
use der::Encode;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sigtrust_verifier::asn1::ocsp::{
    BasicOcspResponse, CertStatus, OcspResponse, OcspResponseStatus, ResponderId, ResponseBytes,
    ResponseData, RevokedInfo, SingleResponse,
};
use sigtrust_verifier::asn1::{CrlReason, GenTime};
use sigtrust_verifier::oid;
use sigtrust_verifier::revocation::ocsp::cert_id;
use sigtrust_verifier::time::Deadline;
use sigtrust_verifier::transport::TransportError;
use sigtrust_verifier::{
    Certificate, DigestAlgorithm, EmbeddedEvidence, Provider, SignedContent, Transport,
};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use x509_cert::crl::{CertificateList, RevokedCert, TbsCertList};
use x509_cert::ext::pkix::crl::dp::DistributionPoint;
use x509_cert::ext::pkix::name::{DistributionPointName, GeneralName};
use x509_cert::ext::pkix::{
    AccessDescription, AuthorityInfoAccessSyntax, AuthorityKeyIdentifier, BasicConstraints,
    CrlDistributionPoints, ExtendedKeyUsage, SubjectKeyIdentifier,
};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};
use x509_cert::{TbsCertificate, Version};

/// 2023-11-14T22:13:20Z
pub const NOT_BEFORE: u64 = 1_700_000_000;
/// 2033-05-18T03:33:20Z
pub const NOT_AFTER: u64 = 2_000_000_000;
/// 2027-01-15T08:00:00Z, the claimed signing time of synthetic documents
pub const SIGNING_TIME: u64 = 1_800_000_000;
/// One day after [`SIGNING_TIME`]
pub const VALIDATION_TIME: u64 = SIGNING_TIME + 86_400;

pub const DOCUMENT: &[u8] = b"%PDF-1.7 synthetic document body";

/// A certificate and the key it certifies
#[derive(Clone, Debug)]
pub struct Identity {
    pub certificate: Certificate,
    pub key: SigningKey,
    pub subject: String,
}

/// What goes into a certificate
#[derive(Clone, Debug)]
pub struct Profile {
    pub subject: String,
    pub serial: u32,
    pub ca: bool,
    pub not_before: u64,
    pub not_after: u64,
    pub ocsp_url: Option<String>,
    pub crl_url: Option<String>,
    pub extended_key_usage: Option<ObjectIdentifier>,
}

impl Profile {
    pub fn ca(subject: &str, serial: u32) -> Self {
        Self {
            subject: subject.into(),
            serial,
            ca: true,
            not_before: NOT_BEFORE,
            not_after: NOT_AFTER,
            ocsp_url: None,
            crl_url: None,
            extended_key_usage: None,
        }
    }

    pub fn leaf(subject: &str, serial: u32) -> Self {
        Self {
            ca: false,
            ..Self::ca(subject, serial)
        }
    }

    pub fn ocsp(mut self, url: &str) -> Self {
        self.ocsp_url = Some(url.into());
        self
    }

    pub fn crl(mut self, url: &str) -> Self {
        self.crl_url = Some(url.into());
        self
    }

    pub fn not_before(mut self, not_before: u64) -> Self {
        self.not_before = not_before;
        self
    }

    pub fn extended_key_usage(mut self, usage: ObjectIdentifier) -> Self {
        self.extended_key_usage = Some(usage);
        self
    }
}

/// Issues keys and certificates from a seeded generator, so every run
/// produces the same PKI
#[derive(Debug)]
pub struct Pki {
    rng: StdRng,
}

impl Pki {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn key(&mut self) -> SigningKey {
        SigningKey::random(&mut self.rng)
    }

    /// A self signed CA
    pub fn root(&mut self, subject: &str, serial: u32) -> Identity {
        let key = self.key();
        let certificate = certificate(&Profile::ca(subject, serial), &key, subject, &key);
        Identity {
            certificate,
            key,
            subject: subject.into(),
        }
    }

    /// A certificate for a fresh key, signed by `issuer`
    pub fn issue(&mut self, profile: Profile, issuer: &Identity) -> Identity {
        let key = self.key();
        issue_with_key(profile, key, issuer)
    }
}

/// A certificate for `key`, signed by `issuer`
pub fn issue_with_key(profile: Profile, key: SigningKey, issuer: &Identity) -> Identity {
    let certificate = certificate(&profile, &key, &issuer.subject, &issuer.key);
    Identity {
        certificate,
        key,
        subject: profile.subject,
    }
}

/// A certificate for `subject_key` named `issuer` and signed with
/// `issuer_key`
pub fn certificate(
    profile: &Profile,
    subject_key: &SigningKey,
    issuer: &str,
    issuer_key: &SigningKey,
) -> Certificate {
    let mut extensions = vec![
        extension(
            oid::SUBJECT_KEY_IDENTIFIER,
            false,
            &SubjectKeyIdentifier(octets(key_id(subject_key))),
        ),
        extension(
            oid::AUTHORITY_KEY_IDENTIFIER,
            false,
            &AuthorityKeyIdentifier {
                key_identifier: Some(octets(key_id(issuer_key))),
                authority_cert_issuer: None,
                authority_cert_serial_number: None,
            },
        ),
    ];
    if profile.ca {
        extensions.push(extension(
            oid::BASIC_CONSTRAINTS,
            true,
            &BasicConstraints {
                ca: true,
                path_len_constraint: None,
            },
        ));
        // keyCertSign and cRLSign
        extensions.push(key_usage(0x06, 1));
    } else {
        // digitalSignature and nonRepudiation
        extensions.push(key_usage(0xC0, 6));
    }
    if let Some(usage) = profile.extended_key_usage {
        extensions.push(extension(
            oid::EXTENDED_KEY_USAGE,
            true,
            &ExtendedKeyUsage(vec![usage]),
        ));
    }
    if let Some(url) = &profile.ocsp_url {
        extensions.push(extension(
            oid::AUTHORITY_INFO_ACCESS,
            false,
            &AuthorityInfoAccessSyntax(vec![AccessDescription {
                access_method: oid::AD_OCSP,
                access_location: uri(url),
            }]),
        ));
    }
    if let Some(url) = &profile.crl_url {
        extensions.push(extension(
            oid::CRL_DISTRIBUTION_POINTS,
            false,
            &CrlDistributionPoints(vec![DistributionPoint {
                distribution_point: Some(DistributionPointName::FullName(vec![uri(url)])),
                reasons: None,
                crl_issuer: None,
            }]),
        ));
    }

    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: SerialNumber::from(profile.serial),
        signature: ecdsa_with_sha256(),
        issuer: name(issuer),
        validity: Validity {
            not_before: time(profile.not_before),
            not_after: time(profile.not_after),
        },
        subject: name(&profile.subject),
        subject_public_key_info: public_key_info(subject_key),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(extensions),
    };
    let signature = sign(issuer_key, &encode(&tbs_certificate));
    let certificate = x509_cert::Certificate {
        tbs_certificate,
        signature_algorithm: ecdsa_with_sha256(),
        signature,
    };
    Certificate::from_der(&encode(&certificate)).expect("Failed decoding synthetic certificate")
}

/// A CRL issued by `issuer` listing `revoked` as (certificate, reason,
/// revocation time)
pub fn crl(issuer: &Identity, revoked: &[(&Certificate, CrlReason, u64)], this_update: u64) -> Vec<u8> {
    let entries = revoked
        .iter()
        .map(|(certificate, reason, at)| RevokedCert {
            serial_number: certificate.serial().clone(),
            revocation_date: time(*at),
            crl_entry_extensions: Some(vec![extension(oid::CRL_REASON, false, reason)]),
        })
        .collect::<Vec<_>>();
    let tbs_cert_list = TbsCertList {
        version: Version::V2,
        signature: ecdsa_with_sha256(),
        issuer: name(&issuer.subject),
        this_update: time(this_update),
        next_update: Some(time(this_update + 7 * 86_400)),
        revoked_certificates: (!entries.is_empty()).then_some(entries),
        crl_extensions: None,
    };
    let signature = sign(&issuer.key, &encode(&tbs_cert_list));
    encode(&CertificateList {
        tbs_cert_list,
        signature_algorithm: ecdsa_with_sha256(),
        signature,
    })
}

pub fn good() -> CertStatus {
    CertStatus::Good(Null)
}

pub fn revoked(reason: CrlReason, at: u64) -> CertStatus {
    CertStatus::Revoked(RevokedInfo {
        revocation_time: gen_time(at),
        revocation_reason: Some(reason),
    })
}

/// An OCSP response for `certificate` signed by its `issuer`, valid for a
/// week from `this_update`
pub fn ocsp_response(
    issuer: &Identity,
    certificate: &Certificate,
    status: CertStatus,
    this_update: u64,
) -> Vec<u8> {
    let cert_id = cert_id(
        &Provider::default(),
        DigestAlgorithm::Sha1,
        certificate,
        &issuer.certificate,
    )
    .expect("Failed building CertID");
    let data = ResponseData {
        version: None,
        responder_id: ResponderId::ByName(name(&issuer.subject)),
        produced_at: gen_time(this_update),
        responses: vec![SingleResponse {
            cert_id,
            cert_status: status,
            this_update: gen_time(this_update),
            next_update: Some(gen_time(this_update + 7 * 86_400)),
            single_extensions: None,
        }],
        response_extensions: None,
    };
    let tbs_response_data = Any::encode_from(&data).expect("Failed encoding response data");
    let signature = sign(&issuer.key, &encode(&tbs_response_data));
    let basic = BasicOcspResponse {
        tbs_response_data,
        signature_algorithm: ecdsa_with_sha256(),
        signature,
        certs: None,
    };
    encode(&OcspResponse {
        response_status: OcspResponseStatus::Successful,
        response_bytes: Some(ResponseBytes {
            response_type: oid::OCSP_BASIC,
            response: octets(encode(&basic)),
        }),
    })
}

/// `DOCUMENT` signed by `signer`, shipped with `pool`
pub fn signed_content(signer: &Identity, pool: &[&Identity]) -> SignedContent {
    let signature: Signature = signer.key.sign(DOCUMENT);
    SignedContent {
        signed_bytes: DOCUMENT.to_vec(),
        signature: signature.to_der().as_bytes().to_vec(),
        signature_algorithm: ecdsa_with_sha256(),
        digest_algorithm: DigestAlgorithm::Sha256,
        signed_attributes: None,
        signing_certificate: signer.certificate.clone(),
        certificates: pool
            .iter()
            .map(|identity| identity.certificate.clone())
            .collect(),
        timestamp_token: None,
        claimed_signing_time: Some(Duration::from_secs(SIGNING_TIME)),
        embedded: EmbeddedEvidence::default(),
    }
}

/// A master trust list pointing at `pointers` (URL, territory)
pub fn master_list(pointers: &[(&str, &str)]) -> String {
    let pointers = pointers
        .iter()
        .map(|(url, territory)| {
            format!(
                r#"<OtherTSLPointer>
                    <TSLLocation>{url}</TSLLocation>
                    <AdditionalInformation>
                        <OtherInformation><SchemeTerritory>{territory}</SchemeTerritory></OtherInformation>
                        <OtherInformation><MimeType>application/vnd.etsi.tsl+xml</MimeType></OtherInformation>
                    </AdditionalInformation>
                </OtherTSLPointer>"#
            )
        })
        .collect::<String>();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
        <TrustServiceStatusList xmlns="http://uri.etsi.org/02231/v2#">
            <SchemeInformation>
                <SchemeTerritory>EU</SchemeTerritory>
                <PointersToOtherTSL>{pointers}</PointersToOtherTSL>
            </SchemeInformation>
        </TrustServiceStatusList>"#
    )
}

/// A territory trust list with one granted qualified CA service per
/// certificate
pub fn territory_list(territory: &str, certificates: &[&Certificate]) -> String {
    let services = certificates
        .iter()
        .map(|certificate| {
            format!(
                r#"<TSPService>
                    <ServiceInformation>
                        <ServiceTypeIdentifier>http://uri.etsi.org/TrstSvc/Svctype/CA/QC</ServiceTypeIdentifier>
                        <ServiceDigitalIdentity>
                            <DigitalId><X509Certificate>{}</X509Certificate></DigitalId>
                        </ServiceDigitalIdentity>
                        <ServiceStatus>http://uri.etsi.org/TrstSvc/TrustedList/Svcstatus/granted</ServiceStatus>
                    </ServiceInformation>
                </TSPService>"#,
                STANDARD.encode(certificate.der())
            )
        })
        .collect::<String>();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
        <TrustServiceStatusList xmlns="http://uri.etsi.org/02231/v2#">
            <SchemeInformation><SchemeTerritory>{territory}</SchemeTerritory></SchemeInformation>
            <TrustServiceProviderList>
                <TrustServiceProvider><TSPServices>{services}</TSPServices></TrustServiceProvider>
            </TrustServiceProviderList>
        </TrustServiceStatusList>"#
    )
}

/// A scripted answer
#[derive(Clone, Debug)]
pub enum Reply {
    Body(Vec<u8>),
    Status(u16),
    Timeout,
}

/// Answers requests from a script of replies per URL.
///
/// Replies are consumed in order, the last one repeats. Unknown URLs answer
/// 404.
#[derive(Debug, Default)]
pub struct FakeTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport taking `delay` to answer each request
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn reply(&self, url: &str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .expect("Poisoned lock")
            .entry(url.into())
            .or_default()
            .push_back(reply);
        self
    }

    /// The number of requests made to `url`
    pub fn calls(&self, url: &str) -> usize {
        self.calls
            .lock()
            .expect("Poisoned lock")
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// The number of requests made to any URL
    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("Poisoned lock").values().sum()
    }

    fn answer(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        *self
            .calls
            .lock()
            .expect("Poisoned lock")
            .entry(url.into())
            .or_default() += 1;
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let reply = {
            let mut replies = self.replies.lock().expect("Poisoned lock");
            match replies.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Status(status)) => Err(TransportError::Status {
                url: url.into(),
                status,
            }),
            Some(Reply::Timeout) => Err(TransportError::Timeout(url.into())),
            None => Err(TransportError::Status {
                url: url.into(),
                status: 404,
            }),
        }
    }
}

impl Transport for FakeTransport {
    fn get(&self, url: &str, _: &Deadline) -> Result<Vec<u8>, TransportError> {
        self.answer(url)
    }

    fn post(
        &self,
        url: &str,
        _: &'static str,
        _: &'static str,
        _: &[u8],
        _: &Deadline,
    ) -> Result<Vec<u8>, TransportError> {
        self.answer(url)
    }
}

fn extension<T: Encode>(extn_id: ObjectIdentifier, critical: bool, value: &T) -> Extension {
    Extension {
        extn_id,
        critical,
        extn_value: octets(encode(value)),
    }
}

fn key_usage(bits: u8, unused_bits: u8) -> Extension {
    let usage = BitString::new(unused_bits, vec![bits]).expect("Invalid key usage bits");
    extension(oid::KEY_USAGE, true, &usage)
}

fn key_id(key: &SigningKey) -> Vec<u8> {
    let point = key.verifying_key().to_encoded_point(false);
    Provider::default().digest(DigestAlgorithm::Sha1, point.as_bytes())
}

fn public_key_info(key: &SigningKey) -> SubjectPublicKeyInfoOwned {
    let point = key.verifying_key().to_encoded_point(false);
    SubjectPublicKeyInfoOwned {
        algorithm: AlgorithmIdentifierOwned {
            oid: oid::EC_PUBLIC_KEY,
            parameters: Some(Any::encode_from(&oid::SECP256R1).expect("Failed encoding curve")),
        },
        subject_public_key: BitString::from_bytes(point.as_bytes()).expect("Invalid key bits"),
    }
}

fn ecdsa_with_sha256() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: oid::ECDSA_WITH_SHA256,
        parameters: None,
    }
}

fn sign(key: &SigningKey, message: &[u8]) -> BitString {
    let signature: Signature = key.sign(message);
    BitString::from_bytes(signature.to_der().as_bytes()).expect("Invalid signature bits")
}

fn uri(url: &str) -> GeneralName {
    GeneralName::UniformResourceIdentifier(Ia5String::new(url).expect("Invalid URI"))
}

fn name(dn: &str) -> Name {
    Name::from_str(dn).expect("Invalid distinguished name")
}

fn time(secs: u64) -> Time {
    Time::UtcTime(UtcTime::from_unix_duration(Duration::from_secs(secs)).expect("Invalid time"))
}

fn gen_time(secs: u64) -> GenTime {
    GenTime::from_unix_duration(Duration::from_secs(secs)).expect("Invalid time")
}

fn octets(bytes: Vec<u8>) -> OctetString {
    OctetString::new(bytes).expect("Invalid octets")
}

fn encode<T: Encode>(value: &T) -> Vec<u8> {
    value.to_der().expect("Failed encoding")
}

