// Copyright (c) 2023 The MobileCoin Foundation

//! Pluggable cryptographic capabilities.
//!
//! The engine never calls a crypto library directly. It goes through a
//! [`Provider`], a composition of small capability traits chosen at startup.
//! [`Provider::rust_crypto()`] is the default composition.

mod rust_crypto;

pub use rust_crypto::RustCrypto;

use crate::asn1::cms::SignedData;
use crate::asn1::ocsp::OcspResponse;
use crate::asn1::tsp::TimestampToken;
use crate::oid;
use crate::x509::Certificate;
use const_oid::ObjectIdentifier;
use core::fmt::Debug;
use std::sync::Arc;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};

/// Error from a provider capability
#[derive(Debug, displaydoc::Display, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Unsupported algorithm {0}
    UnsupportedAlgorithm(String),
    /// An error occurred decoding the public key
    KeyDecoding,
    /// An error occurred decoding the signature
    SignatureDecoding,
    /// The signature does not match the message and key
    SignatureVerification,
    /// An error occurred decoding the structure: {0}
    Decoding(der::Error),
    /// Expected a {0} structure
    UnexpectedStructure(&'static str),
}

impl std::error::Error for ProviderError {}

impl From<der::Error> for ProviderError {
    fn from(e: der::Error) -> Self {
        ProviderError::Decoding(e)
    }
}

/// Digest algorithms the engine may be asked to compute
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// The algorithm's object identifier
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha1 => oid::SHA1,
            DigestAlgorithm::Sha256 => oid::SHA256,
            DigestAlgorithm::Sha384 => oid::SHA384,
            DigestAlgorithm::Sha512 => oid::SHA512,
        }
    }

    /// The algorithm named by `oid`, if supported
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [
            DigestAlgorithm::Sha1,
            DigestAlgorithm::Sha256,
            DigestAlgorithm::Sha384,
            DigestAlgorithm::Sha512,
        ]
        .into_iter()
        .find(|alg| alg.oid() == *oid)
    }

    /// The algorithm named by an algorithm identifier
    pub fn from_identifier(identifier: &AlgorithmIdentifierOwned) -> Result<Self, ProviderError> {
        Self::from_oid(&identifier.oid)
            .ok_or_else(|| ProviderError::UnsupportedAlgorithm(oid::display(&identifier.oid)))
    }

    /// An algorithm identifier with absent parameters
    pub fn identifier(&self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: self.oid(),
            parameters: None,
        }
    }
}

/// A resolved signature scheme
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// ECDSA over the curve named in the key, with the given digest
    Ecdsa(DigestAlgorithm),
    /// RSA PKCS#1 v1.5 with the given digest
    RsaPkcs1(DigestAlgorithm),
}

impl SignatureAlgorithm {
    /// Resolve a signature algorithm identifier.
    ///
    /// `digest` is the separately declared digest (CMS `digestAlgorithm`),
    /// needed when the identifier only names the key type, such as
    /// `rsaEncryption`.
    pub fn from_identifier(
        identifier: &AlgorithmIdentifierOwned,
        digest: Option<DigestAlgorithm>,
    ) -> Result<Self, ProviderError> {
        let unsupported = || ProviderError::UnsupportedAlgorithm(oid::display(&identifier.oid));
        let algorithm = match identifier.oid {
            oid::ECDSA_WITH_SHA256 => SignatureAlgorithm::Ecdsa(DigestAlgorithm::Sha256),
            oid::ECDSA_WITH_SHA384 => SignatureAlgorithm::Ecdsa(DigestAlgorithm::Sha384),
            oid::ECDSA_WITH_SHA512 => SignatureAlgorithm::Ecdsa(DigestAlgorithm::Sha512),
            oid::SHA1_WITH_RSA => SignatureAlgorithm::RsaPkcs1(DigestAlgorithm::Sha1),
            oid::SHA256_WITH_RSA => SignatureAlgorithm::RsaPkcs1(DigestAlgorithm::Sha256),
            oid::SHA384_WITH_RSA => SignatureAlgorithm::RsaPkcs1(DigestAlgorithm::Sha384),
            oid::SHA512_WITH_RSA => SignatureAlgorithm::RsaPkcs1(DigestAlgorithm::Sha512),
            oid::RSA_ENCRYPTION => SignatureAlgorithm::RsaPkcs1(digest.ok_or_else(unsupported)?),
            oid::EC_PUBLIC_KEY => SignatureAlgorithm::Ecdsa(digest.ok_or_else(unsupported)?),
            _ => return Err(unsupported()),
        };
        Ok(algorithm)
    }

    /// The digest the scheme signs
    pub fn digest(&self) -> DigestAlgorithm {
        match self {
            SignatureAlgorithm::Ecdsa(digest) | SignatureAlgorithm::RsaPkcs1(digest) => *digest,
        }
    }
}

/// Verifies signatures
pub trait SignatureVerifier: Debug + Send + Sync {
    /// Verify `signature` over `message` with the public `key`
    fn verify(
        &self,
        key: &SubjectPublicKeyInfoOwned,
        algorithm: SignatureAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), ProviderError>;
}

/// Computes digests
pub trait Digester: Debug + Send + Sync {
    /// Digest `data` with `algorithm`
    fn digest(&self, algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8>;
}

/// The ASN.1 structures the engine consumes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StructureKind {
    /// An X.509 certificate
    Certificate,
    /// An `OCSPResponse`
    OcspResponse,
    /// A `TimeStampToken`
    TimestampToken,
    /// A CMS `ContentInfo` holding `SignedData`
    SignedData,
}

/// A decoded ASN.1 structure.
///
/// The set is closed: these are the only structures the engine reads.
#[derive(Clone, Debug)]
pub enum Asn1Object {
    /// An X.509 certificate
    Certificate(Certificate),
    /// An `OCSPResponse`
    OcspResponse(Box<OcspResponse>),
    /// A `TimeStampToken`
    TimestampToken(Box<TimestampToken>),
    /// CMS `SignedData`
    SignedData(Box<SignedData>),
}

/// Decodes DER into the structures the engine consumes
pub trait StructureDecoder: Debug + Send + Sync {
    /// Decode `der` as a `kind` structure
    fn decode(&self, kind: StructureKind, der: &[u8]) -> Result<Asn1Object, ProviderError>;
}

/// A composition of cryptographic capabilities
#[derive(Clone, Debug)]
pub struct Provider {
    signatures: Arc<dyn SignatureVerifier>,
    digests: Arc<dyn Digester>,
    decoder: Arc<dyn StructureDecoder>,
}

impl Default for Provider {
    fn default() -> Self {
        Self::rust_crypto()
    }
}

impl Provider {
    /// Compose a provider from its capabilities
    pub fn new(
        signatures: Arc<dyn SignatureVerifier>,
        digests: Arc<dyn Digester>,
        decoder: Arc<dyn StructureDecoder>,
    ) -> Self {
        Self {
            signatures,
            digests,
            decoder,
        }
    }

    /// All capabilities backed by the RustCrypto crates
    pub fn rust_crypto() -> Self {
        let backend = Arc::new(RustCrypto);
        Self::new(backend.clone(), backend.clone(), backend)
    }

    /// See [`SignatureVerifier::verify`]
    pub fn verify(
        &self,
        key: &SubjectPublicKeyInfoOwned,
        algorithm: SignatureAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), ProviderError> {
        self.signatures.verify(key, algorithm, message, signature)
    }

    /// Verify that `subject` is signed by the key of `issuer`
    pub fn verify_issued_by(
        &self,
        subject: &Certificate,
        issuer: &Certificate,
    ) -> Result<(), ProviderError> {
        let algorithm = SignatureAlgorithm::from_identifier(subject.signature_algorithm(), None)?;
        self.verify(
            issuer.public_key(),
            algorithm,
            subject.tbs_der(),
            subject.signature(),
        )
    }

    /// See [`Digester::digest`]
    pub fn digest(&self, algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
        self.digests.digest(algorithm, data)
    }

    /// See [`StructureDecoder::decode`]
    pub fn decode(&self, kind: StructureKind, der: &[u8]) -> Result<Asn1Object, ProviderError> {
        self.decoder.decode(kind, der)
    }

    /// Decode a certificate
    pub fn decode_certificate(&self, der: &[u8]) -> Result<Certificate, ProviderError> {
        match self.decode(StructureKind::Certificate, der)? {
            Asn1Object::Certificate(certificate) => Ok(certificate),
            _ => Err(ProviderError::UnexpectedStructure("Certificate")),
        }
    }

    /// Decode an OCSP response
    pub fn decode_ocsp_response(&self, der: &[u8]) -> Result<OcspResponse, ProviderError> {
        match self.decode(StructureKind::OcspResponse, der)? {
            Asn1Object::OcspResponse(response) => Ok(*response),
            _ => Err(ProviderError::UnexpectedStructure("OCSPResponse")),
        }
    }

    /// Decode a timestamp token
    pub fn decode_timestamp_token(&self, der: &[u8]) -> Result<TimestampToken, ProviderError> {
        match self.decode(StructureKind::TimestampToken, der)? {
            Asn1Object::TimestampToken(token) => Ok(*token),
            _ => Err(ProviderError::UnexpectedStructure("TimeStampToken")),
        }
    }

    /// Decode CMS signed data
    pub fn decode_signed_data(&self, der: &[u8]) -> Result<SignedData, ProviderError> {
        match self.decode(StructureKind::SignedData, der)? {
            Asn1Object::SignedData(signed_data) => Ok(*signed_data),
            _ => Err(ProviderError::UnexpectedStructure("SignedData")),
        }
    }
}
