// Copyright (c) 2023 The MobileCoin Foundation

//! Capabilities backed by the RustCrypto crates.

use super::{
    Asn1Object, DigestAlgorithm, Digester, ProviderError, SignatureAlgorithm, SignatureVerifier,
    StructureDecoder, StructureKind,
};
use crate::asn1::cms::{decode_any, ContentInfo, SignedData};
use crate::asn1::ocsp::OcspResponse;
use crate::asn1::tsp::TimestampToken;
use crate::oid;
use crate::x509::{self, Certificate};
use const_oid::ObjectIdentifier;
use der::Decode;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::Pkcs1v15Sign;
use sha2::Digest;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

/// [`SignatureVerifier`], [`Digester`] and [`StructureDecoder`] on top of
/// `p256`, `p384`, `rsa`, `sha1`, `sha2` and `der`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RustCrypto;

/// Public key used in signature verification
#[derive(Debug, PartialEq, Eq, Clone)]
enum PublicKey {
    /// NIST P-256 public key
    P256(p256::ecdsa::VerifyingKey),
    /// NIST P-384 public key
    P384(p384::ecdsa::VerifyingKey),
    /// RSA public key
    Rsa(rsa::RsaPublicKey),
}

impl PublicKey {
    /// Verify the `signature` over the `digest` of a message
    fn verify_digest(
        &self,
        algorithm: SignatureAlgorithm,
        digest: &[u8],
        signature: &[u8],
    ) -> Result<(), ProviderError> {
        match (self, algorithm) {
            (PublicKey::P256(key), SignatureAlgorithm::Ecdsa(_)) => {
                let signature = p256::ecdsa::Signature::from_der(signature)
                    .map_err(|_| ProviderError::SignatureDecoding)?;
                key.verify_prehash(digest, &signature)
                    .map_err(|_| ProviderError::SignatureVerification)
            }
            (PublicKey::P384(key), SignatureAlgorithm::Ecdsa(_)) => {
                let signature = p384::ecdsa::Signature::from_der(signature)
                    .map_err(|_| ProviderError::SignatureDecoding)?;
                key.verify_prehash(digest, &signature)
                    .map_err(|_| ProviderError::SignatureVerification)
            }
            (PublicKey::Rsa(key), SignatureAlgorithm::RsaPkcs1(hash)) => {
                let scheme = match hash {
                    DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
                    DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
                    DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
                    DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
                };
                key.verify(scheme, digest, signature)
                    .map_err(|_| ProviderError::SignatureVerification)
            }
            _ => Err(ProviderError::SignatureVerification),
        }
    }
}

/// Create a [`PublicKey`] from a [`SubjectPublicKeyInfoOwned`]
impl TryFrom<&SubjectPublicKeyInfoOwned> for PublicKey {
    type Error = ProviderError;

    fn try_from(value: &SubjectPublicKeyInfoOwned) -> Result<Self, Self::Error> {
        let bytes = value
            .subject_public_key
            .as_bytes()
            .ok_or(ProviderError::KeyDecoding)?;
        match value.algorithm.oid {
            oid::EC_PUBLIC_KEY => {
                let curve = value
                    .algorithm
                    .parameters
                    .as_ref()
                    .and_then(|params| decode_any::<ObjectIdentifier>(params).ok())
                    .ok_or(ProviderError::KeyDecoding)?;
                match curve {
                    oid::SECP256R1 => p256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                        .map(PublicKey::P256)
                        .map_err(|_| ProviderError::KeyDecoding),
                    oid::SECP384R1 => p384::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
                        .map(PublicKey::P384)
                        .map_err(|_| ProviderError::KeyDecoding),
                    other => Err(ProviderError::UnsupportedAlgorithm(oid::display(&other))),
                }
            }
            oid::RSA_ENCRYPTION => rsa::RsaPublicKey::from_pkcs1_der(bytes)
                .map(PublicKey::Rsa)
                .map_err(|_| ProviderError::KeyDecoding),
            other => Err(ProviderError::UnsupportedAlgorithm(oid::display(&other))),
        }
    }
}

impl SignatureVerifier for RustCrypto {
    fn verify(
        &self,
        key: &SubjectPublicKeyInfoOwned,
        algorithm: SignatureAlgorithm,
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), ProviderError> {
        let key = PublicKey::try_from(key)?;
        let digest = self.digest(algorithm.digest(), message);
        key.verify_digest(algorithm, &digest, signature)
    }
}

impl Digester for RustCrypto {
    fn digest(&self, algorithm: DigestAlgorithm, data: &[u8]) -> Vec<u8> {
        match algorithm {
            DigestAlgorithm::Sha1 => sha1::Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }
}

impl StructureDecoder for RustCrypto {
    fn decode(&self, kind: StructureKind, der: &[u8]) -> Result<Asn1Object, ProviderError> {
        let object = match kind {
            StructureKind::Certificate => {
                let certificate = Certificate::from_der(der).map_err(|e| match e {
                    x509::Error::CertificateDecoding(e) => ProviderError::Decoding(e),
                    _ => ProviderError::UnexpectedStructure("Certificate"),
                })?;
                Asn1Object::Certificate(certificate)
            }
            StructureKind::OcspResponse => {
                Asn1Object::OcspResponse(Box::new(OcspResponse::from_der(der)?))
            }
            StructureKind::TimestampToken => {
                Asn1Object::TimestampToken(Box::new(TimestampToken::parse(der)?))
            }
            StructureKind::SignedData => {
                let content_info = ContentInfo::from_der(der)?;
                Asn1Object::SignedData(Box::new(SignedData::from_content_info(&content_info)?))
            }
        };
        Ok(object)
    }
}
