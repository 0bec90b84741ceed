// Copyright (c) 2023 The MobileCoin Foundation

//! CMS signer checks shared by document signatures and timestamp tokens

use crate::asn1::cms::{decode_any, Attribute, SignerIdentifier};
use crate::asn1::RawSet;
use crate::oid;
use crate::provider::{DigestAlgorithm, Provider, ProviderError, SignatureAlgorithm};
use crate::x509::{Certificate, DistinguishedName};
use const_oid::ObjectIdentifier;
use der::asn1::OctetString;
use der::Decode;
use subtle::ConstantTimeEq;
use x509_cert::spki::AlgorithmIdentifierOwned;

/// Error checking a CMS signer
#[derive(displaydoc::Display, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// The signer certificate is not among the embedded certificates
    SignerNotFound,
    /// The signed attribute {0} is missing
    MissingAttribute(&'static str),
    /// The signed content type {0} is not the expected {1}
    ContentTypeMismatch(String, String),
    /// The message digest does not match the signed content
    DigestMismatch,
    /// The signed attributes are malformed: {0}
    Malformed(der::Error),
    /// The signature does not verify: {0}
    Signature(ProviderError),
}

impl std::error::Error for SignerError {}

impl From<der::Error> for SignerError {
    fn from(e: der::Error) -> Self {
        SignerError::Malformed(e)
    }
}

impl From<ProviderError> for SignerError {
    fn from(e: ProviderError) -> Self {
        SignerError::Signature(e)
    }
}

/// The certificate in `pool` that `sid` names
pub fn find_certificate<'a>(
    sid: &SignerIdentifier,
    pool: &'a [Certificate],
) -> Result<&'a Certificate, SignerError> {
    pool.iter()
        .find(|candidate| match sid {
            SignerIdentifier::IssuerAndSerialNumber(id) => {
                candidate.serial() == &id.serial_number
                    && candidate.issuer() == &DistinguishedName::from(&id.issuer)
            }
            SignerIdentifier::SubjectKeyIdentifier(ski) => {
                candidate.subject_key_id() == Some(ski.as_bytes())
            }
        })
        .ok_or(SignerError::SignerNotFound)
}

/// Verify `signature` over `message` with the key of `certificate`.
///
/// `digest` resolves algorithm identifiers that only name the key type.
pub fn verify_signature(
    provider: &Provider,
    certificate: &Certificate,
    algorithm: &AlgorithmIdentifierOwned,
    digest: DigestAlgorithm,
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignerError> {
    let algorithm = SignatureAlgorithm::from_identifier(algorithm, Some(digest))?;
    provider.verify(certificate.public_key(), algorithm, message, signature)?;
    Ok(())
}

/// Check the signed attributes (DER `SET OF Attribute`) against the content.
///
/// The `contentType` attribute, when `content_type` is given, must name it.
/// The `messageDigest` attribute must be the `digest` of `content`.
pub fn check_signed_attributes(
    provider: &Provider,
    signed_attrs: &[u8],
    content_type: Option<ObjectIdentifier>,
    digest: DigestAlgorithm,
    content: &[u8],
) -> Result<(), SignerError> {
    let attributes = RawSet::<Attribute>::from_der(signed_attrs)?;

    if let Some(expected) = content_type {
        let value = attribute(&attributes, oid::CONTENT_TYPE)
            .ok_or(SignerError::MissingAttribute("contentType"))?;
        let actual = decode_any::<ObjectIdentifier>(value)?;
        if actual != expected {
            return Err(SignerError::ContentTypeMismatch(
                oid::display(&actual),
                oid::display(&expected),
            ));
        }
    }

    let value = attribute(&attributes, oid::MESSAGE_DIGEST)
        .ok_or(SignerError::MissingAttribute("messageDigest"))?;
    let signed_digest = decode_any::<OctetString>(value)?;
    let actual = provider.digest(digest, content);
    if bool::from(signed_digest.as_bytes().ct_eq(&actual)) {
        Ok(())
    } else {
        Err(SignerError::DigestMismatch)
    }
}

fn attribute(attributes: &RawSet<Attribute>, oid: ObjectIdentifier) -> Option<&der::asn1::Any> {
    attributes
        .0
        .iter()
        .find(|attribute| attribute.oid == oid)
        .and_then(|attribute| attribute.values.0.first())
}
