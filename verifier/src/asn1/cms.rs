// Copyright (c) 2023 The MobileCoin Foundation

//! The subset of CMS [RFC 5652](https://www.rfc-editor.org/rfc/rfc5652)
//! used by signatures and timestamp tokens.

use super::RawSet;
use const_oid::ObjectIdentifier;
use der::asn1::{Any, OctetString};
use der::{Choice, Decode, DecodeOwned, Encode, Sequence, Tag, Tagged};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::AlgorithmIdentifierOwned;

/// `ContentInfo`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct ContentInfo {
    pub content_type: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT")]
    pub content: Any,
}

/// `SignedData`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct SignedData {
    pub version: u8,
    pub digest_algorithms: RawSet<AlgorithmIdentifierOwned>,
    pub encap_content_info: EncapsulatedContentInfo,
    #[asn1(
        context_specific = "0",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub certificates: Option<RawSet<Any>>,
    #[asn1(
        context_specific = "1",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub crls: Option<RawSet<Any>>,
    pub signer_infos: RawSet<SignerInfo>,
}

impl SignedData {
    /// Decode the `SignedData` carried by a `ContentInfo`
    pub fn from_content_info(content_info: &ContentInfo) -> der::Result<Self> {
        if content_info.content_type != crate::oid::SIGNED_DATA {
            return Err(Tag::ObjectIdentifier.value_error());
        }
        decode_any(&content_info.content)
    }

    /// DER of the embedded X.509 certificates.
    ///
    /// Attribute and other certificate formats are skipped.
    pub fn certificates_der(&self) -> Vec<Vec<u8>> {
        embedded_sequences(self.certificates.as_ref())
    }

    /// DER of the embedded CRLs.
    pub fn crls_der(&self) -> Vec<Vec<u8>> {
        embedded_sequences(self.crls.as_ref())
    }
}

fn embedded_sequences(set: Option<&RawSet<Any>>) -> Vec<Vec<u8>> {
    set.map(|set| set.0.as_slice())
        .unwrap_or_default()
        .iter()
        .filter(|any| any.tag() == Tag::Sequence)
        .filter_map(|any| any.to_der().ok())
        .collect()
}

/// `EncapsulatedContentInfo`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct EncapsulatedContentInfo {
    pub econtent_type: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub econtent: Option<OctetString>,
}

/// `SignerInfo`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct SignerInfo {
    pub version: u8,
    pub sid: SignerIdentifier,
    pub digest_algorithm: AlgorithmIdentifierOwned,
    #[asn1(
        context_specific = "0",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub signed_attrs: Option<RawSet<Attribute>>,
    pub signature_algorithm: AlgorithmIdentifierOwned,
    pub signature: OctetString,
    #[asn1(
        context_specific = "1",
        tag_mode = "IMPLICIT",
        constructed = "true",
        optional = "true"
    )]
    pub unsigned_attrs: Option<RawSet<Attribute>>,
}

impl SignerInfo {
    /// First value of the signed attribute `oid`
    pub fn signed_attribute(&self, oid: ObjectIdentifier) -> Option<&Any> {
        find_attribute(self.signed_attrs.as_ref(), oid)
    }

    /// First value of the unsigned attribute `oid`
    pub fn unsigned_attribute(&self, oid: ObjectIdentifier) -> Option<&Any> {
        find_attribute(self.unsigned_attrs.as_ref(), oid)
    }

    /// The bytes the signature covers when signed attributes are present: the
    /// attributes re-tagged as a universal `SET`.
    pub fn signed_attrs_der(&self) -> der::Result<Option<Vec<u8>>> {
        self.signed_attrs.as_ref().map(|attrs| attrs.to_der()).transpose()
    }
}

fn find_attribute(attrs: Option<&RawSet<Attribute>>, oid: ObjectIdentifier) -> Option<&Any> {
    attrs?
        .0
        .iter()
        .find(|attr| attr.oid == oid)
        .and_then(|attr| attr.values.0.first())
}

/// `SignerIdentifier`
#[derive(Clone, Debug, Eq, PartialEq, Choice)]
#[allow(missing_docs)]
pub enum SignerIdentifier {
    IssuerAndSerialNumber(IssuerAndSerialNumber),
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    SubjectKeyIdentifier(OctetString),
}

/// `IssuerAndSerialNumber`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct IssuerAndSerialNumber {
    pub issuer: Name,
    pub serial_number: SerialNumber,
}

/// `Attribute`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct Attribute {
    pub oid: ObjectIdentifier,
    pub values: RawSet<Any>,
}

/// `RevocationInfoArchival`, the signed attribute PDF signatures carry their
/// revocation evidence in
#[derive(Clone, Debug, Default, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct RevocationInfoArchival {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub crl: Option<Vec<Any>>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub ocsp: Option<Vec<Any>>,
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", optional = "true")]
    pub other: Option<Vec<Any>>,
}

/// Decode the structure held in an [`Any`]
pub fn decode_any<T: DecodeOwned>(any: &Any) -> der::Result<T> {
    T::from_der(&any.to_der()?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::oid;
    use assert_matches::assert_matches;
    use x509_cert::time::Time;

    const DETACHED_SIGNATURE: &[u8] = include_bytes!("../../data/tests/signed.p7s");

    fn signed_data() -> SignedData {
        let content_info = ContentInfo::from_der(DETACHED_SIGNATURE).expect("Failed to decode");
        SignedData::from_content_info(&content_info).expect("Failed to decode signed data")
    }

    #[test]
    fn decode_detached_signature() {
        let signed_data = signed_data();
        assert_eq!(signed_data.encap_content_info.econtent_type, oid::DATA);
        assert_eq!(signed_data.encap_content_info.econtent, None);
        assert_eq!(signed_data.certificates_der().len(), 2);
        assert!(signed_data.crls_der().is_empty());
        assert_eq!(signed_data.signer_infos.0.len(), 1);

        let signer = &signed_data.signer_infos.0[0];
        assert_matches!(signer.sid, SignerIdentifier::IssuerAndSerialNumber(_));
        assert_eq!(signer.signature_algorithm.oid, oid::ECDSA_WITH_SHA256);
    }

    #[test]
    fn signed_attributes() {
        let signed_data = signed_data();
        let signer = &signed_data.signer_infos.0[0];

        let digest = signer
            .signed_attribute(oid::MESSAGE_DIGEST)
            .expect("Missing message digest");
        let digest = decode_any::<OctetString>(digest).expect("Failed to decode digest");
        assert_eq!(digest.as_bytes().len(), 32);

        let signing_time = signer
            .signed_attribute(oid::SIGNING_TIME)
            .expect("Missing signing time");
        let signing_time = decode_any::<Time>(signing_time).expect("Failed to decode time");
        assert_eq!(signing_time.to_unix_duration().as_secs(), 1_792_334_906);

        assert!(signer.unsigned_attribute(oid::SIGNATURE_TIMESTAMP_TOKEN).is_none());
    }

    #[test]
    fn signed_attributes_reencode_as_set() {
        let signed_data = signed_data();
        let signer = &signed_data.signer_infos.0[0];
        let der = signer
            .signed_attrs_der()
            .expect("Failed to encode")
            .expect("Missing signed attributes");
        assert_eq!(der[0], 0x31);

        // The same bytes appear in the message with the [0] implicit tag
        let body = &der[1..];
        let position = DETACHED_SIGNATURE
            .windows(body.len())
            .position(|window| window == body)
            .expect("Signed attributes should be present verbatim");
        assert_eq!(DETACHED_SIGNATURE[position - 1], 0xA0);
    }

    #[test]
    fn wrong_content_type_is_rejected() {
        let mut content_info = ContentInfo::from_der(DETACHED_SIGNATURE).expect("Failed to decode");
        content_info.content_type = oid::DATA;
        assert!(SignedData::from_content_info(&content_info).is_err());
    }
}
