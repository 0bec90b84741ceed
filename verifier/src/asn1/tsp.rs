// Copyright (c) 2023 The MobileCoin Foundation

//! Time-stamp protocol structures from
//! [RFC 3161](https://www.rfc-editor.org/rfc/rfc3161).

use super::cms::{ContentInfo, SignedData};
use super::GenTime;
use const_oid::ObjectIdentifier;
use der::asn1::{Any, BitString, OctetString, Uint};
use der::{Decode, Sequence, Tag};
use x509_cert::ext::Extension;
use x509_cert::spki::AlgorithmIdentifierOwned;

/// `MessageImprint`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct MessageImprint {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub hashed_message: OctetString,
}

/// `TimeStampReq`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct TimeStampReq {
    pub version: u8,
    pub message_imprint: MessageImprint,
    pub req_policy: Option<ObjectIdentifier>,
    pub nonce: Option<Uint>,
    #[asn1(default = "Default::default")]
    pub cert_req: bool,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub extensions: Option<Vec<Extension>>,
}

/// `TimeStampResp`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct TimeStampResp {
    pub status: PkiStatusInfo,
    pub time_stamp_token: Option<ContentInfo>,
}

/// `PKIStatusInfo`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct PkiStatusInfo {
    pub status: u32,
    pub status_string: Option<Vec<Any>>,
    pub fail_info: Option<BitString>,
}

impl PkiStatusInfo {
    /// `granted` or `grantedWithMods`
    pub fn is_granted(&self) -> bool {
        self.status <= 1
    }

    /// The free text status strings joined into one
    pub fn text(&self) -> String {
        self.status_string
            .iter()
            .flatten()
            .map(|s| String::from_utf8_lossy(s.value()).into_owned())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// `TSTInfo`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct TstInfo {
    pub version: u8,
    pub policy: ObjectIdentifier,
    pub message_imprint: MessageImprint,
    pub serial_number: Uint,
    pub gen_time: GenTime,
    pub accuracy: Option<Accuracy>,
    #[asn1(default = "Default::default")]
    pub ordering: bool,
    pub nonce: Option<Uint>,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub tsa: Option<Any>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub extensions: Option<Vec<Extension>>,
}

/// `Accuracy`
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
#[allow(missing_docs)]
pub struct Accuracy {
    pub seconds: Option<u32>,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub millis: Option<u16>,
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", optional = "true")]
    pub micros: Option<u16>,
}

/// A decoded `TimeStampToken`: CMS signed data whose content is a `TSTInfo`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TimestampToken {
    /// The CMS structure carrying the signature
    pub signed_data: SignedData,
    /// The signed timestamp info
    pub info: TstInfo,
    /// The raw encapsulated `TSTInfo`, the bytes the message digest covers
    pub info_der: Vec<u8>,
}

impl TimestampToken {
    /// Decode a DER `TimeStampToken`
    pub fn parse(der: &[u8]) -> der::Result<Self> {
        Self::from_content_info(&ContentInfo::from_der(der)?)
    }

    /// Decode the token carried in a `ContentInfo`
    pub fn from_content_info(content_info: &ContentInfo) -> der::Result<Self> {
        let signed_data = SignedData::from_content_info(content_info)?;
        let encap = &signed_data.encap_content_info;
        if encap.econtent_type != crate::oid::CT_TST_INFO {
            return Err(Tag::ObjectIdentifier.value_error());
        }
        let info_der = encap
            .econtent
            .as_ref()
            .ok_or_else(|| Tag::OctetString.value_error())?
            .as_bytes()
            .to_vec();
        let info = TstInfo::from_der(&info_der)?;
        Ok(Self {
            signed_data,
            info,
            info_der,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::oid;
    use core::time::Duration;
    use der::Encode;

    const TOKEN: &[u8] = include_bytes!("../../data/tests/ts_token.der");
    const RESPONSE: &[u8] = include_bytes!("../../data/tests/ts_response.der");

    #[test]
    fn decode_openssl_token() {
        let token = TimestampToken::parse(TOKEN).expect("Failed to decode token");
        let info = &token.info;
        assert_eq!(info.version, 1);
        assert_eq!(info.message_imprint.hash_algorithm.oid, oid::SHA256);
        assert_eq!(info.message_imprint.hashed_message.as_bytes().len(), 32);
        assert_eq!(
            info.gen_time.to_unix_duration(),
            Duration::new(1_792_334_895, 564_000_000)
        );
        let accuracy = info.accuracy.as_ref().expect("Missing accuracy");
        assert_eq!(accuracy.seconds, Some(1));
        assert_eq!(accuracy.millis, Some(500));
        assert_eq!(accuracy.micros, Some(100));
        assert_eq!(
            info.nonce.as_ref().map(|n| n.as_bytes().to_vec()),
            Some(vec![0x1B, 0x7D, 0x76, 0x3F, 0xBB, 0x13, 0x8A, 0xC9])
        );
        assert_eq!(token.signed_data.certificates_der().len(), 2);
    }

    #[test]
    fn decode_openssl_response() {
        let response = TimeStampResp::from_der(RESPONSE).expect("Failed to decode response");
        assert!(response.status.is_granted());
        let token = response.time_stamp_token.expect("Missing token");
        assert_eq!(token.to_der().expect("Failed to encode"), TOKEN);
    }

    #[test]
    fn request_with_nonce_and_cert_req() {
        let request = TimeStampReq {
            version: 1,
            message_imprint: MessageImprint {
                hash_algorithm: AlgorithmIdentifierOwned {
                    oid: oid::SHA256,
                    parameters: None,
                },
                hashed_message: OctetString::new([7u8; 32]).expect("octet string"),
            },
            req_policy: None,
            nonce: Some(Uint::new(&[0xFF, 0x01]).expect("nonce")),
            cert_req: true,
            extensions: None,
        };
        let der = request.to_der().expect("Failed to encode");
        assert_eq!(TimeStampReq::from_der(&der), Ok(request));
    }

    #[test]
    fn rejects_non_timestamp_content() {
        let signature = include_bytes!("../../data/tests/signed.p7s");
        assert!(TimestampToken::parse(signature).is_err());
    }
}
