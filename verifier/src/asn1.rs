// Copyright (c) 2023 The MobileCoin Foundation

//! ASN.1 structures consumed by the engine.
//!
//! Only the handful of OCSP, timestamp and CMS structures the engine reads are
//! defined. Fields whose exact encoding is signed over are kept as raw
//! [`Any`] values so the signed bytes are the received bytes.

pub mod cms;
pub mod ocsp;
pub mod tsp;

use core::time::Duration;
use der::asn1::{Any, BitString};
use der::{
    DateTime, DecodeOwned, DecodeValue, Encode, EncodeValue, Enumerated, FixedTag, Header, Length,
    Reader, Sequence, SliceReader, Tag, Writer,
};
use serde::Serialize;
use x509_cert::spki::AlgorithmIdentifierOwned;

/// A signed structure: `SEQUENCE { tbs, signatureAlgorithm, signature }`.
///
/// Certificates and CRLs share this outer shape.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct SignedEnvelope {
    /// The to-be-signed portion, exactly as encoded
    pub tbs: Any,
    /// Algorithm used to sign `tbs`
    pub algorithm: AlgorithmIdentifierOwned,
    /// The signature
    pub signature: BitString,
}

/// `CRLReason` from RFC 5280, shared by CRL entries and OCSP responses.
#[derive(Clone, Copy, Debug, Enumerated, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
#[repr(u32)]
#[allow(missing_docs)]
pub enum CrlReason {
    Unspecified = 0,
    KeyCompromise = 1,
    CaCompromise = 2,
    AffiliationChanged = 3,
    Superseded = 4,
    CessationOfOperation = 5,
    CertificateHold = 6,
    RemoveFromCrl = 8,
    PrivilegeWithdrawn = 9,
    AaCompromise = 10,
}

impl core::fmt::Display for CrlReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            CrlReason::Unspecified => "unspecified",
            CrlReason::KeyCompromise => "keyCompromise",
            CrlReason::CaCompromise => "cACompromise",
            CrlReason::AffiliationChanged => "affiliationChanged",
            CrlReason::Superseded => "superseded",
            CrlReason::CessationOfOperation => "cessationOfOperation",
            CrlReason::CertificateHold => "certificateHold",
            CrlReason::RemoveFromCrl => "removeFromCRL",
            CrlReason::PrivilegeWithdrawn => "privilegeWithdrawn",
            CrlReason::AaCompromise => "aACompromise",
        };
        f.write_str(name)
    }
}

/// `GeneralizedTime` that accepts fractional seconds.
///
/// `der::asn1::GeneralizedTime` rejects fractions, which timestamp
/// authorities routinely emit in `genTime`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenTime(Duration);

impl GenTime {
    /// Create from a duration since the unix epoch
    pub fn from_unix_duration(time: Duration) -> der::Result<Self> {
        DateTime::from_unix_duration(Duration::from_secs(time.as_secs()))?;
        Ok(Self(time))
    }

    /// Duration since the unix epoch
    pub fn to_unix_duration(&self) -> Duration {
        self.0
    }

    fn parse(bytes: &[u8]) -> der::Result<Self> {
        let err = || Tag::GeneralizedTime.value_error();
        let (body, zulu) = bytes.split_at(bytes.len().checked_sub(1).ok_or_else(err)?);
        if zulu != b"Z" || body.len() < 14 {
            return Err(err());
        }
        let (whole, fraction) = body.split_at(14);
        let digits = |range: core::ops::Range<usize>| -> der::Result<u32> {
            whole[range].iter().try_fold(0u32, |acc, b| {
                if b.is_ascii_digit() {
                    Ok(acc * 10 + u32::from(b - b'0'))
                } else {
                    Err(err())
                }
            })
        };
        let date_time = DateTime::new(
            u16::try_from(digits(0..4)?).map_err(|_| err())?,
            digits(4..6)? as u8,
            digits(6..8)? as u8,
            digits(8..10)? as u8,
            digits(10..12)? as u8,
            digits(12..14)? as u8,
        )?;

        let nanos = match fraction {
            [] => 0,
            [b'.', rest @ ..] if !rest.is_empty() && rest.iter().all(u8::is_ascii_digit) => rest
                .iter()
                .chain(core::iter::repeat(&b'0'))
                .take(9)
                .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0')),
            _ => return Err(err()),
        };

        Ok(Self(date_time.unix_duration() + Duration::from_nanos(u64::from(nanos))))
    }

    fn to_text(self) -> der::Result<String> {
        let dt = DateTime::from_unix_duration(Duration::from_secs(self.0.as_secs()))?;
        let mut text = format!(
            "{:04}{:02}{:02}{:02}{:02}{:02}",
            dt.year(),
            dt.month(),
            dt.day(),
            dt.hour(),
            dt.minutes(),
            dt.seconds()
        );
        let nanos = self.0.subsec_nanos();
        if nanos != 0 {
            let fraction = format!("{nanos:09}");
            text.push('.');
            text.push_str(fraction.trim_end_matches('0'));
        }
        text.push('Z');
        Ok(text)
    }
}

impl<'a> DecodeValue<'a> for GenTime {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        let bytes = reader.read_vec(header.length)?;
        Self::parse(&bytes)
    }
}

impl EncodeValue for GenTime {
    fn value_len(&self) -> der::Result<Length> {
        Length::try_from(self.to_text()?.len())
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        writer.write(self.to_text()?.as_bytes())
    }
}

impl FixedTag for GenTime {
    const TAG: Tag = Tag::GeneralizedTime;
}

/// A `SET OF` decoded without re-sorting its elements.
///
/// `der::asn1::SetOfVec` sorts on decode, which would change the bytes of
/// signed attributes. Elements keep their received order and re-encode to the
/// received bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawSet<T>(pub Vec<T>);

// Derived `Default` would require `T: Default`
impl<T> Default for RawSet<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<'a, T: DecodeOwned> DecodeValue<'a> for RawSet<T> {
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        let bytes = reader.read_vec(header.length)?;
        let mut inner = SliceReader::new(&bytes)?;
        let mut items = Vec::new();
        while !inner.is_finished() {
            items.push(T::decode(&mut inner)?);
        }
        Ok(Self(items))
    }
}

impl<T: Encode> EncodeValue for RawSet<T> {
    fn value_len(&self) -> der::Result<Length> {
        self.0
            .iter()
            .try_fold(Length::ZERO, |len, item| len + item.encoded_len()?)
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        for item in &self.0 {
            item.encode(writer)?;
        }
        Ok(())
    }
}

impl<T> FixedTag for RawSet<T> {
    const TAG: Tag = Tag::Set;
}
