// Copyright (c) 2023 The MobileCoin Foundation

//! Trusted timestamps per [RFC 3161](https://www.rfc-editor.org/rfc/rfc3161).
//!
//! A token is first verified on its own: the CMS signer, its signed
//! attributes and its signature. The [`TimestampValidator`] then checks that
//! the token covers the timestamped bytes and that the TSA certificate chains
//! to a trust anchor at the token's time.

use crate::asn1::tsp::{MessageImprint, TimeStampReq, TimeStampResp, TstInfo};
use crate::chain::{CertificateRole, ChainBuilder, ChainOutcome, ChainValidator};
use crate::oid;
use crate::provider::{DigestAlgorithm, Provider, ProviderError};
use crate::report::{CheckKind, ReportItem, Severity, ValidationReport};
use crate::revocation::{RevocationChecker, RevocationContext, RevocationLedger};
use crate::signer::{self, SignerError};
use crate::time::{render, Deadline};
use crate::transport::{Transport, TransportError};
use crate::trust::TrustAnchorSet;
use crate::x509::Certificate;
use crate::Error;
use core::time::Duration;
use der::asn1::{OctetString, Uint};
use der::{Decode, Encode};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info};

/// Length of the request nonce, 64 bits
const NONCE_LEN: usize = 8;

/// Error obtaining or verifying a timestamp token
#[derive(displaydoc::Display, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// {0}
    Transport(TransportError),
    /// Malformed timestamp: {0}
    Malformed(String),
    /// The TSA refused the request with status {status}: {text}
    #[allow(missing_docs)]
    NotGranted { status: u32, text: String },
    /// The token carries no signer
    NoSigner,
    /// {0}
    Signer(SignerError),
    /// The token does not cover the timestamped data
    ImprintMismatch,
    /// The nonce in the token does not match the request
    NonceMismatch,
    /// Unsupported digest algorithm {0}
    UnsupportedDigest(String),
}

impl std::error::Error for TimestampError {}

impl From<TransportError> for TimestampError {
    fn from(e: TransportError) -> Self {
        TimestampError::Transport(e)
    }
}

impl From<der::Error> for TimestampError {
    fn from(e: der::Error) -> Self {
        TimestampError::Malformed(e.to_string())
    }
}

impl From<SignerError> for TimestampError {
    fn from(e: SignerError) -> Self {
        TimestampError::Signer(e)
    }
}

impl From<ProviderError> for TimestampError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::UnsupportedAlgorithm(name) => TimestampError::UnsupportedDigest(name),
            other => TimestampError::Malformed(other.to_string()),
        }
    }
}

/// A token whose signature verified.
///
/// Nothing is known yet about the trust in its signer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedTimestamp {
    /// The time asserted by the TSA
    pub gen_time: Duration,
    /// The certificate that signed the token
    pub signer: Certificate,
    /// The certificates embedded in the token
    pub certificates: Vec<Certificate>,
    /// The signed timestamp info
    pub info: TstInfo,
}

impl VerifiedTimestamp {
    /// `true` when the token's message imprint is the digest of `data`
    pub fn covers(&self, provider: &Provider, data: &[u8]) -> Result<bool, TimestampError> {
        let imprint = &self.info.message_imprint;
        let algorithm = DigestAlgorithm::from_identifier(&imprint.hash_algorithm)?;
        Ok(self.imprint_is(algorithm, &provider.digest(algorithm, data)))
    }

    fn imprint_is(&self, algorithm: DigestAlgorithm, digest: &[u8]) -> bool {
        let imprint = &self.info.message_imprint;
        imprint.hash_algorithm.oid == algorithm.oid()
            && bool::from(imprint.hashed_message.as_bytes().ct_eq(digest))
    }
}

/// Verify the signature of a DER `TimeStampToken`
pub fn verify_token(provider: &Provider, der: &[u8]) -> Result<VerifiedTimestamp, TimestampError> {
    let token = provider.decode_timestamp_token(der)?;
    let certificates = token
        .signed_data
        .certificates_der()
        .iter()
        .map(|der| provider.decode_certificate(der))
        .collect::<Result<Vec<_>, _>>()?;

    let signer_info = token
        .signed_data
        .signer_infos
        .0
        .first()
        .ok_or(TimestampError::NoSigner)?;
    let signer = signer::find_certificate(&signer_info.sid, &certificates)?.clone();
    let digest = DigestAlgorithm::from_identifier(&signer_info.digest_algorithm)?;
    let signed_attrs = signer_info
        .signed_attrs_der()?
        .ok_or(SignerError::MissingAttribute("signedAttrs"))?;

    signer::check_signed_attributes(
        provider,
        &signed_attrs,
        Some(oid::CT_TST_INFO),
        digest,
        &token.info_der,
    )?;
    signer::verify_signature(
        provider,
        &signer,
        &signer_info.signature_algorithm,
        digest,
        &signed_attrs,
        signer_info.signature.as_bytes(),
    )?;

    Ok(VerifiedTimestamp {
        gen_time: token.info.gen_time.to_unix_duration(),
        signer,
        certificates,
        info: token.info,
    })
}

/// Requests timestamps from a time-stamping authority
#[derive(Clone, Debug)]
pub struct TsaClient {
    transport: Arc<dyn Transport>,
    provider: Provider,
    url: String,
}

impl TsaClient {
    /// A client for the TSA at `url`
    pub fn new(transport: Arc<dyn Transport>, provider: Provider, url: impl Into<String>) -> Self {
        Self {
            transport,
            provider,
            url: url.into(),
        }
    }

    /// Obtain a token over `digest`, computed with `algorithm`.
    ///
    /// Returns the DER token and its verified contents. The token must echo
    /// the digest and the random request nonce.
    pub fn request_timestamp(
        &self,
        algorithm: DigestAlgorithm,
        digest: &[u8],
        deadline: &Deadline,
    ) -> Result<(Vec<u8>, VerifiedTimestamp), TimestampError> {
        let mut nonce: [u8; NONCE_LEN] = rand::random();
        // Positive and without leading zero, so it encodes as is
        nonce[0] = (nonce[0] & 0x7F) | 0x01;
        self.request_with_nonce(algorithm, digest, &nonce, deadline)
    }

    fn request_with_nonce(
        &self,
        algorithm: DigestAlgorithm,
        digest: &[u8],
        nonce: &[u8],
        deadline: &Deadline,
    ) -> Result<(Vec<u8>, VerifiedTimestamp), TimestampError> {
        let request = TimeStampReq {
            version: 1,
            message_imprint: MessageImprint {
                hash_algorithm: algorithm.identifier(),
                hashed_message: OctetString::new(digest)?,
            },
            req_policy: None,
            nonce: Some(Uint::new(nonce)?),
            cert_req: true,
            extensions: None,
        }
        .to_der()?;

        debug!(url = %self.url, "requesting timestamp");
        let body = self.transport.post(
            &self.url,
            "application/timestamp-query",
            "application/timestamp-reply",
            &request,
            deadline,
        )?;

        let response = TimeStampResp::from_der(&body)?;
        if !response.status.is_granted() {
            return Err(TimestampError::NotGranted {
                status: response.status.status,
                text: response.status.text(),
            });
        }
        let token = response
            .time_stamp_token
            .ok_or_else(|| TimestampError::Malformed("granted without a token".into()))?
            .to_der()?;
        let verified = verify_token(&self.provider, &token)?;

        if !verified.imprint_is(algorithm, digest) {
            return Err(TimestampError::ImprintMismatch);
        }
        let echoed = verified.info.nonce.as_ref().map(Uint::as_bytes);
        if !matches!(echoed, Some(echoed) if bool::from(echoed.ct_eq(nonce))) {
            return Err(TimestampError::NonceMismatch);
        }
        info!(url = %self.url, time = %render(verified.gen_time), "timestamp obtained");
        Ok((token, verified))
    }
}

/// The result of validating a timestamp token
#[derive(Clone, Debug)]
pub struct TimestampValidation {
    /// The token, when its signature verified
    pub timestamp: Option<VerifiedTimestamp>,
    /// Trust in the token
    pub outcome: ChainOutcome,
    /// The checks
    pub report: ValidationReport,
}

impl TimestampValidation {
    /// The time the token proves, when the token is trusted
    pub fn trusted_time(&self) -> Option<Duration> {
        match (&self.timestamp, self.outcome) {
            (Some(timestamp), ChainOutcome::Trusted) => Some(timestamp.gen_time),
            _ => None,
        }
    }
}

/// Validates timestamp tokens against the trust anchors
#[derive(Debug)]
pub struct TimestampValidator<'a> {
    provider: &'a Provider,
    anchors: &'a TrustAnchorSet,
    revocation: Option<&'a RevocationChecker>,
    max_depth: usize,
}

impl<'a> TimestampValidator<'a> {
    /// A validator building TSA chains of at most `max_depth` certificates
    pub fn new(
        provider: &'a Provider,
        anchors: &'a TrustAnchorSet,
        revocation: Option<&'a RevocationChecker>,
        max_depth: usize,
    ) -> crate::Result<Self> {
        if max_depth == 0 {
            return Err(Error::InvalidMaxDepth);
        }
        Ok(Self {
            provider,
            anchors,
            revocation,
            max_depth,
        })
    }

    /// Validate the DER token `token` over `timestamped`.
    ///
    /// The TSA chain is validated at the token's time, revocation evidence
    /// comes from `context` otherwise.
    pub fn validate(
        &self,
        token: &[u8],
        timestamped: &[u8],
        context: &RevocationContext<'_>,
        ledger: &mut RevocationLedger,
    ) -> TimestampValidation {
        let mut report = ValidationReport::new();
        let invalid = |mut report: ValidationReport, item: ReportItem, timestamp| {
            report.add_report_item(item);
            TimestampValidation {
                timestamp,
                outcome: ChainOutcome::Invalid,
                report,
            }
        };

        let timestamp = match verify_token(self.provider, token) {
            Ok(timestamp) => timestamp,
            Err(e) => {
                let item = ReportItem::new(
                    CheckKind::Timestamp,
                    Severity::Invalid,
                    format!("timestamp token does not verify: {e}"),
                    context.reference_time,
                );
                return invalid(report, item, None);
            }
        };
        let time = timestamp.gen_time;

        match timestamp.covers(self.provider, timestamped) {
            Ok(true) => {}
            Ok(false) => {
                let item = ReportItem::new(
                    CheckKind::Timestamp,
                    Severity::Invalid,
                    TimestampError::ImprintMismatch.to_string(),
                    time,
                )
                .for_certificate(&timestamp.signer);
                return invalid(report, item, Some(timestamp));
            }
            Err(e) => {
                let item =
                    ReportItem::new(CheckKind::Timestamp, Severity::Invalid, e.to_string(), time)
                        .for_certificate(&timestamp.signer);
                return invalid(report, item, Some(timestamp));
            }
        }

        report.add_report_item(
            ReportItem::new(
                CheckKind::Timestamp,
                Severity::Info,
                format!("timestamp token signed at {}", render(time)),
                time,
            )
            .for_certificate(&timestamp.signer),
        );

        let builder = match ChainBuilder::new(&timestamp.certificates, self.anchors, self.max_depth)
        {
            Ok(builder) => builder,
            Err(e) => {
                let item =
                    ReportItem::new(CheckKind::Timestamp, Severity::Invalid, e.to_string(), time);
                return invalid(report, item, Some(timestamp));
            }
        };
        let tsa_context = RevocationContext {
            reference_time: time,
            ..*context
        };
        let validator = ChainValidator::new(self.provider, self.anchors, self.revocation);
        let chain = validator.validate_best(
            &builder,
            &timestamp.signer,
            CertificateRole::TimestampSigner,
            &tsa_context,
            ledger,
        );
        report.merge(chain.report);

        TimestampValidation {
            timestamp: Some(timestamp),
            outcome: chain.outcome,
            report,
        }
    }
}
