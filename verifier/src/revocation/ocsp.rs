// Copyright (c) 2023 The MobileCoin Foundation

//! OCSP client, [RFC 6960](https://www.rfc-editor.org/rfc/rfc6960).
//!
//! A response goes through two stages:
//! - [`UnverifiedOcspResponse`]: decoded, nothing about it is trusted.
//! - [`VerifiedOcspResponse`]: the signature verified against the issuing
//!   CA or a delegate the CA authorized.

use super::{Evidence, RevocationClient, RevocationContext, RevocationError};
use crate::asn1::ocsp::{
    BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponseStatus, Request, ResponderId,
    ResponseData, TbsRequest,
};
use crate::oid;
use crate::provider::{DigestAlgorithm, Provider, SignatureAlgorithm};
use crate::transport::Transport;
use crate::x509::{Certificate, DistinguishedName};
use core::time::Duration;
use der::asn1::OctetString;
use der::{Decode, Encode};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use x509_cert::ext::Extension;

const NONCE_LEN: usize = 32;

/// The `CertID` of `certificate` issued by `issuer`, hashed with `digest`
pub fn cert_id(
    provider: &Provider,
    digest: DigestAlgorithm,
    certificate: &Certificate,
    issuer: &Certificate,
) -> Result<CertId, RevocationError> {
    let name = issuer.x509().tbs_certificate.subject.to_der()?;
    let key = issuer.public_key().subject_public_key.raw_bytes();
    Ok(CertId {
        hash_algorithm: digest.identifier(),
        issuer_name_hash: OctetString::new(provider.digest(digest, &name))?,
        issuer_key_hash: OctetString::new(provider.digest(digest, key))?,
        serial_number: certificate.serial().clone(),
    })
}

/// DER `OCSPRequest` for one certificate, with an optional nonce extension
pub fn request_der(
    provider: &Provider,
    certificate: &Certificate,
    issuer: &Certificate,
    nonce: Option<&[u8]>,
) -> Result<Vec<u8>, RevocationError> {
    let request_extensions = nonce
        .map(|nonce| -> Result<_, RevocationError> {
            Ok(vec![Extension {
                extn_id: oid::OCSP_NONCE,
                critical: false,
                extn_value: OctetString::new(OctetString::new(nonce)?.to_der()?)?,
            }])
        })
        .transpose()?;
    let request = OcspRequest {
        tbs_request: TbsRequest {
            version: None,
            requestor_name: None,
            request_list: vec![Request {
                req_cert: cert_id(provider, DigestAlgorithm::Sha1, certificate, issuer)?,
                single_request_extensions: None,
            }],
            request_extensions,
        },
        optional_signature: None,
    };
    Ok(request.to_der()?)
}

/// A decoded OCSP response whose signature has not been checked
#[derive(Clone, Debug)]
pub struct UnverifiedOcspResponse {
    basic: BasicOcspResponse,
    data: ResponseData,
    certificates: Vec<Certificate>,
}

impl UnverifiedOcspResponse {
    /// Decode a DER `OCSPResponse`.
    ///
    /// Only successful basic responses are accepted.
    pub fn parse(provider: &Provider, der: &[u8]) -> Result<Self, RevocationError> {
        let response = provider.decode_ocsp_response(der)?;
        if response.response_status != OcspResponseStatus::Successful {
            return Err(RevocationError::ResponseStatus(format!(
                "{:?}",
                response.response_status
            )));
        }
        let bytes = response
            .response_bytes
            .ok_or_else(|| RevocationError::Malformed("missing responseBytes".into()))?;
        if bytes.response_type != oid::OCSP_BASIC {
            return Err(RevocationError::Malformed(format!(
                "unsupported response type {}",
                bytes.response_type
            )));
        }
        let basic = BasicOcspResponse::from_der(bytes.response.as_bytes())?;
        let data = basic.response_data()?;
        let certificates = basic
            .certs
            .iter()
            .flatten()
            .map(|any| -> Result<Certificate, RevocationError> {
                Ok(provider.decode_certificate(&any.to_der()?)?)
            })
            .collect::<Result<Vec<_>, RevocationError>>()?;
        Ok(Self {
            basic,
            data,
            certificates,
        })
    }

    /// When the response was signed
    pub fn produced_at(&self) -> Duration {
        self.data.produced_at.to_unix_duration()
    }

    /// Verify the response was signed by `issuer` or a responder `issuer`
    /// delegated to
    pub fn verify(
        self,
        issuer: &Certificate,
        provider: &Provider,
    ) -> Result<VerifiedOcspResponse, RevocationError> {
        let responder = self.responder(issuer, provider)?;
        let algorithm = SignatureAlgorithm::from_identifier(&self.basic.signature_algorithm, None)?;
        provider
            .verify(
                responder.public_key(),
                algorithm,
                &self.basic.tbs_response_data.to_der()?,
                self.basic.signature.raw_bytes(),
            )
            .map_err(RevocationError::Signature)?;
        Ok(VerifiedOcspResponse { data: self.data })
    }

    fn responder(
        &self,
        issuer: &Certificate,
        provider: &Provider,
    ) -> Result<Certificate, RevocationError> {
        let responder_id = &self.data.responder_id;
        if identifies(responder_id, issuer, provider) {
            return Ok(issuer.clone());
        }
        let produced_at = self.produced_at();
        self.certificates
            .iter()
            .filter(|candidate| identifies(responder_id, candidate, provider))
            .find(|candidate| {
                candidate.issuer() == issuer.subject()
                    && candidate.has_extended_key_usage(oid::KP_OCSP_SIGNING)
                    && candidate.is_valid_at(produced_at)
                    && provider.verify_issued_by(candidate, issuer).is_ok()
            })
            .cloned()
            .ok_or(RevocationError::UnauthorizedResponder)
    }
}

fn identifies(responder_id: &ResponderId, certificate: &Certificate, provider: &Provider) -> bool {
    match responder_id {
        ResponderId::ByName(name) => DistinguishedName::from(name) == *certificate.subject(),
        ResponderId::ByKey(hash) => {
            let key = certificate.public_key().subject_public_key.raw_bytes();
            let expected = provider.digest(DigestAlgorithm::Sha1, key);
            bool::from(expected.ct_eq(hash.as_bytes()))
        }
    }
}

/// An OCSP response whose signature was verified
#[derive(Clone, Debug)]
pub struct VerifiedOcspResponse {
    data: ResponseData,
}

impl VerifiedOcspResponse {
    /// When the response was signed
    pub fn produced_at(&self) -> Duration {
        self.data.produced_at.to_unix_duration()
    }

    /// The value of the nonce extension, if present
    pub fn nonce(&self) -> Option<Vec<u8>> {
        let extension = self
            .data
            .response_extensions
            .iter()
            .flatten()
            .find(|extension| extension.extn_id == oid::OCSP_NONCE)?;
        let value = extension.extn_value.as_bytes();
        // Some responders put the raw nonce in the extension value instead of
        // an OCTET STRING.
        match OctetString::from_der(value) {
            Ok(inner) => Some(inner.as_bytes().to_vec()),
            Err(_) => Some(value.to_vec()),
        }
    }

    /// Evidence about `certificate` issued by `issuer`
    pub fn evidence_for(
        &self,
        provider: &Provider,
        certificate: &Certificate,
        issuer: &Certificate,
        context: &RevocationContext<'_>,
    ) -> Result<Evidence, RevocationError> {
        let single = self
            .data
            .responses
            .iter()
            .find(|single| {
                let Ok(digest) = DigestAlgorithm::from_identifier(&single.cert_id.hash_algorithm)
                else {
                    return false;
                };
                cert_id(provider, digest, certificate, issuer).map_or(false, |expected| {
                    expected.issuer_name_hash == single.cert_id.issuer_name_hash
                        && expected.issuer_key_hash == single.cert_id.issuer_key_hash
                        && expected.serial_number == single.cert_id.serial_number
                })
            })
            .ok_or(RevocationError::NoMatchingResponse)?;

        let this_update = single.this_update.to_unix_duration();
        let next_update = single.next_update.map(|next| next.to_unix_duration());
        let evidence = match &single.cert_status {
            CertStatus::Good(_) => Evidence::judge(None, this_update, next_update, context),
            CertStatus::Revoked(info) => Evidence::judge(
                Some((
                    info.revocation_reason
                        .unwrap_or(crate::asn1::CrlReason::Unspecified),
                    info.revocation_time.to_unix_duration(),
                )),
                this_update,
                next_update,
                context,
            ),
            CertStatus::Unknown(_) => Evidence {
                status: super::RevocationStatus::Unknown {
                    reason: "the responder does not know the certificate".into(),
                },
                this_update,
                next_update,
                note: None,
            },
        };
        evidence.fresh(context)
    }
}

/// Evidence from a stored `OCSPResponse`, without nonce checks
pub fn evidence_from_der(
    provider: &Provider,
    der: &[u8],
    certificate: &Certificate,
    issuer: &Certificate,
    context: &RevocationContext<'_>,
) -> Result<Evidence, RevocationError> {
    UnverifiedOcspResponse::parse(provider, der)?
        .verify(issuer, provider)?
        .evidence_for(provider, certificate, issuer, context)
}

/// Queries the OCSP responders named in certificates
#[derive(Clone, Debug)]
pub struct OcspClient {
    transport: Arc<dyn Transport>,
    provider: Provider,
    require_nonce: bool,
}

impl OcspClient {
    /// A client sending requests over `transport`
    pub fn new(transport: Arc<dyn Transport>, provider: Provider) -> Self {
        Self {
            transport,
            provider,
            require_nonce: false,
        }
    }

    /// Reject responses that do not echo the request nonce
    pub fn require_nonce(mut self, require: bool) -> Self {
        self.require_nonce = require;
        self
    }

    fn query(
        &self,
        url: &str,
        certificate: &Certificate,
        issuer: &Certificate,
        context: &RevocationContext<'_>,
    ) -> Result<Evidence, RevocationError> {
        let nonce: [u8; NONCE_LEN] = rand::random();
        let request = request_der(&self.provider, certificate, issuer, Some(&nonce))?;
        let body = self.transport.post(
            url,
            "application/ocsp-request",
            "application/ocsp-response",
            &request,
            &context.deadline,
        )?;
        let response =
            UnverifiedOcspResponse::parse(&self.provider, &body)?.verify(issuer, &self.provider)?;
        match response.nonce() {
            Some(echoed) if !bool::from(echoed.ct_eq(&nonce)) => {
                return Err(RevocationError::NonceMismatch)
            }
            None if self.require_nonce => return Err(RevocationError::MissingNonce),
            _ => {}
        }
        response.evidence_for(&self.provider, certificate, issuer, context)
    }
}

impl RevocationClient for OcspClient {
    fn name(&self) -> &'static str {
        "OCSP"
    }

    fn check(
        &self,
        certificate: &Certificate,
        issuer: &Certificate,
        context: &RevocationContext<'_>,
    ) -> Result<Evidence, RevocationError> {
        let mut last_error = RevocationError::NoLocation;
        for url in certificate.ocsp_urls() {
            debug!(url = %url, serial = %certificate.serial_hex(), "querying OCSP responder");
            match self.query(url, certificate, issuer, context) {
                Ok(evidence) => return Ok(evidence),
                Err(e) => {
                    warn!(url = %url, error = %e, "OCSP query failed");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::asn1::CrlReason;
    use crate::revocation::{EmbeddedEvidence, RevocationStatus, DEFAULT_CLOCK_SKEW};
    use crate::time::Deadline;
    use assert_matches::assert_matches;

    const ROOT: &str = include_str!("../../data/tests/fixture_ca.pem");
    const SIGNER: &str = include_str!("../../data/tests/fixture_signer.pem");
    const TSA: &str = include_str!("../../data/tests/fixture_tsa.pem");
    const GOOD: &[u8] = include_bytes!("../../data/tests/ocsp_good.der");
    const REVOKED: &[u8] = include_bytes!("../../data/tests/ocsp_revoked.der");

    fn cert(pem: &str) -> Certificate {
        Certificate::from_pem(pem).expect("Failed decoding certificate")
    }

    fn context(embedded: &EmbeddedEvidence, reference: u64) -> RevocationContext<'_> {
        RevocationContext {
            reference_time: Duration::from_secs(reference),
            validation_time: Duration::from_secs(1_792_368_000),
            clock_skew: DEFAULT_CLOCK_SKEW,
            deadline: Deadline::none(),
            embedded,
        }
    }

    #[test]
    fn cert_id_matches_openssl() {
        let provider = Provider::default();
        let id = cert_id(&provider, DigestAlgorithm::Sha1, &cert(SIGNER), &cert(ROOT))
            .expect("Failed building CertID");
        assert_eq!(
            hex::encode_upper(id.issuer_name_hash.as_bytes()),
            "58B32DFE0071475F9A8442DECDCF1D7F1A493190"
        );
        assert_eq!(
            hex::encode_upper(id.issuer_key_hash.as_bytes()),
            "1B81EFD1B3571EB56509769E0E253B9975113532"
        );
    }

    #[test]
    fn request_carries_nonce() {
        let provider = Provider::default();
        let der = request_der(&provider, &cert(SIGNER), &cert(ROOT), Some(&[9u8; 32]))
            .expect("Failed building request");
        let request = OcspRequest::from_der(&der).expect("Failed decoding request");
        let extensions = request
            .tbs_request
            .request_extensions
            .expect("Missing extensions");
        assert_eq!(extensions[0].extn_id, oid::OCSP_NONCE);
        let nonce = OctetString::from_der(extensions[0].extn_value.as_bytes())
            .expect("Failed decoding nonce");
        assert_eq!(nonce.as_bytes(), [9u8; 32]);
    }

    #[test]
    fn good_response_signed_by_issuer() {
        let provider = Provider::default();
        let embedded = EmbeddedEvidence::default();
        let response = UnverifiedOcspResponse::parse(&provider, GOOD)
            .expect("Failed decoding")
            .verify(&cert(ROOT), &provider)
            .expect("Failed verifying");
        assert_eq!(response.produced_at(), Duration::from_secs(1_792_334_888));
        assert_eq!(response.nonce(), None);

        let evidence = response
            .evidence_for(
                &provider,
                &cert(SIGNER),
                &cert(ROOT),
                &context(&embedded, 1_792_334_906),
            )
            .expect("Missing evidence");
        assert_eq!(
            evidence.status,
            RevocationStatus::Good {
                as_of: Duration::from_secs(1_792_334_888)
            }
        );
        assert_eq!(evidence.next_update, Some(Duration::from_secs(1_792_939_688)));
    }

    #[test]
    fn revoked_response_signed_by_delegate() {
        let provider = Provider::default();
        let embedded = EmbeddedEvidence::default();
        let response = UnverifiedOcspResponse::parse(&provider, REVOKED)
            .expect("Failed decoding")
            .verify(&cert(ROOT), &provider)
            .expect("Failed verifying");
        assert_eq!(
            response.nonce().map(hex::encode_upper),
            Some("40205517BA5B15DE11A154790D2B4C5B".to_string())
        );

        let evidence = response
            .evidence_for(
                &provider,
                &cert(SIGNER),
                &cert(ROOT),
                &context(&embedded, 1_792_334_906),
            )
            .expect("Missing evidence");
        assert_eq!(
            evidence.status,
            RevocationStatus::Revoked {
                reason: CrlReason::KeyCompromise,
                revoked_at: Duration::from_secs(1_748_779_200),
            }
        );
    }

    #[test]
    fn revocation_after_reference_time_is_good_with_note() {
        let provider = Provider::default();
        let embedded = EmbeddedEvidence::default();
        // 2025-01-01, before the revocation
        let evidence = evidence_from_der(
            &provider,
            REVOKED,
            &cert(SIGNER),
            &cert(ROOT),
            &context(&embedded, 1_735_689_600),
        )
        .expect("Missing evidence");
        assert_matches!(evidence.status, RevocationStatus::Good { .. });
        assert!(evidence.note.is_some());
    }

    #[test]
    fn response_for_another_certificate_does_not_match() {
        let provider = Provider::default();
        let embedded = EmbeddedEvidence::default();
        assert_eq!(
            evidence_from_der(
                &provider,
                GOOD,
                &cert(TSA),
                &cert(ROOT),
                &context(&embedded, 1_792_334_906)
            ),
            Err(RevocationError::NoMatchingResponse)
        );
    }

    #[test]
    fn response_not_from_the_issuer_is_rejected() {
        let provider = Provider::default();
        // The signer did not issue itself, nor delegate to anyone
        assert_matches!(
            UnverifiedOcspResponse::parse(&provider, GOOD)
                .expect("Failed decoding")
                .verify(&cert(SIGNER), &provider),
            Err(RevocationError::UnauthorizedResponder)
        );
    }

    #[test]
    fn tampered_response_fails_signature() {
        let provider = Provider::default();
        let mut der = GOOD.to_vec();
        // Move `producedAt` one second later
        let produced_at = der
            .windows(15)
            .position(|window| window == b"20261018144808Z")
            .expect("Missing producedAt");
        der[produced_at + 13] = b'9';
        assert_matches!(
            UnverifiedOcspResponse::parse(&provider, &der)
                .expect("Failed decoding")
                .verify(&cert(ROOT), &provider),
            Err(RevocationError::Signature(_))
        );
    }

    #[test]
    fn outdated_response_is_rejected() {
        let provider = Provider::default();
        let embedded = EmbeddedEvidence {
            ocsp_responses: vec![],
            crls: vec![],
        };
        let mut context = context(&embedded, 1_800_000_000);
        context.validation_time = Duration::from_secs(1_800_000_000);
        assert_matches!(
            evidence_from_der(&provider, GOOD, &cert(SIGNER), &cert(ROOT), &context),
            Err(RevocationError::Outdated { .. })
        );
    }
}
