// Copyright (c) 2023 The MobileCoin Foundation

//! Validating a signature end to end.
//!
//! The signature itself is checked first: a forged signature makes any
//! further check pointless, so the report ends there. Then the signer's
//! certificate is chained to a trust anchor and checked for revocation at the
//! reference time, which an embedded trusted timestamp can prove.

use crate::asn1::cms::{decode_any, ContentInfo, RevocationInfoArchival, SignedData, SignerInfo};
use crate::chain::{CertificateRole, ChainBuilder, ChainValidator};
use crate::config::ValidationConfig;
use crate::oid;
use crate::provider::{DigestAlgorithm, Provider};
use crate::report::{CheckKind, ReportItem, Severity, ValidationReport};
use crate::revocation::{
    CrlClient, EmbeddedEvidence, OcspClient, RevocationChecker, RevocationContext,
    RevocationLedger,
};
use crate::signer;
use crate::time::{render, unix_now, Deadline};
use crate::timestamp::TimestampValidator;
use crate::transport::{HttpTransport, Transport};
use crate::trust::{TrustAnchorSet, TrustAnchorStore, TrustListFetcher};
use crate::x509::Certificate;
use crate::{Error, Result};
use core::time::Duration;
use der::{Decode, Encode};
use std::sync::Arc;
use tracing::{debug, info};
use x509_cert::spki::AlgorithmIdentifierOwned;
use x509_cert::time::Time;

/// A signature and everything needed to validate it, as extracted from its
/// container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedContent {
    /// The bytes that were signed
    pub signed_bytes: Vec<u8>,
    /// The signature value
    pub signature: Vec<u8>,
    /// The signature algorithm
    pub signature_algorithm: AlgorithmIdentifierOwned,
    /// The digest algorithm applied to the signed bytes
    pub digest_algorithm: DigestAlgorithm,
    /// DER `SET OF Attribute` the signature covers instead of the bytes
    /// themselves, CMS signatures only
    pub signed_attributes: Option<Vec<u8>>,
    /// The certificate of the signer
    pub signing_certificate: Certificate,
    /// Other certificates shipped with the signature
    pub certificates: Vec<Certificate>,
    /// DER `TimeStampToken` over the signature value
    pub timestamp_token: Option<Vec<u8>>,
    /// The signing time the signer claims, not trusted
    pub claimed_signing_time: Option<Duration>,
    /// Revocation evidence shipped with the signature
    pub embedded: EmbeddedEvidence,
}

impl SignedContent {
    /// Extract a signature from a detached CMS `ContentInfo`, the form a PDF
    /// signature dictionary holds, over `signed_bytes`.
    pub fn from_cms_detached(cms: &[u8], signed_bytes: &[u8]) -> Result<Self> {
        let content_info = ContentInfo::from_der(cms)?;
        let signed_data = SignedData::from_content_info(&content_info)?;
        let certificates = signed_data
            .certificates_der()
            .iter()
            .map(|der| Certificate::from_der(der))
            .collect::<core::result::Result<Vec<_>, _>>()?;

        let signer_info = signed_data
            .signer_infos
            .0
            .first()
            .ok_or(Error::MissingInput("signer info"))?;
        let signing_certificate = signer::find_certificate(&signer_info.sid, &certificates)
            .map_err(|_| Error::MissingInput("signer certificate"))?
            .clone();

        let claimed_signing_time = signer_info
            .signed_attribute(oid::SIGNING_TIME)
            .map(decode_any::<Time>)
            .transpose()?
            .map(|time| time.to_unix_duration());
        let timestamp_token = signer_info
            .unsigned_attribute(oid::SIGNATURE_TIMESTAMP_TOKEN)
            .map(Encode::to_der)
            .transpose()?;

        Ok(Self {
            signed_bytes: signed_bytes.to_vec(),
            signature: signer_info.signature.as_bytes().to_vec(),
            signature_algorithm: signer_info.signature_algorithm.clone(),
            digest_algorithm: DigestAlgorithm::from_identifier(&signer_info.digest_algorithm)
                .map_err(|_| Error::MissingInput("supported digest algorithm"))?,
            signed_attributes: signer_info.signed_attrs_der()?,
            signing_certificate,
            certificates,
            timestamp_token,
            claimed_signing_time,
            embedded: embedded_evidence(&signed_data, signer_info)?,
        })
    }
}

// CRLs from the CMS revocation info and both CRLs and OCSP responses from
// the archival attribute
fn embedded_evidence(signed_data: &SignedData, signer_info: &SignerInfo) -> Result<EmbeddedEvidence> {
    let mut embedded = EmbeddedEvidence {
        ocsp_responses: Vec::new(),
        crls: signed_data.crls_der(),
    };
    if let Some(archival) = signer_info.signed_attribute(oid::ADBE_REVOCATION_INFO_ARCHIVAL) {
        let archival = decode_any::<RevocationInfoArchival>(archival)?;
        for crl in archival.crl.iter().flatten() {
            embedded.crls.push(crl.to_der()?);
        }
        for response in archival.ocsp.iter().flatten() {
            embedded.ocsp_responses.push(response.to_der()?);
        }
    }
    Ok(embedded)
}

/// Validates signatures against trust anchors
#[derive(Debug)]
pub struct SignatureValidator {
    config: ValidationConfig,
    provider: Provider,
    anchors: Arc<TrustAnchorStore>,
    revocation: RevocationChecker,
}

impl SignatureValidator {
    /// Compose a validator.
    ///
    /// `config.offline` switches `revocation` to offline mode.
    pub fn new(
        config: ValidationConfig,
        provider: Provider,
        anchors: Arc<TrustAnchorStore>,
        revocation: RevocationChecker,
    ) -> Result<Self> {
        config.check()?;
        let revocation = if config.offline {
            revocation.offline(true)
        } else {
            revocation
        };
        Ok(Self {
            config,
            provider,
            anchors,
            revocation,
        })
    }

    /// A validator using HTTP for revocation and trust lists, as `config`
    /// describes
    pub fn from_config(config: ValidationConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.revocation_timeout(), config.max_response_bytes)?;
        Self::with_transport(config, Arc::new(transport), Vec::new())
    }

    /// A validator as `config` describes, reaching the network through
    /// `transport` and trusting `anchors` besides the configured ones
    pub fn with_transport(
        config: ValidationConfig,
        transport: Arc<dyn Transport>,
        anchors: Vec<Certificate>,
    ) -> Result<Self> {
        config.check()?;
        let provider = Provider::rust_crypto();

        let mut all_anchors = config.load_anchor_files()?;
        all_anchors.extend(anchors);
        let mut store = TrustAnchorStore::new(all_anchors);
        if let Some(trust_list) = &config.trust_list {
            store = store.with_trust_list(TrustListFetcher::new(
                transport.clone(),
                trust_list.clone(),
            ));
        }

        let revocation = RevocationChecker::new(provider.clone())
            .with_client(Arc::new(
                OcspClient::new(transport.clone(), provider.clone())
                    .require_nonce(config.require_ocsp_nonce),
            ))
            .with_client(Arc::new(CrlClient::new(transport, provider.clone())));

        Self::new(config, provider, Arc::new(store), revocation)
    }

    /// The trust anchor store
    pub fn anchors(&self) -> &Arc<TrustAnchorStore> {
        &self.anchors
    }

    /// The configuration
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate `content` against the current trust anchors.
    ///
    /// A configured trust list is loaded first. When it can not be
    /// obtained the error is returned, the caller may then fall back with
    /// [`Self::validate_with`] and the store's snapshot.
    pub fn validate(&self, content: &SignedContent) -> Result<ValidationReport> {
        let anchors = self.anchors.load()?;
        self.validate_with(content, &anchors)
    }

    /// Validate `content` against `anchors`
    pub fn validate_with(
        &self,
        content: &SignedContent,
        anchors: &TrustAnchorSet,
    ) -> Result<ValidationReport> {
        if content.signed_bytes.is_empty() {
            return Err(Error::MissingInput("signed bytes"));
        }
        if content.signature.is_empty() {
            return Err(Error::MissingInput("signature"));
        }

        let validation_time = self
            .config
            .validation_time
            .map_or_else(unix_now, Duration::from_secs);
        let deadline = self
            .config
            .validation_deadline_ms
            .map_or_else(Deadline::none, |ms| Deadline::after(Duration::from_millis(ms)));
        let override_time = self.config.reference_time.map(Duration::from_secs);
        let signer = &content.signing_certificate;
        info!(signer = %signer.subject(), serial = %signer.serial_hex(), "validating signature");

        let mut report = ValidationReport::new();
        let provisional_time = override_time
            .or(content.claimed_signing_time)
            .unwrap_or(validation_time);
        if !self.check_signature(content, provisional_time, &mut report) {
            info!(result = %report.validation_result(), "signature rejected");
            return Ok(report);
        }

        let revocation = (!self.config.revocation_disabled).then_some(&self.revocation);
        let mut ledger = RevocationLedger::default();
        let mut context = RevocationContext {
            reference_time: provisional_time,
            validation_time,
            clock_skew: self.config.clock_skew(),
            deadline,
            embedded: &content.embedded,
        };

        let timestamp = match &content.timestamp_token {
            Some(token) => {
                let validator = TimestampValidator::new(
                    &self.provider,
                    anchors,
                    revocation,
                    self.config.max_chain_depth,
                )?;
                Some(validator.validate(token, &content.signature, &context, &mut ledger))
            }
            None => None,
        };

        context.reference_time = override_time
            .or_else(|| timestamp.as_ref().and_then(|t| t.trusted_time()))
            .or(content.claimed_signing_time)
            .unwrap_or(validation_time);
        debug!(reference_time = %render(context.reference_time), "reference time");

        let mut pool = content.certificates.clone();
        pool.retain(|certificate| certificate != signer);
        let builder = ChainBuilder::new(&pool, anchors, self.config.max_chain_depth)?;
        let chain = ChainValidator::new(&self.provider, anchors, revocation).validate_best(
            &builder,
            signer,
            CertificateRole::Signer,
            &context,
            &mut ledger,
        );
        report.merge(chain.report);

        if let Some(timestamp) = timestamp {
            report.merge(timestamp.report);
        }
        info!(result = %report.validation_result(), "signature validated");
        Ok(report)
    }

    // The signature over the signed attributes or bytes, then the digest
    // the attributes carry
    fn check_signature(
        &self,
        content: &SignedContent,
        time: Duration,
        report: &mut ValidationReport,
    ) -> bool {
        let signer = &content.signing_certificate;
        let message = content
            .signed_attributes
            .as_deref()
            .unwrap_or(&content.signed_bytes);
        let item = match signer::verify_signature(
            &self.provider,
            signer,
            &content.signature_algorithm,
            content.digest_algorithm,
            message,
            &content.signature,
        ) {
            Ok(()) => ReportItem::new(
                CheckKind::Signature,
                Severity::Info,
                format!(
                    "{} signature verifies",
                    oid::display(&content.signature_algorithm.oid)
                ),
                time,
            ),
            Err(e) => ReportItem::new(CheckKind::Signature, Severity::Invalid, e.to_string(), time),
        };
        let verified = item.severity == Severity::Info;
        report.add_report_item(item.for_certificate(signer));
        if !verified {
            return false;
        }

        let Some(attributes) = &content.signed_attributes else {
            return true;
        };
        let item = match signer::check_signed_attributes(
            &self.provider,
            attributes,
            None,
            content.digest_algorithm,
            &content.signed_bytes,
        ) {
            Ok(()) => ReportItem::new(
                CheckKind::MessageDigest,
                Severity::Info,
                "the message digest matches the signed bytes",
                time,
            ),
            Err(e) => ReportItem::new(CheckKind::MessageDigest, Severity::Invalid, e.to_string(), time),
        };
        let matched = item.severity == Severity::Info;
        report.add_report_item(item.for_certificate(signer));
        matched
    }
}
