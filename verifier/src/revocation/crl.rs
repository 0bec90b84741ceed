// Copyright (c) 2023 The MobileCoin Foundation

//! Certificate revocation lists,
//! [RFC 5280 section 5](https://datatracker.ietf.org/doc/html/rfc5280#section-5).

use super::{Evidence, RevocationClient, RevocationContext, RevocationError};
use crate::asn1::{CrlReason, SignedEnvelope};
use crate::oid;
use crate::provider::{Provider, SignatureAlgorithm};
use crate::transport::Transport;
use crate::x509::{Certificate, DistinguishedName};
use core::time::Duration;
use der::{Decode, Encode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};
use x509_cert::crl::CertificateList;

/// How long a CRL without `nextUpdate` is cached
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A decoded CRL whose signature has not been checked
#[derive(Clone, Debug)]
pub struct UnverifiedCrl {
    list: CertificateList,
    tbs_der: Vec<u8>,
}

impl UnverifiedCrl {
    /// Decode a DER or PEM `CertificateList`
    pub fn parse(bytes: &[u8]) -> Result<Self, RevocationError> {
        let der = if bytes.starts_with(b"-----BEGIN") {
            let (label, der) = pem_rfc7468::decode_vec(bytes)
                .map_err(|e| RevocationError::Malformed(e.to_string()))?;
            if label != "X509 CRL" {
                return Err(RevocationError::Malformed(format!(
                    "unexpected PEM label {label}"
                )));
            }
            der
        } else {
            bytes.to_vec()
        };
        let list = CertificateList::from_der(&der)?;
        let tbs_der = SignedEnvelope::from_der(&der)?.tbs.to_der()?;
        Ok(Self { list, tbs_der })
    }

    /// `thisUpdate`
    pub fn this_update(&self) -> Duration {
        self.list.tbs_cert_list.this_update.to_unix_duration()
    }

    /// `nextUpdate`, if any
    pub fn next_update(&self) -> Option<Duration> {
        self.list
            .tbs_cert_list
            .next_update
            .map(|next| next.to_unix_duration())
    }

    /// Verify the CRL was issued and signed by `issuer`
    pub fn verify(
        self,
        issuer: &Certificate,
        provider: &Provider,
    ) -> Result<VerifiedCrl, RevocationError> {
        if DistinguishedName::from(&self.list.tbs_cert_list.issuer) != *issuer.subject() {
            return Err(RevocationError::IssuerMismatch);
        }
        if issuer.key_usage().map_or(false, |usage| !usage.crl_sign()) {
            return Err(RevocationError::NotCrlSigner);
        }
        let algorithm = SignatureAlgorithm::from_identifier(&self.list.signature_algorithm, None)?;
        provider
            .verify(
                issuer.public_key(),
                algorithm,
                &self.tbs_der,
                self.list.signature.raw_bytes(),
            )
            .map_err(RevocationError::Signature)?;
        Ok(VerifiedCrl { list: self.list })
    }
}

/// A CRL whose signature was verified
#[derive(Clone, Debug)]
pub struct VerifiedCrl {
    list: CertificateList,
}

impl VerifiedCrl {
    /// The reason and time `certificate` was revoked, if listed.
    ///
    /// Entries with reason `removeFromCRL` are not revocations.
    pub fn revocation_of(
        &self,
        certificate: &Certificate,
    ) -> Result<Option<(CrlReason, Duration)>, RevocationError> {
        let Some(entry) = self
            .list
            .tbs_cert_list
            .revoked_certificates
            .iter()
            .flatten()
            .find(|entry| entry.serial_number == *certificate.serial())
        else {
            return Ok(None);
        };
        let reason = entry
            .crl_entry_extensions
            .iter()
            .flatten()
            .find(|extension| extension.extn_id == oid::CRL_REASON)
            .map(|extension| CrlReason::from_der(extension.extn_value.as_bytes()))
            .transpose()?
            .unwrap_or(CrlReason::Unspecified);
        if reason == CrlReason::RemoveFromCrl {
            return Ok(None);
        }
        Ok(Some((reason, entry.revocation_date.to_unix_duration())))
    }

    /// Evidence about `certificate`
    pub fn evidence_for(
        &self,
        certificate: &Certificate,
        context: &RevocationContext<'_>,
    ) -> Result<Evidence, RevocationError> {
        let tbs = &self.list.tbs_cert_list;
        Evidence::judge(
            self.revocation_of(certificate)?,
            tbs.this_update.to_unix_duration(),
            tbs.next_update.map(|next| next.to_unix_duration()),
            context,
        )
        .fresh(context)
    }
}

/// Evidence from a stored CRL
pub fn evidence_from_der(
    provider: &Provider,
    bytes: &[u8],
    certificate: &Certificate,
    issuer: &Certificate,
    context: &RevocationContext<'_>,
) -> Result<Evidence, RevocationError> {
    UnverifiedCrl::parse(bytes)?
        .verify(issuer, provider)?
        .evidence_for(certificate, context)
}

#[derive(Clone, Debug)]
struct CachedCrl {
    bytes: Arc<Vec<u8>>,
    next_update: Option<Duration>,
    fetched_at: Duration,
}

impl CachedCrl {
    fn is_expired(&self, now: Duration) -> bool {
        match self.next_update {
            Some(next_update) => now > next_update,
            None => now > self.fetched_at + DEFAULT_CACHE_TTL,
        }
    }
}

/// Downloads CRLs from the distribution points named in certificates.
///
/// Downloads are cached per URL until the CRL's `nextUpdate`. Cached CRLs are
/// verified again on every use.
#[derive(Debug)]
pub struct CrlClient {
    transport: Arc<dyn Transport>,
    provider: Provider,
    cache: RwLock<HashMap<String, CachedCrl>>,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
}

impl CrlClient {
    /// A client downloading over `transport`
    pub fn new(transport: Arc<dyn Transport>, provider: Provider) -> Self {
        Self {
            transport,
            provider,
            cache: RwLock::new(HashMap::new()),
            cache_hits: AtomicUsize::new(0),
            cache_misses: AtomicUsize::new(0),
        }
    }

    /// Cache statistics (hits, misses)
    pub fn stats(&self) -> (usize, usize) {
        (
            self.cache_hits.load(Ordering::Relaxed),
            self.cache_misses.load(Ordering::Relaxed),
        )
    }

    fn cached(&self, url: &str, now: Duration) -> Option<Arc<Vec<u8>>> {
        let cache = match self.cache.read() {
            Ok(cache) => cache,
            Err(poisoned) => {
                warn!("CRL cache read lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        cache
            .get(url)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.bytes.clone())
    }

    fn store(&self, url: &str, entry: CachedCrl) {
        let mut cache = match self.cache.write() {
            Ok(cache) => cache,
            Err(poisoned) => {
                warn!("CRL cache write lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        cache.insert(url.to_string(), entry);
    }

    fn download(
        &self,
        url: &str,
        context: &RevocationContext<'_>,
    ) -> Result<Arc<Vec<u8>>, RevocationError> {
        let now = context.validation_time;
        if let Some(bytes) = self.cached(url, now) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!(url = %url, "CRL cache hit");
            return Ok(bytes);
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
        let bytes = Arc::new(self.transport.get(url, &context.deadline)?);
        let crl = UnverifiedCrl::parse(&bytes)?;
        self.store(
            url,
            CachedCrl {
                bytes: bytes.clone(),
                next_update: crl.next_update(),
                fetched_at: now,
            },
        );
        Ok(bytes)
    }
}

impl RevocationClient for CrlClient {
    fn name(&self) -> &'static str {
        "CRL"
    }

    fn check(
        &self,
        certificate: &Certificate,
        issuer: &Certificate,
        context: &RevocationContext<'_>,
    ) -> Result<Evidence, RevocationError> {
        let mut last_error = RevocationError::NoLocation;
        for url in certificate.crl_urls() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                debug!(url = %url, "skipping CRL distribution point");
                continue;
            }
            let result = self.download(url, context).and_then(|bytes| {
                evidence_from_der(&self.provider, &bytes, certificate, issuer, context)
            });
            match result {
                Ok(evidence) => return Ok(evidence),
                Err(e) => {
                    warn!(url = %url, error = %e, "CRL check failed");
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
    use crate::revocation::{EmbeddedEvidence, RevocationStatus, DEFAULT_CLOCK_SKEW};
    use crate::time::Deadline;
    use crate::transport::TransportError;
    use assert_matches::assert_matches;

    const ROOT: &str = include_str!("../../data/tests/fixture_ca.pem");
    const SIGNER: &str = include_str!("../../data/tests/fixture_signer.pem");
    const TSA: &str = include_str!("../../data/tests/fixture_tsa.pem");
    const CRL: &[u8] = include_bytes!("../../data/tests/root_crl.der");
    const CRL_URL: &str = "http://crl.fixture.test/root.crl";

    fn cert(pem: &str) -> Certificate {
        Certificate::from_pem(pem).expect("Failed decoding certificate")
    }

    fn context(embedded: &EmbeddedEvidence) -> RevocationContext<'_> {
        RevocationContext {
            reference_time: Duration::from_secs(1_792_334_906),
            validation_time: Duration::from_secs(1_792_368_000),
            clock_skew: DEFAULT_CLOCK_SKEW,
            deadline: Deadline::none(),
            embedded,
        }
    }

    #[derive(Debug, Default)]
    struct CountingTransport {
        gets: AtomicUsize,
    }

    impl Transport for CountingTransport {
        fn get(&self, url: &str, _: &Deadline) -> Result<Vec<u8>, TransportError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if url == CRL_URL {
                Ok(CRL.to_vec())
            } else {
                Err(TransportError::Status {
                    url: url.into(),
                    status: 404,
                })
            }
        }

        fn post(
            &self,
            url: &str,
            _: &'static str,
            _: &'static str,
            _: &[u8],
            _: &Deadline,
        ) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::UnsupportedScheme(url.into()))
        }
    }

    #[test]
    fn listed_certificate_is_revoked() {
        let provider = Provider::default();
        let embedded = EmbeddedEvidence::default();
        let evidence = evidence_from_der(
            &provider,
            CRL,
            &cert(SIGNER),
            &cert(ROOT),
            &context(&embedded),
        )
        .expect("Missing evidence");
        assert_eq!(
            evidence.status,
            RevocationStatus::Revoked {
                reason: CrlReason::KeyCompromise,
                revoked_at: Duration::from_secs(1_748_779_200),
            }
        );
        assert_eq!(evidence.this_update, Duration::from_secs(1_792_334_895));
    }

    #[test]
    fn unlisted_certificate_is_good() {
        let provider = Provider::default();
        let embedded = EmbeddedEvidence::default();
        let evidence =
            evidence_from_der(&provider, CRL, &cert(TSA), &cert(ROOT), &context(&embedded))
                .expect("Missing evidence");
        assert_eq!(
            evidence.status,
            RevocationStatus::Good {
                as_of: Duration::from_secs(1_792_334_895)
            }
        );
    }

    #[test]
    fn crl_from_another_issuer_is_rejected() {
        let provider = Provider::default();
        // The signer is not the CRL issuer
        assert_eq!(
            UnverifiedCrl::parse(CRL)
                .expect("Failed decoding")
                .verify(&cert(SIGNER), &provider)
                .map(|_| ()),
            Err(RevocationError::IssuerMismatch)
        );
    }

    #[test]
    fn pem_crl_is_accepted() {
        let pem = pem_rfc7468::encode_string("X509 CRL", pem_rfc7468::LineEnding::LF, CRL)
            .expect("Failed encoding PEM");
        let crl = UnverifiedCrl::parse(pem.as_bytes()).expect("Failed decoding");
        assert_eq!(crl.this_update(), Duration::from_secs(1_792_334_895));
        assert!(crl.next_update().is_some());
    }

    #[test]
    fn tampered_crl_fails_signature() {
        let provider = Provider::default();
        let mut der = CRL.to_vec();
        // Move `thisUpdate` one second later
        let this_update = der
            .windows(13)
            .position(|window| window == b"261018144815Z")
            .expect("Missing thisUpdate");
        der[this_update + 11] = b'6';
        assert_matches!(
            UnverifiedCrl::parse(&der)
                .expect("Failed decoding")
                .verify(&cert(ROOT), &provider),
            Err(RevocationError::Signature(_))
        );
    }

    #[test]
    fn downloads_are_cached() {
        let transport = Arc::new(CountingTransport::default());
        let client = CrlClient::new(transport.clone(), Provider::default());
        let embedded = EmbeddedEvidence::default();
        let context = context(&embedded);

        for _ in 0..3 {
            let evidence = client
                .check(&cert(SIGNER), &cert(ROOT), &context)
                .expect("Missing evidence");
            assert_matches!(evidence.status, RevocationStatus::Revoked { .. });
        }
        assert_eq!(transport.gets.load(Ordering::SeqCst), 1);
        assert_eq!(client.stats(), (2, 1));
    }

    #[test]
    fn certificate_without_distribution_point() {
        let client = CrlClient::new(Arc::new(CountingTransport::default()), Provider::default());
        let embedded = EmbeddedEvidence::default();
        assert_eq!(
            client.check(&cert(ROOT), &cert(ROOT), &context(&embedded)),
            Err(RevocationError::NoLocation)
        );
    }
}
