// Copyright (c) 2023 The MobileCoin Foundation

//! Building candidate certificate paths

use crate::trust::TrustAnchorSet;
use crate::x509::Certificate;
use crate::{Error, Result};
use core::cmp::Ordering;
use core::time::Duration;
use std::collections::HashSet;
use tracing::debug;

/// Default maximum number of certificates in a chain
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 10;

/// A certificate path ordered leaf to root.
///
/// Each certificate names the next one as its issuer. Whether the
/// signatures hold is for the [`super::ChainValidator`] to find out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateChain {
    certificates: Vec<Certificate>,
    anchored: bool,
}

impl CertificateChain {
    /// The certificates, leaf first
    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    /// The end entity certificate
    pub fn leaf(&self) -> &Certificate {
        &self.certificates[0]
    }

    /// The last certificate of the path
    pub fn root(&self) -> &Certificate {
        &self.certificates[self.certificates.len() - 1]
    }

    /// `true` when the path ends at a trust anchor
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Number of certificates
    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    /// Always `false`, a chain holds at least its leaf
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    // Issue dates of the certificates between leaf and root, nearest the
    // leaf first
    fn intermediate_ages(&self) -> impl Iterator<Item = Duration> + '_ {
        let end = self.certificates.len().saturating_sub(1).max(1);
        self.certificates[1..end].iter().map(Certificate::not_before)
    }

    fn preference(&self, other: &Self) -> Ordering {
        other
            .anchored
            .cmp(&self.anchored)
            .then_with(|| {
                // Newer intermediates first
                other.intermediate_ages().cmp(self.intermediate_ages())
            })
            .then_with(|| self.certificates.len().cmp(&other.certificates.len()))
            .then_with(|| {
                self.certificates
                    .iter()
                    .map(Certificate::fingerprint)
                    .cmp(other.certificates.iter().map(Certificate::fingerprint))
            })
    }
}

/// Builds candidate chains from a leaf, a pool of certificates and the
/// trust anchors
#[derive(Debug)]
pub struct ChainBuilder<'a> {
    pool: &'a [Certificate],
    anchors: &'a TrustAnchorSet,
    max_depth: usize,
}

impl<'a> ChainBuilder<'a> {
    /// A builder over `pool` and `anchors`.
    ///
    /// `max_depth` is the most certificates a chain may hold, at least 1.
    pub fn new(
        pool: &'a [Certificate],
        anchors: &'a TrustAnchorSet,
        max_depth: usize,
    ) -> Result<Self> {
        if max_depth == 0 {
            return Err(Error::InvalidMaxDepth);
        }
        Ok(Self {
            pool,
            anchors,
            max_depth,
        })
    }

    /// All candidate chains for `leaf`, the preferred first.
    ///
    /// Chains that end at a trust anchor come first. Among those, the one
    /// with the most recently issued intermediates wins, remaining ties are
    /// broken by length and then fingerprints.
    pub fn build(&self, leaf: &Certificate) -> Vec<CertificateChain> {
        let mut chains = Vec::new();
        let mut path = vec![leaf.clone()];
        self.extend(&mut path, &mut chains);

        chains.sort_by(CertificateChain::preference);
        chains.dedup();
        debug!(
            serial = %leaf.serial_hex(),
            candidates = chains.len(),
            anchored = chains.iter().filter(|chain| chain.is_anchored()).count(),
            "built candidate chains"
        );
        chains
    }

    fn extend(&self, path: &mut Vec<Certificate>, chains: &mut Vec<CertificateChain>) {
        let Some(current) = path.last() else {
            return;
        };
        if self.anchors.is_anchor(current) {
            chains.push(CertificateChain {
                certificates: path.clone(),
                anchored: true,
            });
            return;
        }

        let issuers = if path.len() < self.max_depth {
            self.issuers_of(current, path)
        } else {
            debug!(serial = %current.serial_hex(), "maximum chain depth reached");
            Vec::new()
        };

        if issuers.is_empty() {
            chains.push(CertificateChain {
                certificates: path.clone(),
                anchored: false,
            });
            return;
        }

        for issuer in issuers {
            path.push(issuer);
            self.extend(path, chains);
            path.pop();
        }
    }

    // Candidates named as issuer of `certificate` that are not already on
    // the path. Anchors come before pool certificates with the same
    // fingerprint.
    fn issuers_of(&self, certificate: &Certificate, path: &[Certificate]) -> Vec<Certificate> {
        let on_path = path
            .iter()
            .map(Certificate::fingerprint)
            .collect::<HashSet<_>>();
        let mut seen = HashSet::new();

        self.anchors
            .anchors_by_subject(certificate.issuer())
            .chain(
                self.pool
                    .iter()
                    .filter(|candidate| candidate.subject() == certificate.issuer()),
            )
            .filter(|candidate| !on_path.contains(candidate.fingerprint()))
            .filter(|candidate| key_ids_match(certificate, candidate))
            .filter(|candidate| seen.insert(*candidate.fingerprint()))
            .cloned()
            .collect()
    }
}

// The authority key identifier, when present on both sides, must name the
// issuer's key
fn key_ids_match(certificate: &Certificate, issuer: &Certificate) -> bool {
    match (certificate.authority_key_id(), issuer.subject_key_id()) {
        (Some(authority), Some(subject)) => authority == subject,
        _ => true,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;

    const ROOT: &str = include_str!("../../data/tests/fixture_ca.pem");
    const SIGNER: &str = include_str!("../../data/tests/fixture_signer.pem");
    const RESPONDER: &str = include_str!("../../data/tests/fixture_ocsp_responder.pem");
    const INTEL_ROOT: &str = include_str!("../../data/tests/root_ca.pem");
    const INTEL_PROCESSOR: &str = include_str!("../../data/tests/processor_ca.pem");
    const INTEL_LEAF: &str = include_str!("../../data/tests/leaf_cert.pem");

    fn certificate(pem: &str) -> Certificate {
        Certificate::from_pem(pem).expect("Failed decoding certificate")
    }

    #[test]
    fn zero_depth_is_rejected() {
        let anchors = TrustAnchorSet::default();
        assert_matches!(
            ChainBuilder::new(&[], &anchors, 0),
            Err(Error::InvalidMaxDepth)
        );
    }

    #[test]
    fn leaf_to_anchor() {
        let anchors = TrustAnchorSet::new([certificate(ROOT)]);
        let builder = ChainBuilder::new(&[], &anchors, DEFAULT_MAX_CHAIN_DEPTH)
            .expect("Failed creating builder");

        let chains = builder.build(&certificate(SIGNER));
        assert_eq!(chains.len(), 1);
        let chain = &chains[0];
        assert!(chain.is_anchored());
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.leaf(), &certificate(SIGNER));
        assert_eq!(chain.root(), &certificate(ROOT));
    }

    #[test]
    fn intermediate_from_pool() {
        let anchors = TrustAnchorSet::new([certificate(INTEL_ROOT)]);
        let pool = [certificate(ROOT), certificate(INTEL_PROCESSOR)];
        let builder = ChainBuilder::new(&pool, &anchors, DEFAULT_MAX_CHAIN_DEPTH)
            .expect("Failed creating builder");

        let chains = builder.build(&certificate(INTEL_LEAF));
        assert_eq!(chains.len(), 1);
        assert!(chains[0].is_anchored());
        assert_eq!(
            chains[0].certificates(),
            [
                certificate(INTEL_LEAF),
                certificate(INTEL_PROCESSOR),
                certificate(INTEL_ROOT)
            ]
        );
    }

    #[test]
    fn missing_anchor_yields_unanchored_chain() {
        let anchors = TrustAnchorSet::new([certificate(INTEL_ROOT)]);
        let pool = [certificate(ROOT)];
        let builder = ChainBuilder::new(&pool, &anchors, DEFAULT_MAX_CHAIN_DEPTH)
            .expect("Failed creating builder");

        let chains = builder.build(&certificate(SIGNER));
        assert_eq!(chains.len(), 1);
        assert!(!chains[0].is_anchored());
        // The self-issued root is not revisited
        assert_eq!(chains[0].len(), 2);
    }

    #[test]
    fn depth_limit_truncates() {
        let anchors = TrustAnchorSet::new([certificate(INTEL_ROOT)]);
        let pool = [certificate(INTEL_PROCESSOR)];
        let builder = ChainBuilder::new(&pool, &anchors, 2).expect("Failed creating builder");

        let chains = builder.build(&certificate(INTEL_LEAF));
        assert_eq!(chains.len(), 1);
        assert!(!chains[0].is_anchored());
        assert_eq!(chains[0].len(), 2);
    }

    #[test]
    fn pool_copy_of_an_anchor_is_not_a_second_chain() {
        let anchors = TrustAnchorSet::new([certificate(ROOT)]);
        let pool = [certificate(ROOT), certificate(RESPONDER)];
        let builder = ChainBuilder::new(&pool, &anchors, DEFAULT_MAX_CHAIN_DEPTH)
            .expect("Failed creating builder");

        let chains = builder.build(&certificate(SIGNER));
        assert_eq!(chains.len(), 1);
        assert!(chains[0].is_anchored());
    }

    #[test]
    fn preference_order() {
        let leaf = certificate(INTEL_LEAF);
        let unanchored = CertificateChain {
            certificates: vec![leaf.clone(), certificate(INTEL_PROCESSOR)],
            anchored: false,
        };
        let anchored = CertificateChain {
            certificates: vec![
                leaf.clone(),
                certificate(INTEL_PROCESSOR),
                certificate(INTEL_ROOT),
            ],
            anchored: true,
        };
        // The fixture root was issued years after the Intel processor CA
        let newer = CertificateChain {
            certificates: vec![leaf, certificate(ROOT), certificate(INTEL_ROOT)],
            anchored: true,
        };

        let mut chains = vec![unanchored.clone(), anchored.clone(), newer.clone()];
        chains.sort_by(CertificateChain::preference);
        assert_eq!(chains, [newer, anchored, unanchored]);
    }

    #[test]
    fn leaf_that_is_an_anchor() {
        let root = certificate(ROOT);
        let anchors = TrustAnchorSet::new([root.clone()]);
        let builder = ChainBuilder::new(&[], &anchors, 1).expect("Failed creating builder");

        let chains = builder.build(&root);
        assert_eq!(chains.len(), 1);
        assert!(chains[0].is_anchored());
        assert_eq!(chains[0].len(), 1);
    }
}
