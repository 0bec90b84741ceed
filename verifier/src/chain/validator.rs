// Copyright (c) 2023 The MobileCoin Foundation

//! Validating one candidate chain.
//!
//! Certificates are visited leaf to root. Each one moves through
//! [`CertificateState`]s as its checks pass:
//!
//! 1. signature by its issuer
//! 2. validity period at the reference time
//! 3. basic constraints and key usage for its position
//! 4. revocation status at the reference time, anchors exempt
//!
//! A failed check ends the chain as [`ChainOutcome::Invalid`]. A check that
//! can not be completed is recorded and the walk continues, the chain ends
//! [`ChainOutcome::Indeterminate`] at best.

use super::{CertificateChain, ChainBuilder};
use crate::oid;
use crate::provider::Provider;
use crate::report::{CheckKind, ReportItem, Severity, ValidationReport};
use crate::revocation::{RevocationChecker, RevocationContext, RevocationLedger, RevocationStatus};
use crate::time::render;
use crate::trust::TrustAnchorSet;
use crate::x509::Certificate;
use core::time::Duration;
use tracing::debug;

/// How far a certificate got through the checks
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CertificateState {
    /// No check has passed
    NotChecked,
    /// Signed by its issuer
    StructurallyValid,
    /// Within its validity period at the reference time
    TimeValid,
    /// Not revoked at the reference time, or exempt
    RevocationChecked,
    /// Part of a chain that reached a trust anchor with every check passed
    Trusted,
}

/// Outcome of validating a chain
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChainOutcome {
    /// Reached a trust anchor with all checks passed
    Trusted,
    /// A check failed
    Invalid,
    /// A required check could not be completed
    Indeterminate,
}

/// What the leaf certificate is used for
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CertificateRole {
    /// Signs documents
    Signer,
    /// Signs timestamp tokens
    TimestampSigner,
}

/// The result of validating one chain
#[derive(Clone, Debug)]
pub struct ChainValidation {
    /// The overall outcome
    pub outcome: ChainOutcome,
    /// The state each certificate reached, leaf first
    pub states: Vec<CertificateState>,
    /// The checks, leaf to root
    pub report: ValidationReport,
}

/// Validates candidate chains
#[derive(Debug)]
pub struct ChainValidator<'a> {
    provider: &'a Provider,
    anchors: &'a TrustAnchorSet,
    revocation: Option<&'a RevocationChecker>,
}

impl<'a> ChainValidator<'a> {
    /// A validator checking revocation with `revocation`, or not at all when
    /// `None`
    pub fn new(
        provider: &'a Provider,
        anchors: &'a TrustAnchorSet,
        revocation: Option<&'a RevocationChecker>,
    ) -> Self {
        Self {
            provider,
            anchors,
            revocation,
        }
    }

    /// Validate `chain` for a leaf used as `role`.
    ///
    /// Revocations found are recorded in `ledger`, and a revocation already
    /// in `ledger` overrides any later answer.
    pub fn validate(
        &self,
        chain: &CertificateChain,
        role: CertificateRole,
        context: &RevocationContext<'_>,
        ledger: &mut RevocationLedger,
    ) -> ChainValidation {
        let certificates = chain.certificates();
        let mut walk = Walk {
            report: ValidationReport::new(),
            states: vec![CertificateState::NotChecked; certificates.len()],
            time: context.reference_time,
            indeterminate: false,
        };

        let mut intermediates_below = 0usize;
        for (index, certificate) in certificates.iter().enumerate() {
            let issuer = certificates.get(index + 1);
            let is_anchor = self.anchors.is_anchor(certificate);

            let position = Position {
                index,
                role,
                intermediates_below,
                is_anchor,
            };
            if !self.structure(&mut walk, certificate, issuer, position) {
                return walk.finish(chain, ChainOutcome::Invalid);
            }
            walk.states[index] = CertificateState::StructurallyValid;

            if !self.validity(&mut walk, certificate) {
                return walk.finish(chain, ChainOutcome::Invalid);
            }
            walk.states[index] = CertificateState::TimeValid;

            if !self.usage(&mut walk, certificate, position) {
                return walk.finish(chain, ChainOutcome::Invalid);
            }

            if !self.revocation(&mut walk, certificate, issuer, is_anchor, context, ledger) {
                return walk.finish(chain, ChainOutcome::Invalid);
            }
            walk.states[index] = CertificateState::RevocationChecked;

            if index > 0 && !certificate.is_self_issued() {
                intermediates_below += 1;
            }
        }

        let root = chain.root();
        if chain.is_anchored() && self.anchors.is_anchor(root) {
            walk.push(
                root,
                CheckKind::TrustAnchor,
                Severity::Info,
                "the chain ends at a trust anchor".into(),
            );
        } else {
            walk.push(
                root,
                CheckKind::TrustAnchor,
                Severity::Indeterminate,
                format!("no trust anchor issued {}", root.subject()),
            );
            walk.indeterminate = true;
        }

        if walk.indeterminate {
            walk.finish(chain, ChainOutcome::Indeterminate)
        } else {
            walk.states.fill(CertificateState::Trusted);
            walk.finish(chain, ChainOutcome::Trusted)
        }
    }

    /// Build the candidate chains for `leaf` and validate them, the preferred
    /// first, until one is trusted.
    ///
    /// When none is trusted the validation of the preferred chain is
    /// returned. Without any chain to an anchor the outcome is
    /// indeterminate.
    pub fn validate_best(
        &self,
        builder: &ChainBuilder<'_>,
        leaf: &Certificate,
        role: CertificateRole,
        context: &RevocationContext<'_>,
        ledger: &mut RevocationLedger,
    ) -> ChainValidation {
        let candidates = builder
            .build(leaf)
            .into_iter()
            .filter(CertificateChain::is_anchored)
            .collect::<Vec<_>>();

        let mut preferred = None;
        for (index, chain) in candidates.iter().enumerate() {
            let validation = self.validate(chain, role, context, ledger);
            debug!(
                serial = %leaf.serial_hex(),
                candidate = index,
                outcome = ?validation.outcome,
                "candidate chain outcome"
            );
            if validation.outcome == ChainOutcome::Trusted {
                return with_path(chain, index, validation, context.reference_time);
            }
            if preferred.is_none() {
                preferred = Some(validation);
            }
        }

        match (candidates.first(), preferred) {
            (Some(chain), Some(validation)) => {
                with_path(chain, 0, validation, context.reference_time)
            }
            _ => {
                let mut report = ValidationReport::new();
                report.add_report_item(
                    ReportItem::new(
                        CheckKind::ChainBuilding,
                        Severity::Indeterminate,
                        "no path to a trust anchor",
                        context.reference_time,
                    )
                    .for_certificate(leaf),
                );
                ChainValidation {
                    outcome: ChainOutcome::Indeterminate,
                    states: vec![CertificateState::NotChecked],
                    report,
                }
            }
        }
    }

    fn structure(
        &self,
        walk: &mut Walk,
        certificate: &Certificate,
        issuer: Option<&Certificate>,
        position: Position,
    ) -> bool {
        if position.is_anchor {
            walk.push(
                certificate,
                CheckKind::CertificateSignature,
                Severity::Info,
                "trust anchor, trusted by configuration".into(),
            );
        } else {
            // A chain that does not reach an anchor may end in a
            // certificate whose issuer is unknown
            let signed_by = issuer.or(certificate.is_self_issued().then_some(certificate));
            match signed_by {
                Some(signer) => match self.provider.verify_issued_by(certificate, signer) {
                    Ok(()) => walk.push(
                        certificate,
                        CheckKind::CertificateSignature,
                        Severity::Info,
                        format!("signed by {}", signer.subject()),
                    ),
                    Err(e) => {
                        walk.push(
                            certificate,
                            CheckKind::CertificateSignature,
                            Severity::Invalid,
                            format!("signature by {} does not verify: {e}", signer.subject()),
                        );
                        return false;
                    }
                },
                None => {
                    walk.push(
                        certificate,
                        CheckKind::CertificateSignature,
                        Severity::Indeterminate,
                        format!("issuer {} not available", certificate.issuer()),
                    );
                    walk.indeterminate = true;
                }
            }
        }

        true
    }

    fn usage(&self, walk: &mut Walk, certificate: &Certificate, position: Position) -> bool {
        match usage_violation(certificate, position) {
            None => {
                walk.push(
                    certificate,
                    CheckKind::KeyUsage,
                    Severity::Info,
                    "constraints and key usage permit the use".into(),
                );
                true
            }
            Some(message) => {
                walk.push(certificate, CheckKind::KeyUsage, Severity::Invalid, message);
                false
            }
        }
    }

    fn validity(&self, walk: &mut Walk, certificate: &Certificate) -> bool {
        let time = walk.time;
        let (severity, message) = if time < certificate.not_before() {
            (
                Severity::Invalid,
                format!("not valid before {}", render(certificate.not_before())),
            )
        } else if time > certificate.not_after() {
            (
                Severity::Invalid,
                format!("expired at {}", render(certificate.not_after())),
            )
        } else {
            (
                Severity::Info,
                format!(
                    "valid from {} until {}",
                    render(certificate.not_before()),
                    render(certificate.not_after())
                ),
            )
        };
        walk.push(certificate, CheckKind::Validity, severity, message);
        severity == Severity::Info
    }

    fn revocation(
        &self,
        walk: &mut Walk,
        certificate: &Certificate,
        issuer: Option<&Certificate>,
        is_anchor: bool,
        context: &RevocationContext<'_>,
        ledger: &mut RevocationLedger,
    ) -> bool {
        if is_anchor {
            return true;
        }
        let Some(checker) = self.revocation else {
            walk.push(
                certificate,
                CheckKind::Revocation,
                Severity::Info,
                "revocation checking disabled".into(),
            );
            return true;
        };
        let Some(issuer) = issuer else {
            walk.push(
                certificate,
                CheckKind::Revocation,
                Severity::Indeterminate,
                "revocation unknown: the issuer is not available".into(),
            );
            walk.indeterminate = true;
            return true;
        };

        let outcome = checker.check(certificate, issuer, context);
        let status = ledger.settle(certificate, outcome.status, context.reference_time);
        let source = outcome.source.unwrap_or_else(|| "earlier evidence".into());
        match status {
            RevocationStatus::Good { as_of } => {
                let mut message =
                    format!("not revoked according to {source} as of {}", render(as_of));
                if let Some(note) = outcome.note {
                    message.push_str(&format!(" ({note})"));
                }
                walk.push(certificate, CheckKind::Revocation, Severity::Info, message);
                true
            }
            RevocationStatus::Revoked { reason, revoked_at } => {
                walk.push(
                    certificate,
                    CheckKind::Revocation,
                    Severity::Invalid,
                    format!("revoked ({reason}) at {}", render(revoked_at)),
                );
                false
            }
            RevocationStatus::Unknown { reason } => {
                walk.push(
                    certificate,
                    CheckKind::Revocation,
                    Severity::Indeterminate,
                    reason,
                );
                walk.indeterminate = true;
                true
            }
        }
    }
}

// Prefix a validation with the path it was run on
fn with_path(
    chain: &CertificateChain,
    index: usize,
    validation: ChainValidation,
    time: Duration,
) -> ChainValidation {
    let mut report = ValidationReport::new();
    report.add_report_item(
        ReportItem::new(
            CheckKind::ChainBuilding,
            Severity::Info,
            format!(
                "candidate path {} of {} certificates to {}",
                index + 1,
                chain.len(),
                chain.root().subject()
            ),
            time,
        )
        .for_certificate(chain.leaf()),
    );
    report.merge(validation.report);
    ChainValidation {
        report,
        ..validation
    }
}

struct Walk {
    report: ValidationReport,
    states: Vec<CertificateState>,
    time: Duration,
    indeterminate: bool,
}

impl Walk {
    fn push(
        &mut self,
        certificate: &Certificate,
        kind: CheckKind,
        severity: Severity,
        message: String,
    ) {
        self.report.add_report_item(
            ReportItem::new(kind, severity, message, self.time).for_certificate(certificate),
        );
    }

    fn finish(self, chain: &CertificateChain, outcome: ChainOutcome) -> ChainValidation {
        debug!(
            leaf = %chain.leaf().subject(),
            root = %chain.root().subject(),
            outcome = ?outcome,
            "chain validated"
        );
        ChainValidation {
            outcome,
            states: self.states,
            report: self.report,
        }
    }
}

// Where a certificate sits in the chain being walked
#[derive(Clone, Copy)]
struct Position {
    index: usize,
    role: CertificateRole,
    // Non self-issued intermediates between the certificate and the leaf
    intermediates_below: usize,
    is_anchor: bool,
}

// Why `certificate` may not be used at its position, if it may not
fn usage_violation(certificate: &Certificate, position: Position) -> Option<String> {
    let key_usage = certificate.key_usage();
    let intermediates_below = position.intermediates_below;
    if position.index == 0 {
        return match position.role {
            CertificateRole::Signer => match key_usage {
                Some(usage) if !usage.digital_signature() && !usage.non_repudiation() => Some(
                    "key usage permits neither digitalSignature nor nonRepudiation".into(),
                ),
                _ => None,
            },
            CertificateRole::TimestampSigner => {
                if !certificate.has_extended_key_usage(oid::KP_TIME_STAMPING) {
                    Some("extended key usage lacks id-kp-timeStamping".into())
                } else if matches!(
                    key_usage,
                    Some(usage) if !usage.digital_signature() && !usage.non_repudiation()
                ) {
                    Some("key usage permits neither digitalSignature nor nonRepudiation".into())
                } else {
                    None
                }
            }
        };
    }

    if !certificate.is_ca() {
        return Some("issues certificates but is not a CA".into());
    }
    if matches!(key_usage, Some(usage) if !usage.key_cert_sign()) {
        return Some("issues certificates but key usage lacks keyCertSign".into());
    }
    match certificate.path_len() {
        Some(limit) if intermediates_below > usize::from(limit) => Some(format!(
            "path length constraint {limit} exceeded by {intermediates_below} intermediate certificates"
        )),
        _ => None,
    }
}
