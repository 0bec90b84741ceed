// Copyright (c) 2023 The MobileCoin Foundation

//! The outcome of a validation run.
//!
//! A [`ValidationReport`] is an append-only, ordered list of [`ReportItem`]s.
//! The overall [`ValidationResult`] is derived from the items, never stored,
//! so a bad item can not be hidden by a later good one.

use crate::time::render;
use crate::x509::Certificate;
use core::fmt::{Display, Formatter};
use core::time::Duration;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// How bad a [`ReportItem`] is.
///
/// The order is significant, the higher the worse.
/// ```
/// use sigtrust_verifier::Severity;
/// assert!(Severity::Invalid > Severity::Indeterminate);
/// assert!(Severity::Indeterminate > Severity::Info);
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// The check passed, or the item is informational
    Info,
    /// The check could not be completed
    Indeterminate,
    /// The check failed
    Invalid,
}

/// Overall result of a validation
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationResult {
    /// Every check passed
    Valid,
    /// At least one check could not be completed, none failed
    Indeterminate,
    /// At least one check failed
    Invalid,
}

impl Display for ValidationResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ValidationResult::Valid => "VALID",
            ValidationResult::Indeterminate => "INDETERMINATE",
            ValidationResult::Invalid => "INVALID",
        };
        f.write_str(name)
    }
}

/// The check a [`ReportItem`] is about
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// The signature over the signed content
    Signature,
    /// The digest of the signed bytes against the signed attributes
    MessageDigest,
    /// Building a path to a trust anchor
    ChainBuilding,
    /// A certificate's signature by its issuer
    CertificateSignature,
    /// A certificate's validity period
    Validity,
    /// Basic constraints and key usage
    KeyUsage,
    /// Revocation status
    Revocation,
    /// Reaching a trust anchor
    TrustAnchor,
    /// A timestamp token
    Timestamp,
}

impl Display for CheckKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            CheckKind::Signature => "signature",
            CheckKind::MessageDigest => "message digest",
            CheckKind::ChainBuilding => "chain building",
            CheckKind::CertificateSignature => "certificate signature",
            CheckKind::Validity => "validity",
            CheckKind::KeyUsage => "key usage",
            CheckKind::Revocation => "revocation",
            CheckKind::TrustAnchor => "trust anchor",
            CheckKind::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// Identifies the certificate a [`ReportItem`] is about
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct CertificateRef {
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Serial number, upper case hex
    pub serial: String,
    /// SHA-256 fingerprint, upper case hex
    pub fingerprint: String,
}

impl From<&Certificate> for CertificateRef {
    fn from(certificate: &Certificate) -> Self {
        Self {
            subject: certificate.subject().to_string(),
            issuer: certificate.issuer().to_string(),
            serial: certificate.serial_hex(),
            fingerprint: certificate.fingerprint_hex(),
        }
    }
}

/// One check outcome
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ReportItem {
    /// The certificate the check is about
    pub certificate: Option<CertificateRef>,
    /// The check
    pub kind: CheckKind,
    /// The outcome
    pub severity: Severity,
    /// Human readable detail
    pub message: String,
    /// The time the check was evaluated at
    #[serde(serialize_with = "serialize_time")]
    pub time: Duration,
}

fn serialize_time<S: Serializer>(time: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&render(*time))
}

impl ReportItem {
    /// An item not scoped to a certificate
    pub fn new(
        kind: CheckKind,
        severity: Severity,
        message: impl Into<String>,
        time: Duration,
    ) -> Self {
        Self {
            certificate: None,
            kind,
            severity,
            message: message.into(),
            time,
        }
    }

    /// Scope the item to `certificate`
    pub fn for_certificate(mut self, certificate: &Certificate) -> Self {
        self.certificate = Some(certificate.into());
        self
    }
}

impl Display for ReportItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        let severity = match self.severity {
            Severity::Info => "INFO",
            Severity::Indeterminate => "INDETERMINATE",
            Severity::Invalid => "INVALID",
        };
        write!(f, "[{severity}] {} @ {}", self.kind, render(self.time))?;
        if let Some(certificate) = &self.certificate {
            write!(
                f,
                " ({} serial {})",
                certificate.subject, certificate.serial
            )?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Ordered check outcomes of one validation
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationReport {
    items: Vec<ReportItem>,
}

impl ValidationReport {
    /// An empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item`
    pub fn add_report_item(&mut self, item: ReportItem) {
        self.items.push(item);
    }

    /// Append all items of `other`, keeping their order
    pub fn merge(&mut self, other: ValidationReport) {
        self.items.extend(other.items);
    }

    /// All items in insertion order
    pub fn items(&self) -> &[ReportItem] {
        &self.items
    }

    /// The worst severity present, `None` for an empty report
    pub fn worst_severity(&self) -> Option<Severity> {
        self.items.iter().map(|item| item.severity).max()
    }

    /// The overall result: the worst severity of any item.
    ///
    /// An empty report is valid.
    pub fn validation_result(&self) -> ValidationResult {
        match self.worst_severity() {
            Some(Severity::Invalid) => ValidationResult::Invalid,
            Some(Severity::Indeterminate) => ValidationResult::Indeterminate,
            Some(Severity::Info) | None => ValidationResult::Valid,
        }
    }

    /// Certificate scoped items that are not informational
    pub fn certificate_failures(&self) -> Vec<&ReportItem> {
        self.items
            .iter()
            .filter(|item| item.certificate.is_some() && item.severity > Severity::Info)
            .collect()
    }

    /// All certificate scoped items
    pub fn certificate_logs(&self) -> Vec<&ReportItem> {
        self.items
            .iter()
            .filter(|item| item.certificate.is_some())
            .collect()
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        for item in &self.items {
            writeln!(f, "{item}")?;
        }
        write!(f, "Result: {}", self.validation_result())
    }
}

impl Serialize for ValidationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut report = serializer.serialize_struct("ValidationReport", 2)?;
        report.serialize_field("result", &self.validation_result())?;
        report.serialize_field("items", &self.items)?;
        report.end()
    }
}
