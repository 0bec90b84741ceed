// Copyright (c) 2023 The MobileCoin Foundation

#![doc = include_str!("../README.md")]
#![deny(missing_docs, missing_debug_implementations, unsafe_code)]

pub mod asn1;
pub mod chain;
mod config;
mod error;
pub mod oid;
pub mod provider;
mod report;
pub mod revocation;
mod signature;
pub mod signer;
pub mod time;
pub mod timestamp;
pub mod transport;
pub mod trust;
pub mod x509;

pub use crate::{
    chain::{CertificateChain, ChainBuilder, ChainOutcome, ChainValidator},
    config::ValidationConfig,
    error::{Error, Result},
    provider::{DigestAlgorithm, Provider, SignatureAlgorithm},
    report::{CertificateRef, CheckKind, ReportItem, Severity, ValidationReport, ValidationResult},
    revocation::{EmbeddedEvidence, RevocationChecker, RevocationStatus},
    signature::{SignatureValidator, SignedContent},
    timestamp::{TimestampValidator, TsaClient},
    transport::{HttpTransport, Transport},
    trust::{TrustAnchorSet, TrustAnchorStore, TrustListConfig, TrustListError},
    x509::{Certificate, DistinguishedName},
};
