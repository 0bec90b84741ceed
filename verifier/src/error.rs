// Copyright (c) 2023 The MobileCoin Foundation

//! Errors that cross the public boundary of the engine.
//!
//! Properties of the document under validation never show up here, they are
//! recorded in the [`crate::ValidationReport`]. These errors are caller misuse
//! (contract violations), configuration problems, or a required trust list
//! that could not be obtained.

use crate::trust::TrustListError;

/// Result of the public entry points
pub type Result<T> = core::result::Result<T, Error>;

/// Error returned by the public entry points
#[derive(displaydoc::Display, Debug)]
pub enum Error {
    /// The maximum chain depth must be at least 1
    InvalidMaxDepth,
    /// Required input is missing or empty: {0}
    MissingInput(&'static str),
    /// Error decoding DER: {0}
    Der(der::Error),
    /// Error decoding a certificate: {0}
    Certificate(crate::x509::Error),
    /// Error parsing the configuration: {0}
    Config(serde_json::Error),
    /// Error reading {path}: {message}
    #[allow(missing_docs)]
    Io { path: String, message: String },
    /// The trust list could not be loaded: {0}
    TrustList(TrustListError),
    /// The HTTP client could not be created: {0}
    HttpClient(String),
}

impl std::error::Error for Error {}

impl From<der::Error> for Error {
    fn from(e: der::Error) -> Self {
        Error::Der(e)
    }
}

impl From<crate::x509::Error> for Error {
    fn from(e: crate::x509::Error) -> Self {
        Error::Certificate(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e)
    }
}

impl From<TrustListError> for Error {
    fn from(e: TrustListError) -> Self {
        Error::TrustList(e)
    }
}
