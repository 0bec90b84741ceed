// Copyright (c) 2023 The MobileCoin Foundation

/// Error type for decoding certificates.
#[derive(Debug, displaydoc::Display, Clone, PartialEq, Eq)]
pub enum Error {
    /// An error occurred decoding the certificate: {0}
    CertificateDecoding(x509_cert::der::Error),
    /// An error occurred decoding the {0} extension
    ExtensionDecoding(&'static str),
    /// An error occurred decoding PEM: {0}
    PemDecoding(String),
    /// No certificate found in the PEM input
    NoCertificate,
}

impl std::error::Error for Error {}

impl From<x509_cert::der::Error> for Error {
    fn from(src: x509_cert::der::Error) -> Self {
        Error::CertificateDecoding(src)
    }
}
