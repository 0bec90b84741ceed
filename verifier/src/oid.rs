// Copyright (c) 2023 The MobileCoin Foundation

//! Object identifiers consumed by the engine.
//!
//! The table is a read-only, process-wide constant. [`name()`] is the only
//! accessor needed to render an identifier for humans.

use const_oid::ObjectIdentifier;

macro_rules! oids {
    ($($(#[$doc:meta])* $name:ident = $dotted:literal, $label:literal;)*) => {
        $(
            $(#[$doc])*
            pub const $name: ObjectIdentifier = ObjectIdentifier::new_unwrap($dotted);
        )*

        const TABLE: &[(ObjectIdentifier, &str)] = &[$(($name, $label)),*];
    };
}

oids! {
    /// RSA public key
    RSA_ENCRYPTION = "1.2.840.113549.1.1.1", "rsaEncryption";
    /// RSA PKCS#1 v1.5 with SHA-1
    SHA1_WITH_RSA = "1.2.840.113549.1.1.5", "sha1WithRSAEncryption";
    /// RSA PKCS#1 v1.5 with SHA-256
    SHA256_WITH_RSA = "1.2.840.113549.1.1.11", "sha256WithRSAEncryption";
    /// RSA PKCS#1 v1.5 with SHA-384
    SHA384_WITH_RSA = "1.2.840.113549.1.1.12", "sha384WithRSAEncryption";
    /// RSA PKCS#1 v1.5 with SHA-512
    SHA512_WITH_RSA = "1.2.840.113549.1.1.13", "sha512WithRSAEncryption";
    /// Elliptic curve public key
    EC_PUBLIC_KEY = "1.2.840.10045.2.1", "ecPublicKey";
    /// NIST P-256
    SECP256R1 = "1.2.840.10045.3.1.7", "secp256r1";
    /// NIST P-384
    SECP384R1 = "1.3.132.0.34", "secp384r1";
    /// ECDSA with SHA-256
    ECDSA_WITH_SHA256 = "1.2.840.10045.4.3.2", "ecdsa-with-SHA256";
    /// ECDSA with SHA-384
    ECDSA_WITH_SHA384 = "1.2.840.10045.4.3.3", "ecdsa-with-SHA384";
    /// ECDSA with SHA-512
    ECDSA_WITH_SHA512 = "1.2.840.10045.4.3.4", "ecdsa-with-SHA512";
    /// SHA-1
    SHA1 = "1.3.14.3.2.26", "sha1";
    /// SHA-256
    SHA256 = "2.16.840.1.101.3.4.2.1", "sha256";
    /// SHA-384
    SHA384 = "2.16.840.1.101.3.4.2.2", "sha384";
    /// SHA-512
    SHA512 = "2.16.840.1.101.3.4.2.3", "sha512";
    /// Subject key identifier extension
    SUBJECT_KEY_IDENTIFIER = "2.5.29.14", "subjectKeyIdentifier";
    /// Key usage extension
    KEY_USAGE = "2.5.29.15", "keyUsage";
    /// Basic constraints extension
    BASIC_CONSTRAINTS = "2.5.29.19", "basicConstraints";
    /// CRL entry reason code extension
    CRL_REASON = "2.5.29.21", "reasonCode";
    /// CRL distribution points extension
    CRL_DISTRIBUTION_POINTS = "2.5.29.31", "cRLDistributionPoints";
    /// Authority key identifier extension
    AUTHORITY_KEY_IDENTIFIER = "2.5.29.35", "authorityKeyIdentifier";
    /// Extended key usage extension
    EXTENDED_KEY_USAGE = "2.5.29.37", "extKeyUsage";
    /// Authority information access extension
    AUTHORITY_INFO_ACCESS = "1.3.6.1.5.5.7.1.1", "authorityInfoAccess";
    /// OCSP access method in the authority information access extension
    AD_OCSP = "1.3.6.1.5.5.7.48.1", "id-ad-ocsp";
    /// Basic OCSP response type
    OCSP_BASIC = "1.3.6.1.5.5.7.48.1.1", "id-pkix-ocsp-basic";
    /// OCSP nonce extension
    OCSP_NONCE = "1.3.6.1.5.5.7.48.1.2", "id-pkix-ocsp-nonce";
    /// OCSP signing extended key usage
    KP_OCSP_SIGNING = "1.3.6.1.5.5.7.3.9", "id-kp-OCSPSigning";
    /// Time stamping extended key usage
    KP_TIME_STAMPING = "1.3.6.1.5.5.7.3.8", "id-kp-timeStamping";
    /// CMS signed data content type
    SIGNED_DATA = "1.2.840.113549.1.7.2", "id-signedData";
    /// CMS data content type
    DATA = "1.2.840.113549.1.7.1", "id-data";
    /// Timestamp token info content type
    CT_TST_INFO = "1.2.840.113549.1.9.16.1.4", "id-ct-TSTInfo";
    /// Content type signed attribute
    CONTENT_TYPE = "1.2.840.113549.1.9.3", "contentType";
    /// Message digest signed attribute
    MESSAGE_DIGEST = "1.2.840.113549.1.9.4", "messageDigest";
    /// Signing time signed attribute
    SIGNING_TIME = "1.2.840.113549.1.9.5", "signingTime";
    /// Signature timestamp unsigned attribute
    SIGNATURE_TIMESTAMP_TOKEN = "1.2.840.113549.1.9.16.2.14", "id-aa-signatureTimeStampToken";
    /// Revocation evidence archived in a PDF signature
    ADBE_REVOCATION_INFO_ARCHIVAL = "1.2.840.113583.1.1.8", "adbe-revocationInfoArchival";
}

/// Human readable name of a known object identifier.
pub fn name(oid: &ObjectIdentifier) -> Option<&'static str> {
    TABLE
        .iter()
        .find_map(|(known, label)| (known == oid).then_some(*label))
}

/// Name of `oid` if known, otherwise its dotted form.
pub fn display(oid: &ObjectIdentifier) -> String {
    match name(oid) {
        Some(label) => label.into(),
        None => oid.to_string(),
    }
}
