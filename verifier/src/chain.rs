// Copyright (c) 2023 The MobileCoin Foundation

//! Certificate paths: finding them and validating them

mod builder;
mod validator;

pub use builder::{CertificateChain, ChainBuilder, DEFAULT_MAX_CHAIN_DEPTH};
pub use validator::{
    CertificateRole, CertificateState, ChainOutcome, ChainValidation, ChainValidator,
};
