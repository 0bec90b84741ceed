// Copyright (c) 2023 The MobileCoin Foundation

//! X.509 certificates and names.

mod certs;
mod error;
mod name;

pub use certs::{Certificate, KeyUsage};
pub use error::Error;
pub use name::DistinguishedName;
/// Result of certificate operations
pub type Result<T> = core::result::Result<T, Error>;
