// Copyright (c) 2023 The MobileCoin Foundation

//! X509 distinguished name comparison as defined in section
//! [7.1](https://datatracker.ietf.org/doc/html/rfc5280#section-7.1) of
//! [RFC5280](https://datatracker.ietf.org/doc/html/rfc5280).
//!
//! Names are reduced once to a comparison key so that they can be compared,
//! hashed and used to index issuer candidates:
//!
//! - `DirectoryString` values (`PrintableString`, `UTF8String`, `IA5String`)
//!   are prepared per [RFC4518](https://www.rfc-editor.org/rfc/rfc4518)
//!   (mapping, NFKC normalization, insignificant space handling) and case
//!   folded.
//! - Any other attribute value is compared on its raw encoding.
//! - The attributes of a multi-valued RDN are compared as a set.

use core::fmt::{Display, Formatter};
use core::hash::{Hash, Hasher};
use const_oid::ObjectIdentifier;
use unicode_normalization::UnicodeNormalization;
use x509_cert::attr::AttributeValue;
use x509_cert::der::{Tag, Tagged};
use x509_cert::name::Name;

/// A distinguished name with its RFC5280 comparison key.
#[derive(Clone, Debug)]
pub struct DistinguishedName {
    name: Name,
    key: Vec<Vec<(ObjectIdentifier, NameValue)>>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum NameValue {
    Prepared(String),
    Raw(u8, Vec<u8>),
}

impl DistinguishedName {
    /// The underlying name
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// `true` when the name has no RDNs
    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl From<&Name> for DistinguishedName {
    fn from(name: &Name) -> Self {
        let key = name
            .0
            .iter()
            .map(|rdn| {
                let mut attributes = rdn
                    .0
                    .iter()
                    .map(|attr| (attr.oid, NameValue::from(&attr.value)))
                    .collect::<Vec<_>>();
                attributes.sort();
                attributes
            })
            .collect();
        Self {
            name: name.clone(),
            key,
        }
    }
}

impl PartialEq for DistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DistinguishedName {}

impl Hash for DistinguishedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl Display for DistinguishedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl From<&AttributeValue> for NameValue {
    fn from(value: &AttributeValue) -> Self {
        let tag = value.tag();
        match tag {
            Tag::PrintableString | Tag::Utf8String | Tag::Ia5String => {
                match core::str::from_utf8(value.value()) {
                    Ok(s) => NameValue::Prepared(prepare(s)),
                    Err(_) => NameValue::Raw(tag.octet(), value.value().to_vec()),
                }
            }
            _ => NameValue::Raw(tag.octet(), value.value().to_vec()),
        }
    }
}

/// RFC4518 string preparation followed by case folding.
///
/// The result always has one leading and one trailing space and every run of
/// inner spaces is two spaces, per
/// <https://www.rfc-editor.org/rfc/rfc4518#section-2.6.1>.
fn prepare(s: &str) -> String {
    let mapped = s
        .chars()
        .filter_map(|c| if c.is_whitespace() { Some(' ') } else { map_to_nothing(c) })
        .nfkc()
        .collect::<String>();
    let folded = caseless::default_case_fold_str(&mapped);

    let mut prepared = String::with_capacity(folded.len() + 2);
    prepared.push(' ');
    for word in folded.split(' ').filter(|w| !w.is_empty()) {
        if prepared.len() > 1 {
            prepared.push_str("  ");
        }
        prepared.push_str(word);
    }
    prepared.push(' ');
    prepared
}

/// Characters mapped to nothing by
/// <https://www.rfc-editor.org/rfc/rfc4518#section-2.2>.
///
/// The RFC lists variation selectors as `FF00-FE0F`; the correct range is
/// `FE00-FE0F` per <https://www.rfc-editor.org/rfc/rfc3454#appendix-B.1>.
fn map_to_nothing(c: char) -> Option<char> {
    match c {
        '\u{0000}'..='\u{0008}'
        | '\u{000E}'..='\u{001F}'
        | '\u{007F}'..='\u{0084}'
        | '\u{0086}'..='\u{009F}'
        | '\u{00AD}'
        | '\u{034F}'
        | '\u{06DD}'
        | '\u{070F}'
        | '\u{1806}'
        | '\u{180B}'..='\u{180E}'
        | '\u{200B}'..='\u{200F}'
        | '\u{202A}'..='\u{202E}'
        | '\u{2060}'..='\u{2063}'
        | '\u{206A}'..='\u{206F}'
        | '\u{FE00}'..='\u{FE0F}'
        | '\u{FEFF}'
        | '\u{FFF9}'..='\u{FFFC}'
        | '\u{1D173}'..='\u{1D17A}'
        | '\u{E0001}'
        | '\u{E0020}'..='\u{E0074}' => None,
        c => Some(c),
    }
}
