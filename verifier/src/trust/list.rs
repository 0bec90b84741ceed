// Copyright (c) 2023 The MobileCoin Foundation

//! Hierarchical trust lists per
//! [ETSI TS 119 612](https://www.etsi.org/deliver/etsi_ts/119600_119699/119612/).
//!
//! A master list points to per-territory lists. Each list names trust
//! service providers whose qualifying services contribute their
//! certificates as trust anchors.

use super::TrustListError;
use crate::time::Deadline;
use crate::transport::Transport;
use crate::x509::Certificate;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// MIME type of an XML trust list pointer
const XML_MIME_TYPE: &str = "application/vnd.etsi.tsl+xml";

/// Where and what to fetch
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrustListConfig {
    /// URL of the master list
    pub url: String,
    /// How long a loaded list is used before it is fetched again, `None` for
    /// no expiry
    pub ttl_secs: Option<u64>,
    /// `ServiceTypeIdentifier`s whose certificates become anchors
    pub service_types: Vec<String>,
    /// `ServiceStatus` values whose certificates become anchors
    pub service_statuses: Vec<String>,
    /// How many levels of pointers are followed below the master list
    pub max_depth: usize,
    /// Bound on the whole fetch, in milliseconds
    pub fetch_deadline_ms: Option<u64>,
}

impl Default for TrustListConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            ttl_secs: Some(24 * 60 * 60),
            service_types: vec!["http://uri.etsi.org/TrstSvc/Svctype/CA/QC".into()],
            service_statuses: [
                "granted",
                "recognisedatnationallevel",
                "accredited",
                "undersupervision",
            ]
            .iter()
            .map(|status| format!("http://uri.etsi.org/TrstSvc/TrustedList/Svcstatus/{status}"))
            .collect(),
            max_depth: 2,
            fetch_deadline_ms: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrustServiceStatusList {
    scheme_information: SchemeInformation,
    #[serde(default)]
    trust_service_provider_list: Option<TrustServiceProviderList>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SchemeInformation {
    #[serde(default)]
    scheme_territory: Option<String>,
    #[serde(rename = "PointersToOtherTSL", default)]
    pointers_to_other_tsl: Option<PointersToOtherTsl>,
}

#[derive(Debug, Deserialize)]
struct PointersToOtherTsl {
    #[serde(rename = "OtherTSLPointer", default)]
    pointers: Vec<OtherTslPointer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OtherTslPointer {
    #[serde(rename = "TSLLocation")]
    location: String,
    #[serde(default)]
    additional_information: Option<AdditionalInformation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AdditionalInformation {
    #[serde(default)]
    other_information: Vec<OtherInformation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OtherInformation {
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    scheme_territory: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrustServiceProviderList {
    #[serde(rename = "TrustServiceProvider", default)]
    providers: Vec<TrustServiceProvider>,
}

#[derive(Debug, Deserialize)]
struct TrustServiceProvider {
    #[serde(rename = "TSPServices")]
    services: TspServices,
}

#[derive(Debug, Deserialize)]
struct TspServices {
    #[serde(rename = "TSPService", default)]
    services: Vec<TspService>,
}

#[derive(Debug, Deserialize)]
struct TspService {
    #[serde(rename = "ServiceInformation")]
    information: ServiceInformation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceInformation {
    service_type_identifier: String,
    service_status: String,
    service_digital_identity: ServiceDigitalIdentity,
}

#[derive(Debug, Deserialize)]
struct ServiceDigitalIdentity {
    #[serde(rename = "DigitalId", default)]
    digital_ids: Vec<DigitalId>,
}

#[derive(Debug, Deserialize)]
struct DigitalId {
    #[serde(rename = "X509Certificate", default)]
    certificate: Option<String>,
}

/// A pointer to another list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListPointer {
    /// Where the list is published
    pub url: String,
    /// The territory of the list, if stated
    pub territory: Option<String>,
}

/// One parsed trust list document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedTrustList {
    /// `SchemeTerritory` of the list
    pub territory: Option<String>,
    /// XML lists this list points to
    pub pointers: Vec<ListPointer>,
    /// Certificates of qualifying services
    pub certificates: Vec<Certificate>,
}

impl ParsedTrustList {
    /// Parse a trust list document, keeping the services `config` qualifies
    pub fn parse(xml: &[u8], config: &TrustListConfig) -> Result<Self, String> {
        let text = core::str::from_utf8(xml).map_err(|e| e.to_string())?;
        let list: TrustServiceStatusList =
            serde_xml_rs::from_str(text).map_err(|e| e.to_string())?;

        let pointers = list
            .scheme_information
            .pointers_to_other_tsl
            .map(|pointers| pointers.pointers)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|pointer| {
                let info = pointer
                    .additional_information
                    .map(|info| info.other_information)
                    .unwrap_or_default();
                let is_xml = info
                    .iter()
                    .filter_map(|other| other.mime_type.as_deref())
                    .any(|mime| mime.trim() == XML_MIME_TYPE);
                let territory = info
                    .into_iter()
                    .find_map(|other| other.scheme_territory)
                    .map(|territory| territory.trim().to_string());
                is_xml.then(|| ListPointer {
                    url: pointer.location.trim().to_string(),
                    territory,
                })
            })
            .collect();

        let mut certificates = Vec::new();
        let services = list
            .trust_service_provider_list
            .into_iter()
            .flat_map(|providers| providers.providers)
            .flat_map(|provider| provider.services.services);
        for service in services {
            let information = service.information;
            if !config
                .service_types
                .iter()
                .any(|kind| kind == information.service_type_identifier.trim())
                || !config
                    .service_statuses
                    .iter()
                    .any(|status| status == information.service_status.trim())
            {
                continue;
            }
            for encoded in information
                .service_digital_identity
                .digital_ids
                .into_iter()
                .filter_map(|id| id.certificate)
            {
                let compact = encoded
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect::<String>();
                let der = STANDARD.decode(compact).map_err(|e| e.to_string())?;
                certificates.push(Certificate::from_der(&der).map_err(|e| e.to_string())?);
            }
        }

        Ok(Self {
            territory: list
                .scheme_information
                .scheme_territory
                .map(|territory| territory.trim().to_string()),
            pointers,
            certificates,
        })
    }
}

/// A list that was pointed to but not used
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedList {
    /// Where the list is published
    pub url: String,
    /// The territory of the list, if known
    pub territory: Option<String>,
    /// Why it was skipped
    pub reason: String,
}

/// Everything obtained from one fetch of the list hierarchy
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchedTrustLists {
    /// Raw documents by URL, master first
    pub documents: Vec<(String, Arc<Vec<u8>>)>,
    /// Anchors from all lists
    pub certificates: Vec<Certificate>,
    /// Lists that could not be used
    pub skipped: Vec<SkippedList>,
}

/// Fetches a trust list hierarchy
#[derive(Clone, Debug)]
pub struct TrustListFetcher {
    transport: Arc<dyn Transport>,
    config: TrustListConfig,
}

impl TrustListFetcher {
    /// A fetcher for the hierarchy rooted at `config.url`
    pub fn new(transport: Arc<dyn Transport>, config: TrustListConfig) -> Self {
        Self { transport, config }
    }

    /// The configuration
    pub fn config(&self) -> &TrustListConfig {
        &self.config
    }

    /// Fetch and parse the master list and, recursively, the lists it points
    /// to.
    ///
    /// Failing to obtain the master list is an error. A sub-list that can
    /// not be fetched or parsed is skipped and recorded.
    pub fn fetch(&self) -> Result<FetchedTrustLists, TrustListError> {
        let deadline = self
            .config
            .fetch_deadline_ms
            .map_or_else(Deadline::none, |ms| Deadline::after(Duration::from_millis(ms)));
        let url = &self.config.url;
        info!(url = %url, "fetching trust list");

        let master = self
            .transport
            .get(url, &deadline)
            .map_err(|e| TrustListError::Fetch {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let parsed =
            ParsedTrustList::parse(&master, &self.config).map_err(|reason| TrustListError::Parse {
                url: url.clone(),
                reason,
            })?;

        let mut fetched = FetchedTrustLists::default();
        fetched.documents.push((url.clone(), Arc::new(master)));
        let mut visited = HashSet::from([url.clone()]);
        self.absorb(parsed, 1, &deadline, &mut visited, &mut fetched);

        info!(
            url = %url,
            anchors = fetched.certificates.len(),
            skipped = fetched.skipped.len(),
            "trust list fetched"
        );
        Ok(fetched)
    }

    fn absorb(
        &self,
        list: ParsedTrustList,
        depth: usize,
        deadline: &Deadline,
        visited: &mut HashSet<String>,
        fetched: &mut FetchedTrustLists,
    ) {
        fetched.certificates.extend(list.certificates);
        for pointer in list.pointers {
            if !visited.insert(pointer.url.clone()) {
                debug!(url = %pointer.url, "trust list already visited");
                continue;
            }
            if depth > self.config.max_depth {
                debug!(url = %pointer.url, "trust list beyond maximum depth");
                continue;
            }
            let result = self
                .transport
                .get(&pointer.url, deadline)
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    ParsedTrustList::parse(&bytes, &self.config).map(|parsed| (bytes, parsed))
                });
            match result {
                Ok((bytes, parsed)) => {
                    fetched
                        .documents
                        .push((pointer.url.clone(), Arc::new(bytes)));
                    self.absorb(parsed, depth + 1, deadline, visited, fetched);
                }
                Err(reason) => {
                    warn!(url = %pointer.url, territory = ?pointer.territory, reason = %reason, "skipping trust list");
                    fetched.skipped.push(SkippedList {
                        url: pointer.url,
                        territory: pointer.territory,
                        reason,
                    });
                }
            }
        }
    }
}
