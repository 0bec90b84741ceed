// Copyright (c) 2023 The MobileCoin Foundation

//! Trust anchors.
//!
//! The [`TrustAnchorStore`] publishes immutable [`TrustAnchorSet`] snapshots.
//! Readers take a snapshot without locking, a reload builds a complete new
//! set and swaps it in. Concurrent reloads coalesce into one fetch.

pub mod list;

pub use list::{
    FetchedTrustLists, ListPointer, ParsedTrustList, SkippedList, TrustListConfig,
    TrustListFetcher,
};

use crate::time::unix_now;
use crate::x509::{Certificate, DistinguishedName};
use arc_swap::ArcSwap;
use core::time::Duration;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Failure to obtain a trust list
#[derive(displaydoc::Display, Debug, Clone, PartialEq, Eq)]
pub enum TrustListError {
    /// Could not fetch the trust list at {url}: {reason}
    #[allow(missing_docs)]
    Fetch { url: String, reason: String },
    /// Could not parse the trust list at {url}: {reason}
    #[allow(missing_docs)]
    Parse { url: String, reason: String },
}

impl std::error::Error for TrustListError {}

/// The raw documents behind a fetched anchor set
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustListCache {
    /// Raw documents by URL, master first
    pub documents: Vec<(String, Arc<Vec<u8>>)>,
    /// When the documents were loaded, unix time
    pub last_loaded: Duration,
    /// How long the documents are used for
    pub ttl: Option<Duration>,
}

impl TrustListCache {
    /// `true` when the documents should be fetched again at `now`
    pub fn is_expired(&self, now: Duration) -> bool {
        match self.ttl {
            Some(ttl) => now >= self.last_loaded.saturating_add(ttl),
            None => false,
        }
    }
}

/// An immutable set of trust anchors
#[derive(Clone, Debug, Default)]
pub struct TrustAnchorSet {
    anchors: Vec<Certificate>,
    by_subject: HashMap<DistinguishedName, Vec<usize>>,
    fingerprints: HashSet<[u8; 32]>,
    skipped: Vec<SkippedList>,
    cache: Option<Arc<TrustListCache>>,
}

impl TrustAnchorSet {
    /// A set of `anchors`, duplicates removed
    pub fn new(anchors: impl IntoIterator<Item = Certificate>) -> Self {
        let mut set = Self::default();
        for anchor in anchors {
            set.insert(anchor);
        }
        set
    }

    fn insert(&mut self, anchor: Certificate) {
        if !self.fingerprints.insert(*anchor.fingerprint()) {
            return;
        }
        self.by_subject
            .entry(anchor.subject().clone())
            .or_default()
            .push(self.anchors.len());
        self.anchors.push(anchor);
    }

    fn with_trust_lists(
        static_anchors: &[Certificate],
        fetched: FetchedTrustLists,
        last_loaded: Duration,
        ttl: Option<Duration>,
    ) -> Self {
        let mut set = Self::new(static_anchors.iter().cloned());
        for anchor in fetched.certificates {
            set.insert(anchor);
        }
        set.skipped = fetched.skipped;
        set.cache = Some(Arc::new(TrustListCache {
            documents: fetched.documents,
            last_loaded,
            ttl,
        }));
        set
    }

    /// All anchors
    pub fn anchors(&self) -> &[Certificate] {
        &self.anchors
    }

    /// Anchors whose subject is `subject`
    pub fn anchors_by_subject<'a>(
        &'a self,
        subject: &DistinguishedName,
    ) -> impl Iterator<Item = &'a Certificate> + 'a {
        self.by_subject
            .get(subject)
            .into_iter()
            .flatten()
            .filter_map(|index| self.anchors.get(*index))
    }

    /// `true` when `certificate` is one of the anchors
    pub fn is_anchor(&self, certificate: &Certificate) -> bool {
        self.fingerprints.contains(certificate.fingerprint())
    }

    /// Number of anchors
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// `true` when there are no anchors
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    /// Trust lists that were pointed to but could not be used
    pub fn skipped(&self) -> &[SkippedList] {
        &self.skipped
    }

    /// The documents this set was built from, `None` for static anchors only
    pub fn cache(&self) -> Option<&TrustListCache> {
        self.cache.as_deref()
    }
}

/// Holds the current [`TrustAnchorSet`]
#[derive(Debug)]
pub struct TrustAnchorStore {
    static_anchors: Vec<Certificate>,
    current: ArcSwap<TrustAnchorSet>,
    fetcher: Option<TrustListFetcher>,
    generation: AtomicU64,
    last_outcome: Mutex<Option<Result<(), TrustListError>>>,
    fetches: AtomicUsize,
}

impl TrustAnchorStore {
    /// A store of fixed anchors
    pub fn new(anchors: Vec<Certificate>) -> Self {
        let current = ArcSwap::from_pointee(TrustAnchorSet::new(anchors.iter().cloned()));
        Self {
            static_anchors: anchors,
            current,
            fetcher: None,
            generation: AtomicU64::new(0),
            last_outcome: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Add the anchors of a remote trust list to the fixed ones.
    ///
    /// Nothing is fetched until [`Self::load`] or [`Self::reload`].
    pub fn with_trust_list(mut self, fetcher: TrustListFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// The current snapshot
    pub fn snapshot(&self) -> Arc<TrustAnchorSet> {
        self.current.load_full()
    }

    /// The number of trust list fetches started
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// The current snapshot, fetching the trust list first when it has never
    /// been loaded or its time to live has passed.
    ///
    /// Without a trust list this is the fixed anchors. On failure the
    /// previous snapshot stays published, the error lets the caller decide
    /// whether to continue with it.
    pub fn load(&self) -> Result<Arc<TrustAnchorSet>, TrustListError> {
        let snapshot = self.snapshot();
        if self.fetcher.is_none() {
            return Ok(snapshot);
        }
        match snapshot.cache() {
            Some(cache) if !cache.is_expired(unix_now()) => Ok(snapshot),
            _ => self.reload(),
        }
    }

    /// Fetch the trust list and publish a new snapshot.
    ///
    /// Callers arriving while a fetch is in flight wait for it and share its
    /// outcome instead of fetching again.
    pub fn reload(&self) -> Result<Arc<TrustAnchorSet>, TrustListError> {
        let observed = self.generation.load(Ordering::SeqCst);
        let mut last_outcome = self
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if self.generation.load(Ordering::SeqCst) != observed {
            debug!("sharing the outcome of a concurrent trust list reload");
            return match last_outcome.clone() {
                Some(Err(e)) => Err(e),
                _ => Ok(self.snapshot()),
            };
        }

        let outcome = match &self.fetcher {
            None => Ok(()),
            Some(fetcher) => {
                self.fetches.fetch_add(1, Ordering::SeqCst);
                info!(url = %fetcher.config().url, "reloading trust anchors");
                match fetcher.fetch() {
                    Ok(fetched) => {
                        let ttl = fetcher.config().ttl_secs.map(Duration::from_secs);
                        let set = TrustAnchorSet::with_trust_lists(
                            &self.static_anchors,
                            fetched,
                            unix_now(),
                            ttl,
                        );
                        info!(
                            anchors = set.len(),
                            skipped = set.skipped().len(),
                            "trust anchors reloaded"
                        );
                        self.current.store(Arc::new(set));
                        Ok(())
                    }
                    Err(e) => {
                        warn!(error = %e, "trust anchor reload failed, keeping the previous anchors");
                        Err(e)
                    }
                }
            }
        };

        *last_outcome = Some(outcome.clone());
        self.generation.fetch_add(1, Ordering::SeqCst);
        outcome.map(|_| self.snapshot())
    }
}
