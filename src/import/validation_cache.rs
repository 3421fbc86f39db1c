use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::debug;
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::result::ValidationResult;

const MAX_CACHED_VALIDATIONS: u64 = 1_000;

/// The request a validation answers
#[derive(Debug, Clone, Copy)]
pub struct ValidatedSource<'a> {
    /// Provenance URI
    pub provenance: &'a str,
    /// Experiment the import is attached to
    pub experiment: Option<&'a str>,
    /// Raw CSV bytes
    pub content: &'a [u8],
}

#[derive(Debug, PartialEq, Eq)]
struct Fingerprint {
    provenance: String,
    experiment: Option<String>,
    digest: [u8; 32],
}

impl Fingerprint {
    fn of(source: &ValidatedSource<'_>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.content);
        Self {
            provenance: source.provenance.to_string(),
            experiment: source.experiment.map(str::to_string),
            digest: hasher.finalize().into(),
        }
    }
}

struct Entry {
    fingerprint: Fingerprint,
    validation: Arc<ValidationResult>,
}

/// Successful validations kept for a limited time, so that an import
/// presenting the validation key does not validate the file again.
///
/// An entry only answers the request it was computed for: same provenance,
/// same experiment, same bytes.
#[derive(Clone)]
pub struct ValidationCache {
    entries: Cache<String, Arc<Entry>>,
}

impl ValidationCache {
    /// Create a cache whose entries expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(MAX_CACHED_VALIDATIONS)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Store a validation of `source` and return its key
    pub fn store(&self, user: Option<&str>, source: &ValidatedSource<'_>, validation: ValidationResult) -> String {
        let key = validation_key(user);
        let entry = Entry {
            fingerprint: Fingerprint::of(source),
            validation: Arc::new(validation),
        };
        self.entries.insert(key.clone(), Arc::new(entry));
        key
    }

    /// Cached validation for `key`, if still alive and computed for `source`
    pub fn get(&self, key: &str, source: &ValidatedSource<'_>) -> Option<Arc<ValidationResult>> {
        if key.trim().is_empty() {
            return None;
        }
        let entry = self.entries.get(key)?;
        if entry.fingerprint != Fingerprint::of(source) {
            debug!("Validation {} was computed for another file or provenance", key);
            return None;
        }
        Some(Arc::clone(&entry.validation))
    }

    /// Forget a validation
    pub fn invalidate(&self, key: &str) {
        self.entries.invalidate(key);
    }
}

impl std::fmt::Debug for ValidationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

/// `<user>_<yyyyMMddHHmmss>_<8 hex chars>`, the user being the last segment
/// of the user URI
pub fn validation_key(user: Option<&str>) -> String {
    let user = user
        .and_then(|uri| uri.rsplit(['/', '#', ':']).find(|segment| !segment.is_empty()))
        .unwrap_or("anonymous");
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", user, Utc::now().format("%Y%m%d%H%M%S"), &random[..8])
}
