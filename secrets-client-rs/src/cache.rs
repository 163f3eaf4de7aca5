use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::Credentials;

#[derive(Clone, Debug)]
struct CachedCredentials {
    value: Credentials,
    expiry: DateTime<Utc>,
}

/// Time-bounded credential cache keyed by secret path
#[derive(Clone)]
pub(crate) struct CredentialCache {
    entries: Arc<DashMap<String, CachedCredentials>>,
    max_age: Duration,
}

impl CredentialCache {
    pub(crate) fn new(max_age: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_age,
        }
    }

    pub(crate) fn get(&self, key: &str) -> Option<Credentials> {
        let hit = self.entries.get(key).map(|entry| entry.value().clone())?;
        if hit.expiry <= Utc::now() {
            self.entries.remove(key);
            None
        } else {
            Some(hit.value)
        }
    }

    pub(crate) fn set(&self, key: String, value: Credentials) {
        let expiry = Utc::now()
            + chrono::Duration::from_std(self.max_age).unwrap_or_else(|_| chrono::Duration::hours(1));

        self.entries.insert(key, CachedCredentials { value, expiry });
    }

    pub(crate) fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }
}
