use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::{CacheBackend, InMemoryCache};
use crate::models::{Address, TaxRequest};

const RATE_KEY_PREFIX: &str = "avatax.taxrate";

/// Short-lived memo of tax rates per store and physical address.
///
/// Only the fields that locate an address take part in the address key, so
/// two customers sharing an address share an entry unless their exemptions
/// or tax codes differ. The store id keeps tenants apart.
#[derive(Clone)]
pub struct RateCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl RateCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(InMemoryCache::new()), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cache key for a store and address.
    pub fn fingerprint(store_id: i64, address: &Address) -> String {
        format!(
            "{}.store-{}.address-{}-{}-{}-{}-{}",
            RATE_KEY_PREFIX,
            store_id,
            normalize(&address.line1),
            normalize(&address.city),
            normalize(&address.region),
            normalize(&address.country),
            normalize(&address.postal_code),
        )
    }

    /// Cache key for a rate request: the destination fingerprint plus every
    /// input that changes taxability (exemptions, usage types, tax codes).
    /// A request without any of them keys on the address alone.
    pub fn request_fingerprint(store_id: i64, request: &TaxRequest) -> String {
        let mut key = Self::fingerprint(store_id, request.addresses.destination());

        let mut qualify = |label: &str, value: Option<&String>| {
            if let Some(value) = value.map(|v| normalize(v)).filter(|v| !v.is_empty()) {
                key.push_str(&format!(".{}-{}", label, value));
            }
        };
        qualify("exemption", request.exemption_no.as_ref());
        qualify("usage", request.customer_usage_type.as_ref());
        for line in &request.lines {
            qualify("line-exemption", line.exemption_code.as_ref());
            qualify("line-usage", line.customer_usage_type.as_ref());
            qualify("taxcode", line.tax_code.as_ref());
        }
        key
    }

    /// Live rate for the key, if any. Backend failures count as a miss.
    pub async fn get(&self, key: &str) -> Option<Decimal> {
        let cached = match self.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Rate cache read failed");
                None
            }
        };

        match cached.as_deref().map(Decimal::from_str) {
            Some(Ok(rate)) => {
                counter!("avatax.rate_cache.hits", 1);
                debug!(key, %rate, "Rate cache hit");
                Some(rate)
            }
            Some(Err(e)) => {
                warn!(key, error = %e, "Discarding unreadable cached rate");
                let _ = self.backend.delete(key).await;
                counter!("avatax.rate_cache.misses", 1);
                None
            }
            None => {
                counter!("avatax.rate_cache.misses", 1);
                None
            }
        }
    }

    /// Stores a rate for the configured TTL.
    pub async fn put(&self, key: &str, rate: Decimal) {
        if let Err(e) = self
            .backend
            .set(key, &rate.to_string(), Some(self.ttl))
            .await
        {
            warn!(key, error = %e, "Rate cache write failed");
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}
