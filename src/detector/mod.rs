//! Request origin detection
//!
//! The [`GeoDetector`] runs a request through a chain of [`RequestFilter`]s;
//! any match means forced sharing is suppressed for that request. The only
//! filter shipped is [`IpLocationFilter`], which resolves the client address
//! to a city and compares it against a configured location list. Addresses
//! resolve through a MaxMind database when `ip_db` ends in `.mmdb`, and
//! through a [`RangeTable`] file otherwise.

pub mod geo;

use std::sync::Arc;

pub use geo::{GeoLookup, MaxMindDb, RangeTable};

use crate::config::GeoConfig;
use crate::utils::error::GeoError;

/// What a filter gets to look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo<'a> {
    pub domain_group_id: i64,
    pub client_ip: &'a str,
}

/// One check in the detector chain
pub trait RequestFilter: Send + Sync {
    fn matches(&self, request: &RequestInfo<'_>) -> bool;
}

/// Matches clients located in one of the configured cities
pub struct IpLocationFilter {
    lookup: Arc<dyn GeoLookup>,
    locations: Vec<String>,
}

impl IpLocationFilter {
    pub fn new(lookup: Arc<dyn GeoLookup>, locations: Vec<String>) -> Self {
        Self { lookup, locations }
    }
}

impl RequestFilter for IpLocationFilter {
    fn matches(&self, request: &RequestInfo<'_>) -> bool {
        let city = match self.lookup.city(request.client_ip) {
            Ok(city) => city,
            Err(e) => {
                tracing::debug!(ip = request.client_ip, error = %e, "geo lookup failed");
                return false;
            }
        };

        let hit = self.locations.iter().any(|loc| *loc == city);
        if hit {
            tracing::debug!(ip = request.client_ip, city = %city, "client in filtered location");
        }
        hit
    }
}

/// Chain of request filters
#[derive(Default)]
pub struct GeoDetector {
    filters: Vec<Box<dyn RequestFilter>>,
}

impl GeoDetector {
    /// A detector that never matches
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration.
    ///
    /// Without an IP database the detector has no filters. A configured
    /// database that cannot be loaded is an error.
    pub fn from_config(config: &GeoConfig) -> Result<Self, GeoError> {
        let mut detector = Self::new();
        if let Some(path) = &config.ip_db {
            let lookup: Arc<dyn GeoLookup> = if path.extension().is_some_and(|ext| ext == "mmdb") {
                Arc::new(MaxMindDb::open(path, config.language.as_str())?)
            } else {
                Arc::new(RangeTable::open(path)?)
            };
            detector = detector.with_filter(IpLocationFilter::new(
                lookup,
                config.filter_locations.clone(),
            ));
        }
        Ok(detector)
    }

    /// Append a filter to the chain
    pub fn with_filter(mut self, filter: impl RequestFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// Whether any filter matches this request
    pub fn check(&self, domain_group_id: i64, client_ip: &str) -> bool {
        let request = RequestInfo {
            domain_group_id,
            client_ip,
        };
        self.filters.iter().any(|f| f.matches(&request))
    }
}
