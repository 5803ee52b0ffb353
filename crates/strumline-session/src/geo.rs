//! Best-effort geo-IP lookup and per-country player statistics.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};

use crate::SessionError;

/// Resolves a client address to a country name.
pub trait GeoResolver: Send + Sync + 'static {
    /// `Ok(None)` when the address is not known to the resolver.
    fn country_of(
        &self,
        ip: IpAddr,
    ) -> impl std::future::Future<Output = Result<Option<String>, SessionError>> + Send;
}

/// Resolver that never knows anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeo;

impl GeoResolver for NoGeo {
    async fn country_of(&self, _ip: IpAddr) -> Result<Option<String>, SessionError> {
        Ok(None)
    }
}

/// Resolver backed by a fixed address table.
#[derive(Debug, Clone, Default)]
pub struct StaticGeo {
    table: HashMap<IpAddr, String>,
}

impl StaticGeo {
    pub fn new(table: HashMap<IpAddr, String>) -> Self {
        Self { table }
    }
}

impl GeoResolver for StaticGeo {
    async fn country_of(&self, ip: IpAddr) -> Result<Option<String>, SessionError> {
        Ok(self.table.get(&ip).cloned())
    }
}

/// Distinct client addresses seen per country.
#[derive(Debug, Default)]
pub struct CountryStats {
    countries: Mutex<HashMap<String, HashSet<IpAddr>>>,
}

impl CountryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, country: &str, ip: IpAddr) {
        self.countries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(country.to_owned())
            .or_default()
            .insert(ip);
    }

    /// Country → number of distinct addresses, ordered by country.
    pub fn snapshot(&self) -> BTreeMap<String, usize> {
        self.countries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(country, ips)| (country.clone(), ips.len()))
            .collect()
    }
}
