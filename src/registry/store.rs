//! Live backend registry.
//!
//! # Responsibilities
//! - Hold every backend reported by every source
//! - Apply join/change/depart/teardown mutations
//! - Answer per-service queries in a deterministic order

use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::catalog::ServiceCatalog;
use crate::registry::backend::{Backend, BackendState};

/// Mapping of source id → backends reported by that source.
///
/// Entries are only ever removed by an explicit signal; nothing expires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendRegistry {
    sources: BTreeMap<String, BTreeMap<(IpAddr, u16), Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from a flat snapshot (state file, tests).
    pub fn from_snapshot(backends: Vec<Backend>) -> Self {
        let mut registry = Self::new();
        for b in backends {
            registry
                .sources
                .entry(b.source_id.clone())
                .or_default()
                .insert((b.host, b.port), b);
        }
        registry
    }

    /// Insert or replace the entry keyed by `(source_id, host, port)`.
    ///
    /// Returns true if the registry changed.
    pub fn upsert(
        &mut self,
        source_id: &str,
        service_name: Option<&str>,
        host: IpAddr,
        port: u16,
        state: BackendState,
    ) -> bool {
        let backend = Backend {
            source_id: source_id.to_string(),
            service_name: service_name.map(str::to_string),
            host,
            port,
            state,
        };
        let entries = self.sources.entry(source_id.to_string()).or_default();
        match entries.insert((host, port), backend.clone()) {
            Some(previous) => previous != backend,
            None => true,
        }
    }

    /// Remove one backend. Returns true if it existed.
    pub fn remove(&mut self, source_id: &str, host: IpAddr, port: u16) -> bool {
        let Some(entries) = self.sources.get_mut(source_id) else {
            return false;
        };
        let removed = entries.remove(&(host, port)).is_some();
        if entries.is_empty() {
            self.sources.remove(source_id);
        }
        removed
    }

    /// Remove every backend of a torn-down source. Returns how many were dropped.
    pub fn drop_source(&mut self, source_id: &str) -> usize {
        self.sources.remove(source_id).map_or(0, |entries| entries.len())
    }

    /// Backends that declared `service_name` as their target, sorted by
    /// `(host, port)` and then source id.
    pub fn backends_for(&self, service_name: &str) -> Vec<&Backend> {
        self.sorted(|b| b.targets(service_name))
    }

    /// Backends that declared no target service.
    pub fn unassigned(&self) -> Vec<&Backend> {
        self.sorted(|b| b.service_name.is_none())
    }

    /// Backends whose declared target is not in `catalog`.
    pub fn orphans(&self, catalog: &ServiceCatalog) -> Vec<&Backend> {
        self.sorted(|b| match &b.service_name {
            Some(name) => !catalog.contains(name),
            None => catalog.is_empty(),
        })
    }

    /// Every backend, grouped by source in source id order.
    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.sources.values().flat_map(|entries| entries.values())
    }

    /// Flat copy of all entries, for persistence.
    pub fn snapshot(&self) -> Vec<Backend> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sources.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Known source ids.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    fn sorted(&self, keep: impl Fn(&Backend) -> bool) -> Vec<&Backend> {
        let mut selected: Vec<&Backend> = self.iter().filter(|b| keep(b)).collect();
        selected.sort_by(|a, b| {
            (a.host, a.port, &a.source_id).cmp(&(b.host, b.port, &b.source_id))
        });
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_upsert_replaces_same_key() {
        let mut registry = BackendRegistry::new();
        assert!(registry.upsert("r1", Some("web"), ip("10.0.0.5"), 8080, BackendState::Active));
        assert!(!registry.upsert("r1", Some("web"), ip("10.0.0.5"), 8080, BackendState::Active));
        assert!(registry.upsert("r1", Some("web"), ip("10.0.0.5"), 8080, BackendState::Backup));

        let backends = registry.backends_for("web");
        assert_eq!(backends.len(), 1);
        assert_eq!(backends[0].state, BackendState::Backup);
    }

    #[test]
    fn test_backends_sorted_by_host_then_port() {
        let mut registry = BackendRegistry::new();
        registry.upsert("r2", Some("web"), ip("10.0.0.10"), 80, BackendState::Active);
        registry.upsert("r1", Some("web"), ip("10.0.0.9"), 81, BackendState::Active);
        registry.upsert("r1", Some("web"), ip("10.0.0.9"), 80, BackendState::Active);
        registry.upsert("r3", Some("api"), ip("10.0.0.1"), 80, BackendState::Active);

        let addrs: Vec<_> = registry.backends_for("web").iter().map(|b| b.address()).collect();
        // Numeric ordering, not lexical: .9 sorts before .10
        assert_eq!(addrs, vec!["10.0.0.9:80", "10.0.0.9:81", "10.0.0.10:80"]);
        assert_eq!(registry.backends_for("api").len(), 1);
        assert!(registry.backends_for("missing").is_empty());
    }

    #[test]
    fn test_remove_and_drop_source() {
        let mut registry = BackendRegistry::new();
        registry.upsert("r1", Some("web"), ip("10.0.0.5"), 8080, BackendState::Active);
        registry.upsert("r1", Some("web"), ip("10.0.0.6"), 8080, BackendState::Active);
        registry.upsert("r2", Some("web"), ip("10.0.0.7"), 8080, BackendState::Active);

        assert!(registry.remove("r1", ip("10.0.0.5"), 8080));
        assert!(!registry.remove("r1", ip("10.0.0.5"), 8080));
        assert!(!registry.remove("nope", ip("10.0.0.5"), 8080));
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.drop_source("r1"), 1);
        assert_eq!(registry.drop_source("r1"), 0);
        assert_eq!(registry.sources().collect::<Vec<_>>(), vec!["r2"]);
    }

    #[test]
    fn test_unassigned_and_orphans() {
        let catalog = ServiceCatalog::parse("- {name: web, host: 0.0.0.0, port: 80}").unwrap();
        let mut registry = BackendRegistry::new();
        registry.upsert("r1", None, ip("10.0.0.5"), 8080, BackendState::Active);
        registry.upsert("r2", Some("gone"), ip("10.0.0.6"), 8080, BackendState::Active);
        registry.upsert("r3", Some("web"), ip("10.0.0.7"), 8080, BackendState::Active);

        assert_eq!(registry.unassigned().len(), 1);
        let orphans = registry.orphans(&catalog);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].source_id, "r2");

        // Without any service, unassigned backends have nowhere to go either.
        assert_eq!(registry.orphans(&ServiceCatalog::default()).len(), 3);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut registry = BackendRegistry::new();
        registry.upsert("r1", Some("web"), ip("10.0.0.5"), 8080, BackendState::Backup);
        registry.upsert("r2", None, ip("::1"), 9000, BackendState::Active);

        let restored = BackendRegistry::from_snapshot(registry.snapshot());
        assert_eq!(restored, registry);
    }
}
