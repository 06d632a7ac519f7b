//! Identifier registry: the bijection between server ids and device-local
//! ids.
//!
//! Mapping loss or duplication is the canonical cause of duplicated todos,
//! so a bind that would point two server ids at one local id (or vice
//! versa) aborts the sync instead of corrupting the device.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Bijective `serverId ↔ localId` mapping for one device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdRegistry {
    by_server: BTreeMap<String, String>,
    by_local: BTreeMap<String, String>,
}

impl IdRegistry {
    /// Build a registry from the persisted `serverIdToLocalId` map.
    ///
    /// Fails with [`Error::DuplicateMapping`] if two server ids point at
    /// the same local id.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let mut registry = Self::default();
        for (server_id, local_id) in map {
            if let Some(existing) = registry.by_local.get(local_id) {
                return Err(Error::DuplicateMapping {
                    server_id: format!("{existing} and {server_id}"),
                    local_id: local_id.clone(),
                });
            }
            registry
                .by_server
                .insert(server_id.clone(), local_id.clone());
            registry.by_local.insert(local_id.clone(), server_id.clone());
        }
        Ok(registry)
    }

    /// Local id for a server id, if bound.
    #[must_use]
    pub fn get(&self, server_id: &str) -> Option<&str> {
        self.by_server.get(server_id).map(String::as_str)
    }

    /// Server id for a local id, if bound.
    #[must_use]
    pub fn reverse(&self, local_id: &str) -> Option<&str> {
        self.by_local.get(local_id).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_server.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_server.len()
    }

    /// Bind `server_id ↔ local_id`.
    ///
    /// Re-binding the identical pair is a no-op. A conflicting bind whose
    /// existing counterpart is still live (per `is_live`) fails with
    /// [`Error::DuplicateMapping`]; a stale counterpart is unbound first.
    pub fn bind(
        &mut self,
        server_id: &str,
        local_id: &str,
        is_live: impl Fn(&str) -> bool,
    ) -> Result<()> {
        if let Some(existing_local) = self.by_server.get(server_id) {
            if existing_local == local_id {
                return Ok(());
            }
            if is_live(existing_local) {
                return Err(Error::DuplicateMapping {
                    server_id: server_id.to_string(),
                    local_id: existing_local.clone(),
                });
            }
            let stale = existing_local.clone();
            self.by_local.remove(&stale);
            self.by_server.remove(server_id);
        }
        if let Some(existing_server) = self.by_local.get(local_id) {
            if is_live(local_id) {
                return Err(Error::DuplicateMapping {
                    server_id: existing_server.clone(),
                    local_id: local_id.to_string(),
                });
            }
            let stale = existing_server.clone();
            self.by_server.remove(&stale);
            self.by_local.remove(local_id);
        }
        self.by_server
            .insert(server_id.to_string(), local_id.to_string());
        self.by_local
            .insert(local_id.to_string(), server_id.to_string());
        Ok(())
    }

    /// Drop the binding for a server id, typically on a confirmed remote
    /// deletion whose local counterpart is already gone.
    pub fn unbind(&mut self, server_id: &str) {
        if let Some(local_id) = self.by_server.remove(server_id) {
            self.by_local.remove(&local_id);
        }
    }

    /// The persisted form: a `serverId → localId` map.
    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, String> {
        self.by_server
    }

    /// Iterate bindings as `(serverId, localId)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_server
            .iter()
            .map(|(server, local)| (server.as_str(), local.as_str()))
    }
}
