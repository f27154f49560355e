//! Registry of known clients for the multiplayer server
//!
//! Clients are identified by username, carried as the last concealed parameter
//! of every message they send. The registry maps each username to the address
//! the server last saw it at:
//! - an entry is created by the first message carrying a username
//! - every later message overwrites the address (clients may roam ports)
//! - logout/exit removes the entry
//! - a rename leaves the old name pointing at the new one for messages still
//!   stamped with it, until someone claims the old name again
//!
//! The map is shared by the receive loop and every dispatch worker, so it uses
//! `DashMap` and needs no external locking.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;
use std::net::SocketAddr;

/// Outcome of [`ClientRegistry::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// First message from this username
    Inserted,
    /// Username known, but it now talks from a different address
    Moved { previous: SocketAddr },
    /// Same username, same address
    Unchanged,
}

impl Upsert {
    pub fn address_changed(&self) -> bool {
        !matches!(self, Upsert::Unchanged)
    }
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<String, SocketAddr>,
    /// Old username -> (new username, address) for renames still in effect
    renamed: DashMap<String, (String, SocketAddr)>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `username` as reachable at `addr`
    pub fn upsert(&self, username: &str, addr: SocketAddr) -> Upsert {
        self.upsert_with(username, addr, |_| {})
    }

    /// Like [`upsert`](Self::upsert), running `on_upsert` while the entry is
    /// still locked
    ///
    /// Anything kept in step with the registry should be updated from the
    /// callback, so a concurrent removal of the same username cannot slip in
    /// between the two.
    pub fn upsert_with(
        &self,
        username: &str,
        addr: SocketAddr,
        on_upsert: impl FnOnce(Upsert),
    ) -> Upsert {
        match self.clients.entry(username.to_string()) {
            Entry::Vacant(vacant) => {
                let _entry = vacant.insert(addr);
                // The name is claimed again, so it no longer points at its
                // renamed owner.
                self.renamed.remove(username);
                info!("Client {} registered from {}", username, addr);
                on_upsert(Upsert::Inserted);
                Upsert::Inserted
            }
            Entry::Occupied(mut occupied) => {
                let previous = *occupied.get();
                let upsert = if previous == addr {
                    Upsert::Unchanged
                } else {
                    occupied.insert(addr);
                    info!("Client {} moved from {} to {}", username, previous, addr);
                    Upsert::Moved { previous }
                };
                on_upsert(upsert);
                upsert
            }
        }
    }

    /// Removes a client, returning its last known address
    pub fn remove(&self, username: &str) -> Option<SocketAddr> {
        self.remove_with(username, |_| {})
    }

    /// Like [`remove`](Self::remove), running `on_remove` before the entry
    /// lock is released
    pub fn remove_with(
        &self,
        username: &str,
        on_remove: impl FnOnce(SocketAddr),
    ) -> Option<SocketAddr> {
        let removed = self
            .clients
            .remove_if(username, |_, addr| {
                on_remove(*addr);
                true
            })
            .map(|(_, addr)| addr);

        if removed.is_some() {
            self.renamed.retain(|_, (current, _)| current.as_str() != username);
            info!("Client {} unregistered", username);
        }
        removed
    }

    pub fn get(&self, username: &str) -> Option<SocketAddr> {
        self.clients.get(username).map(|entry| *entry.value())
    }

    pub fn contains(&self, username: &str) -> bool {
        self.clients.contains_key(username)
    }

    /// Moves the entry for `old` to `new`
    ///
    /// Fails without changes when `old` is unknown or `new` is already taken.
    pub fn rename(&self, old: &str, new: &str) -> bool {
        self.rename_with(old, new, |_| {})
    }

    /// Like [`rename`](Self::rename), running `on_rename` with the client's
    /// address while the new entry is still locked
    ///
    /// Renaming a client to its current name succeeds without calling
    /// `on_rename`.
    pub fn rename_with(&self, old: &str, new: &str, on_rename: impl FnOnce(SocketAddr)) -> bool {
        if old == new {
            return self.contains(old);
        }

        // Remove first: holding an entry on `new` while touching `old` could
        // lock the same shard twice.
        let Some((_, addr)) = self.clients.remove(old) else {
            return false;
        };

        let renamed = match self.clients.entry(new.to_string()) {
            Entry::Vacant(vacant) => {
                let _entry = vacant.insert(addr);
                self.renamed.remove(new);
                self.renamed.insert(old.to_string(), (new.to_string(), addr));
                info!("Client {} renamed to {}", old, new);
                on_rename(addr);
                true
            }
            Entry::Occupied(_) => false,
        };

        if !renamed {
            self.clients.insert(old.to_string(), addr);
        }
        renamed
    }

    /// Maps a username to the name its client currently goes by
    ///
    /// Messages stamped before a rename was confirmed, and retries of the
    /// rename itself, still carry the old name. When `username` is no longer
    /// registered and was renamed by a client at `addr`, the new name is
    /// returned. Otherwise `username` is returned unchanged.
    pub fn resolve(&self, username: &str, addr: SocketAddr) -> String {
        let mut current = username.to_string();
        // Bounded by the alias count so a cycle cannot spin forever
        for _ in 0..=self.renamed.len() {
            if self.contains(&current) {
                break;
            }
            let Some((next, at)) = self.renamed.get(&current).map(|e| e.value().clone()) else {
                break;
            };
            if at != addr {
                break;
            }
            current = next;
        }

        if current != username && self.get(&current) != Some(addr) {
            return username.to_string();
        }
        current
    }

    /// Finds the username last seen at `addr`
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<String> {
        self.clients
            .iter()
            .find(|entry| *entry.value() == addr)
            .map(|entry| entry.key().clone())
    }

    /// Registered usernames in sorted order
    pub fn usernames(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot of all (username, address) pairs
    pub fn client_addrs(&self) -> Vec<(String, SocketAddr)> {
        self.clients
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_first_message_registers() {
        let registry = ClientRegistry::new();
        assert!(registry.is_empty());

        assert_eq!(registry.upsert("alice", test_addr()), Upsert::Inserted);
        assert_eq!(registry.get("alice"), Some(test_addr()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_upsert_overwrites_address() {
        let registry = ClientRegistry::new();
        registry.upsert("alice", test_addr());

        assert_eq!(registry.upsert("alice", test_addr()), Upsert::Unchanged);
        assert_eq!(
            registry.upsert("alice", test_addr2()),
            Upsert::Moved {
                previous: test_addr()
            }
        );
        assert_eq!(registry.get("alice"), Some(test_addr2()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let registry = ClientRegistry::new();
        registry.upsert("alice", test_addr());

        assert_eq!(registry.remove("alice"), Some(test_addr()));
        assert_eq!(registry.remove("alice"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_rename() {
        let registry = ClientRegistry::new();
        registry.upsert("alice", test_addr());
        registry.upsert("bob", test_addr2());

        assert!(!registry.rename("alice", "bob"));
        assert_eq!(registry.get("alice"), Some(test_addr()));
        assert_eq!(registry.get("bob"), Some(test_addr2()));

        assert!(registry.rename("alice", "carol"));
        assert!(!registry.contains("alice"));
        assert_eq!(registry.get("carol"), Some(test_addr()));

        assert!(!registry.rename("nobody", "dave"));
    }

    #[test]
    fn test_taken_rename_restores_old_entry() {
        let registry = ClientRegistry::new();
        registry.upsert("alice", test_addr());
        registry.upsert("bob", test_addr2());

        let mut called = false;
        assert!(!registry.rename_with("alice", "bob", |_| called = true));
        assert!(!called);
        assert_eq!(registry.resolve("alice", test_addr()), "alice");
    }

    #[test]
    fn test_resolve_follows_rename_from_same_addr() {
        let registry = ClientRegistry::new();
        registry.upsert("alice", test_addr());
        assert!(registry.rename("alice", "ally"));

        assert_eq!(registry.resolve("alice", test_addr()), "ally");
        assert_eq!(registry.resolve("ally", test_addr()), "ally");
        // Another client may claim the old name from elsewhere
        assert_eq!(registry.resolve("alice", test_addr2()), "alice");

        assert!(registry.rename("ally", "al"));
        assert_eq!(registry.resolve("alice", test_addr()), "al");
    }

    #[test]
    fn test_reclaimed_or_removed_names_stop_resolving() {
        let registry = ClientRegistry::new();
        registry.upsert("alice", test_addr());
        registry.rename("alice", "ally");

        registry.upsert("alice", test_addr2());
        assert_eq!(registry.resolve("alice", test_addr()), "alice");

        registry.upsert("bob", test_addr2());
        registry.rename("bob", "bobby");
        registry.remove("bobby");
        assert_eq!(registry.resolve("bob", test_addr2()), "bob");
    }

    #[test]
    fn test_callbacks_run_with_registry_change() {
        let registry = ClientRegistry::new();
        let mut seen = Vec::new();

        registry.upsert_with("alice", test_addr(), |u| seen.push(u));
        registry.upsert_with("alice", test_addr(), |u| seen.push(u));
        assert_eq!(seen, vec![Upsert::Inserted, Upsert::Unchanged]);

        let mut removed_from = None;
        assert_eq!(registry.remove_with("alice", |a| removed_from = Some(a)), Some(test_addr()));
        assert_eq!(removed_from, Some(test_addr()));

        let mut called = false;
        assert_eq!(registry.remove_with("alice", |_| called = true), None);
        assert!(!called);
    }

    #[test]
    fn test_find_by_addr() {
        let registry = ClientRegistry::new();
        registry.upsert("alice", test_addr());
        registry.upsert("bob", test_addr2());

        assert_eq!(registry.find_by_addr(test_addr2()), Some("bob".to_string()));
        let unknown: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(registry.find_by_addr(unknown), None);
    }

    #[test]
    fn test_usernames_sorted() {
        let registry = ClientRegistry::new();
        registry.upsert("carol", test_addr());
        registry.upsert("alice", test_addr2());
        registry.upsert("bob", "127.0.0.1:8082".parse().unwrap());

        assert_eq!(registry.usernames(), vec!["alice", "bob", "carol"]);
    }
}
