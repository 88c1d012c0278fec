//! Address table for dependency resolution

use crate::address::Address;
use crate::model::TargetId;
use dashmap::DashMap;

/// Maps addresses to target ids. Thread-safe for concurrent access.
pub struct AddressTable {
    addresses: DashMap<Address, TargetId>,
    /// For directory lookups: spec path -> target names declared there
    dir_addresses: DashMap<String, Vec<String>>,
}

impl AddressTable {
    pub fn new() -> Self {
        AddressTable {
            addresses: DashMap::new(),
            dir_addresses: DashMap::new(),
        }
    }

    /// Insert an address. Returns the id previously registered for it, if any.
    pub fn insert(&self, address: Address, id: TargetId) -> Option<TargetId> {
        let spec_path = address.spec_path.clone();
        let name = address.name.clone();
        let previous = self.addresses.insert(address, id);
        if previous.is_none() {
            self.dir_addresses.entry(spec_path).or_default().push(name);
        }
        previous
    }

    /// Look up an address.
    pub fn lookup(&self, address: &Address) -> Option<TargetId> {
        self.addresses.get(address).map(|r| *r.value())
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.addresses.contains_key(address)
    }

    /// Names of all targets declared in a directory, sorted.
    pub fn names_in_dir(&self, spec_path: &str) -> Vec<String> {
        let mut names = self
            .dir_addresses
            .get(spec_path)
            .map(|r| r.value().clone())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// All directories that declare at least one target, sorted.
    pub fn spec_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.dir_addresses.iter().map(|r| r.key().clone()).collect();
        paths.sort();
        paths
    }
}

impl Default for AddressTable {
    fn default() -> Self {
        Self::new()
    }
}
