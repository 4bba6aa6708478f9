use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

/// Process identity resolved for a local port.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// Read-only contract the packet parser consumes to attribute traffic to a
/// local process. An external OS-introspection component owns the refresh
/// cycle; the capture path never writes through this trait.
pub trait ProcessLookup: Send + Sync {
    fn lookup(&self, local_port: u16) -> Option<ProcessInfo>;
}

/// Shared port→process table backing [`ProcessLookup`].
///
/// Entries are replaced wholesale by whatever component polls the OS
/// connection table; lookups run concurrently with refreshes without
/// blocking the capture thread.
pub struct ProcessTable {
    entries: DashMap<u16, ProcessInfo>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Swaps in a fresh snapshot of the OS connection table.
    pub fn replace(&self, snapshot: impl IntoIterator<Item = (u16, ProcessInfo)>) {
        self.entries.clear();
        for (port, info) in snapshot {
            self.entries.insert(port, info);
        }
    }

    pub fn insert(&self, local_port: u16, info: ProcessInfo) {
        self.entries.insert(local_port, info);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLookup for ProcessTable {
    fn lookup(&self, local_port: u16) -> Option<ProcessInfo> {
        self.entries.get(&local_port).map(|e| e.value().clone())
    }
}

pub type SharedProcessTable = Arc<ProcessTable>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_swaps_snapshot() {
        let table = ProcessTable::new();
        table.insert(443, ProcessInfo { pid: 10, name: "old".into() });

        table.replace(vec![(8080, ProcessInfo { pid: 42, name: "python3".into() })]);

        assert!(table.lookup(443).is_none());
        let hit = table.lookup(8080).unwrap();
        assert_eq!(hit.pid, 42);
        assert_eq!(hit.name, "python3");
    }
}
