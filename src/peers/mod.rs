//! Peer table
//!
//! Shared map of every peer that has ever announced itself, keyed by the
//! `(address, tcp port)` pair it advertised. Records are never removed, only
//! marked offline by the liveness sweep.

mod liveness;

pub use liveness::*;

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Peer identity: announcing address plus advertised TCP port
pub type PeerKey = SocketAddr;

/// Liveness status of a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerStatus {
    Online,
    Offline,
}

impl fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerStatus::Online => f.write_str("Online"),
            PeerStatus::Offline => f.write_str("Offline"),
        }
    }
}

/// Information about a known peer
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// Source address of the peer's announcements
    pub address: IpAddr,
    /// TCP port the peer accepts messages on
    pub port: u16,
    /// Name the peer announced
    pub display_name: String,
    /// Receipt time of the latest announcement
    pub last_seen: Instant,
    pub status: PeerStatus,
}

impl PeerRecord {
    pub fn key(&self) -> PeerKey {
        SocketAddr::new(self.address, self.port)
    }

    pub fn is_online(&self) -> bool {
        self.status == PeerStatus::Online
    }

    /// Whether the last announcement arrived less than `window` before `now`
    pub fn seen_within(&self, window: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) < window
    }
}

/// Result of recording an announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First announcement from this key
    Inserted,
    /// Known peer that had been marked offline
    Revived,
    /// Known peer that was already online
    Refreshed,
}

impl UpsertOutcome {
    /// True when the peer list visible to collaborators changed
    pub fn newly_online(&self) -> bool {
        !matches!(self, UpsertOutcome::Refreshed)
    }
}

/// Thread-safe peer table
///
/// All mutation happens under one lock. Callers that need to iterate take a
/// [`PeerTable::snapshot`] and work on the copy.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: Mutex<HashMap<PeerKey, PeerRecord>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announcement received now
    pub fn upsert(&self, key: PeerKey, display_name: &str) -> UpsertOutcome {
        self.upsert_at(key, display_name, Instant::now())
    }

    /// Record an announcement received at `now`
    pub fn upsert_at(&self, key: PeerKey, display_name: &str, now: Instant) -> UpsertOutcome {
        let mut peers = self.lock();

        match peers.get_mut(&key) {
            Some(record) => {
                let outcome = match record.status {
                    PeerStatus::Offline => UpsertOutcome::Revived,
                    PeerStatus::Online => UpsertOutcome::Refreshed,
                };
                record.last_seen = record.last_seen.max(now);
                record.status = PeerStatus::Online;
                if record.display_name != display_name {
                    record.display_name = display_name.to_string();
                }
                outcome
            }
            None => {
                peers.insert(
                    key,
                    PeerRecord {
                        address: key.ip(),
                        port: key.port(),
                        display_name: display_name.to_string(),
                        last_seen: now,
                        status: PeerStatus::Online,
                    },
                );
                UpsertOutcome::Inserted
            }
        }
    }

    /// Mark peers silent for longer than `offline_after` as offline
    ///
    /// Returns the records that transitioned, empty if none did.
    pub fn sweep(&self, offline_after: Duration) -> Vec<PeerRecord> {
        self.sweep_at(offline_after, Instant::now())
    }

    /// Sweep as of `now`
    pub fn sweep_at(&self, offline_after: Duration, now: Instant) -> Vec<PeerRecord> {
        let mut peers = self.lock();
        let mut transitioned = Vec::new();

        for record in peers.values_mut() {
            if record.status == PeerStatus::Online
                && now.saturating_duration_since(record.last_seen) > offline_after
            {
                record.status = PeerStatus::Offline;
                transitioned.push(record.clone());
            }
        }

        transitioned
    }

    /// Copy of all records, ordered by key
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        let peers = self.lock();
        let mut records: Vec<PeerRecord> = peers.values().cloned().collect();
        drop(peers);
        records.sort_by_key(|r| r.key());
        records
    }

    /// Get a specific peer by key
    pub fn get(&self, key: &PeerKey) -> Option<PeerRecord> {
        self.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PeerKey, PeerRecord>> {
        self.peers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
