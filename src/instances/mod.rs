//! Instance identity registry - numeric ids for objects crossing the boundary
//!
//! Two disjoint id spaces share the same integer range:
//! - Server instances: native objects the host borrows. Ids are issued here,
//!   start at 1 and are never reused. The host releases them explicitly.
//! - Client instances: host objects native code refers to. Ids are chosen by
//!   the host; this side only counts its own references and tells the host
//!   when the last one is gone.
//!
//! `InstanceRef` keeps the space in the type so the two can't be confused.

mod client;
mod server;

#[cfg(test)]
mod tests;

pub use client::ClientObject;
pub use server::ServerPin;

use crate::error::ProtocolError;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Safety-area clears whose retired transient ids are still reported as
/// stale; older ids are reported as unknown
pub const RETIRED_HORIZON: usize = 8;

/// Reference to an instance in one of the two id spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceRef {
    /// Host-owned object
    Client(i32),
    /// Native-owned object
    Server(i32),
}

impl InstanceRef {
    /// Rebuild from the `(id, isClientOwned)` pair used on the C ABI
    #[inline]
    pub const fn from_parts(id: i32, is_client_owned: bool) -> Self {
        if is_client_owned {
            Self::Client(id)
        } else {
            Self::Server(id)
        }
    }

    #[inline]
    pub const fn id(self) -> i32 {
        match self {
            Self::Client(id) | Self::Server(id) => id,
        }
    }

    #[inline]
    pub const fn is_client_owned(self) -> bool {
        matches!(self, Self::Client(_))
    }

    pub const fn space(self) -> &'static str {
        match self {
            Self::Client(_) => "client",
            Self::Server(_) => "server",
        }
    }
}

/// How long a server entry is valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifetime {
    /// Until the host releases it
    Owned,
    /// Until the safety area leaves `epoch`
    Transient { epoch: u64 },
}

struct ServerEntry {
    object: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    address: usize,
    pins: u32,
    lifetime: Lifetime,
}

/// Transient ids retired by one safety-area clear
struct RetiredBatch {
    /// `(id, issued epoch)`, sorted by id
    ids: Vec<(i32, u64)>,
}

/// Live server instance (for diagnostics)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInstanceInfo {
    pub id: i32,
    pub type_name: &'static str,
    pub pins: u32,
    pub transient: bool,
}

/// Registry for both instance spaces
pub struct InstanceRegistry {
    next_server_id: AtomicI32,
    server: DashMap<i32, ServerEntry>,
    /// Owned entries by object address, so one object keeps one id
    by_address: DashMap<usize, i32>,
    /// Transient ids retired by the last `RETIRED_HORIZON` clears
    retired: Mutex<VecDeque<RetiredBatch>>,
    /// Native reference count per client id
    client: DashMap<i32, u32>,
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self {
            next_server_id: AtomicI32::new(1),
            server: DashMap::new(),
            by_address: DashMap::new(),
            retired: Mutex::new(VecDeque::with_capacity(RETIRED_HORIZON)),
            client: DashMap::new(),
        }
    }

    /// Next server id; ids are never reused, so running out is fatal
    fn issue_id(&self) -> Result<i32, ProtocolError> {
        self.next_server_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| next.checked_add(1))
            .map_err(|_| ProtocolError::IdsExhausted {
                space: "server instance",
            })
    }

    #[cfg(test)]
    pub(crate) fn with_next_id(next: i32) -> Self {
        let registry = Self::new();
        registry.next_server_id.store(next, Ordering::Relaxed);
        registry
    }

    /// Snapshot of live server instances, ordered by id
    pub fn server_instances(&self) -> Vec<ServerInstanceInfo> {
        let mut infos: Vec<_> = self
            .server
            .iter()
            .map(|entry| ServerInstanceInfo {
                id: *entry.key(),
                type_name: entry.type_name,
                pins: entry.pins,
                transient: matches!(entry.lifetime, Lifetime::Transient { .. }),
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Snapshot of held client ids with their native reference counts
    pub fn client_instances(&self) -> Vec<(i32, u32)> {
        let mut ids: Vec<_> = self.client.iter().map(|e| (*e.key(), *e.value())).collect();
        ids.sort_unstable();
        ids
    }

    /// Forget everything (runtime shutdown)
    pub(crate) fn clear(&self) {
        self.server.clear();
        self.by_address.clear();
        self.retired.lock().clear();
        self.client.clear();
    }
}
