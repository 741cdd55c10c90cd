//! Server instances - native objects lent to the host

use super::{InstanceRegistry, Lifetime, RetiredBatch, ServerEntry, RETIRED_HORIZON};
use crate::error::ProtocolError;
use core::ops::Deref;
use std::any::Any;
use std::sync::Arc;
use tracing::trace;

#[inline]
fn address_of<T: ?Sized>(object: &Arc<T>) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

impl InstanceRegistry {
    /// Register a native object for the host, reusing its id if it is
    /// already registered
    pub fn register_server<T: Any + Send + Sync>(&self, object: Arc<T>) -> Result<i32, ProtocolError> {
        let address = address_of(&object);
        if let Some(id) = self.by_address.get(&address) {
            return Ok(*id);
        }

        let id = self.issue_id()?;
        self.server.insert(
            id,
            ServerEntry {
                object,
                type_name: std::any::type_name::<T>(),
                address,
                pins: 0,
                lifetime: Lifetime::Owned,
            },
        );
        self.by_address.insert(address, id);
        trace!(event = "server_instance_registered", id, type_name = std::any::type_name::<T>());
        Ok(id)
    }

    /// Register an object valid only until the safety area leaves `epoch`
    pub fn register_transient<T: Any + Send + Sync>(&self, object: Arc<T>, epoch: u64) -> Result<i32, ProtocolError> {
        let id = self.issue_id()?;
        self.server.insert(
            id,
            ServerEntry {
                address: address_of(&object),
                object,
                type_name: std::any::type_name::<T>(),
                pins: 0,
                lifetime: Lifetime::Transient { epoch },
            },
        );
        trace!(event = "transient_instance_registered", id, epoch);
        Ok(id)
    }

    /// Epoch of a transient id retired by a recent clear
    fn retired_epoch(&self, id: i32) -> Option<u64> {
        self.retired
            .lock()
            .iter()
            .find_map(|batch| {
                batch
                    .ids
                    .binary_search_by_key(&id, |&(retired, _)| retired)
                    .ok()
                    .map(|index| batch.ids[index].1)
            })
    }

    fn missing(&self, id: i32) -> ProtocolError {
        match self.retired_epoch(id) {
            Some(issued_epoch) => ProtocolError::StaleInstance { id, issued_epoch },
            None => ProtocolError::UnknownServerInstance { id },
        }
    }

    /// Borrow a server object for the duration of a call
    ///
    /// The entry is pinned until the returned guard drops; releasing a
    /// pinned entry is a protocol error.
    pub fn pin<T: Any + Send + Sync>(&self, id: i32) -> Result<ServerPin<'_, T>, ProtocolError> {
        let mut entry = self.server.get_mut(&id).ok_or_else(|| self.missing(id))?;
        let object = entry
            .object
            .clone()
            .downcast::<T>()
            .map_err(|_| ProtocolError::InstanceTypeMismatch {
                id,
                expected: std::any::type_name::<T>(),
                found: entry.type_name,
            })?;
        entry.pins += 1;
        Ok(ServerPin {
            registry: self,
            id,
            object,
        })
    }

    fn unpin(&self, id: i32) {
        if let Some(mut entry) = self.server.get_mut(&id) {
            entry.pins = entry.pins.saturating_sub(1);
        }
    }

    /// Drop the registry's reference once the host holds no more
    pub fn release_server(&self, id: i32) -> Result<(), ProtocolError> {
        {
            let entry = self.server.get(&id).ok_or_else(|| match self.retired_epoch(id) {
                Some(issued_epoch) => ProtocolError::StaleInstance { id, issued_epoch },
                None => ProtocolError::DoubleRelease {
                    space: "server instance",
                    id,
                },
            })?;
            if entry.pins > 0 {
                return Err(ProtocolError::InstanceInUse {
                    id,
                    pins: entry.pins,
                });
            }
        }

        if let Some((_, entry)) = self.server.remove(&id) {
            if entry.lifetime == Lifetime::Owned {
                self.by_address.remove(&entry.address);
            }
        }
        trace!(event = "server_instance_released", id);
        Ok(())
    }

    /// Retire transient entries from epochs before `current_epoch`
    ///
    /// Returns how many were dropped. Their ids stay recognizable as stale
    /// for the next `RETIRED_HORIZON` clears.
    pub(crate) fn expire_transients(&self, current_epoch: u64) -> usize {
        let mut stale: Vec<(i32, u64)> = self
            .server
            .iter()
            .filter_map(|entry| match entry.lifetime {
                Lifetime::Transient { epoch } if epoch < current_epoch => Some((*entry.key(), epoch)),
                _ => None,
            })
            .collect();
        for (id, _) in &stale {
            self.server.remove(id);
        }
        let count = stale.len();

        let mut retired = self.retired.lock();
        if !stale.is_empty() {
            stale.sort_unstable();
            retired.push_back(RetiredBatch { ids: stale });
        }
        while retired.len() > RETIRED_HORIZON {
            retired.pop_front();
        }
        count
    }

    /// Retired transient ids still tracked as stale
    pub fn retired_count(&self) -> usize {
        self.retired.lock().iter().map(|batch| batch.ids.len()).sum()
    }

    pub fn server_count(&self) -> usize {
        self.server.len()
    }
}

/// A server object pinned for the current call
pub struct ServerPin<'a, T> {
    registry: &'a InstanceRegistry,
    id: i32,
    object: Arc<T>,
}

impl<T> ServerPin<'_, T> {
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Keep the object beyond the call; the id stays owned by the registry
    pub fn to_arc(&self) -> Arc<T> {
        self.object.clone()
    }
}

impl<T> Deref for ServerPin<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T> Drop for ServerPin<'_, T> {
    fn drop(&mut self) {
        self.registry.unpin(self.id);
    }
}
