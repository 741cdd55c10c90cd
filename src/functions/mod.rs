//! Function indirection table - callables passed across the boundary by id
//!
//! - Client functions: host callables. The host picks the id; native code
//!   counts its references and asks the host to run or forget the callable.
//! - Server functions: native closures handed to the host. Ids are issued
//!   here and map to boxed closures, never to function addresses.


use crate::error::ProtocolError;
use crate::registry::ExceptionRef;
use crate::runtime::{NativeFn, Runtime, RuntimeInner};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Weak;
use tracing::trace;

/// Id of a host callable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClientFuncId(pub i32);

/// Id of a native callable lent to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ServerFuncId(pub i32);

/// Id tables for both directions
pub struct FunctionTable {
    next_server_id: AtomicI32,
    server: DashMap<i32, NativeFn>,
    client: DashMap<i32, u32>,
}

impl Default for FunctionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionTable {
    pub fn new() -> Self {
        Self {
            next_server_id: AtomicI32::new(1),
            server: DashMap::new(),
            client: DashMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_next_id(next: i32) -> Self {
        let table = Self::new();
        table.next_server_id.store(next, Ordering::Relaxed);
        table
    }

    /// Store a native callable under a fresh id; ids are never reused, so
    /// running out is an error
    pub fn register_server(&self, entry: NativeFn) -> Result<ServerFuncId, ProtocolError> {
        let id = self
            .next_server_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| next.checked_add(1))
            .map_err(|_| ProtocolError::IdsExhausted {
                space: "server function",
            })?;
        self.server.insert(id, entry);
        trace!(event = "server_func_registered", id);
        Ok(ServerFuncId(id))
    }

    pub fn server(&self, id: ServerFuncId) -> Result<NativeFn, ProtocolError> {
        self.server
            .get(&id.0)
            .map(|entry| entry.value().clone())
            .ok_or(ProtocolError::UnknownServerFunc { id: id.0 })
    }

    pub fn release_server(&self, id: ServerFuncId) -> Result<(), ProtocolError> {
        if self.server.remove(&id.0).is_some() {
            trace!(event = "server_func_released", id = id.0);
            return Ok(());
        }

        // an id this table issued earlier has already been released
        if id.0 >= 1 && id.0 < self.next_server_id.load(Ordering::Relaxed) {
            Err(ProtocolError::DoubleRelease {
                space: "server function",
                id: id.0,
            })
        } else {
            Err(ProtocolError::UnknownServerFunc { id: id.0 })
        }
    }

    pub fn retain_client(&self, id: ClientFuncId) -> u32 {
        let mut count = self.client.entry(id.0).or_insert(0);
        *count += 1;
        *count
    }

    /// Drop one native reference; `true` when it was the last
    pub fn release_client(&self, id: ClientFuncId) -> Result<bool, ProtocolError> {
        let remaining = {
            let mut count = self
                .client
                .get_mut(&id.0)
                .ok_or(ProtocolError::DoubleRelease {
                    space: "client function",
                    id: id.0,
                })?;
            *count -= 1;
            *count
        };

        if remaining == 0 {
            self.client.remove(&id.0);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn server_ids(&self) -> Vec<ServerFuncId> {
        let mut ids: Vec<_> = self.server.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids.into_iter().map(ServerFuncId).collect()
    }

    pub fn client_ids(&self) -> Vec<(ClientFuncId, u32)> {
        let mut ids: Vec<_> = self.client.iter().map(|e| (*e.key(), *e.value())).collect();
        ids.sort_unstable();
        ids.into_iter().map(|(id, refs)| (ClientFuncId(id), refs)).collect()
    }

    pub(crate) fn clear(&self) {
        self.server.clear();
        self.client.clear();
    }
}

/// Native reference to a host callable
///
/// Clones share the host callable and each counts as one reference; the
/// host hears `clientFuncRelease` after the last one drops.
pub struct ClientFunc {
    id: ClientFuncId,
    runtime: Weak<RuntimeInner>,
    generation: u64,
}

impl ClientFunc {
    pub(crate) fn adopt(runtime: &Runtime, id: ClientFuncId) -> Self {
        Self {
            id,
            runtime: runtime.downgrade(),
            generation: runtime.generation(),
        }
    }

    #[inline]
    pub fn id(&self) -> ClientFuncId {
        self.id
    }

    /// Run the host callable and wait for it to finish
    ///
    /// Arguments go on the stack first; results are on the stack afterwards.
    pub fn exec(&self) {
        match Runtime::upgrade(&self.runtime, self.generation) {
            Some(rt) => rt.exec_client_func(self.id),
            None => Runtime::fatal_detached(ProtocolError::NotInitialized),
        }
    }

    /// `exec`, then drain whatever exception the host callable raised
    pub fn exec_with_exceptions(&self) -> Option<ExceptionRef> {
        match Runtime::upgrade(&self.runtime, self.generation) {
            Some(rt) => {
                rt.exec_client_func(self.id);
                rt.take_exception()
            }
            None => Runtime::fatal_detached(ProtocolError::NotInitialized),
        }
    }
}

impl Clone for ClientFunc {
    fn clone(&self) -> Self {
        if let Some(rt) = Runtime::upgrade(&self.runtime, self.generation) {
            rt.functions().retain_client(self.id);
        }
        Self {
            id: self.id,
            runtime: self.runtime.clone(),
            generation: self.generation,
        }
    }
}

impl Drop for ClientFunc {
    fn drop(&mut self) {
        if let Some(rt) = Runtime::upgrade(&self.runtime, self.generation) {
            rt.release_client_func(self.id);
        }
    }
}

impl std::fmt::Debug for ClientFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClientFunc").field(&self.id.0).finish()
    }
}
