//! Safety area - call-scoped storage for transient values
//!
//! Values stashed here (decoded string buffers, transient objects) live
//! until the next clear. Each clear advances the epoch; handles carry the
//! epoch they were issued in, so a handle kept past a clear is detected
//! instead of reading whatever took its slot.

use crate::error::ProtocolError;
use parking_lot::Mutex;
use std::any::Any;

/// Reference to a value stashed in the safety area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientHandle {
    slot: usize,
    epoch: u64,
}

impl TransientHandle {
    pub fn epoch(self) -> u64 {
        self.epoch
    }
}

#[derive(Default)]
struct Area {
    epoch: u64,
    slots: Vec<Box<dyn Any + Send>>,
}

#[derive(Default)]
pub struct SafetyArea {
    area: Mutex<Area>,
}

impl SafetyArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stash<T: Any + Send>(&self, value: T) -> TransientHandle {
        let mut area = self.area.lock();
        area.slots.push(Box::new(value));
        TransientHandle {
            slot: area.slots.len() - 1,
            epoch: area.epoch,
        }
    }

    /// Stash a byte buffer and return where its contents live
    ///
    /// The pointer stays valid until the next `clear`.
    pub fn stash_bytes(&self, bytes: Vec<u8>) -> (TransientHandle, *const u8, usize) {
        let ptr = bytes.as_ptr();
        let len = bytes.len();
        // moving the Vec into a box leaves its heap buffer in place
        (self.stash(bytes), ptr, len)
    }

    /// Run `f` on a stashed value
    pub fn with<T: Any, R>(&self, handle: TransientHandle, f: impl FnOnce(&T) -> R) -> Result<R, ProtocolError> {
        let area = self.area.lock();
        if handle.epoch != area.epoch {
            return Err(ProtocolError::StaleTransient {
                issued_epoch: handle.epoch,
                current_epoch: area.epoch,
            });
        }
        let value = area
            .slots
            .get(handle.slot)
            .and_then(|slot| slot.downcast_ref::<T>())
            .ok_or(ProtocolError::TransientTypeMismatch {
                expected: std::any::type_name::<T>(),
            })?;
        Ok(f(value))
    }

    /// Drop every stashed value and start a new epoch
    pub fn clear(&self) -> u64 {
        let dropped = {
            let mut area = self.area.lock();
            area.epoch += 1;
            std::mem::take(&mut area.slots)
        };
        // values drop outside the lock
        drop(dropped);
        self.epoch()
    }

    pub fn epoch(&self) -> u64 {
        self.area.lock().epoch
    }

    pub fn len(&self) -> usize {
        self.area.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SafetyArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let area = self.area.lock();
        f.debug_struct("SafetyArea")
            .field("epoch", &area.epoch)
            .field("slots", &area.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stash_and_read() {
        let area = SafetyArea::new();
        let handle = area.stash(String::from("transient"));
        assert_eq!(area.with(handle, |s: &String| s.len()), Ok(9));
        assert_eq!(area.len(), 1);
    }

    #[test]
    fn test_stale_handle_is_detected() {
        let area = SafetyArea::new();
        let handle = area.stash(42_i32);
        assert_eq!(area.clear(), 1);

        // a new value in the same slot must not be visible through the old handle
        let fresh = area.stash(7_i32);
        assert_eq!(
            area.with(handle, |v: &i32| *v),
            Err(ProtocolError::StaleTransient {
                issued_epoch: 0,
                current_epoch: 1
            })
        );
        assert_eq!(area.with(fresh, |v: &i32| *v), Ok(7));
    }

    #[test]
    fn test_wrong_type() {
        let area = SafetyArea::new();
        let handle = area.stash(1_u8);
        assert!(matches!(
            area.with(handle, |_: &String| ()),
            Err(ProtocolError::TransientTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_stashed_bytes_stay_put() {
        let area = SafetyArea::new();
        let (handle, ptr, len) = area.stash_bytes(b"hello".to_vec());
        for i in 0..32 {
            area.stash(i);
        }
        let read = unsafe { std::slice::from_raw_parts(ptr, len) };
        assert_eq!(read, b"hello");
        assert_eq!(area.with(handle, |v: &Vec<u8>| v.len()), Ok(5));

        area.clear();
        assert!(area.is_empty());
    }
}
