//! Type-erased single-payload container.
//!
//! Conversion glue shuttles intermediate values through one uniform
//! signature; `CastBox` is the container that makes that possible. The
//! ownership contract is deliberately narrow: the payload lives directly
//! inside the box, the box owns it exclusively, and cloning the box
//! deep-clones the payload. The distinguished invalid (empty) box is the
//! failure signal for fallible wrapper conversions.

use std::any::Any;
use std::fmt;

use crate::{Error, Result};

trait Payload: Send {
    fn clone_payload(&self) -> Box<dyn Payload>;
    fn payload_addr(&self) -> *mut u8;
    fn as_any(&self) -> &dyn Any;
}

struct Slot<T>(T);

impl<T: Clone + Send + 'static> Payload for Slot<T> {
    fn clone_payload(&self) -> Box<dyn Payload> {
        Box::new(Slot(self.0.clone()))
    }

    fn payload_addr(&self) -> *mut u8 {
        &self.0 as *const T as *mut u8
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Owns exactly one type-erased value, or nothing at all.
pub struct CastBox {
    payload: Option<Box<dyn Payload>>,
}

impl CastBox {
    pub fn new<T: Clone + Send + 'static>(value: T) -> Self {
        Self {
            payload: Some(Box::new(Slot(value))),
        }
    }

    /// The empty box: no payload, null address, fails `is_valid`.
    pub fn invalid() -> Self {
        Self { payload: None }
    }

    pub fn is_valid(&self) -> bool {
        self.payload.is_some()
    }

    /// Address of the owned payload; null for the invalid box.
    ///
    /// The pointer stays valid for as long as the box does and must not be
    /// written through.
    pub fn addr(&self) -> *mut u8 {
        match &self.payload {
            Some(p) => p.payload_addr(),
            None => std::ptr::null_mut(),
        }
    }

    /// Borrow the payload as `T`, if that is what the box holds.
    pub fn downcast_ref<T: Clone + Send + 'static>(&self) -> Option<&T> {
        self.payload
            .as_ref()?
            .as_any()
            .downcast_ref::<Slot<T>>()
            .map(|slot| &slot.0)
    }

    /// Like [`downcast_ref`](Self::downcast_ref), but an empty box or a
    /// payload of the wrong type is an error.
    pub fn try_ref<T: Clone + Send + 'static>(&self) -> Result<&T> {
        self.downcast_ref::<T>().ok_or(Error::PayloadMismatch {
            expected: std::any::type_name::<T>(),
        })
    }
}

impl Clone for CastBox {
    /// Deep clone: the copy owns its own payload.
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.as_ref().map(|p| p.clone_payload()),
        }
    }
}

impl Default for CastBox {
    fn default() -> Self {
        Self::invalid()
    }
}

impl fmt::Debug for CastBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "CastBox(valid @ {:p})", self.addr())
        } else {
            write!(f, "CastBox(invalid)")
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_box() {
        let b = CastBox::new(42u64);
        assert!(b.is_valid());
        assert!(!b.addr().is_null());
        assert_eq!(b.downcast_ref::<u64>(), Some(&42));
    }

    #[test]
    fn test_invalid_box() {
        let b = CastBox::invalid();
        assert!(!b.is_valid());
        assert!(b.addr().is_null());
        assert_eq!(b.downcast_ref::<u64>(), None);
    }

    #[test]
    fn test_wrong_type_downcast() {
        let b = CastBox::new(42u64);
        assert_eq!(b.downcast_ref::<i32>(), None);
        assert!(b.try_ref::<i32>().is_err());
        assert_eq!(*b.try_ref::<u64>().unwrap(), 42);
    }

    #[test]
    fn test_clone_is_deep() {
        let a = CastBox::new(String::from("payload"));
        let b = a.clone();

        assert_eq!(a.downcast_ref::<String>(), b.downcast_ref::<String>());
        // Distinct payloads, not a shared allocation.
        assert_ne!(a.addr(), b.addr());
    }

    #[test]
    fn test_clone_of_invalid_stays_invalid() {
        let a = CastBox::invalid();
        assert!(!a.clone().is_valid());
    }

    #[test]
    fn test_addr_points_at_payload() {
        let b = CastBox::new(0xABCDu16);
        let read = unsafe { *(b.addr() as *const u16) };
        assert_eq!(read, 0xABCD);
    }
}
