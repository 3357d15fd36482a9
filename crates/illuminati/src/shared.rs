//! Single threaded shared values.
//!
//! Everything in illuminati runs on one thread (the page's event loop), so
//! sharing is `Rc<RefCell<T>>` rather than `Arc<RwLock<T>>`.

use std::{
    cell::{Ref, RefCell, RefMut},
    rc::{Rc, Weak},
};

/// A "shared" value.
///
/// Equivalent to `Rc<RefCell<T>>`. Equality of two `Shared` handles is
/// pointer identity, see [`Shared::ptr_eq`].
#[derive(Default)]
pub struct Shared<T> {
    inner: Rc<RefCell<T>>,
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> From<T> for Shared<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> Shared<T> {
    /// Create a new shared `T`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(value)),
        }
    }

    /// Get a reference to the inner `T`.
    ///
    /// ## Panics
    /// Panics if the value is currently borrowed mutably.
    pub fn get(&self) -> Ref<'_, T> {
        self.inner.borrow()
    }

    /// Get a mutable reference to the inner `T`.
    ///
    /// ## Panics
    /// Panics if the value is currently borrowed.
    pub fn get_mut(&self) -> RefMut<'_, T> {
        self.inner.borrow_mut()
    }

    /// Set the inner `T`.
    ///
    /// Returns the previous value.
    pub fn set(&self, value: T) -> T {
        self.inner.replace(value)
    }

    /// Whether both handles point at the same value.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakShared<T> {
        WeakShared {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

/// A non-owning handle to a [`Shared`] value.
pub struct WeakShared<T> {
    inner: Weak<RefCell<T>>,
}

impl<T> Clone for WeakShared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> WeakShared<T> {
    pub fn upgrade(&self) -> Option<Shared<T>> {
        self.inner.upgrade().map(|inner| Shared { inner })
    }
}
