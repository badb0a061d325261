//! Fixed-capacity arena allocator with ref-counted shared/weak handles.
//!
//! The pool amortizes per-cycle allocation of short-lived simulation objects:
//! cells are recycled through a LIFO free list instead of calling the system
//! allocator per object. A cell whose strong count has reached zero but whose
//! weak count has not is a *zombie*: the stored value is dropped immediately
//! but the slot stays occupied so outstanding weak handles keep resolving to
//! the same identity until the last one goes away.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use slab::Slab;

use tickgraph_common::KernelError;

struct Cell<T> {
    value: Option<T>,
    strong: u32,
    weak: u32,
}

type OverflowHook = Box<dyn FnMut(usize, usize)>;
type WatermarkHook = Box<dyn FnMut(usize)>;

struct Inner<T> {
    slots: Slab<Cell<T>>,
    max_blocks: usize,
    watermark: usize,
    watermark_fired: bool,
    overflow_hook: Option<OverflowHook>,
    watermark_hook: Option<WatermarkHook>,
}

impl<T> Inner<T> {
    fn release_strong(&mut self, idx: usize) {
        let remove = {
            let cell = &mut self.slots[idx];
            debug_assert!(cell.strong > 0);
            cell.strong -= 1;
            if cell.strong == 0 {
                cell.value = None;
            }
            cell.strong == 0 && cell.weak == 0
        };
        if remove {
            self.slots.remove(idx);
        }
    }

    fn release_weak(&mut self, idx: usize) {
        let remove = {
            let cell = &mut self.slots[idx];
            debug_assert!(cell.weak > 0);
            cell.weak -= 1;
            cell.weak == 0 && cell.strong == 0
        };
        if remove {
            self.slots.remove(idx);
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if !self.slots.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                outstanding = self.slots.len(),
                "arena pool dropped with outstanding handles"
            );
        }
    }
}

/// A fixed-capacity object pool. Cloning an `ArenaPool` shares the same
/// backing storage; the pool itself has no identity beyond that storage.
pub struct ArenaPool<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for ArenaPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for ArenaPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArenaPool")
            .field("num_live", &self.num_live())
            .field("num_allocated", &self.num_allocated())
            .finish()
    }
}

impl<T> ArenaPool<T> {
    /// Construct a pool with a fixed maximum live-object count and a soft
    /// watermark. Fails with `KernelError::Config` when `watermark >
    /// max_blocks`.
    pub fn construct(max_blocks: usize, watermark: usize) -> Result<Self, KernelError> {
        if watermark > max_blocks {
            return Err(KernelError::config(format!(
                "watermark {watermark} exceeds max_blocks {max_blocks}"
            )));
        }
        Ok(Self {
            inner: Rc::new(RefCell::new(Inner {
                slots: Slab::with_capacity(max_blocks),
                max_blocks,
                watermark,
                watermark_fired: false,
                overflow_hook: None,
                watermark_hook: None,
            })),
        })
    }

    /// Install a callback invoked once, the first time the live count
    /// crosses the watermark in this pool's lifetime.
    pub fn on_watermark(&self, hook: impl FnMut(usize) + 'static) {
        self.inner.borrow_mut().watermark_hook = Some(Box::new(hook));
    }

    /// Install a callback invoked every time an allocation would exceed
    /// `max_blocks`, before `OutOfCapacity` is returned.
    pub fn on_overflow(&self, hook: impl FnMut(usize, usize) + 'static) {
        self.inner.borrow_mut().overflow_hook = Some(Box::new(hook));
    }

    /// Construct `value` in the next free cell and return a shared handle
    /// to it.
    pub fn allocate(&self, value: T) -> Result<SharedHandle<T>, KernelError> {
        let mut inner = self.inner.borrow_mut();
        if inner.slots.len() >= inner.max_blocks {
            let live = inner.slots.len();
            let max = inner.max_blocks;
            if let Some(hook) = inner.overflow_hook.as_mut() {
                hook(live, max);
            }
            return Err(KernelError::OutOfCapacity { live, max });
        }
        let idx = inner.slots.insert(Cell {
            value: Some(value),
            strong: 1,
            weak: 0,
        });
        let live = inner.slots.len();
        if !inner.watermark_fired && live >= inner.watermark {
            inner.watermark_fired = true;
            if let Some(hook) = inner.watermark_hook.as_mut() {
                hook(live);
            }
        }
        drop(inner);
        Ok(SharedHandle {
            inner: self.inner.clone(),
            idx,
        })
    }

    /// Number of cells currently free for reuse.
    pub fn num_free(&self) -> usize {
        self.num_allocated() - self.num_live()
    }

    /// Number of cells currently occupied (live objects plus zombies).
    pub fn num_live(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    /// Total storage slots the pool has backed at any point (live + free).
    pub fn num_allocated(&self) -> usize {
        self.inner.borrow().slots.capacity()
    }

    /// True iff at least one object is currently live or zombied.
    pub fn has_outstanding(&self) -> bool {
        self.num_live() > 0
    }

    /// Invoke `f` once for every value still held live by the pool. Zombie
    /// cells (value already dropped) are skipped.
    pub fn for_each_live(&self, mut f: impl FnMut(&T)) {
        let inner = self.inner.borrow();
        for (_, cell) in inner.slots.iter() {
            if let Some(value) = &cell.value {
                f(value);
            }
        }
    }
}

/// A strong, ref-counted handle into an [`ArenaPool`] cell.
pub struct SharedHandle<T> {
    inner: Rc<RefCell<Inner<T>>>,
    idx: usize,
}

impl<T> SharedHandle<T> {
    /// Number of outstanding shared handles to this cell.
    pub fn use_count(&self) -> u32 {
        self.inner.borrow().slots[self.idx].strong
    }

    /// Construct a non-owning [`WeakHandle`] to the same cell.
    pub fn downgrade(&self) -> WeakHandle<T> {
        self.inner.borrow_mut().slots[self.idx].weak += 1;
        WeakHandle {
            inner: self.inner.clone(),
            idx: self.idx,
        }
    }

    /// Raw identity of the backing cell, stable across clones of this
    /// handle. Used for pointer-style equality.
    pub fn cell_id(&self) -> usize {
        self.idx
    }

    /// Release this handle early, decrementing the strong count
    /// immediately rather than waiting for drop.
    pub fn reset(self) {
        drop(self)
    }

    /// Borrow the underlying value. Panics if another borrow of the same
    /// pool is already mutably held, per `RefCell`'s usual dynamic check.
    pub fn borrow(&self) -> CellRef<'_, T> {
        CellRef(std::cell::Ref::map(self.inner.borrow(), |inner| {
            inner.slots[self.idx]
                .value
                .as_ref()
                .expect("live shared handle always has a value")
        }))
    }
}

impl<T> Clone for SharedHandle<T> {
    fn clone(&self) -> Self {
        self.inner.borrow_mut().slots[self.idx].strong += 1;
        Self {
            inner: self.inner.clone(),
            idx: self.idx,
        }
    }
}

impl<T> Drop for SharedHandle<T> {
    fn drop(&mut self) {
        self.inner.borrow_mut().release_strong(self.idx);
    }
}

impl<T> PartialEq for SharedHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner) && self.idx == other.idx
    }
}

impl<T> Eq for SharedHandle<T> {}

impl<T: fmt::Debug> fmt::Debug for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedHandle").field(&*self.borrow()).finish()
    }
}

/// A runtime-checked borrow of a cell's value, returned by
/// [`SharedHandle::borrow`]. Keeps the pool's internal `RefCell` borrowed
/// for as long as it is alive, so a concurrent `allocate`/`release` on the
/// same pool panics rather than racing with it.
pub struct CellRef<'a, T>(std::cell::Ref<'a, T>);

impl<'a, T> std::ops::Deref for CellRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// A weak, non-owning reference into an [`ArenaPool`] cell.
pub struct WeakHandle<T> {
    inner: Rc<RefCell<Inner<T>>>,
    idx: usize,
}

impl<T> WeakHandle<T> {
    /// True iff every shared handle to the same cell has been released.
    pub fn expired(&self) -> bool {
        self.inner.borrow().slots[self.idx].strong == 0
    }

    /// Current strong count, or 0 if expired.
    pub fn use_count(&self) -> u32 {
        self.inner.borrow().slots[self.idx].strong
    }

    /// Promote to a shared handle if the cell is still live.
    pub fn lock(&self) -> Option<SharedHandle<T>> {
        let mut inner = self.inner.borrow_mut();
        let cell = &mut inner.slots[self.idx];
        if cell.strong == 0 {
            return None;
        }
        cell.strong += 1;
        drop(inner);
        Some(SharedHandle {
            inner: self.inner.clone(),
            idx: self.idx,
        })
    }
}

impl<T> Clone for WeakHandle<T> {
    fn clone(&self) -> Self {
        self.inner.borrow_mut().slots[self.idx].weak += 1;
        Self {
            inner: self.inner.clone(),
            idx: self.idx,
        }
    }
}

impl<T> Drop for WeakHandle<T> {
    fn drop(&mut self) {
        self.inner.borrow_mut().release_weak(self.idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_release_recycles_cell() {
        let pool: ArenaPool<u32> = ArenaPool::construct(4, 3).unwrap();
        let a = pool.allocate(1).unwrap();
        assert_eq!(pool.num_live(), 1);
        drop(a);
        assert_eq!(pool.num_live(), 0);
        let _b = pool.allocate(2).unwrap();
        assert_eq!(pool.num_live(), 1);
    }

    #[test]
    fn watermark_fires_exactly_once() {
        let pool: ArenaPool<u32> = ArenaPool::construct(4, 3).unwrap();
        let fired = Rc::new(RefCell::new(0));
        let fired2 = fired.clone();
        pool.on_watermark(move |_live| *fired2.borrow_mut() += 1);

        let a = pool.allocate(1).unwrap();
        let b = pool.allocate(2).unwrap();
        let c = pool.allocate(3).unwrap();
        assert_eq!(*fired.borrow(), 1);

        drop(c);
        let _d = pool.allocate(4).unwrap();
        assert_eq!(*fired.borrow(), 1, "watermark must not refire");
        drop(a);
        drop(b);
    }

    #[test]
    fn overflow_invokes_hook_then_errors() {
        let pool: ArenaPool<u32> = ArenaPool::construct(1, 1).unwrap();
        let called = Rc::new(RefCell::new(false));
        let called2 = called.clone();
        pool.on_overflow(move |_live, _max| *called2.borrow_mut() = true);

        let _a = pool.allocate(1).unwrap();
        let err = pool.allocate(2).unwrap_err();
        assert!(matches!(err, KernelError::OutOfCapacity { live: 1, max: 1 }));
        assert!(*called.borrow());
    }

    #[test]
    fn weak_liveness_matches_strong_release() {
        let pool: ArenaPool<u32> = ArenaPool::construct(4, 4).unwrap();
        let s = pool.allocate(42).unwrap();
        let w = s.downgrade();
        assert!(!w.expired());
        assert_eq!(w.lock().map(|h| *h.borrow()), Some(42));

        drop(s);
        assert!(w.expired());
        assert!(w.lock().is_none());
    }

    #[test]
    fn zombie_cell_keeps_slot_until_weak_drops() {
        let pool: ArenaPool<u32> = ArenaPool::construct(4, 4).unwrap();
        let s = pool.allocate(1).unwrap();
        let w = s.downgrade();
        drop(s);
        // strong=0, weak=1: cell stays occupied (zombie).
        assert_eq!(pool.num_live(), 1);
        drop(w);
        assert_eq!(pool.num_live(), 0);
    }

    #[test]
    fn accounting_invariant_holds() {
        let pool: ArenaPool<u32> = ArenaPool::construct(4, 4).unwrap();
        let a = pool.allocate(1).unwrap();
        let _b = pool.allocate(2).unwrap();
        drop(a);
        let _c = pool.allocate(3).unwrap();
        assert_eq!(pool.num_free() + pool.num_live(), pool.num_allocated());
        assert_eq!(pool.has_outstanding(), pool.num_live() > 0);
    }
}
