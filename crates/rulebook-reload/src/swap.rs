use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A shared value replaced wholesale.
///
/// Readers take an `Arc` to the current generation and keep using it for as
/// long as they like; [`SwapCell::store`] publishes a fully built successor
/// without disturbing them.
#[derive(Debug)]
pub struct SwapCell<T> {
    current: RwLock<Arc<T>>,
    generation: AtomicU64,
}

impl<T> SwapCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
            generation: AtomicU64::new(0),
        }
    }

    /// The current generation.
    pub fn load(&self) -> Arc<T> {
        self.current.read().expect("swap cell lock poisoned").clone()
    }

    /// Publish `value`, returning the generation it replaced.
    pub fn store(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        let previous = {
            let mut current = self.current.write().expect("swap cell lock poisoned");
            std::mem::replace(&mut *current, next)
        };
        self.generation.fetch_add(1, Ordering::AcqRel);
        previous
    }

    /// Number of values published since construction.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl<T: Default> Default for SwapCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_keep_their_generation() {
        let cell = SwapCell::new(vec![1, 2, 3]);
        let before = cell.load();
        let replaced = cell.store(vec![4]);

        assert_eq!(*before, vec![1, 2, 3]);
        assert!(Arc::ptr_eq(&before, &replaced));
        assert_eq!(*cell.load(), vec![4]);
        assert_eq!(cell.generation(), 1);
    }
}
