//! Name interning for type and signal names
//!
//! Maps strings to compact `Quark` ids so descriptor and connection lookups
//! key on an integer. Uses bidirectional hash maps for O(1) lookups in both
//! directions.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Global name interner
static INTERNER: Lazy<Interner> = Lazy::new(Interner::new);

/// Interned string id
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quark(u32);

impl Quark {
    /// Interned text
    pub fn as_str(self) -> Arc<str> {
        resolve(self).unwrap_or_else(|| Arc::from(""))
    }
}

impl fmt::Debug for Quark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quark({}: {:?})", self.0, self.as_str())
    }
}

impl fmt::Display for Quark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// Thread-safe string interning system
struct Interner {
    /// text → Quark mapping
    by_text: DashMap<Arc<str>, Quark>,
    /// Quark → text mapping
    by_id: DashMap<Quark, Arc<str>>,
    /// Next available id
    next_id: AtomicU32,
}

impl Interner {
    fn new() -> Self {
        Self {
            by_text: DashMap::with_capacity(512),
            by_id: DashMap::with_capacity(512),
            next_id: AtomicU32::new(1),
        }
    }

    fn intern(&self, text: &str) -> Quark {
        // Fast path: check if already interned
        if let Some(id) = self.by_text.get(text) {
            return *id;
        }

        // Slow path: the entry API keeps two racing threads on one id
        let key: Arc<str> = Arc::from(text);
        *self
            .by_text
            .entry(key.clone())
            .or_insert_with(|| {
                let id = Quark(self.next_id.fetch_add(1, Ordering::SeqCst));
                self.by_id.insert(id, key);
                id
            })
    }

    fn try_get(&self, text: &str) -> Option<Quark> {
        self.by_text.get(text).map(|id| *id)
    }

    fn resolve(&self, id: Quark) -> Option<Arc<str>> {
        self.by_id.get(&id).map(|text| text.clone())
    }

    fn len(&self) -> usize {
        self.by_text.len()
    }
}

/// Intern `text`, allocating an id on first use
pub fn intern(text: &str) -> Quark {
    INTERNER.intern(text)
}

/// Id for `text` without interning it
pub fn try_get(text: &str) -> Option<Quark> {
    INTERNER.try_get(text)
}

/// Text for an id
pub fn resolve(id: Quark) -> Option<Arc<str>> {
    INTERNER.resolve(id)
}

/// Number of interned strings
pub fn len() -> usize {
    INTERNER.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_same_text() {
        let a = intern("resized");
        let b = intern("resized");
        assert_eq!(a, b, "Same text should get same id");
        assert_eq!(&*a.as_str(), "resized");
    }

    #[test]
    fn test_try_get_does_not_intern() {
        assert_eq!(try_get("never-interned-name-7f3a"), None);
        let q = intern("interned-once-7f3a");
        assert_eq!(try_get("interned-once-7f3a"), Some(q));
    }

    #[test]
    fn test_concurrent_intern() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| intern("contended-name")))
            .collect();
        let ids: Vec<Quark> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }
}
