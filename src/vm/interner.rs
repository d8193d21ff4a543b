// Oryx Name Interner
// Message and variable names are case-insensitive; they are upper-cased once
// and shared so dictionary keys compare and hash cheaply.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::{Arc, OnceLock};

pub struct Interner {
    pool: Mutex<FxHashSet<Arc<str>>>,
}

impl Interner {
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(FxHashSet::default()),
        }
    }

    pub fn global() -> &'static Self {
        static INTERNER: OnceLock<Interner> = OnceLock::new();
        INTERNER.get_or_init(Self::new)
    }

    /// Returns the pooled copy of `s`, adding it on first use.
    pub fn intern(&self, s: &str) -> Arc<str> {
        let mut pool = self.pool.lock();
        if let Some(interned) = pool.get(s) {
            return interned.clone();
        }

        let interned: Arc<str> = Arc::from(s);
        pool.insert(interned.clone());
        interned
    }

    pub fn len(&self) -> usize {
        self.pool.lock().len()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

pub fn intern(s: &str) -> Arc<str> {
    Interner::global().intern(s)
}

/// Upper-case and intern a message name
pub fn message_name(s: &str) -> Arc<str> {
    if s.bytes().any(|b| b.is_ascii_lowercase()) {
        intern(&s.to_ascii_uppercase())
    } else {
        intern(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_shares_storage() {
        let interner = Interner::new();
        let a = interner.intern("FOO");
        let b = interner.intern("FOO");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn test_message_name_upper_cases() {
        let a = message_name("setMethod");
        let b = message_name("SETMETHOD");
        assert_eq!(&*a, "SETMETHOD");
        assert!(Arc::ptr_eq(&a, &b));
    }
}
