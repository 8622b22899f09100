//! Interned strings: immutable, content-hashed, compared by pointer.

use std::rc::Rc;

use crate::table::{hash_bytes, Table};

/// A heap-allocated string. Once interned, its content never changes and
/// every occurrence of the same bytes shares one `Rc<XString>` — so `Value`
/// equality on strings is a pointer compare, never a byte compare.
#[derive(Debug, Eq)]
pub struct XString {
    pub value: String,
    pub hash: u64,
}

impl PartialEq for XString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl std::ops::Deref for XString {
    type Target = str;
    fn deref(&self) -> &str {
        &self.value
    }
}

/// The VM's string intern pool. All string literals and runtime-built
/// strings (concatenation results, etc.) pass through here.
pub struct Strings {
    table: Table<Rc<XString>>,
}

impl Strings {
    pub fn new() -> Self {
        Self {
            table: Table::new(),
        }
    }

    /// Intern `text`, allocating a new `XString` only on first occurrence.
    pub fn intern(&mut self, text: &str) -> Rc<XString> {
        let hash = hash_bytes(text.as_bytes());
        if let Some(existing) = self.table.find_by_content(text, hash) {
            return existing;
        }
        let interned = Rc::new(XString {
            value: text.to_owned(),
            hash,
        });
        self.table.insert_interned(interned.clone(), hash);
        interned
    }
}

impl Default for Strings {
    fn default() -> Self {
        Self::new()
    }
}
