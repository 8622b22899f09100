//! Generic open-addressing hash map used for the globals table and the
//! string intern table (§3.3, §3.8 of the core spec).
//!
//! Modeled after the classic clox `Table`: linear probing, tombstones for
//! deletion, grow-and-rehash at a 3/4 load factor. Keys are always interned
//! strings, compared by content once (on insertion / lookup miss) and by
//! pointer identity afterwards (`Rc::ptr_eq`), matching the "pointer
//! equality iff content equality" guarantee the string pool provides.

use std::hash::Hasher;
use std::rc::Rc;

use ahash::AHasher;

use crate::object::string::XString;

const INITIAL_CAPACITY: usize = 8;
const MAX_LOAD: f64 = 0.75;

#[derive(Clone)]
struct Entry<V> {
    key: Option<Rc<XString>>,
    value: Option<V>,
}

impl<V> Entry<V> {
    fn empty() -> Self {
        Self {
            key: None,
            value: None,
        }
    }

    /// A tombstone: a deleted slot that must still terminate probe chains.
    fn is_tombstone(&self) -> bool {
        self.key.is_none() && self.value.is_some()
    }
}

/// An open-addressing hash table keyed by interned strings.
pub struct Table<V: Clone> {
    entries: Vec<Entry<V>>,
    len: usize, // live entries, excluding tombstones
}

impl<V: Clone> Table<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &Rc<XString>) -> Option<&V> {
        if self.entries.is_empty() {
            return None;
        }
        let index = self.find_entry(key);
        self.entries[index].value.as_ref().filter(|_| self.entries[index].key.is_some())
    }

    pub fn contains_key(&self, key: &Rc<XString>) -> bool {
        self.get(key).is_some()
    }

    /// Insert, returning the previous value if the key was already present.
    pub fn insert(&mut self, key: Rc<XString>, value: V) -> Option<V> {
        if self.needs_growth() {
            self.grow();
        }
        let index = self.find_entry(&key);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none();
        let previous = if is_new && !entry.is_tombstone() {
            self.len += 1;
            None
        } else {
            entry.value.take()
        };
        entry.key = Some(key);
        entry.value = Some(value);
        previous
    }

    pub fn remove(&mut self, key: &Rc<XString>) -> Option<V> {
        if self.entries.is_empty() {
            return None;
        }
        let index = self.find_entry(key);
        let entry = &mut self.entries[index];
        if entry.key.is_none() {
            return None;
        }
        entry.key = None;
        // Leave value set as a tombstone marker so later probes don't stop early.
        self.len -= 1;
        entry.value.take()
    }

    fn needs_growth(&self) -> bool {
        self.entries.is_empty() || (self.len + 1) as f64 > self.entries.len() as f64 * MAX_LOAD
    }

    fn grow(&mut self) {
        let new_capacity = if self.entries.is_empty() {
            INITIAL_CAPACITY
        } else {
            self.entries.len() * 2
        };
        let old_entries = std::mem::replace(
            &mut self.entries,
            (0..new_capacity).map(|_| Entry::empty()).collect(),
        );
        self.len = 0;
        for entry in old_entries {
            if let (Some(key), Some(value)) = (entry.key, entry.value) {
                let index = self.find_entry(&key);
                self.entries[index] = Entry {
                    key: Some(key),
                    value: Some(value),
                };
                self.len += 1;
            }
        }
    }

    /// Linear-probe for `key`'s slot: an occupied slot with a matching key,
    /// or the first empty/tombstone slot found along the probe sequence.
    fn find_entry(&self, key: &Rc<XString>) -> usize {
        let capacity = self.entries.len();
        let mut index = (key.hash as usize) & (capacity - 1);
        let mut first_tombstone: Option<usize> = None;
        loop {
            let entry = &self.entries[index];
            match &entry.key {
                Some(k) if Rc::ptr_eq(k, key) || k.value == key.value => return index,
                None if entry.is_tombstone() => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(index);
                    }
                }
                None => return first_tombstone.unwrap_or(index),
                _ => {}
            }
            index = (index + 1) & (capacity - 1);
        }
    }
}

impl<V: Clone> Default for Table<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl Table<Rc<XString>> {
    /// Look up an interned string by raw content, before a candidate
    /// `Rc<XString>` exists to key the generic `find_entry` probe with.
    pub fn find_by_content(&self, text: &str, hash: u64) -> Option<Rc<XString>> {
        if self.entries.is_empty() {
            return None;
        }
        let capacity = self.entries.len();
        let mut index = (hash as usize) & (capacity - 1);
        loop {
            let entry = &self.entries[index];
            match &entry.key {
                Some(k) if k.value.as_str() == text => return Some(k.clone()),
                None if !entry.is_tombstone() => return None,
                _ => {}
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    /// Insert an already-constructed interned string as both key and value.
    pub fn insert_interned(&mut self, string: Rc<XString>, _hash: u64) {
        self.insert(string.clone(), string);
    }
}

/// Hash raw string bytes with a fixed-seed ahash, used both by the intern
/// table (to hash candidate content before a string object exists) and by
/// `XString::new` to precompute each interned string's hash.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = AHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::string::Strings;

    #[test]
    fn insert_and_get_roundtrip() {
        let mut strings = Strings::new();
        let mut table: Table<i64> = Table::new();
        let key = strings.intern("answer");
        table.insert(key.clone(), 42);
        assert_eq!(table.get(&key), Some(&42));
    }

    #[test]
    fn remove_then_reinsert() {
        let mut strings = Strings::new();
        let mut table: Table<i64> = Table::new();
        let key = strings.intern("x");
        table.insert(key.clone(), 1);
        assert_eq!(table.remove(&key), Some(1));
        assert_eq!(table.get(&key), None);
        table.insert(key.clone(), 2);
        assert_eq!(table.get(&key), Some(&2));
    }

    #[test]
    fn grows_past_load_factor() {
        let mut strings = Strings::new();
        let mut table: Table<i64> = Table::new();
        for i in 0..100 {
            let key = strings.intern(&format!("key{i}"));
            table.insert(key, i);
        }
        assert_eq!(table.len(), 100);
        for i in 0..100 {
            let key = strings.intern(&format!("key{i}"));
            assert_eq!(table.get(&key), Some(&i));
        }
    }
}
