//! SK-011: Variable store.
//!
//! `{name}` holds at most one value, `{name::*}` holds a list. Names starting
//! with `_` are local to one trigger walk. Names are case-insensitive.

use super::types::Value;
use rustc_hash::FxHashMap;

#[derive(Debug, Default, Clone)]
pub struct Variables {
    values: FxHashMap<String, Vec<Value>>,
}

/// Whether `name` refers to a list variable (`x::*`).
pub fn is_list_name(name: &str) -> bool {
    name.ends_with("::*")
}

/// Whether `name` refers to a walk-local variable (`_x`).
pub fn is_local_name(name: &str) -> bool {
    name.starts_with('_')
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Variables {
    pub fn get(&self, name: &str) -> &[Value] {
        self.values.get(&key(name)).map_or(&[], Vec::as_slice)
    }

    /// Replace the stored values; an empty list deletes the variable.
    pub fn set(&mut self, name: &str, values: Vec<Value>) {
        if values.is_empty() {
            self.values.remove(&key(name));
        } else {
            self.values.insert(key(name), values);
        }
    }

    pub fn add(&mut self, name: &str, values: &[Value]) {
        if values.is_empty() {
            return;
        }
        self.values
            .entry(key(name))
            .or_default()
            .extend_from_slice(values);
    }

    /// Drop every stored value matching `pred`.
    pub fn remove_where(&mut self, name: &str, mut pred: impl FnMut(&Value) -> bool) {
        let k = key(name);
        if let Some(list) = self.values.get_mut(&k) {
            list.retain(|v| !pred(v));
            if list.is_empty() {
                self.values.remove(&k);
            }
        }
    }

    pub fn clear(&mut self, name: &str) {
        self.values.remove(&key(name));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&key(name))
    }

    /// Stored names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
