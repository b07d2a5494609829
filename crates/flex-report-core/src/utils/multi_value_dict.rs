//! A dictionary that can hold multiple values per key.
//!
//! Query strings repeat keys for multi-value lookups (`ids__in=1&ids__in=2`),
//! and the report engine relies on the order keys first appeared in, so the
//! dictionary keeps insertion order.

use std::borrow::Borrow;

/// An insertion-ordered dictionary mapping keys to lists of values.
///
/// [`get`](MultiValueDict::get) returns the **last** value for a key while
/// [`get_list`](MultiValueDict::get_list) returns all of them.
///
/// # Examples
///
/// ```
/// use flex_report_core::utils::MultiValueDict;
///
/// let mut d = MultiValueDict::new();
/// d.append("color".to_string(), "red");
/// d.append("color".to_string(), "blue");
///
/// assert_eq!(d.get("color"), Some(&"blue"));
/// assert_eq!(d.get_list("color"), Some(&vec!["red", "blue"]));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiValueDict<K, V> {
    inner: Vec<(K, Vec<V>)>,
}

impl<K, V> Default for MultiValueDict<K, V> {
    fn default() -> Self {
        Self { inner: Vec::new() }
    }
}

impl<K: Eq, V> MultiValueDict<K, V> {
    /// Creates an empty `MultiValueDict`.
    pub fn new() -> Self {
        Self::default()
    }

    fn position<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.inner.iter().position(|(k, _)| k.borrow() == key)
    }

    /// Returns the **last** value associated with the key.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.get_list(key).and_then(|values| values.last())
    }

    /// Returns all values associated with the key.
    pub fn get_list<Q>(&self, key: &Q) -> Option<&Vec<V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.position(key).map(|i| &self.inner[i].1)
    }

    /// Sets the value for a key, replacing any existing values.
    pub fn set(&mut self, key: K, value: V) {
        self.set_list(key, vec![value]);
    }

    /// Sets all values for a key, replacing any existing values.
    pub fn set_list(&mut self, key: K, values: Vec<V>) {
        match self.position(&key) {
            Some(i) => self.inner[i].1 = values,
            None => self.inner.push((key, values)),
        }
    }

    /// Appends a value to the list for the given key.
    pub fn append(&mut self, key: K, value: V) {
        match self.position(&key) {
            Some(i) => self.inner[i].1.push(value),
            None => self.inner.push((key, vec![value])),
        }
    }

    /// Removes a key, returning its values.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<Vec<V>>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.position(key).map(|i| self.inner.remove(i).1)
    }

    /// Returns an iterator over the keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.iter().map(|(k, _)| k)
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the dictionary contains no keys.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns `true` if the dictionary contains the specified key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        self.position(key).is_some()
    }

    /// Returns an iterator over (key, value-list) pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &Vec<V>)> {
        self.inner.iter().map(|(k, v)| (k, v))
    }
}

impl<K, V> IntoIterator for MultiValueDict<K, V> {
    type Item = (K, Vec<V>);
    type IntoIter = std::vec::IntoIter<(K, Vec<V>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty() {
        let d: MultiValueDict<String, String> = MultiValueDict::new();
        assert!(d.is_empty());
        assert_eq!(d.len(), 0);
    }

    #[test]
    fn test_get_returns_last() {
        let mut d = MultiValueDict::new();
        d.append("a".to_string(), 1);
        d.append("a".to_string(), 2);
        assert_eq!(d.get("a"), Some(&2));
        assert_eq!(d.get_list("a"), Some(&vec![1, 2]));
        assert_eq!(d.get("b"), None);
    }

    #[test]
    fn test_set_replaces() {
        let mut d = MultiValueDict::new();
        d.append("a".to_string(), 1);
        d.append("a".to_string(), 2);
        d.set("a".to_string(), 3);
        assert_eq!(d.get_list("a"), Some(&vec![3]));
    }

    #[test]
    fn test_keeps_insertion_order() {
        let mut d = MultiValueDict::new();
        d.append("z".to_string(), 1);
        d.append("a".to_string(), 2);
        d.append("z".to_string(), 3);
        d.append("m".to_string(), 4);
        let keys: Vec<_> = d.keys().cloned().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_remove() {
        let mut d = MultiValueDict::new();
        d.append("a".to_string(), 1);
        assert_eq!(d.remove("a"), Some(vec![1]));
        assert!(!d.contains_key("a"));
        assert_eq!(d.remove("a"), None);
    }
}
