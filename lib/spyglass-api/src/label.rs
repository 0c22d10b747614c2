/*
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt::{self, Write};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A label value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Signed(i64),
    Double(f64),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Signed(i) => f.write_str(itoa::Buffer::new().format(*i)),
            Value::Double(v) => f.write_str(ryu::Buffer::new().format(*v)),
            Value::Bool(b) => f.write_str(if *b { "true" } else { "false" }),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Signed(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// A single label dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue {
    key: String,
    value: Value,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        KeyValue {
            key: key.into(),
            value: value.into(),
        }
    }

    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }
}

struct LabelSetInner {
    kvs: Vec<KeyValue>,
    encoded: String,
}

/// An ordered, deduplicated set of label key-values.
///
/// Keys are sorted and duplicates resolved last-write-wins at
/// construction time. The stable `key=value,...` encoding is computed
/// eagerly and used as part of the record lookup key, so clones are
/// cheap `Arc` bumps.
#[derive(Clone)]
pub struct LabelSet {
    inner: Arc<LabelSetInner>,
}

impl LabelSet {
    pub fn from_kvs<I>(kvs: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        let mut kvs: Vec<KeyValue> = kvs.into_iter().collect();
        // stable sort keeps the later duplicate, dedup below drops the earlier
        kvs.sort_by(|a, b| a.key.cmp(&b.key));
        kvs.reverse();
        kvs.dedup_by(|a, b| a.key == b.key);
        kvs.reverse();

        let mut encoded = String::with_capacity(kvs.len() * 16);
        for kv in &kvs {
            if !encoded.is_empty() {
                encoded.push(',');
            }
            encoded.push_str(&kv.key);
            encoded.push('=');
            let _ = write!(encoded, "{}", kv.value);
        }

        LabelSet {
            inner: Arc::new(LabelSetInner { kvs, encoded }),
        }
    }

    pub fn empty() -> Self {
        LabelSet::from_kvs([])
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.kvs.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.kvs.len()
    }

    /// The stable default encoding of this set.
    #[inline]
    pub fn encoded(&self) -> &str {
        &self.inner.encoded
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner
            .kvs
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| &kv.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.inner.kvs.iter()
    }

    /// A new set containing only the dimensions named in `keys`.
    pub fn project(&self, keys: &[String]) -> LabelSet {
        LabelSet::from_kvs(
            self.inner
                .kvs
                .iter()
                .filter(|kv| keys.iter().any(|k| k == &kv.key))
                .cloned(),
        )
    }
}

impl Default for LabelSet {
    fn default() -> Self {
        LabelSet::empty()
    }
}

impl FromIterator<KeyValue> for LabelSet {
    fn from_iter<I: IntoIterator<Item = KeyValue>>(iter: I) -> Self {
        LabelSet::from_kvs(iter)
    }
}

impl PartialEq for LabelSet {
    fn eq(&self, other: &Self) -> bool {
        self.inner.encoded == other.inner.encoded
    }
}

impl Eq for LabelSet {}

impl Hash for LabelSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.encoded.hash(state)
    }
}

impl fmt::Debug for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LabelSet").field(&self.inner.encoded).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_encoding() {
        let labels = LabelSet::from_kvs([
            KeyValue::new("b", 2i64),
            KeyValue::new("a", "x"),
            KeyValue::new("c", true),
        ]);
        assert_eq!(labels.encoded(), "a=x,b=2,c=true");
    }

    #[test]
    fn dedup_last_wins() {
        let labels = LabelSet::from_kvs([
            KeyValue::new("a", "old"),
            KeyValue::new("b", "keep"),
            KeyValue::new("a", "new"),
        ]);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("a"), Some(&Value::Str("new".to_string())));
        assert_eq!(labels.encoded(), "a=new,b=keep");
    }

    #[test]
    fn project_subset() {
        let labels = LabelSet::from_kvs([
            KeyValue::new("a", "1"),
            KeyValue::new("b", "2"),
            KeyValue::new("c", "3"),
        ]);
        let reduced = labels.project(&["c".to_string(), "a".to_string()]);
        assert_eq!(reduced.encoded(), "a=1,c=3");
    }

    #[test]
    fn empty_set() {
        let labels = LabelSet::empty();
        assert!(labels.is_empty());
        assert_eq!(labels.encoded(), "");
    }
}
