//! Ordered record headers and the retry-topic header contract.
//!
//! Header values are raw bytes. Integers use big-endian encoding so that
//! values written by one hop are read back unchanged by the next, whichever
//! client produced them.

use bytes::Bytes;

/// Source (main) topic the record was first consumed from.
pub const RETRY_TOPIC: &str = "retry-topic";
/// Failure kind captured at first failure.
pub const EXCEPTION_FQCN: &str = "exception-fqcn";
/// Failure message captured at first failure.
pub const EXCEPTION_MESSAGE: &str = "exception-message";
/// Cause-chain summary captured at first failure.
pub const EXCEPTION_STACKTRACE: &str = "exception-stacktrace";
/// First-failure time, epoch millis (i64).
pub const ORIGINAL_TIMESTAMP: &str = "original-timestamp";
/// Partition the record was first consumed from (i32).
pub const ORIGINAL_PARTITION: &str = "original-partition";
/// Offset the record was first consumed from (i64).
pub const ORIGINAL_OFFSET: &str = "original-offset";
/// Delivery count into the current destination topic (i32).
pub const ATTEMPTS: &str = "retry-topic-attempts";
/// Earliest time the record may be consumed, epoch millis (i64).
pub const BACKOFF_DUE: &str = "retry-topic-backoff-due";

/// Ordered header map, string keys to byte values.
///
/// Keys may repeat, as on the wire. Lookups return the last value for a key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Bytes)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a header, keeping any existing value for the same key.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<Bytes>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Replace every value for `key` with a single one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bytes>) {
        let key = key.into();
        self.remove(&key);
        self.entries.push((key, value.into()));
    }

    /// Insert only when `key` is absent.
    pub fn insert_if_absent(&mut self, key: &str, value: impl Into<Bytes>) {
        if !self.contains(key) {
            self.entries.push((key.to_string(), value.into()));
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Last value for `key`.
    pub fn get(&self, key: &str) -> Option<&Bytes> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bytes)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn insert_str(&mut self, key: &str, value: &str) {
        self.insert(key, Bytes::copy_from_slice(value.as_bytes()));
    }

    /// Big-endian i32; `None` when absent or not exactly 4 bytes.
    pub fn get_i32(&self, key: &str) -> Option<i32> {
        let raw: &[u8] = self.get(key)?;
        let bytes: [u8; 4] = raw.try_into().ok()?;
        Some(i32::from_be_bytes(bytes))
    }

    pub fn insert_i32(&mut self, key: &str, value: i32) {
        self.insert(key, Bytes::copy_from_slice(&value.to_be_bytes()));
    }

    /// Big-endian i64; `None` when absent or not exactly 8 bytes.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        let raw: &[u8] = self.get(key)?;
        let bytes: [u8; 8] = raw.try_into().ok()?;
        Some(i64::from_be_bytes(bytes))
    }

    pub fn insert_i64(&mut self, key: &str, value: i64) {
        self.insert(key, Bytes::copy_from_slice(&value.to_be_bytes()));
    }
}

impl FromIterator<(String, Bytes)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, Bytes)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
