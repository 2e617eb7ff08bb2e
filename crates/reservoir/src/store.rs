use alloc::string::String;

use crate::error::Result;

/// A persistent key-value store partitioned in namespaces.
pub trait KeyValueStore {
    /// Retrieves the value stored under `namespace` and `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn get(&mut self, namespace: &str, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `namespace` and `key`, replacing any prior value.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written.
    fn put(&mut self, namespace: &str, key: &str, value: &str) -> Result<()>;

    /// Removes the value stored under `namespace` and `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written.
    fn remove(&mut self, namespace: &str, key: &str) -> Result<()>;
}
