//! In-memory store for unit tests
//!
//! Keeps files in a map and records every read and write, so tests can assert how
//! often the cache really went to storage without touching the file system.

use super::VirtualFileStore;
use crate::error::ImageCacheError;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    /// Record of all read() calls, by path
    pub read_calls: Arc<Mutex<Vec<String>>>,
    /// Record of all write() calls, by path
    pub write_calls: Arc<Mutex<Vec<String>>>,
    /// Record of all remove() calls, by path
    pub remove_calls: Arc<Mutex<Vec<String>>>,
    /// Control behavior for testing
    pub should_fail_read: bool,
    pub should_fail_write: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a file (simulates a downloaded image)
    pub fn preload(&self, path: &str, data: Vec<u8>) {
        self.files.lock().unwrap().insert(path.to_string(), data);
    }

    pub fn get_file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn read_call_count(&self) -> usize {
        self.read_calls.lock().unwrap().len()
    }

    pub fn reads_of(&self, path: &str) -> usize {
        self.read_calls.lock().unwrap().iter().filter(|p| *p == path).count()
    }

    pub fn write_call_count(&self) -> usize {
        self.write_calls.lock().unwrap().len()
    }

    pub fn remove_call_count(&self) -> usize {
        self.remove_calls.lock().unwrap().len()
    }

    /// Reset all recorded calls (for test isolation)
    pub fn reset_calls(&self) {
        self.read_calls.lock().unwrap().clear();
        self.write_calls.lock().unwrap().clear();
        self.remove_calls.lock().unwrap().clear();
    }

    /// Configure failure modes for testing error handling
    pub fn set_failure_modes(&mut self, read: bool, write: bool) {
        self.should_fail_read = read;
        self.should_fail_write = write;
    }
}

impl VirtualFileStore for MemoryStore {
    fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ImageCacheError> {
        self.read_calls.lock().unwrap().push(path.to_string());
        if self.should_fail_read {
            return Err(ImageCacheError::Io(io::Error::other("Simulated read failure")));
        }
        Ok(self.files.lock().unwrap().get(path).cloned())
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), ImageCacheError> {
        self.write_calls.lock().unwrap().push(path.to_string());
        if self.should_fail_write {
            return Err(ImageCacheError::Io(io::Error::other("Simulated write failure")));
        }
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), ImageCacheError> {
        self.remove_calls.lock().unwrap().push(path.to_string());
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "MemoryStore"
    }
}
