// SPDX-FileCopyrightText: 2026 Waypoint Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered event record shared between mocks.

use std::sync::{Arc, Mutex};

/// Append-only list of events, cloneable across mocks and hooks.
///
/// Entries are free-form strings such as `"backend:uninstall:mileage"` or
/// `"hook:onUnload:mileage"`, so tests can assert relative order.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.into());
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Position of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let log = CallLog::new();
        let other = log.clone();
        log.push("a");
        other.push("b");
        assert_eq!(log.entries(), vec!["a", "b"]);
        assert_eq!(other.position("b"), Some(1));
        log.clear();
        assert!(other.entries().is_empty());
    }
}
