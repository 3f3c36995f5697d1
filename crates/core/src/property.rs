// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service property bags.
//!
//! Each service carries a string→string map of algorithmic knobs. Typed
//! accessors parse on demand; a missing key yields the caller's default so
//! defaults live next to the code that consumes them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// A property value failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value '{value}' for property '{key}'")]
pub struct PropertyError {
    pub key: String,
    pub value: String,
}

/// String→string map of recognised service knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyBag(HashMap<String, String>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Chainable form of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, PropertyError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(v) => match v.as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.invalid(key)),
            },
        }
    }

    pub fn get_f64(&self, key: &str, default: f64) -> Result<f64, PropertyError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(v) if v == "infinity" => Ok(f64::INFINITY),
            Some(v) => v.parse().map_err(|_| self.invalid(key)),
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64, PropertyError> {
        match self.0.get(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|_| self.invalid(key)),
        }
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.0.get(key).cloned().unwrap_or_else(|| default.to_string())
    }

    fn invalid(&self, key: &str) -> PropertyError {
        PropertyError {
            key: key.to_string(),
            value: self.0.get(key).cloned().unwrap_or_default(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
#[path = "property_tests.rs"]
mod tests;
