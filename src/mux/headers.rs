//! Header sets
//!
//! An ordered field mapping including reserved pseudo-fields. Names compare
//! case-insensitively but are preserved as inserted for transmission.
//! Pseudo-fields (leading `:`) always serialize ahead of regular fields.

use super::error::{Error, Result};
use std::fmt;

/// Pseudo-fields a client request must carry before it is complete
pub const REQUEST_PSEUDO_FIELDS: &[&str] = &[":method", ":path", ":scheme", ":authority"];

/// Pseudo-field a server response must carry before it is complete
pub const STATUS_PSEUDO_FIELD: &str = ":status";

/// Ordered header field mapping
///
/// Supports case-insensitive lookups, multiple values per name, and
/// iteration in insertion order or wire order (pseudo-fields first).
#[derive(Debug, Clone, Default)]
pub struct HeaderSet {
    fields: Vec<(String, String)>,
}

impl HeaderSet {
    /// Create an empty header set
    pub fn new() -> Self {
        HeaderSet { fields: Vec::new() }
    }

    /// Create a request header set with the required pseudo-fields
    pub fn request(method: &str, path: &str, scheme: &str, authority: &str) -> Self {
        let mut headers = HeaderSet::new();
        headers.insert(":method", method);
        headers.insert(":path", path);
        headers.insert(":scheme", scheme);
        headers.insert(":authority", authority);
        headers
    }

    /// Create a response header set with the required `:status` pseudo-field
    pub fn response(status: u16) -> Self {
        let mut headers = HeaderSet::new();
        headers.insert(":status", status.to_string());
        headers
    }

    /// Insert a field
    ///
    /// Existing fields with the same name are kept; this adds another value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Get the first value for a field (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get all values for a field (case-insensitive)
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Check if a field exists
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }

    /// Remove all instances of a field, returning how many were removed
    pub fn remove(&mut self, name: &str) -> usize {
        let initial_len = self.fields.len();
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        initial_len - self.fields.len()
    }

    /// Get the number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if there are no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over all fields in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Iterate in wire order: pseudo-fields first, then regular fields,
    /// each group in insertion order
    pub fn iter_wire_order(&self) -> impl Iterator<Item = (&str, &str)> {
        let pseudo = self.fields.iter().filter(|(n, _)| n.starts_with(':'));
        let regular = self.fields.iter().filter(|(n, _)| !n.starts_with(':'));
        pseudo
            .chain(regular)
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Check whether a field name is a reserved pseudo-field
    pub fn is_pseudo(name: &str) -> bool {
        name.starts_with(':')
    }

    /// Validate completeness as a client request header set
    ///
    /// Requires `:method`, `:path`, `:scheme` and `:authority`.
    pub fn validate_request(&self) -> Result<()> {
        for required in REQUEST_PSEUDO_FIELDS {
            if !self.contains(required) {
                return Err(Error::ProtocolViolation(format!(
                    "request header set missing {}",
                    required
                )));
            }
        }
        self.validate_names()
    }

    /// Validate completeness as a server response header set
    ///
    /// Requires `:status`.
    pub fn validate_response(&self) -> Result<()> {
        if !self.contains(STATUS_PSEUDO_FIELD) {
            return Err(Error::ProtocolViolation(format!(
                "response header set missing {}",
                STATUS_PSEUDO_FIELD
            )));
        }
        self.validate_names()
    }

    fn validate_names(&self) -> Result<()> {
        for (name, _) in &self.fields {
            if name.is_empty() || name == ":" {
                return Err(Error::ProtocolViolation("empty field name".to_string()));
            }
        }
        Ok(())
    }
}

impl fmt::Display for HeaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter_wire_order() {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}

impl FromIterator<(String, String)> for HeaderSet {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut headers = HeaderSet::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}
