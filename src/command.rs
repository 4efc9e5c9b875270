//! Addressed commands as they enter the hub

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// An address plus un-normalized arguments
///
/// Arguments are either bare JSON values (`0.5`, `42`, `"go"`) or explicitly
/// tagged `{"type": "f", "value": 1.0}` objects. Drivers normalize them into
/// wire arguments (see `drivers::args`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Command {
    pub address: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Command {
    /// Create a command
    pub fn new(address: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Address split into non-empty path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.address.split('/').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Split `"/prefix/rest/of/path"` into `("prefix", "/rest/of/path")`
///
/// An address with only one segment yields `"/"` as the remainder.
/// Returns `None` for an address without any segment.
pub fn split_leading_segment(address: &str) -> Option<(&str, &str)> {
    let trimmed = address.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.find('/') {
        Some(idx) => {
            let (head, rest) = trimmed.split_at(idx);
            let rest = if rest.trim_matches('/').is_empty() { "/" } else { rest };
            Some((head, rest))
        },
        None => Some((trimmed, "/")),
    }
}
