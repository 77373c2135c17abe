use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Element type carried by a port: a name and a size in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDType")]
pub struct DType {
    name: String,
    size: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("element type '{name}' has zero size")]
pub struct ZeroSizedElement {
    pub name: String,
}

#[derive(Deserialize)]
struct RawDType {
    name: String,
    size: usize,
}

impl TryFrom<RawDType> for DType {
    type Error = ZeroSizedElement;

    fn try_from(raw: RawDType) -> Result<Self, Self::Error> {
        if raw.size == 0 {
            return Err(ZeroSizedElement { name: raw.name });
        }
        Ok(Self {
            name: raw.name,
            size: raw.size,
        })
    }
}

impl DType {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        assert!(size > 0, "element size must be non-zero");
        Self {
            name: name.into(),
            size,
        }
    }

    /// Descriptor for a plain Rust element type.
    pub fn of<T>() -> Self {
        let full = std::any::type_name::<T>();
        let name = full.rsplit("::").next().unwrap_or(full);
        Self::new(name, std::mem::size_of::<T>().max(1))
    }

    pub fn byte() -> Self {
        Self::new("byte", 1)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Default for DType {
    fn default() -> Self {
        Self::byte()
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.size)
    }
}
