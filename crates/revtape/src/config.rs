//! Tape and arena configuration.

use crate::error::AdError;

/// Size of the first arena slab, in bytes.
pub const DEFAULT_INITIAL_SLAB_BYTES: usize = 1 << 16;

/// Factor by which each new slab outgrows the previous one.
pub const DEFAULT_GROWTH_FACTOR: usize = 2;

/// Settings used when constructing a [`Tape`](crate::Tape).
///
/// # Example
///
/// ```
/// use revtape::TapeConfig;
///
/// let config = TapeConfig::default()
///     .initial_slab_bytes(4096)
///     .unwrap()
///     .growth_factor(4)
///     .unwrap();
/// assert_eq!(config.slab_bytes(), 4096);
/// assert_eq!(config.growth(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapeConfig {
    initial_slab_bytes: usize,
    growth_factor: usize,
    initial_capacity: usize,
}

impl TapeConfig {
    /// Set the size of the first arena slab.
    ///
    /// # Errors
    /// Returns [`AdError::InvalidConfig`] if `bytes` is zero.
    pub fn initial_slab_bytes(mut self, bytes: usize) -> Result<Self, AdError> {
        if bytes == 0 {
            return Err(AdError::InvalidConfig {
                message: "initial slab size must be positive".to_string(),
            });
        }
        self.initial_slab_bytes = bytes;
        Ok(self)
    }

    /// Set the geometric growth factor between consecutive slabs.
    ///
    /// # Errors
    /// Returns [`AdError::InvalidConfig`] if `factor` is less than 2.
    pub fn growth_factor(mut self, factor: usize) -> Result<Self, AdError> {
        if factor < 2 {
            return Err(AdError::InvalidConfig {
                message: format!("growth factor must be at least 2, got {}", factor),
            });
        }
        self.growth_factor = factor;
        Ok(self)
    }

    /// Reserve room for this many node handles up front.
    pub fn initial_capacity(mut self, nodes: usize) -> Self {
        self.initial_capacity = nodes;
        self
    }

    pub fn slab_bytes(&self) -> usize {
        self.initial_slab_bytes
    }

    pub fn growth(&self) -> usize {
        self.growth_factor
    }

    pub fn capacity(&self) -> usize {
        self.initial_capacity
    }
}

impl Default for TapeConfig {
    fn default() -> Self {
        Self {
            initial_slab_bytes: DEFAULT_INITIAL_SLAB_BYTES,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            initial_capacity: 0,
        }
    }
}
