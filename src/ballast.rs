//! Memory ballast.
//!
//! A fixed allocation made once at startup and held until shutdown. In a garbage collected
//! runtime it raises the baseline heap so collection pauses are steadier; here it is an owned
//! buffer whose lifetime is tied explicitly to the shutdown sequence, which drops it last.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// An untouched, owned allocation.
#[derive(Debug, Default)]
pub struct Ballast {
    buffer: Option<Box<[u8]>>,
}

impl Ballast {
    /// Allocates `size_mib` MiB. Zero disables the ballast.
    pub fn allocate(size_mib: u32) -> Self {
        if size_mib == 0 {
            return Self::default();
        }
        let size_bytes = u64::from(size_mib) * BYTES_PER_MIB;
        let Ok(len) = usize::try_from(size_bytes) else {
            warn!(mib = size_mib, "Memory ballast does not fit the address space, disabled");
            return Self::default();
        };
        let buffer = vec![0u8; len].into_boxed_slice();
        info!(mib = size_mib, "Using memory ballast");
        Self {
            buffer: Some(buffer),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.buffer.as_ref().map_or(0, |b| b.len() as u64)
    }

    pub fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    /// Ends the retention of the buffer.
    pub fn release(self) {
        if self.is_allocated() {
            info!(bytes = self.size_bytes(), "Releasing memory ballast");
        }
    }
}

/// Shared view of how many ballast bytes are currently held.
#[derive(Debug, Clone, Default)]
pub struct BallastGauge {
    held: Arc<AtomicU64>,
}

impl BallastGauge {
    pub fn held_bytes(&self) -> u64 {
        self.held.load(Ordering::Acquire)
    }

    pub(crate) fn record(&self, ballast: &Ballast) {
        self.held.store(ballast.size_bytes(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_size_allocates_nothing() {
        let ballast = Ballast::allocate(0);
        assert!(!ballast.is_allocated());
        assert_eq!(ballast.size_bytes(), 0);
    }

    #[test]
    fn test_size_is_exact_mebibytes() {
        let ballast = Ballast::allocate(3);
        assert!(ballast.is_allocated());
        assert_eq!(ballast.size_bytes(), 3 * 1_048_576);
        ballast.release();
    }

    #[test]
    fn test_gauge_follows_the_ballast() {
        let gauge = BallastGauge::default();
        let ballast = Ballast::allocate(1);
        gauge.record(&ballast);
        assert_eq!(gauge.clone().held_bytes(), 1_048_576);

        ballast.release();
        gauge.record(&Ballast::default());
        assert_eq!(gauge.held_bytes(), 0);
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn test_ballast_beyond_address_space_is_disabled() {
        let ballast = Ballast::allocate(4096);
        assert!(!ballast.is_allocated());
        assert_eq!(ballast.size_bytes(), 0);
    }
}
