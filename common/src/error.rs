use std::fmt;

use byte_unit::Byte;
use error_stack::Report;

const GIB: u64 = 1024 * 1024 * 1024;

/// Failures of the slab protocol.
///
/// None of these represent a transient condition: capacity and pressure
/// failures need operator remediation, shape mismatches indicate bad
/// input data. Nothing is retried automatically.
#[derive(Debug, Clone, PartialEq)]
pub enum SlabError {
    /// The dataset enumerates to zero items.
    EmptyDataset,
    /// An item could not be decoded.
    Decode,
    /// An item decoded to a shape other than the profiled one.
    ShapeMismatch { index: usize },
    /// The shared memory mount cannot hold the slab.
    InsufficientShmCapacity { required: u64, available: u64 },
    /// Allocating would consume too much of the available system memory.
    MemoryPressureTooHigh {
        pressure: f64,
        required: u64,
        available: u64,
    },
    /// A segment with the derived name already exists.
    SegmentAlreadyExists,
    /// No segment with the derived name exists.
    SegmentNotFound,
    /// The segment header fails validation.
    CorruptHeader,
    /// Item index past the end of the slab.
    IndexOutOfRange { index: usize, len: usize },
    /// Operation on a reader that was already released.
    UseAfterRelease,
    /// Slab dimensions overflow 64-bit byte arithmetic.
    SlabTooLarge,
    /// Underlying syscall or filesystem failure.
    Io,
}

pub type Result<T> = error_stack::Result<T, SlabError>;

impl error_stack::Context for SlabError {}

impl fmt::Display for SlabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlabError::EmptyDataset => f.write_str("slab error: dataset contains no items"),
            SlabError::Decode => f.write_str("slab error: failed to decode item"),
            SlabError::ShapeMismatch { index } => {
                write!(f, "slab error: item {index} does not match the profiled shape")
            }
            SlabError::InsufficientShmCapacity {
                required,
                available,
            } => {
                let suggested = (*required as f64 * 1.2 / GIB as f64).ceil().max(1.0) as u64;
                write!(
                    f,
                    "slab error: shared memory mount too small (required {}, available {}), \
                     increase it, likely: `sudo mount -o remount,size={}G /dev/shm`",
                    FormattedSize(*required),
                    FormattedSize(*available),
                    suggested
                )
            }
            SlabError::MemoryPressureTooHigh {
                pressure,
                required,
                available,
            } => {
                write!(
                    f,
                    "slab error: not comfortable allocating, memory pressure {:.2} \
                     (required {}, system available {})",
                    pressure,
                    FormattedSize(*required),
                    FormattedSize(*available)
                )
            }
            SlabError::SegmentAlreadyExists => {
                f.write_str("slab error: segment already exists for this dataset")
            }
            SlabError::SegmentNotFound => f.write_str("slab error: segment not found"),
            SlabError::CorruptHeader => f.write_str("slab error: corrupt segment header"),
            SlabError::IndexOutOfRange { index, len } => {
                write!(f, "slab error: item index {index} out of range (len {len})")
            }
            SlabError::UseAfterRelease => {
                f.write_str("slab error: slab was accessed after release")
            }
            SlabError::SlabTooLarge => {
                f.write_str("slab error: slab size overflows byte arithmetic")
            }
            SlabError::Io => f.write_str("slab error: io"),
        }
    }
}

pub trait SlabErrorExt {
    fn is_segment_not_found(&self) -> bool;
    fn is_segment_already_exists(&self) -> bool;
    fn is_use_after_release(&self) -> bool;
}

impl SlabErrorExt for Report<SlabError> {
    fn is_segment_not_found(&self) -> bool {
        matches!(self.current_context(), SlabError::SegmentNotFound)
    }

    fn is_segment_already_exists(&self) -> bool {
        matches!(self.current_context(), SlabError::SegmentAlreadyExists)
    }

    fn is_use_after_release(&self) -> bool {
        matches!(self.current_context(), SlabError::UseAfterRelease)
    }
}

/// Format a size in bytes.
pub struct FormattedSize(pub u64);

impl fmt::Display for FormattedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let byte = Byte::from_bytes(self.0 as u128).get_appropriate_unit(true);
        byte.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::{FormattedSize, SlabError};

    #[test]
    pub fn test_capacity_message_suggests_remount() {
        let message = SlabError::InsufficientShmCapacity {
            required: 10 * super::GIB,
            available: 2 * super::GIB,
        }
        .to_string();
        assert!(message.contains("remount,size=12G"));
    }

    #[test]
    pub fn test_formatted_size_uses_binary_units() {
        assert!(FormattedSize(1024).to_string().contains("KiB"));
    }
}
