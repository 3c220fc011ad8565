use std::path::Path;

use error_stack::ResultExt;

use crate::error::{Result, SlabError};
use crate::header::SLAB_HEADER_SIZE;

/// Stable logical key for one dataset instance.
///
/// Identical keys map to identical segment names, so every process that
/// agrees on the key finds the same slab. The key is a collision
/// avoidance mechanism, not a security boundary.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DatasetIdentity(String);

impl DatasetIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Identity derived from the dataset location on disk.
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DatasetIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DatasetIdentity({})", self.0)
    }
}

impl std::fmt::Display for DatasetIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shape of a single decoded item, in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemShape {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl ItemShape {
    pub fn new(height: u32, width: u32, channels: u32) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }
}

impl std::fmt::Display for ItemShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// Fixed-width type of every payload element.
///
/// Decoded images are 8-bit unsigned in the common case; the tag is
/// written into the segment header so readers never guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Uint8,
    Uint16,
    Float32,
}

impl ElementType {
    pub fn size_of(&self) -> u64 {
        match self {
            ElementType::Uint8 => 1,
            ElementType::Uint16 => 2,
            ElementType::Float32 => 4,
        }
    }

    /// Wire tag stored in the segment header.
    ///
    /// `Uint8` is tag zero so a zero-filled reserved area from an older
    /// writer reads back as 8-bit unsigned.
    pub fn tag(&self) -> i32 {
        match self {
            ElementType::Uint8 => 0,
            ElementType::Uint16 => 1,
            ElementType::Float32 => 2,
        }
    }

    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(ElementType::Uint8),
            1 => Some(ElementType::Uint16),
            2 => Some(ElementType::Float32),
            _ => None,
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementType::Uint8 => f.write_str("u8"),
            ElementType::Uint16 => f.write_str("u16"),
            ElementType::Float32 => f.write_str("f32"),
        }
    }
}

/// Canonical item count, shape, and element type of a slab payload.
///
/// Every item in the payload has exactly this shape. Heterogeneous
/// datasets are not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabProfile {
    pub item_count: u32,
    pub shape: ItemShape,
    pub element_type: ElementType,
}

impl SlabProfile {
    /// Size of a single item, in bytes.
    pub fn item_bytes(&self) -> Result<u64> {
        let ItemShape {
            height,
            width,
            channels,
        } = self.shape;
        let bytes = height as u128
            * width as u128
            * channels as u128
            * self.element_type.size_of() as u128;
        u64::try_from(bytes).change_context(SlabError::SlabTooLarge)
    }

    /// Size of the whole payload, in bytes.
    pub fn payload_bytes(&self) -> Result<u64> {
        let bytes = self.item_bytes()? as u128 * self.item_count as u128;
        u64::try_from(bytes).change_context(SlabError::SlabTooLarge)
    }

    /// Total segment size: header plus payload.
    pub fn required_bytes(&self) -> Result<u64> {
        self.payload_bytes()?
            .checked_add(SLAB_HEADER_SIZE)
            .ok_or(SlabError::SlabTooLarge)
            .attach_printable("total size overflows with the header included")
    }
}

pub mod testing {
    use super::{ElementType, ItemShape, SlabProfile};

    /// Returns a `u8` profile for small test slabs.
    pub fn new_test_profile(item_count: u32, height: u32, width: u32, channels: u32) -> SlabProfile {
        SlabProfile {
            item_count,
            shape: ItemShape::new(height, width, channels),
            element_type: ElementType::Uint8,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::error::SlabError;

    use super::{testing::new_test_profile, ElementType, ItemShape, SlabProfile};

    #[test]
    pub fn test_required_bytes_is_exact() {
        // 10 items of 4x4x1 u8: 64 header + 160 payload.
        let profile = new_test_profile(10, 4, 4, 1);
        assert_eq!(profile.item_bytes().unwrap(), 16);
        assert_eq!(profile.payload_bytes().unwrap(), 160);
        assert_eq!(profile.required_bytes().unwrap(), 224);
    }

    #[test]
    pub fn test_element_size_scales_payload() {
        let profile = SlabProfile {
            item_count: 2,
            shape: ItemShape::new(3, 3, 1),
            element_type: ElementType::Float32,
        };
        assert_eq!(profile.item_bytes().unwrap(), 36);
        assert_eq!(profile.payload_bytes().unwrap(), 72);
    }

    #[test]
    pub fn test_oversized_shape_fails_instead_of_wrapping() {
        let profile = SlabProfile {
            item_count: u32::MAX,
            shape: ItemShape::new(u32::MAX, u32::MAX, u32::MAX),
            element_type: ElementType::Float32,
        };
        let err = profile.payload_bytes().unwrap_err();
        assert_matches!(err.current_context(), SlabError::SlabTooLarge);
    }

    #[test]
    pub fn test_element_type_tag_round_trip() {
        for element_type in [
            ElementType::Uint8,
            ElementType::Uint16,
            ElementType::Float32,
        ] {
            assert_eq!(ElementType::from_tag(element_type.tag()), Some(element_type));
        }
        assert_eq!(ElementType::from_tag(9), None);
    }
}
