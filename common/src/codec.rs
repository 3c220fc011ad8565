//! Image codec seam.
//!
//! Decoding is an external concern: the slab protocol only consumes
//! decoded bytes with a declared shape. Real codecs live outside this
//! workspace.

use std::path::Path;

use bytes::Bytes;

use crate::core::{ElementType, ItemShape};
use crate::error::Result;

/// A decoded image ready to be copied into a slab.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub shape: ItemShape,
    pub element_type: ElementType,
    /// Row-major element data, exactly `shape` elements.
    pub data: Bytes,
}

/// Decode images from their on-disk representation.
///
/// Implementations map their own failures to `SlabError::Decode`.
pub trait ImageCodec {
    fn decode(&self, path: &Path) -> Result<DecodedImage>;
}

pub mod testing {
    //! Codec fixtures for tests.

    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use error_stack::ResultExt;

    use crate::core::{ElementType, ItemShape};
    use crate::error::{Result, SlabError};

    use super::{DecodedImage, ImageCodec};

    /// Treats every file as already-decoded bytes of a declared shape.
    ///
    /// Per-path shape overrides let tests stage mismatch scenarios.
    #[derive(Debug, Clone)]
    pub struct RawCodec {
        shape: ItemShape,
        element_type: ElementType,
        overrides: HashMap<PathBuf, ItemShape>,
    }

    impl RawCodec {
        pub fn new(shape: ItemShape) -> Self {
            Self {
                shape,
                element_type: ElementType::Uint8,
                overrides: HashMap::new(),
            }
        }

        /// Declare a different shape for one specific path.
        pub fn with_override(mut self, path: impl Into<PathBuf>, shape: ItemShape) -> Self {
            self.overrides.insert(path.into(), shape);
            self
        }
    }

    impl ImageCodec for RawCodec {
        fn decode(&self, path: &Path) -> Result<DecodedImage> {
            let data = std::fs::read(path)
                .change_context(SlabError::Decode)
                .attach_printable_lazy(|| format!("item: {:?}", path))?;

            let shape = self.overrides.get(path).copied().unwrap_or(self.shape);

            Ok(DecodedImage {
                shape,
                element_type: self.element_type,
                data: data.into(),
            })
        }
    }
}
