use std::path::PathBuf;

use error_stack::ResultExt;
use tracing::debug;

use pixslab_common::codec::ImageCodec;
use pixslab_common::dataset::DatasetSource;
use pixslab_common::error::{Result, SlabError};
use pixslab_common::SlabProfile;

/// Establish the canonical shape of a dataset from its first item.
///
/// Only the first item is decoded here. Homogeneous shapes are a
/// precondition of the slab layout: the remaining items are checked
/// against this profile during population, not re-profiled.
pub fn profile_dataset<D, C>(dataset: &D, codec: &C) -> Result<SlabProfile>
where
    D: DatasetSource,
    C: ImageCodec,
{
    let items = dataset.items()?;
    profile_items(&items, codec).attach_printable_lazy(|| format!("dataset: {}", dataset.identity()))
}

pub(crate) fn profile_items<C>(items: &[PathBuf], codec: &C) -> Result<SlabProfile>
where
    C: ImageCodec,
{
    let first = match items.first() {
        Some(first) => first,
        None => return Err(SlabError::EmptyDataset).attach_printable("nothing to profile"),
    };

    let image = codec.decode(first)?;
    let item_count = u32::try_from(items.len())
        .change_context(SlabError::SlabTooLarge)
        .attach_printable("item count does not fit the header field")?;

    let profile = SlabProfile {
        item_count,
        shape: image.shape,
        element_type: image.element_type,
    };
    debug!(
        items = item_count,
        shape = %profile.shape,
        element_type = %profile.element_type,
        "profiled dataset"
    );

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tempdir::TempDir;

    use pixslab_common::codec::testing::RawCodec;
    use pixslab_common::dataset::DirectoryDataset;
    use pixslab_common::error::SlabError;
    use pixslab_common::{ElementType, ItemShape};

    use super::profile_dataset;

    #[test]
    pub fn test_profile_uses_first_item_shape() {
        let dir = TempDir::new("test_profile_first_item").unwrap();
        for name in ["0.raw", "1.raw", "2.raw"] {
            std::fs::write(dir.path().join(name), vec![0u8; 12]).unwrap();
        }

        let dataset = DirectoryDataset::new(dir.path());
        let codec = RawCodec::new(ItemShape::new(2, 2, 3));

        let profile = profile_dataset(&dataset, &codec).unwrap();
        assert_eq!(profile.item_count, 3);
        assert_eq!(profile.shape, ItemShape::new(2, 2, 3));
        assert_eq!(profile.element_type, ElementType::Uint8);
    }

    #[test]
    pub fn test_empty_dataset_fails_at_profiling() {
        let dir = TempDir::new("test_profile_empty").unwrap();
        let dataset = DirectoryDataset::new(dir.path());
        let codec = RawCodec::new(ItemShape::new(2, 2, 3));

        let err = profile_dataset(&dataset, &codec).unwrap_err();
        assert_matches!(err.current_context(), SlabError::EmptyDataset);
    }

    #[test]
    pub fn test_undecodable_first_item_fails() {
        let dir = TempDir::new("test_profile_undecodable").unwrap();
        let dataset = DirectoryDataset::new(dir.path());
        let codec = RawCodec::new(ItemShape::new(2, 2, 3));

        // The path is enumerated but unreadable by the codec.
        let path = dir.path().join("0.raw");
        std::os::unix::fs::symlink("/nonexistent", &path).unwrap();

        let err = profile_dataset(&dataset, &codec).unwrap_err();
        assert_matches!(err.current_context(), SlabError::Decode);
    }
}
