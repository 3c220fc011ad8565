use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use tempdir::TempDir;

use pixslab_builder::{SlabBuilder, SlabBuilderOptions};
use pixslab_common::codec::testing::RawCodec;
use pixslab_common::dataset::{DatasetSource, DirectoryDataset};
use pixslab_common::error::SlabError;
use pixslab_common::feasibility::FeasibilityOptions;
use pixslab_common::naming::segment_name;
use pixslab_common::segment::SharedSegmentOptions;
use pixslab_common::{DatasetIdentity, ElementType, ItemShape};
use pixslab_reader::SlabReader;

/// Scratch mount with a 10-item 4x4x1 slab already built and released:
/// the producer's mapping is gone, the segment is resident for readers.
struct SlabFixture {
    _scratch: TempDir,
    mount: PathBuf,
    images: PathBuf,
    identity: DatasetIdentity,
}

impl SlabFixture {
    fn segment_options(&self) -> SharedSegmentOptions {
        SharedSegmentOptions {
            mount: self.mount.clone(),
        }
    }
}

fn empty_fixture(prefix: &str) -> SlabFixture {
    let _ = pixslab_observability::init_tracing();

    let scratch = TempDir::new(prefix).unwrap();
    let mount = scratch.path().join("shm");
    let images = scratch.path().join("images");
    std::fs::create_dir(&mount).unwrap();
    std::fs::create_dir(&images).unwrap();

    let identity = DirectoryDataset::new(&images).identity();

    SlabFixture {
        _scratch: scratch,
        mount,
        images,
        identity,
    }
}

fn built_fixture(prefix: &str) -> SlabFixture {
    let fx = empty_fixture(prefix);

    for i in 0..10 {
        let data: Vec<u8> = (0..16).map(|b| (i * 31 + b) as u8).collect();
        std::fs::write(fx.images.join(format!("{i:03}.raw")), data).unwrap();
    }

    // The meminfo fixture keeps the pressure gate deterministic; it
    // lives outside the dataset directory so it is never enumerated.
    let meminfo = fx._scratch.path().join("meminfo");
    std::fs::write(&meminfo, "MemAvailable: 1073741824 kB\n").unwrap();

    let builder = SlabBuilder::with_options(
        RawCodec::new(ItemShape::new(4, 4, 1)),
        SlabBuilderOptions {
            segment: fx.segment_options(),
            feasibility: FeasibilityOptions {
                shm_mount: fx.mount.clone(),
                meminfo,
                ..Default::default()
            },
        },
    );

    let mut handle = builder.build(&DirectoryDataset::new(&fx.images)).unwrap();
    handle.release().unwrap();

    fx
}

fn source_items(images: &Path) -> Vec<PathBuf> {
    DirectoryDataset::new(images).items().unwrap()
}

#[test]
fn test_round_trip_reads_identical_bytes() {
    let fx = built_fixture("roundtrip");

    let reader = SlabReader::attach(&fx.identity, &fx.segment_options()).unwrap();

    assert_eq!(reader.item_count().unwrap(), 10);
    assert_eq!(reader.shape().unwrap(), ItemShape::new(4, 4, 1));
    assert_eq!(reader.element_type().unwrap(), ElementType::Uint8);

    for (k, path) in source_items(&fx.images).iter().enumerate() {
        let source = std::fs::read(path).unwrap();
        assert_eq!(reader.item(k).unwrap(), source.as_slice(), "item {k}");
    }

    assert_eq!(reader.payload().unwrap().len(), 160);
    assert_eq!(reader.items().unwrap().count(), 10);
}

#[test]
fn test_attach_derives_the_same_name_as_the_builder() {
    let fx = built_fixture("derived_name");

    let reader = SlabReader::attach(&fx.identity, &fx.segment_options()).unwrap();
    assert_eq!(reader.name(), segment_name(&fx.identity));
}

#[test]
fn test_attach_missing_segment() {
    let fx = empty_fixture("missing");

    let err = SlabReader::attach(&fx.identity, &fx.segment_options()).unwrap_err();
    assert_matches!(err.current_context(), SlabError::SegmentNotFound);
}

#[test]
fn test_index_out_of_range() {
    let fx = built_fixture("out_of_range");

    let reader = SlabReader::attach(&fx.identity, &fx.segment_options()).unwrap();
    let err = reader.item(10).unwrap_err();
    assert_matches!(
        err.current_context(),
        SlabError::IndexOutOfRange { index: 10, len: 10 }
    );
}

#[test]
fn test_use_after_release() {
    let fx = built_fixture("use_after_release");

    let mut reader = SlabReader::attach(&fx.identity, &fx.segment_options()).unwrap();
    reader.release().unwrap();

    assert_matches!(
        reader.item(0).unwrap_err().current_context(),
        SlabError::UseAfterRelease
    );
    assert_matches!(
        reader.item_count().unwrap_err().current_context(),
        SlabError::UseAfterRelease
    );
    // Release is one-shot.
    assert_matches!(
        reader.release().unwrap_err().current_context(),
        SlabError::UseAfterRelease
    );

    // Releasing a reader never unlinks the segment.
    assert!(fx.mount.join(segment_name(&fx.identity)).exists());
}

#[test]
fn test_concurrent_readers_see_the_same_bytes() {
    let fx = built_fixture("concurrent");

    let options = fx.segment_options();
    let first = SlabReader::attach(&fx.identity, &options).unwrap();
    let second = SlabReader::attach(&fx.identity, &options).unwrap();

    assert_eq!(first.item(3).unwrap(), second.item(3).unwrap());
}

#[test]
fn test_corrupt_header_is_rejected() {
    let fx = empty_fixture("corrupt");

    // A segment-sized file whose header bytes are garbage.
    std::fs::write(
        fx.mount.join(segment_name(&fx.identity)),
        vec![0xffu8; 64],
    )
    .unwrap();

    let err = SlabReader::attach(&fx.identity, &fx.segment_options()).unwrap_err();
    assert_matches!(err.current_context(), SlabError::CorruptHeader);
}
