use std::path::PathBuf;

use error_stack::ResultExt;
use memmap2::MmapMut;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pixslab_common::codec::ImageCodec;
use pixslab_common::dataset::DatasetSource;
use pixslab_common::error::{FormattedSize, Result, SlabError};
use pixslab_common::feasibility::{check_feasibility, FeasibilityOptions};
use pixslab_common::header::SlabHeader;
use pixslab_common::naming::segment_name;
use pixslab_common::segment::{SharedSegment, SharedSegmentOptions};
use pixslab_common::SlabProfile;

use crate::profile::profile_items;

/// Options for building a slab.
#[derive(Debug, Clone, Default)]
pub struct SlabBuilderOptions {
    pub segment: SharedSegmentOptions,
    pub feasibility: FeasibilityOptions,
}

/// Builds slab segments out of datasets.
pub struct SlabBuilder<C> {
    codec: C,
    options: SlabBuilderOptions,
}

impl<C> SlabBuilder<C>
where
    C: ImageCodec,
{
    pub fn new(codec: C) -> Self {
        Self::with_options(codec, SlabBuilderOptions::default())
    }

    pub fn with_options(codec: C, options: SlabBuilderOptions) -> Self {
        Self { codec, options }
    }

    /// Materialize `dataset` into a new shared memory segment.
    ///
    /// The wire format carries no completion signal: a reader attaching
    /// while this runs sees a valid header over an incomplete payload.
    /// Start readers only after this call has returned.
    pub fn build<D>(&self, dataset: &D) -> Result<SlabHandle>
    where
        D: DatasetSource,
    {
        let identity = dataset.identity();
        let name = segment_name(&identity);

        let items = dataset.items()?;
        let profile = profile_items(&items, &self.codec)
            .attach_printable_lazy(|| format!("dataset: {}", identity))?;
        let required = profile.required_bytes()?;

        check_feasibility(required, &self.options.feasibility)?;

        let segment = SharedSegment::create(&name, required, &self.options.segment)?;
        let mmap = match self.populate(&segment, &profile, &items) {
            Ok(mmap) => mmap,
            Err(err) => {
                // A failed build must not leave a partial slab registered
                // under a reusable name.
                if let Err(unlink_err) = segment.unlink() {
                    warn!(segment = %name, error = ?unlink_err, "failed to unlink partial segment");
                }
                return Err(err);
            }
        };

        info!(
            segment = %name,
            items = profile.item_count,
            size = %FormattedSize(required),
            "populated slab segment"
        );

        Ok(SlabHandle {
            name,
            size: required,
            segment,
            mmap: Some(mmap),
        })
    }

    fn populate(
        &self,
        segment: &SharedSegment,
        profile: &SlabProfile,
        items: &[PathBuf],
    ) -> Result<MmapMut> {
        let mut mmap = segment.map_mut()?;

        // The header lands before any payload byte, so even a reader
        // that attaches mid-build parses a valid layout.
        let header = SlabHeader::new(*profile);
        header.write_to(&mut mmap)?;

        let item_bytes = profile.item_bytes()? as usize;
        let payload_offset = header.payload_offset() as usize;

        for (index, path) in items.iter().enumerate() {
            let image = self.codec.decode(path)?;

            if image.shape != profile.shape || image.element_type != profile.element_type {
                return Err(SlabError::ShapeMismatch { index })
                    .attach_printable_lazy(|| format!("item: {:?}", path))
                    .attach_printable_lazy(|| {
                        format!(
                            "expected {} {}, decoded {} {}",
                            profile.shape, profile.element_type, image.shape, image.element_type
                        )
                    });
            }
            if image.data.len() != item_bytes {
                return Err(SlabError::ShapeMismatch { index })
                    .attach_printable_lazy(|| format!("item: {:?}", path))
                    .attach_printable_lazy(|| {
                        format!(
                            "expected {} bytes, decoded {}",
                            item_bytes,
                            image.data.len()
                        )
                    });
            }

            let start = payload_offset + index * item_bytes;
            mmap[start..start + item_bytes].copy_from_slice(&image.data);
        }

        mmap.flush()
            .change_context(SlabError::Io)
            .attach_printable("failed to flush the populated slab")?;

        Ok(mmap)
    }
}

/// A built slab, held open by the owning process.
///
/// The handle is the slab's lifecycle state: `release` detaches the
/// local mapping but leaves the segment resident for readers; `unlink`
/// (or `serve` reaching its cancellation) destroys it. A handle dropped
/// without either leaves the segment in the namespace, exactly like a
/// crashed builder would.
#[derive(Debug)]
pub struct SlabHandle {
    name: String,
    size: u64,
    segment: SharedSegment,
    mmap: Option<MmapMut>,
}

impl SlabHandle {
    /// Name readers derive from the same dataset identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Total segment size, header included.
    pub fn size_bytes(&self) -> u64 {
        self.size
    }

    /// Detach the local mapping, leaving the segment for readers.
    pub fn release(&mut self) -> Result<()> {
        if let Some(mmap) = self.mmap.take() {
            mmap.flush()
                .change_context(SlabError::Io)
                .attach_printable("failed to flush slab mapping on release")?;
        }
        Ok(())
    }

    /// Destroy the segment, removing its name from the mount namespace.
    pub fn unlink(mut self) -> Result<()> {
        self.release()?;
        self.segment.unlink()
    }

    /// Hold the slab open until `token` is cancelled, then destroy it.
    ///
    /// This is the producer's steady state: readers attach freely while
    /// the future is pending. Cancellation, typically wired to an
    /// interrupt via `shutdown::cancel_on_interrupt`, is the one path
    /// that unlinks the segment.
    pub async fn serve(mut self, token: CancellationToken) -> Result<()> {
        self.release()?;
        info!(
            segment = %self.name,
            size = %FormattedSize(self.size),
            "serving slab until shutdown"
        );

        token.cancelled().await;

        info!(segment = %self.name, "shutdown requested, unlinking slab");
        self.segment.unlink()
    }
}
