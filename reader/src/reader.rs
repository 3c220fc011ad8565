use error_stack::ResultExt;
use memmap2::Mmap;
use tracing::debug;

use pixslab_common::error::{Result, SlabError};
use pixslab_common::header::SlabHeader;
use pixslab_common::naming::segment_name;
use pixslab_common::segment::{SharedSegment, SharedSegmentOptions};
use pixslab_common::{DatasetIdentity, ElementType, ItemShape};

/// Read side of a slab.
///
/// The segment must be fully populated before attaching: the wire format
/// carries no completion signal, so a reader that attaches mid-build
/// sees a valid header over incomplete payload bytes.
#[derive(Debug)]
pub struct SlabReader {
    name: String,
    mapped: Option<Mapped>,
}

#[derive(Debug)]
struct Mapped {
    // Keeps the segment handle alive for as long as the mapping is.
    _segment: SharedSegment,
    mmap: Mmap,
    header: SlabHeader,
    item_bytes: usize,
}

impl SlabReader {
    /// Attach to the slab segment derived from `identity`.
    pub fn attach(identity: &DatasetIdentity, options: &SharedSegmentOptions) -> Result<Self> {
        let name = segment_name(identity);

        let segment = SharedSegment::open(&name, options)
            .attach_printable_lazy(|| format!("identity: {}", identity))?;
        let size = segment.size()?;
        let mmap = segment.map()?;

        let header = SlabHeader::read_from(&mmap, size)?;
        let item_bytes = header
            .profile
            .item_bytes()
            .change_context(SlabError::CorruptHeader)? as usize;

        debug!(
            segment = %name,
            items = header.profile.item_count,
            shape = %header.profile.shape,
            "attached to slab segment"
        );

        Ok(Self {
            name,
            mapped: Some(Mapped {
                _segment: segment,
                mmap,
                header,
                item_bytes,
            }),
        })
    }

    fn mapped(&self) -> Result<&Mapped> {
        self.mapped
            .as_ref()
            .ok_or(SlabError::UseAfterRelease)
            .attach_printable_lazy(|| format!("segment: {}", self.name))
    }

    /// Name of the attached segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of items in the slab.
    pub fn item_count(&self) -> Result<usize> {
        Ok(self.mapped()?.header.profile.item_count as usize)
    }

    /// Shape shared by every item.
    pub fn shape(&self) -> Result<ItemShape> {
        Ok(self.mapped()?.header.profile.shape)
    }

    /// Element type shared by every item.
    pub fn element_type(&self) -> Result<ElementType> {
        Ok(self.mapped()?.header.profile.element_type)
    }

    /// Borrow the bytes of item `index` without copying.
    pub fn item(&self, index: usize) -> Result<&[u8]> {
        let mapped = self.mapped()?;

        let len = mapped.header.profile.item_count as usize;
        if index >= len {
            return Err(SlabError::IndexOutOfRange { index, len })
                .attach_printable_lazy(|| format!("segment: {}", self.name));
        }

        let start = mapped.header.payload_offset() as usize + index * mapped.item_bytes;
        Ok(&mapped.mmap[start..start + mapped.item_bytes])
    }

    /// Borrow the whole payload without copying.
    pub fn payload(&self) -> Result<&[u8]> {
        let mapped = self.mapped()?;

        let start = mapped.header.payload_offset() as usize;
        let len = mapped.header.profile.item_count as usize * mapped.item_bytes;
        Ok(&mapped.mmap[start..start + len])
    }

    /// Iterate over all items in order.
    pub fn items(&self) -> Result<SlabItems<'_>> {
        let mapped = self.mapped()?;
        Ok(SlabItems {
            reader: self,
            index: 0,
            len: mapped.header.profile.item_count as usize,
        })
    }

    /// Drop the local mapping and segment handle.
    ///
    /// Never unlinks: the builder owns the segment's existence. Safe to
    /// call exactly once; reads after release fail with
    /// `UseAfterRelease`, as does a second release.
    pub fn release(&mut self) -> Result<()> {
        match self.mapped.take() {
            Some(_) => {
                debug!(segment = %self.name, "released slab mapping");
                Ok(())
            }
            None => Err(SlabError::UseAfterRelease)
                .attach_printable_lazy(|| format!("segment: {}", self.name)),
        }
    }
}

/// Iterator over the items of an attached slab.
pub struct SlabItems<'a> {
    reader: &'a SlabReader,
    index: usize,
    len: usize,
}

impl<'a> Iterator for SlabItems<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.len {
            return None;
        }
        let item = SlabReader::item(self.reader, self.index).ok()?;
        self.index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.index;
        (remaining, Some(remaining))
    }
}
