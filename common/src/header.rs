//! Binary slab header codec.
//!
//! The header is a fixed-offset record at the start of every segment:
//!
//! ```text
//! offset 0  : i32 header_size   (= 64, also the payload offset)
//! offset 4  : i32 item_count
//! offset 8  : i32 item_height
//! offset 12 : i32 item_width
//! offset 16 : i32 item_channels
//! offset 20 : i32 element type tag
//! offset 24..63 : reserved, zero filled
//! ```
//!
//! Fields are native endian: the segment never leaves the machine that
//! wrote it. `header_size` is the single source of truth for where the
//! payload begins; readers consult it instead of assuming 64, so the
//! header can grow without moving old readers off their fixed offsets.

use std::io::Cursor;

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use error_stack::ResultExt;

use crate::core::{ElementType, ItemShape, SlabProfile};
use crate::error::{Result, SlabError};

/// Total size of the slab header, in bytes.
///
/// Padded well past the current fields as forward-compatibility margin.
pub const SLAB_HEADER_SIZE: u64 = 64;

/// Smallest header any reader accepts: the five core i32 fields.
pub const MIN_HEADER_SIZE: i32 = 20;

/// End of the serialized fields; the rest of the header is padding.
const FIELDS_END: usize = 24;

/// Fixed-size binary record at the start of every slab segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabHeader {
    /// Header length in bytes, payload starts at this offset.
    pub header_size: i32,
    pub profile: SlabProfile,
}

impl SlabHeader {
    pub fn new(profile: SlabProfile) -> Self {
        Self {
            header_size: SLAB_HEADER_SIZE as i32,
            profile,
        }
    }

    /// Byte offset where the payload begins.
    pub fn payload_offset(&self) -> u64 {
        self.header_size as u64
    }

    /// Serialize the header into the first bytes of `buf`.
    pub fn write_to(&self, buf: &mut [u8]) -> Result<()> {
        let header_size = self.header_size as usize;
        if buf.len() < header_size {
            return Err(SlabError::CorruptHeader)
                .attach_printable("target buffer is shorter than the header");
        }

        let item_count = i32::try_from(self.profile.item_count)
            .change_context(SlabError::SlabTooLarge)
            .attach_printable("item count does not fit the header field")?;

        let fields = [
            self.header_size,
            item_count,
            self.profile.shape.height as i32,
            self.profile.shape.width as i32,
            self.profile.shape.channels as i32,
            self.profile.element_type.tag(),
        ];

        let mut cursor = Cursor::new(&mut buf[..]);
        for field in fields {
            cursor
                .write_i32::<NativeEndian>(field)
                .change_context(SlabError::Io)
                .attach_printable("failed to serialize the slab header")?;
        }

        buf[FIELDS_END..header_size].fill(0);

        Ok(())
    }

    /// Parse and validate a header from the start of a mapped segment.
    ///
    /// `segment_len` is the total mapping length; a header whose payload
    /// would extend past it is rejected.
    pub fn read_from(buf: &[u8], segment_len: u64) -> Result<SlabHeader> {
        if buf.len() < MIN_HEADER_SIZE as usize {
            return Err(SlabError::CorruptHeader)
                .attach_printable("segment is shorter than the minimum header");
        }

        let mut cursor = Cursor::new(buf);
        let header_size = read_field(&mut cursor)?;
        let item_count = read_field(&mut cursor)?;
        let height = read_field(&mut cursor)?;
        let width = read_field(&mut cursor)?;
        let channels = read_field(&mut cursor)?;

        if header_size < MIN_HEADER_SIZE || header_size as u64 > segment_len {
            return Err(SlabError::CorruptHeader)
                .attach_printable_lazy(|| format!("header size out of range: {}", header_size));
        }
        if item_count < 0 || height <= 0 || width <= 0 || channels <= 0 {
            return Err(SlabError::CorruptHeader).attach_printable_lazy(|| {
                format!(
                    "non-positive dimensions: n={} shape={}x{}x{}",
                    item_count, height, width, channels
                )
            });
        }

        // The element tag sits in what old writers left as zeroed
        // padding; tag zero is u8, so their segments still parse.
        let tag = if header_size as usize >= FIELDS_END && buf.len() >= FIELDS_END {
            read_field(&mut cursor)?
        } else {
            0
        };
        let element_type = ElementType::from_tag(tag)
            .ok_or(SlabError::CorruptHeader)
            .attach_printable_lazy(|| format!("unknown element type tag: {}", tag))?;

        let header = SlabHeader {
            header_size,
            profile: SlabProfile {
                item_count: item_count as u32,
                shape: ItemShape::new(height as u32, width as u32, channels as u32),
                element_type,
            },
        };

        let payload_bytes = header
            .profile
            .payload_bytes()
            .change_context(SlabError::CorruptHeader)?;
        let end = header
            .payload_offset()
            .checked_add(payload_bytes)
            .ok_or(SlabError::CorruptHeader)
            .attach_printable("payload end overflows")?;
        if end > segment_len {
            return Err(SlabError::CorruptHeader).attach_printable_lazy(|| {
                format!(
                    "payload extends past the segment: end={} segment={}",
                    end, segment_len
                )
            });
        }

        Ok(header)
    }
}

fn read_field(cursor: &mut Cursor<&[u8]>) -> Result<i32> {
    cursor
        .read_i32::<NativeEndian>()
        .change_context(SlabError::CorruptHeader)
        .attach_printable("header field missing")
}
