//! Slab reader: a zero-copy view over an existing shared memory slab.
//!
//! Readers re-derive the segment name from the dataset identity, attach
//! to the segment, and borrow item bytes straight out of the mapping.
//! They never create, mutate, or destroy the segment; any number of
//! readers may be attached concurrently.

mod reader;

pub use reader::{SlabItems, SlabReader};
