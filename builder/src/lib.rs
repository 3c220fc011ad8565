//! Slab builder: materializes a dataset into a shared memory segment.
//!
//! The builder runs once per dataset identity: profile, feasibility
//! check, exclusive segment creation, header, payload, then a hold-open
//! phase during which any number of readers attach. Destruction is the
//! builder's responsibility alone and happens on its shutdown path.

mod builder;
mod profile;
pub mod shutdown;

pub use builder::{SlabBuilder, SlabBuilderOptions, SlabHandle};
pub use profile::profile_dataset;
