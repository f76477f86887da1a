//! Per-frame virtual texture page residency: decodes the GPU feedback
//! buffer, keeps a fixed-size physical atlas of resident pages under LRU,
//! and maintains the indirection table samplers read through. The compute
//! shader that writes feedback and the one that generates mip chains are
//! out-of-scope render-pass collaborators; this crate is bookkeeping only
//! and has no GPU dependency, so it is fully testable on the CPU.

pub mod atlas;
pub mod error;
pub mod indirection;
pub mod manager;
pub mod mip;
pub mod options;
pub mod page;

pub use atlas::PhysicalAtlas;
pub use error::ResidencyError;
pub use indirection::IndirectionTable;
pub use manager::{FeedbackSample, ResidencyManager, TextureKind, TileCopyRegion, TEXTURE_KINDS};
pub use options::ResidencyOptions;
pub use page::{Page, VirtualPageKey, SENTINEL_KEY};
