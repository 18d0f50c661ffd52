//! Image selection and provisioning.
//!
//! - [`tag`]: which base image a session runs (pure, no engine calls)
//! - [`recipe`]: the identity-rename layer for Advanced sessions
//! - [`provision`]: making sure the chosen image is in the local store

pub mod provision;
pub mod recipe;
pub mod tag;

pub use provision::ImageProvisioner;
pub use recipe::{custom_tag, RecipeFlavor};
pub use tag::{resolve_tag, Arch, ImageReference, TagResolver, DEFAULT_REPOSITORY};
