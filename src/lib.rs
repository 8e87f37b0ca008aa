#![deny(unsafe_op_in_unsafe_fn)]
#![cfg_attr(feature = "doc_auto_cfg", feature(doc_auto_cfg))]

#[cfg(feature = "ffi")]
pub mod ffi;

pub mod branch;
pub mod build;
pub mod catalog;
pub mod dol;
pub mod memory;
pub mod patcher;
pub mod riivolution;
pub mod symbols;

pub use branch::{encode_branch, install_conditional_branch, BranchInstruction};
pub use build::{identify_build, Build, BuildCode, Region, Revision};
pub use catalog::{BuildPredicate, Catalog, CatalogEntry, PatchSite, Payload};
pub use memory::{PatchableMemory, SparseMemory};
pub use patcher::{PatchConfig, Patcher, Target};
