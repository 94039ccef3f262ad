//! Composable transforms: the [`Transform`] trait and the vision operations
//! built on it.

pub mod core;
pub mod vision;

pub use core::{Chain, Transform};
