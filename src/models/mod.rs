//! Data models

mod image;

pub use image::*;
