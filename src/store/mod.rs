//! In-memory stores shared by all calls.

/// Search predicate and memory size conversion.
pub mod filter;

/// Uploaded image files.
pub mod image;

/// Laptop catalog.
pub mod laptop;

/// Running laptop ratings.
pub mod rating;

pub use filter::{is_qualified, to_bits};
pub use image::{ImageInfo, ImageStore};
pub use laptop::LaptopStore;
pub use rating::{Rating, RatingStore};
