//! Pure pixel operations on RGBA buffers: bounding resize, mask normalization,
//! alpha transfer and flattening onto a backdrop.

pub mod color;
pub mod flatten;
pub mod mask;
pub mod resize;

pub use color::Background;
pub use flatten::flatten;
pub use mask::{apply_alpha, extract_alpha_mask, fit_mask, resolve, MaskAdapter, MaskResult, RawMask, Resolved};
pub use resize::{bounded_dimensions, resize_to_bound, DEFAULT_MAX_DIMENSION};
