//! Output shaping helpers that keep replies inside platform size limits

pub mod paginate;
pub mod truncate;

pub use paginate::{paginate, Page, PAGE_SEPARATOR};
pub use truncate::truncate;
