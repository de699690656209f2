//! Small helpers shared by the file-backed stores.

mod fs;
mod ids;

pub use fs::write_atomic;
pub use ids::{path_component, sanitize_component};
