pub mod color;
pub mod traits;
