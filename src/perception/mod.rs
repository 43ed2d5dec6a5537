pub mod screenshot;
pub mod traits;
pub mod types;
