pub mod file;
pub mod identity;

pub use file::*;
pub use identity::*;
