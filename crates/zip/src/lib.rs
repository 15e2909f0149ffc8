pub mod entry;
pub mod errors;

#[cfg(any(test, feature = "builder"))]
pub mod builder;

mod structs;

#[cfg(any(test, feature = "builder"))]
pub use builder::ZipBuilder;
pub use entry::*;
pub use errors::*;
