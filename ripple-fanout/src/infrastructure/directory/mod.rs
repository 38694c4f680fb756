pub mod cached;
pub mod static_directory;

pub use cached::CachedUserDirectory;
pub use static_directory::{StaticTargetResolver, StaticUserDirectory};
