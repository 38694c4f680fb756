pub mod cache;
pub mod directory;
pub mod persistence;
pub mod push;
pub mod realtime;
pub mod retry;
