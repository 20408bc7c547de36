pub mod cache;
pub mod config;
pub mod handle;
pub mod reload;
pub mod source;
