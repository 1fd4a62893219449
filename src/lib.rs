#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod assets;
pub mod config;
pub mod content;
pub mod embed;
pub mod intro;
pub mod markdown;
pub mod player;
pub mod sequence;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
