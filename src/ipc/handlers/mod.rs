pub mod core;
pub mod host;
pub mod lifecycle;
pub mod settings;
