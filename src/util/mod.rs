pub mod assets;
pub mod env;
pub mod helix;
pub mod request;
pub mod tracing;
pub mod viewer;
