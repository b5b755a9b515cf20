pub mod client;
pub mod core;
pub mod machine;
