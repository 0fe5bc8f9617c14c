pub mod archive;
pub mod quota;
pub mod sandbox;
pub mod staging;
pub mod template;
pub mod tree;

pub use sandbox::{Sandbox, SandboxError};
