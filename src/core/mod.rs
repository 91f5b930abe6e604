// Public modules
pub mod build;
pub mod context;
pub mod deploy;
pub mod error;
pub mod executor;
pub mod git;
pub mod identity;
pub mod paths;
pub mod stack;
pub mod tokens;
pub mod varfile;

// Public modules for CLI access
pub mod defaults;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
