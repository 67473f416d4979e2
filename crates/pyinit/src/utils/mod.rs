pub mod child;
pub mod errors;
pub mod git;
pub mod hooks;
pub mod import;
pub mod log;
pub mod manifest;
pub mod metadata;
pub mod python;
pub mod session;
pub mod specifier;
pub mod venv;
pub mod which;
pub mod wizard;
