//! Live source implementations

pub mod debugfs;

pub use debugfs::DebugfsScanner;
