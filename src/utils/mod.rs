//! Utility modules shared by the library and the binary.

pub mod logger;
