//! Android packaging: reading application archives and writing cache archives.

pub mod zip;
