//! # dexopener
//!
//! Serves the classes of an Android application archive with their `final`
//! modifiers removed, so that test doubles can subclass them.
//!
//! Classes are rewritten lazily, a batch at a time: the first request for a
//! class rewrites every class of its batch, stores the result in a cache
//! directory and loads it through a [`opener::ContainerLoader`]. The work of a
//! batch runs at most once no matter how many threads ask for its classes.
//!
//! # Examples
//!
//! ```no_run
//! use dexopener::{ArchiveClassSource, OpenerConfig};
//!
//! let config = OpenerConfig::for_data_dir("/data/data/com.example.app");
//! let source = ArchiveClassSource::with_dex_loader("/data/app/com.example.app/base.apk", &config)?;
//! if let Some(class) = source.get_class_file("com.example.app.Greeter")? {
//!     assert!(!class.access_flags().is_final());
//! }
//! # Ok::<(), dexopener::OpenerError>(())
//! ```

#[macro_use]
pub mod dex;

pub mod android;
pub mod config;
pub mod error;
pub mod filter;
pub mod opener;
pub mod rewriter;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::OpenerConfig;
pub use error::OpenerError;
pub use filter::ClassNameFilter;
pub use opener::{ArchiveClassSource, ClassFile, ContainerLoader, LoadedContainer};
pub use rewriter::FinalModifierRewriter;
