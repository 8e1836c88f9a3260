//! Lazy, batched rewriting and loading of the classes of an archive.

pub mod batch;
pub mod cache;
pub mod holder;
pub mod loader;
pub mod source;
pub mod task;

pub use batch::{partition, BatchHolder, BatchTable, HolderMapper};
pub use cache::{CacheEntry, CacheLayout};
pub use holder::ContainerHolder;
pub use loader::{ClassFile, ContainerLoader, DexContainerLoader, DexLoadedContainer, LoadedContainer};
pub use source::ArchiveClassSource;
pub use task::{ContainerTask, ContainerTaskFactory, DexSource};
