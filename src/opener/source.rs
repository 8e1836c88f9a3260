//! The entry point callers resolve classes through.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use once_cell::sync::OnceCell;

use crate::android::zip::ApkFile;
use crate::config::OpenerConfig;
use crate::error::OpenerError;
use crate::filter::ClassNameFilter;
use crate::opener::batch::{BatchTable, HolderMapper};
use crate::opener::cache::CacheLayout;
use crate::opener::loader::{ClassFile, ContainerLoader, DexContainerLoader};
use crate::opener::task::{ContainerTaskFactory, DexSource};

/// Serves classes of one archive with their `final` modifiers removed.
///
/// The archive is scanned on the first accepted lookup; each class is then
/// rewritten and loaded together with the rest of its batch the first time any
/// class of that batch is requested.
pub struct ArchiveClassSource {
    archive: PathBuf,
    filter: ClassNameFilter,
    mapper: HolderMapper,
    batches: OnceCell<BatchTable>,
}

impl ArchiveClassSource {
    pub fn new(
        archive: impl Into<PathBuf>,
        config: &OpenerConfig,
        loader: Arc<dyn ContainerLoader>,
    ) -> Result<ArchiveClassSource, OpenerError> {
        config.validate()?;
        let archive = archive.into();
        let cache = CacheLayout::for_archive(&config.cache_dir, &archive);
        debug!("{} caches into {}", archive.display(), cache.dir().display());
        let tasks = ContainerTaskFactory::new(cache, loader);
        Ok(ArchiveClassSource {
            archive,
            filter: config.filter(),
            mapper: HolderMapper::new(config.filter(), config.batch_size, tasks),
            batches: OnceCell::new(),
        })
    }

    /// A source that loads batches in-process with [`DexContainerLoader`].
    pub fn with_dex_loader(archive: impl Into<PathBuf>, config: &OpenerConfig) -> Result<ArchiveClassSource, OpenerError> {
        ArchiveClassSource::new(archive, config, Arc::new(DexContainerLoader))
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// Returns the rewritten class `class_name` (a Java name such as `foo.Bar`).
    ///
    /// `Ok(None)` means the name is not eligible for rewriting, or the loaded
    /// batch does not define it. A name that passes the filter but is declared
    /// by no dex entry of the archive is an [`OpenerError::IllegalState`].
    pub fn get_class_file(&self, class_name: &str) -> Result<Option<ClassFile>, OpenerError> {
        if !self.filter.accept(class_name) {
            return Ok(None);
        }
        let batches = self.batches.get_or_try_init(|| self.map_batches())?;
        let holder = batches
            .get(class_name)
            .ok_or_else(|| OpenerError::illegal_state(format!("{} was not found in {}", class_name, self.archive.display())))?;
        let loaded = holder.materialize()?;
        Ok(loaded.resolve(class_name))
    }

    fn map_batches(&self) -> Result<BatchTable, OpenerError> {
        let entries = ApkFile::dex_entries_from_file(&self.archive)?.into_dex_entries();
        let mut table = BatchTable::new();
        for (name, bytes) in entries {
            let source = Arc::new(DexSource::new(name, Arc::new(bytes)));
            self.mapper.map(source, &mut table)?;
        }
        info!(
            "{}: {} classes eligible for opening in {} batches",
            self.archive.display(),
            table.len(),
            table.batch_count()
        );
        Ok(table)
    }
}
