//! The rewrite, cache and load work of one batch.

use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use once_cell::sync::OnceCell;

use crate::dex::ClassContainer;
use crate::error::OpenerError;
use crate::opener::cache::CacheLayout;
use crate::opener::loader::{ContainerLoader, LoadedContainer};
use crate::rewriter::FinalModifierRewriter;

/// One dex entry of the archive. It is decoded the first time one of its
/// batches runs, and the decoded form is shared by the other batches.
pub struct DexSource {
    name: String,
    bytes: Arc<Vec<u8>>,
    decoded: OnceCell<ClassContainer>,
}

impl fmt::Debug for DexSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DexSource").field("name", &self.name).field("len", &self.bytes.len()).finish()
    }
}

impl DexSource {
    pub fn new(name: impl Into<String>, bytes: Arc<Vec<u8>>) -> DexSource {
        DexSource { name: name.into(), bytes, decoded: OnceCell::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn container(&self) -> Result<&ClassContainer, OpenerError> {
        self.decoded.get_or_try_init(|| {
            debug!("decoding {} ({} bytes)", self.name, self.bytes.len());
            ClassContainer::from_bytes(&self.bytes).map_err(OpenerError::from)
        })
    }
}

/// Creates the tasks of the batches of one archive.
#[derive(Clone)]
pub struct ContainerTaskFactory {
    cache: CacheLayout,
    loader: Arc<dyn ContainerLoader>,
    rewriter: FinalModifierRewriter,
}

impl ContainerTaskFactory {
    pub fn new(cache: CacheLayout, loader: Arc<dyn ContainerLoader>) -> ContainerTaskFactory {
        ContainerTaskFactory { cache, loader, rewriter: FinalModifierRewriter::new() }
    }

    /// `index` is the 1-based batch number within the archive and names the
    /// cache files; `descriptors` are the type descriptors of the batch, e.g. `Lfoo/Bar;`.
    pub fn new_task(&self, source: Arc<DexSource>, index: usize, descriptors: Vec<String>) -> ContainerTask {
        ContainerTask {
            source,
            index,
            descriptors,
            cache: self.cache.clone(),
            loader: Arc::clone(&self.loader),
            rewriter: self.rewriter,
        }
    }
}

pub struct ContainerTask {
    source: Arc<DexSource>,
    index: usize,
    descriptors: Vec<String>,
    cache: CacheLayout,
    loader: Arc<dyn ContainerLoader>,
    rewriter: FinalModifierRewriter,
}

impl ContainerTask {
    pub fn run(self) -> Result<Arc<dyn LoadedContainer>, OpenerError> {
        let container = self.source.container()?;
        let batch = container.select(self.descriptors.iter().map(String::as_str));
        let rewritten = self.rewriter.rewrite(&batch);
        let bytes = rewritten.to_bytes()?;

        let entry = self.cache.entry(self.index);
        entry.store(bytes)?;
        info!(
            "rewrote {} classes of {} into {}",
            rewritten.len(),
            self.source.name(),
            entry.source.display()
        );
        self.loader.load(&entry.source, &entry.optimized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opener::loader::DexContainerLoader;
    use crate::tests::fixtures::{DexFixture, FixtureClass};
    use std::path::Path;

    fn factory(cache: &Path) -> ContainerTaskFactory {
        ContainerTaskFactory::new(CacheLayout::for_archive(cache, Path::new("app.apk")), Arc::new(DexContainerLoader))
    }

    #[test]
    fn a_task_loads_only_its_batch_with_final_removed() {
        let cache = tempfile::tempdir().unwrap();
        let dex = DexFixture::new()
            .class(FixtureClass::new("La/A;").final_class().method("run", 0x11))
            .class(FixtureClass::new("La/B;").final_class())
            .to_bytes();
        let source = Arc::new(DexSource::new("classes.dex", Arc::new(dex)));

        let loaded = factory(cache.path()).new_task(source, 1, vec!["La/A;".to_string()]).run().unwrap();
        let a = loaded.resolve("a.A").unwrap();
        assert!(!a.access_flags().is_final());
        assert!(!a.method("run").unwrap().access_flags.is_final());
        assert!(loaded.resolve("a.B").is_none());
    }

    #[test]
    fn batches_of_one_entry_share_the_decoded_dex() {
        let cache = tempfile::tempdir().unwrap();
        let dex = DexFixture::new().numbered("p", 3).to_bytes();
        let source = Arc::new(DexSource::new("classes.dex", Arc::new(dex)));
        let factory = factory(cache.path());

        factory.new_task(Arc::clone(&source), 1, vec!["Lp/C0;".to_string()]).run().unwrap();
        let first = source.container().unwrap() as *const ClassContainer;
        factory.new_task(Arc::clone(&source), 2, vec!["Lp/C2;".to_string()]).run().unwrap();
        assert_eq!(first, source.container().unwrap() as *const ClassContainer);
    }

    #[test]
    fn malformed_dex_is_invalid_data() {
        let cache = tempfile::tempdir().unwrap();
        let source = Arc::new(DexSource::new("classes.dex", Arc::new(b"dex\n035\0 truncated".to_vec())));
        let e = factory(cache.path()).new_task(source, 1, vec![]).run().err().unwrap();
        assert_eq!(e.io_kind(), Some(std::io::ErrorKind::InvalidData));
    }
}
