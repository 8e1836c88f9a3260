//! Loading of rewritten batches into something classes can be resolved from.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::android::zip::ApkFile;
use crate::dex::{ClassContainer, ClassDefinition, MethodDefinition};
use crate::error::OpenerError;
use crate::types::AccessFlags;

/// Turns a cached batch into a loaded container.
///
/// `source` is the zip written by the cache; `optimized` does not exist when
/// `load` is called and may be created by the loader.
pub trait ContainerLoader: Send + Sync {
    fn load(&self, source: &Path, optimized: &Path) -> Result<Arc<dyn LoadedContainer>, OpenerError>;
}

/// A batch after loading.
pub trait LoadedContainer: Send + Sync {
    /// Looks a class up by its Java name.
    fn resolve(&self, class_name: &str) -> Option<ClassFile>;
}

/// One class of a loaded container.
#[derive(Clone)]
pub struct ClassFile {
    container: Arc<ClassContainer>,
    index: usize,
    name: String,
}

impl fmt::Debug for ClassFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassFile").field("name", &self.name).finish_non_exhaustive()
    }
}

impl ClassFile {
    pub fn new(container: Arc<ClassContainer>, index: usize) -> Option<ClassFile> {
        let name = container.classes().get(index)?.java_name();
        Some(ClassFile { container, index, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &ClassDefinition {
        &self.container.classes()[self.index]
    }

    pub fn access_flags(&self) -> AccessFlags {
        self.definition().access_flags
    }

    /// The `accessFlags` recorded by the class's `InnerClass` annotation.
    pub fn inner_class_access_flags(&self) -> Option<i32> {
        let pools = self.container.pools();
        let name_idx = pools.string_index("accessFlags")?;
        let item = self.definition().inner_class_annotation(pools)?;
        item.annotation.element(name_idx)?.value.as_int()
    }

    /// The first direct or virtual method called `name`.
    pub fn method(&self, name: &str) -> Option<&MethodDefinition> {
        let pools = self.container.pools();
        self.definition()
            .methods()
            .find(|m| pools.method_name(m.method_idx) == Some(name))
    }

    /// A dex file defining only this class.
    pub fn to_bytes(&self) -> Result<Vec<u8>, OpenerError> {
        let single = self.container.with_classes(vec![self.definition().clone()]);
        Ok(single.to_bytes()?)
    }
}

/// Loads batches in-process by decoding the cached dex.
#[derive(Debug, Default, Clone, Copy)]
pub struct DexContainerLoader;

impl ContainerLoader for DexContainerLoader {
    fn load(&self, source: &Path, optimized: &Path) -> Result<Arc<dyn LoadedContainer>, OpenerError> {
        let archive = ApkFile::from_file(source)?;
        let entry = archive.entry("classes.dex").ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no classes.dex in {}", source.display()))
        })?;
        let container = ClassContainer::from_bytes(&entry.data)?;
        fs::write(optimized, &entry.data)?;
        debug!("loaded {} classes from {}", container.len(), source.display());
        Ok(Arc::new(DexLoadedContainer::new(container)))
    }
}

/// The classes of one decoded dex, indexed by Java name.
pub struct DexLoadedContainer {
    container: Arc<ClassContainer>,
    by_name: HashMap<String, usize>,
}

impl DexLoadedContainer {
    pub fn new(container: ClassContainer) -> DexLoadedContainer {
        let by_name = container
            .classes()
            .iter()
            .enumerate()
            .map(|(i, c)| (c.java_name(), i))
            .collect();
        DexLoadedContainer { container: Arc::new(container), by_name }
    }
}

impl LoadedContainer for DexLoadedContainer {
    fn resolve(&self, class_name: &str) -> Option<ClassFile> {
        let index = *self.by_name.get(class_name)?;
        ClassFile::new(Arc::clone(&self.container), index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opener::cache::CacheLayout;
    use crate::tests::fixtures::{DexFixture, FixtureClass};

    #[test]
    fn loads_a_cached_batch() {
        let cache = tempfile::tempdir().unwrap();
        let entry = CacheLayout::for_archive(cache.path(), Path::new("app.apk")).entry(1);
        let dex = DexFixture::new()
            .class(FixtureClass::new("Lfoo/Bar;").method("run", 0x11).inner_class("Bar", 0x19))
            .class(FixtureClass::new("Lfoo/Baz;"))
            .to_bytes();
        entry.store(dex.clone()).unwrap();

        let loaded = DexContainerLoader.load(&entry.source, &entry.optimized).unwrap();
        assert_eq!(fs::read(&entry.optimized).unwrap(), dex);

        let bar = loaded.resolve("foo.Bar").expect("foo.Bar");
        assert_eq!(bar.name(), "foo.Bar");
        assert_eq!(bar.access_flags(), AccessFlags::PUBLIC);
        assert_eq!(bar.inner_class_access_flags(), Some(0x19));
        assert_eq!(bar.method("run").map(|m| m.access_flags.bits()), Some(0x11));
        assert!(bar.method("missing").is_none());
        assert!(loaded.resolve("foo.Baz").unwrap().inner_class_access_flags().is_none());
        assert!(loaded.resolve("foo.Qux").is_none());
    }

    #[test]
    fn a_class_file_encodes_on_its_own() {
        let container = DexFixture::new()
            .class(FixtureClass::new("Lfoo/Bar;").method("run", 0x1))
            .class(FixtureClass::new("Lfoo/Baz;"))
            .build();
        let loaded = DexLoadedContainer::new(container);
        let bytes = loaded.resolve("foo.Baz").unwrap().to_bytes().unwrap();
        let single = ClassContainer::from_bytes(&bytes).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single.classes()[0].descriptor, "Lfoo/Baz;");
    }

    #[test]
    fn archives_without_classes_dex_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("classes1.zip");
        let mut zip = ApkFile::new();
        zip.replace_entry("other.txt", b"x".to_vec()).unwrap();
        zip.write_to_file(&source).unwrap();

        let e = DexContainerLoader.load(&source, &dir.path().join("classes1.zip.dex")).err().unwrap();
        assert_eq!(e.io_kind(), Some(io::ErrorKind::NotFound));
    }
}
