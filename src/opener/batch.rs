//! Groups the classes of a dex entry into batches and gives each batch a holder.

use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;

use log::{debug, warn};

use crate::dex::read_class_names;
use crate::error::OpenerError;
use crate::filter::ClassNameFilter;
use crate::opener::holder::ContainerHolder;
use crate::opener::loader::LoadedContainer;
use crate::opener::task::{ContainerTaskFactory, DexSource};
use crate::types::ObjectIdentifier;

/// The holder of one batch, shared by every class name of that batch.
pub type BatchHolder = Arc<ContainerHolder<Arc<dyn LoadedContainer>>>;

/// Splits `names` into consecutive batches of at most `batch_size` names.
pub fn partition(names: Vec<String>, batch_size: usize) -> Vec<Vec<String>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(names.len().div_ceil(batch_size));
    let mut names = names.into_iter().peekable();
    while names.peek().is_some() {
        batches.push(names.by_ref().take(batch_size).collect());
    }
    batches
}

/// Every batch of one archive, and the holder of each class name.
#[derive(Default)]
pub struct BatchTable {
    holders: HashMap<String, BatchHolder>,
    batches: usize,
}

impl BatchTable {
    pub fn new() -> BatchTable {
        BatchTable::default()
    }

    pub fn get(&self, class_name: &str) -> Option<&BatchHolder> {
        self.holders.get(class_name)
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.holders.contains_key(class_name)
    }

    /// Number of class names with a holder.
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn batch_count(&self) -> usize {
        self.batches
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.holders.keys().map(String::as_str)
    }

    pub fn holders(&self) -> impl Iterator<Item = &BatchHolder> {
        self.holders.values()
    }
}

impl Index<&str> for BatchTable {
    type Output = BatchHolder;

    fn index(&self, class_name: &str) -> &BatchHolder {
        &self.holders[class_name]
    }
}

pub struct HolderMapper {
    filter: ClassNameFilter,
    batch_size: usize,
    tasks: ContainerTaskFactory,
}

impl HolderMapper {
    pub fn new(filter: ClassNameFilter, batch_size: usize, tasks: ContainerTaskFactory) -> HolderMapper {
        HolderMapper { filter, batch_size, tasks }
    }

    /// Adds a batch holder for every accepted class of `source` to `table`.
    ///
    /// Entries must be mapped in multidex order: a class already in `table`
    /// was defined by an earlier entry, which is the definition the runtime
    /// would load, so the later one is skipped.
    pub fn map(&self, source: Arc<DexSource>, table: &mut BatchTable) -> Result<(), OpenerError> {
        let mut names = Vec::new();
        for name in read_class_names(source.bytes())? {
            if !self.filter.accept(&name) {
                continue;
            }
            if table.contains(&name) {
                warn!("{} is defined again by {}, keeping the first definition", name, source.name());
                continue;
            }
            names.push(name);
        }

        let batches = partition(names, self.batch_size);
        debug!("{}: {} batches", source.name(), batches.len());
        for batch in batches {
            table.batches += 1;
            let index = table.batches;
            let descriptors = batch
                .iter()
                .map(|name| ObjectIdentifier::from_java_type(name).as_jni_type())
                .collect();
            let task = self.tasks.new_task(Arc::clone(&source), index, descriptors);
            let label = format!("{} batch {}", source.name(), index);
            let holder: BatchHolder = Arc::new(ContainerHolder::new(label, move || task.run()));
            for name in batch {
                table.holders.insert(name, Arc::clone(&holder));
            }
        }
        Ok(())
    }
}
