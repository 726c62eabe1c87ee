//! Kernel model set for lookup by kernel-type id.

use crate::features::kernel_family;
use crate::model::{DynRegressionModel, KernelRegressionModel};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct KernelModelSet {
    models: BTreeMap<String, DynRegressionModel>,
}

impl fmt::Debug for KernelModelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelModelSet")
            .field("kernel_ids", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KernelModelSet {
    pub fn new() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    pub fn register<M>(&mut self, kernel_id: impl Into<String>, model: M)
    where
        M: KernelRegressionModel + 'static,
    {
        self.models.insert(kernel_id.into(), Arc::new(model));
    }

    pub fn insert(&mut self, kernel_id: impl Into<String>, model: DynRegressionModel) {
        self.models.insert(kernel_id.into(), model);
    }

    /// Exact id first, then the id with separators removed (`add-relu` also
    /// matches a model stored as `addrelu`), then the same two forms of the
    /// kernel's family id (`conv-relu` falls back to `conv-bn-relu`).
    pub fn resolve(&self, kernel_type: &str) -> Option<(&str, DynRegressionModel)> {
        let family = kernel_family(kernel_type);
        let compact_family = family.replace('-', "");
        let candidates = [
            kernel_type.to_string(),
            kernel_type.replace('-', ""),
            family,
            compact_family,
        ];
        let found = candidates
            .iter()
            .find_map(|id| self.models.get_key_value(id.as_str()))
            .map(|(id, model)| (id.as_str(), Arc::clone(model)));
        found
    }

    pub fn get(&self, kernel_id: &str) -> Option<DynRegressionModel> {
        self.models.get(kernel_id).map(Arc::clone)
    }

    pub fn kernel_ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
