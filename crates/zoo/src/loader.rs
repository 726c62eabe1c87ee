//! Predictor zoo loading: validate the cache, fetch when incomplete, then
//! deserialize every kernel model and locate the fusion rule.

use crate::error::{Result, ZooError};
use crate::fetch::ArtifactFetcher;
use crate::locks::DirectoryLocks;
use crate::profile::HardwareProfile;
use crate::validator::{scan_model_files, CacheValidator};
use kernelmeter_ir::FusionRuleDocument;
use kernelmeter_kernels::{JsonModelFormat, KernelModelSet, ModelFormat};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Models and fusion rule location for one hardware profile.
#[derive(Debug, Clone)]
pub struct LoadedZoo {
    pub profile: HardwareProfile,
    pub models: KernelModelSet,
    pub fusion_rule_path: PathBuf,
}

impl LoadedZoo {
    pub fn fusion_rules(&self) -> Result<FusionRuleDocument> {
        Ok(FusionRuleDocument::load(&self.fusion_rule_path)?)
    }
}

pub struct ZooLoader {
    root: PathBuf,
    fetcher: Arc<dyn ArtifactFetcher>,
    format: Arc<dyn ModelFormat>,
    validator: CacheValidator,
    locks: Arc<DirectoryLocks>,
}

impl fmt::Debug for ZooLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZooLoader")
            .field("root", &self.root)
            .field("extension", &self.validator.extension())
            .finish()
    }
}

impl ZooLoader {
    pub fn new(root: impl Into<PathBuf>, fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self::with_format(root, fetcher, Arc::new(JsonModelFormat))
    }

    pub fn with_format(
        root: impl Into<PathBuf>,
        fetcher: Arc<dyn ArtifactFetcher>,
        format: Arc<dyn ModelFormat>,
    ) -> Self {
        let validator = CacheValidator::new(format.extension());
        Self {
            root: root.into(),
            fetcher,
            format,
            validator,
            locks: Arc::new(DirectoryLocks::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lock table guarding fetch directories; share it with anything else
    /// that fetches into the same tree.
    pub fn locks(&self) -> &Arc<DirectoryLocks> {
        &self.locks
    }

    /// Directory the profile's archive is extracted into. Archives carry a
    /// `<name>/` folder, so this is the parent of the profile directory.
    pub fn fetch_dir(&self, profile: &HardwareProfile) -> PathBuf {
        let dir = profile.directory(&self.root);
        dir.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone())
    }

    pub fn is_cached(&self, profile: &HardwareProfile) -> bool {
        self.validator
            .is_complete(&profile.directory(&self.root), &profile.required_kernel_ids)
    }

    pub fn load(&self, profile: &HardwareProfile) -> Result<LoadedZoo> {
        let dir = profile.directory(&self.root);
        let fetch_dir = self.fetch_dir(profile);
        let lock = self.locks.entry(&fetch_dir);
        let _guard = lock.lock();

        if self
            .validator
            .is_complete(&dir, &profile.required_kernel_ids)
        {
            debug!(hardware = %profile, dir = %dir.display(), "predictor cache complete");
        } else {
            info!(
                hardware = %profile,
                url = %profile.download_url,
                "predictor cache incomplete, fetching"
            );
            self.fetcher.fetch(&profile.download_url, &fetch_dir)?;
            let missing = self
                .validator
                .missing_ids(&dir, &profile.required_kernel_ids);
            if !missing.is_empty() {
                warn!(
                    hardware = %profile,
                    dir = %dir.display(),
                    missing = missing.len(),
                    "fetched archive is missing required kernel predictors"
                );
                return Err(ZooError::IncompleteZoo {
                    hardware: profile.name.clone(),
                    missing,
                });
            }
        }

        let mut models = KernelModelSet::new();
        let files = scan_model_files(&dir, self.format.extension())
            .map_err(|err| ZooError::io(&dir, err))?;
        for (kernel_id, path) in files {
            let model = self
                .format
                .load(&path)
                .map_err(|source| ZooError::Model {
                    kernel_id: kernel_id.clone(),
                    source,
                })?;
            models.insert(kernel_id, model);
        }

        let fusion_rule_path = dir.join(profile.fusion_rule_file_name());
        if !fusion_rule_path.is_file() {
            return Err(ZooError::MissingFusionRule {
                hardware: profile.name.clone(),
                path: fusion_rule_path,
            });
        }

        info!(hardware = %profile, kernels = models.len(), "predictor zoo loaded");
        Ok(LoadedZoo {
            profile: profile.clone(),
            models,
            fusion_rule_path,
        })
    }
}
