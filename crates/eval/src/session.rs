//! Session: hardware registry, zoo loader and a cache of loaded predictors.

use crate::config::MeterConfig;
use anyhow::{Context, Result};
use kernelmeter_dataset::DatasetProvider;
use kernelmeter_predictor::KernelLevelPredictor;
use kernelmeter_zoo::{ArtifactFetcher, HardwareProfile, HardwareRegistry, HttpFetcher, ZooLoader};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

type PredictorKey = (String, String);

pub struct MeterSession {
    config: MeterConfig,
    registry: HardwareRegistry,
    loader: ZooLoader,
    dataset: DatasetProvider,
    predictors: Mutex<HashMap<PredictorKey, Arc<KernelLevelPredictor>>>,
}

impl MeterSession {
    pub fn new(
        config: MeterConfig,
        registry: HardwareRegistry,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Self {
        let loader = ZooLoader::new(config.zoo_root.clone(), Arc::clone(&fetcher));
        let dataset = DatasetProvider::with_locks(fetcher, Arc::clone(loader.locks()));
        Self {
            config,
            registry,
            loader,
            dataset,
            predictors: Mutex::new(HashMap::new()),
        }
    }

    /// Session over HTTP with the registry named by the configuration.
    pub fn from_config(config: MeterConfig) -> Result<Self> {
        let registry = HardwareRegistry::from_yaml_file(&config.registry_path)
            .with_context(|| {
                format!(
                    "failed to load hardware registry {}",
                    config.registry_path.display()
                )
            })?;
        let fetcher = HttpFetcher::new(config.fetch.clone())?;
        info!(
            hardware = registry.len(),
            zoo_root = %config.zoo_root.display(),
            "session ready"
        );
        Ok(Self::new(config, registry, Arc::new(fetcher)))
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    pub fn registry(&self) -> &HardwareRegistry {
        &self.registry
    }

    pub fn loader(&self) -> &ZooLoader {
        &self.loader
    }

    pub fn profile(&self, name: &str, version: Option<&str>) -> Result<&HardwareProfile> {
        Ok(self.registry.find(name, version)?)
    }

    /// Cached predictor for `profile`, loading its zoo on first use.
    pub fn predictor(&self, profile: &HardwareProfile) -> Result<Arc<KernelLevelPredictor>> {
        let key = (profile.name.clone(), profile.version.clone());
        if let Some(predictor) = self.predictors.lock().get(&key) {
            return Ok(Arc::clone(predictor));
        }

        let predictor = Arc::new(self.load_predictor(profile)?);
        let mut cache = self.predictors.lock();
        Ok(Arc::clone(cache.entry(key).or_insert(predictor)))
    }

    pub fn predictor_by_name(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<Arc<KernelLevelPredictor>> {
        let profile = self.profile(name, version)?;
        self.predictor(profile)
    }

    /// Drop any cached predictor for `profile` and load it again from disk.
    pub fn reload(&self, profile: &HardwareProfile) -> Result<Arc<KernelLevelPredictor>> {
        let predictor = Arc::new(self.load_predictor(profile)?);
        self.predictors.lock().insert(
            (profile.name.clone(), profile.version.clone()),
            Arc::clone(&predictor),
        );
        Ok(predictor)
    }

    pub fn cached_predictors(&self) -> usize {
        self.predictors.lock().len()
    }

    /// Benchmark dataset files, fetching the dataset on first use.
    pub fn dataset_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .dataset
            .ensure(&self.config.dataset_url, &self.config.dataset_dir)?)
    }

    fn load_predictor(&self, profile: &HardwareProfile) -> Result<KernelLevelPredictor> {
        let zoo = self
            .loader
            .load(profile)
            .with_context(|| format!("failed to load predictor zoo for {profile}"))?;
        let predictor = KernelLevelPredictor::from_zoo(&zoo)
            .with_context(|| format!("failed to build predictor for {profile}"))?;
        Ok(predictor)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use kernelmeter_kernels::{DecisionTree, JsonModelFormat, ModelDefinition, TreeNode};
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Writes `<dest>/<name>/` zoos with single-leaf models, like an
    /// extracted archive. `skip_rule` names hardware shipped without a rule.
    #[derive(Default)]
    pub(crate) struct ZooFixture {
        pub kernels: Vec<(String, f64)>,
        pub skip_rule: Vec<String>,
        pub calls: AtomicUsize,
    }

    impl ZooFixture {
        pub(crate) fn new(kernels: &[(&str, f64)]) -> Self {
            Self {
                kernels: kernels
                    .iter()
                    .map(|(id, latency)| (id.to_string(), *latency))
                    .collect(),
                ..Self::default()
            }
        }
    }

    impl ArtifactFetcher for ZooFixture {
        fn fetch(&self, url: &str, dest_dir: &Path) -> kernelmeter_zoo::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = url
                .rsplit('/')
                .next()
                .and_then(|file| file.strip_suffix(".zip"))
                .unwrap_or(url);
            let dir = dest_dir.join(name);
            fs::create_dir_all(&dir).unwrap();
            for (id, latency) in &self.kernels {
                let definition = ModelDefinition::DecisionTree(DecisionTree::new(vec![
                    TreeNode::Leaf { leaf: *latency },
                ]));
                JsonModelFormat::save(&definition, &dir.join(format!("{id}.model"))).unwrap();
            }
            if !self.skip_rule.iter().any(|skip| skip == name) {
                fs::write(
                    dir.join(format!("rule_{name}.json")),
                    r#"{"conv_relu": {"obey": true}}"#,
                )
                .unwrap();
            }
            Ok(())
        }
    }

    pub(crate) fn registry(names: &[&str]) -> HardwareRegistry {
        HardwareRegistry::from_profiles(
            names
                .iter()
                .map(|name| {
                    HardwareProfile::new(
                        *name,
                        "1.0",
                        vec!["conv-relu".to_string()],
                        format!("https://example.com/{name}.zip"),
                    )
                })
                .collect(),
        )
        .unwrap()
    }

    pub(crate) fn session(root: &Path, names: &[&str], fixture: Arc<ZooFixture>) -> MeterSession {
        let config = MeterConfig {
            zoo_root: root.join("zoo"),
            dataset_dir: root.join("dataset"),
            ..MeterConfig::default()
        };
        MeterSession::new(config, registry(names), fixture)
    }

    #[test]
    fn predictors_are_cached_per_profile() {
        let root = TempDir::new().unwrap();
        let fixture = Arc::new(ZooFixture::new(&[("conv-relu", 2.0)]));
        let session = session(root.path(), &["gpu", "cpu"], fixture.clone());

        let first = session.predictor_by_name("gpu", None).unwrap();
        let second = session.predictor_by_name("gpu", Some("1.0")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(session.cached_predictors(), 1);
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 1);

        session.predictor_by_name("cpu", None).unwrap();
        assert_eq!(session.cached_predictors(), 2);
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reload_replaces_cached_predictor() {
        let root = TempDir::new().unwrap();
        let fixture = Arc::new(ZooFixture::new(&[("conv-relu", 2.0)]));
        let session = session(root.path(), &["gpu"], fixture.clone());

        let profile = session.profile("gpu", None).unwrap().clone();
        let first = session.predictor(&profile).unwrap();
        let reloaded = session.reload(&profile).unwrap();
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert!(Arc::ptr_eq(&reloaded, &session.predictor(&profile).unwrap()));
        // Cache on disk is complete, so reloading does not fetch again.
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dataset_fetches_share_the_zoo_lock_table() {
        let root = TempDir::new().unwrap();
        let fixture = Arc::new(ZooFixture::new(&[("conv-relu", 2.0)]));
        let session = session(root.path(), &["gpu"], fixture);

        session.predictor_by_name("gpu", None).unwrap();
        session.dataset_files().unwrap();
        // One entry for the zoo root, one for the dataset directory.
        assert_eq!(session.loader().locks().len(), 2);
    }

    #[test]
    fn unknown_hardware_is_an_error() {
        let root = TempDir::new().unwrap();
        let session = session(root.path(), &["gpu"], Arc::new(ZooFixture::default()));
        assert!(session.predictor_by_name("tpu", None).is_err());
        assert_eq!(session.cached_predictors(), 0);
    }
}
