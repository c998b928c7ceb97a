use crate::config::DoctorConfig;
use gt_core::{RegistryError, Rig, Town};
use gt_routing::resolve;
use gt_storage::{BeadsDb, StorageError, StoreOpener};
use std::path::PathBuf;

/// Read-only inputs shared by every check in one doctor run.
pub struct CheckContext<'a> {
    pub town: Town,
    pub rig: Option<String>,
    pub verbose: bool,
    pub config: DoctorConfig,
    opener: &'a dyn StoreOpener,
}

impl<'a> CheckContext<'a> {
    pub fn new(town: Town, opener: &'a dyn StoreOpener) -> Self {
        Self {
            town,
            rig: None,
            verbose: false,
            config: DoctorConfig::default(),
            opener,
        }
    }

    pub fn with_rig(mut self, rig: Option<String>) -> Self {
        self.rig = rig;
        self
    }

    pub fn with_config(mut self, config: DoctorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Registered rigs, narrowed to `--rig` when one was given.
    pub fn rigs(&self) -> Result<Vec<Rig>, RegistryError> {
        self.town.rigs(self.rig.as_deref())
    }

    /// The directory actually holding a rig's data: wherever the rig-level
    /// store redirects to, else the mayor clone's store.
    pub fn rig_store_dir(&self, rig: &Rig) -> Option<PathBuf> {
        [rig.path.clone(), rig.mayor_clone()]
            .into_iter()
            .map(|worktree| resolve(&worktree))
            .find(|resolution| resolution.target.is_valid())
            .map(|resolution| resolution.target.path().to_path_buf())
    }

    pub fn open_rig_store(&self, rig: &Rig) -> Result<Box<dyn BeadsDb>, StorageError> {
        let dir = self
            .rig_store_dir(rig)
            .ok_or_else(|| StorageError::NoBackend(rig.store_dir()))?;
        self.opener.open(&dir)
    }

    /// The fleet-level store, following a redirect if the town has one.
    pub fn town_store_dir(&self) -> Option<PathBuf> {
        let resolution = resolve(self.town.root());
        resolution
            .target
            .is_valid()
            .then(|| resolution.target.path().to_path_buf())
    }

    pub fn open_town_store(&self) -> Result<Box<dyn BeadsDb>, StorageError> {
        let dir = self
            .town_store_dir()
            .ok_or_else(|| StorageError::NoBackend(self.town.store_dir()))?;
        self.opener.open(&dir)
    }
}
