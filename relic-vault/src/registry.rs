use crate::config::{Config, DiskConfig};
use crate::container::Container;
use crate::{OpenError, open_container};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// An opened container together with its presentation settings.
pub struct Mount {
    prefix: String,
    settings: DiskConfig,
    container: Box<dyn Container>,
}

impl std::fmt::Debug for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mount")
            .field("prefix", &self.prefix)
            .field("kind", &self.settings.kind)
            .finish_non_exhaustive()
    }
}

impl Mount {
    pub fn new(prefix: impl Into<String>, settings: DiskConfig, container: Box<dyn Container>) -> Self {
        Self {
            prefix: prefix.into(),
            settings,
            container,
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn settings(&self) -> &DiskConfig {
        &self.settings
    }

    #[must_use]
    pub fn container(&self) -> &dyn Container {
        &*self.container
    }

    fn close(self) {
        info!(prefix = %self.prefix, "closing mount");
        self.container.close();
    }
}

/// Opened mounts keyed by prefix.
///
/// Readers clone an `Arc<Mount>` out of the registry, so a reload never
/// invalidates a read in progress. The previous generation is closed as soon
/// as its last reader lets go.
#[derive(Debug, Default)]
pub struct Registry {
    mounts: RwLock<HashMap<String, Arc<Mount>>>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry and loads `config` into it.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let registry = Self::new();
        registry.reload(config);
        registry
    }

    /// Opens every mount in `config` and replaces the current set with them.
    ///
    /// Mounts that fail to open are logged and left out. Returns the number of
    /// mounts that opened.
    pub fn reload(&self, config: &Config) -> usize {
        let mut mounts = HashMap::with_capacity(config.disks.len());

        for (prefix, disk) in &config.disks {
            let target = config.target(prefix, disk);

            match open_container(disk.kind, &target) {
                Ok(container) => {
                    let mount = Mount::new(prefix.as_str(), disk.clone(), container);
                    mounts.insert(prefix.clone(), Arc::new(mount));
                }
                Err(e) => log_failed(prefix, &target, &e),
            }
        }

        let opened = mounts.len();
        let previous = std::mem::replace(&mut *self.mounts.write(), mounts);

        info!(
            mounts = opened,
            failed = config.disks.len() - opened,
            replaced = previous.len(),
            "reloaded registry"
        );

        for (prefix, mount) in previous {
            match Arc::try_unwrap(mount) {
                Ok(mount) => mount.close(),
                Err(_) => info!(prefix = %prefix, "mount still in use, closing after last reader"),
            }
        }

        opened
    }

    #[must_use]
    pub fn get(&self, prefix: &str) -> Option<Arc<Mount>> {
        self.mounts.read().get(prefix).cloned()
    }

    /// Returns the mounted prefixes, sorted.
    #[must_use]
    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self.mounts.read().keys().cloned().collect();
        prefixes.sort_unstable();
        prefixes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mounts.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mounts.read().is_empty()
    }
}

fn log_failed(prefix: &str, target: &std::path::Path, e: &OpenError) {
    let mut cause = e.to_string();
    let mut source = std::error::Error::source(e);

    while let Some(s) = source {
        cause.push_str(": ");
        cause.push_str(&s.to_string());
        source = s.source();
    }

    error!(prefix = %prefix, target = %target.display(), error = %cause, "cannot open mount");
}
