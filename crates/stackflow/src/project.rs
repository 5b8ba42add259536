//! Project loading: topology, settings and the gateway the topology names

use anyhow::Context;
use stackflow_cloud::{CloudGateway, MemoryGateway, RetryConfig};
use stackflow_cloud_aws::AwsGateway;
use stackflow_config::Settings;
use stackflow_core::ExecuteOptions;
use stackflow_registry::{ProviderConfig, Registry, find_topology, parse_topology_file, project_root};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the memory provider keeps its state unless the topology says otherwise
const DEFAULT_MEMORY_STATE: &str = ".stackflow/memory-state.json";

/// A loaded topology and the directory it belongs to
pub struct Project {
    pub topology: PathBuf,
    pub root: PathBuf,
    pub registry: Registry,
}

impl Project {
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let topology = match file {
            Some(path) => path.to_path_buf(),
            None => find_topology()?,
        };
        let registry = parse_topology_file(&topology)
            .with_context(|| format!("failed to load {}", topology.display()))?;

        let root = project_root(&topology)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        tracing::debug!(
            topology = %topology.display(),
            root = %root.display(),
            provider = registry.provider.name(),
            "Loaded project"
        );
        Ok(Self {
            topology,
            root,
            registry,
        })
    }

    pub fn name(&self) -> &str {
        self.registry.project.as_deref().unwrap_or("(unnamed)")
    }
}

/// The provider a project runs against
pub enum Gateway {
    Memory(Arc<MemoryGateway>),
    Aws(Arc<AwsGateway>),
}

impl Gateway {
    pub async fn connect(project: &Project) -> anyhow::Result<Self> {
        match &project.registry.provider {
            ProviderConfig::Memory { state } => {
                let path = project
                    .root
                    .join(state.as_deref().unwrap_or(Path::new(DEFAULT_MEMORY_STATE)));
                let gateway = MemoryGateway::open(&path)
                    .await
                    .with_context(|| format!("failed to open memory state {}", path.display()))?;
                Ok(Gateway::Memory(Arc::new(gateway)))
            }
            ProviderConfig::Aws { region, profile } => {
                let gateway = AwsGateway::new(region.as_deref(), profile.as_deref()).await;
                Ok(Gateway::Aws(Arc::new(gateway)))
            }
        }
    }

    pub fn shared(&self) -> Arc<dyn CloudGateway> {
        match self {
            Gateway::Memory(gateway) => gateway.clone() as Arc<dyn CloudGateway>,
            Gateway::Aws(gateway) => gateway.clone() as Arc<dyn CloudGateway>,
        }
    }

    /// Write back provider state that lives on disk
    pub async fn persist(&self) -> anyhow::Result<()> {
        if let Gateway::Memory(gateway) = self {
            gateway.save().await.context("failed to save memory state")?;
        }
        Ok(())
    }
}

/// Command line values that take precedence over the settings file
#[derive(Debug, Default, Clone, Copy)]
pub struct Overrides {
    pub workers: Option<usize>,
    pub max_attempts: Option<u32>,
}

/// Settings file and environment, then the command line
pub fn load_settings(overrides: Overrides) -> anyhow::Result<Settings> {
    let mut settings = Settings::load()?;
    if let Some(workers) = overrides.workers {
        settings.workers = workers;
    }
    if let Some(attempts) = overrides.max_attempts {
        settings.retry.max_attempts = attempts;
    }
    settings.validate()?;
    Ok(settings)
}

pub fn retry_config(settings: &Settings) -> RetryConfig {
    RetryConfig {
        max_attempts: settings.retry.max_attempts,
        initial_delay: settings.retry.initial_delay(),
        max_delay: settings.retry.max_delay(),
        backoff_multiplier: settings.retry.backoff_multiplier,
    }
}

pub fn execute_options(settings: &Settings, dry_run: bool) -> ExecuteOptions {
    ExecuteOptions {
        workers: settings.workers,
        retry: retry_config(settings),
        call_timeout: settings.call_timeout(),
        dry_run,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_execute_options_from_settings() {
        let mut settings = Settings::default();
        settings.workers = 2;
        settings.retry.max_attempts = 3;
        settings.call_timeout_secs = 0;

        let options = execute_options(&settings, true);
        assert_eq!(options.workers, 2);
        assert_eq!(options.retry.max_attempts, 3);
        assert_eq!(options.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(options.call_timeout, None);
        assert!(options.dry_run);
    }

    #[test]
    fn test_load_project_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let topology = temp_dir.path().join("stack.kdl");
        std::fs::write(&topology, "project \"demo\"\nresource-type \"network\"\n").unwrap();

        let project = Project::load(Some(&topology)).unwrap();
        assert_eq!(project.root, temp_dir.path());
        assert_eq!(project.name(), "demo");
        assert_eq!(project.registry.provider.name(), "memory");
    }
}
