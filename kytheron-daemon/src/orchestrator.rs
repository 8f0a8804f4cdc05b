//! Daemon orchestration -- assembly and lifecycle management.
//!
//! The [`Orchestrator`] loads the configuration, decodes every policy
//! document from the policy storage, loads the configured plugins into
//! the registry, and then runs the stream processor alongside the
//! ingress gRPC server.
//!
//! # Startup order (producers before consumers)
//!
//! 1. Plugin registry (parsers must be reachable before the processor)
//! 2. Stream processor (background task)
//! 3. Ingress gRPC server (runs on the calling task until signal)
//!
//! # Shutdown order
//!
//! The ingress server returning (on SIGINT/SIGTERM) triggers processor
//! cancellation; the registry is shut down last so in-flight parser
//! streams can finish their current record.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use kytheron_core::config::KytheronConfig;
use kytheron_ingress::IngressConfig;
use kytheron_policy::PolicySet;
use kytheron_processor::{Processor, ProcessorConfig};
use kytheron_registry::PluginRegistry;

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: KytheronConfig,
    /// Decoded policies, indexed by source.
    policies: PolicySet,
    /// Plugin registry with all configured plugins loaded.
    registry: Arc<PluginRegistry>,
}

impl Orchestrator {
    /// Build the orchestrator from an already-loaded configuration.
    ///
    /// Decodes every `.hcl` document under the configured policy
    /// storage and loads every configured plugin. Any policy decode
    /// failure or plugin load failure is fatal.
    pub async fn build(config: KytheronConfig) -> Result<Self> {
        let policies = load_policies(&config).await?;
        tracing::info!(policies = policies.len(), "policies decoded");

        let registry = Arc::new(PluginRegistry::new(&config.registry));
        for plugin in &config.plugins {
            tracing::info!(
                plugin = %plugin.name,
                version = %plugin.version,
                "loading plugin"
            );
            if let Err(e) = registry
                .load(&plugin.name, &plugin.version, &plugin.checksum)
                .await
            {
                // Kill plugins that already started before aborting startup
                registry.shutdown().await;
                return Err(e).with_context(|| format!("failed to load plugin '{}'", plugin.name));
            }
        }
        tracing::info!(plugins = registry.len().await, "plugin registry ready");

        Ok(Self {
            config,
            policies,
            registry,
        })
    }

    /// Run the processor and the ingress server until a shutdown signal.
    ///
    /// Blocks until the ingress server returns, then stops the
    /// processor and shuts the registry down.
    pub async fn run(&mut self) -> Result<()> {
        let processor = Processor::new(
            ProcessorConfig::from_core(&self.config),
            Arc::clone(&self.registry),
        );
        let cancel = processor.cancellation_token();
        let processor_task = tokio::spawn(async move { processor.run().await });

        // The ingress server owns the main task; it returns after
        // SIGINT/SIGTERM completes the graceful shutdown.
        let ingress_config = IngressConfig::from_core(&self.config);
        let served = kytheron_ingress::serve(&ingress_config).await;

        tracing::info!("shutting down processor");
        cancel.cancel();
        match processor_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "processor exited with error"),
            Err(e) => tracing::error!(error = %e, "processor task panicked"),
        }

        tracing::info!("shutting down plugin registry");
        self.registry.shutdown().await;

        served.map_err(Into::into)
    }

    /// Get the decoded policy set.
    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &KytheronConfig {
        &self.config
    }
}

/// Decode every `.hcl` policy document under the configured storage root.
///
/// The policy storage URL selects the backend; only the local
/// filesystem scheme (`os://<path>`) is currently supported. Each
/// decode failure aborts startup with the originating file name.
pub async fn load_policies(config: &KytheronConfig) -> Result<PolicySet> {
    let root = config.policy_root()?;
    let mut set = PolicySet::new();

    let mut entries = tokio::fs::read_dir(&root)
        .await
        .with_context(|| format!("failed to read policy storage {}", root.display()))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed to read policy storage {}", root.display()))?
    {
        let path = entry.path();
        if !is_policy_file(&path) {
            continue;
        }

        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read policy file {}", path.display()))?;

        let name = path.display().to_string();
        let policy = kytheron_policy::decode(&name, &contents)?;
        tracing::debug!(
            policy = %policy.name,
            sources = policy.sources.len(),
            evaluations = policy.evaluations.len(),
            "policy decoded"
        );
        set.insert(policy);
    }

    Ok(set)
}

fn is_policy_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "hcl")
}
