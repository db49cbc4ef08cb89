//! One fetch → filter → publish cycle.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::RefreshConfig;
use crate::error::{CycleError, FilterError};
use crate::fetch::DatasetSource;
use crate::filter::{filter_file, FilterStats};
use crate::publish::publish;
use crate::rules::DatasetRules;
use crate::staging::CycleWorkspace;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_path: PathBuf,
    pub staging_dir: PathBuf,
    pub rules: DatasetRules,
}

impl From<&RefreshConfig> for PipelineConfig {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            output_path: config.output_path.clone(),
            staging_dir: config.staging_dir(),
            rules: config.rules.clone(),
        }
    }
}

/// What a successful cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub bytes_fetched: u64,
    pub stats: FilterStats,
    pub published_path: PathBuf,
    pub digest: String,
}

pub struct RefreshPipeline {
    source: Arc<dyn DatasetSource>,
    config: PipelineConfig,
}

impl RefreshPipeline {
    pub fn new(source: Arc<dyn DatasetSource>, config: PipelineConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn source(&self) -> &dyn DatasetSource {
        self.source.as_ref()
    }

    /// Run one cycle. Staging files are removed whether or not it succeeds.
    pub async fn run_cycle(&self, cycle: u64) -> Result<CycleReport, CycleError> {
        let workspace = CycleWorkspace::new(&self.config.staging_dir, &self.config.output_path);
        let result = self.run_stages(cycle, &workspace).await;
        workspace.cleanup().await;
        result
    }

    async fn run_stages(
        &self,
        cycle: u64,
        workspace: &CycleWorkspace,
    ) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();

        info!(cycle, source = %self.source.describe(), "fetching");
        let fetched = self.source.fetch_to(workspace.raw_path()).await?;

        info!(cycle, "filtering");
        let raw_path = workspace.raw_path().to_path_buf();
        let candidate_path = workspace.candidate_path().to_path_buf();
        let rules = self.config.rules.clone();
        let stats = tokio::task::spawn_blocking(move || {
            filter_file(&raw_path, &candidate_path, &rules)
        })
        .await
        .map_err(|err| FilterError::Aborted(err.to_string()))??;

        if stats.rows_kept == 0 {
            warn!(cycle, total_rows = stats.total_rows_seen, "no rows matched the selection rule");
        }

        info!(cycle, "publishing");
        let published = publish(workspace.candidate_path(), &self.config.output_path).await?;

        Ok(CycleReport {
            cycle,
            started_at,
            finished_at: Utc::now(),
            bytes_fetched: fetched.bytes_written,
            stats,
            published_path: published.published_path,
            digest: published.digest,
        })
    }
}
