pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod pipeline;
pub mod publish;
pub mod rules;
pub mod scheduler;
pub mod staging;

pub use config::RefreshConfig;
pub use error::{
    ConfigError, CycleError, CycleStage, FetchError, FilterError, PublishError, SchemaError,
};
pub use fetch::{DatasetSource, FetchOutcome, HttpSource};
pub use filter::{filter_file, FilterStats};
pub use pipeline::{CycleReport, PipelineConfig, RefreshPipeline};
pub use publish::{publish, PublishOutcome};
pub use rules::{DatasetRules, FieldCheck, ProjectionRule, SelectionRule};
pub use scheduler::{Scheduler, SchedulerState};
pub use staging::CycleWorkspace;
