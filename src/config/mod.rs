//! TOML configuration: schema, loading/env-overrides, and atomic saves.

pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load_config, load_default_config, save_config};
pub use schema::{
    ApprovalConfig, CriticalTargetsConfig, MemoryConfig, NotificationsConfig, PipelineConfig,
    ProviderConfig, SchedulerConfig, WebhookConfig,
};
pub use schema::AppConfig;
