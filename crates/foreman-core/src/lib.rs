//! Foreman Core - paths and configuration shared by every Foreman crate.
//!
//! - **config**: where global state, databases and config files live
//! - **settings**: the per-repository `foreman.toml` and the machine-wide
//!   `config.toml`

pub mod config;
pub mod settings;

pub use config::{
    config_dir, db_dir, ensure_all_dirs, env_file, global_config_file, global_db_file,
    project_db_file, project_dir, project_prompts_dir, state_dir,
};
pub use settings::{
    generate_default_toml, AgentSettings, BackpressureSettings, ConfigError, CtoSettings,
    GlobalConfig, GlobalHrSettings, HrSettings, NightShiftSettings, PmSettings, ProjectConfig,
    ProjectSettings, WorktreeSettings, PROJECT_CONFIG_FILE,
};
