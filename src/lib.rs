//! Root crate facade for the Relic backup server.

pub use relic_core::{backup, scheduler};
pub use relic_server::{
    config, create_app, handlers, maintenance, serve_router, AppError, AppState, BackupConfig,
    Config, JobRegistry,
};
