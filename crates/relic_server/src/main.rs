//! Relic maintenance server entrypoint.

use chrono::Utc;
use relic_core::backup::{
    dump_source_from_url, preview, BackupKind, Classification, ObjectStoreSnapshots,
};
use relic_core::DEFAULT_PORT;
use relic_server::{config::Config, maintenance, serve_router, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CliFlags {
    help: bool,
    backup: bool,
    cleanup: bool,
    dry_run: bool,
}

fn parse_cli_flags(args: &[String]) -> anyhow::Result<CliFlags> {
    let mut flags = CliFlags::default();
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => flags.help = true,
            "--backup" => flags.backup = true,
            "--cleanup" => flags.cleanup = true,
            "--dry-run" => flags.dry_run = true,
            value if value.starts_with('-') => {
                anyhow::bail!(
                    "Unknown option: '{}'. Use --help to see supported options.",
                    value
                );
            }
            value => {
                anyhow::bail!(
                    "Unexpected positional argument: '{}'. Use --help to see supported options.",
                    value
                );
            }
        }
    }
    if flags.dry_run && !flags.cleanup {
        anyhow::bail!("--dry-run only applies to --cleanup");
    }
    Ok(flags)
}

fn runs_maintenance_mode(flags: CliFlags) -> bool {
    flags.backup || flags.cleanup
}

fn format_plan(classification: &Classification) -> Vec<String> {
    let mut lines: Vec<String> = classification
        .keep
        .iter()
        .map(|retained| format!("keep    {:<8} {}", retained.tier, retained.snapshot.key))
        .chain(
            classification
                .delete
                .iter()
                .map(|snapshot| format!("delete  {:<8} {}", "expired", snapshot.key)),
        )
        .collect();
    let counts = classification.tier_counts();
    lines.push(format!(
        "{} to keep ({} monthly, {} weekly, {} daily), {} to delete",
        classification.keep.len(),
        counts.monthly,
        counts.weekly,
        counts.daily,
        classification.delete.len()
    ));
    lines
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "relic=info,relic_core=info,relic_server=info,tower_http=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let cli_flags = parse_cli_flags(&args)?;

    if cli_flags.help {
        print_help();
        return Ok(());
    }

    let config = Config::from_env();
    let store = Arc::new(ObjectStoreSnapshots::from_dsn(&config.storage_dsn)?);
    let source = dump_source_from_url(&config.database_url);
    let state = AppState::new(config.clone(), store, source);

    if cli_flags.backup {
        let produced = maintenance::run_manual_backup(&state).await?;
        println!(
            "Backup uploaded to {} ({} bytes)",
            produced.key, produced.compressed_bytes
        );
    }

    if cli_flags.cleanup {
        if cli_flags.dry_run {
            let policy = config.backup.retention_policy();
            let plan = preview(state.store.as_ref(), state.prefix(), &policy, Utc::now()).await?;
            for line in format_plan(&plan) {
                println!("{}", line);
            }
        } else {
            let report = maintenance::run_guarded_cleanup(&state, Utc::now()).await?;
            println!(
                "Deleted {} backups ({:.2} MB), retained {}, {} failed",
                report.deleted,
                report.deleted_megabytes(),
                report.retained,
                report.failures.len()
            );
        }
    }

    if runs_maintenance_mode(cli_flags) {
        return Ok(());
    }

    let mut scheduler = maintenance::build_scheduler(&state);
    scheduler.start();
    maintenance::lifecycle_backup(&state, BackupKind::Startup).await;

    let allow_public = relic_server::config::env_flag_enabled("ALLOW_PUBLIC_ACCESS");
    if allow_public {
        tracing::warn!("Public access enabled - server will accept requests from any origin");
    }

    let bind_addr = relic_server::resolve_bind_address(&config, allow_public);
    if !bind_addr.ip().is_loopback() {
        tracing::warn!(
            "Binding to non-localhost address: {} - ensure proper security measures are in place",
            bind_addr
        );
    }

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let actual_addr = listener.local_addr().unwrap_or(bind_addr);
    tracing::info!("Relic admin API running at http://{}", actual_addr);

    let serve_result = serve_router(listener, state.clone(), allow_public, shutdown_signal()).await;

    maintenance::lifecycle_backup(&state, BackupKind::Shutdown).await;
    scheduler.shutdown().await;

    serve_result?;

    Ok(())
}

fn print_help() {
    println!("Relic maintenance server\n");
    println!("Usage: relic [OPTIONS]\n");
    println!("Options:");
    println!("  --backup          Take one manual backup and exit");
    println!("  --cleanup         Run one retention pass and exit");
    println!("  --dry-run         With --cleanup, print the retention plan without deleting");
    println!("  --help            Show this help message");
    println!("\nEnvironment variables:");
    println!(
        "  PORT                     Admin API port (default: {})",
        DEFAULT_PORT
    );
    println!(
        "  BIND                     Override bind address (e.g. 0.0.0.0:{})",
        DEFAULT_PORT
    );
    println!("  ALLOW_PUBLIC_ACCESS      Allow CORS from any origin and non-loopback binds");
    println!("  STORAGE_DSN              Object store (file:///path, memory://, s3://key:secret@host/bucket)");
    println!("  DATABASE_URL             PostgreSQL URL passed to pg_dump");
    println!("  BACKUP_ENABLED           Schedule backups (default: false)");
    println!("  BACKUP_TIMES             Comma separated HH:MM times (default: 02:00,14:00)");
    println!("  BACKUP_TIMEZONE          IANA timezone for BACKUP_TIMES (default: UTC)");
    println!("  BACKUP_RETENTION_DAYS    Keep every backup this many days (default: 7)");
    println!("  BACKUP_RETENTION_WEEKS   Keep one backup per week this many days (default: 30)");
    println!("  BACKUP_CLEANUP_ENABLED   Run retention cleanup daily at 03:00 (default: true)");
    println!("  BACKUP_ON_STARTUP        Back up when the server starts (default: true)");
    println!("  BACKUP_ON_SHUTDOWN       Back up when the server stops (default: true)");
    println!("  BACKUP_PREFIX            Key prefix for backups (default: db/)");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
