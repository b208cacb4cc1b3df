//! webmap-daemon
//!
//! Opens the snapshot database, keeps it saved in the background, and
//! writes a final snapshot on Ctrl-C.
//!
//! ```text
//! webmap-daemon --db /var/lib/webmap/webmap.db --ssusr admin
//! RUST_LOG=debug webmap-daemon --save-interval 60
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use webmap_core::token::gen_password;
use webmap_core::{DataStore, StoreOptions};

/// Length of the generated shadow super user password.
const SHADOW_PASSWORD_LEN: usize = 10;

#[derive(Parser, Debug)]
#[command(author, version, about = "In-memory webmap data store")]
struct Args {
    /// Snapshot file
    #[arg(long, default_value = "webmap.db")]
    db: PathBuf,

    /// Enable a shadow super user with this account and a random password
    #[arg(long)]
    ssusr: Option<String>,

    /// Seconds between background saves of unsaved changes
    #[arg(long, default_value_t = 180)]
    save_interval: u64,

    /// Minimum seconds between on-demand flushes
    #[arg(long, default_value_t = 30)]
    flush_limit: u64,

    /// bcrypt cost for new password hashes
    #[arg(long, default_value_t = 12)]
    hash_cost: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let options = StoreOptions::new()
        .save_interval(Duration::from_secs(args.save_interval))
        .flush_rate_limit(Duration::from_secs(args.flush_limit))
        .password_cost(args.hash_cost);
    let store = Arc::new(DataStore::new(options));

    if let Err(e) = store.open(&args.db) {
        if e.is_fatal() {
            log::error!("Refusing to start on a corrupted database: {}", e);
        } else {
            log::error!("Failed to open {}: {}", args.db.display(), e);
        }
        return ExitCode::FAILURE;
    }

    if let Some(acc) = args.ssusr.as_deref() {
        let pwd = gen_password(SHADOW_PASSWORD_LEN);
        if let Err(e) = store.add_shadow_user(acc, &pwd) {
            log::error!("Failed to create shadow user: {}", e);
            return ExitCode::FAILURE;
        }
        log::warn!("shadow super user enabled: {} / {}", acc, pwd);
    }

    for (kind, next) in store.next_ids() {
        log::debug!("{} next ID {}", kind, next);
    }
    log::info!(
        "serving {} (page views {}, visits {})",
        args.db.display(),
        store.page_view(),
        store.user_visit()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }
    log::info!("shutting down");

    match store.close() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Final flush failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
