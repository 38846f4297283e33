use clap::{Parser, Subcommand};

use crate::config::BackupConfig;
use crate::engine_gc::GcEngine;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "deltaback")]
#[command(about = "Content-addressed, deduplicating block-level backup engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Remove a single backup, reclaiming any block it alone referenced
    RemoveBackup {
        /// Backup URL, as returned by a prior backup run
        url: String,
    },

    /// Remove an entire backup volume: every surviving backup, then the
    /// volume record itself
    RemoveVolume {
        /// `<scheme>://<destination-root>`
        destination: String,
        /// Volume name
        volume: String,
    },
}

/// Thin dispatcher over `GcEngine`; not a place for new logic. The CLI
/// is a collaborator wrapping the engine, not where engine behavior
/// belongs.
pub async fn run(cli: Cli) -> Result<()> {
    let gc = GcEngine::new(BackupConfig::production());
    match cli.command {
        Commands::RemoveBackup { url } => {
            let reclaimed = gc.delete_backup(&url).await?;
            log::info!("removed backup, reclaimed {reclaimed} block(s)");
            Ok(())
        }
        Commands::RemoveVolume { destination, volume } => {
            gc.delete_volume(&destination, &volume).await?;
            log::info!("removed volume '{volume}'");
            Ok(())
        }
    }
}
