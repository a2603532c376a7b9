use clap::Subcommand;
use skymmich::models::SettingsUpdate;

use crate::client::SkymmichClient;
use crate::output::{self, OutputConfig};

/// Admin settings commands
#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Show the effective settings (API keys masked)
    Show,
    /// Change settings; unspecified values are left alone
    Set {
        #[clap(long)]
        immich_url: Option<String>,
        /// Empty string clears the key
        #[clap(long)]
        immich_api_key: Option<String>,
        /// Album to sync (repeatable); replaces the album list
        #[clap(long = "album")]
        album_ids: Vec<String>,
        /// Sync the whole library instead of albums
        #[clap(long, conflicts_with = "album_ids")]
        all_albums: bool,
        #[clap(long)]
        astrometry_enabled: Option<bool>,
        /// Empty string clears the key
        #[clap(long)]
        astrometry_api_key: Option<String>,
        #[clap(long)]
        auto_plate_solve: Option<bool>,
        #[clap(long)]
        sidecars: Option<bool>,
        #[clap(long)]
        max_solve_attempts: Option<u32>,
    },
}

/// Executes a settings command
pub async fn execute(
    client: &SkymmichClient,
    cmd: SettingsCommands,
    config: &OutputConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        SettingsCommands::Show => {
            let settings = client.get_settings().await?;
            output::print_settings(&settings, config);
        }
        SettingsCommands::Set {
            immich_url,
            immich_api_key,
            album_ids,
            all_albums,
            astrometry_enabled,
            astrometry_api_key,
            auto_plate_solve,
            sidecars,
            max_solve_attempts,
        } => {
            let immich_album_ids = if all_albums {
                Some(Vec::new())
            } else if album_ids.is_empty() {
                None
            } else {
                Some(album_ids)
            };
            let update = SettingsUpdate {
                immich_url,
                immich_api_key,
                immich_album_ids,
                astrometry_enabled,
                astrometry_api_key,
                auto_plate_solve,
                sidecar_enabled: sidecars,
                max_solve_attempts,
            };
            let settings = client.update_settings(&update).await?;
            output::print_settings(&settings, config);
        }
    }
    Ok(())
}
