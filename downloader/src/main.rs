/// Discog - Main Entry Point
///
/// Command-line front end: resolves a channel's catalog and downloads it,
/// or fetches a single song or playlist.
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use discog_downloader::Harvester;
use discog_shared::config::{CredentialStore, HarvestConfig};
use discog_shared::errors::HarvestError;
use discog_shared::models::CredentialSelection;

#[derive(Parser, Debug)]
#[command(name = "discog", author, version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
struct Cli {
    /// Browser to read cookies from for this run (firefox, chrome, edge, opera, none)
    #[arg(long, global = true)]
    browser: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download every album and single of a channel
    Channel { url: String },
    /// Download a single song
    Song { url: String },
    /// Download a playlist
    Playlist { url: String },
    /// Show or set the browser used for cookies
    Browser { name: Option<String> },
}

#[tokio::main]
async fn main() {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("discog=info".parse().unwrap())
                .add_directive("discog_downloader=info".parse().unwrap())
                .add_directive("discog_shared=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = HarvestConfig::from_env();
    let store = CredentialStore::new(&config.browser_config);

    let selection = match &cli.browser {
        Some(name) => name.parse::<CredentialSelection>()?,
        None => store.load(),
    };

    match cli.command {
        Command::Browser { name: None } => {
            println!("{}", selection);
        }
        Command::Browser { name: Some(name) } => {
            let chosen: CredentialSelection = name.parse()?;
            store
                .save(chosen)
                .with_context(|| format!("saving {:?}", store.path()))?;
            info!("Cookies will be read from: {}", chosen);
        }
        Command::Channel { url } => {
            let harvester = Harvester::from_config(&config, selection);
            match harvester.harvest_channel(&url).await {
                Ok(report) => {
                    info!(
                        "Done with '{}' in {:?}: {} of {} releases completed, {} failed",
                        report.channel_name,
                        report.directory,
                        report.pool.completed,
                        report.releases,
                        report.pool.failed
                    );
                }
                Err(e @ (HarvestError::ChannelUnresolved(_) | HarvestError::EmptyCatalog(_))) => {
                    warn!("Nothing to download: {}", e);
                    return Err(e.into());
                }
                Err(e) => return Err(e).context("channel download failed"),
            }
        }
        Command::Song { url } => {
            Harvester::from_config(&config, selection)
                .download_song(&url)
                .await
                .context("song download failed")?;
            info!("Song saved to {:?}", config.songs_dir);
        }
        Command::Playlist { url } => {
            let report = Harvester::from_config(&config, selection)
                .download_playlist(&url)
                .await
                .context("playlist download failed")?;
            info!(
                "Playlist done: {} tracks completed, {} failed",
                report.completed, report.failed
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_browser() {
        let cli = Cli::try_parse_from(["discog", "channel", "https://www.youtube.com/@artist", "--browser", "firefox"]).unwrap();
        assert_eq!(cli.browser.as_deref(), Some("firefox"));
        assert!(matches!(cli.command, Command::Channel { ref url } if url == "https://www.youtube.com/@artist"));

        let cli = Cli::try_parse_from(["discog", "browser"]).unwrap();
        assert!(matches!(cli.command, Command::Browser { name: None }));
    }
}
