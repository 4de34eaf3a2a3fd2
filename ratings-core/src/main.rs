//! ratings-core: the rating/classification pipeline CLI.

use clap::Parser;
use ratings_core::config::Config;
use ratings_core::identity::IdentityResolver;
use ratings_core::musicserver::HttpMusicServerClient;
use ratings_core::progress::ProgressReporter;
use ratings_core::providers::discogs::DiscogsClient;
use ratings_core::providers::lastfm::LastFmClient;
use ratings_core::providers::listenbrainz::ListenBrainzClient;
use ratings_core::providers::musicbrainz::MusicBrainzClient;
use ratings_core::providers::spotify::SpotifyClient;
use ratings_core::signals::{ProviderClients, ProviderHealth};
use ratings_core::workflow::Coordinator;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ratings-core", about = "Music rating/classification pipeline")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "ratings-core.toml")]
    config: PathBuf,

    /// Force a rescan even of albums already scanned successfully.
    #[arg(long)]
    force: bool,

    /// Run continuously, sweeping the catalog repeatedly.
    #[arg(long)]
    perpetual: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config = Config::load(&args.config)?;
    if args.force {
        config.features.force = true;
    }
    if args.perpetual {
        config.features.perpetual = true;
    }

    info!("starting ratings-core against {}", config.music_server_url);

    let pool = ratings_common::db::open_pool(&config.database_path).await?;
    ratings_core::workflow::coordinator::prepare_database(&pool).await?;

    let clients = build_provider_clients(&config);
    let resolver = Arc::new(IdentityResolver::new(
        clients.spotify.clone(),
        clients.musicbrainz.clone(),
        clients.discogs.clone(),
        clients.health.clone(),
    ));

    let music_server_username = std::env::var("RATINGS_MUSIC_SERVER_USER").unwrap_or_default();
    let music_server_password = std::env::var("RATINGS_MUSIC_SERVER_PASSWORD").unwrap_or_default();
    let music_server = Arc::new(HttpMusicServerClient::new(
        config.music_server_url.clone(),
        music_server_username,
        music_server_password,
    ));

    let scan_type = if config.features.batchrate { "full" } else { "incremental" };
    let progress = Arc::new(ProgressReporter::new(
        config.progress_path.clone(),
        chrono::Utc::now(),
        scan_type,
    ));
    let cancel = CancellationToken::new();

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received shutdown signal, finishing in-flight albums");
                cancel.cancel();
            }
        });
    }

    loop {
        let coordinator = Coordinator::new(
            music_server.clone(),
            pool.clone(),
            config.clone(),
            clients.clone(),
            resolver.clone(),
            progress.clone(),
            cancel.clone(),
        );

        if let Err(e) = coordinator.run_once().await {
            error!("scan run ended with an error: {e}");
        }

        if !config.features.perpetual || cancel.is_cancelled() {
            break;
        }
    }

    Ok(())
}

fn build_provider_clients(config: &Config) -> ProviderClients {
    let spotify = config.providers.spotify.enabled.then(|| {
        let token = config.providers.spotify.credentials.first().cloned().unwrap_or_default();
        Arc::new(SpotifyClient::new(token, config.rate_limits.spotify_per_min))
    });

    let lastfm = config.providers.lastfm.enabled.then(|| {
        let key = config.providers.lastfm.credentials.first().cloned().unwrap_or_default();
        Arc::new(LastFmClient::new(key, config.rate_limits.lastfm_per_sec))
    });

    let listenbrainz = config.providers.listenbrainz.enabled.then(|| {
        let token = config.providers.listenbrainz.credentials.first().cloned();
        Arc::new(ListenBrainzClient::new(token, config.rate_limits.listenbrainz_per_sec))
    });

    let musicbrainz = config.providers.musicbrainz.enabled.then(|| {
        Arc::new(MusicBrainzClient::new(format!(
            "ratings-core/{}",
            env!("CARGO_PKG_VERSION")
        )))
    });

    let discogs = config.providers.discogs.enabled.then(|| {
        let token = config.providers.discogs.credentials.first().cloned().unwrap_or_default();
        Arc::new(DiscogsClient::new(token, config.rate_limits.discogs_per_min))
    });

    ProviderClients {
        spotify,
        lastfm,
        listenbrainz,
        musicbrainz,
        discogs,
        health: Arc::new(ProviderHealth::default()),
    }
}
