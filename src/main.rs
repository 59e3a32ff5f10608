use anyhow::{Context as _, Result};
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod cache;
mod config;
mod error;
mod sources;
mod ui;

use crate::audio::resolver::AudioResolver;
use crate::audio::session::{SessionDeps, SessionManager, SessionSettings};
use crate::audio::supervisor::FfmpegLauncher;
use crate::audio::transport::SongbirdTransport;
use crate::bot::{DiscordNotifier, OpenMusicBot};
use crate::cache::ResolutionCache;
use crate::config::Config;
use crate::sources::{YtDlpDownloader, YtDlpExtractor};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_music=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        sources::verify_dependencies().await?;
        println!("OK");
        return Ok(());
    }

    info!("🎵 Iniciando Open Music Bot v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    if let Err(e) = sources::verify_dependencies().await {
        warn!("⚠️ Dependencias externas incompletas: {:?}", e);
    }

    // Resolución: caché compartido + yt-dlp directo + descarga de respaldo
    let cache = ResolutionCache::new(config.cache_size, config.cache_ttl);
    let extractor = YtDlpExtractor::new(
        config.ytdlp.clone(),
        config.search_filters.clone(),
        config.resolve_timeout,
    );
    let downloader = YtDlpDownloader::new(
        &config.cache_dir,
        config.ytdlp.clone(),
        config.download_timeout,
    )
    .context("no se pudo preparar el directorio de descargas")?;
    let resolver = Arc::new(AudioResolver::new(
        cache,
        Arc::new(extractor),
        Arc::new(downloader),
    ));

    // Voz
    let songbird = Songbird::serenity();
    let transport = SongbirdTransport::new(songbird.clone(), config.connect_timeout);
    let notifier = Arc::new(DiscordNotifier::new());

    let manager = Arc::new(SessionManager::new(SessionDeps {
        resolver,
        launcher: Arc::new(FfmpegLauncher::new(config.ffmpeg_log_path.clone())),
        transport: Arc::new(transport),
        notifier: notifier.clone(),
        settings: SessionSettings::from(config.as_ref()),
    }));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let handler = OpenMusicBot::new(config.clone(), manager.clone(), notifier);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful: cerrar sesiones mata los procesos ffmpeg
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        manager.leave_all().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
