use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info};

mod audio;
mod bot;
mod cache;
mod config;
mod sources;
mod storage;
mod ui;

use crate::audio::{Player, QueueRegistry};
use crate::bot::ResonanceBot;
use crate::cache::AudioCacheManager;
use crate::config::Config;
use crate::sources::YtDlpFetcher;
use crate::storage::SettingsStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("resonance=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Resonance v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Ajustes persistidos por guild
    let settings = Arc::new(tokio::sync::Mutex::new(
        SettingsStore::new(config.data_dir.clone()).await?,
    ));

    // Caché de audio: abre el índice y reconcilia antes de aceptar trabajo
    let fetcher = Arc::new(YtDlpFetcher::new());
    let cache = Arc::new(AudioCacheManager::new(&config, fetcher.clone()).await?);

    // Orquestador de reproducción
    let queues = Arc::new(QueueRegistry::new(
        config.max_queue_size,
        config.default_volume,
    ));
    let player = Player::new(queues, cache.clone(), fetcher);

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let handler = ResonanceBot::new(config.clone(), settings, cache, player);

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

/// Verifica las dependencias externas críticas (para el health check del
/// contenedor).
async fn health_check() -> Result<()> {
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    if yt_dlp.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("yt-dlp no está disponible");
    }
}
