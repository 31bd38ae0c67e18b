//! # Bot Module
//!
//! Discord-facing glue for Resonance.
//!
//! Implements Serenity's [`EventHandler`]: command registration on ready,
//! slash-command dispatch, voice connection management per guild, and the
//! background idle sweeper. All playback and cache logic lives below this
//! layer, in [`crate::audio`] and [`crate::cache`].

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::Player, cache::AudioCacheManager, config::Config, storage::SettingsStore,
};

/// Handler principal del bot.
///
/// Todos los campos compartidos van detrás de primitivas de sincronización:
/// `Arc` para propiedad compartida, `tokio::sync::Mutex` para acceso
/// exclusivo asíncrono y `DashMap` para mapas concurrentes.
pub struct ResonanceBot {
    config: Arc<Config>,
    /// Ajustes persistidos por guild (volumen, modo 24/7)
    pub settings: Arc<tokio::sync::Mutex<SettingsStore>>,
    /// Caché de audio descargado
    pub cache: Arc<AudioCacheManager>,
    /// Orquestador de reproducción
    pub player: Player,
    /// Conexiones de voz por guild
    voice_handlers: DashMap<GuildId, Arc<tokio::sync::Mutex<songbird::Call>>>,
    sweeper_started: AtomicBool,
}

impl ResonanceBot {
    pub fn new(
        config: Config,
        settings: Arc<tokio::sync::Mutex<SettingsStore>>,
        cache: Arc<AudioCacheManager>,
        player: Player,
    ) -> Self {
        Self {
            config: Arc::new(config),
            settings,
            cache,
            player,
            voice_handlers: DashMap::new(),
            sweeper_started: AtomicBool::new(false),
        }
    }

    /// Registra los comandos slash, global o por guild según configuración.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos registrados para guild {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Conecta el bot a un canal de voz y guarda el handler.
    pub async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<tokio::sync::Mutex<songbird::Call>>> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        match manager.join(guild_id, channel_id).await {
            Ok(call) => {
                self.voice_handlers.insert(guild_id, call.clone());
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(call)
            }
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                Err(anyhow::anyhow!("Error al conectar al canal de voz"))
            }
        }
    }

    /// Desconecta el bot del canal de voz de la guild.
    pub async fn leave_voice_channel(&self, ctx: &Context, guild_id: GuildId) -> Result<()> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        manager.remove(guild_id).await?;
        self.voice_handlers.remove(&guild_id);

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    pub fn get_voice_handler(
        &self,
        guild_id: GuildId,
    ) -> Option<Arc<tokio::sync::Mutex<songbird::Call>>> {
        self.voice_handlers.get(&guild_id).map(|h| h.clone())
    }
}

#[async_trait]
impl EventHandler for ResonanceBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // Lanzar el barrido de inactividad una sola vez, aunque el gateway
        // reconecte y vuelva a emitir ready
        if !self.sweeper_started.swap(true, Ordering::SeqCst) {
            match songbird::get(&ctx).await {
                Some(manager) => {
                    self.player.spawn_idle_sweeper(
                        manager,
                        self.settings.clone(),
                        Duration::from_secs(self.config.idle_timeout),
                    );
                    info!(
                        "💤 Barrido de inactividad activado (umbral {}s)",
                        self.config.idle_timeout
                    );
                }
                None => warn!("Songbird no disponible; sin barrido de inactividad"),
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Limpia el estado de la guild cuando el bot es desconectado del canal
    /// de voz (expulsado o movido manualmente).
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let bot_id = ctx.cache.current_user().id;
        if new.user_id != bot_id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
                self.player.stop(guild_id);
                self.voice_handlers.remove(&guild_id);
            }
        }
    }
}
