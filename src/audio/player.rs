use anyhow::Result;
use dashmap::DashMap;
use serenity::model::id::{GuildId, UserId};
use songbird::{
    input::{File as AudioFile, Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        queue::{LoopMode, SkipVerdict, Track},
        registry::QueueRegistry,
    },
    cache::{AudioCacheManager, ResolvedAudio},
    sources::AudioFetcher,
    storage::SettingsStore,
};

/// Intervalo del barrido de inactividad
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Instantánea de la cola de una guild para comandos y paneles de estado.
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<Track>,
    pub pending: Vec<Track>,
    pub loop_mode: LoopMode,
    pub total_duration_secs: u64,
}

/// Orquestador de reproducción.
///
/// Saca la siguiente pista de la cola de la guild, resuelve el audio contra
/// el caché y entrega el resultado al transporte de voz. Pieza delgada: la
/// lógica vive en [`GuildQueue`](super::queue::GuildQueue) y en
/// [`AudioCacheManager`].
#[derive(Clone)]
pub struct Player {
    queues: Arc<QueueRegistry>,
    cache: Arc<AudioCacheManager>,
    fetcher: Arc<dyn AudioFetcher>,
    http_client: reqwest::Client,
    current_tracks: Arc<DashMap<GuildId, TrackHandle>>,
}

impl Player {
    pub fn new(
        queues: Arc<QueueRegistry>,
        cache: Arc<AudioCacheManager>,
        fetcher: Arc<dyn AudioFetcher>,
    ) -> Self {
        Self {
            queues,
            cache,
            fetcher,
            http_client: reqwest::Client::new(),
            current_tracks: Arc::new(DashMap::new()),
        }
    }

    /// Encola una pista y arranca la reproducción si no hay nada sonando.
    /// Devuelve la posición en la cola (1 = siguiente).
    pub async fn play(
        &self,
        guild_id: GuildId,
        track: Track,
        call: Arc<Mutex<Call>>,
        play_top: bool,
    ) -> Result<usize> {
        let queue = self.queues.get(guild_id);
        let position = {
            let mut q = queue.write();
            if play_top {
                q.add_top(track)?;
                1
            } else {
                q.add(track)?;
                q.pending_len()
            }
        };

        if !self.is_playing(guild_id).await {
            self.play_next(guild_id, call).await?;
        }

        Ok(position)
    }

    /// Avanza la cola y reproduce la siguiente pista, si la hay.
    ///
    /// El audio sale del caché cuando hay copia local; si el caché rehúsa
    /// o la descarga falla, la pista se transmite directamente desde la
    /// fuente remota.
    pub async fn play_next(&self, guild_id: GuildId, call: Arc<Mutex<Call>>) -> Result<()> {
        let queue = self.queues.get(guild_id);

        let next = { queue.write().advance() };
        let Some(mut track) = next else {
            debug!("📭 Cola agotada en guild {}", guild_id);
            self.current_tracks.remove(&guild_id);
            return Ok(());
        };

        // Resolver metadatos si la pista llegó como búsqueda o sin duración
        if track.url.is_empty() || track.duration_secs == 0 {
            let lookup_arg = if track.url.is_empty() {
                track.search_query.clone()
            } else {
                track.url.clone()
            };
            match self.fetcher.probe(&lookup_arg).await {
                Ok(meta) => {
                    track.apply_metadata(&meta);
                    queue.write().refine_current(&track);
                }
                Err(e) => {
                    warn!(
                        "⚠️ Sin metadatos para {} ({}); streaming directo",
                        track.search_query, e
                    );
                }
            }
        }

        let resolved = if track.url.is_empty() {
            // Sin URL canónica no hay clave de caché estable
            ResolvedAudio::Remote
        } else {
            self.cache
                .resolve_audio(&track.url, track.duration_secs, track.is_live)
                .await
        };

        let input: Input = match &resolved {
            ResolvedAudio::Local(path) => {
                info!("🎵 Reproduciendo desde caché: {}", track.title);
                AudioFile::new(path.clone()).into()
            }
            ResolvedAudio::Remote => {
                info!("📡 Streaming directo: {}", track.title);
                if track.url.is_empty() {
                    YoutubeDl::new_search(self.http_client.clone(), track.search_query.clone())
                        .into()
                } else {
                    YoutubeDl::new(self.http_client.clone(), track.url.clone()).into()
                }
            }
        };

        let track_handle = {
            let mut call_lock = call.lock().await;
            call_lock.play_input(input)
        };

        let volume = { queue.read().volume() };
        let _ = track_handle.set_volume(volume);

        // Al terminar la pista, la señal vuelve al dueño de la cola
        track_handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndHandler {
                    player: self.clone(),
                    guild_id,
                    call: call.clone(),
                },
            )
            .map_err(|e| anyhow::anyhow!("Error al registrar evento de fin de pista: {}", e))?;

        self.current_tracks.insert(guild_id, track_handle);
        queue.write().mark_started();

        Ok(())
    }

    /// Registra un voto de salto y devuelve el veredicto. El que llama
    /// ejecuta [`Self::skip`] cuando el veredicto es `Passed`.
    pub fn vote_skip(&self, guild_id: GuildId, user: UserId, listeners: usize) -> SkipVerdict {
        let queue = self.queues.get(guild_id);
        let verdict = queue.write().vote_skip(user, listeners);
        debug!("🗳️ Voto de salto en guild {}: {:?}", guild_id, verdict);
        verdict
    }

    /// Detiene la pista actual; el evento de fin encadena la siguiente.
    pub fn skip(&self, guild_id: GuildId) {
        if let Some(handle) = self.current_tracks.get(&guild_id) {
            let _ = handle.stop();
            info!("⏭️ Pista saltada en guild {}", guild_id);
        }
    }

    /// Detiene la reproducción y limpia la cola.
    pub fn stop(&self, guild_id: GuildId) {
        if let Some((_, handle)) = self.current_tracks.remove(&guild_id) {
            let _ = handle.stop();
        }
        if let Some(queue) = self.queues.peek(guild_id) {
            queue.write().clear();
        }
        info!("⏹️ Reproducción detenida en guild {}", guild_id);
    }

    pub fn pause(&self, guild_id: GuildId) {
        if let Some(handle) = self.current_tracks.get(&guild_id) {
            let _ = handle.pause();
            info!("⏸️ Pausado en guild {}", guild_id);
        }
    }

    pub fn resume(&self, guild_id: GuildId) {
        if let Some(handle) = self.current_tracks.get(&guild_id) {
            let _ = handle.play();
            info!("▶️ Reanudado en guild {}", guild_id);
        }
    }

    /// Ajusta el volumen de la guild (0.0 a 1.0) y lo aplica a la pista en
    /// curso.
    pub fn set_volume(&self, guild_id: GuildId, volume: f32) -> f32 {
        let clamped = volume.clamp(0.0, 1.0);
        self.queues.get(guild_id).write().set_volume(clamped);
        if let Some(handle) = self.current_tracks.get(&guild_id) {
            let _ = handle.set_volume(clamped);
        }
        info!("🔊 Volumen en guild {}: {}%", guild_id, (clamped * 100.0) as u8);
        clamped
    }

    pub fn cycle_loop_mode(&self, guild_id: GuildId) -> LoopMode {
        self.queues.get(guild_id).write().cycle_loop_mode()
    }

    pub fn shuffle(&self, guild_id: GuildId) {
        self.queues.get(guild_id).write().shuffle();
    }

    pub fn clear(&self, guild_id: GuildId) {
        if let Some(queue) = self.queues.peek(guild_id) {
            queue.write().clear();
        }
    }

    /// Elimina la pista en la posición dada (base cero).
    pub fn remove(&self, guild_id: GuildId, index: usize) -> Option<Track> {
        self.queues.peek(guild_id)?.write().remove(index)
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        let queue = self.queues.peek(guild_id)?;
        let q = queue.read();
        q.current().cloned()
    }

    /// Proyección de solo lectura de la cola, consistente en un instante.
    pub fn queue_snapshot(&self, guild_id: GuildId) -> QueueSnapshot {
        match self.queues.peek(guild_id) {
            Some(queue) => {
                let q = queue.read();
                QueueSnapshot {
                    current: q.current().cloned(),
                    pending: q.pending_snapshot(),
                    loop_mode: q.loop_mode(),
                    total_duration_secs: q.total_duration_secs(),
                }
            }
            None => QueueSnapshot {
                current: None,
                pending: Vec::new(),
                loop_mode: LoopMode::Off,
                total_duration_secs: 0,
            },
        }
    }

    pub async fn is_playing(&self, guild_id: GuildId) -> bool {
        if let Some(handle) = self.current_tracks.get(&guild_id) {
            if let Ok(state) = handle.get_info().await {
                return matches!(state.playing, PlayMode::Play | PlayMode::Pause);
            }
        }
        false
    }

    /// Lanza el barrido periódico de inactividad.
    ///
    /// Una guild sin pista actual, con cola vacía y sin actividad por más
    /// del umbral se limpia, se saca del registro y suelta su conexión de
    /// voz, salvo que tenga el modo 24/7 activado. El barrido solo lee
    /// estado de colas: una descarga colgada de otra guild jamás lo bloquea.
    pub fn spawn_idle_sweeper(
        &self,
        manager: Arc<Songbird>,
        settings: Arc<Mutex<SettingsStore>>,
        idle_timeout: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let player = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                player.sweep_idle(&manager, &settings, idle_timeout).await;
            }
        })
    }

    async fn sweep_idle(
        &self,
        manager: &Arc<Songbird>,
        settings: &Arc<Mutex<SettingsStore>>,
        idle_timeout: Duration,
    ) {
        for guild_id in self.queues.guild_ids() {
            if settings.lock().await.stay_connected(guild_id.get()) {
                continue;
            }

            let Some(queue) = self.queues.peek(guild_id) else {
                continue;
            };

            let expired = {
                let q = queue.read();
                q.current().is_none() && q.is_pending_empty() && q.idle_for() > idle_timeout
            };

            if expired {
                queue.write().clear();
                self.queues.remove(guild_id);
                self.current_tracks.remove(&guild_id);
                if let Err(e) = manager.remove(guild_id).await {
                    debug!("Sin conexión de voz que soltar en guild {}: {}", guild_id, e);
                }
                info!("💤 Guild {} inactiva por más de {:?}, desconectado", guild_id, idle_timeout);
            }
        }
    }
}

/// Encadena la siguiente pista cuando termina la actual.
struct TrackEndHandler {
    player: Player,
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
}

#[async_trait::async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("Pista terminada en guild {}, encadenando", self.guild_id);

        if let Err(e) = self
            .player
            .play_next(self.guild_id, self.call.clone())
            .await
        {
            error!("Error al reproducir la siguiente pista: {:?}", e);
        }

        None
    }
}
