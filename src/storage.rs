use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

/// Ajustes persistidos de una guild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: u64,
    pub volume: f32,
    /// Modo 24/7: no desconectar por inactividad
    pub stay_connected: bool,
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            guild_id: 0,
            volume: 0.5,
            stay_connected: false,
        }
    }
}

/// Almacenamiento de ajustes por guild basado en archivos JSON.
///
/// Un archivo `guild_<id>.json` por guild bajo el directorio de datos; todo
/// se carga en memoria al arrancar y se escribe de inmediato en cada cambio.
pub struct SettingsStore {
    data_dir: PathBuf,
    settings_cache: HashMap<u64, GuildSettings>,
}

impl SettingsStore {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir).await?;

        let guilds_dir = data_dir.join("guilds");
        fs::create_dir_all(&guilds_dir).await?;

        info!("📁 Ajustes inicializados en: {}", data_dir.display());

        let mut store = Self {
            data_dir,
            settings_cache: HashMap::new(),
        };

        store.load_all().await?;

        Ok(store)
    }

    /// Obtiene los ajustes de una guild, creando los valores por defecto en
    /// el primer acceso.
    pub async fn get(&mut self, guild_id: u64) -> Result<GuildSettings> {
        if let Some(settings) = self.settings_cache.get(&guild_id) {
            return Ok(settings.clone());
        }

        let settings = GuildSettings {
            guild_id,
            ..Default::default()
        };
        self.save(&settings).await?;
        self.settings_cache.insert(guild_id, settings.clone());

        info!("📝 Ajustes por defecto creados para guild {}", guild_id);
        Ok(settings)
    }

    pub async fn set_volume(&mut self, guild_id: u64, volume: f32) -> Result<()> {
        let mut settings = self.get(guild_id).await?;
        settings.volume = volume.clamp(0.0, 1.0);
        self.update(settings).await
    }

    /// Activa o desactiva el modo 24/7 y devuelve el estado nuevo.
    pub async fn toggle_stay_connected(&mut self, guild_id: u64) -> Result<bool> {
        let mut settings = self.get(guild_id).await?;
        settings.stay_connected = !settings.stay_connected;
        let state = settings.stay_connected;
        self.update(settings).await?;
        Ok(state)
    }

    /// Consulta del modo 24/7 sin tocar disco (para el barrido de
    /// inactividad).
    pub fn stay_connected(&self, guild_id: u64) -> bool {
        self.settings_cache
            .get(&guild_id)
            .map(|s| s.stay_connected)
            .unwrap_or(false)
    }

    pub fn volume(&self, guild_id: u64) -> Option<f32> {
        self.settings_cache.get(&guild_id).map(|s| s.volume)
    }

    async fn update(&mut self, settings: GuildSettings) -> Result<()> {
        let guild_id = settings.guild_id;
        self.settings_cache.insert(guild_id, settings.clone());
        self.save(&settings).await?;
        info!("💾 Ajustes actualizados para guild {}", guild_id);
        Ok(())
    }

    async fn save(&self, settings: &GuildSettings) -> Result<()> {
        let file_path = self.settings_file(settings.guild_id);
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&file_path, content).await?;
        Ok(())
    }

    async fn load_all(&mut self) -> Result<()> {
        let guilds_dir = self.data_dir.join("guilds");
        let mut files = fs::read_dir(&guilds_dir).await?;
        let mut loaded = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                match fs::read_to_string(&path).await {
                    Ok(content) => match serde_json::from_str::<GuildSettings>(&content) {
                        Ok(settings) => {
                            self.settings_cache.insert(settings.guild_id, settings);
                            loaded += 1;
                        }
                        Err(e) => warn!("Ajustes ilegibles en {}: {}", path.display(), e),
                    },
                    Err(e) => warn!("Error leyendo {}: {}", path.display(), e),
                }
            }
        }

        if loaded > 0 {
            info!("📂 Cargados ajustes de {} guilds", loaded);
        }

        Ok(())
    }

    fn settings_file(&self, guild_id: u64) -> PathBuf {
        self.data_dir
            .join("guilds")
            .join(format!("guild_{}.json", guild_id))
    }
}
