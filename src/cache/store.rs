use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// Nombre del archivo de índice dentro del directorio de caché
pub const INDEX_FILE: &str = "index.json";

/// Registro de un archivo de audio cacheado
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub file_path: PathBuf,
    pub size_bytes: u64,
    pub last_accessed: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Tabla persistente de entradas del caché de audio.
///
/// El índice vive como `index.json` dentro del directorio de caché, junto a
/// los archivos de audio (`<key>.<ext>`). Toda mutación pasa por el
/// [`AudioCacheManager`](super::AudioCacheManager), que serializa el acceso.
#[derive(Debug)]
pub struct CacheStore {
    index_path: PathBuf,
    entries: HashMap<String, CacheEntry>,
}

impl CacheStore {
    /// Abre (o crea) el índice en `cache_dir`.
    ///
    /// Un índice ilegible no es fatal: se empieza con una tabla vacía y la
    /// reconciliación de arranque elimina los archivos que queden huérfanos.
    pub async fn open(cache_dir: &Path) -> Result<Self> {
        fs::create_dir_all(cache_dir)
            .await
            .with_context(|| format!("creando directorio de caché {}", cache_dir.display()))?;

        let index_path = cache_dir.join(INDEX_FILE);
        let entries = match fs::read_to_string(&index_path).await {
            Ok(raw) => match serde_json::from_str::<HashMap<String, CacheEntry>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("⚠️ Índice de caché ilegible ({}), empezando vacío", e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        info!(
            "📁 Índice de caché abierto: {} entradas en {}",
            entries.len(),
            cache_dir.display()
        );

        Ok(Self { index_path, entries })
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Actualiza `last_accessed` de una entrada existente.
    pub fn touch(&mut self, key: &str) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_accessed = Utc::now();
        }
    }

    /// Inserta o reemplaza la entrada para su clave.
    pub fn insert(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Tamaño total recalculado desde las entradas, nunca un contador aparte.
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }

    /// Candidata a expulsión: la entrada con el `last_accessed` más antiguo.
    /// Empates se resuelven por `created_at` y después por clave.
    pub fn lru_candidate(&self) -> Option<&CacheEntry> {
        self.entries.values().min_by(|a, b| {
            a.last_accessed
                .cmp(&b.last_accessed)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.key.cmp(&b.key))
        })
    }

    /// Verdadero si `path` es el archivo de índice (no debe tratarse como
    /// audio huérfano).
    pub fn is_index_file(&self, path: &Path) -> bool {
        path == self.index_path
    }

    /// Escribe el índice a disco.
    pub async fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.index_path, raw)
            .await
            .with_context(|| format!("escribiendo índice {}", self.index_path.display()))?;
        Ok(())
    }
}
