use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::store::{CacheEntry, CacheStore};
use crate::config::Config;
use crate::sources::AudioFetcher;

/// Patrón de IDs de video de YouTube (watch, corto, embed, shorts)
const YOUTUBE_ID_PATTERN: &str =
    r"(?:youtube\.com/watch\?.*v=|youtu\.be/|youtube\.com/embed/|youtube\.com/shorts/)([A-Za-z0-9_-]{11})";

/// Estimación de tamaño: 128 kbps ≈ 16 KiB por segundo de audio
const ESTIMATED_BYTES_PER_SEC: u64 = 16 * 1024;

/// Fallo de una descarga concreta. Nunca es fatal: el que llama hace
/// streaming directo desde la URL remota.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
    #[error("la descarga excedió el límite de {0} segundos")]
    TimedOut(u64),
}

/// Resultado de resolver audio para reproducción inmediata.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedAudio {
    /// Copia local lista para leer desde disco
    Local(PathBuf),
    /// El caché rehusó o falló; reproducir directamente desde la URL remota
    Remote,
}

impl ResolvedAudio {
    #[allow(dead_code)]
    pub fn is_local(&self) -> bool {
        matches!(self, ResolvedAudio::Local(_))
    }
}

/// Estadísticas acumuladas del caché (se reinician solo con `clear_all`).
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub count: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn total_size_mb(&self) -> f64 {
        self.total_size_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn max_size_mb(&self) -> u64 {
        self.max_size_bytes / (1024 * 1024)
    }
}

/// Gestor del caché de audio descargado.
///
/// Sostiene tres invariantes:
/// - como máximo una descarga en vuelo por clave (candado por clave);
/// - la suma de tamaños registrados nunca supera el presupuesto tras
///   completar un ciclo de inserción/expulsión (LRU estricto);
/// - cada registro apunta a un archivo existente (auto-reparación en
///   consulta y reconciliación al arranque).
pub struct AudioCacheManager {
    cache_dir: PathBuf,
    max_size_bytes: u64,
    max_cache_duration: u64,
    download_timeout: Duration,
    fetcher: Arc<dyn AudioFetcher>,
    store: Mutex<CacheStore>,
    /// Un candado por clave, creado al primer uso y compartido por todos
    /// los llamadores concurrentes de esa clave
    key_locks: DashMap<String, Arc<Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AudioCacheManager {
    /// Abre el índice y ejecuta la reconciliación de arranque antes de
    /// aceptar cualquier otra operación.
    pub async fn new(config: &Config, fetcher: Arc<dyn AudioFetcher>) -> Result<Self> {
        let store = CacheStore::open(&config.cache_dir).await?;

        let manager = Self {
            cache_dir: config.cache_dir.clone(),
            max_size_bytes: config.cache_limit_bytes(),
            max_cache_duration: config.max_cache_duration,
            download_timeout: Duration::from_secs(config.download_timeout),
            fetcher,
            store: Mutex::new(store),
            key_locks: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        };

        manager.reconcile_on_startup().await?;

        Ok(manager)
    }

    /// Deriva la clave de caché para una URL: el ID de video si la URL es
    /// de una plataforma conocida, o un hash truncado en caso contrario.
    /// Determinista: la misma URL siempre produce la misma clave.
    pub fn derive_key(url: &str) -> String {
        if let Ok(re) = Regex::new(YOUTUBE_ID_PATTERN) {
            if let Some(caps) = re.captures(url) {
                return caps[1].to_string();
            }
        }
        let digest = Sha256::digest(url.as_bytes());
        hex::encode(digest)[..16].to_string()
    }

    /// Consulta el caché. Un registro cuyo archivo desapareció se purga y
    /// se reporta como ausencia (auto-reparación).
    pub async fn lookup(&self, key: &str) -> Option<PathBuf> {
        let mut store = self.store.lock().await;
        self.lookup_locked(&mut store, key).await
    }

    async fn lookup_locked(&self, store: &mut CacheStore, key: &str) -> Option<PathBuf> {
        if let Some(entry) = store.get(key) {
            let path = entry.file_path.clone();
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                store.touch(key);
                if let Err(e) = store.persist().await {
                    warn!("⚠️ No se pudo persistir el índice tras un hit: {}", e);
                }
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit: {} -> {}", key, path.display());
                return Some(path);
            }

            // El archivo desapareció bajo nuestros pies: purgar el registro
            store.remove(key);
            if let Err(e) = store.persist().await {
                warn!("⚠️ No se pudo persistir el índice tras purgar {}: {}", key, e);
            }
            warn!("🩹 Registro sin archivo purgado: {}", key);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Descarga y cachea el audio de `url` bajo `key`, o devuelve la copia
    /// que otro llamador acaba de terminar. Rehúsa streams en vivo, pistas
    /// de duración desconocida y pistas más largas que el máximo cacheable.
    pub async fn fetch_or_cache(
        &self,
        key: &str,
        url: &str,
        duration_secs: u64,
        is_live: bool,
    ) -> Option<PathBuf> {
        if is_live || duration_secs == 0 || duration_secs > self.max_cache_duration {
            debug!(
                "⏭️ No cacheable: {} (live={}, duración={}s)",
                key, is_live, duration_secs
            );
            return None;
        }

        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        // Otro llamador pudo terminar la descarga mientras esperábamos
        {
            let mut store = self.store.lock().await;
            if let Some(path) = self.lookup_locked(&mut store, key).await {
                return Some(path);
            }
        }

        match self.download_locked(key, url, duration_secs).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("⚠️ Descarga fallida para {}: {}", key, e);
                None
            }
        }
    }

    /// Resuelve audio para el orquestador de reproducción: primero el
    /// caché, después descarga; si nada aplica, streaming remoto.
    pub async fn resolve_audio(
        &self,
        url: &str,
        duration_secs: u64,
        is_live: bool,
    ) -> ResolvedAudio {
        let key = Self::derive_key(url);

        if let Some(path) = self.lookup(&key).await {
            return ResolvedAudio::Local(path);
        }

        match self.fetch_or_cache(&key, url, duration_secs, is_live).await {
            Some(path) => ResolvedAudio::Local(path),
            None => ResolvedAudio::Remote,
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let store = self.store.lock().await;
        CacheStats {
            count: store.len(),
            total_size_bytes: store.total_size(),
            max_size_bytes: self.max_size_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Borra todos los archivos y registros y reinicia los contadores.
    pub async fn clear_all(&self) -> Result<()> {
        let mut store = self.store.lock().await;

        let paths: Vec<PathBuf> = store.entries().map(|e| e.file_path.clone()).collect();
        for path in paths {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("⚠️ No se pudo borrar {}: {}", path.display(), e),
            }
        }

        store.clear();
        store.persist().await?;

        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);

        info!("🧹 Caché vaciado por completo");
        Ok(())
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Cuerpo de la descarga; se ejecuta con el candado de la clave tomado.
    async fn download_locked(
        &self,
        key: &str,
        url: &str,
        duration_secs: u64,
    ) -> Result<PathBuf, DownloadError> {
        // Liberar espacio ANTES de descargar, para que una descarga nunca
        // termine contra un índice ya pasado de presupuesto
        let assumed_duration = if duration_secs == 0 { 300 } else { duration_secs };
        self.ensure_headroom(assumed_duration * ESTIMATED_BYTES_PER_SEC).await;

        let template = self.cache_dir.join(format!("{key}.%(ext)s"));
        let downloaded = match timeout(self.download_timeout, self.fetcher.download(url, &template))
            .await
        {
            Ok(Ok(downloaded)) => downloaded,
            Ok(Err(e)) => return Err(DownloadError::Failed(e)),
            Err(_) => return Err(DownloadError::TimedOut(self.download_timeout.as_secs())),
        };

        let now = Utc::now();
        let entry = CacheEntry {
            key: key.to_string(),
            file_path: downloaded.path.clone(),
            size_bytes: downloaded.size_bytes,
            last_accessed: now,
            created_at: now,
        };

        {
            let mut store = self.store.lock().await;
            store.insert(entry);
            if let Err(e) = store.persist().await {
                warn!("⚠️ No se pudo persistir el índice tras cachear {}: {}", key, e);
            }
        }

        info!(
            "💾 Cacheado {} ({:.1} MB) -> {}",
            key,
            downloaded.size_bytes as f64 / (1024.0 * 1024.0),
            downloaded.path.display()
        );

        Ok(downloaded.path)
    }

    /// Expulsa entradas en orden LRU estricto hasta que `needed_bytes`
    /// quepan en el presupuesto o no quede nada que expulsar.
    async fn ensure_headroom(&self, needed_bytes: u64) {
        let mut store = self.store.lock().await;
        let mut removed_any = false;

        while store.total_size() + needed_bytes > self.max_size_bytes {
            let Some(victim) = store.lru_candidate().cloned() else {
                // Índice vacío y aun así no cabe: se permite una inserción
                // sobre presupuesto, el exceso se corrige en el siguiente ciclo
                warn!(
                    "⚠️ Entrada de {} bytes excede el presupuesto de {} bytes incluso con el caché vacío",
                    needed_bytes, self.max_size_bytes
                );
                break;
            };

            match tokio::fs::remove_file(&victim.file_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    "⚠️ No se pudo borrar {} durante la expulsión: {}",
                    victim.file_path.display(),
                    e
                ),
            }

            store.remove(&victim.key);
            removed_any = true;
            info!(
                "🗑️ Expulsado {} ({:.1} MB) para liberar espacio",
                victim.key,
                victim.size_bytes as f64 / (1024.0 * 1024.0)
            );
        }

        if removed_any {
            if let Err(e) = store.persist().await {
                warn!("⚠️ No se pudo persistir el índice tras expulsar: {}", e);
            }
        }
    }

    /// Reconciliación de arranque: purga registros cuyo archivo no existe
    /// y borra archivos sin registro (restos de una descarga interrumpida).
    async fn reconcile_on_startup(&self) -> Result<()> {
        let mut store = self.store.lock().await;

        let mut stale = Vec::new();
        for entry in store.entries() {
            if !tokio::fs::try_exists(&entry.file_path).await.unwrap_or(false) {
                stale.push(entry.key.clone());
            }
        }
        for key in &stale {
            store.remove(key);
        }

        let recorded: HashSet<PathBuf> = store.entries().map(|e| e.file_path.clone()).collect();
        let mut orphans = 0usize;
        let mut dir = tokio::fs::read_dir(&self.cache_dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if store.is_index_file(&path) {
                continue;
            }
            if item.file_type().await?.is_dir() {
                continue;
            }
            if !recorded.contains(&path) && tokio::fs::remove_file(&path).await.is_ok() {
                orphans += 1;
            }
        }

        if !stale.is_empty() {
            store.persist().await?;
        }

        info!(
            "🔄 Reconciliación de caché: {} registros obsoletos, {} archivos huérfanos",
            stale.len(),
            orphans
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{DownloadedAudio, MockAudioFetcher, TrackMetadata};
    use async_trait::async_trait;
    use futures::future::join_all;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    const FILE_SIZE: u64 = 300_000;

    fn test_config(dir: &Path, limit_mb: u64) -> Config {
        Config {
            cache_dir: dir.to_path_buf(),
            cache_limit_mb: limit_mb,
            ..Default::default()
        }
    }

    /// Escribe el archivo que yt-dlp habría dejado y devuelve su descriptor
    fn fake_download(template: &Path, size: u64) -> anyhow::Result<DownloadedAudio> {
        let name = template
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .replace("%(ext)s", "opus");
        let path = template.parent().unwrap().join(name);
        std::fs::write(&path, vec![0u8; size as usize]).unwrap();
        Ok(DownloadedAudio {
            path,
            size_bytes: size,
        })
    }

    fn downloading_fetcher(times: usize) -> Arc<MockAudioFetcher> {
        let mut mock = MockAudioFetcher::new();
        mock.expect_download()
            .times(times)
            .returning(|_url, template| fake_download(template, FILE_SIZE));
        Arc::new(mock)
    }

    async fn manager_with(
        dir: &Path,
        limit_mb: u64,
        fetcher: Arc<MockAudioFetcher>,
    ) -> AudioCacheManager {
        AudioCacheManager::new(&test_config(dir, limit_mb), fetcher)
            .await
            .unwrap()
    }

    // --- derive_key ---

    #[test]
    fn test_derive_key_extracts_watch_id() {
        assert_eq!(
            AudioCacheManager::derive_key("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_derive_key_extracts_short_and_embed_forms() {
        assert_eq!(
            AudioCacheManager::derive_key("https://youtu.be/dQw4w9WgXcQ"),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            AudioCacheManager::derive_key("https://www.youtube.com/embed/dQw4w9WgXcQ"),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            AudioCacheManager::derive_key("https://www.youtube.com/shorts/dQw4w9WgXcQ"),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let url = "https://example.com/stream.mp3";
        assert_eq!(
            AudioCacheManager::derive_key(url),
            AudioCacheManager::derive_key(url)
        );
    }

    #[test]
    fn test_derive_key_distinct_urls_distinct_keys() {
        let k1 = AudioCacheManager::derive_key("https://www.youtube.com/watch?v=aaaaaaaaaaa");
        let k2 = AudioCacheManager::derive_key("https://www.youtube.com/watch?v=bbbbbbbbbbb");
        assert_ne!(k1, k2);

        let h1 = AudioCacheManager::derive_key("https://example.com/uno.mp3");
        let h2 = AudioCacheManager::derive_key("https://example.com/dos.mp3");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_derive_key_fallback_is_truncated_hash() {
        let key = AudioCacheManager::derive_key("https://example.com/cancion.ogg");
        assert_eq!(key.len(), 16);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    // --- lookup / fetch_or_cache ---

    #[tokio::test]
    async fn test_lookup_absent_counts_miss() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), 1, Arc::new(MockAudioFetcher::new())).await;

        assert_eq!(manager.lookup("nada").await, None);

        let stats = manager.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[tokio::test]
    async fn test_fetch_then_lookup_hits() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), 1, downloading_fetcher(1)).await;

        let cached = manager
            .fetch_or_cache("abc", "https://example.com/a", 10, false)
            .await
            .unwrap();
        assert!(cached.exists());

        let found = manager.lookup("abc").await.unwrap();
        assert_eq!(found, cached);

        let stats = manager.stats().await;
        assert_eq!(stats.count, 1);
        assert_eq!(stats.total_size_bytes, FILE_SIZE);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_fetch_refuses_live_streams() {
        let dir = tempfile::tempdir().unwrap();
        // Sin expectativa de descarga: cualquier invocación haría fallar el mock
        let manager = manager_with(dir.path(), 1, Arc::new(MockAudioFetcher::new())).await;

        let result = manager
            .fetch_or_cache("live", "https://example.com/radio", 120, true)
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_fetch_refuses_unknown_duration() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), 1, Arc::new(MockAudioFetcher::new())).await;

        let result = manager
            .fetch_or_cache("zero", "https://example.com/x", 0, false)
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_fetch_refuses_overlong_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), 1, Arc::new(MockAudioFetcher::new())).await;

        // max_cache_duration por defecto: 1800s
        let result = manager
            .fetch_or_cache("largo", "https://example.com/set", 7200, false)
            .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_lookup_self_heals_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), 1, downloading_fetcher(1)).await;

        let cached = manager
            .fetch_or_cache("abc", "https://example.com/a", 10, false)
            .await
            .unwrap();
        std::fs::remove_file(&cached).unwrap();

        assert_eq!(manager.lookup("abc").await, None);

        // El registro obsoleto se purgó: el índice queda vacío
        let stats = manager.stats().await;
        assert_eq!(stats.count, 0);
        assert_eq!(stats.total_size_bytes, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fetch_downloads_once() {
        let dir = tempfile::tempdir().unwrap();
        // times(1): el mock falla si hay más de una descarga
        let manager = Arc::new(manager_with(dir.path(), 1, downloading_fetcher(1)).await);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    manager
                        .fetch_or_cache("mismo", "https://example.com/uno", 10, false)
                        .await
                })
            })
            .collect();

        let results: Vec<Option<PathBuf>> = join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let first = results[0].clone().unwrap();
        for result in results {
            assert_eq!(result.unwrap(), first);
        }
    }

    // --- eviction ---

    #[tokio::test]
    async fn test_eviction_removes_oldest_accessed_first() {
        let dir = tempfile::tempdir().unwrap();
        // Límite 1 MiB; tres archivos de 300 KB caben, el cuarto obliga a expulsar
        let manager = manager_with(dir.path(), 1, downloading_fetcher(4)).await;

        for key in ["aaa", "bbb", "ccc"] {
            manager
                .fetch_or_cache(key, &format!("https://example.com/{key}"), 10, false)
                .await
                .unwrap();
        }

        // Refrescar "aaa": ahora la más antigua es "bbb"
        manager.lookup("aaa").await.unwrap();

        manager
            .fetch_or_cache("ddd", "https://example.com/ddd", 10, false)
            .await
            .unwrap();

        // Solo "bbb" cayó; el prefijo LRU mínimo que cubría el hueco
        assert_eq!(manager.lookup("bbb").await, None);
        assert!(manager.lookup("aaa").await.is_some());
        assert!(manager.lookup("ccc").await.is_some());
        assert!(manager.lookup("ddd").await.is_some());

        let stats = manager.stats().await;
        assert_eq!(stats.count, 3);
    }

    #[tokio::test]
    async fn test_size_bound_holds_after_insert_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), 1, downloading_fetcher(5)).await;

        for key in ["k1", "k2", "k3", "k4", "k5"] {
            manager
                .fetch_or_cache(key, &format!("https://example.com/{key}"), 10, false)
                .await
                .unwrap();
        }

        let stats = manager.stats().await;
        assert!(stats.total_size_bytes <= stats.max_size_bytes);
        assert_eq!(stats.count, 3);
    }

    #[tokio::test]
    async fn test_oversized_single_item_still_inserted() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockAudioFetcher::new();
        // 2 MiB reales contra un presupuesto de 1 MiB
        mock.expect_download()
            .times(1)
            .returning(|_url, template| fake_download(template, 2 * 1024 * 1024));
        let manager = manager_with(dir.path(), 1, Arc::new(mock)).await;

        // 70s estimados ya exceden el presupuesto antes de descargar
        let result = manager
            .fetch_or_cache("enorme", "https://example.com/enorme", 70, false)
            .await;
        assert!(result.is_some());

        let stats = manager.stats().await;
        assert_eq!(stats.count, 1);
        assert!(stats.total_size_bytes > stats.max_size_bytes);
    }

    // --- reconciliation / clear ---

    #[tokio::test]
    async fn test_reconcile_removes_stale_records_and_orphans() {
        let dir = tempfile::tempdir().unwrap();

        {
            let manager = manager_with(dir.path(), 1, downloading_fetcher(2)).await;
            manager
                .fetch_or_cache("vivo", "https://example.com/vivo", 10, false)
                .await
                .unwrap();
            let doomed = manager
                .fetch_or_cache("roto", "https://example.com/roto", 10, false)
                .await
                .unwrap();
            // Registro sin archivo
            std::fs::remove_file(doomed).unwrap();
        }

        // Archivo sin registro (descarga interrumpida de un proceso anterior)
        std::fs::write(dir.path().join("huerfano.opus"), b"restos").unwrap();

        let manager = manager_with(dir.path(), 1, Arc::new(MockAudioFetcher::new())).await;

        let stats = manager.stats().await;
        assert_eq!(stats.count, 1);
        assert!(manager.lookup("vivo").await.is_some());
        assert_eq!(manager.lookup("roto").await, None);
        assert!(!dir.path().join("huerfano.opus").exists());
    }

    #[tokio::test]
    async fn test_clear_all_resets_everything() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), 1, downloading_fetcher(1)).await;

        let cached = manager
            .fetch_or_cache("abc", "https://example.com/a", 10, false)
            .await
            .unwrap();
        manager.lookup("abc").await.unwrap();
        manager.lookup("nada").await;

        manager.clear_all().await.unwrap();

        let stats = manager.stats().await;
        assert_eq!(stats.count, 0);
        assert_eq!(stats.total_size_bytes, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert!(!cached.exists());
    }

    // --- timeouts ---

    /// Un descargador que nunca termina
    struct StalledFetcher;

    #[async_trait]
    impl AudioFetcher for StalledFetcher {
        async fn probe(&self, _query: &str) -> anyhow::Result<TrackMetadata> {
            anyhow::bail!("sin uso en esta prueba")
        }

        async fn download(
            &self,
            _url: &str,
            _output_template: &Path,
        ) -> anyhow::Result<DownloadedAudio> {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
            anyhow::bail!("inalcanzable")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_timeout_releases_key_lock() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            AudioCacheManager::new(&test_config(dir.path(), 1), Arc::new(StalledFetcher))
                .await
                .unwrap();

        let first = manager
            .fetch_or_cache("colgado", "https://example.com/x", 10, false)
            .await;
        assert_eq!(first, None);

        // El candado quedó libre: un segundo intento vuelve a llegar a la
        // descarga (y a su timeout) en vez de esperar para siempre
        let second = manager
            .fetch_or_cache("colgado", "https://example.com/x", 10, false)
            .await;
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn test_resolve_audio_remote_on_refusal() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), 1, Arc::new(MockAudioFetcher::new())).await;

        let resolved = manager
            .resolve_audio("https://example.com/radio", 0, true)
            .await;
        assert_eq!(resolved, ResolvedAudio::Remote);
        assert!(!resolved.is_local());
    }

    #[tokio::test]
    async fn test_resolve_audio_local_after_download() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager_with(dir.path(), 1, downloading_fetcher(1)).await;

        let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
        let resolved = manager.resolve_audio(url, 212, false).await;
        assert!(resolved.is_local());

        // La segunda resolución sale del caché sin otra descarga
        let again = manager.resolve_audio(url, 212, false).await;
        assert_eq!(resolved, again);
    }
}
