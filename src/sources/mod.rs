pub mod ytdlp;

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use ytdlp::YtDlpFetcher;

/// Metadatos de un track resueltos por el extractor, sin descargar nada.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub title: String,
    /// URL canónica de la página del track
    pub webpage_url: String,
    /// Duración en segundos; 0 cuando es desconocida
    pub duration_secs: u64,
    pub is_live: bool,
    pub thumbnail: Option<String>,
}

/// Archivo de audio materializado en disco por el extractor.
#[derive(Debug, Clone)]
pub struct DownloadedAudio {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Contrato del colaborador de descarga/extracción.
///
/// Las dos operaciones corren procesos externos y nunca deben bloquear el
/// scheduler; las implementaciones usan I/O asíncrona de principio a fin.
/// El caché decide QUÉ descargar; este trait decide CÓMO.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Resuelve metadatos para una URL o términos de búsqueda.
    async fn probe(&self, query: &str) -> Result<TrackMetadata>;

    /// Descarga el audio de `url` usando la plantilla de salida
    /// `<dir>/<clave>.%(ext)s` y devuelve el archivo final. La extensión
    /// la elige el extractor según el formato disponible.
    async fn download(&self, url: &str, output_template: &Path) -> Result<DownloadedAudio>;
}
