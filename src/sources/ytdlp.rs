use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use super::{AudioFetcher, DownloadedAudio, TrackMetadata};

/// Formato preferido: opus directo cuando está disponible, sin transcodificar
const AUDIO_FORMAT: &str = "bestaudio[acodec=opus]/bestaudio/best";

/// Extractor basado en yt-dlp.
///
/// Cada operación lanza el binario `yt-dlp` como proceso hijo asíncrono, de
/// modo que ni la extracción de metadatos ni la descarga bloquean el
/// scheduler cooperativo.
pub struct YtDlpFetcher;

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self
    }

    /// Una URL pasa tal cual; términos de búsqueda se convierten en
    /// `ytsearch1:` para resolver el primer resultado.
    fn as_query_arg(query: &str) -> String {
        if Url::parse(query).is_ok() {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        }
    }

    fn parse_metadata(raw: &str) -> Result<TrackMetadata> {
        let value: Value = serde_json::from_str(raw.trim())
            .context("la salida de yt-dlp no es JSON válido")?;

        // Las búsquedas `ytsearch` devuelven una lista de entradas
        let info = value
            .get("entries")
            .and_then(|e| e.get(0))
            .unwrap_or(&value);

        let title = info
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        let webpage_url = info
            .get("webpage_url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let duration_secs = info
            .get("duration")
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as u64;
        let is_live = info
            .get("is_live")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let thumbnail = info
            .get("thumbnail")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(TrackMetadata {
            title,
            webpage_url,
            duration_secs,
            is_live,
            thumbnail,
        })
    }

    /// yt-dlp elige la extensión final; localizar el archivo descargado por
    /// el prefijo `<clave>.` de la plantilla.
    async fn locate_output(output_template: &Path) -> Result<PathBuf> {
        let dir = output_template
            .parent()
            .context("plantilla de salida sin directorio")?;
        let name = output_template
            .file_name()
            .and_then(|n| n.to_str())
            .context("plantilla de salida sin nombre de archivo")?;
        let prefix = name.strip_suffix("%(ext)s").unwrap_or(name);

        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.starts_with(prefix)
                && !file_name.ends_with(".part")
                && !file_name.ends_with(".ytdl")
            {
                return Ok(entry.path());
            }
        }

        anyhow::bail!("descarga terminada pero no se encontró archivo para {}", prefix)
    }
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioFetcher for YtDlpFetcher {
    async fn probe(&self, query: &str) -> Result<TrackMetadata> {
        let arg = Self::as_query_arg(query);
        debug!("🔍 Extrayendo metadatos: {}", arg);

        let output = Command::new("yt-dlp")
            .args(["--dump-json", "--no-playlist", "--quiet", "--no-warnings"])
            .arg(&arg)
            .output()
            .await
            .context("no se pudo ejecutar yt-dlp")?;

        if !output.status.success() {
            anyhow::bail!(
                "yt-dlp falló al extraer metadatos: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Self::parse_metadata(&String::from_utf8_lossy(&output.stdout))
    }

    async fn download(&self, url: &str, output_template: &Path) -> Result<DownloadedAudio> {
        info!("⬇️ Descargando audio: {}", url);

        let output = Command::new("yt-dlp")
            .args(["--format", AUDIO_FORMAT, "--no-playlist", "--quiet", "--no-warnings"])
            .arg("--output")
            .arg(output_template)
            .arg(url)
            .output()
            .await
            .context("no se pudo ejecutar yt-dlp")?;

        if !output.status.success() {
            anyhow::bail!(
                "yt-dlp falló al descargar: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let path = Self::locate_output(output_template).await?;
        let size_bytes = tokio::fs::metadata(&path).await?.len();

        Ok(DownloadedAudio { path, size_bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_query_arg_passes_urls_through() {
        assert_eq!(
            YtDlpFetcher::as_query_arg("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_query_arg_wraps_search_terms() {
        assert_eq!(
            YtDlpFetcher::as_query_arg("never gonna give you up"),
            "ytsearch1:never gonna give you up"
        );
    }

    #[test]
    fn test_parse_metadata_single_object() {
        let raw = r#"{
            "title": "Test Song",
            "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "duration": 212.5,
            "is_live": false,
            "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq720.jpg"
        }"#;
        let meta = YtDlpFetcher::parse_metadata(raw).unwrap();
        assert_eq!(meta.title, "Test Song");
        assert_eq!(meta.duration_secs, 212);
        assert!(!meta.is_live);
        assert!(meta.thumbnail.is_some());
    }

    #[test]
    fn test_parse_metadata_search_entries() {
        let raw = r#"{
            "entries": [{
                "title": "First Hit",
                "webpage_url": "https://www.youtube.com/watch?v=abc123def45",
                "duration": 60
            }]
        }"#;
        let meta = YtDlpFetcher::parse_metadata(raw).unwrap();
        assert_eq!(meta.title, "First Hit");
        assert_eq!(meta.duration_secs, 60);
    }

    #[test]
    fn test_parse_metadata_live_stream_has_no_duration() {
        let raw = r#"{"title": "Radio", "webpage_url": "https://example.com", "is_live": true}"#;
        let meta = YtDlpFetcher::parse_metadata(raw).unwrap();
        assert!(meta.is_live);
        assert_eq!(meta.duration_secs, 0);
    }

    #[test]
    fn test_parse_metadata_rejects_garbage() {
        assert!(YtDlpFetcher::parse_metadata("404 not found").is_err());
    }
}
