use anyhow::{Context, Result};
use async_trait::async_trait;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::{base_ytdlp_args, run_ytdlp, AudioLocation, Downloader, ExtractedTrack, TrackQuery};
use crate::{config::YtDlpOptions, error::ExtractError};

/// Descargador de respaldo: baja el audio a un directorio temporal.
///
/// El directorio se borra completo cuando el descargador se destruye; los
/// archivos individuales los purga el resolver cuando ya no los referencia
/// ninguna entrada viva del caché ni los está reproduciendo una sesión.
pub struct YtDlpDownloader {
    dir: TempDir,
    options: YtDlpOptions,
    timeout: Duration,
}

impl YtDlpDownloader {
    pub fn new(cache_dir: &Path, options: YtDlpOptions, timeout: Duration) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("open_music_")
            .tempdir_in(cache_dir)
            .with_context(|| format!("No se pudo crear directorio temporal en {}", cache_dir.display()))?;

        info!("📥 Descargador inicializado en: {}", dir.path().display());

        Ok(Self {
            dir,
            options,
            timeout,
        })
    }

    fn build_args(&self, query: &TrackQuery) -> Vec<String> {
        let template = self.dir.path().join("%(id)s.%(ext)s");
        let mut args = base_ytdlp_args(&self.options);
        args.extend([
            "-f".to_string(),
            "bestaudio[ext=m4a]/bestaudio/best".to_string(),
            "--no-progress".to_string(),
            // La gracia de la limpieza cuenta desde la descarga, no desde el
            // Last-Modified del servidor
            "--no-mtime".to_string(),
            "-o".to_string(),
            template.display().to_string(),
            "--print".to_string(),
            "after_move:%(filepath)s\t%(title)s\t%(duration)s\t%(webpage_url)s".to_string(),
            query.ytdlp_target(1),
        ]);
        args
    }
}

/// Línea impresa por yt-dlp tras mover el archivo final
fn parse_printed_line(line: &str) -> Option<(PathBuf, String, Option<Duration>, String)> {
    let mut parts = line.trim_end().split('\t');
    let path = parts.next().filter(|p| !p.is_empty())?;
    let title = parts.next().unwrap_or("Unknown").to_string();
    let duration = parts
        .next()
        .and_then(|d| d.parse::<f64>().ok())
        .map(Duration::from_secs_f64);
    let webpage_url = parts.next().unwrap_or_default().to_string();

    Some((PathBuf::from(path), title, duration, webpage_url))
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(&self, query: &TrackQuery) -> Result<ExtractedTrack, ExtractError> {
        info!("⬇️ Descargando (fallback): {}", query.as_str());
        let stdout = run_ytdlp(&self.build_args(query), self.timeout).await?;

        let (path, title, duration, webpage_url) = stdout
            .lines()
            .rev()
            .find_map(parse_printed_line)
            .ok_or_else(|| ExtractError::not_found("yt-dlp no reportó archivo descargado"))?;

        // Verificar que el archivo existe y tiene contenido
        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.len() == 0 {
            return Err(ExtractError::other(format!(
                "archivo descargado vacío: {}",
                path.display()
            )));
        }

        info!("✅ Audio descargado en: {}", path.display());

        Ok(ExtractedTrack {
            title,
            source: AudioLocation::File(path),
            webpage_url: if webpage_url.is_empty() {
                query.as_str().to_string()
            } else {
                webpage_url
            },
            duration,
            thumbnail: None,
        })
    }

    async fn purge_unreferenced(&self, keep: &HashSet<PathBuf>, grace: Duration) -> usize {
        purge_dir(self.dir.path(), keep, grace).await
    }
}

/// Borra archivos de `dir` que no estén referenciados y superen el periodo de gracia
async fn purge_dir(dir: &Path, keep: &HashSet<PathBuf>, grace: Duration) -> usize {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("No se pudo leer {}: {}", dir.display(), e);
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if keep.contains(&path) {
            continue;
        }

        let age = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => now.duration_since(modified).unwrap_or_default(),
            Err(_) => continue,
        };
        if age < grace {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("🗑️ Archivo temporal eliminado: {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Error eliminando {}: {}", path.display(), e),
        }
    }

    removed
}
