//! # Sources
//!
//! Collaborators that turn a [`TrackQuery`] into something ffmpeg can open.
//!
//! - [`YtDlpExtractor`] is the primary path: it asks yt-dlp for the direct
//!   stream URL of the best audio format without downloading anything.
//! - [`YtDlpDownloader`] is the fallback: it downloads the audio into a
//!   temporary directory and hands out the local path.
//!
//! Both sit behind traits so the resolver can be exercised without spawning
//! processes.

pub mod downloader;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};
use tokio::process::Command;
use tracing::{debug, error, info};
use url::Url;

use crate::{
    config::YtDlpOptions,
    error::{ExtractError, ExtractFailure},
};

pub use downloader::YtDlpDownloader;
pub use youtube::YtDlpExtractor;

/// Consulta normalizada: URL canónica o búsqueda en minúsculas.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackQuery {
    Url(String),
    Search(String),
}

impl TrackQuery {
    /// Normaliza la entrada del usuario. Devuelve `None` si está vacía.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(url) = parse_web_url(trimmed) {
            return Some(Self::Url(normalize_url(url)));
        }

        let collapsed = trimmed
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        Some(Self::Search(collapsed))
    }

    /// Clave del caché de resolución
    pub fn cache_key(&self) -> String {
        match self {
            Self::Url(url) => format!("url:{}", url),
            Self::Search(query) => format!("search:{}", query),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Search(query) => query,
        }
    }

    pub fn is_search(&self) -> bool {
        matches!(self, Self::Search(_))
    }

    /// Objetivo para yt-dlp: la URL o una búsqueda `ytsearchN:`
    pub fn ytdlp_target(&self, results: usize) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::Search(query) => format!("ytsearch{}:{}", results.max(1), query),
        }
    }
}

fn parse_web_url(raw: &str) -> Option<Url> {
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else if raw.starts_with("www.")
        || raw.starts_with("youtube.com/")
        || raw.starts_with("m.youtube.com/")
        || raw.starts_with("music.youtube.com/")
        || raw.starts_with("youtu.be/")
    {
        format!("https://{}", raw)
    } else {
        return None;
    };

    // Una búsqueda puede contener "://" en medio de texto libre
    if candidate.contains(char::is_whitespace) {
        return None;
    }

    Url::parse(&candidate)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
}

fn normalize_url(mut url: Url) -> String {
    url.set_fragment(None);
    match youtube::video_id(&url) {
        Some(id) => format!("https://www.youtube.com/watch?v={}", id),
        None => url.to_string(),
    }
}

/// Dónde está el audio resuelto
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioLocation {
    /// URL directa del formato de audio (streaming)
    Stream(String),
    /// Archivo descargado por el fallback
    File(PathBuf),
}

impl AudioLocation {
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path.as_path()),
            Self::Stream(_) => None,
        }
    }
}

/// Resultado de un colaborador de extracción
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTrack {
    pub title: String,
    pub source: AudioLocation,
    pub webpage_url: String,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
}

/// Extractor primario (sin descarga)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, query: &TrackQuery) -> Result<ExtractedTrack, ExtractError>;

    /// Nombre de la fuente para logs
    fn name(&self) -> &'static str;
}

/// Descargador de respaldo: escribe archivos temporales
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, query: &TrackQuery) -> Result<ExtractedTrack, ExtractError>;

    /// Borra archivos descargados que no estén en `keep` y tengan más de `grace`
    async fn purge_unreferenced(&self, keep: &HashSet<PathBuf>, grace: Duration) -> usize;
}

static AGE_RESTRICTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(confirm your age|age[- ]restricted|inappropriate for some users|age-gated)")
        .expect("regex de restricción de edad válida")
});

static UNSUPPORTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(unsupported url|is not a valid url|no video formats found|requested format is not available|drm protected|this live event will begin)",
    )
    .expect("regex de contenido no soportado válida")
});

static NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(video unavailable|private video|has been removed|does not exist|no results)")
        .expect("regex de contenido inexistente válida")
});

static NETWORK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(unable to download|timed out|temporary failure|connection (reset|refused)|network is unreachable|http error 5\d\d|http error 429)",
    )
    .expect("regex de errores de red válida")
});

/// Clasifica la salida de error de yt-dlp
pub fn classify_failure(stderr: &str) -> ExtractFailure {
    if AGE_RESTRICTED.is_match(stderr) {
        ExtractFailure::AgeRestricted
    } else if UNSUPPORTED.is_match(stderr) {
        ExtractFailure::Unsupported
    } else if NOT_FOUND.is_match(stderr) {
        ExtractFailure::NotFound
    } else if NETWORK.is_match(stderr) {
        ExtractFailure::Network
    } else {
        ExtractFailure::Other
    }
}

/// Argumentos comunes de yt-dlp derivados de la configuración
pub(crate) fn base_ytdlp_args(options: &YtDlpOptions) -> Vec<String> {
    let mut args = vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--no-check-certificate".to_string(),
        "--geo-bypass".to_string(),
        "--socket-timeout".to_string(),
        options.socket_timeout.to_string(),
        "--retries".to_string(),
        options.retries.to_string(),
    ];

    if let Some(cookies) = &options.cookies_file {
        if cookies.exists() {
            args.push("--cookies".to_string());
            args.push(cookies.display().to_string());
        } else {
            debug!("🍪 Archivo de cookies no encontrado: {}", cookies.display());
        }
    }

    args
}

/// Ejecuta yt-dlp con timeout y devuelve stdout; el proceso muere si expira
pub(crate) async fn run_ytdlp(args: &[String], timeout: Duration) -> Result<String, ExtractError> {
    let mut cmd = Command::new("yt-dlp");
    cmd.args(args).kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ExtractError::other(format!("no se pudo ejecutar yt-dlp: {}", e)));
        }
        Err(_) => {
            return Err(ExtractError::new(
                ExtractFailure::Network,
                format!("yt-dlp timed out after {:?}", timeout),
            ));
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let kind = classify_failure(&stderr);
        return Err(ExtractError::new(kind, stderr.trim().to_string()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Verifica que yt-dlp y ffmpeg estén disponibles
pub async fn verify_dependencies() -> Result<()> {
    let ytdlp_check = Command::new("yt-dlp").arg("--version").output().await;
    match ytdlp_check {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            info!("✅ yt-dlp versión: {}", version.trim());
        }
        _ => {
            error!("❌ yt-dlp no encontrado. Instala con: pip install yt-dlp");
            anyhow::bail!("yt-dlp no disponible");
        }
    }

    let ffmpeg_check = Command::new("ffmpeg").arg("-version").output().await;
    match ffmpeg_check {
        Ok(output) if output.status.success() => {
            info!("✅ ffmpeg disponible");
        }
        _ => {
            error!("❌ ffmpeg no encontrado. Instala con: sudo apt install ffmpeg");
            anyhow::bail!("ffmpeg no disponible");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn search_queries_are_trimmed_collapsed_and_lowercased() {
        assert_eq!(
            TrackQuery::parse("  Daft   Punk \t One More Time "),
            Some(TrackQuery::Search("daft punk one more time".into()))
        );
        assert_eq!(TrackQuery::parse("   "), None);
    }

    #[test]
    fn youtube_urls_share_a_canonical_form() {
        let expected = Some(TrackQuery::Url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
        ));
        assert_eq!(TrackQuery::parse("https://youtu.be/dQw4w9WgXcQ"), expected);
        assert_eq!(
            TrackQuery::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42#frag"),
            expected
        );
        assert_eq!(TrackQuery::parse("youtube.com/watch?v=dQw4w9WgXcQ"), expected);
        assert_eq!(
            TrackQuery::parse("https://music.youtube.com/watch?v=dQw4w9WgXcQ"),
            expected
        );
    }

    #[test]
    fn other_urls_keep_their_path_but_drop_fragment() {
        assert_eq!(
            TrackQuery::parse("https://soundcloud.com/artist/song#t=10"),
            Some(TrackQuery::Url("https://soundcloud.com/artist/song".into()))
        );
    }

    #[test]
    fn free_text_with_scheme_like_token_is_a_search() {
        assert!(TrackQuery::parse("listen to http://example.com now")
            .map(|q| q.is_search())
            .unwrap_or(false));
    }

    #[test]
    fn cache_keys_distinguish_url_and_search() {
        let url = TrackQuery::Url("https://x.test/a".into());
        let search = TrackQuery::Search("https://x.test/a".into());
        assert_ne!(url.cache_key(), search.cache_key());
        assert_eq!(search.ytdlp_target(5), "ytsearch5:https://x.test/a");
    }

    #[test]
    fn classifies_ytdlp_errors() {
        assert_eq!(
            classify_failure("ERROR: [youtube] abc: Sign in to confirm your age."),
            ExtractFailure::AgeRestricted
        );
        assert_eq!(
            classify_failure("ERROR: Unsupported URL: https://example.com"),
            ExtractFailure::Unsupported
        );
        assert_eq!(
            classify_failure("ERROR: [youtube] abc: Video unavailable"),
            ExtractFailure::NotFound
        );
        assert_eq!(
            classify_failure("ERROR: Unable to download webpage: <urlopen error timed out>"),
            ExtractFailure::Network
        );
        assert_eq!(classify_failure("something odd"), ExtractFailure::Other);
    }
}
