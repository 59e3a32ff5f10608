use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use url::Url;

use super::{base_ytdlp_args, run_ytdlp, AudioLocation, ExtractedTrack, Extractor, TrackQuery};
use crate::{
    config::{SearchFilters, YtDlpOptions},
    error::{ExtractError, ExtractFailure},
};

/// Candidatos pedidos a yt-dlp para poder aplicar los filtros de búsqueda
const SEARCH_CANDIDATES: usize = 5;

/// Extractor primario: yt-dlp sin descarga, devuelve la URL directa del audio
pub struct YtDlpExtractor {
    options: YtDlpOptions,
    filters: SearchFilters,
    timeout: Duration,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    url: Option<String>,
    is_live: Option<bool>,
}

impl YtDlpExtractor {
    pub fn new(options: YtDlpOptions, filters: SearchFilters, timeout: Duration) -> Self {
        Self {
            options,
            filters,
            timeout,
            rate_limiter: Semaphore::new(3),
        }
    }

    fn build_args(&self, query: &TrackQuery) -> Vec<String> {
        let mut args = base_ytdlp_args(&self.options);
        args.extend(
            ["--dump-json", "-f", "bestaudio/best", "--default-search", "ytsearch"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(query.ytdlp_target(SEARCH_CANDIDATES));
        args
    }

    fn into_track(info: YtDlpInfo, query: &TrackQuery) -> Result<ExtractedTrack, ExtractError> {
        let stream_url = info
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ExtractError::new(ExtractFailure::Unsupported, "sin URL de audio"))?;

        Ok(ExtractedTrack {
            title: info.title,
            source: AudioLocation::Stream(stream_url),
            webpage_url: info
                .webpage_url
                .unwrap_or_else(|| query.as_str().to_string()),
            duration: info.duration.map(Duration::from_secs_f64),
            thumbnail: info.thumbnail,
        })
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    async fn extract(&self, query: &TrackQuery) -> Result<ExtractedTrack, ExtractError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ExtractError::other(e.to_string()))?;

        info!("🔍 Resolviendo con yt-dlp: {}", query.as_str());
        let stdout = run_ytdlp(&self.build_args(query), self.timeout).await?;

        let mut candidates = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<YtDlpInfo>(line) {
                Ok(info) => Some(info),
                Err(e) => {
                    debug!("Línea de yt-dlp ignorada: {}", e);
                    None
                }
            });

        let chosen = if query.is_search() {
            candidates.find(|info| {
                passes_filters(
                    &self.filters,
                    &info.title,
                    info.duration.map(Duration::from_secs_f64),
                    info.is_live.unwrap_or(false),
                )
            })
        } else {
            candidates.next()
        };

        let info = chosen.ok_or_else(|| {
            ExtractError::not_found(format!("sin resultados para: {}", query.as_str()))
        })?;

        Self::into_track(info, query)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Aplica los filtros de búsqueda a un candidato
pub fn passes_filters(
    filters: &SearchFilters,
    title: &str,
    duration: Option<Duration>,
    is_live: bool,
) -> bool {
    if is_live {
        return false;
    }

    let title = title.to_lowercase();
    if filters
        .ignore_patterns
        .iter()
        .any(|pattern| title.contains(pattern.as_str()))
    {
        return false;
    }

    match duration {
        Some(d) => d >= filters.min_duration && d <= filters.max_duration,
        None => false,
    }
}

/// Extrae el ID de video de URLs de YouTube
pub fn video_id(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    if !is_youtube_host(host) {
        return None;
    }

    // youtu.be/VIDEO_ID
    if host == "youtu.be" {
        return url
            .path_segments()?
            .next()
            .filter(|id| !id.is_empty())
            .map(str::to_string);
    }

    // youtube.com/watch?v=VIDEO_ID
    if let Some((_, id)) = url.query_pairs().find(|(key, _)| key == "v") {
        return Some(id.into_owned()).filter(|id| !id.is_empty());
    }

    // youtube.com/shorts/VIDEO_ID, youtube.com/embed/VIDEO_ID
    let mut segments = url.path_segments()?;
    match segments.next() {
        Some("shorts") | Some("embed") | Some("live") => segments
            .next()
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn is_youtube_host(host: &str) -> bool {
    matches!(
        host,
        "youtube.com" | "www.youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtu.be"
    )
}
