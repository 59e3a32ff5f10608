use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Caché de resolución
    pub cache_ttl: Duration,
    pub cache_size: usize,
    pub cache_sweep_interval: Duration,

    // Conexión de voz
    pub idle_timeout: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub connect_timeout: Duration,

    // Resolución
    pub resolve_timeout: Duration,
    pub download_timeout: Duration,
    pub search_filters: SearchFilters,
    pub ytdlp: YtDlpOptions,
    pub prefetch_next: bool,

    // Paths
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub ffmpeg_log_path: PathBuf,
}

/// Filtros aplicados a los resultados de búsqueda (no a URLs explícitas).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchFilters {
    pub min_duration: Duration,
    pub max_duration: Duration,
    pub ignore_patterns: Vec<String>,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            min_duration: Duration::from_secs(30),
            max_duration: Duration::from_secs(600),
            ignore_patterns: vec!["shorts".into(), "podcast".into(), "live".into()],
        }
    }
}

/// Opciones que se pasan tal cual a yt-dlp.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct YtDlpOptions {
    pub cookies_file: Option<PathBuf>,
    pub socket_timeout: u32,
    pub retries: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let data_dir: PathBuf = env_or("DATA_DIR", "/app/data".to_string())?.into();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: std::env::var("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: env_or("DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,

            // Caché
            cache_ttl: env_secs("CACHE_TTL", defaults.cache_ttl)?,
            cache_size: env_or("CACHE_SIZE", defaults.cache_size)?,
            cache_sweep_interval: env_secs("CACHE_SWEEP_INTERVAL", defaults.cache_sweep_interval)?,

            // Voz
            idle_timeout: env_secs("IDLE_TIMEOUT", defaults.idle_timeout)?,
            reconnect_attempts: env_or("RECONNECT_ATTEMPTS", defaults.reconnect_attempts)?,
            reconnect_base_delay: env_millis("RECONNECT_BASE_DELAY_MS", defaults.reconnect_base_delay)?,
            reconnect_max_delay: env_millis("RECONNECT_MAX_DELAY_MS", defaults.reconnect_max_delay)?,
            connect_timeout: env_secs("CONNECT_TIMEOUT", defaults.connect_timeout)?,

            // Resolución
            resolve_timeout: env_secs("RESOLVE_TIMEOUT", defaults.resolve_timeout)?,
            download_timeout: env_secs("DOWNLOAD_TIMEOUT", defaults.download_timeout)?,
            search_filters: SearchFilters {
                min_duration: env_secs("SEARCH_MIN_DURATION", defaults.search_filters.min_duration)?,
                max_duration: env_secs("SEARCH_MAX_DURATION", defaults.search_filters.max_duration)?,
                ignore_patterns: match std::env::var("SEARCH_IGNORE_PATTERNS") {
                    Ok(val) => parse_patterns(&val),
                    Err(_) => defaults.search_filters.ignore_patterns.clone(),
                },
            },
            ytdlp: YtDlpOptions {
                cookies_file: std::env::var("YTDLP_COOKIES")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from),
                socket_timeout: env_or("YTDLP_SOCKET_TIMEOUT", defaults.ytdlp.socket_timeout)?,
                retries: env_or("YTDLP_RETRIES", defaults.ytdlp.retries)?,
            },
            prefetch_next: env_or("PREFETCH_NEXT", defaults.prefetch_next)?,

            // Paths
            cache_dir: env_or("CACHE_DIR", "/app/cache".to_string())?.into(),
            ffmpeg_log_path: match std::env::var("FFMPEG_LOG_PATH") {
                Ok(path) if !path.trim().is_empty() => path.into(),
                _ => data_dir.join("ffmpeg_stream.log"),
            },
            data_dir,
        };

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.cache_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - Queue and cache sizes must be greater than zero
    /// - Search duration bounds must be ordered
    /// - At least one reconnect attempt is required
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.0 and 1.0, got: {}",
                self.default_volume
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.cache_size == 0 {
            anyhow::bail!("Cache size must be greater than 0");
        }

        if self.cache_ttl.is_zero() {
            anyhow::bail!("Cache TTL must be greater than 0");
        }

        if self.search_filters.min_duration > self.search_filters.max_duration {
            anyhow::bail!(
                "Search min duration ({:?}) exceeds max duration ({:?})",
                self.search_filters.min_duration,
                self.search_filters.max_duration
            );
        }

        if self.reconnect_attempts == 0 {
            anyhow::bail!("Reconnect attempts must be greater than 0");
        }

        if self.reconnect_base_delay > self.reconnect_max_delay {
            anyhow::bail!("Reconnect base delay cannot exceed max delay");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, queue máx {}\n  \
            Cache: {} entradas, TTL {}\n  \
            Voz: idle {}, {} reintentos ({} → {})\n  \
            Búsqueda: {} - {}, ignorar {:?}, prefetch={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.cache_size,
            humantime::format_duration(self.cache_ttl),
            humantime::format_duration(self.idle_timeout),
            self.reconnect_attempts,
            humantime::format_duration(self.reconnect_base_delay),
            humantime::format_duration(self.reconnect_max_delay),
            humantime::format_duration(self.search_filters.min_duration),
            humantime::format_duration(self.search_filters.max_duration),
            self.search_filters.ignore_patterns,
            self.prefetch_next,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 0.5,
            max_queue_size: 100,

            cache_ttl: Duration::from_secs(3600),
            cache_size: 500,
            cache_sweep_interval: Duration::from_secs(600),

            idle_timeout: Duration::from_secs(600), // 10 minutos
            reconnect_attempts: 5,
            reconnect_base_delay: Duration::from_millis(1000),
            reconnect_max_delay: Duration::from_millis(30_000),
            connect_timeout: Duration::from_secs(30),

            resolve_timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(120),
            search_filters: SearchFilters::default(),
            ytdlp: YtDlpOptions {
                cookies_file: None,
                socket_timeout: 30,
                retries: 10,
            },
            prefetch_next: true,

            data_dir: "/app/data".into(),
            cache_dir: "/app/cache".into(),
            ffmpeg_log_path: "/app/data/ffmpeg_stream.log".into(),
        }
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {}: {}", key, val)),
        _ => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> Result<Duration> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}

fn env_millis(key: &str, default: Duration) -> Result<Duration> {
    env_or(key, default.as_millis() as u64).map(Duration::from_millis)
}

fn parse_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}
