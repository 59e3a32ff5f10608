use dashmap::{mapref::entry::Entry, DashMap};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tracing::{debug, info, warn};

use crate::{
    cache::ResolutionCache,
    error::{ExtractError, ExtractFailure, ResolutionError},
    sources::{AudioLocation, Downloader, ExtractedTrack, Extractor, TrackQuery},
};

/// Tiempo mínimo que sobrevive un archivo descargado aunque ya nadie lo
/// referencie: ffmpeg puede estar a punto de abrirlo.
const DOWNLOAD_GRACE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMethod {
    Primary,
    Fallback,
}

/// Audio listo para el codificador
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAudio {
    pub source: AudioLocation,
    pub title: String,
    pub duration: Option<Duration>,
    pub webpage_url: String,
    pub thumbnail: Option<String>,
    pub method: ResolutionMethod,
    pub cache_key: String,
}

impl ResolvedAudio {
    fn from_extracted(track: ExtractedTrack, method: ResolutionMethod, cache_key: String) -> Self {
        Self {
            source: track.source,
            title: track.title,
            duration: track.duration,
            webpage_url: track.webpage_url,
            thumbnail: track.thumbnail,
            method,
            cache_key,
        }
    }
}

/// Descargas que alguna sesión está reproduciendo, con su número de usos
type PinnedFiles = Arc<DashMap<PathBuf, usize>>;

/// Mantiene un archivo descargado fuera de la limpieza mientras viva
pub struct FilePin {
    path: PathBuf,
    pinned: PinnedFiles,
}

impl Drop for FilePin {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.pinned.entry(self.path.clone()) {
            *entry.get_mut() -= 1;
            if *entry.get() == 0 {
                entry.remove();
            }
        }
    }
}

/// Resuelve consultas a audio reproducible: caché → extractor → descargador.
///
/// Compartido entre todas las sesiones; el caché y las descargas en uso son
/// el único estado.
pub struct AudioResolver {
    cache: ResolutionCache,
    primary: Arc<dyn Extractor>,
    fallback: Arc<dyn Downloader>,
    pinned: PinnedFiles,
}

impl AudioResolver {
    pub fn new(
        cache: ResolutionCache,
        primary: Arc<dyn Extractor>,
        fallback: Arc<dyn Downloader>,
    ) -> Self {
        Self {
            cache,
            primary,
            fallback,
            pinned: Arc::new(DashMap::new()),
        }
    }

    pub async fn resolve(&self, query: &TrackQuery) -> Result<ResolvedAudio, ResolutionError> {
        let key = query.cache_key();

        if let Some(cached) = self.cache.get(&key) {
            debug!("💾 Cache hit: {}", key);
            return Ok(cached);
        }

        let resolved = match self.primary.extract(query).await {
            Ok(track) => ResolvedAudio::from_extracted(track, ResolutionMethod::Primary, key.clone()),
            Err(primary_err) => {
                warn!(
                    "⚠️ {} falló ({}), intentando descarga de respaldo",
                    self.primary.name(),
                    primary_err
                );

                match self.fallback.download(query).await {
                    Ok(track) => {
                        ResolvedAudio::from_extracted(track, ResolutionMethod::Fallback, key.clone())
                    }
                    Err(fallback_err) => {
                        warn!("❌ Descarga de respaldo falló: {}", fallback_err);
                        return Err(combine_failures(&primary_err, &fallback_err));
                    }
                }
            }
        };

        info!(
            "✅ Resuelto ({:?}): {} [{}]",
            resolved.method,
            resolved.title,
            resolved
                .duration
                .map(|d| humantime::format_duration(d).to_string())
                .unwrap_or_else(|| "?".into())
        );

        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Resuelve en segundo plano solo para calentar el caché
    pub fn prefetch(self: &Arc<Self>, query: TrackQuery) {
        if self.cache.get(&query.cache_key()).is_some() {
            return;
        }

        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            debug!("🔮 Prefetch: {}", query.as_str());
            if let Err(e) = resolver.resolve(&query).await {
                debug!("Prefetch falló para {}: {}", query.as_str(), e);
            }
        });
    }

    /// Protege la descarga local de `audio` hasta soltar el pin; `None` si
    /// el audio no es un archivo
    pub fn pin(&self, audio: &ResolvedAudio) -> Option<FilePin> {
        let path = audio.source.local_path().map(Path::to_path_buf)?;
        *self.pinned.entry(path.clone()).or_insert(0) += 1;

        Some(FilePin {
            path,
            pinned: Arc::clone(&self.pinned),
        })
    }

    /// Limpia entradas vencidas y archivos descargados huérfanos. Un archivo
    /// sobrevive si una entrada vigente lo referencia o si está sonando.
    pub async fn sweep(&self) -> (usize, usize) {
        let expired = self.cache.cleanup_old_entries();
        let mut keep = self.cache.referenced_files();
        keep.extend(self.pinned.iter().map(|entry| entry.key().clone()));
        let purged = self.fallback.purge_unreferenced(&keep, DOWNLOAD_GRACE).await;

        if purged > 0 {
            info!("🧹 {} archivos descargados eliminados", purged);
        }

        (expired, purged)
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

/// Prioridad: restricción de edad > no soportado > irresoluble
fn combine_failures(primary: &ExtractError, fallback: &ExtractError) -> ResolutionError {
    let kinds = [primary.kind, fallback.kind];

    if kinds.contains(&ExtractFailure::AgeRestricted) {
        ResolutionError::AgeRestricted
    } else if kinds.contains(&ExtractFailure::Unsupported) {
        ResolutionError::Unsupported
    } else {
        ResolutionError::Unresolvable {
            reason: fallback.message.lines().last().unwrap_or_default().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{MockDownloader, MockExtractor};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
    };

    fn track(source: AudioLocation) -> ExtractedTrack {
        ExtractedTrack {
            title: "Song".into(),
            source,
            webpage_url: "https://www.youtube.com/watch?v=abc".into(),
            duration: Some(Duration::from_secs(180)),
            thumbnail: None,
        }
    }

    fn make_resolver(primary: MockExtractor, fallback: MockDownloader) -> AudioResolver {
        AudioResolver::new(
            ResolutionCache::new(10, Duration::from_secs(60)),
            Arc::new(primary),
            Arc::new(fallback),
        )
    }

    fn failing_extractor(kind: ExtractFailure) -> MockExtractor {
        let mut primary = MockExtractor::new();
        primary
            .expect_extract()
            .returning(move |_| Err(ExtractError::new(kind, "boom")));
        primary.expect_name().return_const("mock");
        primary
    }

    #[tokio::test(start_paused = true)]
    async fn same_query_within_ttl_hits_collaborator_once() {
        let mut primary = MockExtractor::new();
        primary
            .expect_extract()
            .times(1)
            .returning(|_| Ok(track(AudioLocation::Stream("https://cdn/a".into()))));
        let resolver = make_resolver(primary, MockDownloader::new());

        let a = TrackQuery::parse("Daft  Punk").unwrap();
        let b = TrackQuery::parse("daft punk ").unwrap();
        let first = resolver.resolve(&a).await.unwrap();
        let second = resolver.resolve(&b).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.method, ResolutionMethod::Primary);
        assert_eq!(first.cache_key, "search:daft punk");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_resolved_again() {
        let mut primary = MockExtractor::new();
        primary
            .expect_extract()
            .times(2)
            .returning(|_| Ok(track(AudioLocation::Stream("https://cdn/a".into()))));
        let resolver = make_resolver(primary, MockDownloader::new());
        let query = TrackQuery::parse("song").unwrap();

        resolver.resolve(&query).await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        resolver.resolve(&query).await.unwrap();
    }

    #[tokio::test]
    async fn primary_failure_falls_back_to_download() {
        let mut fallback = MockDownloader::new();
        fallback
            .expect_download()
            .times(1)
            .returning(|_| Ok(track(AudioLocation::File(PathBuf::from("/tmp/a.m4a")))));

        let resolver = make_resolver(failing_extractor(ExtractFailure::Network), fallback);
        let resolved = resolver
            .resolve(&TrackQuery::parse("song").unwrap())
            .await
            .unwrap();

        assert_eq!(resolved.method, ResolutionMethod::Fallback);
        assert_eq!(resolved.source.local_path(), Some(PathBuf::from("/tmp/a.m4a").as_path()));
    }

    #[tokio::test]
    async fn age_restriction_wins_over_other_failures() {
        let mut fallback = MockDownloader::new();
        fallback
            .expect_download()
            .returning(|_| Err(ExtractError::new(ExtractFailure::AgeRestricted, "age")));

        let resolver = make_resolver(failing_extractor(ExtractFailure::Unsupported), fallback);
        let err = resolver
            .resolve(&TrackQuery::parse("song").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err, ResolutionError::AgeRestricted);
    }

    #[tokio::test]
    async fn unsupported_then_generic_failure() {
        let mut fallback = MockDownloader::new();
        fallback
            .expect_download()
            .returning(|_| Err(ExtractError::other("ERROR: first\nERROR: last line")));

        let resolver = make_resolver(failing_extractor(ExtractFailure::Unsupported), fallback);
        let query = TrackQuery::parse("song").unwrap();
        assert_eq!(
            resolver.resolve(&query).await.unwrap_err(),
            ResolutionError::Unsupported
        );

        let mut fallback = MockDownloader::new();
        fallback
            .expect_download()
            .returning(|_| Err(ExtractError::other("ERROR: first\nERROR: last line")));
        let resolver = make_resolver(failing_extractor(ExtractFailure::Network), fallback);
        assert_eq!(
            resolver.resolve(&query).await.unwrap_err(),
            ResolutionError::Unresolvable {
                reason: "ERROR: last line".into()
            }
        );
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let mut fallback = MockDownloader::new();
        fallback
            .expect_download()
            .times(2)
            .returning(|_| Err(ExtractError::not_found("nothing")));

        let resolver = make_resolver(failing_extractor(ExtractFailure::NotFound), fallback);
        let query = TrackQuery::parse("missing").unwrap();
        assert!(resolver.resolve(&query).await.is_err());
        assert!(resolver.resolve(&query).await.is_err());
        assert_eq!(resolver.cached_entries(), 0);
    }

    #[tokio::test]
    async fn sweep_keeps_files_of_live_entries() {
        let mut fallback = MockDownloader::new();
        fallback
            .expect_download()
            .returning(|_| Ok(track(AudioLocation::File(PathBuf::from("/tmp/live.m4a")))));
        fallback
            .expect_purge_unreferenced()
            .withf(|keep, grace| {
                keep.contains(&PathBuf::from("/tmp/live.m4a")) && *grace == DOWNLOAD_GRACE
            })
            .times(1)
            .return_const(2usize);

        let resolver = make_resolver(failing_extractor(ExtractFailure::Network), fallback);
        resolver
            .resolve(&TrackQuery::parse("song").unwrap())
            .await
            .unwrap();

        assert_eq!(resolver.sweep().await, (0, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_files_still_playing() {
        let playing = PathBuf::from("/tmp/playing.m4a");
        let kept_sets = Arc::new(Mutex::new(Vec::new()));

        let mut fallback = MockDownloader::new();
        let path = playing.clone();
        fallback
            .expect_download()
            .returning(move |_| Ok(track(AudioLocation::File(path.clone()))));
        let seen = kept_sets.clone();
        let path = playing.clone();
        fallback
            .expect_purge_unreferenced()
            .returning(move |keep: &HashSet<PathBuf>, _| {
                seen.lock().push(keep.contains(&path));
                0
            });

        let resolver = make_resolver(failing_extractor(ExtractFailure::Network), fallback);
        let audio = resolver
            .resolve(&TrackQuery::parse("long mix").unwrap())
            .await
            .unwrap();
        let pin = resolver.pin(&audio);
        let second = resolver.pin(&audio);
        assert!(pin.is_some());

        // La entrada del caché vence mientras la canción sigue sonando
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(resolver.sweep().await, (1, 0));

        drop(pin);
        resolver.sweep().await;
        drop(second);
        resolver.sweep().await;

        assert_eq!(*kept_sets.lock(), vec![true, true, false]);
    }

    #[test]
    fn streams_are_not_pinned() {
        let resolver = make_resolver(MockExtractor::new(), MockDownloader::new());
        let audio = ResolvedAudio::from_extracted(
            track(AudioLocation::Stream("https://cdn/a".into())),
            ResolutionMethod::Primary,
            "search:a".into(),
        );
        assert!(resolver.pin(&audio).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn prefetch_warms_the_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut primary = MockExtractor::new();
        primary.expect_extract().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(track(AudioLocation::Stream("https://cdn/a".into())))
        });
        let resolver = Arc::new(make_resolver(primary, MockDownloader::new()));
        let query = TrackQuery::parse("next song").unwrap();

        resolver.prefetch(query.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(resolver.cached_entries(), 1);

        resolver.resolve(&query).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn prefetch_skips_cached_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut primary = MockExtractor::new();
        primary.expect_extract().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(track(AudioLocation::Stream("https://cdn/a".into())))
        });
        let resolver = Arc::new(make_resolver(primary, MockDownloader::new()));
        let query = TrackQuery::parse("already here").unwrap();

        resolver.resolve(&query).await.unwrap();
        resolver.prefetch(TrackQuery::parse("Already  Here").unwrap());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
