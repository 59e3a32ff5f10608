use dashmap::DashMap;
use futures::future::join_all;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    audio::{
        connection::ConnectionSettings,
        controller::{Notifier, SessionActor, SessionSnapshot},
        queue::TrackRequest,
        resolver::AudioResolver,
        supervisor::EncoderLauncher,
        transport::VoiceTransport,
    },
    config::Config,
    error::SessionError,
};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub connection: ConnectionSettings,
    pub max_queue_size: usize,
    pub default_volume: f32,
    pub prefetch_next: bool,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            connection: ConnectionSettings::from(config),
            max_queue_size: config.max_queue_size,
            default_volume: config.default_volume,
            prefetch_next: config.prefetch_next,
        }
    }
}

/// Colaboradores compartidos por todas las sesiones
pub struct SessionDeps {
    pub resolver: Arc<AudioResolver>,
    pub launcher: Arc<dyn EncoderLauncher>,
    pub transport: Arc<dyn VoiceTransport>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: SessionSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOutcome {
    /// Posición en la cola de pendientes
    pub position: usize,
    /// La petición se empezó a resolver de inmediato
    pub starts_now: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipOutcome {
    Skipped { title: String },
    NothingPlaying,
}

/// Mensajes al carril de ejecución de una sesión
pub(crate) enum SessionCommand {
    Join {
        voice: ChannelId,
        text: ChannelId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Enqueue {
        request: TrackRequest,
        reply: oneshot::Sender<Result<EnqueueOutcome, SessionError>>,
    },
    Skip {
        reply: oneshot::Sender<SkipOutcome>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Leave {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Clone)]
pub struct SessionHandle {
    session_id: u64,
    commands: mpsc::Sender<SessionCommand>,
    // Corta handshakes y backoff sin pasar por el carril
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::NoSession)?;
        rx.await.map_err(|_| SessionError::NoSession)
    }
}

/// Registro de sesiones: un actor por guild
pub struct SessionManager {
    sessions: Arc<DashMap<GuildId, SessionHandle>>,
    deps: Arc<SessionDeps>,
    next_session: AtomicU64,
}

impl SessionManager {
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            deps: Arc::new(deps),
            next_session: AtomicU64::new(0),
        }
    }

    fn handle(&self, guild: GuildId) -> Result<SessionHandle, SessionError> {
        self.sessions
            .get(&guild)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::NoSession)
    }

    pub fn has_session(&self, guild: GuildId) -> bool {
        self.sessions.contains_key(&guild)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn resolver(&self) -> &Arc<AudioResolver> {
        &self.deps.resolver
    }

    /// Crea la sesión si no existe y conecta (o mueve) al canal de voz
    pub async fn join(
        &self,
        guild: GuildId,
        voice: ChannelId,
        text: ChannelId,
    ) -> Result<(), SessionError> {
        let handle = self
            .sessions
            .entry(guild)
            .or_insert_with(|| self.spawn_session(guild, text))
            .value()
            .clone();

        handle
            .request(|reply| SessionCommand::Join { voice, text, reply })
            .await?
    }

    pub async fn enqueue(
        &self,
        guild: GuildId,
        request: TrackRequest,
    ) -> Result<EnqueueOutcome, SessionError> {
        self.handle(guild)?
            .request(|reply| SessionCommand::Enqueue { request, reply })
            .await?
    }

    pub async fn skip(&self, guild: GuildId) -> Result<SkipOutcome, SessionError> {
        self.handle(guild)?
            .request(|reply| SessionCommand::Skip { reply })
            .await
    }

    pub async fn snapshot(&self, guild: GuildId) -> Result<SessionSnapshot, SessionError> {
        self.handle(guild)?
            .request(|reply| SessionCommand::Snapshot { reply })
            .await
    }

    /// Destruye la sesión sin condiciones
    pub async fn leave(&self, guild: GuildId) -> Result<(), SessionError> {
        let handle = self.handle(guild)?;
        handle.shutdown.cancel();
        handle
            .request(|reply| SessionCommand::Leave { reply })
            .await
    }

    /// Cierra todas las sesiones en paralelo (apagado)
    pub async fn leave_all(&self) {
        let guilds: Vec<GuildId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        if guilds.is_empty() {
            return;
        }

        info!("👋 Cerrando {} sesiones activas", guilds.len());
        join_all(guilds.into_iter().map(|guild| self.leave(guild))).await;
    }

    fn spawn_session(&self, guild: GuildId, text: ChannelId) -> SessionHandle {
        let session_id = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let shutdown = CancellationToken::new();
        let (actor, commands, channels) = SessionActor::new(
            guild,
            session_id,
            text,
            Arc::clone(&self.deps),
            Arc::clone(&self.sessions),
            shutdown.clone(),
        );

        tokio::spawn(actor.run(channels));
        info!("🎧 Nueva sesión {} para guild {}", session_id, guild);

        SessionHandle {
            session_id,
            commands,
            shutdown,
        }
    }
}
