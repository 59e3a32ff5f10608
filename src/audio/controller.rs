//! Per-guild playback state machine.
//!
//! A [`SessionActor`] owns everything that belongs to one guild (voice
//! connection, pending queue, current stream) and runs as a single task.
//! Commands from Discord handlers, encoder events, connection events and
//! resolution results are all serialized through its `select!` loop, so no
//! state is ever shared between sessions except the resolution cache.
//!
//! Playback moves `Idle → Resolving → Streaming → Idle`; failures surface a
//! [`Notice`] and advance to the next request instead of retrying it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::{sync::Arc, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        connection::{ConnectionEvent, ConnectionState, VoiceConnection},
        queue::{SessionQueue, TrackRequest},
        resolver::{FilePin, ResolutionMethod, ResolvedAudio},
        session::{EnqueueOutcome, SessionCommand, SessionDeps, SessionHandle, SkipOutcome},
        supervisor::{
            FrameSink, StreamEvent, StreamEventKind, StreamHandle, StreamSupervisor,
            FRAME_DURATION_MS,
        },
    },
    error::{ResolutionError, SessionError, StreamError},
};

/// Mensajes para el canal de texto de la sesión
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    NowPlaying {
        title: String,
        url: String,
        duration: Option<Duration>,
        thumbnail: Option<String>,
        requester: String,
    },
    TrackFailed {
        title: String,
        reason: String,
    },
    IdleDisconnect {
        idle: Duration,
    },
    ConnectionLost {
        reason: String,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, guild: GuildId, channel: ChannelId, notice: Notice);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Resolving,
    Streaming,
}

#[derive(Debug, Clone)]
pub struct CurrentTrack {
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
    pub elapsed: Duration,
    pub thumbnail: Option<String>,
    pub requester_name: String,
    pub method: ResolutionMethod,
}

/// Vista de solo lectura para `/queue`
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub connection: ConnectionState,
    pub voice_channel: Option<ChannelId>,
    pub current: Option<CurrentTrack>,
    pub resolving: Option<TrackRequest>,
    pub pending: Vec<TrackRequest>,
    pub capacity: usize,
    pub volume: f32,
}

pub(crate) struct ResolveDone {
    ticket: u64,
    result: Result<ResolvedAudio, ResolutionError>,
}

struct NowPlaying {
    request: TrackRequest,
    audio: ResolvedAudio,
    handle: StreamHandle,
    crashes: u32,
    frames_sent: u64,
    announced: bool,
    started_at: DateTime<Utc>,
    // Protege la descarga local de la limpieza mientras suena
    _pin: Option<FilePin>,
}

enum Playback {
    Idle,
    Resolving {
        ticket: u64,
        request: TrackRequest,
        task: JoinHandle<()>,
    },
    Streaming(Box<NowPlaying>),
}

pub(crate) struct SessionChannels {
    pub commands: mpsc::Receiver<SessionCommand>,
    pub stream: mpsc::UnboundedReceiver<StreamEvent>,
    pub connection: mpsc::UnboundedReceiver<ConnectionEvent>,
    pub resolved: mpsc::UnboundedReceiver<ResolveDone>,
}

pub(crate) struct SessionActor {
    guild: GuildId,
    session_id: u64,
    text_channel: ChannelId,
    deps: Arc<SessionDeps>,
    connection: Arc<VoiceConnection>,
    queue: SessionQueue,
    supervisor: StreamSupervisor,
    playback: Playback,
    volume: f32,
    next_ticket: u64,
    resolved_tx: mpsc::UnboundedSender<ResolveDone>,
    registry: Arc<DashMap<GuildId, SessionHandle>>,
}

impl SessionActor {
    /// Crea el actor y sus canales; `run` lo pone en marcha
    pub(crate) fn new(
        guild: GuildId,
        session_id: u64,
        text_channel: ChannelId,
        deps: Arc<SessionDeps>,
        registry: Arc<DashMap<GuildId, SessionHandle>>,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::Sender<SessionCommand>, SessionChannels) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        let (connection_tx, connection_rx) = mpsc::unbounded_channel();
        let (resolved_tx, resolved_rx) = mpsc::unbounded_channel();

        let connection = VoiceConnection::new(
            guild,
            Arc::clone(&deps.transport),
            deps.settings.connection.clone(),
            shutdown,
            connection_tx,
        );

        let actor = Self {
            guild,
            session_id,
            text_channel,
            connection,
            queue: SessionQueue::new(deps.settings.max_queue_size),
            supervisor: StreamSupervisor::new(Arc::clone(&deps.launcher), stream_tx),
            playback: Playback::Idle,
            volume: deps.settings.default_volume,
            next_ticket: 0,
            resolved_tx,
            registry,
            deps,
        };

        let channels = SessionChannels {
            commands: command_rx,
            stream: stream_rx,
            connection: connection_rx,
            resolved: resolved_rx,
        };

        (actor, command_tx, channels)
    }

    pub(crate) async fn run(mut self, mut channels: SessionChannels) {
        info!("🆕 Sesión {} iniciada en guild {}", self.session_id, self.guild);

        loop {
            let keep_running = tokio::select! {
                command = channels.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => false,
                },
                Some(event) = channels.stream.recv() => {
                    self.on_stream_event(event);
                    true
                }
                Some(event) = channels.connection.recv() => self.on_connection_event(event),
                Some(done) = channels.resolved.recv() => {
                    self.on_resolved(done);
                    true
                }
            };

            if !keep_running {
                break;
            }
        }

        self.teardown().await;
        info!("👋 Sesión {} cerrada en guild {}", self.session_id, self.guild);
    }

    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Join {
                voice,
                text,
                reply,
            } => {
                self.text_channel = text;
                match self.connection.join(voice).await {
                    Ok(()) => {
                        let _ = reply.send(Ok(()));
                        self.pull_next();
                        true
                    }
                    Err(e) => {
                        // Reconectando o ya perdida: decide el evento de conexión
                        let alive = !matches!(
                            self.connection.state(),
                            ConnectionState::Disconnected { fatal: false }
                        );
                        let _ = reply.send(Err(SessionError::Connection(e)));
                        alive
                    }
                }
            }

            SessionCommand::Enqueue { request, reply } => {
                let result = self.enqueue(request);
                let _ = reply.send(result);
                true
            }

            SessionCommand::Skip { reply } => {
                let _ = reply.send(self.skip());
                true
            }

            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                true
            }

            SessionCommand::Leave { reply } => {
                self.teardown().await;
                let _ = reply.send(());
                false
            }
        }
    }

    fn enqueue(&mut self, request: TrackRequest) -> Result<EnqueueOutcome, SessionError> {
        let position = self.queue.push(request)?;
        self.connection.touch();
        debug!(
            "➕ Encolado en guild {} ({} pendientes)",
            self.guild,
            self.queue.len()
        );

        let starts_now = matches!(self.playback, Playback::Idle)
            && self.connection.state().is_connected();

        if starts_now {
            self.pull_next();
        } else if position == 0 && matches!(self.playback, Playback::Streaming(_)) {
            self.prefetch_next();
        }

        Ok(EnqueueOutcome {
            position,
            starts_now,
        })
    }

    fn skip(&mut self) -> SkipOutcome {
        match &self.playback {
            Playback::Streaming(now) => {
                let title = now.audio.title.clone();
                info!("⏭️ Saltando: {}", title);
                self.advance();
                SkipOutcome::Skipped { title }
            }
            _ => SkipOutcome::NothingPlaying,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let (state, current, resolving) = match &self.playback {
            Playback::Idle => (PlaybackState::Idle, None, None),
            Playback::Resolving { request, .. } => {
                (PlaybackState::Resolving, None, Some(request.clone()))
            }
            Playback::Streaming(now) => (
                PlaybackState::Streaming,
                Some(CurrentTrack {
                    title: now.audio.title.clone(),
                    url: now.audio.webpage_url.clone(),
                    duration: now.audio.duration,
                    elapsed: Duration::from_millis(now.frames_sent * FRAME_DURATION_MS),
                    thumbnail: now.audio.thumbnail.clone(),
                    requester_name: now.request.requester_name().to_string(),
                    method: now.audio.method,
                }),
                None,
            ),
        };

        SessionSnapshot {
            state,
            connection: self.connection.state(),
            voice_channel: self.connection.channel(),
            current,
            resolving,
            pending: self.queue.peek_all(),
            capacity: self.queue.capacity(),
            volume: self.volume,
        }
    }

    /// Saca la siguiente petición y lanza su resolución en segundo plano
    fn pull_next(&mut self) {
        if !matches!(self.playback, Playback::Idle) || !self.connection.state().is_connected() {
            return;
        }

        if self.queue.is_empty() {
            debug!("📭 Nada más en cola en guild {}", self.guild);
            return;
        }
        let Some(request) = self.queue.pop_front() else {
            return;
        };
        debug!(
            "⏳ '{}' esperó {}s en cola",
            request.raw(),
            (Utc::now() - request.enqueued_at()).num_seconds()
        );

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let resolver = Arc::clone(&self.deps.resolver);
        let results = self.resolved_tx.clone();
        let query = request.query().clone();

        let task = tokio::spawn(async move {
            let result = resolver.resolve(&query).await;
            let _ = results.send(ResolveDone { ticket, result });
        });

        self.playback = Playback::Resolving {
            ticket,
            request,
            task,
        };
    }

    fn on_resolved(&mut self, done: ResolveDone) {
        let request = match std::mem::replace(&mut self.playback, Playback::Idle) {
            Playback::Resolving {
                ticket, request, ..
            } if ticket == done.ticket => request,
            other => {
                // Resultado obsoleto
                self.playback = other;
                return;
            }
        };

        match done.result {
            Ok(audio) => self.start_stream(request, audio, 0),
            Err(e) => {
                warn!("❌ No se pudo resolver '{}': {}", request.raw(), e);
                self.notify(Notice::TrackFailed {
                    title: request.raw().to_string(),
                    reason: e.to_string(),
                });
                self.pull_next();
            }
        }
    }

    fn start_stream(&mut self, request: TrackRequest, audio: ResolvedAudio, crashes: u32) {
        self.connection.set_streaming(true);
        let pin = self.deps.resolver.pin(&audio);
        let sink: Arc<dyn FrameSink> = self.connection.clone();
        let handle = self.supervisor.start(audio.clone(), self.volume, sink);

        self.playback = Playback::Streaming(Box::new(NowPlaying {
            request,
            audio,
            handle,
            crashes,
            frames_sent: 0,
            announced: crashes > 0,
            started_at: Utc::now(),
            _pin: pin,
        }));
    }

    fn on_stream_event(&mut self, event: StreamEvent) {
        let Playback::Streaming(now) = &mut self.playback else {
            return;
        };
        if now.handle.id() != event.stream_id {
            return;
        }

        match event.kind {
            StreamEventKind::Started => {
                if !now.announced {
                    now.announced = true;
                    let notice = Notice::NowPlaying {
                        title: now.audio.title.clone(),
                        url: now.audio.webpage_url.clone(),
                        duration: now.audio.duration,
                        thumbnail: now.audio.thumbnail.clone(),
                        requester: format!("<@{}>", now.request.requester()),
                    };
                    info!("▶️ Reproduciendo: {} en guild {}", now.audio.title, self.guild);
                    self.notify(notice);
                    self.prefetch_next();
                }
            }

            StreamEventKind::FrameBatchReady { frames } => {
                now.frames_sent += frames as u64;
            }

            StreamEventKind::Ended => {
                debug!(
                    "🏁 '{}' terminó tras {}s",
                    now.audio.title,
                    (Utc::now() - now.started_at).num_seconds()
                );
                self.advance();
            }

            StreamEventKind::Failed(StreamError::ProcessCrashed { code }) if now.crashes == 0 => {
                warn!(
                    "🔁 ffmpeg falló (código {:?}), reintentando '{}'",
                    code, now.audio.title
                );
                let Playback::Streaming(now) = std::mem::replace(&mut self.playback, Playback::Idle)
                else {
                    return;
                };
                self.supervisor.stop(&now.handle);
                self.start_stream(now.request, now.audio, now.crashes + 1);
            }

            StreamEventKind::Failed(StreamError::TransportClosed) => {
                // La conexión decide: ConnectionLost cierra la sesión
                warn!("🔌 Stream detenido por transporte cerrado en guild {}", self.guild);
                if let Playback::Streaming(now) =
                    std::mem::replace(&mut self.playback, Playback::Idle)
                {
                    self.supervisor.stop(&now.handle);
                }
                self.connection.set_streaming(false);
            }

            StreamEventKind::Failed(e) => {
                let title = now.audio.title.clone();
                warn!("❌ Stream fallido '{}': {}", title, e);
                self.notify(Notice::TrackFailed {
                    title,
                    reason: e.to_string(),
                });
                self.advance();
            }
        }
    }

    /// Devuelve `false` si la sesión debe cerrarse
    fn on_connection_event(&mut self, event: ConnectionEvent) -> bool {
        match event {
            ConnectionEvent::Reconnected => {
                info!("🔄 Conexión recuperada en guild {}", self.guild);
                true
            }
            ConnectionEvent::ConnectionLost(e) => {
                self.notify(Notice::ConnectionLost {
                    reason: e.to_string(),
                });
                false
            }
            ConnectionEvent::IdleTimeout => {
                self.notify(Notice::IdleDisconnect {
                    idle: self.deps.settings.connection.idle_timeout,
                });
                false
            }
        }
    }

    /// Detiene el stream actual (si hay) y pasa a la siguiente petición
    fn advance(&mut self) {
        if let Playback::Streaming(now) = std::mem::replace(&mut self.playback, Playback::Idle) {
            self.supervisor.stop(&now.handle);
        }
        self.connection.set_streaming(false);
        self.pull_next();
    }

    fn prefetch_next(&self) {
        if !self.deps.settings.prefetch_next {
            return;
        }
        if let Some(next) = self.queue.front() {
            self.deps.resolver.prefetch(next.query().clone());
        }
    }

    fn notify(&self, notice: Notice) {
        let notifier = Arc::clone(&self.deps.notifier);
        let guild = self.guild;
        let channel = self.text_channel;
        tokio::spawn(async move {
            notifier.notify(guild, channel, notice).await;
        });
    }

    /// Mata el codificador, aborta la resolución, vacía la cola, sale del canal
    /// y por último se quita del registro. Idempotente.
    async fn teardown(&mut self) {
        match std::mem::replace(&mut self.playback, Playback::Idle) {
            Playback::Resolving { task, .. } => task.abort(),
            Playback::Streaming(now) => self.supervisor.stop(&now.handle),
            Playback::Idle => {}
        }
        self.queue.clear();
        self.connection.leave().await;

        let session_id = self.session_id;
        self.registry
            .remove_if(&self.guild, |_, handle| handle.session_id() == session_id);
    }
}
