use async_trait::async_trait;
use bytes::{Buf, Bytes};
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{Input, RawAdapter},
    CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird,
};
use std::{
    io::{self, Read, Seek, SeekFrom},
    sync::Arc,
    time::Duration,
};
use symphonia::core::io::MediaSource;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::supervisor::{CHANNELS, FRAME_BYTES, SAMPLE_RATE};

/// Frames en vuelo hacia el mezclador (~1 s)
const PIPE_FRAMES: usize = 50;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("handshake de voz falló: {0}")]
    Handshake(String),

    #[error("la conexión de voz se cayó")]
    Dropped,
}

/// Transporte de voz en tiempo real, por guild
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// El token devuelto se cancela cuando este enlace se cae o se reemplaza
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<CancellationToken, TransportError>;

    /// Entrega frames PCM; `Dropped` si la conexión se perdió
    async fn send_frames(&self, guild: GuildId, frames: &[Bytes]) -> Result<(), TransportError>;

    async fn disconnect(&self, guild: GuildId);
}

#[derive(Clone)]
struct PipeSender {
    tx: flume::Sender<Bytes>,
    dropped: CancellationToken,
}

/// Transporte sobre songbird: cada conexión reproduce un único track "vivo"
/// alimentado por un canal de frames.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    pipes: DashMap<GuildId, PipeSender>,
    connect_timeout: Duration,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, connect_timeout: Duration) -> Self {
        Self {
            manager,
            pipes: DashMap::new(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<CancellationToken, TransportError> {
        info!("🔊 Conectando a canal de voz {} en guild {}", channel, guild);

        let call = tokio::time::timeout(self.connect_timeout, self.manager.join(guild, channel))
            .await
            .map_err(|_| TransportError::Handshake("tiempo de espera agotado".into()))?
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        let (tx, rx) = flume::bounded(PIPE_FRAMES);
        let dropped = CancellationToken::new();

        {
            let mut call = call.lock().await;
            call.stop();
            call.remove_all_global_events();
            call.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DriverDropHandler {
                    guild,
                    dropped: dropped.clone(),
                },
            );

            let input = Input::from(RawAdapter::new(FramePipe::new(rx), SAMPLE_RATE, CHANNELS));
            call.play_input(input);
        }

        let pipe = PipeSender {
            tx,
            dropped: dropped.clone(),
        };
        if let Some(old) = self.pipes.insert(guild, pipe) {
            old.dropped.cancel();
        }

        info!("✅ Conectado a canal de voz en guild {}", guild);
        Ok(dropped)
    }

    async fn send_frames(&self, guild: GuildId, frames: &[Bytes]) -> Result<(), TransportError> {
        let pipe = self
            .pipes
            .get(&guild)
            .map(|p| p.clone())
            .ok_or(TransportError::Dropped)?;

        for frame in frames {
            tokio::select! {
                _ = pipe.dropped.cancelled() => return Err(TransportError::Dropped),
                sent = pipe.tx.send_async(frame.clone()) => {
                    sent.map_err(|_| TransportError::Dropped)?;
                }
            }
        }

        Ok(())
    }

    async fn disconnect(&self, guild: GuildId) {
        if let Some((_, pipe)) = self.pipes.remove(&guild) {
            pipe.dropped.cancel();
        }

        match self.manager.remove(guild).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", guild),
            Err(e) => debug!("Nada que desconectar en guild {}: {}", guild, e),
        }
    }
}

/// Marca la tubería como caída cuando el driver pierde la conexión
struct DriverDropHandler {
    guild: GuildId,
    dropped: CancellationToken,
}

#[async_trait]
impl VoiceEventHandler for DriverDropHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(data) = ctx {
            warn!(
                "🔌 Driver de voz desconectado en guild {}: {:?}",
                self.guild, data.reason
            );
            self.dropped.cancel();
        }
        None
    }
}

/// Fuente PCM f32le para el mezclador. Entrega silencio mientras no hay
/// frames y EOF cuando se cierra el emisor.
struct FramePipe {
    rx: flume::Receiver<Bytes>,
    pending: Bytes,
}

impl FramePipe {
    fn new(rx: flume::Receiver<Bytes>) -> Self {
        Self {
            rx,
            pending: Bytes::new(),
        }
    }
}

impl Read for FramePipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pending.is_empty() {
            match self.rx.try_recv() {
                Ok(frame) => self.pending = frame,
                Err(flume::TryRecvError::Empty) => {
                    // Silencio alineado a muestras estéreo f32
                    let mut n = buf.len().min(FRAME_BYTES) / 8 * 8;
                    if n == 0 {
                        n = buf.len();
                    }
                    buf[..n].fill(0);
                    return Ok(n);
                }
                Err(flume::TryRecvError::Disconnected) => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

impl Seek for FramePipe {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream en vivo no permite seek",
        ))
    }
}

impl MediaSource for FramePipe {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use parking_lot::Mutex;
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    /// Transporte en memoria con fallos programables
    #[derive(Default)]
    pub struct FakeTransport {
        connects: Mutex<Vec<ChannelId>>,
        connect_results: Mutex<VecDeque<Result<(), TransportError>>>,
        link: Mutex<Option<CancellationToken>>,
        drops_pending: AtomicUsize,
        stall_next_send: AtomicBool,
        sent: Mutex<Vec<Bytes>>,
        disconnects: AtomicUsize,
    }

    impl FakeTransport {
        /// Resultados de los próximos `connect` (luego, éxito)
        pub fn script_connects(&self, results: impl IntoIterator<Item = Result<(), TransportError>>) {
            self.connect_results.lock().extend(results);
        }

        /// Los próximos `n` envíos fallan con `Dropped`
        pub fn drop_next_sends(&self, n: usize) {
            self.drops_pending.store(n, Ordering::SeqCst);
        }

        /// El próximo envío se queda bloqueado (tubería llena) hasta que el
        /// enlace se reemplace o se caiga, y entonces falla con `Dropped`
        pub fn stall_next_send(&self) {
            self.stall_next_send.store(true, Ordering::SeqCst);
        }

        /// El driver pierde la conexión sin que nadie esté enviando
        pub fn drop_link(&self) {
            if let Some(link) = self.link.lock().take() {
                link.cancel();
            }
        }

        pub fn connects(&self) -> Vec<ChannelId> {
            self.connects.lock().clone()
        }

        pub fn sent(&self) -> Vec<Bytes> {
            self.sent.lock().clone()
        }

        pub fn disconnects(&self) -> usize {
            self.disconnects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VoiceTransport for FakeTransport {
        async fn connect(
            &self,
            _guild: GuildId,
            channel: ChannelId,
        ) -> Result<CancellationToken, TransportError> {
            self.connects.lock().push(channel);
            self.connect_results.lock().pop_front().unwrap_or(Ok(()))?;

            let link = CancellationToken::new();
            if let Some(old) = self.link.lock().replace(link.clone()) {
                old.cancel();
            }
            Ok(link)
        }

        async fn send_frames(&self, _guild: GuildId, frames: &[Bytes]) -> Result<(), TransportError> {
            if self.stall_next_send.swap(false, Ordering::SeqCst) {
                let link = self.link.lock().clone();
                if let Some(link) = link {
                    link.cancelled().await;
                }
                return Err(TransportError::Dropped);
            }

            let dropped = self
                .drops_pending
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if dropped {
                return Err(TransportError::Dropped);
            }
            self.sent.lock().extend_from_slice(frames);
            Ok(())
        }

        async fn disconnect(&self, _guild: GuildId) {
            self.drop_link();
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }
}
