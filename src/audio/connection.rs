use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        supervisor::FrameSink,
        transport::{TransportError, VoiceTransport},
    },
    config::Config,
    error::ConnectionError,
};

/// Estado observable de la conexión de voz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected { fatal: bool },
    Connecting,
    Idle,
    Streaming,
    Reconnecting { attempt: u32 },
    Disconnecting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Idle | Self::Streaming)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Reconnected,
    ConnectionLost(ConnectionError),
    IdleTimeout,
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub idle_timeout: Duration,
    pub reconnect_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl From<&Config> for ConnectionSettings {
    fn from(config: &Config) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            reconnect_attempts: config.reconnect_attempts,
            base_delay: config.reconnect_base_delay,
            max_delay: config.reconnect_max_delay,
        }
    }
}

/// `base * 2^(n-1)` con tope
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Disconnected { fatal: bool },
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Disconnecting,
}

struct Inner {
    phase: Phase,
    streaming: bool,
    channel: Option<ChannelId>,
    idle: Option<CancellationToken>,
    idle_generation: u64,
    // Sube con cada handshake exitoso
    epoch: u64,
}

/// Conexión de voz de una sesión.
///
/// El temporizador de inactividad corre si y solo si la conexión está
/// conectada y no hay stream activo.
pub struct VoiceConnection {
    guild: GuildId,
    transport: Arc<dyn VoiceTransport>,
    settings: ConnectionSettings,
    inner: Mutex<Inner>,
    // Serializa handshakes (join, move, reconnect)
    handshake: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    me: Weak<VoiceConnection>,
}

impl VoiceConnection {
    pub fn new(
        guild: GuildId,
        transport: Arc<dyn VoiceTransport>,
        settings: ConnectionSettings,
        shutdown: CancellationToken,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            guild,
            transport,
            settings,
            inner: Mutex::new(Inner {
                phase: Phase::Disconnected { fatal: false },
                streaming: false,
                channel: None,
                idle: None,
                idle_generation: 0,
                epoch: 0,
            }),
            handshake: tokio::sync::Mutex::new(()),
            shutdown,
            events,
            me: me.clone(),
        })
    }

    pub fn state(&self) -> ConnectionState {
        let inner = self.inner.lock();
        match inner.phase {
            Phase::Disconnected { fatal } => ConnectionState::Disconnected { fatal },
            Phase::Connecting => ConnectionState::Connecting,
            Phase::Connected if inner.streaming => ConnectionState::Streaming,
            Phase::Connected => ConnectionState::Idle,
            Phase::Reconnecting { attempt } => ConnectionState::Reconnecting { attempt },
            Phase::Disconnecting => ConnectionState::Disconnecting,
        }
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.inner.lock().channel
    }

    /// Conecta al canal. Mismo canal y ya conectado: no-op; otro canal: mueve.
    ///
    /// Nunca espera a una reconexión en curso: falla con
    /// [`ConnectionError::Reconnecting`].
    pub async fn join(&self, channel: ChannelId) -> Result<(), ConnectionError> {
        // Los joins llegan en serie desde la sesión; solo `reconnect` puede
        // tener el handshake tomado
        let Ok(_guard) = self.handshake.try_lock() else {
            return Err(ConnectionError::Reconnecting);
        };
        if self.shutdown.is_cancelled() {
            return Err(ConnectionError::NotConnected);
        }

        {
            let mut inner = self.inner.lock();
            match inner.phase {
                Phase::Disconnected { fatal: true } => return Err(ConnectionError::NotConnected),
                Phase::Connected if inner.channel == Some(channel) => {
                    debug!("Ya conectado a {} en guild {}", channel, self.guild);
                    return Ok(());
                }
                _ => {}
            }
            inner.phase = Phase::Connecting;
            self.sync_idle_timer(&mut inner);
        }

        match self.connect_link(channel).await {
            Ok(link) => {
                let epoch = {
                    let mut inner = self.inner.lock();
                    inner.phase = Phase::Connected;
                    inner.channel = Some(channel);
                    inner.epoch += 1;
                    self.sync_idle_timer(&mut inner);
                    inner.epoch
                };
                self.watch_link(link, epoch);
                Ok(())
            }
            Err(e) => {
                warn!("❌ No se pudo conectar a {} en guild {}: {}", channel, self.guild, e);
                let mut inner = self.inner.lock();
                inner.phase = Phase::Disconnected { fatal: false };
                self.sync_idle_timer(&mut inner);
                Err(e)
            }
        }
    }

    /// Marca si hay un stream activo (arma o cancela el temporizador)
    pub fn set_streaming(&self, streaming: bool) {
        let mut inner = self.inner.lock();
        inner.streaming = streaming;
        self.sync_idle_timer(&mut inner);
    }

    /// Reinicia la cuenta de inactividad si no hay stream
    pub fn touch(&self) {
        let mut inner = self.inner.lock();
        if let Some(token) = inner.idle.take() {
            token.cancel();
        }
        self.sync_idle_timer(&mut inner);
    }

    /// Sale del canal desde cualquier estado. Idempotente.
    pub async fn leave(&self) {
        self.shutdown.cancel();

        let needs_disconnect = {
            let mut inner = self.inner.lock();
            let needs = !matches!(
                inner.phase,
                Phase::Disconnected { .. } | Phase::Disconnecting
            );
            if needs {
                inner.phase = Phase::Disconnecting;
            }
            inner.streaming = false;
            self.sync_idle_timer(&mut inner);
            needs
        };

        if needs_disconnect {
            self.transport.disconnect(self.guild).await;
            let mut inner = self.inner.lock();
            inner.phase = Phase::Disconnected { fatal: false };
        }
    }

    /// Reconecta con backoff el enlace de `seen_epoch`
    async fn reconnect(&self, seen_epoch: u64) -> Result<(), ConnectionError> {
        let _guard = self.handshake.lock().await;
        if self.shutdown.is_cancelled() {
            return Err(ConnectionError::NotConnected);
        }

        let channel = {
            let mut inner = self.inner.lock();
            if matches!(
                inner.phase,
                Phase::Disconnected { .. } | Phase::Disconnecting
            ) {
                return Err(ConnectionError::NotConnected);
            }
            if inner.epoch != seen_epoch {
                // Un move u otra reconexión ya reemplazó el enlace caído
                debug!("Enlace ya reemplazado en guild {}", self.guild);
                return Ok(());
            }
            let Some(channel) = inner.channel else {
                return Err(ConnectionError::NotConnected);
            };
            inner.phase = Phase::Reconnecting { attempt: 0 };
            self.sync_idle_timer(&mut inner);
            channel
        };

        let attempts = self.settings.reconnect_attempts;
        for attempt in 1..=attempts {
            self.inner.lock().phase = Phase::Reconnecting { attempt };
            let delay = backoff_delay(self.settings.base_delay, self.settings.max_delay, attempt);
            warn!(
                "🔄 Reconectando en guild {} (intento {}/{}, espera {:?})",
                self.guild, attempt, attempts, delay
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => return Err(ConnectionError::NotConnected),
                _ = tokio::time::sleep(delay) => {}
            }

            match self.connect_link(channel).await {
                Ok(link) => {
                    let epoch = {
                        let mut inner = self.inner.lock();
                        inner.phase = Phase::Connected;
                        inner.epoch += 1;
                        self.sync_idle_timer(&mut inner);
                        inner.epoch
                    };
                    self.watch_link(link, epoch);
                    info!("✅ Reconectado en guild {} tras {} intento(s)", self.guild, attempt);
                    let _ = self.events.send(ConnectionEvent::Reconnected);
                    return Ok(());
                }
                Err(ConnectionError::NotConnected) => return Err(ConnectionError::NotConnected),
                Err(e) => warn!("Intento {} falló: {}", attempt, e),
            }
        }

        let err = ConnectionError::ReconnectExhausted { attempts };
        {
            let mut inner = self.inner.lock();
            inner.phase = Phase::Disconnected { fatal: true };
            self.sync_idle_timer(&mut inner);
        }
        self.transport.disconnect(self.guild).await;
        warn!("💀 Conexión perdida en guild {}: {}", self.guild, err);
        let _ = self.events.send(ConnectionEvent::ConnectionLost(err.clone()));
        Err(err)
    }

    /// Handshake con el transporte; `leave()` lo interrumpe
    async fn connect_link(&self, channel: ChannelId) -> Result<CancellationToken, ConnectionError> {
        let link = tokio::select! {
            _ = self.shutdown.cancelled() => return Err(ConnectionError::NotConnected),
            result = self.transport.connect(self.guild, channel) => {
                result.map_err(|e| ConnectionError::HandshakeFailed(e.to_string()))?
            }
        };

        if self.shutdown.is_cancelled() {
            self.transport.disconnect(self.guild).await;
            return Err(ConnectionError::NotConnected);
        }
        Ok(link)
    }

    /// Vigila el enlace de `epoch` hasta que se caiga o la conexión se cierre
    fn watch_link(&self, link: CancellationToken, epoch: u64) {
        let me = self.me.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = link.cancelled() => {
                    if let Some(conn) = me.upgrade() {
                        conn.link_dropped(epoch).await;
                    }
                }
            }
        });
    }

    async fn link_dropped(&self, epoch: u64) {
        {
            let inner = self.inner.lock();
            // Con stream activo es el envío en curso quien reconecta
            if inner.epoch != epoch || inner.phase != Phase::Connected || inner.streaming {
                return;
            }
        }

        warn!("🔌 Enlace de voz caído en guild {} sin stream activo", self.guild);
        let _ = self.reconnect(epoch).await;
    }

    fn sync_idle_timer(&self, inner: &mut Inner) {
        let should_run = inner.phase == Phase::Connected && !inner.streaming;

        if !should_run {
            if let Some(token) = inner.idle.take() {
                token.cancel();
            }
            return;
        }
        if inner.idle.is_some() {
            return;
        }

        inner.idle_generation += 1;
        let generation = inner.idle_generation;
        let token = CancellationToken::new();
        inner.idle = Some(token.clone());

        let me = self.me.clone();
        let timeout = self.settings.idle_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(conn) = me.upgrade() {
                        conn.idle_expired(generation).await;
                    }
                }
            }
        });
    }

    async fn idle_expired(&self, generation: u64) {
        {
            let mut inner = self.inner.lock();
            // Revalidar: el temporizador pudo quedar obsoleto
            if inner.idle_generation != generation
                || inner.phase != Phase::Connected
                || inner.streaming
            {
                return;
            }
            inner.idle = None;
            inner.phase = Phase::Disconnecting;
        }

        info!("💤 Inactividad en guild {}, desconectando", self.guild);
        self.transport.disconnect(self.guild).await;
        self.inner.lock().phase = Phase::Disconnected { fatal: false };
        let _ = self.events.send(ConnectionEvent::IdleTimeout);
    }
}

#[async_trait]
impl FrameSink for VoiceConnection {
    /// Válido solo en Streaming; una caída reconecta y reenvía el mismo lote.
    /// Si el enlace caído ya fue reemplazado (un move), reenvía sin reconectar.
    async fn send_frames(&self, frames: &[Bytes]) -> Result<(), ConnectionError> {
        loop {
            let (phase, streaming, epoch) = {
                let inner = self.inner.lock();
                (inner.phase, inner.streaming, inner.epoch)
            };

            match phase {
                Phase::Connected if streaming => {}
                Phase::Connecting | Phase::Reconnecting { .. } if streaming => {
                    // Esperar a que termine el handshake en curso
                    drop(self.handshake.lock().await);
                    continue;
                }
                _ => return Err(ConnectionError::NotStreaming),
            }

            match self.transport.send_frames(self.guild, frames).await {
                Ok(()) => return Ok(()),
                Err(TransportError::Dropped) | Err(TransportError::Handshake(_)) => {
                    warn!("🔌 Transporte caído en guild {} durante el envío", self.guild);
                    self.reconnect(epoch).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::transport::fakes::FakeTransport;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    const CHANNEL_ID: u64 = 10;
    const IDLE: Duration = Duration::from_secs(600);

    fn channel() -> ChannelId {
        ChannelId::new(CHANNEL_ID)
    }

    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(5),
            "elapsed {:?}, expected {:?}",
            elapsed,
            expected
        );
    }

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            idle_timeout: IDLE,
            reconnect_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    fn setup() -> (
        Arc<VoiceConnection>,
        Arc<FakeTransport>,
        mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        let transport = Arc::new(FakeTransport::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = VoiceConnection::new(
            GuildId::new(1),
            transport.clone(),
            settings(),
            CancellationToken::new(),
            tx,
        );
        (conn, transport, rx)
    }

    fn batch() -> Vec<Bytes> {
        vec![Bytes::from_static(&[1; 8]), Bytes::from_static(&[2; 8])]
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let delays: Vec<u64> = (1..=7)
            .map(|n| backoff_delay(Duration::from_secs(1), Duration::from_secs(30), n).as_secs())
            .collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_disconnects_exactly_once() {
        let (conn, transport, mut rx) = setup();
        conn.join(channel()).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Idle);

        let early = tokio::time::timeout(IDLE - Duration::from_secs(1), rx.recv()).await;
        assert!(early.is_err());

        assert_eq!(rx.recv().await, Some(ConnectionEvent::IdleTimeout));
        assert_eq!(conn.state(), ConnectionState::Disconnected { fatal: false });
        assert_eq!(transport.disconnects(), 1);

        let later = tokio::time::timeout(IDLE * 2, rx.recv()).await;
        assert!(later.is_err());
        conn.leave().await;
        assert_eq!(transport.disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_cancels_idle_timer() {
        let (conn, _transport, mut rx) = setup();
        conn.join(channel()).await.unwrap();
        conn.set_streaming(true);
        assert_eq!(conn.state(), ConnectionState::Streaming);

        assert!(tokio::time::timeout(IDLE * 3, rx.recv()).await.is_err());

        conn.set_streaming(false);
        let start = Instant::now();
        assert_eq!(rx.recv().await, Some(ConnectionEvent::IdleTimeout));
        assert_elapsed(start, IDLE);
    }

    #[tokio::test(start_paused = true)]
    async fn touch_restarts_the_countdown() {
        let (conn, _transport, mut rx) = setup();
        conn.join(channel()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(540)).await;
        conn.touch();
        let start = Instant::now();

        assert_eq!(rx.recv().await, Some(ConnectionEvent::IdleTimeout));
        assert_elapsed(start, IDLE);
    }

    #[tokio::test(start_paused = true)]
    async fn join_same_channel_is_noop_and_other_channel_moves() {
        let (conn, transport, _rx) = setup();
        conn.join(channel()).await.unwrap();
        conn.join(channel()).await.unwrap();
        assert_eq!(transport.connects(), vec![channel()]);

        let other = ChannelId::new(11);
        conn.join(other).await.unwrap();
        assert_eq!(transport.connects(), vec![channel(), other]);
        assert_eq!(conn.channel(), Some(other));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_handshake_leaves_connection_disconnected() {
        let (conn, transport, _rx) = setup();
        transport.script_connects([Err(TransportError::Handshake("nope".into()))]);

        let err = conn.join(channel()).await.unwrap_err();
        assert!(matches!(err, ConnectionError::HandshakeFailed(_)));
        assert_eq!(conn.state(), ConnectionState::Disconnected { fatal: false });
    }

    #[tokio::test(start_paused = true)]
    async fn send_outside_streaming_is_rejected() {
        let (conn, transport, _rx) = setup();
        conn.join(channel()).await.unwrap();
        assert_eq!(
            conn.send_frames(&batch()).await,
            Err(ConnectionError::NotStreaming)
        );
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drop_mid_send_reconnects_and_resends_batch() {
        let (conn, transport, mut rx) = setup();
        conn.join(channel()).await.unwrap();
        conn.set_streaming(true);

        transport.drop_next_sends(1);
        transport.script_connects([Err(TransportError::Handshake("still down".into()))]);

        let start = Instant::now();
        conn.send_frames(&batch()).await.unwrap();

        // Dos intentos: 1 s + 2 s de espera
        assert_elapsed(start, Duration::from_secs(3));
        assert_eq!(transport.sent(), batch());
        assert_eq!(transport.connects().len(), 3);
        assert_eq!(rx.recv().await, Some(ConnectionEvent::Reconnected));
        assert_eq!(conn.state(), ConnectionState::Streaming);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reconnect_is_fatal() {
        let (conn, transport, mut rx) = setup();
        conn.join(channel()).await.unwrap();
        conn.set_streaming(true);

        transport.drop_next_sends(1);
        transport.script_connects(
            (0..5).map(|_| Err(TransportError::Handshake("down".into()))),
        );

        let start = Instant::now();
        let err = conn.send_frames(&batch()).await.unwrap_err();

        assert_eq!(err, ConnectionError::ReconnectExhausted { attempts: 5 });
        assert_elapsed(start, Duration::from_secs(1 + 2 + 4 + 8 + 16));
        assert_eq!(conn.state(), ConnectionState::Disconnected { fatal: true });
        assert_eq!(
            rx.recv().await,
            Some(ConnectionEvent::ConnectionLost(
                ConnectionError::ReconnectExhausted { attempts: 5 }
            ))
        );
        assert!(transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn leave_cancels_pending_backoff() {
        let (conn, transport, _rx) = setup();
        conn.join(channel()).await.unwrap();
        conn.set_streaming(true);
        transport.drop_next_sends(1);

        let sender = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.send_frames(&batch()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(conn.state(), ConnectionState::Reconnecting { attempt: 1 });

        conn.leave().await;
        conn.leave().await;

        assert_eq!(sender.await.unwrap(), Err(ConnectionError::NotConnected));
        assert_eq!(transport.disconnects(), 1);
        assert_eq!(transport.connects().len(), 1);
        assert_eq!(conn.state(), ConnectionState::Disconnected { fatal: false });
    }

    #[tokio::test(start_paused = true)]
    async fn join_during_reconnect_is_rejected_without_waiting() {
        let (conn, transport, _rx) = setup();
        conn.join(channel()).await.unwrap();
        conn.set_streaming(true);
        transport.drop_next_sends(1);

        let sender = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.send_frames(&batch()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(conn.state(), ConnectionState::Reconnecting { attempt: 1 });

        let start = Instant::now();
        assert_eq!(
            conn.join(ChannelId::new(11)).await,
            Err(ConnectionError::Reconnecting)
        );
        assert_eq!(start.elapsed(), Duration::ZERO);

        assert_eq!(sender.await.unwrap(), Ok(()));
        assert_eq!(transport.connects(), vec![channel(), channel()]);
    }

    #[tokio::test(start_paused = true)]
    async fn move_while_streaming_resends_without_reconnecting() {
        let (conn, transport, mut rx) = setup();
        conn.join(channel()).await.unwrap();
        conn.set_streaming(true);
        transport.stall_next_send();

        let sender = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.send_frames(&batch()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        let start = Instant::now();
        let other = ChannelId::new(11);
        conn.join(other).await.unwrap();

        assert_eq!(sender.await.unwrap(), Ok(()));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.connects(), vec![channel(), other]);
        assert_eq!(transport.sent(), batch());
        assert!(rx.try_recv().is_err());
        assert_eq!(conn.state(), ConnectionState::Streaming);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_link_drop_is_reported_and_reconnected() {
        let (conn, transport, mut rx) = setup();
        conn.join(channel()).await.unwrap();

        transport.drop_link();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(conn.state(), ConnectionState::Reconnecting { attempt: 1 });

        assert_eq!(rx.recv().await, Some(ConnectionEvent::Reconnected));
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert_eq!(transport.connects(), vec![channel(), channel()]);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_interrupts_hanging_handshake() {
        let transport = Arc::new(HangingTransport);
        let (tx, _rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let conn = VoiceConnection::new(
            GuildId::new(1),
            transport,
            settings(),
            shutdown.clone(),
            tx,
        );

        let joiner = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.join(channel()).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(conn.state(), ConnectionState::Connecting);

        shutdown.cancel();
        assert_eq!(joiner.await.unwrap(), Err(ConnectionError::NotConnected));
        assert_eq!(conn.state(), ConnectionState::Disconnected { fatal: false });
    }

    /// Transporte cuyo handshake nunca termina
    struct HangingTransport;

    #[async_trait]
    impl VoiceTransport for HangingTransport {
        async fn connect(
            &self,
            _guild: GuildId,
            _channel: ChannelId,
        ) -> Result<CancellationToken, TransportError> {
            futures::future::pending().await
        }

        async fn send_frames(&self, _guild: GuildId, _frames: &[Bytes]) -> Result<(), TransportError> {
            Err(TransportError::Dropped)
        }

        async fn disconnect(&self, _guild: GuildId) {}
    }
}
