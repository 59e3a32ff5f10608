//! Supervisión del proceso codificador (ffmpeg).
//!
//! Cada [`StreamHandle`] corresponde a exactamente un proceso. El proceso se
//! lanza dentro de la tarea de bombeo, que lee frames PCM de su stdout, los
//! entrega en lotes al [`FrameSink`] y reporta el ciclo de vida como
//! [`StreamEvent`]s etiquetados con el id del stream.

use async_trait::async_trait;
use bytes::Bytes;
use std::{io, path::PathBuf, process::Stdio, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStderr, ChildStdout, Command},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::resolver::ResolvedAudio,
    error::{ConnectionError, StreamError},
    sources::AudioLocation,
};

pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u32 = 2;
/// 20 ms de PCM f32le estéreo
pub const FRAME_BYTES: usize = (SAMPLE_RATE as usize / 50) * CHANNELS as usize * 4;
pub const FRAME_DURATION_MS: u64 = 20;

/// Frames por lote entregado al transporte (500 ms)
const BATCH_FRAMES: usize = 25;

/// Proceso codificador en ejecución
#[async_trait]
pub trait EncoderProcess: Send {
    /// Siguiente frame completo; `None` cuando se cierra la salida
    async fn next_frame(&mut self) -> io::Result<Option<Bytes>>;

    /// Código de salida; `None` si terminó por señal
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    async fn kill(&mut self);
}

pub trait EncoderLauncher: Send + Sync {
    fn launch(
        &self,
        audio: &ResolvedAudio,
        volume: f32,
    ) -> Result<Box<dyn EncoderProcess>, StreamError>;
}

/// Destino de los frames producidos
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_frames(&self, frames: &[Bytes]) -> Result<(), ConnectionError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEventKind {
    Started,
    FrameBatchReady { frames: usize },
    Ended,
    Failed(StreamError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub stream_id: u64,
    pub kind: StreamEventKind,
}

/// Stream en curso. Soltarlo no detiene nada: hay que llamar a `stop`.
#[derive(Debug)]
pub struct StreamHandle {
    id: u64,
    token: CancellationToken,
}

impl StreamHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

pub struct StreamSupervisor {
    launcher: Arc<dyn EncoderLauncher>,
    events: mpsc::UnboundedSender<StreamEvent>,
    next_id: u64,
}

impl StreamSupervisor {
    pub fn new(
        launcher: Arc<dyn EncoderLauncher>,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        Self {
            launcher,
            events,
            next_id: 0,
        }
    }

    pub fn start(
        &mut self,
        audio: ResolvedAudio,
        volume: f32,
        sink: Arc<dyn FrameSink>,
    ) -> StreamHandle {
        self.next_id += 1;
        let handle = StreamHandle {
            id: self.next_id,
            token: CancellationToken::new(),
        };

        let pump = Pump {
            stream_id: handle.id,
            token: handle.token.clone(),
            events: self.events.clone(),
        };
        let launcher = Arc::clone(&self.launcher);
        tokio::spawn(async move {
            pump.run(launcher, audio, volume, sink).await;
        });

        handle
    }

    /// Detiene y libera el proceso. Idempotente; después no se emite nada.
    pub fn stop(&self, handle: &StreamHandle) {
        if !handle.token.is_cancelled() {
            debug!("⏹️ Deteniendo stream {}", handle.id);
            handle.token.cancel();
        }
    }
}

struct Pump {
    stream_id: u64,
    token: CancellationToken,
    events: mpsc::UnboundedSender<StreamEvent>,
}

impl Pump {
    fn emit(&self, kind: StreamEventKind) {
        if self.token.is_cancelled() {
            return;
        }
        let _ = self.events.send(StreamEvent {
            stream_id: self.stream_id,
            kind,
        });
    }

    async fn run(
        self,
        launcher: Arc<dyn EncoderLauncher>,
        audio: ResolvedAudio,
        volume: f32,
        sink: Arc<dyn FrameSink>,
    ) {
        let mut process = match launcher.launch(&audio, volume) {
            Ok(process) => process,
            Err(e) => {
                error!("❌ No se pudo iniciar ffmpeg para {}: {}", audio.title, e);
                self.emit(StreamEventKind::Failed(e));
                return;
            }
        };

        if self.token.is_cancelled() {
            process.kill().await;
            return;
        }
        self.emit(StreamEventKind::Started);

        let mut batch = Vec::with_capacity(BATCH_FRAMES);
        loop {
            let frame = tokio::select! {
                _ = self.token.cancelled() => None,
                frame = process.next_frame() => Some(frame),
            };
            let Some(frame) = frame else {
                process.kill().await;
                return;
            };

            match frame {
                Ok(Some(frame)) => {
                    batch.push(frame);
                    if batch.len() >= BATCH_FRAMES && !self.flush(&mut batch, &sink, &mut process).await {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("⚠️ Error leyendo salida de ffmpeg: {}", e);
                    break;
                }
            }
        }

        if !batch.is_empty() && !self.flush(&mut batch, &sink, &mut process).await {
            return;
        }

        let status = tokio::select! {
            _ = self.token.cancelled() => None,
            status = process.wait() => Some(status),
        };
        let Some(status) = status else {
            process.kill().await;
            return;
        };

        match status {
            Ok(Some(0)) => {
                info!("🏁 Stream terminado: {}", audio.title);
                self.emit(StreamEventKind::Ended);
            }
            Ok(code) => {
                warn!("💥 ffmpeg terminó con código {:?}: {}", code, audio.title);
                self.emit(StreamEventKind::Failed(StreamError::ProcessCrashed { code }));
            }
            Err(e) => {
                warn!("💥 No se pudo obtener el estado de ffmpeg: {}", e);
                self.emit(StreamEventKind::Failed(StreamError::ProcessCrashed { code: None }));
            }
        }
    }

    /// Entrega el lote; `false` si el stream debe terminar aquí
    async fn flush(
        &self,
        batch: &mut Vec<Bytes>,
        sink: &Arc<dyn FrameSink>,
        process: &mut Box<dyn EncoderProcess>,
    ) -> bool {
        let frames = std::mem::take(batch);
        let sent = tokio::select! {
            _ = self.token.cancelled() => None,
            result = sink.send_frames(&frames) => Some(result),
        };

        match sent {
            None => {
                process.kill().await;
                false
            }
            Some(Err(e)) => {
                warn!("🔌 Transporte no disponible, deteniendo ffmpeg: {}", e);
                process.kill().await;
                self.emit(StreamEventKind::Failed(StreamError::TransportClosed));
                false
            }
            Some(Ok(())) => {
                self.emit(StreamEventKind::FrameBatchReady {
                    frames: frames.len(),
                });
                true
            }
        }
    }
}

/// Lanza ffmpeg produciendo PCM f32le 48 kHz estéreo por stdout
pub struct FfmpegLauncher {
    log_path: PathBuf,
}

impl FfmpegLauncher {
    pub fn new(log_path: PathBuf) -> Self {
        Self { log_path }
    }

    fn build_args(audio: &ResolvedAudio, volume: f32) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into()];

        match &audio.source {
            AudioLocation::Stream(url) => {
                args.extend(
                    [
                        "-reconnect",
                        "1",
                        "-reconnect_streamed",
                        "1",
                        "-reconnect_delay_max",
                        "5",
                        "-i",
                        url.as_str(),
                    ]
                    .iter()
                    .map(|s| s.to_string()),
                );
            }
            AudioLocation::File(path) => {
                args.extend(["-nostdin".to_string(), "-i".to_string()]);
                args.push(path.display().to_string());
            }
        }

        let filter = format!("volume={:.2}", volume.clamp(0.0, 1.0));
        args.extend(
            [
                "-vn",
                "-af",
                filter.as_str(),
                "-f",
                "f32le",
                "-ar",
                "48000",
                "-ac",
                "2",
                "-loglevel",
                "error",
                "pipe:1",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }
}

impl EncoderLauncher for FfmpegLauncher {
    fn launch(
        &self,
        audio: &ResolvedAudio,
        volume: f32,
    ) -> Result<Box<dyn EncoderProcess>, StreamError> {
        let mut child = Command::new("ffmpeg")
            .args(Self::build_args(audio, volume))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StreamError::ProcessSpawnFailed(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StreamError::ProcessSpawnFailed("stdout no disponible".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(
                stderr,
                self.log_path.clone(),
                audio.title.clone(),
            ));
        }

        info!("🎬 ffmpeg iniciado (pid {:?}): {}", child.id(), audio.title);
        Ok(Box::new(FfmpegProcess { child, stdout }))
    }
}

struct FfmpegProcess {
    child: Child,
    stdout: ChildStdout,
}

#[async_trait]
impl EncoderProcess for FfmpegProcess {
    async fn next_frame(&mut self) -> io::Result<Option<Bytes>> {
        let mut buf = vec![0u8; FRAME_BYTES];
        let mut filled = 0;

        while filled < FRAME_BYTES {
            let n = self.stdout.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            return Ok(None);
        }
        // El último frame incompleto queda rellenado con silencio
        Ok(Some(Bytes::from(buf)))
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        self.child.wait().await.map(|status| status.code())
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("ffmpeg ya había terminado: {}", e);
        }
    }
}

/// Copia stderr de ffmpeg al log de diagnóstico (append) y a debug
async fn forward_stderr(stderr: ChildStderr, log_path: PathBuf, title: String) {
    let mut log = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .await
    {
        Ok(file) => Some(file),
        Err(e) => {
            warn!("No se pudo abrir {}: {}", log_path.display(), e);
            None
        }
    };

    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("ffmpeg: {}", line);
        if let Some(file) = log.as_mut() {
            let entry = format!(
                "[{}] [{}] {}\n",
                chrono::Utc::now().to_rfc3339(),
                title,
                line
            );
            if file.write_all(entry.as_bytes()).await.is_err() {
                log = None;
            }
        }
    }
}
