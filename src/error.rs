//! Error taxonomy for the playback core.
//!
//! Adapter layers (Discord handlers, `main`, config) keep using `anyhow`; the
//! core returns these typed errors so the controller can decide between local
//! recovery and surfacing a notice.

use thiserror::Error;

/// Why a query could not be turned into playable audio.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no se pudo resolver el audio: {reason}")]
    Unresolvable { reason: String },

    #[error("el contenido tiene restricción de edad")]
    AgeRestricted,

    #[error("el contenido no es compatible")]
    Unsupported,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("la cola está llena (máximo {capacity} canciones)")]
    Full { capacity: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("falló la conexión al canal de voz: {0}")]
    HandshakeFailed(String),

    #[error("se agotaron los {attempts} intentos de reconexión")]
    ReconnectExhausted { attempts: u32 },

    #[error("la conexión de voz no está transmitiendo")]
    NotStreaming,

    #[error("no hay conexión de voz")]
    NotConnected,

    #[error("reconectando al canal de voz, intenta de nuevo en unos segundos")]
    Reconnecting,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("el proceso de audio terminó inesperadamente (código {code:?})")]
    ProcessCrashed { code: Option<i32> },

    #[error("no se pudo iniciar el proceso de audio: {0}")]
    ProcessSpawnFailed(String),

    #[error("el transporte de voz se cerró")]
    TransportClosed,
}

/// Errors surfaced to callers of the session registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no hay una sesión activa en este servidor")]
    NoSession,

    #[error("debes estar en un canal de voz")]
    NotInVoiceChannel,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Classified reason a collaborator (extractor or downloader) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractFailure {
    Network,
    AgeRestricted,
    Unsupported,
    NotFound,
    Other,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct ExtractError {
    pub kind: ExtractFailure,
    pub message: String,
}

impl ExtractError {
    pub fn new<S: Into<String>>(kind: ExtractFailure, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(ExtractFailure::NotFound, message)
    }

    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::new(ExtractFailure::Other, message)
    }
}

impl From<std::io::Error> for ExtractError {
    fn from(err: std::io::Error) -> Self {
        Self::other(err.to_string())
    }
}
