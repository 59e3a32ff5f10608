use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::{error::QueueError, sources::TrackQuery};

/// Petición de reproducción tal como la hizo el usuario. Inmutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    raw: String,
    query: TrackQuery,
    requester: UserId,
    requester_name: String,
    enqueued_at: DateTime<Utc>,
}

impl TrackRequest {
    /// Devuelve `None` si la consulta está vacía
    pub fn new(raw: &str, requester: UserId, requester_name: impl Into<String>) -> Option<Self> {
        let query = TrackQuery::parse(raw)?;
        Some(Self {
            raw: raw.trim().to_string(),
            query,
            requester,
            requester_name: requester_name.into(),
            enqueued_at: Utc::now(),
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn query(&self) -> &TrackQuery {
        &self.query
    }

    pub fn requester(&self) -> UserId {
        self.requester
    }

    pub fn requester_name(&self) -> &str {
        &self.requester_name
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }
}

/// Cola FIFO acotada de una sesión.
///
/// Solo contiene peticiones pendientes; la canción en curso la lleva el
/// controlador.
#[derive(Debug)]
pub struct SessionQueue {
    items: VecDeque<TrackRequest>,
    capacity: usize,
}

impl SessionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Agrega al final; devuelve la posición (0 = siguiente en sonar)
    pub fn push(&mut self, request: TrackRequest) -> Result<usize, QueueError> {
        if self.items.len() >= self.capacity {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }

        info!("➕ Agregado a la cola: {}", request.raw());
        self.items.push_back(request);
        Ok(self.items.len() - 1)
    }

    /// Obtiene el siguiente track (FIFO - First In, First Out)
    pub fn pop_front(&mut self) -> Option<TrackRequest> {
        let next = self.items.pop_front();
        match &next {
            Some(item) => debug!("➡️ Siguiente en cola (FIFO): {}", item.raw()),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    /// Descarta la próxima petición pendiente
    pub fn skip(&mut self) -> Option<TrackRequest> {
        let skipped = self.items.pop_front();
        if let Some(item) = &skipped {
            info!("⏭️ Descartado de la cola: {}", item.raw());
        }
        skipped
    }

    pub fn peek_all(&self) -> Vec<TrackRequest> {
        self.items.iter().cloned().collect()
    }

    pub fn front(&self) -> Option<&TrackRequest> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            info!("🗑️ Cola limpiada ({} pendientes)", self.items.len());
        }
        self.items.clear();
    }
}
