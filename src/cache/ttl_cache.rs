use dashmap::DashMap;
use std::{hash::Hash, time::Duration};
use tokio::time::Instant;
use tracing::debug;

/// Entrada del caché con su instante de expiración
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            inserted_at: now,
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Caché concurrente con TTL y capacidad acotada.
///
/// Lecturas y escrituras concurrentes sobre la misma clave son seguras; si dos
/// tareas insertan la misma clave gana la última escritura.
#[derive(Debug)]
pub struct TtlCache<K: Clone + Eq + Hash, V> {
    data: DashMap<K, CacheEntry<V>>,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            data: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Inserta o refresca una entrada con el TTL por defecto
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.insert_with_ttl(key, value, self.ttl)
    }

    fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) -> Option<V> {
        if !self.data.contains_key(&key) && self.data.len() >= self.capacity {
            self.cleanup_expired();
            if self.data.len() >= self.capacity {
                self.evict_oldest();
            }
        }

        self.data
            .insert(key, CacheEntry::new(value, ttl))
            .map(|old| old.value)
    }

    /// Devuelve el valor solo si su TTL no ha vencido
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entry = self.data.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.data.remove_if(key, |_, e| e.is_expired(now));
            None
        } else {
            Some(entry.value.clone())
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copia de los valores vigentes
    pub fn live_values(&self) -> Vec<V> {
        let now = Instant::now();
        self.data
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .map(|entry| entry.value().value.clone())
            .collect()
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            debug!("Limpiadas {} entradas expiradas del cache", removed);
        }

        removed
    }

    fn evict_oldest(&self) {
        let oldest = self
            .data
            .iter()
            .min_by_key(|entry| entry.value().inserted_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.data.remove(&key);
            debug!("Cache lleno, entrada más antigua desalojada");
        }
    }
}
