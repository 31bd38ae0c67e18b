use dashmap::DashMap;
use parking_lot::RwLock;
use serenity::model::id::GuildId;
use std::sync::Arc;

use super::queue::GuildQueue;

/// Registro explícito de colas por guild.
///
/// Las colas se crean en el primer acceso y viven hasta que el barrido de
/// inactividad (o un comando) las elimina. No hay estado global escondido:
/// el orquestador es el único dueño del registro.
pub struct QueueRegistry {
    queues: DashMap<GuildId, Arc<RwLock<GuildQueue>>>,
    max_queue_size: usize,
    default_volume: f32,
}

impl QueueRegistry {
    pub fn new(max_queue_size: usize, default_volume: f32) -> Self {
        Self {
            queues: DashMap::new(),
            max_queue_size,
            default_volume,
        }
    }

    /// Obtiene la cola de la guild, creándola si es el primer acceso.
    pub fn get(&self, guild_id: GuildId) -> Arc<RwLock<GuildQueue>> {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(RwLock::new(GuildQueue::new(
                    self.max_queue_size,
                    self.default_volume,
                )))
            })
            .clone()
    }

    /// Obtiene la cola solo si ya existe, sin crearla.
    pub fn peek(&self, guild_id: GuildId) -> Option<Arc<RwLock<GuildQueue>>> {
        self.queues.get(&guild_id).map(|q| q.clone())
    }

    /// Elimina el estado de la guild del registro.
    pub fn remove(&self, guild_id: GuildId) {
        self.queues.remove(&guild_id);
    }

    /// Instantánea de las guilds con estado, para el barrido de inactividad.
    pub fn guild_ids(&self) -> Vec<GuildId> {
        self.queues.iter().map(|entry| *entry.key()).collect()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::Track;
    use serenity::model::id::UserId;

    #[test]
    fn test_get_creates_on_first_access() {
        let registry = QueueRegistry::new(100, 0.5);
        assert!(registry.is_empty());

        let queue = registry.get(GuildId::new(1));
        assert_eq!(registry.len(), 1);
        assert_eq!(queue.read().pending_len(), 0);
    }

    #[test]
    fn test_get_returns_same_instance() {
        let registry = QueueRegistry::new(100, 0.5);
        let first = registry.get(GuildId::new(1));
        first
            .write()
            .add(Track::from_request("una", UserId::new(1)))
            .unwrap();

        let second = registry.get(GuildId::new(1));
        assert_eq!(second.read().pending_len(), 1);
    }

    #[test]
    fn test_guilds_are_isolated() {
        let registry = QueueRegistry::new(100, 0.5);
        registry
            .get(GuildId::new(1))
            .write()
            .add(Track::from_request("una", UserId::new(1)))
            .unwrap();

        assert_eq!(registry.get(GuildId::new(2)).read().pending_len(), 0);
    }

    #[test]
    fn test_peek_does_not_create() {
        let registry = QueueRegistry::new(100, 0.5);
        assert!(registry.peek(GuildId::new(1)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_drops_state() {
        let registry = QueueRegistry::new(100, 0.5);
        registry
            .get(GuildId::new(1))
            .write()
            .add(Track::from_request("una", UserId::new(1)))
            .unwrap();

        registry.remove(GuildId::new(1));

        // Un acceso posterior crea una cola nueva y vacía
        assert_eq!(registry.get(GuildId::new(1)).read().pending_len(), 0);
    }
}
