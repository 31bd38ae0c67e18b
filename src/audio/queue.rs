use anyhow::Result;
use rand::seq::SliceRandom;
use serenity::model::id::UserId;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::sources::TrackMetadata;

/// Política de repetición al terminar una pista.
///
/// El ciclo lo dispara el usuario (comando `/loop`) y nunca depende del
/// contenido de la cola.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Off,
    Track,
    Queue,
}

impl LoopMode {
    /// Transición del ciclo: off → track → queue → off
    pub fn next(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::Track,
            LoopMode::Track => LoopMode::Queue,
            LoopMode::Queue => LoopMode::Off,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::Track => "track",
            LoopMode::Queue => "queue",
        }
    }
}

/// Una pista solicitada por un usuario.
///
/// Nace con lo que el usuario escribió; título, URL canónica, duración y
/// miniatura se refinan cuando el extractor resuelve el stream.
#[derive(Debug, Clone)]
pub struct Track {
    pub title: String,
    /// URL canónica de la página del track; vacía hasta resolverse si la
    /// petición fue una búsqueda
    pub url: String,
    pub search_query: String,
    pub requested_by: UserId,
    pub duration_secs: u64,
    pub is_live: bool,
    pub thumbnail: Option<String>,
}

impl Track {
    pub fn from_request(query: &str, requested_by: UserId) -> Self {
        let is_url = query.starts_with("http://") || query.starts_with("https://");
        Self {
            title: query.to_string(),
            url: if is_url { query.to_string() } else { String::new() },
            search_query: query.to_string(),
            requested_by,
            duration_secs: 0,
            is_live: false,
            thumbnail: None,
        }
    }

    /// Refina los campos con los metadatos resueltos por el extractor.
    pub fn apply_metadata(&mut self, meta: &TrackMetadata) {
        self.title = meta.title.clone();
        if !meta.webpage_url.is_empty() {
            self.url = meta.webpage_url.clone();
        }
        self.duration_secs = meta.duration_secs;
        self.is_live = meta.is_live;
        self.thumbnail = meta.thumbnail.clone();
    }
}

/// Resultado de un voto de salto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipVerdict {
    /// El salto procede ya
    Passed,
    /// Faltan votos
    Pending { votes: usize, needed: usize },
}

/// Cola de reproducción de una guild.
///
/// Estado puro en memoria, sin I/O. El dueño lógico (el orquestador de
/// reproducción) serializa las mutaciones; las proyecciones de solo lectura
/// trabajan sobre instantáneas clonadas.
#[derive(Debug)]
pub struct GuildQueue {
    pending: VecDeque<Track>,
    current: Option<Track>,
    volume: f32,
    loop_mode: LoopMode,
    skip_votes: HashSet<UserId>,
    /// Última señal de actividad: creación de la cola o comienzo de la
    /// última reproducción
    idle_anchor: Instant,
    max_size: usize,
}

impl GuildQueue {
    pub fn new(max_size: usize, volume: f32) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            volume: volume.clamp(0.0, 1.0),
            loop_mode: LoopMode::Off,
            skip_votes: HashSet::new(),
            idle_anchor: Instant::now(),
            max_size,
        }
    }

    /// Agrega una pista al final de la cola.
    pub fn add(&mut self, track: Track) -> Result<()> {
        if self.pending.len() >= self.max_size {
            anyhow::bail!("La cola está llena (máximo {} pistas)", self.max_size);
        }
        info!("➕ Agregado a la cola: {}", track.title);
        self.pending.push_back(track);
        Ok(())
    }

    /// Agrega una pista al frente de la cola ("play next").
    pub fn add_top(&mut self, track: Track) -> Result<()> {
        if self.pending.len() >= self.max_size {
            anyhow::bail!("La cola está llena (máximo {} pistas)", self.max_size);
        }
        info!("⬆️ Agregado al frente de la cola: {}", track.title);
        self.pending.push_front(track);
        Ok(())
    }

    /// Produce la siguiente pista a reproducir, o `None` si la cola terminó.
    ///
    /// - En loop de pista devuelve la pista actual sin tocar la cola.
    /// - En loop de cola la pista recién terminada vuelve al final antes de
    ///   avanzar.
    /// - Los votos de salto se limpian cada vez que una pista nueva pasa a
    ///   ser la actual.
    pub fn advance(&mut self) -> Option<Track> {
        if self.loop_mode == LoopMode::Track {
            if let Some(current) = &self.current {
                debug!("🔂 Repitiendo pista: {}", current.title);
                return Some(current.clone());
            }
        }

        if self.loop_mode == LoopMode::Queue {
            if let Some(finished) = self.current.take() {
                debug!("🔁 De vuelta al final de la cola: {}", finished.title);
                self.pending.push_back(finished);
            }
        }

        match self.pending.pop_front() {
            Some(track) => {
                self.skip_votes.clear();
                self.current = Some(track.clone());
                Some(track)
            }
            None => {
                self.current = None;
                None
            }
        }
    }

    /// Elimina la pista en `index` (base cero). Fuera de rango no es un
    /// error: simplemente no hay nada que devolver. Nunca toca la actual.
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        self.pending.remove(index)
    }

    /// Baraja las pistas pendientes; la actual nunca se baraja.
    pub fn shuffle(&mut self) {
        self.pending
            .make_contiguous()
            .shuffle(&mut rand::thread_rng());
        info!("🔀 Cola barajada ({} pistas)", self.pending.len());
    }

    /// Vacía pendientes, pista actual y votos.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.current = None;
        self.skip_votes.clear();
        info!("🗑️ Cola limpiada");
    }

    /// Registra un voto de salto.
    ///
    /// Con dos oyentes o menos el salto procede sin votación; con más, hace
    /// falta mayoría simple (`oyentes/2 + 1`).
    pub fn vote_skip(&mut self, user: UserId, listeners: usize) -> SkipVerdict {
        if listeners <= 2 {
            return SkipVerdict::Passed;
        }

        self.skip_votes.insert(user);
        let needed = listeners / 2 + 1;
        let votes = self.skip_votes.len();

        if votes >= needed {
            SkipVerdict::Passed
        } else {
            SkipVerdict::Pending { votes, needed }
        }
    }

    /// Marca el comienzo de una reproducción: renueva el ancla de
    /// inactividad y descarta votos de la pista anterior.
    pub fn mark_started(&mut self) {
        self.idle_anchor = Instant::now();
        self.skip_votes.clear();
    }

    /// Tiempo transcurrido desde la última actividad.
    pub fn idle_for(&self) -> Duration {
        self.idle_anchor.elapsed()
    }

    /// Escribe de vuelta los metadatos refinados en la pista actual.
    pub fn refine_current(&mut self, track: &Track) {
        if let Some(current) = &mut self.current {
            *current = track.clone();
        }
    }

    pub fn cycle_loop_mode(&mut self) -> LoopMode {
        self.loop_mode = self.loop_mode.next();
        info!("🔄 Modo de repetición: {}", self.loop_mode.as_str());
        self.loop_mode
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Instantánea de las pendientes para proyecciones de solo lectura.
    pub fn pending_snapshot(&self) -> Vec<Track> {
        self.pending.iter().cloned().collect()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// Duración total (actual + pendientes), para la vista de la cola.
    pub fn total_duration_secs(&self) -> u64 {
        let pending: u64 = self.pending.iter().map(|t| t.duration_secs).sum();
        let current = self.current.as_ref().map_or(0, |t| t.duration_secs);
        pending + current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn track(title: &str) -> Track {
        Track {
            title: title.to_string(),
            url: format!("https://example.com/{title}"),
            search_query: title.to_string(),
            requested_by: UserId::new(1),
            duration_secs: 180,
            is_live: false,
            thumbnail: None,
        }
    }

    fn queue_with(titles: &[&str]) -> GuildQueue {
        let mut queue = GuildQueue::new(100, 0.5);
        for title in titles {
            queue.add(track(title)).unwrap();
        }
        queue
    }

    #[test]
    fn test_advance_is_fifo() {
        let mut queue = queue_with(&["a", "b", "c"]);
        assert_eq!(queue.advance().unwrap().title, "a");
        assert_eq!(queue.advance().unwrap().title, "b");
        assert_eq!(queue.advance().unwrap().title, "c");
        assert!(queue.advance().is_none());
        assert!(queue.current().is_none());
    }

    #[test]
    fn test_advance_empty_clears_current() {
        let mut queue = queue_with(&["a"]);
        queue.advance();
        assert!(queue.current().is_some());
        assert!(queue.advance().is_none());
        assert!(queue.current().is_none());
    }

    #[test]
    fn test_track_loop_repeats_without_consuming_pending() {
        let mut queue = queue_with(&["a", "b"]);
        queue.advance();
        queue.cycle_loop_mode(); // off -> track

        for _ in 0..5 {
            assert_eq!(queue.advance().unwrap().title, "a");
        }
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn test_queue_loop_requeues_finished_track_at_tail() {
        // pendientes [a, b], actual c
        let mut queue = queue_with(&["c", "a", "b"]);
        queue.advance();
        assert_eq!(queue.current().unwrap().title, "c");

        queue.cycle_loop_mode(); // off -> track
        queue.cycle_loop_mode(); // track -> queue

        let next = queue.advance().unwrap();
        assert_eq!(next.title, "a");
        let remaining: Vec<String> = queue
            .pending_snapshot()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(remaining, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_loop_mode_cycle_table() {
        assert_eq!(LoopMode::Off.next(), LoopMode::Track);
        assert_eq!(LoopMode::Track.next(), LoopMode::Queue);
        assert_eq!(LoopMode::Queue.next(), LoopMode::Off);
    }

    #[test]
    fn test_add_top_plays_next() {
        let mut queue = queue_with(&["a", "b"]);
        queue.add_top(track("urgente")).unwrap();
        assert_eq!(queue.advance().unwrap().title, "urgente");
    }

    #[test]
    fn test_remove_returns_track_and_spares_current() {
        let mut queue = queue_with(&["a", "b", "c"]);
        queue.advance(); // actual: a, pendientes [b, c]

        let removed = queue.remove(0).unwrap();
        assert_eq!(removed.title, "b");
        assert_eq!(queue.current().unwrap().title, "a");
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn test_remove_out_of_range_is_none() {
        let mut queue = queue_with(&["a"]);
        assert!(queue.remove(5).is_none());
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn test_shuffle_keeps_current_and_multiset() {
        let titles: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let mut queue = queue_with(&refs);
        queue.advance(); // actual: t0

        queue.shuffle();

        assert_eq!(queue.current().unwrap().title, "t0");
        let mut shuffled: Vec<String> = queue
            .pending_snapshot()
            .into_iter()
            .map(|t| t.title)
            .collect();
        shuffled.sort();
        let mut expected: Vec<String> = titles[1..].to_vec();
        expected.sort();
        assert_eq!(shuffled, expected);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut queue = queue_with(&["a", "b"]);
        queue.advance();
        queue.vote_skip(UserId::new(2), 5);

        queue.clear();

        assert!(queue.current().is_none());
        assert_eq!(queue.pending_len(), 0);
        // Sin votos arrastrados: un solo voto vuelve a ser 1/3
        assert_eq!(
            queue.vote_skip(UserId::new(3), 5),
            SkipVerdict::Pending { votes: 1, needed: 3 }
        );
    }

    #[test]
    fn test_vote_skip_small_channel_passes_immediately() {
        let mut queue = queue_with(&["a"]);
        assert_eq!(queue.vote_skip(UserId::new(2), 2), SkipVerdict::Passed);
        assert_eq!(queue.vote_skip(UserId::new(2), 1), SkipVerdict::Passed);
    }

    #[test]
    fn test_vote_skip_majority_threshold() {
        // 5 oyentes: umbral = 5/2 + 1 = 3
        let mut queue = queue_with(&["a"]);
        queue.advance();

        assert_eq!(
            queue.vote_skip(UserId::new(2), 5),
            SkipVerdict::Pending { votes: 1, needed: 3 }
        );
        assert_eq!(
            queue.vote_skip(UserId::new(3), 5),
            SkipVerdict::Pending { votes: 2, needed: 3 }
        );
        assert_eq!(queue.vote_skip(UserId::new(4), 5), SkipVerdict::Passed);
    }

    #[test]
    fn test_vote_skip_same_voter_counts_once() {
        let mut queue = queue_with(&["a"]);
        queue.advance();

        queue.vote_skip(UserId::new(2), 5);
        assert_eq!(
            queue.vote_skip(UserId::new(2), 5),
            SkipVerdict::Pending { votes: 1, needed: 3 }
        );
    }

    #[test]
    fn test_votes_cleared_when_new_track_becomes_current() {
        let mut queue = queue_with(&["a", "b"]);
        queue.advance();
        queue.vote_skip(UserId::new(2), 5);
        queue.vote_skip(UserId::new(3), 5);

        queue.advance(); // pista nueva: los votos no se arrastran

        assert_eq!(
            queue.vote_skip(UserId::new(4), 5),
            SkipVerdict::Pending { votes: 1, needed: 3 }
        );
    }

    #[test]
    fn test_add_rejects_when_full() {
        let mut queue = GuildQueue::new(2, 0.5);
        queue.add(track("a")).unwrap();
        queue.add(track("b")).unwrap();
        assert!(queue.add(track("c")).is_err());
        assert!(queue.add_top(track("c")).is_err());
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut queue = GuildQueue::new(10, 0.5);
        queue.set_volume(7.0);
        assert_eq!(queue.volume(), 1.0);
        queue.set_volume(-1.0);
        assert_eq!(queue.volume(), 0.0);
    }

    #[test]
    fn test_from_request_distinguishes_urls_from_searches() {
        let by_url = Track::from_request("https://youtu.be/dQw4w9WgXcQ", UserId::new(1));
        assert_eq!(by_url.url, "https://youtu.be/dQw4w9WgXcQ");

        let by_search = Track::from_request("lofi beats", UserId::new(1));
        assert!(by_search.url.is_empty());
        assert_eq!(by_search.search_query, "lofi beats");
    }

    #[test]
    fn test_apply_metadata_refines_track() {
        let mut track = Track::from_request("lofi beats", UserId::new(1));
        track.apply_metadata(&TrackMetadata {
            title: "Lofi Beats 24/7".to_string(),
            webpage_url: "https://www.youtube.com/watch?v=abc123def45".to_string(),
            duration_secs: 300,
            is_live: false,
            thumbnail: Some("https://i.ytimg.com/x.jpg".to_string()),
        });

        assert_eq!(track.title, "Lofi Beats 24/7");
        assert_eq!(track.url, "https://www.youtube.com/watch?v=abc123def45");
        assert_eq!(track.duration_secs, 300);
        assert!(track.thumbnail.is_some());
    }
}
