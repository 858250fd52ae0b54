use log::{debug, info};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

use crate::game::{Game, Phase, MAX_PLAYERS};

pub type SharedGame = Arc<Mutex<Game>>;

#[derive(Default)]
struct Registry {
    games: HashMap<Uuid, SharedGame>,
    /// Matchmaking candidates, oldest first; scans run newest-first.
    /// Every queued id resolves in `games` or is pruned during cleanup.
    queue: VecDeque<Uuid>,
}

/// Registry of open and active games plus the matchmaking policy: reuse
/// the newest game with a free seat, otherwise create one.
#[derive(Default)]
pub struct GameManager {
    inner: Mutex<Registry>,
}

impl GameManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_game(&self) -> Uuid {
        let mut reg = self.inner.lock();
        Self::register(&mut reg).0
    }

    fn register(reg: &mut Registry) -> (Uuid, SharedGame) {
        let id = Uuid::new_v4();
        let game = Arc::new(Mutex::new(Game::new(id)));
        reg.games.insert(id, Arc::clone(&game));
        reg.queue.push_back(id);
        info!("[GAMES] created game {id}");
        (id, game)
    }

    /// Scans candidates newest-first for a game with a free seat that has
    /// not started; falls back to creating a fresh one.
    pub fn get_or_create_available(&self) -> (Uuid, SharedGame) {
        let mut reg = self.inner.lock();
        for id in reg.queue.iter().rev() {
            if let Some(game) = reg.games.get(id) {
                let g = game.lock();
                if g.player_count() < MAX_PLAYERS && g.phase() != Phase::InProgress {
                    return (*id, Arc::clone(game));
                }
            }
        }
        Self::register(&mut reg)
    }

    pub fn get(&self, id: Uuid) -> Option<SharedGame> {
        self.inner.lock().games.get(&id).map(Arc::clone)
    }

    /// Idempotent: removing an unknown id is a no-op. The removed game is
    /// retired, so a matchmaking caller still holding its `Arc` cannot
    /// seat anyone into it afterwards.
    pub fn remove_game(&self, id: Uuid) {
        let mut reg = self.inner.lock();
        if let Some(game) = reg.games.remove(&id) {
            game.lock().retire();
            info!("[GAMES] removed game {id}");
        }
        reg.queue.retain(|q| *q != id);
    }

    /// Prunes games that are gone, over, or empty. Runs opportunistically
    /// on disconnect.
    pub fn cleanup_finished_or_empty(&self) {
        let mut reg = self.inner.lock();
        let dead: Vec<Uuid> = reg
            .queue
            .iter()
            .filter(|id| match reg.games.get(id) {
                None => true,
                Some(game) => {
                    let g = game.lock();
                    g.is_over() || g.player_count() == 0
                }
            })
            .copied()
            .collect();
        if dead.is_empty() {
            return;
        }
        for id in &dead {
            if let Some(game) = reg.games.remove(id) {
                game.lock().retire();
            }
        }
        reg.queue.retain(|id| !dead.contains(id));
        debug!("[GAMES] pruned {} finished or empty games", dead.len());
    }

    pub fn game_count(&self) -> usize {
        self.inner.lock().games.len()
    }
}
