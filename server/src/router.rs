use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use twentyone_protocol::{CardDto, GameCommand, GameEvent};
use uuid::Uuid;

use crate::game::{Game, GameError, Outcome, MAX_PLAYERS};
use crate::manager::{GameManager, SharedGame};

pub type EventTx = UnboundedSender<GameEvent>;

/// Connection, game and name mappings move together under one lock: a
/// player id present in one map is resolvable in the others, or in none.
#[derive(Default)]
struct Sessions {
    connections: HashMap<Uuid, EventTx>,
    player_games: HashMap<Uuid, Uuid>,
    player_names: HashMap<Uuid, String>,
}

/// Routes inbound commands to the right game and fans resulting events
/// out to the right connections, redacting per recipient.
///
/// Lock order everywhere: game registry, then a game, then the session
/// maps. Sends go through per-connection unbounded channels, so a slow
/// peer never stalls delivery to the others.
#[derive(Default)]
pub struct SessionRouter {
    games: GameManager,
    sessions: Mutex<Sessions>,
}

impl SessionRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry point for one parsed frame. `my_id` is the connection's
    /// established player id; Hit/Stand trust it over the id in the frame.
    pub fn dispatch(&self, command: GameCommand, my_id: &mut Option<Uuid>, tx: &EventTx) {
        debug!("[WS] {:?} from {:?}", command, my_id);
        match command {
            GameCommand::Join { player_name } => {
                if let Some(id) = *my_id {
                    // A seat in a live game is exclusive; a seat whose game
                    // was retired frees the connection to join again.
                    if self.resolve_game(id).is_some() {
                        let _ = tx.send(GameEvent::Error {
                            message: "already joined a game".to_string(),
                        });
                        return;
                    }
                    self.forget_session(id);
                }
                *my_id = Some(self.handle_join(&player_name, tx));
            }
            GameCommand::Hit { .. } => match *my_id {
                Some(id) => self.handle_hit(id, tx),
                None => Self::reject(tx, GameError::PlayerNotFound),
            },
            GameCommand::Stand { .. } => match *my_id {
                Some(id) => self.handle_stand(id, tx),
                None => Self::reject(tx, GameError::PlayerNotFound),
            },
            GameCommand::StartGame { .. } => {
                // Reserved: matches start automatically at two players.
                debug!("[WS] ignoring StartGame from {:?}", my_id);
            }
        }
    }

    /* ---------------- join / matchmaking ---------------- */

    fn handle_join(&self, name: &str, tx: &EventTx) -> Uuid {
        loop {
            let (game_id, game) = self.games.get_or_create_available();
            let mut g = game.lock();
            let player_id = match g.add_player(name) {
                Ok(id) => id,
                // Another join took the open seat between matchmaking and
                // seating; pick again.
                Err(_) => continue,
            };

            {
                let mut sessions = self.sessions.lock();
                sessions.connections.insert(player_id, tx.clone());
                sessions.player_games.insert(player_id, game_id);
                sessions.player_names.insert(player_id, name.to_string());
            }

            info!("[JOIN] {name} ({player_id}) joined game {game_id}");

            if let Some(player) = g.full_player_view(player_id) {
                let _ = tx.send(GameEvent::PlayerJoined { player, game_id });
            }
            self.broadcast_except(
                &g,
                player_id,
                GameEvent::Info {
                    message: format!("{name} joined the game"),
                },
            );

            if g.player_count() == MAX_PLAYERS {
                match g.start_game() {
                    Ok(()) => {
                        info!("[START] game {game_id} started");
                        self.send_each_view(&g);
                    }
                    Err(err) => warn!("[START] game {game_id} refused to start: {err}"),
                }
            }

            return player_id;
        }
    }

    /* ---------------- turn commands ---------------- */

    fn handle_hit(&self, player_id: Uuid, tx: &EventTx) {
        let Some((game_id, game)) = self.resolve_game(player_id) else {
            Self::reject(tx, GameError::PlayerNotFound);
            return;
        };
        let mut g = game.lock();
        match g.process_command(GameCommand::Hit { player_id }) {
            Outcome::CardDealt { player_id, card } => {
                debug!("[HIT] {player_id} drew {card} in game {game_id}");
                // The card itself goes to the drawer only; the opponent
                // hears that a card was taken, not which.
                self.fan_out(&g.player_ids(), |id| {
                    Some(if id == player_id {
                        GameEvent::CardDealt {
                            player_id,
                            card: CardDto::from(card),
                        }
                    } else {
                        GameEvent::AnotherPlayerTookCard
                    })
                });
            }
            Outcome::Finished { winner } => self.finish_game(&g, winner),
            Outcome::Rejected(err) => self.broadcast_all(
                &g,
                GameEvent::Error {
                    message: err.to_string(),
                },
            ),
            Outcome::Started | Outcome::Stood { .. } | Outcome::Ignored => {}
        }
    }

    fn handle_stand(&self, player_id: Uuid, tx: &EventTx) {
        let Some((game_id, game)) = self.resolve_game(player_id) else {
            Self::reject(tx, GameError::PlayerNotFound);
            return;
        };
        let mut g = game.lock();
        match g.process_command(GameCommand::Stand { player_id }) {
            Outcome::Stood { player_id } => {
                debug!("[STAND] {player_id} stands in game {game_id}");
                self.broadcast_all(&g, GameEvent::PlayerStood { player_id });
            }
            Outcome::Finished { winner } => self.finish_game(&g, winner),
            Outcome::Rejected(err) => self.broadcast_all(
                &g,
                GameEvent::Error {
                    message: err.to_string(),
                },
            ),
            Outcome::Started | Outcome::CardDealt { .. } | Outcome::Ignored => {}
        }
    }

    /* ---------------- departure ---------------- */

    /// Runs after the read loop exits, on voluntary close and transport
    /// failure alike.
    pub fn handle_disconnect(&self, player_id: Uuid) {
        let (game_id, name) = {
            let mut sessions = self.sessions.lock();
            sessions.connections.remove(&player_id);
            (
                sessions.player_games.remove(&player_id),
                sessions.player_names.remove(&player_id),
            )
        };
        let Some(game_id) = game_id else { return };
        let name = name.unwrap_or_else(|| "A player".to_string());
        info!("[LEAVE] {name} ({player_id}) left game {game_id}");

        if let Some(game) = self.games.get(game_id) {
            let mut g = game.lock();
            g.remove_player(player_id);
            self.broadcast_all(
                &g,
                GameEvent::Info {
                    message: format!("{name} left the game"),
                },
            );
            let survivors = g.player_ids();
            let abandoned = g.player_count() <= 1;
            drop(g);
            if abandoned {
                self.games.remove_game(game_id);
                // The survivor keeps the socket but loses the seat, so the
                // same connection can join a fresh game.
                for id in survivors {
                    self.forget_session(id);
                }
            }
        }
        self.games.cleanup_finished_or_empty();
    }

    /* ---------------- fan-out helpers ---------------- */

    fn resolve_game(&self, player_id: Uuid) -> Option<(Uuid, SharedGame)> {
        let game_id = *self.sessions.lock().player_games.get(&player_id)?;
        let game = self.games.get(game_id)?;
        Some((game_id, game))
    }

    fn forget_session(&self, player_id: Uuid) {
        let mut sessions = self.sessions.lock();
        sessions.connections.remove(&player_id);
        sessions.player_games.remove(&player_id);
        sessions.player_names.remove(&player_id);
    }

    fn reject(tx: &EventTx, err: GameError) {
        let _ = tx.send(GameEvent::Error {
            message: err.to_string(),
        });
    }

    /// Builds one event per recipient (`None` skips) and pushes each onto
    /// that recipient's channel. Failed sends are logged and skipped so
    /// one dead connection never blocks the rest.
    fn fan_out(&self, recipients: &[Uuid], mut make: impl FnMut(Uuid) -> Option<GameEvent>) {
        let sessions = self.sessions.lock();
        for id in recipients {
            let Some(event) = make(*id) else { continue };
            match sessions.connections.get(id) {
                Some(tx) => {
                    if tx.send(event).is_err() {
                        warn!("[SEND] dropped event for {id}: connection gone");
                    }
                }
                None => debug!("[SEND] no connection for {id}"),
            }
        }
    }

    fn broadcast_all(&self, game: &Game, event: GameEvent) {
        self.fan_out(&game.player_ids(), |_| Some(event.clone()));
    }

    fn broadcast_except(&self, game: &Game, exclude: Uuid, event: GameEvent) {
        self.fan_out(&game.player_ids(), |id| {
            (id != exclude).then(|| event.clone())
        });
    }

    /// GameStarted carries each recipient's own redacted view.
    fn send_each_view(&self, game: &Game) {
        self.fan_out(&game.player_ids(), |id| {
            Some(GameEvent::GameStarted {
                game_state: game.state_view(id),
            })
        });
    }

    /// GameOver reveals every hand: the Over-state view is unredacted for
    /// all recipients.
    fn finish_game(&self, game: &Game, winner: Option<Uuid>) {
        info!("[OVER] game {} finished, winner: {winner:?}", game.id);
        self.fan_out(&game.player_ids(), |id| {
            Some(GameEvent::GameOver {
                winner_id: winner,
                game_state: game.state_view(id),
            })
        });
    }
}

#[cfg(test)]
impl SessionRouter {
    pub(crate) fn games(&self) -> &GameManager {
        &self.games
    }
}
