use rand::{thread_rng, Rng};
use thiserror::Error;
use twentyone_protocol::{
    score_hand, Card, CardDto, Deck, GameCommand, GameStateView, PlayerView, BUST_THRESHOLD,
};
use uuid::Uuid;

pub const MAX_PLAYERS: usize = 2;

/// Domain violations surfaced to clients as `Error` events; they never
/// terminate a connection.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GameError {
    #[error("not your turn")]
    NotYourTurn,
    #[error("you are already out of the round")]
    PlayerOut,
    #[error("game not started")]
    NotStarted,
    #[error("game already in progress")]
    AlreadyInProgress,
    #[error("game is full")]
    GameFull,
    #[error("need exactly 2 players to start")]
    NotEnoughPlayers,
    #[error("player not found")]
    PlayerNotFound,
}

#[derive(Debug)]
pub struct Player {
    pub id: Uuid,
    pub name: String,
    hand: Vec<Card>,
    pub score: u32,
    pub standing: bool,
}

impl Player {
    fn new(name: &str) -> Self {
        Player {
            id: Uuid::new_v4(),
            name: name.to_string(),
            hand: Vec::new(),
            score: 0,
            standing: false,
        }
    }

    /// Appends to the hand and recomputes the score from scratch.
    pub fn add_card(&mut self, card: Card) -> Card {
        self.hand.push(card);
        self.score = score_hand(&self.hand);
        card
    }

    pub fn hand(&self) -> &[Card] {
        &self.hand
    }

    pub fn busted(&self) -> bool {
        self.score > BUST_THRESHOLD
    }

    fn out_of_round(&self) -> bool {
        self.standing || self.busted()
    }

    fn full_view(&self) -> PlayerView {
        PlayerView::Full {
            id: self.id,
            name: self.name.clone(),
            score: self.score,
            is_standing: self.standing,
            hand: self.hand.iter().copied().map(CardDto::from).collect(),
            cards_in_hand: self.hand.len(),
        }
    }

    fn hidden_view(&self) -> PlayerView {
        PlayerView::Hidden {
            id: self.id,
            name: self.name.clone(),
            is_standing: self.standing,
            cards_in_hand: self.hand.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Waiting,
    InProgress,
    Over,
}

/// What a processed command produced; the session layer decides who hears
/// about it and with which view.
#[derive(Debug)]
pub enum Outcome {
    Started,
    CardDealt { player_id: Uuid, card: Card },
    Stood { player_id: Uuid },
    Finished { winner: Option<Uuid> },
    Ignored,
    Rejected(GameError),
}

/// One two-player match. All mutations run under the per-game mutex held
/// by the session layer, so turn state never races between occupants.
#[derive(Debug)]
pub struct Game {
    pub id: Uuid,
    players: Vec<Player>,
    deck: Deck,
    current_index: usize,
    phase: Phase,
}

impl Game {
    pub fn new(id: Uuid) -> Self {
        Game {
            id,
            players: Vec::new(),
            deck: Deck::new(),
            current_index: 0,
            phase: Phase::Waiting,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_over(&self) -> bool {
        self.phase == Phase::Over
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player_ids(&self) -> Vec<Uuid> {
        self.players.iter().map(|p| p.id).collect()
    }

    pub fn current_player_id(&self) -> Option<Uuid> {
        if self.phase != Phase::InProgress {
            return None;
        }
        self.players.get(self.current_index).map(|p| p.id)
    }

    /// Seats a new player and hands back their fresh id.
    pub fn add_player(&mut self, name: &str) -> Result<Uuid, GameError> {
        if self.phase != Phase::Waiting {
            return Err(GameError::AlreadyInProgress);
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::GameFull);
        }
        let player = Player::new(name);
        let id = player.id;
        self.players.push(player);
        Ok(id)
    }

    /// Departure support: drops the player, keeping the turn index on the
    /// same remaining player where possible.
    pub fn remove_player(&mut self, id: Uuid) {
        if let Some(pos) = self.players.iter().position(|p| p.id == id) {
            self.players.remove(pos);
            if pos < self.current_index {
                self.current_index -= 1;
            } else if self.current_index >= self.players.len() {
                self.current_index = 0;
            }
        }
    }

    /// Ends the game unconditionally. A retired game refuses new seats and
    /// further commands, even through a handle obtained before removal.
    pub fn retire(&mut self) {
        self.phase = Phase::Over;
    }

    /// Deals two cards round-robin and opens play with a randomly chosen
    /// starting player.
    pub fn start_game(&mut self) -> Result<(), GameError> {
        if self.phase == Phase::InProgress {
            return Err(GameError::AlreadyInProgress);
        }
        if self.players.len() != MAX_PLAYERS {
            return Err(GameError::NotEnoughPlayers);
        }
        self.phase = Phase::InProgress;
        self.current_index = thread_rng().gen_range(0..self.players.len());
        for _ in 0..2 {
            for player in self.players.iter_mut() {
                player.add_card(self.deck.draw());
            }
        }
        Ok(())
    }

    fn ensure_turn(&self, player_id: Uuid) -> Result<(), GameError> {
        if self.phase != Phase::InProgress {
            return Err(GameError::NotStarted);
        }
        let player = self
            .players
            .iter()
            .find(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;
        if self.current_player_id() != Some(player_id) {
            return Err(GameError::NotYourTurn);
        }
        if player.out_of_round() {
            return Err(GameError::PlayerOut);
        }
        Ok(())
    }

    /// Draws one card for the turn holder. A bust forces the player to
    /// stand and passes the turn; returns the card and whether it busted.
    pub fn hit(&mut self, player_id: Uuid) -> Result<(Card, bool), GameError> {
        self.ensure_turn(player_id)?;
        let card = self.deck.draw();
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;
        player.add_card(card);
        let busted = player.busted();
        if busted {
            player.standing = true;
            self.advance_turn();
        }
        Ok((card, busted))
    }

    pub fn stand(&mut self, player_id: Uuid) -> Result<(), GameError> {
        self.ensure_turn(player_id)?;
        if let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) {
            player.standing = true;
        }
        self.advance_turn();
        Ok(())
    }

    /// Passes the turn to the next player still able to act. Bounded scan:
    /// when nobody is eligible the game ends instead of looping.
    fn advance_turn(&mut self) {
        let n = self.players.len();
        if n == 0 {
            self.phase = Phase::Over;
            return;
        }
        for step in 1..=n {
            let idx = (self.current_index + step) % n;
            if !self.players[idx].out_of_round() {
                self.current_index = idx;
                return;
            }
        }
        self.phase = Phase::Over;
    }

    /// Winner of a finished game. Valid players (score within threshold)
    /// beat busted ones; among valid players the higher score wins, among
    /// two busts the lower. Equal scores are a draw.
    pub fn winner(&self) -> Option<Uuid> {
        let valid: Vec<&Player> = self.players.iter().filter(|p| !p.busted()).collect();
        match valid.len() {
            1 => Some(valid[0].id),
            0 => Self::decide(self.players.iter().collect(), false),
            _ => Self::decide(valid, true),
        }
    }

    fn decide(pool: Vec<&Player>, highest_wins: bool) -> Option<Uuid> {
        let first = pool.first()?;
        if pool.iter().all(|p| p.score == first.score) {
            return None;
        }
        let pick = if highest_wins {
            pool.iter().max_by_key(|p| p.score)
        } else {
            pool.iter().min_by_key(|p| p.score)
        };
        pick.map(|p| p.id)
    }

    /// Single command entry point. Domain violations come back as
    /// `Outcome::Rejected`, never as a panic or an `Err`.
    pub fn process_command(&mut self, command: GameCommand) -> Outcome {
        match command {
            // Seating is the session layer's job.
            GameCommand::Join { .. } => Outcome::Ignored,
            GameCommand::StartGame { .. } => match self.start_game() {
                Ok(()) => Outcome::Started,
                Err(err) => Outcome::Rejected(err),
            },
            GameCommand::Hit { player_id } => match self.hit(player_id) {
                Ok((card, _busted)) => {
                    if self.phase == Phase::Over {
                        Outcome::Finished {
                            winner: self.winner(),
                        }
                    } else {
                        Outcome::CardDealt { player_id, card }
                    }
                }
                Err(err) => Outcome::Rejected(err),
            },
            GameCommand::Stand { player_id } => match self.stand(player_id) {
                Ok(()) => {
                    if self.phase == Phase::Over {
                        Outcome::Finished {
                            winner: self.winner(),
                        }
                    } else {
                        Outcome::Stood { player_id }
                    }
                }
                Err(err) => Outcome::Rejected(err),
            },
        }
    }

    pub fn full_player_view(&self, id: Uuid) -> Option<PlayerView> {
        self.players.iter().find(|p| p.id == id).map(Player::full_view)
    }

    /// Snapshot redacted for one recipient: a hand is visible iff the
    /// viewer owns it or the game is over.
    pub fn state_view(&self, viewer: Uuid) -> GameStateView {
        let reveal_all = self.phase == Phase::Over;
        GameStateView {
            players: self
                .players
                .iter()
                .map(|p| {
                    if reveal_all || p.id == viewer {
                        p.full_view()
                    } else {
                        p.hidden_view()
                    }
                })
                .collect(),
            current_player_id: self.current_player_id(),
            game_over: reveal_all,
            message: self.status_message(),
        }
    }

    fn status_message(&self) -> String {
        match self.phase {
            Phase::Over => String::new(),
            Phase::InProgress => match self.players.get(self.current_index) {
                Some(p) => format!("Turn: {} ({} points)", p.name, p.score),
                None => "Game continues".to_string(),
            },
            Phase::Waiting => "Waiting for players...".to_string(),
        }
    }
}

#[cfg(test)]
impl Game {
    /// Skips dealing: flips straight to InProgress with a chosen turn
    /// holder so tests can stack hands and decks themselves.
    pub(crate) fn begin_at(&mut self, current_index: usize) {
        self.phase = Phase::InProgress;
        self.current_index = current_index;
    }

    pub(crate) fn set_deck(&mut self, deck: Deck) {
        self.deck = deck;
    }

    pub(crate) fn player_mut(&mut self, id: Uuid) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub(crate) fn player(&self, id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }
}
