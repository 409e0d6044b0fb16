//! The match controller: a two-team, multi-round state machine.
//!
//! [`Match::handle`] takes one [`MatchEvent`] and returns the side effects the
//! host has to carry out (arming or cancelling the countdown, announcing turn
//! and round ends, recording the finished match). The machine never touches a
//! clock, a socket or the stats store itself.

use std::collections::BTreeSet;

use rand::Rng;
use serde::Serialize;

use crate::config;
use crate::error::{ConfigError, MatchError};
use crate::stats::{MatchResult, TeamRecord};
use crate::types::{GameConfig, MatchStatus, MatchView, TeamView, TurnEndReason, WordView};
use crate::words::WordPool;

pub const TEAM_COUNT: usize = 2;

/// Label shown for a team whose name was left blank.
pub fn default_team_name(index: usize) -> String {
    format!("Team {}", index + 1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Team {
    /// Trimmed, possibly empty.
    pub name: String,
    pub players: [String; 2],
    pub score: u32,
    pub guessed: BTreeSet<String>,
    pub assigned: Vec<String>,
    pub round_scores: Vec<u32>,
    pub match_score: u32,
}

impl Team {
    fn new() -> Self {
        Self {
            name: String::new(),
            players: [String::new(), String::new()],
            score: 0,
            guessed: BTreeSet::new(),
            assigned: Vec::new(),
            round_scores: Vec::new(),
            match_score: 0,
        }
    }

    pub fn display_name(&self, index: usize) -> String {
        if self.name.is_empty() {
            default_team_name(index)
        } else {
            self.name.clone()
        }
    }

    /// True once every assigned word has been guessed.
    pub fn has_cleared(&self) -> bool {
        !self.assigned.is_empty() && self.guessed.len() == self.assigned.len()
    }

    fn commit_round(&mut self) {
        self.round_scores.push(self.score);
        self.match_score += self.score;
        self.score = 0;
        self.guessed.clear();
    }

    fn clear_match(&mut self) {
        self.score = 0;
        self.guessed.clear();
        self.assigned.clear();
        self.round_scores.clear();
        self.match_score = 0;
    }

    fn to_record(&self) -> TeamRecord {
        TeamRecord {
            name: self.name.clone(),
            final_score: self.match_score,
            players: self.players.to_vec(),
            round_scores: self.round_scores.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    /// Waiting for `team` to start its turn.
    Idle { round: u32, team: usize },
    Active { round: u32, team: usize },
    MatchComplete { winner: usize },
}

impl Phase {
    pub fn status(&self) -> MatchStatus {
        match self {
            Self::Setup => MatchStatus::Setup,
            Self::Idle { .. } => MatchStatus::Idle,
            Self::Active { .. } => MatchStatus::Active,
            Self::MatchComplete { .. } => MatchStatus::MatchComplete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    SetTeamName { team: usize, name: String },
    SetPlayerName { team: usize, player: usize, name: String },
    ConfirmSetup,
    StartTurn,
    /// One countdown step from the timer armed under `epoch`.
    Tick { epoch: u64 },
    Guess { word: String },
    EndTurn,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ArmTimer { epoch: u64 },
    CancelTimer,
    TurnEnded {
        team: usize,
        reason: TurnEndReason,
        score: u32,
    },
    RoundCommitted { round: u32, next_round: Option<u32> },
    MatchFinished(MatchResult),
}

#[derive(Debug, Clone)]
pub struct Match {
    round_time: u32,
    total_rounds: u32,
    words_per_team: usize,
    auto_advance_turns: bool,
    pool: WordPool,
    teams: [Team; TEAM_COUNT],
    phase: Phase,
    time_left: u32,
    epoch: u64,
}

impl Match {
    pub fn new(config: &GameConfig, pool: WordPool) -> Result<Self, ConfigError> {
        config::validate(config)?;
        pool.ensure_fits(config.words_per_team)?;

        Ok(Self {
            round_time: config.round_time,
            total_rounds: config.total_rounds,
            words_per_team: config.words_per_team,
            auto_advance_turns: config.auto_advance_turns,
            pool,
            teams: [Team::new(), Team::new()],
            phase: Phase::Setup,
            time_left: config.round_time,
            epoch: 0,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> MatchStatus {
        self.phase.status()
    }

    pub fn teams(&self) -> &[Team; TEAM_COUNT] {
        &self.teams
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    /// Epoch of the currently armed countdown. Bumped on every arm and disarm.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    pub fn round(&self) -> u32 {
        match self.phase {
            Phase::Setup => 1,
            Phase::Idle { round, .. } | Phase::Active { round, .. } => round,
            Phase::MatchComplete { .. } => self.total_rounds,
        }
    }

    pub fn active_team(&self) -> usize {
        match self.phase {
            Phase::Idle { team, .. } | Phase::Active { team, .. } => team,
            Phase::Setup | Phase::MatchComplete { .. } => 0,
        }
    }

    pub fn handle<R: Rng + ?Sized>(
        &mut self,
        event: MatchEvent,
        rng: &mut R,
    ) -> Result<Vec<Effect>, MatchError> {
        match event {
            MatchEvent::SetTeamName { team, name } => {
                self.require_setup("rename a team")?;
                self.team_mut(team)?.name = name.trim().to_string();
                Ok(Vec::new())
            }
            MatchEvent::SetPlayerName { team, player, name } => {
                self.require_setup("rename a player")?;
                let team = self.team_mut(team)?;
                let slot = team
                    .players
                    .get_mut(player)
                    .ok_or(MatchError::InvalidPlayer(player))?;
                *slot = name;
                Ok(Vec::new())
            }
            MatchEvent::ConfirmSetup => {
                self.require_setup("confirm the teams")?;
                for team in &mut self.teams {
                    team.clear_match();
                }
                self.repartition(rng);
                self.time_left = self.round_time;
                self.phase = Phase::Idle { round: 1, team: 0 };
                Ok(Vec::new())
            }
            MatchEvent::StartTurn => self.start_turn(rng),
            MatchEvent::Tick { epoch } => Ok(self.tick(epoch, rng)),
            MatchEvent::Guess { word } => self.guess(word, rng),
            MatchEvent::EndTurn => {
                let (round, team) = self.require_active("end a turn")?;
                Ok(self.end_turn(round, team, TurnEndReason::Manual, rng))
            }
            MatchEvent::Reset => Ok(self.reset()),
        }
    }

    /// Renders the match for the page. `wins` looks up a team's stored wins by
    /// display name.
    pub fn view(&self, wins: impl Fn(&str) -> u32) -> MatchView {
        let teams = self
            .teams
            .iter()
            .enumerate()
            .map(|(i, team)| {
                let display_name = team.display_name(i);
                TeamView {
                    name: team.name.clone(),
                    wins: wins(&display_name),
                    display_name,
                    players: team.players.clone(),
                    score: team.score,
                    match_score: team.match_score,
                    round_scores: team.round_scores.clone(),
                }
            })
            .collect();

        let words = match self.phase {
            Phase::Active { team, .. } => {
                let team = &self.teams[team];
                team.assigned
                    .iter()
                    .map(|word| WordView {
                        word: word.clone(),
                        guessed: team.guessed.contains(word),
                    })
                    .collect()
            }
            _ => Vec::new(),
        };

        let winner = match self.phase {
            Phase::MatchComplete { winner } => Some(winner),
            _ => None,
        };

        MatchView {
            status: self.status(),
            round: self.round(),
            total_rounds: self.total_rounds,
            active_team: self.active_team(),
            time_left: self.time_left,
            teams,
            words,
            winner,
        }
    }

    fn start_turn<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<Vec<Effect>, MatchError> {
        let Phase::Idle { round, team } = self.phase else {
            return Err(self.not_allowed("start a turn"));
        };

        if self.teams.iter().any(|t| t.assigned.is_empty()) {
            self.repartition(rng);
        }

        self.phase = Phase::Active { round, team };
        Ok(vec![self.arm()])
    }

    fn tick<R: Rng + ?Sized>(&mut self, epoch: u64, rng: &mut R) -> Vec<Effect> {
        let Phase::Active { round, team } = self.phase else {
            return Vec::new();
        };
        if epoch != self.epoch {
            return Vec::new();
        }

        self.time_left = self.time_left.saturating_sub(1);
        if self.time_left == 0 {
            return self.end_turn(round, team, TurnEndReason::TimeUp, rng);
        }
        Vec::new()
    }

    fn guess<R: Rng + ?Sized>(
        &mut self,
        word: String,
        rng: &mut R,
    ) -> Result<Vec<Effect>, MatchError> {
        let (round, index) = self.require_active("guess a word")?;
        let team = &mut self.teams[index];

        if team.guessed.contains(&word) {
            return Err(MatchError::WordAlreadyUsed { word });
        }
        if !team.assigned.contains(&word) {
            return Err(MatchError::UnknownWord { word });
        }

        team.guessed.insert(word);
        team.score += 1;

        if team.has_cleared() {
            return Ok(self.end_turn(round, index, TurnEndReason::Cleared, rng));
        }
        Ok(Vec::new())
    }

    fn end_turn<R: Rng + ?Sized>(
        &mut self,
        round: u32,
        team: usize,
        reason: TurnEndReason,
        rng: &mut R,
    ) -> Vec<Effect> {
        let mut effects = vec![
            self.disarm(),
            Effect::TurnEnded {
                team,
                reason,
                score: self.teams[team].score,
            },
        ];
        self.time_left = self.round_time;

        if team + 1 < TEAM_COUNT {
            let next = team + 1;
            if self.auto_advance_turns {
                self.phase = Phase::Active { round, team: next };
                effects.push(self.arm());
            } else {
                self.phase = Phase::Idle { round, team: next };
            }
            return effects;
        }

        for team in &mut self.teams {
            team.commit_round();
        }

        if round >= self.total_rounds {
            effects.push(Effect::RoundCommitted {
                round,
                next_round: None,
            });
            effects.push(Effect::MatchFinished(self.finish()));
        } else {
            self.repartition(rng);
            self.phase = Phase::Idle {
                round: round + 1,
                team: 0,
            };
            effects.push(Effect::RoundCommitted {
                round,
                next_round: Some(round + 1),
            });
        }
        effects
    }

    fn finish(&mut self) -> MatchResult {
        // Strict comparison keeps the first team on a tie.
        let mut winner = 0;
        for (i, team) in self.teams.iter().enumerate().skip(1) {
            if team.match_score > self.teams[winner].match_score {
                winner = i;
            }
        }

        self.phase = Phase::MatchComplete { winner };

        MatchResult {
            teams: self.teams.iter().map(Team::to_record).collect(),
            winner: self.teams[winner].display_name(winner),
            rounds: self.total_rounds,
        }
    }

    fn reset(&mut self) -> Vec<Effect> {
        let cancel = self.disarm();
        for team in &mut self.teams {
            team.clear_match();
        }
        self.time_left = self.round_time;
        self.phase = Phase::Setup;
        vec![cancel]
    }

    fn repartition<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let [first, second] = self.pool.partition(self.words_per_team, rng);
        for (team, words) in self.teams.iter_mut().zip([first, second]) {
            team.assigned = words;
            team.score = 0;
            team.guessed.clear();
        }
    }

    fn arm(&mut self) -> Effect {
        self.epoch += 1;
        self.time_left = self.round_time;
        Effect::ArmTimer { epoch: self.epoch }
    }

    fn disarm(&mut self) -> Effect {
        self.epoch += 1;
        Effect::CancelTimer
    }

    fn team_mut(&mut self, index: usize) -> Result<&mut Team, MatchError> {
        self.teams
            .get_mut(index)
            .ok_or(MatchError::InvalidTeam(index))
    }

    fn require_setup(&self, action: &'static str) -> Result<(), MatchError> {
        match self.phase {
            Phase::Setup => Ok(()),
            _ => Err(self.not_allowed(action)),
        }
    }

    fn require_active(&self, action: &'static str) -> Result<(u32, usize), MatchError> {
        match self.phase {
            Phase::Active { round, team } => Ok((round, team)),
            _ => Err(self.not_allowed(action)),
        }
    }

    fn not_allowed(&self, action: &'static str) -> MatchError {
        MatchError::NotAllowed {
            action,
            status: self.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn config(total_rounds: u32) -> GameConfig {
        GameConfig {
            round_time: 5,
            total_rounds,
            ..GameConfig::default()
        }
    }

    fn new_match(total_rounds: u32) -> (Match, StdRng) {
        let game = Match::new(&config(total_rounds), WordPool::default()).unwrap();
        (game, StdRng::seed_from_u64(42))
    }

    fn started(total_rounds: u32) -> (Match, StdRng) {
        let (mut game, mut rng) = new_match(total_rounds);
        game.handle(MatchEvent::ConfirmSetup, &mut rng).unwrap();
        (game, rng)
    }

    fn guess_n(game: &mut Match, rng: &mut StdRng, n: usize) -> Vec<Effect> {
        let team = game.active_team();
        let words: Vec<String> = game.teams()[team].assigned.iter().take(n).cloned().collect();
        let mut effects = Vec::new();
        for word in words {
            effects = game.handle(MatchEvent::Guess { word }, rng).unwrap();
        }
        effects
    }

    fn assert_invariants(game: &Match) {
        for team in game.teams() {
            assert_eq!(team.score as usize, team.guessed.len());
            assert!(team.guessed.iter().all(|w| team.assigned.contains(w)));
            assert_eq!(team.round_scores.iter().sum::<u32>(), team.match_score);
        }
    }

    #[test]
    fn setup_trims_names_and_keeps_blank() {
        let (mut game, mut rng) = new_match(3);
        game.handle(
            MatchEvent::SetTeamName { team: 0, name: "  Owls  ".into() },
            &mut rng,
        )
        .unwrap();
        game.handle(MatchEvent::SetTeamName { team: 1, name: "   ".into() }, &mut rng)
            .unwrap();

        assert_eq!(game.teams()[0].name, "Owls");
        assert_eq!(game.teams()[1].name, "");
        assert_eq!(game.teams()[1].display_name(1), "Team 2");
    }

    #[test]
    fn setup_rejects_bad_indices() {
        let (mut game, mut rng) = new_match(3);
        let err = game
            .handle(MatchEvent::SetTeamName { team: 2, name: "x".into() }, &mut rng)
            .unwrap_err();
        assert_eq!(err, MatchError::InvalidTeam(2));

        let err = game
            .handle(
                MatchEvent::SetPlayerName { team: 0, player: 2, name: "x".into() },
                &mut rng,
            )
            .unwrap_err();
        assert_eq!(err, MatchError::InvalidPlayer(2));
    }

    #[test]
    fn names_are_locked_after_setup() {
        let (mut game, mut rng) = started(3);
        let err = game
            .handle(MatchEvent::SetTeamName { team: 0, name: "x".into() }, &mut rng)
            .unwrap_err();
        assert!(matches!(err, MatchError::NotAllowed { status: MatchStatus::Idle, .. }));
    }

    #[test]
    fn confirm_partitions_disjoint_lists() {
        let (game, _) = started(3);
        let [a, b] = game.teams();
        assert_eq!(a.assigned.len(), 10);
        assert_eq!(b.assigned.len(), 10);
        assert!(a.assigned.iter().all(|w| !b.assigned.contains(w)));
        assert_eq!(game.phase(), Phase::Idle { round: 1, team: 0 });
    }

    #[test]
    fn start_turn_arms_timer_and_reveals_words() {
        let (mut game, mut rng) = started(3);
        assert!(game.view(|_| 0).words.is_empty());

        let effects = game.handle(MatchEvent::StartTurn, &mut rng).unwrap();
        assert_eq!(effects, vec![Effect::ArmTimer { epoch: game.epoch() }]);
        assert_eq!(game.view(|_| 0).words.len(), 10);
        assert_eq!(game.time_left(), 5);
    }

    #[test]
    fn guess_scores_and_rejects_repeats() {
        let (mut game, mut rng) = started(3);
        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();
        let word = game.teams()[0].assigned[0].clone();

        game.handle(MatchEvent::Guess { word: word.clone() }, &mut rng)
            .unwrap();
        let err = game
            .handle(MatchEvent::Guess { word: word.clone() }, &mut rng)
            .unwrap_err();

        assert!(err.is_warning());
        assert_eq!(game.teams()[0].score, 1);
        assert_eq!(game.teams()[0].guessed.len(), 1);
        assert_invariants(&game);
    }

    #[test]
    fn guess_outside_assigned_list_is_rejected() {
        let (mut game, mut rng) = started(3);
        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();
        let other = game.teams()[1].assigned[0].clone();

        let err = game
            .handle(MatchEvent::Guess { word: other }, &mut rng)
            .unwrap_err();
        assert!(matches!(err, MatchError::UnknownWord { .. }));
        assert_eq!(game.teams()[0].score, 0);
    }

    #[test]
    fn clearing_every_word_ends_the_turn_at_once() {
        let (mut game, mut rng) = started(1);
        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();

        let effects = guess_n(&mut game, &mut rng, 10);

        assert_eq!(
            effects,
            vec![
                Effect::CancelTimer,
                Effect::TurnEnded { team: 0, reason: TurnEndReason::Cleared, score: 10 },
            ]
        );
        assert_eq!(game.phase(), Phase::Idle { round: 1, team: 1 });
        assert_eq!(game.teams()[0].score, 10);
        assert_eq!(game.time_left(), 5);
    }

    #[test]
    fn countdown_ends_turn_at_zero() {
        let (mut game, mut rng) = started(3);
        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();
        let epoch = game.epoch();

        for _ in 0..4 {
            assert!(game.handle(MatchEvent::Tick { epoch }, &mut rng).unwrap().is_empty());
        }
        assert_eq!(game.time_left(), 1);

        let effects = game.handle(MatchEvent::Tick { epoch }, &mut rng).unwrap();
        assert!(effects.contains(&Effect::TurnEnded {
            team: 0,
            reason: TurnEndReason::TimeUp,
            score: 0,
        }));
        assert_eq!(game.phase(), Phase::Idle { round: 1, team: 1 });
    }

    #[test]
    fn stale_ticks_are_ignored() {
        let (mut game, mut rng) = started(3);
        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();
        let old = game.epoch();
        game.handle(MatchEvent::EndTurn, &mut rng).unwrap();
        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();

        for _ in 0..10 {
            game.handle(MatchEvent::Tick { epoch: old }, &mut rng).unwrap();
        }
        assert_eq!(game.time_left(), 5);
        assert_eq!(game.phase(), Phase::Active { round: 1, team: 1 });
    }

    #[test]
    fn auto_advance_starts_second_turn() {
        let config = GameConfig {
            auto_advance_turns: true,
            ..config(1)
        };
        let mut game = Match::new(&config, WordPool::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        game.handle(MatchEvent::ConfirmSetup, &mut rng).unwrap();
        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();

        let effects = game.handle(MatchEvent::EndTurn, &mut rng).unwrap();
        assert_eq!(effects.last(), Some(&Effect::ArmTimer { epoch: game.epoch() }));
        assert_eq!(game.phase(), Phase::Active { round: 1, team: 1 });
    }

    #[test]
    fn round_commit_moves_scores_into_history() {
        let (mut game, mut rng) = started(3);
        let first_words = game.teams()[0].assigned.clone();

        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();
        guess_n(&mut game, &mut rng, 4);
        game.handle(MatchEvent::EndTurn, &mut rng).unwrap();
        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();
        guess_n(&mut game, &mut rng, 2);
        let effects = game.handle(MatchEvent::EndTurn, &mut rng).unwrap();

        assert!(effects.contains(&Effect::RoundCommitted { round: 1, next_round: Some(2) }));
        assert_eq!(game.phase(), Phase::Idle { round: 2, team: 0 });
        let [a, b] = game.teams();
        assert_eq!((a.round_scores.clone(), a.match_score, a.score), (vec![4], 4, 0));
        assert_eq!((b.round_scores.clone(), b.match_score, b.score), (vec![2], 2, 0));
        assert!(a.guessed.is_empty() && b.guessed.is_empty());
        assert_ne!(a.assigned, first_words);
        assert_invariants(&game);
    }

    #[test]
    fn tie_goes_to_first_team() {
        let (mut game, mut rng) = started(1);
        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();
        guess_n(&mut game, &mut rng, 3);
        game.handle(MatchEvent::EndTurn, &mut rng).unwrap();
        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();
        guess_n(&mut game, &mut rng, 3);
        let effects = game.handle(MatchEvent::EndTurn, &mut rng).unwrap();

        let Some(Effect::MatchFinished(result)) = effects.last() else {
            panic!("match should finish: {effects:?}");
        };
        assert_eq!(result.winner, "Team 1");
        assert_eq!(game.phase(), Phase::MatchComplete { winner: 0 });
    }

    #[test]
    fn reset_returns_to_setup_and_keeps_names() {
        let (mut game, mut rng) = new_match(3);
        game.handle(MatchEvent::SetTeamName { team: 0, name: "Owls".into() }, &mut rng)
            .unwrap();
        game.handle(MatchEvent::ConfirmSetup, &mut rng).unwrap();
        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();
        guess_n(&mut game, &mut rng, 2);
        let epoch = game.epoch();

        let effects = game.handle(MatchEvent::Reset, &mut rng).unwrap();

        assert_eq!(effects, vec![Effect::CancelTimer]);
        assert_eq!(game.phase(), Phase::Setup);
        assert_ne!(game.epoch(), epoch);
        assert_eq!(game.teams()[0].name, "Owls");
        assert!(game.teams().iter().all(|t| t.assigned.is_empty() && t.score == 0));
    }

    #[test]
    fn start_turn_repartitions_empty_lists() {
        let (mut game, mut rng) = started(3);
        game.teams[1].assigned.clear();
        game.handle(MatchEvent::StartTurn, &mut rng).unwrap();
        assert!(game.teams().iter().all(|t| t.assigned.len() == 10));
    }

    #[test]
    fn actions_out_of_phase_are_rejected() {
        let (mut game, mut rng) = new_match(3);
        assert!(game.handle(MatchEvent::StartTurn, &mut rng).is_err());
        assert!(game.handle(MatchEvent::EndTurn, &mut rng).is_err());
        assert!(
            game.handle(MatchEvent::Guess { word: "Meta".into() }, &mut rng)
                .is_err()
        );
        assert!(game.handle(MatchEvent::Tick { epoch: 0 }, &mut rng).unwrap().is_empty());
    }

    #[test]
    fn rejects_pool_smaller_than_two_lists() {
        let pool = WordPool::new(["a", "b", "c"]);
        assert!(Match::new(&GameConfig::default(), pool).is_err());
    }
}
