use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::backend::{FileBackend, MemoryBackend, StorageBackend};
use super::collection::Collection;
use super::kv::{KeyValueStore, CURRENT_MATCH_KEY};
use super::models::*;
use super::stats::{self, BattingStats, BowlingStats, MatchSummary};
use crate::error::{EntityKind, StoreError};
use crate::slug;
use crate::utils::generate_id;

struct Tables {
    players: Collection<Player>,
    teams: Collection<Team>,
    matches: Collection<Match>,
    ball_events: Collection<BallEvent>,
    next_sequence: u64,
}

impl Tables {
    fn load(backend: &Arc<dyn StorageBackend>) -> Result<Self, StoreError> {
        let ball_events = Collection::<BallEvent>::load(backend.clone())?;
        let next_sequence = ball_events.all().map(|e| e.sequence + 1).max().unwrap_or(1);
        Ok(Self {
            players: Collection::load(backend.clone())?,
            teams: Collection::load(backend.clone())?,
            matches: Collection::load(backend.clone())?,
            ball_events,
            next_sequence,
        })
    }

    fn empty(backend: &Arc<dyn StorageBackend>) -> Self {
        Self {
            players: Collection::empty(backend.clone()),
            teams: Collection::empty(backend.clone()),
            matches: Collection::empty(backend.clone()),
            ball_events: Collection::empty(backend.clone()),
            next_sequence: 1,
        }
    }

    fn events_for_match(&self, match_id: &str) -> Vec<&BallEvent> {
        let mut events = self.ball_events.filter(|e| e.match_id == match_id);
        events.sort_by_key(|e| e.sequence);
        events
    }

    fn references_to_player(&self, player_id: &str) -> usize {
        self.ball_events
            .filter(|e| {
                e.batsman_id == player_id
                    || e.bowler_id == player_id
                    || e.dismissed_player_id.as_deref() == Some(player_id)
                    || e.fielder_ids.iter().any(|f| f == player_id)
            })
            .len()
    }

    /// Remove the player from whatever team currently lists them
    fn detach_player(&mut self, player_id: &str) -> Result<(), StoreError> {
        let mut player = self.players.require(player_id)?.clone();
        let Some(team_id) = player.team_id.take() else {
            return Ok(());
        };

        if let Some(team) = self.teams.get(&team_id) {
            let mut team = team.clone();
            team.player_ids.retain(|p| p != player_id);
            team.updated_at = Utc::now();
            self.teams.replace(team)?;
        }
        player.updated_at = Utc::now();
        self.players.replace(player)
    }

    /// Make `team_id` the player's only team
    fn attach_player(&mut self, team_id: &str, player_id: &str) -> Result<(), StoreError> {
        self.teams.require(team_id)?;
        let current = self.players.require(player_id)?.team_id.clone();
        if current.as_deref() != Some(team_id) {
            self.detach_player(player_id)?;
        }

        let mut team = self.teams.require(team_id)?.clone();
        if !team.has_player(player_id) {
            team.player_ids.push(player_id.to_string());
            team.updated_at = Utc::now();
            self.teams.replace(team)?;
        }

        let mut player = self.players.require(player_id)?.clone();
        if player.team_id.as_deref() != Some(team_id) {
            player.team_id = Some(team_id.to_string());
            player.updated_at = Utc::now();
            self.players.replace(player)?;
        }
        Ok(())
    }

    fn require_in_progress(&self, match_id: &str) -> Result<Match, StoreError> {
        let m = self.matches.require(match_id)?.clone();
        if m.status != MatchStatus::InProgress {
            return Err(StoreError::Invalid(format!(
                "match {} is {:?}, not in progress",
                match_id, m.status
            )));
        }
        Ok(m)
    }

    fn mark_stale(&mut self, match_id: &str) -> Result<(), StoreError> {
        if let Some(m) = self.matches.get(match_id) {
            if !m.score_stale {
                let mut m = m.clone();
                m.score_stale = true;
                m.updated_at = Utc::now();
                self.matches.replace(m)?;
            }
        }
        warn!(
            match_id,
            "Ball event changed after logging; match score is stale until recomputed"
        );
        Ok(())
    }
}

/// Record counts across all collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCounts {
    pub players: usize,
    pub teams: usize,
    pub matches: usize,
    pub ball_events: usize,
}

/// Durable store for players, teams, matches and ball events
///
/// The single source of truth for match state. All methods take `&self`;
/// writers serialise on an internal lock, so the store can be shared as
/// `Arc<MatchStore>` between the frame loop and manual-entry callers.
pub struct MatchStore {
    tables: RwLock<Tables>,
    kv: KeyValueStore,
}

impl MatchStore {
    pub fn open(backend: Arc<dyn StorageBackend>) -> Result<Self, StoreError> {
        let tables = Tables::load(&backend)?;
        info!(
            players = tables.players.count(),
            teams = tables.teams.count(),
            matches = tables.matches.count(),
            ball_events = tables.ball_events.count(),
            "Match store opened"
        );
        Ok(Self {
            tables: RwLock::new(tables),
            kv: KeyValueStore::new(backend),
        })
    }

    /// File-backed store under `dir`
    pub fn open_dir(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let backend = FileBackend::open(dir.as_ref())?;
        Self::open(Arc::new(backend))
    }

    /// Ephemeral store for tests and throwaway sessions
    pub fn in_memory() -> Self {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        Self {
            tables: RwLock::new(Tables::empty(&backend)),
            kv: KeyValueStore::new(backend),
        }
    }

    /// Key-value side store (current match pointer, preferences, live score)
    pub fn kv(&self) -> &KeyValueStore {
        &self.kv
    }

    pub fn counts(&self) -> StoreCounts {
        let t = self.tables.read();
        StoreCounts {
            players: t.players.count(),
            teams: t.teams.count(),
            matches: t.matches.count(),
            ball_events: t.ball_events.count(),
        }
    }

    /// Drop every record and the current match pointer
    pub fn clear_all(&self) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        t.ball_events.clear()?;
        t.matches.clear()?;
        t.teams.clear()?;
        t.players.clear()?;
        t.next_sequence = 1;
        self.kv.clear(CURRENT_MATCH_KEY)?;
        info!("Match store cleared");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    pub fn create_player(&self, request: CreatePlayerRequest) -> Result<Player, StoreError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("player name is empty".to_string()));
        }

        let mut t = self.tables.write();
        if let Some(team_id) = &request.team_id {
            t.teams.require(team_id)?;
        }

        let now = Utc::now();
        let player = Player {
            id: generate_id("player"),
            name: name.to_string(),
            role: request.role,
            team_id: None,
            batting_stats: BattingStats::default(),
            bowling_stats: BowlingStats::default(),
            created_at: now,
            updated_at: now,
        };
        let id = player.id.clone();
        t.players.insert(player)?;

        if let Some(team_id) = &request.team_id {
            t.attach_player(team_id, &id)?;
        }

        debug!(player_id = %id, "Created player");
        t.players.require(&id).cloned()
    }

    pub fn get_player(&self, id: &str) -> Option<Player> {
        self.tables.read().players.get(id).cloned()
    }

    pub fn get_all_players(&self) -> Vec<Player> {
        self.tables.read().players.all().cloned().collect()
    }

    pub fn players_by_team(&self, team_id: &str) -> Vec<Player> {
        let t = self.tables.read();
        match t.teams.get(team_id) {
            // Team order, not id order
            Some(team) => team
                .player_ids
                .iter()
                .filter_map(|id| t.players.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Case- and accent-insensitive name lookup
    pub fn find_player_by_name(&self, name: &str) -> Option<Player> {
        let key = slug::name_key(name);
        self.tables
            .read()
            .players
            .all()
            .find(|p| slug::name_key(&p.name) == key)
            .cloned()
    }

    /// Full-record replace; team membership follows `team_id`
    pub fn update_player(&self, player: Player) -> Result<Player, StoreError> {
        let mut t = self.tables.write();
        let existing = t.players.require(&player.id)?.clone();
        if let Some(team_id) = &player.team_id {
            t.teams.require(team_id)?;
        }

        let mut updated = player;
        updated.created_at = existing.created_at;
        updated.updated_at = Utc::now();
        let new_team = updated.team_id.clone();
        // Membership is applied below so both sides stay in sync
        updated.team_id = existing.team_id.clone();
        t.players.replace(updated)?;

        if new_team != existing.team_id {
            match &new_team {
                Some(team_id) => t.attach_player(team_id, &existing.id)?,
                None => t.detach_player(&existing.id)?,
            }
        }
        t.players.require(&existing.id).cloned()
    }

    /// Delete a player no ball event refers to
    pub fn delete_player(&self, id: &str) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        t.players.require(id)?;

        let references = t.references_to_player(id);
        if references > 0 {
            return Err(StoreError::InUse {
                entity: EntityKind::Player,
                id: id.to_string(),
                references,
            });
        }

        t.detach_player(id)?;
        t.players.remove(id)?;
        debug!(player_id = id, "Deleted player");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    pub fn create_team(&self, request: CreateTeamRequest) -> Result<Team, StoreError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(StoreError::Invalid("team name is empty".to_string()));
        }

        let mut t = self.tables.write();
        for player_id in &request.player_ids {
            t.players.require(player_id)?;
        }

        let now = Utc::now();
        let team = Team {
            id: generate_id("team"),
            name: name.to_string(),
            player_ids: Vec::new(),
            match_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let id = team.id.clone();
        t.teams.insert(team)?;

        for player_id in &request.player_ids {
            t.attach_player(&id, player_id)?;
        }

        debug!(team_id = %id, players = request.player_ids.len(), "Created team");
        t.teams.require(&id).cloned()
    }

    pub fn get_team(&self, id: &str) -> Option<Team> {
        self.tables.read().teams.get(id).cloned()
    }

    pub fn get_all_teams(&self) -> Vec<Team> {
        self.tables.read().teams.all().cloned().collect()
    }

    pub fn find_team_by_name(&self, name: &str) -> Option<Team> {
        self.tables
            .read()
            .teams
            .all()
            .find(|team| slug::same_name(&team.name, name))
            .cloned()
    }

    /// Full-record replace; listed players are attached, dropped ones detached
    pub fn update_team(&self, team: Team) -> Result<Team, StoreError> {
        let mut t = self.tables.write();
        let existing = t.teams.require(&team.id)?.clone();
        for player_id in &team.player_ids {
            t.players.require(player_id)?;
        }

        let mut updated = team;
        updated.created_at = existing.created_at;
        updated.updated_at = Utc::now();
        let wanted: Vec<String> = std::mem::take(&mut updated.player_ids);
        updated.player_ids = existing.player_ids.clone();
        t.teams.replace(updated)?;

        for player_id in existing.player_ids.iter().filter(|p| !wanted.contains(p)) {
            t.detach_player(player_id)?;
        }
        for player_id in &wanted {
            t.attach_player(&existing.id, player_id)?;
        }
        t.teams.require(&existing.id).cloned()
    }

    /// Delete a team that has played no matches; its players become free agents
    pub fn delete_team(&self, id: &str) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        let team = t.teams.require(id)?.clone();
        if !team.match_ids.is_empty() {
            return Err(StoreError::Invalid(format!(
                "team {} has {} match(es) and cannot be deleted",
                id,
                team.match_ids.len()
            )));
        }
        for player_id in &team.player_ids {
            t.detach_player(player_id)?;
        }
        t.teams.remove(id)?;
        debug!(team_id = id, "Deleted team");
        Ok(())
    }

    pub fn add_player_to_team(&self, team_id: &str, player_id: &str) -> Result<Team, StoreError> {
        let mut t = self.tables.write();
        t.attach_player(team_id, player_id)?;
        t.teams.require(team_id).cloned()
    }

    pub fn remove_player_from_team(
        &self,
        team_id: &str,
        player_id: &str,
    ) -> Result<Team, StoreError> {
        let mut t = self.tables.write();
        let team = t.teams.require(team_id)?;
        if !team.has_player(player_id) {
            return Err(StoreError::Invalid(format!(
                "player {} is not in team {}",
                player_id, team_id
            )));
        }
        t.detach_player(player_id)?;
        t.teams.require(team_id).cloned()
    }

    // ------------------------------------------------------------------
    // Matches
    // ------------------------------------------------------------------

    pub fn create_match(&self, request: CreateMatchRequest) -> Result<Match, StoreError> {
        if request.team_a_id == request.team_b_id {
            return Err(StoreError::Invalid(
                "a match needs two different teams".to_string(),
            ));
        }
        let total_overs = request.total_overs.unwrap_or(DEFAULT_TOTAL_OVERS);
        if total_overs == 0 {
            return Err(StoreError::Invalid("total overs must be at least 1".to_string()));
        }

        let mut t = self.tables.write();
        t.teams.require(&request.team_a_id)?;
        t.teams.require(&request.team_b_id)?;

        let now = Utc::now();
        let m = Match {
            id: generate_id("match"),
            team_a_id: request.team_a_id.clone(),
            team_b_id: request.team_b_id.clone(),
            venue: request.venue,
            status: MatchStatus::NotStarted,
            current_innings: 1,
            batting_side: TeamSide::TeamA,
            first_batting_side: TeamSide::TeamA,
            current_over: 0,
            current_ball: 0,
            team_a_score: 0,
            team_a_wickets: 0,
            team_b_score: 0,
            team_b_wickets: 0,
            total_overs,
            score_stale: false,
            started_at: None,
            ended_at: None,
            created_at: now,
            updated_at: now,
        };
        t.matches.insert(m.clone())?;

        let mut teams = Vec::with_capacity(2);
        for team_id in [&request.team_a_id, &request.team_b_id] {
            let mut team = t.teams.require(team_id)?.clone();
            team.match_ids.push(m.id.clone());
            team.updated_at = now;
            teams.push(team);
        }
        t.teams.replace_many(teams)?;

        info!(match_id = %m.id, total_overs, "Created match");
        Ok(m)
    }

    pub fn get_match(&self, id: &str) -> Option<Match> {
        self.tables.read().matches.get(id).cloned()
    }

    pub fn get_all_matches(&self) -> Vec<Match> {
        self.tables.read().matches.all().cloned().collect()
    }

    pub fn matches_by_status(&self, status: MatchStatus) -> Vec<Match> {
        self.tables
            .read()
            .matches
            .filter(|m| m.status == status)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn matches_by_team(&self, team_id: &str) -> Vec<Match> {
        self.tables
            .read()
            .matches
            .filter(|m| m.side_of(team_id).is_some())
            .into_iter()
            .cloned()
            .collect()
    }

    /// Full-record replace
    pub fn update_match(&self, m: Match) -> Result<Match, StoreError> {
        let mut t = self.tables.write();
        let existing = t.matches.require(&m.id)?;
        if existing.team_a_id != m.team_a_id || existing.team_b_id != m.team_b_id {
            return Err(StoreError::Invalid("match teams cannot change".to_string()));
        }
        if m.current_innings < existing.current_innings {
            return Err(StoreError::Invalid(
                "innings number cannot go backwards".to_string(),
            ));
        }

        let mut updated = m;
        updated.created_at = existing.created_at;
        updated.updated_at = Utc::now();
        t.matches.replace(updated.clone())?;
        Ok(updated)
    }

    /// Delete a match together with its ball events
    pub fn delete_match(&self, id: &str) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        let m = t.matches.require(id)?.clone();

        let removed = t.ball_events.remove_where(|e| e.match_id == id)?;
        let mut teams = Vec::with_capacity(2);
        for team_id in [&m.team_a_id, &m.team_b_id] {
            if let Some(team) = t.teams.get(team_id) {
                let mut team = team.clone();
                team.match_ids.retain(|mid| mid != id);
                teams.push(team);
            }
        }
        t.teams.replace_many(teams)?;
        t.matches.remove(id)?;
        drop(t);

        if self.current_match_id()?.as_deref() == Some(id) {
            self.kv.clear(CURRENT_MATCH_KEY)?;
        }
        info!(match_id = id, ball_events = removed, "Deleted match");
        Ok(())
    }

    /// NOT_STARTED -> IN_PROGRESS
    pub fn start_match(&self, id: &str) -> Result<Match, StoreError> {
        let mut t = self.tables.write();
        let mut m = t.matches.require(id)?.clone();
        if m.status != MatchStatus::NotStarted {
            return Err(StoreError::Invalid(format!(
                "match {} cannot start from {:?}",
                id, m.status
            )));
        }
        let now = Utc::now();
        m.status = MatchStatus::InProgress;
        m.started_at = Some(now);
        m.updated_at = now;
        t.matches.replace(m.clone())?;
        info!(match_id = id, "Match started");
        Ok(m)
    }

    /// Second innings: batting side flips and the over counters reset
    pub fn switch_innings(&self, id: &str) -> Result<Match, StoreError> {
        let mut t = self.tables.write();
        let mut m = t.require_in_progress(id)?;
        if m.current_innings >= 2 {
            return Err(StoreError::Invalid(format!(
                "match {} is already in its second innings",
                id
            )));
        }
        m.current_innings += 1;
        m.batting_side = m.batting_side.other();
        m.current_over = 0;
        m.current_ball = 0;
        m.updated_at = Utc::now();
        t.matches.replace(m.clone())?;
        info!(
            match_id = id,
            innings = m.current_innings,
            batting = m.batting_team_id(),
            "Innings switched"
        );
        Ok(m)
    }

    /// IN_PROGRESS -> COMPLETED
    pub fn end_match(&self, id: &str) -> Result<Match, StoreError> {
        self.finish_match(id, MatchStatus::Completed)
    }

    /// Any unfinished state -> ABANDONED
    pub fn abandon_match(&self, id: &str) -> Result<Match, StoreError> {
        self.finish_match(id, MatchStatus::Abandoned)
    }

    fn finish_match(&self, id: &str, status: MatchStatus) -> Result<Match, StoreError> {
        let mut t = self.tables.write();
        let mut m = t.matches.require(id)?.clone();
        let allowed = match status {
            MatchStatus::Completed => m.status == MatchStatus::InProgress,
            _ => !m.status.is_finished(),
        };
        if !allowed {
            return Err(StoreError::Invalid(format!(
                "match {} cannot move from {:?} to {:?}",
                id, m.status, status
            )));
        }
        let now = Utc::now();
        m.status = status;
        m.ended_at = Some(now);
        m.updated_at = now;
        t.matches.replace(m.clone())?;
        info!(match_id = id, status = ?status, "Match finished");
        Ok(m)
    }

    // ------------------------------------------------------------------
    // Current match pointer
    // ------------------------------------------------------------------

    pub fn set_current_match(&self, id: Option<&str>) -> Result<(), StoreError> {
        match id {
            Some(id) => {
                self.tables.read().matches.require(id)?;
                self.kv.set(CURRENT_MATCH_KEY, &id)
            }
            None => self.kv.clear(CURRENT_MATCH_KEY),
        }
    }

    pub fn current_match_id(&self) -> Result<Option<String>, StoreError> {
        self.kv.get(CURRENT_MATCH_KEY)
    }

    /// The match the pointer refers to, if it still exists
    pub fn current_match(&self) -> Result<Option<Match>, StoreError> {
        Ok(self
            .current_match_id()?
            .and_then(|id| self.get_match(&id)))
    }

    // ------------------------------------------------------------------
    // Ball events
    // ------------------------------------------------------------------

    /// Append a delivery and apply it to the match's running totals
    ///
    /// Innings, over and ball are stamped from the match's current counters.
    /// Counters advance only on legal deliveries.
    pub fn log_ball_event(&self, request: LogBallEventRequest) -> Result<BallEvent, StoreError> {
        let mut t = self.tables.write();
        let mut m = t.matches.require(&request.match_id)?.clone();
        if m.status.is_finished() {
            return Err(StoreError::Invalid(format!(
                "match {} is {:?}; no more deliveries",
                m.id, m.status
            )));
        }
        t.players.require(&request.batsman_id)?;
        t.players.require(&request.bowler_id)?;

        let outcome = request.resolved_outcome();
        let source = request.resolved_source();
        let is_wicket = request.is_wicket || outcome == BallOutcome::Wicket;

        let event = BallEvent {
            id: generate_id("ball"),
            sequence: t.next_sequence,
            match_id: m.id.clone(),
            innings: m.current_innings,
            over: m.current_over,
            ball: m.current_ball,
            batting_team_id: m.batting_team_id().to_string(),
            batsman_id: request.batsman_id,
            bowler_id: request.bowler_id,
            runs: request.runs,
            extras: request.extras,
            outcome,
            is_wicket,
            wicket_type: if is_wicket { request.wicket_type } else { None },
            dismissed_player_id: if is_wicket {
                request.dismissed_player_id
            } else {
                None
            },
            fielder_ids: request.fielder_ids,
            source,
            metadata: request.metadata,
            created_at: Utc::now(),
        };
        t.ball_events.insert(event.clone())?;

        m.add_to_side(m.batting_side, event.total_runs(), u32::from(is_wicket));
        if outcome.is_legal() {
            m.current_ball += 1;
            if m.current_ball >= BALLS_PER_OVER {
                m.current_ball = 0;
                m.current_over += 1;
            }
        }
        m.updated_at = Utc::now();
        if let Err(e) = t.matches.replace(m.clone()) {
            // Drop the delivery so a retry does not count it twice
            if let Err(undo) = t.ball_events.remove(&event.id) {
                warn!(ball_id = %event.id, error = %undo, "Failed to roll back ball event");
            }
            return Err(e);
        }
        t.next_sequence += 1;

        debug!(
            match_id = %m.id,
            over = %m.overs_display(),
            runs = event.total_runs(),
            wicket = is_wicket,
            source = ?source,
            "Logged ball event"
        );
        Ok(event)
    }

    pub fn get_ball_event(&self, id: &str) -> Option<BallEvent> {
        self.tables.read().ball_events.get(id).cloned()
    }

    /// Deliveries of one match in logging order
    pub fn ball_events_for_match(&self, match_id: &str) -> Vec<BallEvent> {
        self.tables
            .read()
            .events_for_match(match_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Deliveries faced by a batsman across all matches, in logging order
    pub fn events_for_batsman(&self, player_id: &str) -> Vec<BallEvent> {
        let t = self.tables.read();
        let mut events: Vec<BallEvent> = t
            .ball_events
            .filter(|e| e.batsman_id == player_id)
            .into_iter()
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence);
        events
    }

    /// Deliveries bowled by a bowler across all matches, in logging order
    pub fn events_for_bowler(&self, player_id: &str) -> Vec<BallEvent> {
        let t = self.tables.read();
        let mut events: Vec<BallEvent> = t
            .ball_events
            .filter(|e| e.bowler_id == player_id)
            .into_iter()
            .cloned()
            .collect();
        events.sort_by_key(|e| e.sequence);
        events
    }

    /// Manual correction of a logged delivery
    ///
    /// The match's running totals are NOT adjusted: the match is flagged
    /// `score_stale` until `recompute_match_score` runs.
    pub fn update_ball_event(&self, event: BallEvent) -> Result<BallEvent, StoreError> {
        let mut t = self.tables.write();
        let existing = t.ball_events.require(&event.id)?.clone();
        if existing.match_id != event.match_id {
            return Err(StoreError::Invalid(
                "a ball event cannot move to another match".to_string(),
            ));
        }
        t.players.require(&event.batsman_id)?;
        t.players.require(&event.bowler_id)?;

        let mut updated = event;
        updated.sequence = existing.sequence;
        updated.created_at = existing.created_at;
        t.ball_events.replace(updated.clone())?;
        t.mark_stale(&updated.match_id)?;
        Ok(updated)
    }

    /// Remove a logged delivery; flags the match score stale like an update
    pub fn delete_ball_event(&self, id: &str) -> Result<(), StoreError> {
        let mut t = self.tables.write();
        let removed = t.ball_events.remove(id)?;
        t.mark_stale(&removed.match_id)?;
        Ok(())
    }

    /// Rebuild scores, wickets and the current innings' counters from events
    pub fn recompute_match_score(&self, match_id: &str) -> Result<Match, StoreError> {
        let mut t = self.tables.write();
        let mut m = t.matches.require(match_id)?.clone();

        m.team_a_score = 0;
        m.team_a_wickets = 0;
        m.team_b_score = 0;
        m.team_b_wickets = 0;
        let mut legal_in_innings = 0u32;

        for event in t.events_for_match(match_id) {
            match m.side_of(&event.batting_team_id) {
                Some(side) => m.add_to_side(side, event.total_runs(), u32::from(event.is_wicket)),
                None => {
                    warn!(
                        match_id,
                        event_id = %event.id,
                        "Ball event names a team outside the match; skipped"
                    );
                    continue;
                }
            }
            if event.innings == m.current_innings && event.outcome.is_legal() {
                legal_in_innings += 1;
            }
        }

        m.current_over = legal_in_innings / BALLS_PER_OVER;
        m.current_ball = legal_in_innings % BALLS_PER_OVER;
        m.score_stale = false;
        m.updated_at = Utc::now();
        t.matches.replace(m.clone())?;

        info!(
            match_id,
            team_a = m.team_a_score,
            team_b = m.team_b_score,
            "Recomputed match score"
        );
        Ok(m)
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn calculate_batting_stats(
        &self,
        player_id: &str,
        match_id: Option<&str>,
    ) -> Result<BattingStats, StoreError> {
        let t = self.tables.read();
        t.players.require(player_id)?;
        let events = t
            .ball_events
            .filter(|e| match_id.map_or(true, |mid| e.match_id == mid));
        Ok(stats::batting_stats(player_id, events))
    }

    pub fn calculate_bowling_stats(
        &self,
        player_id: &str,
        match_id: Option<&str>,
    ) -> Result<BowlingStats, StoreError> {
        let t = self.tables.read();
        t.players.require(player_id)?;
        let events = t
            .ball_events
            .filter(|e| match_id.map_or(true, |mid| e.match_id == mid));
        Ok(stats::bowling_stats(player_id, events))
    }

    /// Recompute and persist both stat blocks from the full event history
    pub fn update_player_stats(&self, player_id: &str) -> Result<Player, StoreError> {
        let mut t = self.tables.write();
        let mut player = t.players.require(player_id)?.clone();
        player.batting_stats = stats::batting_stats(player_id, t.ball_events.all());
        player.bowling_stats = stats::bowling_stats(player_id, t.ball_events.all());
        player.updated_at = Utc::now();
        t.players.replace(player.clone())?;
        debug!(
            player_id,
            runs = player.batting_stats.runs,
            wickets = player.bowling_stats.wickets,
            "Updated player stats"
        );
        Ok(player)
    }

    pub fn get_match_summary(&self, match_id: &str) -> Result<MatchSummary, StoreError> {
        let t = self.tables.read();
        let m = t.matches.require(match_id)?;
        Ok(stats::match_summary(m, t.events_for_match(match_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::backend::FlakyBackend;

    struct Fixture {
        store: MatchStore,
        team_a: Team,
        team_b: Team,
        batsman: Player,
        bowler: Player,
    }

    fn fixture() -> Fixture {
        fixture_in(MatchStore::in_memory())
    }

    fn fixture_in(store: MatchStore) -> Fixture {
        let batsman = store
            .create_player(CreatePlayerRequest::new("Rohan Patel", PlayerRole::Batsman))
            .unwrap();
        let bowler = store
            .create_player(CreatePlayerRequest::new("Imran Khan", PlayerRole::Bowler))
            .unwrap();
        let team_a = store
            .create_team(CreateTeamRequest::new("Strikers").with_players(vec![batsman.id.clone()]))
            .unwrap();
        let team_b = store
            .create_team(CreateTeamRequest::new("Titans").with_players(vec![bowler.id.clone()]))
            .unwrap();
        Fixture {
            store,
            team_a,
            team_b,
            batsman,
            bowler,
        }
    }

    fn started_match(f: &Fixture) -> Match {
        let m = f
            .store
            .create_match(CreateMatchRequest::new(&f.team_a.id, &f.team_b.id).overs(2))
            .unwrap();
        f.store.start_match(&m.id).unwrap()
    }

    fn ball(f: &Fixture, match_id: &str, runs: u32) -> LogBallEventRequest {
        LogBallEventRequest::new(match_id, &f.batsman.id, &f.bowler.id, runs)
    }

    #[test]
    fn test_ids_are_prefixed_strings() {
        let f = fixture();
        assert!(f.batsman.id.starts_with("player_"));
        assert!(f.team_a.id.starts_with("team_"));
        let m = started_match(&f);
        assert!(m.id.starts_with("match_"));
    }

    #[test]
    fn test_team_membership_is_exclusive() {
        let f = fixture();
        let team_a = f.store.add_player_to_team(&f.team_a.id, &f.bowler.id).unwrap();
        assert!(team_a.has_player(&f.bowler.id));

        let team_b = f.store.get_team(&f.team_b.id).unwrap();
        assert!(!team_b.has_player(&f.bowler.id));
        assert_eq!(
            f.store.get_player(&f.bowler.id).unwrap().team_id.as_deref(),
            Some(f.team_a.id.as_str())
        );

        // Adding twice keeps the list free of duplicates
        let team_a = f.store.add_player_to_team(&f.team_a.id, &f.bowler.id).unwrap();
        assert_eq!(team_a.player_ids.len(), 2);
    }

    #[test]
    fn test_remove_player_clears_team_reference() {
        let f = fixture();
        let team = f
            .store
            .remove_player_from_team(&f.team_a.id, &f.batsman.id)
            .unwrap();
        assert!(team.player_ids.is_empty());
        assert_eq!(f.store.get_player(&f.batsman.id).unwrap().team_id, None);

        let err = f
            .store
            .remove_player_from_team(&f.team_a.id, &f.batsman.id)
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn test_find_player_by_name_ignores_case_and_accents() {
        let store = MatchStore::in_memory();
        let player = store
            .create_player(CreatePlayerRequest::new("José Buttler", PlayerRole::WicketKeeper))
            .unwrap();
        assert_eq!(store.find_player_by_name("jose  buttler").unwrap().id, player.id);
        assert!(store.find_player_by_name("Jos Butler").is_none());
    }

    #[test]
    fn test_create_player_with_unknown_team_fails() {
        let store = MatchStore::in_memory();
        let err = store
            .create_player(CreatePlayerRequest::new("Nobody", PlayerRole::Bowler).in_team("team_x"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.counts().players, 0);
    }

    #[test]
    fn test_update_missing_entities_is_not_found() {
        let f = fixture();
        let mut ghost = f.batsman.clone();
        ghost.id = "player_ghost".to_string();
        assert!(f.store.update_player(ghost).unwrap_err().is_not_found());

        let mut ghost_team = f.team_a.clone();
        ghost_team.id = "team_ghost".to_string();
        assert!(f.store.update_team(ghost_team).unwrap_err().is_not_found());

        let err = f
            .store
            .log_ball_event(LogBallEventRequest::new("match_ghost", &f.batsman.id, &f.bowler.id, 1))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_update_player_moves_team() {
        let f = fixture();
        let mut batsman = f.store.get_player(&f.batsman.id).unwrap();
        batsman.team_id = Some(f.team_b.id.clone());
        batsman.name = "Rohan P".to_string();
        let updated = f.store.update_player(batsman).unwrap();

        assert_eq!(updated.name, "Rohan P");
        assert!(f.store.get_team(&f.team_b.id).unwrap().has_player(&f.batsman.id));
        assert!(!f.store.get_team(&f.team_a.id).unwrap().has_player(&f.batsman.id));
    }

    #[test]
    fn test_log_ball_event_updates_score_and_counters() {
        let f = fixture();
        let m = started_match(&f);

        let event = f
            .store
            .log_ball_event(ball(&f, &m.id, 6).outcome(BallOutcome::Runs))
            .unwrap();
        assert_eq!((event.innings, event.over, event.ball), (1, 0, 0));
        assert_eq!(event.batting_team_id, f.team_a.id);
        assert_eq!(event.source, EventSource::Manual);

        let m = f.store.get_match(&m.id).unwrap();
        assert_eq!(m.team_a_score, 6);
        assert_eq!(m.current_ball, 1);
        assert_eq!(m.current_over, 0);
    }

    #[test]
    fn test_extras_do_not_advance_counters() {
        let f = fixture();
        let m = started_match(&f);
        f.store
            .log_ball_event(ball(&f, &m.id, 0).outcome(BallOutcome::Wide).extras(1))
            .unwrap();
        f.store
            .log_ball_event(ball(&f, &m.id, 2).outcome(BallOutcome::NoBall).extras(1))
            .unwrap();

        let m = f.store.get_match(&m.id).unwrap();
        assert_eq!(m.team_a_score, 4);
        assert_eq!((m.current_over, m.current_ball), (0, 0));
    }

    #[test]
    fn test_over_rolls_after_six_legal_balls() {
        let f = fixture();
        let m = started_match(&f);
        for _ in 0..6 {
            f.store.log_ball_event(ball(&f, &m.id, 1)).unwrap();
        }
        let m = f.store.get_match(&m.id).unwrap();
        assert_eq!((m.current_over, m.current_ball), (1, 0));
    }

    #[test]
    fn test_no_deliveries_after_completion() {
        let f = fixture();
        let m = started_match(&f);
        f.store.end_match(&m.id).unwrap();
        let err = f.store.log_ball_event(ball(&f, &m.id, 1)).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn test_player_referenced_by_events_cannot_be_deleted() {
        let f = fixture();
        let m = started_match(&f);
        f.store.log_ball_event(ball(&f, &m.id, 1)).unwrap();

        match f.store.delete_player(&f.batsman.id) {
            Err(StoreError::InUse { references, .. }) => assert_eq!(references, 1),
            other => panic!("Expected InUse, got {:?}", other),
        }

        let spare = f
            .store
            .create_player(CreatePlayerRequest::new("Spare", PlayerRole::AllRounder).in_team(&f.team_a.id))
            .unwrap();
        f.store.delete_player(&spare.id).unwrap();
        assert!(!f.store.get_team(&f.team_a.id).unwrap().has_player(&spare.id));
    }

    #[test]
    fn test_edit_flags_stale_until_recompute() {
        let f = fixture();
        let m = started_match(&f);
        let four = f.store.log_ball_event(ball(&f, &m.id, 4)).unwrap();
        f.store.log_ball_event(ball(&f, &m.id, 1)).unwrap();

        let mut corrected = four.clone();
        corrected.runs = 6;
        corrected.outcome = BallOutcome::Six;
        f.store.update_ball_event(corrected).unwrap();

        let stale = f.store.get_match(&m.id).unwrap();
        assert!(stale.score_stale);
        assert_eq!(stale.team_a_score, 5);

        let fresh = f.store.recompute_match_score(&m.id).unwrap();
        assert!(!fresh.score_stale);
        assert_eq!(fresh.team_a_score, 7);
        assert_eq!((fresh.current_over, fresh.current_ball), (0, 2));
    }

    #[test]
    fn test_delete_event_then_recompute() {
        let f = fixture();
        let m = started_match(&f);
        let wicket = f
            .store
            .log_ball_event(ball(&f, &m.id, 0).wicket(WicketType::Bowled))
            .unwrap();
        assert_eq!(f.store.get_match(&m.id).unwrap().team_a_wickets, 1);

        f.store.delete_ball_event(&wicket.id).unwrap();
        assert!(f.store.get_match(&m.id).unwrap().score_stale);

        let m = f.store.recompute_match_score(&m.id).unwrap();
        assert_eq!(m.team_a_wickets, 0);
        assert_eq!(m.current_ball, 0);
    }

    #[test]
    fn test_innings_switch_and_lifecycle() {
        let f = fixture();
        let m = f
            .store
            .create_match(CreateMatchRequest::new(&f.team_a.id, &f.team_b.id))
            .unwrap();
        assert_eq!(m.total_overs, DEFAULT_TOTAL_OVERS);
        assert!(f.store.switch_innings(&m.id).is_err());

        f.store.start_match(&m.id).unwrap();
        f.store.log_ball_event(ball(&f, &m.id, 1)).unwrap();
        let m = f.store.switch_innings(&m.id).unwrap();
        assert_eq!(m.current_innings, 2);
        assert_eq!(m.batting_side, TeamSide::TeamB);
        assert_eq!((m.current_over, m.current_ball), (0, 0));
        assert!(f.store.switch_innings(&m.id).is_err());

        let event = f.store.log_ball_event(ball(&f, &m.id, 2)).unwrap();
        assert_eq!(event.innings, 2);
        assert_eq!(event.batting_team_id, f.team_b.id);

        let m = f.store.end_match(&m.id).unwrap();
        assert_eq!(m.status, MatchStatus::Completed);
        assert!(m.ended_at.is_some());
        assert!(f.store.abandon_match(&m.id).is_err());
    }

    #[test]
    fn test_current_match_pointer() {
        let f = fixture();
        let m = started_match(&f);
        assert_eq!(f.store.current_match_id().unwrap(), None);
        assert!(f.store.set_current_match(Some("match_ghost")).unwrap_err().is_not_found());

        f.store.set_current_match(Some(&m.id)).unwrap();
        assert_eq!(f.store.current_match().unwrap().unwrap().id, m.id);

        f.store.delete_match(&m.id).unwrap();
        assert_eq!(f.store.current_match_id().unwrap(), None);
        assert!(f.store.get_team(&f.team_a.id).unwrap().match_ids.is_empty());
    }

    #[test]
    fn test_team_with_matches_cannot_be_deleted() {
        let f = fixture();
        started_match(&f);
        assert!(f.store.delete_team(&f.team_a.id).is_err());

        let empty = f.store.create_team(CreateTeamRequest::new("Empty")).unwrap();
        f.store.delete_team(&empty.id).unwrap();
        assert!(f.store.get_team(&empty.id).is_none());
    }

    #[test]
    fn test_update_player_stats_from_history() {
        let f = fixture();
        let m = started_match(&f);
        f.store.log_ball_event(ball(&f, &m.id, 4)).unwrap();
        f.store.log_ball_event(ball(&f, &m.id, 0)).unwrap();
        f.store
            .log_ball_event(ball(&f, &m.id, 0).wicket(WicketType::Caught))
            .unwrap();

        // Stats are only refreshed on request
        assert_eq!(f.store.get_player(&f.batsman.id).unwrap().batting_stats.runs, 0);

        let batsman = f.store.update_player_stats(&f.batsman.id).unwrap();
        assert_eq!(batsman.batting_stats.runs, 4);
        assert_eq!(batsman.batting_stats.balls_faced, 3);
        assert_eq!(batsman.batting_stats.dismissals, 1);

        let bowler = f.store.update_player_stats(&f.bowler.id).unwrap();
        assert_eq!(bowler.bowling_stats.wickets, 1);
        assert_eq!(bowler.bowling_stats.balls_bowled, 3);
        assert!((bowler.bowling_stats.overs - 0.3).abs() < 1e-9);

        let scoped = f
            .store
            .calculate_batting_stats(&f.batsman.id, Some("match_other"))
            .unwrap();
        assert_eq!(scoped.runs, 0);
        assert!(f
            .store
            .calculate_bowling_stats("player_ghost", None)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_events_sorted_in_logging_order() {
        let f = fixture();
        let m = started_match(&f);
        for runs in [1, 2, 3, 4] {
            f.store.log_ball_event(ball(&f, &m.id, runs)).unwrap();
        }
        let runs: Vec<u32> = f
            .store
            .ball_events_for_match(&m.id)
            .iter()
            .map(|e| e.runs)
            .collect();
        assert_eq!(runs, vec![1, 2, 3, 4]);
        assert_eq!(f.store.events_for_batsman(&f.batsman.id).len(), 4);
        assert_eq!(f.store.events_for_bowler(&f.batsman.id).len(), 0);
    }

    #[test]
    fn test_file_store_reload() {
        let dir = tempfile::tempdir().unwrap();
        let match_id;
        {
            let store = MatchStore::open_dir(dir.path()).unwrap();
            let a = store.create_team(CreateTeamRequest::new("A")).unwrap();
            let b = store.create_team(CreateTeamRequest::new("B")).unwrap();
            let bat = store
                .create_player(CreatePlayerRequest::new("Bat", PlayerRole::Batsman).in_team(&a.id))
                .unwrap();
            let bowl = store
                .create_player(CreatePlayerRequest::new("Bowl", PlayerRole::Bowler).in_team(&b.id))
                .unwrap();
            let m = store.create_match(CreateMatchRequest::new(&a.id, &b.id)).unwrap();
            store.start_match(&m.id).unwrap();
            store
                .log_ball_event(LogBallEventRequest::new(&m.id, &bat.id, &bowl.id, 4))
                .unwrap();
            store.set_current_match(Some(&m.id)).unwrap();
            match_id = m.id;
        }

        let store = MatchStore::open_dir(dir.path()).unwrap();
        let counts = store.counts();
        assert_eq!(
            counts,
            StoreCounts {
                players: 2,
                teams: 2,
                matches: 1,
                ball_events: 1
            }
        );
        assert_eq!(store.current_match_id().unwrap().as_deref(), Some(match_id.as_str()));
        assert_eq!(store.get_match(&match_id).unwrap().team_a_score, 4);

        // Sequence numbering continues after reload
        let m = store.get_match(&match_id).unwrap();
        let bat = store.find_player_by_name("bat").unwrap();
        let bowl = store.find_player_by_name("bowl").unwrap();
        let second = store
            .log_ball_event(LogBallEventRequest::new(&m.id, &bat.id, &bowl.id, 1))
            .unwrap();
        assert_eq!(second.sequence, 2);
    }

    #[test]
    fn test_clear_all() {
        let f = fixture();
        let m = started_match(&f);
        f.store.set_current_match(Some(&m.id)).unwrap();
        f.store.clear_all().unwrap();
        assert_eq!(
            f.store.counts(),
            StoreCounts {
                players: 0,
                teams: 0,
                matches: 0,
                ball_events: 0
            }
        );
        assert_eq!(f.store.current_match_id().unwrap(), None);
    }

    #[test]
    fn test_failed_score_write_does_not_keep_the_delivery() {
        let backend = Arc::new(FlakyBackend::default());
        let f = fixture_in(MatchStore::open(backend.clone()).unwrap());
        let m = started_match(&f);

        backend.fail_writes_to(Match::COLLECTION);
        assert!(f.store.log_ball_event(ball(&f, &m.id, 4)).is_err());
        assert!(f.store.ball_events_for_match(&m.id).is_empty());
        let unchanged = f.store.get_match(&m.id).unwrap();
        assert_eq!(unchanged.team_a_score, 0);
        assert_eq!(unchanged.current_ball, 0);

        backend.recover();
        let event = f.store.log_ball_event(ball(&f, &m.id, 4)).unwrap();
        assert_eq!(f.store.ball_events_for_match(&m.id).len(), 1);
        assert_eq!(f.store.get_match(&m.id).unwrap().team_a_score, 4);

        let reopened = MatchStore::open(backend).unwrap();
        let stored = reopened.ball_events_for_match(&m.id);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, event.id);
        assert_eq!(reopened.get_match(&m.id).unwrap().team_a_score, 4);
    }
}
