/// Live scoring engine
///
/// Owns the live-match lifecycle (idle -> live -> ended), turns rule engine
/// events and manual entries into stored deliveries, and publishes the
/// resulting `LiveScore` snapshots and discrete `ScoreUpdate`s.
///
/// Every mutation goes through one lock, so deliveries are applied one at a
/// time in arrival order and notifications fire only after the store write.
use std::sync::Arc;

use chrono::Utc;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::live_score::LiveScore;
use crate::config::Preferences;
use crate::error::{EntityKind, ScoringError, StoreError};
use crate::messaging::{EventBus, ScoreUpdate, Subscription, UpdateKind};
use crate::rules::CricketEvent;
use crate::store::{
    BallEvent, BallOutcome, CameraMetadata, CreateMatchRequest, EventMetadata, LogBallEventRequest,
    ManualMetadata, Match, MatchStore, MatchSummary, WicketType, Winner, LIVE_SCORE_KEY,
    WICKETS_PER_INNINGS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Live,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringOptions {
    /// Persist the live snapshot after every mutation
    pub autosave: bool,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self { autosave: true }
    }
}

impl From<&Preferences> for ScoringOptions {
    fn from(prefs: &Preferences) -> Self {
        Self {
            autosave: prefs.autosave_enabled(),
        }
    }
}

/// Why an innings finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InningsEnd {
    AllOut,
    OversComplete,
    TargetReached,
}

impl InningsEnd {
    /// End condition for the batting side of `m`, if any
    pub fn check(m: &Match) -> Option<Self> {
        let batting = m.batting_side;
        if m.current_innings >= 2 && m.score(batting) > m.score(batting.other()) {
            return Some(InningsEnd::TargetReached);
        }
        if m.wickets(batting) >= WICKETS_PER_INNINGS {
            return Some(InningsEnd::AllOut);
        }
        if m.current_over >= m.total_overs {
            return Some(InningsEnd::OversComplete);
        }
        None
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InningsEnd::AllOut => "all out",
            InningsEnd::OversComplete => "overs complete",
            InningsEnd::TargetReached => "target reached",
        }
    }
}

/// A delivery entered by hand (extras, run-outs, corrections)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualDelivery {
    pub runs: u32,
    pub extras: u32,
    pub outcome: Option<BallOutcome>,
    pub wicket_type: Option<WicketType>,
    pub dismissed_player_id: Option<String>,
    pub fielder_ids: Vec<String>,
    pub note: Option<String>,
}

impl ManualDelivery {
    pub fn runs(runs: u32) -> Self {
        Self {
            runs,
            ..Default::default()
        }
    }

    pub fn wide(extras: u32) -> Self {
        Self {
            extras: extras.max(1),
            outcome: Some(BallOutcome::Wide),
            ..Default::default()
        }
    }

    /// No-ball with runs off the bat; the one-run penalty is added
    pub fn no_ball(runs: u32) -> Self {
        Self {
            runs,
            extras: 1,
            outcome: Some(BallOutcome::NoBall),
            ..Default::default()
        }
    }

    pub fn byes(extras: u32) -> Self {
        Self {
            extras,
            outcome: Some(BallOutcome::Bye),
            ..Default::default()
        }
    }

    pub fn wicket(wicket_type: WicketType) -> Self {
        Self {
            wicket_type: Some(wicket_type),
            outcome: Some(BallOutcome::Wicket),
            ..Default::default()
        }
    }

    pub fn dismissing(mut self, player_id: impl Into<String>) -> Self {
        self.dismissed_player_id = Some(player_id.into());
        self
    }

    pub fn with_fielders(mut self, fielder_ids: Vec<String>) -> Self {
        self.fielder_ids = fielder_ids;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Result of applying one delivery
#[derive(Debug, Clone)]
pub struct AppliedBall {
    pub event: BallEvent,
    pub updates: Vec<ScoreUpdate>,
    pub score: LiveScore,
}

impl AppliedBall {
    pub fn has(&self, kind: UpdateKind) -> bool {
        self.updates.iter().any(|u| u.kind == kind)
    }
}

struct EngineState {
    phase: EnginePhase,
    score: Option<LiveScore>,
}

pub struct LiveScoringEngine {
    store: Arc<MatchStore>,
    state: Mutex<EngineState>,
    scores: EventBus<LiveScore>,
    updates: EventBus<ScoreUpdate>,
    options: ScoringOptions,
}

impl LiveScoringEngine {
    pub fn new(store: Arc<MatchStore>, options: ScoringOptions) -> Self {
        Self {
            store,
            state: Mutex::new(EngineState {
                phase: EnginePhase::Idle,
                score: None,
            }),
            scores: EventBus::new(),
            updates: EventBus::new(),
            options,
        }
    }

    pub fn store(&self) -> &Arc<MatchStore> {
        &self.store
    }

    pub fn phase(&self) -> EnginePhase {
        self.state.lock().phase
    }

    pub fn current_score(&self) -> Option<LiveScore> {
        self.state.lock().score.clone()
    }

    pub fn live_match_id(&self) -> Option<String> {
        let state = self.state.lock();
        match state.phase {
            EnginePhase::Live => state.score.as_ref().map(|s| s.match_id.clone()),
            _ => None,
        }
    }

    /// Full snapshots, fired after every state-affecting operation
    pub fn subscribe_scores(&self) -> (Receiver<LiveScore>, Subscription<LiveScore>) {
        self.scores.subscribe()
    }

    /// Discrete RUNS / WICKET / OVER_COMPLETE / INNINGS_CHANGE / MATCH_END
    pub fn subscribe_updates(&self) -> (Receiver<ScoreUpdate>, Subscription<ScoreUpdate>) {
        self.updates.subscribe()
    }

    pub fn start_match(
        &self,
        team_a_id: &str,
        team_b_id: &str,
        total_overs: u32,
    ) -> Result<LiveScore, ScoringError> {
        self.start_match_with(CreateMatchRequest::new(team_a_id, team_b_id).overs(total_overs))
    }

    /// Create, start and go live with a new match
    pub fn start_match_with(&self, request: CreateMatchRequest) -> Result<LiveScore, ScoringError> {
        let mut state = self.state.lock();
        if let (EnginePhase::Live, Some(score)) = (state.phase, &state.score) {
            return Err(ScoringError::MatchAlreadyLive(score.match_id.clone()));
        }

        let created = self.store.create_match(request)?;
        let m = self.store.start_match(&created.id)?;
        self.store.set_current_match(Some(&m.id))?;

        let mut score = LiveScore::from_match(&m);
        score.last_event = Some("Match started".to_string());
        state.phase = EnginePhase::Live;
        state.score = Some(score.clone());

        self.persist(&score)?;
        self.scores.publish(score.clone());
        info!(match_id = %m.id, total_overs = m.total_overs, "Match is live");
        Ok(score)
    }

    /// Pick up the in-progress match the current-match pointer refers to
    pub fn resume(&self) -> Result<Option<LiveScore>, ScoringError> {
        let mut state = self.state.lock();
        if state.phase == EnginePhase::Live {
            return Ok(state.score.clone());
        }

        let Some(m) = self.store.current_match()? else {
            return Ok(None);
        };
        if !m.is_live() {
            debug!(match_id = %m.id, status = ?m.status, "Current match is not live; nothing to resume");
            return Ok(None);
        }

        let saved: Option<LiveScore> = self.store.kv().get(LIVE_SCORE_KEY)?;
        let mut score = match saved {
            Some(saved) if saved.match_id == m.id => saved,
            _ => LiveScore::from_match(&m),
        };
        // The store is the source of truth; the snapshot may be behind
        score.refresh(&m);

        state.phase = EnginePhase::Live;
        state.score = Some(score.clone());
        self.scores.publish(score.clone());
        info!(match_id = %m.id, score = %score.headline(), "Resumed live match");
        Ok(Some(score))
    }

    /// Apply a rule engine event to the live match
    pub fn process_event(
        &self,
        event: &CricketEvent,
        batsman_id: &str,
        bowler_id: &str,
    ) -> Result<AppliedBall, ScoringError> {
        let mut state = self.state.lock();
        let match_id = Self::require_live(&state)?;

        let request = match event {
            CricketEvent::Scoring {
                runs,
                boundary_type,
                confidence,
                ..
            } => {
                let rule = match boundary_type.runs() {
                    6 => "six",
                    _ => "four",
                };
                LogBallEventRequest::new(&match_id, batsman_id, bowler_id, *runs)
                    .metadata(EventMetadata::Camera(CameraMetadata::new(rule, *confidence)))
            }
            CricketEvent::Dismissal {
                dismissal_type,
                fielder_ids,
                confidence,
                ..
            } => LogBallEventRequest::new(&match_id, batsman_id, bowler_id, 0)
                .wicket((*dismissal_type).into())
                .fielders(fielder_ids.clone())
                .metadata(EventMetadata::Camera(CameraMetadata::new(
                    dismissal_type.as_str(),
                    *confidence,
                ))),
        };

        self.apply(&mut state, request, Some(event.description()))
    }

    /// Apply a hand-entered delivery through the same path as camera events
    pub fn record_manual_ball(
        &self,
        batsman_id: &str,
        bowler_id: &str,
        delivery: ManualDelivery,
    ) -> Result<AppliedBall, ScoringError> {
        let mut state = self.state.lock();
        let match_id = Self::require_live(&state)?;

        let mut metadata = ManualMetadata::new();
        metadata.note = delivery.note;
        let mut request = LogBallEventRequest::new(&match_id, batsman_id, bowler_id, delivery.runs)
            .extras(delivery.extras)
            .fielders(delivery.fielder_ids)
            .metadata(EventMetadata::Manual(metadata));
        request.outcome = delivery.outcome;
        if let Some(wicket_type) = delivery.wicket_type {
            request = request.wicket(wicket_type);
        }
        request.dismissed_player_id = delivery.dismissed_player_id;

        self.apply(&mut state, request, None)
    }

    /// Complete the live match and announce the result
    pub fn end_match(&self) -> Result<MatchSummary, ScoringError> {
        let mut state = self.state.lock();
        let match_id = Self::require_live(&state)?;

        let m = self.store.end_match(&match_id)?;
        let summary = self.store.get_match_summary(&match_id)?;
        let text = self.result_text(&m, &summary);
        self.close(&mut state, &m, text)?;
        Ok(summary)
    }

    /// Stop the live match without a result
    pub fn abandon_match(&self) -> Result<Match, ScoringError> {
        let mut state = self.state.lock();
        let match_id = Self::require_live(&state)?;

        let m = self.store.abandon_match(&match_id)?;
        self.close(&mut state, &m, "Match abandoned".to_string())?;
        Ok(m)
    }

    fn require_live(state: &EngineState) -> Result<String, ScoringError> {
        match (state.phase, &state.score) {
            (EnginePhase::Live, Some(score)) => Ok(score.match_id.clone()),
            _ => Err(ScoringError::NoLiveMatch),
        }
    }

    fn load_match(&self, match_id: &str) -> Result<Match, ScoringError> {
        self.store
            .get_match(match_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Match, match_id).into())
    }

    fn apply(
        &self,
        state: &mut EngineState,
        request: LogBallEventRequest,
        description: Option<String>,
    ) -> Result<AppliedBall, ScoringError> {
        let match_id = request.match_id.clone();
        let before = self.load_match(&match_id)?;
        if !before.is_live() {
            return Err(ScoringError::MatchNotInProgress(match_id));
        }

        let event = self.store.log_ball_event(request)?;
        let mut m = self.load_match(&match_id)?;
        let description = description.unwrap_or_else(|| event.description());

        let mut updates = Vec::new();
        if event.total_runs() > 0 {
            updates.push(make_update(UpdateKind::Runs, &m, event.total_runs(), &description));
        }
        if event.is_wicket {
            updates.push(make_update(UpdateKind::Wicket, &m, 0, &description));
        }
        if m.current_innings == before.current_innings && m.current_over > before.current_over {
            let text = format!("End of over {}", m.current_over);
            updates.push(make_update(UpdateKind::OverComplete, &m, 0, &text));
        }

        let mut last_event = description;
        if let Some(reason) = InningsEnd::check(&m) {
            if m.current_innings < 2 {
                m = self.store.switch_innings(&match_id)?;
                let target = m.score(m.first_batting_side) + 1;
                let text = format!(
                    "Innings break ({}): {} need {} to win",
                    reason.as_str(),
                    self.team_name(m.batting_team_id()),
                    target
                );
                updates.push(make_update(UpdateKind::InningsChange, &m, 0, &text));
                last_event = text;
            } else {
                m = self.store.end_match(&match_id)?;
                let summary = self.store.get_match_summary(&match_id)?;
                let text = self.result_text(&m, &summary);
                self.store.set_current_match(None)?;
                state.phase = EnginePhase::Ended;
                updates.push(make_update(UpdateKind::MatchEnd, &m, 0, &text));
                last_event = text;
                info!(match_id = %m.id, reason = reason.as_str(), "Match completed");
            }
        }

        let score = state.score.get_or_insert_with(|| LiveScore::from_match(&m));
        score.refresh(&m);
        score.last_event = Some(last_event);
        let score = score.clone();

        self.persist(&score)?;
        self.scores.publish(score.clone());
        for update in &updates {
            self.updates.publish(update.clone());
        }

        debug!(
            match_id = %m.id,
            score = %score.headline(),
            updates = updates.len(),
            "Applied delivery"
        );
        Ok(AppliedBall {
            event,
            updates,
            score,
        })
    }

    fn close(&self, state: &mut EngineState, m: &Match, text: String) -> Result<(), ScoringError> {
        self.store.set_current_match(None)?;
        state.phase = EnginePhase::Ended;

        let score = state.score.get_or_insert_with(|| LiveScore::from_match(m));
        score.refresh(m);
        score.last_event = Some(text.clone());
        let score = score.clone();

        self.persist(&score)?;
        self.scores.publish(score);
        self.updates
            .publish(make_update(UpdateKind::MatchEnd, m, 0, &text));
        info!(match_id = %m.id, status = ?m.status, "{}", text);
        Ok(())
    }

    fn persist(&self, score: &LiveScore) -> Result<(), ScoringError> {
        if self.options.autosave {
            self.store.kv().set(LIVE_SCORE_KEY, score)?;
        }
        Ok(())
    }

    fn team_name(&self, team_id: &str) -> String {
        match self.store.get_team(team_id) {
            Some(team) => team.name,
            None => {
                warn!(team_id, "Team missing from store");
                team_id.to_string()
            }
        }
    }

    fn result_text(&self, m: &Match, summary: &MatchSummary) -> String {
        let margin = summary.win_margin.clone().unwrap_or_default();
        match summary.winner {
            Some(Winner::TeamA) => format!("{} won {}", self.team_name(&m.team_a_id), margin),
            Some(Winner::TeamB) => format!("{} won {}", self.team_name(&m.team_b_id), margin),
            Some(Winner::Draw) => "Match drawn".to_string(),
            None => "Match ended".to_string(),
        }
    }
}

fn make_update(kind: UpdateKind, m: &Match, runs: u32, description: &str) -> ScoreUpdate {
    ScoreUpdate {
        kind,
        match_id: m.id.clone(),
        innings: m.current_innings,
        over: m.current_over,
        ball: m.current_ball,
        runs,
        description: description.to_string(),
        timestamp: Utc::now(),
    }
}
