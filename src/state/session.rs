/// Match session
///
/// Explicit context for the live match: which engine scores it and who is
/// currently on strike / bowling. The frame loop holds an `Arc<MatchSession>`
/// instead of looking the match up through the current-match key.
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::ScoringError;
use crate::messaging::UpdateKind;
use crate::rules::CricketEvent;
use crate::scoring::{AppliedBall, LiveScore, LiveScoringEngine, ManualDelivery};

/// Players involved in the next delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineup {
    pub striker_id: String,
    pub non_striker_id: Option<String>,
    pub bowler_id: String,
}

impl Lineup {
    pub fn new(striker_id: impl Into<String>, bowler_id: impl Into<String>) -> Self {
        Self {
            striker_id: striker_id.into(),
            non_striker_id: None,
            bowler_id: bowler_id.into(),
        }
    }

    pub fn with_non_striker(mut self, player_id: impl Into<String>) -> Self {
        self.non_striker_id = Some(player_id.into());
        self
    }

    /// Returns false when there is no non-striker to swap with
    pub fn swap_strike(&mut self) -> bool {
        match self.non_striker_id.as_mut() {
            Some(non_striker) => {
                std::mem::swap(&mut self.striker_id, non_striker);
                true
            }
            None => false,
        }
    }
}

pub struct MatchSession {
    engine: Arc<LiveScoringEngine>,
    lineup: RwLock<Lineup>,
}

impl MatchSession {
    pub fn new(engine: Arc<LiveScoringEngine>, lineup: Lineup) -> Self {
        Self {
            engine,
            lineup: RwLock::new(lineup),
        }
    }

    pub fn engine(&self) -> &Arc<LiveScoringEngine> {
        &self.engine
    }

    pub fn match_id(&self) -> Option<String> {
        self.engine.live_match_id()
    }

    pub fn score(&self) -> Option<LiveScore> {
        self.engine.current_score()
    }

    pub fn lineup(&self) -> Lineup {
        self.lineup.read().clone()
    }

    /// New batsman after a wicket
    pub fn set_striker(&self, player_id: impl Into<String>) {
        self.lineup.write().striker_id = player_id.into();
    }

    pub fn set_non_striker(&self, player_id: Option<String>) {
        self.lineup.write().non_striker_id = player_id;
    }

    /// Change of bowler, usually at the end of an over
    pub fn set_bowler(&self, player_id: impl Into<String>) {
        self.lineup.write().bowler_id = player_id.into();
    }

    pub fn swap_strike(&self) -> bool {
        self.lineup.write().swap_strike()
    }

    /// Score a rule engine event for the current striker and bowler
    pub fn apply(&self, event: &CricketEvent) -> Result<AppliedBall, ScoringError> {
        let lineup = self.lineup();
        let applied = self
            .engine
            .process_event(event, &lineup.striker_id, &lineup.bowler_id)?;
        self.rotate_strike(&applied);
        Ok(applied)
    }

    pub fn record_manual(&self, delivery: ManualDelivery) -> Result<AppliedBall, ScoringError> {
        let lineup = self.lineup();
        let applied =
            self.engine
                .record_manual_ball(&lineup.striker_id, &lineup.bowler_id, delivery)?;
        self.rotate_strike(&applied);
        Ok(applied)
    }

    fn rotate_strike(&self, applied: &AppliedBall) {
        if applied.has(UpdateKind::InningsChange) || applied.has(UpdateKind::MatchEnd) {
            return;
        }
        // Odd runs and the end of an over each swap ends; both together cancel out
        let odd_runs = applied.event.runs % 2 == 1;
        let over_done = applied.has(UpdateKind::OverComplete);
        if odd_runs != over_done && self.swap_strike() {
            debug!(striker = %self.lineup.read().striker_id, "Strike rotated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::BoundaryType;
    use crate::scoring::ScoringOptions;
    use crate::store::{CreatePlayerRequest, CreateTeamRequest, MatchStore, PlayerRole};
    use std::time::Instant;

    fn session() -> (MatchSession, [String; 3]) {
        let store = Arc::new(MatchStore::in_memory());
        let mut ids = Vec::new();
        for (name, role) in [
            ("Opener One", PlayerRole::Batsman),
            ("Opener Two", PlayerRole::Batsman),
            ("Quick", PlayerRole::Bowler),
        ] {
            ids.push(store.create_player(CreatePlayerRequest::new(name, role)).unwrap().id);
        }
        let team_a = store
            .create_team(CreateTeamRequest::new("Strikers").with_players(ids[..2].to_vec()))
            .unwrap()
            .id;
        let team_b = store
            .create_team(CreateTeamRequest::new("Titans").with_players(vec![ids[2].clone()]))
            .unwrap()
            .id;

        let engine = Arc::new(LiveScoringEngine::new(store, ScoringOptions::default()));
        engine.start_match(&team_a, &team_b, 20).unwrap();
        let lineup = Lineup::new(&ids[0], &ids[2]).with_non_striker(&ids[1]);
        let ids: [String; 3] = [ids[0].clone(), ids[1].clone(), ids[2].clone()];
        (MatchSession::new(engine, lineup), ids)
    }

    #[test]
    fn test_lineup_swap() {
        let mut lineup = Lineup::new("a", "c");
        assert!(!lineup.swap_strike());
        let mut lineup_pair = lineup.clone().with_non_striker("b");
        assert!(lineup_pair.swap_strike());
        assert_eq!(lineup_pair.striker_id, "b");
        assert_eq!(lineup_pair.non_striker_id.as_deref(), Some("a"));
        lineup.non_striker_id = None;
        assert_eq!(lineup.striker_id, "a");
    }

    #[test]
    fn test_single_rotates_strike() {
        let (session, [a, b, _]) = session();
        let applied = session.record_manual(ManualDelivery::runs(1)).unwrap();
        assert_eq!(applied.event.batsman_id, a);
        assert_eq!(session.lineup().striker_id, b);

        session.record_manual(ManualDelivery::runs(2)).unwrap();
        assert_eq!(session.lineup().striker_id, b);
    }

    #[test]
    fn test_boundary_credits_striker() {
        let (session, [a, _, bowler]) = session();
        let four = CricketEvent::Scoring {
            runs: 4,
            boundary_type: BoundaryType::Four,
            confidence: 0.8,
            timestamp: Instant::now(),
        };
        let applied = session.apply(&four).unwrap();
        assert_eq!(applied.event.batsman_id, a);
        assert_eq!(applied.event.bowler_id, bowler);
        assert_eq!(session.lineup().striker_id, a);
        assert_eq!(session.score().unwrap().team_a_score, 4);
        assert!(session.match_id().is_some());
    }

    #[test]
    fn test_over_end_rotates_strike() {
        let (session, [a, b, _]) = session();
        for _ in 0..5 {
            session.record_manual(ManualDelivery::runs(0)).unwrap();
        }
        assert_eq!(session.lineup().striker_id, a);
        session.record_manual(ManualDelivery::runs(0)).unwrap();
        assert_eq!(session.lineup().striker_id, b);

        session.set_bowler("someone-else");
        assert_eq!(session.lineup().bowler_id, "someone-else");
    }
}
