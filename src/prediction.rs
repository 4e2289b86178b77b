/// Prediction engine
///
/// Heuristic, read-only estimates derived from ball-event history. Nothing
/// here is persisted and the store is never written; every call reads the
/// current history again.
///
/// Form scores are in `0.0..=1.0` and come from a player's most recent
/// deliveries. Probabilities are returned as percentages clamped to
/// `0.0..=100.0`.
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EntityKind, StoreError};
use crate::store::{BallEvent, BallOutcome, MatchStatus, MatchStore, Player, WicketType, Winner};

/// Deliveries considered for a player's recent form
pub const FORM_WINDOW: usize = 30;

/// Form used when a player has no history
const NEUTRAL_FORM: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BallPrediction {
    Dot,
    Single,
    Boundary,
    Wicket,
}

impl BallPrediction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BallPrediction::Dot => "dot ball",
            BallPrediction::Single => "single",
            BallPrediction::Boundary => "boundary",
            BallPrediction::Wicket => "wicket",
        }
    }
}

/// Percentages, each clamped independently; they need not sum to 100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeProbabilities {
    pub dot: f64,
    pub single: f64,
    pub boundary: f64,
    pub wicket: f64,
}

impl OutcomeProbabilities {
    /// Monotonic in form: a stronger batsman lowers dot/wicket and raises
    /// single/boundary, a stronger bowler does the opposite
    pub fn from_form(batsman_form: f64, bowler_form: f64) -> Self {
        let bat = batsman_form.clamp(0.0, 1.0);
        let bowl = bowler_form.clamp(0.0, 1.0);
        Self {
            dot: percent((0.35 - 0.2 * bat + 0.2 * bowl).clamp(0.05, 0.8)),
            single: percent((0.3 + 0.1 * bat - 0.05 * bowl).clamp(0.05, 0.6)),
            boundary: percent((0.08 + 0.25 * bat - 0.1 * bowl).clamp(0.01, 0.5)),
            wicket: percent((0.03 + 0.12 * bowl - 0.05 * bat).clamp(0.005, 0.3)),
        }
    }

    fn ranked(&self) -> [(BallPrediction, f64); 4] {
        [
            (BallPrediction::Dot, self.dot),
            (BallPrediction::Single, self.single),
            (BallPrediction::Boundary, self.boundary),
            (BallPrediction::Wicket, self.wicket),
        ]
    }

    pub fn most_likely(&self) -> (BallPrediction, f64) {
        self.ranked()
            .into_iter()
            .fold((BallPrediction::Dot, f64::MIN), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            })
    }

    /// Share of the top outcome in the total, as a percentage
    pub fn dominance(&self) -> f64 {
        let total: f64 = self.ranked().iter().map(|(_, p)| p).sum();
        if total <= 0.0 {
            return 0.0;
        }
        percent(self.most_likely().1 / total)
    }
}

fn percent(fraction: f64) -> f64 {
    (fraction * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextBallPrediction {
    pub outcome: BallPrediction,
    pub probabilities: OutcomeProbabilities,
    pub confidence: f64,
    pub batsman_form: f64,
    pub bowler_form: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WicketPrediction {
    pub probability: f64,
    /// Most frequent way this batsman has been dismissed
    pub likely_dismissal: Option<WicketType>,
    /// Dismissal counts, most frequent first
    pub dismissal_breakdown: Vec<(WicketType, u32)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryPrediction {
    pub probability: f64,
    /// Share of the batsman's boundaries that were sixes, as a percentage
    pub six_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinPrediction {
    pub match_id: String,
    pub team_a_probability: f64,
    pub team_b_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecommendation {
    pub player_id: String,
    pub name: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Zone {
    OffSide,
    Straight,
    LegSide,
}

impl Zone {
    /// Rough mapping from how a batsman got out to where the ball was
    fn for_dismissal(wicket_type: WicketType) -> Self {
        match wicket_type {
            WicketType::Caught => Zone::OffSide,
            WicketType::Bowled | WicketType::Lbw => Zone::Straight,
            WicketType::Stumped | WicketType::RunOut | WicketType::HitWicket => Zone::LegSide,
        }
    }
}

/// Approximate weakness per zone; there is no pitch-map data behind it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneWeakness {
    pub zone: Zone,
    pub vulnerability: f64,
}

pub struct PredictionEngine {
    store: Arc<MatchStore>,
}

impl PredictionEngine {
    pub fn new(store: Arc<MatchStore>) -> Self {
        Self { store }
    }

    pub fn predict_next_ball(
        &self,
        batsman_id: &str,
        bowler_id: &str,
    ) -> Result<NextBallPrediction, StoreError> {
        let (batsman_form, bowler_form) = self.forms(batsman_id, bowler_id)?;
        let probabilities = OutcomeProbabilities::from_form(batsman_form, bowler_form);
        let (outcome, _) = probabilities.most_likely();

        debug!(
            batsman_id,
            bowler_id,
            batsman_form,
            bowler_form,
            outcome = outcome.as_str(),
            "Next ball prediction"
        );
        Ok(NextBallPrediction {
            outcome,
            confidence: probabilities.dominance(),
            probabilities,
            batsman_form,
            bowler_form,
        })
    }

    pub fn predict_wicket(
        &self,
        batsman_id: &str,
        bowler_id: &str,
    ) -> Result<WicketPrediction, StoreError> {
        let (batsman_form, bowler_form) = self.forms(batsman_id, bowler_id)?;
        let probability = OutcomeProbabilities::from_form(batsman_form, bowler_form).wicket;

        let dismissal_breakdown = self.dismissal_breakdown(batsman_id);
        Ok(WicketPrediction {
            probability,
            likely_dismissal: dismissal_breakdown.first().map(|(kind, _)| *kind),
            dismissal_breakdown,
        })
    }

    pub fn predict_boundary(
        &self,
        batsman_id: &str,
        bowler_id: &str,
    ) -> Result<BoundaryPrediction, StoreError> {
        let (batsman_form, bowler_form) = self.forms(batsman_id, bowler_id)?;
        let probability = OutcomeProbabilities::from_form(batsman_form, bowler_form).boundary;

        let stats = self.store.calculate_batting_stats(batsman_id, None)?;
        let boundaries = stats.fours + stats.sixes;
        let six_share = if boundaries == 0 {
            0.0
        } else {
            percent(f64::from(stats.sixes) / f64::from(boundaries))
        };
        Ok(BoundaryPrediction {
            probability,
            six_share,
        })
    }

    /// Win split from current scores, discounted by wickets lost
    ///
    /// 50/50 before the first ball; a completed match reports its result.
    pub fn predict_winner(&self, match_id: &str) -> Result<WinPrediction, StoreError> {
        let m = self
            .store
            .get_match(match_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Match, match_id))?;

        let (a, b) = match m.status {
            MatchStatus::NotStarted | MatchStatus::Abandoned => (50.0, 50.0),
            MatchStatus::Completed => match self.store.get_match_summary(match_id)?.winner {
                Some(Winner::TeamA) => (100.0, 0.0),
                Some(Winner::TeamB) => (0.0, 100.0),
                _ => (50.0, 50.0),
            },
            MatchStatus::InProgress => {
                let effective = |score: u32, wickets: u32| {
                    f64::from(score) * (1.0 - f64::from(wickets.min(10)) / 10.0 * 0.5)
                };
                let a = effective(m.team_a_score, m.team_a_wickets);
                let b = effective(m.team_b_score, m.team_b_wickets);
                if a + b <= 0.0 {
                    (50.0, 50.0)
                } else {
                    let share = percent(a / (a + b));
                    (share, 100.0 - share)
                }
            }
        };

        Ok(WinPrediction {
            match_id: m.id,
            team_a_probability: a,
            team_b_probability: b,
        })
    }

    /// Team players ordered by batting record, best first
    pub fn best_batting_order(&self, team_id: &str) -> Result<Vec<PlayerRecommendation>, StoreError> {
        let players = self.team_players(team_id)?;
        let mut ranked = Vec::with_capacity(players.len());
        for player in players {
            let stats = self.store.calculate_batting_stats(&player.id, None)?;
            let score = stats.average * 0.5 + stats.strike_rate * 0.3 + f64::from(stats.runs) * 0.1;
            let reason = if stats.balls_faced == 0 {
                "No batting history".to_string()
            } else {
                format!(
                    "{} runs at {:.1}, strike rate {:.1}",
                    stats.runs, stats.average, stats.strike_rate
                )
            };
            ranked.push(recommend(player, score, reason));
        }
        sort_recommendations(&mut ranked);
        Ok(ranked)
    }

    /// Team players ordered by bowling record, best first
    pub fn best_bowling_option(
        &self,
        team_id: &str,
    ) -> Result<Vec<PlayerRecommendation>, StoreError> {
        let players = self.team_players(team_id)?;
        let mut ranked = Vec::with_capacity(players.len());
        for player in players {
            let stats = self.store.calculate_bowling_stats(&player.id, None)?;
            let (score, reason) = if stats.balls_bowled == 0 {
                (0.0, "No bowling history".to_string())
            } else {
                (
                    f64::from(stats.wickets) * 20.0 + (12.0 - stats.economy).max(0.0) * 5.0,
                    format!(
                        "{} wickets, economy {:.2} over {:.1} overs",
                        stats.wickets, stats.economy, stats.overs
                    ),
                )
            };
            ranked.push(recommend(player, score, reason));
        }
        sort_recommendations(&mut ranked);
        Ok(ranked)
    }

    /// Vulnerability per zone from overall dismissal rate, weighted by how the
    /// batsman usually gets out
    pub fn player_weak_zones(&self, player_id: &str) -> Result<Vec<ZoneWeakness>, StoreError> {
        let stats = self.store.calculate_batting_stats(player_id, None)?;
        let rate = if stats.balls_faced == 0 {
            0.0
        } else {
            f64::from(stats.dismissals) / f64::from(stats.balls_faced)
        };
        let base = percent(rate * 10.0);

        let breakdown = self.dismissal_breakdown(player_id);
        let total: u32 = breakdown.iter().map(|(_, n)| n).sum();
        let mut by_zone: HashMap<Zone, u32> = HashMap::new();
        for (kind, count) in &breakdown {
            *by_zone.entry(Zone::for_dismissal(*kind)).or_insert(0) += count;
        }

        let mut zones: Vec<ZoneWeakness> = [Zone::OffSide, Zone::Straight, Zone::LegSide]
            .into_iter()
            .map(|zone| {
                let share = if total == 0 {
                    1.0 / 3.0
                } else {
                    f64::from(by_zone.get(&zone).copied().unwrap_or(0)) / f64::from(total)
                };
                ZoneWeakness {
                    zone,
                    vulnerability: (base * (0.5 + share)).clamp(0.0, 100.0),
                }
            })
            .collect();
        zones.sort_by(|a, b| {
            b.vulnerability
                .partial_cmp(&a.vulnerability)
                .unwrap_or(Ordering::Equal)
        });
        Ok(zones)
    }

    fn forms(&self, batsman_id: &str, bowler_id: &str) -> Result<(f64, f64), StoreError> {
        self.require_player(batsman_id)?;
        self.require_player(bowler_id)?;
        Ok((self.batsman_form(batsman_id), self.bowler_form(bowler_id)))
    }

    /// Strike rate (60%), recent volume (20%) and staying in (20%)
    pub fn batsman_form(&self, player_id: &str) -> f64 {
        let events = self.store.events_for_batsman(player_id);
        let recent = last_n(&events, FORM_WINDOW);
        let faced: Vec<&BallEvent> = recent
            .iter()
            .filter(|e| e.outcome != BallOutcome::Wide)
            .collect();
        if faced.is_empty() {
            return NEUTRAL_FORM;
        }

        let balls = faced.len() as f64;
        let runs: u32 = faced.iter().map(|e| e.runs).sum();
        let dismissals = faced
            .iter()
            .filter(|e| e.dismissed_player() == Some(player_id))
            .count() as f64;

        let strike_rate = f64::from(runs) / balls * 100.0;
        (strike_rate / 200.0).min(1.0) * 0.6
            + (balls / FORM_WINDOW as f64).min(1.0) * 0.2
            + (1.0 - (dismissals / balls * 10.0).min(1.0)) * 0.2
    }

    /// Economy (50%), wicket rate (30%) and recent volume (20%)
    pub fn bowler_form(&self, player_id: &str) -> f64 {
        let events = self.store.events_for_bowler(player_id);
        let recent = last_n(&events, FORM_WINDOW);
        let legal = recent.iter().filter(|e| e.outcome.is_legal()).count();
        if legal == 0 {
            return NEUTRAL_FORM;
        }

        let balls = legal as f64;
        let conceded: u32 = recent.iter().map(|e| e.total_runs()).sum();
        let wickets = recent.iter().filter(|e| e.is_bowler_wicket()).count() as f64;

        let economy = f64::from(conceded) / balls * 6.0;
        (1.0 - (economy / 12.0).min(1.0)) * 0.5
            + (wickets / balls * 10.0).min(1.0) * 0.3
            + (balls / FORM_WINDOW as f64).min(1.0) * 0.2
    }

    /// How the player has been dismissed, most frequent first
    fn dismissal_breakdown(&self, player_id: &str) -> Vec<(WicketType, u32)> {
        let mut counts: HashMap<WicketType, u32> = HashMap::new();
        for m in self.store.get_all_matches() {
            for event in self.store.ball_events_for_match(&m.id) {
                if event.dismissed_player() == Some(player_id) {
                    if let Some(kind) = event.wicket_type {
                        *counts.entry(kind).or_insert(0) += 1;
                    }
                }
            }
        }
        let mut breakdown: Vec<(WicketType, u32)> = counts.into_iter().collect();
        breakdown.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        breakdown
    }

    fn require_player(&self, player_id: &str) -> Result<Player, StoreError> {
        self.store
            .get_player(player_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Player, player_id))
    }

    fn team_players(&self, team_id: &str) -> Result<Vec<Player>, StoreError> {
        let team = self
            .store
            .get_team(team_id)
            .ok_or_else(|| StoreError::not_found(EntityKind::Team, team_id))?;
        Ok(team
            .player_ids
            .iter()
            .filter_map(|id| self.store.get_player(id))
            .collect())
    }
}

fn last_n<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

fn recommend(player: Player, score: f64, reason: String) -> PlayerRecommendation {
    PlayerRecommendation {
        player_id: player.id,
        name: player.name,
        score,
        reason,
    }
}

fn sort_recommendations(ranked: &mut [PlayerRecommendation]) {
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        CreateMatchRequest, CreatePlayerRequest, CreateTeamRequest, LogBallEventRequest,
        PlayerRole,
    };

    struct Fixture {
        store: Arc<MatchStore>,
        engine: PredictionEngine,
        match_id: String,
        team_a: String,
        hitter: String,
        blocker: String,
        bowler: String,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MatchStore::in_memory());
        let player = |name: &str, role: PlayerRole| {
            store
                .create_player(CreatePlayerRequest::new(name, role))
                .unwrap()
                .id
        };
        let hitter = player("Hitter", PlayerRole::Batsman);
        let blocker = player("Blocker", PlayerRole::Batsman);
        let bowler = player("Spinner", PlayerRole::Bowler);

        let team_a = store
            .create_team(
                CreateTeamRequest::new("Strikers")
                    .with_players(vec![hitter.clone(), blocker.clone()]),
            )
            .unwrap()
            .id;
        let team_b = store
            .create_team(CreateTeamRequest::new("Titans").with_players(vec![bowler.clone()]))
            .unwrap()
            .id;
        let match_id = store
            .create_match(CreateMatchRequest::new(&team_a, &team_b))
            .unwrap()
            .id;

        Fixture {
            engine: PredictionEngine::new(Arc::clone(&store)),
            store,
            match_id,
            team_a,
            hitter,
            blocker,
            bowler,
        }
    }

    fn log(f: &Fixture, batsman: &str, runs: u32) {
        f.store
            .log_ball_event(LogBallEventRequest::new(&f.match_id, batsman, &f.bowler, runs))
            .unwrap();
    }

    #[test]
    fn test_probabilities_are_monotonic_in_form() {
        let weak = OutcomeProbabilities::from_form(0.1, 0.5);
        let strong = OutcomeProbabilities::from_form(0.9, 0.5);
        assert!(strong.boundary > weak.boundary);
        assert!(strong.single > weak.single);
        assert!(strong.dot < weak.dot);
        assert!(strong.wicket < weak.wicket);

        let tough = OutcomeProbabilities::from_form(0.5, 0.9);
        let easy = OutcomeProbabilities::from_form(0.5, 0.1);
        assert!(tough.wicket > easy.wicket);
        assert!(tough.dot > easy.dot);
    }

    #[test]
    fn test_probabilities_stay_in_range() {
        for bat in [-1.0, 0.0, 0.5, 1.0, 3.0] {
            for bowl in [-1.0, 0.0, 0.5, 1.0, 3.0] {
                let p = OutcomeProbabilities::from_form(bat, bowl);
                for value in [p.dot, p.single, p.boundary, p.wicket, p.dominance()] {
                    assert!((0.0..=100.0).contains(&value), "{} out of range", value);
                }
            }
        }
    }

    #[test]
    fn test_no_history_is_neutral() {
        let f = fixture();
        let prediction = f.engine.predict_next_ball(&f.hitter, &f.bowler).unwrap();
        assert_eq!(prediction.batsman_form, NEUTRAL_FORM);
        assert_eq!(prediction.bowler_form, NEUTRAL_FORM);
        assert_eq!(prediction.outcome, BallPrediction::Dot);
        assert!(prediction.confidence > 25.0);
    }

    #[test]
    fn test_hitter_in_form_predicts_more_boundaries() {
        let f = fixture();
        for _ in 0..12 {
            log(&f, &f.hitter, 6);
            log(&f, &f.blocker, 0);
        }
        let hitter = f.engine.predict_boundary(&f.hitter, &f.bowler).unwrap();
        let blocker = f.engine.predict_boundary(&f.blocker, &f.bowler).unwrap();
        assert!(hitter.probability > blocker.probability);
        assert_eq!(hitter.six_share, 100.0);
        assert_eq!(blocker.six_share, 0.0);
    }

    #[test]
    fn test_prediction_never_mutates_store() {
        let f = fixture();
        log(&f, &f.hitter, 4);
        let before = f.store.counts();
        let match_before = f.store.get_match(&f.match_id).unwrap();

        f.engine.predict_next_ball(&f.hitter, &f.bowler).unwrap();
        f.engine.predict_wicket(&f.hitter, &f.bowler).unwrap();
        f.engine.predict_winner(&f.match_id).unwrap();
        f.engine.best_batting_order(&f.team_a).unwrap();
        f.engine.player_weak_zones(&f.hitter).unwrap();

        assert_eq!(f.store.counts(), before);
        assert_eq!(f.store.get_match(&f.match_id).unwrap(), match_before);
    }

    #[test]
    fn test_wicket_breakdown_most_frequent_first() {
        let f = fixture();
        for wicket in [WicketType::Caught, WicketType::Bowled, WicketType::Caught] {
            f.store
                .log_ball_event(
                    LogBallEventRequest::new(&f.match_id, &f.hitter, &f.bowler, 0).wicket(wicket),
                )
                .unwrap();
        }
        let prediction = f.engine.predict_wicket(&f.hitter, &f.bowler).unwrap();
        assert_eq!(prediction.likely_dismissal, Some(WicketType::Caught));
        assert_eq!(
            prediction.dismissal_breakdown,
            vec![(WicketType::Caught, 2), (WicketType::Bowled, 1)]
        );

        let zones = f.engine.player_weak_zones(&f.hitter).unwrap();
        assert_eq!(zones[0].zone, Zone::OffSide);
        assert!(zones.iter().all(|z| (0.0..=100.0).contains(&z.vulnerability)));
    }

    #[test]
    fn test_winner_split() {
        let f = fixture();
        let before = f.engine.predict_winner(&f.match_id).unwrap();
        assert_eq!(before.team_a_probability, 50.0);
        assert_eq!(before.team_b_probability, 50.0);

        f.store.start_match(&f.match_id).unwrap();
        log(&f, &f.hitter, 4);
        let live = f.engine.predict_winner(&f.match_id).unwrap();
        assert_eq!(live.team_a_probability, 100.0);
        assert_eq!(live.team_b_probability, 0.0);

        assert!(f.engine.predict_winner("match_missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_batting_order_prefers_scorers() {
        let f = fixture();
        log(&f, &f.hitter, 6);
        log(&f, &f.hitter, 4);
        log(&f, &f.blocker, 0);

        let order = f.engine.best_batting_order(&f.team_a).unwrap();
        assert_eq!(order.len(), 2);
        assert_eq!(order[0].player_id, f.hitter);
        assert!(order[0].score > order[1].score);

        let bowling = f.engine.best_bowling_option(&f.team_a).unwrap();
        assert!(bowling.iter().all(|r| r.reason == "No bowling history"));
    }

    #[test]
    fn test_unknown_player_is_not_found() {
        let f = fixture();
        let err = f.engine.predict_next_ball("player_missing", &f.bowler).unwrap_err();
        assert!(err.is_not_found());
    }
}
