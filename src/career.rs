/// Career statistics and leaderboards
///
/// Career records are rebuilt in full from the player's ball-event history
/// on every update and cached by player id. The cache is persisted under
/// [`CAREER_KEY`] in the key-value store and reloaded by [`CareerEngine::load`].
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EntityKind, StoreError};
use crate::store::{BowlingFigures, MatchStore, CAREER_KEY};

pub const LEADERBOARD_SIZE: usize = 50;

/// Matches considered for the form rating
pub const FORM_MATCHES: usize = 5;

/// Cap on each half of the AI rating
const RATING_HALF_CAP: f64 = 500.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardCounts {
    pub mvp_awards: u32,
    pub fifties: u32,
    pub centuries: u32,
    pub five_wicket_hauls: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareerStats {
    pub player_id: String,
    pub name: String,
    pub team_id: Option<String>,
    pub matches: u32,
    pub runs: u32,
    pub balls_faced: u32,
    pub highest_score: u32,
    pub strike_rate: f64,
    pub batting_average: f64,
    pub wickets: u32,
    pub balls_bowled: u32,
    pub economy: f64,
    pub best_bowling: Option<BowlingFigures>,
    /// 0-1000, batting and bowling halves capped at 500 each
    pub ai_rating: f64,
    /// 0-100, recent matches only
    pub form_rating: f64,
    pub awards: AwardCounts,
    pub updated_at: DateTime<Utc>,
}

impl CareerStats {
    pub fn batting_rating(&self) -> f64 {
        (f64::from(self.runs) * 0.3 + self.strike_rate + self.batting_average * 2.0)
            .min(RATING_HALF_CAP)
    }

    pub fn bowling_rating(&self) -> f64 {
        if self.balls_bowled == 0 {
            return 0.0;
        }
        (f64::from(self.wickets) * 15.0 + (12.0 - self.economy).max(0.0) * 10.0)
            .min(RATING_HALF_CAP)
    }

    pub fn all_rounder_score(&self) -> f64 {
        f64::from(self.runs) + f64::from(self.wickets) * 20.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardCategory {
    Runs,
    Wickets,
    StrikeRate,
    Average,
    AiRating,
    MvpAwards,
}

impl LeaderboardCategory {
    pub const ALL: [LeaderboardCategory; 6] = [
        LeaderboardCategory::Runs,
        LeaderboardCategory::Wickets,
        LeaderboardCategory::StrikeRate,
        LeaderboardCategory::Average,
        LeaderboardCategory::AiRating,
        LeaderboardCategory::MvpAwards,
    ];

    pub fn value(&self, career: &CareerStats) -> f64 {
        match self {
            LeaderboardCategory::Runs => f64::from(career.runs),
            LeaderboardCategory::Wickets => f64::from(career.wickets),
            LeaderboardCategory::StrikeRate => career.strike_rate,
            LeaderboardCategory::Average => career.batting_average,
            LeaderboardCategory::AiRating => career.ai_rating,
            LeaderboardCategory::MvpAwards => f64::from(career.awards.mvp_awards),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardCategory::Runs => "Runs",
            LeaderboardCategory::Wickets => "Wickets",
            LeaderboardCategory::StrikeRate => "Strike rate",
            LeaderboardCategory::Average => "Average",
            LeaderboardCategory::AiRating => "AI rating",
            LeaderboardCategory::MvpAwards => "MVP awards",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub player_id: String,
    pub name: String,
    pub value: f64,
}

/// Four independent 1-based ranks over every known player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRanking {
    pub player_id: String,
    pub batting: usize,
    pub bowling: usize,
    pub all_rounder: usize,
    pub overall: usize,
    pub total_players: usize,
}

/// Per-match figures used for form and milestone counting
#[derive(Debug, Clone, Copy, Default)]
struct MatchLine {
    last_sequence: u64,
    runs: u32,
    wickets: u32,
}

pub struct CareerEngine {
    store: Arc<MatchStore>,
    careers: RwLock<BTreeMap<String, CareerStats>>,
}

impl CareerEngine {
    /// Engine with the persisted career records, empty when none were saved
    pub fn load(store: Arc<MatchStore>) -> Result<Self, StoreError> {
        let careers: BTreeMap<String, CareerStats> =
            store.kv().get(CAREER_KEY)?.unwrap_or_default();
        if !careers.is_empty() {
            info!("Loaded {} career records", careers.len());
        }
        Ok(Self {
            store,
            careers: RwLock::new(careers),
        })
    }

    pub fn get_career(&self, player_id: &str) -> Option<CareerStats> {
        self.careers.read().get(player_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.careers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.careers.read().is_empty()
    }

    /// Rebuild one player's record from the full event history
    pub fn update_player_career(&self, player_id: &str) -> Result<CareerStats, StoreError> {
        let player = self.store.update_player_stats(player_id)?;
        let batting = &player.batting_stats;
        let bowling = &player.bowling_stats;
        let lines = self.match_lines(player_id);

        let mut awards = AwardCounts {
            mvp_awards: self
                .get_career(player_id)
                .map_or(0, |c| c.awards.mvp_awards),
            ..Default::default()
        };
        for line in lines.values() {
            if line.runs >= 100 {
                awards.centuries += 1;
            } else if line.runs >= 50 {
                awards.fifties += 1;
            }
            if line.wickets >= 5 {
                awards.five_wicket_hauls += 1;
            }
        }

        let mut career = CareerStats {
            player_id: player.id.clone(),
            name: player.name.clone(),
            team_id: player.team_id.clone(),
            matches: lines.len() as u32,
            runs: batting.runs,
            balls_faced: batting.balls_faced,
            highest_score: batting.highest_score,
            strike_rate: batting.strike_rate,
            batting_average: batting.average,
            wickets: bowling.wickets,
            balls_bowled: bowling.balls_bowled,
            economy: bowling.economy,
            best_bowling: bowling.best_figures,
            ai_rating: 0.0,
            form_rating: form_rating(&lines),
            awards,
            updated_at: Utc::now(),
        };
        career.ai_rating = career.batting_rating() + career.bowling_rating();

        debug!(
            player_id,
            ai_rating = career.ai_rating,
            form = career.form_rating,
            "Updated career"
        );
        self.save_record(career.clone())?;
        Ok(career)
    }

    /// Rebuild every player's record; returns how many were updated
    pub fn update_all_careers(&self) -> Result<usize, StoreError> {
        let players = self.store.get_all_players();
        for player in &players {
            self.update_player_career(&player.id)?;
        }
        info!("Updated {} career records", players.len());
        Ok(players.len())
    }

    /// Top players for a category, highest first
    pub fn get_leaderboard(&self, category: LeaderboardCategory) -> Vec<LeaderboardEntry> {
        let careers = self.careers.read();
        let mut ranked: Vec<&CareerStats> = careers.values().collect();
        sort_by_key_desc(&mut ranked, |c| category.value(c));

        ranked
            .into_iter()
            .take(LEADERBOARD_SIZE)
            .enumerate()
            .map(|(i, career)| LeaderboardEntry {
                rank: i + 1,
                player_id: career.player_id.clone(),
                name: career.name.clone(),
                value: category.value(career),
            })
            .collect()
    }

    /// Ranks are positions in a full sort, so every rank 1..=N is used once
    pub fn get_player_ranking(&self, player_id: &str) -> Result<PlayerRanking, StoreError> {
        let careers = self.careers.read();
        if !careers.contains_key(player_id) {
            return Err(StoreError::not_found(EntityKind::Player, player_id));
        }
        let all: Vec<&CareerStats> = careers.values().collect();

        Ok(PlayerRanking {
            player_id: player_id.to_string(),
            batting: rank_of(&all, player_id, |c| c.batting_rating()),
            bowling: rank_of(&all, player_id, |c| c.bowling_rating()),
            all_rounder: rank_of(&all, player_id, CareerStats::all_rounder_score),
            overall: rank_of(&all, player_id, |c| c.ai_rating),
            total_players: all.len(),
        })
    }

    /// Count an MVP award; ratings are unaffected
    pub fn award_mvp(&self, player_id: &str) -> Result<CareerStats, StoreError> {
        let mut career = match self.get_career(player_id) {
            Some(career) => career,
            None => self.update_player_career(player_id)?,
        };
        career.awards.mvp_awards += 1;
        career.updated_at = Utc::now();
        info!(player_id, total = career.awards.mvp_awards, "MVP awarded");
        self.save_record(career.clone())?;
        Ok(career)
    }

    fn save_record(&self, career: CareerStats) -> Result<(), StoreError> {
        let mut careers = self.careers.write();
        careers.insert(career.player_id.clone(), career);
        self.store.kv().set(CAREER_KEY, &*careers)
    }

    /// Runs scored and wickets taken per match the player appeared in
    fn match_lines(&self, player_id: &str) -> HashMap<String, MatchLine> {
        let mut lines: HashMap<String, MatchLine> = HashMap::new();
        for event in self.store.events_for_batsman(player_id) {
            let line = lines.entry(event.match_id.clone()).or_default();
            line.runs += event.runs;
            line.last_sequence = line.last_sequence.max(event.sequence);
        }
        for event in self.store.events_for_bowler(player_id) {
            let line = lines.entry(event.match_id.clone()).or_default();
            if event.is_bowler_wicket() {
                line.wickets += 1;
            }
            line.last_sequence = line.last_sequence.max(event.sequence);
        }
        lines
    }
}

/// 0-100 from runs and wickets over the most recent matches
fn form_rating(lines: &HashMap<String, MatchLine>) -> f64 {
    let mut recent: Vec<&MatchLine> = lines.values().collect();
    recent.sort_by(|a, b| b.last_sequence.cmp(&a.last_sequence));
    let points: f64 = recent
        .into_iter()
        .take(FORM_MATCHES)
        .map(|line| f64::from(line.runs) * 0.5 + f64::from(line.wickets) * 10.0)
        .sum();
    points.clamp(0.0, 100.0)
}

/// Highest key first; equal keys fall back to player id
fn sort_by_key_desc(careers: &mut [&CareerStats], key: impl Fn(&CareerStats) -> f64) {
    careers.sort_by(|a, b| {
        key(b)
            .partial_cmp(&key(a))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.player_id.cmp(&b.player_id))
    });
}

fn rank_of(all: &[&CareerStats], player_id: &str, key: impl Fn(&CareerStats) -> f64) -> usize {
    let mut sorted = all.to_vec();
    sort_by_key_desc(&mut sorted, key);
    sorted
        .iter()
        .position(|c| c.player_id == player_id)
        .map_or(sorted.len(), |idx| idx + 1)
}
