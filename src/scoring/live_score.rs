use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Match;

/// Broadcast view of one match
///
/// A read-mostly projection of the stored `Match`. Only the scoring engine
/// writes it, and always from a freshly stored match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveScore {
    pub match_id: String,
    pub team_a_id: String,
    pub team_b_id: String,
    pub team_a_score: u32,
    pub team_a_wickets: u32,
    pub team_b_score: u32,
    pub team_b_wickets: u32,
    pub current_innings: u8,
    pub current_over: u32,
    pub current_ball: u32,
    pub total_overs: u32,
    pub batting_team_id: String,
    pub bowling_team_id: String,
    /// Runs needed to win, second innings only
    pub target: Option<u32>,
    pub last_event: Option<String>,
    pub is_live: bool,
    pub updated_at: DateTime<Utc>,
}

impl LiveScore {
    pub fn from_match(m: &Match) -> Self {
        let mut score = Self {
            match_id: m.id.clone(),
            team_a_id: m.team_a_id.clone(),
            team_b_id: m.team_b_id.clone(),
            team_a_score: 0,
            team_a_wickets: 0,
            team_b_score: 0,
            team_b_wickets: 0,
            current_innings: 1,
            current_over: 0,
            current_ball: 0,
            total_overs: m.total_overs,
            batting_team_id: String::new(),
            bowling_team_id: String::new(),
            target: None,
            last_event: None,
            is_live: false,
            updated_at: Utc::now(),
        };
        score.refresh(m);
        score
    }

    /// Copy the running totals from the stored match
    pub fn refresh(&mut self, m: &Match) {
        self.team_a_score = m.team_a_score;
        self.team_a_wickets = m.team_a_wickets;
        self.team_b_score = m.team_b_score;
        self.team_b_wickets = m.team_b_wickets;
        self.current_innings = m.current_innings;
        self.current_over = m.current_over;
        self.current_ball = m.current_ball;
        self.total_overs = m.total_overs;
        self.batting_team_id = m.batting_team_id().to_string();
        self.bowling_team_id = m.bowling_team_id().to_string();
        self.target = if m.current_innings >= 2 {
            Some(m.score(m.first_batting_side) + 1)
        } else {
            None
        };
        self.is_live = m.is_live();
        self.updated_at = Utc::now();
    }

    pub fn batting_score(&self) -> (u32, u32) {
        if self.batting_team_id == self.team_a_id {
            (self.team_a_score, self.team_a_wickets)
        } else {
            (self.team_b_score, self.team_b_wickets)
        }
    }

    /// "over.ball", e.g. "3.4"
    pub fn overs_display(&self) -> String {
        format!("{}.{}", self.current_over, self.current_ball)
    }

    pub fn runs_required(&self) -> Option<u32> {
        let (runs, _) = self.batting_score();
        self.target.map(|target| target.saturating_sub(runs))
    }

    /// One-line scoreboard, e.g. "45/2 (6.3 ov)"
    pub fn headline(&self) -> String {
        let (runs, wickets) = self.batting_score();
        let mut line = format!("{}/{} ({} ov)", runs, wickets, self.overs_display());
        if let Some(required) = self.runs_required() {
            line.push_str(&format!(", need {}", required));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MatchStatus, TeamSide, Venue};

    fn stored_match() -> Match {
        let now = Utc::now();
        Match {
            id: "match_1".to_string(),
            team_a_id: "team_a".to_string(),
            team_b_id: "team_b".to_string(),
            venue: Venue::default(),
            status: MatchStatus::InProgress,
            current_innings: 1,
            batting_side: TeamSide::TeamA,
            first_batting_side: TeamSide::TeamA,
            current_over: 6,
            current_ball: 3,
            team_a_score: 45,
            team_a_wickets: 2,
            team_b_score: 0,
            team_b_wickets: 0,
            total_overs: 20,
            score_stale: false,
            started_at: Some(now),
            ended_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_projection_of_first_innings() {
        let score = LiveScore::from_match(&stored_match());
        assert!(score.is_live);
        assert_eq!(score.batting_team_id, "team_a");
        assert_eq!(score.bowling_team_id, "team_b");
        assert_eq!(score.target, None);
        assert_eq!(score.headline(), "45/2 (6.3 ov)");
    }

    #[test]
    fn test_target_in_second_innings() {
        let mut m = stored_match();
        m.current_innings = 2;
        m.batting_side = TeamSide::TeamB;
        m.current_over = 1;
        m.current_ball = 0;
        m.team_b_score = 10;

        let score = LiveScore::from_match(&m);
        assert_eq!(score.target, Some(46));
        assert_eq!(score.runs_required(), Some(36));
        assert_eq!(score.headline(), "10/0 (1.0 ov), need 36");
    }

    #[test]
    fn test_snapshot_round_trips_through_json() {
        let score = LiveScore::from_match(&stored_match());
        let json = serde_json::to_string(&score).unwrap();
        let back: LiveScore = serde_json::from_str(&json).unwrap();
        assert_eq!(back, score);
    }
}
