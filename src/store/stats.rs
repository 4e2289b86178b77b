/// Derived statistics over ball-event history
///
/// Everything here is a pure function of the events passed in; the
/// repository decides which events are in scope.
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::models::{BallEvent, BallOutcome, Match, MatchStatus, TeamSide, WICKETS_PER_INNINGS};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BattingStats {
    /// Innings batted (distinct matches with a ball faced)
    pub innings: u32,
    pub runs: u32,
    pub balls_faced: u32,
    pub fours: u32,
    pub sixes: u32,
    pub highest_score: u32,
    pub not_outs: u32,
    pub dismissals: u32,
    pub strike_rate: f64,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BowlingFigures {
    pub wickets: u32,
    pub runs: u32,
}

impl BowlingFigures {
    /// More wickets wins; equal wickets go to fewer runs
    pub fn is_better_than(&self, other: &BowlingFigures) -> bool {
        self.wickets > other.wickets || (self.wickets == other.wickets && self.runs < other.runs)
    }
}

impl std::fmt::Display for BowlingFigures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.wickets, self.runs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BowlingStats {
    pub innings: u32,
    pub balls_bowled: u32,
    pub runs_conceded: u32,
    pub wickets: u32,
    pub overs: f64,
    pub maidens: u32,
    pub economy: f64,
    pub average: f64,
    pub best_figures: Option<BowlingFigures>,
}

/// Cricket notation for balls bowled: 14 balls -> 2.2
///
/// The remainder is written as tenths, so this is not a true fraction of an
/// over. Economy is computed against this value.
pub fn overs_from_balls(balls: u32) -> f64 {
    (balls / 6) as f64 + (balls % 6) as f64 / 10.0
}

/// Aggregate batting stats for `player_id` over `events`
///
/// `events` must include every delivery of the matches in scope, not just the
/// player's own, so run-outs at the non-striker's end count as dismissals.
pub fn batting_stats<'a>(
    player_id: &str,
    events: impl IntoIterator<Item = &'a BallEvent>,
) -> BattingStats {
    let mut stats = BattingStats::default();
    let mut runs_per_match: BTreeMap<&'a str, u32> = BTreeMap::new();
    let mut dismissed_in: BTreeSet<&'a str> = BTreeSet::new();

    for event in events {
        if event.dismissed_player() == Some(player_id) {
            stats.dismissals += 1;
            dismissed_in.insert(event.match_id.as_str());
        }

        if event.batsman_id != player_id {
            continue;
        }

        *runs_per_match.entry(event.match_id.as_str()).or_insert(0) += event.runs;
        stats.runs += event.runs;
        if event.outcome != BallOutcome::Wide {
            stats.balls_faced += 1;
        }
        match event.runs {
            4 => stats.fours += 1,
            6 => stats.sixes += 1,
            _ => {}
        }
    }

    stats.innings = runs_per_match.len() as u32;
    stats.highest_score = runs_per_match.values().copied().max().unwrap_or(0);
    stats.not_outs = runs_per_match
        .keys()
        .filter(|match_id| !dismissed_in.contains(*match_id))
        .count() as u32;

    stats.strike_rate = if stats.balls_faced > 0 {
        stats.runs as f64 / stats.balls_faced as f64 * 100.0
    } else {
        0.0
    };
    stats.average = if stats.dismissals > 0 {
        stats.runs as f64 / stats.dismissals as f64
    } else {
        stats.runs as f64
    };

    stats
}

/// Aggregate bowling stats for `player_id` over `events`
pub fn bowling_stats<'a>(
    player_id: &str,
    events: impl IntoIterator<Item = &'a BallEvent>,
) -> BowlingStats {
    let mut stats = BowlingStats::default();
    let mut per_match: BTreeMap<&'a str, BowlingFigures> = BTreeMap::new();
    // (match, innings, over) -> (legal balls, runs conceded)
    let mut overs: HashMap<(&'a str, u8, u32), (u32, u32)> = HashMap::new();

    for event in events.into_iter().filter(|e| e.bowler_id == player_id) {
        let conceded = event.total_runs();
        stats.runs_conceded += conceded;
        if event.outcome.is_legal() {
            stats.balls_bowled += 1;
        }
        let wicket = event.is_bowler_wicket();
        if wicket {
            stats.wickets += 1;
        }

        let figures = per_match
            .entry(event.match_id.as_str())
            .or_insert(BowlingFigures { wickets: 0, runs: 0 });
        figures.runs += conceded;
        if wicket {
            figures.wickets += 1;
        }

        let over = overs
            .entry((event.match_id.as_str(), event.innings, event.over))
            .or_insert((0, 0));
        if event.outcome.is_legal() {
            over.0 += 1;
        }
        over.1 += conceded;
    }

    stats.innings = per_match.len() as u32;
    stats.maidens = overs
        .values()
        .filter(|(balls, runs)| *balls == 6 && *runs == 0)
        .count() as u32;
    stats.overs = overs_from_balls(stats.balls_bowled);
    stats.economy = if stats.overs > 0.0 {
        stats.runs_conceded as f64 / stats.overs
    } else {
        0.0
    };
    stats.average = if stats.wickets > 0 {
        stats.runs_conceded as f64 / stats.wickets as f64
    } else {
        0.0
    };
    stats.best_figures = per_match.values().fold(None, |best, figures| match best {
        Some(current) if !figures.is_better_than(&current) => Some(current),
        _ => Some(*figures),
    });

    stats
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Winner {
    TeamA,
    TeamB,
    Draw,
}

impl From<TeamSide> for Winner {
    fn from(side: TeamSide) -> Self {
        match side {
            TeamSide::TeamA => Winner::TeamA,
            TeamSide::TeamB => Winner::TeamB,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: String,
    pub status: MatchStatus,
    pub total_balls: u32,
    pub total_runs: u32,
    pub total_wickets: u32,
    pub team_a_score: u32,
    pub team_a_wickets: u32,
    pub team_b_score: u32,
    pub team_b_wickets: u32,
    /// Only set for completed matches
    pub winner: Option<Winner>,
    pub win_margin: Option<String>,
}

fn plural(n: u32, unit: &str) -> String {
    if n == 1 {
        format!("by 1 {}", unit)
    } else {
        format!("by {} {}s", n, unit)
    }
}

/// Result of a completed match from its running totals
///
/// The side batting first wins "by N runs"; a successful chase wins "by N
/// wickets" counted as wickets in hand.
pub fn decide_winner(m: &Match) -> (Winner, Option<String>) {
    let first = m.first_batting_side;
    let chasing = first.other();
    let first_score = m.score(first);
    let chasing_score = m.score(chasing);

    if first_score > chasing_score {
        (first.into(), Some(plural(first_score - chasing_score, "run")))
    } else if chasing_score > first_score {
        let in_hand = WICKETS_PER_INNINGS.saturating_sub(m.wickets(chasing));
        (chasing.into(), Some(plural(in_hand, "wicket")))
    } else {
        (Winner::Draw, None)
    }
}

pub fn match_summary<'a>(
    m: &Match,
    events: impl IntoIterator<Item = &'a BallEvent>,
) -> MatchSummary {
    let events: Vec<&BallEvent> = events.into_iter().collect();
    let (winner, win_margin) = if m.status == MatchStatus::Completed {
        let (winner, margin) = decide_winner(m);
        (Some(winner), margin)
    } else {
        (None, None)
    };

    MatchSummary {
        match_id: m.id.clone(),
        status: m.status,
        total_balls: events.len() as u32,
        total_runs: events.iter().map(|e| e.total_runs()).sum(),
        total_wickets: events.iter().filter(|e| e.is_wicket).count() as u32,
        team_a_score: m.team_a_score,
        team_a_wickets: m.team_a_wickets,
        team_b_score: m.team_b_score,
        team_b_wickets: m.team_b_wickets,
        winner,
        win_margin,
    }
}
