/// Messaging module
///
/// Publish/subscribe plumbing between the scoring engine, the frame loop and
/// whoever renders the score.
///
/// ## Architecture
///
/// ```text
/// ┌──────────────────┐  LiveScore   ┌──────────────────┐
/// │ LiveScoringEngine│ ───────────> │ EventBus<LiveScore>   ──> scoreboard
/// │                  │ ScoreUpdate  ├──────────────────┤
/// │                  │ ───────────> │ EventBus<ScoreUpdate> ──> ticker / alerts
/// └──────────────────┘              └──────────────────┘
/// ┌──────────────────┐ PipelineEvent
/// │    FrameLoop     │ ───────────> EventBus<PipelineEvent>
/// └──────────────────┘
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// let (rx, subscription) = engine.subscribe_updates();
/// while let Ok(update) = rx.recv() {
///     if update.kind == UpdateKind::MatchEnd {
///         break;
///     }
/// }
/// subscription.unsubscribe();
/// ```

pub mod bus;
pub mod events;

pub use bus::{EventBus, SubscriberId, Subscription};
pub use events::{PipelineEvent, ScoreUpdate, UpdateKind};
