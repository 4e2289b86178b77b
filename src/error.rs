use thiserror::Error;

/// Pipeline-level errors using thiserror for structured error handling.
///
/// Each stage of the frame loop owns one enum. Capture and detection
/// failures are transient (the loop retries on the next tick); store
/// failures are integration errors and propagate to the caller.

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("No camera device found{}", .0.as_deref().map(|id| format!(": {id}")).unwrap_or_default())]
    NotFound(Option<String>),

    #[error("Camera is in use or unreadable: {0}")]
    NotReadable(String),

    #[error("Unknown camera failure: {0}")]
    Unknown(String),

    #[error("Frame source is not active")]
    NotActive,
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Detection engine not initialized")]
    NotInitialized,

    #[error("Failed to load detection model")]
    ModelLoadFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Inference failed on frame {frame_index}")]
    InferenceFailed {
        frame_index: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Entity kinds held by the match data store, used in not-found reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    Team,
    Match,
    BallEvent,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityKind::Player => "Player",
            EntityKind::Team => "Team",
            EntityKind::Match => "Match",
            EntityKind::BallEvent => "Ball event",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: String },

    #[error("{entity} {id} is still referenced by {references} ball event(s)")]
    InUse {
        entity: EntityKind,
        id: String,
        references: usize,
    },

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Storage I/O failed for {key}")]
    Storage {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize {key}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error("No live match")]
    NoLiveMatch,

    #[error("Match {0} is already live")]
    MatchAlreadyLive(String),

    #[error("Match {0} is not in progress")]
    MatchNotInProgress(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to create config directory: {path}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not determine the platform config directory")]
    NoConfigDir,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Frame loop is already running")]
    AlreadyRunning,

    #[error("Frame loop is not running")]
    NotRunning,

    #[error("Failed to start frame loop thread")]
    ThreadSpawnFailed(#[source] std::io::Error),

    #[error("Frame loop thread panicked")]
    ThreadPanicked,

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

impl PipelineError {
    /// Capture and detection failures only abort the current iteration
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Capture(_) | PipelineError::Detection(_))
    }
}

/// Short, actionable text for surfacing a failure to a user
pub trait UserMessage {
    fn user_message(&self) -> String;
}

impl UserMessage for CaptureError {
    fn user_message(&self) -> String {
        match self {
            CaptureError::PermissionDenied => {
                "camera permission denied — enable camera access".to_string()
            }
            CaptureError::NotFound(_) => {
                "no camera found — connect a camera or pick another device".to_string()
            }
            CaptureError::NotReadable(_) => {
                "camera is busy — close other apps using it and retry".to_string()
            }
            CaptureError::Unknown(_) => "camera failed to start — try again".to_string(),
            CaptureError::NotActive => "camera is off — start the camera first".to_string(),
        }
    }
}

impl UserMessage for DetectionError {
    fn user_message(&self) -> String {
        match self {
            DetectionError::NotInitialized => {
                "detection model not loaded — start detection again".to_string()
            }
            DetectionError::ModelLoadFailed(_) => {
                "detection model failed to load — check the model files".to_string()
            }
            DetectionError::InferenceFailed { .. } => {
                "frame could not be analysed — retrying".to_string()
            }
        }
    }
}

impl UserMessage for StoreError {
    fn user_message(&self) -> String {
        match self {
            StoreError::NotFound { entity, .. } => {
                format!("{} no longer exists — refresh and try again", entity)
            }
            StoreError::InUse { entity, .. } => {
                format!("{} has recorded deliveries and cannot be deleted", entity)
            }
            StoreError::Invalid(reason) => format!("invalid entry — {}", reason),
            StoreError::Storage { .. } | StoreError::Serialization { .. } => {
                "could not save match data — check free disk space".to_string()
            }
        }
    }
}

impl UserMessage for ScoringError {
    fn user_message(&self) -> String {
        match self {
            ScoringError::NoLiveMatch => "no live match — start a match first".to_string(),
            ScoringError::MatchAlreadyLive(_) => {
                "a match is already live — end it before starting another".to_string()
            }
            ScoringError::MatchNotInProgress(_) => {
                "this match is not in progress".to_string()
            }
            ScoringError::Store(err) => err.user_message(),
        }
    }
}

impl UserMessage for PipelineError {
    fn user_message(&self) -> String {
        match self {
            PipelineError::AlreadyRunning => "live detection is already running".to_string(),
            PipelineError::NotRunning => "live detection is not running".to_string(),
            PipelineError::ThreadSpawnFailed(_) => {
                "could not start live detection — restart the app".to_string()
            }
            PipelineError::ThreadPanicked => {
                "live detection stopped unexpectedly — restart the app".to_string()
            }
            PipelineError::Capture(err) => err.user_message(),
            PipelineError::Detection(err) => err.user_message(),
            PipelineError::Scoring(err) => err.user_message(),
        }
    }
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;
