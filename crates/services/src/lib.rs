#![forbid(unsafe_code)]

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod error;
pub mod scoring;
pub mod tryout;

pub use tryout_core::Clock;

pub use error::{AdminError, AuthError, CatalogError, ScoringError, TryoutError};

pub use admin::AdminService;
pub use auth::{AuthSession, Identity};
pub use catalog::{AttemptListItem, AttemptStats, CatalogService, OpenSessionItem};
pub use scoring::{ScoredAttempt, ScoringFailure, ScoringReport, ScoringService};
pub use tryout::{
    AdvanceOutcome, AnswerGateway, RunnerUpdate, SessionOverview, TickOutcome, TimerEpoch,
    TryoutFlow, TryoutMachine, TryoutProgress, TryoutRunner,
};
