pub mod app;
pub mod config;
pub mod engine;
pub mod errors;
pub mod guard;
pub mod handlers;
pub mod health;
pub mod models;
pub mod presenter;
pub mod remote;
pub mod snapshot;
pub mod state;
pub mod stats;
pub mod storage;
pub mod submit;
pub mod ui;

pub use app::router;
pub use config::{Backend, Config};
pub use engine::{SyncEngine, SyncHandle, SyncSettings, SyncStatus};
pub use guard::DuplicateGuard;
pub use health::ConnectionState;
pub use models::{Report, ReportDraft};
pub use presenter::Presenter;
pub use remote::{MemoryTable, RemoteTable, RestTable};
pub use snapshot::ListSnapshot;
pub use state::AppState;
pub use submit::{Rejection, Submitter};
