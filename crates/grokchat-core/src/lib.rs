pub mod agent;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod export;
pub mod llm;
pub mod secrets;
pub mod session;

// Re-export key types
pub use agent::{agent_report, list_agents, AgentPaths, AgentReport, AgentSummary};
pub use config::{AgentConfig, RunOverrides};
pub use context::{
    BackupStore, FileResolver, HistoryStatistics, HistoryStore, InclusionOutcome, Turn,
};
pub use error::{ChatError, Result};
pub use export::{ExportDocument, ExportFormat};
pub use llm::{CompletionClient, CompletionRequest, Message, Role, StreamEvent, XaiClient};
pub use session::{Session, SessionEvent, TurnOutcome};
