mod paths;
mod registry;

pub use paths::{default_root, validate_agent_id, AgentPaths};
pub use registry::{agent_report, list_agents, AgentFile, AgentReport, AgentSummary};
