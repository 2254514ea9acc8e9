// Library interface for grokchat-cli
// This allows integration tests to access internal modules

// NOTE: commands.rs and theme.rs are also declared in main.rs, so a path
// attribute points at the same source files.

#[path = "commands.rs"]
pub mod commands;

#[path = "theme.rs"]
pub mod theme;

// Re-export commonly used items for easier testing
pub use commands::{handle_command, CommandResult};
pub use theme::Theme;
