//! Stable exit codes for sqlagent CLI commands.

/// The question was answered with a validated result, or the command succeeded.
pub const OK: i32 = 0;
/// Setup failed (config, catalog, database, credentials) or the SQL was rejected.
pub const INVALID: i32 = 1;
/// The session ended by asking the user for clarification.
pub const CLARIFICATION: i32 = 3;
