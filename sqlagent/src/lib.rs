//! Self-correcting natural-language-to-SQL agent.
//!
//! A question goes through a bounded state machine: plan the relevant tables,
//! generate a candidate query, filter it for safety, execute it read-only,
//! have the generator judge the results, and on failure climb an escalation
//! ladder (correct, simplify, alternative approach) until either an answer is
//! validated or the attempt budget runs out and the user is asked to clarify.
//!
//! - **[`core`]**: Pure, deterministic logic (safety filter, routing policy,
//!   session state, response parsing). No I/O.
//! - **[`io`]**: Side-effecting gateways (LLM endpoint, SQLite, config,
//!   catalog files, prompt rendering, transcripts).
//!
//! [`agent`] drives the loop by combining the two.

pub mod agent;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
