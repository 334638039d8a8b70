//! The control loop: one question in, one [`SessionResult`] out.
//!
//! A session walks a fixed graph of [`Step`]s strictly sequentially. Every
//! generator or database failure is converted into state at the call site and
//! routed by [`Policy`]; nothing inside the loop aborts the session. The
//! attempt budget and a transition cap guarantee termination regardless of
//! what the generator returns.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::parse::{parse_table_plan, parse_verdict};
use crate::core::policy::{Policy, classify_failure};
use crate::core::safety;
use crate::core::schema::SchemaCatalog;
use crate::core::state::SessionState;
use crate::core::types::{FailureCause, SessionResult, Step, Strategy};
use crate::io::catalog::load_catalog;
use crate::io::config::{AgentConfig, PromptConfig};
use crate::io::database::{Database, Execution, SqliteDatabase};
use crate::io::generator::{ChatCompletionsGenerator, Generator};
use crate::io::prompt::{Prompts, RepairInputs};

/// Question-answering agent over one generator and one database connection.
pub struct SqlAgent<G, D> {
    generator: G,
    database: D,
    catalog: SchemaCatalog,
    prompts: Prompts,
    policy: Policy,
}

impl SqlAgent<ChatCompletionsGenerator, SqliteDatabase> {
    /// Wire the production gateways from config.
    pub fn from_config(cfg: &AgentConfig) -> Result<Self> {
        let catalog = load_catalog(&cfg.schema.path)?;
        let generator = ChatCompletionsGenerator::from_config(&cfg.llm)?;
        let database = SqliteDatabase::open(&cfg.database)?;
        Ok(Self::new(
            generator,
            database,
            catalog,
            cfg.policy.policy(),
            cfg.prompt.clone(),
        ))
    }
}

impl<G: Generator, D: Database> SqlAgent<G, D> {
    pub fn new(
        generator: G,
        database: D,
        catalog: SchemaCatalog,
        policy: Policy,
        prompt_config: PromptConfig,
    ) -> Self {
        Self {
            generator,
            database,
            catalog,
            prompts: Prompts::new(prompt_config),
            policy,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn database(&self) -> &D {
        &self.database
    }

    /// Answer `question`, or explain why it could not be answered.
    #[instrument(skip_all, fields(question = %question))]
    pub fn ask(&mut self, question: &str) -> SessionResult {
        info!("session started");
        let mut state = SessionState::new(question, self.catalog.clone());
        let limit = self.policy.transition_limit();
        let mut step = Step::Planning;
        let mut transitions = 0usize;

        loop {
            transitions += 1;
            if transitions > limit && step != Step::AskClarification {
                warn!(limit, ?step, "transition limit reached");
                step = Step::AskClarification;
            }
            let (note, next) = self.run_step(step, &mut state);
            debug!(
                ?step,
                ?next,
                total_attempts = state.total_attempts(),
                retries_in_strategy = state.retries_in_strategy(),
                "transition"
            );
            state.record(step, note);
            match next {
                Some(next) => step = next,
                None => break,
            }
        }

        let result = state.into_result();
        info!(
            valid = result.valid,
            executed = result.executed,
            total_attempts = result.total_attempts,
            "session finished"
        );
        result
    }

    /// Run one step; returns a transcript note and the next step (`None` ends the session).
    fn run_step(&mut self, step: Step, state: &mut SessionState) -> (Option<String>, Option<Step>) {
        match step {
            Step::Planning => (Some(self.plan(state)), Some(Step::GenerateSql)),
            Step::GenerateSql => (self.generate(state), Some(Step::ValidateSyntax)),
            Step::ValidateSyntax => {
                self.validate_syntax(state);
                (failure_note(state), Some(self.policy.after_syntax_check(state)))
            }
            Step::Execute => {
                self.execute(state);
                (failure_note(state), Some(self.policy.after_execution(state)))
            }
            Step::ValidateAndRespond => {
                self.validate_and_respond(state);
                (failure_note(state), self.policy.after_validation(state))
            }
            Step::AnalyzeFailure => {
                let failure_type = classify_failure(state);
                state.failure_type = Some(failure_type);
                (
                    Some(failure_type.as_str().to_string()),
                    Some(Step::EscalationDecision),
                )
            }
            Step::EscalationDecision => {
                let next = self
                    .policy
                    .escalate(state.total_attempts(), state.attempted_strategies());
                (None, Some(next))
            }
            Step::CorrectSql => (self.correct(state), Some(Step::ValidateSyntax)),
            Step::GenerateSimplified => (self.simplify(state), Some(Step::ValidateSyntax)),
            Step::GenerateAlternative => (self.alternative(state), Some(Step::ValidateSyntax)),
            Step::AskClarification => {
                self.ask_clarification(state);
                (None, None)
            }
        }
    }

    /// Narrow the schema to the tables the generator asks for, falling back
    /// to the full catalog when the plan is unusable.
    fn plan(&self, state: &mut SessionState) -> String {
        let planned = match self
            .prompts
            .planning(&state.question, &self.catalog)
            .and_then(|prompt| self.generator.propose(&prompt))
        {
            Ok(raw) => {
                let parsed = parse_table_plan(&raw);
                if parsed.is_none() {
                    warn!(raw = %preview(&raw), "planning response is not a JSON array of names");
                }
                parsed
            }
            Err(err) => {
                warn!(error = %err, "planning call failed");
                None
            }
        };

        let projection = planned.and_then(|tables| {
            let schema = self.catalog.project(&tables);
            let known: Vec<String> = tables
                .into_iter()
                .filter(|table| schema.tables.contains_key(table))
                .collect();
            (!known.is_empty()).then_some((known, schema))
        });
        match projection {
            Some((tables, schema)) => {
                let note = format!("planned tables: {}", tables.join(", "));
                state.planned_tables = tables;
                state.active_schema = schema;
                note
            }
            None => {
                state.planned_tables = self.catalog.table_names();
                state.active_schema = self.catalog.clone();
                "planning fallback: full schema".to_string()
            }
        }
    }

    fn generate(&self, state: &mut SessionState) -> Option<String> {
        let prompt = self.prompts.generate(&state.question, &state.active_schema);
        let (sql, note) = self.propose_sql(prompt);
        state.begin_attempt(Strategy::Direct, sql);
        note
    }

    fn correct(&self, state: &mut SessionState) -> Option<String> {
        let prompt = self.prompts.correct(repair_inputs(state));
        let (sql, note) = self.propose_sql(prompt);
        state.begin_attempt(Strategy::Correct, sql);
        note
    }

    fn simplify(&self, state: &mut SessionState) -> Option<String> {
        let prompt = self.prompts.simplified(repair_inputs(state));
        let (sql, note) = self.propose_sql(prompt);
        state.begin_attempt(Strategy::Simplified, sql);
        note
    }

    fn alternative(&self, state: &mut SessionState) -> Option<String> {
        let prompt = self
            .prompts
            .alternative(repair_inputs(state), state.attempted_strategies());
        let (sql, note) = self.propose_sql(prompt);
        state.begin_attempt(Strategy::Alternative, sql);
        note
    }

    /// Ask for SQL and normalize it. A failed call yields an empty candidate,
    /// which the safety filter then rejects.
    fn propose_sql(&self, prompt: Result<String>) -> (String, Option<String>) {
        match prompt.and_then(|prompt| self.generator.propose(&prompt)) {
            Ok(raw) => {
                let sql = safety::clean(&raw);
                debug!(sql = %preview(&sql), "candidate proposed");
                (sql, None)
            }
            Err(err) => {
                warn!(error = %err, "sql generation call failed");
                (String::new(), Some(format!("generation failed: {err}")))
            }
        }
    }

    fn validate_syntax(&self, state: &mut SessionState) {
        state.executed = false;
        state.result_valid = false;
        let candidate = state.candidate_sql.as_deref().unwrap_or_default();
        match safety::validate(candidate) {
            Ok(cleaned) => {
                state.candidate_sql = Some(cleaned);
                state.syntax_valid = true;
                state.clear_failure();
            }
            Err(violation) => {
                debug!(%violation, "candidate rejected by safety filter");
                state.syntax_valid = false;
                state.fail(FailureCause::Unsafe, violation.to_string());
            }
        }
    }

    fn execute(&mut self, state: &mut SessionState) {
        state.result_valid = false;
        let sql = match (&state.candidate_sql, state.syntax_valid) {
            (Some(sql), true) => sql.clone(),
            _ => {
                state.executed = false;
                state.fail(FailureCause::Unsafe, "Candidate was not accepted by the safety filter");
                return;
            }
        };
        match self.database.run(&sql) {
            Execution::Ok(rows) => {
                state.executed = true;
                state.results = Some(rows);
                state.clear_failure();
            }
            Execution::Failed { reason } => {
                state.executed = false;
                state.results = None;
                state.fail(FailureCause::Execution, reason);
            }
        }
    }

    /// One combined call judges the results and drafts the answer. Anything
    /// other than a well-formed positive verdict counts as not valid.
    fn validate_and_respond(&self, state: &mut SessionState) {
        state.result_valid = false;
        let results = match (&state.results, state.executed) {
            (Some(results), true) if !results.is_empty() => results,
            _ => {
                state.fail(FailureCause::EmptyResult, "No results to validate");
                return;
            }
        };
        let sql = state.candidate_sql.as_deref().unwrap_or_default();

        let response = self
            .prompts
            .validate(&state.question, sql, results)
            .and_then(|prompt| self.generator.propose(&prompt));
        match response {
            Ok(raw) => match parse_verdict(&raw) {
                Some(verdict) if verdict.valid => {
                    state.result_valid = true;
                    state.nl_response = Some(verdict.natural_language_response);
                    state.clear_failure();
                }
                Some(verdict) => {
                    debug!(reason = %verdict.reason, "answer rejected by validator");
                    state.fail(FailureCause::Rejected, verdict.reason);
                }
                None => {
                    warn!(raw = %preview(&raw), "validation response is not a verdict object");
                    state.fail(FailureCause::VerdictUnreadable, "Validation parsing error");
                }
            },
            Err(err) => {
                warn!(error = %err, "validation call failed");
                state.fail(
                    FailureCause::VerdictUnreadable,
                    format!("Validation call failed: {err}"),
                );
            }
        }
    }

    fn ask_clarification(&self, state: &mut SessionState) {
        state.result_valid = false;
        let strategies = if state.attempted_strategies().is_empty() {
            Strategy::Direct.as_str().to_string()
        } else {
            state
                .attempted_strategies()
                .iter()
                .map(|strategy| strategy.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let last_error = state.failure_reason().unwrap_or("none recorded");
        state.nl_response = Some(format!(
            "I need some clarification to answer this. I tried multiple approaches but couldn't \
             answer your question: \"{question}\"\n\n\
             Attempts made: {attempts}\n\
             Strategies tried: {strategies}\n\n\
             Last error: {last_error}\n\n\
             Could you please:\n\
             - Rephrase your question, or\n\
             - Provide more specific details, or\n\
             - Break it into smaller questions?",
            question = state.question,
            attempts = state.total_attempts(),
        ));
    }
}

fn repair_inputs(state: &SessionState) -> RepairInputs<'_> {
    RepairInputs {
        question: &state.question,
        schema: &state.active_schema,
        previous_sql: state.candidate_sql.as_deref().unwrap_or_default(),
        failure_reason: state.failure_reason().unwrap_or("unknown failure"),
    }
}

fn failure_note(state: &SessionState) -> Option<String> {
    state.failure_reason().map(str::to_string)
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(120) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
