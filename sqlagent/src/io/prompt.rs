//! Prompt templates for every generator call site.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::schema::SchemaCatalog;
use crate::core::types::{Rows, Strategy};
use crate::io::config::PromptConfig;

const PLANNING_TEMPLATE: &str = include_str!("prompts/planning.md");
const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const CORRECT_TEMPLATE: &str = include_str!("prompts/correct.md");
const SIMPLIFIED_TEMPLATE: &str = include_str!("prompts/simplified.md");
const ALTERNATIVE_TEMPLATE: &str = include_str!("prompts/alternative.md");
const VALIDATE_TEMPLATE: &str = include_str!("prompts/validate.md");

/// Inputs shared by the repair-style prompts.
#[derive(Debug, Clone, Copy)]
pub struct RepairInputs<'a> {
    pub question: &'a str,
    pub schema: &'a SchemaCatalog,
    pub previous_sql: &'a str,
    pub failure_reason: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct Prompts {
    env: Environment<'static>,
    config: PromptConfig,
}

impl Prompts {
    pub fn new(config: PromptConfig) -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("planning", PLANNING_TEMPLATE),
            ("generate", GENERATE_TEMPLATE),
            ("correct", CORRECT_TEMPLATE),
            ("simplified", SIMPLIFIED_TEMPLATE),
            ("alternative", ALTERNATIVE_TEMPLATE),
            ("validate", VALIDATE_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("bundled prompt template should be valid");
        }
        Self { env, config }
    }

    pub fn planning(&self, question: &str, catalog: &SchemaCatalog) -> Result<String> {
        let tables = serde_json::to_string_pretty(&catalog.table_descriptions())
            .context("serialize table descriptions")?;
        self.render(
            "planning",
            context! { question => question.trim(), tables => tables },
        )
    }

    pub fn generate(&self, question: &str, schema: &SchemaCatalog) -> Result<String> {
        self.render(
            "generate",
            context! { question => question.trim(), schema => render_schema(schema) },
        )
    }

    /// Correction prompt. Columns are enumerated so the generator cannot
    /// claim one that is not in scope.
    pub fn correct(&self, inputs: RepairInputs<'_>) -> Result<String> {
        let mut columns: Vec<String> = inputs
            .schema
            .qualified_columns()
            .into_iter()
            .take(self.config.max_listed_columns)
            .collect();
        if columns.is_empty() {
            columns.push("Unable to extract column list".to_string());
        }
        self.render(
            "correct",
            context! {
                question => inputs.question.trim(),
                previous_sql => inputs.previous_sql,
                failure_reason => inputs.failure_reason,
                columns => columns,
            },
        )
    }

    pub fn simplified(&self, inputs: RepairInputs<'_>) -> Result<String> {
        self.render(
            "simplified",
            context! {
                question => inputs.question.trim(),
                schema => render_schema(inputs.schema),
                previous_sql => inputs.previous_sql,
                failure_reason => inputs.failure_reason,
            },
        )
    }

    pub fn alternative(&self, inputs: RepairInputs<'_>, attempted: &[Strategy]) -> Result<String> {
        let attempted: Vec<&str> = attempted.iter().map(|strategy| strategy.as_str()).collect();
        self.render(
            "alternative",
            context! {
                question => inputs.question.trim(),
                schema => render_schema(inputs.schema),
                previous_sql => inputs.previous_sql,
                failure_reason => inputs.failure_reason,
                attempted => attempted,
            },
        )
    }

    pub fn validate(&self, question: &str, sql: &str, results: &Rows) -> Result<String> {
        let sample = results.sample(self.config.result_sample_rows);
        let rendered_sample =
            serde_json::to_string_pretty(&sample).context("serialize result sample")?;
        self.render(
            "validate",
            context! {
                question => question.trim(),
                sql => sql,
                sample => rendered_sample,
                shown => sample.len(),
                total => results.len(),
            },
        )
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))?;
        Ok(rendered.trim().to_string())
    }
}

/// Plain-text schema block: tables with columns, join templates, hints.
pub fn render_schema(schema: &SchemaCatalog) -> String {
    let mut out = String::new();
    for (name, table) in &schema.tables {
        let _ = write!(out, "Table {name}");
        if !table.description.trim().is_empty() {
            let _ = write!(out, ": {}", table.description.trim());
        }
        out.push('\n');
        for column in &table.columns {
            let _ = write!(out, "  - {}", column.name);
            if let Some(data_type) = &column.data_type {
                let _ = write!(out, " ({data_type})");
            }
            if let Some(description) = &column.description {
                let _ = write!(out, ": {description}");
            }
            out.push('\n');
        }
    }
    if !schema.common_joins.is_empty() {
        out.push_str("\nJoin templates:\n");
        for join in &schema.common_joins {
            let _ = write!(out, "  - [{}] {}", join.tables.join(", "), join.join);
            if let Some(description) = &join.description {
                let _ = write!(out, " ({description})");
            }
            out.push('\n');
        }
    }
    if !schema.hints.is_empty() {
        out.push_str("\nHints:\n");
        for hint in &schema.hints {
            let _ = writeln!(out, "  - {hint}");
        }
    }
    out.trim_end().to_string()
}
