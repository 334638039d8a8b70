//! Test-only doubles for the generation and execution gateways.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use tempfile::TempDir;

use crate::core::schema::{Column, JoinInfo, SchemaCatalog, TableInfo};
use crate::core::types::Rows;
use crate::io::database::{Database, Execution};
use crate::io::generator::Generator;

/// One scripted generator reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }
}

/// Replies served in order; the last one repeats once the script runs out.
#[derive(Debug, Default)]
pub struct Script<T> {
    items: Vec<T>,
    next: Cell<usize>,
}

impl<T: Clone> Script<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            next: Cell::new(0),
        }
    }

    fn take(&self) -> Option<T> {
        let idx = self.next.get();
        self.next.set(idx + 1);
        self.items
            .get(idx.min(self.items.len().saturating_sub(1)))
            .cloned()
    }
}

/// Which call site a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Planning,
    Sql,
    Validation,
}

impl PromptKind {
    pub fn of(prompt: &str) -> Self {
        if prompt.contains("JSON array of table names") {
            PromptKind::Planning
        } else if prompt.contains("natural_language_response") {
            PromptKind::Validation
        } else {
            PromptKind::Sql
        }
    }
}

/// Generator that answers each call site from its own script.
#[derive(Debug)]
pub struct ScriptedGenerator {
    plan: Script<Reply>,
    sql: Script<Reply>,
    verdicts: Script<Reply>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(plan: Vec<Reply>, sql: Vec<Reply>, verdicts: Vec<Reply>) -> Self {
        Self {
            plan: Script::new(plan),
            sql: Script::new(sql),
            verdicts: Script::new(verdicts),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Plans `tables`, always proposes `sql`, and always returns `verdict`.
    pub fn fixed(tables: &[&str], sql: &str, verdict: &str) -> Self {
        Self::new(
            vec![Reply::text(plan_json(tables))],
            vec![Reply::text(sql)],
            vec![Reply::text(verdict)],
        )
    }

    pub fn prompts_of(&self, kind: PromptKind) -> Vec<String> {
        self.prompts
            .borrow()
            .iter()
            .filter(|prompt| PromptKind::of(prompt) == kind)
            .cloned()
            .collect()
    }
}

impl Generator for ScriptedGenerator {
    fn propose(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        let script = match PromptKind::of(prompt) {
            PromptKind::Planning => &self.plan,
            PromptKind::Sql => &self.sql,
            PromptKind::Validation => &self.verdicts,
        };
        match script.take() {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted generator has no reply")),
        }
    }
}

/// Database that replays scripted outcomes and records every statement.
#[derive(Debug)]
pub struct ScriptedDatabase {
    outcomes: Script<Execution>,
    executed: Vec<String>,
}

impl ScriptedDatabase {
    pub fn new(outcomes: Vec<Execution>) -> Self {
        Self {
            outcomes: Script::new(outcomes),
            executed: Vec::new(),
        }
    }

    pub fn always(outcome: Execution) -> Self {
        Self::new(vec![outcome])
    }

    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}

impl Database for ScriptedDatabase {
    fn run(&mut self, sql: &str) -> Execution {
        self.executed.push(sql.to_string());
        self.outcomes.take().unwrap_or_else(|| Execution::Failed {
            reason: "Execution error: scripted database has no outcome".to_string(),
        })
    }
}

pub fn plan_json(tables: &[&str]) -> String {
    serde_json::to_string(tables).unwrap_or_else(|_| "[]".to_string())
}

pub fn verdict_json(valid: bool, reason: &str, answer: &str) -> String {
    serde_json::json!({
        "valid": valid,
        "reason": reason,
        "natural_language_response": answer,
    })
    .to_string()
}

pub fn rows(columns: &[&str], values: Vec<Vec<serde_json::Value>>) -> Rows {
    Rows {
        columns: columns.iter().map(|column| column.to_string()).collect(),
        rows: values,
    }
}

fn table(description: &str, columns: &[&str]) -> TableInfo {
    TableInfo {
        description: description.to_string(),
        columns: columns
            .iter()
            .map(|name| Column {
                name: name.to_string(),
                data_type: None,
                description: None,
            })
            .collect(),
    }
}

fn join(tables: &[&str], clause: &str) -> JoinInfo {
    JoinInfo {
        tables: tables.iter().map(|table| table.to_string()).collect(),
        join: clause.to_string(),
        description: None,
    }
}

/// Grocery-order catalog shared by tests.
pub fn sample_catalog() -> SchemaCatalog {
    SchemaCatalog {
        tables: BTreeMap::from([
            (
                "aisles".to_string(),
                table("Aisle names", &["aisle_id", "aisle"]),
            ),
            (
                "departments".to_string(),
                table("Department names", &["department_id", "department"]),
            ),
            (
                "order_products_prior".to_string(),
                table(
                    "Products in prior orders",
                    &["order_id", "product_id", "add_to_cart_order", "reordered"],
                ),
            ),
            (
                "orders".to_string(),
                table(
                    "One row per order",
                    &["order_id", "user_id", "order_dow", "order_hour_of_day"],
                ),
            ),
            (
                "products".to_string(),
                table(
                    "Product catalog",
                    &["product_id", "product_name", "aisle_id", "department_id"],
                ),
            ),
        ]),
        common_joins: vec![
            join(
                &["orders", "order_products_prior"],
                "orders.order_id = order_products_prior.order_id",
            ),
            join(
                &["order_products_prior", "products"],
                "order_products_prior.product_id = products.product_id",
            ),
            join(
                &["products", "departments"],
                "products.department_id = departments.department_id",
            ),
            join(&["products", "aisles"], "products.aisle_id = aisles.aisle_id"),
        ],
        hints: vec!["Use LIMIT for top-N questions".to_string()],
    }
}

const FIXTURE_SQL: &str = "
CREATE TABLE aisles (aisle_id INTEGER PRIMARY KEY, aisle TEXT NOT NULL);
CREATE TABLE departments (department_id INTEGER PRIMARY KEY, department TEXT NOT NULL);
CREATE TABLE products (
    product_id INTEGER PRIMARY KEY,
    product_name TEXT NOT NULL,
    aisle_id INTEGER NOT NULL,
    department_id INTEGER NOT NULL
);
CREATE TABLE orders (
    order_id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    order_dow INTEGER NOT NULL,
    order_hour_of_day INTEGER NOT NULL
);
CREATE TABLE order_products_prior (
    order_id INTEGER NOT NULL,
    product_id INTEGER NOT NULL,
    add_to_cart_order INTEGER NOT NULL,
    reordered INTEGER NOT NULL
);
INSERT INTO aisles VALUES (1, 'fresh fruits'), (2, 'fresh vegetables'), (3, 'milk');
INSERT INTO departments VALUES (1, 'produce'), (2, 'dairy eggs');
INSERT INTO products VALUES
    (1, 'banana', 1, 1),
    (2, 'organic strawberries', 1, 1),
    (3, 'kale', 2, 1),
    (4, 'whole milk', 3, 2);
INSERT INTO orders VALUES (10, 100, 0, 9), (11, 100, 1, 10), (12, 101, 2, 18);
INSERT INTO order_products_prior VALUES
    (10, 1, 1, 0), (10, 4, 2, 0),
    (11, 1, 1, 1), (11, 2, 2, 0),
    (12, 1, 1, 1), (12, 3, 2, 0);
";

/// On-disk SQLite database seeded with the sample grocery data.
pub struct SqliteFixture {
    _dir: TempDir,
    path: PathBuf,
}

impl SqliteFixture {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create fixture dir")?;
        let path = dir.path().join("grocery.db");
        let conn = Connection::open(&path)
            .with_context(|| format!("create fixture db {}", path.display()))?;
        conn.execute_batch(FIXTURE_SQL).context("seed fixture db")?;
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
