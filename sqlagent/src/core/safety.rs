//! Conservative textual safety filter for candidate SQL.
//!
//! This is not a parser. It normalizes the text and rejects anything that is
//! not a single read-only statement. Rules are checked in a fixed order
//! (empty, multi-statement, forbidden keyword, read-only prefix) so the reported
//! violation is deterministic.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Keywords that mutate data, schema, privileges, or transaction state.
pub const FORBIDDEN_KEYWORDS: [&str; 16] = [
    "insert", "update", "delete", "drop", "alter", "create", "truncate", "grant", "revoke",
    "replace", "merge", "call", "execute", "commit", "rollback", "savepoint",
];

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:sql)?").expect("fence regex"));
static LINE_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)--.*$").expect("line comment regex"));
static BLOCK_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment regex"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static STRING_LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").expect("string literal regex"));
static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z_][a-z0-9_$]*").expect("word regex"));

/// Reason a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyViolation {
    Empty,
    MultipleStatements,
    ForbiddenKeyword(&'static str),
    NotReadOnly,
}

impl fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyViolation::Empty => f.write_str("Empty SQL query"),
            SafetyViolation::MultipleStatements => f.write_str("Multiple SQL statements detected"),
            SafetyViolation::ForbiddenKeyword(keyword) => {
                write!(f, "Forbidden SQL operation detected ({keyword})")
            }
            SafetyViolation::NotReadOnly => f.write_str("Only SELECT queries are allowed"),
        }
    }
}

/// Strip fences and triple quotes, drop comments, collapse whitespace, lowercase.
///
/// Repeats until the text stops changing, so `clean(clean(x)) == clean(x)`.
pub fn clean(text: &str) -> String {
    let mut current = clean_once(text);
    for _ in 0..=current.len() {
        let next = clean_once(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn clean_once(text: &str) -> String {
    let unfenced = FENCE_RE.replace_all(text, "");
    let trimmed = unfenced.trim();
    let trimmed = trimmed.strip_prefix("\"\"\"").unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("\"\"\"").unwrap_or(trimmed);

    let without_line = LINE_COMMENT_RE.replace_all(trimmed, "");
    let without_block = BLOCK_COMMENT_RE.replace_all(&without_line, "");
    let collapsed = WHITESPACE_RE.replace_all(&without_block, " ");
    collapsed.trim().to_lowercase()
}

/// Validate a candidate query. Returns the cleaned SQL when accepted.
pub fn validate(text: &str) -> Result<String, SafetyViolation> {
    let sql = clean(text);

    if sql.is_empty() {
        return Err(SafetyViolation::Empty);
    }
    // Separators and keywords inside string literals are data.
    let code = STRING_LITERAL_RE.replace_all(&sql, "''");
    if !is_single_statement(&code) {
        return Err(SafetyViolation::MultipleStatements);
    }
    if let Some(keyword) = forbidden_keyword(&code) {
        return Err(SafetyViolation::ForbiddenKeyword(keyword));
    }
    if !is_read_only(&sql) {
        return Err(SafetyViolation::NotReadOnly);
    }
    Ok(sql)
}

/// A single trailing separator is allowed; any other `;` splits statements.
fn is_single_statement(sql: &str) -> bool {
    let body = sql.trim_end().strip_suffix(';').unwrap_or(sql);
    !body.contains(';')
}

/// A word directly followed by `(` is a function call (`replace(x, 'a', 'b')`),
/// not a statement keyword.
fn forbidden_keyword(sql: &str) -> Option<&'static str> {
    WORD_RE.find_iter(sql).find_map(|word| {
        if sql[word.end()..].trim_start().starts_with('(') {
            return None;
        }
        FORBIDDEN_KEYWORDS
            .iter()
            .copied()
            .find(|keyword| *keyword == word.as_str())
    })
}

fn is_read_only(sql: &str) -> bool {
    WORD_RE
        .find(sql)
        .filter(|word| word.start() == 0)
        .is_some_and(|word| matches!(word.as_str(), "select" | "with"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clean_strips_fences_comments_and_case() {
        let raw = "```sql\nSELECT name -- the name\nFROM   products /* all */\n```";
        assert_eq!(clean(raw), "select name from products");
    }

    #[test]
    fn clean_strips_triple_quotes() {
        assert_eq!(clean("\"\"\"SELECT 1\"\"\""), "select 1");
    }

    #[test]
    fn accepts_select_and_with() {
        assert_eq!(
            validate("SELECT product_name FROM products LIMIT 5;").expect("select"),
            "select product_name from products limit 5;"
        );
        assert!(validate("WITH t AS (SELECT 1 AS x) SELECT x FROM t").is_ok());
    }

    #[test]
    fn rejects_empty_after_cleanup() {
        assert_eq!(validate("```sql\n-- nothing\n```"), Err(SafetyViolation::Empty));
        assert_eq!(validate("   "), Err(SafetyViolation::Empty));
    }

    #[test]
    fn rejects_stacked_statements() {
        assert_eq!(
            validate("SELECT 1; SELECT 2"),
            Err(SafetyViolation::MultipleStatements)
        );
        assert_eq!(
            validate("select * from orders;DROP TABLE orders;"),
            Err(SafetyViolation::MultipleStatements)
        );
    }

    #[test]
    fn rejects_mixed_case_forbidden_keywords() {
        assert_eq!(
            validate("DrOp TABLE orders"),
            Err(SafetyViolation::ForbiddenKeyword("drop"))
        );
        assert_eq!(
            validate("WITH x AS (DELETE FROM orders RETURNING *) SELECT * FROM x"),
            Err(SafetyViolation::ForbiddenKeyword("delete"))
        );
    }

    #[test]
    fn keyword_check_runs_before_prefix_check() {
        assert_eq!(
            validate("update orders set x = 1"),
            Err(SafetyViolation::ForbiddenKeyword("update"))
        );
    }

    #[test]
    fn rejects_non_read_only_prefix() {
        assert_eq!(validate("PRAGMA table_info(orders)"), Err(SafetyViolation::NotReadOnly));
        assert_eq!(validate("selection from t"), Err(SafetyViolation::NotReadOnly));
    }

    #[test]
    fn identifiers_containing_keywords_are_allowed() {
        assert!(validate("SELECT last_update, created_at FROM audit").is_ok());
    }

    #[test]
    fn comments_cannot_hide_a_second_statement() {
        assert_eq!(
            validate("SELECT 1 /* ; */ ; -- \n DELETE FROM orders"),
            Err(SafetyViolation::MultipleStatements)
        );
    }

    #[test]
    fn separators_and_keywords_inside_literals_are_data() {
        assert_eq!(validate("SELECT 'a;b' AS x").expect("literal"), "select 'a;b' as x");
        assert!(validate("SELECT * FROM t WHERE note = 'please drop it'").is_ok());
        assert!(validate("SELECT 'it''s; fine' AS x;").is_ok());
        assert_eq!(
            validate("SELECT 'a'; DROP TABLE orders"),
            Err(SafetyViolation::MultipleStatements)
        );
        assert_eq!(
            validate("SELECT 'unterminated; DROP TABLE orders"),
            Err(SafetyViolation::MultipleStatements)
        );
    }

    #[test]
    fn function_calls_named_like_keywords_are_allowed() {
        assert!(validate("SELECT replace(product_name,'a','b') FROM products").is_ok());
        assert!(validate("SELECT REPLACE (product_name, 'a', 'b') FROM products").is_ok());
        assert_eq!(
            validate("REPLACE INTO products VALUES (1, 'x', 1, 1)"),
            Err(SafetyViolation::ForbiddenKeyword("replace"))
        );
    }

    proptest! {
        #[test]
        fn clean_is_idempotent(raw in "[a-zA-Z0-9 \t\n;*/`\"'-]{0,64}") {
            let once = clean(&raw);
            prop_assert_eq!(clean(&once), once);
        }

        #[test]
        fn forbidden_keyword_is_always_rejected(
            keyword in proptest::sample::select(FORBIDDEN_KEYWORDS.to_vec()),
            upper in any::<bool>(),
        ) {
            let word = if upper { keyword.to_uppercase() } else { keyword.to_string() };
            let sql = format!("SELECT * FROM orders WHERE 1 = 1 {word} x");
            prop_assert!(validate(&sql).is_err());
        }
    }
}
