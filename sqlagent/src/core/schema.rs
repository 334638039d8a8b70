//! Static schema catalog and the projection used to narrow generation context.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Column description as listed in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

/// Join template naming the tables it connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinInfo {
    pub tables: Vec<String>,
    #[serde(default)]
    pub join: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Read-only description of the database handed to the generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    pub tables: BTreeMap<String, TableInfo>,
    #[serde(default)]
    pub common_joins: Vec<JoinInfo>,
    #[serde(default)]
    pub hints: Vec<String>,
}

impl SchemaCatalog {
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    /// Narrow the catalog to `table_names`.
    ///
    /// Unknown names are ignored. A join is kept when any of its tables was
    /// requested. Hints are carried through unfiltered.
    pub fn project<S: AsRef<str>>(&self, table_names: &[S]) -> SchemaCatalog {
        let requested: BTreeSet<&str> = table_names.iter().map(AsRef::as_ref).collect();

        let tables = self
            .tables
            .iter()
            .filter(|(name, _)| requested.contains(name.as_str()))
            .map(|(name, info)| (name.clone(), info.clone()))
            .collect();

        let common_joins = self
            .common_joins
            .iter()
            .filter(|join| {
                join.tables
                    .iter()
                    .any(|table| requested.contains(table.as_str()))
            })
            .cloned()
            .collect();

        SchemaCatalog {
            tables,
            common_joins,
            hints: self.hints.clone(),
        }
    }

    /// Qualified `table.column` names, in catalog order.
    pub fn qualified_columns(&self) -> Vec<String> {
        self.tables
            .iter()
            .flat_map(|(table, info)| {
                info.columns
                    .iter()
                    .map(move |column| format!("{table}.{}", column.name))
            })
            .collect()
    }

    /// Short `name -> description` listing used by the planner.
    pub fn table_descriptions(&self) -> BTreeMap<String, String> {
        self.tables
            .iter()
            .map(|(name, info)| {
                let description = if info.description.trim().is_empty() {
                    "No description".to_string()
                } else {
                    info.description.clone()
                };
                (name.clone(), description)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str]) -> TableInfo {
        TableInfo {
            description: String::new(),
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
            tables: tables.iter().map(|t| t.to_string()).collect(),
            join: clause.to_string(),
            description: None,
        }
    }

    fn catalog() -> SchemaCatalog {
        SchemaCatalog {
            tables: BTreeMap::from([
                ("aisles".to_string(), table(&["aisle_id", "aisle"])),
                ("orders".to_string(), table(&["order_id", "user_id"])),
                ("products".to_string(), table(&["product_id", "aisle_id"])),
            ]),
            common_joins: vec![
                join(&["orders", "products"], "orders.order_id = products.product_id"),
                join(&["aisles"], "aisles self"),
            ],
            hints: vec!["prefer LIMIT".to_string()],
        }
    }

    #[test]
    fn project_keeps_requested_tables_and_touching_joins() {
        let projected = catalog().project(&["orders", "products"]);
        assert_eq!(projected.table_names(), vec!["orders", "products"]);
        assert_eq!(projected.common_joins.len(), 1);
        assert_eq!(projected.common_joins[0].tables, vec!["orders", "products"]);
        assert_eq!(projected.hints, vec!["prefer LIMIT"]);
    }

    #[test]
    fn project_ignores_unknown_names() {
        let projected = catalog().project(&["orders", "profit_margins"]);
        assert_eq!(projected.table_names(), vec!["orders"]);
    }

    #[test]
    fn join_kept_when_only_one_side_requested() {
        let projected = catalog().project(&["orders"]);
        assert_eq!(projected.common_joins.len(), 1);
    }

    #[test]
    fn qualified_columns_follow_catalog_order() {
        let columns = catalog().project(&["aisles"]).qualified_columns();
        assert_eq!(columns, vec!["aisles.aisle_id", "aisles.aisle"]);
    }
}
