//! Read-only schema catalog shared by the policy engine, the pipeline and
//! the lineage extractor.
//!
//! A catalog is built once (from DDL or from a crawler snapshot) and never
//! mutated afterwards; refreshing means building a new one. Concurrent
//! requests share it behind an `Arc`.
//!
//! # Example
//!
//! ```
//! use sql_lineage_guard::{ast::SqlDialect, catalog::SchemaCatalog};
//!
//! let ddl = r#"
//!     CREATE TABLE DEPT (ID INT PRIMARY KEY, NAME VARCHAR(50) NOT NULL);
//!     CREATE TABLE EMPLOYEE (
//!         EMP_ID INT PRIMARY KEY,
//!         DEPT_ID INT REFERENCES DEPT(ID)
//!     );
//! "#;
//!
//! let catalog = SchemaCatalog::from_ddl(ddl, SqlDialect::Postgres).unwrap();
//! let emp = catalog.table("employee").unwrap();
//! assert!(emp.columns[0].is_pk);
//! assert_eq!(emp.columns[1].fk_ref_table.as_deref(), Some("DEPT"));
//! assert!(catalog.summary().text.contains("EMPLOYEE"));
//! ```

mod resolve;

use std::{collections::BTreeMap, fmt, path::Path};

use serde::{Deserialize, Serialize};
use sqlparser::{
    ast::{ColumnOption, Statement as SqlStatement, TableConstraint},
    parser::Parser
};
use tracing::debug;

pub(crate) use resolve::{CteOutputs, Visible};

use crate::{
    ast::SqlDialect,
    error::{AppResult, catalog_parse_error, file_read_error},
    parser::{canonical_name, object_name}
};

fn default_nullable() -> bool {
    true
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name:          String,
    #[serde(rename = "type", alias = "data_type", default)]
    pub data_type:     String,
    #[serde(default = "default_nullable")]
    pub nullable:      bool,
    #[serde(default)]
    pub is_pk:         bool,
    #[serde(default)]
    pub is_fk:         bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fk_ref_table:  Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fk_ref_column: Option<String>
}

impl ColumnDescriptor {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name:          name.to_uppercase(),
            data_type:     data_type.to_string(),
            nullable:      true,
            is_pk:         false,
            is_fk:         false,
            fk_ref_table:  None,
            fk_ref_column: None
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_pk = true;
        self.nullable = false;
        self
    }

    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.is_fk = true;
        self.fk_ref_table = Some(canonical_name(table).to_string());
        self.fk_ref_column = Some(canonical_name(column).to_string());
        self
    }
}

/// Ordered column list of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name:    String,
    pub columns: Vec<ColumnDescriptor>
}

impl TableDescriptor {
    pub fn new(name: &str, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: canonical_name(name).to_string(),
            columns
        }
    }

    /// Case-insensitive column lookup
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDescriptor> {
        self.columns
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Schema text handed to the text generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaSummary {
    pub dialect:     SqlDialect,
    pub table_count: usize,
    pub text:        String
}

impl fmt::Display for SchemaSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Immutable table -> column snapshot.
///
/// Tables are keyed by upper-cased qualified name in a `BTreeMap` for
/// deterministic iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    #[serde(default)]
    pub dialect: SqlDialect,
    #[serde(with = "table_list")]
    tables:      BTreeMap<String, TableDescriptor>
}

impl SchemaCatalog {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            tables: BTreeMap::new()
        }
    }

    /// Builder used by crawlers and tests
    #[must_use]
    pub fn with_table(mut self, table: TableDescriptor) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Build from `CREATE TABLE` statements; other statements are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the DDL does not parse.
    pub fn from_ddl(sql: &str, dialect: SqlDialect) -> AppResult<Self> {
        let statements = Parser::parse_sql(dialect.parser_dialect().as_ref(), sql)
            .map_err(|e| catalog_parse_error(e.to_string()))?;
        let mut catalog = Self::new(dialect);
        for stmt in statements {
            catalog.add_ddl_statement(stmt);
        }
        debug!(tables = catalog.tables.len(), "catalog loaded from DDL");
        Ok(catalog)
    }

    /// Build from a JSON crawler snapshot
    pub fn from_json(text: &str) -> AppResult<Self> {
        let catalog: Self =
            serde_json::from_str(text).map_err(|e| catalog_parse_error(e.to_string()))?;
        Ok(catalog.normalized())
    }

    /// Build from a YAML crawler snapshot
    pub fn from_yaml(text: &str) -> AppResult<Self> {
        let catalog: Self =
            serde_yaml::from_str(text).map_err(|e| catalog_parse_error(e.to_string()))?;
        Ok(catalog.normalized())
    }

    /// Load by file extension: `.json`, `.yaml`/`.yml`, anything else is DDL.
    pub fn load(path: &Path, dialect: SqlDialect) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| file_read_error(&path.display().to_string(), e))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            Some("yaml" | "yml") => Self::from_yaml(&text),
            _ => Self::from_ddl(&text, dialect)
        }
    }

    fn normalized(self) -> Self {
        let tables = self
            .tables
            .into_values()
            .map(|mut table| {
                table.name = canonical_name(&table.name).to_string();
                for column in &mut table.columns {
                    column.name = column.name.to_uppercase();
                    column.fk_ref_table = column
                        .fk_ref_table
                        .take()
                        .map(|t| canonical_name(&t).to_string());
                }
                (table.name.clone(), table)
            })
            .collect();
        Self {
            dialect: self.dialect,
            tables
        }
    }

    fn add_ddl_statement(&mut self, stmt: SqlStatement) {
        let SqlStatement::CreateTable(create) = stmt else {
            return;
        };

        let mut table = TableDescriptor {
            name:    object_name(&create.name).to_string(),
            columns: Vec::with_capacity(create.columns.len())
        };

        for column in &create.columns {
            let mut descriptor = ColumnDescriptor::new(&column.name.value, &column.data_type.to_string());
            for def in &column.options {
                match &def.option {
                    ColumnOption::NotNull => descriptor.nullable = false,
                    ColumnOption::Unique {
                        is_primary: true,
                        ..
                    } => descriptor = descriptor.primary_key(),
                    ColumnOption::ForeignKey {
                        foreign_table,
                        referred_columns,
                        ..
                    } => {
                        let referred = referred_columns
                            .first()
                            .map(|c| c.value.clone())
                            .unwrap_or_default();
                        descriptor =
                            descriptor.references(&foreign_table.to_string(), &referred);
                    }
                    _ => {}
                }
            }
            table.columns.push(descriptor);
        }

        for constraint in &create.constraints {
            match constraint {
                TableConstraint::PrimaryKey {
                    columns, ..
                } => {
                    for column in columns {
                        if let Some(c) = table.column_mut(&constraint_column(&column.to_string())) {
                            c.is_pk = true;
                            c.nullable = false;
                        }
                    }
                }
                TableConstraint::ForeignKey {
                    columns,
                    foreign_table,
                    referred_columns,
                    ..
                } => {
                    for (i, column) in columns.iter().enumerate() {
                        let referred = referred_columns
                            .get(i)
                            .map(|c| c.value.clone())
                            .unwrap_or_default();
                        if let Some(c) = table.column_mut(&column.value) {
                            c.is_fk = true;
                            c.fk_ref_table = Some(object_name(foreign_table).to_string());
                            c.fk_ref_column = Some(referred.to_uppercase());
                        }
                    }
                }
                _ => {}
            }
        }

        self.tables.insert(table.name.clone(), table);
    }

    /// Case-insensitive lookup. A bare name also matches a schema-qualified
    /// entry when exactly one entry carries that suffix.
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        let key = canonical_name(name);
        if let Some(table) = self.tables.get(key.as_str()) {
            return Some(table);
        }
        let suffix = format!(".{}", key);
        let mut matches = self.tables.values().filter(|t| t.name.ends_with(&suffix));
        match (matches.next(), matches.next()) {
            (Some(table), None) => Some(table),
            _ => None
        }
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnDescriptor> {
        self.table(table)?.column(column)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDescriptor> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Render the schema context for the text generator
    pub fn summary(&self) -> SchemaSummary {
        let mut text = format!("Database Schema ({}):\n\n", self.dialect);
        for table in self.tables.values() {
            text.push_str(&format!("Table: {}\n", table.name));
            text.push_str("Columns:\n");
            for col in &table.columns {
                let nullable = if col.nullable { "NULL" } else { "NOT NULL" };
                let primary = if col.is_pk { " PRIMARY KEY" } else { "" };
                let foreign = match (&col.fk_ref_table, &col.fk_ref_column) {
                    (Some(t), Some(c)) if col.is_fk => format!(" REFERENCES {}({})", t, c),
                    _ => String::new()
                };
                text.push_str(&format!(
                    "  - {name} {data_type} {nullable}{primary}{foreign}\n",
                    name = col.name,
                    data_type = col.data_type
                ));
            }
            text.push('\n');
        }
        SchemaSummary {
            dialect: self.dialect,
            table_count: self.tables.len(),
            text
        }
    }
}

/// `id`, `"id"` or `id ASC` as written in a key constraint
fn constraint_column(raw: &str) -> String {
    let first = raw.split_whitespace().next().unwrap_or(raw);
    canonical_name(first).to_string()
}

/// Snapshots list tables as an array; the map key is derived from the name.
mod table_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::TableDescriptor;

    pub fn serialize<S>(tables: &BTreeMap<String, TableDescriptor>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer
    {
        serializer.collect_seq(tables.values())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<String, TableDescriptor>, D::Error>
    where
        D: Deserializer<'de>
    {
        let list = Vec::<TableDescriptor>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|t| (t.name.clone(), t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new(SqlDialect::Oracle)
            .with_table(TableDescriptor::new(
                "HR.EMPLOYEE",
                vec![ColumnDescriptor::new("EMP_ID", "NUMBER").primary_key()]
            ))
            .with_table(TableDescriptor::new(
                "SALES.ORDERS",
                vec![ColumnDescriptor::new("ID", "NUMBER")]
            ))
            .with_table(TableDescriptor::new("ARCHIVE.ORDERS", vec![]))
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert!(catalog().table("hr.employee").is_some());
    }

    #[test]
    fn test_unique_suffix_match() {
        let catalog = catalog();
        assert_eq!(catalog.table("employee").map(|t| t.name.as_str()), Some("HR.EMPLOYEE"));
        assert!(catalog.table("orders").is_none());
    }

    #[test]
    fn test_table_level_constraints() {
        let ddl = "CREATE TABLE ORDERS (ID INT, CUST_ID INT, PRIMARY KEY (ID), \
                   FOREIGN KEY (CUST_ID) REFERENCES CUSTOMER(ID))";
        let catalog = SchemaCatalog::from_ddl(ddl, SqlDialect::Postgres).unwrap();
        let orders = catalog.table("ORDERS").unwrap();
        assert!(orders.columns[0].is_pk);
        assert!(!orders.columns[0].nullable);
        assert!(orders.columns[1].is_fk);
        assert_eq!(orders.columns[1].fk_ref_column.as_deref(), Some("ID"));
    }

    #[test]
    fn test_json_snapshot_round_trip_normalizes_names() {
        let json = r#"{"dialect":"maria","tables":[{"name":"shop.items","columns":[{"name":"sku","type":"VARCHAR(20)"}]}]}"#;
        let catalog = SchemaCatalog::from_json(json).unwrap();
        assert_eq!(catalog.dialect, SqlDialect::Maria);
        let items = catalog.table("SHOP.ITEMS").unwrap();
        assert_eq!(items.columns[0].name, "SKU");
        assert!(items.columns[0].nullable);
    }

    #[test]
    fn test_invalid_ddl_is_error() {
        assert!(SchemaCatalog::from_ddl("CREATE TABLE (", SqlDialect::Postgres).is_err());
    }

    #[test]
    fn test_summary_marks_keys() {
        let summary = catalog().summary();
        assert_eq!(summary.table_count, 3);
        assert!(summary.text.contains("EMP_ID NUMBER NOT NULL PRIMARY KEY"));
    }
}
