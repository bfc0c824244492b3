//! Table browsing, DDL and transfer types

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const DEFAULT_SORT_FIELD: &str = "id";

/// Catalog summary of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    #[serde(rename = "columns")]
    pub column_count: i64,
    pub rows: i64,
    #[serde(rename = "createTime")]
    pub create_time: String,
    #[serde(rename = "columnDetails", default, skip_serializing_if = "Option::is_none")]
    pub column_details: Option<Vec<ColumnInfo>>,
}

/// Catalog description of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub nullable: bool,
    pub default: String,
    pub key: String,
}

/// One page of table rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub total: i64,
}

/// Exported table: DDL plus newline-joined INSERT statements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBackup {
    pub name: String,
    pub structure: String,
    #[serde(default)]
    pub data: String,
}

impl TableBackup {
    /// Data statements with blank lines removed
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.data
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
    }
}

/// Ad-hoc read query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlQuery {
    pub sql: String,
}

impl SqlQuery {
    /// Only statements starting with SELECT (ignoring case and surrounding
    /// whitespace) may run.
    pub fn is_select(&self) -> bool {
        self.sql.trim().to_uppercase().starts_with("SELECT")
    }
}

/// Column definition used by `CREATE TABLE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlterAction {
    Add,
    Modify,
    Drop,
}

impl std::fmt::Display for AlterAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlterAction::Add => write!(f, "add"),
            AlterAction::Modify => write!(f, "modify"),
            AlterAction::Drop => write!(f, "drop"),
        }
    }
}

/// Column definition used by `ALTER TABLE`. `type` is only needed for add and modify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterColumn {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: Option<String>,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlterTableRequest {
    pub action: AlterAction,
    pub column: AlterColumn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Anything other than `desc` sorts ascending.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Raw query string of `GET /tables/:name/data`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
}

/// Resolved paging request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
    pub sort_field: String,
    pub sort_order: SortOrder,
}

impl PageRequest {
    /// Rows to skip. Saturates instead of overflowing on huge page numbers.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

impl From<PageQuery> for PageRequest {
    fn from(query: PageQuery) -> Self {
        let positive = |raw: Option<&str>, default: u64| {
            raw.and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };

        Self {
            page: positive(query.page.as_deref(), DEFAULT_PAGE),
            page_size: positive(query.page_size.as_deref(), DEFAULT_PAGE_SIZE),
            sort_field: query
                .sort_field
                .filter(|f| !f.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SORT_FIELD.to_string()),
            sort_order: query
                .sort_order
                .as_deref()
                .map(SortOrder::parse)
                .unwrap_or_default(),
        }
    }
}
