//! SQL text synthesis for the MySQL gateway
//!
//! Identifiers are always backtick-quoted. Column types are checked against a
//! conservative pattern, defaults and row values are rendered as literals, so
//! caller input never lands in a statement unescaped.

use crate::error::{AdminError, Result};
use dbadmin_types::{AlterAction, AlterTableRequest, CreateTableRequest, PageRequest};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static COLUMN_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_ ]*(\([^()`;#]*\))?[A-Za-z0-9_ ]*$")
        .expect("column type pattern is valid")
});

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("number pattern is valid")
});

static CURRENT_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^CURRENT_TIMESTAMP(\(\d\))?$").expect("timestamp pattern is valid")
});

/// Backtick-quote an identifier, doubling embedded backticks
pub fn quote_ident(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AdminError::invalid("identifier must not be empty"));
    }
    if name.contains('\0') {
        return Err(AdminError::invalid("identifier must not contain NUL"));
    }
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Validate a declared column type such as `VARCHAR(255)` or `INT UNSIGNED`
pub fn check_column_type(column_type: &str) -> Result<&str> {
    let trimmed = column_type.trim();
    if !COLUMN_TYPE.is_match(trimmed) || trimmed.contains("--") || trimmed.contains("/*") {
        return Err(AdminError::invalid(format!(
            "invalid column type: {}",
            column_type
        )));
    }
    Ok(trimmed)
}

/// Quote a string as a MySQL literal on a single line
pub fn quote_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            '\u{1a}' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render a column default. Numbers, `NULL`, booleans, `CURRENT_TIMESTAMP` and
/// simple quoted literals pass through, anything else becomes a string literal.
pub fn render_default(raw: &str) -> Option<String> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    let upper = value.to_ascii_uppercase();
    let passthrough = matches!(upper.as_str(), "NULL" | "TRUE" | "FALSE")
        || CURRENT_TIMESTAMP.is_match(value)
        || NUMBER.is_match(value)
        || is_simple_quoted(value);

    if passthrough {
        Some(value.to_string())
    } else {
        Some(quote_string(value))
    }
}

fn is_simple_quoted(value: &str) -> bool {
    value.len() >= 2
        && value.starts_with('\'')
        && value.ends_with('\'')
        && !value[1..value.len() - 1].contains(['\'', '\\'])
}

/// `<name> <type>[ NOT NULL][ DEFAULT <value>]`
pub fn column_definition(
    name: &str,
    column_type: &str,
    nullable: bool,
    default: Option<&str>,
) -> Result<String> {
    let mut definition = format!("{} {}", quote_ident(name)?, check_column_type(column_type)?);
    if !nullable {
        definition.push_str(" NOT NULL");
    }
    if let Some(default) = default.and_then(render_default) {
        definition.push_str(" DEFAULT ");
        definition.push_str(&default);
    }
    Ok(definition)
}

pub fn create_table(request: &CreateTableRequest) -> Result<String> {
    if request.columns.is_empty() {
        return Err(AdminError::invalid("at least one column is required"));
    }

    let columns = request
        .columns
        .iter()
        .map(|c| column_definition(&c.name, &c.column_type, c.nullable, c.default.as_deref()))
        .collect::<Result<Vec<_>>>()?;

    Ok(format!(
        "CREATE TABLE {} (\n{}\n)",
        quote_ident(&request.name)?,
        columns.join(",\n")
    ))
}

pub fn alter_table(table: &str, request: &AlterTableRequest) -> Result<String> {
    let table = quote_ident(table)?;
    let column = &request.column;

    let typed_definition = || -> Result<String> {
        let column_type = column.column_type.as_deref().ok_or_else(|| {
            AdminError::invalid(format!("column type is required for {}", request.action))
        })?;
        column_definition(
            &column.name,
            column_type,
            column.nullable,
            column.default.as_deref(),
        )
    };

    Ok(match request.action {
        AlterAction::Add => format!("ALTER TABLE {} ADD COLUMN {}", table, typed_definition()?),
        AlterAction::Modify => {
            format!("ALTER TABLE {} MODIFY COLUMN {}", table, typed_definition()?)
        }
        AlterAction::Drop => format!(
            "ALTER TABLE {} DROP COLUMN {}",
            table,
            quote_ident(&column.name)?
        ),
    })
}

pub fn drop_table(name: &str) -> Result<String> {
    Ok(format!("DROP TABLE IF EXISTS {}", quote_ident(name)?))
}

pub fn count_rows(table: &str) -> Result<String> {
    Ok(format!("SELECT COUNT(*) FROM {}", quote_ident(table)?))
}

pub fn select_all(table: &str) -> Result<String> {
    Ok(format!("SELECT * FROM {}", quote_ident(table)?))
}

pub fn show_create_table(table: &str) -> Result<String> {
    Ok(format!("SHOW CREATE TABLE {}", quote_ident(table)?))
}

pub fn select_page(table: &str, page: &PageRequest) -> Result<String> {
    Ok(format!(
        "SELECT * FROM {} ORDER BY {} {} LIMIT {} OFFSET {}",
        quote_ident(table)?,
        quote_ident(&page.sort_field)?,
        page.sort_order.as_sql(),
        page.page_size,
        page.offset()
    ))
}

/// Render a decoded column value as a MySQL literal
pub fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_string(s),
        other => quote_string(&other.to_string()),
    }
}

/// One-line `INSERT INTO <table> VALUES (...);` for an exported row
pub fn insert_statement(table: &str, values: &[Value]) -> Result<String> {
    let literals: Vec<String> = values.iter().map(render_literal).collect();
    Ok(format!(
        "INSERT INTO {} VALUES ({});",
        quote_ident(table)?,
        literals.join(", ")
    ))
}
