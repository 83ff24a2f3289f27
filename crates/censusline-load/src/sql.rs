//! SQL generation for table (re)creation and CSV ingestion.
//!
//! Every identifier is double-quoted and every literal single-quoted, since
//! mapped column labels are free text ("Total Households", "Median income ($)").

use crate::warehouse::{TableLayout, TableRef};

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn qualified(table: &TableRef) -> String {
    match &table.schema {
        Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&table.name)),
        None => quote_ident(&table.name),
    }
}

/// Statements that extend DuckDB with S3 access via the AWS credential chain.
pub fn enable_s3() -> &'static str {
    "INSTALL httpfs; LOAD httpfs; INSTALL aws; LOAD aws;
     CREATE SECRET IF NOT EXISTS censusline_s3 (TYPE S3, PROVIDER CREDENTIAL_CHAIN);"
}

/// Drop and recreate the table. Every column is VARCHAR; the key column is
/// the primary key so duplicate geographies fail the load.
pub fn recreate_table(table: &TableRef, layout: &TableLayout) -> String {
    let mut stmts = String::new();
    if let Some(schema) = &table.schema {
        stmts.push_str(&format!("CREATE SCHEMA IF NOT EXISTS {};\n", quote_ident(schema)));
    }
    let name = qualified(table);
    stmts.push_str(&format!("DROP TABLE IF EXISTS {name};\n"));

    let columns: Vec<String> = layout
        .columns
        .iter()
        .map(|c| format!("    {} VARCHAR", quote_ident(c)))
        .collect();
    stmts.push_str(&format!(
        "CREATE TABLE {name} (\n{},\n    PRIMARY KEY ({})\n);",
        columns.join(",\n"),
        quote_ident(&layout.key_column)
    ));
    stmts
}

/// Positional insert from a headered CSV; empty fields become NULL.
pub fn insert_from_csv(table: &TableRef, uri: &str) -> String {
    format!(
        "INSERT INTO {} SELECT * FROM read_csv({}, header = true, all_varchar = true)",
        qualified(table),
        quote_literal(uri)
    )
}

pub fn count_rows(table: &TableRef) -> String {
    format!("SELECT count(*) FROM {}", qualified(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> TableLayout {
        TableLayout::new(
            "zcta",
            vec!["zcta".into(), "NAME".into(), "Total Households".into()],
        )
        .unwrap()
    }

    #[test]
    fn quoting() {
        assert_eq!(quote_ident(r#"a"b"#), r#""a""b""#);
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn recreate_table_sql() {
        let table = TableRef::new(Some("acs".into()), "dp02_zcta_2023");
        let sql = recreate_table(&table, &layout());
        assert!(sql.starts_with("CREATE SCHEMA IF NOT EXISTS \"acs\";"));
        assert!(sql.contains("DROP TABLE IF EXISTS \"acs\".\"dp02_zcta_2023\";"));
        assert!(sql.contains("\"Total Households\" VARCHAR"));
        assert!(sql.contains("PRIMARY KEY (\"zcta\")"));
    }

    #[test]
    fn unqualified_table() {
        let table = TableRef::new(None, "t");
        assert!(!recreate_table(&table, &layout()).contains("SCHEMA"));
        assert_eq!(count_rows(&table), "SELECT count(*) FROM \"t\"");
    }
}
