// src/schema/sql.rs

use arrow::datatypes::{DataType, Schema as ArrowSchema};

/// Map an Arrow column type onto the SQL type advertised in the descriptor.
///
/// Covers:
/// - Utf8, LargeUtf8, Utf8View     → TEXT
/// - Int*, UInt*                   → INTEGER
/// - Float16/32/64, Decimal*       → REAL
/// - Boolean                       → BOOLEAN
/// - Binary, LargeBinary, Fixed*   → BLOB
/// - Timestamp, Date*              → TIMESTAMP
/// - fallback                      → TEXT
pub fn map_to_sql_type(ty: &DataType) -> &'static str {
    match ty {
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => "TEXT",
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => "INTEGER",
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => "REAL",
        DataType::Boolean => "BOOLEAN",
        DataType::Binary | DataType::LargeBinary | DataType::FixedSizeBinary(_) => "BLOB",
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => "TIMESTAMP",
        _ => "TEXT",
    }
}

/// Render `CREATE TABLE <table> (...)` with one line per column, in schema order.
/// Non-nullable columns carry `NOT NULL`.
pub fn create_table_statement(table: &str, schema: &ArrowSchema) -> String {
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|field| {
            let ty = map_to_sql_type(field.data_type());
            if field.is_nullable() {
                format!("    {} {}", field.name(), ty)
            } else {
                format!("    {} {} NOT NULL", field.name(), ty)
            }
        })
        .collect();

    format!("CREATE TABLE {} (\n{}\n)", table, columns.join(",\n"))
}
