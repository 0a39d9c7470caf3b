pub mod describe;
pub mod sql;
pub mod types;
pub mod write;

pub use describe::describe;
pub use sql::{create_table_statement, map_to_sql_type};
pub use types::{SchemaDescriptor, SchemaMetadata};
pub use write::write_descriptor;
