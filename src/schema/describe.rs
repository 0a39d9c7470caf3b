use arrow::datatypes::Schema as ArrowSchema;

use super::{create_table_statement, SchemaDescriptor, SchemaMetadata};
use crate::records::TABLE_NAME;

/// Derive the descriptor for `columns`. Pure: same columns, same descriptor.
pub fn describe(columns: &ArrowSchema, metadata: &SchemaMetadata) -> SchemaDescriptor {
    SchemaDescriptor {
        name: metadata.name.clone(),
        version: metadata.version.clone(),
        description: metadata.description.clone(),
        dialect: metadata.dialect.clone(),
        schema: create_table_statement(TABLE_NAME, columns),
    }
}
