// src/schema/types.rs

use serde::{Deserialize, Serialize};

/// Static metadata attached to every descriptor; supplied by configuration.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq)]
pub struct SchemaMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub dialect: String,
}

/// Describes the persisted record shape for downstream consumers.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq)]
pub struct SchemaDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    pub dialect: String,
    /// `CREATE TABLE` statement for the persisted columns.
    pub schema: String,
}
