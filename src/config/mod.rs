//! Configuration document subsystem.
//!
//! # Data Flow
//! ```text
//! schema file (JSON Schema)          config file (JSON)
//!     → loader.rs (parse)                → loader.rs (parse)
//!     → jsonschema contract check over both
//!     → builder.rs build_schema_tree
//!     → builder.rs build_config_tree (schema-linked)
//!     → trees handed to the transaction manager
//!
//! On edit:
//!     merge patch (JSON, null deletes)
//!     → builder.rs apply_patch onto a deep copy
//!     → semantic bounds + constraints + ordering in the manager
//! ```
//!
//! # Design Decisions
//! - The schema document is the external contract; it is checked with
//!   the jsonschema crate before any tree is built
//! - `properties` become named schema children, `patternProperties`
//!   become a pattern-keyed container with an `@item` member schema,
//!   `type: "array"` marks a repeated scalar leaf
//! - Custom attributes ride inside property subschemas and are carried
//!   verbatim into the schema tree's attribute maps

pub mod builder;
pub mod loader;

pub use builder::{apply_patch, build_config_tree, build_schema_tree, check_bounds};
pub use loader::{load_documents, load_from_files, LoadError, LoadedConfig};
