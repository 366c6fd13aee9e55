//! OpenAPI document handling: loading, conversion, dereferencing and operation indexing.

pub mod convert;
pub mod deref;
pub mod document;
pub mod loader;
pub mod operations;

pub use document::{
    collect_operations, operation_parameters, serialize_document, write_document, SpecDocument,
    HTTP_METHODS,
};
pub use loader::{load_document, normalize, SpecSource};
pub use operations::{
    index_operations, operation_key, synthesize_operation_id, AuthDescriptor, AuthScheme,
    OperationEntry, OperationIndex,
};
