//! Field selection and schema validation of the records read from the source.

mod field_selector;
mod validator;

pub use field_selector::FieldSelector;
pub use validator::{RecordSchemaValidator, StreamValidationReport};
