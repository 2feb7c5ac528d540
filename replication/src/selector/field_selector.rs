use std::collections::{BTreeSet, HashMap};

use serde_json::Value;
use tracing::{info, warn};

use crate::selector::RecordSchemaValidator;
use crate::types::{ConfiguredCatalog, RecordMessage, StreamDescriptor};

/// Restricts records to the fields negotiated in the catalog and submits them for validation.
#[derive(Debug)]
pub struct FieldSelector {
    field_selection_enabled: bool,
    selected_fields: HashMap<StreamDescriptor, BTreeSet<String>>,
    validator: Option<RecordSchemaValidator>,
}

impl FieldSelector {
    pub fn new(
        catalog: &ConfiguredCatalog,
        field_selection_enabled: bool,
        validator: Option<RecordSchemaValidator>,
    ) -> Self {
        let selected_fields = catalog
            .streams
            .iter()
            .filter_map(|configured| {
                configured
                    .selected_fields()
                    .map(|fields| (configured.stream.clone(), fields))
            })
            .collect();

        Self {
            field_selection_enabled,
            selected_fields,
            validator,
        }
    }

    /// Drops the top-level fields of `record` which are not declared by its stream schema.
    ///
    /// Records are returned untouched when field selection is disabled, when the stream is not
    /// part of the catalog or when its schema declares no properties.
    pub fn filter_selected_fields(&self, mut record: RecordMessage) -> RecordMessage {
        if !self.field_selection_enabled {
            return record;
        }

        let Some(fields) = self.selected_fields.get(&record.stream) else {
            return record;
        };
        if let Value::Object(object) = &mut record.data {
            object.retain(|key, _| fields.contains(key));
        }

        record
    }

    /// Submits `record` to the schema validator, if any, without waiting for the result.
    pub fn validate_schema(&self, record: &RecordMessage) {
        if let Some(validator) = &self.validator {
            validator.validate(&record.stream, record.data.clone());
        }
    }

    /// Stops schema validation. Findings collected so far are kept for reporting.
    pub fn shutdown(&self) {
        if let Some(validator) = &self.validator {
            validator.shutdown();
        }
    }

    /// Logs a summary of the validation findings of every stream.
    pub fn report_validation_errors(&self) {
        let Some(validator) = &self.validator else {
            return;
        };

        for (stream, report) in validator.reports() {
            if report.invalid_records > 0 {
                warn!(
                    %stream,
                    invalid_records = report.invalid_records,
                    errors = ?report.errors,
                    "records did not match the stream schema"
                );
            }
            if !report.unexpected_fields.is_empty() {
                warn!(
                    %stream,
                    fields = ?report.unexpected_fields,
                    "records contain fields absent from the stream schema"
                );
            }
        }

        let skipped = validator.skipped();
        if skipped > 0 {
            info!(skipped, "records were not validated since the validation pool was busy");
        }
    }

    pub fn validator(&self) -> Option<&RecordSchemaValidator> {
        self.validator.as_ref()
    }
}
