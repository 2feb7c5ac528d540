use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use config::shared::ValidationConfig;
use metrics::counter;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::metrics::{
    REPLICATION_SCHEMA_VALIDATION_ERRORS_TOTAL, REPLICATION_SCHEMA_VALIDATION_SKIPPED_TOTAL,
    STREAM_NAME_LABEL,
};
use crate::types::{ConfiguredCatalog, StreamDescriptor};

/// Validation findings collected for one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamValidationReport {
    /// Number of records that did not match the stream schema.
    pub invalid_records: u64,
    /// Distinct validation error messages, capped per stream.
    pub errors: BTreeSet<String>,
    /// Top-level fields found in records but absent from the stream schema.
    pub unexpected_fields: BTreeSet<String>,
}

struct CompiledStream {
    validator: jsonschema::Validator,
    declared_fields: Option<BTreeSet<String>>,
}

struct ValidatorInner {
    streams: HashMap<StreamDescriptor, CompiledStream>,
    permits: Arc<Semaphore>,
    max_in_flight: u32,
    max_errors_per_stream: usize,
    closed: AtomicBool,
    skipped: AtomicU64,
    reports: Mutex<BTreeMap<StreamDescriptor, StreamValidationReport>>,
}

/// Validates records against the JSON schema of their stream on a bounded blocking pool.
///
/// Validation never blocks the caller: when every permit of the pool is taken the record is
/// skipped. Findings are only collected for reporting and never fail the sync.
#[derive(Clone)]
pub struct RecordSchemaValidator {
    inner: Arc<ValidatorInner>,
}

impl fmt::Debug for RecordSchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSchemaValidator")
            .field("streams", &self.inner.streams.len())
            .field("max_in_flight", &self.inner.max_in_flight)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl RecordSchemaValidator {
    /// Compiles a validator for every stream of `catalog`.
    ///
    /// Streams whose schema cannot be compiled are not validated.
    pub fn new(catalog: &ConfiguredCatalog, config: &ValidationConfig) -> Self {
        let mut streams = HashMap::new();
        for configured in &catalog.streams {
            match jsonschema::validator_for(&configured.json_schema) {
                Ok(validator) => {
                    streams.insert(
                        configured.stream.clone(),
                        CompiledStream {
                            validator,
                            declared_fields: configured.selected_fields(),
                        },
                    );
                }
                Err(err) => {
                    warn!(
                        stream = %configured.stream,
                        error = %err,
                        "stream schema is invalid, records of this stream will not be validated"
                    );
                }
            }
        }

        let max_in_flight = config.max_in_flight.max(1) as u32;
        Self {
            inner: Arc::new(ValidatorInner {
                streams,
                permits: Arc::new(Semaphore::new(max_in_flight as usize)),
                max_in_flight,
                max_errors_per_stream: config.max_errors_per_stream,
                closed: AtomicBool::new(false),
                skipped: AtomicU64::new(0),
                reports: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Submits a record for validation without waiting for the result.
    ///
    /// Must be called from within a tokio runtime.
    pub fn validate(&self, stream: &StreamDescriptor, data: Value) {
        if self.inner.closed.load(Ordering::Acquire) || !self.inner.streams.contains_key(stream) {
            return;
        }

        let Ok(permit) = self.inner.permits.clone().try_acquire_owned() else {
            self.inner.skipped.fetch_add(1, Ordering::Relaxed);
            counter!(
                REPLICATION_SCHEMA_VALIDATION_SKIPPED_TOTAL,
                STREAM_NAME_LABEL => stream.name.clone(),
            )
            .increment(1);
            return;
        };

        let inner = self.inner.clone();
        let stream = stream.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            inner.validate_blocking(&stream, &data);
        });
    }

    /// Stops accepting records. In-flight validations are detached and their results dropped.
    pub fn shutdown(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!("record schema validator shut down");
        }
    }

    /// Waits until no validation is in flight.
    pub async fn wait_for_pending(&self) {
        if let Ok(permits) = self
            .inner
            .permits
            .acquire_many(self.inner.max_in_flight)
            .await
        {
            drop(permits);
        }
    }

    /// Returns the number of records skipped because the pool was saturated.
    pub fn skipped(&self) -> u64 {
        self.inner.skipped.load(Ordering::Relaxed)
    }

    /// Returns the findings collected so far, per stream.
    pub fn reports(&self) -> BTreeMap<StreamDescriptor, StreamValidationReport> {
        self.inner
            .reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ValidatorInner {
    fn validate_blocking(&self, stream: &StreamDescriptor, data: &Value) {
        let Some(compiled) = self.streams.get(stream) else {
            return;
        };

        let errors: Vec<String> = compiled
            .validator
            .iter_errors(data)
            .map(|err| format!("{}: {err}", err.instance_path))
            .collect();
        let unexpected: Vec<String> = match (&compiled.declared_fields, data.as_object()) {
            (Some(declared), Some(object)) => object
                .keys()
                .filter(|key| !declared.contains(*key))
                .cloned()
                .collect(),
            _ => Vec::new(),
        };

        if errors.is_empty() && unexpected.is_empty() {
            return;
        }

        // Results of validations finishing after shutdown are not reported.
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        let mut reports = self.reports.lock().unwrap_or_else(PoisonError::into_inner);
        let report = reports.entry(stream.clone()).or_default();
        if !errors.is_empty() {
            report.invalid_records += 1;
            counter!(
                REPLICATION_SCHEMA_VALIDATION_ERRORS_TOTAL,
                STREAM_NAME_LABEL => stream.name.clone(),
            )
            .increment(1);

            for error in errors {
                if report.errors.len() >= self.max_errors_per_stream {
                    break;
                }
                report.errors.insert(error);
            }
        }
        report.unexpected_fields.extend(unexpected);
    }
}
