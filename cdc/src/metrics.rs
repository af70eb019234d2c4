//! Metric names and labels emitted by the engine.

/// Label for the pipeline id.
pub const PIPELINE_ID_LABEL: &str = "pipeline_id";

/// Label for the target name.
pub const TARGET_LABEL: &str = "target";

/// Label for the violated rule name.
pub const RULE_LABEL: &str = "rule";

/// Label for the error kind.
pub const ERROR_KIND_LABEL: &str = "error_kind";

/// Label for the retried operation.
pub const OPERATION_LABEL: &str = "operation";

// Ingestion

/// Counter of change records read from sources.
pub const CDC_RECORDS_READ_TOTAL: &str = "cdc_records_read_total";

/// Counter of change records admitted by the validator.
pub const CDC_RECORDS_ADMITTED_TOTAL: &str = "cdc_records_admitted_total";

/// Counter of change records dropped by the validator, labelled by rule.
pub const CDC_RECORDS_DROPPED_TOTAL: &str = "cdc_records_dropped_total";

/// Counter of rule violations that did not drop the record.
pub const CDC_RULE_WARNINGS_TOTAL: &str = "cdc_rule_warnings_total";

// Merge

/// Counter of versions opened.
pub const CDC_VERSIONS_OPENED_TOTAL: &str = "cdc_versions_opened_total";

/// Counter of versions closed.
pub const CDC_VERSIONS_CLOSED_TOTAL: &str = "cdc_versions_closed_total";

/// Counter of late arrivals placed in the middle of a history.
pub const CDC_LATE_CORRECTIONS_TOTAL: &str = "cdc_late_corrections_total";

/// Counter of changes ignored because a newer change was already applied.
pub const CDC_STALE_CHANGES_TOTAL: &str = "cdc_stale_changes_total";

/// Counter of same-sequence records superseded by a later arrival.
pub const CDC_TIES_RESOLVED_TOTAL: &str = "cdc_ties_resolved_total";

// Store

/// Counter of commit and read retries.
pub const CDC_RETRIES_TOTAL: &str = "cdc_retries_total";

/// Counter of failed runs, labelled by error kind.
pub const CDC_WORKER_ERRORS_TOTAL: &str = "cdc_worker_errors_total";

/// Histogram of micro-batch processing time in seconds.
pub const CDC_BATCH_DURATION_SECONDS: &str = "cdc_batch_duration_seconds";

/// Histogram of the number of records per micro-batch.
pub const CDC_BATCH_SIZE: &str = "cdc_batch_size";
