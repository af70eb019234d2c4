use config::shared::ExpectationAction;
use std::collections::BTreeMap;
use tracing::debug;

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::types::{ChangeOperation, ChangeRecord};
use crate::validation::predicate::Predicate;
use crate::validation::rule::ValidationRule;

/// Outcome of validating one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// The record continues to the sequencer. `warnings` lists the violated `warn` rules.
    Admitted {
        record: ChangeRecord,
        warnings: Vec<String>,
    },
    /// The record violated at least one `drop` rule and is discarded.
    ///
    /// `violated` lists every violated rule, `warn` rules included.
    Dropped {
        record: ChangeRecord,
        violated: Vec<String>,
    },
}

/// Counters of a validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub admitted: u64,
    pub dropped: u64,
    pub warned: u64,
    /// Number of records that violated each rule.
    pub violations: BTreeMap<String, u64>,
}

impl ValidationReport {
    /// Accounts for one validation outcome.
    pub fn observe(&mut self, validation: &Validation) {
        let rules = match validation {
            Validation::Admitted { warnings, .. } => {
                self.admitted += 1;
                if !warnings.is_empty() {
                    self.warned += 1;
                }
                warnings
            }
            Validation::Dropped { violated, .. } => {
                self.dropped += 1;
                violated
            }
        };

        for rule in rules {
            *self.violations.entry(rule.clone()).or_default() += 1;
        }
    }

    /// Adds the counters of `other`.
    pub fn merge(&mut self, other: &ValidationReport) {
        self.admitted += other.admitted;
        self.dropped += other.dropped;
        self.warned += other.warned;
        for (rule, count) in &other.violations {
            *self.violations.entry(rule.clone()).or_default() += count;
        }
    }
}

/// Applies the rules of a target to incoming records.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: Vec<ValidationRule>,
    deletes: Option<Predicate>,
}

impl Validator {
    /// Creates a validator.
    ///
    /// Records matching `deletes` are admitted as deletes.
    pub fn new(rules: Vec<ValidationRule>, deletes: Option<Predicate>) -> Self {
        Self { rules, deletes }
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    /// Validates one record against every rule.
    ///
    /// A violated `fail` rule aborts with [`ErrorKind::ExpectationFailed`].
    pub fn validate(&self, mut record: ChangeRecord) -> CdcResult<Validation> {
        let mut violated = Vec::new();
        let mut dropping = false;
        let mut failing = Vec::new();

        for rule in &self.rules {
            if rule.is_satisfied(&record.values) {
                continue;
            }

            match rule.action() {
                ExpectationAction::Warn => {}
                ExpectationAction::Drop => dropping = true,
                ExpectationAction::Fail => failing.push(rule.name()),
            }
            violated.push(rule.name().to_string());
        }

        if !failing.is_empty() {
            bail!(
                ErrorKind::ExpectationFailed,
                "A record violated a failing expectation",
                format!(
                    "Record at offset {} violated {}",
                    record.offset,
                    failing.join(", ")
                )
            );
        }

        if dropping {
            return Ok(Validation::Dropped { record, violated });
        }

        if let Some(deletes) = &self.deletes {
            if deletes.evaluate(&record.values).is_true() {
                record.operation = ChangeOperation::Delete;
            }
        }

        Ok(Validation::Admitted {
            record,
            warnings: violated,
        })
    }

    /// Validates a batch, returning the admitted records in arrival order.
    pub fn validate_batch(
        &self,
        target: &str,
        records: Vec<ChangeRecord>,
        report: &mut ValidationReport,
    ) -> CdcResult<Vec<ChangeRecord>> {
        let mut admitted = Vec::with_capacity(records.len());

        for record in records {
            let validation = self.validate(record)?;
            report.observe(&validation);

            match validation {
                Validation::Admitted { record, .. } => admitted.push(record),
                Validation::Dropped { record, violated } => {
                    debug!(
                        target_name = target,
                        offset = record.offset,
                        rules = ?violated,
                        "dropped record violating expectations"
                    );
                }
            }
        }

        Ok(admitted)
    }
}
