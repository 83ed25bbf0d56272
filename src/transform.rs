// 🔄 Transform Stage
// Raw batch in, (clean, anomalies) out. Pure and synchronous: no I/O happens
// here, so independent batches can be transformed concurrently.

use crate::config::DetectionConfig;
use crate::error::TransformError;
use crate::model::{AnomalyReason, AnomalyRecord, CleanTransaction, RawBatch};
use crate::rules::AnomalyEngine;
use crate::schema::{DroppedRow, SchemaValidator};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Row accounting for one invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransformReport {
    pub raw_rows: usize,
    pub clean_rows: usize,
    pub dropped: Vec<DroppedRow>,
    pub anomalies_by_reason: BTreeMap<AnomalyReason, usize>,
}

impl TransformReport {
    pub fn dropped_rows(&self) -> usize {
        self.dropped.len()
    }

    pub fn anomaly_rows(&self) -> usize {
        self.anomalies_by_reason.values().sum()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} raw rows: {} clean, {} dropped, {} anomalies",
            self.raw_rows,
            self.clean_rows,
            self.dropped_rows(),
            self.anomaly_rows()
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformOutput {
    pub clean: Vec<CleanTransaction>,
    pub anomalies: Vec<AnomalyRecord>,
    pub report: TransformReport,
}

impl TransformOutput {
    pub fn into_parts(self) -> (Vec<CleanTransaction>, Vec<AnomalyRecord>) {
        (self.clean, self.anomalies)
    }
}

/// Validator + rule engine configured from one `DetectionConfig`
pub struct Transformer {
    validator: SchemaValidator,
    engine: AnomalyEngine,
}

impl Transformer {
    pub fn new(config: &DetectionConfig) -> Self {
        Transformer {
            validator: SchemaValidator::with_threshold(config.high_value_threshold),
            engine: AnomalyEngine::standard(config),
        }
    }

    pub fn with_parts(validator: SchemaValidator, engine: AnomalyEngine) -> Self {
        Transformer { validator, engine }
    }

    /// Clean the batch, then run every anomaly rule over the clean rows.
    ///
    /// A batch with no rows yields empty output whatever its columns are;
    /// otherwise a missing required column fails the whole call.
    pub fn transform(&self, batch: &RawBatch) -> Result<TransformOutput, TransformError> {
        if batch.is_empty() {
            return Ok(TransformOutput::default());
        }

        let raw = self.validator.select(batch)?;
        let outcome = self.validator.clean(&raw);
        let anomalies = self.engine.detect(&outcome.clean);

        let mut anomalies_by_reason = BTreeMap::new();
        for anomaly in &anomalies {
            *anomalies_by_reason.entry(anomaly.reason).or_insert(0) += 1;
        }

        let report = TransformReport {
            raw_rows: raw.len(),
            clean_rows: outcome.clean.len(),
            dropped: outcome.dropped,
            anomalies_by_reason,
        };
        info!(
            raw = report.raw_rows,
            clean = report.clean_rows,
            dropped = report.dropped_rows(),
            anomalies = anomalies.len(),
            "transform complete"
        );

        Ok(TransformOutput {
            clean: outcome.clean,
            anomalies,
            report,
        })
    }
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new(&DetectionConfig::default())
    }
}

/// Transform with the default thresholds
pub fn transform(batch: &RawBatch) -> Result<TransformOutput, TransformError> {
    Transformer::default().transform(batch)
}
