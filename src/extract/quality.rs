//! All-or-nothing quality gate between the cheap text stages and the
//! expensive OCR / vision stages.

use crate::config::QualityThresholds;
use crate::record::Record;
use tracing::info;

/// Outcome of the gate over a full document's cheap-stage rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The cheap result is kept and the cascade stops.
    Accept,
    /// The cheap result is discarded in full and the document escalates.
    Escalate,
}

/// Judge the cheap-stage output for a whole document.
///
/// The gate rejects when the row count is below `min_rows` or when the
/// share of rows carrying a product code is below `min_code_ratio`.
/// An empty result always escalates.
pub fn evaluate(records: &[Record], thresholds: &QualityThresholds) -> GateDecision {
    if records.is_empty() {
        info!("quality gate: no rows, escalating");
        return GateDecision::Escalate;
    }

    let with_code = records
        .iter()
        .filter(|r| r.code.as_deref().is_some_and(|c| !c.is_empty()))
        .count();
    let code_ratio = with_code as f64 / records.len() as f64;

    let decision = if records.len() < thresholds.min_rows || code_ratio < thresholds.min_code_ratio
    {
        GateDecision::Escalate
    } else {
        GateDecision::Accept
    };
    info!(
        rows = records.len(),
        code_ratio = format!("{code_ratio:.2}"),
        min_rows = thresholds.min_rows,
        min_code_ratio = thresholds.min_code_ratio,
        decision = ?decision,
        "quality gate"
    );
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn batch(total: usize, with_code: usize) -> Vec<Record> {
        (0..total)
            .map(|i| Record {
                code: (i < with_code).then(|| format!("AB-{i}")),
                description: format!("Item {i}"),
                short_code: None,
                price: dec!(10.00),
                currency: "TRY".to_string(),
                brand: None,
                source_file: "list.pdf".to_string(),
                source_page: Some(1),
                record_code: String::new(),
                section_title: None,
                subsection_title: None,
                year: None,
            })
            .collect()
    }

    fn thresholds() -> QualityThresholds {
        QualityThresholds::default()
    }

    #[test]
    fn empty_result_escalates() {
        assert_eq!(evaluate(&[], &thresholds()), GateDecision::Escalate);
    }

    #[test]
    fn too_few_rows_escalate() {
        let records = batch(400, 400);
        assert_eq!(evaluate(&records, &thresholds()), GateDecision::Escalate);
    }

    #[test]
    fn thin_code_coverage_escalates() {
        let records = batch(1000, 650);
        assert_eq!(evaluate(&records, &thresholds()), GateDecision::Escalate);
    }

    #[test]
    fn dense_result_is_accepted() {
        let records = batch(1000, 900);
        assert_eq!(evaluate(&records, &thresholds()), GateDecision::Accept);
    }

    #[test]
    fn thresholds_are_configurable() {
        let records = batch(10, 10);
        let lax = QualityThresholds {
            min_rows: 5,
            min_code_ratio: 0.5,
        };
        assert_eq!(evaluate(&records, &lax), GateDecision::Accept);
    }
}
