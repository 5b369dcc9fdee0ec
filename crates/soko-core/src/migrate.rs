//! One-time normalization of persisted status values.
//!
//! Earlier writers persisted mixed-case enum tokens. This pass lowercases
//! every status column and rejects anything outside the closed vocabulary,
//! so the engine starts from a clean snapshot. Ongoing writes go through the
//! typed enums in `status` and can never reintroduce the defect.

use crate::error::EngineError;
use crate::status::{
    BidStatus, CampaignStatus, ContentStatus, DeliverableStatus, DisputeStatus, EscrowStatus,
    PackageStatus, PaymentMethodKind, Platform, ProofStatus, TransactionStatus, TransactionType,
    VerificationStatus,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Every status-bearing column and its closed vocabulary.
pub const STATUS_COLUMNS: &[(&str, &str, &[&str])] = &[
    ("creator_profiles", "verification_status", VerificationStatus::TOKENS),
    ("packages", "platform", Platform::TOKENS),
    ("packages", "status", PackageStatus::TOKENS),
    ("payment_methods", "kind", PaymentMethodKind::TOKENS),
    ("wallet_transactions", "tx_type", TransactionType::TOKENS),
    ("wallet_transactions", "status", TransactionStatus::TOKENS),
    ("escrow_holds", "status", EscrowStatus::TOKENS),
    ("campaigns", "status", CampaignStatus::TOKENS),
    ("deliverables", "status", DeliverableStatus::TOKENS),
    ("deliverables", "platform", Platform::TOKENS),
    ("disputes", "status", DisputeStatus::TOKENS),
    ("bids", "status", BidStatus::TOKENS),
    ("proofs_of_work", "status", ProofStatus::TOKENS),
    ("campaign_contents", "status", ContentStatus::TOKENS),
];

/// A raw status cell read from a legacy snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStatusCell {
    pub table: String,
    pub column: String,
    pub row_id: String,
    pub value: String,
}

/// A cell whose value was case-folded to its canonical token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedCell {
    pub table: String,
    pub column: String,
    pub row_id: String,
    pub value: String,
}

/// Outcome of a normalization pass.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub scanned: usize,
    pub already_canonical: usize,
    pub normalized: Vec<NormalizedCell>,
}

pub fn vocabulary(table: &str, column: &str) -> Option<&'static [&'static str]> {
    STATUS_COLUMNS
        .iter()
        .find(|(t, c, _)| *t == table && *c == column)
        .map(|(_, _, tokens)| *tokens)
}

/// Lowercase a raw value and validate it against the column's vocabulary.
/// Unknown columns and out-of-vocabulary values fail rather than coerce.
pub fn normalize_value(table: &str, column: &str, raw: &str) -> Result<String, EngineError> {
    let tokens = vocabulary(table, column).ok_or_else(|| {
        EngineError::constraint(format!("no status vocabulary for {table}.{column}"))
    })?;
    let lowered = raw.trim().to_lowercase();
    if tokens.contains(&lowered.as_str()) {
        Ok(lowered)
    } else {
        Err(EngineError::constraint(format!(
            "value '{raw}' is not in the {table}.{column} vocabulary"
        )))
    }
}

/// Normalize a full snapshot of status cells. Fails on the first value that
/// cannot be mapped into its vocabulary; a partial fix is worse than none.
pub fn normalize_snapshot(cells: &[RawStatusCell]) -> Result<NormalizationReport, EngineError> {
    let mut report = NormalizationReport::default();
    for cell in cells {
        report.scanned += 1;
        let canonical = normalize_value(&cell.table, &cell.column, &cell.value)?;
        if canonical == cell.value {
            report.already_canonical += 1;
        } else {
            warn!(
                table = cell.table,
                column = cell.column,
                row_id = cell.row_id,
                from = cell.value,
                to = canonical,
                "normalizing legacy status value"
            );
            report.normalized.push(NormalizedCell {
                table: cell.table.clone(),
                column: cell.column.clone(),
                row_id: cell.row_id.clone(),
                value: canonical,
            });
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(table: &str, column: &str, value: &str) -> RawStatusCell {
        RawStatusCell {
            table: table.to_string(),
            column: column.to_string(),
            row_id: "row-1".to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn mixed_case_values_are_folded() {
        assert_eq!(
            normalize_value("campaigns", "status", "PENDING_REVIEW").unwrap(),
            "pending_review"
        );
        assert_eq!(
            normalize_value("bids", "status", "Accepted").unwrap(),
            "accepted"
        );
    }

    #[test]
    fn out_of_vocabulary_values_fail() {
        let err = normalize_value("campaigns", "status", "archived").unwrap_err();
        assert!(matches!(err, EngineError::ConstraintViolation(_)));
        let err = normalize_value("campaigns", "budget", "open").unwrap_err();
        assert!(matches!(err, EngineError::ConstraintViolation(_)));
    }

    #[test]
    fn snapshot_report_counts_changes() {
        let cells = vec![
            cell("bids", "status", "pending"),
            cell("bids", "status", "PAID"),
            cell("escrow_holds", "status", "Locked"),
        ];
        let report = normalize_snapshot(&cells).unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.already_canonical, 1);
        assert_eq!(report.normalized.len(), 2);
        assert_eq!(report.normalized[0].value, "paid");
    }

    #[test]
    fn snapshot_fails_whole_on_unknown_value() {
        let cells = vec![
            cell("bids", "status", "pending"),
            cell("bids", "status", "haggling"),
        ];
        assert!(normalize_snapshot(&cells).is_err());
    }

    #[test]
    fn every_column_has_lowercase_tokens() {
        for (table, column, tokens) in STATUS_COLUMNS {
            assert!(!tokens.is_empty(), "{table}.{column} has no tokens");
            for token in *tokens {
                assert_eq!(*token, token.to_lowercase());
            }
        }
    }
}
