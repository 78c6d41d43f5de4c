use std::collections::HashSet;

use crate::error::NotificationError;
use crate::notifications::{FanoutPayload, FanoutReport, NotificationRecord};

/// Build one record per distinct target, skipping the acting user.
///
/// The returned report has `delivered` set to the number of records built; the
/// caller lowers it if the write does not complete.
pub(crate) fn build_fanout_records(
    actor_id: &str,
    targets: &[String],
    payload: &FanoutPayload,
    created_at: i64,
) -> Result<(Vec<NotificationRecord>, FanoutReport), NotificationError> {
    if targets.iter().any(|t| t.is_empty()) {
        return Err(NotificationError::InvalidInput(
            "fan-out target id must not be empty".to_string(),
        ));
    }

    let mut report = FanoutReport::default();
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(targets.len());

    for target in targets {
        if target == actor_id {
            report.skipped_self += 1;
            continue;
        }
        if !seen.insert(target.as_str()) {
            report.skipped_duplicates += 1;
            continue;
        }
        records.push(payload.to_record(actor_id, target, created_at));
    }

    report.delivered = records.len();
    Ok((records, report))
}
