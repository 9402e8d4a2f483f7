// Price reconciliation pipeline.
//
// raw CJI3 table → layout check → exception filter → unpriceable rows dropped
// → grouping by (company, project element, material) → unit price →
// range classification with deviation.
//
// Each stage borrows its input and returns new rows, so the caller's tables
// and the cached reference data are never modified.

use crate::error::Result;
use crate::loader::{load_transactions, ExceptionSet, ReferenceData};
use crate::table::Table;
use crate::types::{
    Classification, Deviation, Group, PricedRecord, ReferenceEntry, RunReport, Transaction,
};
use crate::util::round2;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Sums closer to zero than this are treated as zero.
const ZERO_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOptions {
    /// Project elements ending with this suffix are reversal entries.
    pub reversal_suffix: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineOutput {
    pub records: Vec<PricedRecord>,
    pub report: RunReport,
}

/// Run every stage over a raw CJI3 table.
///
/// Fails without producing records when the table layout does not match.
/// Everything after that is handled per row or per group.
pub fn run(table: &Table, reference: &ReferenceData, options: &PipelineOptions) -> Result<PipelineOutput> {
    let (rows, load) = load_transactions(table)?;
    let mut report = RunReport {
        input_rows: load.total_rows,
        unparsable_cells: load.unparsable_cells,
        duplicate_reference_codes: reference.base.duplicates().len(),
        ..RunReport::default()
    };

    let filtered = filter_exceptions(&rows, &reference.exceptions);
    report.exception_rows = rows.len() - filtered.len();

    let (priceable, dropped) = drop_unpriceable(&filtered, options.reversal_suffix.as_deref());
    report.blank_material_rows = dropped.blank_material;
    report.reversal_rows = dropped.reversal;

    let groups = aggregate(&priceable);
    report.groups = groups.len();

    let records = price_groups(&groups, reference, &mut report);

    info!(
        input_rows = report.input_rows,
        exception_rows = report.exception_rows,
        groups = report.groups,
        excluded = report.excluded_groups,
        within = report.within_range,
        above = report.above_maximum,
        below = report.below_minimum,
        not_found = report.reference_not_found,
        "price reconciliation finished"
    );
    Ok(PipelineOutput { records, report })
}

/// Remove rows whose material is listed as an exception.
pub fn filter_exceptions(rows: &[Transaction], exceptions: &ExceptionSet) -> Vec<Transaction> {
    if exceptions.is_empty() {
        return rows.to_vec();
    }
    rows.iter()
        .filter(|r| !matches!(&r.material, Some(m) if exceptions.contains(m)))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DroppedRows {
    pub blank_material: usize,
    pub reversal: usize,
}

/// Drop rows that cannot be priced: no material code, or a reversal entry.
pub fn drop_unpriceable(rows: &[Transaction], reversal_suffix: Option<&str>) -> (Vec<Transaction>, DroppedRows) {
    let mut dropped = DroppedRows::default();
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        if row.material.is_none() {
            dropped.blank_material += 1;
            continue;
        }
        if matches!(reversal_suffix, Some(suffix) if row.project_element.ends_with(suffix)) {
            dropped.reversal += 1;
            continue;
        }
        kept.push(row.clone());
    }
    debug!(
        blank_material = dropped.blank_material,
        reversal = dropped.reversal,
        "unpriceable rows dropped"
    );
    (kept, dropped)
}

/// Sum quantity and value per (company, project element, material).
///
/// Groups come out in key order. Missing numbers contribute nothing.
pub fn aggregate(rows: &[Transaction]) -> Vec<Group> {
    let mut map: BTreeMap<(String, String, String), (f64, f64)> = BTreeMap::new();
    for r in rows {
        let Some(material) = &r.material else {
            continue;
        };
        let key = (r.company.clone(), r.project_element.clone(), material.clone());
        let e = map.entry(key).or_insert((0.0, 0.0));
        e.0 += r.quantity.unwrap_or(0.0);
        e.1 += r.value.unwrap_or(0.0);
    }
    map.into_iter()
        .map(|((company, project_element, material), (quantity, value))| Group {
            company,
            project_element,
            material,
            quantity,
            value,
        })
        .collect()
}

/// `value / quantity` rounded to cents; `None` when either sum is zero.
pub fn unit_price(quantity: f64, value: f64) -> Option<f64> {
    if quantity.abs() < ZERO_TOLERANCE || value.abs() < ZERO_TOLERANCE {
        return None;
    }
    Some(round2(value / quantity))
}

/// Judge a unit price against its reference bounds.
///
/// Both bounds must be present for the range to be checked; above-maximum is
/// tested before below-minimum.
pub fn classify(unit_price: f64, reference: Option<&ReferenceEntry>) -> Classification {
    let bounds = reference.and_then(|r| Some((r.max_pu?, r.min_pu?)));
    let Some((max, min)) = bounds else {
        return Classification::ReferenceNotFound;
    };
    if unit_price > max {
        Classification::AboveMaximum(deviation(unit_price - max, unit_price))
    } else if unit_price < min {
        Classification::BelowMinimum(deviation(min - unit_price, min))
    } else {
        Classification::WithinRange
    }
}

fn deviation(absolute: f64, divisor: f64) -> Deviation {
    let percent = if divisor.abs() < ZERO_TOLERANCE {
        None
    } else {
        Some(round2(absolute / divisor * 100.0))
    };
    Deviation {
        absolute: round2(absolute),
        percent,
    }
}

/// Price, look up and classify each group. Groups without a unit price are
/// left out and counted as excluded.
pub fn price_groups(groups: &[Group], reference: &ReferenceData, report: &mut RunReport) -> Vec<PricedRecord> {
    let mut records = Vec::with_capacity(groups.len());
    for g in groups {
        let Some(pu) = unit_price(g.quantity, g.value) else {
            report.excluded_groups += 1;
            continue;
        };
        let entry = reference.base.lookup(&g.material);
        if let Some(e) = entry.filter(|e| !e.company.is_empty() && e.company != g.company) {
            debug!(
                equipment = %e.equipment,
                reference_company = %e.company,
                company = %g.company,
                "reference row belongs to another company"
            );
        }
        let classification = classify(pu, entry);
        report.tally(&classification);
        records.push(PricedRecord {
            company: g.company.clone(),
            project_element: g.project_element.clone(),
            material: g.material.clone(),
            description: entry.and_then(|e| e.description.clone()),
            quantity: g.quantity,
            value: g.value,
            unit_price: pu,
            max_pu: entry.and_then(|e| e.max_pu),
            min_pu: entry.and_then(|e| e.min_pu),
            classification,
        });
    }
    records
}
