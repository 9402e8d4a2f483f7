use crate::error::Result;
use crate::schema::{
    self, BASE_COLUMNS, COMPANY, DESCRIPTION, EQUIPMENT, EXCEPTION_COLUMNS, MATERIAL, MAX_PU,
    MIN_PU, PROJECT_ELEMENT, QUANTITY, SERVICE_NUMBER, TRANSACTION_COLUMNS, VALUE,
};
use crate::table::{Cell, Table};
use crate::types::{ReferenceEntry, Transaction};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{info, warn};

pub const TRANSACTIONS_TABLE: &str = "CJI3";
pub const BASE_TABLE: &str = "Base";
pub const EXCEPTIONS_TABLE: &str = "Exceções";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub unparsable_cells: usize,
}

/// Type the rows of a CJI3 export.
///
/// The column layout must match exactly; nothing is typed otherwise. A
/// non-empty quantity or value that fails to parse is counted and treated as
/// missing, which contributes nothing to the group sums.
pub fn load_transactions(table: &Table) -> Result<(Vec<Transaction>, LoadReport)> {
    schema::validate_exact(table, &TRANSACTION_COLUMNS, TRANSACTIONS_TABLE)?;

    let company = schema::column_index(table, COMPANY, TRANSACTIONS_TABLE)?;
    let pep = schema::column_index(table, PROJECT_ELEMENT, TRANSACTIONS_TABLE)?;
    let material = schema::column_index(table, MATERIAL, TRANSACTIONS_TABLE)?;
    let quantity = schema::column_index(table, QUANTITY, TRANSACTIONS_TABLE)?;
    let value = schema::column_index(table, VALUE, TRANSACTIONS_TABLE)?;

    let mut unparsable_cells = 0usize;
    let mut number = |cell: &Cell| {
        let parsed = cell.as_number();
        if parsed.is_none() && !cell.is_empty() {
            unparsable_cells += 1;
        }
        parsed
    };

    let mut rows = Vec::with_capacity(table.len());
    for row in &table.rows {
        rows.push(Transaction {
            company: row[company].as_text().unwrap_or_default(),
            project_element: row[pep].as_text().unwrap_or_default(),
            material: row[material].as_text(),
            quantity: number(&row[quantity]),
            value: number(&row[value]),
        });
    }

    if unparsable_cells > 0 {
        warn!(unparsable_cells, "non-numeric quantity/value cells treated as missing");
    }
    let report = LoadReport {
        total_rows: rows.len(),
        unparsable_cells,
    };
    Ok((rows, report))
}

/// Reference bounds keyed by equipment code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceTable {
    entries: HashMap<String, ReferenceEntry>,
    duplicates: Vec<String>,
}

impl ReferenceTable {
    /// Build the lookup from a Base table. When an equipment code appears more
    /// than once, the first row wins and the code is listed in `duplicates`.
    pub fn from_table(table: &Table) -> Result<Self> {
        schema::require_columns(table, &BASE_COLUMNS, BASE_TABLE)?;
        let company = schema::column_index(table, COMPANY, BASE_TABLE)?;
        let equipment = schema::column_index(table, EQUIPMENT, BASE_TABLE)?;
        let description = schema::column_index(table, DESCRIPTION, BASE_TABLE)?;
        let max_pu = schema::column_index(table, MAX_PU, BASE_TABLE)?;
        let min_pu = schema::column_index(table, MIN_PU, BASE_TABLE)?;

        let mut entries: HashMap<String, ReferenceEntry> = HashMap::new();
        let mut duplicates: BTreeSet<String> = BTreeSet::new();
        for row in &table.rows {
            let Some(code) = row[equipment].as_text() else {
                continue;
            };
            if entries.contains_key(&code) {
                duplicates.insert(code);
                continue;
            }
            entries.insert(
                code.clone(),
                ReferenceEntry {
                    company: row[company].as_text().unwrap_or_default(),
                    equipment: code,
                    description: row[description].as_text(),
                    max_pu: row[max_pu].as_number(),
                    min_pu: row[min_pu].as_number(),
                },
            );
        }

        if !duplicates.is_empty() {
            warn!(
                count = duplicates.len(),
                codes = ?duplicates,
                "duplicate equipment codes in reference table; first row kept"
            );
        }
        Ok(Self {
            entries,
            duplicates: duplicates.into_iter().collect(),
        })
    }

    pub fn lookup(&self, code: &str) -> Option<&ReferenceEntry> {
        self.entries.get(code)
    }

    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Service numbers of materials exempt from price governance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExceptionSet {
    codes: HashSet<String>,
}

impl ExceptionSet {
    pub fn from_table(table: &Table) -> Result<Self> {
        schema::require_columns(table, &EXCEPTION_COLUMNS, EXCEPTIONS_TABLE)?;
        let key = schema::column_index(table, SERVICE_NUMBER, EXCEPTIONS_TABLE)?;
        let codes = table.rows.iter().filter_map(|row| row[key].as_text()).collect();
        Ok(Self { codes })
    }

    #[cfg(test)]
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// The Base/Exception pair a pipeline run judges against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceData {
    pub base: ReferenceTable,
    pub exceptions: ExceptionSet,
}

impl ReferenceData {
    pub fn from_tables(base: &Table, exceptions: &Table) -> Result<Self> {
        let data = Self {
            base: ReferenceTable::from_table(base)?,
            exceptions: ExceptionSet::from_table(exceptions)?,
        };
        info!(
            references = data.base.len(),
            exceptions = data.exceptions.len(),
            "reference data loaded"
        );
        Ok(data)
    }
}
