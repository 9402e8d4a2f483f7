// Column contracts for the three input tables.
//
// The transaction feed is a CJI3 export whose layout is frozen; every other
// stage addresses columns by name, so the whole column set is checked up front.

use crate::error::PriceError;
use crate::table::Table;
use std::collections::BTreeSet;

pub const COMPANY: &str = "Empresa";
pub const PROJECT_ELEMENT: &str = "Elemento PEP";
pub const MATERIAL: &str = "Material";
pub const QUANTITY: &str = "Qtd.total entrada";
pub const VALUE: &str = "Valor/moeda objeto";

pub const EQUIPMENT: &str = "Equipamento";
pub const DESCRIPTION: &str = "Descrição do Material";
pub const MAX_PU: &str = "MAX_PU";
pub const MIN_PU: &str = "MIN_PU";

pub const SERVICE_NUMBER: &str = "Nº serviço";

pub const TRANSACTION_COLUMNS: [&str; 34] = [
    COMPANY,
    PROJECT_ELEMENT,
    "Definição do projeto",
    "Objeto",
    "Denominação do objeto",
    "Classe de custo",
    "Denom.classe custo",
    MATERIAL,
    "Texto breve material",
    QUANTITY,
    "Unidade de medida lançada",
    VALUE,
    "Moeda do objeto",
    "Valor/MACC",
    "Moeda da área contab.custos",
    "Data de lançamento",
    "Período",
    "Exercício",
    "Nº documento",
    "Item de lançamento",
    "Tipo de documento",
    "Documento de referência",
    "Denominação",
    "Centro",
    "Centro de custo",
    "Fornecedor",
    "Nome do fornecedor",
    "Documento de compras",
    "Item",
    "Nº da ordem",
    "Operação",
    "Usuário",
    "Data de entrada",
    "Transação de origem",
];

pub const BASE_COLUMNS: [&str; 5] = [COMPANY, EQUIPMENT, DESCRIPTION, MAX_PU, MIN_PU];

pub const EXCEPTION_COLUMNS: [&str; 1] = [SERVICE_NUMBER];

/// Set difference between actual and expected columns, in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDiff {
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

impl ColumnDiff {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

/// Compare the table's header set against `expected`; order is ignored.
///
/// A header that appears more than once is reported under `extra`, since only
/// its first copy would ever be read.
pub fn diff_columns(table: &Table, expected: &[&str]) -> ColumnDiff {
    let mut actual: BTreeSet<&str> = BTreeSet::new();
    let mut repeated: BTreeSet<&str> = BTreeSet::new();
    for h in &table.headers {
        if !actual.insert(h.as_str()) {
            repeated.insert(h.as_str());
        }
    }
    let expected: BTreeSet<&str> = expected.iter().copied().collect();
    let mut extra: Vec<String> = actual.difference(&expected).map(|c| c.to_string()).collect();
    extra.extend(repeated.iter().map(|c| format!("{} (duplicate)", c)));
    ColumnDiff {
        missing: expected.difference(&actual).map(|c| c.to_string()).collect(),
        extra,
    }
}

/// Exact-set equality: extra columns fail just like missing ones.
pub fn validate_exact(table: &Table, expected: &[&str], table_name: &str) -> Result<(), PriceError> {
    let diff = diff_columns(table, expected);
    if diff.is_empty() {
        Ok(())
    } else {
        Err(PriceError::SchemaMismatch {
            table: table_name.to_string(),
            missing: diff.missing,
            extra: diff.extra,
        })
    }
}

/// Subset check: the listed columns must be present, others are tolerated.
pub fn require_columns(table: &Table, required: &[&str], table_name: &str) -> Result<(), PriceError> {
    let missing = diff_columns(table, required).missing;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(PriceError::MissingColumns {
            table: table_name.to_string(),
            columns: missing,
        })
    }
}

/// Resolve a column index after validation has passed.
pub fn column_index(table: &Table, name: &str, table_name: &str) -> Result<usize, PriceError> {
    table.column(name).ok_or_else(|| PriceError::MissingColumns {
        table: table_name.to_string(),
        columns: vec![name.to_string()],
    })
}
