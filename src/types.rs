use serde::Serialize;
use tabled::Tabled;

/// One CJI3 line after typing. Passthrough columns are not carried; they only
/// matter for the layout check.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub company: String,
    pub project_element: String,
    pub material: Option<String>,
    pub quantity: Option<f64>,
    pub value: Option<f64>,
}

/// A row of the reference (Base) table.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEntry {
    pub company: String,
    pub equipment: String,
    pub description: Option<String>,
    pub max_pu: Option<f64>,
    pub min_pu: Option<f64>,
}

/// Sums for one (company, project element, material) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub company: String,
    pub project_element: String,
    pub material: String,
    pub quantity: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deviation {
    /// Distance to the breached bound, rounded to cents.
    pub absolute: f64,
    /// `None` when the divisor was zero.
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    WithinRange,
    AboveMaximum(Deviation),
    BelowMinimum(Deviation),
    ReferenceNotFound,
}

impl Classification {
    pub fn label(&self) -> &'static str {
        match self {
            Classification::WithinRange => "Dentro da faixa",
            Classification::AboveMaximum(_) => "Acima do máximo",
            Classification::BelowMinimum(_) => "Abaixo do mínimo",
            Classification::ReferenceNotFound => "Referência não encontrada",
        }
    }

    pub fn deviation(&self) -> Option<Deviation> {
        match self {
            Classification::AboveMaximum(d) | Classification::BelowMinimum(d) => Some(*d),
            Classification::WithinRange | Classification::ReferenceNotFound => None,
        }
    }
}

/// A grouped record after pricing, reference lookup and judgement.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedRecord {
    pub company: String,
    pub project_element: String,
    pub material: String,
    pub description: Option<String>,
    pub quantity: f64,
    pub value: f64,
    pub unit_price: f64,
    pub max_pu: Option<f64>,
    pub min_pu: Option<f64>,
    pub classification: Classification,
}

/// Display form of a `PricedRecord`; missing values render as empty strings.
#[derive(Debug, Serialize, Tabled, Clone)]
pub struct ResultRow {
    #[serde(rename = "Empresa")]
    #[tabled(rename = "Empresa")]
    pub company: String,
    #[serde(rename = "Elemento PEP")]
    #[tabled(rename = "Elemento PEP")]
    pub project_element: String,
    #[serde(rename = "Material")]
    #[tabled(rename = "Material")]
    pub material: String,
    #[serde(rename = "Descrição do Material")]
    #[tabled(rename = "Descrição do Material")]
    pub description: String,
    #[serde(rename = "Qtd.total entrada")]
    #[tabled(rename = "Qtd.total entrada")]
    pub quantity: String,
    #[serde(rename = "Valor/moeda objeto")]
    #[tabled(rename = "Valor/moeda objeto")]
    pub value: String,
    #[serde(rename = "PU")]
    #[tabled(rename = "PU")]
    pub unit_price: String,
    #[serde(rename = "MAX_PU")]
    #[tabled(rename = "MAX_PU")]
    pub max_pu: String,
    #[serde(rename = "MIN_PU")]
    #[tabled(rename = "MIN_PU")]
    pub min_pu: String,
    #[serde(rename = "Desvio")]
    #[tabled(rename = "Desvio")]
    pub deviation: String,
    #[serde(rename = "Desvio %")]
    #[tabled(rename = "Desvio %")]
    pub deviation_pct: String,
    #[serde(rename = "Resultado")]
    #[tabled(rename = "Resultado")]
    pub result: String,
}

/// Row counts collected while the pipeline runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub input_rows: usize,
    pub exception_rows: usize,
    pub blank_material_rows: usize,
    pub reversal_rows: usize,
    pub unparsable_cells: usize,
    pub groups: usize,
    pub excluded_groups: usize,
    pub within_range: usize,
    pub above_maximum: usize,
    pub below_minimum: usize,
    pub reference_not_found: usize,
    pub duplicate_reference_codes: usize,
}

impl RunReport {
    pub fn tally(&mut self, classification: &Classification) {
        match classification {
            Classification::WithinRange => self.within_range += 1,
            Classification::AboveMaximum(_) => self.above_maximum += 1,
            Classification::BelowMinimum(_) => self.below_minimum += 1,
            Classification::ReferenceNotFound => self.reference_not_found += 1,
        }
    }

    pub fn reported(&self) -> usize {
        self.within_range + self.above_maximum + self.below_minimum + self.reference_not_found
    }
}
