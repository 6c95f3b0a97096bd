//! The abstract output table handed to the sink writers.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Nesting level, for sinks that can collapse column groups.
    pub level: u32,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStat {
    pub name: String,
    pub ref_id: String,
    pub number: f64,
}

/// Run statistics, for the sinks that display them.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    /// Components that reached grouping (excluded ones are gone).
    pub n_total: usize,
    /// Fitted components.
    pub n_fitted: usize,
    /// Total build quantity over fitted groups.
    pub n_build: f64,
    /// Number of fitted groups.
    pub n_groups: usize,
    pub sources: Vec<SourceStat>,
}

/// Header, grouped data rows and the optional separate DNF section.
#[derive(Debug, Clone, Serialize)]
pub struct BomTable {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Vec<String>>,
    /// Not-fitted groups, when DNF components are kept out of the main
    /// section.
    pub dnf_rows: Vec<Vec<String>>,
    pub stats: Stats,
}

impl BomTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.dnf_rows.is_empty()
    }

    /// Column names, in order.
    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}
