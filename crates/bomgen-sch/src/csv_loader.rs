//! CSV component loader for aggregated sources.
//!
//! The first row must contain the field names, matched case-insensitively.
//! `Reference`/`References` and `Value` are mandatory; `Part` is strongly
//! recommended for passives (grouping degrades to the value string without
//! it). Unrecognized columns become ordinary fields with synthetic order
//! indices past the header width.

use std::path::Path;

use log::warn;
use thiserror::Error;

use crate::Component;

#[derive(Debug, Error)]
pub enum CsvLoadError {
    /// A mandatory column is absent. This is a configuration error: the
    /// aggregate source cannot be used as configured.
    #[error("missing `{column}` column in aggregated file `{file}`")]
    MissingColumn { column: String, file: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Load components from a CSV file. `accept_no_ref` downgrades a missing
/// reference column to a warning, accepting rows without references.
pub fn load_csv(
    path: &Path,
    project: &str,
    delimiter: u8,
    accept_no_ref: bool,
) -> Result<Vec<Component>, CsvLoadError> {
    let file = path.display().to_string();
    log::debug!("Importing components from `{}`", file);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;
    let header: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    log::debug!("- CSV header {:?}", header);

    let find = |names: &[&str]| header.iter().position(|h| names.contains(&h.as_str()));

    let ref_index = find(&["reference", "references"]);
    if ref_index.is_none() {
        if accept_no_ref {
            warn!("Missing `Reference` column in `{}`, accepting rows without references", file);
        } else {
            return Err(CsvLoadError::MissingColumn {
                column: "Reference".to_string(),
                file,
            });
        }
    }
    let val_index = find(&["value"]).ok_or_else(|| CsvLoadError::MissingColumn {
        column: "Value".to_string(),
        file: file.clone(),
    })?;
    let fp_index = find(&["footprint"]);
    let ds_index = find(&["datasheet"]);
    let pl_index = find(&["part lib"]);
    let pn_index = find(&["part"]);
    if pn_index.is_none() {
        warn!("No `Part` column in `{}`, using `Value` instead, this can impact the grouping", file);
    }

    let min_num = header.len() as i32;
    let mut comps = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut c = Component::new("", project);
        c.sheet_path = format!("/{}", project);
        for (n, raw) in record.iter().enumerate() {
            if Some(n) == ref_index {
                c.reference = raw.into();
            } else if n == val_index {
                c.value = raw.to_string();
                if pn_index.is_none() {
                    c.part = raw.to_string();
                }
            } else if Some(n) == fp_index {
                c.footprint = raw.to_string();
            } else if Some(n) == ds_index {
                c.datasheet = raw.to_string();
            } else if Some(n) == pn_index {
                c.part = raw.to_string();
            } else if Some(n) == pl_index {
                c.part_lib = raw.to_string();
            } else if let Some(name) = header.get(n).filter(|h| !h.is_empty()) {
                c.add_field(name.clone(), raw, min_num + n as i32);
            }
        }
        comps.push(c);
    }

    comps.sort_by(|a, b| a.reference.cmp(&b.reference));
    Ok(comps)
}
