//! Multi-source component aggregation.
//!
//! The primary project always contributes first; auxiliary sources are
//! loaded by extension (netlist export or CSV), get their reference-id
//! prefix applied and their board multiplier recorded. A missing
//! aggregate file aborts the run as a configuration error.

use std::path::Path;

use bomgen_sch::{csv_loader, netlist, Component};
use log::{debug, warn};

use crate::config::RunContext;
use crate::{BomError, Result};

/// A contributing project, in insertion order (primary first).
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub name: String,
    pub ref_id: String,
    /// Board multiplier; negative subtracts components already counted
    /// elsewhere.
    pub number: f64,
}

#[derive(Debug)]
pub struct Aggregated {
    pub comps: Vec<Component>,
    pub sources: Vec<SourceInfo>,
}

/// Merge the primary component list with all configured aggregate
/// sources.
pub fn aggregate(
    primary: Vec<Component>,
    project: &str,
    ctx: &RunContext,
) -> Result<Aggregated> {
    let mut comps = primary;
    for c in &mut comps {
        c.project = project.to_string();
        c.apply_ref_id(&ctx.ref_id);
    }
    let mut sources = vec![SourceInfo {
        name: project.to_string(),
        ref_id: ctx.ref_id.clone(),
        number: ctx.number,
    }];

    for src in &ctx.aggregate {
        if !src.file.is_file() {
            return Err(BomError::config(format!("Missing `{}`", src.file.display())));
        }
        debug!(
            "Adding components from project {} ({}) using reference id `{}`",
            src.name,
            src.file.display(),
            src.ref_id
        );
        let mut new_comps = load_source(&src.file, &src.name, src.delimiter, ctx.accept_no_ref)?;
        for c in &mut new_comps {
            c.apply_ref_id(&src.ref_id);
        }
        comps.extend(new_comps);
        sources.push(SourceInfo {
            name: src.name.clone(),
            ref_id: src.ref_id.clone(),
            number: src.number,
        });
    }

    warn_on_collisions(&comps);
    Ok(Aggregated { comps, sources })
}

fn load_source(
    file: &Path,
    project: &str,
    delimiter: u8,
    accept_no_ref: bool,
) -> Result<Vec<Component>> {
    match file.extension().and_then(|e| e.to_str()) {
        Some("net") => {
            let text = std::fs::read_to_string(file)?;
            Ok(netlist::parse_netlist(&text, project)?)
        }
        _ => Ok(csv_loader::load_csv(file, project, delimiter, accept_no_ref)?),
    }
}

/// Reference-id prefixes exist to keep references unique across sources;
/// surface it when they fail at that.
fn warn_on_collisions(comps: &[Component]) {
    let mut by_ref: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for c in comps {
        if !c.reference.as_str().is_empty() {
            *by_ref.entry(c.reference.as_str()).or_insert(0) += 1;
        }
    }
    for (reference, count) in by_ref {
        if count > 1 {
            warn!(
                "Reference `{}` appears {} times across sources; use distinct `ref_id` prefixes",
                reference, count
            );
        }
    }
}
