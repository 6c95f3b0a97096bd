//! Bill-of-Materials generation engine.
//!
//! Turns a flat list of [`bomgen_sch::Component`]s into a grouped,
//! quantified table. The pipeline is strictly staged: aggregation of
//! auxiliary sources, the filter/variant pipeline, the grouping engine and
//! finally column projection into an abstract [`table::BomTable`] that the
//! sink writers serialize.
//!
//! Every stage takes an explicit [`config::RunContext`]; there is no
//! ambient configuration state, so separate runs are independent.

pub mod aggregate;
pub mod columns;
pub mod config;
#[cfg(feature = "table")]
mod console;
pub mod filter;
pub mod group;
pub mod table;
pub mod writer;

use bomgen_sch::csv_loader::CsvLoadError;
use bomgen_sch::netlist::NetlistError;
use bomgen_sch::Component;

pub use config::{BomConfig, RunContext};
pub use table::BomTable;

/// Errors produced by the BoM pipeline.
///
/// `Config` is the fatal configuration-error kind: the run cannot proceed
/// as configured and the message is meant for the user. I/O and CSV
/// errors keep their own variants so callers can tell a bad config from
/// an unreadable file.
#[derive(Debug, thiserror::Error)]
pub enum BomError {
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("failed to parse netlist: {0}")]
    Netlist(#[from] NetlistError),
}

impl BomError {
    pub fn config(msg: impl Into<String>) -> Self {
        BomError::Config(msg.into())
    }
}

impl From<CsvLoadError> for BomError {
    fn from(e: CsvLoadError) -> Self {
        match e {
            CsvLoadError::MissingColumn { .. } => BomError::Config(e.to_string()),
            CsvLoadError::Csv(e) => BomError::Csv(e),
            CsvLoadError::Io(e) => BomError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, BomError>;

/// Run the whole pipeline: aggregate auxiliary sources onto the primary
/// component list, apply the filter stages in their fixed order, group,
/// and project into the output table.
pub fn generate(primary: Vec<Component>, project: &str, ctx: &RunContext) -> Result<BomTable> {
    let mut agg = aggregate::aggregate(primary, project, ctx)?;

    filter::reset_flags(&mut agg.comps);
    filter::apply_exclude_marked(
        &mut agg.comps,
        ctx.exclude_marked_in_sch,
        ctx.exclude_marked_in_pcb,
    );
    filter::apply_pre_transform(&mut agg.comps, &ctx.pre_transform);
    filter::apply_exclude_filter(&mut agg.comps, &ctx.exclude_filter);
    filter::apply_fitted_filter(&mut agg.comps, &ctx.dnf_filter);
    filter::apply_fixed_filter(&mut agg.comps, &ctx.dnc_filter);
    ctx.variant.apply(&mut agg.comps);
    if ctx.expand_text_vars {
        // Variant-driven rewrites must be visible in expanded text.
        filter::apply_pre_transform(&mut agg.comps, &[filter::Filter::ExpandTextVars]);
    }

    let groups = group::group_components(agg.comps, ctx);
    Ok(columns::project(&groups, ctx, &agg.sources))
}
