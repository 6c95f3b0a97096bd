//! Column resolution and table projection.
//!
//! Resolves the requested output columns against the grouped rows. A few
//! column names are virtual (`Row`, `References`, the quantities,
//! `Status`, `Source BoM`); everything else reads the group's
//! representative field values. Unknown names warn and render blank.

use std::collections::{HashMap, HashSet};

use log::warn;

use crate::aggregate::SourceInfo;
use crate::config::RunContext;
use crate::group::ComponentGroup;
use crate::table::{BomTable, ColumnMeta, SourceStat, Stats};

pub const COL_ROW: &str = "row";
pub const COL_REFERENCES: &str = "references";
pub const COL_QTY: &str = "quantity per pcb";
pub const COL_BUILD_QTY: &str = "build quantity";
pub const COL_STATUS: &str = "status";
pub const COL_SOURCE: &str = "source bom";

/// Builtin columns resolved from the component record rather than the
/// field map.
const BUILTIN: &[&str] = &[
    "part",
    "part lib",
    "value",
    "footprint",
    "footprint lib",
    "datasheet",
    "sheetpath",
];

/// One entry of a column join list.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinEntry {
    /// Literal text, appended as-is.
    Text(String),
    /// A field, wrapped in its before/after text, skipped when empty.
    Field {
        field: String,
        before: String,
        after: String,
    },
}

impl JoinEntry {
    pub fn field(field: &str, before: &str, after: &str) -> Self {
        JoinEntry::Field {
            field: field.to_lowercase(),
            before: before.to_string(),
            after: after.to_string(),
        }
    }
}

/// A requested output column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Lowercased field reference.
    pub field: String,
    /// Display name for the header.
    pub name: String,
    pub join: Vec<JoinEntry>,
    pub level: u32,
    pub comment: String,
}

impl ColumnSpec {
    pub fn plain(name: &str) -> Self {
        Self {
            field: name.to_lowercase(),
            name: name.to_string(),
            join: Vec::new(),
            level: 0,
            comment: String::new(),
        }
    }
}

/// Project the grouped rows into the output table.
pub fn project(groups: &[ComponentGroup], ctx: &RunContext, sources: &[SourceInfo]) -> BomTable {
    let specs = match &ctx.columns {
        Some(specs) => specs.clone(),
        None => default_columns(groups, ctx, sources),
    };

    // Validate requested names against what the components actually
    // carry. Not fatal: the column renders blank.
    let universe = column_universe(groups);
    for spec in &specs {
        if !universe.contains(spec.field.as_str()) {
            warn!("Invalid column name `{}`", spec.name);
        }
    }

    let columns: Vec<ColumnMeta> = specs
        .iter()
        .map(|s| ColumnMeta {
            name: s.name.clone(),
            level: s.level,
            comment: s.comment.clone(),
        })
        .collect();

    let mut rows = Vec::new();
    let mut dnf_rows = Vec::new();
    let mut row_number = 0usize;
    for g in groups {
        row_number += 1;
        let row: Vec<String> = specs
            .iter()
            .map(|spec| resolve_cell(g, spec, ctx, sources, row_number))
            .collect();
        if g.fitted || !ctx.ignore_dnf {
            rows.push(row);
        } else {
            dnf_rows.push(row);
        }
    }

    let stats = stats(groups, ctx, sources);
    BomTable {
        columns,
        rows,
        dnf_rows,
        stats,
    }
}

fn resolve_cell(
    g: &ComponentGroup,
    spec: &ColumnSpec,
    ctx: &RunContext,
    sources: &[SourceInfo],
    row_number: usize,
) -> String {
    let mut text = match spec.field.as_str() {
        COL_ROW => row_number.to_string(),
        COL_REFERENCES => g.references(&ctx.ref_separator, ctx.use_alt),
        COL_QTY => g.count().to_string(),
        COL_BUILD_QTY => format_qty(g.build_quantity(sources, ctx.int_qtys)),
        COL_STATUS => status(g),
        COL_SOURCE => source_bom(g, ctx),
        field => g.field_value(field),
    };
    for entry in &spec.join {
        match entry {
            JoinEntry::Text(t) => text.push_str(t),
            JoinEntry::Field {
                field,
                before,
                after,
            } => {
                let value = g.field_value(field);
                if !value.is_empty() {
                    // A space separates joined fields unless the entry
                    // brings its own leading text.
                    if before.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(before);
                    text.push_str(&value);
                    text.push_str(after);
                }
            }
        }
    }
    text
}

fn status(g: &ComponentGroup) -> String {
    let mut parts = Vec::new();
    if !g.fitted {
        parts.push("DNF");
    }
    if g.fixed {
        parts.push("DNC");
    }
    parts.join(" ")
}

/// Projects contributing to this group, or their reference ids when
/// `source_by_id`.
fn source_bom(g: &ComponentGroup, ctx: &RunContext) -> String {
    let mut seen = Vec::new();
    for c in g.components() {
        let tag = if ctx.source_by_id { &c.ref_id } else { &c.project };
        if !seen.iter().any(|s| s == tag) {
            seen.push(tag.clone());
        }
    }
    seen.join(",")
}

fn format_qty(q: f64) -> String {
    if q.fract() == 0.0 {
        format!("{}", q as i64)
    } else {
        format!("{}", q)
    }
}

/// All names a column may legally reference: virtuals, builtins and the
/// user fields seen on any component.
fn column_universe(groups: &[ComponentGroup]) -> HashSet<String> {
    let mut names: HashSet<String> = [
        COL_ROW,
        COL_REFERENCES,
        COL_QTY,
        COL_BUILD_QTY,
        COL_STATUS,
        COL_SOURCE,
        "reference",
    ]
    .iter()
    .chain(BUILTIN)
    .map(|s| s.to_string())
    .collect();
    for g in groups {
        for c in g.components() {
            names.extend(c.field_names());
        }
    }
    names
}

/// The column list when none was configured: everything detected, in
/// display order, minus the library/sheetpath noise. `Build Quantity`
/// appears only when it can differ from the per-PCB count, `Source BoM`
/// only with aggregates.
fn default_columns(
    groups: &[ComponentGroup],
    ctx: &RunContext,
    sources: &[SourceInfo],
) -> Vec<ColumnSpec> {
    let mut specs = vec![
        ColumnSpec::plain("Row"),
        ColumnSpec::plain("Part"),
        ColumnSpec::plain("References"),
        ColumnSpec::plain("Value"),
        ColumnSpec::plain("Footprint"),
        ColumnSpec::plain("Datasheet"),
    ];

    // User fields, ordered the way the sources presented them.
    let mut user: HashMap<String, (i32, String)> = HashMap::new();
    for g in groups {
        for c in g.components() {
            for f in c.fields() {
                let key = f.name.to_lowercase();
                let entry = user.entry(key).or_insert((f.index, f.name.clone()));
                if f.index < entry.0 {
                    entry.0 = f.index;
                }
            }
        }
    }
    let mut user: Vec<(i32, String)> = user.into_values().collect();
    user.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    for (_, name) in user {
        specs.push(ColumnSpec::plain(&name));
    }

    specs.push(ColumnSpec::plain("Quantity Per PCB"));
    specs.push(ColumnSpec::plain("Status"));
    if ctx.number != 1.0 || sources.len() > 1 {
        specs.push(ColumnSpec::plain("Build Quantity"));
    }
    if sources.len() > 1 {
        specs.push(ColumnSpec::plain("Source BoM"));
    }
    specs
}

fn stats(groups: &[ComponentGroup], ctx: &RunContext, sources: &[SourceInfo]) -> Stats {
    let n_total: usize = groups.iter().map(|g| g.count()).sum();
    let n_fitted: usize = groups
        .iter()
        .filter(|g| g.fitted)
        .map(|g| g.count())
        .sum();
    let n_build: f64 = groups
        .iter()
        .filter(|g| g.fitted)
        .map(|g| g.build_quantity(sources, ctx.int_qtys))
        .sum();
    Stats {
        n_total,
        n_fitted,
        n_build,
        n_groups: groups.iter().filter(|g| g.fitted).count(),
        sources: sources
            .iter()
            .map(|s| SourceStat {
                name: s.name.clone(),
                ref_id: s.ref_id.clone(),
                number: s.number,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BomConfig;
    use crate::group::group_components;
    use bomgen_sch::Component;

    fn ctx_yaml(yaml: &str) -> RunContext {
        BomConfig::from_yaml(yaml).unwrap().resolve().unwrap()
    }

    fn main_source() -> Vec<SourceInfo> {
        vec![SourceInfo {
            name: "main".to_string(),
            ref_id: String::new(),
            number: 1.0,
        }]
    }

    fn resistor(reference: &str, value: &str) -> Component {
        let mut c = Component::new(reference, "main");
        c.part = "R".to_string();
        c.value = value.to_string();
        c.footprint = "Resistor_SMD:R_0603".to_string();
        c
    }

    fn table_for(comps: Vec<Component>, yaml: &str) -> BomTable {
        let ctx = ctx_yaml(yaml);
        let sources = main_source();
        let groups = group_components(comps, &ctx);
        project(&groups, &ctx, &sources)
    }

    fn header(table: &BomTable) -> Vec<&str> {
        table.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn default_columns_cover_detected_fields() {
        let mut r1 = resistor("R1", "1k");
        r1.add_field("Tolerance", "5%", 4);
        let table = table_for(vec![r1, resistor("R2", "4k7")], "{}");
        assert_eq!(
            header(&table),
            vec![
                "Row",
                "Part",
                "References",
                "Value",
                "Footprint",
                "Datasheet",
                "Tolerance",
                "Quantity Per PCB",
                "Status"
            ]
        );
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][0], "1");
        assert_eq!(table.rows[1][0], "2");
    }

    #[test]
    fn build_quantity_appears_with_multiple_boards() {
        let table = table_for(vec![resistor("R1", "1k")], "number: 5");
        assert!(header(&table).contains(&"Build Quantity"));
    }

    #[test]
    fn explicit_columns_with_rename() {
        let table = table_for(
            vec![resistor("R1", "1k")],
            "columns:\n  - References\n  - field: Value\n    name: Val\n",
        );
        assert_eq!(header(&table), vec!["References", "Val"]);
        assert_eq!(table.rows[0], vec!["R1", "1k"]);
    }

    #[test]
    fn join_appends_fields_with_separator_rule() {
        let mut r1 = resistor("R1", "1k");
        r1.add_field("Voltage", "50V", 4);
        r1.add_field("Power", "", 5);
        let table = table_for(
            vec![r1],
            r#"
columns:
  - field: Value
    join:
      - Voltage
      - field: Power
        text_before: ' ['
        text_after: ']'
"#,
        );
        // joined with a space; the empty Power field is skipped entirely
        assert_eq!(table.rows[0], vec!["1k 50V"]);
    }

    #[test]
    fn join_text_entry_is_literal() {
        let table = table_for(
            vec![resistor("R1", "1k")],
            "columns:\n  - field: Value\n    join:\n      - text: ' ohms'\n",
        );
        assert_eq!(table.rows[0], vec!["1k ohms"]);
    }

    #[test]
    fn unknown_column_renders_blank() {
        let table = table_for(
            vec![resistor("R1", "1k")],
            "columns:\n  - References\n  - NoSuchField\n",
        );
        assert_eq!(table.rows[0], vec!["R1", ""]);
    }

    #[test]
    fn dnf_goes_to_its_own_section() {
        let mut dnf = resistor("R2", "DNF");
        dnf.fitted = false;
        let table = table_for(
            vec![resistor("R1", "1k"), dnf],
            "columns: [References, Status]\n",
        );
        assert_eq!(table.rows, vec![vec!["R1".to_string(), String::new()]]);
        assert_eq!(
            table.dnf_rows,
            vec![vec!["R2".to_string(), "DNF".to_string()]]
        );

        // inline when DNF is not ignored
        let mut dnf = resistor("R2", "DNF");
        dnf.fitted = false;
        let table = table_for(
            vec![resistor("R1", "1k"), dnf],
            "ignore_dnf: false\ncolumns: [References, Status]\n",
        );
        assert_eq!(table.rows.len(), 2);
        assert!(table.dnf_rows.is_empty());
    }

    #[test]
    fn source_bom_lists_projects() {
        let mut other = resistor("B:R2", "1k");
        other.project = "sub".to_string();
        other.ref_id = "B:".to_string();
        let ctx = ctx_yaml("columns: [References, Source BoM]\n");
        let sources = vec![
            SourceInfo {
                name: "main".to_string(),
                ref_id: String::new(),
                number: 1.0,
            },
            SourceInfo {
                name: "sub".to_string(),
                ref_id: "B:".to_string(),
                number: 1.0,
            },
        ];
        let groups = group_components(vec![resistor("R1", "1k"), other], &ctx);
        let table = project(&groups, &ctx, &sources);
        assert_eq!(table.rows[0][1], "main,sub");

        let ctx = ctx_yaml("source_by_id: true\ncolumns: [References, Source BoM]\n");
        let groups = group_components(
            vec![resistor("R1", "1k"), {
                let mut c = resistor("B:R2", "1k");
                c.project = "sub".to_string();
                c.ref_id = "B:".to_string();
                c
            }],
            &ctx,
        );
        let table = project(&groups, &ctx, &sources);
        assert_eq!(table.rows[0][1], ",B:");
    }

    #[test]
    fn stats_count_fitted_only() {
        let mut dnf = resistor("R3", "DNF");
        dnf.fitted = false;
        let table = table_for(vec![resistor("R1", "1k"), resistor("R2", "1k"), dnf], "{}");
        assert_eq!(table.stats.n_total, 3);
        assert_eq!(table.stats.n_fitted, 2);
        assert_eq!(table.stats.n_build, 2.0);
        assert_eq!(table.stats.n_groups, 1);
    }
}
