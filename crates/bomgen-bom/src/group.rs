//! The grouping engine: partition the filtered component list into BoM
//! rows.
//!
//! Two components share a group iff *all* fields in `group_fields`
//! compare equal under the blank-merge rules, with `Value` compared
//! through the normalizer and part names mapped through the alias table.
//! Comparison is pairwise against the group, never a hash bucket: blank
//! fields act as wildcards (when enabled) and the group adopts the
//! non-blank value.

use std::collections::{BTreeSet, HashMap};

use bomgen_sch::value::{self, Canonical, PassiveKind};
use bomgen_sch::{Component, RefDes};
use log::warn;

use crate::aggregate::SourceInfo;
use crate::config::{RunContext, SortStyle};

/// A recorded disagreement on a non-key field inside a group.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub field: String,
    pub reference: RefDes,
    pub kept: String,
    pub other: String,
}

/// A set of components considered identical for reporting.
#[derive(Debug)]
pub struct ComponentGroup {
    components: Vec<Component>,
    /// Non-blank values adopted for key fields that were blank on the
    /// first member.
    adopted: HashMap<String, String>,
    pub fitted: bool,
    pub fixed: bool,
    pub conflicts: Vec<Conflict>,
    /// The whole grouping key was blank at creation: the group stays a
    /// singleton.
    blank_key: bool,
}

impl ComponentGroup {
    fn new(c: Component, blank_key: bool) -> Self {
        Self {
            fitted: c.fitted,
            fixed: c.fixed,
            components: vec![c],
            adopted: HashMap::new(),
            conflicts: Vec::new(),
            blank_key,
        }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Representative component: the first one merged in.
    pub fn representative(&self) -> &Component {
        &self.components[0]
    }

    /// Number of placed parts in this group (per a single board set).
    pub fn count(&self) -> usize {
        self.components.len()
    }

    /// The display value for a field: the adopted (blank-merged) value if
    /// any, the representative's otherwise.
    pub fn field_value(&self, field: &str) -> String {
        if let Some(v) = self.adopted.get(field) {
            return v.clone();
        }
        self.representative()
            .field(field)
            .unwrap_or_default()
            .to_string()
    }

    /// Group side of a key-field comparison.
    fn key_value(&self, field: &str, fallback: Option<&str>, ctx: &RunContext) -> String {
        if let Some(v) = self.adopted.get(field) {
            return v.clone();
        }
        key_field_raw(self.representative(), field, fallback, ctx)
    }

    /// Whether `c` belongs in this group.
    fn matches(&self, c: &Component, ctx: &RunContext) -> bool {
        if self.blank_key {
            return false;
        }
        // Fitted and not-fitted parts never share a row.
        if self.fitted != c.fitted {
            return false;
        }
        let rep = self.representative();
        let connectors =
            ctx.group_connectors && is_connector(rep, ctx) && is_connector(c, ctx);
        for (i, field) in ctx.group_fields.iter().enumerate() {
            // Connectors group by footprint alone; inconsistent naming
            // must not fragment them.
            if connectors && (field.as_str() == "part" || field.as_str() == "part lib") {
                continue;
            }
            let fallback = ctx.group_fields_fallbacks[i].as_deref();
            let ours = self.key_value(field, fallback, ctx);
            let theirs = key_field_raw(c, field, fallback, ctx);
            if !field_equal(field, &ours, &theirs, rep, c, ctx) {
                return false;
            }
        }
        true
    }

    fn add(&mut self, c: Component, ctx: &RunContext) {
        // Adopt non-blank values where the group side is still blank.
        for (i, field) in ctx.group_fields.iter().enumerate() {
            let fallback = ctx.group_fields_fallbacks[i].as_deref();
            if self.key_value(field, fallback, ctx).is_empty() {
                let theirs = key_field_raw(&c, field, fallback, ctx);
                if !theirs.is_empty() {
                    self.adopted.insert(field.clone(), theirs);
                }
            }
        }

        // Non-key fields are checked separately: a disagreement outside
        // `no_conflict` is warned about but does not split the group.
        let rep = &self.components[0];
        let mut names: BTreeSet<String> = rep.field_names().collect();
        names.extend(c.field_names());
        names.insert("datasheet".to_string());
        for name in names {
            if ctx.group_fields.iter().any(|f| *f == name) || ctx.no_conflict.contains(&name) {
                continue;
            }
            let kept = rep.field(&name).unwrap_or("").trim();
            let other = c.field(&name).unwrap_or("").trim();
            if !kept.is_empty() && !other.is_empty() && !kept.eq_ignore_ascii_case(other) {
                warn!(
                    "Field conflict on `{}` in group {}: `{}` vs `{}` ({})",
                    name, rep.reference, kept, other, c.reference
                );
                self.conflicts.push(Conflict {
                    field: name,
                    reference: c.reference.clone(),
                    kept: kept.to_string(),
                    other: other.to_string(),
                });
            }
        }

        self.fixed |= c.fixed;
        self.components.push(c);
    }

    /// Sorted references of the members.
    pub fn sorted_refs(&self) -> Vec<&RefDes> {
        let mut refs: Vec<&RefDes> = self.components.iter().map(|c| &c.reference).collect();
        refs.sort();
        refs
    }

    /// Render the reference list, compressed into ranges (`R1-R7`) when
    /// `compressed` and a run covers at least three designators.
    pub fn references(&self, separator: &str, compressed: bool) -> String {
        let refs = self.sorted_refs();
        if !compressed {
            return refs
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(separator);
        }

        let mut parts: Vec<String> = Vec::new();
        let mut run: Vec<&RefDes> = Vec::new();
        let flush = |run: &mut Vec<&RefDes>, parts: &mut Vec<String>| {
            match run.len() {
                0 => {}
                1 | 2 => parts.extend(run.iter().map(|r| r.as_str().to_string())),
                _ => parts.push(format!(
                    "{}-{}",
                    run.first().unwrap(),
                    run.last().unwrap()
                )),
            }
            run.clear();
        };
        for r in refs {
            let extends = run.last().is_some_and(|prev| {
                let (pp, pn) = prev.split();
                let (cp, cn) = r.split();
                pp == cp && matches!((pn, cn), (Some(a), Some(b)) if b == a + 1)
            });
            if !extends {
                flush(&mut run, &mut parts);
            }
            run.push(r);
        }
        flush(&mut run, &mut parts);
        parts.join(separator)
    }

    /// Build quantity: the sum of the per-source multipliers over the
    /// members. Negative totals (subtractive sources exceeding the
    /// positive contributions) clamp to zero; fractional totals round up
    /// when `int_qtys`, never down.
    pub fn build_quantity(&self, sources: &[SourceInfo], int_qtys: bool) -> f64 {
        let mut total = 0.0;
        for c in &self.components {
            let number = sources
                .iter()
                .find(|s| s.name == c.project)
                .map(|s| s.number)
                .unwrap_or(1.0);
            total += number;
        }
        if total < 0.0 {
            warn!(
                "Negative build quantity for group {} clamped to 0",
                self.representative().reference
            );
            total = 0.0;
        }
        if int_qtys {
            total.ceil()
        } else {
            total
        }
    }

    /// Canonical value of the group, for value-ordered sorting.
    fn canonical_value(&self, ctx: &RunContext) -> Canonical {
        let raw = self.field_value("value");
        let kind = passive_kind(self.representative(), ctx);
        value::normalize(&raw, kind, ctx.normalize_locale)
    }

    fn first_ref(&self) -> &RefDes {
        self.components
            .iter()
            .map(|c| &c.reference)
            .min()
            .expect("groups are never empty")
    }
}

/// Kind of a component for value parsing, via the alias table.
fn passive_kind(c: &Component, ctx: &RunContext) -> Option<PassiveKind> {
    if !ctx.parse_value {
        return None;
    }
    PassiveKind::from_canonical(&ctx.canonical_kind(&c.part))
}

/// Connector detection for footprint-only grouping: the aliased kind says
/// connector, or the reference prefix is the conventional J/P.
fn is_connector(c: &Component, ctx: &RunContext) -> bool {
    let kind = ctx.canonical_kind(&c.part);
    if kind == "conn" || kind == "connector" || kind.starts_with("conn_") {
        return true;
    }
    matches!(c.reference.prefix(), "J" | "P")
}

/// Resolve a component's side of a key field: the field itself, then the
/// qualifier stripped from a parsed `Value`, then the configured
/// fallback.
fn key_field_raw(c: &Component, field: &str, fallback: Option<&str>, ctx: &RunContext) -> String {
    let mut v = c.field(field).unwrap_or("").trim().to_string();
    if v.is_empty()
        && ctx.parse_value
        && matches!(field, "tolerance" | "voltage" | "power" | "current")
    {
        if let Some(kind) = passive_kind(c, ctx) {
            if let Some(parsed) = value::parse(&c.value, kind, ctx.normalize_locale) {
                if let Some(q) = parsed.qualifier_for(field) {
                    v = q.to_string();
                }
            }
        }
    }
    if v.is_empty() {
        if let Some(fb) = fallback {
            v = c.field(fb).unwrap_or("").trim().to_string();
        }
    }
    v
}

/// Field-level equality under the blank-merge rules.
fn field_equal(
    field: &str,
    ours: &str,
    theirs: &str,
    rep: &Component,
    c: &Component,
    ctx: &RunContext,
) -> bool {
    match (ours.is_empty(), theirs.is_empty()) {
        (true, true) => return ctx.merge_both_blank,
        (true, false) | (false, true) => return ctx.merge_blank_fields,
        (false, false) => {}
    }
    match field {
        "value" if ctx.parse_value => {
            value::normalize(ours, passive_kind(rep, ctx), ctx.normalize_locale)
                == value::normalize(theirs, passive_kind(c, ctx), ctx.normalize_locale)
        }
        "part" => ctx.canonical_kind(ours) == ctx.canonical_kind(theirs),
        _ => ours.to_lowercase() == theirs.to_lowercase(),
    }
}

/// Whether the whole grouping key of a component is blank. Such a
/// component becomes its own singleton group.
fn key_is_blank(c: &Component, ctx: &RunContext) -> bool {
    ctx.group_fields
        .iter()
        .enumerate()
        .all(|(i, field)| {
            key_field_raw(c, field, ctx.group_fields_fallbacks[i].as_deref(), ctx).is_empty()
        })
}

/// Partition the filtered component list into groups. Components dropped
/// by the exclude stage (`included == false`) never appear.
pub fn group_components(comps: Vec<Component>, ctx: &RunContext) -> Vec<ComponentGroup> {
    let mut groups: Vec<ComponentGroup> = Vec::new();
    for c in comps {
        if !c.included {
            continue;
        }
        if key_is_blank(&c, ctx) {
            groups.push(ComponentGroup::new(c, true));
            continue;
        }
        match groups.iter_mut().find(|g| g.matches(&c, ctx)) {
            Some(g) => g.add(c, ctx),
            None => groups.push(ComponentGroup::new(c, false)),
        }
    }
    sort_groups(groups, ctx)
}

/// Order the final group list: fitted before DNF, then the configured
/// style, ties always broken by first reference.
fn sort_groups(groups: Vec<ComponentGroup>, ctx: &RunContext) -> Vec<ComponentGroup> {
    let style = ctx.sort_style;
    let mut decorated: Vec<((bool, String, Canonical, RefDes), ComponentGroup)> = groups
        .into_iter()
        .map(|g| {
            let key = (
                !g.fitted,
                g.first_ref().prefix().to_string(),
                g.canonical_value(ctx),
                g.first_ref().clone(),
            );
            (key, g)
        })
        .collect();
    decorated.sort_by(|(a, _), (b, _)| {
        a.0.cmp(&b.0)
            .then_with(|| match style {
                SortStyle::Ref => std::cmp::Ordering::Equal,
                SortStyle::TypeValue | SortStyle::TypeValueRef => {
                    a.1.cmp(&b.1).then_with(|| a.2.cmp(&b.2))
                }
            })
            .then_with(|| a.3.cmp(&b.3))
    });
    decorated.into_iter().map(|(_, g)| g).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BomConfig;

    fn ctx() -> RunContext {
        RunContext::default()
    }

    fn ctx_yaml(yaml: &str) -> RunContext {
        BomConfig::from_yaml(yaml).unwrap().resolve().unwrap()
    }

    fn main_source(number: f64) -> Vec<SourceInfo> {
        vec![SourceInfo {
            name: "main".to_string(),
            ref_id: String::new(),
            number,
        }]
    }

    fn part(reference: &str, part: &str, value: &str, footprint: &str) -> Component {
        let mut c = Component::new(reference, "main");
        c.part = part.to_string();
        c.value = value.to_string();
        c.footprint = footprint.to_string();
        c
    }

    fn resistor(reference: &str, value: &str) -> Component {
        part(reference, "R", value, "Resistor_SMD:R_0603")
    }

    fn refs_of(g: &ComponentGroup) -> Vec<&str> {
        g.sorted_refs().iter().map(|r| r.as_str()).collect()
    }

    #[test]
    fn alias_equivalence() {
        let comps = vec![
            part("R1", "R", "1k", "Resistor_SMD:R_0603"),
            part("R2", "R_Small", "1000", "Resistor_SMD:R_0603"),
            part("SW1", "switch", "MINI", "X:FP1"),
            part("D1", "d_small", "MINI", "X:FP1"),
        ];
        let groups = group_components(comps, &ctx());
        assert_eq!(groups.len(), 3);
        let merged = groups.iter().find(|g| g.count() == 2).unwrap();
        assert_eq!(refs_of(merged), vec!["R1", "R2"]);
    }

    #[test]
    fn blank_fields_merge_by_policy() {
        let make = || {
            let mut a = resistor("R1", "1k");
            a.add_field("Tolerance", "5%", 4);
            let b = resistor("R2", "1k");
            vec![a, b]
        };
        let merged = group_components(make(), &ctx());
        assert_eq!(merged.len(), 1);
        // the group adopts the non-blank value
        assert_eq!(merged[0].field_value("tolerance"), "5%");

        let strict = ctx_yaml("merge_blank_fields: false");
        let split = group_components(make(), &strict);
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn merge_both_blank_policy() {
        let make = || vec![resistor("R1", ""), resistor("R2", "")];
        let cfg = "group_fields: [Part, Value]\n";
        let merged = group_components(make(), &ctx_yaml(cfg));
        assert_eq!(merged.len(), 1);
        let strict = ctx_yaml(&format!("{cfg}merge_both_blank: false\nmerge_blank_fields: false\n"));
        let split = group_components(make(), &strict);
        assert_eq!(split.len(), 2);
    }

    #[test]
    fn grouping_is_idempotent_and_partitions() {
        let make = || {
            vec![
                resistor("R3", "4k7"),
                resistor("R1", "4.7k"),
                part("C1", "C_Small", "100n", "Capacitor_SMD:C_0402"),
                part("TP1", "TestPoint", "", "TestPoint:TP"),
                resistor("R2", "1k"),
            ]
        };
        let a = group_components(make(), &ctx());
        let b = group_components(make(), &ctx());
        let render = |gs: &[ComponentGroup]| {
            gs.iter().map(|g| g.references(",", false)).collect::<Vec<_>>()
        };
        assert_eq!(render(&a), render(&b));

        // every component appears in exactly one group
        let mut seen: Vec<&str> = a
            .iter()
            .flat_map(|g| g.components().iter().map(|c| c.reference.as_str()))
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["C1", "R1", "R2", "R3", "TP1"]);
        assert_eq!(a.iter().map(|g| g.count()).sum::<usize>(), 5);
    }

    #[test]
    fn quantity_scales_with_board_count() {
        let comps = vec![resistor("R1", "1k"), resistor("R2", "1k"), resistor("R3", "1k")];
        let groups = group_components(comps, &ctx());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].build_quantity(&main_source(2.0), true), 6.0);
        assert_eq!(groups[0].count(), 3);
    }

    #[test]
    fn negative_multiplier_subtracts_and_clamps() {
        let sources = vec![
            SourceInfo {
                name: "main".to_string(),
                ref_id: String::new(),
                number: 1.0,
            },
            SourceInfo {
                name: "sub".to_string(),
                ref_id: "B:".to_string(),
                number: -1.0,
            },
        ];
        let mut shared = resistor("B:R1", "1k");
        shared.project = "sub".to_string();
        let comps = vec![resistor("R1", "1k"), resistor("R2", "1k"), shared];
        let groups = group_components(comps, &ctx());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].build_quantity(&sources, true), 1.0);

        // subtraction below zero clamps
        let mut lonely = resistor("B:R9", "10k");
        lonely.project = "sub".to_string();
        let groups = group_components(vec![lonely], &ctx());
        assert_eq!(groups[0].build_quantity(&sources, true), 0.0);
    }

    #[test]
    fn int_qtys_rounds_up() {
        let sources = vec![SourceInfo {
            name: "main".to_string(),
            ref_id: String::new(),
            number: 0.5,
        }];
        let comps = vec![resistor("R1", "1k"), resistor("R2", "1k"), resistor("R3", "1k")];
        let groups = group_components(comps, &ctx());
        assert_eq!(groups[0].build_quantity(&sources, true), 2.0);
        assert_eq!(groups[0].build_quantity(&sources, false), 1.5);
    }

    #[test]
    fn reference_range_compression() {
        let comps: Vec<Component> = (1..=7)
            .map(|n| resistor(&format!("R{n}"), "1k"))
            .chain(std::iter::once(resistor("R18", "1k")))
            .collect();
        let groups = group_components(comps, &ctx());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].references(",", true), "R1-R7,R18");
        assert_eq!(
            groups[0].references(",", false),
            "R1,R2,R3,R4,R5,R6,R7,R18"
        );
        // two in a row is not worth a range
        let comps = vec![resistor("R1", "1k"), resistor("R2", "1k")];
        let groups = group_components(comps, &ctx());
        assert_eq!(groups[0].references(",", true), "R1,R2");
    }

    #[test]
    fn non_key_conflicts_merge_with_warning() {
        let mut a = resistor("R1", "1k");
        a.add_field("MPN", "RC0603-A", 4);
        let mut b = resistor("R2", "1k");
        b.add_field("MPN", "RC0603-B", 4);
        let groups = group_components(vec![a, b], &ctx());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].conflicts.len(), 1);
        assert_eq!(groups[0].conflicts[0].field, "mpn");
        // first-seen wins
        assert_eq!(groups[0].field_value("mpn"), "RC0603-A");
    }

    #[test]
    fn no_conflict_fields_are_exempt() {
        let mut a = resistor("R1", "1k");
        a.add_field("Config", "+production", 4);
        let mut b = resistor("R2", "1k");
        b.add_field("Config", "+test", 4);
        let groups = group_components(vec![a, b], &ctx());
        assert_eq!(groups.len(), 1);
        assert!(groups[0].conflicts.is_empty());
    }

    #[test]
    fn connectors_group_by_footprint() {
        let make = || {
            vec![
                part("J1", "Conn_01x04", "CONN", "Connector_PinHeader:PinHeader_1x04"),
                part("J2", "Header_4", "CONN", "Connector_PinHeader:PinHeader_1x04"),
            ]
        };
        let groups = group_components(make(), &ctx());
        assert_eq!(groups.len(), 1);

        let strict = ctx_yaml("group_connectors: false");
        let groups = group_components(make(), &strict);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn dnf_components_group_separately() {
        let mut dnf = resistor("R2", "1k");
        dnf.fitted = false;
        let comps = vec![resistor("R1", "1k"), dnf, resistor("R3", "1k")];
        let groups = group_components(comps, &ctx());
        assert_eq!(groups.len(), 2);
        // fitted group sorts first
        assert!(groups[0].fitted);
        assert_eq!(refs_of(&groups[0]), vec!["R1", "R3"]);
        assert_eq!(refs_of(&groups[1]), vec!["R2"]);
    }

    #[test]
    fn blank_key_makes_singletons() {
        let comps = vec![
            Component::new("X1", "main"),
            Component::new("X2", "main"),
        ];
        let groups = group_components(comps, &ctx());
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn fallback_fields_substitute_blank_keys() {
        let cfg = "group_fields: [Part, Value]\ngroup_fields_fallbacks: ['', MPN]\nmerge_both_blank: false\n";
        let mut a = resistor("R1", "");
        a.add_field("MPN", "X1", 4);
        let mut b = resistor("R2", "");
        b.add_field("MPN", "X2", 4);
        let mut c = resistor("R3", "");
        c.add_field("MPN", "X1", 4);
        let groups = group_components(vec![a, b, c], &ctx_yaml(cfg));
        assert_eq!(groups.len(), 2);
        assert_eq!(refs_of(&groups[0]), vec!["R1", "R3"]);
    }

    #[test]
    fn value_qualifiers_feed_dedicated_fields() {
        // "1k 5%" carries the tolerance inside the value string
        let a = resistor("R1", "1k 5%");
        let mut b = resistor("R2", "1k");
        b.add_field("Tolerance", "5%", 4);
        let groups = group_components(vec![a, b], &ctx());
        assert_eq!(groups.len(), 1);

        // a differing explicit tolerance splits the group
        let a = resistor("R1", "1k 5%");
        let mut b = resistor("R2", "1k");
        b.add_field("Tolerance", "1%", 4);
        let strict = ctx_yaml("merge_blank_fields: false");
        let groups = group_components(vec![a, b], &strict);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn sort_styles() {
        let make = || {
            vec![
                resistor("R1", "4k7"),
                resistor("R2", "1k"),
                part("C5", "C", "100n", "Capacitor_SMD:C_0402"),
            ]
        };
        let by_value = group_components(make(), &ctx());
        let firsts: Vec<&str> = by_value.iter().map(|g| g.first_ref().as_str()).collect();
        assert_eq!(firsts, vec!["C5", "R2", "R1"]);

        let by_ref = group_components(make(), &ctx_yaml("sort_style: ref"));
        let firsts: Vec<&str> = by_ref.iter().map(|g| g.first_ref().as_str()).collect();
        assert_eq!(firsts, vec!["C5", "R1", "R2"]);
    }

    #[test]
    fn excluded_components_never_group() {
        let mut gone = resistor("R2", "1k");
        gone.included = false;
        let comps = vec![resistor("R1", "1k"), gone];
        let groups = group_components(comps, &ctx());
        assert_eq!(groups.len(), 1);
        assert_eq!(refs_of(&groups[0]), vec!["R1"]);
    }
}
