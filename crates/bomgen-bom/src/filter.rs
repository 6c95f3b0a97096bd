//! Filter and variant pipeline.
//!
//! The filter kinds form a closed set: a `generic` rule filter (used for
//! the built-in mechanical exclude and the DNF/DNC keyword filters), a
//! `field_rename` transform and the `${var}` text expansion transform.
//! Names are resolved through a registry exactly once, at configuration
//! time; the pipeline stages work on compiled filters.
//!
//! Stage order is load-bearing: flags reset, design-tool exclusion
//! markers, pre-transform, exclude, DNF, DNC, variant, and a final text
//! expansion. A component dropped by the exclude stage never reaches
//! grouping, regardless of the variant.

use std::collections::HashMap;

use bomgen_sch::Component;
use log::debug;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::config::FilterNames;
use crate::{BomError, Result};

/// Value keywords that mark a component as Do Not Fit.
pub const DNF_KEYS: &[&str] = &[
    "dnf",
    "dnl",
    "dnp",
    "do not fit",
    "do not load",
    "do not place",
    "no stuff",
    "nostuff",
    "noload",
    "noplace",
    "not fitted",
    "not loaded",
    "not placed",
];

/// Value keywords that mark a component as Do Not Change.
pub const DNC_KEYS: &[&str] = &["dnc", "do not change", "no change", "fixed"];

/// The built-in mechanical exclusions: test points, fiducials, mounting
/// holes, solder bridges/jumpers.
const MECHANICAL_RULES: &[(&str, &str)] = &[
    ("reference", "^TP[0-9]*"),
    ("reference", "^FID"),
    ("part", "mount.*hole"),
    ("part", "solder.*bridge"),
    ("part", "solder.*jump"),
    ("part", "test.*point"),
    ("footprint", "test.*point"),
    ("footprint", "mount.*hole"),
    ("footprint", "fiducial"),
];

/// A user filter definition from the configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterDef {
    /// Name used to reference this filter. Names starting with `_` are
    /// reserved for the built-ins.
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FilterDefKind,
    #[serde(default)]
    pub comment: String,
    /// Exclude components matching any of these rules.
    #[serde(default)]
    pub exclude_any: Vec<RuleDef>,
    /// Exclude components whose reference starts with `#`.
    #[serde(default)]
    pub exclude_all_hash_ref: bool,
    /// Match `keys` against the Value field.
    #[serde(default)]
    pub exclude_value: bool,
    /// Match `keys` against the entries of the fit field.
    #[serde(default)]
    pub exclude_config: bool,
    /// Field consulted by `exclude_config`. The global fit field when
    /// empty.
    #[serde(default)]
    pub config_field: String,
    /// Keywords for `exclude_value`/`exclude_config`: `dnf_list`,
    /// `dnc_list` or an explicit list.
    #[serde(default)]
    pub keys: Option<KeysConfig>,
    /// Invert the verdict (used by marker filters like DNC).
    #[serde(default)]
    pub invert: bool,
    /// Renames for `field_rename` filters.
    #[serde(default)]
    pub rename: Vec<RenameRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterDefKind {
    Generic,
    FieldRename,
    ExpandTextVars,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KeysConfig {
    /// `dnf_list` or `dnc_list`.
    Named(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    pub column: String,
    pub regex: String,
    /// Match when the regex does *not* match.
    #[serde(default)]
    pub invert: bool,
    /// Skip this rule when the component lacks the column.
    #[serde(default)]
    pub skip_if_no_field: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameRule {
    pub field: String,
    pub name: String,
}

/// A compiled filter.
#[derive(Debug)]
pub enum Filter {
    Generic(GenericFilter),
    FieldRename(Vec<RenameRule>),
    ExpandTextVars,
    Not(Box<Filter>),
}

#[derive(Debug)]
pub struct GenericFilter {
    name: String,
    exclude_any: Vec<Rule>,
    exclude_all_hash_ref: bool,
    exclude_value: bool,
    exclude_config: bool,
    config_field: String,
    keys: Vec<String>,
    invert: bool,
}

#[derive(Debug)]
struct Rule {
    column: String,
    regex: Regex,
    invert: bool,
    skip_if_no_field: bool,
}

impl Filter {
    pub fn is_transform(&self) -> bool {
        match self {
            Filter::FieldRename(_) | Filter::ExpandTextVars => true,
            Filter::Generic(_) => false,
            Filter::Not(f) => f.is_transform(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Filter::Generic(g) => &g.name,
            Filter::FieldRename(_) => "field_rename",
            Filter::ExpandTextVars => "_expand_text_vars",
            Filter::Not(f) => f.name(),
        }
    }

    /// Logic verdict: `true` means the component passes (is kept, stays
    /// fitted, ...). Transforms pass everything.
    pub fn test(&self, c: &Component) -> bool {
        match self {
            Filter::Generic(g) => g.test(c),
            Filter::Not(f) => !f.test(c),
            Filter::FieldRename(_) | Filter::ExpandTextVars => true,
        }
    }

    /// Apply a transform in place. Logic filters do nothing.
    pub fn transform(&self, c: &mut Component) {
        match self {
            Filter::FieldRename(renames) => {
                for r in renames {
                    c.rename_field(&r.field, &r.name);
                }
            }
            Filter::ExpandTextVars => expand_text_vars(c),
            Filter::Generic(_) | Filter::Not(_) => {}
        }
    }
}

impl GenericFilter {
    fn matched(&self, c: &Component) -> bool {
        if self.exclude_all_hash_ref && c.reference.as_str().starts_with('#') {
            return true;
        }
        for rule in &self.exclude_any {
            let value = c.field(&rule.column);
            if value.is_none() && rule.skip_if_no_field {
                continue;
            }
            if rule.regex.is_match(value.unwrap_or("")) != rule.invert {
                return true;
            }
        }
        if self.exclude_value {
            let v = c.value.trim().to_lowercase();
            if self.keys.iter().any(|k| *k == v) {
                return true;
            }
        }
        if self.exclude_config {
            if let Some(cfg) = c.field(&self.config_field) {
                for entry in cfg.split(',') {
                    let entry = entry.trim().to_lowercase();
                    if !entry.is_empty() && self.keys.iter().any(|k| *k == entry) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn test(&self, c: &Component) -> bool {
        self.matched(c) == self.invert
    }
}

/// Expand `${field}` references in the value and the user fields. Unknown
/// names are left as-is. A single pass, matching how the original applies
/// its expansion filter.
fn expand_text_vars(c: &mut Component) {
    let var = Regex::new(r"\$\{([^}]+)\}").unwrap();
    let expand = |text: &str, c: &Component| -> Option<String> {
        if !text.contains("${") {
            return None;
        }
        let out = var.replace_all(text, |caps: &regex::Captures| {
            c.field(&caps[1]).unwrap_or(&caps[0]).to_string()
        });
        Some(out.into_owned())
    };

    if let Some(v) = expand(&c.value, c) {
        c.value = v;
    }
    let names: Vec<String> = c.fields().iter().map(|f| f.name.clone()).collect();
    for name in names {
        let expanded = c.field(&name).and_then(|v| expand(v, c));
        if let Some(v) = expanded {
            c.set_field(&name, v);
        }
    }
}

/// Filter-name resolution, consulted only while resolving the
/// configuration.
pub struct Registry<'a> {
    user: HashMap<String, &'a FilterDef>,
    fit_field: &'a str,
}

impl<'a> Registry<'a> {
    pub fn new(defs: &'a [FilterDef], fit_field: &'a str) -> Result<Self> {
        let mut user = HashMap::new();
        for def in defs {
            if def.name.is_empty() {
                return Err(BomError::config("Filter definitions need a `name`"));
            }
            if def.name.starts_with('_') {
                return Err(BomError::config(format!(
                    "Filter names starting with `_` are reserved ({})",
                    def.name
                )));
            }
            if user.insert(def.name.clone(), def).is_some() {
                return Err(BomError::config(format!("Duplicated filter `{}`", def.name)));
            }
        }
        Ok(Self { user, fit_field })
    }

    /// Resolve a list of filter names into compiled filters. `default` is
    /// used when nothing was configured; `_none` yields an empty list.
    /// Transform stages accept only transforms, logic stages only logic
    /// filters.
    pub fn solve(
        &self,
        names: Option<&FilterNames>,
        default: Option<&str>,
        is_transform: bool,
    ) -> Result<Vec<Filter>> {
        let names: Vec<String> = match names {
            Some(names) => names.names(),
            None => default.map(|d| vec![d.to_string()]).unwrap_or_default(),
        };
        let mut filters = Vec::new();
        for name in &names {
            if name.is_empty() || name == "_none" || name == "_null" {
                continue;
            }
            let (name, invert) = match name.strip_prefix('!') {
                Some(rest) => (rest, true),
                None => (name.as_str(), false),
            };
            let filter = self
                .build(name)?
                .ok_or_else(|| BomError::config(format!("Unknown filter `{name}`")))?;
            if filter.is_transform() != is_transform {
                return Err(BomError::config(format!(
                    "Filter `{}` is a {} filter and can't be used here",
                    name,
                    if filter.is_transform() { "transform" } else { "logic" },
                )));
            }
            if invert {
                if filter.is_transform() {
                    return Err(BomError::config(format!(
                        "Transform filter `{name}` can't be inverted"
                    )));
                }
                filters.push(Filter::Not(Box::new(filter)));
            } else {
                filters.push(filter);
            }
        }
        Ok(filters)
    }

    fn build(&self, name: &str) -> Result<Option<Filter>> {
        if let Some(def) = self.user.get(name) {
            return compile(def, self.fit_field).map(Some);
        }
        Ok(match name {
            "_mechanical" => Some(self.mechanical()),
            "_kibom_dnf" => Some(self.keyword_filter("_kibom_dnf", DNF_KEYS, false)),
            "_kibom_dnc" => Some(self.keyword_filter("_kibom_dnc", DNC_KEYS, true)),
            "_expand_text_vars" => Some(Filter::ExpandTextVars),
            _ => None,
        })
    }

    fn mechanical(&self) -> Filter {
        let exclude_any = MECHANICAL_RULES
            .iter()
            .map(|(column, pattern)| Rule {
                column: column.to_string(),
                regex: ci_regex(pattern).expect("built-in pattern"),
                invert: false,
                skip_if_no_field: false,
            })
            .collect();
        Filter::Generic(GenericFilter {
            name: "_mechanical".to_string(),
            exclude_any,
            exclude_all_hash_ref: true,
            exclude_value: false,
            exclude_config: false,
            config_field: String::new(),
            keys: Vec::new(),
            invert: false,
        })
    }

    fn keyword_filter(&self, name: &str, keys: &[&str], invert: bool) -> Filter {
        // A non-empty, non-zero `dnp` field from the design tool also
        // counts as a match.
        let dnp_rule = Rule {
            column: "dnp".to_string(),
            regex: ci_regex(r"^((\s*0(\.0*)?\s*)|(\s*))$").expect("built-in pattern"),
            invert: true,
            skip_if_no_field: true,
        };
        Filter::Generic(GenericFilter {
            name: name.to_string(),
            exclude_any: if invert { Vec::new() } else { vec![dnp_rule] },
            exclude_all_hash_ref: false,
            exclude_value: true,
            exclude_config: true,
            config_field: self.fit_field.to_string(),
            keys: keys.iter().map(|k| k.to_string()).collect(),
            invert,
        })
    }
}

fn ci_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn compile(def: &FilterDef, fit_field: &str) -> Result<Filter> {
    match def.kind {
        FilterDefKind::ExpandTextVars => Ok(Filter::ExpandTextVars),
        FilterDefKind::FieldRename => {
            let mut renames = Vec::with_capacity(def.rename.len());
            for r in &def.rename {
                if r.field.is_empty() || r.name.is_empty() {
                    return Err(BomError::config(format!(
                        "Missing `field` or `name` in rename list of `{}`",
                        def.name
                    )));
                }
                renames.push(r.clone());
            }
            Ok(Filter::FieldRename(renames))
        }
        FilterDefKind::Generic => {
            let mut exclude_any = Vec::with_capacity(def.exclude_any.len());
            for rule in &def.exclude_any {
                let regex = ci_regex(&rule.regex).map_err(|e| {
                    BomError::config(format!(
                        "Invalid regex in filter `{}`: {e}",
                        def.name
                    ))
                })?;
                exclude_any.push(Rule {
                    column: rule.column.to_lowercase(),
                    regex,
                    invert: rule.invert,
                    skip_if_no_field: rule.skip_if_no_field,
                });
            }
            let keys = match &def.keys {
                None => Vec::new(),
                Some(KeysConfig::Named(name)) => match name.as_str() {
                    "dnf_list" => DNF_KEYS.iter().map(|k| k.to_string()).collect(),
                    "dnc_list" => DNC_KEYS.iter().map(|k| k.to_string()).collect(),
                    other => {
                        return Err(BomError::config(format!(
                            "Unknown keys list `{other}` in filter `{}`",
                            def.name
                        )))
                    }
                },
                Some(KeysConfig::List(list)) => {
                    list.iter().map(|k| k.to_lowercase()).collect()
                }
            };
            let config_field = if def.config_field.is_empty() {
                fit_field.to_string()
            } else {
                def.config_field.to_lowercase()
            };
            Ok(Filter::Generic(GenericFilter {
                name: def.name.clone(),
                exclude_any,
                exclude_all_hash_ref: def.exclude_all_hash_ref,
                exclude_value: def.exclude_value,
                exclude_config: def.exclude_config,
                config_field,
                keys,
                invert: def.invert,
            }))
        }
    }
}

/// The KiBoM-style variant: tokens in the fit field select the fitted
/// state per named build. `+v` fits the component only in variant `v`,
/// `-v` unfits it in variant `v`. The default (unnamed) variant is a
/// pass-through; the DNF/DNC filters already did the keyword work.
#[derive(Debug, Clone)]
pub struct Variant {
    name: String,
    fit_field: String,
}

impl Variant {
    pub fn new(name: &str, fit_field: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            fit_field: fit_field.to_string(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.name.is_empty()
    }

    /// Field this variant reads, when it is a real variant.
    pub fn variant_field(&self) -> Option<&str> {
        (!self.is_default()).then_some(self.fit_field.as_str())
    }

    pub fn apply(&self, comps: &mut [Component]) {
        if self.is_default() {
            return;
        }
        debug!("Applying variant `{}`", self.name);
        for c in comps.iter_mut().filter(|c| c.included && c.fitted) {
            let Some(cfg) = c.field(&self.fit_field) else {
                continue;
            };
            let mut plus = Vec::new();
            let mut minus = Vec::new();
            for entry in cfg.split(',') {
                let entry = entry.trim().to_lowercase();
                if let Some(v) = entry.strip_prefix('+') {
                    plus.push(v.to_string());
                } else if let Some(v) = entry.strip_prefix('-') {
                    minus.push(v.to_string());
                }
            }
            if (!plus.is_empty() && !plus.iter().any(|v| *v == self.name))
                || minus.iter().any(|v| *v == self.name)
            {
                c.fitted = false;
                debug!("- Not fit in variant: {}", c.reference);
            }
        }
    }
}

/// Reset the pipeline-owned flags before any filtering.
pub fn reset_flags(comps: &mut [Component]) {
    debug!("Filters reset");
    for c in comps.iter_mut() {
        c.included = true;
        c.fitted = true;
        c.fixed = false;
    }
}

/// Honor the design-tool "exclude from BoM" markers.
pub fn apply_exclude_marked(comps: &mut [Component], in_sch: bool, in_pcb: bool) {
    for c in comps.iter_mut().filter(|c| c.included) {
        if in_sch && !c.in_bom {
            c.included = false;
        }
        if in_pcb && !c.in_bom_pcb {
            c.included = false;
        }
    }
}

/// Apply transform filters in place. Transforms never drop components.
pub fn apply_pre_transform(comps: &mut [Component], filters: &[Filter]) {
    for f in filters {
        debug!("Applying transform filter `{}`", f.name());
        for c in comps.iter_mut() {
            f.transform(c);
        }
    }
}

/// Drop components outright: they never appear in any output.
pub fn apply_exclude_filter(comps: &mut [Component], filters: &[Filter]) {
    if filters.is_empty() {
        return;
    }
    debug!("Applying exclude filters");
    for c in comps.iter_mut() {
        if c.included {
            c.included = filters.iter().all(|f| f.test(c));
        }
    }
}

/// Mark components as not fitted without dropping them.
pub fn apply_fitted_filter(comps: &mut [Component], filters: &[Filter]) {
    if filters.is_empty() {
        return;
    }
    debug!("Applying DNF filters");
    for c in comps.iter_mut() {
        if c.fitted {
            c.fitted = filters.iter().all(|f| f.test(c));
            if !c.fitted {
                debug!("- Not fit: {}", c.reference);
            }
        }
    }
}

/// Mark components that must not be substituted. Informational only.
pub fn apply_fixed_filter(comps: &mut [Component], filters: &[Filter]) {
    if filters.is_empty() {
        return;
    }
    debug!("Applying DNC filters");
    for c in comps.iter_mut() {
        if !c.fixed {
            c.fixed = filters.iter().all(|f| f.test(c));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_filters(name: &str, is_transform: bool) -> Vec<Filter> {
        Registry::new(&[], "config")
            .unwrap()
            .solve(
                Some(&FilterNames::One(name.to_string())),
                None,
                is_transform,
            )
            .unwrap()
    }

    fn comp(reference: &str, part: &str, value: &str) -> Component {
        let mut c = Component::new(reference, "main");
        c.part = part.to_string();
        c.value = value.to_string();
        c
    }

    #[test]
    fn mechanical_excludes_the_usual_suspects() {
        let filters = registry_filters("_mechanical", false);
        let mut comps = vec![
            comp("R1", "R", "1k"),
            comp("TP1", "TestPoint", ""),
            comp("FID1", "Fiducial", ""),
            comp("H1", "MountingHole", ""),
            comp("#PWR1", "GND", ""),
        ];
        apply_exclude_filter(&mut comps, &filters);
        let included: Vec<&str> = comps
            .iter()
            .filter(|c| c.included)
            .map(|c| c.reference.as_str())
            .collect();
        assert_eq!(included, vec!["R1"]);
    }

    #[test]
    fn dnf_marks_by_value_and_config() {
        let filters = registry_filters("_kibom_dnf", false);
        let mut comps = vec![
            comp("R1", "R", "1k"),
            comp("R2", "R", "DNF"),
            comp("R3", "R", "do not fit"),
            comp("R4", "R", "1k"),
            comp("C1", "C", "100n"),
        ];
        comps[3].add_field("Config", "dnf", 4);
        comps[4].add_field("dnp", "1", 4);
        apply_fitted_filter(&mut comps, &filters);
        let fitted: Vec<bool> = comps.iter().map(|c| c.fitted).collect();
        assert_eq!(fitted, vec![true, false, false, false, false]);
        // marking does not drop
        assert!(comps.iter().all(|c| c.included));
    }

    #[test]
    fn dnc_marks_fixed_only() {
        let filters = registry_filters("_kibom_dnc", false);
        let mut comps = vec![comp("R1", "R", "1k"), comp("R2", "R", "1k")];
        comps[1].add_field("Config", "fixed", 4);
        apply_fixed_filter(&mut comps, &filters);
        assert!(!comps[0].fixed);
        assert!(comps[1].fixed);
        assert!(comps.iter().all(|c| c.fitted && c.included));
    }

    #[test]
    fn exclude_ordering_beats_variant() {
        // an excluded component stays excluded no matter what follows
        let filters = registry_filters("_mechanical", false);
        let mut comps = vec![comp("TP1", "TestPoint", "")];
        comps[0].add_field("Config", "+production", 4);
        apply_exclude_filter(&mut comps, &filters);
        Variant::new("production", "config").apply(&mut comps);
        assert!(!comps[0].included);
    }

    #[test]
    fn variant_plus_minus_tokens() {
        let mut comps = vec![
            comp("R1", "R", "1k"),
            comp("R2", "R", "1k"),
            comp("R3", "R", "1k"),
            comp("R4", "R", "1k"),
        ];
        comps[1].add_field("Config", "+production", 4);
        comps[2].add_field("Config", "-production", 4);
        comps[3].add_field("Config", "+test,+production", 4);
        let variant = Variant::new("production", "config");
        variant.apply(&mut comps);
        let fitted: Vec<bool> = comps.iter().map(|c| c.fitted).collect();
        assert_eq!(fitted, vec![true, true, false, true]);

        let mut comps2 = vec![comp("R1", "R", "1k")];
        comps2[0].add_field("Config", "+test", 4);
        Variant::new("production", "config").apply(&mut comps2);
        assert!(!comps2[0].fitted);
    }

    #[test]
    fn default_variant_is_pass_through() {
        let mut comps = vec![comp("R1", "R", "1k")];
        comps[0].add_field("Config", "+production", 4);
        Variant::new("", "config").apply(&mut comps);
        assert!(comps[0].fitted);
    }

    #[test]
    fn inverted_filter() {
        let filters = Registry::new(&[], "config")
            .unwrap()
            .solve(
                Some(&FilterNames::One("!_mechanical".to_string())),
                None,
                false,
            )
            .unwrap();
        let mut comps = vec![comp("R1", "R", "1k"), comp("TP1", "TestPoint", "")];
        apply_exclude_filter(&mut comps, &filters);
        assert!(!comps[0].included);
        assert!(comps[1].included);
    }

    #[test]
    fn unknown_filter_is_fatal() {
        let err = Registry::new(&[], "config")
            .unwrap()
            .solve(Some(&FilterNames::One("nope".to_string())), None, false)
            .unwrap_err();
        assert!(matches!(err, BomError::Config(_)));
    }

    #[test]
    fn user_generic_filter() {
        let defs = vec![FilterDef {
            name: "only_smd".to_string(),
            kind: FilterDefKind::Generic,
            comment: String::new(),
            exclude_any: vec![RuleDef {
                column: "Mount".to_string(),
                regex: "^THT$".to_string(),
                invert: false,
                skip_if_no_field: true,
            }],
            exclude_all_hash_ref: false,
            exclude_value: false,
            exclude_config: false,
            config_field: String::new(),
            keys: None,
            invert: false,
            rename: Vec::new(),
        }];
        let registry = Registry::new(&defs, "config").unwrap();
        let filters = registry
            .solve(Some(&FilterNames::One("only_smd".to_string())), None, false)
            .unwrap();
        let mut comps = vec![comp("R1", "R", "1k"), comp("J1", "Conn", "")];
        comps[1].add_field("Mount", "THT", 4);
        apply_exclude_filter(&mut comps, &filters);
        assert!(comps[0].included);
        assert!(!comps[1].included);
    }

    #[test]
    fn field_rename_transform() {
        let defs = vec![FilterDef {
            name: "fix_mpn".to_string(),
            kind: FilterDefKind::FieldRename,
            comment: String::new(),
            exclude_any: Vec::new(),
            exclude_all_hash_ref: false,
            exclude_value: false,
            exclude_config: false,
            config_field: String::new(),
            keys: None,
            invert: false,
            rename: vec![RenameRule {
                field: "mpn".to_string(),
                name: "manf#".to_string(),
            }],
        }];
        let registry = Registry::new(&defs, "config").unwrap();
        let filters = registry
            .solve(Some(&FilterNames::One("fix_mpn".to_string())), None, true)
            .unwrap();
        let mut comps = vec![comp("R1", "R", "1k")];
        comps[0].add_field("MPN", "RC0603", 4);
        apply_pre_transform(&mut comps, &filters);
        assert_eq!(comps[0].field("manf#"), Some("RC0603"));
        assert_eq!(comps[0].field("mpn"), None);
    }

    #[test]
    fn expand_text_vars_replaces_field_refs() {
        let mut comps = vec![comp("R1", "R", "1k")];
        comps[0].add_field("Rating", "50V", 4);
        comps[0].add_field("Note", "rated ${Rating}", 5);
        apply_pre_transform(&mut comps, &[Filter::ExpandTextVars]);
        assert_eq!(comps[0].field("note"), Some("rated 50V"));
    }

    #[test]
    fn transform_in_logic_position_is_fatal() {
        let err = Registry::new(&[], "config")
            .unwrap()
            .solve(
                Some(&FilterNames::One("_expand_text_vars".to_string())),
                None,
                false,
            )
            .unwrap_err();
        assert!(matches!(err, BomError::Config(_)));
    }

    #[test]
    fn reserved_names_rejected() {
        let defs = vec![FilterDef {
            name: "_mine".to_string(),
            kind: FilterDefKind::Generic,
            comment: String::new(),
            exclude_any: Vec::new(),
            exclude_all_hash_ref: false,
            exclude_value: false,
            exclude_config: false,
            config_field: String::new(),
            keys: None,
            invert: false,
            rename: Vec::new(),
        }];
        assert!(matches!(
            Registry::new(&defs, "config"),
            Err(BomError::Config(_))
        ));
    }
}
