//! Configuration surface and its one-shot resolution.
//!
//! [`BomConfig`] mirrors the YAML the user writes: every option either
//! holds a configured value or is in its explicit default state (serde
//! defaults / `Option`). [`BomConfig::resolve`] validates everything once
//! and produces a [`RunContext`] of concrete values (lowercased field
//! lists, padded fallbacks, a compiled alias map, compiled filters) that
//! the pipeline stages take by reference. Nothing downstream re-checks
//! "was this set".

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::Deserialize;

use crate::columns::{ColumnSpec, JoinEntry};
use crate::filter::{self, Filter, FilterDef, Variant};
use crate::{BomError, Result};

/// Default fields compared when sorting components into groups.
pub const DEFAULT_GROUP_FIELDS: &[&str] = &[
    "part",
    "part lib",
    "value",
    "footprint",
    "footprint lib",
    "voltage",
    "tolerance",
    "current",
    "power",
];

/// Default part-name equivalence classes. The first name of each class is
/// the canonical kind.
pub const DEFAULT_ALIASES: &[&[&str]] = &[
    &["r", "r_small", "res", "resistor"],
    &["l", "l_small", "inductor"],
    &["c", "c_small", "cap", "capacitor"],
    &["sw", "switch"],
    &["zener", "zenersmall"],
    &["d", "diode", "d_small"],
];

fn default_true() -> bool {
    true
}

fn default_number() -> f64 {
    1.0
}

fn default_fit_field() -> String {
    "Config".to_string()
}

fn default_ref_separator() -> String {
    " ".to_string()
}

fn default_separator() -> String {
    ",".to_string()
}

/// Group ordering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortStyle {
    /// By (kind, normalized value).
    #[default]
    TypeValue,
    /// By (kind, normalized value, first reference).
    TypeValueRef,
    /// By first reference only.
    Ref,
}

/// One or more filter names, as written in the config.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FilterNames {
    One(String),
    Many(Vec<String>),
}

impl FilterNames {
    pub fn names(&self) -> Vec<String> {
        match self {
            FilterNames::One(s) => vec![s.clone()],
            FilterNames::Many(v) => v.clone(),
        }
    }
}

/// A column entry: just a field name, or a full specification.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ColumnConfig {
    Name(String),
    Full(ColumnFull),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnFull {
    #[serde(default)]
    pub field: String,
    /// Name to display in the header. The field is used when empty.
    #[serde(default)]
    pub name: String,
    /// Fields to join to this column.
    #[serde(default)]
    pub join: Option<JoinConfig>,
    /// Used to group columns in sinks that support nesting.
    #[serde(default)]
    pub level: u32,
    /// Explanation for this column.
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JoinConfig {
    One(String),
    Many(Vec<JoinEntryConfig>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JoinEntryConfig {
    Field(String),
    Full(JoinFull),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinFull {
    #[serde(default)]
    pub field: String,
    /// Text to use instead of a field. Incompatible with `field`.
    #[serde(default)]
    pub text: String,
    /// Added before the field content when the field isn't empty.
    #[serde(default)]
    pub text_before: String,
    /// Added after the field content when the field isn't empty.
    #[serde(default)]
    pub text_after: String,
}

/// A source of components from another project.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregateConfig {
    /// Netlist or CSV file to aggregate.
    #[serde(default)]
    pub file: PathBuf,
    /// Name to identify this source. The file stem is used when empty.
    #[serde(default)]
    pub name: String,
    /// Prefix added to all the references from this source.
    #[serde(default)]
    pub ref_id: String,
    /// Number of boards to build. Negative subtracts components already
    /// counted elsewhere.
    #[serde(default = "default_number")]
    pub number: f64,
    /// Delimiter used for CSV files.
    #[serde(default = "default_separator")]
    pub delimiter: String,
}

/// CSV sink options.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CsvOptions {
    /// Separator, one character. `\t` and friends accepted.
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub hide_header: bool,
    /// Enclose all values in double quotes.
    #[serde(default)]
    pub quote_all: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            hide_header: false,
            quote_all: false,
        }
    }
}

/// The user-facing BoM configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BomConfig {
    /// Number of boards to build (components multiplier).
    #[serde(default = "default_number")]
    pub number: f64,
    /// Prefix added to all the references of the primary project.
    #[serde(default)]
    pub ref_id: String,
    /// Board variant used to determine which components are fitted.
    #[serde(default)]
    pub variant: String,
    /// Field name used by the internal DNF/DNC filters and the variant.
    #[serde(default = "default_fit_field")]
    pub fit_field: String,
    /// Exclude DNF components from the main section.
    #[serde(default = "default_true")]
    pub ignore_dnf: bool,
    /// Print grouped references in the compressed range style (R1-R7 R18).
    #[serde(default)]
    pub use_alt: bool,
    /// Separator for the list of references.
    #[serde(default = "default_ref_separator")]
    pub ref_separator: String,
    /// Generate the `Source BoM` column using the reference id instead of
    /// the project name.
    #[serde(default)]
    pub source_by_id: bool,
    /// Express quantities as integers, rounding up.
    #[serde(default = "default_true")]
    pub int_qtys: bool,
    /// Parse the `Value` field so `1k` and `1000` compare equal.
    #[serde(default = "default_true")]
    pub parse_value: bool,
    /// Accept `,` as the decimal separator when parsing values.
    #[serde(default)]
    pub normalize_locale: bool,
    /// Group connectors by footprint alone, ignoring the part name.
    #[serde(default = "default_true")]
    pub group_connectors: bool,
    /// A blank field matches any value of the same field.
    #[serde(default = "default_true")]
    pub merge_blank_fields: bool,
    /// Two blank fields are interpreted as the same value.
    #[serde(default = "default_true")]
    pub merge_both_blank: bool,
    /// Fields used for sorting individual components into groups.
    #[serde(default)]
    pub group_fields: Option<Vec<String>>,
    /// Fields used when the corresponding `group_fields` entry is empty.
    #[serde(default)]
    pub group_fields_fallbacks: Vec<String>,
    /// Part-name equivalence classes.
    #[serde(default)]
    pub component_aliases: Option<Vec<Vec<String>>>,
    /// Fields where value conflicts inside a group are tolerated.
    #[serde(default)]
    pub no_conflict: Option<Vec<String>>,
    #[serde(default)]
    pub sort_style: SortStyle,
    /// Columns to display. All detected fields when unset.
    #[serde(default)]
    pub columns: Option<Vec<ColumnConfig>>,
    /// Components from other projects.
    #[serde(default)]
    pub aggregate: Vec<AggregateConfig>,
    /// Transform filter applied before any exclusion logic.
    #[serde(default)]
    pub pre_transform: Option<FilterNames>,
    /// Filter that drops components from BoM processing entirely.
    #[serde(default)]
    pub exclude_filter: Option<FilterNames>,
    /// Filter that marks components as do-not-fit.
    #[serde(default)]
    pub dnf_filter: Option<FilterNames>,
    /// Filter that marks components as do-not-change.
    #[serde(default)]
    pub dnc_filter: Option<FilterNames>,
    /// User filter definitions referenced by name above.
    #[serde(default)]
    pub filters: Vec<FilterDef>,
    /// Expand `${field}` text variables after filters and variants.
    #[serde(default = "default_true")]
    pub expand_text_vars: bool,
    /// Honor the schematic's "exclude from bill of materials" marker.
    #[serde(default = "default_true")]
    pub exclude_marked_in_sch: bool,
    /// Honor the PCB's "exclude from BOM" marker.
    #[serde(default)]
    pub exclude_marked_in_pcb: bool,
    #[serde(default)]
    pub csv: CsvOptions,
    /// Accept aggregated CSV rows without a reference column.
    #[serde(default)]
    pub accept_no_ref: bool,
}

impl Default for BomConfig {
    fn default() -> Self {
        serde_yaml::from_str("{}").expect("empty config must deserialize")
    }
}

impl BomConfig {
    pub fn from_yaml(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).map_err(|e| BomError::config(format!("invalid config: {e}")))
    }
}

/// A resolved aggregate source.
#[derive(Debug, Clone)]
pub struct AggregateSource {
    pub file: PathBuf,
    pub name: String,
    pub ref_id: String,
    pub number: f64,
    pub delimiter: u8,
}

/// Resolved CSV sink options.
#[derive(Debug, Clone)]
pub struct CsvSink {
    pub separator: u8,
    pub hide_header: bool,
    pub quote_all: bool,
}

/// Everything the pipeline stages need, resolved and validated once.
#[derive(Debug)]
pub struct RunContext {
    pub number: f64,
    pub ref_id: String,
    pub fit_field: String,
    pub ignore_dnf: bool,
    pub use_alt: bool,
    pub ref_separator: String,
    pub source_by_id: bool,
    pub int_qtys: bool,
    pub parse_value: bool,
    pub normalize_locale: bool,
    pub group_connectors: bool,
    pub merge_blank_fields: bool,
    pub merge_both_blank: bool,
    pub group_fields: Vec<String>,
    /// One entry per group field; `None` when there is no fallback.
    pub group_fields_fallbacks: Vec<Option<String>>,
    /// Lowercased symbol name -> canonical kind.
    pub aliases: HashMap<String, String>,
    pub no_conflict: HashSet<String>,
    pub sort_style: SortStyle,
    /// `None` means "all detected fields".
    pub columns: Option<Vec<ColumnSpec>>,
    pub aggregate: Vec<AggregateSource>,
    pub pre_transform: Vec<Filter>,
    pub exclude_filter: Vec<Filter>,
    pub dnf_filter: Vec<Filter>,
    pub dnc_filter: Vec<Filter>,
    pub variant: Variant,
    pub expand_text_vars: bool,
    pub exclude_marked_in_sch: bool,
    pub exclude_marked_in_pcb: bool,
    pub csv: CsvSink,
    pub accept_no_ref: bool,
}

impl Default for RunContext {
    fn default() -> Self {
        BomConfig::default()
            .resolve()
            .expect("default config must resolve")
    }
}

/// Unescape `\n`/`\t` once, at configuration time. A doubled backslash
/// protects the literal sequence.
pub(crate) fn unescape(text: &str) -> String {
    let nl = regex::Regex::new(r"([^\\]|^)\\n").unwrap();
    let tab = regex::Regex::new(r"([^\\]|^)\\t").unwrap();
    let text = nl.replace_all(text, "${1}\n");
    tab.replace_all(&text, "${1}\t").replace("\\\\", "\\")
}

/// Resolve a sink separator spec (possibly escaped) to a single byte.
fn resolve_separator(spec: &str, what: &str) -> Result<u8> {
    let s = spec
        .replace(r"\t", "\t")
        .replace(r"\n", "\n")
        .replace(r"\r", "\r")
        .replace(r"\\", "\\");
    let bytes = s.as_bytes();
    if bytes.len() != 1 {
        return Err(BomError::config(format!(
            "The {what} separator must be one character (`{spec}`)"
        )));
    }
    Ok(bytes[0])
}

impl BomConfig {
    /// Validate and resolve the configuration into a run context.
    pub fn resolve(&self) -> Result<RunContext> {
        let fit_field = self.fit_field.to_lowercase();

        // Grouping fields are handled in lowercase, fallbacks padded so
        // each group field has a slot.
        let group_fields: Vec<String> = self
            .group_fields
            .clone()
            .unwrap_or_else(|| DEFAULT_GROUP_FIELDS.iter().map(|s| s.to_string()).collect())
            .iter()
            .map(|f| f.to_lowercase())
            .collect();
        let mut fallbacks: Vec<Option<String>> = self
            .group_fields_fallbacks
            .iter()
            .map(|f| {
                let f = f.to_lowercase();
                (!f.is_empty()).then_some(f)
            })
            .collect();
        fallbacks.resize(group_fields.len(), None);

        let aliases = resolve_aliases(self.component_aliases.as_deref());

        let variant = Variant::new(&self.variant, &fit_field);
        let no_conflict: HashSet<String> = match &self.no_conflict {
            Some(fields) => fields.iter().map(|f| f.to_lowercase()).collect(),
            None => {
                let mut set = HashSet::new();
                set.insert(fit_field.clone());
                set.insert("part".to_string());
                if let Some(var_field) = variant.variant_field() {
                    set.insert(var_field.to_string());
                }
                set
            }
        };

        let columns = match &self.columns {
            Some(cols) => Some(resolve_columns(cols)?),
            None => None,
        };

        let mut aggregate = Vec::with_capacity(self.aggregate.len());
        for agg in &self.aggregate {
            if agg.file.as_os_str().is_empty() {
                return Err(BomError::config(
                    "Missing or empty `file` in aggregate list",
                ));
            }
            let name = if agg.name.is_empty() {
                agg.file
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            } else {
                agg.name.clone()
            };
            aggregate.push(AggregateSource {
                file: agg.file.clone(),
                name,
                ref_id: agg.ref_id.clone(),
                number: agg.number,
                delimiter: resolve_separator(&agg.delimiter, "aggregate CSV")?,
            });
        }

        // Filters: user definitions feed the registry, the registry is
        // consulted only here.
        let registry = filter::Registry::new(&self.filters, &fit_field)?;
        let pre_transform = registry.solve(self.pre_transform.as_ref(), None, true)?;
        let exclude_filter =
            registry.solve(self.exclude_filter.as_ref(), Some("_mechanical"), false)?;
        let dnf_filter = registry.solve(self.dnf_filter.as_ref(), Some("_kibom_dnf"), false)?;
        let dnc_filter = registry.solve(self.dnc_filter.as_ref(), Some("_kibom_dnc"), false)?;

        Ok(RunContext {
            number: self.number,
            ref_id: self.ref_id.clone(),
            fit_field,
            ignore_dnf: self.ignore_dnf,
            use_alt: self.use_alt,
            ref_separator: self.ref_separator.clone(),
            source_by_id: self.source_by_id,
            int_qtys: self.int_qtys,
            parse_value: self.parse_value,
            normalize_locale: self.normalize_locale,
            group_connectors: self.group_connectors,
            merge_blank_fields: self.merge_blank_fields,
            merge_both_blank: self.merge_both_blank,
            group_fields,
            group_fields_fallbacks: fallbacks,
            aliases,
            no_conflict,
            sort_style: self.sort_style,
            columns,
            aggregate,
            pre_transform,
            exclude_filter,
            dnf_filter,
            dnc_filter,
            variant,
            expand_text_vars: self.expand_text_vars,
            exclude_marked_in_sch: self.exclude_marked_in_sch,
            exclude_marked_in_pcb: self.exclude_marked_in_pcb,
            csv: CsvSink {
                separator: resolve_separator(&self.csv.separator, "CSV")?,
                hide_header: self.csv.hide_header,
                quote_all: self.csv.quote_all,
            },
            accept_no_ref: self.accept_no_ref,
        })
    }
}

impl RunContext {
    /// Canonical kind of a part name: its alias class, or the name itself.
    pub fn canonical_kind(&self, part: &str) -> String {
        let part = part.to_lowercase();
        self.aliases.get(&part).cloned().unwrap_or(part)
    }
}

fn resolve_aliases(classes: Option<&[Vec<String>]>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    match classes {
        Some(classes) => {
            for class in classes {
                if let Some(canonical) = class.first() {
                    for name in class {
                        map.insert(name.to_lowercase(), canonical.to_lowercase());
                    }
                }
            }
        }
        None => {
            for class in DEFAULT_ALIASES {
                for name in *class {
                    map.insert(name.to_string(), class[0].to_string());
                }
            }
        }
    }
    map
}

fn resolve_columns(cols: &[ColumnConfig]) -> Result<Vec<ColumnSpec>> {
    let mut out = Vec::with_capacity(cols.len());
    for col in cols {
        out.push(match col {
            ColumnConfig::Name(name) => ColumnSpec::plain(name),
            ColumnConfig::Full(full) => {
                if full.field.is_empty() {
                    return Err(BomError::config("Missing or empty `field` in columns list"));
                }
                let join = match &full.join {
                    None => Vec::new(),
                    Some(JoinConfig::One(field)) => vec![JoinEntry::field(field, "", "")],
                    Some(JoinConfig::Many(entries)) => {
                        let mut join = Vec::with_capacity(entries.len());
                        for entry in entries {
                            join.push(resolve_join_entry(entry)?);
                        }
                        join
                    }
                };
                ColumnSpec {
                    field: full.field.to_lowercase(),
                    name: if full.name.is_empty() {
                        full.field.clone()
                    } else {
                        full.name.clone()
                    },
                    join,
                    level: full.level,
                    comment: full.comment.clone(),
                }
            }
        });
    }
    Ok(out)
}

fn resolve_join_entry(entry: &JoinEntryConfig) -> Result<JoinEntry> {
    match entry {
        JoinEntryConfig::Field(field) => Ok(JoinEntry::field(field, "", "")),
        JoinEntryConfig::Full(full) => {
            if full.field.is_empty() && full.text.is_empty() {
                return Err(BomError::config(
                    "Missing or empty `field` and `text` in join list",
                ));
            }
            if !full.field.is_empty() && !full.text.is_empty() {
                return Err(BomError::config(
                    "You can't specify a `field` and a `text` in a join list",
                ));
            }
            if full.text.is_empty() {
                Ok(JoinEntry::field(
                    &full.field,
                    &unescape(&full.text_before),
                    &unescape(&full.text_after),
                ))
            } else {
                Ok(JoinEntry::Text(unescape(&full.text)))
            }
        }
    }
}
