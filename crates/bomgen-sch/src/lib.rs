//! Component records for BoM generation.
//!
//! This crate holds the schematic-side data model consumed by the BoM
//! engine: placed component instances with their fields, reference
//! designators with natural ordering, engineering-notation value parsing
//! and the loaders that produce components from KiCad netlist exports and
//! CSV files.
//!
//! The central structure is [`Component`]: one placed part instance with
//! an ordered, case-insensitively keyed field map. Components are created
//! once per run by a loader, mutated in place by the filter stages (flags
//! and reference prefixing) and consumed by grouping.

pub mod csv_loader;
pub mod netlist;
pub mod value;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Reference designator (e.g. `R1`, `C12`) with natural ordering
/// (C1 < C2 < C10). Keeps the raw string; the alphabetic-prefix /
/// numeric-suffix split is computed on demand for range compression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefDes(String);

impl RefDes {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into alphabetic prefix and trailing number, if the designator
    /// has the usual `<letters><digits>` shape. `R12` -> `("R", Some(12))`,
    /// `X?` -> `("X?", None)`.
    pub fn split(&self) -> (&str, Option<u64>) {
        let digits = self
            .0
            .rfind(|c: char| !c.is_ascii_digit())
            .map(|p| p + 1)
            .unwrap_or(0);
        let (prefix, number) = self.0.split_at(digits);
        match number.parse::<u64>() {
            Ok(n) => (prefix, Some(n)),
            Err(_) => (self.0.as_str(), None),
        }
    }

    /// Alphabetic prefix only (`R7` -> `R`).
    pub fn prefix(&self) -> &str {
        self.split().0
    }
}

impl From<&str> for RefDes {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for RefDes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialOrd for RefDes {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RefDes {
    fn cmp(&self, other: &Self) -> Ordering {
        natord::compare(&self.0, &other.0)
    }
}

/// One named field of a component. `index` preserves the source column
/// order so output columns can be listed the way the design tool shows
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub index: i32,
}

/// One placed part instance.
///
/// Field names are case-insensitive; insertion order is preserved for
/// display. The `included`/`fitted`/`fixed` flags are owned by the filter
/// pipeline, while `in_bom`/`in_bom_pcb` are seeded by the loader from
/// design-tool exclusion markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub reference: RefDes,
    /// Library symbol name (the `Part` grouping key).
    pub part: String,
    pub part_lib: String,
    pub value: String,
    /// Footprint in `lib:name` form as the design tool stores it.
    pub footprint: String,
    pub datasheet: String,
    pub sheet_path: String,
    /// Logical name of the source project this component came from.
    pub project: String,
    /// Reference-id prefix applied by aggregation (empty for the primary).
    pub ref_id: String,
    fields: Vec<Field>,
    pub included: bool,
    pub fitted: bool,
    pub fixed: bool,
    pub in_bom: bool,
    pub in_bom_pcb: bool,
}

impl Component {
    pub fn new(reference: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            reference: RefDes::new(reference),
            part: String::new(),
            part_lib: String::new(),
            value: String::new(),
            footprint: String::new(),
            datasheet: String::new(),
            sheet_path: String::new(),
            project: project.into(),
            ref_id: String::new(),
            fields: Vec::new(),
            included: true,
            fitted: true,
            fixed: false,
            in_bom: true,
            in_bom_pcb: true,
        }
    }

    /// Footprint name without the library prefix (`Lib:R_0603` -> `R_0603`).
    pub fn footprint_name(&self) -> &str {
        self.footprint
            .rsplit_once(':')
            .map(|(_, name)| name)
            .unwrap_or(&self.footprint)
    }

    /// Library part of the footprint (`Lib:R_0603` -> `Lib`), empty when
    /// the footprint carries no library.
    pub fn footprint_lib(&self) -> &str {
        self.footprint
            .rsplit_once(':')
            .map(|(lib, _)| lib)
            .unwrap_or("")
    }

    /// Add a field, replacing the value of an existing one with the same
    /// (case-insensitive) name.
    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>, index: i32) {
        let name = name.into();
        let value = value.into();
        if let Some(f) = self.field_entry_mut(&name) {
            f.value = value;
            return;
        }
        self.fields.push(Field { name, value, index });
    }

    fn field_entry_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Resolve a field by (case-insensitive) name.
    ///
    /// The built-in names resolve from the struct columns; everything else
    /// from the field map. Returns `None` for an absent field, which is
    /// distinct from an empty value.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name.to_ascii_lowercase().as_str() {
            "reference" | "references" => Some(self.reference.as_str()),
            "value" => Some(&self.value),
            "part" => Some(&self.part),
            "part lib" => Some(&self.part_lib),
            "footprint" => Some(self.footprint_name()),
            "footprint lib" => Some(self.footprint_lib()),
            "datasheet" => Some(&self.datasheet),
            "sheetpath" => Some(&self.sheet_path),
            _ => self
                .fields
                .iter()
                .find(|f| f.name.eq_ignore_ascii_case(name))
                .map(|f| f.value.as_str()),
        }
    }

    /// Overwrite a field value, writing through to the struct columns for
    /// the built-in names. Used by transform filters.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match name.to_ascii_lowercase().as_str() {
            "reference" | "references" => self.reference = RefDes::new(value),
            "value" => self.value = value,
            "part" => self.part = value,
            "part lib" => self.part_lib = value,
            "footprint" => self.footprint = value,
            "datasheet" => self.datasheet = value,
            "sheetpath" => self.sheet_path = value,
            _ => {
                let next = self.fields.len() as i32 + 4;
                self.add_field(name.to_string(), value, next);
            }
        }
    }

    /// Rename a user field, keeping its value and position. No-op when the
    /// field is absent.
    pub fn rename_field(&mut self, from: &str, to: &str) {
        if let Some(f) = self.field_entry_mut(from) {
            f.name = to.to_string();
        }
    }

    /// All fields in insertion order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Field names of this component, lowercased, in display order.
    pub fn field_names(&self) -> impl Iterator<Item = String> + '_ {
        self.fields.iter().map(|f| f.name.to_ascii_lowercase())
    }

    /// Prepend a source reference-id to the designator.
    pub fn apply_ref_id(&mut self, ref_id: &str) {
        if !ref_id.is_empty() {
            self.reference = RefDes::new(format!("{}{}", ref_id, self.reference));
            self.ref_id = ref_id.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refdes_natural_order() {
        let mut refs: Vec<RefDes> = ["R10", "R2", "R1", "C5"].iter().map(|s| (*s).into()).collect();
        refs.sort();
        let sorted: Vec<&str> = refs.iter().map(|r| r.as_str()).collect();
        assert_eq!(sorted, vec!["C5", "R1", "R2", "R10"]);
    }

    #[test]
    fn refdes_split() {
        assert_eq!(RefDes::new("LED12").split(), ("LED", Some(12)));
        assert_eq!(RefDes::new("R1").split(), ("R", Some(1)));
        assert_eq!(RefDes::new("X?").split(), ("X?", None));
        assert_eq!(RefDes::new("A2R10").split(), ("A2R", Some(10)));
    }

    #[test]
    fn field_lookup_is_case_insensitive() {
        let mut c = Component::new("R1", "main");
        c.add_field("Tolerance", "5%", 4);
        assert_eq!(c.field("tolerance"), Some("5%"));
        assert_eq!(c.field("TOLERANCE"), Some("5%"));
        assert_eq!(c.field("voltage"), None);
    }

    #[test]
    fn builtin_fields_resolve_from_columns() {
        let mut c = Component::new("C3", "main");
        c.value = "100n".to_string();
        c.footprint = "Capacitor_SMD:C_0402".to_string();
        assert_eq!(c.field("Value"), Some("100n"));
        assert_eq!(c.field("Footprint"), Some("C_0402"));
        assert_eq!(c.field("Footprint Lib"), Some("Capacitor_SMD"));
    }

    #[test]
    fn add_field_replaces_same_name() {
        let mut c = Component::new("R1", "main");
        c.add_field("MPN", "RC0603-1", 4);
        c.add_field("mpn", "RC0603-2", 9);
        assert_eq!(c.field("MPN"), Some("RC0603-2"));
        assert_eq!(c.fields().len(), 1);
    }

    #[test]
    fn ref_id_prefixing() {
        let mut c = Component::new("R1", "aux");
        c.apply_ref_id("B:");
        assert_eq!(c.reference.as_str(), "B:R1");
        assert_eq!(c.ref_id, "B:");
    }
}
