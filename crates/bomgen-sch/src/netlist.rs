//! KiCad netlist (`.net`) loader.
//!
//! Reads the S-expression netlist export and produces [`Component`]s from
//! the `(export (components ...))` section. Only the component records are
//! consumed; libparts and nets are ignored.

use thiserror::Error;

use crate::Component;

#[derive(Debug, Error)]
pub enum NetlistError {
    #[error("unterminated string at byte {0}")]
    UnterminatedString(usize),
    #[error("unbalanced parenthesis at byte {0}")]
    Unbalanced(usize),
    #[error("unexpected data at byte {0}")]
    Unexpected(usize),
    #[error("not a netlist export (missing `export` root)")]
    NotAnExport,
}

/// Minimal S-expression node: atoms keep their exact source text.
#[derive(Debug, Clone, PartialEq)]
enum Sexpr {
    Atom(String),
    Str(String),
    List(Vec<Sexpr>),
}

impl Sexpr {
    fn as_sym(&self) -> Option<&str> {
        match self {
            Sexpr::Atom(s) => Some(s),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Sexpr::Str(s) | Sexpr::Atom(s) => Some(s),
            Sexpr::List(_) => None,
        }
    }

    fn as_list(&self) -> Option<&[Sexpr]> {
        match self {
            Sexpr::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Find a direct child list `(name ...)` within a list of nodes.
fn child_list<'a>(items: &'a [Sexpr], name: &str) -> Option<&'a [Sexpr]> {
    items.iter().find_map(|item| {
        let list = item.as_list()?;
        (list.first()?.as_sym() == Some(name)).then_some(list)
    })
}

/// Resolve a `(name "value")` child to its value.
fn child_str<'a>(items: &'a [Sexpr], name: &str) -> Option<&'a str> {
    child_list(items, name)?.get(1)?.as_str()
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn parse(&mut self) -> Result<Sexpr, NetlistError> {
        self.skip_ws();
        match self.src.get(self.pos) {
            Some(b'(') => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    self.skip_ws();
                    match self.src.get(self.pos) {
                        Some(b')') => {
                            self.pos += 1;
                            return Ok(Sexpr::List(items));
                        }
                        None => return Err(NetlistError::Unbalanced(self.pos)),
                        _ => items.push(self.parse()?),
                    }
                }
            }
            Some(b'"') => self.parse_string(),
            Some(_) => self.parse_atom(),
            None => Err(NetlistError::Unexpected(self.pos)),
        }
    }

    fn parse_string(&mut self) -> Result<Sexpr, NetlistError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        while let Some(&b) = self.src.get(self.pos) {
            match b {
                b'"' => {
                    self.pos += 1;
                    return Ok(Sexpr::Str(out));
                }
                b'\\' => {
                    self.pos += 1;
                    match self.src.get(self.pos) {
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        Some(&c) => out.push(c as char),
                        None => return Err(NetlistError::UnterminatedString(start)),
                    }
                    self.pos += 1;
                }
                _ => {
                    // Copy the full UTF-8 sequence, not just the lead byte.
                    let ch_len = utf8_len(b);
                    let end = (self.pos + ch_len).min(self.src.len());
                    out.push_str(std::str::from_utf8(&self.src[self.pos..end]).unwrap_or("?"));
                    self.pos = end;
                }
            }
        }
        Err(NetlistError::UnterminatedString(start))
    }

    fn parse_atom(&mut self) -> Result<Sexpr, NetlistError> {
        let start = self.pos;
        while let Some(&b) = self.src.get(self.pos) {
            if b.is_ascii_whitespace() || b == b'(' || b == b')' || b == b'"' {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(NetlistError::Unexpected(start));
        }
        Ok(Sexpr::Atom(
            String::from_utf8_lossy(&self.src[start..self.pos]).into_owned(),
        ))
    }
}

fn utf8_len(lead: u8) -> usize {
    match lead {
        0xF0..=0xF7 => 4,
        0xE0..=0xEF => 3,
        0xC0..=0xDF => 2,
        _ => 1,
    }
}

/// Parse a KiCad netlist export into components. `project` becomes the
/// logical source name of every component.
pub fn parse_netlist(input: &str, project: &str) -> Result<Vec<Component>, NetlistError> {
    let root = Parser::new(input).parse()?;
    let items = root.as_list().ok_or(NetlistError::NotAnExport)?;
    if items.first().and_then(Sexpr::as_sym) != Some("export") {
        return Err(NetlistError::NotAnExport);
    }

    let mut comps = Vec::new();
    let Some(components) = child_list(items, "components") else {
        return Ok(comps);
    };

    for node in components.iter().skip(1) {
        let Some(comp) = node.as_list() else {
            continue;
        };
        if comp.first().and_then(Sexpr::as_sym) != Some("comp") {
            continue;
        }
        let Some(reference) = child_str(comp, "ref") else {
            continue;
        };
        // Power symbols and net labels are not real parts.
        if reference.is_empty() || reference.starts_with('#') {
            continue;
        }

        let mut c = Component::new(reference, project);
        c.value = child_str(comp, "value").unwrap_or_default().to_string();
        c.footprint = child_str(comp, "footprint").unwrap_or_default().to_string();
        c.datasheet = non_placeholder(child_str(comp, "datasheet"));
        if let Some(libsource) = child_list(comp, "libsource") {
            c.part_lib = child_str(libsource, "lib").unwrap_or_default().to_string();
            c.part = child_str(libsource, "part").unwrap_or_default().to_string();
        }
        if let Some(sheetpath) = child_list(comp, "sheetpath") {
            c.sheet_path = child_str(sheetpath, "names").unwrap_or("/").to_string();
        }

        // User fields, in schematic order.
        let mut index = 4;
        if let Some(fields) = child_list(comp, "fields") {
            for field in fields.iter().skip(1) {
                let Some(field) = field.as_list() else {
                    continue;
                };
                if field.first().and_then(Sexpr::as_sym) != Some("field") {
                    continue;
                }
                let Some(name) = child_str(field, "name") else {
                    continue;
                };
                let value = field.get(2).and_then(Sexpr::as_str).unwrap_or_default();
                c.add_field(name, value, index);
                index += 1;
            }
        }

        // Design-tool exclusion markers (KiCad 7+): presence of the
        // property is the flag.
        for node in comp.iter().skip(1) {
            let Some(prop) = node.as_list() else {
                continue;
            };
            if prop.first().and_then(Sexpr::as_sym) != Some("property") {
                continue;
            }
            match child_str(prop, "name") {
                Some("exclude_from_bom") => c.in_bom = false,
                Some("exclude_from_board") => c.in_bom_pcb = false,
                Some("dnp") => {
                    c.add_field("dnp", "DNP", index);
                    index += 1;
                }
                _ => {}
            }
        }

        comps.push(c);
    }

    Ok(comps)
}

fn non_placeholder(s: Option<&str>) -> String {
    match s {
        Some("~") | None => String::new(),
        Some(s) => s.to_string(),
    }
}
