//! Engineering-notation parsing for passive component values.
//!
//! `Value` strings come in many spellings: `4k7`, `4.7k`, `4700`, `0.1uF`,
//! `100n`, `2M2`, `1k 5%`. For grouping purposes they all need to compare
//! by magnitude, with trailing qualifiers (tolerance, voltage, wattage)
//! stripped out. Parsing is exact over `rust_decimal::Decimal`; a string
//! that cannot be interpreted falls back to case-folded raw comparison and
//! never produces an error.

use rust_decimal::Decimal;
use serde::Serialize;

/// Unit of a parsed passive value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ValueUnit {
    Ohms,
    Farads,
    Henries,
}

impl ValueUnit {
    fn symbol(self) -> &'static str {
        match self {
            ValueUnit::Ohms => "",
            ValueUnit::Farads => "F",
            ValueUnit::Henries => "H",
        }
    }

    /// Unit words accepted as an explicit suffix for this unit.
    fn words(self) -> &'static [&'static str] {
        match self {
            ValueUnit::Ohms => &["r", "ohm", "ohms", "Ω", "ω"],
            ValueUnit::Farads => &["f", "farad", "farads"],
            ValueUnit::Henries => &["h", "henry", "henries", "henrys"],
        }
    }
}

/// Passive component kinds whose `Value` field is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassiveKind {
    Resistor,
    Capacitor,
    Inductor,
}

impl PassiveKind {
    /// Map a canonical part kind (the first name of its alias class) to a
    /// passive kind, when it is one.
    pub fn from_canonical(kind: &str) -> Option<Self> {
        match kind {
            "r" | "res" | "resistor" => Some(PassiveKind::Resistor),
            "c" | "cap" | "capacitor" => Some(PassiveKind::Capacitor),
            "l" | "inductor" => Some(PassiveKind::Inductor),
            _ => None,
        }
    }

    fn unit(self) -> ValueUnit {
        match self {
            PassiveKind::Resistor => ValueUnit::Ohms,
            PassiveKind::Capacitor => ValueUnit::Farads,
            PassiveKind::Inductor => ValueUnit::Henries,
        }
    }
}

/// A successfully parsed value: magnitude in base units plus the qualifier
/// tokens that were stripped from the string.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedValue {
    pub magnitude: Decimal,
    pub unit: ValueUnit,
    /// Tokens after the value itself (`5%`, `50V`, `1/4W`, ...).
    pub qualifiers: Vec<String>,
}

impl ParsedValue {
    /// Look up the stripped qualifier that feeds a dedicated field:
    /// `tolerance` -> `5%`, `voltage` -> `50V`, `power` -> `0.25W`,
    /// `current` -> `2A`.
    pub fn qualifier_for(&self, field: &str) -> Option<&str> {
        let suffix = match field {
            "tolerance" => "%",
            "voltage" => "V",
            "power" => "W",
            "current" => "A",
            _ => return None,
        };
        self.qualifiers
            .iter()
            .find(|q| {
                let q = q.trim_start_matches('±');
                q.len() > suffix.len()
                    && q.to_ascii_uppercase().ends_with(&suffix.to_ascii_uppercase())
                    && q.starts_with(|c: char| c.is_ascii_digit() || c == '.')
            })
            .map(|s| s.as_str())
    }
}

impl std::fmt::Display for ParsedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (scaled, prefix) = scale_to_si(self.magnitude);
        write!(f, "{}{}{}", fmt_plain(scaled), prefix, self.unit.symbol())
    }
}

/// Canonical comparable form of a `Value` field. Parsed values compare by
/// (unit, magnitude); anything unparseable compares as a case-folded
/// string. Parsed sorts before raw, which keeps passives ahead of
/// free-text values in value-ordered output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Canonical {
    Parsed { unit: ValueUnit, magnitude: Decimal },
    Raw(String),
}

impl Canonical {
    pub fn is_blank(&self) -> bool {
        matches!(self, Canonical::Raw(s) if s.is_empty())
    }
}

/// Normalize a raw `Value` string for comparison. Only passive kinds are
/// parsed; everything else (and any parse failure) fails open to raw
/// string comparison.
pub fn normalize(raw: &str, kind: Option<PassiveKind>, locale_comma: bool) -> Canonical {
    match kind.and_then(|k| parse(raw, k, locale_comma)) {
        Some(v) => Canonical::Parsed {
            unit: v.unit,
            magnitude: v.magnitude.normalize(),
        },
        None => Canonical::Raw(raw.trim().to_lowercase()),
    }
}

/// Parse an engineering-notation value for the given passive kind.
/// `locale_comma` accepts `,` as the decimal separator (`4,7k`).
pub fn parse(raw: &str, kind: PassiveKind, locale_comma: bool) -> Option<ParsedValue> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let cleaned = if locale_comma {
        raw.replace(',', ".")
    } else {
        raw.to_string()
    };

    let mut tokens = cleaned.split_whitespace();
    let mut head = tokens.next()?.to_string();
    let mut qualifiers: Vec<String> = tokens.map(str::to_string).collect();

    // The value may be split across two tokens ("4.7 k", "10 ohm"): fold a
    // purely alphabetic second token into the first when the result parses.
    if let Some(next) = qualifiers.first() {
        if next.chars().all(|c| c.is_alphabetic() || c == 'µ' || c == 'Ω') {
            let joined = format!("{}{}", head, next);
            if parse_token(&joined, kind).is_some() {
                head = joined;
                qualifiers.remove(0);
            }
        }
    }

    let (magnitude, unit) = parse_token(&head, kind)?;
    Some(ParsedValue {
        magnitude,
        unit,
        qualifiers,
    })
}

fn parse_token(token: &str, kind: PassiveKind) -> Option<(Decimal, ValueUnit)> {
    if let Some(v) = parse_infix(token, kind) {
        return Some(v);
    }

    // Split the leading number from the suffix.
    let split = token
        .find(|c: char| !c.is_ascii_digit() && c != '.' && c != '-' && c != '+')
        .unwrap_or(token.len());
    if split == 0 {
        return None;
    }
    let (number, suffix) = token.split_at(split);
    let base: Decimal = number.parse().ok()?;
    let (multiplier, unit) = parse_suffix(suffix, kind)?;
    Some((base * multiplier, unit))
}

/// Infix multiplier notation: the prefix letter doubles as the decimal
/// point (`4k7` -> 4.7k, `2M2` -> 2.2M, `4R7` -> 4.7).
fn parse_infix(token: &str, kind: PassiveKind) -> Option<(Decimal, ValueUnit)> {
    let pos = token.find(|c: char| c.is_alphabetic() || c == 'µ')?;
    let prefix = &token[pos..pos + token[pos..].chars().next()?.len_utf8()];
    let before = &token[..pos];
    let after = &token[pos + prefix.len()..];

    if before.is_empty()
        || after.is_empty()
        || !before
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == '-' || c == '+')
        || !after.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let (multiplier, unit) = match prefix {
        "R" | "r" => (Decimal::ONE, ValueUnit::Ohms),
        _ => (prefix_multiplier(prefix)?, kind.unit()),
    };

    let before_num: Decimal = before.parse().ok()?;
    let after_num: Decimal = after.parse().ok()?;
    let value = before_num + after_num * pow10(-(after.len() as i32));
    Some((value * multiplier, unit))
}

/// SI prefix multipliers recognized in value suffixes. `m`/`M` are
/// case-sensitive (milli vs mega); the rest accept either case.
fn prefix_multiplier(prefix: &str) -> Option<Decimal> {
    let exp = match prefix {
        "f" => -15,
        "p" | "P" => -12,
        "n" | "N" => -9,
        "u" | "U" | "µ" => -6,
        "m" => -3,
        "k" | "K" => 3,
        "M" => 6,
        "G" | "g" => 9,
        _ => return None,
    };
    Some(pow10(exp))
}

fn parse_suffix(suffix: &str, kind: PassiveKind) -> Option<(Decimal, ValueUnit)> {
    if suffix.is_empty() {
        return Some((Decimal::ONE, kind.unit()));
    }
    // A bare unit word ("R", "ohm", "F").
    if let Some(unit) = match_unit_word(suffix) {
        return Some((Decimal::ONE, unit));
    }
    // "meg" is the one multi-character prefix.
    if let Some(rest) = strip_prefix_ci(suffix, "meg") {
        return suffix_unit(rest, kind).map(|u| (pow10(6), u));
    }
    let first = suffix.chars().next()?;
    let prefix = &suffix[..first.len_utf8()];
    let multiplier = prefix_multiplier(prefix)?;
    suffix_unit(&suffix[prefix.len()..], kind).map(|u| (multiplier, u))
}

/// Resolve what follows a multiplier prefix: nothing (unit from the
/// component kind) or an explicit unit word.
fn suffix_unit(rest: &str, kind: PassiveKind) -> Option<ValueUnit> {
    if rest.is_empty() {
        Some(kind.unit())
    } else {
        match_unit_word(rest)
    }
}

fn match_unit_word(word: &str) -> Option<ValueUnit> {
    for unit in [ValueUnit::Ohms, ValueUnit::Farads, ValueUnit::Henries] {
        if unit.words().iter().any(|w| w.eq_ignore_ascii_case(word)) {
            return Some(unit);
        }
    }
    None
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

#[inline]
fn pow10(exp: i32) -> Decimal {
    if exp >= 0 {
        Decimal::from_i128_with_scale(10i128.pow(exp as u32), 0)
    } else {
        Decimal::new(1, (-exp) as u32)
    }
}

const DISPLAY_PREFIXES: [(i32, &str); 9] = [
    (9, "G"),
    (6, "M"),
    (3, "k"),
    (0, ""),
    (-3, "m"),
    (-6, "u"),
    (-9, "n"),
    (-12, "p"),
    (-15, "f"),
];

fn scale_to_si(raw: Decimal) -> (Decimal, &'static str) {
    for &(exp, sym) in &DISPLAY_PREFIXES {
        let factor = pow10(exp);
        if raw.abs() >= factor {
            return (raw / factor, sym);
        }
    }
    (raw, "")
}

fn fmt_plain(x: Decimal) -> String {
    let formatted = format!("{}", x);
    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}
