//! Culture-aware text formatting and parsing.
//!
//! Every conversion between values and text takes an explicit [`Culture`].
//! There is no process-wide default: callers that do not care pass
//! [`Culture::invariant`], which renders the engine's native ISO text.
//!
//! Numeric format strings follow the familiar .NET shapes (`N2`, `F0`, `P1`,
//! `E3`, `D5`, `X`, `C`, `G4`, and custom `#,##0.00` patterns). Dates and
//! date-times use chrono strftime patterns. Time spans accept `c`, `g`, `G`
//! and custom `d h m s f` patterns.

use crate::value::Value;
use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::str::FromStr;

/// Formatting conventions for one locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct Culture {
    name: &'static str,
    decimal_separator: char,
    group_separator: char,
    date_format: &'static str,
    date_time_format: &'static str,
    currency_symbol: &'static str,
    currency_prefix: bool,
}

const INVARIANT: Culture = Culture {
    name: "",
    decimal_separator: '.',
    group_separator: ',',
    date_format: "%Y-%m-%d",
    date_time_format: "%Y-%m-%d %H:%M:%S",
    currency_symbol: "¤",
    currency_prefix: true,
};

const BUILTIN: &[Culture] = &[
    INVARIANT,
    Culture {
        name: "en-US",
        decimal_separator: '.',
        group_separator: ',',
        date_format: "%-m/%-d/%Y",
        date_time_format: "%-m/%-d/%Y %-I:%M:%S %p",
        currency_symbol: "$",
        currency_prefix: true,
    },
    Culture {
        name: "en-GB",
        decimal_separator: '.',
        group_separator: ',',
        date_format: "%d/%m/%Y",
        date_time_format: "%d/%m/%Y %H:%M:%S",
        currency_symbol: "£",
        currency_prefix: true,
    },
    Culture {
        name: "de-DE",
        decimal_separator: ',',
        group_separator: '.',
        date_format: "%d.%m.%Y",
        date_time_format: "%d.%m.%Y %H:%M:%S",
        currency_symbol: "€",
        currency_prefix: false,
    },
    Culture {
        name: "de-CH",
        decimal_separator: '.',
        group_separator: '\'',
        date_format: "%d.%m.%Y",
        date_time_format: "%d.%m.%Y %H:%M:%S",
        currency_symbol: "CHF",
        currency_prefix: true,
    },
    Culture {
        name: "fr-FR",
        decimal_separator: ',',
        group_separator: '\u{a0}',
        date_format: "%d/%m/%Y",
        date_time_format: "%d/%m/%Y %H:%M:%S",
        currency_symbol: "€",
        currency_prefix: false,
    },
    Culture {
        name: "es-ES",
        decimal_separator: ',',
        group_separator: '.',
        date_format: "%d/%m/%Y",
        date_time_format: "%d/%m/%Y %H:%M:%S",
        currency_symbol: "€",
        currency_prefix: false,
    },
    Culture {
        name: "it-IT",
        decimal_separator: ',',
        group_separator: '.',
        date_format: "%d/%m/%Y",
        date_time_format: "%d/%m/%Y %H:%M:%S",
        currency_symbol: "€",
        currency_prefix: false,
    },
    Culture {
        name: "ja-JP",
        decimal_separator: '.',
        group_separator: ',',
        date_format: "%Y/%m/%d",
        date_time_format: "%Y/%m/%d %H:%M:%S",
        currency_symbol: "¥",
        currency_prefix: true,
    },
];

impl Default for Culture {
    fn default() -> Self {
        Self::invariant()
    }
}

impl Culture {
    /// The culture-neutral conventions: `.` decimals, ISO dates.
    pub fn invariant() -> Self {
        INVARIANT
    }

    /// Look up a built-in culture. Accepts `de-DE`, `de_de`, and `""` or
    /// `invariant` for the invariant culture.
    pub fn from_name(name: &str) -> Result<Self, CultureError> {
        let wanted = name.trim().replace('_', "-");
        if wanted.is_empty() || wanted.eq_ignore_ascii_case("invariant") {
            return Ok(Self::invariant());
        }
        BUILTIN
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&wanted))
            .cloned()
            .ok_or_else(|| CultureError::Unknown(name.to_string()))
    }

    /// Names of all built-in cultures (the invariant culture is `""`).
    pub fn names() -> impl Iterator<Item = &'static str> {
        BUILTIN.iter().map(|c| c.name)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_invariant(&self) -> bool {
        self.name.is_empty()
    }

    pub fn decimal_separator(&self) -> char {
        self.decimal_separator
    }

    pub fn group_separator(&self) -> char {
        self.group_separator
    }

    // ------------------------------------------------------------------
    // Formatting
    // ------------------------------------------------------------------

    /// Default textual form of a value.
    pub fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Bool(b) => bool_text(*b).to_string(),
            Value::Byte(_) | Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => {
                value.as_i64().map(|n| n.to_string()).unwrap_or_default()
            }
            Value::Float(n) => self.general(f64::from(*n)),
            Value::Double(n) => self.general(*n),
            Value::Decimal(d) => self.localize_point(&d.to_string()),
            Value::String(s) => s.clone(),
            Value::Date(d) => d.format(self.date_format).to_string(),
            Value::DateTime(dt) => dt.format(self.date_time_format).to_string(),
            Value::Time(t) => format_time_span(*t, "c").unwrap_or_default(),
        }
    }

    /// Format a value with an explicit pattern.
    ///
    /// A blank pattern means the default form. Returns `None` when the
    /// pattern is not valid for the value's type.
    pub fn format_with(&self, value: &Value, pattern: &str) -> Option<String> {
        if pattern.trim().is_empty() {
            return Some(self.format_value(value));
        }
        match value {
            Value::Bool(b) => Some(bool_text(*b).to_string()),
            Value::Byte(_) | Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => {
                self.format_integer(value.as_i64()?, pattern)
            }
            Value::Float(_) | Value::Double(_) | Value::Decimal(_) => {
                self.format_number(value.as_f64()?, pattern)
            }
            Value::String(s) => Some(s.clone()),
            Value::Date(d) => strftime(&d.and_time(NaiveTime::MIN), pattern),
            Value::DateTime(dt) => strftime(dt, pattern),
            Value::Time(t) => format_time_span(*t, pattern),
        }
    }

    /// Format an integer. `D` and `X` are integer-only; everything else is
    /// shared with floating point values.
    pub fn format_integer(&self, n: i64, pattern: &str) -> Option<String> {
        match standard_spec(pattern) {
            Some(('D' | 'd', precision)) => {
                let digits = format!("{:0width$}", n.unsigned_abs(), width = precision.unwrap_or(0));
                Some(if n < 0 { format!("-{digits}") } else { digits })
            }
            Some(('X', precision)) => Some(format!("{:0width$X}", n, width = precision.unwrap_or(0))),
            Some(('x', precision)) => Some(format!("{:0width$x}", n, width = precision.unwrap_or(0))),
            Some(('G' | 'g', None)) => Some(n.to_string()),
            _ => self.format_number(n as f64, pattern),
        }
    }

    /// Format a floating point number.
    pub fn format_number(&self, n: f64, pattern: &str) -> Option<String> {
        if n.is_nan() {
            return Some("NaN".into());
        }
        if n.is_infinite() {
            return Some(if n > 0.0 { "Infinity" } else { "-Infinity" }.into());
        }
        let Some((spec, precision)) = standard_spec(pattern) else {
            return Some(self.format_custom(n, pattern));
        };
        match spec {
            'F' | 'f' => Some(self.fixed(n, precision.unwrap_or(2), false)),
            'N' | 'n' => Some(self.fixed(n, precision.unwrap_or(2), true)),
            'P' | 'p' => Some(format!("{}%", self.fixed(n * 100.0, precision.unwrap_or(2), true))),
            'C' | 'c' => {
                let body = self.fixed(n.abs(), precision.unwrap_or(2), true);
                let sign = if n < 0.0 && body.chars().any(|c| matches!(c, '1'..='9')) {
                    "-"
                } else {
                    ""
                };
                Some(if self.currency_prefix {
                    format!("{sign}{}{body}", self.currency_symbol)
                } else {
                    format!("{sign}{body} {}", self.currency_symbol)
                })
            }
            'E' | 'e' => Some(self.scientific(n, precision.unwrap_or(6), spec == 'E')),
            'G' | 'g' => Some(match precision {
                None | Some(0) => self.general(n),
                Some(p) => self.general(round_significant(n, p)),
            }),
            'R' | 'r' => Some(self.general(n)),
            _ => None,
        }
    }

    /// Shortest round-trip form, switching to exponent notation for very
    /// large or very small magnitudes.
    fn general(&self, n: f64) -> String {
        if n.is_nan() {
            return "NaN".into();
        }
        if n.is_infinite() {
            return if n > 0.0 { "Infinity" } else { "-Infinity" }.into();
        }
        let abs = n.abs();
        if abs != 0.0 && !(1e-5..1e15).contains(&abs) {
            let text = format!("{n:e}");
            let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            return format!(
                "{}E{sign}{:02}",
                self.localize_point(mantissa),
                exponent.unsigned_abs()
            );
        }
        self.localize_point(&n.to_string())
    }

    fn fixed(&self, n: f64, decimals: usize, grouped: bool) -> String {
        let text = format!("{:.*}", decimals, n.abs());
        let (int_part, frac_part) = text.split_once('.').unwrap_or((&text, ""));
        let int_part = if grouped {
            group_digits(int_part, self.group_separator)
        } else {
            int_part.to_string()
        };
        let mut out = String::new();
        if n < 0.0 && text.chars().any(|c| matches!(c, '1'..='9')) {
            out.push('-');
        }
        out.push_str(&int_part);
        if !frac_part.is_empty() {
            out.push(self.decimal_separator);
            out.push_str(frac_part);
        }
        out
    }

    fn scientific(&self, n: f64, decimals: usize, upper: bool) -> String {
        let text = format!("{:.*e}", decimals, n);
        let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        let marker = if upper { 'E' } else { 'e' };
        format!(
            "{}{marker}{sign}{:03}",
            self.localize_point(mantissa),
            exponent.unsigned_abs()
        )
    }

    /// Custom patterns built from `0`, `#`, `,` and `.` placeholders with
    /// literal text around them. A `%` anywhere scales by 100.
    fn format_custom(&self, n: f64, pattern: &str) -> String {
        let placeholder = |c: char| c == '0' || c == '#';
        let (Some(start), Some(end)) = (pattern.find(placeholder), pattern.rfind(placeholder))
        else {
            return pattern.to_string();
        };
        let prefix = &pattern[..start];
        let body = &pattern[start..=end];
        let suffix = &pattern[end + 1..];

        let n = if prefix.contains('%') || suffix.contains('%') {
            n * 100.0
        } else {
            n
        };

        let (int_spec, frac_spec) = body.split_once('.').unwrap_or((body, ""));
        let grouped = int_spec.contains(',');
        let min_int = int_spec.chars().filter(|&c| c == '0').count();
        let min_frac = frac_spec.chars().filter(|&c| c == '0').count();
        let max_frac = frac_spec.chars().filter(|&c| placeholder(c)).count();

        let text = format!("{:.*}", max_frac, n.abs());
        let (int_digits, frac_digits) = text.split_once('.').unwrap_or((&text, ""));

        let mut frac = frac_digits.to_string();
        while frac.len() > min_frac && frac.ends_with('0') {
            frac.pop();
        }

        let int_digits = int_digits.trim_start_matches('0');
        let int_digits = format!("{int_digits:0>min_int$}");
        let int_digits = if grouped {
            group_digits(&int_digits, self.group_separator)
        } else {
            int_digits
        };

        let mut out = String::new();
        if n < 0.0 && text.chars().any(|c| matches!(c, '1'..='9')) {
            out.push('-');
        }
        out.push_str(prefix);
        out.push_str(&int_digits);
        if !frac.is_empty() {
            out.push(self.decimal_separator);
            out.push_str(&frac);
        }
        out.push_str(suffix);
        out
    }

    fn localize_point(&self, text: &str) -> String {
        if self.decimal_separator == '.' {
            text.to_string()
        } else {
            text.replace('.', &self.decimal_separator.to_string())
        }
    }

    // ------------------------------------------------------------------
    // Parsing
    // ------------------------------------------------------------------

    /// Parse a number leniently: surrounding whitespace, a leading or
    /// trailing sign, parentheses for negatives, the currency symbol, group
    /// separators in the integer part and an exponent are all accepted.
    pub fn parse_number(&self, text: &str) -> Option<f64> {
        self.normalize_number(text)?.parse::<f64>().ok()
    }

    /// Rewrite culture-formatted number text into plain `-123.45e6` form.
    pub fn normalize_number(&self, text: &str) -> Option<String> {
        let mut s = text.trim();
        let mut negative = false;

        if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            negative = true;
            s = inner.trim();
        }
        if let Some(rest) = s.strip_prefix(self.currency_symbol) {
            s = rest.trim_start();
        } else if let Some(rest) = s.strip_suffix(self.currency_symbol) {
            s = rest.trim_end();
        }
        if let Some(rest) = s.strip_prefix('-') {
            negative = !negative;
            s = rest.trim_start();
        } else if let Some(rest) = s.strip_prefix('+') {
            s = rest.trim_start();
        } else if let Some(rest) = s.strip_suffix('-') {
            negative = !negative;
            s = rest.trim_end();
        } else if let Some(rest) = s.strip_suffix('+') {
            s = rest.trim_end();
        }
        // A currency symbol may also sit between the sign and the digits.
        if let Some(rest) = s.strip_prefix(self.currency_symbol) {
            s = rest.trim_start();
        }

        let mut out = String::with_capacity(s.len() + 1);
        if negative {
            out.push('-');
        }
        let mut digits = 0;
        let mut seen_point = false;
        let mut chars = s.chars().peekable();
        while let Some(c) = chars.next() {
            if c.is_ascii_digit() {
                out.push(c);
                digits += 1;
            } else if c == self.decimal_separator && !seen_point {
                out.push('.');
                seen_point = true;
            } else if self.is_group_separator(c) && !seen_point && digits > 0 {
                continue;
            } else if (c == 'e' || c == 'E') && digits > 0 {
                out.push('e');
                if let Some(&sign) = chars.peek()
                    && (sign == '-' || sign == '+')
                {
                    out.push(sign);
                    chars.next();
                }
                let exponent: String = chars.by_ref().collect();
                if exponent.is_empty() || !exponent.chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                out.push_str(&exponent);
                break;
            } else {
                return None;
            }
        }
        (digits > 0).then_some(out)
    }

    fn is_group_separator(&self, c: char) -> bool {
        c == self.group_separator
            || (self.group_separator.is_whitespace() && (c == ' ' || c == '\u{202f}'))
    }

    /// Accepts true/false, yes/no, t/f, y/n and 1/0 in any case.
    pub fn parse_bool(&self, text: &str) -> Option<bool> {
        match text.trim().to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        }
    }

    /// The culture's date pattern, then ISO `yyyy-mm-dd`, then a date-time
    /// reduced to its date.
    pub fn parse_date(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        NaiveDate::parse_from_str(text, self.date_format)
            .or_else(|_| NaiveDate::parse_from_str(text, INVARIANT.date_format))
            .ok()
            .or_else(|| self.parse_date_time(text).map(|dt| dt.date()))
    }

    /// The culture's date-time pattern, ISO forms (space or `T` separated,
    /// optional fraction), or a bare date at midnight.
    pub fn parse_date_time(&self, text: &str) -> Option<NaiveDateTime> {
        let text = text.trim();
        [
            self.date_time_format,
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S%.f",
        ]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, self.date_format)
                .or_else(|_| NaiveDate::parse_from_str(text, INVARIANT.date_format))
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
    }
}

impl FromStr for Culture {
    type Err = CultureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl TryFrom<String> for Culture {
    type Error = CultureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_name(&value)
    }
}

impl<'de> Deserialize<'de> for Culture {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Self::from_name(&name).map_err(serde::de::Error::custom)
    }
}

impl From<Culture> for String {
    fn from(culture: Culture) -> Self {
        culture.name.to_string()
    }
}

/// Errors raised while looking up cultures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CultureError {
    #[error("unknown culture: {0}")]
    Unknown(String),
}

fn bool_text(b: bool) -> &'static str {
    if b { "True" } else { "False" }
}

/// Split a standard format specifier (`N2`, `F`, `X8`) into its letter and
/// optional precision. Anything else is a custom pattern.
fn standard_spec(pattern: &str) -> Option<(char, Option<usize>)> {
    let pattern = pattern.trim();
    let mut chars = pattern.chars();
    let spec = chars.next().filter(|c| c.is_ascii_alphabetic())?;
    let rest = chars.as_str();
    if rest.is_empty() {
        return Some((spec, None));
    }
    if rest.len() <= 2 && rest.chars().all(|c| c.is_ascii_digit()) {
        return rest.parse().ok().map(|p| (spec, Some(p)));
    }
    None
}

fn group_digits(digits: &str, separator: char) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

fn round_significant(n: f64, digits: usize) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    let magnitude = n.abs().log10().floor() as i32;
    let factor = 10f64.powi(digits as i32 - 1 - magnitude);
    if !factor.is_finite() || factor == 0.0 {
        return n;
    }
    let rounded = (n * factor).round() / factor;
    if rounded.is_finite() { rounded } else { n }
}

/// strftime formatting that reports bad patterns instead of panicking.
fn strftime(dt: &NaiveDateTime, pattern: &str) -> Option<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    let mut out = String::new();
    write!(out, "{}", dt.format_with_items(items.iter())).ok()?;
    Some(out)
}

struct SpanParts {
    negative: bool,
    days: i64,
    hours: i64,
    minutes: i64,
    seconds: i64,
    /// Hundred-nanosecond units, seven digits.
    ticks: i64,
}

impl SpanParts {
    fn of(span: TimeDelta) -> Self {
        let negative = span < TimeDelta::zero();
        let span = if negative { -span } else { span };
        let total_seconds = span.num_seconds();
        Self {
            negative,
            days: total_seconds / 86_400,
            hours: (total_seconds / 3_600) % 24,
            minutes: (total_seconds / 60) % 60,
            seconds: total_seconds % 60,
            ticks: i64::from(span.subsec_nanos()) / 100,
        }
    }
}

/// Format a time span.
///
/// `c` is `[-][d.]hh:mm:ss[.fffffff]`, `g` is `[-][d:]h:mm:ss[.FFFFFFF]`,
/// `G` is `[-]d:hh:mm:ss.fffffff`. Custom patterns use `d`, `h`, `m`, `s`,
/// `f`/`F` runs, `\` escapes and quoted literals.
pub fn format_time_span(span: TimeDelta, pattern: &str) -> Option<String> {
    let p = SpanParts::of(span);
    let sign = if p.negative { "-" } else { "" };
    match pattern.trim() {
        "" | "c" | "t" | "T" => {
            let mut out = String::from(sign);
            if p.days > 0 {
                write!(out, "{}.", p.days).ok()?;
            }
            write!(out, "{:02}:{:02}:{:02}", p.hours, p.minutes, p.seconds).ok()?;
            if p.ticks > 0 {
                write!(out, ".{:07}", p.ticks).ok()?;
            }
            Some(out)
        }
        "g" => {
            let mut out = String::from(sign);
            if p.days > 0 {
                write!(out, "{}:", p.days).ok()?;
            }
            write!(out, "{}:{:02}:{:02}", p.hours, p.minutes, p.seconds).ok()?;
            if p.ticks > 0 {
                let ticks = format!("{:07}", p.ticks);
                write!(out, ".{}", ticks.trim_end_matches('0')).ok()?;
            }
            Some(out)
        }
        "G" => Some(format!(
            "{sign}{}:{:02}:{:02}:{:02}.{:07}",
            p.days, p.hours, p.minutes, p.seconds, p.ticks
        )),
        custom => format_span_custom(&p, custom),
    }
}

fn format_span_custom(p: &SpanParts, pattern: &str) -> Option<String> {
    let mut out = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let run = chars[i..].iter().take_while(|&&x| x == c).count();
        match c {
            'd' => write!(out, "{:0width$}", p.days, width = run).ok()?,
            'h' if run <= 2 => write!(out, "{:0width$}", p.hours, width = run).ok()?,
            'm' if run <= 2 => write!(out, "{:0width$}", p.minutes, width = run).ok()?,
            's' if run <= 2 => write!(out, "{:0width$}", p.seconds, width = run).ok()?,
            'f' | 'F' if run <= 7 => {
                let digits = format!("{:07}", p.ticks);
                let digits = &digits[..run];
                if c == 'f' {
                    out.push_str(digits);
                } else {
                    out.push_str(digits.trim_end_matches('0'));
                }
            }
            'h' | 'm' | 's' | 'f' | 'F' => return None,
            '\\' => {
                let literal = chars.get(i + 1)?;
                out.push(*literal);
                i += 2;
                continue;
            }
            '\'' | '"' => {
                let close = chars[i + 1..].iter().position(|&x| x == c)?;
                out.extend(&chars[i + 1..i + 1 + close]);
                i += close + 2;
                continue;
            }
            other => {
                out.push(other);
                i += 1;
                continue;
            }
        }
        i += run;
    }
    Some(out)
}

/// Parse `[-][d.]hh:mm[:ss[.fffffff]]`.
pub fn parse_time_span(text: &str) -> Option<TimeDelta> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (days, clock) = match body.split_once('.') {
        Some((d, rest)) if !d.contains(':') && rest.contains(':') => (d.parse::<i64>().ok()?, rest),
        _ => (0, body),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m] => (*h, *m, "0"),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    let (seconds, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));

    let number = |s: &str| -> Option<i64> {
        (!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
            .then(|| s.parse().ok())
            .flatten()
    };
    let hours = number(hours)?;
    let minutes = number(minutes)?;
    let seconds = number(seconds)?;
    if days < 0 || hours >= 24 || minutes >= 60 || seconds >= 60 {
        return None;
    }
    let nanos = if fraction.is_empty() {
        0
    } else {
        if fraction.len() > 9 || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        format!("{fraction:0<9}").parse::<i64>().ok()?
    };

    let total = days
        .checked_mul(86_400)?
        .checked_add(hours * 3_600 + minutes * 60 + seconds)?;
    let span = TimeDelta::try_seconds(total)?.checked_add(&TimeDelta::nanoseconds(nanos))?;
    Some(if negative { -span } else { span })
}
