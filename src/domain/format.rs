// Display formatting for widget values
use crate::domain::widget::Unit;

const NOT_AVAILABLE: &str = "n/a";

#[derive(Debug, Clone)]
pub struct Formatter {
    currency_symbol: String,
    currency_decimals: usize,
    percent_decimals: usize,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new("$", 2, 1)
    }
}

/// Insert thousands separators into the integer part of a formatted number
fn group_digits(formatted: &str) -> String {
    let (sign, unsigned) = match formatted.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", formatted),
    };
    let (int_part, frac_part) = match unsigned.find('.') {
        Some(dot) => unsigned.split_at(dot),
        None => (unsigned, ""),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}{}{}", sign, grouped, frac_part)
}

impl Formatter {
    pub fn new(currency_symbol: &str, currency_decimals: usize, percent_decimals: usize) -> Self {
        Self {
            currency_symbol: currency_symbol.to_string(),
            currency_decimals,
            percent_decimals,
        }
    }

    pub fn currency(&self, value: f64) -> String {
        let digits = group_digits(&format!("{:.*}", self.currency_decimals, value.abs()));
        // Rounds to zero without a sign
        if value < 0.0 && digits.chars().any(|c| c.is_ascii_digit() && c != '0') {
            format!("-{}{}", self.currency_symbol, digits)
        } else {
            format!("{}{}", self.currency_symbol, digits)
        }
    }

    pub fn percent(&self, value: Option<f64>) -> String {
        match value {
            Some(v) => format!("{:.*}%", self.percent_decimals, v),
            None => NOT_AVAILABLE.to_string(),
        }
    }

    pub fn count(&self, value: i64) -> String {
        group_digits(&value.to_string())
    }

    pub fn value(&self, unit: Unit, value: Option<f64>) -> String {
        match (unit, value) {
            (_, None) => NOT_AVAILABLE.to_string(),
            (Unit::Currency, Some(v)) => self.currency(v),
            (Unit::Percent, Some(v)) => self.percent(Some(v)),
            (Unit::Count, Some(v)) => self.count(v.round() as i64),
        }
    }

    /// Short tick label for chart axes
    pub fn axis(&self, unit: Unit, value: f64) -> String {
        let magnitude = value.abs();
        let compact = if magnitude >= 1_000_000.0 {
            format!("{:.1}M", value / 1_000_000.0)
        } else if magnitude >= 10_000.0 {
            format!("{:.0}k", value / 1_000.0)
        } else if magnitude >= 1_000.0 {
            format!("{:.1}k", value / 1_000.0)
        } else {
            format!("{:.0}", value)
        };
        match unit {
            Unit::Currency => format!("{}{}", self.currency_symbol, compact),
            Unit::Percent => format!("{}%", compact),
            Unit::Count => compact,
        }
    }
}
