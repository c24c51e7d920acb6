// Display formatting for dates and money, Ukrainian locale conventions

use chrono::NaiveDate;

const GROUP_SEPARATOR: char = '\u{a0}';

pub fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// Formats an amount as `1 834,5 USD`: no-break space between thousands, decimal
/// comma, at most three fraction digits. A missing currency leaves a trailing space.
pub fn format_money(amount: f64, currency: Option<&str>) -> String {
    let currency = currency.map(str::to_uppercase).unwrap_or_default();
    format!("{} {}", format_number(amount), currency)
}

fn format_number(amount: f64) -> String {
    if !amount.is_finite() {
        return amount.to_string();
    }

    let fixed = format!("{:.3}", amount.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(GROUP_SEPARATOR);
        }
        grouped.push(digit);
    }

    let negative = amount < 0.0 && (int_part != "0" || !frac_part.is_empty());
    let sign = if negative { "-" } else { "" };

    if frac_part.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{},{}", sign, grouped, frac_part)
    }
}
