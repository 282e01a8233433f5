/// Currency utility functions for handling dollar conversions
///
/// All monetary values in the database are stored in cents (1 dollar = 100 cents)
/// to avoid floating-point precision issues.

/// Convert dollars to cents (multiply by 100)
pub fn dollars_to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}

/// Convert cents to dollars (divide by 100)
pub fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Format cents as a dollar string. Whole amounts drop the decimals so
/// messages read "$150" rather than "$150.00".
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    if abs % 100 == 0 {
        format!("{}${}", sign, abs / 100)
    } else {
        format!("{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// Validate and parse amount string to cents
pub fn parse_amount_to_cents(amount_str: &str) -> Result<i64, String> {
    amount_str
        .trim()
        .parse::<f64>()
        .map_err(|_| "Invalid amount format".to_string())
        .and_then(|amount| {
            if !amount.is_finite() {
                Err("Invalid amount format".to_string())
            } else if amount < 0.0 {
                Err("Amount cannot be negative".to_string())
            } else {
                Ok(dollars_to_cents(amount))
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dollars_to_cents() {
        assert_eq!(dollars_to_cents(150.0), 15000);
        assert_eq!(dollars_to_cents(0.50), 50);
        assert_eq!(dollars_to_cents(149.99), 14999);
    }

    #[test]
    fn test_cents_to_dollars() {
        assert_eq!(cents_to_dollars(7500), 75.0);
        assert_eq!(cents_to_dollars(14999), 149.99);
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(10000), "$100");
        assert_eq!(format_cents(15000), "$150");
        assert_eq!(format_cents(14999), "$149.99");
        assert_eq!(format_cents(5), "$0.05");
        assert_eq!(format_cents(-250), "-$2.50");
    }

    #[test]
    fn test_parse_amount_to_cents() {
        assert_eq!(parse_amount_to_cents("75"), Ok(7500));
        assert_eq!(parse_amount_to_cents(" 149.99 "), Ok(14999));
        assert_eq!(parse_amount_to_cents("-1"), Err("Amount cannot be negative".to_string()));
        assert_eq!(parse_amount_to_cents("abc"), Err("Invalid amount format".to_string()));
    }
}
