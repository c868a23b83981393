/// Group digits the Indian way: last three, then pairs (12,34,567).
fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups: Vec<&str> = Vec::new();
    let mut rest = head;
    while rest.len() > 2 {
        let (h, t) = rest.split_at(rest.len() - 2);
        groups.push(t);
        rest = h;
    }
    groups.push(rest);
    groups.reverse();
    format!("{},{tail}", groups.join(","))
}

/// Format paise as whole rupees with Indian grouping: ₹12,34,568
pub fn inr(paise: i64) -> String {
    let negative = paise < 0;
    let rupees = (paise.unsigned_abs() + 50) / 100;
    let grouped = group_indian(&rupees.to_string());
    if negative {
        format!("-₹{grouped}")
    } else {
        format!("₹{grouped}")
    }
}

/// Paise as a plain two-decimal string: 45000 -> "450.00"
pub fn paise_to_decimal(paise: i64) -> String {
    let sign = if paise < 0 { "-" } else { "" };
    let abs = paise.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Parse a rupee amount typed by a person into paise. Negative values are kept
/// so callers can reject them.
pub fn rupees_to_paise(input: &str) -> Option<i64> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, '₹' | ',' | ' '))
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some((value * 100.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inr_formatting() {
        assert_eq!(inr(123_456_789), "₹12,34,568");
        assert_eq!(inr(45000), "₹450");
        assert_eq!(inr(0), "₹0");
        assert_eq!(inr(100_000_000), "₹10,00,000");
        assert_eq!(inr(-250_000), "-₹2,500");
        assert_eq!(inr(99_999_900), "₹9,99,999");
    }

    #[test]
    fn test_paise_to_decimal() {
        assert_eq!(paise_to_decimal(45000), "450.00");
        assert_eq!(paise_to_decimal(5), "0.05");
        assert_eq!(paise_to_decimal(-1050), "-10.50");
    }

    #[test]
    fn test_rupees_to_paise() {
        assert_eq!(rupees_to_paise("450"), Some(45000));
        assert_eq!(rupees_to_paise("₹1,23,456.78"), Some(12_345_678));
        assert_eq!(rupees_to_paise("-5"), Some(-500));
        assert_eq!(rupees_to_paise("abc"), None);
    }
}
