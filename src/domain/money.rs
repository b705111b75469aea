use std::fmt;

/// Credits and prices are plain integers in a single unit, so no rounding ever happens.
pub type Credits = i64;

/// Format credits with thousands separators.
/// Example: 1500 -> "1,500", -250 -> "-250"
pub fn format_credits(credits: Credits) -> String {
    let digits = credits.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if credits < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Format a signed ledger amount with an explicit sign.
/// Example: 250 -> "+250", -20 -> "-20", 0 -> "0"
pub fn format_signed(credits: Credits) -> String {
    if credits > 0 {
        format!("+{}", format_credits(credits))
    } else {
        format_credits(credits)
    }
}

/// Parse an integer credit amount. Accepts a leading sign and `,` or `_` separators.
/// Example: "1,500" -> 1500, "-20" -> -20, "+50" -> 50
pub fn parse_credits(input: &str) -> Result<Credits, ParseCreditsError> {
    let input = input.trim();
    let (negative, body) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    let cleaned: String = body.chars().filter(|c| *c != ',' && *c != '_').collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseCreditsError::InvalidFormat);
    }

    let value: Credits = cleaned.parse().map_err(|_| ParseCreditsError::Overflow)?;
    Ok(if negative { -value } else { value })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCreditsError {
    InvalidFormat,
    Overflow,
}

impl fmt::Display for ParseCreditsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCreditsError::InvalidFormat => write!(f, "invalid credit amount"),
            ParseCreditsError::Overflow => write!(f, "credit amount out of range"),
        }
    }
}

impl std::error::Error for ParseCreditsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_credits() {
        assert_eq!(format_credits(0), "0");
        assert_eq!(format_credits(250), "250");
        assert_eq!(format_credits(1500), "1,500");
        assert_eq!(format_credits(1_234_567), "1,234,567");
        assert_eq!(format_credits(-1500), "-1,500");
    }

    #[test]
    fn test_format_signed() {
        assert_eq!(format_signed(250), "+250");
        assert_eq!(format_signed(-20), "-20");
        assert_eq!(format_signed(0), "0");
    }

    #[test]
    fn test_parse_credits() {
        assert_eq!(parse_credits("250"), Ok(250));
        assert_eq!(parse_credits("1,500"), Ok(1500));
        assert_eq!(parse_credits("1_500"), Ok(1500));
        assert_eq!(parse_credits("-20"), Ok(-20));
        assert_eq!(parse_credits("+50"), Ok(50));
        assert_eq!(parse_credits("  7 "), Ok(7));
    }

    #[test]
    fn test_parse_credits_invalid() {
        assert_eq!(parse_credits("abc"), Err(ParseCreditsError::InvalidFormat));
        assert_eq!(parse_credits("12.5"), Err(ParseCreditsError::InvalidFormat));
        assert_eq!(parse_credits("-"), Err(ParseCreditsError::InvalidFormat));
        assert_eq!(
            parse_credits("99999999999999999999"),
            Err(ParseCreditsError::Overflow)
        );
    }
}
