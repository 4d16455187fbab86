//! Post-match validators that reject regex hits which cannot be real identifiers.

use super::Span;

use chrono::NaiveDate;

/// A validator sees the full text and the candidate span.
pub(crate) type Validator = fn(&str, Span) -> bool;

/// Bytes of surrounding text searched for keywords on either side of a match.
const CONTEXT_WINDOW: usize = 50;

const SSN_KEYWORDS: &[&str] = &[
    "ssn",
    "social security",
    "social sec",
    "ss#",
    "ss #",
    "taxpayer",
    "tax id",
];

const BIRTH_KEYWORDS: &[&str] = &[
    "dob",
    "d.o.b",
    "date of birth",
    "birth date",
    "birthdate",
    "birthday",
    "born",
];

const LICENSE_KEYWORDS: &[&str] = &["driver", "license", "licence", "driving", "dmv"];

/// Lowercased text around `span`, clamped to char boundaries.
fn context(text: &str, span: Span) -> String {
    let mut start = span.start.saturating_sub(CONTEXT_WINDOW);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (span.end + CONTEXT_WINDOW).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    text[start..end].to_lowercase()
}

fn mentions(text: &str, span: Span, keywords: &[&str]) -> bool {
    let context = context(text, span);
    keywords.iter().any(|k| context.contains(k))
}

fn digits(s: &str) -> Vec<u32> {
    s.chars().filter_map(|c| c.to_digit(10)).collect()
}

/// Luhn checksum over the digits of `number`.
pub(crate) fn luhn(number: &str) -> bool {
    let digits = digits(number);
    if digits.is_empty() {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// True when the span continues a longer run of separated digit groups,
/// e.g. the first twelve digits of a spaced card number.
fn embedded_in_digit_group(text: &str, span: Span) -> bool {
    let bytes = text.as_bytes();
    let continues_after = span.end + 1 < bytes.len()
        && matches!(bytes[span.end], b' ' | b'-' | b'.')
        && bytes[span.end + 1].is_ascii_digit();
    let continues_before = span.start >= 2
        && matches!(bytes[span.start - 1], b' ' | b'-' | b'.')
        && bytes[span.start - 2].is_ascii_digit();
    continues_after || continues_before
}

/// Area, group and serial rules; a bare nine-digit run also needs an SSN keyword nearby.
pub(crate) fn ssn(text: &str, span: Span) -> bool {
    let matched = span.slice(text);
    let d = digits(matched);
    if d.len() != 9 {
        return false;
    }
    let area = d[0] * 100 + d[1] * 10 + d[2];
    let group = d[3] * 10 + d[4];
    let serial = d[5] * 1000 + d[6] * 100 + d[7] * 10 + d[8];
    if area == 0 || area == 666 || area >= 900 || group == 0 || serial == 0 {
        return false;
    }
    let separated = matched.len() != d.len();
    separated || mentions(text, span, SSN_KEYWORDS)
}

pub(crate) fn credit_card(text: &str, span: Span) -> bool {
    let matched = span.slice(text);
    let count = digits(matched).len();
    (13..=19).contains(&count) && luhn(matched)
}

/// The fourth character of a PAN encodes the holder type.
pub(crate) fn pan(text: &str, span: Span) -> bool {
    span.slice(text)
        .chars()
        .nth(3)
        .map_or(false, |c| "PCHFATBLJG".contains(c))
}

pub(crate) fn national_id(text: &str, span: Span) -> bool {
    digits(span.slice(text)).len() == 12 && !embedded_in_digit_group(text, span)
}

pub(crate) fn email(text: &str, span: Span) -> bool {
    let matched = span.slice(text);
    match matched.split_once('@') {
        Some((local, domain)) => {
            !local.starts_with('.')
                && !local.ends_with('.')
                && !matched.contains("..")
                && !domain.starts_with('-')
        }
        None => false,
    }
}

pub(crate) fn phone(text: &str, span: Span) -> bool {
    let d = digits(span.slice(text));
    if !(10..=15).contains(&d.len()) {
        return false;
    }
    let first = d[0];
    !d.iter().all(|&x| x == first) && !embedded_in_digit_group(text, span)
}

pub(crate) fn ip_address(text: &str, span: Span) -> bool {
    let matched = span.slice(text);
    if matched == "0.0.0.0" || matched == "255.255.255.255" {
        return false;
    }
    let bytes = text.as_bytes();
    let dotted_before = span.start >= 2
        && bytes[span.start - 1] == b'.'
        && bytes[span.start - 2].is_ascii_digit();
    let dotted_after = span.end + 1 < bytes.len()
        && bytes[span.end] == b'.'
        && bytes[span.end + 1].is_ascii_digit();
    !dotted_before && !dotted_after && !mentions(text, span, &["version"])
}

/// ISO 13616 mod-97 check.
pub(crate) fn iban(text: &str, span: Span) -> bool {
    let compact: Vec<char> = span
        .slice(text)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if !(15..=34).contains(&compact.len()) {
        return false;
    }

    let mut remainder: u32 = 0;
    for c in compact[4..].iter().chain(&compact[..4]) {
        let value = match c.to_digit(36) {
            Some(v) => v,
            None => return false,
        };
        remainder = if value >= 10 {
            (remainder * 100 + value) % 97
        } else {
            (remainder * 10 + value) % 97
        };
    }
    remainder == 1
}

pub(crate) fn date_of_birth(text: &str, span: Span) -> bool {
    let parts: Vec<&str> = span.slice(text).split(|c| c == '/' || c == '-').collect();
    let [first, second, third] = parts.as_slice() else {
        return false;
    };
    let (year, month, day) = if first.len() == 4 {
        (first, second, third)
    } else {
        (third, first, second)
    };
    let date = match (
        year.parse::<i32>(),
        month.parse::<u32>(),
        day.parse::<u32>(),
    ) {
        (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d),
        _ => None,
    };
    date.is_some() && mentions(text, span, BIRTH_KEYWORDS)
}

pub(crate) fn driver_license(text: &str, span: Span) -> bool {
    mentions(text, span, LICENSE_KEYWORDS)
}

/// ABA checksum over the nine routing digits: weights 3, 7, 1.
pub(crate) fn aba_routing(routing: &[u32]) -> bool {
    routing.len() == 9
        && routing.iter().any(|&d| d != 0)
        && routing
            .iter()
            .zip([3, 7, 1].iter().cycle())
            .map(|(d, w)| d * w)
            .sum::<u32>()
            % 10
            == 0
}

pub(crate) fn bank_account(text: &str, span: Span) -> bool {
    let d = digits(span.slice(text));
    (17..=26).contains(&d.len()) && aba_routing(&d[..9])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whole(s: &str) -> Span {
        Span::new(0, s.len())
    }

    #[test]
    fn test_luhn() {
        assert!(luhn("4111 1111 1111 1111"));
        assert!(luhn("4532015112830366"));
        assert!(luhn("378282246310005"));
        assert!(!luhn("4111 1111 1111 1112"));
        assert!(!luhn(""));
    }

    #[test]
    fn test_ssn_rules() {
        assert!(ssn("123-45-6789", whole("123-45-6789")));
        assert!(!ssn("000-45-6789", whole("000-45-6789")));
        assert!(!ssn("666-45-6789", whole("666-45-6789")));
        assert!(!ssn("912-45-6789", whole("912-45-6789")));
        assert!(!ssn("123-00-6789", whole("123-00-6789")));
        assert!(!ssn("123-45-0000", whole("123-45-0000")));
    }

    #[test]
    fn test_bare_ssn_needs_keyword() {
        let text = "SSN 123456789";
        assert!(ssn(text, Span::new(4, 13)));
        let text = "ticket 123456789";
        assert!(!ssn(text, Span::new(7, 16)));
    }

    #[test]
    fn test_context_respects_char_boundaries() {
        let text = format!("{}ssn 123456789{}", "aé".repeat(20), "aü".repeat(20));
        let start = text.find("123").unwrap();
        assert!(ssn(&text, Span::new(start, start + 9)));
    }

    #[test]
    fn test_iban_checksum() {
        assert!(iban("DE89370400440532013000", whole("DE89370400440532013000")));
        assert!(iban("GB82WEST12345698765432", whole("GB82WEST12345698765432")));
        assert!(iban("DE89 3704 0044 0532 0130 00", whole("DE89 3704 0044 0532 0130 00")));
        assert!(!iban("DE88370400440532013000", whole("DE88370400440532013000")));
    }

    #[test]
    fn test_ip_address_rules() {
        assert!(ip_address("host 203.0.113.42", Span::new(5, 17)));
        assert!(!ip_address("0.0.0.0", whole("0.0.0.0")));
        assert!(!ip_address("1.2.3.4.5", Span::new(0, 7)));
        assert!(!ip_address("version 1.2.3.4", Span::new(8, 15)));
    }

    #[test]
    fn test_date_of_birth_needs_real_date_and_keyword() {
        assert!(date_of_birth("DOB 04/23/1985", Span::new(4, 14)));
        assert!(date_of_birth("born 1985-04-23", Span::new(5, 15)));
        assert!(!date_of_birth("DOB 02/31/1985", Span::new(4, 14)));
        assert!(!date_of_birth("shipped 04/23/1985", Span::new(8, 18)));
    }

    #[test]
    fn test_aba_routing() {
        let routing = |s: &str| digits(s);
        assert!(aba_routing(&routing("021000021")));
        assert!(aba_routing(&routing("011000015")));
        assert!(!aba_routing(&routing("123456789")));
        assert!(!aba_routing(&routing("000000000")));
    }

    #[test]
    fn test_bank_account() {
        assert!(bank_account("021000021 123456789", whole("021000021 123456789")));
        assert!(!bank_account("123456789 123456789", whole("123456789 123456789")));
    }

    #[test]
    fn test_pan_holder_type() {
        assert!(pan("ABCPE1234F", whole("ABCPE1234F")));
        assert!(!pan("ABCXE1234F", whole("ABCXE1234F")));
    }

    #[test]
    fn test_national_id_rejects_card_prefix() {
        let text = "4111 1111 1111 1111";
        assert!(!national_id(text, Span::new(0, 14)));
        assert!(national_id("2345 6789 0123", whole("2345 6789 0123")));
    }

    #[test]
    fn test_email_shape() {
        assert!(email("jane.doe@example.com", whole("jane.doe@example.com")));
        assert!(!email("jane..doe@example.com", whole("jane..doe@example.com")));
    }

    #[test]
    fn test_phone_digits() {
        assert!(phone("555-123-4567", whole("555-123-4567")));
        assert!(!phone("111-111-1111", whole("111-111-1111")));
        assert!(!phone("555-1234", whole("555-1234")));
    }
}
