//! Pattern table for every category.

use super::validators::{self, Validator};
use super::Category;

/// Patterns and the optional validator for one category.
pub(crate) struct PatternSet {
    pub category: Category,
    pub patterns: &'static [&'static str],
    pub validator: Option<Validator>,
}

const SSN: &[&str] = &[r"\b\d{3}[- ]\d{2}[- ]\d{4}\b", r"\b\d{9}\b"];

const CREDIT_CARD: &[&str] = &[r"\b\d(?:[ -]?\d){12,18}\b"];

const NATIONAL_TAX_ID: &[&str] = &[r"\b[A-Z]{5}\d{4}[A-Z]\b"];

const NATIONAL_ID: &[&str] = &[r"\b[2-9]\d{3}[ -]?\d{4}[ -]?\d{4}\b"];

const EMAIL: &[&str] = &[r"\b[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}\b"];

const PHONE: &[&str] = &[
    r"(?:\+\d{1,3}[ .-]?)?(?:\(\d{3}\)\s?|\b\d{3}[ .-])\d{3}[ .-]\d{4}\b",
    r"\+\d{1,3}[ .-]?\d{6,14}\b",
];

const SQL_INJECTION: &[&str] = &[
    r"(?i)\bunion\s+(?:all\s+)?select\b",
    r"(?i)'\s*or\s+'?\d+'?\s*=\s*'?\d+",
    r"(?i)\bor\s+1\s*=\s*1\b",
    r"(?i);\s*(?:drop|truncate|alter)\s+(?:table|database)\b",
    r"(?i);\s*delete\s+from\b",
    r"(?i);\s*(?:insert\s+into|update\s+\w+\s+set)\b",
    r"(?i)\b(?:pg_)?sleep\s*\(\s*\d+\s*\)",
    r"(?i)\bwaitfor\s+delay\b",
    r"(?i)\bbenchmark\s*\(\s*\d+\s*,",
    r"(?i)\binto\s+(?:out|dump)file\b",
    r"(?i)\binformation_schema\b",
    r"(?i)\bexec(?:ute)?\s+xp_\w+",
    r"'\s*--",
];

const IP_ADDRESS: &[&str] =
    &[r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b"];

const IBAN: &[&str] = &[
    r"\b[A-Z]{2}\d{2}[A-Z0-9]{4}\d{7}[A-Z0-9]{0,16}\b",
    r"\b[A-Z]{2}\d{2}(?: [A-Z0-9]{4}){2,7}(?: [A-Z0-9]{1,4})?\b",
];

const PASSPORT: &[&str] = &[r"\b[A-Z]{1,2}\d{6,9}\b"];

const DATE_OF_BIRTH: &[&str] = &[
    r"\b(?:0?[1-9]|1[0-2])[/-](?:0?[1-9]|[12]\d|3[01])[/-](?:19|20)\d{2}\b",
    r"\b(?:19|20)\d{2}[/-](?:0?[1-9]|1[0-2])[/-](?:0?[1-9]|[12]\d|3[01])\b",
];

const DRIVER_LICENSE: &[&str] = &[r"\b[A-Z]\d{7,14}\b", r"\b\d{7,9}\b"];

const BANK_ACCOUNT: &[&str] = &[r"\b\d{9}[- ]?\d{8,17}\b"];

/// The full table in scan order.
pub(crate) fn pattern_sets() -> Vec<PatternSet> {
    vec![
        PatternSet {
            category: Category::SocialSecurityNumber,
            patterns: SSN,
            validator: Some(validators::ssn),
        },
        PatternSet {
            category: Category::CreditCardNumber,
            patterns: CREDIT_CARD,
            validator: Some(validators::credit_card),
        },
        PatternSet {
            category: Category::NationalTaxId,
            patterns: NATIONAL_TAX_ID,
            validator: Some(validators::pan),
        },
        PatternSet {
            category: Category::NationalIdNumber,
            patterns: NATIONAL_ID,
            validator: Some(validators::national_id),
        },
        PatternSet {
            category: Category::EmailAddress,
            patterns: EMAIL,
            validator: Some(validators::email),
        },
        PatternSet {
            category: Category::PhoneNumber,
            patterns: PHONE,
            validator: Some(validators::phone),
        },
        PatternSet {
            category: Category::SqlInjectionPattern,
            patterns: SQL_INJECTION,
            validator: None,
        },
        PatternSet {
            category: Category::IpAddress,
            patterns: IP_ADDRESS,
            validator: Some(validators::ip_address),
        },
        PatternSet {
            category: Category::Iban,
            patterns: IBAN,
            validator: Some(validators::iban),
        },
        PatternSet {
            category: Category::PassportNumber,
            patterns: PASSPORT,
            validator: None,
        },
        PatternSet {
            category: Category::DateOfBirth,
            patterns: DATE_OF_BIRTH,
            validator: Some(validators::date_of_birth),
        },
        PatternSet {
            category: Category::DriverLicenseNumber,
            patterns: DRIVER_LICENSE,
            validator: Some(validators::driver_license),
        },
        PatternSet {
            category: Category::BankAccountNumber,
            patterns: BANK_ACCOUNT,
            validator: Some(validators::bank_account),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_follows_category_order() {
        let categories: Vec<_> = pattern_sets().iter().map(|s| s.category).collect();
        assert_eq!(categories, Category::ALL.to_vec());
    }

    #[test]
    fn test_all_patterns_compile() {
        for set in pattern_sets() {
            for pattern in set.patterns {
                assert!(regex::Regex::new(pattern).is_ok(), "{}", pattern);
            }
        }
    }
}
