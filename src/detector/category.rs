//! Detection categories and severities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A sensitive-data or attack category recognised by the detector.
///
/// Variant order is the scan order; findings are always reported in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// US social security number
    SocialSecurityNumber,
    /// Payment card number (Luhn-valid)
    CreditCardNumber,
    /// PAN-style national tax identifier
    NationalTaxId,
    /// Aadhaar-style national identity number
    NationalIdNumber,
    /// Email address
    EmailAddress,
    /// Phone number
    PhoneNumber,
    /// SQL injection payload
    SqlInjectionPattern,
    /// Public IPv4 address
    IpAddress,
    /// International bank account number (mod-97 valid)
    Iban,
    /// Passport number
    PassportNumber,
    /// Calendar date next to a birth-date keyword
    DateOfBirth,
    /// Driver licence number next to a licence keyword
    DriverLicenseNumber,
    /// US routing number followed by an account number
    BankAccountNumber,
}

impl Category {
    /// All categories in scan order.
    pub const ALL: [Category; 13] = [
        Category::SocialSecurityNumber,
        Category::CreditCardNumber,
        Category::NationalTaxId,
        Category::NationalIdNumber,
        Category::EmailAddress,
        Category::PhoneNumber,
        Category::SqlInjectionPattern,
        Category::IpAddress,
        Category::Iban,
        Category::PassportNumber,
        Category::DateOfBirth,
        Category::DriverLicenseNumber,
        Category::BankAccountNumber,
    ];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SocialSecurityNumber => "social-security-number",
            Category::CreditCardNumber => "credit-card-number",
            Category::NationalTaxId => "national-tax-id",
            Category::NationalIdNumber => "national-id-number",
            Category::EmailAddress => "email-address",
            Category::PhoneNumber => "phone-number",
            Category::SqlInjectionPattern => "sql-injection-pattern",
            Category::IpAddress => "ip-address",
            Category::Iban => "iban",
            Category::PassportNumber => "passport-number",
            Category::DateOfBirth => "date-of-birth",
            Category::DriverLicenseNumber => "driver-license-number",
            Category::BankAccountNumber => "bank-account-number",
        }
    }

    /// Severity attached to findings of this category.
    pub fn severity(&self) -> Severity {
        match self {
            Category::EmailAddress | Category::PhoneNumber | Category::IpAddress => Severity::Medium,
            Category::PassportNumber | Category::DateOfBirth | Category::DriverLicenseNumber => {
                Severity::High
            }
            _ => Severity::Critical,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| crate::Error::parse(format!("Unknown category: {}", s)))
    }
}

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Low,
    /// Personal data with limited blast radius
    Medium,
    /// Significant exposure
    High,
    /// Regulated identifiers and active attacks
    Critical,
}

impl Severity {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
