//! Mention normalization.
//!
//! Turns a raw [`VendorMention`] into the canonical keys used by every
//! later stage. Everything here is a pure function of its input: no I/O,
//! no clocks, no registry access.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::ValidationError;
use crate::vendor::{AdditiveUpdate, SurrogateKey, VendorMention};

/// Trailing legal-form designators, longest forms first.
const LEGAL_SUFFIXES: &[&[&str]] = &[
    &["gmbh", "and", "co", "kg"],
    &["gmbh", "co", "kg"],
    &["co", "kg"],
    &["pty", "ltd"],
    &["pte", "ltd"],
    &["sdn", "bhd"],
    &["co", "ltd"],
    &["s", "a"],
    &["s", "l"],
    &["inc"],
    &["incorporated"],
    &["corp"],
    &["corporation"],
    &["co"],
    &["company"],
    &["llc"],
    &["llp"],
    &["lp"],
    &["ltd"],
    &["limited"],
    &["plc"],
    &["gmbh"],
    &["ag"],
    &["kg"],
    &["ug"],
    &["se"],
    &["sa"],
    &["sas"],
    &["sarl"],
    &["srl"],
    &["spa"],
    &["sl"],
    &["bv"],
    &["nv"],
    &["ab"],
    &["oy"],
    &["as"],
    &["aps"],
    &["kk"],
];

/// Mailbox providers whose domains identify no particular vendor.
const PUBLIC_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "yahoo.co.uk",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "msn.com",
    "icloud.com",
    "me.com",
    "aol.com",
    "gmx.de",
    "gmx.net",
    "web.de",
    "t-online.de",
    "proton.me",
    "protonmail.com",
    "mail.com",
    "yandex.ru",
    "qq.com",
    "163.com",
];

/// Countries whose VAT numbers carry the country code as a prefix.
const EU_VAT_PREFIXES: &[&str] = &[
    "AT", "BE", "BG", "CY", "CZ", "DE", "DK", "EE", "EL", "ES", "FI", "FR", "HR", "HU", "IE",
    "IT", "LT", "LU", "LV", "MT", "NL", "PL", "PT", "RO", "SE", "SI", "SK",
];

const COUNTRY_NAMES: &[(&str, &str)] = &[
    ("germany", "DE"),
    ("deutschland", "DE"),
    ("united states", "US"),
    ("united states of america", "US"),
    ("usa", "US"),
    ("united kingdom", "GB"),
    ("great britain", "GB"),
    ("england", "GB"),
    ("uk", "GB"),
    ("france", "FR"),
    ("netherlands", "NL"),
    ("the netherlands", "NL"),
    ("holland", "NL"),
    ("spain", "ES"),
    ("italy", "IT"),
    ("canada", "CA"),
    ("switzerland", "CH"),
    ("austria", "AT"),
    ("ireland", "IE"),
    ("australia", "AU"),
    ("india", "IN"),
    ("japan", "JP"),
    ("china", "CN"),
    ("mexico", "MX"),
    ("brazil", "BR"),
    ("sweden", "SE"),
    ("poland", "PL"),
    ("belgium", "BE"),
    ("greece", "GR"),
];

const MIN_TAX_ID_LEN: usize = 4;
const MIN_PHONE_DIGITS: usize = 5;

fn tax_label_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:vat(?:\s*(?:no|number|id|reg))?|ust-?id(?:nr)?|tin|ein|abn|gst)\.?(?:\s*[:#]\s*|\s+)",
        )
        .ok()
    })
    .as_ref()
}

/// A mention reduced to canonical matching keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMention {
    /// Trimmed, whitespace-collapsed name as written.
    pub display_name: String,
    /// Case-folded, diacritic-free name without legal suffixes.
    pub normalized_name: String,
    /// Tokens of the normalized name.
    pub name_tokens: Vec<String>,
    /// Normalized tax id.
    pub tax_id: Option<String>,
    /// Every syntactically valid email, lower-cased, in input order.
    pub emails: Vec<String>,
    /// Host of the first valid email, unless it is a public mailbox provider.
    pub domain: Option<String>,
    /// Whitespace-collapsed address.
    pub address: Option<String>,
    /// Phone number, digits and leading `+` only.
    pub phone: Option<String>,
    /// ISO-3166 alpha-2 code when recognised, upper-cased text otherwise.
    pub country: Option<String>,
}

impl NormalizedMention {
    /// Deterministic key over `normalized_name` and `tax_id`.
    #[must_use]
    pub fn surrogate_key(&self) -> SurrogateKey {
        SurrogateKey::compute(&self.normalized_name, self.tax_id.as_deref())
    }

    /// Every value this mention could contribute to a vendor record.
    #[must_use]
    pub fn additive_updates(&self) -> Vec<AdditiveUpdate> {
        let mut updates = vec![AdditiveUpdate::Alias(self.display_name.clone())];
        updates.extend(self.emails.iter().cloned().map(AdditiveUpdate::Email));
        if let Some(domain) = &self.domain {
            updates.push(AdditiveUpdate::Domain(domain.clone()));
        }
        if let Some(country) = &self.country {
            updates.push(AdditiveUpdate::Country(country.clone()));
        }
        if let Some(address) = &self.address {
            updates.push(AdditiveUpdate::Address(address.clone()));
        }
        if let Some(phone) = &self.phone {
            updates.push(AdditiveUpdate::Phone(phone.clone()));
        }
        if let Some(tax_id) = &self.tax_id {
            updates.push(AdditiveUpdate::TaxId(tax_id.clone()));
        }
        updates
    }
}

/// Normalizes a raw mention.
///
/// # Errors
/// - `EmptyName` if the name is blank or has no alphanumeric characters.
/// - `MalformedTaxId` if a non-blank tax id normalizes to fewer than 4 characters.
pub fn normalize_mention(mention: &VendorMention) -> Result<NormalizedMention, ValidationError> {
    let display_name = collapse_whitespace(&mention.name);
    if display_name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let normalized_name = normalize_name(&display_name).ok_or(ValidationError::EmptyName)?;
    let name_tokens = normalized_name.split(' ').map(str::to_string).collect();

    let country = mention.country.as_deref().and_then(normalize_country);
    let tax_id = match mention.tax_id.as_deref() {
        Some(raw) if !raw.trim().is_empty() => Some(normalize_tax_id(raw, country.as_deref())?),
        _ => None,
    };

    let emails = mention.email.as_deref().map(parse_emails).unwrap_or_default();
    let domain = emails
        .first()
        .and_then(|e| email_domain(e))
        .filter(|d| !is_public_email_domain(d))
        .map(str::to_string);

    Ok(NormalizedMention {
        display_name,
        normalized_name,
        name_tokens,
        tax_id,
        emails,
        domain,
        address: mention.address.as_deref().map(collapse_whitespace).filter(|a| !a.is_empty()),
        phone: mention.phone.as_deref().and_then(normalize_phone),
        country,
    })
}

/// Canonical matching form of a vendor name, or `None` if nothing remains.
///
/// # Examples
///
/// ```
/// use vendor_identity::normalize::normalize_name;
///
/// assert_eq!(normalize_name("Müller & Söhne GmbH").as_deref(), Some("muller and sohne"));
/// assert_eq!(normalize_name("ACME, Inc.").as_deref(), Some("acme"));
/// assert_eq!(normalize_name("   "), None);
/// ```
#[must_use]
pub fn normalize_name(raw: &str) -> Option<String> {
    let mut folded = String::with_capacity(raw.len());
    for c in raw.nfkd().filter(|c| !is_combining_mark(*c)) {
        for lower in c.to_lowercase() {
            match lower {
                'ß' => folded.push_str("ss"),
                'æ' => folded.push_str("ae"),
                'œ' => folded.push_str("oe"),
                'ø' => folded.push('o'),
                'ł' => folded.push('l'),
                'đ' => folded.push('d'),
                '&' | '+' => folded.push_str(" and "),
                '.' | '\'' | '\u{2019}' => {}
                c if c.is_alphanumeric() => folded.push(c),
                _ => folded.push(' '),
            }
        }
    }

    let mut tokens: Vec<&str> = folded.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    strip_legal_suffixes(&mut tokens);
    Some(tokens.join(" "))
}

fn strip_legal_suffixes(tokens: &mut Vec<&str>) {
    loop {
        let Some(suffix) = LEGAL_SUFFIXES
            .iter()
            .find(|s| tokens.len() > s.len() && tokens.ends_with(s))
        else {
            return;
        };
        tokens.truncate(tokens.len() - suffix.len());
    }
}

/// Normalizes a tax identifier.
///
/// Labels such as `VAT No:` are removed, then only ASCII alphanumerics are
/// kept, upper-cased. A bare EU VAT number gets the country prefix of the
/// mention's country; Greek `GR` prefixes become `EL`.
///
/// # Errors
/// `MalformedTaxId` if fewer than 4 characters remain.
pub fn normalize_tax_id(raw: &str, country: Option<&str>) -> Result<String, ValidationError> {
    let unlabeled = match tax_label_regex() {
        Some(re) => re.replace(raw, "").into_owned(),
        None => raw.to_string(),
    };
    let mut id: String = unlabeled
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if id.len() < MIN_TAX_ID_LEN {
        return Err(ValidationError::MalformedTaxId {
            value: raw.to_string(),
            reason: format!("fewer than {MIN_TAX_ID_LEN} alphanumeric characters"),
        });
    }

    if id.starts_with("GR") && id[2..].bytes().all(|b| b.is_ascii_digit()) {
        id.replace_range(..2, "EL");
    }

    if id.bytes().all(|b| b.is_ascii_digit()) {
        let prefix = match country {
            Some("GR") => Some("EL"),
            Some(c) if EU_VAT_PREFIXES.contains(&c) => Some(c),
            _ => None,
        };
        if let Some(prefix) = prefix {
            id.insert_str(0, prefix);
        }
    }

    Ok(id)
}

/// Extracts all syntactically valid emails, lower-cased, in input order.
#[must_use]
pub fn parse_emails(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
        let candidate = part
            .trim_matches(|c: char| matches!(c, '<' | '>' | '"' | '\'' | '(' | ')'))
            .to_ascii_lowercase();
        let candidate = candidate.strip_prefix("mailto:").unwrap_or(&candidate).to_string();
        if is_valid_email(&candidate) && !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    if !local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "._%+-'".contains(c))
    {
        return false;
    }
    is_valid_domain(domain)
}

fn is_valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|l| {
        !l.is_empty()
            && !l.starts_with('-')
            && !l.ends_with('-')
            && l.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let tld_ok = labels
        .last()
        .is_some_and(|t| t.len() >= 2 && t.chars().all(|c| c.is_ascii_alphabetic()));
    labels_ok && tld_ok
}

/// Host part of a valid, lower-cased email.
#[must_use]
pub fn email_domain(email: &str) -> Option<&str> {
    email.split_once('@').map(|(_, d)| d)
}

/// True for free mailbox providers that never identify a vendor.
#[must_use]
pub fn is_public_email_domain(domain: &str) -> bool {
    PUBLIC_EMAIL_DOMAINS.contains(&domain)
}

/// ISO alpha-2 code for a country name or code.
#[must_use]
pub fn normalize_country(raw: &str) -> Option<String> {
    let cleaned = collapse_whitespace(raw).to_lowercase();
    if cleaned.is_empty() {
        return None;
    }
    if let Some((_, code)) = COUNTRY_NAMES.iter().find(|(name, _)| *name == cleaned) {
        return Some((*code).to_string());
    }
    Some(cleaned.to_uppercase())
}

fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        return None;
    }
    if raw.trim_start().starts_with('+') {
        Some(format!("+{digits}"))
    } else {
        Some(digits)
    }
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
