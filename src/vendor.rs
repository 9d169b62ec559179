//! Vendor types and identity management.
//!
//! A [`VendorRecord`] is the durable, registry-owned identity of a vendor.
//! A [`VendorMention`] is one ephemeral observation of a vendor (an invoice
//! header, an email signature, a CSV row) that is resolved against the
//! registry and then either merged into a record or materializes one.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attribute::{AttributeMap, AttributeValue};
use crate::normalize::NormalizedMention;

/// Namespace for deterministic vendor ids derived from surrogate keys.
const SURROGATE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b3a_9d4e_4c7f_8a21_5e0b_d3c4_a917);

/// Globally unique, stable vendor identifier.
///
/// Once created, a `VendorId` never changes.
///
/// # Examples
///
/// ```
/// use vendor_identity::VendorId;
///
/// let id = VendorId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VendorId(Uuid);

impl VendorId {
    /// Creates a new random vendor ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a vendor ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for VendorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for VendorId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Deterministic key computed from `normalized_name` and `tax_id`.
///
/// The same vendor data always yields the same key (and the same derived
/// [`VendorId`]), which makes re-running an interrupted bulk import safe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurrogateKey(String);

impl SurrogateKey {
    /// Computes the key for a normalized name and optional normalized tax id.
    #[must_use]
    pub fn compute(normalized_name: &str, tax_id: Option<&str>) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(normalized_name.as_bytes());
        hasher.update(&[0x1f]);
        hasher.update(tax_id.unwrap_or_default().as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Returns the deterministic vendor id for this key.
    #[must_use]
    pub fn vendor_id(&self) -> VendorId {
        VendorId(Uuid::new_v5(&SURROGATE_NAMESPACE, self.0.as_bytes()))
    }

    /// Returns the hex form of the key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurrogateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One observed reference to a vendor.
///
/// `email` may hold several addresses separated by commas, semicolons or
/// whitespace; the first syntactically valid one supplies the key domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorMention {
    /// Name as observed.
    pub name: String,
    /// Tax identifier in any common format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    /// Postal address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// One or more email addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Country name or ISO code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl VendorMention {
    /// Creates a mention carrying only a name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the tax id.
    #[must_use]
    pub fn with_tax_id(mut self, tax_id: impl Into<String>) -> Self {
        self.tax_id = Some(tax_id.into());
        self
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Sets the phone number.
    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Sets the country.
    #[must_use]
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }
}

/// Set-valued fields of a [`VendorRecord`] that accept additive updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorField {
    /// `aliases`
    Alias,
    /// `emails`
    Email,
    /// `domains`
    Domain,
    /// `countries`
    Country,
    /// `addresses`
    Address,
    /// `phones`
    Phone,
    /// `tax_ids`
    TaxId,
    /// `custom_attributes`
    CustomAttribute,
}

impl fmt::Display for VendorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Alias => "aliases",
            Self::Email => "emails",
            Self::Domain => "domains",
            Self::Country => "countries",
            Self::Address => "addresses",
            Self::Phone => "phones",
            Self::TaxId => "tax_ids",
            Self::CustomAttribute => "custom_attributes",
        };
        f.write_str(name)
    }
}

/// A single value appended to a record. Never removes or overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum AdditiveUpdate {
    /// New alias.
    Alias(String),
    /// New email.
    Email(String),
    /// New email domain.
    Domain(String),
    /// New ISO country code.
    Country(String),
    /// New address.
    Address(String),
    /// New phone number.
    Phone(String),
    /// New normalized tax id.
    TaxId(String),
    /// New custom attribute key.
    CustomAttribute {
        /// Attribute name.
        key: String,
        /// Attribute value.
        value: AttributeValue,
    },
}

impl AdditiveUpdate {
    /// Returns the field this update targets.
    #[must_use]
    pub const fn field(&self) -> VendorField {
        match self {
            Self::Alias(_) => VendorField::Alias,
            Self::Email(_) => VendorField::Email,
            Self::Domain(_) => VendorField::Domain,
            Self::Country(_) => VendorField::Country,
            Self::Address(_) => VendorField::Address,
            Self::Phone(_) => VendorField::Phone,
            Self::TaxId(_) => VendorField::TaxId,
            Self::CustomAttribute { .. } => VendorField::CustomAttribute,
        }
    }
}

/// The canonical, registry-owned vendor entity.
///
/// # Examples
///
/// ```
/// use vendor_identity::{normalize_mention, VendorId, VendorMention, VendorRecord};
///
/// let mention = VendorMention::named("ACME GmbH").with_tax_id("DE123456789");
/// let normalized = normalize_mention(&mention).unwrap();
/// let record = VendorRecord::from_mention(VendorId::new(), &normalized, "invoice");
///
/// assert_eq!(record.normalized_name, "acme");
/// assert!(record.tax_ids.contains("DE123456789"));
/// assert_eq!(record.version, 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorRecord {
    /// Stable identifier.
    pub vendor_id: VendorId,

    /// Display name as first observed.
    pub canonical_name: String,

    /// Derived matching key. Not unique.
    pub normalized_name: String,

    /// Alternative names, excluding the canonical name.
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    /// Lower-cased emails.
    #[serde(default)]
    pub emails: BTreeSet<String>,
    /// Non-public email domains.
    #[serde(default)]
    pub domains: BTreeSet<String>,
    /// ISO country codes.
    #[serde(default)]
    pub countries: BTreeSet<String>,
    /// Observed addresses.
    #[serde(default)]
    pub addresses: BTreeSet<String>,
    /// Observed phone numbers.
    #[serde(default)]
    pub phones: BTreeSet<String>,

    /// Each tax id maps to at most one vendor across the registry.
    #[serde(default)]
    pub tax_ids: BTreeSet<String>,

    /// Attributes owned by `source_system`.
    #[serde(default)]
    pub custom_attributes: AttributeMap,

    /// Weak, lookup-only reference to a parent vendor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_vendor_id: Option<VendorId>,

    /// Hash of normalized name and tax id.
    pub surrogate_key: SurrogateKey,
    /// System that created the record.
    pub source_system: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last accepted write.
    pub last_updated: DateTime<Utc>,

    /// Optimistic-concurrency stamp, incremented on every accepted write.
    pub version: u64,
}

impl VendorRecord {
    /// Materializes a new record from a normalized mention.
    #[must_use]
    pub fn from_mention(
        vendor_id: VendorId,
        mention: &NormalizedMention,
        source_system: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let mut record = Self {
            vendor_id,
            canonical_name: mention.display_name.clone(),
            normalized_name: mention.normalized_name.clone(),
            aliases: BTreeSet::new(),
            emails: BTreeSet::new(),
            domains: BTreeSet::new(),
            countries: BTreeSet::new(),
            addresses: BTreeSet::new(),
            phones: BTreeSet::new(),
            tax_ids: BTreeSet::new(),
            custom_attributes: AttributeMap::new(),
            parent_vendor_id: None,
            surrogate_key: mention.surrogate_key(),
            source_system: source_system.into(),
            created_at: now,
            last_updated: now,
            version: 1,
        };
        for update in mention.additive_updates() {
            record.apply(&update);
        }
        record
    }

    /// Returns true if `update` would add nothing to this record.
    #[must_use]
    pub fn contains(&self, update: &AdditiveUpdate) -> bool {
        match update {
            AdditiveUpdate::Alias(v) => self.has_name(v),
            AdditiveUpdate::Email(v) => self.emails.contains(v),
            AdditiveUpdate::Domain(v) => self.domains.contains(v),
            AdditiveUpdate::Country(v) => self.countries.contains(v),
            AdditiveUpdate::Address(v) => self.addresses.contains(v),
            AdditiveUpdate::Phone(v) => self.phones.contains(v),
            AdditiveUpdate::TaxId(v) => self.tax_ids.contains(v),
            AdditiveUpdate::CustomAttribute { key, .. } => self.custom_attributes.contains_key(key),
        }
    }

    /// Applies a single additive update with set-union semantics.
    ///
    /// Returns true if the record changed. Does not touch `version`; the
    /// registry stamps the record once per accepted write.
    pub fn apply(&mut self, update: &AdditiveUpdate) -> bool {
        if self.contains(update) {
            return false;
        }
        match update {
            AdditiveUpdate::Alias(v) => self.aliases.insert(v.clone()),
            AdditiveUpdate::Email(v) => self.emails.insert(v.clone()),
            AdditiveUpdate::Domain(v) => self.domains.insert(v.clone()),
            AdditiveUpdate::Country(v) => self.countries.insert(v.clone()),
            AdditiveUpdate::Address(v) => self.addresses.insert(v.clone()),
            AdditiveUpdate::Phone(v) => self.phones.insert(v.clone()),
            AdditiveUpdate::TaxId(v) => self.tax_ids.insert(v.clone()),
            AdditiveUpdate::CustomAttribute { key, value } => {
                self.custom_attributes.insert(key.clone(), value.clone());
                true
            }
        }
    }

    /// Updates `last_updated` and increments the version.
    pub(crate) fn touch(&mut self) {
        self.last_updated = Utc::now();
        self.version = self.version.saturating_add(1);
    }

    /// True if `name` equals the canonical name or an alias, ignoring
    /// Unicode case.
    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        self.names().any(|n| n.trim().to_lowercase() == name)
    }

    /// All display names of this vendor: canonical name first, then aliases.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl PartialEq for VendorRecord {
    fn eq(&self, other: &Self) -> bool {
        self.vendor_id == other.vendor_id
    }
}

impl Eq for VendorRecord {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_mention;

    fn record(name: &str) -> VendorRecord {
        let normalized = normalize_mention(&VendorMention::named(name)).unwrap();
        VendorRecord::from_mention(VendorId::new(), &normalized, "test")
    }

    #[test]
    fn test_vendor_id_creation() {
        let id1 = VendorId::new();
        let id2 = VendorId::new();
        assert_ne!(id1, id2);
        assert!(!id1.is_nil());
    }

    #[test]
    fn test_surrogate_key_is_deterministic() {
        let a = SurrogateKey::compute("acme", Some("DE123456789"));
        let b = SurrogateKey::compute("acme", Some("DE123456789"));
        assert_eq!(a, b);
        assert_eq!(a.vendor_id(), b.vendor_id());
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_surrogate_key_separates_fields() {
        // "ab" + "c" must not collide with "a" + "bc".
        let a = SurrogateKey::compute("ab", Some("c"));
        let b = SurrogateKey::compute("a", Some("bc"));
        assert_ne!(a, b);
        assert_ne!(
            SurrogateKey::compute("acme", None),
            SurrogateKey::compute("acme", Some("DE1"))
        );
    }

    #[test]
    fn test_alias_union_ignores_case_and_canonical() {
        let mut rec = record("ACME GmbH");
        assert!(!rec.apply(&AdditiveUpdate::Alias("acme gmbh".to_string())));
        assert!(rec.apply(&AdditiveUpdate::Alias("Acme Deutschland".to_string())));
        assert!(!rec.apply(&AdditiveUpdate::Alias("ACME DEUTSCHLAND".to_string())));
        assert_eq!(rec.aliases.len(), 1);
    }

    #[test]
    fn test_alias_union_folds_non_ascii_case() {
        let mut rec = record("Müller GmbH");
        assert!(rec.has_name("MÜLLER GMBH"));
        assert!(!rec.apply(&AdditiveUpdate::Alias("MÜLLER GmbH".to_string())));
        assert!(rec.apply(&AdditiveUpdate::Alias("Straße Logistik".to_string())));
        assert!(!rec.apply(&AdditiveUpdate::Alias("STRAßE LOGISTIK".to_string())));
        assert_eq!(rec.aliases.len(), 1);
    }

    #[test]
    fn test_custom_attribute_never_overwrites() {
        let mut rec = record("Globex");
        let first = AdditiveUpdate::CustomAttribute {
            key: "terms".to_string(),
            value: AttributeValue::from("NET30"),
        };
        let second = AdditiveUpdate::CustomAttribute {
            key: "terms".to_string(),
            value: AttributeValue::from("NET60"),
        };
        assert!(rec.apply(&first));
        assert!(!rec.apply(&second));
        assert_eq!(rec.custom_attributes["terms"], AttributeValue::from("NET30"));
    }

    #[test]
    fn test_additive_update_serialization() {
        let update = AdditiveUpdate::Email("billing@acme.de".to_string());
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["field"], "email");
        assert_eq!(json["value"], "billing@acme.de");
        assert_eq!(update.field(), VendorField::Email);
    }

    #[test]
    fn test_record_equality_by_id() {
        let a = record("Initech");
        let mut b = a.clone();
        b.canonical_name = "Something else".to_string();
        assert_eq!(a, b);
    }
}
