// crates/ota-structured-fields/src/value.rs
// ============================================================================
// Module: Structured Field Values
// Description: Value tree for structured header fields.
// Purpose: Represent items, inner lists, lists, and dictionaries losslessly.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The value tree mirrors the structured field grammar: a top-level field is
//! an [`Item`], a [`List`], or a [`Dictionary`]. Lists and dictionaries hold
//! [`ListEntry`] members, each either an item or an [`InnerList`]. Items and
//! inner lists carry ordered [`Parameters`].
//!
//! Dictionaries and parameters preserve insertion order and keep keys unique:
//! inserting an existing key replaces the value in its original position.
//! Keys are not validated on insertion; the serializer rejects invalid keys.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

// ============================================================================
// SECTION: Decimal
// ============================================================================

/// Fixed-point decimal with three fractional digits.
///
/// # Invariants
/// - The value is stored as an exact count of thousandths, so equality is
///   exact and round-trips through text without floating-point drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal {
    /// Value scaled by 1000.
    thousandths: i64,
}

impl Decimal {
    /// Largest magnitude allowed for the integer component.
    pub const MAX_INTEGER_PART: i64 = 999_999_999_999;

    /// Creates a decimal from a count of thousandths.
    #[must_use]
    pub const fn from_thousandths(thousandths: i64) -> Self {
        Self {
            thousandths,
        }
    }

    /// Creates a decimal from a float, rounding to three fractional digits.
    ///
    /// Returns `None` for non-finite values or values beyond the integer range.
    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let scaled = (value * 1000.0).round();
        #[allow(clippy::cast_precision_loss, reason = "bound check only")]
        let limit = ((Self::MAX_INTEGER_PART + 1) * 1000) as f64;
        if scaled.abs() >= limit {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, reason = "range checked above")]
        let thousandths = scaled as i64;
        Some(Self::from_thousandths(thousandths))
    }

    /// Returns the value scaled by 1000.
    #[must_use]
    pub const fn thousandths(self) -> i64 {
        self.thousandths
    }

    /// Returns the value as a float.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        #[allow(clippy::cast_precision_loss, reason = "decimal range fits f64 mantissa")]
        let value = self.thousandths as f64;
        value / 1000.0
    }

    /// Returns true when the integer component is within the grammar limits.
    #[must_use]
    pub const fn is_in_range(self) -> bool {
        (self.thousandths / 1000).abs() <= Self::MAX_INTEGER_PART
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.thousandths < 0 { "-" } else { "" };
        let magnitude = self.thousandths.unsigned_abs();
        let integer = magnitude / 1000;
        let fraction = magnitude % 1000;
        if fraction == 0 {
            return write!(f, "{sign}{integer}.0");
        }
        let digits = format!("{fraction:03}");
        write!(f, "{sign}{integer}.{}", digits.trim_end_matches('0'))
    }
}

// ============================================================================
// SECTION: Bare Items
// ============================================================================

/// Scalar value of an item or parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BareItem {
    /// Integer in the range of +/- 999,999,999,999,999.
    Integer(i64),
    /// Decimal with at most three fractional digits.
    Decimal(Decimal),
    /// Quoted string of printable ASCII.
    String(String),
    /// Unquoted token.
    Token(String),
    /// Binary content framed as `:base64:`.
    ByteSequence(Vec<u8>),
    /// Boolean serialized as `?1` / `?0`.
    Boolean(bool),
}

impl BareItem {
    /// Creates a string bare item.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Creates a token bare item.
    #[must_use]
    pub fn token(value: impl Into<String>) -> Self {
        Self::Token(value.into())
    }

    /// Returns the text of a string or token item.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) | Self::Token(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the integer value when this is an integer item.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the boolean value when this is a boolean item.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<i64> for BareItem {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for BareItem {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Decimal> for BareItem {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// Ordered, key-unique parameters attached to an item or inner list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    /// Parameter entries in insertion order.
    entries: Vec<(String, BareItem)>,
}

impl Parameters {
    /// Creates an empty parameter set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts a parameter, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: BareItem) {
        insert_ordered(&mut self.entries, key.into(), value);
    }

    /// Returns the value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&BareItem> {
        self.entries.iter().find(|(candidate, _)| candidate == key).map(|(_, value)| value)
    }

    /// Iterates parameters in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BareItem)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no parameters are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, BareItem)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (K, BareItem)>>(iter: T) -> Self {
        let mut parameters = Self::new();
        for (key, value) in iter {
            parameters.insert(key, value);
        }
        parameters
    }
}

// ============================================================================
// SECTION: Items and Lists
// ============================================================================

/// Bare item with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Primary value.
    pub bare_item: BareItem,
    /// Attached parameters.
    pub params: Parameters,
}

impl Item {
    /// Creates an item without parameters.
    #[must_use]
    pub const fn new(bare_item: BareItem) -> Self {
        Self {
            bare_item,
            params: Parameters::new(),
        }
    }

    /// Creates an item with parameters.
    #[must_use]
    pub const fn with_params(bare_item: BareItem, params: Parameters) -> Self {
        Self {
            bare_item,
            params,
        }
    }
}

impl From<BareItem> for Item {
    fn from(value: BareItem) -> Self {
        Self::new(value)
    }
}

/// Parenthesized list of items with its own parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InnerList {
    /// Member items.
    pub items: Vec<Item>,
    /// Parameters attached to the inner list.
    pub params: Parameters,
}

/// Member of a list or dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEntry {
    /// Single item.
    Item(Item),
    /// Inner list.
    InnerList(InnerList),
}

impl ListEntry {
    /// Returns the item when this entry is not an inner list.
    #[must_use]
    pub const fn as_item(&self) -> Option<&Item> {
        match self {
            Self::Item(item) => Some(item),
            Self::InnerList(_) => None,
        }
    }
}

impl From<Item> for ListEntry {
    fn from(value: Item) -> Self {
        Self::Item(value)
    }
}

impl From<BareItem> for ListEntry {
    fn from(value: BareItem) -> Self {
        Self::Item(Item::new(value))
    }
}

impl From<InnerList> for ListEntry {
    fn from(value: InnerList) -> Self {
        Self::InnerList(value)
    }
}

/// Top-level list field.
pub type List = Vec<ListEntry>;

// ============================================================================
// SECTION: Dictionary
// ============================================================================

/// Ordered, key-unique dictionary field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary {
    /// Members in insertion order.
    entries: Vec<(String, ListEntry)>,
}

impl Dictionary {
    /// Creates an empty dictionary.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts a member, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ListEntry>) {
        insert_ordered(&mut self.entries, key.into(), value.into());
    }

    /// Returns the member for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ListEntry> {
        self.entries.iter().find(|(candidate, _)| candidate == key).map(|(_, value)| value)
    }

    /// Returns the text of a string or token member, ignoring parameters.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(ListEntry::as_item).and_then(|item| item.bare_item.as_str())
    }

    /// Iterates members in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ListEntry)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the dictionary has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<ListEntry>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut dictionary = Self::new();
        for (key, value) in iter {
            dictionary.insert(key, value);
        }
        dictionary
    }
}

// ============================================================================
// SECTION: Top-Level Field
// ============================================================================

/// Parsed structured field of any top-level type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredField {
    /// Single item field.
    Item(Item),
    /// List field.
    List(List),
    /// Dictionary field.
    Dictionary(Dictionary),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Inserts into an ordered association list, replacing existing keys in place.
fn insert_ordered<V>(entries: &mut Vec<(String, V)>, key: String, value: V) {
    if let Some(slot) = entries.iter_mut().find(|(candidate, _)| *candidate == key) {
        slot.1 = value;
    } else {
        entries.push((key, value));
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
