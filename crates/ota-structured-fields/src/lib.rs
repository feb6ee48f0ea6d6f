// crates/ota-structured-fields/src/lib.rs
// ============================================================================
// Module: Structured Fields Library
// Description: Public API surface for the structured header field codec.
// Purpose: Parse and serialize dictionaries, lists, and items.
// Dependencies: crate::{parser, serializer, value}
// ============================================================================

//! ## Overview
//! This crate implements the structured header field grammar used for update
//! signatures, manifest filters, and server-defined headers. Parsing is
//! all-or-nothing: malformed input fails with [`ParseError`] and never yields
//! a partial value. Serialization is strict and fails with
//! [`SerializeError`] instead of sanitizing keys, strings, or tokens.
//!
//! ```
//! use ota_structured_fields::parse_dictionary;
//! use ota_structured_fields::serialize_dictionary;
//!
//! let dictionary = parse_dictionary(r#"sig="abc", keyid="root""#).unwrap();
//! assert_eq!(dictionary.get_str("keyid"), Some("root"));
//! assert_eq!(serialize_dictionary(&dictionary).unwrap(), r#"sig="abc", keyid="root""#);
//! ```

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod parser;
pub mod serializer;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use parser::FieldType;
pub use parser::MAX_FIELD_BYTES;
pub use parser::ParseError;
pub use parser::parse;
pub use parser::parse_dictionary;
pub use parser::parse_item;
pub use parser::parse_list;
pub use serializer::SerializeError;
pub use serializer::serialize;
pub use serializer::serialize_bare_item;
pub use serializer::serialize_dictionary;
pub use serializer::serialize_item;
pub use serializer::serialize_list;
pub use value::BareItem;
pub use value::Decimal;
pub use value::Dictionary;
pub use value::InnerList;
pub use value::Item;
pub use value::List;
pub use value::ListEntry;
pub use value::Parameters;
pub use value::StructuredField;
