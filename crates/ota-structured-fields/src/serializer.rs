// crates/ota-structured-fields/src/serializer.rs
// ============================================================================
// Module: Structured Field Serializer
// Description: Strict serializer for structured header fields.
// Purpose: Render value trees as header text, rejecting unrepresentable data.
// Dependencies: base64, thiserror, crate::value
// ============================================================================

//! ## Overview
//! Serialization is the strict direction of the codec. Keys, strings, tokens,
//! and numbers are validated and any violation fails the whole field; nothing
//! is escaped away or truncated. For every value that serializes
//! successfully, parsing the output yields an equal value tree.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

use crate::parser::is_key_byte;
use crate::parser::is_token_byte;
use crate::value::BareItem;
use crate::value::Dictionary;
use crate::value::InnerList;
use crate::value::Item;
use crate::value::ListEntry;
use crate::value::Parameters;
use crate::value::StructuredField;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Largest integer magnitude representable in a field.
const MAX_INTEGER: i64 = 999_999_999_999_999;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Structured field serialization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    /// A dictionary or parameter key was empty.
    #[error("key must not be empty")]
    EmptyKey,
    /// A key contained a character outside the key grammar.
    #[error("invalid character `{character}` in key `{key}`")]
    InvalidCharacterInKey {
        /// Lower-cased key.
        key: String,
        /// First offending character.
        character: char,
    },
    /// A string contained a character outside printable ASCII.
    #[error("invalid character `{0}` in string")]
    InvalidCharacterInString(char),
    /// A token did not match the token grammar.
    #[error("invalid token `{0}`")]
    InvalidToken(String),
    /// An integer exceeded 15 digits.
    #[error("integer out of range: {0}")]
    IntegerOutOfRange(i64),
    /// A decimal integer component exceeded 12 digits.
    #[error("decimal out of range: {0}")]
    DecimalOutOfRange(String),
}

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Serializes a field of any top-level type.
///
/// # Errors
///
/// Returns [`SerializeError`] when any member cannot be represented.
pub fn serialize(field: &StructuredField) -> Result<String, SerializeError> {
    match field {
        StructuredField::Item(item) => serialize_item(item),
        StructuredField::List(list) => serialize_list(list),
        StructuredField::Dictionary(dictionary) => serialize_dictionary(dictionary),
    }
}

/// Serializes a dictionary.
///
/// # Errors
///
/// Returns [`SerializeError`] when a key or member cannot be represented.
pub fn serialize_dictionary(dictionary: &Dictionary) -> Result<String, SerializeError> {
    let mut output = String::new();
    for (index, (key, entry)) in dictionary.iter().enumerate() {
        if index > 0 {
            output.push_str(", ");
        }
        write_key(&mut output, key)?;
        match entry {
            ListEntry::Item(Item {
                bare_item: BareItem::Boolean(true),
                params,
            }) => write_parameters(&mut output, params)?,
            ListEntry::Item(item) => {
                output.push('=');
                write_item(&mut output, item)?;
            }
            ListEntry::InnerList(inner) => {
                output.push('=');
                write_inner_list(&mut output, inner)?;
            }
        }
    }
    Ok(output)
}

/// Serializes a list.
///
/// # Errors
///
/// Returns [`SerializeError`] when a member cannot be represented.
pub fn serialize_list(list: &[ListEntry]) -> Result<String, SerializeError> {
    let mut output = String::new();
    for (index, entry) in list.iter().enumerate() {
        if index > 0 {
            output.push_str(", ");
        }
        match entry {
            ListEntry::Item(item) => write_item(&mut output, item)?,
            ListEntry::InnerList(inner) => write_inner_list(&mut output, inner)?,
        }
    }
    Ok(output)
}

/// Serializes an item with its parameters.
///
/// # Errors
///
/// Returns [`SerializeError`] when the item or a parameter cannot be
/// represented.
pub fn serialize_item(item: &Item) -> Result<String, SerializeError> {
    let mut output = String::new();
    write_item(&mut output, item)?;
    Ok(output)
}

/// Serializes a bare item without parameters.
///
/// # Errors
///
/// Returns [`SerializeError`] when the value cannot be represented.
pub fn serialize_bare_item(bare_item: &BareItem) -> Result<String, SerializeError> {
    let mut output = String::new();
    write_bare_item(&mut output, bare_item)?;
    Ok(output)
}

// ============================================================================
// SECTION: Writers
// ============================================================================

/// Writes an item followed by its parameters.
fn write_item(output: &mut String, item: &Item) -> Result<(), SerializeError> {
    write_bare_item(output, &item.bare_item)?;
    write_parameters(output, &item.params)
}

/// Writes a parenthesized inner list followed by its parameters.
fn write_inner_list(output: &mut String, inner: &InnerList) -> Result<(), SerializeError> {
    output.push('(');
    for (index, item) in inner.items.iter().enumerate() {
        if index > 0 {
            output.push(' ');
        }
        write_item(output, item)?;
    }
    output.push(')');
    write_parameters(output, &inner.params)
}

/// Writes `;key[=value]` parameters; true booleans omit the value.
fn write_parameters(output: &mut String, params: &Parameters) -> Result<(), SerializeError> {
    for (key, value) in params.iter() {
        output.push(';');
        write_key(output, key)?;
        if *value != BareItem::Boolean(true) {
            output.push('=');
            write_bare_item(output, value)?;
        }
    }
    Ok(())
}

/// Validates and writes a key.
fn write_key(output: &mut String, key: &str) -> Result<(), SerializeError> {
    validate_key(key)?;
    output.push_str(key);
    Ok(())
}

/// Writes a bare item.
fn write_bare_item(output: &mut String, bare_item: &BareItem) -> Result<(), SerializeError> {
    match bare_item {
        BareItem::Integer(value) => {
            if !(-MAX_INTEGER ..= MAX_INTEGER).contains(value) {
                return Err(SerializeError::IntegerOutOfRange(*value));
            }
            let _ = write!(output, "{value}");
        }
        BareItem::Decimal(value) => {
            if !value.is_in_range() {
                return Err(SerializeError::DecimalOutOfRange(value.to_string()));
            }
            let _ = write!(output, "{value}");
        }
        BareItem::String(value) => write_string(output, value)?,
        BareItem::Token(value) => {
            validate_token(value)?;
            output.push_str(value);
        }
        BareItem::ByteSequence(bytes) => {
            output.push(':');
            output.push_str(&BASE64.encode(bytes));
            output.push(':');
        }
        BareItem::Boolean(value) => output.push_str(if *value { "?1" } else { "?0" }),
    }
    Ok(())
}

/// Writes a quoted string, escaping `"` and `\`.
fn write_string(output: &mut String, value: &str) -> Result<(), SerializeError> {
    if let Some(character) = value.chars().find(|c| !matches!(*c, ' ' ..= '~')) {
        return Err(SerializeError::InvalidCharacterInString(character));
    }
    output.push('"');
    for character in value.chars() {
        if matches!(character, '"' | '\\') {
            output.push('\\');
        }
        output.push(character);
    }
    output.push('"');
    Ok(())
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a key against `[a-z*][a-z0-9_.*-]*`.
fn validate_key(key: &str) -> Result<(), SerializeError> {
    let Some(first) = key.chars().next() else {
        return Err(SerializeError::EmptyKey);
    };
    let offending = if first.is_ascii_lowercase() || first == '*' {
        key.chars().skip(1).find(|c| !u8::try_from(*c).is_ok_and(is_key_byte))
    } else {
        Some(first)
    };
    match offending {
        None => Ok(()),
        Some(character) => Err(SerializeError::InvalidCharacterInKey {
            key: key.to_lowercase(),
            character,
        }),
    }
}

/// Validates a token against the token grammar.
fn validate_token(token: &str) -> Result<(), SerializeError> {
    let bytes = token.as_bytes();
    let valid = bytes.first().is_some_and(|first| first.is_ascii_alphabetic() || *first == b'*')
        && bytes.iter().skip(1).all(|byte| is_token_byte(*byte));
    if valid { Ok(()) } else { Err(SerializeError::InvalidToken(token.to_string())) }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
