// crates/ota-structured-fields/src/parser.rs
// ============================================================================
// Module: Structured Field Parser
// Description: Strict parser for structured header fields.
// Purpose: Turn header text into a value tree or fail without partial output.
// Dependencies: base64, thiserror, crate::value
// ============================================================================

//! ## Overview
//! The parser follows the structured field parsing algorithms: leading and
//! trailing spaces are discarded, the whole input must be consumed, and any
//! grammar violation fails the parse. Empty input parses to an empty
//! dictionary or list; an empty item is an error.
//! Security posture: header text is untrusted and is bounded by
//! [`MAX_FIELD_BYTES`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::alphabet;
use base64::engine::DecodePaddingMode;
use base64::engine::GeneralPurpose;
use base64::engine::GeneralPurposeConfig;
use thiserror::Error;

use crate::value::BareItem;
use crate::value::Decimal;
use crate::value::Dictionary;
use crate::value::InnerList;
use crate::value::Item;
use crate::value::List;
use crate::value::ListEntry;
use crate::value::Parameters;
use crate::value::StructuredField;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum accepted field size in bytes.
pub const MAX_FIELD_BYTES: usize = 64 * 1024;
/// Maximum digits in an integer.
const MAX_INTEGER_DIGITS: usize = 15;
/// Maximum digits in the integer component of a decimal.
const MAX_DECIMAL_INTEGER_DIGITS: usize = 12;
/// Maximum digits in the fractional component of a decimal.
const MAX_DECIMAL_FRACTION_DIGITS: usize = 3;

/// Base64 engine that tolerates missing padding on input.
const BYTE_SEQUENCE_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Structured field parse failures.
///
/// # Invariants
/// - `position` values are byte offsets into the original input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input exceeded [`MAX_FIELD_BYTES`].
    #[error("field exceeds size limit: {actual_bytes} bytes (max {max_bytes})")]
    InputTooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual input size.
        actual_bytes: usize,
    },
    /// Input ended where more data was required.
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEnd {
        /// Expected construct.
        expected: &'static str,
    },
    /// A character did not fit the grammar at this position.
    #[error("unexpected character `{found}` at {position}, expected {expected}")]
    UnexpectedCharacter {
        /// Offending character.
        found: char,
        /// Byte offset of the character.
        position: usize,
        /// Expected construct.
        expected: &'static str,
    },
    /// A string was not closed with a double quote.
    #[error("unterminated string starting at {position}")]
    UnterminatedString {
        /// Byte offset of the opening quote.
        position: usize,
    },
    /// A backslash escaped something other than `"` or `\`.
    #[error("invalid escape sequence at {position}")]
    InvalidEscape {
        /// Byte offset of the escaped character.
        position: usize,
    },
    /// A string contained a character outside printable ASCII.
    #[error("invalid character in string at {position}")]
    InvalidCharacterInString {
        /// Byte offset of the character.
        position: usize,
    },
    /// An integer or decimal violated the numeric limits.
    #[error("invalid number `{raw}` at {position}: {reason}")]
    InvalidNumber {
        /// Raw numeric text.
        raw: String,
        /// Byte offset where the number starts.
        position: usize,
        /// Violated rule.
        reason: &'static str,
    },
    /// A byte sequence was not valid base64.
    #[error("invalid byte sequence at {position}")]
    InvalidByteSequence {
        /// Byte offset of the opening colon.
        position: usize,
    },
    /// A list or dictionary ended with a comma.
    #[error("trailing comma at {position}")]
    TrailingComma {
        /// Byte offset of the comma.
        position: usize,
    },
    /// Data remained after a complete field.
    #[error("unexpected trailing input at {position}")]
    TrailingInput {
        /// Byte offset where trailing input begins.
        position: usize,
    },
}

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Top-level field type to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Single item.
    Item,
    /// Comma-separated list.
    List,
    /// Comma-separated dictionary.
    Dictionary,
}

/// Parses a field of the requested top-level type.
///
/// # Errors
///
/// Returns [`ParseError`] when the input does not match the grammar.
pub fn parse(input: &str, field_type: FieldType) -> Result<StructuredField, ParseError> {
    match field_type {
        FieldType::Item => parse_item(input).map(StructuredField::Item),
        FieldType::List => parse_list(input).map(StructuredField::List),
        FieldType::Dictionary => parse_dictionary(input).map(StructuredField::Dictionary),
    }
}

/// Parses a dictionary field.
///
/// # Errors
///
/// Returns [`ParseError`] when the input does not match the grammar.
pub fn parse_dictionary(input: &str) -> Result<Dictionary, ParseError> {
    let mut parser = Parser::new(input)?;
    let dictionary = parser.dictionary()?;
    parser.finish()?;
    Ok(dictionary)
}

/// Parses a list field.
///
/// # Errors
///
/// Returns [`ParseError`] when the input does not match the grammar.
pub fn parse_list(input: &str) -> Result<List, ParseError> {
    let mut parser = Parser::new(input)?;
    let list = parser.list()?;
    parser.finish()?;
    Ok(list)
}

/// Parses an item field.
///
/// # Errors
///
/// Returns [`ParseError`] when the input does not match the grammar or is
/// empty.
pub fn parse_item(input: &str) -> Result<Item, ParseError> {
    let mut parser = Parser::new(input)?;
    let item = parser.item()?;
    parser.finish()?;
    Ok(item)
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Cursor over ASCII field bytes.
struct Parser<'a> {
    /// Field bytes.
    input: &'a [u8],
    /// Current byte offset.
    position: usize,
}

impl<'a> Parser<'a> {
    /// Validates size, then skips leading spaces.
    fn new(input: &'a str) -> Result<Self, ParseError> {
        if input.len() > MAX_FIELD_BYTES {
            return Err(ParseError::InputTooLarge {
                max_bytes: MAX_FIELD_BYTES,
                actual_bytes: input.len(),
            });
        }
        let mut parser = Self {
            input: input.as_bytes(),
            position: 0,
        };
        parser.skip_sp();
        Ok(parser)
    }

    /// Skips trailing spaces and requires end of input.
    fn finish(&mut self) -> Result<(), ParseError> {
        self.skip_sp();
        if self.at_end() {
            Ok(())
        } else {
            Err(ParseError::TrailingInput {
                position: self.position,
            })
        }
    }

    /// Parses dictionary members until end of input.
    fn dictionary(&mut self) -> Result<Dictionary, ParseError> {
        let mut dictionary = Dictionary::new();
        while !self.at_end() {
            let key = self.key()?;
            let member = if self.peek() == Some(b'=') {
                self.position += 1;
                self.item_or_inner_list()?
            } else {
                let params = self.parameters()?;
                ListEntry::Item(Item::with_params(BareItem::Boolean(true), params))
            };
            dictionary.insert(key, member);
            if !self.next_member()? {
                break;
            }
        }
        Ok(dictionary)
    }

    /// Parses list members until end of input.
    fn list(&mut self) -> Result<List, ParseError> {
        let mut list = List::new();
        while !self.at_end() {
            list.push(self.item_or_inner_list()?);
            if !self.next_member()? {
                break;
            }
        }
        Ok(list)
    }

    /// Consumes the separator after a member; returns false at end of input.
    fn next_member(&mut self) -> Result<bool, ParseError> {
        self.skip_ows();
        let Some(byte) = self.peek() else {
            return Ok(false);
        };
        if byte != b',' {
            return Err(self.unexpected(byte, "`,` between members"));
        }
        let comma = self.position;
        self.position += 1;
        self.skip_ows();
        if self.at_end() {
            return Err(ParseError::TrailingComma {
                position: comma,
            });
        }
        Ok(true)
    }

    /// Parses an item or an inner list.
    fn item_or_inner_list(&mut self) -> Result<ListEntry, ParseError> {
        if self.peek() == Some(b'(') {
            self.inner_list().map(ListEntry::InnerList)
        } else {
            self.item().map(ListEntry::Item)
        }
    }

    /// Parses a parenthesized inner list with parameters.
    fn inner_list(&mut self) -> Result<InnerList, ParseError> {
        self.position += 1;
        let mut items = Vec::new();
        loop {
            self.skip_sp();
            match self.peek() {
                None => {
                    return Err(ParseError::UnexpectedEnd {
                        expected: "`)` closing inner list",
                    });
                }
                Some(b')') => {
                    self.position += 1;
                    let params = self.parameters()?;
                    return Ok(InnerList {
                        items,
                        params,
                    });
                }
                Some(_) => {
                    items.push(self.item()?);
                    match self.peek() {
                        Some(b' ' | b')') => {}
                        Some(byte) => return Err(self.unexpected(byte, "SP or `)` in inner list")),
                        None => {
                            return Err(ParseError::UnexpectedEnd {
                                expected: "`)` closing inner list",
                            });
                        }
                    }
                }
            }
        }
    }

    /// Parses a bare item with parameters.
    fn item(&mut self) -> Result<Item, ParseError> {
        let bare_item = self.bare_item()?;
        let params = self.parameters()?;
        Ok(Item::with_params(bare_item, params))
    }

    /// Parses `;key[=value]` parameters.
    fn parameters(&mut self) -> Result<Parameters, ParseError> {
        let mut params = Parameters::new();
        while self.peek() == Some(b';') {
            self.position += 1;
            self.skip_sp();
            let key = self.key()?;
            let value = if self.peek() == Some(b'=') {
                self.position += 1;
                self.bare_item()?
            } else {
                BareItem::Boolean(true)
            };
            params.insert(key, value);
        }
        Ok(params)
    }

    /// Parses a dictionary or parameter key.
    fn key(&mut self) -> Result<String, ParseError> {
        let start = self.position;
        match self.peek() {
            None => {
                return Err(ParseError::UnexpectedEnd {
                    expected: "key",
                });
            }
            Some(byte) if byte.is_ascii_lowercase() || byte == b'*' => {}
            Some(byte) => return Err(self.unexpected(byte, "lowercase letter or `*` starting key")),
        }
        while let Some(byte) = self.peek() {
            if !is_key_byte(byte) {
                break;
            }
            self.position += 1;
        }
        Ok(self.slice(start))
    }

    /// Parses a bare item by its leading character.
    fn bare_item(&mut self) -> Result<BareItem, ParseError> {
        match self.peek() {
            None => Err(ParseError::UnexpectedEnd {
                expected: "bare item",
            }),
            Some(b'-' | b'0' ..= b'9') => self.number(),
            Some(b'"') => self.string(),
            Some(b':') => self.byte_sequence(),
            Some(b'?') => self.boolean(),
            Some(byte) if byte.is_ascii_alphabetic() || byte == b'*' => Ok(self.token()),
            Some(byte) => Err(self.unexpected(byte, "bare item")),
        }
    }

    /// Parses an integer or decimal.
    fn number(&mut self) -> Result<BareItem, ParseError> {
        let start = self.position;
        let negative = self.peek() == Some(b'-');
        if negative {
            self.position += 1;
        }
        let digits_start = self.position;
        let mut dot: Option<usize> = None;
        while let Some(byte) = self.peek() {
            match byte {
                b'0' ..= b'9' => self.position += 1,
                b'.' if dot.is_none() => {
                    dot = Some(self.position - digits_start);
                    self.position += 1;
                }
                _ => break,
            }
        }
        let raw = self.slice(digits_start);
        let invalid = |reason: &'static str| ParseError::InvalidNumber {
            raw: self.slice(start),
            position: start,
            reason,
        };
        if raw.is_empty() || dot == Some(0) {
            return Err(invalid("missing integer digits"));
        }
        let sign = if negative { -1 } else { 1 };
        let Some(dot) = dot else {
            if raw.len() > MAX_INTEGER_DIGITS {
                return Err(invalid("integer has more than 15 digits"));
            }
            let value: i64 = raw.parse().map_err(|_| invalid("integer is not numeric"))?;
            return Ok(BareItem::Integer(sign * value));
        };
        let (integer, fraction) = (&raw[.. dot], &raw[dot + 1 ..]);
        if integer.len() > MAX_DECIMAL_INTEGER_DIGITS {
            return Err(invalid("decimal has more than 12 integer digits"));
        }
        if fraction.is_empty() {
            return Err(invalid("decimal ends with `.`"));
        }
        if fraction.len() > MAX_DECIMAL_FRACTION_DIGITS {
            return Err(invalid("decimal has more than 3 fractional digits"));
        }
        let integer: i64 = integer.parse().map_err(|_| invalid("decimal is not numeric"))?;
        let mut scaled: i64 = fraction.parse().map_err(|_| invalid("decimal is not numeric"))?;
        for _ in fraction.len() .. MAX_DECIMAL_FRACTION_DIGITS {
            scaled *= 10;
        }
        Ok(BareItem::Decimal(Decimal::from_thousandths(sign * (integer * 1000 + scaled))))
    }

    /// Parses a quoted string.
    fn string(&mut self) -> Result<BareItem, ParseError> {
        let open = self.position;
        self.position += 1;
        let mut output = String::new();
        while let Some(byte) = self.peek() {
            self.position += 1;
            match byte {
                b'\\' => {
                    let escaped_at = self.position;
                    match self.peek() {
                        Some(escaped @ (b'"' | b'\\')) => {
                            self.position += 1;
                            output.push(char::from(escaped));
                        }
                        Some(_) => {
                            return Err(ParseError::InvalidEscape {
                                position: escaped_at,
                            });
                        }
                        None => {
                            return Err(ParseError::UnterminatedString {
                                position: open,
                            });
                        }
                    }
                }
                b'"' => return Ok(BareItem::String(output)),
                0x20 ..= 0x7e => output.push(char::from(byte)),
                _ => {
                    return Err(ParseError::InvalidCharacterInString {
                        position: self.position - 1,
                    });
                }
            }
        }
        Err(ParseError::UnterminatedString {
            position: open,
        })
    }

    /// Parses a token.
    fn token(&mut self) -> BareItem {
        let start = self.position;
        self.position += 1;
        while let Some(byte) = self.peek() {
            if !is_token_byte(byte) {
                break;
            }
            self.position += 1;
        }
        BareItem::Token(self.slice(start))
    }

    /// Parses a `:base64:` byte sequence.
    fn byte_sequence(&mut self) -> Result<BareItem, ParseError> {
        let open = self.position;
        self.position += 1;
        let start = self.position;
        while let Some(byte) = self.peek() {
            if byte == b':' {
                let encoded = &self.input[start .. self.position];
                self.position += 1;
                let decoded = BYTE_SEQUENCE_ENGINE.decode(encoded).map_err(|_| {
                    ParseError::InvalidByteSequence {
                        position: open,
                    }
                })?;
                return Ok(BareItem::ByteSequence(decoded));
            }
            if !(byte.is_ascii_alphanumeric() || matches!(byte, b'+' | b'/' | b'=')) {
                return Err(ParseError::InvalidByteSequence {
                    position: open,
                });
            }
            self.position += 1;
        }
        Err(ParseError::UnexpectedEnd {
            expected: "`:` closing byte sequence",
        })
    }

    /// Parses `?0` or `?1`.
    fn boolean(&mut self) -> Result<BareItem, ParseError> {
        self.position += 1;
        match self.peek() {
            Some(b'1') => {
                self.position += 1;
                Ok(BareItem::Boolean(true))
            }
            Some(b'0') => {
                self.position += 1;
                Ok(BareItem::Boolean(false))
            }
            Some(byte) => Err(self.unexpected(byte, "`0` or `1` in boolean")),
            None => Err(ParseError::UnexpectedEnd {
                expected: "`0` or `1` in boolean",
            }),
        }
    }

    /// Returns the byte at the cursor.
    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    /// Returns true when the cursor is at the end of input.
    const fn at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    /// Skips spaces.
    fn skip_sp(&mut self) {
        while self.peek() == Some(b' ') {
            self.position += 1;
        }
    }

    /// Skips optional whitespace (spaces and tabs).
    fn skip_ows(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.position += 1;
        }
    }

    /// Returns the ASCII text between `start` and the cursor.
    fn slice(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.input[start .. self.position]).into_owned()
    }

    /// Builds an unexpected-character error at the cursor.
    fn unexpected(&self, byte: u8, expected: &'static str) -> ParseError {
        ParseError::UnexpectedCharacter {
            found: char::from(byte),
            position: self.position,
            expected,
        }
    }
}

// ============================================================================
// SECTION: Character Classes
// ============================================================================

/// Returns true for bytes allowed after the first key character.
pub(crate) const fn is_key_byte(byte: u8) -> bool {
    byte.is_ascii_lowercase() || byte.is_ascii_digit() || matches!(byte, b'_' | b'-' | b'.' | b'*')
}

/// Returns true for bytes allowed after the first token character.
pub(crate) const fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
                | b':'
                | b'/'
        )
}
