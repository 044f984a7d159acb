//! Native value representation
//!
//! Value is a tagged word handed across the embedding API. Immediate values
//! (small integers, booleans, null, undefined) are encoded inline; strings and
//! objects are indices into the owning isolate's string table and handle table.
//!
//! # Value encoding
//! - Bit 0: 0 = 31-bit signed integer (shifted left by 1)
//! - Bits 0-1 = 11: Special values (null, undefined, bool, string, handle)
//! - Bits 5-63: special payload. Handles use all 59 bits (see [`HandleId`]).
//!
//! The word is a `u64` on every target so handle payloads never truncate.

use std::fmt;

use crate::bridge::{HandleId, StringId};

/// Tag values for value encoding
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// 31-bit signed integer (1 bit tag)
    Int = 0,
    /// Special value marker (2 bits tag)
    Special = 3,
}

/// Special value subtypes (5-bit tag, low bits always `Tag::Special`)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialTag {
    Bool = 3,       // TAG_SPECIAL | (0 << 2)
    Null = 7,       // TAG_SPECIAL | (1 << 2)
    Undefined = 11, // TAG_SPECIAL | (2 << 2)
    String = 15,    // TAG_SPECIAL | (3 << 2), payload is a string table index
    Handle = 19,    // TAG_SPECIAL | (4 << 2), payload is a packed HandleId
}

/// Raw value representation - a single 64-bit word
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawValue(pub u64);

impl RawValue {
    /// Number of bits used for special value tag
    const SPECIAL_TAG_BITS: u32 = 5;

    /// Width of the special payload
    pub const PAYLOAD_BITS: u32 = 64 - Self::SPECIAL_TAG_BITS;

    /// Create a new integer value (31-bit signed)
    #[inline]
    pub const fn from_i32(val: i32) -> Self {
        RawValue(((val as i64) << 1) as u64)
    }

    /// Create a new special value
    #[inline]
    pub const fn make_special(tag: u8, val: u64) -> Self {
        RawValue((tag as u64) | (val << Self::SPECIAL_TAG_BITS))
    }

    #[inline]
    pub const fn is_int(self) -> bool {
        (self.0 & 1) == Tag::Int as u64
    }

    #[inline]
    pub const fn is_special(self) -> bool {
        (self.0 & 0x3) == Tag::Special as u64
    }

    /// Get integer value (assumes is_int() is true)
    #[inline]
    pub const fn get_int(self) -> i32 {
        (self.0 as i64 >> 1) as i32
    }

    /// Get special tag, or 0 for integers
    #[inline]
    pub const fn get_special_tag(self) -> u8 {
        if self.is_special() {
            (self.0 & ((1 << Self::SPECIAL_TAG_BITS) - 1)) as u8
        } else {
            0
        }
    }

    /// Get special payload (assumes is_special() is true)
    #[inline]
    pub const fn get_special_value(self) -> u64 {
        self.0 >> Self::SPECIAL_TAG_BITS
    }

    pub const NULL: RawValue = RawValue::make_special(SpecialTag::Null as u8, 0);
    pub const UNDEFINED: RawValue = RawValue::make_special(SpecialTag::Undefined as u8, 0);
    pub const FALSE: RawValue = RawValue::make_special(SpecialTag::Bool as u8, 0);
    pub const TRUE: RawValue = RawValue::make_special(SpecialTag::Bool as u8, 1);
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_int() {
            return write!(f, "Int({})", self.get_int());
        }
        match self.get_special_tag() {
            t if t == SpecialTag::Null as u8 => write!(f, "Null"),
            t if t == SpecialTag::Undefined as u8 => write!(f, "Undefined"),
            t if t == SpecialTag::Bool as u8 => write!(f, "Bool({})", self.get_special_value() != 0),
            t if t == SpecialTag::String as u8 => write!(f, "String(#{})", self.get_special_value()),
            t if t == SpecialTag::Handle as u8 => write!(f, "Handle({:?})", HandleId::from_bits(self.get_special_value())),
            _ => write!(f, "RawValue(0x{:x})", self.0),
        }
    }
}

/// Native value handed to and returned from the embedding API
///
/// Values are `Copy`; strings and handles are only meaningful together with
/// the isolate that produced them.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(pub RawValue);

impl Value {
    /// Create a null value
    #[inline]
    pub const fn null() -> Self {
        Value(RawValue::NULL)
    }

    /// Create an undefined value
    #[inline]
    pub const fn undefined() -> Self {
        Value(RawValue::UNDEFINED)
    }

    /// Create a boolean value
    #[inline]
    pub const fn bool(b: bool) -> Self {
        if b {
            Value(RawValue::TRUE)
        } else {
            Value(RawValue::FALSE)
        }
    }

    /// Create an integer value (31-bit signed)
    ///
    /// # Panics
    /// Panics if `val` does not fit in 31 bits.
    #[inline]
    pub const fn int(val: i32) -> Self {
        assert!(fits_in_short_int(val), "Integer out of 31-bit range");
        Value(RawValue::from_i32(val))
    }

    /// Create a string value from an interned string id
    #[inline]
    pub const fn string(id: StringId) -> Self {
        Value(RawValue::make_special(SpecialTag::String as u8, id.0 as u64))
    }

    /// Create an object value from a handle
    #[inline]
    pub const fn handle(id: HandleId) -> Self {
        Value(RawValue::make_special(SpecialTag::Handle as u8, id.to_bits()))
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0.0 == RawValue::NULL.0
    }

    #[inline]
    pub const fn is_undefined(self) -> bool {
        self.0.0 == RawValue::UNDEFINED.0
    }

    #[inline]
    pub const fn is_nullish(self) -> bool {
        self.is_null() || self.is_undefined()
    }

    #[inline]
    pub const fn is_bool(self) -> bool {
        self.0.get_special_tag() == SpecialTag::Bool as u8
    }

    #[inline]
    pub const fn is_int(self) -> bool {
        self.0.is_int()
    }

    #[inline]
    pub const fn is_string(self) -> bool {
        self.0.get_special_tag() == SpecialTag::String as u8
    }

    /// Check if this value refers to a bridged managed object
    #[inline]
    pub const fn is_handle(self) -> bool {
        self.0.get_special_tag() == SpecialTag::Handle as u8
    }

    #[inline]
    pub const fn to_bool(self) -> Option<bool> {
        if self.is_bool() {
            Some(self.0.get_special_value() != 0)
        } else {
            None
        }
    }

    #[inline]
    pub const fn to_i32(self) -> Option<i32> {
        if self.is_int() {
            Some(self.0.get_int())
        } else {
            None
        }
    }

    #[inline]
    pub const fn to_string_id(self) -> Option<StringId> {
        if self.is_string() {
            Some(StringId(self.0.get_special_value() as u32))
        } else {
            None
        }
    }

    #[inline]
    pub const fn to_handle(self) -> Option<HandleId> {
        if self.is_handle() {
            Some(HandleId::from_bits(self.0.get_special_value()))
        } else {
            None
        }
    }

    #[inline]
    pub const fn raw(self) -> RawValue {
        self.0
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::undefined()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Context-free rendering. Use `Context::display` to see string contents and
/// object kinds.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else if self.is_undefined() {
            write!(f, "undefined")
        } else if let Some(b) = self.to_bool() {
            write!(f, "{}", b)
        } else if let Some(i) = self.to_i32() {
            write!(f, "{}", i)
        } else if let Some(id) = self.to_string_id() {
            write!(f, "[string #{}]", id.0)
        } else if let Some(id) = self.to_handle() {
            write!(f, "[object #{}]", id.index())
        } else {
            write!(f, "[unknown]")
        }
    }
}

/// Short integer range constants
pub const SHORT_INT_MIN: i32 = -(1 << 30);
pub const SHORT_INT_MAX: i32 = (1 << 30) - 1;

/// Check if an i32 fits in a short integer
#[inline]
pub const fn fits_in_short_int(val: i32) -> bool {
    val >= SHORT_INT_MIN && val <= SHORT_INT_MAX
}
