//! Cache Value Module
//!
//! The closed set of values the codec can store, plus the typed conversions
//! used by [`CacheClient::get_as`](crate::CacheClient::get_as).

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::codec::{CacheObject, ObjectResolver, ObjectValue, TypeTag};
use crate::error::{CacheError, Result};

// == Cache Value ==
/// A value that can be stored under a cache key.
#[derive(Debug, PartialEq)]
pub enum CacheValue {
    Bool(bool),
    Char(char),
    Byte(u8),
    SByte(i8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    Duration(TimeDelta),
    Timestamp(Timestamp),
    TimestampOffset(DateTime<FixedOffset>),
    Guid(Uuid),
    String(String),
    IpAddress(IpAddr),
    Bytes(Vec<u8>),
    Object(ObjectValue),
}

impl CacheValue {
    /// Wraps an arbitrary serializable object.
    pub fn object<T: CacheObject>(value: T) -> Self {
        Self::Object(ObjectValue::new(value))
    }

    /// Type tag written for this value.
    pub fn tag(&self) -> TypeTag {
        match self {
            Self::Bool(_) => TypeTag::Bool,
            Self::Char(_) => TypeTag::Char,
            Self::Byte(_) => TypeTag::Byte,
            Self::SByte(_) => TypeTag::SByte,
            Self::Int16(_) => TypeTag::Int16,
            Self::UInt16(_) => TypeTag::UInt16,
            Self::Int32(_) => TypeTag::Int32,
            Self::UInt32(_) => TypeTag::UInt32,
            Self::Int64(_) => TypeTag::Int64,
            Self::UInt64(_) => TypeTag::UInt64,
            Self::Single(_) => TypeTag::Single,
            Self::Double(_) => TypeTag::Double,
            Self::Decimal(_) => TypeTag::Decimal,
            Self::Duration(_) => TypeTag::Duration,
            Self::Timestamp(_) => TypeTag::Timestamp,
            Self::TimestampOffset(_) => TypeTag::TimestampOffset,
            Self::Guid(_) => TypeTag::Guid,
            Self::String(_) => TypeTag::String,
            Self::IpAddress(_) => TypeTag::IpAddress,
            Self::Bytes(_) => TypeTag::Bytes,
            Self::Object(_) => TypeTag::Object,
        }
    }
}

// == Decimal ==
const DECIMAL_SIGN: u32 = 0x8000_0000;
const DECIMAL_SCALE_MASK: u32 = 0x00FF_0000;
const DECIMAL_SCALE_SHIFT: u32 = 16;
const DECIMAL_MAX_SCALE: u32 = 28;
const DECIMAL_MAX_MANTISSA: u128 = (1 << 96) - 1;

/// 128-bit decimal: a 96-bit integer mantissa, a sign and a power-of-ten
/// scale between 0 and 28.
///
/// Equality compares representations, so `1.0` and `1.00` differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Decimal {
    lo: u32,
    mid: u32,
    hi: u32,
    flags: u32,
}

impl Decimal {
    pub const ZERO: Self = Self {
        lo: 0,
        mid: 0,
        hi: 0,
        flags: 0,
    };
    pub const MAX: Self = Self {
        lo: u32::MAX,
        mid: u32::MAX,
        hi: u32::MAX,
        flags: 0,
    };
    pub const MIN: Self = Self {
        lo: u32::MAX,
        mid: u32::MAX,
        hi: u32::MAX,
        flags: DECIMAL_SIGN,
    };

    /// Creates `mantissa * 10^-scale`.
    pub fn new(mantissa: i128, scale: u32) -> Result<Self> {
        if scale > DECIMAL_MAX_SCALE {
            return Err(CacheError::OutOfRange(format!(
                "decimal scale {scale} exceeds {DECIMAL_MAX_SCALE}"
            )));
        }
        let magnitude = mantissa.unsigned_abs();
        if magnitude > DECIMAL_MAX_MANTISSA {
            return Err(CacheError::OutOfRange(format!(
                "decimal mantissa {mantissa} exceeds 96 bits"
            )));
        }

        let sign = if mantissa < 0 { DECIMAL_SIGN } else { 0 };
        Ok(Self {
            lo: magnitude as u32,
            mid: (magnitude >> 32) as u32,
            hi: (magnitude >> 64) as u32,
            flags: sign | (scale << DECIMAL_SCALE_SHIFT),
        })
    }

    /// Rebuilds a decimal from its `[lo, mid, hi, flags]` words.
    pub fn from_bits(bits: [u32; 4]) -> Result<Self> {
        let [lo, mid, hi, flags] = bits;
        let scale = (flags & DECIMAL_SCALE_MASK) >> DECIMAL_SCALE_SHIFT;
        if flags & !(DECIMAL_SIGN | DECIMAL_SCALE_MASK) != 0 || scale > DECIMAL_MAX_SCALE {
            return Err(CacheError::Corrupt(format!(
                "invalid decimal flags {flags:#010x}"
            )));
        }
        Ok(Self { lo, mid, hi, flags })
    }

    /// The `[lo, mid, hi, flags]` words.
    pub fn to_bits(self) -> [u32; 4] {
        [self.lo, self.mid, self.hi, self.flags]
    }

    /// Signed integer mantissa.
    pub fn mantissa(self) -> i128 {
        let magnitude =
            (u128::from(self.hi) << 64) | (u128::from(self.mid) << 32) | u128::from(self.lo);
        // at most 96 bits, always fits
        let magnitude = magnitude as i128;
        if self.is_sign_negative() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Power of ten the mantissa is divided by.
    pub fn scale(self) -> u32 {
        (self.flags & DECIMAL_SCALE_MASK) >> DECIMAL_SCALE_SHIFT
    }

    pub fn is_sign_negative(self) -> bool {
        self.flags & DECIMAL_SIGN != 0
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa().unsigned_abs().to_string();
        let scale = self.scale() as usize;
        let sign = if self.is_sign_negative() && self.mantissa() != 0 {
            "-"
        } else {
            ""
        };
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }

        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{int_part}.{frac_part}")
    }
}

// == Timestamp ==
/// How a [`Timestamp`] relates to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DateTimeKind {
    #[default]
    Unspecified,
    Utc,
    Local,
}

/// Calendar timestamp with 100ns precision between years 1 and 9999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timestamp {
    pub datetime: NaiveDateTime,
    pub kind: DateTimeKind,
}

impl Timestamp {
    pub fn new(datetime: NaiveDateTime, kind: DateTimeKind) -> Self {
        Self { datetime, kind }
    }

    pub fn utc(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime.naive_utc(), DateTimeKind::Utc)
    }

    /// Wall-clock time in the local zone.
    pub fn local(datetime: NaiveDateTime) -> Self {
        Self::new(datetime, DateTimeKind::Local)
    }

    pub fn unspecified(datetime: NaiveDateTime) -> Self {
        Self::new(datetime, DateTimeKind::Unspecified)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::utc(datetime)
    }
}

// == Conversion Traits ==
/// Conversion of a Rust value into a [`CacheValue`] for writing.
pub trait IntoCacheValue {
    fn into_cache_value(self) -> CacheValue;
}

/// A type that can be both written and read back from the cache.
///
/// Borrowed text is write-only, so it cannot be requested on read:
///
/// ```compile_fail
/// fn read_as<T: typed_cache::CacheItem>() {}
/// read_as::<&str>();
/// ```
pub trait CacheItem: IntoCacheValue + Sized {
    /// Fails with [`CacheError::TypeMismatch`] when the value has another type.
    fn from_cache_value(value: CacheValue) -> Result<Self>;

    /// Resolver used when the stored value is an object of this type.
    fn object_resolver() -> Option<ObjectResolver> {
        None
    }
}

impl IntoCacheValue for CacheValue {
    fn into_cache_value(self) -> CacheValue {
        self
    }
}

impl CacheItem for CacheValue {
    fn from_cache_value(value: CacheValue) -> Result<Self> {
        Ok(value)
    }
}

macro_rules! cache_item {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl IntoCacheValue for $ty {
                fn into_cache_value(self) -> CacheValue {
                    CacheValue::$variant(self)
                }
            }

            impl CacheItem for $ty {
                fn from_cache_value(value: CacheValue) -> Result<Self> {
                    match value {
                        CacheValue::$variant(v) => Ok(v),
                        other => Err(CacheError::TypeMismatch {
                            expected: TypeTag::$variant,
                            found: other.tag(),
                        }),
                    }
                }
            }
        )*
    };
}

cache_item! {
    bool => Bool,
    char => Char,
    u8 => Byte,
    i8 => SByte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Single,
    f64 => Double,
    Decimal => Decimal,
    TimeDelta => Duration,
    Timestamp => Timestamp,
    DateTime<FixedOffset> => TimestampOffset,
    Uuid => Guid,
    String => String,
    IpAddr => IpAddress,
    Vec<u8> => Bytes,
}

/// Write-only: borrowed text is read back as `String`.
impl IntoCacheValue for &str {
    fn into_cache_value(self) -> CacheValue {
        CacheValue::String(self.to_owned())
    }
}

// == Object Wrapper ==
/// Marks a [`CacheObject`] for storage through the object codec.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use typed_cache::{CacheObject, CacheValue, IntoCacheValue, Object};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Profile {
///     name: String,
/// }
///
/// impl CacheObject for Profile {
///     const TYPE_NAME: &'static str = "app::Profile";
/// }
///
/// let value = Object(Profile { name: "ada".into() }).into_cache_value();
/// assert!(matches!(value, CacheValue::Object(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Object<T>(pub T);

impl<T: CacheObject> IntoCacheValue for Object<T> {
    fn into_cache_value(self) -> CacheValue {
        CacheValue::object(self.0)
    }
}

impl<T: CacheObject> CacheItem for Object<T> {
    fn from_cache_value(value: CacheValue) -> Result<Self> {
        match value {
            CacheValue::Object(object) => object.downcast::<T>().map(Object),
            other => Err(CacheError::TypeMismatch {
                expected: TypeTag::Object,
                found: other.tag(),
            }),
        }
    }

    fn object_resolver() -> Option<ObjectResolver> {
        Some(ObjectResolver::of::<T>())
    }
}
