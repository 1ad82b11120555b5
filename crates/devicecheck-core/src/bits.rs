//! The two per-device bits and how callers set them
//!
//! Updates are tri-state per bit: set, cleared, or left untouched. An omitted
//! bit is never sent, so Apple keeps whatever value it already stores.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Conversion of boolean-like values into a bit
///
/// - `bool` passes through
/// - integers are `true` when non-zero
/// - strings are `false` when, trimmed and ignoring case, they are empty,
///   `"0"`, `"false"`, `"no"` or `"off"`; any other string is `true`
pub trait IntoBit {
    fn into_bit(self) -> bool;
}

impl IntoBit for bool {
    fn into_bit(self) -> bool {
        self
    }
}

macro_rules! int_into_bit {
    ($($t:ty),*) => {
        $(
            impl IntoBit for $t {
                fn into_bit(self) -> bool {
                    self != 0
                }
            }
        )*
    };
}

int_into_bit!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

impl IntoBit for &str {
    fn into_bit(self) -> bool {
        !matches!(
            self.trim().to_ascii_lowercase().as_str(),
            "" | "0" | "false" | "no" | "off"
        )
    }
}

impl IntoBit for String {
    fn into_bit(self) -> bool {
        self.as_str().into_bit()
    }
}

impl IntoBit for &String {
    fn into_bit(self) -> bool {
        self.as_str().into_bit()
    }
}

/// Bits to write in an update; `None` leaves the stored bit unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitsUpdate {
    #[serde(rename = "bit0", skip_serializing_if = "Option::is_none")]
    pub bit_0: Option<bool>,
    #[serde(rename = "bit1", skip_serializing_if = "Option::is_none")]
    pub bit_1: Option<bool>,
}

impl BitsUpdate {
    /// An update that sets nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the first bit
    pub fn bit_0(mut self, value: impl IntoBit) -> Self {
        self.bit_0 = Some(value.into_bit());
        self
    }

    /// Set the second bit
    pub fn bit_1(mut self, value: impl IntoBit) -> Self {
        self.bit_1 = Some(value.into_bit());
        self
    }

    /// Build from optional inputs, where `None` means "omit"
    pub fn from_options<A: IntoBit, B: IntoBit>(bit_0: Option<A>, bit_1: Option<B>) -> Self {
        Self {
            bit_0: bit_0.map(IntoBit::into_bit),
            bit_1: bit_1.map(IntoBit::into_bit),
        }
    }

    /// True when neither bit is set
    pub fn is_empty(&self) -> bool {
        self.bit_0.is_none() && self.bit_1.is_none()
    }
}

/// Two bits as stored by Apple for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitsState {
    #[serde(rename = "bit0")]
    pub bit_0: bool,
    #[serde(rename = "bit1")]
    pub bit_1: bool,
    /// Month of the last modification as `YYYY-MM`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
}

impl BitsState {
    /// First day of the month of the last modification
    pub fn last_update_month(&self) -> Option<NaiveDate> {
        let month = self.last_update_time.as_deref()?;
        NaiveDate::parse_from_str(&format!("{}-01", month.trim()), "%Y-%m-%d").ok()
    }
}
