// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Typed attribute values.

use std::fmt::Display;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Storage kind of an attribute, as declared in the schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
pub enum FieldKind {
    Text,
    U8,
    U16,
    U32,
    U64,
    Ipv4,
    Ipv6,
    Mac,
    Bool,
}

/// An Ethernet MAC address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MacAddr(pub [u8; 6]);

impl Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// The value of one attribute of a row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldValue {
    Text(String),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Mac(MacAddr),
    Bool(bool),
}

impl FieldValue {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }

    #[must_use]
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::U8(_) => FieldKind::U8,
            FieldValue::U16(_) => FieldKind::U16,
            FieldValue::U32(_) => FieldKind::U32,
            FieldValue::U64(_) => FieldKind::U64,
            FieldValue::Ipv4(_) => FieldKind::Ipv4,
            FieldValue::Ipv6(_) => FieldKind::Ipv6,
            FieldValue::Mac(_) => FieldKind::Mac,
            FieldValue::Bool(_) => FieldKind::Bool,
        }
    }

    /// Tell if this value can be stored in a column of the given kind and width.
    /// Text must be non-empty and at most `width` bytes long.
    #[must_use]
    pub fn fits(&self, kind: FieldKind, width: usize) -> bool {
        match self {
            FieldValue::Text(s) => kind == FieldKind::Text && !s.is_empty() && s.len() <= width,
            other => other.kind() == kind,
        }
    }

    /// The default value of a column of the given kind, used when a row lacks the column.
    #[must_use]
    pub fn default_of(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Text => FieldValue::Text(String::new()),
            FieldKind::U8 => FieldValue::U8(0),
            FieldKind::U16 => FieldValue::U16(0),
            FieldKind::U32 => FieldValue::U32(0),
            FieldKind::U64 => FieldValue::U64(0),
            FieldKind::Ipv4 => FieldValue::Ipv4(Ipv4Addr::UNSPECIFIED),
            FieldKind::Ipv6 => FieldValue::Ipv6(Ipv6Addr::UNSPECIFIED),
            FieldKind::Mac => FieldValue::Mac(MacAddr::default()),
            FieldKind::Bool => FieldValue::Bool(false),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u8(&self) -> Option<u8> {
        match self {
            FieldValue::U8(v) => Some(*v),
            _ => None,
        }
    }

    /// Widen any unsigned integer value to `u64`.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::U8(v) => Some(u64::from(*v)),
            FieldValue::U16(v) => Some(u64::from(*v)),
            FieldValue::U32(v) => Some(u64::from(*v)),
            FieldValue::U64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::U8(v) => write!(f, "{v}"),
            FieldValue::U16(v) => write!(f, "{v}"),
            FieldValue::U32(v) => write!(f, "{v}"),
            FieldValue::U64(v) => write!(f, "{v}"),
            FieldValue::Ipv4(a) => write!(f, "{a}"),
            FieldValue::Ipv6(a) => write!(f, "{a}"),
            FieldValue::Mac(m) => write!(f, "{m}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_owned())
    }
}
impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}
impl From<u8> for FieldValue {
    fn from(v: u8) -> Self {
        FieldValue::U8(v)
    }
}
impl From<u16> for FieldValue {
    fn from(v: u16) -> Self {
        FieldValue::U16(v)
    }
}
impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::U32(v)
    }
}
impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::U64(v)
    }
}
impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}
impl From<Ipv4Addr> for FieldValue {
    fn from(a: Ipv4Addr) -> Self {
        FieldValue::Ipv4(a)
    }
}
impl From<MacAddr> for FieldValue {
    fn from(m: MacAddr) -> Self {
        FieldValue::Mac(m)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn text_width_is_enforced() {
        let v = FieldValue::text("vtn1");
        assert!(v.fits(FieldKind::Text, 31));
        assert!(!v.fits(FieldKind::Text, 3));
        assert!(!FieldValue::text("").fits(FieldKind::Text, 31));
        assert!(!v.fits(FieldKind::U32, 31));
        assert!(FieldValue::U16(4).fits(FieldKind::U16, 0));
    }

    #[test]
    fn integers_widen() {
        assert_eq!(FieldValue::U8(7).as_u64(), Some(7));
        assert_eq!(FieldValue::U64(u64::MAX).as_u32(), None);
        assert_eq!(FieldValue::text("x").as_u64(), None);
    }

    #[test]
    fn mac_display() {
        let mac = MacAddr([0, 0x11, 0x22, 0xaa, 0xbb, 0xff]);
        assert_eq!(mac.to_string(), "00:11:22:aa:bb:ff");
    }
}
