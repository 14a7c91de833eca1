use std::fmt::{Display, Formatter};

use uuid::Uuid;

use crate::archive::consts::*;
use crate::archive::error::*;

/// An intake identifier: `oe` followed by four or five digits. Special collection entries, which
/// start with `scoe`, are accepted as is.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ObjectEntry(String);

/// An accession number: `aaa` followed by exactly four digits
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct AccessionNumber(String);

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PackageKind {
    Sip,
    AipShell,
    Aip,
}

/// True if the value is a hyphenated UUID
pub fn is_uuid(value: &str) -> bool {
    value.len() == UUID_LEN && Uuid::parse_str(value).is_ok()
}

/// A new random hyphenated v4 UUID
pub fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

impl ObjectEntry {
    pub fn parse(value: &str) -> Result<Self> {
        if value.starts_with(SC_OE_PREFIX) {
            return Ok(Self(value.into()));
        }

        match value.strip_prefix(OE_PREFIX) {
            Some(digits) if (4..=5).contains(&digits.len()) && all_digits(digits) => {
                Ok(Self(value.into()))
            }
            _ => Err(Error::InvalidObjectEntry {
                value: value.into(),
            }),
        }
    }

    /// Builds an entry from its number, zero padded to four digits
    pub fn from_number(number: u32) -> Result<Self> {
        Self::parse(&format!("{}{:04}", OE_PREFIX, number))
    }

    /// The numeric part, if there is one
    pub fn number(&self) -> Option<u32> {
        self.0.strip_prefix(OE_PREFIX)?.parse().ok()
    }

    /// The form used in registers: `oe1234` becomes `OE-1234`. Special collections entries are
    /// left as they are.
    pub fn register_form(&self) -> String {
        if self.0.starts_with(SC_OE_PREFIX) {
            return self.0.clone();
        }
        let upper = self.0.to_uppercase();
        format!("{}-{}", &upper[..2], &upper[2..])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AccessionNumber {
    pub fn parse(value: &str) -> Result<Self> {
        match value.strip_prefix(ACCESSION_PREFIX) {
            Some(digits) if digits.len() == 4 && all_digits(digits) => Ok(Self(value.into())),
            _ => Err(Error::InvalidAccessionNumber {
                value: value.into(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PackageKind {
    /// Classifies a package by its container name
    pub fn classify(name: &str) -> Option<Self> {
        if name.starts_with(OE_PREFIX) {
            Some(PackageKind::Sip)
        } else if name.starts_with(ACCESSION_PREFIX) && name.ends_with(SHELL_SUFFIX) {
            Some(PackageKind::AipShell)
        } else if name.starts_with(ACCESSION_PREFIX) {
            Some(PackageKind::Aip)
        } else {
            None
        }
    }

    /// AIPs and AIP shells carry a SHA-512 sidecar as well as an MD5 one
    pub fn is_accessioned(&self) -> bool {
        matches!(self, PackageKind::Aip | PackageKind::AipShell)
    }
}

impl Display for ObjectEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for AccessionNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for PackageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PackageKind::Sip => "SIP",
            PackageKind::AipShell => "AIP shell",
            PackageKind::Aip => "AIP",
        };
        write!(f, "{}", name)
    }
}

fn all_digits(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use crate::archive::identifiers::*;

    #[test]
    fn object_entries() {
        assert!(ObjectEntry::parse("oe1234").is_ok());
        assert!(ObjectEntry::parse("oe12345").is_ok());
        assert!(ObjectEntry::parse("scoe_anything").is_ok());
        assert!(ObjectEntry::parse("oe123").is_err());
        assert!(ObjectEntry::parse("oe123456").is_err());
        assert!(ObjectEntry::parse("oe12a4").is_err());
        assert!(ObjectEntry::parse("OE1234").is_err());

        let oe = ObjectEntry::parse("oe1234").unwrap();
        assert_eq!("OE-1234", oe.register_form());
        assert_eq!(
            "scoe_box3",
            ObjectEntry::parse("scoe_box3").unwrap().register_form()
        );
        assert_eq!(Some(1234), oe.number());
        assert_eq!("oe0042", ObjectEntry::from_number(42).unwrap().as_str());
    }

    #[test]
    fn accession_numbers() {
        assert!(AccessionNumber::parse("aaa0001").is_ok());
        assert!(AccessionNumber::parse("aaa00001").is_err());
        assert!(AccessionNumber::parse("aa0001").is_err());
        assert!(AccessionNumber::parse("aaa00a1").is_err());
    }

    #[test]
    fn uuids() {
        assert!(is_uuid(&new_uuid()));
        assert!(is_uuid("0c2b3d1e-7b6c-4a55-9a2a-4f1b0a3c9d10"));
        assert!(!is_uuid("0c2b3d1e7b6c4a559a2a4f1b0a3c9d10"));
        assert!(!is_uuid("objects"));
    }

    #[test]
    fn package_kinds() {
        assert_eq!(Some(PackageKind::Sip), PackageKind::classify("oe1234"));
        assert_eq!(Some(PackageKind::Aip), PackageKind::classify("aaa0001"));
        assert_eq!(
            Some(PackageKind::AipShell),
            PackageKind::classify("aaa0001_shell")
        );
        assert_eq!(None, PackageKind::classify("raw_material"));
        assert_eq!("AIP shell", PackageKind::AipShell.to_string());
    }
}
