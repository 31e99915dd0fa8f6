use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;

/// METS namespace.
pub const METS_NS: &str = "http://www.loc.gov/METS/";
/// XLink namespace used for hrefs and titles.
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
/// Namespace of audit record elements.
pub const AUDIT_NS: &str = "info:fedora/fedora-system:def/audit#";

/// Structural document formats the codec understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentFormat {
    /// METS with the repository's extension profile.
    Mets,
}

impl DocumentFormat {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mets => "metslikefedora1",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DocumentFormat {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "metslikefedora1" | "mets" | "mets11fedora1" => Ok(Self::Mets),
            _ => Err(CodecError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Reject any character encoding other than UTF-8.
pub fn check_encoding(encoding: &str) -> Result<(), CodecError> {
    match encoding.to_ascii_uppercase().as_str() {
        "UTF-8" | "UTF8" => Ok(()),
        _ => Err(CodecError::UnsupportedEncoding(encoding.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_parse() {
        assert_eq!("METS".parse::<DocumentFormat>().unwrap(), DocumentFormat::Mets);
        assert_eq!(
            DocumentFormat::Mets.name().parse::<DocumentFormat>().unwrap(),
            DocumentFormat::Mets
        );
        assert!(matches!(
            "foxml1.0".parse::<DocumentFormat>(),
            Err(CodecError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn only_utf8_is_accepted() {
        assert!(check_encoding("UTF-8").is_ok());
        assert!(check_encoding("utf8").is_ok());
        assert!(matches!(
            check_encoding("ISO-8859-1"),
            Err(CodecError::UnsupportedEncoding(_))
        ));
    }
}
