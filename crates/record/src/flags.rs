/// A single schema declaration option attached to a leaf, sub-record, or
/// vector at construction time.
///
/// String- and length-valued options carry their payload directly; the
/// element that declares them owns the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaFlag {
    /// Pre-initialize the element as null and allow null assignment.
    InitialNull,
    /// Pre-initialize the vector itself as null and allow null assignment.
    VectorNull,
    /// Emit the leaf as an XML attribute while the writer still accepts one.
    XmlAsAttr,
    /// Serialize the sub-record's children flat at the parent's level.
    Embedded,
    /// Prefer the compact value form (numeric enums, epoch times).
    DbCompact,
    /// Store the sub-element in a detail table.
    DbDetail,
    /// Keep an audit trail for the record.
    DbAuditTrail,
    /// Store the sub-element as a single JSON column.
    DbJson,
    /// Use the record's type name as the XML root element name.
    OTypeAsXRoot,
    /// Encrypt the element's XML scope.
    XmlEncrypt,
    /// Key position 1..=5 within the record's key projection.
    Key(u8),
    /// Numeric version field; excluded from the key projection.
    VersionField,
    /// Alternative serialized name, selectable via conversion hints.
    AltName(String),
    /// Collection (table) name override.
    ColName(String),
    /// Prefix prepended to serialized names below an embedded sub-record.
    Prefix(String),
    /// Maximum string length, within [1, 9999].
    MaxLength(u16),
}

impl SchemaFlag {
    pub fn key(pos: u8) -> SchemaFlag {
        SchemaFlag::Key(pos.clamp(1, 5))
    }

    pub fn alt_name(name: &str) -> SchemaFlag {
        SchemaFlag::AltName(name.to_string())
    }

    pub fn col_name(name: &str) -> SchemaFlag {
        SchemaFlag::ColName(name.to_string())
    }

    pub fn prefix(token: &str) -> SchemaFlag {
        SchemaFlag::Prefix(token.to_string())
    }

    /// Lengths outside the representable band clip to its edges.
    pub fn max_length(len: usize) -> SchemaFlag {
        SchemaFlag::MaxLength(len.clamp(1, 9999) as u16)
    }
}

/// Key position reserved for version fields.
pub(crate) const VERSION_POS: u32 = u32::MAX;

pub(crate) fn alt_name(flags: &[SchemaFlag]) -> Option<&str> {
    flags.iter().find_map(|f| match f {
        SchemaFlag::AltName(s) => Some(s.as_str()),
        _ => None,
    })
}

pub(crate) fn col_name(flags: &[SchemaFlag]) -> Option<&str> {
    flags.iter().find_map(|f| match f {
        SchemaFlag::ColName(s) => Some(s.as_str()),
        _ => None,
    })
}

pub(crate) fn prefix(flags: &[SchemaFlag]) -> Option<&str> {
    flags.iter().find_map(|f| match f {
        SchemaFlag::Prefix(s) => Some(s.as_str()),
        _ => None,
    })
}

pub(crate) fn max_length(flags: &[SchemaFlag]) -> Option<u16> {
    flags.iter().find_map(|f| match f {
        SchemaFlag::MaxLength(n) => Some(*n),
        _ => None,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_max_length_clips() {
        assert_eq!(SchemaFlag::max_length(0), SchemaFlag::MaxLength(1));
        assert_eq!(SchemaFlag::max_length(40), SchemaFlag::MaxLength(40));
        assert_eq!(SchemaFlag::max_length(123456), SchemaFlag::MaxLength(9999));
    }

    #[test]
    fn test_key_band() {
        assert_eq!(SchemaFlag::key(0), SchemaFlag::Key(1));
        assert_eq!(SchemaFlag::key(3), SchemaFlag::Key(3));
        assert_eq!(SchemaFlag::key(9), SchemaFlag::Key(5));
    }
}
