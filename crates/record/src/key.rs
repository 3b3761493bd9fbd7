use crate::base::Record;
use crate::leaf::LeafField;
use crate::traverse::{TravCtx, VisitConst};
use crate::vector::VectorField;
use crate::Error;

/// Escape a key piece: `\` doubles, `:` is prefixed.
pub(crate) fn escape_colon(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ':' => out.push_str("\\:"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out
}

struct KeyDump {
    first: bool,
    out: String,
    version: Option<i64>,
    err: Option<Error>,
}

impl VisitConst for KeyDump {
    fn with_version_field(&self) -> bool {
        true
    }

    fn obj_begin(&mut self, _: &Record, _: &TravCtx) -> bool {
        true
    }

    fn obj_end(&mut self, _: &Record, _: &TravCtx) {}

    fn array_begin(&mut self, _: &VectorField, _: &TravCtx) -> bool {
        false
    }

    fn array_end(&mut self, _: &VectorField, _: &TravCtx) {}

    fn leaf(&mut self, mem: &LeafField, ctx: &TravCtx) {
        if mem.is_version_field() {
            if self.version.is_none() {
                let mi = mem.mem_info();
                if mi.is_unsigned {
                    if mi.value_u64 > i64::MAX as u64 {
                        self.err = Some(Error::VersionOverflow);
                    } else {
                        self.version = Some(mi.value_u64 as i64);
                    }
                } else if mi.is_signed {
                    self.version = Some(mi.value_i64);
                }
            }
            return;
        }
        if !self.first {
            self.out.push(':');
        }
        self.first = false;
        if !(ctx.in_null() || mem.is_null()) {
            self.out.push_str(&escape_colon(&mem.audit_value()));
        }
    }
}

impl Record {
    /// Colon-joined, escaped projection of the `Key1..Key5` leaves.
    pub fn key_str(&self) -> Result<String, Error> {
        self.key_str_with_version().map(|(key, _)| key)
    }

    /// Key projection plus the version-field sidecar, when one exists.
    pub fn key_str_with_version(&self) -> Result<(String, Option<i64>), Error> {
        let mut kd = KeyDump {
            first: true,
            out: String::new(),
            version: None,
            err: None,
        };
        self.traverse_key(&mut kd);
        if let Some(err) = kd.err {
            return Err(err);
        }
        if kd.first {
            return Err(Error::MissingKey {
                type_name: self.type_name().to_string(),
            });
        }
        Ok((kd.out, kd.version))
    }

    /// Canonical object identifier: escaped type name plus the key string.
    pub fn identifier(&self) -> Result<String, Error> {
        Ok(format!(
            "{}:{}",
            escape_colon(self.type_name()),
            self.key_str()?
        ))
    }

    /// Escape helper for callers assembling identifiers by hand.
    pub fn escape_key(s: &str) -> String {
        escape_colon(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Kind, SchemaFlag, Value};

    #[test]
    fn test_key_escape() {
        let mut thing = Record::build("Thing")
            .leaf("a", Kind::Str, &[SchemaFlag::key(1)])
            .leaf("b", Kind::Str, &[SchemaFlag::key(2)])
            .finish();
        thing.set("a", Value::Str("x:y".into())).unwrap();
        thing.set("b", Value::Str("z\\w".into())).unwrap();
        assert_eq!(thing.key_str().unwrap(), "x\\:y:z\\\\w");
        assert_eq!(thing.identifier().unwrap(), "Thing:x\\:y:z\\\\w");
    }

    #[test]
    fn test_keyless_record_errors() {
        let plain = Record::build("Plain").leaf("a", Kind::Int, &[]).finish();
        match plain.key_str() {
            Err(Error::MissingKey { type_name }) => assert_eq!(type_name, "Plain"),
            other => panic!("expected missing key, got {other:?}"),
        }
    }

    #[test]
    fn test_identifier_stable_under_deep_copy() {
        let mut a = Record::build("Rig")
            .leaf("id", Kind::Int, &[SchemaFlag::key(1)])
            .leaf("typ", Kind::Str, &[])
            .finish();
        a.set_str("id", "12").unwrap();
        let b = a.clone();
        assert_eq!(a.identifier().unwrap(), b.identifier().unwrap());
    }

    #[test]
    fn test_version_field_sidecar() {
        let mut rec = Record::build("Versioned")
            .leaf("id", Kind::Int, &[SchemaFlag::key(1)])
            .leaf("version", Kind::UInt, &[SchemaFlag::VersionField])
            .finish();
        rec.set_str("id", "9").unwrap();
        rec.set_str("version", "4").unwrap();
        let (key, version) = rec.key_str_with_version().unwrap();
        assert_eq!(key, "9");
        assert_eq!(version, Some(4));
        // The version never reaches the identifier.
        assert_eq!(rec.identifier().unwrap(), "Versioned:9");
    }

    #[test]
    fn test_version_overflow() {
        let mut rec = Record::build("Versioned")
            .leaf("id", Kind::Int, &[SchemaFlag::key(1)])
            .leaf("version", Kind::UInt, &[SchemaFlag::VersionField])
            .finish();
        rec.set("version", Value::UInt(u64::MAX)).unwrap();
        match rec.key_str_with_version() {
            Err(Error::VersionOverflow) => {}
            other => panic!("expected overflow, got {other:?}"),
        }
    }

    #[test]
    fn test_null_key_piece_empty() {
        let mut rec = Record::build("Pair")
            .leaf("a", Kind::Str, &[SchemaFlag::key(1), SchemaFlag::InitialNull])
            .leaf("b", Kind::Str, &[SchemaFlag::key(2)])
            .finish();
        rec.set_str("b", "x").unwrap();
        assert_eq!(rec.key_str().unwrap(), ":x");
    }

    #[test]
    fn test_keyed_sub_record() {
        let pos = Record::build("Pos")
            .leaf("lot", Kind::Str, &[SchemaFlag::key(2)])
            .finish();
        let mut rec = Record::build("Slot")
            .leaf("site", Kind::Str, &[SchemaFlag::key(1)])
            .sub("pos", pos, &[SchemaFlag::key(3)])
            .finish();
        rec.set_str("site", "north").unwrap();
        rec.set_str("pos.lot", "b7").unwrap();
        assert_eq!(rec.key_str().unwrap(), "north:b7");
    }
}
