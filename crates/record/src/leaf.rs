use crate::flags::{self, SchemaFlag};
use crate::value::{self, Kind, MemberInfo, Value};
use crate::{Error, ParsePolicy};

/// A typed scalar child of a record or vector element slot.
#[derive(Debug, Clone)]
pub struct LeafField {
    name: String,
    kind: Kind,
    value: Value,
    null: bool,
    null_allowed: bool,
    modified: bool,
    key: u32,
    flags: Vec<SchemaFlag>,
    save_old: bool,
    old: Option<(String, bool)>,
}

impl LeafField {
    pub(crate) fn new(name: &str, kind: Kind, cfg: &[SchemaFlag]) -> LeafField {
        let mut leaf = LeafField {
            name: name.to_string(),
            value: kind.empty(),
            kind,
            null: false,
            null_allowed: false,
            modified: false,
            key: 0,
            flags: Vec::new(),
            save_old: false,
            old: None,
        };
        for f in cfg {
            leaf.apply(f);
        }
        leaf
    }

    fn apply(&mut self, f: &SchemaFlag) {
        match f {
            SchemaFlag::InitialNull => {
                self.null_allowed = true;
                self.null = true;
            }
            SchemaFlag::Key(n) => self.key = u32::from(*n),
            SchemaFlag::VersionField => self.key = flags::VERSION_POS,
            SchemaFlag::XmlAsAttr
            | SchemaFlag::DbCompact
            | SchemaFlag::XmlEncrypt
            | SchemaFlag::MaxLength(_)
            | SchemaFlag::AltName(_) => self.flags.push(f.clone()),
            _ => {}
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_null(&self) -> bool {
        self.null
    }

    pub fn null_allowed(&self) -> bool {
        self.null_allowed
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, m: bool) {
        self.modified = m;
    }

    /// Position within the key projection, 0 when not a key element.
    pub fn key_pos(&self) -> u32 {
        self.key
    }

    pub fn is_version_field(&self) -> bool {
        self.key == flags::VERSION_POS
    }

    pub fn has_flag(&self, f: &SchemaFlag) -> bool {
        self.flags.contains(f)
    }

    pub fn alt_name(&self) -> Option<&str> {
        flags::alt_name(&self.flags)
    }

    pub fn max_length(&self) -> Option<u16> {
        flags::max_length(&self.flags)
    }

    fn is_compact(&self) -> bool {
        self.has_flag(&SchemaFlag::DbCompact)
    }

    pub fn to_text(&self, compact: bool) -> String {
        value::to_text(&self.kind, &self.value, compact)
    }

    /// Whether the serialized form is character data (quoted in JSON).
    pub fn is_chartype(&self, compact: bool) -> bool {
        self.kind.is_chartype(compact)
    }

    /// Compact textual form used for keys and audit trails; empty when null.
    pub fn audit_value(&self) -> String {
        if self.null {
            String::new()
        } else {
            self.to_text(self.is_compact())
        }
    }

    pub fn mem_info(&self) -> MemberInfo {
        value::mem_info(&self.kind, &self.value)
    }

    pub fn to_f64(&self) -> Option<f64> {
        value::to_f64(&self.value)
    }

    fn coercion_error(&self, text: &str) -> Error {
        Error::Coercion {
            field: self.name.clone(),
            value: text.to_string(),
        }
    }

    pub fn from_text(&mut self, text: &str, p: &ParsePolicy) -> Result<(), Error> {
        if matches!(self.kind, Kind::Str) {
            if let Some(max) = self.max_length() {
                if text.chars().count() > usize::from(max) {
                    return Err(self.coercion_error(text));
                }
            }
        }
        let v = value::from_text(&self.kind, text, p.accept_compact, p.accept_extended)
            .ok_or_else(|| self.coercion_error(text))?;
        self.write(v);
        Ok(())
    }

    pub fn from_i64(&mut self, n: i64) -> Result<(), Error> {
        let v = value::from_i64(&self.kind, n).ok_or_else(|| self.coercion_error(&n.to_string()))?;
        self.write(v);
        Ok(())
    }

    pub fn from_u64(&mut self, n: u64) -> Result<(), Error> {
        let v = value::from_u64(&self.kind, n).ok_or_else(|| self.coercion_error(&n.to_string()))?;
        self.write(v);
        Ok(())
    }

    pub fn from_f64(&mut self, f: f64) -> Result<(), Error> {
        let v = value::from_f64(&self.kind, f).ok_or_else(|| self.coercion_error(&f.to_string()))?;
        self.write(v);
        Ok(())
    }

    /// Typed assignment. Numeric payloads cross-coerce; anything else must
    /// match the declared kind.
    pub fn set(&mut self, v: Value) -> Result<(), Error> {
        let kind = self.kind.clone();
        match (kind, v) {
            (Kind::Bool, Value::Bool(b)) => self.write(Value::Bool(b)),
            (Kind::Int, Value::Int(n)) | (Kind::Enum(_), Value::Int(n)) => {
                return self.from_i64(n);
            }
            (Kind::UInt, Value::UInt(n)) => self.write(Value::UInt(n)),
            (Kind::Float, Value::Float(f)) => self.write(Value::Float(f)),
            (Kind::Str, Value::Str(s)) => {
                if let Some(max) = self.max_length() {
                    if s.chars().count() > usize::from(max) {
                        return Err(self.coercion_error(&s));
                    }
                }
                self.write(Value::Str(s));
            }
            (Kind::Bytes, Value::Bytes(b)) => self.write(Value::Bytes(b)),
            (Kind::Time(_), Value::Time(t)) => self.write(Value::Time(t)),
            (_, Value::Int(n)) => return self.from_i64(n),
            (_, Value::UInt(n)) => return self.from_u64(n),
            (_, Value::Float(f)) => return self.from_f64(f),
            (kind, v) => {
                let text = value::to_text(&kind, &v, true);
                return Err(self.coercion_error(&text));
            }
        }
        Ok(())
    }

    fn write(&mut self, v: Value) {
        self.audit_snapshot();
        self.value = v;
        self.null = false;
        self.modified = true;
    }

    /// Reset to the empty value; nullable leaves become null.
    pub fn clear(&mut self) {
        self.audit_snapshot();
        self.value = self.kind.empty();
        self.null = self.null_allowed;
        self.modified = true;
    }

    pub fn force_null(&mut self) {
        self.audit_snapshot();
        self.value = self.kind.empty();
        self.null = true;
        self.modified = true;
    }

    pub fn set_empty(&mut self) {
        self.audit_snapshot();
        self.value = self.kind.empty();
        self.null = false;
        self.modified = true;
    }

    /// Mark written without touching the payload.
    pub(crate) fn touch(&mut self) {
        self.null = false;
        self.modified = true;
    }

    /// Arm the audit snapshot; the next mutation captures the old value.
    pub(crate) fn start_audit(&mut self) {
        self.save_old = true;
        self.modified = false;
    }

    fn audit_snapshot(&mut self) {
        if self.save_old {
            self.old = Some((self.audit_value(), self.null));
            self.save_old = false;
        }
    }

    /// Value and null flag at the time the audit was started.
    pub fn initial_value(&self) -> (String, bool) {
        if self.save_old {
            (self.audit_value(), self.null)
        } else {
            self.old.clone().unwrap_or_default()
        }
    }

    /// Same-kind fast copy. Returns false when the kinds differ and the
    /// caller must fall back to the textual path.
    pub(crate) fn copy_from(&mut self, other: &LeafField) -> bool {
        if self.kind != other.kind {
            return false;
        }
        if other.null {
            self.force_null();
        } else {
            self.write(other.value.clone());
        }
        true
    }

    /// Same-kind copy that leaves an equal destination untouched.
    /// Returns false when the kinds differ.
    pub(crate) fn compare_and_copy(&mut self, other: &LeafField) -> bool {
        if self.kind != other.kind {
            return false;
        }
        if self.null == other.null && self.value == other.value {
            return true;
        }
        if other.null {
            self.force_null();
        } else {
            self.write(other.value.clone());
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::EnumDef;

    #[test]
    fn test_initial_null() {
        let leaf = LeafField::new("axles", Kind::Int, &[SchemaFlag::InitialNull]);
        assert!(leaf.is_null());
        assert!(leaf.null_allowed());
        assert!(!leaf.is_modified());
    }

    #[test]
    fn test_write_discipline() {
        let mut leaf = LeafField::new("axles", Kind::Int, &[SchemaFlag::InitialNull]);
        leaf.from_text("2", &ParsePolicy::default()).unwrap();
        assert!(!leaf.is_null());
        assert!(leaf.is_modified());
        assert_eq!(leaf.to_text(false), "2");

        leaf.force_null();
        assert!(leaf.is_null());
        assert_eq!(leaf.audit_value(), "");
    }

    #[test]
    fn test_audit_snapshot_on_first_mutation() {
        let mut leaf = LeafField::new("name", Kind::Str, &[]);
        leaf.set(Value::Str("before".into())).unwrap();
        leaf.start_audit();
        assert_eq!(leaf.initial_value(), ("before".to_string(), false));

        leaf.set(Value::Str("after".into())).unwrap();
        leaf.set(Value::Str("later".into())).unwrap();
        assert_eq!(leaf.initial_value(), ("before".to_string(), false));
    }

    #[test]
    fn test_compare_and_copy_keeps_equal_destination() {
        let mut a = LeafField::new("t", Kind::Str, &[]);
        let mut b = LeafField::new("t", Kind::Str, &[]);
        a.set(Value::Str("same".into())).unwrap();
        b.set(Value::Str("same".into())).unwrap();
        b.set_modified(false);
        assert!(b.compare_and_copy(&a));
        assert!(!b.is_modified());
    }

    #[test]
    fn test_enum_leaf_compact_flag() {
        let def = EnumDef::new(["off", "on"]);
        let mut leaf = LeafField::new(
            "state",
            Kind::Enum(def),
            &[SchemaFlag::DbCompact],
        );
        leaf.from_i64(1).unwrap();
        assert_eq!(leaf.audit_value(), "1");
        assert_eq!(leaf.to_text(false), "on");
    }

    #[test]
    fn test_max_length_rejects() {
        let mut leaf = LeafField::new("code", Kind::Str, &[SchemaFlag::max_length(3)]);
        assert!(leaf.from_text("abc", &ParsePolicy::default()).is_ok());
        assert!(leaf.from_text("abcd", &ParsePolicy::default()).is_err());
    }
}
