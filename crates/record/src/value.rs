use std::rc::Rc;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Tick size of a time leaf.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Granularity {
    Seconds,
    Milliseconds,
    Microseconds,
}

impl Granularity {
    /// Microseconds per tick.
    pub fn micros(self) -> i64 {
        match self {
            Granularity::Seconds => 1_000_000,
            Granularity::Milliseconds => 1_000,
            Granularity::Microseconds => 1,
        }
    }
}

/// Token table of an enumeration leaf. Values are indices into `tokens`.
#[derive(Debug, PartialEq, Eq)]
pub struct EnumDef {
    tokens: Vec<String>,
}

impl EnumDef {
    pub fn new<I, S>(tokens: I) -> Rc<EnumDef>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Rc::new(EnumDef {
            tokens: tokens.into_iter().map(Into::into).collect(),
        })
    }

    pub fn token(&self, value: i64) -> Option<&str> {
        usize::try_from(value)
            .ok()
            .and_then(|i| self.tokens.get(i))
            .map(String::as_str)
    }

    pub fn value(&self, token: &str) -> Option<i64> {
        self.tokens.iter().position(|t| t == token).map(|i| i as i64)
    }
}

/// Declared type of a leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Kind {
    Bool,
    Int,
    UInt,
    Float,
    Str,
    Bytes,
    Time(Granularity),
    Enum(Rc<EnumDef>),
}

/// A typed scalar payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Time(OffsetDateTime),
}

impl Kind {
    /// The value a cleared leaf takes.
    pub fn empty(&self) -> Value {
        match self {
            Kind::Bool => Value::Bool(false),
            Kind::Int | Kind::Enum(_) => Value::Int(0),
            Kind::UInt => Value::UInt(0),
            Kind::Float => Value::Float(0.0),
            Kind::Str => Value::Str(String::new()),
            Kind::Bytes => Value::Bytes(Vec::new()),
            Kind::Time(_) => Value::Time(OffsetDateTime::UNIX_EPOCH),
        }
    }

    /// Whether the textual form is character data (quoted in JSON).
    pub fn is_chartype(&self, compact: bool) -> bool {
        match self {
            Kind::Str | Kind::Bytes | Kind::Time(_) => true,
            Kind::Enum(_) => !compact,
            _ => false,
        }
    }
}

/// Reflective summary of a leaf: classification, numeric bounds, and the
/// current numeric projection where one applies.
#[derive(Debug, Default, Clone)]
pub struct MemberInfo {
    pub is_signed: bool,
    pub is_unsigned: bool,
    pub is_blob: bool,
    pub is_enum: bool,
    pub is_time: bool,
    pub min: i64,
    pub max: u64,
    /// Microseconds per tick for time leaves, 1 otherwise.
    pub granularity: i64,
    pub value_i64: i64,
    pub value_u64: u64,
}

pub(crate) fn mem_info(kind: &Kind, value: &Value) -> MemberInfo {
    let mut mi = MemberInfo {
        granularity: 1,
        ..MemberInfo::default()
    };
    match (kind, value) {
        (Kind::Bool, Value::Bool(b)) => {
            mi.is_unsigned = true;
            mi.max = 1;
            mi.value_u64 = u64::from(*b);
        }
        (Kind::Int, Value::Int(n)) | (Kind::Enum(_), Value::Int(n)) => {
            mi.is_signed = true;
            mi.is_enum = matches!(kind, Kind::Enum(_));
            mi.min = i64::MIN;
            mi.max = i64::MAX as u64;
            mi.value_i64 = *n;
            if *n >= 0 {
                mi.is_unsigned = true;
                mi.value_u64 = *n as u64;
            }
        }
        (Kind::UInt, Value::UInt(n)) => {
            mi.is_unsigned = true;
            mi.max = u64::MAX;
            mi.value_u64 = *n;
        }
        (Kind::Bytes, Value::Bytes(b)) => {
            mi.is_blob = true;
            mi.value_u64 = b.len() as u64;
        }
        (Kind::Time(g), Value::Time(t)) => {
            mi.is_time = true;
            mi.granularity = g.micros();
            mi.value_i64 = time_ticks(t, *g);
        }
        _ => {}
    }
    mi
}

fn time_ticks(t: &OffsetDateTime, g: Granularity) -> i64 {
    (t.unix_timestamp_nanos() / 1_000 / g.micros() as i128) as i64
}

fn time_from_ticks(ticks: i64, g: Granularity) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(ticks as i128 * g.micros() as i128 * 1_000).ok()
}

/// Render a value as text. Compact form prefers numbers over tokens.
pub(crate) fn to_text(kind: &Kind, value: &Value, compact: bool) -> String {
    match (kind, value) {
        (_, Value::Bool(b)) => b.to_string(),
        (Kind::Enum(def), Value::Int(n)) if !compact => def
            .token(*n)
            .map(str::to_string)
            .unwrap_or_else(|| n.to_string()),
        (_, Value::Int(n)) => n.to_string(),
        (_, Value::UInt(n)) => n.to_string(),
        (_, Value::Float(f)) => f.to_string(),
        (_, Value::Str(s)) => s.clone(),
        (_, Value::Bytes(b)) => base64::encode(b),
        (Kind::Time(g), Value::Time(t)) if compact => time_ticks(t, *g).to_string(),
        (_, Value::Time(t)) => t
            .format(&Rfc3339)
            .expect("rfc3339 format always succeeds"),
    }
}

/// Parse text into a value of the given kind. Returns `None` on mismatch.
pub(crate) fn from_text(
    kind: &Kind,
    text: &str,
    accept_compact: bool,
    accept_extended: bool,
) -> Option<Value> {
    match kind {
        Kind::Bool => match text {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "1" if accept_compact => Some(Value::Bool(true)),
            "0" if accept_compact => Some(Value::Bool(false)),
            _ => None,
        },
        Kind::Int => text.parse().ok().map(Value::Int),
        Kind::UInt => text.parse().ok().map(Value::UInt),
        Kind::Float => text.parse().ok().map(Value::Float),
        Kind::Str => Some(Value::Str(text.to_string())),
        Kind::Bytes => base64::decode(text.trim()).ok().map(Value::Bytes),
        Kind::Time(g) => {
            if let Ok(t) = OffsetDateTime::parse(text, &Rfc3339) {
                return Some(Value::Time(t));
            }
            if accept_compact {
                if let Ok(ticks) = text.parse::<i64>() {
                    return time_from_ticks(ticks, *g).map(Value::Time);
                }
            }
            None
        }
        Kind::Enum(def) => {
            if accept_extended {
                if let Some(v) = def.value(text) {
                    return Some(Value::Int(v));
                }
            }
            if accept_compact {
                if let Ok(n) = text.parse::<i64>() {
                    if def.token(n).is_some() {
                        return Some(Value::Int(n));
                    }
                }
            }
            None
        }
    }
}

pub(crate) fn from_i64(kind: &Kind, n: i64) -> Option<Value> {
    match kind {
        Kind::Bool => match n {
            0 => Some(Value::Bool(false)),
            1 => Some(Value::Bool(true)),
            _ => None,
        },
        Kind::Int => Some(Value::Int(n)),
        Kind::Enum(def) => def.token(n).map(|_| Value::Int(n)),
        Kind::UInt => u64::try_from(n).ok().map(Value::UInt),
        Kind::Float => Some(Value::Float(n as f64)),
        Kind::Time(g) => time_from_ticks(n, *g).map(Value::Time),
        _ => None,
    }
}

pub(crate) fn from_u64(kind: &Kind, n: u64) -> Option<Value> {
    match kind {
        Kind::UInt => Some(Value::UInt(n)),
        _ => i64::try_from(n).ok().and_then(|i| from_i64(kind, i)),
    }
}

pub(crate) fn from_f64(kind: &Kind, f: f64) -> Option<Value> {
    match kind {
        Kind::Float => Some(Value::Float(f)),
        Kind::Int | Kind::UInt | Kind::Enum(_) | Kind::Time(_) | Kind::Bool => {
            if f.fract() != 0.0 {
                return None;
            }
            from_i64(kind, f as i64)
        }
        _ => None,
    }
}

pub(crate) fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(n) => Some(*n as f64),
        Value::UInt(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_enum_forms() {
        let def = EnumDef::new(["fax", "sms", "mobile"]);
        let kind = Kind::Enum(def);
        let v = from_text(&kind, "sms", true, true).unwrap();
        assert_eq!(v, Value::Int(1));
        assert_eq!(to_text(&kind, &v, false), "sms");
        assert_eq!(to_text(&kind, &v, true), "1");

        // Compact input only when accepted, and only in range.
        assert_eq!(from_text(&kind, "2", true, false), Some(Value::Int(2)));
        assert_eq!(from_text(&kind, "2", false, true), None);
        assert_eq!(from_text(&kind, "7", true, true), None);
    }

    #[test]
    fn test_time_round_trip() {
        let kind = Kind::Time(Granularity::Seconds);
        let t = datetime!(2021-03-14 15:09:26 UTC);
        let text = to_text(&kind, &Value::Time(t), false);
        assert_eq!(text, "2021-03-14T15:09:26Z");
        assert_eq!(
            from_text(&kind, &text, false, true),
            Some(Value::Time(t))
        );

        let ticks = to_text(&kind, &Value::Time(t), true);
        assert_eq!(from_text(&kind, &ticks, true, false), Some(Value::Time(t)));
    }

    #[test]
    fn test_blob_base64() {
        let v = Value::Bytes(vec![8, 6, 7, 5, 3, 0, 9]);
        let text = to_text(&Kind::Bytes, &v, false);
        assert_eq!(text, "CAYHBQMACQ==");
        assert_eq!(from_text(&Kind::Bytes, &text, true, true), Some(v));
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(from_f64(&Kind::Int, 3.0), Some(Value::Int(3)));
        assert_eq!(from_f64(&Kind::Int, 3.5), None);
        assert_eq!(from_i64(&Kind::UInt, -1), None);
        assert_eq!(from_u64(&Kind::Int, 7), Some(Value::Int(7)));
    }
}
