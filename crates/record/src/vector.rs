use crate::base::Child;
use crate::flags::{self, SchemaFlag};

/// An ordered homogeneous sequence of leaves or sub-records.
///
/// Elements grow from a pristine prototype built at declaration time, so
/// an index write beyond the current size fills the gap with defaults.
#[derive(Debug, Clone)]
pub struct VectorField {
    name: String,
    proto: Box<Child>,
    elems: Vec<Child>,
    null: bool,
    null_allowed: bool,
    modified: bool,
    flags: Vec<SchemaFlag>,
}

impl VectorField {
    pub(crate) fn new(name: &str, proto: Child, cfg: &[SchemaFlag]) -> VectorField {
        let mut vec = VectorField {
            name: name.to_string(),
            proto: Box::new(proto),
            elems: Vec::new(),
            null: false,
            null_allowed: false,
            modified: false,
            flags: Vec::new(),
        };
        for f in cfg {
            vec.apply(f);
        }
        vec
    }

    fn apply(&mut self, f: &SchemaFlag) {
        match f {
            SchemaFlag::VectorNull => {
                self.null_allowed = true;
                self.null = true;
            }
            SchemaFlag::Prefix(_)
            | SchemaFlag::ColName(_)
            | SchemaFlag::MaxLength(_)
            | SchemaFlag::DbJson
            | SchemaFlag::XmlEncrypt
            | SchemaFlag::DbDetail
            | SchemaFlag::AltName(_) => self.flags.push(f.clone()),
            _ => {}
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
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

    pub fn has_flag(&self, f: &SchemaFlag) -> bool {
        self.flags.contains(f)
    }

    pub fn alt_name(&self) -> Option<&str> {
        flags::alt_name(&self.flags)
    }

    /// Type name of the element prototype when it is a sub-record.
    pub fn content_type_name(&self) -> Option<&str> {
        match self.proto.as_ref() {
            Child::Sub(r) => Some(r.type_name()),
            _ => None,
        }
    }

    pub fn get(&self, i: usize) -> Option<&Child> {
        self.elems.get(i)
    }

    pub(crate) fn elem_mut(&mut self, i: usize) -> Option<&mut Child> {
        self.elems.get_mut(i)
    }

    pub fn elems(&self) -> &[Child] {
        &self.elems
    }

    /// Grow or shrink to `n` elements; growth clones the prototype.
    /// A size change marks the vector written.
    pub fn resize(&mut self, n: usize) {
        if n == self.elems.len() {
            return;
        }
        if n < self.elems.len() {
            self.elems.truncate(n);
        } else {
            while self.elems.len() < n {
                self.elems.push(self.proto.as_ref().clone());
            }
        }
        self.touch();
    }

    /// Equivalent to `resize(0)`.
    pub fn clear(&mut self) {
        self.resize(0);
    }

    pub fn force_null(&mut self) {
        self.resize(0);
        self.null = true;
        self.modified = true;
    }

    pub fn set_empty(&mut self) {
        self.resize(0);
        self.null = false;
        self.modified = true;
    }

    pub(crate) fn touch(&mut self) {
        self.null = false;
        self.modified = true;
    }
}
