use crate::flags::{self, SchemaFlag};
use crate::leaf::LeafField;
use crate::navigate::{self, Idx, Navigator};
use crate::traverse::{TravCtx, VisitMut};
use crate::vector::VectorField;
use crate::{Error, Kind, ParsePolicy, Value};

/// One child slot of a record. Exactly one variant is set per slot and the
/// slot never changes shape after construction.
#[derive(Debug, Clone)]
pub enum Child {
    Leaf(LeafField),
    Sub(Record),
    Vector(VectorField),
}

/// One step of a node address beneath a record.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Step {
    /// Index into a record's children.
    Child(usize),
    /// Index into a vector's elements.
    Elem(usize),
}

/// A path of steps addressing a node beneath a record.
pub type Addr = Vec<Step>;

/// Shared view of an addressed node.
pub enum Node<'a> {
    Rec(&'a Record),
    Leaf(&'a LeafField),
    Vector(&'a VectorField),
}

/// Mutable view of an addressed node.
pub enum NodeMut<'a> {
    Rec(&'a mut Record),
    Leaf(&'a mut LeafField),
    Vector(&'a mut VectorField),
}

/// A named composite with ordered, introspectable children.
///
/// Children are appended by the builder at construction and never reordered;
/// traversal order is declaration order.
#[derive(Debug, Clone)]
pub struct Record {
    type_name: String,
    name: String,
    pub(crate) children: Vec<Child>,
    pub(crate) null: bool,
    pub(crate) null_allowed: bool,
    pub(crate) modified: bool,
    key: u32,
    flags: Vec<SchemaFlag>,
}

#[derive(Copy, Clone)]
pub(crate) enum ResolveKind {
    Vector,
    Sub,
    Leaf,
}

impl Record {
    pub fn build(type_name: &str) -> RecordBuilder {
        RecordBuilder {
            rec: Record {
                type_name: type_name.to_string(),
                name: String::new(),
                children: Vec::new(),
                null: false,
                null_allowed: false,
                modified: false,
                key: 0,
                flags: Vec::new(),
            },
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[Child] {
        &self.children
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

    /// Position within the parent's key projection, 0 when not keyed.
    pub fn key_pos(&self) -> u32 {
        self.key
    }

    pub fn has_flag(&self, f: &SchemaFlag) -> bool {
        self.flags.contains(f)
    }

    pub fn is_embedded(&self) -> bool {
        self.has_flag(&SchemaFlag::Embedded)
    }

    pub fn alt_name(&self) -> Option<&str> {
        flags::alt_name(&self.flags)
    }

    pub fn col_name(&self) -> Option<&str> {
        flags::col_name(&self.flags)
    }

    pub fn prefix_token(&self) -> Option<&str> {
        flags::prefix(&self.flags)
    }

    fn apply_member_flag(&mut self, f: &SchemaFlag) {
        match f {
            SchemaFlag::Embedded
            | SchemaFlag::Prefix(_)
            | SchemaFlag::MaxLength(_)
            | SchemaFlag::DbJson
            | SchemaFlag::XmlEncrypt
            | SchemaFlag::DbDetail
            | SchemaFlag::AltName(_) => self.flags.push(f.clone()),
            SchemaFlag::InitialNull => self.null_allowed = true,
            SchemaFlag::Key(n) => self.key = u32::from(*n),
            _ => {}
        }
    }

    // ---- addressing ----

    pub fn node(&self, addr: &[Step]) -> Option<Node<'_>> {
        let mut cur = Node::Rec(self);
        for step in addr {
            cur = match (cur, *step) {
                (Node::Rec(r), Step::Child(i)) => child_node(r.children.get(i)?),
                (Node::Vector(v), Step::Elem(i)) => child_node(v.get(i)?),
                _ => return None,
            };
        }
        Some(cur)
    }

    pub fn node_mut(&mut self, addr: &[Step]) -> Option<NodeMut<'_>> {
        let mut cur = NodeMut::Rec(self);
        for step in addr {
            cur = match (cur, *step) {
                (NodeMut::Rec(r), Step::Child(i)) => child_node_mut(r.children.get_mut(i)?),
                (NodeMut::Vector(v), Step::Elem(i)) => child_node_mut(v.elem_mut(i)?),
                _ => return None,
            };
        }
        Some(cur)
    }

    pub(crate) fn record_at(&self, addr: &[Step]) -> Option<&Record> {
        match self.node(addr)? {
            Node::Rec(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn leaf_at_mut(&mut self, addr: &[Step]) -> Option<&mut LeafField> {
        match self.node_mut(addr)? {
            NodeMut::Leaf(m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn vector_at_mut(&mut self, addr: &[Step]) -> Option<&mut VectorField> {
        match self.node_mut(addr)? {
            NodeMut::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Mark every node along the address written: non-null and modified.
    pub(crate) fn activate_along(&mut self, addr: &[Step]) {
        self.null = false;
        self.modified = true;
        let mut cur = NodeMut::Rec(self);
        for step in addr {
            let next = match (cur, *step) {
                (NodeMut::Rec(r), Step::Child(i)) => match r.children.get_mut(i) {
                    Some(c) => child_node_mut(c),
                    None => return,
                },
                (NodeMut::Vector(v), Step::Elem(i)) => match v.elem_mut(i) {
                    Some(c) => child_node_mut(c),
                    None => return,
                },
                _ => return,
            };
            match next {
                NodeMut::Rec(r) => {
                    r.null = false;
                    r.modified = true;
                    cur = NodeMut::Rec(r);
                }
                NodeMut::Vector(v) => {
                    v.touch();
                    cur = NodeMut::Vector(v);
                }
                NodeMut::Leaf(m) => {
                    m.touch();
                    return;
                }
            }
        }
    }

    // ---- name resolution (navigator and path queries) ----

    /// Find a child by serialized name, descending through embedded
    /// sub-records with prefix stripping. Returns the relative address.
    pub(crate) fn resolve(
        &self,
        name: &str,
        p: &ParsePolicy,
        want: ResolveKind,
    ) -> Option<Addr> {
        for (i, c) in self.children.iter().enumerate() {
            let hit = match (want, c) {
                (ResolveKind::Vector, Child::Vector(v)) => {
                    name_matches(v.name(), v.alt_name(), name, p)
                }
                (ResolveKind::Sub, Child::Sub(r)) => {
                    name_matches(r.name(), r.alt_name(), name, p)
                }
                (ResolveKind::Leaf, Child::Leaf(m)) => {
                    name_matches(m.name(), m.alt_name(), name, p)
                }
                _ => false,
            };
            if hit {
                return Some(vec![Step::Child(i)]);
            }
        }
        for (i, c) in self.children.iter().enumerate() {
            let Child::Sub(r) = c else { continue };
            if !r.is_embedded() {
                continue;
            }
            let stripped = match r.prefix_token() {
                Some(pfx) if !pfx.is_empty() => match strip_name_prefix(name, pfx, p) {
                    Some(rest) => rest,
                    None => continue,
                },
                _ => name,
            };
            if let Some(rel) = r.resolve(stripped, p, want) {
                let mut addr = vec![Step::Child(i)];
                addr.extend(rel);
                return Some(addr);
            }
        }
        None
    }

    // ---- structural operations ----

    fn clear_children(&mut self) {
        for c in &mut self.children {
            match c {
                Child::Leaf(m) => m.clear(),
                Child::Sub(r) => r.clear(),
                Child::Vector(v) => v.clear(),
            }
        }
    }

    /// Reset every child to its declaration state and mark this record
    /// written.
    pub fn clear(&mut self) {
        self.clear_children();
        self.null = false;
        self.modified = true;
    }

    pub fn force_null(&mut self) {
        self.clear_children();
        self.null = true;
        self.modified = true;
    }

    pub fn set_empty(&mut self) {
        self.clear_children();
        self.null = false;
        self.modified = true;
    }

    /// Drop every modified flag in the tree.
    pub fn clear_modified(&mut self) {
        struct ClearModified;
        impl VisitMut for ClearModified {
            fn obj_begin(&mut self, rec: &mut Record, _: &TravCtx) -> bool {
                rec.set_modified(false);
                true
            }
            fn obj_end(&mut self, _: &mut Record, _: &TravCtx) {}
            fn array_begin(&mut self, _: &mut VectorField, _: &TravCtx) -> bool {
                true
            }
            fn array_end(&mut self, vec: &mut VectorField, _: &TravCtx) {
                vec.set_modified(false);
            }
            fn leaf(&mut self, mem: &mut LeafField, _: &TravCtx) {
                mem.set_modified(false);
            }
        }
        self.traverse_mut(&mut ClearModified);
    }

    /// Clear modified flags and arm every leaf's audit snapshot.
    pub fn start_audit(&mut self) {
        struct StartAudit;
        impl VisitMut for StartAudit {
            fn obj_begin(&mut self, rec: &mut Record, _: &TravCtx) -> bool {
                rec.set_modified(false);
                true
            }
            fn obj_end(&mut self, _: &mut Record, _: &TravCtx) {}
            fn array_begin(&mut self, _: &mut VectorField, _: &TravCtx) -> bool {
                true
            }
            fn array_end(&mut self, vec: &mut VectorField, _: &TravCtx) {
                vec.set_modified(false);
            }
            fn leaf(&mut self, mem: &mut LeafField, _: &TravCtx) {
                mem.start_audit();
            }
        }
        self.traverse_mut(&mut StartAudit);
    }

    /// Positional copy between structurally identical declarations.
    pub fn do_copy(&mut self, other: &Record) -> Result<(), Error> {
        if self.type_name != other.type_name {
            return Err(Error::TypeMismatch {
                expect: self.type_name.clone(),
                got: other.type_name.clone(),
            });
        }
        if other.null {
            self.force_null();
            return Ok(());
        }
        if self.children.len() != other.children.len() {
            return Err(Error::StructureMismatch {
                index: self.children.len().min(other.children.len()),
            });
        }
        for (i, (dst, src)) in self.children.iter_mut().zip(&other.children).enumerate() {
            match (dst, src) {
                (Child::Leaf(d), Child::Leaf(s)) => leaf_copy(d, s)?,
                (Child::Vector(d), Child::Vector(s)) => vector_copy(d, s)?,
                (Child::Sub(d), Child::Sub(s)) => d.do_copy(s)?,
                _ => return Err(Error::StructureMismatch { index: i }),
            }
        }
        self.null = false;
        self.modified = true;
        Ok(())
    }

    /// Copy by child name, tolerating fields absent on either side. A field
    /// whose serialized form would not change is left untouched unless this
    /// record is already marked modified.
    pub fn careless_copy(&mut self, other: &Record) {
        if other.null {
            if self.type_name == other.type_name && !self.null {
                self.force_null();
            }
            return;
        }
        let self_modified = self.modified;
        for src in &other.children {
            for dst in &mut self.children {
                match (dst, src) {
                    (Child::Leaf(d), Child::Leaf(s)) if d.name() == s.name() => {
                        if s.is_null() {
                            if self_modified || !d.is_null() {
                                d.force_null();
                            }
                        } else if !d.compare_and_copy(s) {
                            let text = s.to_text(true);
                            if self_modified || d.to_text(true) != text {
                                let _ = d.from_text(&text, &ParsePolicy::for_copy());
                            }
                        }
                        break;
                    }
                    (Child::Vector(d), Child::Vector(s)) if d.name() == s.name() => {
                        if s.is_null() {
                            if !d.is_null() {
                                d.force_null();
                            }
                        } else {
                            vector_careless_copy(d, s);
                        }
                        break;
                    }
                    (Child::Sub(d), Child::Sub(s)) if d.name() == s.name() => {
                        d.careless_copy(s);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // ---- path access ----

    /// Query the node at a path of the form `a.b[3].c`.
    pub fn query(&self, path: &str) -> Option<Node<'_>> {
        let segs = navigate::parse_path(path)?;
        let p = ParsePolicy::default();
        let mut cur = Node::Rec(self);
        for (name, idx) in segs {
            let rec = match cur {
                Node::Rec(r) => r,
                _ => return None,
            };
            if let Some(rel) = rec.resolve(&name, &p, ResolveKind::Vector) {
                let v = match rec.node(&rel)? {
                    Node::Vector(v) => v,
                    _ => return None,
                };
                cur = match idx {
                    Idx::Solo | Idx::Next => Node::Vector(v),
                    Idx::At(i) => child_node(v.get(i)?),
                };
                continue;
            }
            if matches!(idx, Idx::Solo | Idx::Next) {
                if let Some(rel) = rec.resolve(&name, &p, ResolveKind::Sub) {
                    cur = rec.node(&rel)?;
                    continue;
                }
                if let Some(rel) = rec.resolve(&name, &p, ResolveKind::Leaf) {
                    cur = rec.node(&rel)?;
                    continue;
                }
            }
            return None;
        }
        Some(cur)
    }

    /// Textual value of the leaf at `path`, if one exists.
    pub fn get_str(&self, path: &str, compact: bool) -> Option<String> {
        match self.query(path)? {
            Node::Leaf(m) => Some(m.to_text(compact)),
            _ => None,
        }
    }

    /// Null flag of the node at `path`, if one exists.
    pub fn is_null_at(&self, path: &str) -> Option<bool> {
        Some(match self.query(path)? {
            Node::Leaf(m) => m.is_null(),
            Node::Rec(r) => r.is_null(),
            Node::Vector(v) => v.is_null(),
        })
    }

    /// Write the leaf at `path` from text, growing vectors on the way.
    pub fn set_str(&mut self, path: &str, value: &str) -> Result<(), Error> {
        let mut nav = Navigator::new(ParsePolicy::default());
        nav.start();
        if !nav.find(self, path)? {
            return Err(Error::UnknownElement {
                path: path.to_string(),
            });
        }
        nav.assign_str(self, value)
    }

    /// Write the leaf at `path` from a typed value.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), Error> {
        let mut nav = Navigator::new(ParsePolicy::default());
        nav.start();
        if !nav.find(self, path)? {
            return Err(Error::UnknownElement {
                path: path.to_string(),
            });
        }
        nav.assign_value(self, value)
    }

    /// Rough in-memory size of the tree, used as a cache byte hint.
    pub fn size_hint(&self) -> usize {
        std::mem::size_of::<Record>()
            + self.type_name.len()
            + self.name.len()
            + self.children.iter().map(child_size).sum::<usize>()
    }
}

fn child_size(c: &Child) -> usize {
    match c {
        Child::Leaf(m) => {
            std::mem::size_of::<LeafField>()
                + match m.value() {
                    Value::Str(s) => s.len(),
                    Value::Bytes(b) => b.len(),
                    _ => 0,
                }
        }
        Child::Sub(r) => r.size_hint(),
        Child::Vector(v) => {
            std::mem::size_of::<VectorField>() + v.elems().iter().map(child_size).sum::<usize>()
        }
    }
}

fn child_node(c: &Child) -> Node<'_> {
    match c {
        Child::Leaf(m) => Node::Leaf(m),
        Child::Sub(r) => Node::Rec(r),
        Child::Vector(v) => Node::Vector(v),
    }
}

fn child_node_mut(c: &mut Child) -> NodeMut<'_> {
    match c {
        Child::Leaf(m) => NodeMut::Leaf(m),
        Child::Sub(r) => NodeMut::Rec(r),
        Child::Vector(v) => NodeMut::Vector(v),
    }
}

fn leaf_copy(dst: &mut LeafField, src: &LeafField) -> Result<(), Error> {
    if src.is_null() {
        dst.force_null();
        return Ok(());
    }
    if !dst.copy_from(src) {
        let text = src.to_text(true);
        dst.from_text(&text, &ParsePolicy::for_copy())?;
    }
    Ok(())
}

fn vector_copy(dst: &mut VectorField, src: &VectorField) -> Result<(), Error> {
    if src.is_null() {
        dst.force_null();
        return Ok(());
    }
    dst.resize(src.len());
    for i in 0..src.len() {
        match (dst.elem_mut(i), src.get(i)) {
            (Some(Child::Leaf(d)), Some(Child::Leaf(s))) => leaf_copy(d, s)?,
            (Some(Child::Sub(d)), Some(Child::Sub(s))) => d.do_copy(s)?,
            _ => return Err(Error::StructureMismatch { index: i }),
        }
    }
    dst.touch();
    Ok(())
}

fn vector_careless_copy(dst: &mut VectorField, src: &VectorField) {
    dst.resize(src.len());
    for i in 0..src.len() {
        match (dst.elem_mut(i), src.get(i)) {
            (Some(Child::Leaf(d)), Some(Child::Leaf(s))) => {
                if s.is_null() {
                    if !d.is_null() {
                        d.force_null();
                    }
                } else if !d.compare_and_copy(s) {
                    let text = s.to_text(true);
                    if d.to_text(true) != text {
                        let _ = d.from_text(&text, &ParsePolicy::for_copy());
                    }
                }
            }
            (Some(Child::Sub(d)), Some(Child::Sub(s))) => d.careless_copy(s),
            _ => {}
        }
    }
}

fn fold_case(s: &str, p: &ParsePolicy) -> String {
    if p.case_insensitive {
        s.to_lowercase()
    } else {
        s.to_string()
    }
}

fn name_matches(ori: &str, alt: Option<&str>, name: &str, p: &ParsePolicy) -> bool {
    let name = fold_case(name, p);
    if p.accept_ori_names && fold_case(ori, p) == name {
        return true;
    }
    if p.accept_alt_names {
        if let Some(alt) = alt {
            return fold_case(alt, p) == name;
        }
    }
    false
}

fn strip_name_prefix<'n>(name: &'n str, pfx: &str, p: &ParsePolicy) -> Option<&'n str> {
    if name.len() <= pfx.len() || !name.is_char_boundary(pfx.len()) {
        return None;
    }
    let head = &name[..pfx.len()];
    let hit = if p.case_insensitive {
        head.eq_ignore_ascii_case(pfx)
    } else {
        head == pfx
    };
    if hit {
        Some(&name[pfx.len()..])
    } else {
        None
    }
}

/// Incrementally assembles a record declaration. Children keep their
/// declaration order.
pub struct RecordBuilder {
    rec: Record,
}

impl RecordBuilder {
    /// Apply a type-level option to the record itself.
    pub fn flag(mut self, f: SchemaFlag) -> Self {
        match f {
            SchemaFlag::ColName(_) | SchemaFlag::DbAuditTrail | SchemaFlag::OTypeAsXRoot => {
                self.rec.flags.push(f)
            }
            SchemaFlag::InitialNull => self.rec.null_allowed = true,
            _ => {}
        }
        self
    }

    pub fn leaf(mut self, name: &str, kind: Kind, cfg: &[SchemaFlag]) -> Self {
        self.rec
            .children
            .push(Child::Leaf(LeafField::new(name, kind, cfg)));
        self
    }

    pub fn sub(mut self, name: &str, mut proto: Record, cfg: &[SchemaFlag]) -> Self {
        proto.name = name.to_string();
        for f in cfg {
            proto.apply_member_flag(f);
        }
        if proto.null_allowed {
            proto.null = true;
        }
        self.rec.children.push(Child::Sub(proto));
        self
    }

    pub fn vec_leaf(mut self, name: &str, kind: Kind, cfg: &[SchemaFlag]) -> Self {
        let (own, elem) = split_vector_flags(cfg);
        let proto = Child::Leaf(LeafField::new("", kind, &elem));
        self.rec
            .children
            .push(Child::Vector(VectorField::new(name, proto, &own)));
        self
    }

    pub fn vec_sub(mut self, name: &str, mut proto: Record, cfg: &[SchemaFlag]) -> Self {
        let (own, elem) = split_vector_flags(cfg);
        proto.name = String::new();
        for f in &elem {
            proto.apply_member_flag(f);
        }
        if proto.null_allowed {
            proto.null = true;
        }
        self.rec
            .children
            .push(Child::Vector(VectorField::new(name, Child::Sub(proto), &own)));
        self
    }

    pub fn finish(mut self) -> Record {
        if self.rec.null_allowed {
            self.rec.null = true;
        }
        self.rec
    }
}

/// Vector declarations split their options: some describe the vector, the
/// rest propagate to every element.
fn split_vector_flags(cfg: &[SchemaFlag]) -> (Vec<SchemaFlag>, Vec<SchemaFlag>) {
    let mut own = Vec::new();
    let mut elem = Vec::new();
    for f in cfg {
        match f {
            SchemaFlag::InitialNull | SchemaFlag::DbCompact => elem.push(f.clone()),
            _ => own.push(f.clone()),
        }
    }
    (own, elem)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Kind;
    use pretty_assertions::assert_eq;

    fn vehicle() -> Record {
        Record::build("Vehicle")
            .leaf("typ", Kind::Str, &[])
            .leaf("axles", Kind::Int, &[SchemaFlag::InitialNull])
            .finish()
    }

    fn rig() -> Record {
        Record::build("Rig")
            .leaf("id", Kind::Int, &[SchemaFlag::key(1)])
            .leaf("typ", Kind::Str, &[])
            .sub("tractor", vehicle(), &[])
            .vec_sub("trailers", vehicle(), &[])
            .finish()
    }

    #[test]
    fn test_declaration_state() {
        let r = rig();
        assert!(!r.is_modified());
        assert!(!r.is_null());
        assert_eq!(r.children().len(), 4);
        assert_eq!(r.is_null_at("tractor.axles"), Some(true));
    }

    #[test]
    fn test_set_activates_ancestors() {
        let mut r = rig();
        r.clear_modified();
        r.set_str("tractor.axles", "2").unwrap();
        assert!(r.is_modified());
        assert_eq!(r.get_str("tractor.axles", false), Some("2".into()));
        assert_eq!(r.is_null_at("tractor.axles"), Some(false));
        assert_eq!(r.is_null_at("tractor"), Some(false));
    }

    #[test]
    fn test_vector_auto_grow_by_path() {
        let mut r = rig();
        r.set_str("trailers[2].typ", "Flatbed").unwrap();
        match r.query("trailers") {
            Some(Node::Vector(v)) => assert_eq!(v.len(), 3),
            _ => panic!("trailers must resolve to a vector"),
        }
        assert_eq!(r.get_str("trailers[2].typ", false), Some("Flatbed".into()));
        assert_eq!(r.get_str("trailers[1].typ", false), Some("".into()));
    }

    #[test]
    fn test_do_copy_requires_same_type() {
        let mut a = rig();
        let b = vehicle();
        match a.do_copy(&b) {
            Err(Error::TypeMismatch { .. }) => {}
            other => panic!("expected type mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_do_copy_round() {
        let mut a = rig();
        a.set_str("id", "7").unwrap();
        a.set_str("trailers[0].typ", "Low loader").unwrap();
        let mut b = rig();
        b.do_copy(&a).unwrap();
        assert_eq!(b.get_str("id", false), Some("7".into()));
        assert_eq!(b.get_str("trailers[0].typ", false), Some("Low loader".into()));
    }

    #[test]
    fn test_do_copy_null_source() {
        let mut a = vehicle();
        a.set_str("typ", "Tractor").unwrap();
        let mut null_src = vehicle();
        null_src.force_null();
        a.do_copy(&null_src).unwrap();
        assert!(a.is_null());
        assert_eq!(a.get_str("typ", false), Some("".into()));
    }

    #[test]
    fn test_careless_copy_ignores_missing_and_keeps_equal() {
        let mut dst = rig();
        dst.set_str("id", "5").unwrap();
        dst.set_str("typ", "three axle").unwrap();
        dst.clear_modified();

        // Source shares only `typ`, with an identical value.
        let mut src = Record::build("Other")
            .leaf("typ", Kind::Str, &[])
            .leaf("color", Kind::Str, &[])
            .finish();
        src.set_str("typ", "three axle").unwrap();
        src.set_str("color", "red").unwrap();

        dst.careless_copy(&src);
        assert_eq!(dst.get_str("id", false), Some("5".into()));
        assert_eq!(dst.get_str("typ", false), Some("three axle".into()));
        match dst.query("typ") {
            Some(Node::Leaf(m)) => assert!(!m.is_modified()),
            _ => panic!("typ must stay a leaf"),
        }
    }

    #[test]
    fn test_careless_copy_changed_value() {
        let mut dst = vehicle();
        dst.set_str("typ", "old").unwrap();
        dst.clear_modified();
        let mut src = vehicle();
        src.set_str("typ", "new").unwrap();
        dst.careless_copy(&src);
        assert_eq!(dst.get_str("typ", false), Some("new".into()));
        match dst.query("typ") {
            Some(Node::Leaf(m)) => assert!(m.is_modified()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_embedded_resolution_with_prefix() {
        let address = Record::build("Address")
            .leaf("city", Kind::Str, &[])
            .leaf("zip", Kind::Str, &[])
            .finish();
        let mut person = Record::build("Person")
            .leaf("name", Kind::Str, &[])
            .sub(
                "address",
                address,
                &[SchemaFlag::Embedded, SchemaFlag::prefix("adr_")],
            )
            .finish();
        person.set_str("adr_city", "Hamburg").unwrap();
        assert_eq!(person.get_str("address.city", false), Some("Hamburg".into()));
        assert_eq!(person.get_str("adr_city", false), Some("Hamburg".into()));
        assert!(person.query("city").is_none());
    }

    #[test]
    fn test_clear_resets_children() {
        let mut r = rig();
        r.set_str("typ", "rig").unwrap();
        r.set_str("trailers[0].typ", "x").unwrap();
        r.clear();
        assert_eq!(r.get_str("typ", false), Some("".into()));
        match r.query("trailers") {
            Some(Node::Vector(v)) => assert_eq!(v.len(), 0),
            _ => unreachable!(),
        }
    }
}
