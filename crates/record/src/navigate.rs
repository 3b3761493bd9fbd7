use itertools::Itertools;

use crate::base::{Addr, Node, NodeMut, Record, ResolveKind, Step};
use crate::{Error, NullPolicy, ParsePolicy, SchemaFlag, Value};

/// Index argument to [`Navigator::enter`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Idx {
    /// Not an array access: sub-records and leaves resolve; a vector
    /// resolves to the vector itself.
    Solo,
    /// Append one element to a resolved vector.
    Next,
    /// Absolute element index; the vector grows to `n + 1` as needed.
    At(usize),
}

enum Frame {
    Obj { addr: Addr, display: String },
    /// Placeholder for an unknown element: structure is still tracked so
    /// the matching `leave` finds its partner, but nothing resolves inside.
    Dummy { display: String },
}

/// Stateful cursor that fills a record from sequential parser events.
///
/// The navigator holds no reference into the tree; every operation takes
/// the root it navigates, and positions are explicit node addresses.
pub struct Navigator {
    policy: ParsePolicy,
    frames: Vec<Frame>,
    path: Vec<String>,
    cur_leaf: Option<Addr>,
    cur_vec: Option<Addr>,
    display: String,
}

impl Navigator {
    pub fn new(policy: ParsePolicy) -> Navigator {
        Navigator {
            policy,
            frames: Vec::new(),
            path: Vec::new(),
            cur_leaf: None,
            cur_vec: None,
            display: String::new(),
        }
    }

    /// Reset and place the cursor on the root record.
    pub fn start(&mut self) {
        self.reset();
        self.frames.push(Frame::Obj {
            addr: Addr::new(),
            display: "<obj>".to_string(),
        });
    }

    pub fn reset(&mut self) {
        self.frames.clear();
        self.path.clear();
        self.cur_leaf = None;
        self.cur_vec = None;
        self.display.clear();
    }

    pub fn policy(&self) -> &ParsePolicy {
        &self.policy
    }

    /// True when the cursor stands on a leaf.
    pub fn on_member(&self) -> bool {
        self.cur_leaf.is_some()
    }

    /// True when the cursor stands on a vector as a whole.
    pub fn on_vector(&self) -> bool {
        self.cur_vec.is_some()
    }

    /// Innermost element name on the path stack.
    pub fn current(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    /// Dotted display path of the cursor, for diagnostics.
    pub fn show_name(&self) -> &str {
        &self.display
    }

    /// Whether the current leaf carries the given schema flag.
    pub fn member_has_flag(&self, root: &Record, flag: &SchemaFlag) -> bool {
        match &self.cur_leaf {
            Some(addr) => matches!(root.node(addr), Some(Node::Leaf(m)) if m.has_flag(flag)),
            None => false,
        }
    }

    /// Descend into `element`. Resolution prefers vectors, then
    /// sub-records, then leaves, and follows embedded sub-records with
    /// prefix stripping. Unknown names push a placeholder frame and return
    /// false (or error under the strict-names policy).
    pub fn enter(&mut self, root: &mut Record, element: &str, idx: Idx) -> Result<bool, Error> {
        self.path.push(element.to_string());
        if self.frames.is_empty() {
            return Err(Error::NoObject);
        }
        if self.cur_leaf.take().is_some() {
            // The cursor sat on a leaf: track the extra structure level as
            // a placeholder so leave() stays balanced.
            let display = self.display.clone();
            self.frames.push(Frame::Dummy { display });
        }
        self.cur_vec = None;
        let frame_addr = match self.frames.last() {
            Some(Frame::Obj { addr, display }) => {
                self.display = display.clone();
                Some(addr.clone())
            }
            Some(Frame::Dummy { display }) => {
                self.display = display.clone();
                None
            }
            None => return Err(Error::NoObject),
        };

        if let Some(frame_addr) = frame_addr {
            let rel = root
                .record_at(&frame_addr)
                .and_then(|r| r.resolve(element, &self.policy, ResolveKind::Vector));
            if let Some(rel) = rel {
                return self.enter_vector(root, frame_addr, rel, element, idx);
            }
            if matches!(idx, Idx::Solo | Idx::Next) {
                let rel = root
                    .record_at(&frame_addr)
                    .and_then(|r| r.resolve(element, &self.policy, ResolveKind::Sub));
                if let Some(rel) = rel {
                    let mut addr = frame_addr;
                    addr.extend(rel);
                    self.display = format!("{}.{}", self.display, element);
                    self.frames.push(Frame::Obj {
                        addr,
                        display: self.display.clone(),
                    });
                    return Ok(true);
                }
                let rel = root
                    .record_at(&frame_addr)
                    .and_then(|r| r.resolve(element, &self.policy, ResolveKind::Leaf));
                if let Some(rel) = rel {
                    let mut addr = frame_addr;
                    addr.extend(rel);
                    self.display = format!("{}.{}", self.display, element);
                    self.cur_leaf = Some(addr);
                    return Ok(true);
                }
            }
        }

        self.display = format!("{}.{}", self.display, element);
        self.frames.push(Frame::Dummy {
            display: self.display.clone(),
        });
        if self.policy.exception_if_unknown {
            return Err(Error::UnknownElement {
                path: self.display.clone(),
            });
        }
        tracing::debug!(path = %self.display, "element not found, tracking placeholder");
        Ok(false)
    }

    fn enter_vector(
        &mut self,
        root: &mut Record,
        frame_addr: Addr,
        rel: Addr,
        element: &str,
        idx: Idx,
    ) -> Result<bool, Error> {
        let mut vaddr = frame_addr;
        vaddr.extend(rel);

        if matches!(idx, Idx::Solo) {
            self.display = format!("{}.{}[]", self.display, element);
            self.cur_vec = Some(vaddr);
            return Ok(true);
        }

        let shrink = self.policy.shrink_array && !self.policy.dont_shrink;
        let (target, grew) = {
            let vec = match root.vector_at_mut(&vaddr) {
                Some(v) => v,
                None => {
                    return Err(Error::CorruptVector {
                        path: self.display.clone(),
                    })
                }
            };
            let len = vec.len();
            match idx {
                Idx::At(i) if i < len => {
                    if shrink {
                        vec.resize(i + 1);
                    }
                    (i, shrink && i + 1 != len)
                }
                Idx::At(i) => {
                    vec.resize(i + 1);
                    (i, true)
                }
                Idx::Next => {
                    vec.resize(len + 1);
                    (len, true)
                }
                Idx::Solo => unreachable!("handled above"),
            }
        };
        if grew {
            root.activate_along(&vaddr);
        }

        self.display = format!("{}.{}[{}]", self.display, element, target);
        let mut eaddr = vaddr;
        eaddr.push(Step::Elem(target));
        match root.node(&eaddr) {
            Some(Node::Rec(_)) => {
                self.frames.push(Frame::Obj {
                    addr: eaddr,
                    display: self.display.clone(),
                });
                Ok(true)
            }
            Some(Node::Leaf(_)) => {
                self.cur_leaf = Some(eaddr);
                Ok(true)
            }
            _ => Err(Error::CorruptVector {
                path: self.display.clone(),
            }),
        }
    }

    /// Pop the innermost cursor: a vector or leaf selection first,
    /// otherwise an object frame. When `element` is given it must match
    /// the innermost path entry.
    pub fn leave(&mut self, element: Option<&str>) -> Result<(), Error> {
        if self.cur_vec.take().is_some() {
            // Cursor stood on the vector itself.
        } else if self.cur_leaf.take().is_some() {
            // Cursor stood on a leaf.
        } else if self.frames.is_empty() || self.path.is_empty() {
            return Err(Error::StackUnderflow);
        } else {
            self.frames.pop();
        }
        if let Some(element) = element {
            if !element.is_empty() && self.path.last().map(String::as_str) != Some(element) {
                return Err(Error::LeaveMismatch {
                    expect: self.path.last().cloned().unwrap_or_default(),
                    got: element.to_string(),
                });
            }
        }
        self.path.pop();
        self.cur_vec = None;
        Ok(())
    }

    /// Apply the null policy to the cursor target.
    pub fn set_null(&mut self, root: &mut Record) -> Result<bool, Error> {
        if let Some(addr) = self.cur_vec.clone() {
            return self.null_at(root, &addr);
        }
        if let Some(addr) = self.cur_leaf.clone() {
            return self.null_at(root, &addr);
        }
        match self.frames.last() {
            Some(Frame::Obj { addr, .. }) => {
                let addr = addr.clone();
                self.null_at(root, &addr)
            }
            _ => Ok(false),
        }
    }

    fn null_at(&mut self, root: &mut Record, addr: &[Step]) -> Result<bool, Error> {
        let allowed = match root.node(addr) {
            Some(Node::Leaf(m)) => m.null_allowed(),
            Some(Node::Vector(v)) => v.null_allowed(),
            Some(Node::Rec(r)) => r.null_allowed(),
            None => return Ok(false),
        };
        match self.policy.null_handling {
            NullPolicy::Omit => Ok(true),
            NullPolicy::Force => {
                force_null_at(root, addr);
                Ok(true)
            }
            NullPolicy::Clear => {
                if allowed {
                    force_null_at(root, addr);
                } else {
                    clear_at(root, addr);
                    root.activate_along(addr);
                }
                Ok(true)
            }
            NullPolicy::Except => {
                if !allowed {
                    return Err(Error::NullNotAllowed {
                        path: self.display.clone(),
                    });
                }
                force_null_at(root, addr);
                Ok(true)
            }
            NullPolicy::Ignore => {
                if !allowed {
                    return Ok(false);
                }
                force_null_at(root, addr);
                Ok(true)
            }
        }
    }

    /// Write the current leaf from text and mark the ancestor chain.
    pub fn assign_str(&mut self, root: &mut Record, text: &str) -> Result<(), Error> {
        let addr = match &self.cur_leaf {
            Some(addr) => addr.clone(),
            None => {
                return Err(Error::NotAVariable {
                    path: self.display.clone(),
                })
            }
        };
        match root.leaf_at_mut(&addr) {
            Some(m) => m.from_text(text, &self.policy)?,
            None => {
                return Err(Error::NotAVariable {
                    path: self.display.clone(),
                })
            }
        }
        root.activate_along(&addr);
        Ok(())
    }

    /// Write the current leaf from a typed value and mark the ancestors.
    pub fn assign_value(&mut self, root: &mut Record, value: Value) -> Result<(), Error> {
        let addr = match &self.cur_leaf {
            Some(addr) => addr.clone(),
            None => {
                return Err(Error::NotAVariable {
                    path: self.display.clone(),
                })
            }
        };
        match root.leaf_at_mut(&addr) {
            Some(m) => m.set(value)?,
            None => {
                return Err(Error::NotAVariable {
                    path: self.display.clone(),
                })
            }
        }
        root.activate_along(&addr);
        Ok(())
    }

    /// Follow a dotted path of the form `a.b[3].c` from the current
    /// position. Returns false on malformed syntax.
    pub fn find(&mut self, root: &mut Record, var: &str) -> Result<bool, Error> {
        let Some(segs) = parse_path(var) else {
            return Ok(false);
        };
        if segs.is_empty() {
            return Ok(false);
        }
        for (name, idx) in segs {
            self.enter(root, &name, idx)?;
        }
        Ok(true)
    }

    /// Dotted form of the path stack, for diagnostics.
    pub fn path_str(&self) -> String {
        self.path.iter().join(".")
    }
}

fn force_null_at(root: &mut Record, addr: &[Step]) {
    match root.node_mut(addr) {
        Some(NodeMut::Leaf(m)) => m.force_null(),
        Some(NodeMut::Vector(v)) => v.force_null(),
        Some(NodeMut::Rec(r)) => r.force_null(),
        None => {}
    }
}

fn clear_at(root: &mut Record, addr: &[Step]) {
    match root.node_mut(addr) {
        Some(NodeMut::Leaf(m)) => m.set_empty(),
        Some(NodeMut::Vector(v)) => v.set_empty(),
        Some(NodeMut::Rec(r)) => r.set_empty(),
        None => {}
    }
}

/// Split `a.b[3].c` into (name, index) segments. A trailing or
/// intermediate plain name appends (`Next`) respectively addresses the
/// element itself (`Solo`); `[n]` is absolute. Returns `None` on syntax
/// errors.
pub(crate) fn parse_path(var: &str) -> Option<Vec<(String, Idx)>> {
    let mut segs = Vec::new();
    let bytes = var.as_bytes();
    let mut pos = 0;
    while pos < var.len() {
        let rest = &var[pos..];
        let Some(rel) = rest.find(['.', '[']) else {
            segs.push((rest.to_string(), Idx::Next));
            return Some(segs);
        };
        let element = &rest[..rel];
        let mut idx = Idx::Solo;
        let mut after = pos + rel;
        if bytes[after] == b'[' {
            let tail = &var[after + 1..];
            let close = tail.find(']')?;
            idx = Idx::At(tail[..close].parse().ok()?);
            after += close + 2;
        }
        segs.push((element.to_string(), idx));
        if after == var.len() {
            return Some(segs);
        }
        if bytes[after] != b'.' {
            return None;
        }
        pos = after + 1;
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Kind, SchemaFlag};

    fn vehicle() -> Record {
        Record::build("Vehicle")
            .leaf("typ", Kind::Str, &[])
            .leaf("axles", Kind::Int, &[SchemaFlag::InitialNull])
            .finish()
    }

    fn rig() -> Record {
        Record::build("Rig")
            .leaf("id", Kind::Int, &[SchemaFlag::key(1)])
            .sub("tractor", vehicle(), &[])
            .vec_sub("trailers", vehicle(), &[])
            .finish()
    }

    #[test]
    fn test_enter_leave_is_a_no_op() {
        let mut root = rig();
        let mut nav = Navigator::new(ParsePolicy::default());
        nav.start();
        assert!(nav.enter(&mut root, "tractor", Idx::Solo).unwrap());
        nav.leave(Some("tractor")).unwrap();
        assert_eq!(nav.path_str(), "");
        assert!(!nav.on_member());
        assert_eq!(nav.frames.len(), 1);
    }

    #[test]
    fn test_leave_checks_element_name() {
        let mut root = rig();
        let mut nav = Navigator::new(ParsePolicy::default());
        nav.start();
        nav.enter(&mut root, "tractor", Idx::Solo).unwrap();
        match nav.leave(Some("trailer")) {
            Err(Error::LeaveMismatch { expect, got }) => {
                assert_eq!(expect, "tractor");
                assert_eq!(got, "trailer");
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_auto_grow_with_gap() {
        let mut root = rig();
        let mut nav = Navigator::new(ParsePolicy::default());
        nav.start();
        assert!(nav.enter(&mut root, "trailers", Idx::At(0)).unwrap());
        assert!(nav.enter(&mut root, "typ", Idx::Solo).unwrap());
        nav.assign_str(&mut root, "Anhänger").unwrap();
        nav.leave(None).unwrap();
        nav.leave(None).unwrap();
        assert!(nav.enter(&mut root, "trailers", Idx::At(2)).unwrap());
        nav.leave(None).unwrap();

        match root.query("trailers") {
            Some(Node::Vector(v)) => assert_eq!(v.len(), 3),
            _ => unreachable!(),
        }
        assert_eq!(root.get_str("trailers[0].typ", false), Some("Anhänger".into()));
        assert_eq!(root.get_str("trailers[1].typ", false), Some("".into()));
    }

    #[test]
    fn test_unknown_element_skips_structure() {
        let mut root = rig();
        let mut nav = Navigator::new(ParsePolicy::default());
        nav.start();
        assert!(!nav.enter(&mut root, "bogus", Idx::Solo).unwrap());
        // Descending into the unknown structure stays balanced.
        assert!(!nav.enter(&mut root, "below", Idx::Solo).unwrap());
        nav.leave(Some("below")).unwrap();
        nav.leave(Some("bogus")).unwrap();
        assert_eq!(nav.path_str(), "");
    }

    #[test]
    fn test_unknown_element_strict() {
        let mut root = rig();
        let mut nav = Navigator::new(ParsePolicy::default().strict_names());
        nav.start();
        match nav.enter(&mut root, "bogus", Idx::Solo) {
            Err(Error::UnknownElement { .. }) => {}
            other => panic!("expected unknown element, got {other:?}"),
        }
    }

    #[test]
    fn test_null_policies() {
        let mut root = rig();

        // Except errors on non-nullable targets.
        let mut nav = Navigator::new(ParsePolicy::default().nulls(NullPolicy::Except));
        nav.start();
        nav.enter(&mut root, "id", Idx::Solo).unwrap();
        assert!(matches!(
            nav.set_null(&mut root),
            Err(Error::NullNotAllowed { .. })
        ));
        nav.leave(None).unwrap();

        // A nullable leaf is forced null.
        nav.enter(&mut root, "tractor", Idx::Solo).unwrap();
        nav.enter(&mut root, "axles", Idx::Solo).unwrap();
        assert!(nav.set_null(&mut root).unwrap());
        nav.leave(None).unwrap();
        nav.leave(None).unwrap();
        assert_eq!(root.is_null_at("tractor.axles"), Some(true));

        // Clear empties a non-nullable leaf instead of nulling it.
        root.set_str("id", "3").unwrap();
        let mut nav = Navigator::new(ParsePolicy::default().nulls(NullPolicy::Clear));
        nav.start();
        nav.enter(&mut root, "id", Idx::Solo).unwrap();
        assert!(nav.set_null(&mut root).unwrap());
        assert_eq!(root.get_str("id", false), Some("0".into()));
        assert_eq!(root.is_null_at("id"), Some(false));

        // Ignore reports false for non-nullable targets.
        let mut nav = Navigator::new(ParsePolicy::default().nulls(NullPolicy::Ignore));
        nav.start();
        nav.enter(&mut root, "id", Idx::Solo).unwrap();
        assert!(!nav.set_null(&mut root).unwrap());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut root = rig();
        let mut nav = Navigator::new(ParsePolicy::default().case_insensitive());
        nav.start();
        assert!(nav.enter(&mut root, "Tractor", Idx::Solo).unwrap());
    }

    #[test]
    fn test_alt_name_lookup() {
        let mut root = Record::build("T")
            .leaf("number", Kind::Int, &[SchemaFlag::alt_name("nr")])
            .finish();
        let mut nav = Navigator::new(ParsePolicy::default().alt_names());
        nav.start();
        assert!(nav.enter(&mut root, "nr", Idx::Solo).unwrap());
        let mut nav = Navigator::new(ParsePolicy::default());
        nav.start();
        assert!(!nav.enter(&mut root, "nr", Idx::Solo).unwrap());
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(
            parse_path("contacts[2].number"),
            Some(vec![
                ("contacts".to_string(), Idx::At(2)),
                ("number".to_string(), Idx::Next),
            ])
        );
        assert_eq!(
            parse_path("a.b"),
            Some(vec![
                ("a".to_string(), Idx::Solo),
                ("b".to_string(), Idx::Next),
            ])
        );
        assert_eq!(parse_path("a[x]"), None);
        assert_eq!(parse_path("a[1"), None);
    }

    #[test]
    fn test_vector_itself() {
        let mut root = rig();
        root.set_str("trailers[0].typ", "x").unwrap();
        let mut nav = Navigator::new(ParsePolicy::default());
        nav.start();
        assert!(nav.enter(&mut root, "trailers", Idx::Solo).unwrap());
        assert!(nav.on_vector());
        assert!(nav.set_null(&mut root).unwrap());
        nav.leave(None).unwrap();
        assert_eq!(root.is_null_at("trailers"), Some(true));
        match root.query("trailers") {
            Some(Node::Vector(v)) => assert_eq!(v.len(), 0),
            _ => unreachable!(),
        }
    }
}
