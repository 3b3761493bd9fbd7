use crate::base::{Child, Record};
use crate::leaf::LeafField;
use crate::vector::VectorField;
use crate::SerPolicy;

/// Cursor state shared with visitor callbacks during a traversal.
///
/// Besides the position flags it carries the naming context, so a visitor
/// can render the serialized name of the node it stands on without parent
/// back-links.
#[derive(Debug, Default, Clone)]
pub struct TravCtx {
    pub(crate) array_index: Option<usize>,
    pub(crate) in_null: bool,
    pub(crate) key_mode: bool,
    pub(crate) depth: usize,
    pub(crate) embedded_prefix: String,
    pub(crate) parent_prefix: Option<String>,
    pub(crate) parent_embedded: bool,
}

impl TravCtx {
    pub fn in_array(&self) -> bool {
        self.array_index.is_some()
    }

    /// Element position when the visited node sits inside a vector.
    pub fn array_index(&self) -> Option<usize> {
        self.array_index
    }

    /// True when any ancestor of the visited node is null.
    pub fn in_null(&self) -> bool {
        self.in_null
    }

    /// True during a key traversal.
    pub fn key_mode(&self) -> bool {
        self.key_mode
    }

    /// Serialized name of a child visited under this context: the embedded
    /// prefix chain, or the parent's prefix token when the policy asks for
    /// it, then the original or alternative name.
    pub fn render_name(&self, ori: &str, alt: Option<&str>, p: &SerPolicy) -> String {
        let mut out = String::new();
        if self.parent_embedded {
            out.push_str(&self.embedded_prefix);
        } else if p.use_prefix {
            if let Some(pfx) = &self.parent_prefix {
                out.push_str(pfx);
            }
        }
        let name = if p.use_alt_names {
            alt.unwrap_or(ori)
        } else {
            ori
        };
        out.push_str(name);
        if p.to_lowercase {
            out = out.to_lowercase();
        }
        out
    }
}

/// Read-only visitor over a record tree.
///
/// `obj_begin`/`array_begin` returning false skips the node's children and
/// its matching end callback. Embedded sub-records are traversed in place:
/// neither callback fires for them.
pub trait VisitConst {
    fn obj_begin(&mut self, rec: &Record, ctx: &TravCtx) -> bool;
    fn obj_end(&mut self, rec: &Record, ctx: &TravCtx);
    fn array_begin(&mut self, vec: &VectorField, ctx: &TravCtx) -> bool;
    fn array_end(&mut self, vec: &VectorField, ctx: &TravCtx);
    fn leaf(&mut self, mem: &LeafField, ctx: &TravCtx);

    /// Key traversal visits version fields only when this returns true.
    fn with_version_field(&self) -> bool {
        false
    }
}

/// Mutating visitor over a record tree.
pub trait VisitMut {
    fn obj_begin(&mut self, rec: &mut Record, ctx: &TravCtx) -> bool;
    fn obj_end(&mut self, rec: &mut Record, ctx: &TravCtx);
    fn array_begin(&mut self, vec: &mut VectorField, ctx: &TravCtx) -> bool;
    fn array_end(&mut self, vec: &mut VectorField, ctx: &TravCtx);
    fn leaf(&mut self, mem: &mut LeafField, ctx: &TravCtx);
}

impl Record {
    /// Walk the tree in declaration order.
    pub fn traverse<V: VisitConst>(&self, v: &mut V) {
        let mut ctx = TravCtx::default();
        self.walk(v, &mut ctx);
    }

    pub fn traverse_mut<V: VisitMut>(&mut self, v: &mut V) {
        let mut ctx = TravCtx::default();
        self.walk_mut(v, &mut ctx);
    }

    /// Visit only key leaves, in ascending key position, recursing into
    /// keyed sub-records.
    pub fn traverse_key<V: VisitConst>(&self, v: &mut V) {
        let mut ctx = TravCtx {
            key_mode: true,
            ..TravCtx::default()
        };
        self.walk_key(v, &mut ctx);
    }

    pub(crate) fn walk<V: VisitConst>(&self, v: &mut V, ctx: &mut TravCtx) {
        ctx.key_mode = false;
        let embedded = self.is_embedded();
        if !embedded && !v.obj_begin(self, ctx) {
            return;
        }
        let outer_null = ctx.in_null;
        let outer_index = ctx.array_index;
        let saved = self.push_naming(ctx, embedded);
        for child in &self.children {
            ctx.array_index = None;
            ctx.in_null = outer_null || self.null;
            match child {
                Child::Leaf(m) => v.leaf(m, ctx),
                Child::Sub(r) => r.walk(v, ctx),
                Child::Vector(vec) => vec.walk(v, ctx),
            }
        }
        self.pop_naming(ctx, saved);
        ctx.in_null = outer_null;
        ctx.array_index = outer_index;
        if !embedded {
            v.obj_end(self, ctx);
        }
    }

    pub(crate) fn walk_mut<V: VisitMut>(&mut self, v: &mut V, ctx: &mut TravCtx) {
        ctx.key_mode = false;
        let embedded = self.is_embedded();
        if !embedded && !v.obj_begin(self, ctx) {
            return;
        }
        let outer_index = ctx.array_index;
        let saved = self.push_naming(ctx, embedded);
        for child in &mut self.children {
            ctx.array_index = None;
            match child {
                Child::Leaf(m) => v.leaf(m, ctx),
                Child::Sub(r) => r.walk_mut(v, ctx),
                Child::Vector(vec) => vec.walk_mut(v, ctx),
            }
        }
        self.pop_naming(ctx, saved);
        ctx.array_index = outer_index;
        if !embedded {
            v.obj_end(self, ctx);
        }
    }

    fn walk_key<V: VisitConst>(&self, v: &mut V, ctx: &mut TravCtx) {
        ctx.key_mode = true;
        let embedded = self.is_embedded();
        if !embedded && !v.obj_begin(self, ctx) {
            return;
        }
        let mut keyed: Vec<(u32, usize)> = Vec::new();
        for (i, c) in self.children.iter().enumerate() {
            match c {
                Child::Leaf(m) if m.key_pos() > 0 => keyed.push((m.key_pos(), i)),
                Child::Sub(r) if r.key_pos() > 0 => keyed.push((r.key_pos(), i)),
                _ => {}
            }
        }
        keyed.sort_by_key(|(pos, _)| *pos);
        let outer_null = ctx.in_null;
        for (_, i) in keyed {
            ctx.in_null = outer_null || self.null;
            ctx.key_mode = true;
            match &self.children[i] {
                Child::Leaf(m) => {
                    if v.with_version_field() || !m.is_version_field() {
                        v.leaf(m, ctx);
                    }
                }
                Child::Sub(r) => r.walk_key(v, ctx),
                _ => {}
            }
        }
        ctx.in_null = outer_null;
        if !embedded {
            v.obj_end(self, ctx);
        }
    }

    /// Naming context for this record's children. Embedded records extend
    /// the active prefix chain; plain records start a fresh one.
    fn push_naming(&self, ctx: &mut TravCtx, embedded: bool) -> (String, Option<String>, bool) {
        let saved_chain = std::mem::take(&mut ctx.embedded_prefix);
        let saved_parent = ctx.parent_prefix.take();
        let saved_embedded = ctx.parent_embedded;
        if embedded {
            ctx.embedded_prefix = saved_chain.clone();
            if let Some(pfx) = self.prefix_token() {
                ctx.embedded_prefix.push_str(pfx);
            }
        }
        ctx.parent_prefix = if ctx.depth > 0 {
            self.prefix_token().map(str::to_string)
        } else {
            None
        };
        ctx.parent_embedded = embedded;
        ctx.depth += 1;
        (saved_chain, saved_parent, saved_embedded)
    }

    fn pop_naming(&self, ctx: &mut TravCtx, saved: (String, Option<String>, bool)) {
        ctx.depth -= 1;
        ctx.embedded_prefix = saved.0;
        ctx.parent_prefix = saved.1;
        ctx.parent_embedded = saved.2;
    }
}

impl VectorField {
    pub(crate) fn walk<V: VisitConst>(&self, v: &mut V, ctx: &mut TravCtx) {
        ctx.key_mode = false;
        if !v.array_begin(self, ctx) {
            return;
        }
        let outer_null = ctx.in_null;
        for (i, elem) in self.elems().iter().enumerate() {
            ctx.in_null = outer_null || self.is_null();
            ctx.array_index = Some(i);
            match elem {
                Child::Leaf(m) => v.leaf(m, ctx),
                Child::Sub(r) => r.walk(v, ctx),
                Child::Vector(nested) => nested.walk(v, ctx),
            }
        }
        ctx.in_null = outer_null;
        ctx.array_index = None;
        v.array_end(self, ctx);
    }

    pub(crate) fn walk_mut<V: VisitMut>(&mut self, v: &mut V, ctx: &mut TravCtx) {
        ctx.key_mode = false;
        if !v.array_begin(self, ctx) {
            return;
        }
        let len = self.len();
        for i in 0..len {
            ctx.array_index = Some(i);
            match self.elem_mut(i) {
                Some(Child::Leaf(m)) => v.leaf(m, ctx),
                Some(Child::Sub(r)) => r.walk_mut(v, ctx),
                Some(Child::Vector(nested)) => nested.walk_mut(v, ctx),
                None => {}
            }
        }
        ctx.array_index = None;
        v.array_end(self, ctx);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Kind, SchemaFlag};

    struct Trace {
        calls: Vec<String>,
    }

    impl VisitConst for Trace {
        fn obj_begin(&mut self, rec: &Record, ctx: &TravCtx) -> bool {
            self.calls.push(format!(
                "obj_begin({}, null={}, idx={:?})",
                rec.name(),
                ctx.in_null(),
                ctx.array_index()
            ));
            true
        }
        fn obj_end(&mut self, rec: &Record, _: &TravCtx) {
            self.calls.push(format!("obj_end({})", rec.name()));
        }
        fn array_begin(&mut self, vec: &VectorField, _: &TravCtx) -> bool {
            self.calls.push(format!("array_begin({})", vec.name()));
            true
        }
        fn array_end(&mut self, vec: &VectorField, _: &TravCtx) {
            self.calls.push(format!("array_end({})", vec.name()));
        }
        fn leaf(&mut self, mem: &LeafField, ctx: &TravCtx) {
            self.calls.push(format!(
                "leaf({}, null={}, idx={:?})",
                mem.name(),
                ctx.in_null(),
                ctx.array_index()
            ));
        }
    }

    fn fixture() -> Record {
        let inner = Record::build("Inner")
            .leaf("a", Kind::Int, &[])
            .finish();
        Record::build("Outer")
            .leaf("id", Kind::Int, &[SchemaFlag::key(1)])
            .sub("one", inner.clone(), &[])
            .vec_sub("many", inner, &[])
            .finish()
    }

    #[test]
    fn test_declaration_order() {
        let mut rec = fixture();
        rec.set_str("many[1].a", "5").unwrap();
        let mut t = Trace { calls: Vec::new() };
        rec.traverse(&mut t);
        assert_eq!(
            t.calls,
            vec![
                "obj_begin(, null=false, idx=None)",
                "leaf(id, null=false, idx=None)",
                "obj_begin(one, null=false, idx=None)",
                "leaf(a, null=false, idx=None)",
                "obj_end(one)",
                "array_begin(many)",
                "obj_begin(, null=false, idx=Some(0))",
                "leaf(a, null=false, idx=None)",
                "obj_end()",
                "obj_begin(, null=false, idx=Some(1))",
                "leaf(a, null=false, idx=None)",
                "obj_end()",
                "array_end(many)",
                "obj_end()",
            ]
        );
    }

    #[test]
    fn test_null_record_children_flagged() {
        let mut rec = fixture();
        rec.set_str("one.a", "1").unwrap();
        match rec.node_mut(&[crate::Step::Child(1)]) {
            Some(crate::NodeMut::Rec(r)) => r.force_null(),
            _ => unreachable!(),
        }
        let mut t = Trace { calls: Vec::new() };
        rec.traverse(&mut t);
        assert!(t
            .calls
            .contains(&"leaf(a, null=true, idx=None)".to_string()));
    }

    #[test]
    fn test_embedded_visited_in_place() {
        let inner = Record::build("Inner")
            .leaf("a", Kind::Int, &[])
            .finish();
        let rec = Record::build("Outer")
            .sub("flat", inner, &[SchemaFlag::Embedded])
            .finish();
        let mut t = Trace { calls: Vec::new() };
        rec.traverse(&mut t);
        assert_eq!(
            t.calls,
            vec![
                "obj_begin(, null=false, idx=None)",
                "leaf(a, null=false, idx=None)",
                "obj_end()",
            ]
        );
    }

    #[test]
    fn test_key_order() {
        let rec = Record::build("T")
            .leaf("b", Kind::Str, &[SchemaFlag::key(2)])
            .leaf("x", Kind::Str, &[])
            .leaf("a", Kind::Str, &[SchemaFlag::key(1)])
            .finish();
        struct Keys(Vec<String>);
        impl VisitConst for Keys {
            fn obj_begin(&mut self, _: &Record, _: &TravCtx) -> bool {
                true
            }
            fn obj_end(&mut self, _: &Record, _: &TravCtx) {}
            fn array_begin(&mut self, _: &VectorField, _: &TravCtx) -> bool {
                false
            }
            fn array_end(&mut self, _: &VectorField, _: &TravCtx) {}
            fn leaf(&mut self, mem: &LeafField, ctx: &TravCtx) {
                assert!(ctx.key_mode());
                self.0.push(mem.name().to_string());
            }
        }
        let mut k = Keys(Vec::new());
        rec.traverse_key(&mut k);
        assert_eq!(k.0, vec!["a", "b"]);
    }
}
