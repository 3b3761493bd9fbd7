use record::{LeafField, Record, SerPolicy, TravCtx, VectorField, VisitConst};

/// Render a record as JSON text under the given policy.
pub fn to_string(rec: &Record, policy: &SerPolicy) -> String {
    let mut dump = Dump {
        p: policy,
        quote: if policy.with_quotes { "\"" } else { "" },
        first: true,
        need_break: false,
        level: 0,
        out: String::new(),
    };
    rec.traverse(&mut dump);
    dump.finish()
}

struct Dump<'p> {
    p: &'p SerPolicy,
    quote: &'static str,
    first: bool,
    need_break: bool,
    level: usize,
    out: String,
}

impl Dump<'_> {
    fn newline(&mut self) {
        if self.need_break && self.p.with_indentation {
            self.out.push('\n');
            for _ in 0..self.level * 2 {
                self.out.push(' ');
            }
        }
        self.need_break = false;
    }

    fn write_key(&mut self, name: &str) {
        self.out.push_str(self.quote);
        self.out.push_str(name);
        self.out.push_str(self.quote);
        self.out.push(':');
    }

    fn finish(mut self) -> String {
        self.newline();
        self.out
    }
}

fn quoted(text: &str) -> String {
    // serde_json writes the escaped, double-quoted form.
    serde_json::to_string(text).expect("string serialization is infallible")
}

impl VisitConst for Dump<'_> {
    fn obj_begin(&mut self, rec: &Record, ctx: &TravCtx) -> bool {
        if rec.is_null() && self.p.omit_null {
            return false;
        }
        if !rec.is_modified() && self.p.mod_only {
            return false;
        }
        if !self.first {
            self.out.push(',');
        }
        self.newline();
        self.first = true;
        if !rec.name().is_empty() && self.level > 0 {
            let name = ctx.render_name(rec.name(), rec.alt_name(), self.p);
            self.write_key(&name);
        }
        if rec.is_null() {
            self.out.push_str("null");
            self.first = false;
            self.need_break = true;
            return false;
        }
        self.out.push('{');
        self.need_break = true;
        self.level += 1;
        true
    }

    fn obj_end(&mut self, _rec: &Record, _ctx: &TravCtx) {
        self.level -= 1;
        self.newline();
        self.out.push('}');
        if self.level == 0 {
            self.need_break = true;
        }
        self.first = false;
    }

    fn array_begin(&mut self, vec: &VectorField, ctx: &TravCtx) -> bool {
        if vec.is_null() && self.p.omit_null {
            return false;
        }
        if !vec.is_modified() && self.p.mod_only {
            return false;
        }
        if !self.first {
            self.out.push(',');
        }
        self.newline();
        self.first = true;
        if self.level > 0 {
            let name = ctx.render_name(vec.name(), vec.alt_name(), self.p);
            self.write_key(&name);
            self.need_break = true;
        }
        if vec.is_null() {
            self.out.push_str("null");
            self.first = false;
            return false;
        }
        self.out.push('[');
        true
    }

    fn array_end(&mut self, _vec: &VectorField, _ctx: &TravCtx) {
        self.out.push(']');
        self.first = false;
        self.need_break = true;
    }

    fn leaf(&mut self, mem: &LeafField, ctx: &TravCtx) {
        if mem.is_null() && self.p.omit_null {
            return;
        }
        if !mem.is_modified() && self.p.mod_only {
            return;
        }
        if !self.first {
            self.out.push(',');
        }
        self.newline();
        self.first = false;
        if !ctx.in_array() {
            let name = ctx.render_name(mem.name(), mem.alt_name(), self.p);
            self.write_key(&name);
        }
        if mem.is_null() {
            self.out.push_str("null");
        } else if mem.is_chartype(self.p.compact) {
            self.out.push_str(&quoted(&mem.to_text(self.p.compact)));
        } else {
            self.out.push_str(&mem.to_text(self.p.compact));
        }
        self.need_break = true;
    }
}
