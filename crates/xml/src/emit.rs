use record::{LeafField, Record, SchemaFlag, SerPolicy, TravCtx, Value, VectorField, VisitConst};

use crate::write::{Charset, Writer};

/// Render a record as a UTF-8 XML document string.
pub fn to_string(rec: &Record, policy: &SerPolicy) -> String {
    let mut w = Writer::new(Charset::Utf8, policy.with_indentation);
    w.head();
    emit(rec, policy, &mut w);
    w.into_string()
}

/// Render a record as document bytes in the given charset.
pub fn to_bytes(rec: &Record, policy: &SerPolicy, charset: Charset) -> Vec<u8> {
    let mut w = Writer::new(charset, policy.with_indentation);
    w.head();
    emit(rec, policy, &mut w);
    w.into_bytes()
}

/// Render onto a caller-configured writer (prefix, value token, charset).
pub fn emit(rec: &Record, policy: &SerPolicy, w: &mut Writer) {
    let mut out = XmlOut {
        w,
        p: policy,
        elements: Vec::new(),
    };
    rec.traverse(&mut out);
    // Close a scope left open by an aborted walk.
    out.w.stop_encrypt();
}

/// Traversal visitor rendering records as XML elements.
pub struct XmlOut<'w, 'p> {
    w: &'w mut Writer,
    p: &'p SerPolicy,
    elements: Vec<String>,
}

impl XmlOut<'_, '_> {
    /// Elements inside a vector carry the vector's name; everything else
    /// renders its own.
    fn element_name(&self, ori: &str, alt: Option<&str>, ctx: &TravCtx) -> String {
        match self.elements.last() {
            Some(top) if !top.is_empty() => top.clone(),
            _ => ctx.render_name(ori, alt, self.p),
        }
    }

    fn maybe_stop_encrypt(&mut self) {
        if self.w.enc_stop_level() == Some(self.w.level()) {
            self.w.stop_encrypt();
        }
    }
}

impl VisitConst for XmlOut<'_, '_> {
    fn obj_begin(&mut self, rec: &Record, ctx: &TravCtx) -> bool {
        if rec.is_null() && self.p.omit_null {
            return false;
        }
        let mut name = self.element_name(rec.name(), rec.alt_name(), ctx);
        if name.is_empty() {
            name = if rec.has_flag(&SchemaFlag::OTypeAsXRoot) {
                rec.type_name().to_string()
            } else {
                "root".to_string()
            };
        }

        if !self.w.encrypting() && rec.has_flag(&SchemaFlag::XmlEncrypt) {
            if let Some(factory) = &self.p.encrypt {
                self.w.start_encrypt(factory());
            }
        }

        self.w.tag_begin(&name);
        if rec.is_null() {
            self.w.tag_end();
            self.maybe_stop_encrypt();
            return false;
        }
        self.elements.push(String::new());
        true
    }

    fn obj_end(&mut self, _rec: &Record, _ctx: &TravCtx) {
        self.elements.pop();
        self.w.tag_end();
        self.maybe_stop_encrypt();
    }

    fn array_begin(&mut self, vec: &VectorField, ctx: &TravCtx) -> bool {
        // Null vectors are skipped entirely, unlike in JSON.
        if vec.is_null() {
            return false;
        }
        self.elements
            .push(ctx.render_name(vec.name(), vec.alt_name(), self.p));
        true
    }

    fn array_end(&mut self, _vec: &VectorField, _ctx: &TravCtx) {
        self.elements.pop();
    }

    fn leaf(&mut self, mem: &LeafField, ctx: &TravCtx) {
        if mem.is_null() && self.p.omit_null {
            return;
        }
        let name = self.element_name(mem.name(), mem.alt_name(), ctx);

        let encrypt = !self.w.encrypting()
            && mem.has_flag(&SchemaFlag::XmlEncrypt)
            && self.p.encrypt.is_some();

        if mem.has_flag(&SchemaFlag::XmlAsAttr) && self.w.attribute_allowed() && !encrypt {
            if !mem.is_null() {
                self.w.attribute(&name, &mem.to_text(self.p.compact));
            }
            return;
        }

        if encrypt {
            if let Some(factory) = &self.p.encrypt {
                self.w.start_encrypt(factory());
            }
        }
        self.w.tag_begin(&name);
        if !mem.is_null() {
            let info = mem.mem_info();
            if info.is_blob {
                if let Value::Bytes(bytes) = mem.value() {
                    self.w.base64(bytes);
                }
            } else if let Some(token) = self.w.value_token() {
                self.w.attribute(&token, &mem.to_text(self.p.compact));
            } else {
                self.w.value(&mem.to_text(self.p.compact));
            }
        }
        self.w.tag_end();
        if encrypt {
            self.maybe_stop_encrypt();
        }
    }
}
