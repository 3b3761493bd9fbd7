use record::CryptBuf;

/// Output charset of a [`Writer`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Utf16Le,
}

/// Streaming XML writer.
///
/// A begin tag stays open until the first content arrives, so attributes
/// can follow it; an element closed without content collapses to
/// `<name/>`. While an encryption scope is open, all markup is routed
/// through the cipher and lands base64-encoded in the `CipherValue` of the
/// surrounding envelope.
pub struct Writer {
    out: String,
    charset: Charset,
    indent: bool,
    open_tag: bool,
    stack: Vec<String>,
    child_flags: Vec<bool>,
    prefix: String,
    value_token: Option<String>,
    enc: Option<EncScope>,
}

struct EncScope {
    cipher: Box<dyn CryptBuf>,
    stop_level: usize,
    cipher_text: Vec<u8>,
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

impl Writer {
    pub fn new(charset: Charset, indent: bool) -> Writer {
        Writer {
            out: String::new(),
            charset,
            indent,
            open_tag: false,
            stack: Vec::new(),
            child_flags: Vec::new(),
            prefix: String::new(),
            value_token: None,
            enc: None,
        }
    }

    /// Prefix prepended to every element name, e.g. `m:`.
    pub fn set_prefix(&mut self, prefix: &str) {
        self.prefix = prefix.to_string();
    }

    /// When set, leaf values are written as this attribute instead of as
    /// element content.
    pub fn set_value_token(&mut self, token: Option<&str>) {
        self.value_token = token.map(str::to_string);
    }

    pub fn value_token(&self) -> Option<String> {
        self.value_token.clone()
    }

    /// Open element depth.
    pub fn level(&self) -> usize {
        self.stack.len()
    }

    pub fn head(&mut self) {
        let name = match self.charset {
            Charset::Utf8 => "UTF-8",
            Charset::Utf16Le => "UTF-16",
        };
        self.out.push_str(&format!(
            "<?xml version=\"1.0\" encoding=\"{name}\" standalone=\"yes\"?>\n"
        ));
    }

    /// Route markup through the cipher while an encryption scope is open.
    fn push(&mut self, s: &str) {
        match &mut self.enc {
            Some(enc) => enc.cipher.update(s.as_bytes(), &mut enc.cipher_text),
            None => self.out.push_str(s),
        }
    }

    fn close_pending(&mut self) {
        if self.open_tag {
            self.push(">");
            self.open_tag = false;
        }
    }

    fn break_line(&mut self) {
        if !self.indent {
            return;
        }
        let mut line = String::from("\n");
        for _ in 0..self.stack.len() * 2 {
            line.push(' ');
        }
        self.push(&line);
    }

    pub fn tag_begin(&mut self, name: &str) {
        self.close_pending();
        self.break_line();
        if let Some(flag) = self.child_flags.last_mut() {
            *flag = true;
        }
        self.push(&format!("<{}{}", self.prefix, name));
        self.open_tag = true;
        self.stack.push(name.to_string());
        self.child_flags.push(false);
    }

    /// True while a begin tag is still open for attributes.
    pub fn attribute_allowed(&self) -> bool {
        self.open_tag
    }

    pub fn attribute(&mut self, name: &str, value: &str) {
        if !self.open_tag {
            tracing::debug!(name, "attribute after tag close dropped");
            return;
        }
        self.push(&format!(" {}=\"{}\"", name, escape_attr(value)));
    }

    pub fn value(&mut self, text: &str) {
        self.close_pending();
        self.push(&escape_text(text));
    }

    pub fn base64(&mut self, data: &[u8]) {
        self.close_pending();
        self.push(&base64::encode(data));
    }

    pub fn tag_end(&mut self) {
        let name = self.stack.pop().unwrap_or_default();
        let had_children = self.child_flags.pop().unwrap_or(false);
        if self.open_tag {
            self.push("/>");
            self.open_tag = false;
        } else {
            if had_children {
                self.break_line();
            }
            self.push(&format!("</{}{}>", self.prefix, name));
        }
    }

    /// Open an encryption scope: write the EncryptedData envelope up to
    /// the cipher payload, then route markup through the cipher.
    pub fn start_encrypt(&mut self, cipher: Box<dyn CryptBuf>) {
        if self.enc.is_some() {
            return;
        }
        self.close_pending();
        self.break_line();
        let algorithm = escape_attr(cipher.algorithm());
        let key_name = cipher.key_name();
        self.out.push_str(
            "<EncryptedData Type=\"http://www.w3.org/2001/04/xmlenc#Element\" \
             xmlns=\"http://www.w3.org/2001/04/xmlenc#\">",
        );
        self.out.push_str(&format!(
            "<EncryptionMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#{algorithm}\"/>"
        ));
        if !key_name.is_empty() {
            self.out.push_str(&format!(
                "<KeyInfo xmlns=\"http://www.w3.org/2000/09/xmldsig#\">\
                 <KeyName>{}</KeyName></KeyInfo>",
                escape_text(&key_name)
            ));
        }
        self.out.push_str("<CipherData><CipherValue>");
        self.enc = Some(EncScope {
            cipher,
            stop_level: self.level(),
            cipher_text: Vec::new(),
        });
    }

    pub fn encrypting(&self) -> bool {
        self.enc.is_some()
    }

    /// Element depth at which the open encryption scope closes.
    pub fn enc_stop_level(&self) -> Option<usize> {
        self.enc.as_ref().map(|e| e.stop_level)
    }

    /// Finalize the cipher and close the envelope. Without an open scope
    /// this is a no-op, so it is safe on every exit path.
    pub fn stop_encrypt(&mut self) {
        let Some(mut enc) = self.enc.take() else {
            return;
        };
        enc.cipher.finalize(&mut enc.cipher_text);
        self.out.push_str(&base64::encode(&enc.cipher_text));
        self.out
            .push_str("</CipherValue></CipherData></EncryptedData>");
    }

    pub fn into_string(self) -> String {
        self.out
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self.charset {
            Charset::Utf8 => self.out.into_bytes(),
            Charset::Utf16Le => {
                let mut bytes = vec![0xFF, 0xFE];
                for unit in self.out.encode_utf16() {
                    bytes.extend_from_slice(&unit.to_le_bytes());
                }
                bytes
            }
        }
    }
}
