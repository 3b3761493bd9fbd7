use std::io::Cursor;

use quick_xml::events::Event;
use quick_xml::Reader as QReader;

use record::{CryptBuf, Idx, Kind, Navigator, ParsePolicy, Record, SchemaFlag};

use crate::Error;

const XMLENC_NS: &str = "http://www.w3.org/2001/04/xmlenc#";
const XMLENC_ELEMENT_TYPE: &str = "http://www.w3.org/2001/04/xmlenc#Element";

/// Callbacks of the event-driven reader. Everything the filling machinery
/// does not consume is forwarded here.
pub trait Handler {
    fn start_tag(&mut self, rd: &mut XmlReader, element: &str) {
        let _ = (rd, element);
    }

    fn end_tag(&mut self, rd: &mut XmlReader, element: &str) {
        let _ = (rd, element);
    }

    /// An empty element. The default treats it like its end tag.
    fn null_tag(&mut self, rd: &mut XmlReader, element: &str) {
        self.end_tag(rd, element);
    }

    fn attribute(&mut self, rd: &mut XmlReader, element: &str, name: &str, value: &str) {
        let _ = (rd, element, name, value);
    }

    fn value(&mut self, rd: &mut XmlReader, text: &str) {
        let _ = (rd, text);
    }

    /// Decoded CDATA payload.
    fn base64(&mut self, rd: &mut XmlReader, data: &[u8]) {
        let _ = (rd, data);
    }

    fn processing_instruction(&mut self, rd: &mut XmlReader, text: &str) {
        let _ = (rd, text);
    }

    /// A record handed to [`XmlReader::fill`] is complete. `error`
    /// collects per-field coercion problems, one line each.
    fn filled(&mut self, rd: &mut XmlReader, rec: Record, error: Option<String>);

    /// Provide a decryption stage for an EncryptedData envelope, or `None`
    /// when the recipient is unknown.
    fn encrypt(&mut self, algorithm: &str, key_info: &Record) -> Option<Box<dyn CryptBuf>> {
        let _ = (algorithm, key_info);
        None
    }

    /// The EncryptedData envelope closed.
    fn encryption_finished(&mut self) {}
}

/// Owned form of one tokenizer event.
enum Ev {
    Start {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Empty {
        name: String,
        attrs: Vec<(String, String)>,
    },
    End {
        name: String,
    },
    Text(String),
    CData(String),
    Pi(String),
    Eof,
    Other,
}

/// Event-driven XML reader feeding the navigator.
///
/// `fill` hands it a record to populate from the current element level;
/// the matching end tag returns it through [`Handler::filled`]. Inside an
/// `EncryptedData` envelope the reader parses the nested KeyInfo as a
/// record of its own, asks the handler for a cipher, and replays the
/// decrypted markup through the ordinary event path.
pub struct XmlReader {
    rdr: QReader<Cursor<Vec<u8>>>,
    buf: Vec<u8>,
    prefix: String,
    depth: usize,
    seen_root: bool,
    stop_req: bool,
    eof: bool,

    obj: Option<Record>,
    nav: Navigator,
    level_start: usize,
    error: String,

    enc_level: u8,
    enc_algo: String,
    enc_cipher: Option<Box<dyn CryptBuf>>,
    cipher_b64: String,
    ki: Option<Record>,
    ki_nav: Navigator,
    ki_level: usize,
}

fn local_name(element: &str) -> &str {
    element.rsplit(':').next().unwrap_or(element)
}

fn cipher_record() -> Record {
    Record::build("Cipher")
        .leaf("CipherValue", Kind::Str, &[])
        .finish()
}

fn key_info_record() -> Record {
    Record::build("KeyInfo")
        .leaf("KeyName", Kind::Str, &[SchemaFlag::InitialNull])
        .sub("CipherData", cipher_record(), &[SchemaFlag::InitialNull])
        .finish()
}

fn push_error(error: &mut String, line: String) {
    if !error.is_empty() {
        error.push('\n');
    }
    error.push_str(&line);
}

fn sniff_encoding_label(input: &[u8]) -> Option<String> {
    let head = String::from_utf8_lossy(&input[..input.len().min(256)]).into_owned();
    let pos = head.find("encoding")?;
    let rest = head[pos + "encoding".len()..].trim_start();
    let rest = rest.strip_prefix('=')?.trim_start();
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

/// Decode raw bytes of unknown charset: BOM first, then the declaration's
/// encoding attribute, defaulting to UTF-8.
fn decode_input(input: &[u8]) -> Result<String, Error> {
    let encoding = if input.starts_with(&[0xFF, 0xFE]) {
        encoding_rs::UTF_16LE
    } else if input.starts_with(&[0xFE, 0xFF]) {
        encoding_rs::UTF_16BE
    } else {
        sniff_encoding_label(input)
            .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
            .unwrap_or(encoding_rs::UTF_8)
    };
    let (text, _, malformed) = encoding.decode(input);
    if malformed {
        return Err(Error::Charset);
    }
    Ok(text.into_owned())
}

impl XmlReader {
    /// Input already known to be UTF-8.
    pub fn from_str(input: &str, policy: &ParsePolicy) -> XmlReader {
        Self::with_text(input.to_string(), policy)
    }

    /// Raw bytes; the charset is detected from BOM or XML declaration
    /// (UTF-8, ISO-8859-1, ISO-8859-9, ISO-8859-15, UTF-16).
    pub fn from_bytes(input: &[u8], policy: &ParsePolicy) -> Result<XmlReader, Error> {
        Ok(Self::with_text(decode_input(input)?, policy))
    }

    fn with_text(text: String, policy: &ParsePolicy) -> XmlReader {
        let mut rdr = QReader::from_reader(Cursor::new(text.into_bytes()));
        rdr.trim_text(true);
        XmlReader {
            rdr,
            buf: Vec::new(),
            prefix: String::new(),
            depth: 0,
            seen_root: false,
            stop_req: false,
            eof: false,
            obj: None,
            nav: Navigator::new(policy.clone()),
            level_start: 0,
            error: String::new(),
            enc_level: 0,
            enc_algo: String::new(),
            enc_cipher: None,
            cipher_b64: String::new(),
            ki: None,
            ki_nav: Navigator::new(ParsePolicy::default()),
            ki_level: 0,
        }
    }

    /// Expected element-name prefix; parsed names must carry it.
    pub fn set_prefix(&mut self, prefix: &str) {
        self.prefix = prefix.to_string();
    }

    /// Strip the configured prefix, or fail on mismatch.
    pub fn element_remove_prefix(&self, element: &str) -> Result<String, Error> {
        if self.prefix.is_empty() {
            return Ok(element.to_string());
        }
        if element.len() > self.prefix.len() && element.starts_with(&self.prefix) {
            return Ok(element[self.prefix.len()..].to_string());
        }
        Err(Error::PrefixMismatch {
            element: element.to_string(),
        })
    }

    /// Begin populating `rec` from the current element level.
    pub fn fill(&mut self, rec: Record) {
        self.nav.start();
        self.obj = Some(rec);
        self.level_start = self.depth;
        self.error.clear();
    }

    /// Request a cooperative return from `parse` at the next end tag.
    pub fn stop(&mut self) {
        self.stop_req = true;
    }

    pub fn eof(&self) -> bool {
        self.eof
    }

    /// True once the root element has closed.
    pub fn eot(&self) -> bool {
        self.seen_root && self.depth == 0
    }

    /// Current element depth; the root element is level 1.
    pub fn level(&self) -> usize {
        self.depth
    }

    /// Process events until end of input or a cooperative stop. Returns
    /// true at end of input, false when stopped; call again to resume.
    pub fn parse(&mut self, h: &mut dyn Handler) -> Result<bool, Error> {
        loop {
            if self.eof {
                return Ok(true);
            }
            let ev = match self.rdr.read_event(&mut self.buf) {
                Ok(ev) => ev,
                Err(source) => {
                    return Err(Error::Xml {
                        pos: self.rdr.buffer_position(),
                        source,
                    })
                }
            };
            let owned = own_event(ev, &self.rdr)?;
            self.buf.clear();
            let ends_element = matches!(owned, Ev::End { .. } | Ev::Empty { .. });
            self.dispatch(owned, h)?;
            if self.eof {
                return Ok(true);
            }
            if ends_element && self.stop_req {
                self.stop_req = false;
                return Ok(false);
            }
        }
    }

    fn dispatch(&mut self, ev: Ev, h: &mut dyn Handler) -> Result<(), Error> {
        match ev {
            Ev::Start { name, attrs } => {
                self.depth += 1;
                self.seen_root = true;
                self.on_start(&name, &attrs, h)
            }
            Ev::Empty { name, attrs } => {
                self.depth += 1;
                self.seen_root = true;
                self.on_start(&name, &attrs, h)?;
                self.on_null_tag(&name, h)?;
                self.depth -= 1;
                Ok(())
            }
            Ev::End { name } => {
                self.on_end(&name, h)?;
                self.depth -= 1;
                Ok(())
            }
            Ev::Text(text) => self.on_value(&text, h),
            Ev::CData(text) => self.on_cdata(&text, h),
            Ev::Pi(text) => {
                h.processing_instruction(self, &text);
                Ok(())
            }
            Ev::Eof => {
                self.eof = true;
                Ok(())
            }
            Ev::Other => Ok(()),
        }
    }

    fn on_start(
        &mut self,
        raw: &str,
        attrs: &[(String, String)],
        h: &mut dyn Handler,
    ) -> Result<(), Error> {
        let local = local_name(raw);

        // The encryption envelope is recognized before any filling logic;
        // its elements never reach the navigator.
        if local == "EncryptedData"
            && attrs
                .iter()
                .any(|(k, v)| local_name(k) == "Type" && v == XMLENC_ELEMENT_TYPE)
        {
            self.enc_level = 1;
            self.enc_cipher = None;
            self.enc_algo.clear();
            return Ok(());
        }
        if self.enc_level == 1 && self.ki.is_none() && local == "EncryptionMethod" {
            if let Some((_, v)) = attrs.iter().find(|(k, _)| local_name(k) == "Algorithm") {
                self.enc_algo = v.strip_prefix(XMLENC_NS).unwrap_or(v).to_string();
            }
            return Ok(());
        }
        if self.enc_level == 1 && self.ki.is_none() && local == "KeyInfo" {
            self.ki = Some(key_info_record());
            self.ki_nav.start();
            self.ki_level = self.depth;
            return Ok(());
        }
        if self.enc_level == 1 && self.ki.is_none() && local == "CipherData" {
            self.enc_level = 2;
            return Ok(());
        }
        if self.enc_level == 2 && self.ki.is_none() && local == "CipherValue" {
            self.enc_level = 3;
            self.cipher_b64.clear();
            return Ok(());
        }

        if let Some(ki) = self.ki.as_mut() {
            let _ = self.ki_nav.enter(ki, local, Idx::Next);
            return Ok(());
        }

        if self.obj.is_some() {
            let element = self.element_remove_prefix(raw)?;
            self.filling_enter(&element)?;
            self.filling_attributes(attrs);
            return Ok(());
        }

        h.start_tag(self, raw);
        // The handler may have called fill() for this very element; its
        // attributes then belong to the fresh object.
        if self.obj.is_some() && self.level_start == self.depth {
            self.filling_attributes(attrs);
        } else {
            for (name, value) in attrs {
                h.attribute(self, raw, name, value);
            }
        }
        Ok(())
    }

    fn filling_enter(&mut self, element: &str) -> Result<(), Error> {
        let Some(obj) = self.obj.as_mut() else {
            return Ok(());
        };
        match self.nav.enter(obj, element, Idx::Next) {
            Ok(_) => Ok(()),
            Err(record::Error::UnknownElement { .. }) => {
                push_error(&mut self.error, format!("{element} not found"));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn filling_attributes(&mut self, attrs: &[(String, String)]) {
        let Some(obj) = self.obj.as_mut() else {
            return;
        };
        for (name, value) in attrs {
            if self.nav.on_member() {
                continue;
            }
            let entered = match self.nav.enter(obj, name, Idx::Solo) {
                Ok(found) => found,
                Err(_) => false,
            };
            if entered
                && self.nav.on_member()
                && self.nav.member_has_flag(obj, &SchemaFlag::XmlAsAttr)
            {
                if let Err(e) = self.nav.assign_str(obj, value) {
                    push_error(
                        &mut self.error,
                        format!("invalid type in variable {} can't assign: {e}", self.nav.show_name()),
                    );
                }
            }
            let _ = self.nav.leave(None);
        }
    }

    fn on_value(&mut self, text: &str, h: &mut dyn Handler) -> Result<(), Error> {
        if self.enc_level == 3 && self.ki.is_none() {
            self.cipher_b64.push_str(text);
            return Ok(());
        }
        if let Some(ki) = self.ki.as_mut() {
            if self.ki_nav.on_member() {
                let _ = self.ki_nav.assign_str(ki, text);
            }
            return Ok(());
        }
        if let Some(obj) = self.obj.as_mut() {
            if !self.nav.on_member() {
                push_error(
                    &mut self.error,
                    format!("{} is no variable, can't assign", self.nav.show_name()),
                );
            } else if let Err(e) = self.nav.assign_str(obj, text) {
                push_error(
                    &mut self.error,
                    format!("invalid type in variable {} can't assign: {e}", self.nav.show_name()),
                );
            }
            return Ok(());
        }
        h.value(self, text);
        Ok(())
    }

    fn on_cdata(&mut self, text: &str, h: &mut dyn Handler) -> Result<(), Error> {
        if self.enc_level == 3 && self.ki.is_none() {
            self.cipher_b64.push_str(text);
            return Ok(());
        }
        if self.obj.is_some() || self.ki.is_some() {
            return self.on_value(text, h);
        }
        match base64::decode(text.trim()) {
            Ok(data) => h.base64(self, &data),
            Err(_) => h.value(self, text),
        }
        Ok(())
    }

    fn on_null_tag(&mut self, raw: &str, h: &mut dyn Handler) -> Result<(), Error> {
        let local = local_name(raw);
        if self.enc_level >= 1
            && matches!(
                local,
                "EncryptedData" | "EncryptionMethod" | "CipherData" | "CipherValue"
            )
            && self.ki.is_none()
        {
            return self.on_end(raw, h);
        }
        if self.ki.is_some() {
            if let Some(ki) = self.ki.as_mut() {
                let _ = self.ki_nav.set_null(ki);
            }
            return self.on_end(raw, h);
        }
        if self.obj.is_some() {
            if let Some(obj) = self.obj.as_mut() {
                self.nav.set_null(obj)?;
            }
            return self.on_end(raw, h);
        }
        h.null_tag(self, raw);
        Ok(())
    }

    fn on_end(&mut self, raw: &str, h: &mut dyn Handler) -> Result<(), Error> {
        let local = local_name(raw);

        if self.ki.is_some() {
            if self.depth == self.ki_level {
                let ki = self.ki.take().unwrap_or_else(key_info_record);
                tracing::debug!(
                    key_name = %ki.get_str("KeyName", false).unwrap_or_default(),
                    "encryption KeyInfo complete"
                );
                if self.enc_cipher.is_none() {
                    self.enc_cipher = h.encrypt(&self.enc_algo, &ki);
                }
            } else {
                let _ = self.ki_nav.leave(Some(local));
            }
            return Ok(());
        }

        match (self.enc_level, local) {
            (3, "CipherValue") => {
                self.enc_level = 2;
                return self.run_decrypted(h);
            }
            (2, "CipherData") => {
                self.enc_level = 1;
                return Ok(());
            }
            (1, "EncryptedData") => {
                self.enc_level = 0;
                self.enc_cipher = None;
                h.encryption_finished();
                return Ok(());
            }
            (1, "EncryptionMethod") => return Ok(()),
            _ => {}
        }

        if self.obj.is_some() {
            if self.depth == self.level_start {
                let rec = match self.obj.take() {
                    Some(rec) => rec,
                    None => return Ok(()),
                };
                self.level_start = 0;
                let error = if self.error.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut self.error))
                };
                h.filled(self, rec, error);
                h.end_tag(self, raw);
            } else {
                let element = self.element_remove_prefix(raw)?;
                self.nav.leave(Some(&element)).map_err(Error::from)?;
            }
            return Ok(());
        }

        h.end_tag(self, raw);
        Ok(())
    }

    /// Decode and decrypt the collected cipher payload, then replay the
    /// recovered markup through the ordinary event path.
    fn run_decrypted(&mut self, h: &mut dyn Handler) -> Result<(), Error> {
        let payload: String = self
            .cipher_b64
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        self.cipher_b64.clear();
        let Some(mut cipher) = self.enc_cipher.take() else {
            tracing::debug!("no decryption stage provided, cipher payload skipped");
            return Ok(());
        };
        let ciphertext = base64::decode(&payload)?;
        let mut plain = Vec::new();
        cipher.update(&ciphertext, &mut plain);
        cipher.finalize(&mut plain);

        let mut rdr = QReader::from_reader(Cursor::new(plain));
        rdr.trim_text(true);
        let mut buf = Vec::new();
        loop {
            let ev = match rdr.read_event(&mut buf) {
                Ok(Event::Eof) => break,
                Ok(ev) => ev,
                Err(source) => {
                    return Err(Error::Xml {
                        pos: rdr.buffer_position(),
                        source,
                    })
                }
            };
            let owned = own_event(ev, &rdr)?;
            buf.clear();
            self.dispatch(owned, h)?;
        }
        Ok(())
    }
}

fn own_event<B: std::io::BufRead>(ev: Event<'_>, rdr: &QReader<B>) -> Result<Ev, Error> {
    let xml_err = |source: quick_xml::Error| Error::Xml {
        pos: rdr.buffer_position(),
        source,
    };
    Ok(match ev {
        Event::Start(e) => Ev::Start {
            name: String::from_utf8_lossy(e.name()).into_owned(),
            attrs: own_attrs(&e, rdr)?,
        },
        Event::Empty(e) => Ev::Empty {
            name: String::from_utf8_lossy(e.name()).into_owned(),
            attrs: own_attrs(&e, rdr)?,
        },
        Event::End(e) => Ev::End {
            name: String::from_utf8_lossy(e.name()).into_owned(),
        },
        Event::Text(e) => Ev::Text(e.unescape_and_decode(rdr).map_err(xml_err)?),
        Event::CData(e) => Ev::CData(e.unescape_and_decode(rdr).map_err(xml_err)?),
        Event::Decl(_) => Ev::Pi("xml".to_string()),
        Event::Eof => Ev::Eof,
        _ => Ev::Other,
    })
}

fn own_attrs<B: std::io::BufRead>(
    e: &quick_xml::events::BytesStart<'_>,
    rdr: &QReader<B>,
) -> Result<Vec<(String, String)>, Error> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|source| Error::Xml {
            pos: rdr.buffer_position(),
            source,
        })?;
        let key = String::from_utf8_lossy(attr.key).into_owned();
        let value = attr.unescape_and_decode_value(rdr).map_err(|source| Error::Xml {
            pos: rdr.buffer_position(),
            source,
        })?;
        out.push((key, value));
    }
    Ok(out)
}

/// Populate `rec` from an XML document string. The root element must be
/// `root`, or the record's type name when `OTypeAsXRoot` is declared.
pub fn from_str(rec: &mut Record, input: &str, policy: &ParsePolicy) -> Result<(), Error> {
    let mut rd = XmlReader::from_str(input, policy);
    read_into(rec, &mut rd, policy)
}

/// Like [`from_str`], for raw bytes of auto-detected charset.
pub fn from_bytes(rec: &mut Record, input: &[u8], policy: &ParsePolicy) -> Result<(), Error> {
    let mut rd = XmlReader::from_bytes(input, policy)?;
    read_into(rec, &mut rd, policy)
}

fn read_into(rec: &mut Record, rd: &mut XmlReader, policy: &ParsePolicy) -> Result<(), Error> {
    struct Root<'a> {
        target: &'a mut Record,
        taken: bool,
        done: bool,
        error: Option<String>,
        decrypt: Option<record::DecryptFactory>,
    }

    impl Handler for Root<'_> {
        fn start_tag(&mut self, rd: &mut XmlReader, element: &str) {
            if self.taken || self.done {
                return;
            }
            let Ok(local) = rd.element_remove_prefix(element) else {
                return;
            };
            let is_root = local == "root"
                || (self.target.has_flag(&SchemaFlag::OTypeAsXRoot)
                    && local == self.target.type_name());
            if is_root {
                let rec = std::mem::replace(self.target, Record::build("").finish());
                rd.fill(rec);
                self.taken = true;
            }
        }

        fn filled(&mut self, _rd: &mut XmlReader, rec: Record, error: Option<String>) {
            *self.target = rec;
            self.taken = false;
            self.done = true;
            if let Some(error) = error {
                self.error = Some(error);
            }
        }

        fn encrypt(&mut self, algorithm: &str, key_info: &Record) -> Option<Box<dyn CryptBuf>> {
            self.decrypt.as_ref().and_then(|f| f(algorithm, key_info))
        }
    }

    let mut root = Root {
        target: rec,
        taken: false,
        done: false,
        error: None,
        decrypt: policy.decrypt.clone(),
    };
    rd.parse(&mut root)?;
    if let Some(error) = root.error {
        return Err(Error::Fields(error));
    }
    if !root.done {
        return Err(Error::NoRoot);
    }
    Ok(())
}
