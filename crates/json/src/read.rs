use record::{Idx, Navigator, ParsePolicy, Record};

use crate::parse::{parse, Sink};
use crate::Error;

/// Populate `rec` from JSON text. The record keeps whatever the input does
/// not mention; clear it first for a fresh load.
pub fn from_str(rec: &mut Record, input: &str, policy: &ParsePolicy) -> Result<(), Error> {
    let mut nav = Navigator::new(policy.clone());
    nav.start();
    let mut reader = Reader {
        root: rec,
        nav,
        level: 0,
        idx: None,
        last_key: String::new(),
        stack: Vec::new(),
    };
    parse(input, &mut reader)
}

/// Bridges parser events onto the navigator: a depth counter, the last
/// key seen, and the running array index.
struct Reader<'a> {
    root: &'a mut Record,
    nav: Navigator,
    level: u32,
    idx: Option<usize>,
    last_key: String,
    stack: Vec<Option<usize>>,
}

fn to_idx(idx: Option<usize>) -> Idx {
    match idx {
        None => Idx::Solo,
        Some(n) => Idx::At(n),
    }
}

impl Sink for Reader<'_> {
    fn key(&mut self, name: &str) -> Result<(), Error> {
        self.last_key = name.to_string();
        Ok(())
    }

    fn value(&mut self, text: &str, quoted: bool) -> Result<(), Error> {
        if self.nav.enter(self.root, &self.last_key, to_idx(self.idx))? {
            if !quoted && text == "null" {
                self.nav.set_null(self.root)?;
            } else {
                self.nav.assign_str(self.root, text)?;
            }
        }
        if let Some(i) = self.idx.as_mut() {
            *i += 1;
        }
        self.nav.leave(None)?;
        Ok(())
    }

    fn start_object(&mut self) -> Result<(), Error> {
        self.level += 1;
        if self.level > 1 {
            self.nav.enter(self.root, &self.last_key, to_idx(self.idx))?;
        }
        self.stack.push(self.idx);
        self.idx = None;
        Ok(())
    }

    fn end_object(&mut self) -> Result<(), Error> {
        self.last_key = self.nav.current().to_string();
        self.idx = match self.stack.pop() {
            Some(prev) => prev,
            None => return Err(record::Error::StackUnderflow.into()),
        };
        let level = self.level;
        self.level -= 1;
        if level > 1 {
            self.nav.leave(None)?;
        }
        if let Some(i) = self.idx.as_mut() {
            *i += 1;
        }
        Ok(())
    }

    fn start_array(&mut self) -> Result<(), Error> {
        self.idx = Some(0);
        Ok(())
    }

    fn end_array(&mut self) -> Result<(), Error> {
        self.idx = None;
        Ok(())
    }
}
