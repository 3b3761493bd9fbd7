use std::rc::Rc;

use crate::crypt::CryptBuf;
use crate::Record;

/// Produces a fresh cipher stage for each encrypted output scope.
pub type EncryptFactory = Rc<dyn Fn() -> Box<dyn CryptBuf>>;

/// Resolves a decryption stage from the envelope's algorithm and KeyInfo,
/// or `None` when the recipient is unknown.
pub type DecryptFactory = Rc<dyn Fn(&str, &Record) -> Option<Box<dyn CryptBuf>>>;

/// How a parsed `null` is applied to its target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NullPolicy {
    /// Leave the target untouched.
    Omit,
    /// Force the target null regardless of its declaration.
    Force,
    /// Clear non-nullable targets to their empty value, null the rest.
    Clear,
    /// Error when the target does not allow null.
    Except,
    /// Skip targets that do not allow null.
    Ignore,
}

impl Default for NullPolicy {
    fn default() -> Self {
        NullPolicy::Force
    }
}

/// Serialization policy shared by the JSON and XML emitters.
#[derive(Clone, Default)]
pub struct SerPolicy {
    /// Quote object keys.
    pub with_quotes: bool,
    /// Pretty-print; never changes semantics.
    pub with_indentation: bool,
    /// Skip null-valued fields.
    pub omit_null: bool,
    /// Emit only fields with the modified flag set.
    pub mod_only: bool,
    /// Use alternative names instead of the original ones.
    pub use_alt_names: bool,
    /// Prepend parent prefix tokens.
    pub use_prefix: bool,
    /// Lowercase serialized names.
    pub to_lowercase: bool,
    /// Prefer compact value forms (numeric enums, epoch times).
    pub compact: bool,
    /// Cipher factory for encrypted sub-elements.
    pub encrypt: Option<EncryptFactory>,
}

impl SerPolicy {
    pub fn quoted(mut self) -> Self {
        self.with_quotes = true;
        self
    }

    pub fn indented(mut self) -> Self {
        self.with_indentation = true;
        self
    }

    pub fn skip_null(mut self) -> Self {
        self.omit_null = true;
        self
    }

    pub fn modified_only(mut self) -> Self {
        self.mod_only = true;
        self
    }

    pub fn alt_names(mut self) -> Self {
        self.use_alt_names = true;
        self
    }

    pub fn prefixed(mut self) -> Self {
        self.use_prefix = true;
        self
    }

    pub fn lowercase(mut self) -> Self {
        self.to_lowercase = true;
        self
    }

    pub fn compact(mut self) -> Self {
        self.compact = true;
        self
    }

    pub fn encrypt_with(mut self, f: EncryptFactory) -> Self {
        self.encrypt = Some(f);
        self
    }
}

impl std::fmt::Debug for SerPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerPolicy")
            .field("with_quotes", &self.with_quotes)
            .field("with_indentation", &self.with_indentation)
            .field("omit_null", &self.omit_null)
            .field("mod_only", &self.mod_only)
            .field("use_alt_names", &self.use_alt_names)
            .field("use_prefix", &self.use_prefix)
            .field("to_lowercase", &self.to_lowercase)
            .field("compact", &self.compact)
            .field("encrypt", &self.encrypt.is_some())
            .finish()
    }
}

/// Deserialization hints consulted by the navigator and the readers.
#[derive(Clone)]
pub struct ParsePolicy {
    /// Match children by their original names.
    pub accept_ori_names: bool,
    /// Match children by their alternative names.
    pub accept_alt_names: bool,
    /// Accept compact value forms.
    pub accept_compact: bool,
    /// Accept extended value forms (enum tokens, RFC 3339 times).
    pub accept_extended: bool,
    /// Fold case when matching names.
    pub case_insensitive: bool,
    /// Error on unknown elements instead of skipping them.
    pub exception_if_unknown: bool,
    /// Shrink a vector down to an indexed write below its size.
    pub shrink_array: bool,
    /// Veto shrinking even when `shrink_array` is set.
    pub dont_shrink: bool,
    /// Null assignment behavior.
    pub null_handling: NullPolicy,
    /// Cipher factory for encrypted input scopes.
    pub decrypt: Option<DecryptFactory>,
}

impl Default for ParsePolicy {
    fn default() -> Self {
        ParsePolicy {
            accept_ori_names: true,
            accept_alt_names: false,
            accept_compact: true,
            accept_extended: true,
            case_insensitive: false,
            exception_if_unknown: false,
            shrink_array: false,
            dont_shrink: false,
            null_handling: NullPolicy::default(),
            decrypt: None,
        }
    }
}

impl ParsePolicy {
    pub fn alt_names(mut self) -> Self {
        self.accept_alt_names = true;
        self
    }

    pub fn only_alt_names(mut self) -> Self {
        self.accept_ori_names = false;
        self.accept_alt_names = true;
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Unknown elements become errors instead of skipped structure.
    pub fn strict_names(mut self) -> Self {
        self.exception_if_unknown = true;
        self
    }

    pub fn shrink(mut self) -> Self {
        self.shrink_array = true;
        self
    }

    pub fn nulls(mut self, p: NullPolicy) -> Self {
        self.null_handling = p;
        self
    }

    pub fn decrypt_with(mut self, f: DecryptFactory) -> Self {
        self.decrypt = Some(f);
        self
    }

    /// Hints for the textual fallback of `do_copy`: compact forms only.
    pub(crate) fn for_copy() -> Self {
        ParsePolicy {
            accept_extended: false,
            ..ParsePolicy::default()
        }
    }
}

impl std::fmt::Debug for ParsePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsePolicy")
            .field("accept_ori_names", &self.accept_ori_names)
            .field("accept_alt_names", &self.accept_alt_names)
            .field("accept_compact", &self.accept_compact)
            .field("accept_extended", &self.accept_extended)
            .field("case_insensitive", &self.case_insensitive)
            .field("exception_if_unknown", &self.exception_if_unknown)
            .field("shrink_array", &self.shrink_array)
            .field("dont_shrink", &self.dont_shrink)
            .field("null_handling", &self.null_handling)
            .field("decrypt", &self.decrypt.is_some())
            .finish()
    }
}
