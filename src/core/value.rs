// Tagged value record decoded from one foreign variant slot.

/// Kind tag for a decoded value. `Char` doubles as the byte kind, matching
/// the foreign protocol's aliasing of the two tags.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueKind {
    Null,
    Char,
    Bool,
    Short,
    UShort,
    Int,
    UInt,
    Int64,
    UInt64,
    Single,
    Double,
    Bytes,
    String,
}

/// One decoded value: a text arm for string payloads, and a fixed 8-byte
/// little-endian buffer for everything else. Accessors reinterpret the raw
/// buffer without checking the kind; callers consult `kind()` first.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Value {
    kind: ValueKind,
    raw: [u8; 8],
    text: String,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_null(&self) -> bool {
        self.kind == ValueKind::Null
    }

    pub fn as_char(&self) -> u8 {
        self.raw[0]
    }

    pub fn as_byte(&self) -> u8 {
        self.raw[0]
    }

    pub fn as_bool(&self) -> bool {
        u32::from_le_bytes(self.raw[..4].try_into().expect("4-byte slice")) > 0
    }

    pub fn as_i16(&self) -> i16 {
        i16::from_le_bytes(self.raw[..2].try_into().expect("2-byte slice"))
    }

    pub fn as_u16(&self) -> u16 {
        u16::from_le_bytes(self.raw[..2].try_into().expect("2-byte slice"))
    }

    pub fn as_i32(&self) -> i32 {
        i32::from_le_bytes(self.raw[..4].try_into().expect("4-byte slice"))
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_le_bytes(self.raw[..4].try_into().expect("4-byte slice"))
    }

    pub fn as_i64(&self) -> i64 {
        i64::from_le_bytes(self.raw)
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_le_bytes(self.raw)
    }

    pub fn as_f32(&self) -> f32 {
        f32::from_le_bytes(self.raw[..4].try_into().expect("4-byte slice"))
    }

    pub fn as_f64(&self) -> f64 {
        f64::from_le_bytes(self.raw)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Overwrite with a non-string payload. Clears the text arm so pooled
    /// instances never expose stale state.
    pub(crate) fn fill_raw(&mut self, kind: ValueKind, raw: [u8; 8]) {
        self.kind = kind;
        self.raw = raw;
        self.text.clear();
    }

    /// Overwrite with a string payload, reusing the text arm's allocation.
    pub(crate) fn fill_text(&mut self, bytes: &[u8]) {
        self.kind = ValueKind::String;
        self.raw = [0; 8];
        self.text.clear();
        self.text.push_str(&String::from_utf8_lossy(bytes));
    }
}

impl Default for Value {
    fn default() -> Self {
        Self {
            kind: ValueKind::Null,
            raw: [0; 8],
            text: String::new(),
        }
    }
}
