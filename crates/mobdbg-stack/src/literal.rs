//! Recursive-descent parser for the literal Lua data the debuggee emits.
//!
//! Only data constructors are accepted: `nil`, booleans, numbers, strings
//! and table constructors. Function values arrive as a
//! `function() --[[..skipped..]] end` placeholder; its body is skipped and
//! it decodes to [`LuaValue::Function`]. Nothing is evaluated; any other
//! identifier besides `nil`, `true`, `false` or `math.huge` is a parse error.

use std::cmp::Ordering;

use serde::Serialize;

use crate::error::DecodeError;

/// Tables nested deeper than this are rejected.
pub const MAX_DEPTH: usize = 256;

/// A decoded literal value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LuaValue {
    Nil,
    Bool(bool),
    Number(f64),
    Str(String),
    Table(LuaTable),
    /// A serialized function; only its presence is known.
    Function,
}

impl LuaValue {
    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            LuaValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The numeric payload, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            LuaValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The table payload, if this is a table.
    pub fn as_table(&self) -> Option<&LuaTable> {
        match self {
            LuaValue::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Lua truthiness: everything except `nil` and `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, LuaValue::Nil | LuaValue::Bool(false))
    }

    /// The Lua type name of the literal.
    pub fn type_name(&self) -> &'static str {
        match self {
            LuaValue::Nil => "nil",
            LuaValue::Bool(_) => "boolean",
            LuaValue::Number(_) => "number",
            LuaValue::Str(_) => "string",
            LuaValue::Table(_) => "table",
            LuaValue::Function => "function",
        }
    }
}

/// A table key. Integral numbers are normalized to [`TableKey::Int`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TableKey {
    Int(i64),
    Num(f64),
    Str(String),
    Bool(bool),
}

impl TableKey {
    fn from_value(value: LuaValue) -> Option<Self> {
        match value {
            LuaValue::Number(n) if n.is_nan() => None,
            LuaValue::Number(n) => Some(number_key(n)),
            LuaValue::Str(s) => Some(TableKey::Str(s)),
            LuaValue::Bool(b) => Some(TableKey::Bool(b)),
            LuaValue::Nil | LuaValue::Table(_) | LuaValue::Function => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TableKey::Int(_) | TableKey::Num(_) => 0,
            TableKey::Str(_) => 1,
            TableKey::Bool(_) => 2,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            TableKey::Int(i) => Some(*i as f64),
            TableKey::Num(n) => Some(*n),
            _ => None,
        }
    }

    /// Display ordering used by variable views: numbers ascending, then
    /// strings, then `false`/`true`.
    pub fn display_cmp(&self, other: &TableKey) -> Ordering {
        match (self, other) {
            (TableKey::Int(a), TableKey::Int(b)) => a.cmp(b),
            (TableKey::Str(a), TableKey::Str(b)) => a.cmp(b),
            (TableKey::Bool(a), TableKey::Bool(b)) => a.cmp(b),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.rank().cmp(&other.rank()),
            },
        }
    }
}

fn number_key(n: f64) -> TableKey {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        TableKey::Int(n as i64)
    } else {
        TableKey::Num(n)
    }
}

/// A table constructor, with entries kept in the order they were written.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LuaTable {
    entries: Vec<(TableKey, LuaValue)>,
}

impl LuaTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`. `nil` removes the key. An existing key keeps
    /// its position.
    pub fn insert(&mut self, key: TableKey, value: LuaValue) {
        let existing = self.entries.iter().position(|(k, _)| *k == key);
        match (existing, value) {
            (Some(index), LuaValue::Nil) => {
                self.entries.remove(index);
            }
            (Some(index), value) => self.entries[index].1 = value,
            (None, LuaValue::Nil) => {}
            (None, value) => self.entries.push((key, value)),
        }
    }

    /// Look up an arbitrary key.
    pub fn get(&self, key: &TableKey) -> Option<&LuaValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Look up a string key.
    pub fn get_str(&self, key: &str) -> Option<&LuaValue> {
        self.entries
            .iter()
            .find(|(k, _)| matches!(k, TableKey::Str(s) if s == key))
            .map(|(_, v)| v)
    }

    /// Look up an integer key.
    pub fn get_index(&self, index: i64) -> Option<&LuaValue> {
        self.get(&TableKey::Int(index))
    }

    /// Length of the array part: the run of keys `1..=n` that are present.
    pub fn array_len(&self) -> usize {
        let mut n = 0;
        while self.get_index(n as i64 + 1).is_some() {
            n += 1;
        }
        n
    }

    /// Values of the array part, in index order.
    pub fn array_values(&self) -> impl Iterator<Item = &LuaValue> {
        (1..=self.array_len() as i64).filter_map(move |i| self.get_index(i))
    }

    /// Entries in payload order.
    pub fn iter(&self) -> impl Iterator<Item = (&TableKey, &LuaValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Entries sorted for display (see [`TableKey::display_cmp`]).
    pub fn sorted_entries(&self) -> Vec<(&TableKey, &LuaValue)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|(a, _), (b, _)| a.display_cmp(b));
        entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a complete payload. An optional leading `return` and trailing `;`
/// are accepted.
pub fn parse_literal(text: &str) -> Result<LuaValue, DecodeError> {
    let mut parser = Parser::new(text);
    parser.skip_trivia()?;
    if parser.peek_keyword("return") {
        parser.pos += "return".len();
    }
    let value = parser.parse_value()?;
    parser.skip_trivia()?;
    if parser.peek() == Some(b';') {
        parser.pos += 1;
        parser.skip_trivia()?;
    }
    if parser.pos < parser.src.len() {
        return Err(parser.error("unexpected trailing characters"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            src: text.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::new(self.pos, message)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), DecodeError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    fn peek_keyword(&self, word: &str) -> bool {
        let end = self.pos + word.len();
        self.src.get(self.pos..end) == Some(word.as_bytes())
            && !self.src.get(end).is_some_and(|b| is_ident_byte(*b))
    }

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) -> Result<(), DecodeError> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'-') if self.peek_at(1) == Some(b'-') => {
                    self.pos += 2;
                    if let Some(level) = self.long_bracket_level() {
                        self.read_long_bracket(level)?;
                    } else {
                        while let Some(b) = self.peek() {
                            self.pos += 1;
                            if b == b'\n' {
                                break;
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_value(&mut self) -> Result<LuaValue, DecodeError> {
        self.skip_trivia()?;
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some(b'{') => self.parse_table().map(LuaValue::Table),
            Some(b'"') | Some(b'\'') => self.parse_quoted().map(LuaValue::Str),
            Some(b'[') => match self.long_bracket_level() {
                Some(level) => self.read_long_bracket(level).map(LuaValue::Str),
                None => Err(self.error("unexpected '['")),
            },
            Some(b'-') => {
                self.pos += 1;
                self.skip_trivia()?;
                match self.parse_value()? {
                    LuaValue::Number(n) => Ok(LuaValue::Number(-n)),
                    _ => Err(self.error("'-' must precede a number")),
                }
            }
            Some(b) if b.is_ascii_digit() || b == b'.' => self.parse_number_expr(),
            Some(b) if is_ident_start(b) => self.parse_word(),
            Some(b) => Err(self.error(format!("unexpected character '{}'", b as char))),
        }
    }

    fn parse_word(&mut self) -> Result<LuaValue, DecodeError> {
        let start = self.pos;
        let word = self.read_identifier();
        match word.as_str() {
            "nil" => Ok(LuaValue::Nil),
            "true" => Ok(LuaValue::Bool(true)),
            "false" => Ok(LuaValue::Bool(false)),
            "math" if self.src[self.pos..].starts_with(b".huge") => {
                self.pos += ".huge".len();
                Ok(LuaValue::Number(f64::INFINITY))
            }
            "function" => {
                self.skip_function_body(start)?;
                Ok(LuaValue::Function)
            }
            _ => Err(DecodeError::new(
                start,
                format!("unexpected identifier '{word}'"),
            )),
        }
    }

    /// Skip to the `end` closing a `function` keyword at `start`.
    fn skip_function_body(&mut self, start: usize) -> Result<(), DecodeError> {
        let mut depth = 1usize;
        loop {
            self.skip_trivia()?;
            match self.peek() {
                None => return Err(DecodeError::new(start, "unterminated function")),
                Some(b'"') | Some(b'\'') => {
                    self.parse_quoted()?;
                }
                Some(b'[') => match self.long_bracket_level() {
                    Some(level) => {
                        self.read_long_bracket(level)?;
                    }
                    None => self.pos += 1,
                },
                Some(b) if is_ident_start(b) => match self.read_identifier().as_str() {
                    "function" | "do" | "if" => depth += 1,
                    "end" => {
                        depth -= 1;
                        if depth == 0 {
                            return Ok(());
                        }
                    }
                    _ => {}
                },
                Some(_) => self.pos += 1,
            }
        }
    }

    fn read_identifier(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_byte) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }

    /// A number, optionally divided by another (`0/0`, `1/0`).
    fn parse_number_expr(&mut self) -> Result<LuaValue, DecodeError> {
        let numerator = self.parse_number()?;
        let checkpoint = self.pos;
        self.skip_trivia()?;
        if self.peek() == Some(b'/') {
            self.pos += 1;
            self.skip_trivia()?;
            let denominator = self.parse_number()?;
            return Ok(LuaValue::Number(numerator / denominator));
        }
        self.pos = checkpoint;
        Ok(LuaValue::Number(numerator))
    }

    fn parse_number(&mut self) -> Result<f64, DecodeError> {
        let start = self.pos;
        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x') | Some(b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits = std::str::from_utf8(&self.src[digits_start..self.pos]).unwrap_or("");
            return u64::from_str_radix(digits, 16)
                .map(|n| n as i64 as f64)
                .map_err(|_| DecodeError::new(start, "malformed hex number"));
        }

        while self.peek().is_some_and(|b| b.is_ascii_digit() || b == b'.') {
            self.pos += 1;
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or("");
        text.parse::<f64>()
            .map_err(|_| DecodeError::new(start, format!("malformed number '{text}'")))
    }

    fn parse_table(&mut self) -> Result<LuaTable, DecodeError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("tables nested too deeply"));
        }
        self.expect(b'{')?;

        let mut table = LuaTable::new();
        let mut next_index: i64 = 1;
        loop {
            self.skip_trivia()?;
            if self.peek() == Some(b'}') {
                self.pos += 1;
                break;
            }
            self.parse_field(&mut table, &mut next_index)?;
            self.skip_trivia()?;
            match self.peek() {
                Some(b',') | Some(b';') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                None => return Err(self.error("unterminated table")),
                Some(_) => return Err(self.error("expected ',' or '}' in table")),
            }
        }

        self.depth -= 1;
        Ok(table)
    }

    fn parse_field(&mut self, table: &mut LuaTable, next_index: &mut i64) -> Result<(), DecodeError> {
        // `[expr] = value`, unless the bracket opens a long string.
        if self.peek() == Some(b'[') && self.long_bracket_level().is_none() {
            self.pos += 1;
            let key_pos = self.pos;
            let key = self.parse_value()?;
            self.skip_trivia()?;
            self.expect(b']')?;
            self.skip_trivia()?;
            self.expect(b'=')?;
            let value = self.parse_value()?;
            let key = TableKey::from_value(key)
                .ok_or_else(|| DecodeError::new(key_pos, "invalid table key"))?;
            table.insert(key, value);
            return Ok(());
        }

        // `name = value`
        if self.peek().is_some_and(is_ident_start) {
            let checkpoint = self.pos;
            let name = self.read_identifier();
            self.skip_trivia()?;
            if self.peek() == Some(b'=') && self.peek_at(1) != Some(b'=') {
                self.pos += 1;
                let value = self.parse_value()?;
                table.insert(TableKey::Str(name), value);
                return Ok(());
            }
            self.pos = checkpoint;
        }

        let value = self.parse_value()?;
        table.insert(TableKey::Int(*next_index), value);
        *next_index += 1;
        Ok(())
    }

    fn parse_quoted(&mut self) -> Result<String, DecodeError> {
        let start = self.pos;
        let quote = self.src[self.pos];
        self.pos += 1;
        let mut bytes = Vec::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(DecodeError::new(start, "unterminated string"));
            };
            self.pos += 1;
            match b {
                _ if b == quote => break,
                b'\n' => return Err(DecodeError::new(start, "unterminated string")),
                b'\\' => self.read_escape(&mut bytes)?,
                _ => bytes.push(b),
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn read_escape(&mut self, out: &mut Vec<u8>) -> Result<(), DecodeError> {
        let Some(b) = self.peek() else {
            return Err(self.error("unterminated escape"));
        };
        self.pos += 1;
        match b {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'\\' | b'"' | b'\'' | b'\n' => out.push(b),
            b'z' => {
                while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
                    self.pos += 1;
                }
            }
            b'x' => {
                let hex = self
                    .src
                    .get(self.pos..self.pos + 2)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| self.error("malformed \\x escape"))?;
                self.pos += 2;
                out.push(hex);
            }
            b'u' => {
                self.expect(b'{')?;
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                    self.pos += 1;
                }
                let code = std::str::from_utf8(&self.src[start..self.pos])
                    .ok()
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .and_then(char::from_u32)
                    .ok_or_else(|| self.error("malformed \\u escape"))?;
                self.expect(b'}')?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(code.encode_utf8(&mut buf).as_bytes());
            }
            b'0'..=b'9' => {
                let mut value = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d) if d.is_ascii_digit() => {
                            value = value * 10 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                let byte = u8::try_from(value).map_err(|_| self.error("decimal escape too large"))?;
                out.push(byte);
            }
            other => {
                return Err(self.error(format!("invalid escape '\\{}'", other as char)));
            }
        }
        Ok(())
    }

    /// If a long bracket `[==[` starts here, return its level.
    fn long_bracket_level(&self) -> Option<usize> {
        if self.peek() != Some(b'[') {
            return None;
        }
        let mut level = 0;
        while self.peek_at(1 + level) == Some(b'=') {
            level += 1;
        }
        (self.peek_at(1 + level) == Some(b'[')).then_some(level)
    }

    fn read_long_bracket(&mut self, level: usize) -> Result<String, DecodeError> {
        let start = self.pos;
        self.pos += level + 2;
        if self.peek() == Some(b'\r') {
            self.pos += 1;
        }
        if self.peek() == Some(b'\n') {
            self.pos += 1;
        }
        let mut closing = Vec::with_capacity(level + 2);
        closing.push(b']');
        closing.extend(std::iter::repeat(b'=').take(level));
        closing.push(b']');

        let body_start = self.pos;
        let end = self.src[body_start..]
            .windows(closing.len())
            .position(|w| w == closing.as_slice())
            .ok_or_else(|| DecodeError::new(start, "unterminated long bracket"))?;
        self.pos = body_start + end + closing.len();
        Ok(String::from_utf8_lossy(&self.src[body_start..body_start + end]).into_owned())
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
