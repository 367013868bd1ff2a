//! Typed view of a debuggee value.
//!
//! Raw payload values are classified into a [`ValueKind`] once, when the
//! stack is decoded. Engine types that travel as `tostring` text (vectors,
//! hashes, urls) are recognized by [`crate::patterns`].

use serde::Serialize;

use crate::literal::{LuaTable, LuaValue, TableKey};
use crate::patterns;
use crate::variable::{Role, Variable};

/// Type names the debuggee may put in a value's tag slot.
const LUA_TYPE_NAMES: [&str; 8] = [
    "nil", "number", "string", "boolean", "table", "function", "thread", "userdata",
];

static COMPONENT_NAMES: [&str; 4] = ["x", "y", "z", "w"];

/// Table entries shown inline by [`ValueKind::preview`].
const PREVIEW_ENTRIES: usize = 3;

/// The engine's fixed-size vector types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorKind {
    Vector2,
    Vector3,
    Vector4,
    Quat,
}

impl VectorKind {
    /// Constructor name after `vmath.`.
    pub fn constructor(self) -> &'static str {
        match self {
            VectorKind::Vector2 => "vector2",
            VectorKind::Vector3 => "vector3",
            VectorKind::Vector4 => "vector4",
            VectorKind::Quat => "quat",
        }
    }

    /// Number of components.
    pub fn arity(self) -> usize {
        match self {
            VectorKind::Vector2 => 2,
            VectorKind::Vector3 => 3,
            VectorKind::Vector4 | VectorKind::Quat => 4,
        }
    }

    /// Component field names, in order.
    pub fn component_names(self) -> &'static [&'static str] {
        &COMPONENT_NAMES[..self.arity()]
    }
}

/// Classified value of a variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ValueKind {
    Nil,
    Str(String),
    Num(f64),
    Bool(bool),
    Table(LuaTable),
    Func(String),
    Thread(String),
    Userdata(String),
    Hash(String),
    Url {
        socket: Option<String>,
        path: Option<String>,
        fragment: Option<String>,
    },
    Vector {
        kind: VectorKind,
        components: Vec<f64>,
    },
    Matrix4 {
        rows: [[f64; 4]; 4],
    },
    ScriptInstance(String),
    /// A table held by a variable named `message`.
    Message(LuaTable),
    /// Consecutive vararg slots folded into one view.
    VarargPreview(Vec<Variable>),
    Unknown(String),
}

impl ValueKind {
    /// One-line rendering for variable lists.
    pub fn preview(&self) -> String {
        match self {
            ValueKind::Nil => "nil".into(),
            ValueKind::Str(s) => format!("\"{s}\""),
            ValueKind::Num(n) => format_number(*n),
            ValueKind::Bool(b) => b.to_string(),
            ValueKind::Table(t) => table_preview(t),
            ValueKind::Message(t) => format!("message {}", table_preview(t)),
            ValueKind::Func(desc)
            | ValueKind::Thread(desc)
            | ValueKind::Userdata(desc)
            | ValueKind::ScriptInstance(desc)
            | ValueKind::Unknown(desc) => desc.clone(),
            ValueKind::Hash(h) => format!("hash: [{h}]"),
            ValueKind::Url {
                socket,
                path,
                fragment,
            } => {
                let mut out = String::from("url: [");
                if let Some(socket) = socket {
                    out.push_str(socket);
                    out.push(':');
                }
                out.push_str(path.as_deref().unwrap_or(""));
                if let Some(fragment) = fragment {
                    out.push('#');
                    out.push_str(fragment);
                }
                out.push(']');
                out
            }
            ValueKind::Vector { components, .. } => tuple(components),
            ValueKind::Matrix4 { rows } => {
                let rows: Vec<String> = rows.iter().map(|row| tuple(row)).collect();
                format!("({})", rows.join(", "))
            }
            ValueKind::VarargPreview(slots) => {
                let previews: Vec<String> = slots.iter().map(|v| v.value.preview()).collect();
                previews.join(", ")
            }
        }
    }

    /// Short type name shown next to the preview.
    pub fn type_label(&self) -> &'static str {
        match self {
            ValueKind::Nil => "nil",
            ValueKind::Str(_) => "string",
            ValueKind::Num(_) => "number",
            ValueKind::Bool(_) => "boolean",
            ValueKind::Table(_) => "table",
            ValueKind::Func(_) => "function",
            ValueKind::Thread(_) => "thread",
            ValueKind::Userdata(_) => "userdata",
            ValueKind::Hash(_) => "hash",
            ValueKind::Url { .. } => "url",
            ValueKind::Vector { kind, .. } => kind.constructor(),
            ValueKind::Matrix4 { .. } => "matrix4",
            ValueKind::ScriptInstance(_) => "script",
            ValueKind::Message(_) => "message",
            ValueKind::VarargPreview(_) => "vararg",
            ValueKind::Unknown(_) => "unknown",
        }
    }

    /// Whether the value can be expanded.
    pub fn has_children(&self) -> bool {
        self.child_count() > 0
    }

    /// Number of children an expansion would show.
    pub fn child_count(&self) -> usize {
        match self {
            ValueKind::Table(t) | ValueKind::Message(t) => t.len(),
            ValueKind::Vector { components, .. } => components.len(),
            ValueKind::Matrix4 { .. } => 4,
            ValueKind::Url {
                socket,
                path,
                fragment,
            } => [socket, path, fragment].iter().filter(|p| p.is_some()).count(),
            ValueKind::VarargPreview(slots) => slots.len(),
            _ => 0,
        }
    }

    /// Children in `[from, to)`, with expressions relative to `parent`.
    ///
    /// Table children are ordered numbers first, then strings, then
    /// booleans. Out-of-range bounds are clamped.
    pub fn children_range(&self, parent: &str, role: Role, from: usize, to: usize) -> Vec<Variable> {
        let to = to.min(self.child_count());
        if from >= to {
            return Vec::new();
        }
        match self {
            ValueKind::Table(t) | ValueKind::Message(t) => t.sorted_entries()[from..to]
                .iter()
                .map(|(key, value)| {
                    let name = key_display(key);
                    let kind = classify(&name, value, None);
                    Variable::new(name, kind, key_expression(parent, key), role)
                })
                .collect(),
            ValueKind::Vector { kind, components } => kind.component_names()[from..to]
                .iter()
                .zip(&components[from..to])
                .map(|(field, n)| {
                    Variable::new(*field, ValueKind::Num(*n), format!("{parent}.{field}"), role)
                })
                .collect(),
            ValueKind::Matrix4 { rows } => (from..to)
                .map(|r| {
                    let expression = format!(
                        "vmath.vector4({parent}.m{r}0, {parent}.m{r}1, {parent}.m{r}2, {parent}.m{r}3)"
                    );
                    let row = ValueKind::Vector {
                        kind: VectorKind::Vector4,
                        components: rows[r].to_vec(),
                    };
                    Variable::new(format!("row{r}"), row, expression, role)
                })
                .collect(),
            ValueKind::Url {
                socket,
                path,
                fragment,
            } => [("socket", socket), ("path", path), ("fragment", fragment)]
                .into_iter()
                .filter_map(|(field, part)| {
                    let part = part.as_ref()?;
                    Some(Variable::new(
                        field,
                        ValueKind::Str(part.clone()),
                        format!("{parent}.{field}"),
                        role,
                    ))
                })
                .skip(from)
                .take(to - from)
                .collect(),
            ValueKind::VarargPreview(slots) => slots[from..to].to_vec(),
            _ => Vec::new(),
        }
    }
}

/// Classify a raw payload value.
///
/// `tag` is the optional second slot the debuggee sends with each value:
/// either a Lua type name or the value's `tostring` description. A table
/// bound to a variable named `message` becomes [`ValueKind::Message`].
pub fn classify(name: &str, value: &LuaValue, tag: Option<&str>) -> ValueKind {
    let type_name = match tag {
        Some(tag) if LUA_TYPE_NAMES.contains(&tag) => tag,
        Some(tag) => described_type(tag).unwrap_or_else(|| value.type_name()),
        None => value.type_name(),
    };
    let description = || match (tag, value) {
        (Some(tag), _) if !LUA_TYPE_NAMES.contains(&tag) => tag.to_string(),
        (_, LuaValue::Str(s)) => s.clone(),
        (_, other) => describe(other),
    };

    match type_name {
        "nil" => ValueKind::Nil,
        "boolean" => ValueKind::Bool(value.is_truthy()),
        "number" => match value {
            LuaValue::Number(n) => ValueKind::Num(*n),
            LuaValue::Str(s) => s
                .trim()
                .parse()
                .map(ValueKind::Num)
                .unwrap_or_else(|_| ValueKind::Unknown(s.clone())),
            other => ValueKind::Unknown(describe(other)),
        },
        "string" => {
            let text = description();
            patterns::recognize(&text).unwrap_or(ValueKind::Str(text))
        }
        "table" => {
            let table = value.as_table().cloned().unwrap_or_default();
            if name == "message" {
                ValueKind::Message(table)
            } else {
                ValueKind::Table(table)
            }
        }
        "function" => ValueKind::Func(description()),
        "thread" => ValueKind::Thread(description()),
        "userdata" => {
            let text = description();
            patterns::recognize(&text).unwrap_or(ValueKind::Userdata(text))
        }
        _ => ValueKind::Unknown(description()),
    }
}

/// Render a number the way Lua prints it: integral values without a
/// fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".into()
    } else if n.is_infinite() {
        if n > 0.0 { "inf" } else { "-inf" }.into()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Type implied by a `tostring` description such as `function: 0x55d0`.
fn described_type(description: &str) -> Option<&'static str> {
    let (prefix, _) = description.split_once(':')?;
    match prefix {
        "function" | "builtin" => Some("function"),
        "thread" => Some("thread"),
        "userdata" => Some("userdata"),
        "table" => Some("table"),
        _ => None,
    }
}

fn describe(value: &LuaValue) -> String {
    match value {
        LuaValue::Nil => "nil".into(),
        LuaValue::Bool(b) => b.to_string(),
        LuaValue::Number(n) => format_number(*n),
        LuaValue::Str(s) => s.clone(),
        LuaValue::Table(_) => "table".into(),
        LuaValue::Function => "function".into(),
    }
}

fn tuple(components: &[f64]) -> String {
    let parts: Vec<String> = components.iter().map(|c| format_number(*c)).collect();
    format!("({})", parts.join(", "))
}

fn table_preview(table: &LuaTable) -> String {
    if table.is_empty() {
        return "{}".into();
    }
    let entries = table.sorted_entries();
    let mut parts: Vec<String> = entries
        .iter()
        .take(PREVIEW_ENTRIES)
        .map(|(key, value)| {
            let value = match value {
                LuaValue::Table(t) if t.is_empty() => "{}".to_string(),
                LuaValue::Table(_) => "{…}".to_string(),
                LuaValue::Str(s) => format!("\"{s}\""),
                other => describe(other),
            };
            match key {
                TableKey::Int(_) => value,
                key => format!("{} = {value}", key_display(key)),
            }
        })
        .collect();
    if entries.len() > PREVIEW_ENTRIES {
        parts.push("…".into());
    }
    format!("{{{}}}", parts.join(", "))
}

fn key_display(key: &TableKey) -> String {
    match key {
        TableKey::Int(i) => format!("[{i}]"),
        TableKey::Num(n) => format!("[{}]", format_number(*n)),
        TableKey::Str(s) => s.clone(),
        TableKey::Bool(b) => format!("[{b}]"),
    }
}

/// Expression that evaluates to the child at `key` of `parent`.
fn key_expression(parent: &str, key: &TableKey) -> String {
    match key {
        TableKey::Int(i) => format!("{parent}[{i}]"),
        TableKey::Num(n) => format!("{parent}[{}]", format_number(*n)),
        TableKey::Bool(b) => format!("{parent}[{b}]"),
        TableKey::Str(s) if is_identifier(s) => format!("{parent}.{s}"),
        TableKey::Str(s) => format!("{parent}[\"{}\"]", escape_lua(s)),
    }
}

const LUA_KEYWORDS: [&str; 22] = [
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !LUA_KEYWORDS.contains(&s)
}

fn escape_lua(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::parse_literal;

    fn raw(text: &str) -> LuaValue {
        parse_literal(text).unwrap()
    }

    #[test]
    fn vector_string_preview() {
        let kind = classify("pos", &raw("\"vmath.vector3(1, 2, 3)\""), Some("userdata"));
        assert_eq!(
            kind,
            ValueKind::Vector {
                kind: VectorKind::Vector3,
                components: vec![1.0, 2.0, 3.0],
            }
        );
        assert_eq!(kind.preview(), "(1, 2, 3)");
        assert_eq!(kind.type_label(), "vector3");
    }

    #[test]
    fn hash_from_description_tag() {
        let kind = classify("id", &raw("\"hash: [example]\""), None);
        assert_eq!(kind, ValueKind::Hash("example".into()));
    }

    #[test]
    fn description_tag_is_used_for_userdata() {
        let kind = classify("u", &raw("nil"), Some("userdata: 0x1234"));
        assert_eq!(kind, ValueKind::Userdata("userdata: 0x1234".into()));
        let kind = classify("u", &raw("\"userdata: 0x1234\""), Some("userdata"));
        assert_eq!(kind, ValueKind::Userdata("userdata: 0x1234".into()));
    }

    #[test]
    fn description_implies_function() {
        let kind = classify("f", &raw("nil"), Some("function: 0x55d0"));
        assert_eq!(kind, ValueKind::Func("function: 0x55d0".into()));
    }

    #[test]
    fn plain_scalars() {
        assert_eq!(classify("n", &raw("2.5"), None), ValueKind::Num(2.5));
        assert_eq!(classify("b", &raw("false"), None), ValueKind::Bool(false));
        assert_eq!(classify("x", &raw("nil"), None), ValueKind::Nil);
        assert_eq!(
            classify("s", &raw("\"hi\""), Some("string")),
            ValueKind::Str("hi".into())
        );
        assert_eq!(
            classify("f", &raw("\"function: 0xabc\""), Some("function")),
            ValueKind::Func("function: 0xabc".into())
        );
    }

    #[test]
    fn table_named_message_is_message() {
        let kind = classify("message", &raw("{id = 1}"), Some("table"));
        assert!(matches!(kind, ValueKind::Message(_)));
        let kind = classify("msg", &raw("{id = 1}"), Some("table"));
        assert!(matches!(kind, ValueKind::Table(_)));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.25), "-0.25");
        assert_eq!(format_number(f64::INFINITY), "inf");
        assert_eq!(format_number(f64::NAN), "nan");
    }

    #[test]
    fn table_children_are_sorted_with_expressions() {
        let kind = classify("t", &raw("{b = 1, [2] = 'two', a = {}, [1] = true, ['not id'] = 0}"), None);
        let children = kind.children_range("t", Role::Local, 0, usize::MAX);
        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["[1]", "[2]", "a", "b", "not id"]);
        let exprs: Vec<_> = children.iter().map(|c| c.expression.as_str()).collect();
        assert_eq!(exprs, ["t[1]", "t[2]", "t.a", "t.b", "t[\"not id\"]"]);
    }

    #[test]
    fn keyword_keys_use_bracket_expressions() {
        let kind = classify("t", &raw("{['end'] = 1}"), None);
        let children = kind.children_range("t", Role::Local, 0, 1);
        assert_eq!(children[0].expression, "t[\"end\"]");
    }

    #[test]
    fn vector_children_are_components() {
        let kind = classify("v", &raw("'vmath.vector4(1, 2, 3, 4)'"), None);
        let children = kind.children_range("v", Role::Local, 1, 3);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name, "y");
        assert_eq!(children[0].expression, "v.y");
        assert_eq!(children[1].value, ValueKind::Num(3.0));
    }

    #[test]
    fn matrix_rows_rebuild_vectors() {
        let kind = classify(
            "m",
            &raw("'vmath.matrix4(1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1)'"),
            None,
        );
        let rows = kind.children_range("m", Role::Local, 0, 4);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2].expression, "vmath.vector4(m.m20, m.m21, m.m22, m.m23)");
        assert_eq!(rows[2].value.preview(), "(0, 0, 1, 0)");
    }

    #[test]
    fn url_children_skip_missing_parts() {
        let kind = classify("u", &raw("'url: [/go#script]'"), None);
        assert_eq!(kind.child_count(), 2);
        let children = kind.children_range("u", Role::Local, 0, 2);
        assert_eq!(children[0].name, "path");
        assert_eq!(children[1].expression, "u.fragment");
        assert_eq!(kind.preview(), "url: [/go#script]");
    }

    #[test]
    fn scalars_have_no_children() {
        assert!(!ValueKind::Num(1.0).has_children());
        assert!(!classify("t", &raw("{}"), None).has_children());
        assert!(ValueKind::Num(1.0)
            .children_range("x", Role::Local, 0, 10)
            .is_empty());
    }

    #[test]
    fn table_preview_is_truncated() {
        let kind = classify("t", &raw("{1, 2, 3, 4, x = {1}}"), None);
        assert_eq!(kind.preview(), "{1, 2, 3, …}");
        let kind = classify("t", &raw("{x = {1}}"), None);
        assert_eq!(kind.preview(), "{x = {…}}");
    }
}
