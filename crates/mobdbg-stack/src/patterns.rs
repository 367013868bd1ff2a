//! Recognizers for the engine's `tostring` spellings of its native types.
//!
//! The parsers run in a fixed order and the first one that matches wins.

use std::sync::OnceLock;

use regex::Regex;

use crate::value::{ValueKind, VectorKind};

type Recognizer = fn(&str) -> Option<ValueKind>;

/// Recognizers in match order.
const RECOGNIZERS: [(&str, Recognizer); 8] = [
    ("vector2", parse_vector2),
    ("vector3", parse_vector3),
    ("vector4", parse_vector4),
    ("quat", parse_quat),
    ("matrix4", parse_matrix4),
    ("script", parse_script_instance),
    ("hash", parse_hash),
    ("url", parse_url),
];

/// Try every recognizer on `text`; `None` when nothing matches.
pub fn recognize(text: &str) -> Option<ValueKind> {
    let text = text.trim();
    RECOGNIZERS.iter().find_map(|(name, recognizer)| {
        let kind = recognizer(text)?;
        tracing::trace!(recognizer = name, "recognized engine value");
        Some(kind)
    })
}

fn vmath_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^vmath\.(vector2|vector3|vector4|quat|matrix4)\s*\((.*)\)$")
            .expect("vmath regex is valid")
    })
}

fn script_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:Script|GuiScript|RenderScript)(?:Instance)?:\s*\S.*$")
            .expect("script instance regex is valid")
    })
}

fn bracketed_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(hash|url):\s*\[(.*)\]$").expect("bracketed regex is valid"))
}

/// Components of `vmath.<ctor>(a, b, ...)` when the constructor matches and
/// exactly `arity` numbers are present.
fn vmath_components(text: &str, ctor: &str, arity: usize) -> Option<Vec<f64>> {
    let caps = vmath_regex().captures(text)?;
    if &caps[1] != ctor {
        return None;
    }
    let args = caps[2].trim();
    // Some engine builds print the matrix as nested rows.
    let args = args.replace(['(', ')', '[', ']'], " ");
    let components = args
        .split(',')
        .map(|part| parse_component(part.trim()))
        .collect::<Option<Vec<f64>>>()?;
    (components.len() == arity).then_some(components)
}

fn parse_component(text: &str) -> Option<f64> {
    match text {
        "inf" | "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "nan" | "-nan" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

fn parse_vector(text: &str, kind: VectorKind) -> Option<ValueKind> {
    let components = vmath_components(text, kind.constructor(), kind.arity())?;
    Some(ValueKind::Vector { kind, components })
}

fn parse_vector2(text: &str) -> Option<ValueKind> {
    parse_vector(text, VectorKind::Vector2)
}

fn parse_vector3(text: &str) -> Option<ValueKind> {
    parse_vector(text, VectorKind::Vector3)
}

fn parse_vector4(text: &str) -> Option<ValueKind> {
    parse_vector(text, VectorKind::Vector4)
}

fn parse_quat(text: &str) -> Option<ValueKind> {
    parse_vector(text, VectorKind::Quat)
}

fn parse_matrix4(text: &str) -> Option<ValueKind> {
    let flat = vmath_components(text, "matrix4", 16)?;
    let mut rows = [[0.0; 4]; 4];
    for (index, value) in flat.into_iter().enumerate() {
        rows[index / 4][index % 4] = value;
    }
    Some(ValueKind::Matrix4 { rows })
}

fn parse_script_instance(text: &str) -> Option<ValueKind> {
    script_regex()
        .is_match(text)
        .then(|| ValueKind::ScriptInstance(text.to_string()))
}

fn parse_hash(text: &str) -> Option<ValueKind> {
    let caps = bracketed_regex().captures(text)?;
    (&caps[1] == "hash").then(|| ValueKind::Hash(caps[2].to_string()))
}

fn parse_url(text: &str) -> Option<ValueKind> {
    let caps = bracketed_regex().captures(text)?;
    if &caps[1] != "url" {
        return None;
    }
    let body = &caps[2];
    let (rest, fragment) = match body.split_once('#') {
        Some((rest, fragment)) => (rest, non_empty(fragment)),
        None => (body, None),
    };
    let (socket, path) = match rest.split_once(':') {
        Some((socket, path)) => (non_empty(socket), non_empty(path)),
        None => (None, non_empty(rest)),
    };
    Some(ValueKind::Url {
        socket,
        path,
        fragment,
    })
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
