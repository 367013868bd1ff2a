//! Decoding of STACK dumps and EXEC results.
//!
//! Two payload shapes are understood:
//!
//! * legacy: `{ frame, frame, ... }` for the main coroutine only;
//! * coroutine-aware: `{ current = <co>, coroutines = { <co>, ... } }` with
//!   `<co> = { id = "...", status = "...", frame_base = N, frames = { ... } }`.
//!
//! A frame is `{ info, locals, upvalues }`. Scopes map variable names to
//! `{ value, tag }` pairs and may carry two reserved entries: `(*order)`
//! lists names in declaration order and `(*params)` is the number of
//! leading locals that are parameters.

use serde::Serialize;

use crate::error::DecodeError;
use crate::literal::{parse_literal, LuaTable, LuaValue, TableKey};
use crate::value::classify;
use crate::variable::{vararg_index, Role, Variable};

const ORDER_KEY: &str = "(*order)";
const PARAMS_KEY: &str = "(*params)";
const MAIN_COROUTINE: &str = "main";

/// All coroutine stacks reported by one STACK response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackDump {
    pub current: CoroutineStackInfo,
    pub others: Vec<CoroutineStackInfo>,
}

impl StackDump {
    /// Empty main-coroutine stack used when a payload cannot be decoded.
    pub fn stub() -> Self {
        Self {
            current: CoroutineStackInfo::main(Vec::new()),
            others: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoroutineStackInfo {
    pub id: String,
    pub status: String,
    pub frames: Vec<FrameInfo>,
    /// Level of this coroutine's first frame in the debuggee's numbering.
    pub frame_base: u32,
    pub is_current: bool,
}

impl CoroutineStackInfo {
    fn main(frames: Vec<FrameInfo>) -> Self {
        Self {
            id: MAIN_COROUTINE.into(),
            status: "running".into(),
            frames,
            frame_base: 0,
            is_current: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameInfo {
    pub name: String,
    pub source: Option<String>,
    pub line: Option<u32>,
    /// Parameters and locals in declaration order, then upvalues.
    pub variables: Vec<Variable>,
}

/// Decode a STACK body, falling back to [`StackDump::stub`] on any error.
pub fn decode_stack(payload: &str) -> StackDump {
    match try_decode_stack(payload) {
        Ok(dump) => dump,
        Err(e) => {
            tracing::warn!(error = %e, "undecodable stack payload");
            StackDump::stub()
        }
    }
}

/// Decode a STACK body, reporting why it could not be read.
pub fn try_decode_stack(payload: &str) -> Result<StackDump, DecodeError> {
    let root = match parse_literal(payload)? {
        LuaValue::Table(t) => t,
        other => {
            return Err(DecodeError::new(
                0,
                format!("expected a table, found {}", other.type_name()),
            ))
        }
    };

    if root.get_str("current").is_none() && root.get_str("coroutines").is_none() {
        let frames = decode_frames(&root);
        return Ok(StackDump {
            current: CoroutineStackInfo::main(frames),
            others: Vec::new(),
        });
    }

    let listed: Vec<CoroutineStackInfo> = root
        .get_str("coroutines")
        .and_then(LuaValue::as_table)
        .map(|t| t.array_values().filter_map(decode_coroutine).collect())
        .unwrap_or_default();

    let current = match root.get_str("current") {
        Some(LuaValue::Table(t)) => decode_coroutine_table(t),
        Some(LuaValue::Str(id)) => listed
            .iter()
            .find(|co| co.id == *id)
            .cloned()
            .unwrap_or_else(|| CoroutineStackInfo::main(Vec::new())),
        _ => CoroutineStackInfo::main(Vec::new()),
    };
    let current = CoroutineStackInfo {
        is_current: true,
        ..current
    };

    let others = listed
        .into_iter()
        .filter(|co| co.id != current.id)
        .map(|co| CoroutineStackInfo {
            is_current: false,
            ..co
        })
        .collect();

    Ok(StackDump { current, others })
}

/// Decode an EXEC body (a table of returned values) into variables named
/// `[1]`, `[2]`, ...
pub fn decode_values(body: &str) -> Result<Vec<Variable>, DecodeError> {
    let values = match parse_literal(body)? {
        LuaValue::Table(t) => t,
        single => {
            let mut t = LuaTable::new();
            t.insert(TableKey::Int(1), single);
            t
        }
    };
    let count = values
        .iter()
        .filter_map(|(key, _)| match key {
            TableKey::Int(i) if *i > 0 => Some(*i),
            _ => None,
        })
        .max()
        .unwrap_or(0);

    Ok((1..=count)
        .map(|i| {
            let name = format!("[{i}]");
            let value = values.get_index(i).cloned().unwrap_or(LuaValue::Nil);
            let kind = classify(&name, &value, None);
            Variable::new(name.clone(), kind, name, Role::Local)
        })
        .collect())
}

fn decode_coroutine(value: &LuaValue) -> Option<CoroutineStackInfo> {
    match value {
        LuaValue::Table(t) => Some(decode_coroutine_table(t)),
        other => {
            tracing::debug!(kind = other.type_name(), "skipping non-table coroutine entry");
            None
        }
    }
}

fn decode_coroutine_table(table: &LuaTable) -> CoroutineStackInfo {
    let frames = table
        .get_str("frames")
        .and_then(LuaValue::as_table)
        .map(decode_frames)
        .unwrap_or_default();
    CoroutineStackInfo {
        id: string_field(table, "id").unwrap_or_else(|| MAIN_COROUTINE.into()),
        status: string_field(table, "status").unwrap_or_else(|| "suspended".into()),
        frames,
        frame_base: table
            .get_str("frame_base")
            .and_then(LuaValue::as_number)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u32)
            .unwrap_or(0),
        is_current: false,
    }
}

fn decode_frames(list: &LuaTable) -> Vec<FrameInfo> {
    list.array_values()
        .filter_map(|frame| match frame {
            LuaValue::Table(t) => Some(decode_frame(t)),
            other => {
                tracing::debug!(kind = other.type_name(), "skipping non-table frame");
                None
            }
        })
        .collect()
}

fn decode_frame(frame: &LuaTable) -> FrameInfo {
    let slot = |index: i64, name: &str| {
        frame
            .get_index(index)
            .or_else(|| frame.get_str(name))
            .and_then(LuaValue::as_table)
    };

    let (name, source, line) = slot(1, "info").map(decode_info).unwrap_or_default();
    let mut variables = slot(2, "locals")
        .map(|t| decode_scope(t, Role::Local))
        .unwrap_or_default();
    if let Some(upvalues) = slot(3, "upvalues") {
        variables.extend(decode_scope(upvalues, Role::Upvalue));
    }

    FrameInfo {
        name: name.unwrap_or_else(|| MAIN_COROUTINE.into()),
        source,
        line,
        variables,
    }
}

fn decode_info(info: &LuaTable) -> (Option<String>, Option<String>, Option<u32>) {
    let text = |index: i64, key: &str| {
        info.get_index(index)
            .or_else(|| info.get_str(key))
            .and_then(LuaValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let line = info
        .get_index(4)
        .or_else(|| info.get_str("currentline"))
        .or_else(|| info.get_str("line"))
        .and_then(LuaValue::as_number)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u32);
    (text(1, "name"), text(2, "source"), line)
}

fn decode_scope(scope: &LuaTable, role: Role) -> Vec<Variable> {
    let params = match role {
        Role::Local => scope
            .get_str(PARAMS_KEY)
            .and_then(LuaValue::as_number)
            .map(|n| n.max(0.0) as usize)
            .unwrap_or(0),
        _ => 0,
    };

    let mut names: Vec<&str> = Vec::new();
    if let Some(order) = scope.get_str(ORDER_KEY).and_then(LuaValue::as_table) {
        for name in order.array_values().filter_map(LuaValue::as_str) {
            if scope.get_str(name).is_some() && !names.contains(&name) {
                names.push(name);
            }
        }
    }
    for (key, _) in scope.iter() {
        if let TableKey::Str(name) = key {
            let name = name.as_str();
            if name != ORDER_KEY && name != PARAMS_KEY && !names.contains(&name) {
                names.push(name);
            }
        }
    }

    names
        .into_iter()
        .enumerate()
        .filter_map(|(position, name)| {
            let entry = scope.get_str(name)?;
            let (value, tag) = match entry {
                LuaValue::Table(table) => match tagged_pair(table) {
                    Some((value, tag)) => (value, tag),
                    None => (entry.clone(), None),
                },
                bare => (bare.clone(), None),
            };
            let role = if position < params {
                Role::Parameter
            } else {
                role
            };
            let expression = match vararg_index(name) {
                Some(n) => format!("select({n}, ...)"),
                None => name.to_string(),
            };
            Some(Variable::new(name, classify(name, &value, tag), expression, role))
        })
        .collect()
}

/// Split a `{value, "tag"}` entry. Any other key shape is a bare table.
fn tagged_pair(table: &LuaTable) -> Option<(LuaValue, Option<&str>)> {
    let tag = match table.get_index(2) {
        Some(LuaValue::Str(tag)) => Some(tag.as_str()),
        Some(_) => return None,
        None => None,
    };
    let value = table.get_index(1);
    let keys = usize::from(value.is_some()) + usize::from(tag.is_some());
    if keys == 0 || keys != table.len() {
        return None;
    }
    Some((value.cloned().unwrap_or(LuaValue::Nil), tag))
}

fn string_field(table: &LuaTable, key: &str) -> Option<String> {
    match table.get_str(key)? {
        LuaValue::Str(s) => Some(s.clone()),
        LuaValue::Number(n) => Some(crate::value::format_number(*n)),
        _ => None,
    }
}
