//! Named values visible in a stack frame.

use mobdbg_core::pagination::{self, PageRange};
use serde::Serialize;

use crate::value::ValueKind;

/// Where a variable comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Parameter,
    Local,
    Upvalue,
}

/// A variable in a frame, or a child of one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variable {
    pub name: String,
    pub value: ValueKind,
    /// Lua expression that evaluates to this value in the paused frame.
    pub expression: String,
    pub role: Role,
}

impl Variable {
    pub fn new(
        name: impl Into<String>,
        value: ValueKind,
        expression: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            expression: expression.into(),
            role,
        }
    }

    /// Whether this is one of the `(*vararg N)` slots.
    pub fn is_vararg_slot(&self) -> bool {
        vararg_index(&self.name).is_some()
    }

    /// Whether the variable can be expanded.
    pub fn has_children(&self) -> bool {
        self.value.has_children()
    }

    /// All children.
    pub fn children(&self) -> Vec<Variable> {
        self.value
            .children_range(&self.expression, self.role, 0, self.value.child_count())
    }

    /// One window of children; `None` once `from` is past the end.
    pub fn children_page(&self, from: i64, page_size: usize) -> Option<(Vec<Variable>, PageRange)> {
        let window = pagination::range(self.value.child_count(), from, page_size)?;
        let children = self
            .value
            .children_range(&self.expression, self.role, window.from, window.to);
        Some((children, window))
    }
}

/// Slot number of a `(*vararg N)` name.
pub fn vararg_index(name: &str) -> Option<u32> {
    name.strip_prefix("(*vararg ")?
        .strip_suffix(')')?
        .trim()
        .parse()
        .ok()
}

/// Fold each run of consecutive vararg slots into a single `...` variable
/// whose children are the slots.
pub fn group_varargs(variables: Vec<Variable>) -> Vec<Variable> {
    let mut grouped = Vec::with_capacity(variables.len());
    let mut run: Vec<Variable> = Vec::new();

    let flush = |run: &mut Vec<Variable>, grouped: &mut Vec<Variable>| {
        if run.is_empty() {
            return;
        }
        let role = run[0].role;
        let slots = std::mem::take(run);
        grouped.push(Variable::new("...", ValueKind::VarargPreview(slots), "...", role));
    };

    for variable in variables {
        if variable.is_vararg_slot() {
            run.push(variable);
        } else {
            flush(&mut run, &mut grouped);
            grouped.push(variable);
        }
    }
    flush(&mut run, &mut grouped);
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::{LuaTable, LuaValue, TableKey};

    fn num(name: &str, n: f64) -> Variable {
        Variable::new(name, ValueKind::Num(n), name, Role::Local)
    }

    fn big_table(entries: i64) -> Variable {
        let mut table = LuaTable::new();
        for i in 1..=entries {
            table.insert(TableKey::Int(i), LuaValue::Number(i as f64));
        }
        Variable::new("t", ValueKind::Table(table), "t", Role::Local)
    }

    #[test]
    fn vararg_index_parses_slot_names() {
        assert_eq!(vararg_index("(*vararg 3)"), Some(3));
        assert_eq!(vararg_index("vararg"), None);
        assert_eq!(vararg_index("(*temporary)"), None);
    }

    #[test]
    fn group_varargs_folds_consecutive_slots() {
        let vars = vec![
            num("a", 1.0),
            num("(*vararg 1)", 2.0),
            num("(*vararg 2)", 3.0),
            num("b", 4.0),
        ];
        let grouped = group_varargs(vars);
        let names: Vec<_> = grouped.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["a", "...", "b"]);
        assert_eq!(grouped[1].value.preview(), "2, 3");
        assert_eq!(grouped[1].children().len(), 2);
    }

    #[test]
    fn group_varargs_without_slots_is_identity() {
        let vars = vec![num("a", 1.0), num("b", 2.0)];
        assert_eq!(group_varargs(vars.clone()), vars);
    }

    #[test]
    fn children_page_walks_large_tables() {
        let var = big_table(25);
        let (first, window) = var.children_page(0, 10).unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first[0].expression, "t[1]");
        assert_eq!(window.remaining, 15);

        let (last, window) = var.children_page(20, 10).unwrap();
        assert_eq!(last.len(), 5);
        assert_eq!(last[4].name, "[25]");
        assert!(!window.has_more());

        assert!(var.children_page(25, 10).is_none());
    }

    #[test]
    fn children_use_own_expression_as_parent() {
        let mut inner = LuaTable::new();
        inner.insert(TableKey::Str("hp".into()), LuaValue::Number(10.0));
        let mut outer = LuaTable::new();
        outer.insert(TableKey::Str("stats".into()), LuaValue::Table(inner));
        let var = Variable::new("player", ValueKind::Table(outer), "player", Role::Upvalue);

        let stats = &var.children()[0];
        assert_eq!(stats.expression, "player.stats");
        assert_eq!(stats.role, Role::Upvalue);
        assert_eq!(stats.children()[0].expression, "player.stats.hp");
    }
}
