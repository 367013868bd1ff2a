//! Breakpoint bookkeeping and pause classification.
//!
//! Breakpoints are stored by local path. The debuggee only knows remote
//! spellings, so every change also refreshes an index from remote
//! `(path, line)` locations back to the local breakpoint, which is what a
//! pause is checked against.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use mobdbg_core::PathResolver;
use serde::Serialize;

use crate::command::Command;

/// A user breakpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    /// Local source file.
    pub path: PathBuf,
    /// Line number (1-based).
    pub line: u32,
    pub enabled: bool,
    /// Lua expression; the pause only stops when it is truthy.
    pub condition: Option<String>,
    /// Lua expression printed instead of stopping (logpoint).
    pub log_expression: Option<String>,
}

impl Breakpoint {
    /// Create an enabled, unconditional breakpoint.
    pub fn new(path: impl Into<PathBuf>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
            enabled: true,
            condition: None,
            log_expression: None,
        }
    }

    /// Create a conditional breakpoint.
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Create a logpoint.
    pub fn with_log_expression(mut self, expression: impl Into<String>) -> Self {
        self.log_expression = Some(expression.into());
        self
    }

    pub fn is_logpoint(&self) -> bool {
        self.log_expression.is_some()
    }
}

/// A remote `(path, line)` pair as the debuggee reports it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BreakpointLocation {
    pub path: String,
    pub line: u32,
}

impl BreakpointLocation {
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }
}

/// Why the debuggee stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PauseReason {
    /// The location matches an enabled breakpoint.
    Breakpoint(Breakpoint),
    /// A watch expression fired.
    Watch(u32),
    /// Stepping, suspend, or a stop not caused by a known breakpoint.
    Step,
}

/// Manages breakpoints across files for a debug session.
#[derive(Debug, Clone)]
pub struct BreakpointManager {
    resolver: PathResolver,
    breakpoints: HashMap<PathBuf, Vec<Breakpoint>>,
    index: HashMap<BreakpointLocation, (PathBuf, u32)>,
}

impl BreakpointManager {
    pub fn new(resolver: PathResolver) -> Self {
        Self {
            resolver,
            breakpoints: HashMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Add a breakpoint, replacing one already on the same line. Returns
    /// the commands that register it with the debuggee.
    pub fn add(&mut self, bp: Breakpoint) -> Vec<Command> {
        let commands = if bp.enabled {
            self.set_commands(&bp.path, bp.line)
        } else {
            Vec::new()
        };
        let list = self.breakpoints.entry(bp.path.clone()).or_default();
        match list.iter_mut().find(|existing| existing.line == bp.line) {
            Some(existing) => *existing = bp,
            None => {
                list.push(bp);
                list.sort_by_key(|b| b.line);
            }
        }
        self.reindex();
        commands
    }

    /// Remove the breakpoint at `path:line`. Returns the commands that
    /// unregister it, or `None` if there was no such breakpoint.
    pub fn remove(&mut self, path: &Path, line: u32) -> Option<Vec<Command>> {
        let list = self.breakpoints.get_mut(path)?;
        let before = list.len();
        list.retain(|bp| bp.line != line);
        if list.len() == before {
            return None;
        }
        if list.is_empty() {
            self.breakpoints.remove(path);
        }
        self.reindex();
        Some(self.delete_commands(path, line))
    }

    /// Flip `enabled`. Returns the new state and the commands to apply it.
    pub fn toggle(&mut self, path: &Path, line: u32) -> Option<(bool, Vec<Command>)> {
        let bp = self
            .breakpoints
            .get_mut(path)?
            .iter_mut()
            .find(|bp| bp.line == line)?;
        bp.enabled = !bp.enabled;
        let enabled = bp.enabled;
        self.reindex();
        let commands = if enabled {
            self.set_commands(path, line)
        } else {
            self.delete_commands(path, line)
        };
        Some((enabled, commands))
    }

    /// Get all breakpoints for a file, ordered by line.
    pub fn get_for_file(&self, path: &Path) -> &[Breakpoint] {
        self.breakpoints.get(path).map_or(&[], |v| v.as_slice())
    }

    /// Remove all breakpoints for a specific file.
    pub fn clear_file(&mut self, path: &Path) {
        self.breakpoints.remove(path);
        self.reindex();
    }

    /// Remove every breakpoint.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
        self.index.clear();
    }

    /// All breakpoints, ordered by path then line.
    pub fn all(&self) -> Vec<&Breakpoint> {
        let mut all: Vec<&Breakpoint> = self.breakpoints.values().flatten().collect();
        all.sort_by(|a, b| a.path.cmp(&b.path).then(a.line.cmp(&b.line)));
        all
    }

    pub fn len(&self) -> usize {
        self.breakpoints.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// `SETB` for every remote spelling of every enabled breakpoint, used
    /// when a debuggee (re)connects.
    pub fn sync_commands(&self) -> Vec<Command> {
        self.all()
            .into_iter()
            .filter(|bp| bp.enabled)
            .flat_map(|bp| self.set_commands(&bp.path, bp.line))
            .collect()
    }

    /// Remote locations of the enabled breakpoints.
    pub fn active_locations(&self) -> HashSet<BreakpointLocation> {
        self.index.keys().cloned().collect()
    }

    /// Decide whether a pause at remote `file:line` hit a breakpoint.
    pub fn classify_pause(&self, file: &str, line: u32) -> PauseReason {
        let location = BreakpointLocation::new(file, line);
        let hit = self.index.get(&location).cloned().or_else(|| {
            // The debuggee may report a spelling we did not register, such
            // as an absolute path.
            let local = self.resolver.resolve_local_path(file)?;
            Some((local, line))
        });
        match hit.and_then(|(path, line)| self.find_enabled(&path, line)) {
            Some(bp) => PauseReason::Breakpoint(bp.clone()),
            None => PauseReason::Step,
        }
    }

    fn find_enabled(&self, path: &Path, line: u32) -> Option<&Breakpoint> {
        self.get_for_file(path)
            .iter()
            .find(|bp| bp.line == line && bp.enabled)
    }

    fn set_commands(&self, path: &Path, line: u32) -> Vec<Command> {
        self.resolver
            .compute_remote_candidates(path)
            .into_iter()
            .map(|file| Command::SetBreakpoint { file, line })
            .collect()
    }

    fn delete_commands(&self, path: &Path, line: u32) -> Vec<Command> {
        self.resolver
            .compute_remote_candidates(path)
            .into_iter()
            .map(|file| Command::DeleteBreakpoint { file, line })
            .collect()
    }

    fn reindex(&mut self) {
        let mut index = HashMap::new();
        for bp in self.breakpoints.values().flatten().filter(|bp| bp.enabled) {
            for remote in self.resolver.compute_remote_candidates(&bp.path) {
                index.insert(
                    BreakpointLocation::new(remote, bp.line),
                    (bp.path.clone(), bp.line),
                );
            }
        }
        self.index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "/home/dev/game";

    fn manager() -> BreakpointManager {
        BreakpointManager::new(PathResolver::new(ROOT))
    }

    fn local(name: &str) -> PathBuf {
        PathBuf::from(format!("{ROOT}/{name}"))
    }

    #[test]
    fn add_returns_setb_for_each_spelling() {
        let mut mgr = manager();
        let commands = mgr.add(Breakpoint::new(local("main/game.lua"), 10));
        assert_eq!(
            commands,
            vec![
                Command::SetBreakpoint {
                    file: "main/game.lua".into(),
                    line: 10
                },
                Command::SetBreakpoint {
                    file: "@main/game.lua".into(),
                    line: 10
                },
            ]
        );
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn add_same_line_replaces() {
        let mut mgr = manager();
        let path = local("a.lua");
        mgr.add(Breakpoint::new(&path, 3));
        mgr.add(Breakpoint::new(&path, 3).with_condition("x > 1"));
        let bps = mgr.get_for_file(&path);
        assert_eq!(bps.len(), 1);
        assert_eq!(bps[0].condition.as_deref(), Some("x > 1"));
    }

    #[test]
    fn remove_returns_delb() {
        let mut mgr = manager();
        let path = local("a.lua");
        mgr.add(Breakpoint::new(&path, 3));
        mgr.add(Breakpoint::new(&path, 9));

        let commands = mgr.remove(&path, 3).unwrap();
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[0], Command::DeleteBreakpoint { line: 3, .. }));
        assert_eq!(mgr.get_for_file(&path).len(), 1);
        assert_eq!(mgr.get_for_file(&path)[0].line, 9);

        assert!(mgr.remove(&path, 999).is_none());
    }

    #[test]
    fn pause_on_breakpoint_vs_step() {
        let mut mgr = manager();
        mgr.add(Breakpoint::new(local("main/game.lua"), 42));

        assert!(matches!(
            mgr.classify_pause("@main/game.lua", 42),
            PauseReason::Breakpoint(ref bp) if bp.line == 42
        ));
        assert!(matches!(
            mgr.classify_pause("main/game.lua", 42),
            PauseReason::Breakpoint(_)
        ));
        assert_eq!(mgr.classify_pause("main/game.lua", 43), PauseReason::Step);
    }

    #[test]
    fn pause_with_rooted_spelling_resolves() {
        let mut mgr = manager();
        mgr.add(Breakpoint::new(local("main/game.lua"), 42));
        assert!(matches!(
            mgr.classify_pause("/main/game.lua", 42),
            PauseReason::Breakpoint(_)
        ));
    }

    #[test]
    fn disabled_breakpoints_do_not_stop_or_sync() {
        let mut mgr = manager();
        let path = local("a.lua");
        mgr.add(Breakpoint::new(&path, 5));
        let (enabled, commands) = mgr.toggle(&path, 5).unwrap();
        assert!(!enabled);
        assert!(matches!(commands[0], Command::DeleteBreakpoint { .. }));
        assert_eq!(mgr.classify_pause("a.lua", 5), PauseReason::Step);
        assert!(mgr.sync_commands().is_empty());
        assert!(mgr.active_locations().is_empty());

        let (enabled, commands) = mgr.toggle(&path, 5).unwrap();
        assert!(enabled);
        assert!(matches!(commands[0], Command::SetBreakpoint { .. }));
    }

    #[test]
    fn sync_is_ordered_by_path_and_line() {
        let mut mgr = manager();
        mgr.add(Breakpoint::new(local("b.lua"), 1));
        mgr.add(Breakpoint::new(local("a.lua"), 7));
        mgr.add(Breakpoint::new(local("a.lua"), 2));
        let files: Vec<String> = mgr
            .sync_commands()
            .into_iter()
            .map(|c| c.wire_text())
            .collect();
        assert_eq!(
            files,
            [
                "SETB a.lua 2",
                "SETB @a.lua 2",
                "SETB a.lua 7",
                "SETB @a.lua 7",
                "SETB b.lua 1",
                "SETB @b.lua 1"
            ]
        );
    }

    #[test]
    fn active_locations_hold_remote_spellings() {
        let mut mgr = manager();
        mgr.add(Breakpoint::new(local("x.lua"), 4));
        let active = mgr.active_locations();
        assert!(active.contains(&BreakpointLocation::new("x.lua", 4)));
        assert!(active.contains(&BreakpointLocation::new("@x.lua", 4)));
        assert!(!active.contains(&BreakpointLocation::new("x.lua", 5)));
    }

    #[test]
    fn breakpoint_outside_project_has_no_commands() {
        let mut mgr = manager();
        assert!(mgr.add(Breakpoint::new("/tmp/elsewhere.lua", 1)).is_empty());
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn clear_file_and_clear() {
        let mut mgr = manager();
        mgr.add(Breakpoint::new(local("a.lua"), 1));
        mgr.add(Breakpoint::new(local("b.lua"), 1));
        mgr.clear_file(&local("a.lua"));
        assert_eq!(mgr.len(), 1);
        mgr.clear();
        assert!(mgr.is_empty());
        assert!(mgr.active_locations().is_empty());
    }

    #[test]
    fn logpoint_builder() {
        let bp = Breakpoint::new("/a.lua", 1).with_log_expression("hp");
        assert!(bp.is_logpoint());
        assert!(bp.enabled);
    }
}
