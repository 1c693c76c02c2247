use crate::driver::extract::{BreakpointCreated, BreakpointRow, Location};
use serde::Serialize;
use std::collections::BTreeMap;

/// Breakpoint known to a session.
///
/// `id` is the session visible identifier, `number` is the identifier the debugger
/// process reported when the breakpoint was created. Ids of a restarted session
/// continue after the ids of its predecessor, so they never repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    pub id: u32,
    #[serde(skip)]
    pub number: u32,
    pub file: String,
    pub line: Option<u32>,
    pub function: Option<String>,
    pub condition: Option<String>,
    pub enabled: bool,
    pub temporary: bool,
    pub hit_count: u32,
    /// Line a function breakpoint actually stops at, known after its first hit.
    #[serde(skip)]
    stop_line: Option<u32>,
}

impl Breakpoint {
    fn is_hit_at_line(&self, location: &Location) -> bool {
        self.enabled && self.file == location.file && self.line == Some(location.line)
    }

    /// Function breakpoints are reported at `def` but stop at the first executable
    /// line of the body.
    fn is_hit_at_entry(&self, location: &Location) -> bool {
        let Some(function) = self.function.as_deref() else {
            return false;
        };
        if !self.enabled || self.file != location.file || function != location.function {
            return false;
        }
        match self.stop_line {
            Some(line) => line == location.line,
            None => self.line.map_or(true, |def| location.line > def),
        }
    }
}

/// Breakpoint requested by a client, completed with a debugger confirmation.
#[derive(Debug, Clone, Default)]
pub struct BreakpointRequest {
    pub function: Option<String>,
    pub condition: Option<String>,
    pub temporary: bool,
}

/// Session breakpoints ordered by id.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    id_base: u32,
    high_water: u32,
    breakpoints: BTreeMap<u32, Breakpoint>,
}

impl BreakpointTable {
    /// Create an empty table, ids start right after `id_base`.
    pub fn new(id_base: u32) -> Self {
        Self {
            id_base,
            high_water: 0,
            breakpoints: BTreeMap::new(),
        }
    }

    /// Base for a table of the next session incarnation.
    pub fn next_id_base(&self) -> u32 {
        self.id_base + self.high_water
    }

    pub fn insert(&mut self, created: BreakpointCreated, request: BreakpointRequest) -> &Breakpoint {
        self.high_water = self.high_water.max(created.number);
        let id = self.id_base + created.number;
        let brkpt = Breakpoint {
            id,
            number: created.number,
            file: created.file,
            line: Some(created.line),
            function: request.function,
            condition: request.condition,
            enabled: true,
            temporary: request.temporary,
            hit_count: 0,
            stop_line: None,
        };
        self.breakpoints.insert(id, brkpt);
        &self.breakpoints[&id]
    }

    pub fn get(&self, id: u32) -> Option<&Breakpoint> {
        self.breakpoints.get(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Breakpoint> {
        self.breakpoints.remove(&id)
    }

    pub fn set_enabled(&mut self, id: u32, enabled: bool) -> Option<&Breakpoint> {
        let brkpt = self.breakpoints.get_mut(&id)?;
        brkpt.enabled = enabled;
        Some(brkpt)
    }

    fn id_of(&self, number: u32) -> u32 {
        self.id_base + number
    }

    /// Remove breakpoints that the debugger deleted by itself (fired temporary breakpoints).
    pub fn remove_by_number(&mut self, numbers: &[u32]) {
        for number in numbers {
            self.breakpoints.remove(&self.id_of(*number));
        }
    }

    /// Find a breakpoint that explains a stop at `location` and count the hit. A
    /// breakpoint on the exact line wins over a function breakpoint.
    pub fn record_hit(&mut self, location: &Location) -> Option<u32> {
        let id = self
            .breakpoints
            .values()
            .find(|b| b.is_hit_at_line(location))
            .or_else(|| self.breakpoints.values().find(|b| b.is_hit_at_entry(location)))
            .map(|b| b.id)?;
        let brkpt = self.breakpoints.get_mut(&id)?;
        if brkpt.function.is_some() && brkpt.line != Some(location.line) {
            brkpt.stop_line = Some(location.line);
        }
        brkpt.hit_count += 1;
        Some(id)
    }

    /// Refresh state from a debugger `break` table. Breakpoints missing in the table
    /// are gone in the debugger and are removed.
    pub fn sync(&mut self, rows: &[BreakpointRow]) {
        let mut refreshed = BTreeMap::new();
        for row in rows {
            let id = self.id_of(row.number);
            if let Some(mut brkpt) = self.breakpoints.remove(&id) {
                brkpt.enabled = row.enabled;
                brkpt.hit_count = row.hits;
                brkpt.condition = row.condition.clone().or(brkpt.condition);
                refreshed.insert(id, brkpt);
            }
        }
        self.breakpoints = refreshed;
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    /// Breakpoints in ascending id order.
    pub fn snapshot(&self) -> Vec<Breakpoint> {
        self.breakpoints.values().cloned().collect()
    }
}
