//! Persisted slot map and row layout for the grid.
//!
//! Slots are 1-based and assigned once, when the policy is created; an entity
//! that later disappears keeps its historical slot.

use hwcheck_probe::Entity;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

pub const DEFAULT_ROW_WIDTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowSpec {
    pub name: String,
    /// `"1-8"`, `"9"`, or a comma list of either.
    pub range: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Visualization {
    pub slots: BTreeMap<String, u32>,
    pub row_width: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<RowSpec>,
}

impl Default for Visualization {
    fn default() -> Self {
        Self {
            slots: BTreeMap::new(),
            row_width: DEFAULT_ROW_WIDTH,
            rows: Vec::new(),
        }
    }
}

/// A resolved row: a label and the slots it shows, left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub name: String,
    pub slots: Vec<u32>,
}

/// Slots named by `spec`; every slot must lie within `1..=max`.
pub fn parse_range(spec: &str, max: u32) -> Result<Vec<u32>, String> {
    let mut out = Vec::new();
    for part in spec.split(',').map(str::trim) {
        if part.is_empty() {
            return Err(format!("empty element in range '{spec}'"));
        }
        let (lo, hi) = match part.split_once('-') {
            Some((a, b)) => (a.trim(), b.trim()),
            None => (part, part),
        };
        let lo: u32 = lo
            .parse()
            .map_err(|_| format!("'{part}' is not a slot number or range"))?;
        let hi: u32 = hi
            .parse()
            .map_err(|_| format!("'{part}' is not a slot number or range"))?;
        if lo == 0 || hi < lo {
            return Err(format!("'{part}' is not an ascending 1-based range"));
        }
        if hi > max {
            return Err(format!("'{part}' goes past the last mapped slot {max}"));
        }
        out.extend(lo..=hi);
    }
    Ok(out)
}

impl Visualization {
    /// Slots in observed order, one per distinct position.
    pub fn from_entities(entities: &[Entity]) -> Self {
        let mut v = Self::default();
        v.assign_missing(entities);
        let max = v.max_slot();
        v.rows = even_rows(max, v.row_width)
            .into_iter()
            .map(|r| RowSpec {
                range: match (r.slots.first(), r.slots.last()) {
                    (Some(a), Some(b)) if a == b => a.to_string(),
                    (Some(a), Some(b)) => format!("{a}-{b}"),
                    _ => String::new(),
                },
                name: r.name,
            })
            .collect();
        v
    }

    /// Appends slots for positions not yet mapped; existing slots never move.
    pub fn assign_missing(&mut self, entities: &[Entity]) -> Vec<String> {
        let mut next = self.max_slot() + 1;
        let mut added = Vec::new();
        for e in entities {
            if !self.slots.contains_key(&e.position) {
                self.slots.insert(e.position.clone(), next);
                added.push(e.position.clone());
                next += 1;
            }
        }
        added
    }

    /// Drops hand-edited slot `0` entries so their positions show as unmapped.
    pub fn drop_invalid_slots(&mut self) -> Vec<String> {
        let dropped: Vec<String> = self
            .slots
            .iter()
            .filter(|(_, slot)| **slot == 0)
            .map(|(pos, _)| pos.clone())
            .collect();
        for pos in &dropped {
            warn!(position = %pos, "ignoring slot 0 in saved map");
            self.slots.remove(pos);
        }
        dropped
    }

    pub fn max_slot(&self) -> u32 {
        self.slots.values().copied().max().unwrap_or(0)
    }

    pub fn slot_of(&self, position: &str) -> Option<u32> {
        self.slots.get(position).copied()
    }

    /// slot -> position; with duplicate slots the first position by name wins.
    pub fn positions_by_slot(&self) -> BTreeMap<u32, String> {
        let mut out = BTreeMap::new();
        for (pos, slot) in &self.slots {
            out.entry(*slot).or_insert_with(|| pos.clone());
        }
        out
    }

    /// Custom rows when any are valid, otherwise an even split by `row_width`.
    /// Invalid rows are skipped with a warning; mapped slots no row covers get
    /// a trailing row so nothing disappears from the grid.
    pub fn rows(&self) -> Vec<Row> {
        let max = self.max_slot();
        let mut rows = Vec::new();
        for spec in &self.rows {
            match parse_range(&spec.range, max) {
                Ok(slots) => rows.push(Row {
                    name: spec.name.clone(),
                    slots,
                }),
                Err(reason) => {
                    warn!(row = %spec.name, range = %spec.range, %reason, "skipping invalid grid row")
                }
            }
        }
        if rows.is_empty() {
            return even_rows(max, self.row_width);
        }
        let covered: BTreeSet<u32> = rows.iter().flat_map(|r| r.slots.iter().copied()).collect();
        let leftover: Vec<u32> = self
            .slots
            .values()
            .copied()
            .collect::<BTreeSet<u32>>()
            .into_iter()
            .filter(|s| !covered.contains(s))
            .collect();
        if !leftover.is_empty() {
            rows.push(Row {
                name: "Other".into(),
                slots: leftover,
            });
        }
        rows
    }
}

fn even_rows(max: u32, width: usize) -> Vec<Row> {
    let width = width.max(1) as u32;
    let mut rows = Vec::new();
    let mut start = 1;
    while start <= max {
        let end = (start + width - 1).min(max);
        rows.push(Row {
            name: format!("Row {}", rows.len() + 1),
            slots: (start..=end).collect(),
        });
        start = end + 1;
    }
    rows
}
