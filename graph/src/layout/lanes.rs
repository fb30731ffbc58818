use crate::core::{CommitId, CommitRecord};
use serde::Serialize;
use smallvec::SmallVec;
use std::sync::Arc;

/// A lane is a vertical column in the graph
pub type LaneIdx = usize;

/// Colour slot; renderers map it onto their own palette
pub type ColorIdx = usize;

/// A lane that is waiting for a commit further down the history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lane {
    pub index: LaneIdx,
    pub expecting: CommitId,
    pub color: ColorIdx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LaneRef {
    pub lane: LaneIdx,
    pub color: ColorIdx,
}

/// Line leaving a commit towards one of its parents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub lane: LaneIdx,
    pub parent: CommitId,
    pub color: ColorIdx,
}

/// One line of a row, without any geometry attached.
///
/// Upper segments run from the top of the row (`from`) into the row's
/// centre (`to`); lower segments run from the centre (`from`) to the
/// bottom of the row (`to`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub upper: bool,
    pub from: LaneIdx,
    pub to: LaneIdx,
    pub color: ColorIdx,
}

/// Lane layout of a single commit
#[derive(Debug, Clone, Serialize)]
pub struct GraphRow {
    pub record: Arc<CommitRecord>,
    pub lane: LaneIdx,
    pub color: ColorIdx,
    /// A line reaches the commit from above on its own lane
    pub incoming: bool,
    /// Other lanes that were expecting this commit and end here
    pub closed: SmallVec<[LaneRef; 2]>,
    /// One edge per parent that got a lane, in parent order
    pub outgoing: SmallVec<[Edge; 2]>,
    /// Lanes allocated by this row
    pub opened: SmallVec<[LaneRef; 2]>,
    /// Lanes running past the commit untouched
    pub passing: SmallVec<[LaneRef; 4]>,
    /// Parents that were already listed above this row
    pub dangling: SmallVec<[CommitId; 1]>,
    /// Columns needed to draw the row
    pub width: usize,
}

impl GraphRow {
    pub fn id(&self) -> &CommitId {
        &self.record.id
    }

    /// Lines touching this row, upper ones first
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::with_capacity(2 * self.passing.len() + 2);
        for p in &self.passing {
            segments.push(Segment { upper: true, from: p.lane, to: p.lane, color: p.color });
        }
        if self.incoming {
            segments.push(Segment { upper: true, from: self.lane, to: self.lane, color: self.color });
        }
        for c in &self.closed {
            segments.push(Segment { upper: true, from: c.lane, to: self.lane, color: c.color });
        }
        for p in &self.passing {
            segments.push(Segment { upper: false, from: p.lane, to: p.lane, color: p.color });
        }
        for e in &self.outgoing {
            segments.push(Segment { upper: false, from: self.lane, to: e.lane, color: e.color });
        }
        segments
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    expecting: CommitId,
    color: ColorIdx,
}

/// Assigns lanes to commits in the order they are listed.
///
/// Every slot is either free or waiting for one commit. A commit takes the
/// lowest lane that waits for it, or the lowest free lane when none does.
/// Its first parent continues straight down on that lane; further parents
/// join a lane already waiting for them or open the lowest free lane. Lanes
/// whose commit never shows up stay open, which is how a truncated history
/// looks.
#[derive(Debug, Clone, Default)]
pub struct LaneAssigner {
    slots: Vec<Option<Slot>>,
    next_color: ColorIdx,
    max_width: usize,
}

impl LaneAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lay out the next commit.
    ///
    /// `dangling` holds parents that were already assigned a row; they get
    /// no lane since nothing below can ever reach them.
    pub fn assign(&mut self, record: &Arc<CommitRecord>, dangling: &[CommitId]) -> GraphRow {
        let id = &record.id;
        let width_above = self.slots.len();

        let waiting: SmallVec<[LaneIdx; 2]> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Some(slot) if slot.expecting == *id => Some(i),
                _ => None,
            })
            .collect();

        let (lane, color, incoming) = match waiting.first() {
            Some(&lane) => {
                let color = self.slots[lane].as_ref().map_or(0, |s| s.color);
                (lane, color, true)
            }
            None => (self.lowest_free(), self.take_color(), false),
        };

        let mut closed = SmallVec::new();
        for &other in waiting.iter().skip(1) {
            if let Some(slot) = self.slots[other].take() {
                closed.push(LaneRef { lane: other, color: slot.color });
            }
        }

        let passing = self
            .slots
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != lane)
            .filter_map(|(i, slot)| {
                slot.as_ref().map(|s| LaneRef { lane: i, color: s.color })
            })
            .collect();

        let mut outgoing: SmallVec<[Edge; 2]> = SmallVec::new();
        let mut opened = SmallVec::new();
        let mut skipped = SmallVec::new();
        let mut continued = false;
        for parent in &record.parents {
            if outgoing.iter().any(|e| e.parent == *parent) || skipped.contains(parent) {
                continue;
            }
            if dangling.contains(parent) {
                skipped.push(parent.clone());
                continue;
            }

            if !continued {
                self.occupy(lane, parent.clone(), color);
                outgoing.push(Edge { lane, parent: parent.clone(), color });
                continued = true;
            } else if let Some(joined) = self.lane_expecting(parent) {
                outgoing.push(Edge { lane: joined.index, parent: parent.clone(), color: joined.color });
            } else {
                let index = self.lowest_free();
                let color = self.take_color();
                self.occupy(index, parent.clone(), color);
                opened.push(LaneRef { lane: index, color });
                outgoing.push(Edge { lane: index, parent: parent.clone(), color });
            }
        }

        if !continued {
            if let Some(slot) = self.slots.get_mut(lane) {
                *slot = None;
            }
        }

        let width = width_above.max(self.slots.len()).max(lane + 1);
        self.trim();
        self.max_width = self.max_width.max(width);

        GraphRow {
            record: Arc::clone(record),
            lane,
            color,
            incoming,
            closed,
            outgoing,
            opened,
            passing,
            dangling: skipped,
            width,
        }
    }

    /// Lanes still waiting for a commit. Once the history is exhausted
    /// these are the lines that run off the edge of the graph.
    pub fn open_lanes(&self) -> Vec<Lane> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.as_ref().map(|s| Lane {
                    index,
                    expecting: s.expecting.clone(),
                    color: s.color,
                })
            })
            .collect()
    }

    /// Live lanes plus any free holes between them
    pub fn lane_count(&self) -> usize {
        self.slots.len()
    }

    pub fn max_width(&self) -> usize {
        self.max_width
    }

    fn lowest_free(&self) -> LaneIdx {
        self.slots
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.slots.len())
    }

    fn lane_expecting(&self, id: &CommitId) -> Option<Lane> {
        self.slots.iter().enumerate().find_map(|(index, slot)| match slot {
            Some(s) if s.expecting == *id => Some(Lane {
                index,
                expecting: id.clone(),
                color: s.color,
            }),
            _ => None,
        })
    }

    fn occupy(&mut self, lane: LaneIdx, expecting: CommitId, color: ColorIdx) {
        if lane >= self.slots.len() {
            self.slots.resize(lane + 1, None);
        }
        self.slots[lane] = Some(Slot { expecting, color });
    }

    fn take_color(&mut self) -> ColorIdx {
        let color = self.next_color;
        self.next_color += 1;
        color
    }

    fn trim(&mut self) {
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::id::test_id;
    use crate::core::record::fixtures::record;
    use pretty_assertions::assert_eq;

    fn layout(records: Vec<CommitRecord>) -> (LaneAssigner, Vec<GraphRow>) {
        let mut assigner = LaneAssigner::new();
        let rows = records
            .into_iter()
            .map(|r| assigner.assign(&Arc::new(r), &[]))
            .collect();
        (assigner, rows)
    }

    fn lanes_of(rows: &[GraphRow]) -> Vec<LaneIdx> {
        rows.iter().map(|r| r.lane).collect()
    }

    fn closed_of(row: &GraphRow) -> Vec<LaneIdx> {
        row.closed.iter().map(|c| c.lane).collect()
    }

    #[test]
    fn linear_history_stays_on_lane_zero() {
        let (assigner, rows) = layout(vec![
            record(5, &[4], 50),
            record(4, &[3], 40),
            record(3, &[2], 30),
            record(2, &[1], 20),
            record(1, &[], 10),
        ]);
        assert_eq!(lanes_of(&rows), vec![0, 0, 0, 0, 0]);
        assert!(!rows[0].incoming);
        assert!(rows[1..].iter().all(|r| r.incoming));
        assert!(rows.iter().all(|r| r.width == 1));
        assert!(assigner.open_lanes().is_empty());
        assert_eq!(assigner.lane_count(), 0);
    }

    #[test]
    fn merge_opens_one_lane_until_the_shared_root() {
        // M = 4 with parents P1 = 2 and P2 = 3, both on top of R = 1
        let (assigner, rows) = layout(vec![
            record(4, &[2, 3], 40),
            record(2, &[1], 30),
            record(3, &[1], 20),
            record(1, &[], 10),
        ]);
        assert_eq!(lanes_of(&rows), vec![0, 0, 1, 0]);

        let merge = &rows[0];
        assert_eq!(
            merge.outgoing.iter().map(|e| (e.lane, e.parent.clone())).collect::<Vec<_>>(),
            vec![(0, test_id(2)), (1, test_id(3))]
        );
        assert_eq!(merge.opened.iter().map(|l| l.lane).collect::<Vec<_>>(), vec![1]);
        assert_eq!(merge.width, 2);

        assert_eq!(rows[1].passing.iter().map(|l| l.lane).collect::<Vec<_>>(), vec![1]);
        assert_eq!(rows[2].passing.iter().map(|l| l.lane).collect::<Vec<_>>(), vec![0]);
        assert_eq!(closed_of(&rows[3]), vec![1]);
        assert!(rows[3].outgoing.is_empty());
        assert!(assigner.open_lanes().is_empty());
        assert_eq!(assigner.max_width(), 2);
    }

    #[test]
    fn converging_branches_leave_one_lane() {
        // two heads on top of 2, which continues to 1
        let (assigner, rows) = layout(vec![
            record(4, &[2], 40),
            record(3, &[2], 30),
            record(2, &[1], 20),
        ]);
        assert_eq!(lanes_of(&rows), vec![0, 1, 0]);
        assert_eq!(closed_of(&rows[2]), vec![1]);
        assert_eq!(
            assigner.open_lanes(),
            vec![Lane { index: 0, expecting: test_id(1), color: rows[0].color }]
        );
        assert_eq!(assigner.lane_count(), 1);
    }

    #[test]
    fn released_lane_is_reused_lowest_first() {
        let (_, rows) = layout(vec![
            record(10, &[1], 100),
            record(11, &[2], 90),
            record(12, &[3], 80),
            record(2, &[], 70),
            record(13, &[4], 60),
        ]);
        assert_eq!(lanes_of(&rows), vec![0, 1, 2, 1, 1]);
        assert!(!rows[4].incoming);
        assert_eq!(rows[4].width, 3);
    }

    #[test]
    fn colors_follow_the_first_parent() {
        let (_, rows) = layout(vec![
            record(4, &[2, 3], 40),
            record(2, &[1], 30),
            record(3, &[1], 20),
        ]);
        let merge = &rows[0];
        assert_eq!(rows[1].color, merge.color);
        assert_eq!(rows[2].color, merge.opened[0].color);
        assert_ne!(rows[1].color, rows[2].color);
    }

    #[test]
    fn missing_parent_leaves_an_open_lane() {
        let (assigner, rows) = layout(vec![record(3, &[2], 30), record(9, &[], 20)]);
        assert_eq!(lanes_of(&rows), vec![0, 1]);
        assert_eq!(
            assigner
                .open_lanes()
                .into_iter()
                .map(|l| (l.index, l.expecting))
                .collect::<Vec<_>>(),
            vec![(0, test_id(2))]
        );
    }

    #[test]
    fn dangling_parent_gets_no_lane() {
        let mut assigner = LaneAssigner::new();
        let parent = assigner.assign(&Arc::new(record(1, &[], 10)), &[]);
        let child = assigner.assign(&Arc::new(record(2, &[1], 20)), &[test_id(1)]);

        assert_eq!(parent.lane, 0);
        assert_eq!(child.lane, 0);
        assert!(child.outgoing.is_empty());
        assert_eq!(child.dangling.to_vec(), vec![test_id(1)]);
        assert!(assigner.open_lanes().is_empty());
    }

    #[test]
    fn octopus_merge_opens_a_lane_per_extra_parent() {
        let (assigner, rows) = layout(vec![record(9, &[1, 2, 3], 90)]);
        let merge = &rows[0];
        assert_eq!(merge.opened.iter().map(|l| l.lane).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(merge.width, 3);
        assert_eq!(assigner.open_lanes().len(), 3);
    }

    #[test]
    fn extra_parent_joins_the_lane_expecting_it() {
        let (assigner, rows) = layout(vec![record(5, &[1], 50), record(6, &[2, 1], 40)]);
        let merge = &rows[1];
        assert_eq!(merge.lane, 1);
        assert!(merge.opened.is_empty());
        assert_eq!(
            merge.outgoing.iter().map(|e| e.lane).collect::<Vec<_>>(),
            vec![1, 0]
        );
        assert_eq!(assigner.open_lanes().len(), 2);
    }

    #[test]
    fn repeated_parent_is_expanded_once() {
        let (assigner, rows) = layout(vec![record(5, &[1, 1], 50)]);
        assert_eq!(rows[0].outgoing.len(), 1);
        assert_eq!(assigner.lane_count(), 1);
    }

    #[test]
    fn trailing_lanes_are_trimmed_after_they_close() {
        let (assigner, rows) = layout(vec![
            record(4, &[2, 3], 40),
            record(3, &[], 30),
        ]);
        assert_eq!(rows[1].lane, 1);
        assert_eq!(rows[1].width, 2);
        assert_eq!(assigner.lane_count(), 1);
    }

    #[test]
    fn merge_row_segments() {
        let (_, rows) = layout(vec![
            record(4, &[2, 3], 40),
            record(2, &[1], 30),
            record(3, &[1], 20),
            record(1, &[], 10),
        ]);
        let merge = rows[0].segments();
        assert_eq!(
            merge.iter().map(|s| (s.upper, s.from, s.to)).collect::<Vec<_>>(),
            vec![(false, 0, 0), (false, 0, 1)]
        );

        let root = rows[3].segments();
        assert_eq!(
            root.iter().map(|s| (s.upper, s.from, s.to)).collect::<Vec<_>>(),
            vec![(true, 0, 0), (true, 1, 0)]
        );
    }

    #[test]
    fn open_lanes_skip_interior_holes() {
        let (assigner, rows) = layout(vec![
            record(5, &[1], 50),
            record(6, &[2], 40),
            record(7, &[3], 30),
            record(2, &[], 20),
        ]);
        assert_eq!(lanes_of(&rows), vec![0, 1, 2, 1]);
        // lane 1 is free but lane 2 keeps the slot vector wide
        assert_eq!(assigner.lane_count(), 3);
        let open: Vec<_> = assigner
            .open_lanes()
            .into_iter()
            .map(|l| (l.index, l.expecting))
            .collect();
        assert_eq!(open, vec![(0, test_id(1)), (2, test_id(3))]);
    }
}
