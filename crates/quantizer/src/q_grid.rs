//! Candidate subdivisions of a single beat.
//!
//! A `QGrid` is a rhythm tree over the span `[0, 1)` of one beat. The tree is
//! stored as its leaves in depth-first order; each leaf records the path of
//! divisions that produced it, which is enough to recover offsets, durations
//! and the tree shape itself. A separate `next_downbeat` leaf sits at offset
//! 1 and collects events that snap to the start of the following beat.

use num_rational::Ratio;
use num_traits::{One, Signed, Zero};
use serde::{Deserialize, Serialize};
use tactus_domain::duration::{is_assignable, largest_power_of_two_below};
use tactus_domain::{Component, Duration, Leaf, Tuplet};

use crate::error::JobErrorKind;
use crate::proxy::QEventProxy;
use crate::q_event::QEvent;

/// One step down the rhythm tree: child `index` of `divisor` equal parts.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Division {
    pub divisor: u32,
    pub index: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QGridLeaf {
    pub path: Vec<Division>,
    pub q_event_proxies: Vec<QEventProxy>,
}

impl QGridLeaf {
    /// Offset within the beat. Not meaningful for a grid's next downbeat,
    /// which always sits at 1.
    pub fn start_offset(&self) -> Ratio<i64> {
        let mut scale: Ratio<i64> = Ratio::one();
        let mut offset: Ratio<i64> = Ratio::zero();
        for division in &self.path {
            scale /= i64::from(division.divisor);
            offset += scale * i64::from(division.index);
        }
        offset
    }

    pub fn duration(&self) -> Ratio<i64> {
        self.path
            .iter()
            .fold(Ratio::one(), |acc, division| acc / i64::from(division.divisor))
    }

    /// Divisors of every ancestor, root first.
    pub fn parentage(&self) -> Vec<u32> {
        self.path.iter().map(|division| division.divisor).collect()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct QGrid {
    leaves: Vec<QGridLeaf>,
    next_downbeat: QGridLeaf,
}

impl Default for QGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl QGrid {
    /// A single undivided leaf spanning the whole beat.
    pub fn new() -> Self {
        Self {
            leaves: vec![QGridLeaf::default()],
            next_downbeat: QGridLeaf::default(),
        }
    }

    pub fn leaves(&self) -> &[QGridLeaf] {
        &self.leaves
    }

    pub fn leaves_mut(&mut self) -> &mut [QGridLeaf] {
        &mut self.leaves
    }

    pub fn next_downbeat(&self) -> &QGridLeaf {
        &self.next_downbeat
    }

    pub fn next_downbeat_mut(&mut self) -> &mut QGridLeaf {
        &mut self.next_downbeat
    }

    /// Start offset of every leaf, followed by 1 for the next downbeat.
    pub fn offsets(&self) -> Vec<Ratio<i64>> {
        let mut offsets: Vec<Ratio<i64>> = self.leaves.iter().map(QGridLeaf::start_offset).collect();
        offsets.push(Ratio::one());
        offsets
    }

    pub fn leaf_durations(&self) -> Vec<Ratio<i64>> {
        self.leaves.iter().map(QGridLeaf::duration).collect()
    }

    /// Leaves followed by the next downbeat.
    pub fn slots(&self) -> impl Iterator<Item = &QGridLeaf> {
        self.leaves.iter().chain(std::iter::once(&self.next_downbeat))
    }

    fn slot_mut(&mut self, index: usize) -> &mut QGridLeaf {
        if index < self.leaves.len() {
            &mut self.leaves[index]
        } else {
            &mut self.next_downbeat
        }
    }

    /// Snap each proxy to the nearest leaf boundary, in order. A proxy exactly
    /// halfway between two boundaries goes to the later one.
    pub fn fit_q_events(&mut self, q_event_proxies: &[QEventProxy]) -> Result<(), JobErrorKind> {
        let offsets = self.offsets();
        for proxy in q_event_proxies {
            if proxy.offset.is_negative() || proxy.offset > Ratio::one() {
                return Err(JobErrorKind::Unfittable {
                    offset: proxy.offset,
                });
            }
            let index = offsets.partition_point(|offset| *offset < proxy.offset);
            let slot = if offsets[index] == proxy.offset {
                index
            } else {
                let (left, right) = (offsets[index - 1], offsets[index]);
                if proxy.offset - left < right - proxy.offset {
                    index - 1
                } else {
                    index
                }
            };
            self.slot_mut(slot).q_event_proxies.push(proxy.clone());
        }
        Ok(())
    }

    /// A copy of this grid's shape with the given leaves split into equal
    /// parts. Proxies are not carried over; refit them afterwards.
    pub fn subdivide_leaves(&self, commands: &[(usize, u32)]) -> QGrid {
        let mut leaves = Vec::with_capacity(self.leaves.len());
        for (i, leaf) in self.leaves.iter().enumerate() {
            match commands.iter().find(|(index, _)| *index == i) {
                Some(&(_, divisor)) => {
                    for index in 0..divisor {
                        let mut path = leaf.path.clone();
                        path.push(Division { divisor, index });
                        leaves.push(QGridLeaf {
                            path,
                            q_event_proxies: Vec::new(),
                        });
                    }
                }
                None => leaves.push(QGridLeaf {
                    path: leaf.path.clone(),
                    q_event_proxies: Vec::new(),
                }),
            }
        }
        QGrid {
            leaves,
            next_downbeat: QGridLeaf::default(),
        }
    }

    /// Total displacement between each proxy and the boundary it snapped to.
    pub fn distance(&self) -> Ratio<i64> {
        self.slots()
            .zip(self.offsets())
            .flat_map(|(slot, offset)| {
                slot.q_event_proxies
                    .iter()
                    .map(move |proxy| (proxy.offset - offset).abs())
            })
            .fold(Ratio::zero(), |acc, d| acc + d)
    }

    pub fn q_event_proxies(&self) -> impl Iterator<Item = &QEventProxy> {
        self.slots().flat_map(|slot| slot.q_event_proxies.iter())
    }

    /// The tree in RTM notation, e.g. `(1 ((1 (1 1)) 1))`.
    pub fn rtm_format(&self) -> String {
        let mut out = String::new();
        write_rtm(&self.leaves, 0, &mut out);
        out
    }

    /// Notation for this grid spanning `beatspan`, with one placeholder rest
    /// per leaf, and the q-events snapped to each leaf in leaf order.
    pub fn to_components(&self, beatspan: Duration) -> (Vec<Component>, Vec<Option<Vec<QEvent>>>) {
        let mut components = Vec::new();
        let mut annotations = Vec::new();
        build_components(&self.leaves, 0, beatspan, &mut components, &mut annotations);
        (components, annotations)
    }
}

/// Consecutive runs of leaves sharing the same child index at `depth`.
fn group_children(leaves: &[QGridLeaf], depth: usize) -> Vec<&[QGridLeaf]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=leaves.len() {
        if i == leaves.len() || leaves[i].path[depth].index != leaves[start].path[depth].index {
            groups.push(&leaves[start..i]);
            start = i;
        }
    }
    groups
}

fn is_single_leaf(leaves: &[QGridLeaf], depth: usize) -> bool {
    leaves.len() == 1 && leaves[0].depth() == depth
}

fn write_rtm(leaves: &[QGridLeaf], depth: usize, out: &mut String) {
    if is_single_leaf(leaves, depth) {
        out.push('1');
        return;
    }
    out.push_str("(1 (");
    for (i, group) in group_children(leaves, depth).into_iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write_rtm(group, depth + 1, out);
    }
    out.push_str("))");
}

fn build_components(
    leaves: &[QGridLeaf],
    depth: usize,
    written: Duration,
    components: &mut Vec<Component>,
    annotations: &mut Vec<Option<Vec<QEvent>>>,
) {
    if is_single_leaf(leaves, depth) {
        let leaf = &leaves[0];
        components.push(Component::Leaf(Leaf::rest(written)));
        annotations.push(if leaf.q_event_proxies.is_empty() {
            None
        } else {
            Some(leaf.q_event_proxies.iter().map(|p| p.q_event.clone()).collect())
        });
        return;
    }
    let groups = group_children(leaves, depth);
    let count = groups.len() as i64;
    let part = written / count;
    if is_assignable(part) {
        for group in groups {
            build_components(group, depth + 1, part, components, annotations);
        }
    } else {
        let power = largest_power_of_two_below(count);
        let mut inner = Vec::with_capacity(groups.len());
        for group in groups {
            build_components(group, depth + 1, written / power, &mut inner, annotations);
        }
        components.push(Component::Tuplet(Tuplet {
            multiplier: Ratio::new(power, count),
            components: inner,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::q_event::millis;
    use tactus_domain::Pitch;

    fn proxy(numer: i64, denom: i64) -> QEventProxy {
        QEventProxy::new(QEvent::pitched(millis(0), [Pitch(0)]), Ratio::new(numer, denom))
    }

    #[test]
    fn new_grid_is_one_leaf() {
        let grid = QGrid::new();
        assert_eq!(grid.rtm_format(), "1");
        assert_eq!(grid.offsets(), vec![Ratio::zero(), Ratio::one()]);
        assert_eq!(grid.leaf_durations(), vec![Ratio::one()]);
    }

    #[test]
    fn fitting_snaps_to_nearest_boundary() {
        let mut grid = QGrid::new();
        grid.fit_q_events(&[proxy(1, 4), proxy(1, 2), proxy(3, 4)]).unwrap();
        assert_eq!(grid.leaves()[0].q_event_proxies, vec![proxy(1, 4)]);
        assert_eq!(
            grid.next_downbeat().q_event_proxies,
            vec![proxy(1, 2), proxy(3, 4)]
        );
        assert_eq!(grid.distance(), Ratio::new(1, 4) + Ratio::new(1, 2) + Ratio::new(1, 4));
    }

    #[test]
    fn fitting_rejects_offsets_outside_the_beat() {
        let mut grid = QGrid::new();
        assert_eq!(
            grid.fit_q_events(&[proxy(5, 4)]),
            Err(JobErrorKind::Unfittable {
                offset: Ratio::new(5, 4)
            })
        );
        assert!(grid.fit_q_events(&[proxy(-1, 4)]).is_err());
    }

    #[test]
    fn subdivision_keeps_durations_summing_to_one() {
        let grid = QGrid::new().subdivide_leaves(&[(0, 2)]);
        let grid = grid.subdivide_leaves(&[(0, 3), (1, 2)]);
        assert_eq!(grid.rtm_format(), "(1 ((1 (1 1 1)) (1 (1 1))))");
        assert_eq!(
            grid.offsets(),
            vec![
                Ratio::zero(),
                Ratio::new(1, 6),
                Ratio::new(1, 3),
                Ratio::new(1, 2),
                Ratio::new(3, 4),
                Ratio::one()
            ]
        );
        let total = grid
            .leaf_durations()
            .into_iter()
            .fold(Ratio::zero(), |acc, d| acc + d);
        assert_eq!(total, Ratio::one());
        assert_eq!(grid.leaves()[2].parentage(), vec![2, 3]);
    }

    #[test]
    fn triplet_grid_becomes_a_tuplet() {
        let mut grid = QGrid::new().subdivide_leaves(&[(0, 3)]);
        grid.fit_q_events(&[proxy(1, 3)]).unwrap();
        let (components, annotations) = grid.to_components(Duration::new(1, 4));
        assert_eq!(components.len(), 1);
        match &components[0] {
            Component::Tuplet(tuplet) => {
                assert_eq!(tuplet.multiplier, Ratio::new(2, 3));
                assert_eq!(tuplet.components.len(), 3);
                assert_eq!(tuplet.components[0].duration(), Duration::new(1, 8));
            }
            other => panic!("expected a tuplet, got {:?}", other),
        }
        assert_eq!(annotations.len(), 3);
        assert!(annotations[0].is_none());
        assert_eq!(annotations[1].as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn binary_grid_needs_no_tuplet() {
        let grid = QGrid::new().subdivide_leaves(&[(0, 2)]).subdivide_leaves(&[(1, 2)]);
        let (components, annotations) = grid.to_components(Duration::new(1, 4));
        let durations: Vec<Duration> = components.iter().map(Component::duration).collect();
        assert_eq!(
            durations,
            vec![Duration::new(1, 8), Duration::new(1, 16), Duration::new(1, 16)]
        );
        assert!(annotations.iter().all(Option::is_none));
    }
}
