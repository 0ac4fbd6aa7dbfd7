use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tactus_domain::{is_assignable, Duration};

use crate::error::{JobErrorKind, QuantizeError};
use crate::proxy::QEventProxy;
use crate::q_grid::QGrid;

/// Which divisors are allowed at each level: divisor -> rules for the parts
/// it creates, or `None` when those parts may not be divided further.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SearchTreeDefinition(pub BTreeMap<u32, Option<SearchTreeDefinition>>);

impl SearchTreeDefinition {
    /// A level whose divisors all end the tree.
    pub fn terminal(divisors: impl IntoIterator<Item = u32>) -> Self {
        divisors.into_iter().map(|divisor| (divisor, None)).collect()
    }

    fn validate(&self, path: &mut Vec<u32>) -> Result<(), QuantizeError> {
        if self.0.is_empty() {
            return Err(QuantizeError::configuration(format!(
                "search tree level after {:?} permits no divisors",
                path
            )));
        }
        for (&divisor, child) in &self.0 {
            if divisor < 2 {
                return Err(QuantizeError::configuration(format!(
                    "search tree divisor {} after {:?} must be at least 2",
                    divisor, path
                )));
            }
            if let Some(child) = child {
                path.push(divisor);
                child.validate(path)?;
                path.pop();
            }
        }
        Ok(())
    }
}

impl FromIterator<(u32, Option<SearchTreeDefinition>)> for SearchTreeDefinition {
    fn from_iter<I: IntoIterator<Item = (u32, Option<SearchTreeDefinition>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The unweighted search tree: every permitted divisor splits a leaf into
/// equal parts, and all permitted divisors are tried.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "SearchTreeDefinition", into = "SearchTreeDefinition")]
pub struct SearchTree {
    definition: SearchTreeDefinition,
}

impl Default for SearchTree {
    fn default() -> Self {
        let level = |entries: Vec<(u32, Option<SearchTreeDefinition>)>| -> SearchTreeDefinition {
            entries.into_iter().collect()
        };
        let definition = level(vec![
            (
                2,
                Some(level(vec![
                    (
                        2,
                        Some(level(vec![
                            (2, Some(SearchTreeDefinition::terminal([2]))),
                            (3, None),
                        ])),
                    ),
                    (3, None),
                    (5, None),
                    (7, None),
                ])),
            ),
            (
                3,
                Some(level(vec![
                    (2, Some(SearchTreeDefinition::terminal([2]))),
                    (3, None),
                    (5, None),
                ])),
            ),
            (5, Some(SearchTreeDefinition::terminal([2, 3]))),
            (7, Some(SearchTreeDefinition::terminal([2]))),
            (11, None),
            (13, None),
        ]);
        Self { definition }
    }
}

impl SearchTree {
    pub fn new(definition: SearchTreeDefinition) -> Result<Self, QuantizeError> {
        definition.validate(&mut Vec::new())?;
        Ok(Self { definition })
    }

    pub fn definition(&self) -> &SearchTreeDefinition {
        &self.definition
    }

    /// Fails when a beat of `beatspan` could not be written down at all.
    pub fn validate_beatspan(&self, beatspan: Duration) -> Result<(), QuantizeError> {
        if is_assignable(beatspan) {
            Ok(())
        } else {
            Err(QuantizeError::configuration(format!(
                "beatspan {} is not a single note value",
                beatspan
            )))
        }
    }

    /// Divisors permitted for a leaf reached through `parentage`, ascending.
    pub fn divisors_for(&self, parentage: &[u32]) -> Vec<u32> {
        let mut level = &self.definition;
        for divisor in parentage {
            match level.0.get(divisor) {
                Some(Some(child)) => level = child,
                _ => return Vec::new(),
            }
        }
        level.0.keys().copied().collect()
    }

    /// Every maximal chain of divisor choices, in lexicographic order,
    /// truncated at `max_depth` levels when given.
    pub fn subdivision_patterns(&self, max_depth: Option<usize>) -> Vec<Vec<u32>> {
        let mut patterns = Vec::new();
        collect_patterns(&self.definition, max_depth, &mut Vec::new(), &mut patterns);
        patterns
    }

    /// Every grid one step finer than `q_grid`: each leaf that hosts an event
    /// off its own boundary, or whose successor hosts one from before its
    /// boundary, is split by each permitted divisor, in every combination.
    pub fn expand(
        &self,
        q_grid: &QGrid,
        q_event_proxies: &[QEventProxy],
    ) -> Result<Vec<QGrid>, JobErrorKind> {
        let offsets = q_grid.offsets();
        let slots: Vec<_> = q_grid.slots().collect();
        let mut choices: Vec<(usize, Vec<u32>)> = Vec::new();
        for (i, leaf) in q_grid.leaves().iter().enumerate() {
            let (start, next_start) = (offsets[i], offsets[i + 1]);
            let preceding = slots[i + 1]
                .q_event_proxies
                .iter()
                .any(|proxy| proxy.offset < next_start);
            let aligned = leaf
                .q_event_proxies
                .iter()
                .filter(|proxy| proxy.offset >= start)
                .all(|proxy| proxy.offset == start);
            if !preceding && aligned {
                continue;
            }
            let divisors = self.divisors_for(&leaf.parentage());
            if !divisors.is_empty() {
                choices.push((i, divisors));
            }
        }
        if choices.is_empty() {
            return Ok(Vec::new());
        }

        let mut commands: Vec<Vec<(usize, u32)>> = vec![Vec::new()];
        for (index, divisors) in &choices {
            commands = commands
                .into_iter()
                .flat_map(|prefix| {
                    divisors.iter().map(move |&divisor| {
                        let mut command = prefix.clone();
                        command.push((*index, divisor));
                        command
                    })
                })
                .collect();
        }

        commands
            .iter()
            .map(|command| -> Result<QGrid, JobErrorKind> {
                let mut grid = q_grid.subdivide_leaves(command);
                grid.fit_q_events(q_event_proxies)?;
                Ok(grid)
            })
            .collect()
    }
}

impl TryFrom<SearchTreeDefinition> for SearchTree {
    type Error = QuantizeError;

    fn try_from(definition: SearchTreeDefinition) -> Result<Self, Self::Error> {
        Self::new(definition)
    }
}

impl From<SearchTree> for SearchTreeDefinition {
    fn from(tree: SearchTree) -> Self {
        tree.definition
    }
}

fn collect_patterns(
    level: &SearchTreeDefinition,
    max_depth: Option<usize>,
    prefix: &mut Vec<u32>,
    out: &mut Vec<Vec<u32>>,
) {
    for (&divisor, child) in &level.0 {
        prefix.push(divisor);
        match child {
            Some(child) if max_depth.map_or(true, |max| prefix.len() < max) => {
                collect_patterns(child, max_depth, prefix, out)
            }
            _ => out.push(prefix.clone()),
        }
        prefix.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::q_event::{millis, QEvent};
    use num_rational::Ratio;

    fn tree(json: &str) -> SearchTree {
        serde_json::from_str(json).unwrap()
    }

    fn proxy(numer: i64, denom: i64) -> QEventProxy {
        QEventProxy::new(QEvent::silent(millis(0)), Ratio::new(numer, denom))
    }

    #[test]
    fn parses_nested_definitions() {
        let tree = tree(r#"{"2": {"2": {"2": null}, "3": null}, "5": null}"#);
        assert_eq!(tree.divisors_for(&[]), vec![2, 5]);
        assert_eq!(tree.divisors_for(&[2]), vec![2, 3]);
        assert_eq!(tree.divisors_for(&[2, 2]), vec![2]);
        assert!(tree.divisors_for(&[2, 3]).is_empty());
        assert!(tree.divisors_for(&[5]).is_empty());
        assert!(tree.divisors_for(&[7]).is_empty());
    }

    #[test]
    fn enumerates_patterns_lexicographically() {
        let tree = tree(r#"{"2": {"2": {"2": null}, "3": null}, "5": null}"#);
        assert_eq!(
            tree.subdivision_patterns(None),
            vec![vec![2, 2, 2], vec![2, 3], vec![5]]
        );
        assert_eq!(tree.subdivision_patterns(Some(1)), vec![vec![2], vec![5]]);
    }

    #[test]
    fn rejects_malformed_definitions() {
        assert!(serde_json::from_str::<SearchTree>("{}").is_err());
        assert!(serde_json::from_str::<SearchTree>(r#"{"1": null}"#).is_err());
        assert!(serde_json::from_str::<SearchTree>(r#"{"2": {}}"#).is_err());
        assert!(SearchTree::new(SearchTreeDefinition::terminal([2, 3])).is_ok());
    }

    #[test]
    fn default_tree_is_valid() {
        let tree = SearchTree::default();
        assert!(SearchTree::new(tree.definition().clone()).is_ok());
        assert_eq!(tree.divisors_for(&[]), vec![2, 3, 5, 7, 11, 13]);
        assert_eq!(tree.divisors_for(&[2, 2, 2]), vec![2]);
    }

    #[test]
    fn beatspan_must_be_writable() {
        let tree = SearchTree::default();
        assert!(tree.validate_beatspan(Duration::new(1, 4)).is_ok());
        assert!(tree.validate_beatspan(Duration::new(3, 8)).is_ok());
        assert!(tree.validate_beatspan(Duration::new(1, 5)).is_err());
    }

    #[test]
    fn aligned_events_are_not_subdivided() {
        let tree = tree(r#"{"2": null, "3": null}"#);
        let proxies = vec![proxy(0, 1), proxy(1, 1)];
        let mut grid = QGrid::new();
        grid.fit_q_events(&proxies).unwrap();
        assert!(tree.expand(&grid, &proxies).unwrap().is_empty());
    }

    #[test]
    fn expansion_tries_every_divisor() {
        let tree = tree(r#"{"2": {"2": null}, "3": null, "5": null}"#);
        let proxies = vec![proxy(1, 4), proxy(1, 2), proxy(3, 4)];
        let mut grid = QGrid::new();
        grid.fit_q_events(&proxies).unwrap();
        let formats: Vec<String> = tree
            .expand(&grid, &proxies)
            .unwrap()
            .iter()
            .map(QGrid::rtm_format)
            .collect();
        assert_eq!(formats, vec!["(1 (1 1))", "(1 (1 1 1))", "(1 (1 1 1 1 1))"]);
    }
}
