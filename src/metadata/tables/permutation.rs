use std::collections::BTreeMap;

use crate::metadata::tables::{TableId, TableIndex};

/// A mapping from old row positions to new ones, per table.
///
/// Produced when tables are sorted (and duplicates dropped) and consumed by everything that
/// holds indices into the reordered tables. Tables without an entry map to themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permutation {
    maps: BTreeMap<TableId, Vec<u32>>,
}

impl Permutation {
    /// A permutation of a single table
    #[must_use]
    pub fn single(table: TableId, map: Vec<u32>) -> Self {
        let mut maps = BTreeMap::new();
        maps.insert(table, map);
        Permutation { maps }
    }

    pub(crate) fn insert(&mut self, table: TableId, map: Vec<u32>) {
        self.maps.insert(table, map);
    }

    pub(crate) fn into_map(mut self, table: TableId) -> Vec<u32> {
        self.maps.remove(&table).unwrap_or_default()
    }

    /// The new position of `index`. Rows beyond the mapped range (such as the one-past-end
    /// start of an empty list) keep their position shifted by the number of dropped rows.
    #[must_use]
    pub fn map(&self, index: TableIndex) -> TableIndex {
        let Some(map) = self.maps.get(&index.table) else {
            return index;
        };

        match map.get(index.row as usize) {
            Some(row) => TableIndex::new(index.table, *row),
            None => {
                let kept = map.iter().max().map_or(0, |max| max + 1);
                let past_end = index.row - map.len() as u32;
                TableIndex::new(index.table, kept + past_end)
            }
        }
    }

    /// The per-table map, if this table was reordered
    #[must_use]
    pub fn table(&self, table: TableId) -> Option<&[u32]> {
        self.maps.get(&table).map(Vec::as_slice)
    }

    /// Returns true if no row moves
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.maps.values().all(|map| {
            map.iter()
                .enumerate()
                .all(|(position, row)| position as u32 == *row)
        })
    }

    /// The permutation that applies `self` first and `then` second
    #[must_use]
    pub fn compose(&self, then: &Permutation) -> Permutation {
        let mut maps = self.maps.clone();
        for (table, map) in &mut maps {
            for row in map.iter_mut() {
                *row = then.map(TableIndex::new(*table, *row)).row;
            }
        }

        for (table, map) in &then.maps {
            maps.entry(*table).or_insert_with(|| map.clone());
        }

        Permutation { maps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rows() {
        let permutation = Permutation::single(TableId::FIELD, vec![2, 0, 1]);
        assert_eq!(
            permutation.map(TableIndex::new(TableId::FIELD, 0)),
            TableIndex::new(TableId::FIELD, 2)
        );
        assert_eq!(
            permutation.map(TableIndex::new(TableId::FIELD, 3)),
            TableIndex::new(TableId::FIELD, 3)
        );
        assert_eq!(
            permutation.map(TableIndex::new(TableId::TYPE_DEF, 0)),
            TableIndex::new(TableId::TYPE_DEF, 0)
        );
        assert!(!permutation.is_identity());
        assert!(Permutation::single(TableId::FIELD, vec![0, 1]).is_identity());
    }

    #[test]
    fn past_end_accounts_for_dropped_rows() {
        let permutation = Permutation::single(TableId::INTERFACE_IMPL, vec![0, 0, 1]);
        assert_eq!(
            permutation.map(TableIndex::new(TableId::INTERFACE_IMPL, 3)),
            TableIndex::new(TableId::INTERFACE_IMPL, 2)
        );
    }

    #[test]
    fn composes() {
        let first = Permutation::single(TableId::FIELD, vec![1, 0, 2]);
        let mut second = Permutation::single(TableId::FIELD, vec![0, 2, 1]);
        second.insert(TableId::PARAM, vec![1, 0]);

        let composed = first.compose(&second);
        assert_eq!(composed.table(TableId::FIELD), Some(&[2, 0, 1][..]));
        assert_eq!(composed.table(TableId::PARAM), Some(&[1, 0][..]));
    }
}
