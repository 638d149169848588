use std::ops::Range;

/// Row allow-list of a dataset, stored as sorted local row numbers per shard.
///
/// When a [`crate::DatasetView`] carries an entry list, its cursors only visit the listed rows and
/// entry numbers count listed rows rather than physical rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryList {
    rows: Vec<Vec<u64>>,
}

impl EntryList {
    pub fn new(shard_count: usize) -> Self {
        Self {
            rows: vec![Vec::new(); shard_count],
        }
    }

    /// Adds `row` of `shard`. Returns `false` if it was already listed.
    pub fn enter(&mut self, shard: usize, row: u64) -> bool {
        if shard >= self.rows.len() {
            self.rows.resize_with(shard + 1, Vec::new);
        }
        let rows = &mut self.rows[shard];
        match rows.binary_search(&row) {
            Ok(_) => false,
            Err(pos) => {
                rows.insert(pos, row);
                true
            }
        }
    }

    pub fn contains(&self, shard: usize, row: u64) -> bool {
        self.rows
            .get(shard)
            .is_some_and(|rows| rows.binary_search(&row).is_ok())
    }

    pub fn len(&self) -> u64 {
        self.rows.iter().map(|rows| rows.len() as u64).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    pub fn shard_len(&self, shard: usize) -> usize {
        self.rows.get(shard).map_or(0, Vec::len)
    }

    pub fn rows(&self, shard: usize) -> &[u64] {
        self.rows.get(shard).map_or(&[], Vec::as_slice)
    }

    /// Copy of the list keeping only shards in `shards` (other shards become empty).
    pub fn restrict(&self, shards: Range<usize>) -> Self {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(idx, rows)| {
                if shards.contains(&idx) {
                    rows.clone()
                } else {
                    Vec::new()
                }
            })
            .collect();
        Self { rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_keeps_rows_sorted_and_unique() {
        let mut list = EntryList::new(2);
        assert!(list.enter(1, 7));
        assert!(list.enter(1, 3));
        assert!(!list.enter(1, 7));
        assert!(list.enter(3, 0));
        assert_eq!(list.rows(1), &[3, 7]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.shard_len(2), 0);
        assert!(list.contains(3, 0));

        let restricted = list.restrict(2..4);
        assert_eq!(restricted.len(), 1);
        assert!(!restricted.contains(1, 3));
    }
}
