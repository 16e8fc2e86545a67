//! # Region Index
//!
//! The manager's side of the file↔region relation: every live region is
//! owned here (as the single strong `Rc` holder besides pinned cursors),
//! bucketed by canonical file path, with the aggregate counters the
//! manager exposes kept in lockstep.
//!
//! Eviction order comes from each region's `last_access` tick rather than
//! a reordered list; with region counts bounded by `max_open_handles` a
//! linear scan over the pool is cheaper than maintaining intrusive links,
//! and it keeps the pinned-regions-are-never-evicted rule in one place.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::region::Region;

type RegionList = SmallVec<[Rc<Region>; 4]>;

/// Path → regions index plus the aggregate counters derived from it.
#[derive(Debug, Default)]
pub(crate) struct RegionIndex {
    by_file: HashMap<PathBuf, RegionList>,
    region_count: usize,
    used_count: usize,
    mapped_size: usize,
}

impl RegionIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly mapped region under its file.
    pub(crate) fn insert(&mut self, region: Rc<Region>) {
        self.region_count += 1;
        self.mapped_size += region.size();
        self.by_file
            .entry(region.path().to_path_buf())
            .or_default()
            .push(region);
    }

    /// Unregisters `region`; returns false if it was not indexed.
    ///
    /// Dropping the returned-from entry is what actually unmaps, once no
    /// cursor or view still shares the `Rc`.
    pub(crate) fn remove(&mut self, region: &Rc<Region>) -> bool {
        let Some(list) = self.by_file.get_mut(region.path()) else {
            return false;
        };
        let Some(pos) = list.iter().position(|r| Rc::ptr_eq(r, region)) else {
            return false;
        };

        list.swap_remove(pos);
        if list.is_empty() {
            self.by_file.remove(region.path());
        }
        self.region_count -= 1;
        self.mapped_size -= region.size();
        true
    }

    /// First open region of `path` whose range covers the absolute offset
    /// `ofs`. Ties between overlapping candidates are broken arbitrarily.
    pub(crate) fn find_covering(&self, path: &Path, ofs: u64) -> Option<Rc<Region>> {
        self.by_file
            .get(path)?
            .iter()
            .find(|r| r.includes_ofs(ofs))
            .map(Rc::clone)
    }

    /// The single region of `path`, if exactly one exists (greedy layout).
    pub(crate) fn sole_region(&self, path: &Path) -> Option<Rc<Region>> {
        let list = self.by_file.get(path)?;
        debug_assert!(list.len() <= 1, "greedy lookup on a tiled file");
        list.first().map(Rc::clone)
    }

    pub(crate) fn has_regions_for(&self, path: &Path) -> bool {
        self.by_file.contains_key(path)
    }

    /// Least-recently-used region with no clients, if any.
    pub(crate) fn lru_unused(&self) -> Option<Rc<Region>> {
        self.iter()
            .filter(|r| !r.is_used())
            .min_by_key(|r| r.last_access())
            .map(Rc::clone)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Rc<Region>> {
        self.by_file.values().flat_map(|list| list.iter())
    }

    /// Drops every region unconditionally. Close-time path: the caller has
    /// already unpinned all cursors.
    pub(crate) fn clear(&mut self) {
        self.by_file.clear();
        self.region_count = 0;
        self.used_count = 0;
        self.mapped_size = 0;
    }

    pub(crate) fn note_used(&mut self) {
        self.used_count += 1;
        debug_assert!(self.used_count <= self.region_count);
    }

    pub(crate) fn note_unused(&mut self) {
        debug_assert!(self.used_count > 0);
        self.used_count -= 1;
    }

    pub(crate) fn region_count(&self) -> usize {
        self.region_count
    }

    pub(crate) fn used_count(&self) -> usize {
        self.used_count
    }

    pub(crate) fn mapped_size(&self) -> usize {
        self.mapped_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finfo::FileInfo;
    use std::fs;
    use tempfile::tempdir;

    fn finfo(dir: &tempfile::TempDir, name: &str, len: usize) -> Rc<FileInfo> {
        let path = dir.path().join(name);
        fs::write(&path, vec![0u8; len]).unwrap();
        Rc::new(FileInfo::open(&path).unwrap())
    }

    #[test]
    fn insert_and_remove_keep_counters_exact() {
        let dir = tempdir().unwrap();
        let f = finfo(&dir, "a.bin", 64);
        let mut index = RegionIndex::new();

        let r1 = Rc::new(Region::map(&f, 0, 32).unwrap());
        let r2 = Rc::new(Region::map(&f, 0, 64).unwrap());
        index.insert(Rc::clone(&r1));
        index.insert(Rc::clone(&r2));

        assert_eq!(index.region_count(), 2);
        assert_eq!(index.mapped_size(), r1.size() + r2.size());

        assert!(index.remove(&r1));
        assert_eq!(index.region_count(), 1);
        assert_eq!(index.mapped_size(), r2.size());

        // second removal of the same region is a no-op
        assert!(!index.remove(&r1));

        assert!(index.remove(&r2));
        assert_eq!(index.region_count(), 0);
        assert_eq!(index.mapped_size(), 0);
        assert!(!index.has_regions_for(f.path()));
    }

    #[test]
    fn find_covering_matches_range() {
        let dir = tempdir().unwrap();
        let f = finfo(&dir, "b.bin", 100);
        let mut index = RegionIndex::new();

        let r = Rc::new(Region::map(&f, 0, 40).unwrap());
        index.insert(Rc::clone(&r));

        assert!(index.find_covering(f.path(), 0).is_some());
        assert!(index.find_covering(f.path(), 39).is_some());
        assert!(index.find_covering(f.path(), 40).is_none());
        assert!(index.find_covering(Path::new("/no/such"), 0).is_none());
    }

    #[test]
    fn lru_prefers_oldest_unused_and_skips_pinned() {
        let dir = tempdir().unwrap();
        let f = finfo(&dir, "c.bin", 100);
        let mut index = RegionIndex::new();

        let old = Rc::new(Region::map(&f, 0, 10).unwrap());
        let newer = Rc::new(Region::map(&f, 0, 20).unwrap());
        let pinned = Rc::new(Region::map(&f, 0, 30).unwrap());
        old.touch(1);
        newer.touch(2);
        pinned.touch(0);
        pinned.pin();

        index.insert(Rc::clone(&old));
        index.insert(Rc::clone(&newer));
        index.insert(Rc::clone(&pinned));

        // pinned has the lowest tick but is ineligible
        let victim = index.lru_unused().unwrap();
        assert!(Rc::ptr_eq(&victim, &old));

        index.remove(&old);
        let victim = index.lru_unused().unwrap();
        assert!(Rc::ptr_eq(&victim, &newer));

        index.remove(&newer);
        assert!(index.lru_unused().is_none());
    }
}
