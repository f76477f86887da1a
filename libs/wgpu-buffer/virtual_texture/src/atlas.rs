//! Fixed-size physical atlas with LRU eviction (Section 4.3 "PhysicalAtlas
//! contract"). Every slot is addressed by its row-major coordinate, so a
//! coordinate returned by [`PhysicalAtlas::get_new_position`] can be turned
//! straight back into a slot index by [`PhysicalAtlas::add`] without a
//! reverse lookup.

use std::collections::VecDeque;

use fxhash::FxHashMap;

use crate::page::{Page, VirtualPageKey, SENTINEL_KEY};

pub struct PhysicalAtlas {
    slots_per_axis: u32,
    slots: Vec<VirtualPageKey>,
    key_to_slot: FxHashMap<VirtualPageKey, usize>,
    /// Front is least-recently-used, back is most-recently-used.
    lru: VecDeque<usize>,
}

impl PhysicalAtlas {
    pub fn new(resolution: u32, page_size: u32) -> Self {
        let slots_per_axis = resolution / page_size;
        let slot_count = (slots_per_axis * slots_per_axis) as usize;
        Self {
            slots_per_axis,
            slots: vec![SENTINEL_KEY; slot_count],
            key_to_slot: FxHashMap::default(),
            lru: (0..slot_count).collect(),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn resident_count(&self) -> usize {
        self.key_to_slot.len()
    }

    fn index_to_coord(&self, index: usize) -> (u32, u32) {
        let index = index as u32;
        (index % self.slots_per_axis, index / self.slots_per_axis)
    }

    fn coord_to_index(&self, coordinate: (u32, u32)) -> usize {
        (coordinate.1 * self.slots_per_axis + coordinate.0) as usize
    }

    fn touch(&mut self, index: usize) {
        if let Some(position) = self.lru.iter().position(|&slot| slot == index) {
            self.lru.remove(position);
        }
        self.lru.push_back(index);
    }

    /// Reports whether `key` is resident, bumping it to most-recently-used
    /// on a hit.
    pub fn check_loaded(&mut self, key: VirtualPageKey) -> bool {
        if let Some(&index) = self.key_to_slot.get(&key) {
            self.touch(index);
            true
        } else {
            false
        }
    }

    pub fn coordinate_of(&self, key: VirtualPageKey) -> Option<(u32, u32)> {
        self.key_to_slot.get(&key).map(|&index| self.index_to_coord(index))
    }

    /// Evicts the least-recently-used slot and returns its coordinate. The
    /// evicted page's key stops being resident immediately.
    pub fn get_new_position(&mut self) -> (u32, u32) {
        let index = self.lru.pop_front().expect("atlas always has at least one slot");
        let evicted = std::mem::replace(&mut self.slots[index], SENTINEL_KEY);
        self.key_to_slot.remove(&evicted);
        self.lru.push_back(index);
        self.index_to_coord(index)
    }

    /// Marks `page` resident at `coordinate`, most-recently-used.
    pub fn add(&mut self, page: Page, coordinate: (u32, u32)) {
        let index = self.coord_to_index(coordinate);
        self.slots[index] = page.key();
        self.key_to_slot.insert(page.key(), index);
        self.touch(index);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_atlas_has_no_resident_pages() {
        let atlas = PhysicalAtlas::new(4, 1);
        assert_eq!(atlas.slot_count(), 16);
        assert_eq!(atlas.resident_count(), 0);
    }

    #[test]
    fn check_loaded_hits_after_add_and_bumps_lru() {
        let mut atlas = PhysicalAtlas::new(2, 1);
        let page = Page::new(1, (0, 0), 0);
        let coordinate = atlas.get_new_position();
        atlas.add(page, coordinate);
        assert!(atlas.check_loaded(page.key()));
        assert_eq!(atlas.coordinate_of(page.key()), Some(coordinate));
    }

    #[test]
    fn fifth_page_into_four_slots_evicts_the_first() {
        let mut atlas = PhysicalAtlas::new(2, 1);
        let pages: Vec<Page> = (0..5).map(|i| Page::new(i, (0, 0), 0)).collect();
        for page in &pages {
            if !atlas.check_loaded(page.key()) {
                let coordinate = atlas.get_new_position();
                atlas.add(*page, coordinate);
            }
        }
        assert!(!atlas.check_loaded(pages[0].key()));
        for page in &pages[1..] {
            assert!(atlas.check_loaded(page.key()), "page {:?} should still be resident", page);
        }
        assert_eq!(atlas.resident_count(), 4);
    }
}
