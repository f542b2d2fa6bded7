//! Ordered region storage.
//!
//! `order` is always the dense sequence 1..=len in array order. Ids come from
//! a counter that only moves forward, so an id is never handed out twice even
//! after removals or [`RegionSet::clear`].

use crate::region::{PercentRect, RegionId, TextRegion};
use crate::translations::TranslationMap;

#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    regions: Vec<TextRegion>,
    next_id: u64,
}

impl RegionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TextRegion> {
        self.regions.iter()
    }

    pub fn as_slice(&self) -> &[TextRegion] {
        &self.regions
    }

    /// Appends a region at the end of the reading sequence.
    pub fn add(&mut self, rect: PercentRect) -> RegionId {
        self.next_id += 1;
        let id = RegionId(self.next_id);
        self.regions.push(TextRegion {
            id,
            rect,
            original_text: String::new(),
            translated_text: String::new(),
            order: self.regions.len() as u32 + 1,
        });
        id
    }

    /// Removes the region and renumbers the survivors. Unknown ids are ignored.
    pub fn remove(&mut self, id: RegionId) -> bool {
        let before = self.regions.len();
        self.regions.retain(|region| region.id != id);
        if self.regions.len() == before {
            return false;
        }
        self.renumber();
        true
    }

    pub fn clear(&mut self) {
        self.regions.clear();
    }

    pub fn get(&self, id: RegionId) -> Option<&TextRegion> {
        self.regions.iter().find(|region| region.id == id)
    }

    pub fn get_mut(&mut self, id: RegionId) -> Option<&mut TextRegion> {
        self.regions.iter_mut().find(|region| region.id == id)
    }

    pub fn sorted_by_order(&self) -> Vec<&TextRegion> {
        let mut sorted: Vec<&TextRegion> = self.regions.iter().collect();
        sorted.sort_by_key(|region| region.order);
        sorted
    }

    pub fn set_original_text(&mut self, id: RegionId, text: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(region) => {
                region.original_text = text.into();
                true
            }
            None => false,
        }
    }

    pub fn set_translated_text(&mut self, id: RegionId, text: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(region) => {
                region.translated_text = text.into();
                true
            }
            None => false,
        }
    }

    /// Writes every translation whose id still exists; everything else keeps
    /// its previous translation. Returns the number of regions updated.
    pub fn apply_translations(&mut self, translations: &TranslationMap) -> usize {
        let mut updated = 0;
        for region in &mut self.regions {
            if let Some(text) = translations.get(region.id) {
                region.translated_text = text.to_string();
                updated += 1;
            }
        }
        updated
    }

    fn renumber(&mut self) {
        for (idx, region) in self.regions.iter_mut().enumerate() {
            region.order = idx as u32 + 1;
        }
    }
}
