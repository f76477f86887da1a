//! Per-frame residency update (Section 4.3 "Per-frame loop").

use fxhash::FxHashSet;

use crate::atlas::PhysicalAtlas;
use crate::error::ResidencyError;
use crate::indirection::IndirectionTable;
use crate::options::ResidencyOptions;
use crate::page::Page;

/// The four source-texture streams a resident page is copied into; the
/// manager schedules the same region against all four since they share a
/// page grid, the actual per-kind GPU upload is the caller's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    BaseColor,
    Normal,
    Pbr,
    Emissive,
}

pub const TEXTURE_KINDS: [TextureKind; 4] =
    [TextureKind::BaseColor, TextureKind::Normal, TextureKind::Pbr, TextureKind::Emissive];

/// One decoded entry from the GPU feedback buffer. `page` is `None` for a
/// pixel read back as all-1s (Section 4.3 "Failure modes": sentinel "no
/// request").
#[derive(Debug, Clone, Copy)]
pub struct FeedbackSample {
    pub pixel_index: usize,
    pub page: Option<Page>,
}

/// A tile-copy the manager wants performed: source is the mip-indexed region
/// of the geometry's own source texture, destination is the physical
/// coordinate scaled by the page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCopyRegion {
    pub geometry_id: u32,
    pub mip_level: u8,
    pub source_offset: (u32, u32),
    pub dest_offset: (u32, u32),
    pub size: u32,
}

pub struct ResidencyManager {
    options: ResidencyOptions,
    known_geometries: FxHashSet<u32>,
    atlas: PhysicalAtlas,
    indirection: IndirectionTable,
    shadow_atlas: PhysicalAtlas,
    shadow_indirection: IndirectionTable,
}

impl ResidencyManager {
    pub fn new(options: ResidencyOptions, indirection_width: u32, indirection_height: u32) -> Self {
        Self {
            options,
            known_geometries: FxHashSet::default(),
            atlas: PhysicalAtlas::new(options.atlas_resolution, options.page_size),
            indirection: IndirectionTable::new(indirection_width, indirection_height),
            shadow_atlas: PhysicalAtlas::new(options.shadow_atlas_resolution, options.shadow_page_size),
            shadow_indirection: IndirectionTable::new(indirection_width, indirection_height),
        }
    }

    pub fn options(&self) -> ResidencyOptions {
        self.options
    }

    pub fn atlas(&self) -> &PhysicalAtlas {
        &self.atlas
    }

    pub fn indirection(&self) -> &IndirectionTable {
        &self.indirection
    }

    pub fn shadow_atlas(&self) -> &PhysicalAtlas {
        &self.shadow_atlas
    }

    pub fn shadow_indirection(&self) -> &IndirectionTable {
        &self.shadow_indirection
    }

    /// Called in reaction to an `AddModel` scene event (Section 4.7):
    /// registers a geometry id so its pages are no longer rejected as
    /// unknown.
    pub fn register_geometry(&mut self, geometry_id: u32) {
        self.known_geometries.insert(geometry_id);
    }

    pub fn unregister_geometry(&mut self, geometry_id: u32) {
        self.known_geometries.remove(&geometry_id);
    }

    /// Applies one frame's main feedback stream, returning the tile copies
    /// that need to land in the physical atlas before this frame's draw.
    #[tracing::instrument(skip(self, feedback))]
    pub fn process_feedback(&mut self, feedback: &[FeedbackSample]) -> Vec<TileCopyRegion> {
        Self::process(&mut self.atlas, &mut self.indirection, self.options.page_size, feedback, &self.known_geometries)
    }

    /// Applies one frame's shadow feedback stream against the shadow atlas.
    #[tracing::instrument(skip(self, feedback))]
    pub fn process_shadow_feedback(&mut self, feedback: &[FeedbackSample]) -> Vec<TileCopyRegion> {
        Self::process(
            &mut self.shadow_atlas,
            &mut self.shadow_indirection,
            self.options.shadow_page_size,
            feedback,
            &self.known_geometries,
        )
    }

    fn process(
        atlas: &mut PhysicalAtlas,
        indirection: &mut IndirectionTable,
        page_size: u32,
        feedback: &[FeedbackSample],
        known: &FxHashSet<u32>,
    ) -> Vec<TileCopyRegion> {
        let mut copies = Vec::new();
        for sample in feedback {
            let Some(page) = sample.page else {
                indirection.write(sample.pixel_index, None);
                continue;
            };
            if !known.contains(&page.geometry_id) {
                tracing::warn!(geometry_id = page.geometry_id, "virtual texture feedback referenced unknown geometry");
                indirection.write(sample.pixel_index, None);
                continue;
            }

            let key = page.key();
            let coordinate = if atlas.check_loaded(key) {
                atlas.coordinate_of(key).expect("check_loaded just confirmed residency")
            } else {
                let coordinate = atlas.get_new_position();
                atlas.add(page, coordinate);
                copies.push(TileCopyRegion {
                    geometry_id: page.geometry_id,
                    mip_level: page.mip_level,
                    source_offset: (page.page_coordinate.0 as u32 * page_size, page.page_coordinate.1 as u32 * page_size),
                    dest_offset: (coordinate.0 * page_size, coordinate.1 * page_size),
                    size: page_size,
                });
                coordinate
            };
            indirection.write(sample.pixel_index, Some(coordinate));
        }
        copies
    }

    /// Reports whether the GPU's batched tile-mapping update for this
    /// frame's copies succeeded. A failure is Fatal (Section 4.3 "Failure
    /// modes").
    pub fn report_tile_mapping_update(&self, result: Result<(), String>) -> Result<(), ResidencyError> {
        result.map_err(|reason| ResidencyError::TileMappingUpdateFailed { reason })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn manager(atlas_resolution: u32, page_size: u32) -> ResidencyManager {
        let options = ResidencyOptions { page_size, atlas_resolution, shadow_page_size: page_size, shadow_atlas_resolution: atlas_resolution };
        ResidencyManager::new(options, 8, 8)
    }

    #[test]
    fn fifth_distinct_page_evicts_the_first_and_indirection_points_through_it() {
        let mut manager = manager(2, 1);
        for id in 0..5u32 {
            manager.register_geometry(id);
        }
        let pages: Vec<Page> = (0..5).map(|id| Page::new(id, (0, 0), 0)).collect();
        let feedback: Vec<FeedbackSample> =
            pages.iter().enumerate().map(|(i, &page)| FeedbackSample { pixel_index: i, page: Some(page) }).collect();

        for sample in &feedback {
            manager.process_feedback(std::slice::from_ref(sample));
        }

        assert!(!manager.atlas().check_loaded(pages[0].key()));
        for page in &pages[1..] {
            assert!(manager.atlas().coordinate_of(page.key()).is_some());
        }
        assert_eq!(manager.atlas().resident_count(), 4);

        let a_resolved = manager.indirection().get(0).expect("a's pixel was written when a arrived");
        let e_resolved = manager.atlas().coordinate_of(pages[4].key()).expect("e is resident");
        assert_eq!(a_resolved, e_resolved);
    }

    #[test]
    fn unknown_geometry_is_ignored_not_fatal() {
        let mut manager = manager(4, 1);
        let page = Page::new(99, (0, 0), 0);
        let copies = manager.process_feedback(&[FeedbackSample { pixel_index: 0, page: Some(page) }]);
        assert!(copies.is_empty());
        assert_eq!(manager.indirection().get(0), None);
    }

    #[test]
    fn sentinel_feedback_clears_the_indirection_entry() {
        let mut manager = manager(4, 1);
        manager.register_geometry(1);
        let page = Page::new(1, (0, 0), 0);
        manager.process_feedback(&[FeedbackSample { pixel_index: 0, page: Some(page) }]);
        assert!(manager.indirection().get(0).is_some());
        manager.process_feedback(&[FeedbackSample { pixel_index: 0, page: None }]);
        assert_eq!(manager.indirection().get(0), None);
    }

    #[test]
    fn repeated_feedback_for_a_resident_page_schedules_no_copy() {
        let mut manager = manager(4, 1);
        manager.register_geometry(1);
        let page = Page::new(1, (0, 0), 0);
        let first = manager.process_feedback(&[FeedbackSample { pixel_index: 0, page: Some(page) }]);
        let second = manager.process_feedback(&[FeedbackSample { pixel_index: 0, page: Some(page) }]);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn tile_mapping_update_failure_is_reported() {
        let manager = manager(4, 1);
        let result = manager.report_tile_mapping_update(Err("device lost".to_string()));
        assert!(matches!(result, Err(ResidencyError::TileMappingUpdateFailed { .. })));
        assert!(manager.report_tile_mapping_update(Ok(())).is_ok());
    }
}
