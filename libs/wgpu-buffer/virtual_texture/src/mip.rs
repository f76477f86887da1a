//! Mip-chain bookkeeping for a newly-resident source texture (Section 4.3
//! "Mipmap generation"). The manager only computes counts and tile regions;
//! the 2x2-filter compute dispatch that actually produces the mips is an
//! out-of-scope render-pass collaborator.

/// `log2(mip0_size / page_size) + 1`. `mip0_size / page_size` is assumed to
/// be a power of two, as both are texture dimensions.
pub fn mip_count(mip0_size: u32, page_size: u32) -> u32 {
    assert!(mip0_size >= page_size, "mip0_size must be at least one page");
    let ratio = mip0_size / page_size;
    (u32::BITS - ratio.leading_zeros() - 1) + 1
}

/// The `page_size`-square source region for `page_coordinate` within the mip
/// level's own image.
pub fn source_region(page_coordinate: (u16, u16), page_size: u32) -> (u32, u32, u32) {
    (page_coordinate.0 as u32 * page_size, page_coordinate.1 as u32 * page_size, page_size)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mip_count_matches_log2_of_page_ratio() {
        assert_eq!(mip_count(128, 128), 1);
        assert_eq!(mip_count(1024, 128), 4);
        assert_eq!(mip_count(4096, 128), 6);
    }

    #[test]
    fn source_region_scales_by_page_size() {
        assert_eq!(source_region((2, 3), 128), (256, 384, 128));
    }
}
