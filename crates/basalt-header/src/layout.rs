//! Header placement and cipher/mode eligibility for the four volume
//! variants: {Normal, Hidden} × {V1 (legacy), V2 (current)}.

use basalt_io::Anchor;
use basalt_mode::ModeKind;
use basalt_primitives::CascadeKind;

/// Size of the header group reserved at the start of a V2 volume (the
/// primary header plus the space before the data area begins), and the
/// offset at which a hidden volume's own header sits within its outer
/// volume.
pub const HEADER_GROUP_SIZE: u64 = 65536;

pub const HEADER_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    V1,
    V2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeLayout {
    NormalV1,
    NormalV2,
    HiddenV1,
    HiddenV2,
}

impl VolumeLayout {
    pub fn all() -> &'static [VolumeLayout] {
        &[VolumeLayout::NormalV2, VolumeLayout::HiddenV2, VolumeLayout::NormalV1, VolumeLayout::HiddenV1]
    }

    pub fn is_hidden(&self) -> bool {
        matches!(self, VolumeLayout::HiddenV1 | VolumeLayout::HiddenV2)
    }

    pub fn version(&self) -> FormatVersion {
        match self {
            VolumeLayout::NormalV1 | VolumeLayout::HiddenV1 => FormatVersion::V1,
            VolumeLayout::NormalV2 | VolumeLayout::HiddenV2 => FormatVersion::V2,
        }
    }

    /// Where the primary header sits, relative to the start of the backing
    /// file or device.
    pub fn header_offset(&self) -> Anchor {
        match self {
            VolumeLayout::NormalV1 | VolumeLayout::NormalV2 => Anchor::Start(0),
            VolumeLayout::HiddenV1 | VolumeLayout::HiddenV2 => Anchor::Start(HEADER_GROUP_SIZE),
        }
    }

    /// Where the backup header sits, end-anchored. `None` for V1, which
    /// predates the backup-header feature.
    pub fn backup_header_offset(&self) -> Option<Anchor> {
        match self {
            VolumeLayout::NormalV2 => Some(Anchor::End(-(HEADER_GROUP_SIZE as i64))),
            VolumeLayout::HiddenV2 => Some(Anchor::End(-(2 * HEADER_GROUP_SIZE as i64))),
            VolumeLayout::NormalV1 | VolumeLayout::HiddenV1 => None,
        }
    }

    /// The start of the data area, relative to the start of the backing
    /// file — used to translate a volume-relative byte offset into a
    /// backing-file-relative one. Only meaningful for `Normal` layouts;
    /// a hidden volume's data area is positioned by the creator within
    /// the outer volume and is not a fixed constant.
    pub fn data_start(&self) -> Option<u64> {
        match self {
            VolumeLayout::NormalV1 | VolumeLayout::NormalV2 => Some(HEADER_GROUP_SIZE),
            VolumeLayout::HiddenV1 | VolumeLayout::HiddenV2 => None,
        }
    }

    /// Cipher cascades this layout's header may be encrypted under. Both
    /// format versions accept the full cascade set.
    pub fn supported_cascades(&self) -> &'static [CascadeKind] {
        CascadeKind::all()
    }

    /// Cipher modes this layout's header may be encrypted under. V2 only
    /// ever used XTS; V1 predates XTS and used LRW, with CBC as its own
    /// predecessor still readable for very old volumes.
    pub fn supported_modes(&self) -> &'static [ModeKind] {
        match self.version() {
            FormatVersion::V2 => &[ModeKind::Xts],
            FormatVersion::V1 => &[ModeKind::Lrw, ModeKind::Cbc],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_header_sits_inside_outer_data_area() {
        assert!(matches!(VolumeLayout::HiddenV2.header_offset(), Anchor::Start(off) if off == HEADER_GROUP_SIZE));
    }

    #[test]
    fn v1_has_no_backup_header() {
        assert!(VolumeLayout::NormalV1.backup_header_offset().is_none());
        assert!(VolumeLayout::HiddenV1.backup_header_offset().is_none());
    }

    #[test]
    fn v2_backup_headers_are_distinct_from_each_other() {
        let normal = VolumeLayout::NormalV2.backup_header_offset().unwrap();
        let hidden = VolumeLayout::HiddenV2.backup_header_offset().unwrap();
        match (normal, hidden) {
            (Anchor::End(a), Anchor::End(b)) => assert_ne!(a, b),
            _ => panic!("expected end-anchored offsets"),
        }
    }
}
