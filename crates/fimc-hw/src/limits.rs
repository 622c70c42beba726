//! Hardware limit tables and revision capabilities

/// Per-unit size limits of the scaler and rotator stages
///
/// Values are in pixels. The defaults are those of FIMC unit 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwLimits {
    /// Maximum pre-scaler output width
    pub pre_dst_w: u32,

    /// Maximum target height without the output rotator
    pub trg_h_no_rot: u32,

    /// Maximum target height with the output rotator
    pub trg_h_rot: u32,

    /// Maximum real source width without the input rotator
    pub real_w_no_rot: u32,

    /// Maximum real source height with the input rotator
    pub real_h_rot: u32,
}

impl Default for HwLimits {
    fn default() -> Self {
        Self {
            pre_dst_w: 3264,
            trg_h_no_rot: 3264,
            trg_h_rot: 1280,
            real_w_no_rot: 8192,
            real_h_rot: 1280,
        }
    }
}

/// Revision code of the unit that uses 14-bit main ratios and has no
/// pre-scaler width cap
pub const REVISION_FINE_RATIO: u32 = 0x50;

/// Scaler behaviour that differs between hardware revisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalerCaps {
    /// Fixed-point fraction bits of the main scale ratio
    pub main_ratio_bits: u32,

    /// Whether the pre-destination width cap and width-multiple rules apply
    pub enforce_alignment: bool,
}

impl ScalerCaps {
    /// Capabilities of a given revision code
    #[must_use]
    pub const fn for_revision(revision: u32) -> Self {
        if revision == REVISION_FINE_RATIO {
            Self {
                main_ratio_bits: 14,
                enforce_alignment: false,
            }
        } else {
            Self {
                main_ratio_bits: 8,
                enforce_alignment: true,
            }
        }
    }
}

impl Default for ScalerCaps {
    fn default() -> Self {
        Self::for_revision(0x43)
    }
}
