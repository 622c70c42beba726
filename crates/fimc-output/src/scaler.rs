//! Scaler Parameter Calculator
//!
//! Derives the two-stage scaler programming from a source and destination
//! size that are already in the same orientation. The pre-scaler divides by a
//! power of two; the main scaler covers the remaining ratio in fixed point.
//!
//! # Example
//!
//! ```rust
//! use fimc_hw::{ScalerCaps, Size};
//! use fimc_output::scaler::compute;
//!
//! let params = compute(Size::new(640, 480), Size::new(320, 480), ScalerCaps::default()).unwrap();
//! assert_eq!((params.pre_hratio, params.hfactor), (2, 1));
//! assert_eq!(params.main_hratio, 256);
//! ```

use fimc_hw::{PixelFormat, ScalerCaps, ScalerParams, Size};
use tracing::debug;

use crate::error::{OutputError, Result};

/// Ratio at which the pre-scaler runs out of steps
const MAX_PRESCALE_RATIO: u64 = 64;

/// Pre-scale bands as (ratio, shift), largest first
const PRESCALE_BANDS: [(u32, u32); 5] = [(32, 5), (16, 4), (8, 3), (4, 2), (2, 1)];

/// Pre-scale ratio and shift for one axis
///
/// Picks the largest power of two not exceeding `src / dst`. Fails when the
/// downscale is 64:1 or more.
pub fn prescale_factor(src: u32, dst: u32) -> Result<(u32, u32)> {
    let src = u64::from(src);
    let dst = u64::from(dst);

    if src >= dst * MAX_PRESCALE_RATIO {
        return Err(OutputError::scale_range(format!(
            "{} -> {} exceeds the {}:1 downscale limit",
            src, dst, MAX_PRESCALE_RATIO
        )));
    }

    Ok(PRESCALE_BANDS
        .iter()
        .copied()
        .find(|&(ratio, _)| src >= dst * u64::from(ratio))
        .unwrap_or((1, 0)))
}

/// Fixed-point main ratio for one axis
fn main_ratio(src: u32, dst: u32, shift: u32, bits: u32) -> u32 {
    ((u64::from(src) << bits) / (u64::from(dst) << shift)) as u32
}

/// Compute scaler parameters for `src` scaled into `dst`
pub fn compute(src: Size, dst: Size, caps: ScalerCaps) -> Result<ScalerParams> {
    let (pre_hratio, hfactor) = prescale_factor(src.width, dst.width)
        .map_err(|_| OutputError::scale_range(format!("width {} -> {}", src.width, dst.width)))?;
    let (pre_vratio, vfactor) = prescale_factor(src.height, dst.height)
        .map_err(|_| OutputError::scale_range(format!("height {} -> {}", src.height, dst.height)))?;

    let params = ScalerParams {
        pre_hratio,
        pre_vratio,
        hfactor,
        vfactor,
        pre_dst_width: src.width / pre_hratio,
        pre_dst_height: src.height / pre_vratio,
        main_hratio: main_ratio(src.width, dst.width, hfactor, caps.main_ratio_bits),
        main_vratio: main_ratio(src.height, dst.height, vfactor, caps.main_ratio_bits),
        scaleup_h: dst.width >= src.width,
        scaleup_v: dst.height >= src.height,
        bypass: false,
        shfactor: 10 - (hfactor + vfactor),
    };

    debug!(
        "Scaler {}x{} -> {}x{}: pre {}x{} (shift {}/{}), main {}/{}",
        src.width,
        src.height,
        dst.width,
        dst.height,
        params.pre_hratio,
        params.pre_vratio,
        params.hfactor,
        params.vfactor,
        params.main_hratio,
        params.main_vratio
    );

    Ok(params)
}

/// Check scaler parameters against the width rules of the hardware
///
/// Revisions without alignment enforcement skip the whole check.
pub fn check(
    params: &ScalerParams,
    src: Size,
    dst: Size,
    source_format: PixelFormat,
    destination_format: PixelFormat,
    caps: ScalerCaps,
    pre_dst_limit: u32,
) -> Result<()> {
    if !caps.enforce_alignment {
        return Ok(());
    }

    if params.pre_dst_width > pre_dst_limit {
        return Err(OutputError::scale_range(format!(
            "pre-scaler width {} exceeds {}",
            params.pre_dst_width, pre_dst_limit
        )));
    }

    let divisor = source_format.source_width_divisor();
    if src.width % divisor != 0 {
        return Err(OutputError::scale_alignment(format!(
            "source width {} must be a multiple of {} for {}",
            src.width, divisor, source_format
        )));
    }

    let divisor = destination_format.destination_width_divisor().ok_or_else(|| {
        OutputError::geometry(format!("{} cannot be a destination format", destination_format))
    })?;
    if dst.width % divisor != 0 {
        return Err(OutputError::scale_alignment(format!(
            "destination width {} must be a multiple of {} for {}",
            dst.width, divisor, destination_format
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prescale_bands() {
        assert_eq!(prescale_factor(640, 640).unwrap(), (1, 0));
        assert_eq!(prescale_factor(320, 640).unwrap(), (1, 0));
        assert_eq!(prescale_factor(640, 320).unwrap(), (2, 1));
        assert_eq!(prescale_factor(639, 320).unwrap(), (1, 0));
        assert_eq!(prescale_factor(1280, 320).unwrap(), (4, 2));
        assert_eq!(prescale_factor(800, 100).unwrap(), (8, 3));
        assert_eq!(prescale_factor(1600, 100).unwrap(), (16, 4));
        assert_eq!(prescale_factor(6399, 100).unwrap(), (32, 5));
    }

    #[test]
    fn test_prescale_out_of_range() {
        assert!(matches!(
            prescale_factor(6400, 100),
            Err(OutputError::ScaleOutOfRange(_))
        ));
        assert!(prescale_factor(16, 0).is_err());
    }

    #[test]
    fn test_compute_halving() {
        let params = compute(Size::new(640, 480), Size::new(320, 480), ScalerCaps::default()).unwrap();

        assert_eq!(params.pre_hratio, 2);
        assert_eq!(params.hfactor, 1);
        assert_eq!(params.main_hratio, 256);
        assert_eq!(params.pre_dst_width, 320);
        assert_eq!(params.pre_vratio, 1);
        assert_eq!(params.main_vratio, 256);
        assert_eq!(params.shfactor, 9);
        assert!(!params.scaleup_h);
        assert!(params.scaleup_v);
        assert!(!params.bypass);
    }

    #[test]
    fn test_compute_fine_ratio_revision() {
        let caps = ScalerCaps::for_revision(0x50);
        let params = compute(Size::new(640, 480), Size::new(320, 480), caps).unwrap();
        assert_eq!(params.main_hratio, (640 << 14) / (320 << 1));
    }

    #[test]
    fn test_compute_upscale() {
        let params = compute(Size::new(320, 240), Size::new(800, 480), ScalerCaps::default()).unwrap();
        assert_eq!(params.shfactor, 10);
        assert!(params.scaleup_h && params.scaleup_v);
        assert_eq!(params.main_hratio, (320 << 8) / 800);
    }

    #[test]
    fn test_check_alignment() {
        let caps = ScalerCaps::default();
        let src = Size::new(644, 480);
        let dst = Size::new(320, 240);
        let params = compute(src, dst, caps).unwrap();

        let err = check(&params, src, dst, PixelFormat::NV12, PixelFormat::RGB32, caps, 3264).unwrap_err();
        assert!(matches!(err, OutputError::ScaleAlignment(_)));

        // RGB32 sources only need whole pixels
        assert!(check(&params, src, dst, PixelFormat::RGB32, PixelFormat::RGB32, caps, 3264).is_ok());

        let odd = Size::new(321, 240);
        let params = compute(src, odd, caps).unwrap();
        let err = check(&params, src, odd, PixelFormat::RGB32, PixelFormat::RGB565, caps, 3264).unwrap_err();
        assert!(matches!(err, OutputError::ScaleAlignment(_)));
    }

    #[test]
    fn test_check_pre_dst_width() {
        let caps = ScalerCaps::default();
        let src = Size::new(4000, 480);
        let dst = Size::new(3000, 480);
        let params = compute(src, dst, caps).unwrap();

        let err = check(&params, src, dst, PixelFormat::RGB32, PixelFormat::RGB32, caps, 3264).unwrap_err();
        assert!(matches!(err, OutputError::ScaleOutOfRange(_)));

        // Skipped entirely on the fine-ratio revision
        let fine = ScalerCaps::for_revision(0x50);
        assert!(check(&params, src, dst, PixelFormat::NV12, PixelFormat::NV12, fine, 3264).is_ok());
    }
}
