//! Frame and video views over caller-owned arrays

use crate::error::VisionError;
use cytotrack_core::InputConfig;
use ndarray::{s, Array2, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix3};
use std::sync::Arc;

/// Single-frame intensities normalized to `f64`
pub type Frame = Array2<f64>;

/// Foreground mask, `true` marks foreground
pub type Mask = Array2<bool>;

/// Connected-component labels, 0 is background
pub type LabelMap = Array2<u32>;

/// Optional per-frame preprocessing applied before segmentation
pub type FrameTransform =
    Arc<dyn Fn(ArrayView2<'_, f64>) -> Result<Array2<f64>, VisionError> + Send + Sync>;

/// Numeric pixel type accepted by the pipeline
pub trait Intensity: Copy + Send + Sync + 'static {
    fn to_f64(self) -> f64;
}

macro_rules! impl_intensity {
    ($($t:ty),*) => {
        $(
            impl Intensity for $t {
                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_intensity!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// Convert a frame of any intensity type to `f64`
pub fn frame_to_f64<T: Intensity>(frame: ArrayView2<'_, T>) -> Frame {
    frame.mapv(Intensity::to_f64)
}

/// Reduce a (F, H, W) or (F, C, H, W) array to the (F, H, W) view the pipeline consumes.
///
/// Selects `input.channel` for 4-D arrays and applies `input.frame_range`.
pub fn select_video<'a, T>(
    array: ArrayViewD<'a, T>,
    input: &InputConfig,
) -> Result<ArrayView3<'a, T>, VisionError> {
    let video = match array.ndim() {
        3 => array
            .into_dimensionality::<Ix3>()
            .map_err(|e| VisionError::Shape(format!("Failed to view input as (F, H, W): {}", e)))?,
        4 => {
            let channel = input.channel.ok_or_else(|| {
                VisionError::Shape(
                    "4-D input (F, C, H, W) requires input.channel to be set".to_string(),
                )
            })?;
            let channels = array.len_of(Axis(1));
            if channel >= channels {
                return Err(VisionError::IndexOutOfRange {
                    what: "channel".to_string(),
                    index: channel,
                    len: channels,
                });
            }
            array
                .index_axis_move(Axis(1), channel)
                .into_dimensionality::<Ix3>()
                .map_err(|e| VisionError::Shape(format!("Failed to select channel: {}", e)))?
        }
        n => {
            return Err(VisionError::Shape(format!(
                "Expected (F, H, W) or (F, C, H, W) input, got {} dimensions",
                n
            )))
        }
    };

    let (frames, height, width) = video.dim();
    if frames > 0 && (height == 0 || width == 0) {
        return Err(VisionError::Shape(format!(
            "Frames must be non-empty, got {}x{}",
            height, width
        )));
    }

    match input.frame_range {
        Some(range) => {
            let range = range.resolve(frames).map_err(|e| match e {
                cytotrack_core::Error::IndexOutOfRange { what, index, len } => {
                    VisionError::IndexOutOfRange { what, index, len }
                }
                other => VisionError::Core(other),
            })?;
            Ok(video.slice_move(s![range, .., ..]))
        }
        None => Ok(video),
    }
}
