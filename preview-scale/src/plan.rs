// SPDX-License-Identifier: MIT
//! Fit-plan computation: decides the target size for a bounded downscale and
//! the intermediate sizes of the halving schedule. Pure arithmetic, no pixel
//! work; execution lives in [`crate::cpu`].

/// A 2D size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Size {
    pub w: u32,
    pub h: u32,
}

/// Result of planning a fit into a bounding box.
///
/// `target` is `None` when the input already fits; the caller must then
/// return the input unchanged (never upscale).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FitPlan {
    pub input: Size,
    pub target: Option<Size>,
}

/// Compute the target size for fitting `input` into `max_width x max_height`.
///
/// The axis whose absolute pixel delta to its bound is larger drives the
/// scale factor; the other axis follows proportionally, floor-rounded and
/// clamped to at least 1px. Inputs already inside the box yield no target.
pub fn plan_fit(input: Size, max_width: u32, max_height: u32) -> FitPlan {
    if input.w <= max_width && input.h <= max_height {
        return FitPlan {
            input,
            target: None,
        };
    }
    let dw = (max_width as i64 - input.w as i64).unsigned_abs();
    let dh = (max_height as i64 - input.h as i64).unsigned_abs();
    let target = if dw > dh {
        let factor = max_width as f32 / input.w as f32;
        Size {
            w: max_width,
            h: ((input.h as f32 * factor).floor() as u32).max(1),
        }
    } else {
        let factor = max_height as f32 / input.h as f32;
        Size {
            w: ((input.w as f32 * factor).floor() as u32).max(1),
            h: max_height,
        }
    };
    FitPlan {
        input,
        target: Some(target),
    }
}

/// Next intermediate size on the way from `current` down to `target`.
///
/// Each axis at most halves per step and is clamped so it never undershoots
/// its target. Repeated application converges on `target` exactly.
pub fn halving_step(current: Size, target: Size) -> Size {
    let w = if current.w > target.w {
        (current.w / 2).max(target.w)
    } else {
        current.w
    };
    let h = if current.h > target.h {
        (current.h / 2).max(target.h)
    } else {
        current.h
    };
    Size { w, h }
}
