use serde::{Deserialize, Serialize};

/// Height of the window chrome above the video surface, in pixels.
pub const HEADER_HEIGHT: u32 = 38;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Scales video dimensions to fit the work area (never upscales), adds the
/// header height and centers the result on screen.
pub fn fit_to_work_area(dims: Size, work_area: Size) -> Rect {
    let dw = dims.width.max(1) as f64;
    let dh = dims.height.max(1) as f64;

    let scale = (work_area.width as f64 / dw)
        .min(1.0)
        .min((work_area.height as f64 / dh).min(1.0));

    let width = (dw * scale).floor() as u32;
    let height = (dh * scale).floor() as u32 + HEADER_HEIGHT;

    Rect {
        x: ((work_area.width as i64 - width as i64) / 2) as i32,
        y: ((work_area.height as i64 - height as i64) / 2) as i32,
        width,
        height,
    }
}

pub fn aspect_ratio(dims: Size) -> f64 {
    dims.width.max(1) as f64 / dims.height.max(1) as f64
}
