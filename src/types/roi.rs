use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// 感兴趣区域的几何形状
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum RoiShape {
    Rectangle {
        left: i64,
        top: i64,
        width: u32,
        height: u32,
    },
    Circle {
        x: i64,
        y: i64,
        radius: u32,
    },
}

/// 感兴趣区域 (ROI)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub name: String,
    /// 用途标签,例如 `keep`、`erode`、`safe`
    pub tag: String,
    #[serde(flatten)]
    pub shape: RoiShape,
}

impl Roi {
    pub fn rectangle(name: &str, tag: &str, left: i64, top: i64, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            tag: tag.to_string(),
            shape: RoiShape::Rectangle {
                left,
                top,
                width,
                height,
            },
        }
    }

    pub fn circle(name: &str, tag: &str, x: i64, y: i64, radius: u32) -> Self {
        Self {
            name: name.to_string(),
            tag: tag.to_string(),
            shape: RoiShape::Circle { x, y, radius },
        }
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        match self.shape {
            RoiShape::Rectangle {
                left,
                top,
                width,
                height,
            } => x >= left && y >= top && x < left + width as i64 && y < top + height as i64,
            RoiShape::Circle { x: cx, y: cy, radius } => {
                let (dx, dy) = (x - cx, y - cy);
                dx * dx + dy * dy <= (radius as i64) * (radius as i64)
            }
        }
    }

    /// 判断像素是否位于区域轮廓上
    fn on_border(&self, x: i64, y: i64) -> bool {
        match self.shape {
            RoiShape::Rectangle {
                left,
                top,
                width,
                height,
            } => {
                if width == 0 || height == 0 || !self.contains(x, y) {
                    return false;
                }
                let right = left + width as i64 - 1;
                let bottom = top + height as i64 - 1;
                x == left || x == right || y == top || y == bottom
            }
            RoiShape::Circle { .. } => {
                self.contains(x, y)
                    && !(self.contains(x - 1, y)
                        && self.contains(x + 1, y)
                        && self.contains(x, y - 1)
                        && self.contains(x, y + 1))
            }
        }
    }

    /// 在图像上绘制区域轮廓
    pub fn draw(&self, image: &mut RgbImage, color: Rgb<u8>) {
        let (width, height) = image.dimensions();
        for y in 0..height {
            for x in 0..width {
                if self.on_border(x as i64, y as i64) {
                    image.put_pixel(x, y, color);
                }
            }
        }
    }
}
