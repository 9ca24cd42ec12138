use super::*;
use image::{imageops, DynamicImage, GrayImage, ImageBuffer, Pixel, Rgb, RgbImage};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// 表格数据,键为列名
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataHolder {
    values: BTreeMap<String, Value>,
}

impl DataHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// 合并另一份数据,同名列被覆盖
    pub fn update(&mut self, other: &DataHolder) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// 图像日志中的一张命名图像
#[derive(Debug, Clone, PartialEq)]
pub struct NamedImage {
    pub name: String,
    pub image: RgbImage,
}

/// 单张图像的执行上下文,在整个节点树中传递
#[derive(Debug, Clone)]
pub struct Wrapper {
    luid: String,
    source_image: RgbImage,
    /// 当前图像
    pub current_image: RgbImage,
    /// 当前掩膜
    pub mask: Option<GrayImage>,
    /// 已注册的 ROI
    pub rois: Vec<Roi>,
    /// 表格数据
    pub csv_data_holder: DataHolder,
    /// 工具执行过程中产生的中间图像
    pub image_list: Vec<NamedImage>,
    /// 为 false 时 `store_image` 不记录图像
    pub store_images: bool,
    pub error_holder: ErrorHolder,
}

impl Wrapper {
    /// 创建新的上下文
    ///
    /// # Arguments
    /// * `luid` - 图像的逻辑标识
    /// * `image` - 原始图像
    pub fn new(luid: impl Into<String>, image: RgbImage) -> Self {
        Self {
            luid: luid.into(),
            current_image: image.clone(),
            source_image: image,
            mask: None,
            rois: Vec::new(),
            csv_data_holder: DataHolder::new(),
            image_list: Vec::new(),
            store_images: true,
            error_holder: ErrorHolder::new(),
        }
    }

    /// 以像素内容的 blake3 摘要作为 luid
    pub fn from_image(image: RgbImage) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&image.width().to_le_bytes());
        hasher.update(&image.height().to_le_bytes());
        hasher.update(image.as_raw());
        let luid = hasher.finalize().to_hex().to_string();
        Self::new(luid, image)
    }

    pub fn luid(&self) -> &str {
        &self.luid
    }

    /// 未经修改的原始图像
    pub fn source_image(&self) -> &RgbImage {
        &self.source_image
    }

    /// 添加 ROI,相同的 ROI 只保留一份
    pub fn add_roi(&mut self, roi: Roi) {
        if !self.rois.contains(&roi) {
            self.rois.push(roi);
        }
    }

    /// 在图像副本上绘制 ROI,`keep` 为绿色,其余为红色
    pub fn draw_rois(&self, image: &RgbImage, rois: &[Roi]) -> RgbImage {
        let mut canvas = image.clone();
        for roi in rois {
            let color = if roi.tag == "keep" {
                Rgb([0, 255, 0])
            } else {
                Rgb([255, 0, 0])
            };
            roi.draw(&mut canvas, color);
        }
        canvas
    }

    pub fn store_image(&mut self, name: &str, image: RgbImage) {
        if self.store_images {
            self.image_list.push(NamedImage {
                name: name.to_string(),
                image,
            });
        }
    }

    /// 当前图像日志的位置,配合 `images_since` 使用
    pub fn image_log_mark(&self) -> usize {
        self.image_list.len()
    }

    pub fn images_since(&self, mark: usize) -> &[NamedImage] {
        self.image_list.get(mark..).unwrap_or(&[])
    }

    pub fn last_logged_image(&self) -> Option<&NamedImage> {
        self.image_list.last()
    }

    pub fn find_logged_image(&self, name: &str) -> Option<&NamedImage> {
        self.image_list.iter().rev().find(|i| i.name == name)
    }

    pub fn multi_and<P>(
        &self,
        images: &[ImageBuffer<P, Vec<u8>>],
    ) -> Result<ImageBuffer<P, Vec<u8>>, PipelineError>
    where
        P: Pixel<Subpixel = u8>,
    {
        combine(images, |a, b| a & b)
    }

    pub fn multi_or<P>(
        &self,
        images: &[ImageBuffer<P, Vec<u8>>],
    ) -> Result<ImageBuffer<P, Vec<u8>>, PipelineError>
    where
        P: Pixel<Subpixel = u8>,
    {
        combine(images, |a, b| a | b)
    }

    /// 按网格拼接图像,缺失的格子留黑
    ///
    /// # Arguments
    /// * `grid` - 按行排列的图像名称
    /// * `images` - 名称到图像的映射
    pub fn build_mosaic(&self, grid: &[Vec<String>], images: &HashMap<String, RgbImage>) -> RgbImage {
        let present = grid.iter().flatten().filter_map(|name| images.get(name));
        let (cell_w, cell_h) = present.fold((0, 0), |(w, h), img| {
            (w.max(img.width()), h.max(img.height()))
        });
        let (cell_w, cell_h) = if cell_w == 0 || cell_h == 0 {
            self.source_image.dimensions()
        } else {
            (cell_w, cell_h)
        };

        let columns = grid.iter().map(|row| row.len()).max().unwrap_or(0) as u32;
        let rows = grid.len() as u32;
        let mut canvas = RgbImage::new((columns * cell_w).max(1), (rows * cell_h).max(1));

        for (r, row) in grid.iter().enumerate() {
            for (c, name) in row.iter().enumerate() {
                if let Some(img) = images.get(name) {
                    let x = c as i64 * cell_w as i64;
                    let y = r as i64 * cell_h as i64;
                    imageops::replace(&mut canvas, img, x, y);
                }
            }
        }
        canvas
    }
}

/// 掩膜转为三通道图像,用于显示和拼图
pub fn mask_to_rgb(mask: &GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(mask.clone()).to_rgb8()
}

fn combine<P>(
    images: &[ImageBuffer<P, Vec<u8>>],
    op: fn(u8, u8) -> u8,
) -> Result<ImageBuffer<P, Vec<u8>>, PipelineError>
where
    P: Pixel<Subpixel = u8>,
{
    let (first, rest) = images
        .split_first()
        .ok_or_else(|| PipelineError::MergeError("没有可合并的图像".to_string()))?;

    let mut raw = first.as_raw().clone();
    for image in rest {
        if image.dimensions() != first.dimensions() {
            return Err(PipelineError::MergeError(format!(
                "图像尺寸不一致: {:?} != {:?}",
                image.dimensions(),
                first.dimensions()
            )));
        }
        raw.iter_mut()
            .zip(image.as_raw().iter())
            .for_each(|(a, b)| *a = op(*a, *b));
    }

    ImageBuffer::from_raw(first.width(), first.height(), raw)
        .ok_or_else(|| PipelineError::MergeError("图像缓冲区大小错误".to_string()))
}
