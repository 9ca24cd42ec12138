use crate::engine::{update_config, Tool, ToolOutput};
use crate::types::{mask_to_rgb, IoKind, PipelineError, Wrapper};
use image::{GrayImage, Luma, Rgb};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 阈值使用的通道
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Red,
    Green,
    Blue,
    #[default]
    Gray,
}

impl Channel {
    fn value(&self, pixel: &Rgb<u8>) -> u8 {
        let [r, g, b] = pixel.0;
        match self {
            Channel::Red => r,
            Channel::Green => g,
            Channel::Blue => b,
            Channel::Gray => ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8,
        }
    }
}

/// 阈值节点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub min: u8,
    #[serde(default = "default_max")]
    pub max: u8,
}

fn default_max() -> u8 {
    255
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            channel: Channel::Gray,
            min: 0,
            max: 255,
        }
    }
}

/// 通道阈值,生成掩膜
#[derive(Debug, Clone)]
pub struct ThresholdTool {
    config: ThresholdConfig,
}

impl ThresholdTool {
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }
}

impl Tool for ThresholdTool {
    fn name(&self) -> &str {
        "threshold"
    }

    fn input_type(&self) -> IoKind {
        IoKind::Image
    }

    fn output_type(&self) -> IoKind {
        IoKind::Mask
    }

    fn use_case(&self) -> Vec<String> {
        vec!["threshold".to_string()]
    }

    fn process_wrapper(&mut self, wrapper: &mut Wrapper) -> Result<ToolOutput, PipelineError> {
        if self.config.min > self.config.max {
            return Err(PipelineError::tool_failure(
                self.name(),
                format!("min {} > max {}", self.config.min, self.config.max),
            ));
        }

        let source = &wrapper.current_image;
        let mask = GrayImage::from_fn(source.width(), source.height(), |x, y| {
            let value = self.config.channel.value(source.get_pixel(x, y));
            if value >= self.config.min && value <= self.config.max {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        wrapper.store_image("threshold", mask_to_rgb(&mask));
        Ok(ToolOutput::Mask(mask))
    }

    fn params(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or(Value::Null)
    }

    fn set_param(&mut self, key: &str, value: Value) -> Result<(), PipelineError> {
        update_config(&mut self.config, key, value)
    }

    fn box_clone(&self) -> Box<dyn Tool> {
        Box::new(self.clone())
    }
}
