use crate::engine::{update_config, Tool, ToolOutput};
use crate::types::{IoKind, PipelineError, Wrapper};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 亮度调整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrightnessConfig {
    /// 每个通道加上的偏移量,结果截断到 0..=255
    #[serde(default)]
    pub offset: i16,
}

/// 亮度调整
#[derive(Debug, Clone)]
pub struct BrightnessTool {
    config: BrightnessConfig,
}

impl BrightnessTool {
    pub fn new(config: BrightnessConfig) -> Self {
        Self { config }
    }
}

impl Tool for BrightnessTool {
    fn name(&self) -> &str {
        "brightness"
    }

    fn input_type(&self) -> IoKind {
        IoKind::Image
    }

    fn output_type(&self) -> IoKind {
        IoKind::Image
    }

    fn use_case(&self) -> Vec<String> {
        vec!["exposure_fixing".to_string()]
    }

    fn process_wrapper(&mut self, wrapper: &mut Wrapper) -> Result<ToolOutput, PipelineError> {
        let offset = self.config.offset;
        let mut image = wrapper.current_image.clone();
        for pixel in image.pixels_mut() {
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as i16 + offset).clamp(0, 255) as u8;
            }
        }
        Ok(ToolOutput::Image(image))
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
