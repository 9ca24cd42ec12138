use crate::engine::{update_config, Tool, ToolOutput};
use crate::types::{IoKind, PipelineError, Wrapper};
use image::imageops;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 反色节点配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvertConfig {
    /// 为 true 时把结果写入图像日志
    #[serde(default)]
    pub store: bool,
}

/// 图像反色
#[derive(Debug, Clone)]
pub struct InvertTool {
    config: InvertConfig,
}

impl InvertTool {
    pub fn new(config: InvertConfig) -> Self {
        Self { config }
    }
}

impl Tool for InvertTool {
    fn name(&self) -> &str {
        "invert"
    }

    fn input_type(&self) -> IoKind {
        IoKind::Image
    }

    fn output_type(&self) -> IoKind {
        IoKind::Image
    }

    fn use_case(&self) -> Vec<String> {
        vec!["pre_processing".to_string()]
    }

    fn process_wrapper(&mut self, wrapper: &mut Wrapper) -> Result<ToolOutput, PipelineError> {
        let mut image = wrapper.current_image.clone();
        imageops::invert(&mut image);
        if self.config.store {
            wrapper.store_image("invert", image.clone());
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
