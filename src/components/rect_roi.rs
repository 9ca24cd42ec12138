use crate::engine::{update_config, Tool, ToolOutput};
use crate::types::{IoKind, PipelineError, Roi, Wrapper};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 矩形 ROI 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RectRoiConfig {
    pub roi_name: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    pub left: i64,
    pub top: i64,
    pub width: u32,
    pub height: u32,
}

fn default_tag() -> String {
    "keep".to_string()
}

impl Default for RectRoiConfig {
    fn default() -> Self {
        Self {
            roi_name: "roi".to_string(),
            tag: default_tag(),
            left: 0,
            top: 0,
            width: 1,
            height: 1,
        }
    }
}

/// 生成固定矩形 ROI
#[derive(Debug, Clone)]
pub struct RectRoiTool {
    config: RectRoiConfig,
}

impl RectRoiTool {
    pub fn new(config: RectRoiConfig) -> Self {
        Self { config }
    }
}

impl Tool for RectRoiTool {
    fn name(&self) -> &str {
        "rect_roi"
    }

    fn input_type(&self) -> IoKind {
        IoKind::Image
    }

    fn output_type(&self) -> IoKind {
        IoKind::Roi
    }

    fn use_case(&self) -> Vec<String> {
        vec!["roi_static".to_string()]
    }

    fn process_wrapper(&mut self, _wrapper: &mut Wrapper) -> Result<ToolOutput, PipelineError> {
        Ok(ToolOutput::None)
    }

    fn generate_roi(&mut self, wrapper: &mut Wrapper) -> Result<Option<Roi>, PipelineError> {
        let c = &self.config;
        let (width, height) = wrapper.current_image.dimensions();
        if c.width == 0 || c.height == 0 || c.left >= width as i64 || c.top >= height as i64 {
            return Err(PipelineError::tool_failure(
                self.name(),
                format!("ROI {} 不在图像范围内", c.roi_name),
            ));
        }
        Ok(Some(Roi::rectangle(
            &c.roi_name,
            &c.tag,
            c.left,
            c.top,
            c.width,
            c.height,
        )))
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
