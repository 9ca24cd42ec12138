use crate::engine::{update_config, Tool, ToolOutput};
use crate::types::{DataHolder, IoKind, PipelineError, Wrapper};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 掩膜面积配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaskAreaConfig {
    /// 输出列名
    #[serde(default = "default_key")]
    pub key: String,
}

fn default_key() -> String {
    "area".to_string()
}

impl Default for MaskAreaConfig {
    fn default() -> Self {
        Self { key: default_key() }
    }
}

/// 统计掩膜中非零像素数量
#[derive(Debug, Clone)]
pub struct MaskAreaTool {
    config: MaskAreaConfig,
}

impl MaskAreaTool {
    pub fn new(config: MaskAreaConfig) -> Self {
        Self { config }
    }
}

impl Tool for MaskAreaTool {
    fn name(&self) -> &str {
        "mask_area"
    }

    fn input_type(&self) -> IoKind {
        IoKind::Mask
    }

    fn output_type(&self) -> IoKind {
        IoKind::Data
    }

    fn use_case(&self) -> Vec<String> {
        vec!["feature_extraction".to_string()]
    }

    fn process_wrapper(&mut self, wrapper: &mut Wrapper) -> Result<ToolOutput, PipelineError> {
        let mask = wrapper
            .mask
            .as_ref()
            .ok_or_else(|| PipelineError::tool_failure(self.name(), "没有可用的掩膜"))?;
        let area = mask.pixels().filter(|p| p.0[0] > 0).count();

        let mut data = DataHolder::new();
        data.insert(&self.config.key, area as u64);
        Ok(ToolOutput::Data(data))
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
