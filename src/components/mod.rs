mod brightness;
mod invert;
mod mask_area;
mod rect_roi;
mod threshold;

pub use brightness::{BrightnessConfig, BrightnessTool};
pub use invert::{InvertConfig, InvertTool};
pub use mask_area::{MaskAreaConfig, MaskAreaTool};
pub use rect_roi::{RectRoiConfig, RectRoiTool};
pub use threshold::{Channel, ThresholdConfig, ThresholdTool};

use crate::engine::{Tool, ToolFactory, ToolRegistry};
use crate::types::PipelineError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// 空参数使用默认配置
fn config_or_default<C>(params: Value) -> Result<C, PipelineError>
where
    C: DeserializeOwned + Default,
{
    if params.is_null() || params.as_object().is_some_and(|o| o.is_empty()) {
        Ok(C::default())
    } else {
        Ok(serde_json::from_value(params)?)
    }
}

fn factory<C, T>(build: fn(C) -> T) -> ToolFactory
where
    C: DeserializeOwned + Default + 'static,
    T: Tool + 'static,
{
    Arc::new(move |params: Value| -> Result<Box<dyn Tool>, PipelineError> {
        let tool: Box<dyn Tool> = Box::new(build(config_or_default(params)?));
        Ok(tool)
    })
}

/// 注册内置组件
pub fn register_builtin(registry: &mut ToolRegistry) {
    registry.register("invert", factory(InvertTool::new));
    registry.register("brightness", factory(BrightnessTool::new));
    registry.register("threshold", factory(ThresholdTool::new));
    registry.register("rect_roi", factory(RectRoiTool::new));
    registry.register("mask_area", factory(MaskAreaTool::new));
}
