use crate::types::{DataHolder, IoKind, PipelineError, Roi, ToolDescriptor, Wrapper};
use image::{GrayImage, RgbImage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 工具执行后返回的结构化结果
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    None,
    Image(RgbImage),
    Mask(GrayImage),
    Data(DataHolder),
}

impl ToolOutput {
    pub fn kind(&self) -> IoKind {
        match self {
            ToolOutput::None => IoKind::None,
            ToolOutput::Image(_) => IoKind::Image,
            ToolOutput::Mask(_) => IoKind::Mask,
            ToolOutput::Data(_) => IoKind::Data,
        }
    }
}

/// 图像处理工具特征,模块节点通过它调用具体算法
///
/// 工具只需要 `Send`:每个工作线程持有自己的流水线副本,工具不会被共享。
pub trait Tool: fmt::Debug + Send {
    /// 工具名称,同时用作注册表键和节点名称
    fn name(&self) -> &str;

    fn input_type(&self) -> IoKind;

    fn output_type(&self) -> IoKind;

    /// 工具的用途标签
    fn use_case(&self) -> Vec<String> {
        Vec::new()
    }

    /// 处理上下文
    ///
    /// # Arguments
    /// * `wrapper` - 当前图像的执行上下文
    ///
    /// # Returns
    /// * `Result<ToolOutput, PipelineError>` - 结构化结果或错误
    fn process_wrapper(&mut self, wrapper: &mut Wrapper) -> Result<ToolOutput, PipelineError>;

    /// ROI 类工具生成区域
    fn generate_roi(&mut self, _wrapper: &mut Wrapper) -> Result<Option<Roi>, PipelineError> {
        Ok(None)
    }

    /// 当前参数
    fn params(&self) -> Value;

    /// 修改单个参数
    fn set_param(&mut self, key: &str, value: Value) -> Result<(), PipelineError>;

    fn box_clone(&self) -> Box<dyn Tool>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.params())
    }

    fn to_json(&self) -> Value {
        json!({
            "name": self.name(),
            "params": self.params(),
        })
    }
}

/// 通过 JSON 往返修改配置结构中的一个字段
pub fn update_config<T>(config: &mut T, key: &str, value: Value) -> Result<(), PipelineError>
where
    T: Serialize + DeserializeOwned,
{
    let mut current = serde_json::to_value(&*config)?;
    match current.as_object_mut() {
        Some(obj) if obj.contains_key(key) => {
            obj.insert(key.to_string(), value);
        }
        _ => {
            return Err(PipelineError::ConfigurationError(format!(
                "未知的参数: {}",
                key
            )))
        }
    }
    *config = serde_json::from_value(current)?;
    Ok(())
}

/// 工具工厂函数类型,根据参数创建工具实例
pub type ToolFactory = Arc<dyn Fn(Value) -> Result<Box<dyn Tool>, PipelineError> + Send + Sync>;

/// 工具注册表,管理所有可反序列化的工具类型
#[derive(Clone, Default)]
pub struct ToolRegistry {
    /// key 为工具名称
    factories: HashMap<String, ToolFactory>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建包含内置组件的注册表
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::components::register_builtin(&mut registry);
        registry
    }

    /// 注册新的工具类型
    ///
    /// # Arguments
    /// * `name` - 工具名称
    /// * `factory` - 工具工厂函数
    pub fn register(&mut self, name: &str, factory: ToolFactory) {
        if self.factories.insert(name.to_string(), factory).is_some() {
            tracing::debug!("工具 {} 的工厂被替换", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 根据描述创建工具实例
    pub fn create(&self, descriptor: &ToolDescriptor) -> Result<Box<dyn Tool>, PipelineError> {
        let factory = self.factories.get(&descriptor.name).ok_or_else(|| {
            PipelineError::ConfigurationError(format!("未注册的工具: {}", descriptor.name))
        })?;
        factory(descriptor.params.clone())
    }

    /// 根据工具的 JSON 描述创建实例
    pub fn create_from_json(&self, value: &Value) -> Result<Box<dyn Tool>, PipelineError> {
        let descriptor: ToolDescriptor = serde_json::from_value(value.clone())?;
        self.create(&descriptor)
    }

    /// 获取所有已注册的工具名称
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("factories", &self.registered_names())
            .finish()
    }
}
