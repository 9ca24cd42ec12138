use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 工具的序列化描述,由工具自身生成,由注册表还原
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ToolDescriptor {
    /// 工具名称,也是注册表中的键
    pub name: String,
    /// 工具参数
    #[serde(default)]
    pub params: Value,
}

impl ToolDescriptor {
    pub fn new(name: &str, params: Value) -> Self {
        Self {
            name: name.to_string(),
            params,
        }
    }
}
