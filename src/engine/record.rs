use crate::engine::{NodeTree, ToolRegistry};
use crate::types::{ErrorHolder, GroupNode, MergeMode, ModuleNode, NodeKind, PipelineError, SourceRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

/// 加载失败的节点记录在该目标下
pub const LOAD_ERROR_TARGET: &str = "pipeline_load_error";

/// 节点的序列化记录
///
/// 子节点保留为原始 JSON,单个子节点无效时只跳过它本身。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_mode: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub no_delete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<Value>,
}

impl NodeRecord {
    fn to_group(&self) -> Result<GroupNode, PipelineError> {
        let merge_mode = match &self.merge_mode {
            Some(mode) => mode.parse::<MergeMode>()?,
            None => MergeMode::default(),
        };
        let source = match &self.source {
            Some(source) => source.parse::<SourceRef>()?,
            None => SourceRef::default(),
        };
        let mut group = GroupNode::new(&self.name, merge_mode, source);
        group.no_delete = self.no_delete;
        Ok(group)
    }
}

impl NodeTree {
    /// 节点及其子树的 JSON 记录
    pub fn node_to_json(&self, id: &Uuid) -> Result<Value, PipelineError> {
        let node = self.node(id).ok_or(PipelineError::NodeNotFound(*id))?;
        let record = match &node.kind {
            NodeKind::Group(group) => NodeRecord {
                node_type: node.node_type().to_string(),
                merge_mode: Some(group.merge_mode.as_str().to_string()),
                name: group.name.clone(),
                uuid: node.uuid,
                source: Some(group.source.to_string()),
                no_delete: group.no_delete,
                nodes: Some(
                    group
                        .children
                        .iter()
                        .map(|child| self.node_to_json(child))
                        .collect::<Result<Vec<_>, _>>()?,
                ),
                enabled: None,
                tool: None,
            },
            NodeKind::Module(module) => NodeRecord {
                node_type: node.node_type().to_string(),
                merge_mode: None,
                name: module.tool.name().to_string(),
                uuid: node.uuid,
                source: None,
                no_delete: false,
                nodes: None,
                enabled: Some(module.enabled),
                tool: Some(module.tool.to_json()),
            },
        };
        Ok(serde_json::to_value(record)?)
    }

    /// 整棵树的 JSON 记录
    pub fn to_json(&self) -> Result<Value, PipelineError> {
        self.node_to_json(&self.root())
    }

    /// 从根组记录重建节点树
    ///
    /// 根记录无效时返回错误;子节点无效时跳过该节点并记录到 `errors`。
    ///
    /// # Arguments
    /// * `value` - 根组的 JSON 记录
    /// * `registry` - 用于还原工具的注册表
    /// * `errors` - 收集被跳过节点的错误
    pub fn from_json(
        value: &Value,
        registry: &ToolRegistry,
        errors: &mut ErrorHolder,
    ) -> Result<Self, PipelineError> {
        let record: NodeRecord = serde_json::from_value(value.clone())?;
        if record.node_type != "group" {
            return Err(PipelineError::ConfigurationError(format!(
                "根节点必须是组节点,实际为 {}",
                record.node_type
            )));
        }
        let group = record.to_group()?;
        let mut tree = NodeTree::with_root(record.uuid, group);
        if let Some(children) = &record.nodes {
            tree.load_children(record.uuid, children, registry, errors);
        }
        Ok(tree)
    }

    fn load_children(
        &mut self,
        parent: Uuid,
        children: &[Value],
        registry: &ToolRegistry,
        errors: &mut ErrorHolder,
    ) {
        for child in children {
            if let Err(e) = self.load_record(parent, child, registry, errors) {
                warn!("跳过无法加载的节点: {}", e);
                errors.add_error(LOAD_ERROR_TARGET, &e);
            }
        }
    }

    fn load_record(
        &mut self,
        parent: Uuid,
        value: &Value,
        registry: &ToolRegistry,
        errors: &mut ErrorHolder,
    ) -> Result<(), PipelineError> {
        let record: NodeRecord = serde_json::from_value(value.clone())?;
        match record.node_type.as_str() {
            "group" => {
                let group = record.to_group()?;
                let id = self.insert_node(parent, None, Some(record.uuid), NodeKind::Group(group))?;
                if let Some(children) = &record.nodes {
                    self.load_children(id, children, registry, errors);
                }
            }
            "module" => {
                let descriptor = record.tool.as_ref().ok_or_else(|| {
                    PipelineError::ConfigurationError(format!("模块 {} 缺少工具描述", record.uuid))
                })?;
                let mut module = ModuleNode::new(registry.create_from_json(descriptor)?);
                module.enabled = record.enabled.unwrap_or(true);
                self.insert_node(parent, None, Some(record.uuid), NodeKind::Module(module))?;
            }
            other => {
                return Err(PipelineError::ConfigurationError(format!(
                    "未知的节点类型: {}",
                    other
                )))
            }
        }
        Ok(())
    }
}
