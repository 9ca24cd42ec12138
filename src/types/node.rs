use crate::engine::Tool;
use crate::types::{mask_to_rgb, DataHolder, IoKind, MergeMode, Roi, SourceRef};
use image::{GrayImage, RgbImage};
use uuid::Uuid;

/// 节点最近一次执行的缓存结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LastResult {
    pub image: Option<RgbImage>,
    pub mask: Option<GrayImage>,
    pub data: Option<DataHolder>,
    pub rois: Vec<Roi>,
}

impl LastResult {
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.mask.is_none() && self.data.is_none() && self.rois.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// 用于显示的图像,没有图像时使用掩膜
    pub fn display_image(&self) -> Option<RgbImage> {
        self.image
            .clone()
            .or_else(|| self.mask.as_ref().map(mask_to_rgb))
    }
}

/// 组节点,包含有序子节点和合并策略
#[derive(Debug, Clone, PartialEq)]
pub struct GroupNode {
    pub merge_mode: MergeMode,
    pub name: String,
    pub source: SourceRef,
    /// 子节点ID,按文档顺序
    pub children: Vec<Uuid>,
    /// 为 true 时不能被删除
    pub no_delete: bool,
}

impl GroupNode {
    pub fn new(name: &str, merge_mode: MergeMode, source: SourceRef) -> Self {
        Self {
            merge_mode,
            name: name.to_string(),
            source,
            children: Vec::new(),
            no_delete: false,
        }
    }
}

/// 模块节点,包装一次工具调用
#[derive(Debug)]
pub struct ModuleNode {
    pub enabled: bool,
    pub tool: Box<dyn Tool>,
}

impl ModuleNode {
    pub fn new(tool: Box<dyn Tool>) -> Self {
        Self {
            enabled: true,
            tool,
        }
    }
}

impl Clone for ModuleNode {
    fn clone(&self) -> Self {
        Self {
            enabled: self.enabled,
            tool: self.tool.box_clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Group(GroupNode),
    Module(ModuleNode),
}

/// 节点树中的一个节点
#[derive(Debug, Clone)]
pub struct Node {
    pub uuid: Uuid,
    /// 父节点ID,根节点为 None
    pub parent: Option<Uuid>,
    pub last_result: LastResult,
    pub kind: NodeKind,
}

impl Node {
    pub fn new(uuid: Uuid, parent: Option<Uuid>, kind: NodeKind) -> Self {
        Self {
            uuid,
            parent,
            last_result: LastResult::default(),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            NodeKind::Group(group) => &group.name,
            NodeKind::Module(module) => module.tool.name(),
        }
    }

    /// 序列化时使用的节点类型名称
    pub fn node_type(&self) -> &'static str {
        match self.kind {
            NodeKind::Group(_) => "group",
            NodeKind::Module(_) => "module",
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }

    pub fn is_module(&self) -> bool {
        matches!(self.kind, NodeKind::Module(_))
    }

    /// 组节点总是启用的
    pub fn is_enabled(&self) -> bool {
        match &self.kind {
            NodeKind::Group(_) => true,
            NodeKind::Module(module) => module.enabled,
        }
    }

    pub fn as_group(&self) -> Option<&GroupNode> {
        match &self.kind {
            NodeKind::Group(group) => Some(group),
            NodeKind::Module(_) => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut GroupNode> {
        match &mut self.kind {
            NodeKind::Group(group) => Some(group),
            NodeKind::Module(_) => None,
        }
    }

    pub fn as_module(&self) -> Option<&ModuleNode> {
        match &self.kind {
            NodeKind::Module(module) => Some(module),
            NodeKind::Group(_) => None,
        }
    }

    pub fn as_module_mut(&mut self) -> Option<&mut ModuleNode> {
        match &mut self.kind {
            NodeKind::Module(module) => Some(module),
            NodeKind::Group(_) => None,
        }
    }

    /// 模块节点的声明输出类型;组节点的输出类型取决于子节点,由 `NodeTree::output_kind` 计算
    pub fn declared_output(&self) -> Option<IoKind> {
        self.as_module().map(|m| m.tool.output_type())
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}
