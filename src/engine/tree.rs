use crate::engine::Tool;
use crate::types::{
    GroupNode, IoKind, MergeMode, ModuleNode, Node, NodeFilter, NodeKind, PipelineError,
    SourceRef,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// 相对某个节点划分的文档顺序列表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PivotList {
    pub before: Vec<Uuid>,
    pub pivot: Option<Uuid>,
    pub after: Vec<Uuid>,
}

/// 节点树,所有节点平铺存放,父子关系通过 uuid 引用
#[derive(Debug, Clone)]
pub struct NodeTree {
    nodes: HashMap<Uuid, Node>,
    root: Uuid,
}

impl NodeTree {
    /// 创建只包含根组的树,根组为 CHAIN 模式且不可删除
    pub fn new(root_name: &str) -> Self {
        let mut group = GroupNode::new(root_name, MergeMode::Chain, SourceRef::Source);
        group.no_delete = true;
        Self::with_root(Uuid::new_v4(), group)
    }

    /// 使用指定 uuid 和组定义创建树
    pub fn with_root(uuid: Uuid, mut group: GroupNode) -> Self {
        group.children.clear();
        let mut nodes = HashMap::new();
        nodes.insert(uuid, Node::new(uuid, None, NodeKind::Group(group)));
        Self { nodes, root: uuid }
    }

    pub fn root(&self) -> Uuid {
        self.root
    }

    pub fn is_root(&self, id: &Uuid) -> bool {
        self.root == *id
    }

    pub fn node(&self, id: &Uuid) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &Uuid) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn parent_of(&self, id: &Uuid) -> Option<Uuid> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children_of(&self, id: &Uuid) -> &[Uuid] {
        self.nodes
            .get(id)
            .and_then(|n| n.as_group())
            .map(|g| g.children.as_slice())
            .unwrap_or(&[])
    }

    /// 已启用的子节点
    pub fn enabled_children(&self, id: &Uuid) -> Vec<Uuid> {
        self.children_of(id)
            .iter()
            .filter(|c| self.nodes.get(c).is_some_and(|n| n.is_enabled()))
            .copied()
            .collect()
    }

    /// 祖先节点,由近到远
    pub fn ancestors(&self, id: &Uuid) -> Vec<Uuid> {
        let mut result = Vec::new();
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            result.push(parent);
            current = self.parent_of(&parent);
        }
        result
    }

    pub fn depth(&self, id: &Uuid) -> usize {
        self.ancestors(id).len()
    }

    /// 按文档顺序查找第一个同名节点
    pub fn find_by_name(&self, name: &str) -> Option<Uuid> {
        self.iter_items(NodeFilter::All)
            .into_iter()
            .find(|id| self.nodes.get(id).is_some_and(|n| n.name() == name))
    }

    /// 在组末尾添加模块节点
    pub fn add_module(&mut self, parent: Uuid, tool: Box<dyn Tool>) -> Result<Uuid, PipelineError> {
        self.insert_node(parent, None, None, NodeKind::Module(ModuleNode::new(tool)))
    }

    /// 在组末尾添加子组
    pub fn add_group(
        &mut self,
        parent: Uuid,
        name: &str,
        merge_mode: MergeMode,
        source: SourceRef,
    ) -> Result<Uuid, PipelineError> {
        let group = GroupNode::new(name, merge_mode, source);
        self.insert_node(parent, None, None, NodeKind::Group(group))
    }

    /// 插入节点
    ///
    /// # Arguments
    /// * `parent` - 父组ID
    /// * `index` - 在父组中的位置,None 表示末尾
    /// * `uuid` - 指定的 uuid,反序列化时使用;None 时自动生成
    /// * `kind` - 节点内容,组节点的子节点列表会被清空
    pub fn insert_node(
        &mut self,
        parent: Uuid,
        index: Option<usize>,
        uuid: Option<Uuid>,
        mut kind: NodeKind,
    ) -> Result<Uuid, PipelineError> {
        let uuid = uuid.unwrap_or_else(Uuid::new_v4);
        if self.nodes.contains_key(&uuid) {
            return Err(PipelineError::ConfigurationError(format!(
                "重复的节点ID: {}",
                uuid
            )));
        }
        if let NodeKind::Group(group) = &mut kind {
            group.children.clear();
        }

        let parent_group = self
            .nodes
            .get_mut(&parent)
            .ok_or(PipelineError::NodeNotFound(parent))?
            .as_group_mut()
            .ok_or_else(|| {
                PipelineError::ConfigurationError(format!("节点 {} 不是组节点", parent))
            })?;
        let position = index
            .unwrap_or(parent_group.children.len())
            .min(parent_group.children.len());
        parent_group.children.insert(position, uuid);

        self.nodes.insert(uuid, Node::new(uuid, Some(parent), kind));
        Ok(uuid)
    }

    /// 前序深度优先遍历,返回文档顺序的节点ID
    pub fn iter_items(&self, filter: NodeFilter) -> Vec<Uuid> {
        let mut result = Vec::new();
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if filter.accepts(node) {
                result.push(id);
            }
            if let Some(group) = node.as_group() {
                stack.extend(group.children.iter().rev().copied());
            }
        }
        result
    }

    /// 以 `node` 为轴把过滤后的节点分成前、轴、后三部分
    pub fn as_pivot_list(&self, node: &Uuid, filter: NodeFilter) -> PivotList {
        let items = self.iter_items(filter);
        match items.iter().position(|id| id == node) {
            Some(pos) => PivotList {
                before: items[..pos].to_vec(),
                pivot: Some(items[pos]),
                after: items[pos + 1..].to_vec(),
            },
            None => PivotList {
                before: items,
                pivot: None,
                after: Vec::new(),
            },
        }
    }

    pub fn absolute_index(&self, node: &Uuid, filter: NodeFilter) -> Option<usize> {
        let pivot = self.as_pivot_list(node, filter);
        pivot.pivot.map(|_| pivot.before.len())
    }

    pub fn absolute_count(&self, filter: NodeFilter) -> usize {
        self.iter_items(filter).len()
    }

    pub fn module_count(&self) -> usize {
        self.nodes.values().filter(|n| n.is_module()).count()
    }

    /// 节点的输出类型,组节点由子节点推导
    pub fn output_kind(&self, id: &Uuid) -> IoKind {
        let Some(node) = self.nodes.get(id) else {
            return IoKind::None;
        };
        let group = match &node.kind {
            NodeKind::Module(module) => return module.tool.output_type(),
            NodeKind::Group(group) => group,
        };

        match group.merge_mode {
            // 只有全部子节点都输出 ROI 时才保存叠加图,否则保存当前图像快照
            MergeMode::Chain => {
                let kinds: Vec<_> = self
                    .enabled_children(id)
                    .iter()
                    .map(|c| self.output_kind(c))
                    .collect();
                match kinds.last() {
                    None => IoKind::None,
                    Some(IoKind::Roi) if kinds.iter().any(|k| *k != IoKind::Roi) => IoKind::Image,
                    Some(kind) => *kind,
                }
            }
            MergeMode::And | MergeMode::Or => self.merge_kind(id).unwrap_or(IoKind::None),
            MergeMode::None => {
                let kinds: Vec<_> = self
                    .enabled_children(id)
                    .iter()
                    .map(|c| self.output_kind(c))
                    .collect();
                if !kinds.is_empty() && kinds.iter().all(|k| *k == IoKind::Roi) {
                    IoKind::Roi
                } else if kinds.contains(&IoKind::Data) {
                    IoKind::Data
                } else {
                    IoKind::None
                }
            }
        }
    }

    /// AND/OR 组的公共输出类型,所有启用子节点必须同为 IMAGE 或同为 MASK
    pub fn merge_kind(&self, id: &Uuid) -> Result<IoKind, PipelineError> {
        let name = self.nodes.get(id).map(|n| n.name().to_string()).unwrap_or_default();
        let mut common: Option<IoKind> = None;
        for child in self.enabled_children(id) {
            let kind = self.output_kind(&child);
            if !matches!(kind, IoKind::Image | IoKind::Mask) {
                return Err(PipelineError::MergeError(format!(
                    "组 {} 的子节点输出 {},只能合并 image 或 mask",
                    name, kind
                )));
            }
            match common {
                None => common = Some(kind),
                Some(c) if c != kind => {
                    return Err(PipelineError::MergeError(format!(
                        "组 {} 的子节点输出类型不一致: {} / {}",
                        name, c, kind
                    )))
                }
                Some(_) => {}
            }
        }
        common.ok_or_else(|| PipelineError::MergeError(format!("组 {} 没有启用的子节点", name)))
    }

    /// 清空节点及其后所有节点的缓存结果
    pub fn invalidate(&mut self, id: &Uuid) {
        let pivot = self.as_pivot_list(id, NodeFilter::All);
        let Some(pivot_id) = pivot.pivot else {
            return;
        };
        debug!("清空缓存: {} 及其后 {} 个节点", pivot_id, pivot.after.len());
        for target in std::iter::once(pivot_id).chain(pivot.after) {
            if let Some(node) = self.nodes.get_mut(&target) {
                node.last_result.clear();
            }
        }
    }

    pub fn invalidate_all(&mut self) {
        for node in self.nodes.values_mut() {
            node.last_result.clear();
        }
    }

    /// 删除节点及其子树,根节点和 no_delete 组受保护
    pub fn remove_node(&mut self, id: &Uuid) -> Result<(), PipelineError> {
        let node = self.nodes.get(id).ok_or(PipelineError::NodeNotFound(*id))?;
        if self.is_root(id) {
            return Err(PipelineError::ConfigurationError(
                "根节点不能删除".to_string(),
            ));
        }
        if node.as_group().is_some_and(|g| g.no_delete) {
            return Err(PipelineError::ConfigurationError(format!(
                "组 {} 不允许删除",
                node.name()
            )));
        }

        self.invalidate(id);

        let subtree = self.subtree(id);
        if let Some(parent) = self.parent_of(id) {
            if let Some(group) = self.nodes.get_mut(&parent).and_then(|n| n.as_group_mut()) {
                group.children.retain(|c| c != id);
            }
        }
        for target in subtree {
            self.nodes.remove(&target);
        }
        Ok(())
    }

    /// 在父组内移动节点,从首个位置发生变化的节点开始清空缓存
    pub fn move_node(&mut self, id: &Uuid, new_index: usize) -> Result<(), PipelineError> {
        let parent = self.parent_of(id).ok_or_else(|| {
            PipelineError::ConfigurationError(format!("节点 {} 没有父节点,不能移动", id))
        })?;

        let before_move = self.iter_items(NodeFilter::All);
        let old_pos = before_move.iter().position(|n| n == id).unwrap_or(0);

        let group = self
            .nodes
            .get_mut(&parent)
            .and_then(|n| n.as_group_mut())
            .ok_or(PipelineError::NodeNotFound(parent))?;
        let from = group
            .children
            .iter()
            .position(|c| c == id)
            .ok_or(PipelineError::NodeNotFound(*id))?;
        let moved = group.children.remove(from);
        let to = new_index.min(group.children.len());
        group.children.insert(to, moved);

        let after_move = self.iter_items(NodeFilter::All);
        let new_pos = after_move.iter().position(|n| n == id).unwrap_or(0);
        if let Some(first_changed) = after_move.get(old_pos.min(new_pos)).copied() {
            self.invalidate(&first_changed);
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, id: &Uuid, enabled: bool) -> Result<(), PipelineError> {
        let module = self.module_mut(id)?;
        if module.enabled != enabled {
            module.enabled = enabled;
            self.invalidate(id);
        }
        Ok(())
    }

    pub fn set_tool_param(&mut self, id: &Uuid, key: &str, value: Value) -> Result<(), PipelineError> {
        self.module_mut(id)?.tool.set_param(key, value)?;
        self.invalidate(id);
        Ok(())
    }

    pub fn set_group_source(&mut self, id: &Uuid, source: SourceRef) -> Result<(), PipelineError> {
        self.group_mut(id)?.source = source;
        self.invalidate(id);
        Ok(())
    }

    pub fn set_merge_mode(&mut self, id: &Uuid, merge_mode: MergeMode) -> Result<(), PipelineError> {
        self.group_mut(id)?.merge_mode = merge_mode;
        self.invalidate(id);
        Ok(())
    }

    fn module_mut(&mut self, id: &Uuid) -> Result<&mut ModuleNode, PipelineError> {
        self.nodes
            .get_mut(id)
            .ok_or(PipelineError::NodeNotFound(*id))?
            .as_module_mut()
            .ok_or_else(|| PipelineError::ConfigurationError(format!("节点 {} 不是模块节点", id)))
    }

    fn group_mut(&mut self, id: &Uuid) -> Result<&mut GroupNode, PipelineError> {
        self.nodes
            .get_mut(id)
            .ok_or(PipelineError::NodeNotFound(*id))?
            .as_group_mut()
            .ok_or_else(|| PipelineError::ConfigurationError(format!("节点 {} 不是组节点", id)))
    }

    /// 节点及其所有后代
    fn subtree(&self, id: &Uuid) -> Vec<Uuid> {
        let mut result = Vec::new();
        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            result.push(current);
            stack.extend(self.children_of(&current).iter().copied());
        }
        result
    }
}
