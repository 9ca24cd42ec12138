use crate::aop::{Callback, Outcome, Payload, Report, Reporter};
use crate::engine::{NodeTree, Tool, ToolOutput};
use crate::types::{
    ErrorLevel, GroupNode, IoKind, LastResult, MergeMode, NodeFilter, PipelineError,
    PipelineSettings, Roi, SourceRef, Wrapper,
};
use image::{GrayImage, RgbImage};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// 单次运行的执行选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// 执行到该节点后立即停止
    pub target: Option<Uuid>,
    /// 执行前清空整棵树的缓存
    pub invalidate: bool,
}

impl ExecuteOptions {
    pub fn target(target: Uuid) -> Self {
        Self {
            target: Some(target),
            invalidate: false,
        }
    }
}

/// 一次运行的状态,在递归执行过程中传递
pub struct RunContext<'c> {
    pub(crate) reporter: Reporter<'c>,
    debug_mode: bool,
    target: Option<Uuid>,
    target_reached: bool,
    module_positions: HashMap<Uuid, usize>,
    group_positions: HashMap<Uuid, usize>,
}

impl<'c> RunContext<'c> {
    pub fn new(
        tree: &NodeTree,
        settings: &PipelineSettings,
        target: Option<Uuid>,
        callback: Option<&'c mut Callback<'c>>,
    ) -> Self {
        let positions = |filter| {
            tree.iter_items(filter)
                .into_iter()
                .enumerate()
                .map(|(i, id)| (id, i))
                .collect::<HashMap<_, _>>()
        };
        Self {
            reporter: Reporter::new(&settings.mosaic, callback),
            debug_mode: settings.debug_mode,
            target,
            target_reached: false,
            module_positions: positions(NodeFilter::Modules),
            group_positions: positions(NodeFilter::Groups),
        }
    }

    pub fn target_reached(&self) -> bool {
        self.target_reached
    }

    pub fn cancelled(&self) -> bool {
        self.reporter.stopped()
    }

    fn should_stop(&self) -> bool {
        self.target_reached || self.reporter.stopped()
    }

    fn mark_executed(&mut self, id: &Uuid) {
        if self.target == Some(*id) {
            debug!("到达目标节点 {}", id);
            self.target_reached = true;
        }
    }

    /// 跳过整棵子树时,目标位于其中也视为已到达
    fn mark_skipped(&mut self, tree: &NodeTree, id: &Uuid) {
        if let Some(target) = self.target {
            if target == *id || tree.ancestors(&target).contains(id) {
                debug!("目标节点 {} 所在的组 {} 被跳过", target, id);
                self.target_reached = true;
            }
        }
    }

    fn progress(&self, id: &Uuid) -> (Option<usize>, usize) {
        if let Some(index) = self.module_positions.get(id) {
            (Some(*index), self.module_positions.len())
        } else {
            (self.group_positions.get(id).copied(), self.group_positions.len())
        }
    }

    /// 报告节点执行结果,调试模式下携带整个上下文
    fn report_node(
        &mut self,
        tree: &NodeTree,
        id: &Uuid,
        wrapper: &Wrapper,
        outcome: Outcome,
        message: String,
    ) {
        let payload = match tree.node(id) {
            Some(_) if self.debug_mode => Payload::Wrapper(wrapper),
            Some(node) => Payload::Node(node),
            None => Payload::None,
        };
        let (index, count) = self.progress(id);
        self.reporter
            .report(Report::new(outcome, message, payload).with_progress(index, count));
    }

    fn report_wrapper(&mut self, id: &Uuid, wrapper: &Wrapper, outcome: Outcome, message: String) {
        let (index, count) = self.progress(id);
        self.reporter.report(
            Report::new(outcome, message, Payload::Wrapper(wrapper)).with_progress(index, count),
        );
    }

    fn warn(&mut self, message: String) {
        self.reporter
            .report(Report::new(Outcome::Warning, message, Payload::None));
    }
}

/// 子节点输出在合并前的暂存
#[derive(Default)]
struct MergeBuffer {
    images: Vec<RgbImage>,
    masks: Vec<GrayImage>,
}

impl NodeTree {
    /// 执行节点及其子树
    ///
    /// # Arguments
    /// * `id` - 要执行的节点
    /// * `wrapper` - 当前图像的上下文
    /// * `run` - 本次运行的状态
    ///
    /// # Returns
    /// * `bool` - 节点及其子节点是否全部成功
    pub fn execute_node(&mut self, id: &Uuid, wrapper: &mut Wrapper, run: &mut RunContext<'_>) -> bool {
        match self.node(id).map(|n| n.is_group()) {
            Some(true) => self.execute_group(id, wrapper, run),
            Some(false) => self.execute_module(id, wrapper, run),
            None => {
                let error = PipelineError::NodeNotFound(*id);
                wrapper.error_holder.add_error(&id.to_string(), &error);
                false
            }
        }
    }

    fn execute_module(&mut self, id: &Uuid, wrapper: &mut Wrapper, run: &mut RunContext<'_>) -> bool {
        let is_target = run.target == Some(*id);
        let Some(node) = self.node(id) else {
            return false;
        };
        let Some(module) = node.as_module() else {
            return false;
        };
        let tool_name = module.tool.name().to_string();

        if !node.last_result.is_empty() {
            debug!("模块 {} 命中缓存", tool_name);
            run.mark_executed(id);
            run.report_node(self, id, wrapper, Outcome::Ok, format!("{} (缓存)", tool_name));
            return true;
        }

        debug!("执行模块 {}", tool_name);
        let mark = wrapper.image_log_mark();
        let result = match self.node_mut(id).and_then(|n| n.as_module_mut()) {
            Some(module) => invoke_tool(module.tool.as_mut(), wrapper, mark, is_target),
            None => return false,
        };

        let outcome = match result {
            Ok(last_result) => {
                if let Some(node) = self.node_mut(id) {
                    node.last_result = last_result;
                }
                Outcome::Ok
            }
            Err(e) => {
                wrapper.error_holder.add_error(&tool_name, &e);
                if let Some(node) = self.node_mut(id) {
                    node.last_result.clear();
                }
                Outcome::Error
            }
        };

        run.mark_executed(id);
        let message = match outcome {
            Outcome::Ok => format!("模块 {} 执行成功", tool_name),
            _ => format!("模块 {} 执行失败", tool_name),
        };
        run.report_node(self, id, wrapper, outcome, message);
        outcome == Outcome::Ok
    }

    fn execute_group(&mut self, id: &Uuid, wrapper: &mut Wrapper, run: &mut RunContext<'_>) -> bool {
        let Some(group) = self.node(id).and_then(|n| n.as_group()).cloned() else {
            return false;
        };
        debug!("执行组 {} ({})", group.name, group.merge_mode);

        let source_image = self.resolve_source(id, &group, wrapper, run);
        wrapper.current_image = source_image.clone();
        let source_mask = wrapper.mask.clone();

        let merge_kind = if group.merge_mode.is_combining() {
            match self.merge_kind(id) {
                Ok(kind) => Some(kind),
                Err(e) => {
                    wrapper.error_holder.add_error(&group.name, &e);
                    run.mark_skipped(self, id);
                    run.report_node(self, id, wrapper, Outcome::Error, e.to_string());
                    return false;
                }
            }
        } else {
            None
        };

        let mut outcome = true;
        let mut executed = 0usize;
        let mut only_rois = true;
        let mut rois: Vec<Roi> = Vec::new();
        let mut buffer = MergeBuffer::default();

        for child in self.enabled_children(id) {
            if run.should_stop() {
                return outcome && !run.cancelled();
            }
            if group.merge_mode != MergeMode::Chain {
                wrapper.current_image = source_image.clone();
                wrapper.mask = source_mask.clone();
            }

            let child_ok = self.execute_node(&child, wrapper, run);
            executed += 1;
            if !child_ok {
                outcome = false;
                only_rois = false;
                continue;
            }

            let kind = self.output_kind(&child);
            if kind != IoKind::Roi {
                only_rois = false;
            }
            let Some(result) = self.node(&child).map(|n| n.last_result.clone()) else {
                continue;
            };
            dispatch(group.merge_mode, kind, result, wrapper, &mut rois, &mut buffer);
        }

        if run.should_stop() {
            return outcome && !run.cancelled();
        }
        if group.merge_mode != MergeMode::Chain {
            wrapper.current_image = source_image;
            wrapper.mask = source_mask;
        }

        let mut result = LastResult::default();
        match merge_kind {
            Some(kind) => match merge_buffer(group.merge_mode, kind, &buffer, wrapper) {
                Ok(merged) => result = merged,
                Err(e) => {
                    wrapper.error_holder.add_error(&group.name, &e);
                    outcome = false;
                }
            },
            None if executed > 0 && only_rois => {
                result.image = Some(wrapper.draw_rois(&wrapper.current_image, &rois));
                result.rois = rois;
            }
            None => {
                result.image = Some(wrapper.current_image.clone());
                result.mask = wrapper.mask.clone();
                if !wrapper.csv_data_holder.is_empty() {
                    result.data = Some(wrapper.csv_data_holder.clone());
                }
                result.rois = rois;
            }
        }

        if let Some(node) = self.node_mut(id) {
            node.last_result = result;
        }
        run.mark_executed(id);

        let (status, message) = if outcome {
            (Outcome::Ok, format!("组 {} 执行成功", group.name))
        } else {
            (Outcome::Error, format!("组 {} 执行失败", group.name))
        };
        if self.is_root(id) && run.reporter.mosaic_enabled() {
            let mosaic = wrapper.build_mosaic(run.reporter.grid(), run.reporter.harvested());
            wrapper.store_image("mosaic", mosaic);
            run.report_wrapper(id, wrapper, status, format!("{},拼图完成", message));
        } else {
            run.report_node(self, id, wrapper, status, message);
        }
        outcome && !run.cancelled()
    }

    /// 解析组的输入图像
    fn resolve_source(
        &self,
        id: &Uuid,
        group: &GroupNode,
        wrapper: &mut Wrapper,
        run: &mut RunContext<'_>,
    ) -> RgbImage {
        match group.source {
            SourceRef::Source => wrapper.source_image().clone(),
            SourceRef::LastOutput => self
                .last_output_image(id)
                .unwrap_or_else(|| wrapper.current_image.clone()),
            SourceRef::Node(source) => match self.node_source_image(id, &source) {
                Ok(image) => image,
                Err(e) => {
                    wrapper
                        .error_holder
                        .add(ErrorLevel::Warning, &group.name, e.to_string());
                    run.warn(e.to_string());
                    self.last_output_image(id)
                        .unwrap_or_else(|| wrapper.current_image.clone())
                }
            },
        }
    }

    /// 文档顺序中位于节点之前的最近一个图像输出,跳过祖先和禁用节点
    pub fn last_output_image(&self, id: &Uuid) -> Option<RgbImage> {
        let ancestors = self.ancestors(id);
        let pivot = self.as_pivot_list(id, NodeFilter::All);
        pivot
            .before
            .iter()
            .rev()
            .filter(|candidate| !ancestors.contains(*candidate))
            .filter_map(|candidate| self.node(candidate))
            .filter(|node| node.is_enabled() && self.output_kind(&node.uuid) == IoKind::Image)
            .find_map(|node| node.last_result.image.clone())
    }

    fn node_source_image(&self, id: &Uuid, source: &Uuid) -> Result<RgbImage, PipelineError> {
        let unusable = |reason: &str| {
            PipelineError::SourceResolutionWarning(format!("数据源 {} {}", source, reason))
        };
        let node = self.node(source).ok_or_else(|| unusable("不存在"))?;
        let pivot = self.as_pivot_list(id, NodeFilter::All);
        if !pivot.before.contains(source) || self.ancestors(id).contains(source) {
            return Err(unusable("不在当前组之前"));
        }
        if !node.is_enabled() {
            return Err(unusable("已禁用"));
        }
        node.last_result
            .image
            .clone()
            .ok_or_else(|| unusable("没有缓存图像"))
    }
}

/// 调用工具并按优先级选出要缓存的结果
fn invoke_tool(
    tool: &mut dyn Tool,
    wrapper: &mut Wrapper,
    mark: usize,
    is_target: bool,
) -> Result<LastResult, PipelineError> {
    let kind = tool.output_type();
    let mut result = LastResult::default();

    if kind == IoKind::Roi {
        let roi = tool
            .generate_roi(wrapper)?
            .ok_or_else(|| PipelineError::tool_failure(tool.name(), "没有生成 ROI"))?;
        result.rois.push(roi);
        return Ok(result);
    }

    let output = tool.process_wrapper(wrapper)?;
    match kind {
        IoKind::Mask => {
            result.mask = match output {
                ToolOutput::Mask(mask) => Some(mask),
                _ => wrapper.mask.clone(),
            };
            if result.mask.is_none() {
                return Err(PipelineError::tool_failure(tool.name(), "没有生成掩膜"));
            }
        }
        IoKind::Data => {
            result.data = Some(match output {
                ToolOutput::Data(data) => data,
                _ => wrapper.csv_data_holder.clone(),
            });
        }
        IoKind::Image | IoKind::None | IoKind::Roi => {
            let logged = wrapper.images_since(mark);
            let image = if is_target && !logged.is_empty() {
                captured_row(wrapper, mark)
            } else if let (IoKind::Image, ToolOutput::Image(image)) = (kind, output) {
                image
            } else if let Some(last) = logged.last() {
                last.image.clone()
            } else {
                wrapper.current_image.clone()
            };
            result.image = Some(image);
        }
    }
    Ok(result)
}

/// 工具记录的中间图像排成一行
fn captured_row(wrapper: &Wrapper, mark: usize) -> RgbImage {
    let logged = wrapper.images_since(mark);
    if let [single] = logged {
        return single.image.clone();
    }
    let mut images = HashMap::new();
    let mut row = Vec::with_capacity(logged.len());
    for (i, entry) in logged.iter().enumerate() {
        let key = format!("{}#{}", entry.name, i);
        images.insert(key.clone(), entry.image.clone());
        row.push(key);
    }
    wrapper.build_mosaic(&[row], &images)
}

/// 根据合并模式把子节点结果分发到上下文
fn dispatch(
    mode: MergeMode,
    kind: IoKind,
    mut result: LastResult,
    wrapper: &mut Wrapper,
    rois: &mut Vec<Roi>,
    buffer: &mut MergeBuffer,
) {
    // ROI 也可能由输出图像的子组携带
    let carried = std::mem::take(&mut result.rois);
    if !mode.is_combining() {
        if mode == MergeMode::None {
            for roi in &carried {
                wrapper.add_roi(roi.clone());
            }
        }
        rois.extend(carried);
    }

    match (mode, kind) {
        (_, IoKind::Data) => {
            if let Some(data) = &result.data {
                wrapper.csv_data_holder.update(data);
            }
        }
        (MergeMode::Chain, IoKind::Image) => {
            if let Some(image) = result.image {
                wrapper.current_image = image;
            }
        }
        (MergeMode::Chain, IoKind::Mask) => {
            if result.mask.is_some() {
                wrapper.mask = result.mask;
            }
        }
        (MergeMode::And | MergeMode::Or, IoKind::Image) => buffer.images.extend(result.image),
        (MergeMode::And | MergeMode::Or, IoKind::Mask) => buffer.masks.extend(result.mask),
        _ => {}
    }
}

/// AND/OR 组合并暂存的输出
fn merge_buffer(
    mode: MergeMode,
    kind: IoKind,
    buffer: &MergeBuffer,
    wrapper: &mut Wrapper,
) -> Result<LastResult, PipelineError> {
    let mut result = LastResult::default();
    match kind {
        IoKind::Mask => {
            let mask = if mode == MergeMode::And {
                wrapper.multi_and(&buffer.masks)?
            } else {
                wrapper.multi_or(&buffer.masks)?
            };
            wrapper.mask = Some(mask.clone());
            result.mask = Some(mask);
        }
        _ => {
            let image = if mode == MergeMode::And {
                wrapper.multi_and(&buffer.images)?
            } else {
                wrapper.multi_or(&buffer.images)?
            };
            wrapper.current_image = image.clone();
            result.image = Some(image);
        }
    }
    Ok(result)
}
