use crate::aop::Report;
use crate::engine::{
    import_legacy, ExecuteOptions, NodeTree, RunContext, ToolRegistry, Version, LEGACY_TITLE,
};
use crate::types::{ErrorHolder, Metadata, PipelineError, PipelineSettings, Wrapper};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// 当前格式流水线文件的标题
pub const PIPELINE_TITLE: &str = "ipso pipeline";

/// 流水线文件结构
#[derive(Debug, Serialize, Deserialize)]
struct PipelineFile {
    #[serde(flatten)]
    metadata: Metadata,
    #[serde(default)]
    settings: PipelineSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_data_base: Option<Value>,
    #[serde(rename = "Pipeline")]
    pipeline: Value,
}

/// 松散流水线,持有节点树和运行设置
///
/// 每个工作线程使用自己的副本,副本之间不共享任何状态。
#[derive(Debug, Clone)]
pub struct LoosePipeline {
    tree: NodeTree,
    pub settings: PipelineSettings,
    pub metadata: Metadata,
    /// 由使用方解释的附加数据
    pub target_data_base: Option<Value>,
    pub error_holder: ErrorHolder,
    last_wrapper_luid: Option<String>,
    stored_mosaic_images: HashMap<String, RgbImage>,
}

impl LoosePipeline {
    pub fn new(name: &str) -> Self {
        Self::with_tree(name, NodeTree::new(name))
    }

    fn with_tree(name: &str, tree: NodeTree) -> Self {
        Self {
            tree,
            settings: PipelineSettings::default(),
            metadata: Metadata {
                title: PIPELINE_TITLE.to_string(),
                name: name.to_string(),
                description: String::new(),
                version: crate::engine::FILE_VERSION.to_string(),
                date: None,
            },
            target_data_base: None,
            error_holder: ErrorHolder::new(),
            last_wrapper_luid: None,
            stored_mosaic_images: HashMap::new(),
        }
    }

    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut NodeTree {
        &mut self.tree
    }

    pub fn root(&self) -> Uuid {
        self.tree.root()
    }

    /// 上一次运行使用的图像标识
    pub fn last_wrapper_luid(&self) -> Option<&str> {
        self.last_wrapper_luid.as_deref()
    }

    /// 上一次运行收集的拼图图像
    pub fn stored_mosaic_images(&self) -> &HashMap<String, RgbImage> {
        &self.stored_mosaic_images
    }

    pub fn invalidate(&mut self, id: &Uuid) {
        self.tree.invalidate(id);
    }

    /// 在图像上执行整棵树
    ///
    /// 图像标识变化时先清空所有缓存。回调返回 false 时在下一个节点边界停止。
    ///
    /// # Arguments
    /// * `wrapper` - 当前图像的上下文
    /// * `options` - 目标节点与缓存选项
    /// * `callback` - 可选的进度回调
    ///
    /// # Returns
    /// * `bool` - 所有执行的节点都成功且没有被取消
    pub fn execute(
        &mut self,
        wrapper: &mut Wrapper,
        options: ExecuteOptions,
        callback: Option<&mut dyn FnMut(&Report<'_>) -> bool>,
    ) -> bool {
        info!(
            "开始执行流水线 {} (luid={})",
            self.metadata.name,
            wrapper.luid()
        );

        if options.invalidate || self.last_wrapper_luid.as_deref() != Some(wrapper.luid()) {
            debug!("图像标识变化,清空全部缓存");
            self.tree.invalidate_all();
        }
        self.last_wrapper_luid = Some(wrapper.luid().to_string());
        self.stored_mosaic_images.clear();

        let mut run = RunContext::new(&self.tree, &self.settings, options.target, callback);
        run.reporter.harvest_image("source", wrapper.source_image());

        let root = self.tree.root();
        let outcome = self.tree.execute_node(&root, wrapper, &mut run);
        let cancelled = run.cancelled();
        let target_reached = run.target_reached();
        self.stored_mosaic_images = run.reporter.into_harvested();

        if !cancelled && !target_reached {
            self.save_mosaic(wrapper);
        }

        info!(
            "流水线 {} 执行结束: outcome={}, cancelled={}",
            self.metadata.name, outcome, cancelled
        );
        outcome
    }

    /// 把拼图写入输出目录,失败只记录错误
    fn save_mosaic(&mut self, wrapper: &Wrapper) {
        let Some(dir) = &self.settings.image_output_path else {
            return;
        };
        if !self.settings.mosaic.enabled {
            return;
        }
        let Some(mosaic) = wrapper.find_logged_image("mosaic") else {
            return;
        };

        let path = dir.join(format!("{}_mosaic.png", wrapper.luid()));
        let saved = fs::create_dir_all(dir)
            .map_err(PipelineError::from)
            .and_then(|_| mosaic.image.save(&path).map_err(PipelineError::from));
        match saved {
            Ok(()) => info!("拼图已保存到 {}", path.display()),
            Err(e) => {
                let error =
                    PipelineError::PersistenceError(format!("{}: {}", path.display(), e));
                self.error_holder.add_error("mosaic", &error);
            }
        }
    }

    /// 序列化为流水线文件内容
    pub fn to_json(&self) -> Result<Value, PipelineError> {
        let file = PipelineFile {
            metadata: self.metadata.clone(),
            settings: self.settings.clone(),
            target_data_base: self.target_data_base.clone(),
            pipeline: self.tree.to_json()?,
        };
        Ok(serde_json::to_value(file)?)
    }

    /// 从流水线文件内容构建
    ///
    /// 支持旧版线性格式;被跳过的节点记录在返回的流水线的 `error_holder` 中。
    pub fn from_json(value: &Value, registry: &ToolRegistry) -> Result<Self, PipelineError> {
        let mut errors = ErrorHolder::new();

        if value.get("title").and_then(Value::as_str) == Some(LEGACY_TITLE) {
            info!("导入旧版流水线");
            let tree = import_legacy(value, registry, &mut errors)?;
            let name = value
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("pipeline")
                .to_string();
            let mut pipeline = Self::with_tree(&name, tree);
            if let Some(description) = value.get("description").and_then(Value::as_str) {
                pipeline.metadata.description = description.to_string();
            }
            if let Some(settings) = value.get("settings") {
                pipeline.settings = serde_json::from_value(settings.clone())?;
            }
            pipeline.error_holder = errors;
            return Ok(pipeline);
        }

        let file: PipelineFile = serde_json::from_value(value.clone())?;
        if !crate::engine::is_compatible(&file.metadata.version) {
            debug!("文件版本 {} 与当前版本不同", file.metadata.version);
        }
        let tree = NodeTree::from_json(&file.pipeline, registry, &mut errors)?;
        Ok(Self {
            tree,
            settings: file.settings,
            metadata: file.metadata,
            target_data_base: file.target_data_base,
            error_holder: errors,
            last_wrapper_luid: None,
            stored_mosaic_images: HashMap::new(),
        })
    }

    /// 保存到文件,同时更新版本和日期
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let version = Version::now();
        self.metadata.version = version.version.clone();
        self.metadata.date = Some(version.date_stamp());

        let written = self
            .to_json()
            .and_then(|value| serde_json::to_string_pretty(&value).map_err(PipelineError::from))
            .and_then(|content| {
                fs::write(path, content).map_err(|e| {
                    PipelineError::PersistenceError(format!("{}: {}", path.display(), e))
                })
            });
        if let Err(error) = &written {
            self.error_holder.add_error("pipeline_save", error);
        }
        written?;
        info!("流水线 {} 已保存到 {}", self.metadata.name, path.display());
        Ok(())
    }

    /// 从文件加载
    pub fn load(path: impl AsRef<Path>, registry: &ToolRegistry) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| PipelineError::PersistenceError(format!("{}: {}", path.display(), e)))?;
        let value: Value = serde_json::from_str(&content)?;
        let pipeline = Self::from_json(&value, registry)?;
        info!(
            "已从 {} 加载流水线 {} ({} 个模块)",
            path.display(),
            pipeline.metadata.name,
            pipeline.tree.module_count()
        );
        Ok(pipeline)
    }
}
