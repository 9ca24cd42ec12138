use crate::engine::{NodeTree, ToolRegistry, LOAD_ERROR_TARGET};
use crate::types::{ErrorHolder, MergeMode, PipelineError, SourceRef};
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, warn};

/// 旧版线性流水线文件的标题
pub const LEGACY_TITLE: &str = "ipso phen pipeline";

/// 旧版工具的固定分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyCategory {
    FixImage,
    PreProcessing,
    Roi,
    Threshold,
    MaskCleanup,
    FeatureExtraction,
}

impl FromStr for LegacyCategory {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fix_image" | "exposure_fixing" => Ok(LegacyCategory::FixImage),
            "pre_processing" => Ok(LegacyCategory::PreProcessing),
            "roi_static" | "roi_dynamic" => Ok(LegacyCategory::Roi),
            "threshold" => Ok(LegacyCategory::Threshold),
            "mask_cleanup" => Ok(LegacyCategory::MaskCleanup),
            "feature_extraction" => Ok(LegacyCategory::FeatureExtraction),
            other => Err(PipelineError::ConfigurationError(format!(
                "未知的旧版工具分类: {}",
                other
            ))),
        }
    }
}

/// 模板中的一个固定组
#[derive(Debug, Clone)]
pub struct TemplateGroup {
    pub name: &'static str,
    pub merge_mode: MergeMode,
    pub source: SourceRef,
    pub categories: &'static [LegacyCategory],
}

lazy_static! {
    /// 旧版流水线导入时使用的组模板,按执行顺序排列
    pub static ref LEGACY_TEMPLATE: Vec<TemplateGroup> = vec![
        TemplateGroup {
            name: "fix_image",
            merge_mode: MergeMode::Chain,
            source: SourceRef::Source,
            categories: &[LegacyCategory::FixImage],
        },
        TemplateGroup {
            name: "pre_process_image",
            merge_mode: MergeMode::Chain,
            source: SourceRef::LastOutput,
            categories: &[LegacyCategory::PreProcessing],
        },
        TemplateGroup {
            name: "build_rois",
            merge_mode: MergeMode::None,
            source: SourceRef::LastOutput,
            categories: &[LegacyCategory::Roi],
        },
        TemplateGroup {
            name: "build_mask",
            merge_mode: MergeMode::And,
            source: SourceRef::LastOutput,
            categories: &[LegacyCategory::Threshold],
        },
        TemplateGroup {
            name: "clean_mask",
            merge_mode: MergeMode::Chain,
            source: SourceRef::LastOutput,
            categories: &[LegacyCategory::MaskCleanup],
        },
        TemplateGroup {
            name: "extract_features",
            merge_mode: MergeMode::None,
            source: SourceRef::Source,
            categories: &[LegacyCategory::FeatureExtraction],
        },
    ];
}

#[derive(Debug, Deserialize)]
struct LegacyTool {
    kind: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    tool: Value,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct LegacyPipeline {
    #[serde(default)]
    merge_method: Option<String>,
    #[serde(default)]
    tools: Vec<Value>,
}

/// 旧版文件的掩膜合并方式
fn merge_method(value: Option<&str>) -> Result<MergeMode, PipelineError> {
    match value {
        None | Some("multi_and") | Some("and") => Ok(MergeMode::And),
        Some("multi_or") | Some("or") => Ok(MergeMode::Or),
        Some(other) => Err(PipelineError::ConfigurationError(format!(
            "未知的掩膜合并方式: {}",
            other
        ))),
    }
}

/// 把旧版线性流水线导入为固定模板的节点树
///
/// 模板中的组即使没有工具也会被创建,且不可删除。
///
/// # Arguments
/// * `value` - 旧版文件内容
/// * `registry` - 用于还原工具的注册表
/// * `errors` - 收集被跳过工具的错误
pub fn import_legacy(
    value: &Value,
    registry: &ToolRegistry,
    errors: &mut ErrorHolder,
) -> Result<NodeTree, PipelineError> {
    let legacy: LegacyPipeline = serde_json::from_value(value.clone())?;
    let mask_mode = merge_method(legacy.merge_method.as_deref())?;

    let mut tree = NodeTree::new("pipeline");
    let root = tree.root();
    let mut groups = Vec::with_capacity(LEGACY_TEMPLATE.len());
    for template in LEGACY_TEMPLATE.iter() {
        let merge_mode = if template.merge_mode.is_combining() {
            mask_mode
        } else {
            template.merge_mode
        };
        let id = tree.add_group(root, template.name, merge_mode, template.source)?;
        if let Some(group) = tree.node_mut(&id).and_then(|n| n.as_group_mut()) {
            group.no_delete = true;
        }
        groups.push((id, template.categories));
    }

    for raw in &legacy.tools {
        let imported = serde_json::from_value::<LegacyTool>(raw.clone())
            .map_err(PipelineError::from)
            .and_then(|tool| {
                let category = tool.kind.parse::<LegacyCategory>()?;
                let (group, _) = groups
                    .iter()
                    .find(|(_, categories)| categories.contains(&category))
                    .ok_or_else(|| {
                        PipelineError::ConfigurationError(format!("分类 {} 没有对应的组", tool.kind))
                    })?;
                let id = tree.add_module(*group, registry.create_from_json(&tool.tool)?)?;
                if !tool.enabled {
                    tree.set_enabled(&id, false)?;
                }
                debug!("导入旧版工具 {} 到 {:?}", tool.kind, category);
                Ok(())
            });
        if let Err(e) = imported {
            warn!("跳过旧版工具: {}", e);
            errors.add_error(LOAD_ERROR_TARGET, &e);
        }
    }

    Ok(tree)
}
