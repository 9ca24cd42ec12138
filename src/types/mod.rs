mod context;
mod descriptor;
mod error;
mod node;
mod roi;

pub use context::*;
pub use descriptor::*;
pub use error::*;
pub use node::*;
pub use roi::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// 工具输入输出的数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoKind {
    Image,
    Mask,
    Data,
    Roi,
    None,
}

impl fmt::Display for IoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IoKind::Image => "image",
            IoKind::Mask => "mask",
            IoKind::Data => "data",
            IoKind::Roi => "roi",
            IoKind::None => "none",
        };
        f.write_str(name)
    }
}

/// 组节点合并子节点输出的策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MergeMode {
    /// 子节点独立执行
    #[serde(rename = "merge_mode_none")]
    None,
    /// 前一个子节点的输出作为下一个子节点的输入
    #[default]
    #[serde(rename = "merge_mode_chain")]
    Chain,
    /// 子节点输出逐像素与
    #[serde(rename = "merge_mode_and")]
    And,
    /// 子节点输出逐像素或
    #[serde(rename = "merge_mode_or")]
    Or,
}

impl MergeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMode::None => "merge_mode_none",
            MergeMode::Chain => "merge_mode_chain",
            MergeMode::And => "merge_mode_and",
            MergeMode::Or => "merge_mode_or",
        }
    }

    /// AND/OR 模式需要缓存并合并子节点输出
    pub fn is_combining(&self) -> bool {
        matches!(self, MergeMode::And | MergeMode::Or)
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge_mode_none" | "none" => Ok(MergeMode::None),
            "merge_mode_chain" | "chain" => Ok(MergeMode::Chain),
            "merge_mode_and" | "and" => Ok(MergeMode::And),
            "merge_mode_or" | "or" => Ok(MergeMode::Or),
            other => Err(PipelineError::ConfigurationError(format!(
                "未知的合并模式: {}",
                other
            ))),
        }
    }
}

/// 组节点输入图像的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceRef {
    /// 本次运行的原始图像
    #[default]
    Source,
    /// 之前最近一个输出图像的节点
    LastOutput,
    /// 指定节点的输出
    Node(Uuid),
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Source => f.write_str("source"),
            SourceRef::LastOutput => f.write_str("last_output"),
            SourceRef::Node(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for SourceRef {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(SourceRef::Source),
            "last_output" => Ok(SourceRef::LastOutput),
            other => Uuid::parse_str(other).map(SourceRef::Node).map_err(|_| {
                PipelineError::ConfigurationError(format!("无效的数据源: {}", other))
            }),
        }
    }
}

impl Serialize for SourceRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SourceRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 遍历时的节点过滤条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeFilter {
    Groups,
    Modules,
    All,
}

impl NodeFilter {
    pub fn accepts(&self, node: &Node) -> bool {
        match self {
            NodeFilter::Groups => node.is_group(),
            NodeFilter::Modules => node.is_module(),
            NodeFilter::All => true,
        }
    }
}

/// 拼图设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MosaicSettings {
    #[serde(rename = "mosaic_enabled", default)]
    pub enabled: bool,
    /// 按行排列的图像名称
    #[serde(rename = "mosaic_images", default)]
    pub images: Vec<Vec<String>>,
}

impl MosaicSettings {
    pub fn contains(&self, name: &str) -> bool {
        self.images.iter().flatten().any(|cell| cell == name)
    }
}

/// 流水线设置,文件中以扁平键值对保存
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub debug_mode: bool,
    #[serde(flatten)]
    pub mosaic: MosaicSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_output_path: Option<PathBuf>,
}

/// 流水线文件的元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub name: String,
    pub description: String,
    pub version: String,
    /// 保存时间 (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}
