use crate::types::{MosaicSettings, Node, Wrapper};
use image::RgbImage;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// 执行报告的结果级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Ok,
    Warning,
    Error,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Ok => "ok",
            Outcome::Warning => "warning",
            Outcome::Error => "error",
        };
        f.write_str(name)
    }
}

/// 报告携带的内容,普通模式为节点,调试模式为整个上下文
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Node(&'a Node),
    Wrapper(&'a Wrapper),
    None,
}

/// 一条执行报告
#[derive(Debug, Clone)]
pub struct Report<'a> {
    pub outcome: Outcome,
    pub message: String,
    pub payload: Payload<'a>,
    /// 节点在同类节点中的绝对位置,与节点无关的报告为 None
    pub index: Option<usize>,
    pub count: usize,
}

impl<'a> Report<'a> {
    pub fn new(outcome: Outcome, message: impl Into<String>, payload: Payload<'a>) -> Self {
        Self {
            outcome,
            message: message.into(),
            payload,
            index: None,
            count: 0,
        }
    }

    pub fn with_progress(mut self, index: Option<usize>, count: usize) -> Self {
        self.index = index;
        self.count = count;
        self
    }
}

/// 用户回调,返回 false 时请求停止执行
pub type Callback<'c> = dyn FnMut(&Report<'_>) -> bool + 'c;

/// 报告拦截器
///
/// 每条报告先被记录日志并收集拼图图像,再交给用户回调。
pub struct Reporter<'c> {
    callback: Option<&'c mut Callback<'c>>,
    grid: Vec<Vec<String>>,
    harvest_enabled: bool,
    harvested: HashMap<String, RgbImage>,
    stopped: bool,
}

impl<'c> Reporter<'c> {
    /// # Arguments
    /// * `mosaic` - 拼图配置,决定哪些图像需要收集
    /// * `callback` - 可选的用户回调
    pub fn new(mosaic: &MosaicSettings, callback: Option<&'c mut Callback<'c>>) -> Self {
        Self {
            callback,
            grid: mosaic.images.clone(),
            harvest_enabled: mosaic.enabled,
            harvested: HashMap::new(),
            stopped: false,
        }
    }

    pub fn mosaic_enabled(&self) -> bool {
        self.harvest_enabled
    }

    /// 回调是否已经请求停止
    pub fn stopped(&self) -> bool {
        self.stopped
    }

    fn wants(&self, name: &str) -> bool {
        self.harvest_enabled && self.grid.iter().flatten().any(|cell| cell == name)
    }

    /// 直接收集一张图像,用于原始图像等不经过节点报告的内容
    pub fn harvest_image(&mut self, name: &str, image: &RgbImage) {
        if self.wants(name) {
            self.harvested.insert(name.to_string(), image.clone());
        }
    }

    fn harvest(&mut self, payload: &Payload<'_>) {
        if !self.harvest_enabled {
            return;
        }
        match payload {
            Payload::Node(node) => {
                if self.wants(node.name()) {
                    if let Some(image) = node.last_result.display_image() {
                        self.harvested.insert(node.name().to_string(), image);
                    }
                }
            }
            Payload::Wrapper(wrapper) => {
                for entry in &wrapper.image_list {
                    if self.wants(&entry.name) {
                        self.harvested.insert(entry.name.clone(), entry.image.clone());
                    }
                }
            }
            Payload::None => {}
        }
    }

    /// 处理一条报告
    ///
    /// # Returns
    /// * `bool` - 为 false 表示回调要求停止
    pub fn report(&mut self, report: Report<'_>) -> bool {
        debug!(
            outcome = %report.outcome,
            "[{:?}/{}] {}",
            report.index,
            report.count,
            report.message
        );

        self.harvest(&report.payload);

        let keep_going = match self.callback.as_mut() {
            Some(callback) => callback(&report),
            None => true,
        };
        if !keep_going && !self.stopped {
            debug!("回调请求停止执行");
            self.stopped = true;
        }
        keep_going
    }

    /// 已收集的拼图图像
    pub fn harvested(&self) -> &HashMap<String, RgbImage> {
        &self.harvested
    }

    pub fn into_harvested(self) -> HashMap<String, RgbImage> {
        self.harvested
    }

    pub fn grid(&self) -> &[Vec<String>] {
        &self.grid
    }
}
