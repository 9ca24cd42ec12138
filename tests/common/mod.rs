#![allow(dead_code)]

use image::{GrayImage, Luma, Rgb, RgbImage};
use ipso_pipeline::{IoKind, PipelineError, Tool, ToolOutput, Wrapper};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub type Calls = Arc<AtomicUsize>;

pub fn calls() -> Calls {
    Arc::new(AtomicUsize::new(0))
}

pub fn count(calls: &Calls) -> usize {
    calls.load(Ordering::SeqCst)
}

/// 4x4 的纯色测试图像
pub fn plain_image(value: u8) -> RgbImage {
    RgbImage::from_pixel(4, 4, Rgb([value, value, value]))
}

pub fn mask_from(cells: &[(u32, u32)]) -> GrayImage {
    let mut mask = GrayImage::new(4, 4);
    for &(x, y) in cells {
        mask.put_pixel(x, y, Luma([255]));
    }
    mask
}

/// 每个像素通道加上固定值
#[derive(Debug, Clone)]
pub struct AddTool {
    pub name: String,
    pub amount: u8,
    pub calls: Calls,
}

impl AddTool {
    pub fn boxed(name: &str, amount: u8, calls: &Calls) -> Box<dyn Tool> {
        Box::new(Self {
            name: name.to_string(),
            amount,
            calls: calls.clone(),
        })
    }
}

impl Tool for AddTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_type(&self) -> IoKind {
        IoKind::Image
    }

    fn output_type(&self) -> IoKind {
        IoKind::Image
    }

    fn process_wrapper(&mut self, wrapper: &mut Wrapper) -> Result<ToolOutput, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut image = wrapper.current_image.clone();
        for pixel in image.pixels_mut() {
            for channel in pixel.0.iter_mut() {
                *channel = channel.saturating_add(self.amount);
            }
        }
        Ok(ToolOutput::Image(image))
    }

    fn params(&self) -> Value {
        json!({ "amount": self.amount })
    }

    fn set_param(&mut self, key: &str, value: Value) -> Result<(), PipelineError> {
        match (key, value.as_u64()) {
            ("amount", Some(amount)) => {
                self.amount = amount as u8;
                Ok(())
            }
            _ => Err(PipelineError::ConfigurationError(key.to_string())),
        }
    }

    fn box_clone(&self) -> Box<dyn Tool> {
        Box::new(self.clone())
    }
}

/// 总是失败的工具
#[derive(Debug, Clone)]
pub struct FailTool;

impl Tool for FailTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn input_type(&self) -> IoKind {
        IoKind::Image
    }

    fn output_type(&self) -> IoKind {
        IoKind::Image
    }

    fn process_wrapper(&mut self, _wrapper: &mut Wrapper) -> Result<ToolOutput, PipelineError> {
        Err(PipelineError::tool_failure("fail", "boom"))
    }

    fn params(&self) -> Value {
        json!({})
    }

    fn set_param(&mut self, key: &str, _value: Value) -> Result<(), PipelineError> {
        Err(PipelineError::ConfigurationError(key.to_string()))
    }

    fn box_clone(&self) -> Box<dyn Tool> {
        Box::new(self.clone())
    }
}

/// 输出固定掩膜
#[derive(Debug, Clone)]
pub struct FixedMaskTool {
    pub name: String,
    pub cells: Vec<(u32, u32)>,
}

impl FixedMaskTool {
    pub fn boxed(name: &str, cells: &[(u32, u32)]) -> Box<dyn Tool> {
        Box::new(Self {
            name: name.to_string(),
            cells: cells.to_vec(),
        })
    }
}

impl Tool for FixedMaskTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_type(&self) -> IoKind {
        IoKind::Image
    }

    fn output_type(&self) -> IoKind {
        IoKind::Mask
    }

    fn process_wrapper(&mut self, _wrapper: &mut Wrapper) -> Result<ToolOutput, PipelineError> {
        Ok(ToolOutput::Mask(mask_from(&self.cells)))
    }

    fn params(&self) -> Value {
        json!({ "cells": self.cells })
    }

    fn set_param(&mut self, key: &str, _value: Value) -> Result<(), PipelineError> {
        Err(PipelineError::ConfigurationError(key.to_string()))
    }

    fn box_clone(&self) -> Box<dyn Tool> {
        Box::new(self.clone())
    }
}

/// 只把中间图像写入日志,不返回结构化结果
#[derive(Debug, Clone)]
pub struct LoggingTool;

impl Tool for LoggingTool {
    fn name(&self) -> &str {
        "logging"
    }

    fn input_type(&self) -> IoKind {
        IoKind::Image
    }

    fn output_type(&self) -> IoKind {
        IoKind::None
    }

    fn process_wrapper(&mut self, wrapper: &mut Wrapper) -> Result<ToolOutput, PipelineError> {
        wrapper.store_image("step_a", plain_image(50));
        wrapper.store_image("step_b", plain_image(100));
        Ok(ToolOutput::None)
    }

    fn params(&self) -> Value {
        json!({})
    }

    fn set_param(&mut self, key: &str, _value: Value) -> Result<(), PipelineError> {
        Err(PipelineError::ConfigurationError(key.to_string()))
    }

    fn box_clone(&self) -> Box<dyn Tool> {
        Box::new(self.clone())
    }
}
