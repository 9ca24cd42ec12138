use anyhow::Context;
use image::{Rgb, RgbImage};
use ipso_pipeline::{ExecuteOptions, LoosePipeline, Payload, Report, ToolRegistry, Wrapper};
use tracing::info;
use tracing_subscriber::EnvFilter;

const PIPELINE: &str = r#"{
    "title": "ipso pipeline",
    "name": "简单示例",
    "description": "阈值分割后统计面积",
    "version": "0.2.0",
    "settings": {
        "debug_mode": false,
        "mosaic_enabled": true,
        "mosaic_images": [["source", "pre_process"], ["threshold", "rois"]]
    },
    "Pipeline": {
        "node_type": "group",
        "merge_mode": "merge_mode_chain",
        "name": "pipeline",
        "uuid": "3f2504e0-4f89-11d3-9a0c-0305e82c3301",
        "source": "source",
        "no_delete": true,
        "nodes": [
            {
                "node_type": "group",
                "merge_mode": "merge_mode_chain",
                "name": "pre_process",
                "uuid": "3f2504e0-4f89-11d3-9a0c-0305e82c3302",
                "source": "source",
                "nodes": [
                    {
                        "node_type": "module",
                        "uuid": "3f2504e0-4f89-11d3-9a0c-0305e82c3303",
                        "enabled": true,
                        "tool": {"name": "brightness", "params": {"offset": 20}}
                    }
                ]
            },
            {
                "node_type": "group",
                "merge_mode": "merge_mode_none",
                "name": "rois",
                "uuid": "3f2504e0-4f89-11d3-9a0c-0305e82c3304",
                "source": "last_output",
                "nodes": [
                    {
                        "node_type": "module",
                        "uuid": "3f2504e0-4f89-11d3-9a0c-0305e82c3305",
                        "tool": {
                            "name": "rect_roi",
                            "params": {"roi_name": "plant", "left": 16, "top": 16, "width": 96, "height": 96}
                        }
                    }
                ]
            },
            {
                "node_type": "group",
                "merge_mode": "merge_mode_and",
                "name": "build_mask",
                "uuid": "3f2504e0-4f89-11d3-9a0c-0305e82c3306",
                "source": "3f2504e0-4f89-11d3-9a0c-0305e82c3302",
                "nodes": [
                    {
                        "node_type": "module",
                        "uuid": "3f2504e0-4f89-11d3-9a0c-0305e82c3307",
                        "tool": {"name": "threshold", "params": {"channel": "green", "min": 120}}
                    },
                    {
                        "node_type": "module",
                        "uuid": "3f2504e0-4f89-11d3-9a0c-0305e82c3308",
                        "tool": {"name": "threshold", "params": {"channel": "red", "max": 100}}
                    }
                ]
            },
            {
                "node_type": "module",
                "uuid": "3f2504e0-4f89-11d3-9a0c-0305e82c3309",
                "tool": {"name": "mask_area", "params": {"key": "plant_area"}}
            }
        ]
    }
}"#;

/// 绿色圆形的合成图像
fn synthetic_plant() -> RgbImage {
    RgbImage::from_fn(128, 128, |x, y| {
        let (dx, dy) = (x as i64 - 64, y as i64 - 64);
        if dx * dx + dy * dy < 40 * 40 {
            Rgb([40, 180, 60])
        } else {
            Rgb([120, 90, 60])
        }
    })
}

fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let registry = ToolRegistry::with_builtin();
    let mut pipeline = LoosePipeline::from_json(&serde_json::from_str(PIPELINE)?, &registry)?;
    pipeline.settings.image_output_path = Some(std::env::temp_dir().join("ipso_pipeline_demo"));
    info!("已注册的工具: {:?}", registry.registered_names());

    // 可以通过第一个参数指定图像文件
    let image = match std::env::args().nth(1) {
        Some(path) => image::open(&path)
            .with_context(|| format!("无法读取图像 {}", path))?
            .to_rgb8(),
        None => synthetic_plant(),
    };
    let mut wrapper = Wrapper::from_image(image);

    let mut callback = |report: &Report<'_>| {
        let name = match report.payload {
            Payload::Node(node) => node.name().to_string(),
            Payload::Wrapper(wrapper) => wrapper.luid().to_string(),
            Payload::None => String::from("-"),
        };
        println!(
            "[{}] {:?}/{} {} {}",
            report.outcome, report.index, report.count, name, report.message
        );
        true
    };
    let success = pipeline.execute(&mut wrapper, ExecuteOptions::default(), Some(&mut callback));

    info!("执行结果: {}", success);
    for (key, value) in wrapper.csv_data_holder.iter() {
        info!("{} = {}", key, value);
    }
    for entry in wrapper.error_holder.iter() {
        info!("{:?} {} x{}: {}", entry.level, entry.target, entry.count, entry.message);
    }

    // 第二次执行全部命中缓存
    let cached = pipeline.execute(&mut wrapper, ExecuteOptions::default(), None);
    info!("缓存执行结果: {}", cached);

    let saved = std::env::temp_dir().join("ipso_pipeline_demo.json");
    pipeline.save(&saved)?;
    info!("流水线已保存到 {}", saved.display());
    Ok(())
}
