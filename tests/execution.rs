mod common;

use common::*;
use image::{GrayImage, Luma};
use ipso_pipeline::{
    ExecuteOptions, LastResult, LoosePipeline, MergeMode, NodeFilter, Outcome, Payload, Report,
    SourceRef, Wrapper,
};
use ipso_pipeline::{MaskAreaConfig, MaskAreaTool, RectRoiConfig, RectRoiTool, ThresholdConfig, ThresholdTool};
use pretty_assertions::assert_eq;
use uuid::Uuid;

fn result_of(pipeline: &LoosePipeline, id: &Uuid) -> LastResult {
    pipeline.tree().node(id).unwrap().last_result.clone()
}

fn pixel_of(result: &LastResult) -> u8 {
    result.image.as_ref().unwrap().get_pixel(0, 0).0[0]
}

fn run(pipeline: &mut LoosePipeline, wrapper: &mut Wrapper) -> bool {
    pipeline.execute(wrapper, ExecuteOptions::default(), None)
}

#[test_log::test]
fn chain_applies_enabled_modules_in_order() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("chain");
    let root = pipeline.root();
    let a = pipeline.tree_mut().add_module(root, AddTool::boxed("a", 10, &calls)).unwrap();
    let b = pipeline.tree_mut().add_module(root, AddTool::boxed("b", 20, &calls)).unwrap();

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(run(&mut pipeline, &mut wrapper));

    assert_eq!(pixel_of(&result_of(&pipeline, &a)), 15);
    assert_eq!(pixel_of(&result_of(&pipeline, &b)), 35);
    assert_eq!(pixel_of(&result_of(&pipeline, &root)), 35);
    assert_eq!(count(&calls), 2);
}

#[test]
fn rerun_with_same_luid_is_deterministic_and_cached() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("cache");
    let root = pipeline.root();
    let g = pipeline
        .tree_mut()
        .add_group(root, "g", MergeMode::Chain, SourceRef::LastOutput)
        .unwrap();
    pipeline.tree_mut().add_module(root, AddTool::boxed("a", 10, &calls)).unwrap();
    pipeline.tree_mut().add_module(g, AddTool::boxed("b", 1, &calls)).unwrap();

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(run(&mut pipeline, &mut wrapper));
    let ids = pipeline.tree().iter_items(NodeFilter::All);
    let first: Vec<_> = ids.iter().map(|id| result_of(&pipeline, id)).collect();

    let mut again = Wrapper::new("w", plain_image(5));
    assert!(run(&mut pipeline, &mut again));
    let second: Vec<_> = ids.iter().map(|id| result_of(&pipeline, id)).collect();

    assert_eq!(first, second);
    assert_eq!(count(&calls), 2);
}

#[test]
fn disabling_a_module_recomputes_following_nodes_from_raw_image() {
    let calls_a = calls();
    let calls_b = calls();
    let mut pipeline = LoosePipeline::new("disable");
    let root = pipeline.root();
    let a = pipeline.tree_mut().add_module(root, AddTool::boxed("a", 10, &calls_a)).unwrap();
    let b = pipeline.tree_mut().add_module(root, AddTool::boxed("b", 20, &calls_b)).unwrap();

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(run(&mut pipeline, &mut wrapper));
    assert_eq!(pixel_of(&result_of(&pipeline, &b)), 35);

    pipeline.tree_mut().set_enabled(&a, false).unwrap();
    assert!(result_of(&pipeline, &b).is_empty());

    assert!(run(&mut pipeline, &mut wrapper));
    assert_eq!(pixel_of(&result_of(&pipeline, &b)), 25);
    assert_eq!(count(&calls_a), 1);
    assert_eq!(count(&calls_b), 2);
}

#[test]
fn invalidation_clears_pivot_and_everything_after() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("scope");
    let root = pipeline.root();
    let a = pipeline.tree_mut().add_module(root, AddTool::boxed("a", 1, &calls)).unwrap();
    let g = pipeline
        .tree_mut()
        .add_group(root, "g", MergeMode::Chain, SourceRef::LastOutput)
        .unwrap();
    let b = pipeline.tree_mut().add_module(g, AddTool::boxed("b", 1, &calls)).unwrap();
    let c = pipeline.tree_mut().add_module(root, AddTool::boxed("c", 1, &calls)).unwrap();

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(run(&mut pipeline, &mut wrapper));

    pipeline.invalidate(&g);
    let cleared: Vec<_> = pipeline
        .tree()
        .iter_items(NodeFilter::All)
        .into_iter()
        .filter(|id| result_of(&pipeline, id).is_empty())
        .collect();
    assert_eq!(cleared, vec![g, b, c]);
    assert!(!result_of(&pipeline, &a).is_empty());
    assert!(!result_of(&pipeline, &root).is_empty());
}

#[test]
fn pivot_partition_covers_filtered_items_in_order() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("pivot");
    let root = pipeline.root();
    let g = pipeline
        .tree_mut()
        .add_group(root, "g", MergeMode::None, SourceRef::Source)
        .unwrap();
    let a = pipeline.tree_mut().add_module(g, AddTool::boxed("a", 1, &calls)).unwrap();
    let b = pipeline.tree_mut().add_module(root, AddTool::boxed("b", 1, &calls)).unwrap();

    let tree = pipeline.tree();
    let pivot = tree.as_pivot_list(&a, NodeFilter::All);
    let mut joined = pivot.before.clone();
    joined.extend(pivot.pivot);
    joined.extend(pivot.after.iter().copied());
    assert_eq!(joined, tree.iter_items(NodeFilter::All));
    assert_eq!(pivot.before, vec![root, g]);
    assert_eq!(pivot.after, vec![b]);

    let missing = tree.as_pivot_list(&Uuid::new_v4(), NodeFilter::Modules);
    assert_eq!(missing.pivot, None);
    assert_eq!(missing.before, vec![a, b]);
    assert_eq!(tree.absolute_index(&Uuid::new_v4(), NodeFilter::Modules), None);
}

fn merged_mask(mode: MergeMode, reversed: bool) -> GrayImage {
    let mut pipeline = LoosePipeline::new("merge");
    let root = pipeline.root();
    let g = pipeline
        .tree_mut()
        .add_group(root, "mask", mode, SourceRef::LastOutput)
        .unwrap();
    let mut masks = vec![
        FixedMaskTool::boxed("m1", &[(0, 0), (1, 0), (2, 0)]),
        FixedMaskTool::boxed("m2", &[(1, 0), (2, 0), (3, 3)]),
    ];
    if reversed {
        masks.reverse();
    }
    for tool in masks {
        pipeline.tree_mut().add_module(g, tool).unwrap();
    }

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(run(&mut pipeline, &mut wrapper));
    result_of(&pipeline, &g).mask.unwrap()
}

#[test]
fn and_or_merges_are_commutative() {
    let and = merged_mask(MergeMode::And, false);
    assert_eq!(and, merged_mask(MergeMode::And, true));
    assert_eq!(and, mask_from(&[(1, 0), (2, 0)]));
    assert_eq!(and.pixels().filter(|p| **p == Luma([255])).count(), 2);

    let or = merged_mask(MergeMode::Or, false);
    assert_eq!(or, merged_mask(MergeMode::Or, true));
    assert_eq!(or, mask_from(&[(0, 0), (1, 0), (2, 0), (3, 3)]));
}

#[test_log::test]
fn and_group_with_mixed_children_reports_error() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("invalid");
    let root = pipeline.root();
    let g = pipeline
        .tree_mut()
        .add_group(root, "mixed", MergeMode::And, SourceRef::LastOutput)
        .unwrap();
    pipeline.tree_mut().add_module(g, AddTool::boxed("a", 1, &calls)).unwrap();
    pipeline.tree_mut().add_module(g, FixedMaskTool::boxed("m", &[(0, 0)])).unwrap();

    let mut errors = Vec::new();
    let mut callback = |report: &Report<'_>| {
        if report.outcome == Outcome::Error {
            errors.push(report.message.clone());
        }
        true
    };
    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(!pipeline.execute(&mut wrapper, ExecuteOptions::default(), Some(&mut callback)));

    assert!(result_of(&pipeline, &g).is_empty());
    assert_eq!(count(&calls), 0);
    assert!(wrapper.error_holder.contains_target("mixed"));
    assert!(!errors.is_empty());
}

#[test]
fn last_output_without_image_producer_keeps_current_image() {
    let mut pipeline = LoosePipeline::new("fallback");
    let root = pipeline.root();
    let g = pipeline
        .tree_mut()
        .add_group(root, "g", MergeMode::Chain, SourceRef::LastOutput)
        .unwrap();
    pipeline.tree_mut().add_module(g, FixedMaskTool::boxed("m", &[(0, 0)])).unwrap();

    let mut wrapper = Wrapper::new("w", plain_image(7));
    assert!(run(&mut pipeline, &mut wrapper));
    assert_eq!(result_of(&pipeline, &g).image, Some(plain_image(7)));
}

#[test]
fn last_output_uses_most_recent_image_before_group() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("last_output");
    let root = pipeline.root();
    pipeline.tree_mut().add_module(root, AddTool::boxed("a", 10, &calls)).unwrap();
    let g = pipeline
        .tree_mut()
        .add_group(root, "g", MergeMode::Chain, SourceRef::LastOutput)
        .unwrap();
    pipeline.tree_mut().add_module(g, AddTool::boxed("b", 1, &calls)).unwrap();

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(run(&mut pipeline, &mut wrapper));
    assert_eq!(pixel_of(&result_of(&pipeline, &g)), 16);
}

#[test]
fn uuid_source_reads_referenced_node_output() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("uuid_source");
    let root = pipeline.root();
    let a = pipeline.tree_mut().add_module(root, AddTool::boxed("a", 10, &calls)).unwrap();
    pipeline.tree_mut().add_module(root, AddTool::boxed("b", 20, &calls)).unwrap();
    let g = pipeline
        .tree_mut()
        .add_group(root, "g", MergeMode::Chain, SourceRef::Node(a))
        .unwrap();
    pipeline.tree_mut().add_module(g, AddTool::boxed("c", 1, &calls)).unwrap();

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(run(&mut pipeline, &mut wrapper));
    assert_eq!(pixel_of(&result_of(&pipeline, &g)), 16);
}

#[test_log::test]
fn unusable_uuid_source_warns_and_falls_back() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("bad_source");
    let root = pipeline.root();
    pipeline.tree_mut().add_module(root, AddTool::boxed("a", 10, &calls)).unwrap();
    let g = pipeline
        .tree_mut()
        .add_group(root, "g", MergeMode::Chain, SourceRef::Node(Uuid::new_v4()))
        .unwrap();
    pipeline.tree_mut().add_module(g, AddTool::boxed("b", 1, &calls)).unwrap();

    let mut warnings = 0;
    let mut callback = |report: &Report<'_>| {
        if report.outcome == Outcome::Warning {
            assert!(matches!(report.payload, Payload::None));
            warnings += 1;
        }
        true
    };
    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(pipeline.execute(&mut wrapper, ExecuteOptions::default(), Some(&mut callback)));

    assert_eq!(warnings, 1);
    assert_eq!(pixel_of(&result_of(&pipeline, &g)), 16);
}

#[test_log::test]
fn target_run_stops_exactly_at_target_in_nested_tree() {
    let before = calls();
    let after = calls();
    let mut pipeline = LoosePipeline::new("target");
    let root = pipeline.root();
    let tree = pipeline.tree_mut();
    let g1 = tree.add_group(root, "g1", MergeMode::Chain, SourceRef::Source).unwrap();
    let g2 = tree.add_group(g1, "g2", MergeMode::Chain, SourceRef::LastOutput).unwrap();
    let m1 = tree.add_module(g2, AddTool::boxed("m1", 1, &before)).unwrap();
    let target = tree.add_module(g2, AddTool::boxed("target", 2, &before)).unwrap();
    let m3 = tree.add_module(g2, AddTool::boxed("m3", 4, &after)).unwrap();
    let m4 = tree.add_module(g1, AddTool::boxed("m4", 8, &after)).unwrap();
    let m5 = tree.add_module(root, AddTool::boxed("m5", 16, &after)).unwrap();

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(pipeline.execute(&mut wrapper, ExecuteOptions::target(target), None));

    assert_eq!(pixel_of(&result_of(&pipeline, &m1)), 6);
    assert_eq!(pixel_of(&result_of(&pipeline, &target)), 8);
    for id in [m3, m4, m5, g2, g1, root] {
        assert!(result_of(&pipeline, &id).is_empty());
    }
    assert_eq!(count(&before), 2);
    assert_eq!(count(&after), 0);
}

#[test]
fn target_module_stores_row_of_logged_images() {
    let mut pipeline = LoosePipeline::new("captured");
    let root = pipeline.root();
    let id = pipeline
        .tree_mut()
        .add_module(root, Box::new(LoggingTool))
        .unwrap();

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(pipeline.execute(&mut wrapper, ExecuteOptions::target(id), None));
    let image = result_of(&pipeline, &id).image.unwrap();
    assert_eq!(image.dimensions(), (8, 4));
    assert_eq!(image.get_pixel(0, 0).0[0], 50);
    assert_eq!(image.get_pixel(7, 3).0[0], 100);

    // 不是目标时使用日志中最后一张图像
    pipeline.tree_mut().invalidate_all();
    assert!(run(&mut pipeline, &mut wrapper));
    assert_eq!(result_of(&pipeline, &id).image, Some(plain_image(100)));
}

#[test_log::test]
fn false_from_callback_cancels_at_next_boundary() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("cancel");
    let root = pipeline.root();
    let a = pipeline.tree_mut().add_module(root, AddTool::boxed("a", 1, &calls)).unwrap();
    let b = pipeline.tree_mut().add_module(root, AddTool::boxed("b", 1, &calls)).unwrap();

    let mut seen = 0;
    let mut callback = |_: &Report<'_>| {
        seen += 1;
        false
    };
    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(!pipeline.execute(&mut wrapper, ExecuteOptions::default(), Some(&mut callback)));

    assert_eq!(seen, 1);
    assert_eq!(count(&calls), 1);
    assert!(!result_of(&pipeline, &a).is_empty());
    assert!(result_of(&pipeline, &b).is_empty());
    assert!(result_of(&pipeline, &root).is_empty());
}

#[test_log::test]
fn failing_tool_does_not_stop_siblings() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("failure");
    let root = pipeline.root();
    let failed = pipeline.tree_mut().add_module(root, Box::new(FailTool)).unwrap();
    let b = pipeline.tree_mut().add_module(root, AddTool::boxed("b", 1, &calls)).unwrap();

    let mut outcomes = Vec::new();
    let mut callback = |report: &Report<'_>| {
        outcomes.push(report.outcome);
        true
    };
    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(!pipeline.execute(&mut wrapper, ExecuteOptions::default(), Some(&mut callback)));

    assert_eq!(outcomes, vec![Outcome::Error, Outcome::Ok, Outcome::Error]);
    assert!(result_of(&pipeline, &failed).is_empty());
    assert_eq!(pixel_of(&result_of(&pipeline, &b)), 6);
    assert_eq!(wrapper.error_holder.error_count(), 1);
    assert!(wrapper.error_holder.contains_target("fail"));
}

#[test]
fn luid_change_invalidates_the_whole_tree() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("luid");
    let root = pipeline.root();
    pipeline.tree_mut().add_module(root, AddTool::boxed("a", 1, &calls)).unwrap();

    assert!(run(&mut pipeline, &mut Wrapper::new("first", plain_image(5))));
    assert!(run(&mut pipeline, &mut Wrapper::new("first", plain_image(5))));
    assert_eq!(count(&calls), 1);

    assert!(run(&mut pipeline, &mut Wrapper::new("second", plain_image(5))));
    assert_eq!(count(&calls), 2);
    assert_eq!(pipeline.last_wrapper_luid(), Some("second"));

    let forced = ExecuteOptions {
        target: None,
        invalidate: true,
    };
    assert!(pipeline.execute(&mut Wrapper::new("second", plain_image(5)), forced, None));
    assert_eq!(count(&calls), 3);
}

#[test]
fn roi_only_group_draws_overlay() {
    let mut pipeline = LoosePipeline::new("rois");
    let root = pipeline.root();
    let g = pipeline
        .tree_mut()
        .add_group(root, "rois", MergeMode::None, SourceRef::Source)
        .unwrap();
    for (name, tag, left) in [("left", "keep", 0), ("right", "erode", 2)] {
        let tool = RectRoiTool::new(RectRoiConfig {
            roi_name: name.to_string(),
            tag: tag.to_string(),
            left,
            top: 0,
            width: 2,
            height: 2,
        });
        pipeline.tree_mut().add_module(g, Box::new(tool)).unwrap();
    }

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(run(&mut pipeline, &mut wrapper));

    let result = result_of(&pipeline, &g);
    assert_eq!(result.rois.len(), 2);
    assert_eq!(wrapper.rois.len(), 2);
    assert_ne!(result.image, Some(plain_image(5)));
    assert_eq!(pipeline.tree().output_kind(&g), ipso_pipeline::IoKind::Roi);
}

#[test]
fn none_group_merges_data_from_every_child() {
    let mut pipeline = LoosePipeline::new("data");
    let root = pipeline.root();
    let tree = pipeline.tree_mut();
    tree.add_module(root, Box::new(ThresholdTool::new(ThresholdConfig::default())))
        .unwrap();
    let g = tree
        .add_group(root, "features", MergeMode::None, SourceRef::Source)
        .unwrap();
    for key in ["area", "area_copy"] {
        let tool = MaskAreaTool::new(MaskAreaConfig {
            key: key.to_string(),
        });
        tree.add_module(g, Box::new(tool)).unwrap();
    }

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(run(&mut pipeline, &mut wrapper));

    assert_eq!(wrapper.csv_data_holder.get("area"), Some(&serde_json::json!(16)));
    assert_eq!(wrapper.csv_data_holder.get("area_copy"), Some(&serde_json::json!(16)));
    let data = result_of(&pipeline, &g).data.unwrap();
    assert_eq!(data.len(), 2);
}

#[test]
fn reports_carry_progress_and_debug_payload() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("progress");
    let root = pipeline.root();
    pipeline.tree_mut().add_module(root, AddTool::boxed("a", 1, &calls)).unwrap();
    pipeline.tree_mut().add_module(root, AddTool::boxed("b", 1, &calls)).unwrap();
    pipeline.settings.debug_mode = true;

    let mut progress = Vec::new();
    let mut callback = |report: &Report<'_>| {
        assert!(matches!(report.payload, Payload::Wrapper(_)));
        progress.push((report.index, report.count));
        true
    };
    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(pipeline.execute(&mut wrapper, ExecuteOptions::default(), Some(&mut callback)));

    assert_eq!(progress, vec![(Some(0), 2), (Some(1), 2), (Some(0), 1)]);
}

#[test_log::test]
fn root_assembles_and_saves_mosaic() {
    let calls = calls();
    let output = std::env::temp_dir().join(format!("ipso-mosaic-{}", Uuid::new_v4()));
    let mut pipeline = LoosePipeline::new("mosaic");
    let root = pipeline.root();
    pipeline.tree_mut().add_module(root, AddTool::boxed("add", 10, &calls)).unwrap();
    pipeline.settings.mosaic.enabled = true;
    pipeline.settings.mosaic.images = vec![
        vec!["source".to_string(), "add".to_string()],
        vec!["missing".to_string()],
    ];
    pipeline.settings.image_output_path = Some(output.clone());

    let mut wrapper = Wrapper::new("plant", plain_image(5));
    assert!(run(&mut pipeline, &mut wrapper));

    let stored = pipeline.stored_mosaic_images();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored.get("add"), Some(&plain_image(15)));

    let mosaic = wrapper.find_logged_image("mosaic").unwrap().image.clone();
    assert_eq!(mosaic.dimensions(), (8, 8));
    assert_eq!(mosaic.get_pixel(0, 0).0[0], 5);
    assert_eq!(mosaic.get_pixel(4, 0).0[0], 15);
    assert_eq!(mosaic.get_pixel(0, 4).0[0], 0);

    let saved = output.join("plant_mosaic.png");
    assert!(saved.exists());
    let _ = std::fs::remove_dir_all(&output);
}

#[test_log::test]
fn root_mosaic_report_carries_failure() {
    let mut pipeline = LoosePipeline::new("mosaic_failure");
    let root = pipeline.root();
    pipeline.tree_mut().add_module(root, Box::new(FailTool)).unwrap();
    pipeline.settings.mosaic.enabled = true;
    pipeline.settings.mosaic.images = vec![vec!["source".to_string()]];

    let mut last = None;
    let mut callback = |report: &Report<'_>| {
        last = Some((report.outcome, matches!(report.payload, Payload::Wrapper(_))));
        true
    };
    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(!pipeline.execute(&mut wrapper, ExecuteOptions::default(), Some(&mut callback)));

    assert_eq!(last, Some((Outcome::Error, true)));
    assert!(wrapper.find_logged_image("mosaic").is_some());
}

#[test_log::test]
fn none_group_siblings_do_not_share_masks() {
    let mut pipeline = LoosePipeline::new("isolation");
    let root = pipeline.root();
    let tree = pipeline.tree_mut();
    let g = tree
        .add_group(root, "features", MergeMode::None, SourceRef::Source)
        .unwrap();
    let sub = tree
        .add_group(g, "make_mask", MergeMode::Chain, SourceRef::LastOutput)
        .unwrap();
    tree.add_module(sub, Box::new(ThresholdTool::new(ThresholdConfig::default())))
        .unwrap();
    let area = tree
        .add_module(
            g,
            Box::new(MaskAreaTool::new(MaskAreaConfig {
                key: "area".to_string(),
            })),
        )
        .unwrap();

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(!run(&mut pipeline, &mut wrapper));

    assert!(result_of(&pipeline, &sub).mask.is_some());
    assert!(result_of(&pipeline, &area).is_empty());
    assert!(wrapper.csv_data_holder.get("area").is_none());
    assert!(wrapper.error_holder.contains_target("mask_area"));
    assert!(wrapper.mask.is_none());
}

#[test_log::test]
fn target_inside_invalid_group_stops_the_run() {
    let inside = calls();
    let after = calls();
    let mut pipeline = LoosePipeline::new("invalid_target");
    let root = pipeline.root();
    let tree = pipeline.tree_mut();
    let g = tree
        .add_group(root, "mixed", MergeMode::And, SourceRef::LastOutput)
        .unwrap();
    let img = tree.add_module(g, AddTool::boxed("img", 1, &inside)).unwrap();
    tree.add_module(g, FixedMaskTool::boxed("m", &[(0, 0)])).unwrap();
    let later = tree.add_module(root, AddTool::boxed("later", 1, &after)).unwrap();

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(!pipeline.execute(&mut wrapper, ExecuteOptions::target(img), None));

    assert_eq!(count(&inside), 0);
    assert_eq!(count(&after), 0);
    assert!(result_of(&pipeline, &later).is_empty());
    assert!(result_of(&pipeline, &root).is_empty());
}

fn rect_roi(name: &str) -> RectRoiTool {
    RectRoiTool::new(RectRoiConfig {
        roi_name: name.to_string(),
        tag: "keep".to_string(),
        left: 0,
        top: 0,
        width: 2,
        height: 2,
    })
}

#[test_log::test]
fn chain_group_ending_with_roi_is_an_image_source() {
    let calls = calls();
    let mut pipeline = LoosePipeline::new("chain_roi");
    let root = pipeline.root();
    let tree = pipeline.tree_mut();
    tree.add_module(root, AddTool::boxed("pre", 100, &calls)).unwrap();
    let g = tree
        .add_group(root, "prepare", MergeMode::Chain, SourceRef::Source)
        .unwrap();
    tree.add_group(g, "noop", MergeMode::Chain, SourceRef::Source)
        .unwrap();
    tree.add_module(g, Box::new(rect_roi("plant"))).unwrap();
    let only = tree
        .add_group(root, "only_rois", MergeMode::Chain, SourceRef::Source)
        .unwrap();
    tree.add_module(only, Box::new(rect_roi("pot"))).unwrap();
    let h = tree
        .add_group(root, "after", MergeMode::Chain, SourceRef::LastOutput)
        .unwrap();
    let b = tree.add_module(h, AddTool::boxed("b", 1, &calls)).unwrap();

    assert_eq!(pipeline.tree().output_kind(&g), ipso_pipeline::IoKind::Image);
    assert_eq!(pipeline.tree().output_kind(&only), ipso_pipeline::IoKind::Roi);

    let mut wrapper = Wrapper::new("w", plain_image(5));
    assert!(run(&mut pipeline, &mut wrapper));

    assert_eq!(result_of(&pipeline, &g).rois.len(), 1);
    assert_eq!(pixel_of(&result_of(&pipeline, &g)), 5);
    assert_eq!(pixel_of(&result_of(&pipeline, &b)), 6);
}
