//! Graph construction, scheduling and framebuffer generation

mod common;

use common::{shadow_geometry_final, MockBackend};
use ember_graph::backend::TextureFormat;
use ember_graph::graph::{AttachmentInfo, GraphError, RenderGraph};

#[test]
fn duplicate_pass_id_fails_and_keeps_original() {
    let mut graph = RenderGraph::new();
    graph.add_pass("final", true).unwrap();
    assert!(matches!(
        graph.add_pass("final", false),
        Err(GraphError::Duplicate(_))
    ));
}

#[test]
fn duplicate_output_name_fails_and_keeps_attachments() {
    let mut backend = MockBackend::new();
    let mut graph = RenderGraph::new();
    graph.add_pass("geometry", false).unwrap();

    let info = AttachmentInfo::color(TextureFormat::Rgba8Unorm);
    graph
        .add_output_with(&mut backend, "geometry", "color_tex1", &info)
        .unwrap();
    let attachments_before = backend.attachments.len();

    assert!(matches!(
        graph.add_output_with(&mut backend, "geometry", "color_tex1", &info),
        Err(GraphError::Duplicate(_))
    ));
    assert_eq!(backend.attachments.len(), attachments_before);
}

#[test]
fn duplicate_output_with_changed_kind_leaves_attachment_untouched() {
    let mut backend = MockBackend::new();
    let mut graph = RenderGraph::new();
    graph.add_pass("geometry", false).unwrap();

    graph
        .add_output_with(
            &mut backend,
            "geometry",
            "color_tex1",
            &AttachmentInfo::color(TextureFormat::Rgba8Unorm),
        )
        .unwrap();
    let destroyed_before = backend.destroyed_attachments;
    let attachments_before = backend.attachments.len();

    // re-declaring the same name as depth must not rebuild the image
    assert!(matches!(
        graph.add_output_with(
            &mut backend,
            "geometry",
            "color_tex1",
            &AttachmentInfo::depth(TextureFormat::Depth32Float),
        ),
        Err(GraphError::Duplicate(_))
    ));
    assert_eq!(backend.destroyed_attachments, destroyed_before);
    assert_eq!(backend.attachments.len(), attachments_before);
}

#[test]
fn duplicate_input_with_changed_kind_leaves_attachment_untouched() {
    let mut backend = MockBackend::new();
    let mut graph = RenderGraph::new();
    graph.add_pass("final", true).unwrap();

    graph
        .add_input_with(
            &mut backend,
            "final",
            "color_tex1",
            &AttachmentInfo::color(TextureFormat::Rgba8Unorm),
        )
        .unwrap();
    let destroyed_before = backend.destroyed_attachments;

    assert!(matches!(
        graph.add_input_with(
            &mut backend,
            "final",
            "color_tex1",
            &AttachmentInfo::depth(TextureFormat::Depth32Float),
        ),
        Err(GraphError::Duplicate(_))
    ));
    assert_eq!(backend.destroyed_attachments, destroyed_before);
}

#[test]
fn input_without_registered_attachment_fails() {
    let mut graph = RenderGraph::new();
    graph.add_pass("final", true).unwrap();
    assert!(matches!(
        graph.add_input("final", "nowhere"),
        Err(GraphError::NotFound(_))
    ));
}

#[test]
fn sixty_fifth_pass_fails_with_capacity() {
    let mut graph = RenderGraph::new();
    for i in 0..64 {
        graph.add_pass(&format!("pass{}", i), false).unwrap();
    }
    assert!(matches!(
        graph.add_pass("pass64", false),
        Err(GraphError::Capacity(_))
    ));
    // the pool is unchanged: all 64 original ids still resolve
    assert!(graph.add_pass("pass0", false).is_err());
}

#[test]
fn build_without_terminal_pass_fails() {
    let mut backend = MockBackend::new();
    let mut graph = RenderGraph::new();
    graph.add_pass("geometry", false).unwrap();
    assert!(matches!(
        graph.build(&mut backend),
        Err(GraphError::NotFound(_))
    ));
}

#[test]
fn build_includes_only_passes_reachable_from_final() {
    let mut backend = MockBackend::new();
    let mut graph = shadow_geometry_final(&mut backend);

    // a used pass nothing depends on
    graph.add_pass("debug_overlay", false).unwrap();
    graph
        .add_output_with(
            &mut backend,
            "debug_overlay",
            "overlay_tex",
            &AttachmentInfo::color(TextureFormat::Rgba8Unorm),
        )
        .unwrap();

    graph.build(&mut backend).unwrap();

    let order = graph.compiled_order();
    assert_eq!(order.len(), 3);
    let ids: Vec<&str> = order.iter().map(|(id, _)| *id).collect();
    assert!(ids.contains(&"shadow"));
    assert!(ids.contains(&"geometry"));
    assert!(ids.contains(&"final"));
    assert!(!ids.contains(&"debug_overlay"));
}

#[test]
fn shadow_geometry_final_schedules_consumers_first() {
    let mut backend = MockBackend::new();
    let mut graph = shadow_geometry_final(&mut backend);
    graph.build(&mut backend).unwrap();

    assert_eq!(graph.compiled_pass_count(), 3);
    let order = graph.compiled_order();
    assert_eq!(order, vec![("final", 0), ("geometry", 1), ("shadow", 2)]);
}

#[test]
fn rebuilding_unchanged_graph_is_deterministic() {
    let mut backend = MockBackend::new();
    let mut graph = shadow_geometry_final(&mut backend);

    graph.build(&mut backend).unwrap();
    let first: Vec<(String, u32)> = graph
        .compiled_order()
        .iter()
        .map(|(id, stage)| (id.to_string(), *stage))
        .collect();

    graph.build(&mut backend).unwrap();
    let second: Vec<(String, u32)> = graph
        .compiled_order()
        .iter()
        .map(|(id, stage)| (id.to_string(), *stage))
        .collect();

    assert_eq!(first, second);
}

#[test]
fn self_produced_input_is_a_cycle() {
    let mut backend = MockBackend::new();
    let mut graph = RenderGraph::new();

    graph.add_pass("feedback", false).unwrap();
    graph
        .add_output_with(
            &mut backend,
            "feedback",
            "echo",
            &AttachmentInfo::color(TextureFormat::Rgba8Unorm),
        )
        .unwrap();
    graph.add_input("feedback", "echo").unwrap();

    graph.add_pass("final", true).unwrap();
    graph.add_input("final", "echo").unwrap();

    assert!(matches!(
        graph.build(&mut backend),
        Err(GraphError::Unresolvable(_))
    ));
    assert_eq!(graph.compiled_pass_count(), 0);
}

#[test]
fn mutually_dependent_pair_is_a_cycle() {
    let mut backend = MockBackend::new();
    let mut graph = RenderGraph::new();
    let color = AttachmentInfo::color(TextureFormat::Rgba8Unorm);

    graph.add_pass("ping", false).unwrap();
    graph
        .add_output_with(&mut backend, "ping", "a", &color)
        .unwrap();
    graph.add_pass("pong", false).unwrap();
    graph
        .add_output_with(&mut backend, "pong", "b", &color)
        .unwrap();
    graph.add_input("ping", "b").unwrap();
    graph.add_input("pong", "a").unwrap();

    graph.add_pass("final", true).unwrap();
    graph.add_input("final", "a").unwrap();

    assert!(matches!(
        graph.build(&mut backend),
        Err(GraphError::Unresolvable(_))
    ));
    assert_eq!(graph.compiled_pass_count(), 0);
}

#[test]
fn failed_rebuild_keeps_previous_schedule() {
    let mut backend = MockBackend::new();
    let mut graph = shadow_geometry_final(&mut backend);
    graph.build(&mut backend).unwrap();
    assert_eq!(graph.compiled_pass_count(), 3);

    // wire a cycle into the existing graph: shadow now reads what it writes
    graph.add_input("shadow", "shadow_map").unwrap();

    assert!(matches!(
        graph.build(&mut backend),
        Err(GraphError::Unresolvable(_))
    ));
    assert_eq!(graph.compiled_pass_count(), 3);
    assert_eq!(
        graph.compiled_order(),
        vec![("final", 0), ("geometry", 1), ("shadow", 2)]
    );
}

#[test]
fn swapchain_pass_gets_one_framebuffer_per_image() {
    let mut backend = MockBackend::new();
    let mut graph = shadow_geometry_final(&mut backend);
    graph.build(&mut backend).unwrap();

    // 3 swapchain framebuffers for "final", one each for the offscreen passes
    assert_eq!(backend.framebuffers.len(), 3 + 1 + 1);

    let swapchain_bound = backend
        .framebuffers
        .values()
        .filter(|desc| {
            desc.attachments.len() == 1 && backend.swapchain_views.contains(&desc.attachments[0])
        })
        .count();
    assert_eq!(swapchain_bound, 3);
}

#[test]
fn offscreen_render_pass_reflects_declared_outputs() {
    let mut backend = MockBackend::new();
    let mut graph = shadow_geometry_final(&mut backend);
    graph.build(&mut backend).unwrap();

    let geometry = graph.native_render_pass("geometry").unwrap();
    let desc = &backend.render_passes[&geometry.0];
    assert_eq!(desc.color_format, Some(TextureFormat::Rgba8Unorm));
    assert_eq!(desc.depth_format, Some(TextureFormat::Depth32Float));
    assert!(!desc.swapchain_output);

    let shadow = graph.native_render_pass("shadow").unwrap();
    let desc = &backend.render_passes[&shadow.0];
    assert_eq!(desc.color_format, None);
    assert_eq!(desc.depth_format, Some(TextureFormat::Depth32Float));

    let final_pass = graph.native_render_pass("final").unwrap();
    let desc = &backend.render_passes[&final_pass.0];
    assert!(desc.swapchain_output);
    assert_eq!(desc.color_format, Some(TextureFormat::Bgra8UnormSrgb));
}

#[test]
fn native_render_pass_distinguishes_unknown_from_unbuilt() {
    let mut backend = MockBackend::new();
    let mut graph = shadow_geometry_final(&mut backend);

    assert!(matches!(
        graph.native_render_pass("nope"),
        Err(GraphError::NotFound(_))
    ));
    assert!(matches!(
        graph.native_render_pass("final"),
        Err(GraphError::NotFound(_))
    ));

    graph.build(&mut backend).unwrap();
    assert!(graph.native_render_pass("final").is_ok());
}

#[test]
fn rebuild_framebuffers_replaces_every_framebuffer() {
    let mut backend = MockBackend::new();
    let mut graph = shadow_geometry_final(&mut backend);
    graph.build(&mut backend).unwrap();

    let destroyed_before = backend.destroyed_framebuffers;
    graph.rebuild_framebuffers(&mut backend).unwrap();

    assert_eq!(backend.destroyed_framebuffers, destroyed_before + 5);
    assert_eq!(backend.framebuffers.len(), 5);
    // render passes survive a framebuffer-only rebuild
    assert_eq!(backend.render_passes.len(), 3);
}

#[test]
fn set_record_callback_on_missing_pass_is_ignored() {
    let mut backend = MockBackend::new();
    let mut graph = shadow_geometry_final(&mut backend);
    graph.set_record_callback("nope", Box::new(|_, _, _| {}));
    graph.build(&mut backend).unwrap();
    assert_eq!(graph.compiled_pass_count(), 3);
}

#[test]
fn destroy_is_idempotent() {
    let mut backend = MockBackend::new();
    let mut graph = shadow_geometry_final(&mut backend);
    graph.build(&mut backend).unwrap();

    graph.destroy(&mut backend);
    assert!(backend.framebuffers.is_empty());
    assert!(backend.render_passes.is_empty());
    assert!(backend.attachments.is_empty());
    assert_eq!(graph.compiled_pass_count(), 0);

    let destroyed = (
        backend.destroyed_attachments,
        backend.destroyed_render_passes,
        backend.destroyed_framebuffers,
    );
    graph.destroy(&mut backend);
    assert_eq!(
        destroyed,
        (
            backend.destroyed_attachments,
            backend.destroyed_render_passes,
            backend.destroyed_framebuffers,
        )
    );
}
