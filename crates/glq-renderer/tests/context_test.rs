//! Integration test: Context (inline execution plane)
//!
//! Drives the control-plane API with the execution plane running on the
//! test thread, so every dispatch is deterministic. The headless driver's
//! probe records what reached the driver.
//!
//! Run with: cargo test --test context_test -- --nocapture

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use glq_core::config::GlqConfig;
use glq_protocol::error::{ErrorFlags, GlError};
use glq_protocol::gl;
use glq_protocol::handle::{NativeHandle, ResourceKind, SurfaceSize};
use glq_protocol::opcode::Opcode;
use glq_protocol::value::SyncValue;
use glq_protocol::ProtocolError;
use glq_renderer::{
    Context, ContextError, DriverCall, HeadlessDriver, HostTextureProvider, InlineScheduler,
    LifecycleState, Notification, Probe, Value,
};

fn test_config() -> GlqConfig {
    let mut config = GlqConfig::default();
    config.context.antialias = false;
    config
}

fn make_context(config: &GlqConfig) -> (Context<InlineScheduler<HeadlessDriver>>, Probe) {
    glq_common::init_test_logging();
    let driver = HeadlessDriver::new();
    let probe = driver.probe();
    let mut ctx = Context::inline(driver, config);
    ctx.activate(SurfaceSize::new(8, 8)).expect("activate");
    (ctx, probe)
}

#[test]
fn test_create_bind_data_delete_reaches_driver_in_order() {
    let (mut ctx, probe) = make_context(&test_config());

    let buffer = ctx.create_buffer().expect("create buffer");
    ctx.bind_buffer(gl::ARRAY_BUFFER, Some(&buffer)).expect("bind");
    ctx.buffer_data(gl::ARRAY_BUFFER, vec![0u8; 12], gl::STATIC_DRAW)
        .expect("bufferData");
    ctx.delete(&buffer);
    ctx.finish().expect("finish");

    let calls = probe.resource_calls();
    assert_eq!(calls.len(), 4, "calls: {:?}", calls);

    let native = match &calls[0] {
        DriverCall::Create {
            kind: ResourceKind::Buffer,
            native,
        } => *native,
        other => panic!("expected buffer Create, got {:?}", other),
    };
    assert!(!native.is_null());
    assert_eq!(
        calls[1],
        DriverCall::Bind {
            kind: ResourceKind::Buffer,
            target: gl::ARRAY_BUFFER,
            native,
        }
    );
    match &calls[2] {
        DriverCall::Issue {
            opcode: Opcode::BufferData,
            payload: Some(12),
            ..
        } => {}
        other => panic!("expected bufferData, got {:?}", other),
    }
    assert_eq!(
        calls[3],
        DriverCall::Delete {
            kind: ResourceKind::Buffer,
            native,
        }
    );

    assert_eq!(ctx.queue().table().resolve(buffer.handle()), NativeHandle::NULL);
    assert_eq!(ctx.stats().snapshot().payloads_outstanding, 0);
    assert_eq!(ctx.state(), LifecycleState::Alive);
}

#[test]
fn test_deleted_object_sets_invalid_operation() {
    let (mut ctx, probe) = make_context(&test_config());

    let buffer = ctx.create_buffer().expect("create buffer");
    ctx.delete(&buffer);
    ctx.delete(&buffer); // second delete is a no-op
    ctx.bind_buffer(gl::ARRAY_BUFFER, Some(&buffer)).expect("bind");
    ctx.finish().expect("finish");

    assert_eq!(ctx.get_error(), GlError::InvalidOperation);
    assert_eq!(ctx.get_error(), GlError::NoError);

    let deletes = probe
        .resource_calls()
        .into_iter()
        .filter(|c| matches!(c, DriverCall::Delete { .. }))
        .count();
    assert_eq!(deletes, 1);
    assert!(!probe
        .resource_calls()
        .iter()
        .any(|c| matches!(c, DriverCall::Bind { .. })));
}

#[test]
fn test_errors_pop_in_priority_order() {
    let (mut ctx, probe) = make_context(&test_config());

    probe.inject_error(ErrorFlags::INVALID_FRAMEBUFFER_OPERATION | ErrorFlags::INVALID_ENUM);
    ctx.enable(gl::BLEND).expect("enable");
    // bufferData with nothing bound is an invalid operation on the driver
    ctx.buffer_data(gl::ARRAY_BUFFER, vec![1, 2, 3, 4], gl::STATIC_DRAW)
        .expect("bufferData");

    assert_eq!(ctx.get_error(), GlError::InvalidEnum);
    assert_eq!(ctx.get_error(), GlError::InvalidOperation);
    assert_eq!(ctx.get_error(), GlError::InvalidFramebufferOperation);
    assert_eq!(ctx.get_error(), GlError::NoError);
}

#[test]
fn test_schema_violations_are_rejected_before_queueing() {
    let (mut ctx, _) = make_context(&test_config());
    let texture = ctx.create_texture().expect("create texture");
    let queued = ctx.queue().queued_count();

    match ctx.enqueue(Opcode::Viewport, &[Value::Int(0), Value::Int(0)], None) {
        Err(ContextError::Protocol(ProtocolError::ArityMismatch {
            expected: 4, got: 2, ..
        })) => {}
        other => panic!("expected ArityMismatch, got {:?}", other),
    }
    match ctx.enqueue(
        Opcode::BindBuffer,
        &[Value::Uint(gl::ARRAY_BUFFER), Value::Object(Some(&texture))],
        None,
    ) {
        Err(ContextError::Protocol(ProtocolError::ArgumentType { index: 1, .. })) => {}
        other => panic!("expected ArgumentType, got {:?}", other),
    }
    match ctx.enqueue(Opcode::ShaderSource, &[Value::Object(None)], None) {
        Err(ContextError::Protocol(ProtocolError::Payload { .. })) => {}
        other => panic!("expected Payload, got {:?}", other),
    }
    match ctx.enqueue(Opcode::ReadPixels, &[Value::Int(0); 6], None) {
        Err(ContextError::Protocol(ProtocolError::WrongClass { .. })) => {}
        other => panic!("expected WrongClass, got {:?}", other),
    }

    assert_eq!(ctx.queue().queued_count(), queued);
}

#[test]
fn test_unsupported_extension_is_skipped() {
    let (mut ctx, probe) = make_context(&test_config());

    ctx.enqueue(Opcode::Extension(0x42), &[Value::Int(1); 8], None)
        .expect("extension");
    ctx.clear_color(0.0, 1.0, 0.0, 1.0).expect("clearColor");
    ctx.finish().expect("finish");

    assert_eq!(
        probe.issued(),
        vec![Opcode::Extension(0x42), Opcode::ClearColor]
    );
    assert_eq!(ctx.get_error(), GlError::NoError);
}

#[test]
fn test_read_pixels_sees_prior_clear() {
    let (mut ctx, _) = make_context(&test_config());

    ctx.clear_color(1.0, 0.0, 0.0, 1.0).expect("clearColor");
    ctx.clear(gl::COLOR_BUFFER_BIT).expect("clear");
    let pixels = ctx.read_pixels(3, 3, 1, 1).expect("readPixels");
    assert_eq!(pixels, vec![255, 0, 0, 255]);

    let pixels = ctx
        .read_pixels_as(0, 0, 1, 1, gl::RGBA, gl::FLOAT)
        .expect("readPixels");
    assert!(pixels.is_empty());
    assert_eq!(ctx.get_error(), GlError::InvalidEnum);
}

#[test]
fn test_frame_swap_without_preserve_exposes_cleared_buffer() {
    let (mut ctx, _) = make_context(&test_config());

    ctx.begin_frame();
    ctx.clear_color(1.0, 0.0, 0.0, 1.0).expect("clearColor");
    ctx.clear(gl::COLOR_BUFFER_BIT).expect("clear");
    ctx.end_frame();

    let (texture, size) = ctx.display_texture().expect("frame displayed");
    assert!(!texture.is_null());
    assert_eq!(size, SurfaceSize::new(8, 8));
    assert_eq!(ctx.stats().snapshot().frames_finalized, 1);

    let pixels = ctx.read_pixels(0, 0, 1, 1).expect("readPixels");
    assert_eq!(pixels, vec![0, 0, 0, 0]);
}

#[test]
fn test_frame_swap_with_preserve_keeps_contents() {
    let mut config = test_config();
    config.context.preserve_drawing_buffer = true;
    let (mut ctx, probe) = make_context(&config);

    ctx.begin_frame();
    ctx.clear_color(1.0, 0.0, 0.0, 1.0).expect("clearColor");
    ctx.clear(gl::COLOR_BUFFER_BIT).expect("clear");
    ctx.end_frame();

    assert!(probe
        .calls()
        .iter()
        .any(|c| matches!(c, DriverCall::CopySurface { .. })));
    let pixels = ctx.read_pixels(0, 0, 1, 1).expect("readPixels");
    assert_eq!(pixels, vec![255, 0, 0, 255]);
}

#[test]
fn test_unpremultiplied_content_is_multiplied_on_readback_and_finalize() {
    let mut config = test_config();
    config.context.premultiplied_alpha = false;
    let (mut ctx, probe) = make_context(&config);

    ctx.begin_frame();
    ctx.clear_color(1.0, 1.0, 1.0, 0.5).expect("clearColor");
    ctx.clear(gl::COLOR_BUFFER_BIT).expect("clear");

    let pixels = ctx.read_pixels(0, 0, 1, 1).expect("readPixels");
    assert_eq!(pixels, vec![128, 128, 128, 128]);

    probe.clear();
    ctx.end_frame();
    let passes: Vec<DriverCall> = probe
        .calls()
        .into_iter()
        .filter(|c| {
            matches!(
                c,
                DriverCall::PremultiplyAlpha { .. } | DriverCall::Flush | DriverCall::Finish
            )
        })
        .collect();
    assert_eq!(passes.len(), 3, "calls: {:?}", passes);
    assert!(matches!(passes[0], DriverCall::PremultiplyAlpha { .. }));
    assert_eq!(passes[1], DriverCall::Flush);
    assert_eq!(passes[2], DriverCall::Finish);
}

#[test]
fn test_shader_program_queries() {
    let (mut ctx, _) = make_context(&test_config());

    let vs = ctx.create_shader(gl::VERTEX_SHADER).expect("vs");
    let fs = ctx.create_shader(gl::FRAGMENT_SHADER).expect("fs");
    ctx.shader_source(&vs, "void main() { gl_Position = vec4(0.0); }")
        .expect("source");
    ctx.shader_source(&fs, "#error not today").expect("source");
    ctx.compile_shader(&vs).expect("compile");
    ctx.compile_shader(&fs).expect("compile");

    match ctx.get_shader_parameter(&vs, gl::COMPILE_STATUS) {
        Ok(Some(SyncValue::Bool(true))) => {}
        other => panic!("expected compiled vertex shader, got {:?}", other),
    }
    match ctx.get_shader_parameter(&fs, gl::COMPILE_STATUS) {
        Ok(Some(SyncValue::Bool(false))) => {}
        other => panic!("expected failed fragment shader, got {:?}", other),
    }
    let log = ctx.get_shader_info_log(&fs).expect("log").unwrap_or_default();
    assert!(!log.is_empty());

    let program = ctx.create_program().expect("program");
    ctx.attach_shader(&program, &vs).expect("attach");
    ctx.attach_shader(&program, &fs).expect("attach");
    ctx.link_program(&program).expect("link");
    match ctx.get_program_parameter(&program, gl::LINK_STATUS) {
        Ok(Some(SyncValue::Bool(false))) => {}
        other => panic!("expected link failure, got {:?}", other),
    }
    match ctx.get_program_parameter(&program, gl::ATTACHED_SHADERS) {
        Ok(Some(SyncValue::Int(2))) => {}
        other => panic!("expected two attached shaders, got {:?}", other),
    }

    assert!(ctx.is_resource(&program).expect("isProgram"));
    ctx.delete(&program);
    assert!(!ctx.is_resource(&program).expect("isProgram"));
    assert_eq!(ctx.get_error(), GlError::NoError);
}

#[test]
fn test_uniforms_round_trip_through_locations() {
    let (mut ctx, _) = make_context(&test_config());

    let vs = ctx.create_shader(gl::VERTEX_SHADER).expect("vs");
    let fs = ctx.create_shader(gl::FRAGMENT_SHADER).expect("fs");
    ctx.shader_source(&vs, "void main() {}").expect("source");
    ctx.shader_source(&fs, "void main() {}").expect("source");
    ctx.compile_shader(&vs).expect("compile");
    ctx.compile_shader(&fs).expect("compile");
    let program = ctx.create_program().expect("program");
    ctx.attach_shader(&program, &vs).expect("attach");
    ctx.attach_shader(&program, &fs).expect("attach");
    ctx.link_program(&program).expect("link");
    ctx.use_program(Some(&program)).expect("use");

    let location = ctx
        .get_uniform_location(&program, "u_color")
        .expect("location")
        .expect("valid program");
    ctx.uniform4f(Some(&location), [0.25, 0.5, 0.75, 1.0])
        .expect("uniform4f");

    match ctx.get_uniform(&program, &location) {
        Ok(Some(SyncValue::Floats(values))) => assert_eq!(values, vec![0.25, 0.5, 0.75, 1.0]),
        other => panic!("expected uniform values, got {:?}", other),
    }
    ctx.draw_arrays(gl::TRIANGLES, 0, 3).expect("draw");
    ctx.finish().expect("finish");
    assert_eq!(ctx.get_error(), GlError::NoError);
    ctx.scheduler()
        .with_renderer(|r| assert_eq!(r.driver().draw_calls(), 1));
}

#[test]
fn test_queue_full_flushes_through_the_execution_plane() {
    let mut config = test_config();
    config.queue.initial_capacity = 4;
    config.queue.max_capacity = 8;
    let (mut ctx, probe) = make_context(&config);

    for _ in 0..20 {
        ctx.clear(gl::COLOR_BUFFER_BIT).expect("clear");
    }
    assert!(ctx.queue().queued_count() <= 8);
    ctx.finish().expect("finish");

    let clears = probe
        .issued()
        .into_iter()
        .filter(|op| *op == Opcode::Clear)
        .count();
    assert_eq!(clears, 20);
    let snapshot = ctx.stats().snapshot();
    assert_eq!(snapshot.queue_full_signals, 2);
    assert_eq!(snapshot.records_dropped, 0);
}

struct FakeLayer {
    texture: AtomicU32,
}

impl HostTextureProvider for FakeLayer {
    fn current_texture(&self) -> NativeHandle {
        NativeHandle(self.texture.load(Ordering::SeqCst))
    }
}

#[test]
fn test_host_texture_follows_provider() {
    let (mut ctx, probe) = make_context(&test_config());

    let layer = Arc::new(FakeLayer {
        texture: AtomicU32::new(900),
    });
    let provider: Arc<dyn HostTextureProvider> = layer.clone();
    let host = ctx.bind_host_texture(&provider).expect("host texture");

    ctx.bind_texture(gl::TEXTURE_2D, Some(&host)).expect("bind");
    ctx.finish().expect("finish");
    assert_eq!(ctx.queue().table().resolve(host.handle()), NativeHandle(900));

    layer.texture.store(901, Ordering::SeqCst);
    ctx.bind_texture(gl::TEXTURE_2D, Some(&host)).expect("bind");
    ctx.finish().expect("finish");

    let binds: Vec<NativeHandle> = probe
        .resource_calls()
        .into_iter()
        .filter_map(|c| match c {
            DriverCall::Bind {
                kind: ResourceKind::HostTexture,
                native,
                ..
            } => Some(native),
            _ => None,
        })
        .collect();
    assert_eq!(binds, vec![NativeHandle(900), NativeHandle(901)]);

    // Once the provider is gone the binding is evicted
    drop(provider);
    drop(layer);
    ctx.finish().expect("finish");
    assert!(!ctx.queue().table().contains(host.handle()));
    assert_eq!(ctx.get_error(), GlError::NoError);
}

#[test]
fn test_lose_and_restore_invalidates_old_objects() {
    let (mut ctx, probe) = make_context(&test_config());

    let buffer = ctx.create_buffer().expect("buffer");
    let texture = ctx.create_texture().expect("texture");
    ctx.finish().expect("finish");
    let old_native = ctx.queue().table().resolve(buffer.handle());
    assert!(!old_native.is_null());

    probe.clear();
    ctx.lose_context();
    assert_eq!(ctx.state(), LifecycleState::Lost);
    assert_eq!(ctx.queue().table().resolve(buffer.handle()), NativeHandle::NULL);

    let deleted: Vec<ResourceKind> = probe
        .resource_calls()
        .into_iter()
        .filter_map(|c| match c {
            DriverCall::Delete { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(deleted, vec![ResourceKind::Buffer, ResourceKind::Texture]);

    // Everything is a silent no-op while lost
    assert!(matches!(ctx.create_buffer(), Err(ContextError::ContextLost)));
    ctx.bind_buffer(gl::ARRAY_BUFFER, Some(&buffer)).expect("no-op");
    assert!(matches!(ctx.finish(), Err(ContextError::ContextLost)));
    assert_eq!(ctx.get_error(), GlError::ContextLost);
    assert_eq!(ctx.get_error(), GlError::NoError);

    ctx.restore(SurfaceSize::new(8, 8)).expect("restore");
    assert_eq!(ctx.state(), LifecycleState::Restoring);

    ctx.bind_texture(gl::TEXTURE_2D, Some(&texture)).expect("bind");
    let fresh = ctx.create_buffer().expect("buffer");
    ctx.bind_buffer(gl::ARRAY_BUFFER, Some(&fresh)).expect("bind");
    ctx.finish().expect("finish");

    assert_eq!(ctx.state(), LifecycleState::Alive);
    assert_eq!(ctx.get_error(), GlError::InvalidOperation);
    assert_eq!(ctx.get_error(), GlError::NoError);
    assert!(!ctx.queue().table().resolve(fresh.handle()).is_null());
    assert_eq!(ctx.stats().snapshot().payloads_outstanding, 0);
}

#[test]
fn test_host_texture_resolution_is_announced_after_the_frame() {
    let (mut ctx, _) = make_context(&test_config());
    ctx.finish().expect("finish");
    ctx.poll_notifications();

    let layer = Arc::new(FakeLayer {
        texture: AtomicU32::new(900),
    });
    let provider: Arc<dyn HostTextureProvider> = layer.clone();
    let host = ctx.bind_host_texture(&provider).expect("host texture");

    ctx.bind_texture(gl::TEXTURE_2D, Some(&host)).expect("bind");
    ctx.begin_frame();
    ctx.clear(gl::COLOR_BUFFER_BIT).expect("clear");
    ctx.end_frame();

    let notifications = ctx.poll_notifications();
    let resolved = notifications
        .iter()
        .position(|n| *n == Notification::ResourceResolved(host.handle()))
        .unwrap_or_else(|| panic!("expected ResourceResolved, got {:?}", notifications));
    let ready = notifications
        .iter()
        .position(|n| matches!(n, Notification::TextureReady { .. }))
        .unwrap_or_else(|| panic!("expected TextureReady, got {:?}", notifications));
    assert!(ready < resolved, "notifications: {:?}", notifications);

    // Polling drains the buffer
    assert!(ctx.poll_notifications().is_empty());

    // An unchanged provider texture is not announced again
    ctx.begin_frame();
    ctx.bind_texture(gl::TEXTURE_2D, Some(&host)).expect("bind");
    ctx.end_frame();
    assert!(!ctx
        .poll_notifications()
        .iter()
        .any(|n| matches!(n, Notification::ResourceResolved(_))));
}

#[test]
fn test_read_pixels_clips_to_the_framebuffer() {
    let (mut ctx, _) = make_context(&test_config());

    ctx.clear_color(1.0, 0.0, 0.0, 1.0).expect("clearColor");
    ctx.clear(gl::COLOR_BUFFER_BIT).expect("clear");

    let pixels = ctx.read_pixels(i32::MAX, 0, 2, 1).expect("readPixels");
    assert_eq!(pixels, vec![0; 8]);
    assert_eq!(ctx.get_error(), GlError::NoError);

    let pixels = ctx.read_pixels(-1, -1, 2, 2).expect("readPixels");
    assert_eq!(
        pixels,
        vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 255, 0, 0, 255]
    );

    let pixels = ctx.read_pixels(i32::MIN, i32::MIN, 4, 4).expect("readPixels");
    assert_eq!(pixels, vec![0; 64]);
    assert_eq!(ctx.get_error(), GlError::NoError);
}

#[test]
fn test_oversized_read_pixels_is_rejected() {
    let (mut ctx, _) = make_context(&test_config());

    let pixels = ctx.read_pixels(0, 0, i32::MAX, 1).expect("readPixels");
    assert!(pixels.is_empty());
    assert_eq!(ctx.get_error(), GlError::InvalidValue);

    let pixels = ctx.read_pixels(0, 0, 1, 1).expect("readPixels");
    assert_eq!(pixels.len(), 4);
    assert_eq!(ctx.get_error(), GlError::NoError);
}

#[test]
fn test_tex_sub_image_past_the_texture_edge_is_invalid() {
    let (mut ctx, _) = make_context(&test_config());

    let texture = ctx.create_texture().expect("texture");
    ctx.bind_texture(gl::TEXTURE_2D, Some(&texture)).expect("bind");
    ctx.tex_image_2d(2, 2, None).expect("texImage2D");

    for (x, y) in [(i32::MAX, 0), (0, i32::MAX), (1, 1)] {
        let width = if (x, y) == (1, 1) { 2 } else { 1 };
        ctx.enqueue(
            Opcode::TexSubImage2D,
            &[
                Value::Uint(gl::TEXTURE_2D),
                Value::Int(0),
                Value::Int(x),
                Value::Int(y),
                Value::Int(width),
                Value::Int(1),
                Value::Uint(gl::RGBA),
                Value::Uint(gl::UNSIGNED_BYTE),
            ],
            Some(vec![0; width as usize * 4]),
        )
        .expect("texSubImage2D");
        assert_eq!(ctx.get_error(), GlError::InvalidValue, "offset {},{}", x, y);
    }

    ctx.enqueue(
        Opcode::TexSubImage2D,
        &[
            Value::Uint(gl::TEXTURE_2D),
            Value::Int(0),
            Value::Int(1),
            Value::Int(1),
            Value::Int(1),
            Value::Int(1),
            Value::Uint(gl::RGBA),
            Value::Uint(gl::UNSIGNED_BYTE),
        ],
        Some(vec![9; 4]),
    )
    .expect("texSubImage2D");
    assert_eq!(ctx.get_error(), GlError::NoError);
}

#[test]
fn test_resize_replaces_the_display_surface() {
    let (mut ctx, probe) = make_context(&test_config());
    ctx.begin_frame();
    ctx.end_frame();
    let (old_texture, old_size) = ctx.display_texture().expect("display");
    assert_eq!(old_size, SurfaceSize::new(8, 8));
    ctx.poll_notifications();

    ctx.resize(SurfaceSize::new(16, 16)).expect("resize");

    let (texture, size) = ctx.display_texture().expect("display");
    assert_eq!(size, SurfaceSize::new(16, 16));
    assert_ne!(texture, old_texture);
    match ctx.poll_notifications().as_slice() {
        [Notification::TextureReady { size, .. }] => assert_eq!(*size, SurfaceSize::new(16, 16)),
        other => panic!("expected a single TextureReady, got {:?}", other),
    }
    assert_eq!(ctx.state(), LifecycleState::Alive);

    ctx.clear_color(0.0, 1.0, 0.0, 1.0).expect("clearColor");
    ctx.clear(gl::COLOR_BUFFER_BIT).expect("clear");
    let pixels = ctx.read_pixels(15, 15, 1, 1).expect("readPixels");
    assert_eq!(pixels, vec![0, 255, 0, 255]);
    assert_eq!(ctx.get_error(), GlError::NoError);

    // Same size again is a no-op
    probe.clear();
    ctx.resize(SurfaceSize::new(16, 16)).expect("resize");
    ctx.finish().expect("finish");
    assert!(!probe
        .calls()
        .iter()
        .any(|c| matches!(c, DriverCall::CreateSurface { .. })));
}

#[test]
fn test_failed_resize_keeps_previous_surfaces() {
    let (mut ctx, probe) = make_context(&test_config());
    ctx.begin_frame();
    ctx.end_frame();
    ctx.clear_color(0.0, 0.0, 1.0, 1.0).expect("clearColor");
    ctx.clear(gl::COLOR_BUFFER_BIT).expect("clear");
    ctx.finish().expect("finish");
    let before = ctx.display_texture();
    assert!(before.is_some());
    ctx.poll_notifications();

    probe.clear();
    probe.fail_surface_creation(1);
    ctx.resize(SurfaceSize::new(32, 32)).expect("resize");

    assert_eq!(ctx.display_texture(), before);
    assert!(ctx.poll_notifications().is_empty());

    let created: Vec<_> = probe
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            DriverCall::CreateSurface { surface, .. } => Some(surface),
            _ => None,
        })
        .collect();
    let destroyed: Vec<_> = probe
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            DriverCall::DestroySurface(surface) => Some(surface),
            _ => None,
        })
        .collect();
    assert_eq!(created.len(), 1);
    assert_eq!(destroyed, created);

    // The old render surface is still bound and keeps its contents
    let pixels = ctx.read_pixels(7, 7, 1, 1).expect("readPixels");
    assert_eq!(pixels, vec![0, 0, 255, 255]);
    assert_eq!(ctx.get_error(), GlError::OutOfMemory);
    assert_eq!(ctx.get_error(), GlError::NoError);
}

#[test]
fn test_exclusive_frames_are_timed() {
    let (mut ctx, _) = make_context(&test_config());

    for _ in 0..3 {
        ctx.begin_frame();
        ctx.clear(gl::COLOR_BUFFER_BIT).expect("clear");
        ctx.end_frame();
    }
    ctx.finish().expect("finish");

    let snapshot = ctx.stats().snapshot();
    assert_eq!(snapshot.frames_finalized, 3);
    assert_eq!(snapshot.frames_timed, 3);
}
