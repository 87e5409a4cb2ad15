use std::sync::Arc;

use cgmath::{Matrix4, Point3, Quaternion, SquareMatrix, Vector3};
use forge_render::{
    RenderParams, RenderSettings, RenderSystem, RenderTarget,
    batches::BatchKey,
    data_structures::{
        InstanceId, MaterialId, MeshId, SkeletonId, SkyboxId, TextureId,
        instance::DrawInstance,
        light::Light,
        material::{Material, ShaderKind, SurfaceKind},
        model::{Mesh, Skeleton, SkinnedVertex, SubMesh, VertexData},
        particle::{IndirectArgs, Particle, ParticleBlend, ParticleEmitter, ParticleFacing},
        texture::{Skybox, TextureResource},
    },
    gpu::{BufferHandle, GpuDevice, PipelineKey, TextureDesc, TextureKind, UniformBlock},
    render::{DrawCommand, PassKind},
    stages::{
        DebugStage, OpaqueStage, ParticleStage, RenderStage, SkyboxStage, StageKind, TransparentStage,
        particle::PARTICLE_QUAD_VERTICES,
    },
};

use crate::common::test_utils::{
    DeviceCall, RecordingDevice, TestScene, camera, initialized_system, render_frame, small_settings,
};

mod common;

fn cube() -> Arc<Mesh> {
    Arc::new(Mesh::cube(MeshId(1)))
}

/// The unit cube with every vertex bound to joint 0.
fn skinned_cube() -> Arc<Mesh> {
    let cube = Mesh::cube(MeshId(2));
    let submeshes = cube
        .submeshes
        .into_iter()
        .map(|submesh| {
            let vertices = match submesh.vertices {
                VertexData::Static(vertices) => vertices
                    .into_iter()
                    .map(|v| SkinnedVertex {
                        position: v.position,
                        tex_coords: v.tex_coords,
                        normal: v.normal,
                        joints: [0; 4],
                        weights: [1.0, 0.0, 0.0, 0.0],
                    })
                    .collect(),
                VertexData::Skinned(vertices) => vertices,
            };
            SubMesh {
                vertices: VertexData::Skinned(vertices),
                indices: submesh.indices,
            }
        })
        .collect();
    Arc::new(Mesh::new(MeshId(2), "skinned cube", submeshes))
}

fn material(id: u64, shader: ShaderKind, surface: SurfaceKind) -> Arc<Material> {
    Arc::new(Material::new(MaterialId(id), format!("material {id}"), shader, surface))
}

fn system_with_cube() -> RenderSystem<RecordingDevice> {
    let mut system = initialized_system(small_settings());
    assert_eq!(system.create_mesh(&cube()), 1);
    system
}

fn particle(x: f32, y: f32, z: f32) -> Particle {
    Particle {
        position: Point3::new(x, y, z),
        rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
        size: 0.5,
        colour: [1.0, 0.5, 0.0, 1.0],
    }
}

/// Instance ids of the mesh draws of a pass, in recorded order.
fn mesh_draws(commands: &[DrawCommand]) -> Vec<InstanceId> {
    commands
        .iter()
        .filter_map(|command| match command {
            DrawCommand::Mesh(draw) => Some(draw.instance_id),
            _ => None,
        })
        .collect()
}

#[test]
fn default_stages_are_called_in_default_order() {
    let system = initialized_system(small_settings());
    assert_eq!(
        system.call_order(),
        vec![
            StageKind::Opaque,
            StageKind::Skybox,
            StageKind::Transparent,
            StageKind::Particle,
            StageKind::Debug,
        ]
    );
    assert!(system.device().shared.is_some());
    assert!(system.device().pipelines.contains(&PipelineKey::Composite));
    assert!(system.device().pipelines.contains(&PipelineKey::Skybox));
}

#[test]
fn empty_scene_clears_and_composites() {
    let mut system = initialized_system(small_settings());
    render_frame(&mut system, &TestScene::new());

    let frame = system.device().last_frame().expect("executed");
    assert_eq!(frame.target, RenderTarget::Surface);
    assert_eq!(frame.passes.len(), 2);
    assert!(matches!(frame.passes[0].kind, PassKind::Colour { .. }));
    assert!(frame.passes[0].commands.is_empty());
    assert!(matches!(frame.passes[1].kind, PassKind::Composite { exposure } if exposure == 1.0));
    assert_eq!(system.stats().frame, 1);
    assert_eq!(system.stats().draw_calls, 0);
}

#[test]
fn opaque_pbr_instance_is_drawn_by_the_opaque_stage() {
    let mut system = system_with_cube();
    let pbr = material(1, ShaderKind::Pbr, SurfaceKind::Opaque);
    system.register_instance(DrawInstance::mesh(InstanceId(1), cube(), Some(pbr)));
    render_frame(&mut system, &TestScene::new());

    let key = BatchKey::new(SurfaceKind::Opaque, ShaderKind::Pbr, false);
    let opaque = system.stage::<OpaqueStage>().expect("opaque stage");
    assert_eq!(opaque.drawn(), &[(key, InstanceId(1))]);
    assert!(system
        .stage::<TransparentStage>()
        .expect("transparent stage")
        .sorted()
        .is_empty());

    let colour = system.last_frame().colour_pass().expect("colour pass");
    assert_eq!(
        colour.commands[0],
        DrawCommand::BindPipeline(PipelineKey::Mesh {
            shader: ShaderKind::Pbr,
            skinned: false,
            translucent: false,
        })
    );
    assert_eq!(mesh_draws(&colour.commands), vec![InstanceId(1)]);
    assert_eq!(system.last_frame().instances.len(), 1);
}

#[test]
fn translucent_instances_draw_after_opaque_ones_farthest_first() {
    let mut system = system_with_cube();
    let glass = material(1, ShaderKind::Lit, SurfaceKind::Translucent);
    let solid = material(2, ShaderKind::Lit, SurfaceKind::Opaque);
    let mut scene = TestScene::new();
    // Squared camera distances 4, 1, 9, 1.
    for (id, z) in [(1, 8.0), (2, 9.0), (3, 7.0), (4, 9.0)] {
        system.register_instance(DrawInstance::mesh(InstanceId(id), cube(), Some(glass.clone())));
        scene.place(InstanceId(id), 0.0, 0.0, z);
    }
    system.register_instance(DrawInstance::mesh(InstanceId(10), cube(), Some(solid)));
    scene.place(InstanceId(10), 0.0, 0.0, -20.0);
    render_frame(&mut system, &scene);

    let sorted: Vec<(InstanceId, f32)> = system
        .stage::<TransparentStage>()
        .expect("transparent stage")
        .sorted()
        .to_vec();
    assert_eq!(
        sorted,
        vec![
            (InstanceId(3), 9.0),
            (InstanceId(1), 4.0),
            (InstanceId(2), 1.0),
            (InstanceId(4), 1.0),
        ]
    );

    let colour = system.last_frame().colour_pass().expect("colour pass");
    assert_eq!(
        mesh_draws(&colour.commands),
        vec![InstanceId(10), InstanceId(3), InstanceId(1), InstanceId(2), InstanceId(4)]
    );
}

#[test]
fn opaque_and_translucent_instances_share_one_frame_in_stage_order() {
    let mut system = system_with_cube();
    let pbr = material(1, ShaderKind::Pbr, SurfaceKind::Opaque);
    let glass = material(2, ShaderKind::Lit, SurfaceKind::Translucent);
    system.register_instance(DrawInstance::mesh(InstanceId(1), cube(), Some(pbr)));
    system.register_instance(DrawInstance::mesh(InstanceId(2), cube(), Some(glass)));
    let mut scene = TestScene::new();
    scene.place(InstanceId(1), 0.0, 0.0, -5.0);
    scene.place(InstanceId(2), 0.0, 0.0, 5.0);
    render_frame(&mut system, &scene);

    let key = BatchKey::new(SurfaceKind::Opaque, ShaderKind::Pbr, false);
    assert_eq!(
        system.stage::<OpaqueStage>().expect("opaque stage").drawn(),
        &[(key, InstanceId(1))]
    );
    let sorted = system
        .stage::<TransparentStage>()
        .expect("transparent stage")
        .sorted()
        .to_vec();
    assert_eq!(sorted, vec![(InstanceId(2), 25.0)]);

    let colour = system.last_frame().colour_pass().expect("colour pass");
    let binds: Vec<PipelineKey> = colour
        .commands
        .iter()
        .filter_map(|command| match command {
            DrawCommand::BindPipeline(key) => Some(*key),
            _ => None,
        })
        .collect();
    assert_eq!(
        binds,
        vec![
            PipelineKey::Mesh {
                shader: ShaderKind::Pbr,
                skinned: false,
                translucent: false,
            },
            PipelineKey::Mesh {
                shader: ShaderKind::Lit,
                skinned: false,
                translucent: true,
            },
        ]
    );
    assert_eq!(mesh_draws(&colour.commands), vec![InstanceId(1), InstanceId(2)]);
    assert_eq!(system.stats().draw_calls, 2);
}

#[test]
fn inactive_instances_are_not_drawn() {
    let mut system = system_with_cube();
    system.register_instance(DrawInstance::mesh(InstanceId(1), cube(), None));
    system.register_instance(DrawInstance::mesh(InstanceId(2), cube(), None));
    let mut scene = TestScene::new();
    scene.inactive.insert(InstanceId(2));
    render_frame(&mut system, &scene);

    let colour = system.last_frame().colour_pass().expect("colour pass");
    assert_eq!(mesh_draws(&colour.commands), vec![InstanceId(1)]);
}

#[test]
fn instance_rows_carry_transform_and_albedo_slot() {
    let mut system = system_with_cube();
    let albedo = Arc::new(TextureResource::solid(
        TextureId(3),
        "bricks",
        4,
        [200, 100, 50, 255],
    ));
    let textured = Arc::new(
        Material::new(MaterialId(1), "bricks", ShaderKind::Lit, SurfaceKind::Opaque)
            .with_albedo(albedo.clone()),
    );
    let slot = system.create_texture(&albedo).expect("slot");
    system.register_instance(DrawInstance::mesh(InstanceId(1), cube(), Some(textured)));
    system.register_instance(DrawInstance::mesh(InstanceId(2), cube(), None));
    let mut scene = TestScene::new();
    scene.place(InstanceId(1), 1.0, 2.0, 3.0);
    render_frame(&mut system, &scene);

    let frame = system.last_frame();
    let colour = frame.colour_pass().expect("colour pass");
    let row_of = |id: InstanceId| {
        colour
            .commands
            .iter()
            .find_map(|command| match command {
                DrawCommand::Mesh(draw) if draw.instance_id == id => Some(draw.instance as usize),
                _ => None,
            })
            .expect("drawn")
    };
    let textured_row = frame.instances[row_of(InstanceId(1))];
    assert_eq!(textured_row.albedo_layer(), Some(slot));
    assert_eq!(
        textured_row.model(),
        Matrix4::from_translation(Vector3::new(1.0, 2.0, 3.0))
    );
    let plain_row = frame.instances[row_of(InstanceId(2))];
    assert_eq!(plain_row.albedo_layer(), None);
    assert_eq!(plain_row.model(), Matrix4::identity());
}

#[test]
fn each_shadow_view_gets_a_depth_pass() {
    let mut system = system_with_cube();
    system.register_instance(DrawInstance::mesh(InstanceId(1), cube(), None));
    let glass = material(1, ShaderKind::Unlit, SurfaceKind::Translucent);
    system.register_instance(DrawInstance::mesh(InstanceId(2), cube(), Some(glass)));
    let mut scene = TestScene::new();
    scene.lights = vec![
        Light::directional(Vector3::new(-1.0, -1.0, -0.5)).with_shadows(),
        Light::point(Point3::new(0.0, 3.0, 0.0), 10.0).with_shadows(),
        Light::spot(Point3::new(2.0, 4.0, 0.0), Vector3::new(0.0, -1.0, 0.0), 0.6, 15.0).with_shadows(),
        Light::point(Point3::new(5.0, 1.0, 0.0), 5.0),
    ];
    render_frame(&mut system, &scene);

    let frame = system.last_frame();
    assert_eq!(frame.shadow_passes().count(), 4 + 6 + 1);
    assert_eq!(frame.shadow_views.len(), 11);
    for pass in frame.shadow_passes() {
        // Only the opaque instance casts.
        assert_eq!(mesh_draws(&pass.commands), vec![InstanceId(1)]);
        assert_eq!(
            pass.commands[0],
            DrawCommand::BindPipeline(PipelineKey::ShadowDepth { skinned: false })
        );
    }
    let colour_at = frame
        .passes
        .iter()
        .position(|pass| matches!(pass.kind, PassKind::Colour { .. }))
        .expect("colour pass");
    assert_eq!(colour_at, 11);

    let shadows = system.shadows().expect("initialized");
    let point_maps = shadows.point_maps();
    let point_layers: Vec<u32> = frame
        .shadow_passes()
        .filter_map(|pass| match pass.kind {
            PassKind::ShadowDepth { target, layer, .. } if target == point_maps => Some(layer),
            _ => None,
        })
        .collect();
    // The point light holds light slot 1.
    assert_eq!(point_layers, (6..12).collect::<Vec<_>>());

    let directional = &shadows.lights()[0];
    assert_eq!(directional.matrices.len(), 4);
    assert_eq!(directional.splits.len(), 4);
    approx::assert_abs_diff_eq!(directional.splits[3], 100.0, epsilon = 1e-3);
}

#[test]
fn disabling_shadows_skips_depth_passes() {
    let mut system = system_with_cube();
    system.register_instance(DrawInstance::mesh(InstanceId(1), cube(), None));
    let mut scene = TestScene::new();
    scene.lights = vec![Light::directional(Vector3::new(0.0, -1.0, 0.0)).with_shadows()];
    render_frame(&mut system, &scene);
    assert_eq!(system.last_frame().shadow_passes().count(), 4);

    system.configure(|settings| settings.shadows_enabled = false);
    render_frame(&mut system, &scene);
    assert_eq!(system.last_frame().shadow_passes().count(), 0);
    let shadows = &system.device().uniforms[&UniformBlock::Shadows];
    assert!(shadows.iter().all(|byte| *byte == 0));
}

#[test]
fn skinned_pose_is_uploaded_before_drawing() {
    let mut system = system_with_cube();
    let skeleton = Arc::new(Skeleton::new(SkeletonId(1), 2));
    let record = system.create_skeleton(&skeleton).expect("fits");
    assert_eq!(system.create_mesh(&skinned_cube()), 1);
    system.register_instance(DrawInstance::skinned(InstanceId(1), skinned_cube(), None, skeleton));
    let moved = Matrix4::from_translation(Vector3::new(0.0, 1.0, 0.0));
    let mut scene = TestScene::new();
    scene.poses.insert(SkeletonId(1), vec![moved, moved]);
    render_frame(&mut system, &scene);

    let arena = system.registry().expect("initialized").arena().buffer();
    let contents = &system.device().buffers[&arena];
    let start = record.joints.byte_offset as usize;
    let expected: [[f32; 4]; 4] = moved.into();
    assert_eq!(&contents[start..start + 64], bytemuck::bytes_of(&expected));

    let colour = system.last_frame().colour_pass().expect("colour pass");
    assert!(colour.commands.contains(&DrawCommand::BindPipeline(PipelineKey::Mesh {
        shader: ShaderKind::Unlit,
        skinned: true,
        translucent: false,
    })));
    assert_eq!(mesh_draws(&colour.commands), vec![InstanceId(1)]);
}

#[test]
fn submeshes_are_only_drawn_under_a_matching_vertex_layout() {
    let mut system = system_with_cube();
    assert_eq!(system.create_mesh(&skinned_cube()), 1);
    let skeleton = Arc::new(Skeleton::new(SkeletonId(1), 1));
    system.create_skeleton(&skeleton).expect("fits");
    // Static vertices under a skinned instance and the reverse.
    system.register_instance(DrawInstance::skinned(InstanceId(1), cube(), None, skeleton));
    system.register_instance(DrawInstance::mesh(InstanceId(2), skinned_cube(), None));
    render_frame(&mut system, &TestScene::new());

    let colour = system.last_frame().colour_pass().expect("colour pass");
    assert!(mesh_draws(&colour.commands).is_empty());
    assert_eq!(system.stats().draw_calls, 0);
}

#[test]
fn equally_distant_translucent_instances_keep_registration_order() {
    let mut system = system_with_cube();
    assert_eq!(system.create_mesh(&skinned_cube()), 1);
    let skeleton = Arc::new(Skeleton::new(SkeletonId(1), 1));
    system.create_skeleton(&skeleton).expect("fits");
    let glass = material(1, ShaderKind::Lit, SurfaceKind::Translucent);
    system.register_instance(DrawInstance::skinned(
        InstanceId(1),
        skinned_cube(),
        Some(glass.clone()),
        skeleton,
    ));
    system.register_instance(DrawInstance::mesh(InstanceId(2), cube(), Some(glass)));
    render_frame(&mut system, &TestScene::new());

    let order: Vec<InstanceId> = system
        .stage::<TransparentStage>()
        .expect("transparent stage")
        .sorted()
        .iter()
        .map(|(id, _)| *id)
        .collect();
    assert_eq!(order, vec![InstanceId(1), InstanceId(2)]);
    let colour = system.last_frame().colour_pass().expect("colour pass");
    assert_eq!(mesh_draws(&colour.commands), vec![InstanceId(1), InstanceId(2)]);
}

#[test]
fn attached_skybox_is_drawn_until_detached() {
    let mut system = initialized_system(small_settings());
    let skybox = Skybox::gradient(SkyboxId(1), 4, [40, 80, 200, 255], [255, 255, 255, 255]);
    system.attach_new_skybox(&skybox);
    render_frame(&mut system, &TestScene::new());

    let cubemap = system
        .registry()
        .and_then(|registry| registry.skybox(SkyboxId(1)))
        .expect("resident")
        .cubemap;
    assert!(system.stage::<SkyboxStage>().expect("skybox stage").drawn());
    let colour = system.last_frame().colour_pass().expect("colour pass");
    assert!(colour.commands.contains(&DrawCommand::Skybox { cubemap }));

    system.remove_skybox(SkyboxId(1));
    assert_eq!(system.attached_skybox(), None);
    assert!(system
        .device()
        .calls
        .contains(&DeviceCall::BindSkybox(None)));
    render_frame(&mut system, &TestScene::new());
    assert!(!system.stage::<SkyboxStage>().expect("skybox stage").drawn());
}

#[test]
fn particles_become_indirect_draws() {
    let mut system = initialized_system(small_settings());
    let mut scene = TestScene::new();
    system.register_emitter(ParticleEmitter::new(InstanceId(1), ParticleBlend::Opaque, ParticleFacing::Billboard));
    system.register_emitter(ParticleEmitter::new(InstanceId(2), ParticleBlend::Opaque, ParticleFacing::Oriented));
    system.register_emitter(ParticleEmitter::new(InstanceId(3), ParticleBlend::Blended, ParticleFacing::Billboard));
    system.register_emitter(ParticleEmitter::new(InstanceId(4), ParticleBlend::Opaque, ParticleFacing::Billboard));
    scene.particles.insert(InstanceId(1), vec![particle(0.0, 0.0, 0.0); 3]);
    scene.particles.insert(InstanceId(2), vec![particle(1.0, 0.0, 0.0); 2]);
    scene.particles.insert(
        InstanceId(3),
        vec![particle(0.0, 0.0, 9.0), particle(0.0, 0.0, 0.0), particle(0.0, 0.0, 5.0)],
    );
    scene.particles.insert(InstanceId(4), vec![particle(2.0, 0.0, 0.0); 4]);
    scene.inactive.insert(InstanceId(4));
    render_frame(&mut system, &scene);

    let stage = system.stage::<ParticleStage>().expect("particle stage");
    assert_eq!(stage.opaque().len(), 5);
    assert!(stage.opaque()[0].is_billboard());
    assert!(!stage.opaque()[3].is_billboard());
    let distances: Vec<f32> = stage.blended().iter().map(|(_, d)| *d).collect();
    assert_eq!(distances, vec![100.0, 25.0, 1.0]);

    let colour = system.last_frame().colour_pass().expect("colour pass");
    let indirect: Vec<&Vec<IndirectArgs>> = colour
        .commands
        .iter()
        .filter_map(|command| match command {
            DrawCommand::MultiDrawIndirect { args, .. } => Some(args),
            _ => None,
        })
        .collect();
    assert_eq!(indirect.len(), 2);
    assert_eq!(
        indirect[0],
        &vec![
            IndirectArgs {
                vertex_count: PARTICLE_QUAD_VERTICES,
                instance_count: 3,
                first_vertex: 0,
                first_instance: 0,
            },
            IndirectArgs {
                vertex_count: PARTICLE_QUAD_VERTICES,
                instance_count: 2,
                first_vertex: 0,
                first_instance: 3,
            },
        ]
    );
    assert_eq!(indirect[1].len(), 1);
    assert_eq!(indirect[1][0].instance_count, 3);
}

#[test]
fn particles_beyond_capacity_are_dropped() {
    let mut system = initialized_system(RenderSettings {
        max_particles: 4,
        ..small_settings()
    });
    system.register_emitter(ParticleEmitter::new(InstanceId(1), ParticleBlend::Opaque, ParticleFacing::Billboard));
    let mut scene = TestScene::new();
    scene.particles.insert(InstanceId(1), vec![particle(0.0, 0.0, 0.0); 10]);
    render_frame(&mut system, &scene);

    let stage = system.stage::<ParticleStage>().expect("particle stage");
    assert_eq!(stage.opaque().len(), 4);
}

#[test]
fn debug_lines_last_one_frame() {
    let mut system = initialized_system(small_settings());
    {
        let debug = system.stage_mut::<DebugStage>().expect("debug stage");
        debug.add_line(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), [1.0, 0.0, 0.0, 1.0]);
        debug.add_box(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0), [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(debug.pending(), 2);
    }
    render_frame(&mut system, &TestScene::new());

    assert_eq!(system.stage::<DebugStage>().expect("debug stage").pending(), 0);
    let colour = system.last_frame().colour_pass().expect("colour pass");
    let lines: Vec<(u32, BufferHandle)> = colour
        .commands
        .iter()
        .filter_map(|command| match command {
            DrawCommand::Lines { buffer, vertex_count } => Some((*vertex_count, *buffer)),
            _ => None,
        })
        .collect();
    assert_eq!(lines.iter().map(|(count, _)| *count).collect::<Vec<_>>(), vec![2, 24]);
    for (_, buffer) in &lines {
        assert!(!system.device().buffers.contains_key(buffer));
    }

    render_frame(&mut system, &TestScene::new());
    let colour = system.last_frame().colour_pass().expect("colour pass");
    assert!(!colour
        .commands
        .iter()
        .any(|command| matches!(command, DrawCommand::Lines { .. })));
}

#[test]
fn stages_are_pushed_by_name_and_popped_last_first() {
    let mut system = RenderSystem::new(RecordingDevice::new(), small_settings());
    assert_eq!(system.push_render_pipeline_named("transparent", 0), Ok(0));
    assert_eq!(system.push_render_pipeline_named("Opaque", 0), Ok(0));
    assert_eq!(system.push_render_pipeline_named("debug", 100), Ok(2));
    assert!(system.push_render_pipeline_named("bloom", 0).is_err());
    system.initialize();

    assert_eq!(
        system.call_order(),
        vec![StageKind::Opaque, StageKind::Transparent, StageKind::Debug]
    );
    let popped = system.pop_render_pipeline(1);
    assert_eq!(popped[0].kind(), StageKind::Debug);
    assert_eq!(system.pop_render_pipeline(10).len(), 2);
    assert!(system.call_order().is_empty());

    render_frame(&mut system, &TestScene::new());
    assert_eq!(system.stats().frame, 1);
}

#[test]
fn failed_pipeline_does_not_stop_the_frame() {
    let broken = PipelineKey::Mesh {
        shader: ShaderKind::Pbr,
        skinned: false,
        translucent: false,
    };
    let mut system = RenderSystem::new(RecordingDevice::new().failing(broken), small_settings());
    system.initialize();
    system.create_mesh(&cube());
    system.register_instance(DrawInstance::mesh(
        InstanceId(1),
        cube(),
        Some(material(1, ShaderKind::Pbr, SurfaceKind::Opaque)),
    ));
    system.register_instance(DrawInstance::mesh(InstanceId(2), cube(), None));
    render_frame(&mut system, &TestScene::new());

    assert!(!system.device().pipelines.contains(&broken));
    assert!(system
        .device()
        .calls
        .contains(&DeviceCall::PreparePipeline(broken)));
    assert_eq!(system.device().frames.len(), 1);
    let colour = system.last_frame().colour_pass().expect("colour pass");
    assert_eq!(mesh_draws(&colour.commands).len(), 2);
}

#[test]
fn frames_can_target_an_offscreen_texture() {
    let mut system = initialized_system(small_settings());
    let target = system.device_mut().create_texture(
        &TextureDesc {
            label: "Offscreen",
            size: 0,
            kind: TextureKind::Target {
                width: 64,
                height: 32,
            },
        },
    );
    let (camera, projection) = camera();
    system.render(
        &TestScene::new(),
        &RenderParams {
            target: RenderTarget::Texture(target),
            camera: &camera,
            projection: &projection,
        },
    );
    assert_eq!(
        system.device().last_frame().map(|frame| frame.target),
        Some(RenderTarget::Texture(target))
    );
}

#[test]
fn removing_a_mesh_stops_its_draws() {
    let mut system = system_with_cube();
    system.register_instance(DrawInstance::mesh(InstanceId(1), cube(), None));
    system.remove_mesh(MeshId(1));
    render_frame(&mut system, &TestScene::new());

    let colour = system.last_frame().colour_pass().expect("colour pass");
    assert!(mesh_draws(&colour.commands).is_empty());
    assert!(system.stage::<OpaqueStage>().expect("opaque stage").drawn().is_empty());
}
