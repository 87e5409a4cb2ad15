use std::sync::Arc;

use forge_render::{
    batches::{BatchKey, InstanceBatches},
    data_structures::{
        InstanceId, MaterialId, MeshId, SkeletonId,
        instance::DrawInstance,
        material::{Material, ShaderKind, SurfaceKind},
        model::{Mesh, Skeleton},
        particle::{ParticleBlend, ParticleEmitter, ParticleFacing},
    },
};

fn material(id: u64, shader: ShaderKind, surface: SurfaceKind) -> Arc<Material> {
    Arc::new(Material::new(MaterialId(id), format!("material {id}"), shader, surface))
}

fn instance(id: u64, material: Option<Arc<Material>>) -> DrawInstance {
    DrawInstance::mesh(InstanceId(id), Arc::new(Mesh::cube(MeshId(1))), material)
}

#[test]
fn instance_without_material_is_opaque_unlit() {
    let mut batches = InstanceBatches::new();
    batches.register(instance(1, None));

    let batch = batches.batch(BatchKey::new(SurfaceKind::Opaque, ShaderKind::Unlit, false));
    assert!(batch.contains(InstanceId(1)));
    assert_eq!(batches.all_meshes(), &[InstanceId(1)]);
}

#[test]
fn registering_twice_files_the_instance_once() {
    let mut batches = InstanceBatches::new();
    let pbr = material(1, ShaderKind::Pbr, SurfaceKind::Opaque);
    batches.register(instance(1, Some(pbr.clone())));
    batches.register(instance(1, Some(pbr)));

    assert_eq!(batches.len(), 1);
    assert_eq!(batches.all_meshes().len(), 1);
    let total: usize = batches.batches().map(|batch| batch.len()).sum();
    assert_eq!(total, 1);
}

#[test]
fn re_registering_with_another_material_moves_the_instance() {
    let mut batches = InstanceBatches::new();
    let lit = material(1, ShaderKind::Lit, SurfaceKind::Opaque);
    let glass = material(2, ShaderKind::Pbr, SurfaceKind::Translucent);
    let first = batches.register(instance(1, Some(lit)));
    let second = batches.register(instance(1, Some(glass)));

    assert_ne!(first, second);
    assert!(batches
        .batch(BatchKey::new(SurfaceKind::Opaque, ShaderKind::Lit, false))
        .is_empty());
    assert!(batches
        .batch(BatchKey::new(SurfaceKind::Translucent, ShaderKind::Pbr, false))
        .contains(InstanceId(1)));
}

#[test]
fn instances_are_grouped_by_material() {
    let mut batches = InstanceBatches::new();
    let a = material(1, ShaderKind::Lit, SurfaceKind::Opaque);
    let b = material(2, ShaderKind::Lit, SurfaceKind::Opaque);
    batches.register(instance(1, Some(a.clone())));
    batches.register(instance(2, Some(b)));
    batches.register(instance(3, Some(a)));

    let batch = batches.batch(BatchKey::new(SurfaceKind::Opaque, ShaderKind::Lit, false));
    let groups: Vec<_> = batch
        .groups()
        .map(|(material, ids)| (material, ids.to_vec()))
        .collect();
    assert_eq!(
        groups,
        vec![
            (Some(MaterialId(1)), vec![InstanceId(1), InstanceId(3)]),
            (Some(MaterialId(2)), vec![InstanceId(2)]),
        ]
    );
}

#[test]
fn material_update_moves_every_bound_instance() {
    let mut batches = InstanceBatches::new();
    let shared = material(1, ShaderKind::Unlit, SurfaceKind::Opaque);
    let other = material(2, ShaderKind::Unlit, SurfaceKind::Opaque);
    batches.register(instance(1, Some(shared.clone())));
    batches.register(instance(2, Some(shared)));
    batches.register(instance(3, Some(other)));

    let changed = Arc::new(Material::new(
        MaterialId(1),
        "material 1",
        ShaderKind::Pbr,
        SurfaceKind::Translucent,
    ));
    assert_eq!(batches.update_material(&changed), 2);

    let translucent = batches.batch(BatchKey::new(SurfaceKind::Translucent, ShaderKind::Pbr, false));
    assert!(translucent.contains(InstanceId(1)));
    assert!(translucent.contains(InstanceId(2)));
    let unlit = batches.batch(BatchKey::new(SurfaceKind::Opaque, ShaderKind::Unlit, false));
    assert_eq!(unlit.instances().collect::<Vec<_>>(), vec![InstanceId(3)]);
    assert_eq!(batches.len(), 3);
}

#[test]
fn skinned_instances_have_their_own_batches() {
    let mut batches = InstanceBatches::new();
    let lit = material(1, ShaderKind::Lit, SurfaceKind::Opaque);
    batches.register(DrawInstance::skinned(
        InstanceId(1),
        Arc::new(Mesh::cube(MeshId(1))),
        Some(lit),
        Arc::new(Skeleton::new(SkeletonId(1), 3)),
    ));

    assert!(batches
        .batch(BatchKey::new(SurfaceKind::Opaque, ShaderKind::Lit, true))
        .contains(InstanceId(1)));
    assert!(batches
        .batch(BatchKey::new(SurfaceKind::Opaque, ShaderKind::Lit, false))
        .is_empty());
    assert_eq!(batches.all_skinned(), &[InstanceId(1)]);
    assert!(batches.all_meshes().is_empty());
}

#[test]
fn unregistering_unknown_instance_is_harmless() {
    let mut batches = InstanceBatches::new();
    batches.register(instance(1, None));

    assert!(batches.unregister(InstanceId(2)).is_none());
    assert!(batches.unregister(InstanceId(1)).is_some());
    assert!(batches.is_empty());
    assert!(batches.batches().all(|batch| batch.is_empty()));
}

#[test]
fn emitters_are_replaced_in_place() {
    let mut batches = InstanceBatches::new();
    batches.register_emitter(ParticleEmitter::new(InstanceId(1), ParticleBlend::Opaque, ParticleFacing::Billboard));
    batches.register_emitter(ParticleEmitter::new(InstanceId(2), ParticleBlend::Opaque, ParticleFacing::Billboard));
    batches.register_emitter(ParticleEmitter::new(InstanceId(1), ParticleBlend::Blended, ParticleFacing::Oriented));

    let emitters = batches.emitters();
    assert_eq!(emitters.len(), 2);
    assert_eq!(emitters[0].id, InstanceId(1));
    assert_eq!(emitters[0].blend, ParticleBlend::Blended);

    assert!(batches.unregister_emitter(InstanceId(1)).is_some());
    assert!(batches.unregister_emitter(InstanceId(1)).is_none());
}
