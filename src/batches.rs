//! Registration of draw instances into shader batches.
//!
//! There is one batch per surface kind, shader kind and skinning, twelve in
//! total, stored in a fixed arena. Inside a batch instances are grouped by
//! material so a stage can bind per-material state once per group. Each
//! registration remembers the [`BatchSlot`] it joined, which makes
//! unregistering O(group size) without searching every batch.

use std::{collections::HashMap, sync::Arc};

use crate::data_structures::{
    InstanceId, MaterialId,
    instance::DrawInstance,
    material::{Material, ShaderKind, SurfaceKind},
    particle::ParticleEmitter,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchKey {
    pub surface: SurfaceKind,
    pub shader: ShaderKind,
    pub skinned: bool,
}

impl BatchKey {
    pub const COUNT: usize = SurfaceKind::ALL.len() * ShaderKind::ALL.len() * 2;

    pub fn new(surface: SurfaceKind, shader: ShaderKind, skinned: bool) -> Self {
        Self {
            surface,
            shader,
            skinned,
        }
    }

    /// The batch an instance belongs to, opaque/unlit without a material.
    pub fn for_instance(instance: &DrawInstance) -> Self {
        let material = instance.resolve_material();
        Self::new(material.surface, material.shader, instance.is_skinned())
    }

    pub fn slot(&self) -> BatchSlot {
        let surface = self.surface as usize;
        let shader = self.shader as usize;
        BatchSlot((surface * ShaderKind::ALL.len() + shader) * 2 + self.skinned as usize)
    }

    /// Every key in slot order.
    pub fn all() -> impl Iterator<Item = BatchKey> {
        SurfaceKind::ALL.into_iter().flat_map(|surface| {
            ShaderKind::ALL.into_iter().flat_map(move |shader| {
                [false, true]
                    .into_iter()
                    .map(move |skinned| BatchKey::new(surface, shader, skinned))
            })
        })
    }
}

/// Index of a batch in the batch arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchSlot(usize);

impl BatchSlot {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug)]
pub struct Batch {
    key: BatchKey,
    groups: Vec<(Option<MaterialId>, Vec<InstanceId>)>,
}

impl Batch {
    fn new(key: BatchKey) -> Self {
        Self {
            key,
            groups: Vec::new(),
        }
    }

    pub fn key(&self) -> BatchKey {
        self.key
    }

    /// Material groups in first-registration order.
    pub fn groups(&self) -> impl Iterator<Item = (Option<MaterialId>, &[InstanceId])> {
        self.groups
            .iter()
            .map(|(material, ids)| (*material, ids.as_slice()))
    }

    /// Every instance of the batch, group by group.
    pub fn instances(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.groups.iter().flat_map(|(_, ids)| ids.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, ids)| ids.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances().any(|other| other == id)
    }

    fn insert(&mut self, material: Option<MaterialId>, id: InstanceId) {
        match self.groups.iter_mut().find(|(group, _)| *group == material) {
            Some((_, ids)) => ids.push(id),
            None => self.groups.push((material, vec![id])),
        }
    }

    fn remove(&mut self, material: Option<MaterialId>, id: InstanceId) -> bool {
        let Some(index) = self.groups.iter().position(|(group, _)| *group == material) else {
            return false;
        };
        let ids = &mut self.groups[index].1;
        let before = ids.len();
        ids.retain(|other| *other != id);
        let removed = ids.len() != before;
        if ids.is_empty() {
            self.groups.remove(index);
        }
        removed
    }
}

#[derive(Debug)]
struct Registration {
    instance: DrawInstance,
    slot: BatchSlot,
    material: Option<MaterialId>,
}

#[derive(Debug)]
pub struct InstanceBatches {
    batches: Vec<Batch>,
    registrations: HashMap<InstanceId, Registration>,
    all_meshes: Vec<InstanceId>,
    all_skinned: Vec<InstanceId>,
    registered: Vec<InstanceId>,
    emitters: Vec<ParticleEmitter>,
}

impl InstanceBatches {
    pub fn new() -> Self {
        Self {
            batches: BatchKey::all().map(Batch::new).collect(),
            registrations: HashMap::new(),
            all_meshes: Vec::new(),
            all_skinned: Vec::new(),
            registered: Vec::new(),
            emitters: Vec::new(),
        }
    }

    /// File the instance into the batch of its material. An instance that
    /// is already registered is unregistered first, so it never appears
    /// twice.
    pub fn register(&mut self, instance: DrawInstance) -> BatchSlot {
        if self.registrations.contains_key(&instance.id) {
            self.unregister(instance.id);
        }
        let key = BatchKey::for_instance(&instance);
        let slot = key.slot();
        let material = instance.material.as_ref().map(|m| m.id);
        self.batches[slot.index()].insert(material, instance.id);
        if instance.is_skinned() {
            self.all_skinned.push(instance.id);
        } else {
            self.all_meshes.push(instance.id);
        }
        self.registered.push(instance.id);
        log::debug!("Registered instance {} in {:?}", instance.id, key);
        self.registrations.insert(
            instance.id,
            Registration {
                instance,
                slot,
                material,
            },
        );
        slot
    }

    /// Remove the instance from the batch it last joined. Returns the
    /// instance, `None` if it was not registered.
    pub fn unregister(&mut self, id: InstanceId) -> Option<DrawInstance> {
        let Some(registration) = self.registrations.remove(&id) else {
            log::debug!("Instance {id} is not registered, nothing to unregister.");
            return None;
        };
        self.batches[registration.slot.index()].remove(registration.material, id);
        let flat = if registration.instance.is_skinned() {
            &mut self.all_skinned
        } else {
            &mut self.all_meshes
        };
        flat.retain(|other| *other != id);
        self.registered.retain(|other| *other != id);
        Some(registration.instance)
    }

    /// Swap in a changed material and re-register every instance bound to
    /// it. Returns how many instances moved.
    pub fn update_material(&mut self, material: &Arc<Material>) -> usize {
        let bound: Vec<InstanceId> = self
            .registered
            .iter()
            .copied()
            .filter(|id| {
                self.registrations
                    .get(id)
                    .is_some_and(|r| r.material == Some(material.id))
            })
            .collect();
        for id in &bound {
            if let Some(mut instance) = self.unregister(*id) {
                instance.material = Some(material.clone());
                self.register(instance);
            }
        }
        bound.len()
    }

    pub fn get(&self, id: InstanceId) -> Option<&DrawInstance> {
        self.registrations.get(&id).map(|r| &r.instance)
    }

    pub fn slot_of(&self, id: InstanceId) -> Option<BatchSlot> {
        self.registrations.get(&id).map(|r| r.slot)
    }

    pub fn batch(&self, key: BatchKey) -> &Batch {
        &self.batches[key.slot().index()]
    }

    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.batches.iter()
    }

    pub fn batches_for(&self, surface: SurfaceKind) -> impl Iterator<Item = &Batch> {
        self.batches
            .iter()
            .filter(move |batch| batch.key.surface == surface)
    }

    /// Static mesh instances in registration order.
    pub fn all_meshes(&self) -> &[InstanceId] {
        &self.all_meshes
    }

    /// Skinned mesh instances in registration order.
    pub fn all_skinned(&self) -> &[InstanceId] {
        &self.all_skinned
    }

    /// Every mesh instance, static or skinned, in registration order.
    pub fn registration_order(&self) -> &[InstanceId] {
        &self.registered
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Register a particle emitter, replacing an earlier registration of the
    /// same id in place.
    pub fn register_emitter(&mut self, emitter: ParticleEmitter) {
        match self.emitters.iter_mut().find(|other| other.id == emitter.id) {
            Some(existing) => *existing = emitter,
            None => self.emitters.push(emitter),
        }
    }

    pub fn unregister_emitter(&mut self, id: InstanceId) -> Option<ParticleEmitter> {
        let index = self.emitters.iter().position(|emitter| emitter.id == id)?;
        Some(self.emitters.remove(index))
    }

    pub fn emitters(&self) -> &[ParticleEmitter] {
        &self.emitters
    }
}

impl Default for InstanceBatches {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_maps_to_its_own_slot() {
        let slots: Vec<usize> = BatchKey::all().map(|key| key.slot().index()).collect();
        assert_eq!(slots, (0..BatchKey::COUNT).collect::<Vec<_>>());
    }
}
