/**
 * This module contains the GPU-side bookkeeping of engine resources: the
 * buffer arena, the texture slot packer, the registry of GPU records and the
 * background loader feeding them.
 */
pub mod arena;
pub mod loader;
pub mod registry;
pub mod slots;
