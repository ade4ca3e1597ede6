// animation/skeleton.rs - Latency-N buffered node hierarchy plus joint
// matrices, arbitrated between a single writer (the updater) and a single
// reader (the renderer) via per-slot task handles.
//
// Grounded on spec.md §3's `Skeleton` description and
// `original_source/.../Graphics/Mesh/AnimationTree.h`'s joint matrix formula
// and `original_source/.../Core/Hierarchy.h`'s node/skin shape, realized as
// an arena (`Vec<SkeletonNode>` with parent indices) per spec.md §9's
// redesign note rather than the original's parent/next/prev pointer
// hierarchy. Nodes are required to be stored parent-before-child (the order
// any glTF-style loader naturally produces), which lets world matrix
// recomputation walk the arena once in index order instead of needing a
// separate topological sort.

use crate::math::Mat4;
use crate::task::TaskHandle;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTransform {
    pub translation: crate::math::Vec3,
    pub rotation: crate::math::Quat,
    pub scale: crate::math::Vec3,
}

impl LocalTransform {
    fn identity() -> Self {
        Self { translation: crate::math::Vec3::zero(), rotation: crate::math::Quat::identity(), scale: crate::math::Vec3::one() }
    }
}

#[derive(Clone)]
struct SkeletonNode {
    parent: Option<usize>,
    local: LocalTransform,
    world: Mat4,
    dirty: bool,
}

/// A skin's joint list plus each joint's inverse bind matrix. Shared across
/// slots — only the node hierarchy and resulting joint matrices vary per slot.
pub struct Skin {
    pub joint_nodes: Vec<usize>,
    pub inverse_bind: Vec<Mat4>,
}

struct SkeletonSlot {
    nodes: Vec<SkeletonNode>,
    joint_matrices: Vec<Vec<Mat4>>,
    task: TaskHandle<()>,
}

impl SkeletonSlot {
    fn new(node_count: usize, parents: &[Option<usize>], skins: &[Skin]) -> Self {
        let nodes = parents
            .iter()
            .map(|&parent| SkeletonNode { parent, local: LocalTransform::identity(), world: Mat4::IDENTITY, dirty: true })
            .collect();
        let joint_matrices = skins.iter().map(|s| vec![Mat4::IDENTITY; s.joint_nodes.len()]).collect();
        debug_assert_eq!(parents.len(), node_count);
        Self { nodes, joint_matrices, task: TaskHandle::invalid() }
    }
}

/// Owns `latency` independent copies of the node hierarchy plus per-skin
/// joint matrices, per spec.md §3. `dirty_skins` reflects whether the most
/// recent `recompute_world_matrices` call on the updater slot changed any
/// node's world matrix.
pub struct Skeleton {
    slots: Vec<SkeletonSlot>,
    skins: Vec<Skin>,
    latency: u8,
    updater_slot: u8,
    dirty_skins: bool,
    /// When set, joint matrices are computed root-relative:
    /// `inverse(node_world[root]) * node_world[joint] * inverse_bind`,
    /// per spec.md §4.H's "(optionally inverse_of(root_world))".
    root_relative_node: Option<usize>,
}

impl Skeleton {
    pub fn new(parents: Vec<Option<usize>>, skins: Vec<Skin>, latency: u8) -> Self {
        assert!(latency > 0, "skeleton latency must be at least 1");
        let node_count = parents.len();
        let slots = (0..latency).map(|_| SkeletonSlot::new(node_count, &parents, &skins)).collect();
        Self { slots, skins, latency, updater_slot: latency.wrapping_sub(1), dirty_skins: false, root_relative_node: None }
    }

    /// Opts a skin computation into root-relative joint matrices: every
    /// `recompute_joint_matrices` call thereafter premultiplies by the
    /// inverse of `node`'s world matrix. Pass `None` to go back to plain
    /// world-space joint matrices.
    pub fn set_root_relative_node(&mut self, node: Option<usize>) {
        self.root_relative_node = node;
    }

    pub fn latency(&self) -> u8 {
        self.latency
    }

    pub fn node_count(&self) -> usize {
        self.slots[0].nodes.len()
    }

    /// Advances to `(last_updated + 1) mod latency` and returns the new slot.
    pub fn advance_updater_slot(&mut self) -> u8 {
        self.updater_slot = (self.updater_slot + 1) % self.latency;
        self.updater_slot
    }

    pub fn updater_slot(&self) -> u8 {
        self.updater_slot
    }

    /// `(updater_slot + 1) mod latency` — the slot the renderer should read,
    /// per spec.md §3's arbitration rule.
    pub fn render_slot(&self) -> u8 {
        (self.updater_slot + 1) % self.latency
    }

    pub fn task_handle(&self, slot: u8) -> TaskHandle<()> {
        self.slots[slot as usize].task.clone()
    }

    pub fn set_task_handle(&mut self, slot: u8, handle: TaskHandle<()>) {
        self.slots[slot as usize].task = handle;
    }

    pub fn set_local_transform(&mut self, slot: u8, node: usize, transform: LocalTransform) {
        let n = &mut self.slots[slot as usize].nodes[node];
        n.local = transform;
        n.dirty = true;
    }

    pub fn local_transform(&self, slot: u8, node: usize) -> LocalTransform {
        self.slots[slot as usize].nodes[node].local
    }

    pub fn world_matrix(&self, slot: u8, node: usize) -> Mat4 {
        self.slots[slot as usize].nodes[node].world
    }

    pub fn joint_matrices(&self, slot: u8, skin: usize) -> &[Mat4] {
        &self.slots[slot as usize].joint_matrices[skin]
    }

    pub fn dirty_skins(&self) -> bool {
        self.dirty_skins
    }

    /// Recomputes world matrices for `slot` in hierarchy order (parent
    /// before children — guaranteed by the parent-before-child node
    /// ordering), propagating dirtiness: a node recomputes if it or any
    /// ancestor was marked dirty.
    pub fn recompute_world_matrices(&mut self, slot: u8) {
        let nodes = &mut self.slots[slot as usize].nodes;
        for i in 0..nodes.len() {
            let (parent_dirty, parent_world) = match nodes[i].parent {
                Some(p) => (nodes[p].dirty, nodes[p].world),
                None => (false, Mat4::IDENTITY),
            };
            let node = &mut nodes[i];
            if node.dirty || parent_dirty {
                let local = Mat4::from_trs(node.local.translation, node.local.rotation, node.local.scale);
                node.world = match node.parent {
                    Some(_) => parent_world.mul(&local),
                    None => local,
                };
                node.dirty = true;
            }
        }
    }

    /// `joint[i] = node_world[joint_nodes[i]] * inverse_bind[i]` for every
    /// skin, per spec.md §3. Sets `dirty_skins` if any node in `slot` was
    /// dirty, then clears the per-node dirty flags for the next frame.
    pub fn recompute_joint_matrices(&mut self, slot: u8) {
        let any_dirty = self.slots[slot as usize].nodes.iter().any(|n| n.dirty);
        self.dirty_skins = any_dirty;

        if any_dirty {
            let root_inverse = self
                .root_relative_node
                .map(|root| self.slots[slot as usize].nodes[root].world.inverse_affine());

            for (skin_idx, skin) in self.skins.iter().enumerate() {
                let out = &mut self.slots[slot as usize].joint_matrices[skin_idx];
                for (i, &joint_node) in skin.joint_nodes.iter().enumerate() {
                    let world = self.slots[slot as usize].nodes[joint_node].world;
                    let skinned = world.mul(&skin.inverse_bind[i]);
                    out[i] = match &root_inverse {
                        Some(inv) => inv.mul(&skinned),
                        None => skinned,
                    };
                }
            }
        }

        for node in &mut self.slots[slot as usize].nodes {
            node.dirty = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Quat, Vec3};

    fn linear_chain(n: usize) -> Vec<Option<usize>> {
        (0..n).map(|i| if i == 0 { None } else { Some(i - 1) }).collect()
    }

    #[test]
    fn render_slot_lags_updater_slot_by_one_mod_latency() {
        let mut skeleton = Skeleton::new(linear_chain(3), vec![], 2);
        let s0 = skeleton.advance_updater_slot();
        assert_eq!(s0, 0);
        assert_eq!(skeleton.render_slot(), 1);

        let s1 = skeleton.advance_updater_slot();
        assert_eq!(s1, 1);
        assert_eq!(skeleton.render_slot(), 0);
    }

    #[test]
    fn world_matrix_composes_through_parent_chain() {
        let mut skeleton = Skeleton::new(linear_chain(2), vec![], 1);
        skeleton.set_local_transform(0, 0, LocalTransform { translation: Vec3::new(1.0, 0.0, 0.0), rotation: Quat::identity(), scale: Vec3::one() });
        skeleton.set_local_transform(0, 1, LocalTransform { translation: Vec3::new(0.0, 2.0, 0.0), rotation: Quat::identity(), scale: Vec3::one() });
        skeleton.recompute_world_matrices(0);

        let root_world = skeleton.world_matrix(0, 0);
        let child_world = skeleton.world_matrix(0, 1);
        assert_eq!(root_world.0[3][0], 1.0);
        assert_eq!(child_world.0[3][0], 1.0);
        assert_eq!(child_world.0[3][1], 2.0);
    }

    #[test]
    fn root_relative_joint_matrices_cancel_out_root_translation() {
        let skins = vec![Skin { joint_nodes: vec![1], inverse_bind: vec![Mat4::IDENTITY] }];
        let mut skeleton = Skeleton::new(linear_chain(2), skins, 1);
        skeleton.set_root_relative_node(Some(0));

        skeleton.set_local_transform(0, 0, LocalTransform { translation: Vec3::new(10.0, 0.0, 0.0), rotation: Quat::identity(), scale: Vec3::one() });
        skeleton.set_local_transform(0, 1, LocalTransform { translation: Vec3::new(1.0, 0.0, 0.0), rotation: Quat::identity(), scale: Vec3::one() });
        skeleton.recompute_world_matrices(0);
        skeleton.recompute_joint_matrices(0);

        // Joint 1's world position is root (10) + local (1) = 11; root-relative
        // should cancel the root's translation back out to just the local offset.
        let joint = skeleton.joint_matrices(0, 0)[0];
        assert!((joint.0[3][0] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn joint_matrices_recompute_only_when_dirty() {
        let skins = vec![Skin { joint_nodes: vec![0], inverse_bind: vec![Mat4::IDENTITY] }];
        let mut skeleton = Skeleton::new(linear_chain(1), skins, 1);
        skeleton.recompute_world_matrices(0);
        skeleton.recompute_joint_matrices(0);
        assert!(skeleton.dirty_skins());

        skeleton.recompute_world_matrices(0);
        skeleton.recompute_joint_matrices(0);
        assert!(!skeleton.dirty_skins());
    }
}
