// animation/tree.rs - Non-recursive animator tree: per-leaf keyframe
// evaluation and internal-node weighted blending.
//
// Grounded on `original_source/.../Graphics/Mesh/AnimationTree.{h,cpp}`
// (`MeshAnimator`, `MeshAnimationTree`, `AnimatorCalculator::_`): leaves hold
// a clip reference plus a per-slot frame-time accumulator and transform
// buffer; `calculate` walks children-before-parent, seeding a parent's
// buffer via memcpy from the first nonzero-weight child then blending the
// rest by running weight, stopping once the accumulated weight reaches 1.
// The switch-on-exact-mask blend in the original is generalized here to a
// per-bit check over the same three mask bits — equivalent for all mask
// combinations the original enumerates, without the repetition.

use std::sync::Arc;

use crate::animation::skeleton::{LocalTransform, Skeleton};
use crate::math::{Quat, Vec3, EPSILON};

pub const MASK_TRANSLATION: u8 = 0b001;
pub const MASK_ROTATION: u8 = 0b010;
pub const MASK_SCALE: u8 = 0b100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationChannelPath {
    Translation,
    Rotation,
    Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Linear,
    Step,
    /// Out of scope (spec.md §1 Non-goals: advanced interpolation); a
    /// channel using it is logged once and otherwise ignored.
    CubicSpline,
}

#[derive(Debug, Clone)]
pub struct AnimationSampler {
    pub inputs: Vec<f32>,
    pub outputs: Vec<[f32; 4]>,
    pub interpolation: Interpolation,
}

#[derive(Debug, Clone)]
pub struct AnimationChannel {
    pub sampler: usize,
    pub target_node: u16,
    pub path: AnimationChannelPath,
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub start: f32,
    pub duration: f32,
    pub samplers: Vec<AnimationSampler>,
    pub channels: Vec<AnimationChannel>,
    pub min_target_node: u16,
    pub max_target_node: u16,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Transform {
    pub mask: u8,
    pub target_node: u16,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

fn quat_approx_eq(a: Quat, b: Quat, eps: f32) -> bool {
    (a.w - b.w).abs() <= eps && (a.x - b.x).abs() <= eps && (a.y - b.y).abs() <= eps && (a.z - b.z).abs() <= eps
}

/// A single node of the animator tree: leaves carry a clip and sample it
/// directly, interior nodes carry no clip and blend their children.
pub struct Animator {
    weight: f32,
    time: f32,
    speed: f32,
    clip: Option<Arc<AnimationClip>>,
    frame_times: Vec<f32>,
    transforms: Vec<Vec<Transform>>,
}

impl Animator {
    /// An interior (blend) node: `transform_count` sized per-slot buffers,
    /// no clip of its own.
    pub fn interior(weight: f32, transform_count: usize, latency: u8) -> Self {
        Self {
            weight,
            time: 0.0,
            speed: 1.0,
            clip: None,
            frame_times: vec![0.0; latency as usize],
            transforms: vec![vec![Transform::default(); transform_count]; latency as usize],
        }
    }

    /// A leaf node sampling `clip`.
    pub fn leaf(clip: Arc<AnimationClip>, weight: f32, latency: u8, speed: f32) -> Self {
        let transform_count = (clip.max_target_node - clip.min_target_node) as usize + 1;
        Self {
            weight,
            time: 0.0,
            speed,
            clip: Some(clip),
            frame_times: vec![0.0; latency as usize],
            transforms: vec![vec![Transform::default(); transform_count]; latency as usize],
        }
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f32) {
        self.weight = weight;
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn reset_time(&mut self) {
        self.time = 0.0;
    }

    pub fn latency(&self) -> u8 {
        self.frame_times.len() as u8
    }

    pub fn current_time(&self, slot: u8) -> f32 {
        if self.clip.is_none() {
            return 0.0;
        }
        self.frame_times[slot as usize]
    }

    pub fn transforms(&self, slot: u8) -> &[Transform] {
        &self.transforms[slot as usize]
    }

    pub fn transforms_mut(&mut self, slot: u8) -> &mut [Transform] {
        &mut self.transforms[slot as usize]
    }

    /// Advances this leaf's clip time by `speed * dt`, wrapping at the
    /// clip's duration. A no-op for interior (clip-less) nodes.
    pub fn update(&mut self, dt: f32, slot: u8) {
        let Some(clip) = &self.clip else { return };
        self.time += self.speed * dt;
        if self.time > clip.duration {
            self.time -= clip.duration;
        }
        self.frame_times[slot as usize] = clip.start + self.time;
    }

    /// Per-leaf keyframe evaluation at `time`: for each channel, finds the
    /// enclosing keyframe interval and interpolates per `sampler.interpolation`.
    pub fn evaluate(&mut self, time: f32, slot: u8) {
        let Some(clip) = self.clip.clone() else { return };
        let min_target = clip.min_target_node;
        let out = &mut self.transforms[slot as usize];

        for channel in &clip.channels {
            let sampler = &clip.samplers[channel.sampler];
            if sampler.inputs.len() < 2 {
                continue;
            }
            let target_idx = (channel.target_node - min_target) as usize;
            if target_idx >= out.len() {
                continue;
            }

            for i in 0..sampler.inputs.len() - 1 {
                let t0 = sampler.inputs[i];
                let t1 = sampler.inputs[i + 1];
                if time < t0 || time >= t1 {
                    continue;
                }

                let transform = &mut out[target_idx];
                transform.target_node = channel.target_node;
                let v0 = sampler.outputs[i];
                let mix = (time - t0) / (t1 - t0);

                match sampler.interpolation {
                    Interpolation::Linear => {
                        let v1 = sampler.outputs[i + 1];
                        apply_linear(transform, channel.path, v0, v1, mix);
                    }
                    Interpolation::Step => apply_step(transform, channel.path, v0),
                    Interpolation::CubicSpline => {
                        log::warn!("cubic spline interpolation is out of scope; channel ignored");
                    }
                }
                break;
            }
        }
    }

    /// Pushes this leaf's blended/evaluated transforms for `slot` onto the
    /// skeleton's matching nodes, then clears the transform masks for reuse.
    pub fn apply(&mut self, skeleton: &mut Skeleton, slot: u8) {
        for transform in &mut self.transforms[slot as usize] {
            if transform.mask == 0 {
                continue;
            }
            let node = transform.target_node as usize;
            if node >= skeleton.node_count() {
                transform.mask = 0;
                continue;
            }
            let mut local = skeleton.local_transform(slot, node);
            if transform.mask & MASK_TRANSLATION != 0 {
                local.translation = transform.translation;
            }
            if transform.mask & MASK_ROTATION != 0 {
                local.rotation = transform.rotation;
            }
            if transform.mask & MASK_SCALE != 0 {
                local.scale = transform.scale;
            }
            skeleton.set_local_transform(slot, node, local);
            transform.mask = 0;
        }
    }
}

fn apply_linear(transform: &mut Transform, path: AnimationChannelPath, v0: [f32; 4], v1: [f32; 4], mix: f32) {
    match path {
        AnimationChannelPath::Translation => {
            let (a, b) = (Vec3::new(v0[0], v0[1], v0[2]), Vec3::new(v1[0], v1[1], v1[2]));
            transform.mask |= MASK_TRANSLATION;
            transform.translation = if a.approx_eq(b, EPSILON) { a } else { a.lerp(b, mix) };
        }
        AnimationChannelPath::Rotation => {
            let (a, b) = (Quat::new(v0[3], v0[0], v0[1], v0[2]), Quat::new(v1[3], v1[0], v1[1], v1[2]));
            transform.mask |= MASK_ROTATION;
            transform.rotation = if quat_approx_eq(a, b, EPSILON) { a } else { a.slerp(b, mix).normalize() };
        }
        AnimationChannelPath::Scale => {
            let (a, b) = (Vec3::new(v0[0], v0[1], v0[2]), Vec3::new(v1[0], v1[1], v1[2]));
            transform.mask |= MASK_SCALE;
            transform.scale = if a.approx_eq(b, EPSILON) { a } else { a.lerp(b, mix) };
        }
    }
}

fn apply_step(transform: &mut Transform, path: AnimationChannelPath, v0: [f32; 4]) {
    match path {
        AnimationChannelPath::Translation => {
            transform.mask |= MASK_TRANSLATION;
            transform.translation = Vec3::new(v0[0], v0[1], v0[2]);
        }
        AnimationChannelPath::Rotation => {
            transform.mask |= MASK_ROTATION;
            transform.rotation = Quat::new(v0[3], v0[0], v0[1], v0[2]);
        }
        AnimationChannelPath::Scale => {
            transform.mask |= MASK_SCALE;
            transform.scale = Vec3::new(v0[0], v0[1], v0[2]);
        }
    }
}

/// Blends `tr1` (an already-computed child transform) into `tr0` by `mix`,
/// the running-weight fraction, then OR's the mask into `tr0` and clears
/// `tr1`'s — same bookkeeping as `AnimatorCalculator::_` in the original,
/// generalized from a switch over exact mask values to one check per bit.
fn blend_into(tr0: &mut Transform, tr1: &mut Transform, mix: f32) {
    if tr1.mask & MASK_TRANSLATION != 0 {
        tr0.translation = if tr0.mask & MASK_TRANSLATION != 0 { tr1.translation.lerp(tr0.translation, mix) } else { tr1.translation };
    }
    if tr1.mask & MASK_ROTATION != 0 {
        tr0.rotation = if tr0.mask & MASK_ROTATION != 0 { tr1.rotation.slerp(tr0.rotation, mix).normalize() } else { tr1.rotation };
    }
    if tr1.mask & MASK_SCALE != 0 {
        tr0.scale = if tr0.mask & MASK_SCALE != 0 { tr1.scale.lerp(tr0.scale, mix) } else { tr1.scale };
    }
    tr0.mask |= tr1.mask;
    tr1.mask = 0;
}

struct AnimationNode {
    animator: Animator,
    children: Vec<usize>,
}

/// A non-recursive animator tree. Node 0 is always the root. Children must
/// be added before being referenced by a parent (enforced by `add_child`
/// taking the already-allocated child index).
pub struct AnimationTree {
    nodes: Vec<AnimationNode>,
    root: usize,
    update_frame: u8,
    need_update: bool,
}

impl AnimationTree {
    pub fn new(root: Animator) -> Self {
        Self { nodes: vec![AnimationNode { animator: root, children: Vec::new() }], root: 0, update_frame: 0, need_update: true }
    }

    /// Adds `animator` as a new node and attaches it as a child of `parent`,
    /// returning the new node's index.
    pub fn add_child(&mut self, parent: usize, animator: Animator) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(AnimationNode { animator, children: Vec::new() });
        self.nodes[parent].children.push(idx);
        idx
    }

    pub fn animator(&self, idx: usize) -> &Animator {
        &self.nodes[idx].animator
    }

    pub fn animator_mut(&mut self, idx: usize) -> &mut Animator {
        &mut self.nodes[idx].animator
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn need_update(&self) -> bool {
        self.need_update
    }

    pub fn set_need_update(&mut self, need: bool) {
        self.need_update = need;
    }

    pub fn frame(&self) -> u8 {
        self.update_frame
    }

    /// Forward traversal: every node with weight > 0 advances its clip time.
    /// Skips the whole walk when the root alone is weight >= 1.
    pub fn update(&mut self, dt: f32, slot: u8) {
        if self.nodes[self.root].animator.weight() >= 1.0 {
            self.nodes[self.root].animator.update(dt, slot);
            return;
        }
        for node in &mut self.nodes {
            if node.animator.weight() > 0.0 {
                node.animator.update(dt, slot);
            }
        }
    }

    /// Reverse traversal: children evaluate/blend before their parent, via
    /// an iterated preorder walk consumed in reverse (valid for any tree: a
    /// child always appears after its parent in preorder, so reversing
    /// yields children-before-parent). Skips straight to the single-animator
    /// fast path when the root's weight is >= 1.
    pub fn calculate(&mut self, slot: u8) {
        if self.nodes[self.root].animator.weight() >= 1.0 {
            let time = self.nodes[self.root].animator.current_time(slot);
            self.nodes[self.root].animator.evaluate(time, slot);
            return;
        }

        let mut stack = vec![self.root];
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(idx) = stack.pop() {
            order.push(idx);
            for &child in &self.nodes[idx].children {
                stack.push(child);
            }
        }

        for &idx in order.iter().rev() {
            self.calculate_node(idx, slot);
        }
    }

    fn calculate_node(&mut self, idx: usize, slot: u8) {
        if self.nodes[idx].animator.weight() <= 0.0 && idx != self.root {
            return;
        }

        let children = self.nodes[idx].children.clone();
        if children.is_empty() {
            let time = self.nodes[idx].animator.current_time(slot);
            self.nodes[idx].animator.evaluate(time, slot);
            return;
        }

        let mut first = None;
        let mut w = 0.0f32;
        for (n, &child) in children.iter().enumerate() {
            w = self.nodes[child].animator.weight();
            if w > 0.0 {
                first = Some(n);
                let child_transforms = self.nodes[child].animator.transforms(slot).to_vec();
                let buf = self.nodes[idx].animator.transforms_mut(slot);
                for ct in &child_transforms {
                    if ct.mask != 0 && (ct.target_node as usize) < buf.len() {
                        buf[ct.target_node as usize] = *ct;
                    }
                }
                break;
            }
        }

        let Some(first) = first else { return };

        if w < 1.0 {
            for n in (first + 1)..children.len() {
                let child = children[n];
                let w2 = self.nodes[child].animator.weight();
                if w2 <= 0.0 {
                    continue;
                }

                let mix = w / (w + w2);
                let mut child_transforms = self.nodes[child].animator.transforms(slot).to_vec();
                let buf = self.nodes[idx].animator.transforms_mut(slot);
                for ct in &mut child_transforms {
                    let target = ct.target_node as usize;
                    if target >= buf.len() {
                        continue;
                    }
                    blend_into(&mut buf[target], ct, mix);
                }

                w += w2;
                if w >= 1.0 {
                    break;
                }
            }
        }
    }

    /// Pushes the root's blended transforms for `slot` onto `skeleton`.
    pub fn apply(&mut self, skeleton: &mut Skeleton, slot: u8) {
        self.nodes[self.root].animator.apply(skeleton, slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::skeleton::Skeleton;

    fn clip_with_translation(start_val: f32, end_val: f32) -> Arc<AnimationClip> {
        Arc::new(AnimationClip {
            start: 0.0,
            duration: 1.0,
            samplers: vec![AnimationSampler {
                inputs: vec![0.0, 1.0],
                outputs: vec![[start_val, 0.0, 0.0, 1.0], [end_val, 0.0, 0.0, 1.0]],
                interpolation: Interpolation::Linear,
            }],
            channels: vec![AnimationChannel { sampler: 0, target_node: 0, path: AnimationChannelPath::Translation }],
            min_target_node: 0,
            max_target_node: 0,
        })
    }

    #[test]
    fn leaf_evaluate_interpolates_within_interval() {
        let clip = clip_with_translation(0.0, 10.0);
        let mut animator = Animator::leaf(clip, 1.0, 1, 1.0);
        animator.evaluate(0.5, 0);
        let t = animator.transforms(0)[0];
        assert_eq!(t.mask, MASK_TRANSLATION);
        assert!((t.translation.x - 5.0).abs() < 1e-5);
    }

    #[test]
    fn root_weight_above_one_skips_blend_tree() {
        let clip = clip_with_translation(0.0, 10.0);
        let root = Animator::leaf(clip, 1.0, 1, 1.0);
        let mut tree = AnimationTree::new(root);
        tree.animator_mut(tree.root()).update(0.5, 0);
        tree.calculate(0);
        let t = tree.animator(tree.root()).transforms(0)[0];
        assert_eq!(t.mask, MASK_TRANSLATION);
    }

    #[test]
    fn two_child_blend_weights_evenly_at_half_each() {
        let clip_a = clip_with_translation(0.0, 0.0);
        let clip_b = clip_with_translation(10.0, 10.0);
        let root = Animator::interior(1.0, 1, 1);
        let mut tree = AnimationTree::new(root);
        let a = tree.add_child(tree.root(), Animator::leaf(clip_a, 0.5, 1, 1.0));
        let b = tree.add_child(tree.root(), Animator::leaf(clip_b, 0.5, 1, 1.0));

        tree.animator_mut(a).update(0.0, 0);
        tree.animator_mut(b).update(0.0, 0);
        tree.calculate(0);

        let blended = tree.animator(tree.root()).transforms(0)[0];
        assert_eq!(blended.mask, MASK_TRANSLATION);
        assert!((blended.translation.x - 5.0).abs() < 1e-4);
    }

    #[test]
    fn apply_writes_local_transform_and_clears_mask() {
        let clip = clip_with_translation(3.0, 3.0);
        let root = Animator::leaf(clip, 1.0, 1, 1.0);
        let mut tree = AnimationTree::new(root);
        tree.animator_mut(tree.root()).update(0.0, 0);
        tree.calculate(0);

        let mut skeleton = Skeleton::new(vec![None], vec![], 1);
        tree.apply(&mut skeleton, 0);

        let local = skeleton.local_transform(0, 0);
        assert!((local.translation.x - 3.0).abs() < 1e-5);
        assert_eq!(tree.animator(tree.root()).transforms(0)[0].mask, 0);
    }
}
