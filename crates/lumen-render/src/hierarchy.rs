use glam::Mat4;
use tracing::debug;

use crate::backend::{BackendError, TransformBackend, TransformHandle};

#[derive(Debug, Clone)]
struct Node {
    handle: TransformHandle,
    local: Mat4,
    world: Mat4,
    parent: Option<TransformHandle>,
    children: Vec<TransformHandle>,
    dirty: bool,
}

/// A node slot. The generation is bumped whenever the slot is vacated.
#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// In-memory transform hierarchy.
///
/// Outside a transaction every change recomputes world matrices at once.
/// Inside one, changes only mark nodes dirty and the outermost commit walks
/// the forest top-down, recomputing every dirty node and everything below it.
pub struct HierarchyTransformManager {
    slots: Vec<Slot>,
    vacant: Vec<u32>,
    live: usize,
    transaction_depth: u32,
}

impl HierarchyTransformManager {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            live: 0,
            transaction_depth: 0,
        }
    }

    fn node(&self, handle: TransformHandle) -> Result<&Node, BackendError> {
        self.slots
            .get(handle.slot() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.node.as_ref())
            .ok_or(BackendError::InvalidHandle(handle))
    }

    fn node_mut(&mut self, handle: TransformHandle) -> Result<&mut Node, BackendError> {
        self.slots
            .get_mut(handle.slot() as usize)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.node.as_mut())
            .ok_or(BackendError::InvalidHandle(handle))
    }

    /// Place a node in a vacant slot, or a new one.
    fn occupy(&mut self, parent: Option<TransformHandle>) -> TransformHandle {
        let index = match self.vacant.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        let handle = TransformHandle::new(index, slot.generation);
        slot.node = Some(Node {
            handle,
            local: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
            parent,
            children: Vec::new(),
            dirty: true,
        });
        self.live += 1;
        handle
    }

    fn vacate(&mut self, handle: TransformHandle) {
        if let Some(slot) = self.slots.get_mut(handle.slot() as usize) {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.vacant.push(handle.slot());
                self.live -= 1;
            }
        }
    }

    /// Whether `ancestor` is `handle` itself or lies on its parent chain.
    fn is_self_or_ancestor(&self, ancestor: TransformHandle, handle: TransformHandle) -> bool {
        let mut current = Some(handle);
        while let Some(h) = current {
            if h == ancestor {
                return true;
            }
            current = self.node(h).ok().and_then(|n| n.parent);
        }
        false
    }

    fn unlink_child(&mut self, parent: Option<TransformHandle>, child: TransformHandle) {
        if let Some(node) = parent.and_then(|p| self.node_mut(p).ok()) {
            node.children.retain(|c| *c != child);
        }
    }

    fn roots(&self) -> Vec<TransformHandle> {
        self.slots
            .iter()
            .filter_map(|slot| slot.node.as_ref())
            .filter(|node| node.parent.is_none())
            .map(|node| node.handle)
            .collect()
    }

    /// Recompute every dirty subtree. Returns how many nodes were recomputed.
    fn recompute(&mut self) -> usize {
        let mut recomputed = 0;
        let mut stack: Vec<(TransformHandle, Mat4, bool)> = self
            .roots()
            .into_iter()
            .map(|root| (root, Mat4::IDENTITY, false))
            .collect();

        while let Some((handle, parent_world, parent_changed)) = stack.pop() {
            let Ok(node) = self.node_mut(handle) else {
                continue;
            };
            let changed = node.dirty || parent_changed;
            if changed {
                node.world = parent_world * node.local;
                node.dirty = false;
                recomputed += 1;
            }
            let world = node.world;
            stack.extend(node.children.iter().map(|child| (*child, world, changed)));
        }
        recomputed
    }

    fn recompute_unless_batched(&mut self) {
        if self.transaction_depth == 0 {
            self.recompute();
        }
    }

    /// Children of a node in link order.
    pub fn children(&self, handle: TransformHandle) -> Result<&[TransformHandle], BackendError> {
        Ok(&self.node(handle)?.children)
    }
}

impl TransformBackend for HierarchyTransformManager {
    fn create(&mut self, parent: Option<TransformHandle>) -> Result<TransformHandle, BackendError> {
        if let Some(parent) = parent {
            self.node(parent)?;
        }
        let handle = self.occupy(parent);
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.push(handle);
        }
        self.recompute_unless_batched();
        Ok(handle)
    }

    fn destroy(&mut self, handle: TransformHandle) -> Result<(), BackendError> {
        let node = self.node(handle)?;
        let parent = node.parent;
        let children = node.children.clone();

        self.unlink_child(parent, handle);
        for child in &children {
            if let Ok(child_node) = self.node_mut(*child) {
                child_node.parent = parent;
                child_node.dirty = true;
            }
        }
        if let Some(parent_node) = parent.and_then(|p| self.node_mut(p).ok()) {
            parent_node.children.extend(children.iter().copied());
        }

        self.vacate(handle);
        debug!(
            "Destroyed transform node {} ({} children re-rooted)",
            handle,
            children.len()
        );
        self.recompute_unless_batched();
        Ok(())
    }

    fn is_valid(&self, handle: TransformHandle) -> bool {
        self.node(handle).is_ok()
    }

    fn set_local(&mut self, handle: TransformHandle, local: Mat4) -> Result<(), BackendError> {
        let node = self.node_mut(handle)?;
        node.local = local;
        node.dirty = true;
        self.recompute_unless_batched();
        Ok(())
    }

    fn local(&self, handle: TransformHandle) -> Result<Mat4, BackendError> {
        Ok(self.node(handle)?.local)
    }

    fn world(&self, handle: TransformHandle) -> Result<Mat4, BackendError> {
        Ok(self.node(handle)?.world)
    }

    fn parent(&self, handle: TransformHandle) -> Result<Option<TransformHandle>, BackendError> {
        Ok(self.node(handle)?.parent)
    }

    fn set_parent(
        &mut self,
        handle: TransformHandle,
        parent: Option<TransformHandle>,
    ) -> Result<(), BackendError> {
        let old_parent = self.node(handle)?.parent;
        if let Some(parent) = parent {
            self.node(parent)?;
            if self.is_self_or_ancestor(handle, parent) {
                return Err(BackendError::Cycle {
                    child: handle,
                    parent,
                });
            }
        }
        if old_parent == parent {
            return Ok(());
        }

        self.unlink_child(old_parent, handle);
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.push(handle);
        }
        let node = self.node_mut(handle)?;
        node.parent = parent;
        node.dirty = true;
        self.recompute_unless_batched();
        Ok(())
    }

    fn begin_transaction(&mut self) {
        self.transaction_depth += 1;
    }

    fn commit_transaction(&mut self) -> Result<usize, BackendError> {
        if self.transaction_depth == 0 {
            return Err(BackendError::NoTransaction);
        }
        self.transaction_depth -= 1;
        if self.transaction_depth > 0 {
            return Ok(0);
        }
        let recomputed = self.recompute();
        debug!("Transform commit recomputed {} world matrices", recomputed);
        Ok(recomputed)
    }

    fn in_transaction(&self) -> bool {
        self.transaction_depth > 0
    }

    fn len(&self) -> usize {
        self.live
    }
}

impl Default for HierarchyTransformManager {
    fn default() -> Self {
        Self::new()
    }
}
