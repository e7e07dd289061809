use std::fmt;

use glam::Mat4;

/// Names one backend node. The generation tells a recycled slot apart from
/// the node that used it before, so handles to destroyed nodes stay invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransformHandle {
    slot: u32,
    generation: u32,
}

impl TransformHandle {
    pub(crate) fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TransformHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}.{}", self.slot, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("invalid transform handle {0}")]
    InvalidHandle(TransformHandle),

    #[error("parenting {child} under {parent} would create a cycle")]
    Cycle {
        child: TransformHandle,
        parent: TransformHandle,
    },

    #[error("no transaction is open")]
    NoTransaction,
}

/// Handle-based transform hierarchy owned by the render backend.
///
/// World matrices are computed by the backend. Inside a transaction, local
/// and parent changes are recorded but world matrices are only recomputed
/// when the outermost transaction commits.
pub trait TransformBackend: Send {
    /// Create a node with an identity local matrix, optionally under `parent`.
    fn create(&mut self, parent: Option<TransformHandle>) -> Result<TransformHandle, BackendError>;

    /// Destroy a node. Its children move up to the destroyed node's parent.
    fn destroy(&mut self, handle: TransformHandle) -> Result<(), BackendError>;

    fn is_valid(&self, handle: TransformHandle) -> bool;

    fn set_local(&mut self, handle: TransformHandle, local: Mat4) -> Result<(), BackendError>;

    fn local(&self, handle: TransformHandle) -> Result<Mat4, BackendError>;

    fn world(&self, handle: TransformHandle) -> Result<Mat4, BackendError>;

    fn parent(&self, handle: TransformHandle) -> Result<Option<TransformHandle>, BackendError>;

    /// Re-link a node. Fails with [`BackendError::Cycle`] if `parent` is the
    /// node itself or one of its descendants.
    fn set_parent(
        &mut self,
        handle: TransformHandle,
        parent: Option<TransformHandle>,
    ) -> Result<(), BackendError>;

    fn begin_transaction(&mut self);

    /// Close a transaction. Returns how many world matrices were recomputed,
    /// which is zero for nested commits.
    fn commit_transaction(&mut self) -> Result<usize, BackendError>;

    fn in_transaction(&self) -> bool;

    /// Number of live nodes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
