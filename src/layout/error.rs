pub type Result<T> = std::result::Result<T, LayoutError>;

/// Failures raised by a layout strategy.
///
/// These are never recovered into a degraded drawing: a layout with broken
/// containment is worse than no layout.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("duplicate node id: {id}")]
    DuplicateNode { id: String },

    #[error("node {id} has invalid size {width}x{height}")]
    InvalidNodeSize { id: String, width: f32, height: f32 },

    #[error("parent chain of node {id} contains a cycle")]
    ParentCycle { id: String },

    #[error("non-finite geometry produced for {id}")]
    NonFiniteGeometry { id: String },

    #[error("container {container} does not enclose child {child}")]
    ContainmentViolated { container: String, child: String },

    #[error("invalid layout config: {message}")]
    InvalidConfig { message: String },
}
