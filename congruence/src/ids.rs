use tc_collections::create_ref_type;

create_ref_type!(NodeId);

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.to_u32())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_u32())
    }
}

/// Node `0` is the initial class and is active for the lifetime of the engine.
pub const ROOT: NodeId = NodeId::from_u32(0);
