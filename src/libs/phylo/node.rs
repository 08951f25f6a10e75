use std::collections::BTreeMap;

/// NodeId is an index into the Tree's node arena.
/// It is lightweight (Copy) and safe (no pointers).
pub type NodeId = usize;

#[derive(Debug, Clone)]
pub struct Node {
    /// Unique identifier for the node (index in the arena)
    pub id: NodeId,

    /// Parent node ID (None for root)
    pub parent: Option<NodeId>,

    /// List of child node IDs
    pub children: Vec<NodeId>,

    // --- Payload ---
    /// Node name/label (taxon name for leaves, arbitrary for internal nodes)
    pub name: Option<String>,

    /// Branch length to parent.
    /// In rooted trees, edge length is an attribute of the child node.
    pub length: Option<f64>,

    /// Structured properties (NHX tags like [&&NHX:S=human:D=Y]).
    /// Reconciliation events are reported through the `D` tag.
    /// BTreeMap ensures deterministic output order.
    pub properties: Option<BTreeMap<String, String>>,

    /// Soft deletion flag.
    /// Use Tree::compact() to permanently remove deleted nodes.
    pub deleted: bool,
}

impl Node {
    /// Create a new empty node with a specific ID
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            name: None,
            length: None,
            properties: None,
            deleted: false,
        }
    }

    /// Set the name of the node
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Add a property (key-value pair)
    pub fn add_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
    }

    /// Check if the node is a leaf (no children)
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
