/// Topological agreement metric used to compare candidate refinements
/// against the Neighbor-Joining reference tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreakMetric {
    /// Count of shared non-trivial clades
    #[default]
    Bipartition,
    /// Count of identically-resolved leaf quartets
    Quartet,
}

impl TieBreakMetric {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bipartition" => Some(Self::Bipartition),
            "quartet" => Some(Self::Quartet),
            _ => None,
        }
    }
}

/// Immutable resolution settings, threaded through all calls.
#[derive(Debug, Clone)]
pub struct ResolveConfig {
    /// Weight of one duplication event
    pub dup_weight: f64,

    /// Weight of one loss event
    pub loss_weight: f64,

    /// Maximum number of complete candidate refinements examined per
    /// polytomy. On overrun, enumeration stops with the best-found set and
    /// the result is flagged as truncated. 0 leaves polytomies unresolved.
    pub candidate_ceiling: usize,

    /// Agreement metric for distance-based tie-breaking
    pub tie_break_metric: TieBreakMetric,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            dup_weight: 1.0,
            loss_weight: 1.0,
            candidate_ceiling: 10_000,
            tie_break_metric: TieBreakMetric::Bipartition,
        }
    }
}
