use braid_hashes::Hash;

/// Events emitted by the consensus engine toward external collaborators
/// (relay, indexers, RPC). A closed enumeration: adding a kind is a
/// compile-time exhaustiveness change for every listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsensusEvent {
    /// A block passed validation and entered the DAG
    BlockAccepted(Hash),

    /// The virtual selected-parent chain changed. `removed` is the unwound
    /// old-chain segment (tip first), `added` the applied new-chain segment
    /// (split point successor first).
    VirtualChainChanged { removed: Vec<Hash>, added: Vec<Hash> },

    /// A valid competing chain excludes the current finality point; requires
    /// operator attention, never resolved silently
    FinalityConflict { violating_block: Hash, finality_point: Hash },

    /// The pruning point advanced
    PruningPointMoved { previous: Hash, current: Hash },
}
