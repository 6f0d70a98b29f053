// # Common Types
//
// Shared identifiers used across the coordination module and its callers.

/// Logical identifier for a cluster node (worker/backend).
pub type NodeId = String;
