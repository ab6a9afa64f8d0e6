use crate::operation::Operation;

/// Implemented by anything that can checkpoint operations before they run.
///
/// The policy engine consults this to tell the user up front when a risky
/// operation will have no way back.
pub trait Recoverability: Send + Sync {
    /// Whether a checkpoint strategy exists for this operation.
    fn supports(&self, operation: &Operation) -> bool;
}
