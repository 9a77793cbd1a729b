use super::TransactionRecord;

/// Invoked by the gateway once per committed mutation, before the mutation
/// call returns to its caller.
pub trait PostCommitHook: Send + Sync {
    fn after_commit(&self, record: &TransactionRecord);
}

impl<F> PostCommitHook for F
where
    F: Fn(&TransactionRecord) + Send + Sync,
{
    fn after_commit(&self, record: &TransactionRecord) {
        self(record)
    }
}
