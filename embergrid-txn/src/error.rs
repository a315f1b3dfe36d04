use embergrid_base::TransactionId;

/// Error taxonomy for transaction execution (spec §7). Distinct from
/// `embergrid_base::Error`: these are expected, typed outcomes of
/// running a transaction, not unexpected-failure wrappers, so the
/// executor and procedure host branch on them explicitly instead of
/// unwinding (spec §9: "exceptions for control flow ... express as a
/// tagged error value").
#[derive(Clone, Debug)]
pub enum ExecError {
    /// Raised by the procedure body itself.
    UserAbort,
    /// An SP-predicted transaction touched another partition.
    Mispredict(TransactionId),
    /// The engine raised an error executing a fragment.
    EeError(String),
    /// The engine raised a SQL-level error executing a fragment.
    SqlError(String),
    /// Parameter decoding failed.
    DeserializeError(String),
    /// A commit/abort/response referenced a txn_id not in the table.
    UnknownTxn(TransactionId),
    /// A participant refused its prepare vote; the whole transaction
    /// must abort even though its own procedure body never asked to.
    PrepareRefused,
    /// Assertion violation; the executor must signal the supervisor
    /// to shut the cluster down.
    Fatal(String),
}

impl ExecError {
    /// The `ClientResponse` status this error maps to, for every
    /// variant that reaches a client (an `UnknownTxn` or `Fatal` never
    /// does: the former is silently ignored, the latter escalates).
    pub fn is_user_abort(&self) -> bool {
        matches!(self, ExecError::UserAbort)
    }

    pub fn is_mispredict(&self) -> bool {
        matches!(self, ExecError::Mispredict(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecError::Fatal(_))
    }
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::UserAbort => write!(f, "user abort"),
            ExecError::Mispredict(txn_id) => write!(f, "mispredict on {txn_id}"),
            ExecError::EeError(msg) => write!(f, "engine error: {msg}"),
            ExecError::SqlError(msg) => write!(f, "sql error: {msg}"),
            ExecError::DeserializeError(msg) => write!(f, "deserialize error: {msg}"),
            ExecError::UnknownTxn(txn_id) => write!(f, "unknown transaction {txn_id}"),
            ExecError::PrepareRefused => write!(f, "a participant refused the prepare vote"),
            ExecError::Fatal(msg) => write!(f, "fatal: {msg}"),
        }
    }
}

impl std::error::Error for ExecError {}
