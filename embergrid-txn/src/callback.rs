use parking_lot::Mutex;

use embergrid_base::{PartitionId, TransactionId};

/// The three observable states every callback passes through (spec
/// §4.3): `armed` while waiting for its first response, `fired` once
/// at least one response has landed, `finished` once the expected
/// count reaches zero or the callback is explicitly aborted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallbackState {
    Armed,
    Fired,
    Finished,
}

/// The counting state machine shared by every callback variant.
/// Deliberately holds no reference to the owning `TransactionState` --
/// per the design note on cyclic references, a callback is looked up
/// by `(txn_id, partition_id)` in the executor's transaction table
/// rather than pinning the state alive with a back-pointer.
#[derive(Debug)]
pub struct CallbackSlot {
    txn_id: TransactionId,
    partition_id: PartitionId,
    inner: Mutex<SlotInner>,
}

#[derive(Debug)]
struct SlotInner {
    state: CallbackState,
    expected: usize,
    received: usize,
}

impl CallbackSlot {
    pub fn new(txn_id: TransactionId, partition_id: PartitionId, expected: usize) -> Self {
        CallbackSlot {
            txn_id,
            partition_id,
            inner: Mutex::new(SlotInner {
                state: if expected == 0 {
                    CallbackState::Finished
                } else {
                    CallbackState::Armed
                },
                expected,
                received: 0,
            }),
        }
    }

    pub fn txn_id(&self) -> TransactionId {
        self.txn_id
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub fn state(&self) -> CallbackState {
        self.inner.lock().state
    }

    pub fn is_finished(&self) -> bool {
        self.state() == CallbackState::Finished
    }

    /// Resets an idle (pooled) slot for reuse by a new transaction.
    pub fn rearm(&mut self, txn_id: TransactionId, partition_id: PartitionId, expected: usize) {
        self.txn_id = txn_id;
        self.partition_id = partition_id;
        self.arm(expected);
    }

    /// Re-arms this slot for a new wave of responses on the same
    /// transaction (e.g. a fresh prepare or finish wave), without
    /// disturbing its `(txn_id, partition_id)` identity.
    pub fn arm(&mut self, expected: usize) {
        let mut inner = self.inner.lock();
        inner.state = if expected == 0 {
            CallbackState::Finished
        } else {
            CallbackState::Armed
        };
        inner.expected = expected;
        inner.received = 0;
    }

    /// Records one response. armed -> fired on the first call,
    /// fired -> finished once `received` reaches `expected`. Returns
    /// `true` exactly when this call transitioned the slot to
    /// `finished`.
    pub fn on_response(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == CallbackState::Finished {
            return false;
        }
        inner.received += 1;
        if inner.state == CallbackState::Armed {
            inner.state = CallbackState::Fired;
        }
        if inner.received >= inner.expected {
            inner.state = CallbackState::Finished;
            true
        } else {
            false
        }
    }

    /// Forces the slot to `finished` regardless of outstanding count
    /// (any state -> finished on explicit abort, spec §4.3).
    pub fn abort(&self) -> bool {
        let mut inner = self.inner.lock();
        let was_finished = inner.state == CallbackState::Finished;
        inner.state = CallbackState::Finished;
        !was_finished
    }
}

macro_rules! callback_variant {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug)]
        pub struct $name {
            pub slot: CallbackSlot,
        }

        impl $name {
            pub fn new(txn_id: TransactionId, partition_id: PartitionId, expected: usize) -> Self {
                $name {
                    slot: CallbackSlot::new(txn_id, partition_id, expected),
                }
            }

            pub fn rearm(&mut self, txn_id: TransactionId, partition_id: PartitionId, expected: usize) {
                self.slot.rearm(txn_id, partition_id, expected);
            }

            pub fn arm(&mut self, expected: usize) {
                self.slot.arm(expected);
            }

            pub fn on_response(&self) -> bool {
                self.slot.on_response()
            }

            pub fn abort(&self) -> bool {
                self.slot.abort()
            }

            pub fn is_finished(&self) -> bool {
                self.slot.is_finished()
            }
        }
    };
}

callback_variant!(
    InitCallback,
    "Awaits acknowledgements from the init-queue on each participating \
     partition; its completion triggers procedure invocation."
);
callback_variant!(
    InitQueueCallback,
    "Fires locally when the remote executor has admitted the \
     transaction to its queue."
);
callback_variant!(
    WorkCallback,
    "Aggregates fragment responses for an in-flight batch."
);
callback_variant!(
    PrepareCallback,
    "Awaits ready-to-commit acks from participants; failure on any \
     participant converts the outcome to abort."
);
callback_variant!(
    FinishCallback,
    "Awaits commit/abort acks from participants; drives the cleanup \
     callback."
);
callback_variant!(
    CleanupCallback,
    "Fires when the transaction's final ack is received on the remote \
     side, releasing the RemoteTransactionState."
);

/// Forwards a client request that arrived at the wrong base partition,
/// then relays the far-side response back to the originator. Modeled
/// as a pair rather than a single slot since it tracks both legs of
/// the round trip independently.
#[derive(Debug)]
pub struct RedirectCallback {
    pub outbound: CallbackSlot,
    pub inbound: CallbackSlot,
}

impl RedirectCallback {
    pub fn new(txn_id: TransactionId, partition_id: PartitionId) -> Self {
        RedirectCallback {
            outbound: CallbackSlot::new(txn_id, partition_id, 1),
            inbound: CallbackSlot::new(txn_id, partition_id, 1),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outbound.is_finished() && self.inbound.is_finished()
    }
}
