use std::sync::Arc;

use crate::config::FailedTokenPolicy;
use crate::pipeline::circuit_breaker::{work_queue, WorkReceiver};
use crate::pipeline::tokens::MemoryTokenStore;
use crate::pipeline::{ExposureSignal, SignalReceiver, ACTION_EXPOSURE_STATE_UPDATED, EXTRA_TOKEN};

pub(super) fn receiver_with_policy(
    policy: FailedTokenPolicy,
) -> (SignalReceiver, Arc<MemoryTokenStore>, WorkReceiver) {
    let store = Arc::new(MemoryTokenStore::new());
    let (sender, queue) = work_queue();
    let receiver = SignalReceiver::new(store.clone(), sender, policy);
    (receiver, store, queue)
}

pub(super) fn receiver() -> (SignalReceiver, Arc<MemoryTokenStore>, WorkReceiver) {
    receiver_with_policy(FailedTokenPolicy::ReingestOnSignal)
}

pub(super) fn exposure_signal(token: &str) -> ExposureSignal {
    ExposureSignal::new(ACTION_EXPOSURE_STATE_UPDATED).with_extra(EXTRA_TOKEN, token)
}
