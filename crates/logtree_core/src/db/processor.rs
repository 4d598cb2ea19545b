//! The log processor.
//!
//! A single thread that decides log positions strictly in order. For each
//! position it:
//!
//! 1. takes the record staged by a local writer, or reads it from the log
//! 2. validates it against the last committed state
//! 3. publishes the new tree, or records the conflict
//!
//! Positions below the tail that stay unwritten for `hole_retry_limit` polls
//! are filled so that a crashed writer cannot stall the log.

use super::{Decision, Shared, State};
use crate::error::{CoreError, CoreResult};
use crate::intention::{Intention, Origin};
use crate::node::NodePtr;
use crate::snapshot::Snapshot;
use crate::types::Version;
use logtree_codec::{Decode, IntentionRecord};
use logtree_log::{LogEntry, LogError, Position};
use std::sync::Arc;

/// Outcome of one processing attempt.
enum Step {
    /// A position was decided.
    Advanced,
    /// Nothing was decided; try again after a pause.
    Retry,
    /// Caught up with the tail.
    Idle,
}

/// What occupies the next position.
enum Slot {
    Record(IntentionRecord),
    Filled,
    Corrupt(String),
}

pub(super) fn run(shared: &Shared) {
    tracing::debug!("log processor started");
    let mut holes = 0u32;
    loop {
        if shared.state.lock().shutdown {
            break;
        }
        match step(shared, &mut holes) {
            Step::Advanced => {}
            outcome => {
                let mut state = shared.state.lock();
                let ready = matches!(outcome, Step::Idle) && has_staged(&state);
                if !state.shutdown && !ready {
                    shared
                        .work
                        .wait_for(&mut state, shared.config.poll_interval);
                }
            }
        }
    }
    tracing::debug!("log processor stopped");
}

fn has_staged(state: &State) -> bool {
    state.staged.contains_key(&state.next)
}

fn step(shared: &Shared, holes: &mut u32) -> Step {
    let (position, staged) = {
        let mut state = shared.state.lock();
        let position = state.next;
        (position, state.staged.remove(&position))
    };

    let slot = match staged {
        Some(record) => Slot::Record(record),
        None => match read_slot(shared, position, holes) {
            Some(slot) => slot,
            None => return Step::Idle,
        },
    };
    *holes = 0;

    let decision = match slot {
        Slot::Filled => {
            tracing::debug!(position, "position filled");
            publish(shared, position, None, Decision::Filled);
            return Step::Advanced;
        }
        Slot::Corrupt(message) => Decision::Corrupt(message),
        Slot::Record(record) => match apply(shared, &record, position) {
            Ok(Some(snapshot)) => {
                publish(shared, position, Some(snapshot), Decision::Committed);
                return Step::Advanced;
            }
            Ok(None) => Decision::Conflict,
            Err(CoreError::Storage(e)) => {
                tracing::warn!(position, error = %e, "log read failed, retrying");
                shared.state.lock().staged.insert(position, record);
                return Step::Retry;
            }
            Err(e) => Decision::Corrupt(e.to_string()),
        },
    };

    if let Decision::Corrupt(message) = &decision {
        tracing::error!(position, error = %message, "cannot apply intention");
    } else {
        tracing::debug!(position, "intention conflicted");
    }
    publish(shared, position, None, decision);
    Step::Advanced
}

/// Reads the next position from the log. `None` means nothing can be
/// decided yet.
fn read_slot(shared: &Shared, position: Position, holes: &mut u32) -> Option<Slot> {
    match shared.log.read(position) {
        Ok(LogEntry::Data(bytes)) => Some(match IntentionRecord::decode(&bytes) {
            Ok(mut record) => {
                record.stamp(position);
                Slot::Record(record)
            }
            Err(e) => Slot::Corrupt(e.to_string()),
        }),
        Ok(LogEntry::Filled) => Some(Slot::Filled),
        Err(LogError::NotWritten { tail, .. }) if position < tail => {
            *holes += 1;
            if *holes < shared.config.hole_retry_limit {
                return None;
            }
            match shared.log.fill(position) {
                Ok(()) => {
                    tracing::warn!(position, polls = *holes, "filled hole in log");
                    shared.stats.record_fill();
                    Some(Slot::Filled)
                }
                Err(LogError::AlreadyWritten { .. }) => None,
                Err(e) => {
                    tracing::warn!(position, error = %e, "cannot fill hole");
                    None
                }
            }
        }
        Err(LogError::NotWritten { .. }) => None,
        Err(e) => {
            tracing::warn!(position, error = %e, "log read failed, retrying");
            None
        }
    }
}

/// Validates `record` against the last committed state and builds the tree
/// it commits. `None` means the record conflicts.
fn apply(
    shared: &Shared,
    record: &IntentionRecord,
    position: Position,
) -> CoreResult<Option<Snapshot>> {
    record
        .validate()
        .map_err(|e| CoreError::corrupt_payload(position, e.to_string()))?;
    let lcs = Arc::clone(&shared.state.lock().lcs);

    if record.snapshot != lcs.position() {
        if let Some(reason) = find_conflict(record, &lcs) {
            tracing::debug!(position, snapshot = ?record.snapshot, reason, "validation failed");
            return Ok(None);
        }
    }

    let (root, running) = shared.cache.cache_intention(record, position, lcs.version())?;
    let description = shared.config.description.clone();
    if record.snapshot == lcs.position() {
        return Ok(Some(Snapshot::new(root, position, running, description)));
    }

    let (root, version) = meld(shared, record, position, &lcs, running).map_err(|e| {
        shared.cache.discard(position);
        e
    })?;
    shared.stats.record_meld();
    Ok(Some(Snapshot::new(root, position, version, description)))
}

/// Returns why `record`, built on an older snapshot, cannot be applied on
/// top of `lcs`.
fn find_conflict(record: &IntentionRecord, lcs: &Snapshot) -> Option<&'static str> {
    let overwritten = record
        .nodes
        .iter()
        .filter(|node| node.depends)
        .any(|node| lcs.version_of(&node.key) != node.ssv);
    if overwritten {
        return Some("write over a changed key");
    }
    let stale_read = record
        .reads
        .iter()
        .any(|read| lcs.version_of(&read.key) != read.version);
    if stale_read {
        return Some("read a changed key");
    }
    let stale_delete = record
        .deletes
        .iter()
        .any(|delete| lcs.version_of(&delete.key) != delete.version);
    if stale_delete {
        return Some("delete of a changed key");
    }
    None
}

/// Replays the effects of `record` onto the last committed tree.
///
/// Produced nodes belong to `position` with offsets after the record's own
/// nodes, and are pinned in the cache since the log holds no image of them.
fn meld(
    shared: &Shared,
    record: &IntentionRecord,
    position: Position,
    lcs: &Snapshot,
    running: Version,
) -> CoreResult<(NodePtr, Version)> {
    let mut intention = Intention::new(lcs.root(), lcs.position())?;
    for delete in &record.deletes {
        intention.delete(&delete.key)?;
    }
    for (index, node) in record.nodes.iter().enumerate() {
        if node.altered {
            let version = lcs.version() + index as u64 + 1;
            let origin = Origin::Committed(version);
            intention.put_with(node.key.clone(), node.value.clone(), origin)?;
        }
    }

    let first_index = u32::try_from(record.nodes.len())
        .map_err(|_| CoreError::corrupt_payload(position, "too many nodes"))?;
    let materialized = intention.materialize(position, first_index, running)?;
    for node in &materialized.nodes {
        shared.cache.insert_pinned(Arc::clone(node));
    }
    tracing::debug!(
        position,
        melded = materialized.nodes.len(),
        "melded intention onto newer state"
    );
    Ok((materialized.root, materialized.next_version))
}

fn publish(shared: &Shared, position: Position, snapshot: Option<Snapshot>, decision: Decision) {
    {
        let mut state = shared.state.lock();
        if let Some(snapshot) = snapshot {
            state.lcs = Arc::new(snapshot);
        }
        state.staged.remove(&position);
        state.decisions.insert(position, decision.clone());
        state.next = position + 1;
    }
    shared.stats.record_position();
    if matches!(decision, Decision::Corrupt(_)) {
        shared.stats.record_corrupt();
    }
    shared.decided.notify_all();
}
