//! Point-to-point exchange helpers shared by index discovery and the
//! interface communicators.
//!
//! Every helper posts all of its sends first, then waits on every receive,
//! and always drains all handles before returning, even on error. A payload
//! addressed to the calling rank itself never touches the transport; it is
//! handed straight to the output.

use std::collections::{BTreeMap, BTreeSet};

use crate::algs::communicator::{CommTag, Communicator, ExchangeTags, Wait};
use crate::algs::wire::{WireCount, cast_slice, pod_vec_from};
use crate::par_error::ParIndexError;

fn fail<C: Communicator>(comm: &C, err: ParIndexError) -> ParIndexError {
    log::warn!("rank {}: {err}", comm.rank());
    comm.on_protocol_error(&err);
    err
}

/// Send `outgoing[peer]` to each peer and receive exactly `expected[peer]`
/// bytes from each expected peer.
///
/// Returns a map `peer → bytes` once all receives have completed.
pub fn exchange_bytes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    outgoing: &BTreeMap<usize, Vec<u8>>,
    expected: &BTreeMap<usize, usize>,
) -> Result<BTreeMap<usize, Vec<u8>>, ParIndexError> {
    let me = comm.rank();

    // 1) post all sends
    let mut pending_sends = Vec::with_capacity(outgoing.len());
    for (&peer, bytes) in outgoing {
        if peer == me {
            continue;
        }
        log::trace!("rank {me}: send {} bytes to {peer} (tag {})", bytes.len(), tag.as_u16());
        pending_sends.push(comm.isend(peer, tag.as_u16(), bytes));
    }

    // 2) post all receives
    let mut pending_recvs = Vec::with_capacity(expected.len());
    for (&peer, &len) in expected {
        if peer == me {
            continue;
        }
        let mut buf = vec![0u8; len];
        let h = comm.irecv(peer, tag.as_u16(), &mut buf);
        pending_recvs.push((peer, len, h));
    }

    // 3) wait for all recvs (but do not early-return)
    let mut received = BTreeMap::new();
    let mut maybe_err = None;
    if let Some(&len) = expected.get(&me) {
        let own = outgoing.get(&me).cloned().unwrap_or_default();
        if own.len() != len {
            maybe_err = Some(ParIndexError::ProtocolMismatch {
                neighbor: me,
                reason: format!("self message of {} bytes, expected {len}", own.len()),
            });
        } else {
            received.insert(me, own);
        }
    }
    for (peer, len, h) in pending_recvs {
        match h.wait() {
            Some(data) if data.len() == len => {
                if maybe_err.is_none() {
                    received.insert(peer, data);
                }
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(ParIndexError::ProtocolMismatch {
                    neighbor: peer,
                    reason: format!("expected {len} bytes, got {}", data.len()),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(ParIndexError::CommError {
                    neighbor: peer,
                    source: format!("failed to receive from rank {peer}").into(),
                });
            }
            _ => {} // already have an error; just drain
        }
    }

    // 4) always drain all send handles before returning
    for send in pending_sends {
        let _ = send.wait();
    }

    match maybe_err {
        Some(err) => Err(fail(comm, err)),
        None => Ok(received),
    }
}

/// Exchange the byte length of `outgoing[peer]` with every peer in
/// `outgoing`, and receive one length from every peer in `incoming`.
pub fn exchange_sizes<C: Communicator>(
    comm: &C,
    tag: CommTag,
    outgoing: &BTreeMap<usize, Vec<u8>>,
    incoming: &BTreeSet<usize>,
) -> Result<BTreeMap<usize, usize>, ParIndexError> {
    let counts: BTreeMap<usize, Vec<u8>> = outgoing
        .iter()
        .map(|(&peer, bytes)| {
            let c = WireCount::new(bytes.len())?;
            Ok((peer, cast_slice(std::slice::from_ref(&c)).to_vec()))
        })
        .collect::<Result<_, ParIndexError>>()?;
    let expected: BTreeMap<usize, usize> = incoming
        .iter()
        .map(|&peer| (peer, std::mem::size_of::<WireCount>()))
        .collect();
    let raw = exchange_bytes(comm, tag, &counts, &expected)?;
    Ok(raw
        .into_iter()
        .map(|(peer, bytes)| {
            let c: Vec<WireCount> = pod_vec_from(&bytes);
            (peer, c[0].get())
        })
        .collect())
}

/// Two-phase exchange of variable-length payloads: lengths first, then data.
pub fn exchange_with_sizes<C: Communicator>(
    comm: &C,
    tags: ExchangeTags,
    outgoing: &BTreeMap<usize, Vec<u8>>,
    incoming: &BTreeSet<usize>,
) -> Result<BTreeMap<usize, Vec<u8>>, ParIndexError> {
    let sizes = exchange_sizes(comm, tags.sizes, outgoing, incoming)?;
    exchange_bytes(comm, tags.data, outgoing, &sizes)
}
