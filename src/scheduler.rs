use crossbeam_channel::{bounded, select, Receiver};
use sha2::{Digest, Sha256};

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::model::{Mutation, MutationType, Source};
use crate::mutagens;

/// Output channel buffer: one slot per worker, at least one. Back-pressure
/// propagates from consumers to the generator through the channel.
pub fn buffer_size(workers: usize) -> usize {
    workers.max(1)
}

/// Feed an already-discovered source list into a channel.
pub fn source_channel(sources: Vec<Source>, workers: usize) -> Receiver<Source> {
    let (tx, rx) = bounded(buffer_size(workers));

    std::thread::spawn(move || {
        for source in sources {
            if tx.send(source).is_err() {
                return;
            }
        }
    });

    rx
}

/// Stream mutations for sources arriving on a channel.
///
/// Generation is single-threaded per source; parallelism lives on the
/// testing side. The mutation channel closes when the input drains or the
/// token fires; at most one error is delivered on the sink before closure.
pub fn stream_mutations(
    sources: Receiver<Source>,
    types: Vec<MutationType>,
    workers: usize,
    token: CancelToken,
) -> (Receiver<Mutation>, Receiver<Error>) {
    let (tx, rx) = bounded(buffer_size(workers));
    let (err_tx, err_rx) = bounded(1);

    std::thread::spawn(move || {
        for source in sources.iter() {
            if token.is_cancelled() {
                let _ = err_tx.try_send(Error::Cancelled);
                return;
            }

            let mutations = match mutagens::generate(&source, &types, &token) {
                Ok(mutations) => mutations,
                Err(err @ Error::Parse { .. }) => {
                    // A file that does not parse is skipped; the run goes on.
                    tracing::warn!(
                        path = %source.origin.path.display(),
                        error = %err,
                        "skipping unparseable source"
                    );
                    continue;
                }
                Err(err) => {
                    tracing::error!(
                        path = %source.origin.path.display(),
                        error = %err,
                        "failed to generate mutations"
                    );
                    let _ = err_tx.try_send(err);
                    return;
                }
            };

            for mutation in mutations {
                select! {
                    recv(token.signal()) -> _ => {
                        let _ = err_tx.try_send(Error::Cancelled);
                        return;
                    }
                    send(tx, mutation) -> sent => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });

    (rx, err_rx)
}

/// Big-endian 32-bit prefix of the ID's SHA-256, the shard selector.
pub fn shard_key(id: &str) -> u32 {
    let digest = Sha256::digest(id.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Deterministic, order-independent shard membership.
pub fn in_shard(id: &str, shard_index: u32, total_shards: u32) -> bool {
    if total_shards <= 1 {
        return true;
    }

    shard_key(id) % total_shards == shard_index
}

/// Filter a mutation stream down to one shard. Pass-through when sharding
/// is disabled.
pub fn shard_stream(
    input: Receiver<Mutation>,
    shard_index: u32,
    total_shards: u32,
    workers: usize,
    token: CancelToken,
) -> Receiver<Mutation> {
    let (tx, rx) = bounded(buffer_size(workers));

    std::thread::spawn(move || {
        for mutation in input.iter() {
            if !in_shard(&mutation.id, shard_index, total_shards) {
                continue;
            }

            select! {
                recv(token.signal()) -> _ => return,
                send(tx, mutation) -> sent => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    });

    rx
}
