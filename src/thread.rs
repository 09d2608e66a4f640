//! Thread linker (spec.md §4.6). Builds an in-memory hash index over
//! Message-ID digests and links each `In-Reply-To`-bearing message to the
//! tail of its parent's thread. Grounded on `original_source/mailbox.c`'s
//! `link_threads`, reworked per spec.md §9 ("Hash-chained Message-ID table
//! built with a pool... model as `HashMap<[u8;16], Vec<RecordIndex>>`") and
//! using Brent's cycle-detection algorithm for the tail walk instead of a
//! separate visited set.

use std::collections::HashMap;

use crate::config::Config;
use crate::digest::{self, Hash};
use crate::index::record::MessageRecord;

/// Recomputes every record's `thread` substruct in place.
///
/// 1. Clears all `pn`/`nn` fields (breaks stale links from a prior run).
/// 2. Buckets every `HAVE_MSGID` record by the first two bytes of its
///    digest.
/// 3. For each `HAVE_IRT` record, finds a parent with a matching
///    `msgid_hash`, walks to that thread's current tail (bounded via a
///    doubling-stride cycle check), and appends this record as the new
///    tail.
pub fn link(records: &mut [MessageRecord], config: &Config) {
    for r in records.iter_mut() {
        r.thread.pn = 0;
        r.thread.nn = 0;
    }

    let day_start_of = day_starts(records);
    // `records[].thread.nn` stores the within-day ordinal the renderer needs
    // (see `append_as_tail`), which can't double as the chain pointer used to
    // walk a thread to its current tail: two records on different days can
    // share the same ordinal. `next_global` is the 1-based global-index chain
    // used only for that internal walk, scoped to this call.
    let mut next_global: Vec<u32> = vec![0; records.len()];

    let mut buckets: HashMap<u16, Vec<usize>> = HashMap::new();
    for (i, r) in records.iter().enumerate() {
        if r.has_msgid() {
            buckets
                .entry(digest::bucket_of(&r.msgid_hash))
                .or_default()
                .push(i);
        }
    }

    for i in 0..records.len() {
        if !records[i].has_irt() {
            continue;
        }
        let irt_hash: Hash = records[i].irt_hash;
        let Some(parent) = find_parent(records, &buckets, i, &irt_hash) else {
            continue;
        };
        let tail = walk_to_tail(&next_global, parent);
        if tail == i {
            continue; // already the tail of its own thread (self-reply edge case)
        }
        next_global[tail] = (i + 1) as u32;
        append_as_tail(records, config, &day_start_of, tail, i);
    }
}

/// For each record index, the index of the first record sharing its
/// `(y, m, d)`. Requires `records` sorted by date (as [`sort_records`]
/// leaves them): the per-day ordinals the renderer derives from the slot
/// array (`m1r = slot[aday] + n - 2`, spec.md §4.7) are `idx - day_start + 1`.
fn day_starts(records: &[MessageRecord]) -> Vec<usize> {
    let mut day_start_of = vec![0usize; records.len()];
    let mut day_start = 0;
    for i in 0..records.len() {
        if i > 0 && (records[i].y, records[i].m, records[i].d) != (records[i - 1].y, records[i - 1].m, records[i - 1].d)
        {
            day_start = i;
        }
        day_start_of[i] = day_start;
    }
    day_start_of
}

/// Looks up the bucket for `irt_hash` and linearly scans its chain for a
/// record (other than `self_idx`) whose `msgid_hash` matches.
fn find_parent(
    records: &[MessageRecord],
    buckets: &HashMap<u16, Vec<usize>>,
    self_idx: usize,
    irt_hash: &Hash,
) -> Option<usize> {
    let bucket = digest::bucket_of(irt_hash);
    let chain = buckets.get(&bucket)?;
    chain
        .iter()
        .copied()
        .find(|&idx| idx != self_idx && records[idx].msgid_hash == *irt_hash)
}

/// Walks forward along `next_global` from `start` to the last message of
/// its thread. Uses Brent's doubling-stride cycle detector (spec.md §4.6,
/// §9) so a corrupt or adversarial chain still terminates.
fn walk_to_tail(next_global: &[u32], start: usize) -> usize {
    let mut power: u64 = 1;
    let mut lambda_steps: u64 = 1;
    let mut seen = start;
    let mut current = start;

    loop {
        let next = next_global[current];
        if next == 0 {
            return current;
        }
        let next_idx = (next - 1) as usize;
        if next_idx >= next_global.len() || next_idx == seen {
            // cycle detected: stop at the current node rather than looping forever.
            return current;
        }
        current = next_idx;
        lambda_steps -= 1;
        if lambda_steps == 0 {
            seen = current;
            power *= 2;
            lambda_steps = power;
        }
    }
}

/// Appends record `child` as the new tail after `tail`, setting both sides'
/// prev/next ordinal and date fields. Ordinals are 1-based *within-day*
/// positions (spec.md §4.6, §4.7), not global array indices: `idx -
/// day_start_of[idx] + 1`.
fn append_as_tail(
    records: &mut [MessageRecord],
    _config: &Config,
    day_start_of: &[usize],
    tail: usize,
    child: usize,
) {
    let tail_rec = records[tail].clone();
    let child_rec = records[child].clone();
    let child_ordinal = (child - day_start_of[child] + 1) as u32;
    let tail_ordinal = (tail - day_start_of[tail] + 1) as u32;

    records[tail].thread.nn = child_ordinal;
    records[tail].thread.ny = child_rec.y;
    records[tail].thread.nm = child_rec.m;
    records[tail].thread.nd = child_rec.d;

    records[child].thread.pn = tail_ordinal;
    records[child].thread.py = tail_rec.y;
    records[child].thread.pm = tail_rec.m;
    records[child].thread.pd = tail_rec.d;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::record::FLAG_HAVE_IRT;
    use crate::index::record::FLAG_HAVE_MSGID;

    fn msg(y: u8, m: u8, d: u8, msgid: &[u8], irt: Option<&[u8]>) -> MessageRecord {
        let mut r = MessageRecord {
            y,
            m,
            d,
            ..Default::default()
        };
        r.msgid_hash = digest::hash_id(msgid);
        r.flags |= FLAG_HAVE_MSGID;
        if let Some(irt) = irt {
            r.irt_hash = digest::hash_id(irt);
            r.flags |= FLAG_HAVE_IRT;
        }
        r.set_strings("a", "s");
        r
    }

    #[test]
    fn s2_thread_of_three() {
        let mut records = vec![
            msg(1, 1, 1, b"r@x", None),
            msg(1, 1, 2, b"s@x", Some(b"r@x")),
            msg(1, 1, 3, b"t@x", Some(b"s@x")),
        ];
        let config = Config::default();
        link(&mut records, &config);

        // Each message is the only one on its day, so every within-day
        // ordinal is 1 — these are global array indices 0/1/2, not ordinals.
        assert_eq!(records[0].thread.nn, 1);
        assert_eq!(records[1].thread.pn, 1);
        assert_eq!(records[1].thread.nn, 1);
        assert_eq!(records[2].thread.pn, 1);
        assert_eq!(records[2].thread.nn, 0);
    }

    #[test]
    fn thread_ordinal_is_within_day_not_global_index() {
        // Two messages on day 1, then a reply to the second one lands on
        // day 2 as the *first* message of that day: its within-day ordinal
        // must be 1, even though its global array index is 2.
        let mut records = vec![
            msg(1, 1, 1, b"a@x", None),
            msg(1, 1, 1, b"b@x", Some(b"a@x")),
            msg(1, 1, 2, b"c@x", Some(b"b@x")),
        ];
        let config = Config::default();
        link(&mut records, &config);

        assert_eq!(records[1].thread.nn, 1, "c is the 1st message on day 2");
        assert_eq!(records[2].thread.pn, 2, "b is the 2nd message on day 1");
    }

    #[test]
    fn reply_cycle_terminates() {
        // A <-> B: A's In-Reply-To is B's Message-ID and vice versa. Both
        // ends get appended as each other's tail; the point of this test is
        // that `link` returns at all rather than looping on the resulting
        // mutual chain.
        let mut a = msg(1, 1, 1, b"a@x", Some(b"b@x"));
        let mut b = msg(1, 1, 2, b"b@x", Some(b"a@x"));
        // Pre-seed a cycle in `nn` as if from a stale prior run; `link`
        // clears it before walking, so this must have no effect on the result.
        a.thread.nn = 2;
        b.thread.nn = 1;
        let mut records = vec![a, b];
        let config = Config::default();
        link(&mut records, &config); // must return, not loop forever
        assert_eq!(records[0].thread.pn, 1);
        assert_eq!(records[1].thread.pn, 1);
    }

    #[test]
    fn missing_parent_is_skipped() {
        let mut records = vec![msg(1, 1, 1, b"a@x", Some(b"nonexistent@x"))];
        let config = Config::default();
        link(&mut records, &config);
        assert_eq!(records[0].thread.pn, 0);
        assert_eq!(records[0].thread.nn, 0);
    }
}
