//! Key command handlers: DEL, DELIF, PDEL, KEYS.

use super::pattern::{allowable_bounds, matches};
use super::{wrong_arity, Machine};
use crate::core::error::{NodeError, NodeResult};
use crate::protocol::{Command, RespValue};
use crate::replication::{Applier, Outcome};
use crate::store::keys::{copy_bytes, namespaced, user_key, USER_PREFIX};
use crate::store::WriteBatch;
use std::ops::Bound;

/// Default KEYS result cap.
const DEFAULT_KEYS_LIMIT: usize = 500;

/// Byte-substring containment; the empty needle matches everything.
fn value_contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

impl Machine {
    /// DEL k1 [k2 ...] and DELIF matchbytes k1 [k2 ...] - delete keys in
    /// argument order as one atomic batch and reply with the number of keys
    /// that were present. DELIF only deletes keys whose value contains
    /// `matchbytes` as a byte substring.
    pub(crate) fn cmd_del(
        &self,
        applier: &dyn Applier,
        cmd: &Command,
        delif: bool,
    ) -> NodeResult<RespValue> {
        if (delif && cmd.argc() < 3) || cmd.argc() < 2 {
            return Err(wrong_arity(cmd));
        }
        let (needle, start) = if delif {
            (copy_bytes(cmd.arg(1)), 2)
        } else {
            (Vec::new(), 1)
        };
        let targets: Vec<Vec<u8>> = cmd
            .args_from(start)
            .iter()
            .map(|k| namespaced(USER_PREFIX, k))
            .collect();

        applier.apply(
            cmd,
            Some(Box::new(move || {
                let state = self.state().write();
                let store = state.store()?;
                let mut batch = WriteBatch::new();
                let mut n = 0;
                for key in &targets {
                    let hit = if delif {
                        store
                            .get(key)?
                            .is_some_and(|value| value_contains(&value, &needle))
                    } else {
                        store.has(key)?
                    };
                    if hit {
                        n += 1;
                        batch.delete(key.clone());
                    }
                }
                store.write(batch)?;
                Ok(Outcome::Count(n))
            })),
            Box::new(|outcome| Ok(RespValue::Integer(outcome.count() as i64))),
        )
    }

    /// PDEL pattern - delete every key matching the glob pattern as one
    /// atomic batch; reply with the count.
    pub(crate) fn cmd_pdel(&self, applier: &dyn Applier, cmd: &Command) -> NodeResult<RespValue> {
        if cmd.argc() != 2 {
            return Err(wrong_arity(cmd));
        }
        let pattern = namespaced(USER_PREFIX, cmd.arg(1));
        let (lo, hi) = allowable_bounds(&pattern);

        applier.apply(
            cmd,
            Some(Box::new(move || {
                let state = self.state().write();
                let store = state.store()?;

                // Keys are copied out of the iterator before batching; the
                // scan's borrowed slices do not outlive a step.
                let mut doomed: Vec<Vec<u8>> = Vec::new();
                let upper = match &hi {
                    Some(hi) => Bound::Excluded(hi.as_slice()),
                    None => Bound::Unbounded,
                };
                store.scan(Bound::Included(lo.as_slice()), upper, false, |key, _| {
                    if matches(&pattern, key) {
                        doomed.push(copy_bytes(key));
                    }
                    Ok(true)
                })?;

                let mut batch = WriteBatch::new();
                let n = doomed.len();
                for key in doomed {
                    batch.delete(key);
                }
                store.write(batch)?;
                Ok(Outcome::Count(n))
            })),
            Box::new(|outcome| Ok(RespValue::Integer(outcome.count() as i64))),
        )
    }

    /// KEYS pattern [WITHVALUES] [PIVOT p] [LIMIT n] [DESC] - bounded scan
    /// over keys matching the glob pattern. Read-only.
    pub(crate) fn cmd_keys(&self, applier: &dyn Applier, cmd: &Command) -> NodeResult<RespValue> {
        if cmd.argc() < 2 {
            return Err(wrong_arity(cmd));
        }

        let mut withvalues = false;
        let mut desc = false;
        let mut pivot: Option<Vec<u8>> = None;
        let mut limit = DEFAULT_KEYS_LIMIT;

        let mut i = 2;
        while i < cmd.argc() {
            let option = String::from_utf8_lossy(cmd.arg(i)).to_lowercase();
            match option.as_str() {
                "withvalues" => withvalues = true,
                "desc" => desc = true,
                "pivot" => {
                    i += 1;
                    if i == cmd.argc() {
                        return Err(NodeError::Syntax);
                    }
                    pivot = Some(namespaced(USER_PREFIX, cmd.arg(i)));
                }
                "limit" => {
                    i += 1;
                    if i == cmd.argc() {
                        return Err(NodeError::Syntax);
                    }
                    let n = std::str::from_utf8(cmd.arg(i))
                        .ok()
                        .and_then(|s| s.parse::<i64>().ok())
                        .ok_or(NodeError::Syntax)?;
                    if n < 0 {
                        return Err(NodeError::Syntax);
                    }
                    limit = n as usize;
                }
                _ => return Err(NodeError::Syntax),
            }
            i += 1;
        }

        let pattern = namespaced(USER_PREFIX, cmd.arg(1));
        let (lo, hi) = allowable_bounds(&pattern);

        applier.apply(
            cmd,
            None,
            Box::new(move |_| {
                let state = self.state().read();
                let store = state.store()?;

                // The pivot is strict and only ever tightens the pattern's
                // natural bounds: ascending it raises the lower bound,
                // descending it lowers the upper bound.
                let lower: Bound<&[u8]>;
                let upper: Bound<&[u8]>;
                if desc {
                    lower = Bound::Included(lo.as_slice());
                    upper = match (&pivot, &hi) {
                        (Some(p), Some(h)) if p.as_slice() < h.as_slice() => {
                            Bound::Excluded(p.as_slice())
                        }
                        (Some(p), None) => Bound::Excluded(p.as_slice()),
                        (_, Some(h)) => Bound::Excluded(h.as_slice()),
                        (None, None) => Bound::Unbounded,
                    };
                } else {
                    lower = match &pivot {
                        Some(p) if p.as_slice() >= lo.as_slice() => {
                            Bound::Excluded(p.as_slice())
                        }
                        _ => Bound::Included(lo.as_slice()),
                    };
                    upper = match &hi {
                        Some(h) => Bound::Excluded(h.as_slice()),
                        None => Bound::Unbounded,
                    };
                }

                // A pivot outside the pattern bounds can invert the
                // interval; that is an empty result, not a scan.
                let empty_interval = match (&lower, &upper) {
                    (Bound::Included(a), Bound::Excluded(b)) => a >= b,
                    (Bound::Excluded(a), Bound::Excluded(b)) => a >= b,
                    _ => false,
                };
                if empty_interval {
                    return Ok(RespValue::Array(Vec::new()));
                }

                let mut found_keys: Vec<Vec<u8>> = Vec::new();
                let mut found_values: Vec<Vec<u8>> = Vec::new();
                store.scan(lower, upper, desc, |key, value| {
                    if found_keys.len() == limit {
                        return Ok(false);
                    }
                    if matches(&pattern, key) {
                        found_keys.push(copy_bytes(user_key(key)));
                        if withvalues {
                            found_values.push(copy_bytes(value));
                        }
                    }
                    Ok(true)
                })?;

                let mut reply = Vec::with_capacity(if withvalues {
                    found_keys.len() * 2
                } else {
                    found_keys.len()
                });
                if withvalues {
                    for (key, value) in found_keys.into_iter().zip(found_values) {
                        reply.push(RespValue::Bulk(key.into()));
                        reply.push(RespValue::Bulk(value.into()));
                    }
                } else {
                    for key in found_keys {
                        reply.push(RespValue::Bulk(key.into()));
                    }
                }
                Ok(RespValue::Array(reply))
            }),
        )
    }
}
