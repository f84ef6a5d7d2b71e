//! String command handlers: ECHO, SET, MSET, GET, MGET.

use super::{wrong_arity, Machine};
use crate::core::error::NodeResult;
use crate::protocol::{Command, RespValue};
use crate::replication::{Applier, Outcome};
use crate::store::keys::{copy_bytes, namespaced, USER_PREFIX};
use crate::store::WriteBatch;
use bytes::Bytes;

impl Machine {
    /// ECHO v - reply with `v` as a bulk string. Not replicated.
    pub(crate) fn cmd_echo(&self, cmd: &Command) -> NodeResult<RespValue> {
        if cmd.argc() != 2 {
            return Err(wrong_arity(cmd));
        }
        Ok(RespValue::Bulk(Bytes::copy_from_slice(cmd.arg(1))))
    }

    /// SET k v - store one record, reply OK.
    pub(crate) fn cmd_set(&self, applier: &dyn Applier, cmd: &Command) -> NodeResult<RespValue> {
        if cmd.argc() != 3 {
            return Err(wrong_arity(cmd));
        }
        let key = namespaced(USER_PREFIX, cmd.arg(1));
        let value = copy_bytes(cmd.arg(2));
        applier.apply(
            cmd,
            Some(Box::new(move || {
                let state = self.state().write();
                state.store()?.put(&key, &value)?;
                Ok(Outcome::Unit)
            })),
            Box::new(|_| Ok(RespValue::ok())),
        )
    }

    /// MSET k1 v1 [k2 v2 ...] - store pairs in argument order as one atomic
    /// batch; later duplicates win. Reply OK.
    pub(crate) fn cmd_mset(&self, applier: &dyn Applier, cmd: &Command) -> NodeResult<RespValue> {
        if cmd.argc() < 3 || (cmd.argc() - 1) % 2 == 1 {
            return Err(wrong_arity(cmd));
        }
        let mut pairs = Vec::with_capacity((cmd.argc() - 1) / 2);
        let mut i = 1;
        while i < cmd.argc() {
            pairs.push((
                namespaced(USER_PREFIX, cmd.arg(i)),
                copy_bytes(cmd.arg(i + 1)),
            ));
            i += 2;
        }
        applier.apply(
            cmd,
            Some(Box::new(move || {
                let state = self.state().write();
                let mut batch = WriteBatch::new();
                for (key, value) in pairs {
                    batch.put(key, value);
                }
                state.store()?.write(batch)?;
                Ok(Outcome::Unit)
            })),
            Box::new(|_| Ok(RespValue::ok())),
        )
    }

    /// GET k - reply with the value as a bulk string, or null when absent.
    pub(crate) fn cmd_get(&self, applier: &dyn Applier, cmd: &Command) -> NodeResult<RespValue> {
        if cmd.argc() != 2 {
            return Err(wrong_arity(cmd));
        }
        let key = namespaced(USER_PREFIX, cmd.arg(1));
        applier.apply(
            cmd,
            None,
            Box::new(move |_| {
                let state = self.state().read();
                match state.store()?.get(&key)? {
                    Some(value) => Ok(RespValue::Bulk(value.into())),
                    None => Ok(RespValue::Null),
                }
            }),
        )
    }

    /// MGET k1 [k2 ...] - reply with an array of values resolved in request
    /// order, null for absent keys.
    pub(crate) fn cmd_mget(&self, applier: &dyn Applier, cmd: &Command) -> NodeResult<RespValue> {
        if cmd.argc() < 2 {
            return Err(wrong_arity(cmd));
        }
        let lookups: Vec<Vec<u8>> = cmd
            .args_from(1)
            .iter()
            .map(|k| namespaced(USER_PREFIX, k))
            .collect();
        applier.apply(
            cmd,
            None,
            Box::new(move |_| {
                let state = self.state().read();
                let store = state.store()?;
                let mut values = Vec::with_capacity(lookups.len());
                for key in &lookups {
                    values.push(match store.get(key)? {
                        Some(value) => RespValue::Bulk(value.into()),
                        None => RespValue::Null,
                    });
                }
                Ok(RespValue::Array(values))
            }),
        )
    }
}
