//! Publishing messages through a node handle.

use crate::async_op::AsyncOp;
use crate::backend::BackendError;
use crate::error::Error;
use crate::message::{Content, LogEntryRef};
use crate::node::NodeHandle;
use std::sync::Arc;

/// Append `content` to the log of `handle`'s node.
///
/// Settles with the reference of the new entry, with [`Error::Publish`] when
/// the payload or the log rejects the append, or with
/// [`Error::CancelledOrClosed`] when the connection is gone. Never retried.
pub fn publish(handle: &NodeHandle, content: Content) -> AsyncOp<LogEntryRef> {
    let client = Arc::clone(handle.client());
    let node = handle.name().to_string();

    AsyncOp::from_callback(move |done| {
        let node = node.clone();
        let msg_type = content.msg_type().to_string();

        client.publish(
            content.clone(),
            Box::new(move |result| match result {
                Ok(message) => {
                    tracing::debug!(
                        node = %node,
                        msg_type = %msg_type,
                        sequence = message.sequence,
                        "published"
                    );
                    done(Ok(message.entry_ref()))
                }
                Err(err) => {
                    let err = publish_error(err);
                    tracing::warn!(
                        node = %node,
                        msg_type = %msg_type,
                        error = %err,
                        "publish failed"
                    );
                    done(Err(err))
                }
            }),
        );
    })
}

/// Validate a raw JSON payload, then publish it.
///
/// Malformed payloads fail with [`Error::Publish`] without reaching the log.
pub fn publish_json(handle: &NodeHandle, payload: serde_json::Value) -> AsyncOp<LogEntryRef> {
    match Content::from_value(payload) {
        Ok(content) => publish(handle, content),
        Err(err) => {
            tracing::warn!(node = %handle.name(), error = %err, "rejecting malformed payload");
            AsyncOp::err(err)
        }
    }
}

fn publish_error(err: BackendError) -> Error {
    match err {
        BackendError::Closed => Error::CancelledOrClosed("connection closed".to_string()),
        other => Error::Publish(other.to_string()),
    }
}
