//! Consumer surface — interpretation and per-endpoint delivery.
//!
//! The interpretation loop pulls raw frames with
//! [`pull_rx_task`](MsgAlloc::pull_rx_task), routes them, and fans each
//! out to its target endpoints with
//! [`alloc_endpoint_task`](MsgAlloc::alloc_endpoint_task) — several
//! delivery tasks may reference the same frame. The application loop
//! then pulls per endpoint. All of this runs in main context and may be
//! preempted by reception between any two operations.

use log::warn;

use super::{MsgAlloc, MsgSlot};
use crate::error::{Error, Result};
use crate::msg::EndpointId;

/// One pending delivery: a frame and the endpoint it is routed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointTask {
    pub(crate) slot: usize,
    pub(crate) endpoint: EndpointId,
}

impl EndpointTask {
    /// The referenced frame.
    pub fn slot(&self) -> MsgSlot {
        MsgSlot(self.slot)
    }

    /// The destination endpoint.
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }
}

impl<const BUF: usize, const TASKS: usize> MsgAlloc<BUF, TASKS> {
    /// Pull the oldest frame awaiting interpretation.
    pub fn pull_rx_task(&mut self) -> Result<MsgSlot> {
        match self.rx_tasks.first().copied() {
            Some(offset) => {
                self.rx_tasks.remove_at(0);
                Ok(MsgSlot(offset))
            }
            None => Err(Error::NoTask),
        }
    }

    /// Route a frame to one endpoint. Called once per target endpoint
    /// by the routing collaborator; a full stack evicts the oldest
    /// delivery and counts a drop.
    pub fn alloc_endpoint_task(&mut self, endpoint: EndpointId, slot: MsgSlot) {
        debug_assert!(slot.0 < BUF);
        if self.endpoint_tasks.push_evict(EndpointTask {
            slot: slot.0,
            endpoint,
        }) {
            self.stats.count_drop();
            warn!("delivery stack full, oldest delivery dropped");
        }
        self.stats
            .update_endpoint_watermark(self.endpoint_tasks.len(), TASKS);
    }

    /// Pull the oldest delivery task addressed to `endpoint`. Marks the
    /// frame as in use until [`release_used_msg`](Self::release_used_msg).
    pub fn pull_endpoint_msg(&mut self, endpoint: EndpointId) -> Result<MsgSlot> {
        for index in 0..self.endpoint_tasks.len() {
            let Some(task) = self.endpoint_tasks.get(index).copied() else {
                break;
            };
            if task.endpoint == endpoint {
                self.used_msg = Some(task.slot);
                self.endpoint_tasks.remove_at(index);
                return Ok(MsgSlot(task.slot));
            }
        }
        Err(Error::NoTaskForEndpoint)
    }

    /// Pull the delivery task at `index`, regardless of endpoint.
    /// Marks the frame as in use.
    pub fn pull_endpoint_task(&mut self, index: usize) -> Result<MsgSlot> {
        let Some(task) = self.endpoint_tasks.get(index).copied() else {
            return Err(Error::IndexOutOfRange);
        };
        self.used_msg = Some(task.slot);
        self.endpoint_tasks.remove_at(index);
        Ok(MsgSlot(task.slot))
    }

    /// Read the delivery task at `index` without removing it.
    pub fn peek_endpoint_task(&self, index: usize) -> Result<EndpointTask> {
        self.endpoint_tasks
            .get(index)
            .copied()
            .ok_or(Error::IndexOutOfRange)
    }

    /// Command byte of the frame referenced by the delivery task at
    /// `index`.
    pub fn endpoint_task_cmd(&self, index: usize) -> Result<u8> {
        let task = self.peek_endpoint_task(index)?;
        Ok(self.header_at(task.slot).cmd)
    }

    /// Source id of the frame referenced by the delivery task at
    /// `index`.
    pub fn endpoint_task_source(&self, index: usize) -> Result<u16> {
        let task = self.peek_endpoint_task(index)?;
        Ok(self.header_at(task.slot).source)
    }

    /// Declared payload size of the frame referenced by the delivery
    /// task at `index`.
    pub fn endpoint_task_size(&self, index: usize) -> Result<u16> {
        let task = self.peek_endpoint_task(index)?;
        Ok(self.header_at(task.slot).size)
    }

    /// Remove every delivery task referencing `slot` — used when a
    /// downstream decision invalidates a whole fan-out.
    pub fn clear_endpoint_tasks_for(&mut self, slot: MsgSlot) {
        let mut index = 0;
        while index < self.endpoint_tasks.len() {
            let Some(task) = self.endpoint_tasks.get(index).copied() else {
                break;
            };
            if task.slot == slot.0 {
                self.endpoint_tasks.remove_at(index);
            } else {
                index += 1;
            }
        }
    }

    /// The consumer is done reading the frame it last pulled.
    pub fn release_used_msg(&mut self) {
        self.used_msg = None;
    }
}
