// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Operational alerting path.
//!
//! Conditions the engine cannot resolve on its own (money captured but no
//! device left, a release that failed mid-transition) are queued here for
//! an operator instead of being retried or swallowed.

use crate::base::TransactionId;
use crossbeam::queue::SegQueue;

/// Conditions an operator must act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpsAlert {
    /// Payment captured but the device pool was exhausted; entry cannot
    /// be granted until a device frees up and activation is retried.
    DevicePoolExhausted { transaction_id: TransactionId },
    /// A device release failed during a terminal transition; the
    /// transition stands and the device needs a manual fix.
    ReleaseFailed {
        transaction_id: TransactionId,
        serial: String,
        reason: String,
    },
}

/// FIFO queue surfacing alerts to the operational path.
#[derive(Debug, Default)]
pub struct AlertQueue {
    queue: SegQueue<OpsAlert>,
}

impl AlertQueue {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
        }
    }

    pub fn push(&self, alert: OpsAlert) {
        self.queue.push(alert);
    }

    pub fn pop(&self) -> Option<OpsAlert> {
        self.queue.pop()
    }

    /// Empties the queue, preserving arrival order.
    pub fn drain(&self) -> Vec<OpsAlert> {
        let mut alerts = Vec::new();
        while let Some(alert) = self.queue.pop() {
            alerts.push(alert);
        }
        alerts
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
