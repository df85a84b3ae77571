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

//! Exclusive device assignment.
//!
//! Every operation here runs inside the target transaction's mutex, so a
//! staff correction and a completion webhook for the same booking are
//! mutually exclusive; the loser observes the new state and fails its
//! guard instead of overwriting.
//!
//! Lock order is always transaction mutex first, then the registry's
//! per-device state. The registry never takes transaction locks.

use crate::alerts::{AlertQueue, OpsAlert};
use crate::base::TransactionId;
use crate::device::DeviceRegistry;
use crate::error::BookingError;
use crate::store::TransactionStore;
use crate::transaction::{TransactionData, TransactionStatus};
use std::sync::Arc;
use tracing::{error, info};

/// Claims the lowest-serial free device and binds it within the held
/// transaction lock. Both sides commit or the claim is rolled back; there
/// is no state where the status is ACTIVE without a device reference, nor
/// a claimed device without a referencing transaction.
pub(crate) fn bind_device(
    registry: &DeviceRegistry,
    data: &mut TransactionData,
    id: TransactionId,
) -> Result<String, BookingError> {
    data.ensure_can_activate()?;
    let serial = registry.acquire(id)?;
    if let Err(e) = data.activate(serial.clone()) {
        let _ = registry.release(&serial);
        return Err(e);
    }
    Ok(serial)
}

/// Coordinator binding tracker devices to transactions.
pub struct DeviceAssignment {
    store: Arc<TransactionStore>,
    registry: Arc<DeviceRegistry>,
    alerts: Arc<AlertQueue>,
}

impl DeviceAssignment {
    pub fn new(
        store: Arc<TransactionStore>,
        registry: Arc<DeviceRegistry>,
        alerts: Arc<AlertQueue>,
    ) -> Self {
        Self {
            store,
            registry,
            alerts,
        }
    }

    /// Binds a free device to a paid transaction
    /// (PENDING_PAYMENT → ACTIVE).
    ///
    /// # Errors
    ///
    /// [`BookingError::NoDeviceAvailable`] leaves the transaction in
    /// PENDING_PAYMENT for a later retry.
    pub fn assign_to_transaction(&self, id: TransactionId) -> Result<String, BookingError> {
        let txn = self.store.expect(id)?;
        let mut data = txn.lock();
        let serial = bind_device(&self.registry, &mut data, id)?;
        info!(%id, serial, "tracker device assigned");
        Ok(serial)
    }

    /// Marks an active transaction completed, releasing its device in the
    /// same locked transition.
    pub fn complete(&self, id: TransactionId) -> Result<(), BookingError> {
        let txn = self.store.expect(id)?;
        let mut data = txn.lock();
        let released = data.complete()?;
        self.unassign(id, released.as_deref());
        info!(%id, "transaction completed");
        Ok(())
    }

    /// Cancels a transaction from any non-terminal status, releasing its
    /// device when one was bound.
    pub fn cancel(&self, id: TransactionId) -> Result<(), BookingError> {
        let txn = self.store.expect(id)?;
        let mut data = txn.lock();
        let released = data.cancel()?;
        self.unassign(id, released.as_deref());
        info!(%id, "transaction cancelled");
        Ok(())
    }

    /// Staff correction: move an active transaction onto a named device.
    ///
    /// The new device is claimed before the old one is released, so the
    /// transaction never observes a gap in its reference.
    ///
    /// # Errors
    ///
    /// [`BookingError::Conflict`] when the named device is already in use.
    pub fn reassign(&self, id: TransactionId, new_serial: &str) -> Result<String, BookingError> {
        let txn = self.store.expect(id)?;
        let mut data = txn.lock();
        if data.status() != TransactionStatus::Active {
            return Err(BookingError::InvalidTransition {
                from: data.status(),
                event: "reassign a device for",
            });
        }
        if data.device_serial() == Some(new_serial) {
            return Ok(new_serial.to_string());
        }
        self.registry.acquire_specific(new_serial, id)?;
        let previous = match data.swap_device(new_serial.to_string()) {
            Ok(previous) => previous,
            Err(e) => {
                let _ = self.registry.release(new_serial);
                return Err(e);
            }
        };
        self.unassign(id, previous.as_deref());
        info!(%id, serial = new_serial, "tracker device reassigned");
        Ok(new_serial.to_string())
    }

    /// Releases a device back to the pool. Always attempted: a failure is
    /// queued for an operator instead of unwinding the transition that
    /// already cleared the reference.
    fn unassign(&self, id: TransactionId, released: Option<&str>) {
        let Some(serial) = released else { return };
        if let Err(e) = self.registry.release(serial) {
            error!(%id, serial, error = %e, "device release failed");
            self.alerts.push(OpsAlert::ReleaseFailed {
                transaction_id: id,
                serial: serial.to_string(),
                reason: e.to_string(),
            });
        }
    }
}
