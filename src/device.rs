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

//! Tracker device pool.
//!
//! The registry owns the finite pool of physical tracker devices handed to
//! hikers at the entry gate. A device is either `AVAILABLE` or `IN_USE`,
//! and at most one transaction references it at a time. The claim happens
//! under the device's own lock, so two concurrent acquisitions can never
//! select the same unit.

use crate::base::TransactionId;
use crate::error::BookingError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Operational status of a tracker device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Available,
    InUse,
}

#[derive(Debug)]
struct DeviceState {
    status: DeviceStatus,
    /// Weak back-reference to the holding transaction, for lookup only.
    /// The transaction owns the forward direction of the relationship.
    holder: Option<TransactionId>,
}

/// One physical tracker unit.
#[derive(Debug)]
pub struct TrackerDevice {
    serial: String,
    state: Mutex<DeviceState>,
}

impl TrackerDevice {
    fn new(serial: String) -> Self {
        Self {
            serial,
            state: Mutex::new(DeviceState {
                status: DeviceStatus::Available,
                holder: None,
            }),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn status(&self) -> DeviceStatus {
        self.state.lock().status
    }

    pub fn holder(&self) -> Option<TransactionId> {
        self.state.lock().holder
    }
}

/// Read snapshot of a device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    pub serial: String,
    pub status: DeviceStatus,
    pub holder: Option<TransactionId>,
}

/// Registry owning the shared device pool.
///
/// The pool is explicit shared state created at process startup and passed
/// to the components that need it; nothing reaches it through an ambient
/// singleton.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: DashMap<String, Arc<TrackerDevice>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
        }
    }

    /// Registers a new device in `AVAILABLE`.
    ///
    /// # Errors
    ///
    /// [`BookingError::Conflict`] when the serial number already exists.
    pub fn register(&self, serial: &str) -> Result<(), BookingError> {
        let serial = serial.trim();
        if serial.is_empty() {
            return Err(BookingError::Validation("serial number is required".into()));
        }
        // Entry API gives an atomic check-and-insert, so two concurrent
        // registrations of the same serial race safely.
        match self.devices.entry(serial.to_string()) {
            Entry::Occupied(_) => Err(BookingError::Conflict(format!(
                "device '{serial}' is already registered"
            ))),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(TrackerDevice::new(serial.to_string())));
                Ok(())
            }
        }
    }

    /// Claims one available device for `holder` and marks it `IN_USE`.
    ///
    /// Candidates are tried in ascending serial order so the pick is
    /// reproducible. The state change is made under the device's lock and
    /// is visible to every subsequent caller before this returns.
    ///
    /// # Errors
    ///
    /// [`BookingError::NoDeviceAvailable`] when the pool is exhausted.
    pub fn acquire(&self, holder: TransactionId) -> Result<String, BookingError> {
        let mut serials: Vec<String> = self.devices.iter().map(|d| d.key().clone()).collect();
        serials.sort();

        for serial in serials {
            if let Some(device) = self.devices.get(&serial) {
                let mut state = device.state.lock();
                if state.status == DeviceStatus::Available {
                    state.status = DeviceStatus::InUse;
                    state.holder = Some(holder);
                    return Ok(serial);
                }
            }
        }
        Err(BookingError::NoDeviceAvailable)
    }

    /// Claims a specific device by serial (staff correction path).
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown serial,
    /// [`BookingError::Conflict`] when the device is already `IN_USE`.
    pub fn acquire_specific(
        &self,
        serial: &str,
        holder: TransactionId,
    ) -> Result<(), BookingError> {
        let device = self
            .devices
            .get(serial)
            .ok_or_else(|| BookingError::NotFound(format!("device '{serial}'")))?;
        let mut state = device.state.lock();
        if state.status == DeviceStatus::InUse {
            return Err(BookingError::Conflict(format!(
                "device '{serial}' is already in use"
            )));
        }
        state.status = DeviceStatus::InUse;
        state.holder = Some(holder);
        Ok(())
    }

    /// Returns a device to the pool.
    ///
    /// Releasing an already-available device is a no-op, so retried
    /// completions stay safe.
    ///
    /// # Errors
    ///
    /// [`BookingError::NotFound`] for an unknown serial.
    pub fn release(&self, serial: &str) -> Result<(), BookingError> {
        let device = self
            .devices
            .get(serial)
            .ok_or_else(|| BookingError::NotFound(format!("device '{serial}'")))?;
        let mut state = device.state.lock();
        state.status = DeviceStatus::Available;
        state.holder = None;
        Ok(())
    }

    /// Administrative status override (retire, lost unit, manual fix).
    ///
    /// Refuses to free a device that a transaction still references; the
    /// transaction side must unassign first. Marking a holderless device
    /// `IN_USE` takes it out of the acquirable pool.
    pub fn set_status(&self, serial: &str, status: DeviceStatus) -> Result<(), BookingError> {
        let device = self
            .devices
            .get(serial)
            .ok_or_else(|| BookingError::NotFound(format!("device '{serial}'")))?;
        let mut state = device.state.lock();
        if status == DeviceStatus::Available {
            if let Some(holder) = state.holder {
                return Err(BookingError::Conflict(format!(
                    "device '{serial}' is held by transaction {holder}; unassign it first"
                )));
            }
        }
        state.status = status;
        Ok(())
    }

    /// Looks up which transaction currently holds a device, if any.
    pub fn holder_of(&self, serial: &str) -> Option<TransactionId> {
        self.devices.get(serial).and_then(|d| d.holder())
    }

    pub fn get(&self, serial: &str) -> Option<DeviceView> {
        self.devices.get(serial).map(|device| {
            let state = device.state.lock();
            DeviceView {
                serial: device.serial.clone(),
                status: state.status,
                holder: state.holder,
            }
        })
    }

    /// All devices, sorted by serial.
    pub fn list(&self) -> Vec<DeviceView> {
        let mut views: Vec<DeviceView> = self
            .devices
            .iter()
            .map(|device| {
                let state = device.state.lock();
                DeviceView {
                    serial: device.serial.clone(),
                    status: state.status,
                    holder: state.holder,
                }
            })
            .collect();
        views.sort_by(|a, b| a.serial.cmp(&b.serial));
        views
    }

    pub fn available_count(&self) -> usize {
        self.devices
            .iter()
            .filter(|d| d.status() == DeviceStatus::Available)
            .count()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(serials: &[&str]) -> DeviceRegistry {
        let registry = DeviceRegistry::new();
        for serial in serials {
            registry.register(serial).unwrap();
        }
        registry
    }

    #[test]
    fn duplicate_serial_is_a_conflict() {
        let registry = registry(&["T001"]);
        let err = registry.register("T001").unwrap_err();
        assert_eq!(
            err,
            BookingError::Conflict("device 'T001' is already registered".into())
        );
    }

    #[test]
    fn acquire_picks_lowest_serial() {
        let registry = registry(&["T003", "T001", "T002"]);
        let holder = TransactionId::new();
        assert_eq!(registry.acquire(holder).unwrap(), "T001");
        assert_eq!(registry.acquire(holder).unwrap(), "T002");
        assert_eq!(registry.acquire(holder).unwrap(), "T003");
        assert_eq!(registry.acquire(holder), Err(BookingError::NoDeviceAvailable));
    }

    #[test]
    fn release_is_idempotent() {
        let registry = registry(&["T001"]);
        registry.acquire(TransactionId::new()).unwrap();
        registry.release("T001").unwrap();
        registry.release("T001").unwrap();
        assert_eq!(registry.get("T001").unwrap().status, DeviceStatus::Available);
    }

    #[test]
    fn release_unknown_serial_is_not_found() {
        let registry = registry(&[]);
        assert_eq!(
            registry.release("T404"),
            Err(BookingError::NotFound("device 'T404'".into()))
        );
    }

    #[test]
    fn set_status_refuses_to_free_a_held_device() {
        let registry = registry(&["T001"]);
        let holder = TransactionId::new();
        registry.acquire(holder).unwrap();
        assert!(matches!(
            registry.set_status("T001", DeviceStatus::Available),
            Err(BookingError::Conflict(_))
        ));
        assert_eq!(registry.holder_of("T001"), Some(holder));
    }

    #[test]
    fn out_of_service_device_is_skipped_by_acquire() {
        let registry = registry(&["T001", "T002"]);
        registry.set_status("T001", DeviceStatus::InUse).unwrap();
        assert_eq!(registry.acquire(TransactionId::new()).unwrap(), "T002");
    }

    #[test]
    fn holder_back_reference_is_lookup_only() {
        let registry = registry(&["T001"]);
        let holder = TransactionId::new();
        registry.acquire(holder).unwrap();
        assert_eq!(registry.holder_of("T001"), Some(holder));
        registry.release("T001").unwrap();
        assert_eq!(registry.holder_of("T001"), None);
    }
}
