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

//! Booking transactions and their status state machine.
//!
//! Statuses follow a fixed transition table:
//!
//  CREATED ──link──► PENDING_PAYMENT ──settlement──► ACTIVE ──return──► COMPLETED
//     │                     │                          │
//     └──cancel─────────────┴──cancel/expire───────────┴──cancel──► CANCELLED
//!
//! `COMPLETED` and `CANCELLED` are terminal. The tracker-device reference
//! is set exactly while the transaction is `ACTIVE`; it is bound and
//! cleared inside the same locked transition that changes the status.

use crate::base::{TransactionId, UserId};
use crate::error::BookingError;
use crate::ticket::Ticket;
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use time::{Date, OffsetDateTime};

/// Lifecycle status of a booking transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Created,
    PendingPayment,
    Active,
    Completed,
    Cancelled,
}

impl TransactionStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub(crate) struct TransactionData {
    id: TransactionId,
    user_id: UserId,
    start_date: Date,
    end_date: Date,
    tickets: Vec<Ticket>,
    total_amount: Decimal,
    status: TransactionStatus,
    device_serial: Option<String>,
    gateway_order_ref: Option<String>,
    payment_url: Option<String>,
    /// Gateway transaction references that already drove a transition.
    /// Kept with the status so both change under the same lock.
    applied_gateway_refs: HashSet<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TransactionData {
    fn assert_invariants(&self) {
        debug_assert_eq!(
            self.status == TransactionStatus::Active,
            self.device_serial.is_some(),
            "Invariant violated: device reference must be set exactly while ACTIVE (status {}, device {:?})",
            self.status,
            self.device_serial,
        );
    }

    fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }

    pub(crate) fn status(&self) -> TransactionStatus {
        self.status
    }

    pub(crate) fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub(crate) fn device_serial(&self) -> Option<&str> {
        self.device_serial.as_deref()
    }

    /// Guard for the CREATED → PENDING_PAYMENT edge.
    pub(crate) fn ensure_can_request_link(&self) -> Result<(), BookingError> {
        if self.status != TransactionStatus::Created {
            return Err(BookingError::InvalidTransition {
                from: self.status,
                event: "request a payment link for",
            });
        }
        if self.tickets.is_empty() {
            return Err(BookingError::Validation(
                "transaction has no tickets".into(),
            ));
        }
        if self.total_amount <= Decimal::ZERO {
            return Err(BookingError::Validation(
                "transaction total must be positive".into(),
            ));
        }
        Ok(())
    }

    /// CREATED → PENDING_PAYMENT, recording the gateway order reference.
    pub(crate) fn mark_pending(
        &mut self,
        order_ref: String,
        payment_url: String,
    ) -> Result<(), BookingError> {
        self.ensure_can_request_link()?;
        self.status = TransactionStatus::PendingPayment;
        self.gateway_order_ref = Some(order_ref);
        self.payment_url = Some(payment_url);
        self.touch();
        self.assert_invariants();
        Ok(())
    }

    /// Guard for the PENDING_PAYMENT → ACTIVE edge.
    pub(crate) fn ensure_can_activate(&self) -> Result<(), BookingError> {
        if self.status != TransactionStatus::PendingPayment {
            return Err(BookingError::InvalidTransition {
                from: self.status,
                event: "activate",
            });
        }
        Ok(())
    }

    /// PENDING_PAYMENT → ACTIVE, binding the tracker device.
    pub(crate) fn activate(&mut self, device_serial: String) -> Result<(), BookingError> {
        self.ensure_can_activate()?;
        self.status = TransactionStatus::Active;
        self.device_serial = Some(device_serial);
        self.touch();
        self.assert_invariants();
        Ok(())
    }

    /// ACTIVE → COMPLETED. The device reference is cleared as part of the
    /// transition; the released serial is returned for the registry.
    pub(crate) fn complete(&mut self) -> Result<Option<String>, BookingError> {
        if self.status != TransactionStatus::Active {
            return Err(BookingError::InvalidTransition {
                from: self.status,
                event: "complete",
            });
        }
        self.status = TransactionStatus::Completed;
        let released = self.device_serial.take();
        self.touch();
        self.assert_invariants();
        Ok(released)
    }

    /// Any non-terminal status → CANCELLED. Returns the released serial
    /// when the transaction was holding a device.
    pub(crate) fn cancel(&mut self) -> Result<Option<String>, BookingError> {
        if self.status.is_terminal() {
            return Err(BookingError::InvalidTransition {
                from: self.status,
                event: "cancel",
            });
        }
        self.status = TransactionStatus::Cancelled;
        let released = self.device_serial.take();
        self.touch();
        self.assert_invariants();
        Ok(released)
    }

    /// Swaps the bound device on an ACTIVE transaction (staff correction).
    /// Returns the previous serial so the caller can release it.
    pub(crate) fn swap_device(&mut self, device_serial: String) -> Result<Option<String>, BookingError> {
        if self.status != TransactionStatus::Active {
            return Err(BookingError::InvalidTransition {
                from: self.status,
                event: "reassign a device for",
            });
        }
        let previous = self.device_serial.replace(device_serial);
        self.touch();
        self.assert_invariants();
        Ok(previous)
    }

    pub(crate) fn is_applied(&self, gateway_ref: &str) -> bool {
        self.applied_gateway_refs.contains(gateway_ref)
    }

    pub(crate) fn record_applied(&mut self, gateway_ref: &str) {
        self.applied_gateway_refs.insert(gateway_ref.to_string());
    }

    fn view(&self) -> TransactionView {
        TransactionView {
            id: self.id,
            user_id: self.user_id,
            start_date: self.start_date,
            end_date: self.end_date,
            status: self.status,
            total_amount: self.total_amount,
            tickets: self.tickets.clone(),
            device_serial: self.device_serial.clone(),
            gateway_order_ref: self.gateway_order_ref.clone(),
            payment_url: self.payment_url.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// One booking: a validity window, the ticket line items, and the
/// money-and-device state driven by the reconciliation engine.
///
/// All mutable state lives behind a single mutex, so webhook deliveries
/// and staff actions targeting the same transaction serialize on it.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    inner: Mutex<TransactionData>,
}

impl Transaction {
    /// Creates a transaction in `CREATED` with a fresh id.
    ///
    /// The total is computed from the ticket price snapshots and never
    /// changes afterwards.
    pub fn new(user_id: UserId, start_date: Date, end_date: Date, tickets: Vec<Ticket>) -> Self {
        Self::with_id(TransactionId::new(), user_id, start_date, end_date, tickets)
    }

    /// Creates a transaction with a caller-supplied id (replay/import path).
    pub fn with_id(
        id: TransactionId,
        user_id: UserId,
        start_date: Date,
        end_date: Date,
        tickets: Vec<Ticket>,
    ) -> Self {
        let total_amount = tickets.iter().map(|t| t.unit_price).sum();
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            inner: Mutex::new(TransactionData {
                id,
                user_id,
                start_date,
                end_date,
                tickets,
                total_amount,
                status: TransactionStatus::Created,
                device_serial: None,
                gateway_order_ref: None,
                payment_url: None,
                applied_gateway_refs: HashSet::new(),
                created_at: now,
                updated_at: now,
            }),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.inner.lock().status
    }

    pub fn total_amount(&self) -> Decimal {
        self.inner.lock().total_amount
    }

    pub fn device_serial(&self) -> Option<String> {
        self.inner.lock().device_serial.clone()
    }

    /// Copy-out snapshot of the current state.
    pub fn view(&self) -> TransactionView {
        self.inner.lock().view()
    }

    /// Serializes all mutation of this transaction. Callers must not hold
    /// the guard across any await point.
    pub(crate) fn lock(&self) -> MutexGuard<'_, TransactionData> {
        self.inner.lock()
    }
}

/// Read snapshot of a transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: TransactionId,
    pub user_id: UserId,
    pub start_date: Date,
    pub end_date: Date,
    pub status: TransactionStatus,
    pub total_amount: Decimal,
    pub tickets: Vec<Ticket>,
    pub device_serial: Option<String>,
    pub gateway_order_ref: Option<String>,
    pub payment_url: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
