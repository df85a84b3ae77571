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

//! Error types for the booking engine.

use crate::transaction::TransactionStatus;
use rust_decimal::Decimal;
use thiserror::Error;

/// Booking engine errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// Input failed shape validation; nothing was mutated
    #[error("invalid request: {0}")]
    Validation(String),

    /// Unknown transaction, device, or order reference
    #[error("{0} not found")]
    NotFound(String),

    /// Duplicate serial number or device already claimed
    #[error("conflict: {0}")]
    Conflict(String),

    /// State machine guard rejected the transition
    #[error("cannot {event} a transaction in {from}")]
    InvalidTransition {
        from: TransactionStatus,
        event: &'static str,
    },

    /// Tracker device pool is exhausted
    #[error("no tracker device available")]
    NoDeviceAvailable,

    /// Gateway-reported gross amount does not match the stored total
    #[error("reported amount {reported} does not match expected total {expected}")]
    FraudSuspected { expected: Decimal, reported: Decimal },

    /// Pricing collaborator could not supply a price
    #[error("pricing unavailable: {0}")]
    PricingUnavailable(String),

    /// Network or timeout failure talking to the payment gateway
    #[error("payment gateway error: {0}")]
    Gateway(String),
}
