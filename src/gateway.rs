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

//! Payment gateway boundary.
//!
//! The gateway is an untrusted, retrying external caller: notifications
//! arrive at least once and possibly out of order. Signature validation
//! happens upstream; this module only models the payload and the outbound
//! link-creation call.

use crate::error::BookingError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Payment status strings the gateway reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayStatus {
    Settlement,
    Capture,
    Success,
    Pending,
    Expire,
    Cancel,
    Deny,
}

impl GatewayStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "settlement" => Some(Self::Settlement),
            "capture" => Some(Self::Capture),
            "success" => Some(Self::Success),
            "pending" => Some(Self::Pending),
            "expire" => Some(Self::Expire),
            "cancel" => Some(Self::Cancel),
            "deny" => Some(Self::Deny),
            _ => None,
        }
    }

    /// Statuses that report captured money.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Settlement | Self::Capture | Self::Success)
    }

    /// Statuses that report a dead payment attempt.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Expire | Self::Cancel | Self::Deny)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Settlement => "settlement",
            Self::Capture => "capture",
            Self::Success => "success",
            Self::Pending => "pending",
            Self::Expire => "expire",
            Self::Cancel => "cancel",
            Self::Deny => "deny",
        }
    }
}

/// Webhook payload pushed by the gateway.
///
/// `gross_amount` arrives as a string on the wire and is parsed on use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotification {
    /// Merchant order reference (the transaction id in string form).
    pub order_id: String,
    /// Gateway-side transaction reference; the idempotency key.
    pub transaction_id: String,
    pub transaction_status: String,
    pub gross_amount: String,
    #[serde(with = "time::serde::rfc3339")]
    pub transaction_time: OffsetDateTime,
}

impl PaymentNotification {
    pub fn status(&self) -> Option<GatewayStatus> {
        GatewayStatus::parse(&self.transaction_status)
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.gross_amount.trim().parse::<Decimal>().ok()
    }
}

/// Outbound payment-link creation call.
///
/// The only operation in the core that crosses the network; callers bound
/// it with a timeout and never hold entity locks across the await.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_link(&self, order_ref: &str, amount: Decimal) -> Result<String, BookingError>;
}

/// Gateway stand-in issuing deterministic links without network I/O.
///
/// Used by the replay CLI, the demo server, and tests.
#[derive(Debug, Default)]
pub struct SandboxGateway;

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_link(&self, order_ref: &str, _amount: Decimal) -> Result<String, BookingError> {
        Ok(format!("https://pay.sandbox.example/links/{order_ref}"))
    }
}
