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

//! Ticket line items.
//!
//! A ticket is one hiker's entry record inside a transaction. It has no
//! lifecycle of its own: it is created with the transaction and the unit
//! price is snapshotted at that moment, so later price table changes never
//! drift an existing booking's total.

use crate::error::BookingError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Hiker category used for price lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketCategory {
    Domestic,
    International,
}

/// Accepted identity document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentificationType {
    Nik,
    Passport,
}

/// Ticket fields as submitted by the customer, before pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDraft {
    pub hiker_name: String,
    pub category: TicketCategory,
    pub identification_type: IdentificationType,
    pub identification_number: String,
    pub address: String,
    pub phone_number: String,
}

impl TicketDraft {
    /// Validates the identity fields required for a permit.
    pub fn validate(&self) -> Result<(), BookingError> {
        required("hiker_name", &self.hiker_name)?;
        required("identification_number", &self.identification_number)?;
        required("address", &self.address)?;
        required("phone_number", &self.phone_number)?;

        // NIK is the 16-digit Indonesian national identity number.
        if self.identification_type == IdentificationType::Nik {
            let nik = self.identification_number.trim();
            if nik.len() != 16 || !nik.bytes().all(|b| b.is_ascii_digit()) {
                return Err(BookingError::Validation(
                    "identification number must be a 16-digit NIK".into(),
                ));
            }
        }
        Ok(())
    }
}

fn required(field: &str, value: &str) -> Result<(), BookingError> {
    if value.trim().is_empty() {
        return Err(BookingError::Validation(format!(
            "ticket field '{field}' is required"
        )));
    }
    Ok(())
}

/// Ticket line item owned by its parent transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub hiker_name: String,
    pub category: TicketCategory,
    pub identification_type: IdentificationType,
    pub identification_number: String,
    pub address: String,
    pub phone_number: String,
    /// Unit price snapshot taken when the transaction was created.
    pub unit_price: Decimal,
}

impl Ticket {
    pub fn from_draft(draft: TicketDraft, unit_price: Decimal) -> Self {
        Self {
            hiker_name: draft.hiker_name,
            category: draft.category,
            identification_type: draft.identification_type,
            identification_number: draft.identification_number,
            address: draft.address,
            phone_number: draft.phone_number,
            unit_price,
        }
    }
}
