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

//! Pricing collaborator boundary.

use crate::error::BookingError;
use crate::ticket::TicketCategory;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use time::Date;

/// Price lookup for one ticket of a category on an entry date.
///
/// Failures block transaction creation; the engine never guesses a price.
pub trait PricingService: Send + Sync {
    fn price(&self, category: TicketCategory, date: Date) -> Result<Decimal, BookingError>;
}

/// In-memory price table, one row per hiker category.
#[derive(Debug, Default)]
pub struct PriceTable {
    prices: RwLock<HashMap<TicketCategory, Decimal>>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, category: TicketCategory, amount: Decimal) {
        self.prices.write().insert(category, amount);
    }
}

impl PricingService for PriceTable {
    fn price(&self, category: TicketCategory, _date: Date) -> Result<Decimal, BookingError> {
        self.prices.read().get(&category).copied().ok_or_else(|| {
            BookingError::PricingUnavailable(format!("no price configured for {category:?}"))
        })
    }
}
