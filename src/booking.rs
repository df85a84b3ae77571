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

//! Booking orchestration façade.
//!
//! Entry point for the request layer: creates transactions with priced
//! ticket snapshots, exposes reads, and routes staff-driven status changes
//! through the same state machine the reconciler uses.

use crate::assignment::DeviceAssignment;
use crate::base::{TransactionId, UserId};
use crate::error::BookingError;
use crate::pricing::PricingService;
use crate::store::TransactionStore;
use crate::ticket::{Ticket, TicketDraft};
use crate::transaction::{Transaction, TransactionStatus, TransactionView};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Request shape for creating a booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBooking {
    pub user_id: UserId,
    pub start_date: time::Date,
    pub end_date: time::Date,
    pub tickets: Vec<TicketDraft>,
}

/// Listing filters; `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub user_id: Option<UserId>,
    pub status: Option<TransactionStatus>,
}

impl TransactionFilter {
    fn matches(&self, view: &TransactionView) -> bool {
        self.user_id.is_none_or(|u| u == view.user_id)
            && self.status.is_none_or(|s| s == view.status)
    }
}

/// One page of a listing. Pages are 1-based.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

/// Façade composing the store, pricing, and device coordination.
pub struct BookingOrchestrator {
    store: Arc<TransactionStore>,
    pricing: Arc<dyn PricingService>,
    assignment: Arc<DeviceAssignment>,
}

impl BookingOrchestrator {
    pub fn new(
        store: Arc<TransactionStore>,
        pricing: Arc<dyn PricingService>,
        assignment: Arc<DeviceAssignment>,
    ) -> Self {
        Self {
            store,
            pricing,
            assignment,
        }
    }

    /// Creates a transaction in CREATED with priced ticket snapshots.
    ///
    /// Each ticket's unit price is looked up once, at creation, for the
    /// entry date; the computed total is immutable from then on.
    pub fn create_transaction(&self, booking: NewBooking) -> Result<TransactionView, BookingError> {
        if booking.start_date > booking.end_date {
            return Err(BookingError::Validation(
                "start date must not be after end date".into(),
            ));
        }
        if booking.tickets.is_empty() {
            return Err(BookingError::Validation(
                "at least one ticket is required".into(),
            ));
        }

        let mut tickets = Vec::with_capacity(booking.tickets.len());
        for draft in booking.tickets {
            draft.validate()?;
            let unit_price = self.pricing.price(draft.category, booking.start_date)?;
            tickets.push(Ticket::from_draft(draft, unit_price));
        }

        let transaction = Transaction::new(
            booking.user_id,
            booking.start_date,
            booking.end_date,
            tickets,
        );
        let transaction = self.store.insert(transaction)?;
        let view = transaction.view();
        info!(
            id = %view.id,
            user = %view.user_id,
            total = %view.total_amount,
            tickets = view.tickets.len(),
            "transaction created"
        );
        Ok(view)
    }

    pub fn get(&self, id: TransactionId) -> Result<TransactionView, BookingError> {
        self.store.expect(id).map(|t| t.view())
    }

    /// All of one user's transactions, newest first.
    pub fn list_by_user(&self, user_id: UserId) -> Vec<TransactionView> {
        let mut views: Vec<TransactionView> = self
            .store
            .all()
            .iter()
            .map(|t| t.view())
            .filter(|v| v.user_id == user_id)
            .collect();
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        views
    }

    /// Paginated, filtered listing in creation order. Pages are 1-based.
    pub fn list(
        &self,
        filter: TransactionFilter,
        page: usize,
        size: usize,
    ) -> Result<Page<TransactionView>, BookingError> {
        if page == 0 || size == 0 {
            return Err(BookingError::Validation(
                "page and size must be positive".into(),
            ));
        }
        let mut views: Vec<TransactionView> = self
            .store
            .all()
            .iter()
            .map(|t| t.view())
            .filter(|v| filter.matches(v))
            .collect();
        views.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let total = views.len();
        let items = views.into_iter().skip((page - 1) * size).take(size).collect();
        Ok(Page {
            items,
            page,
            size,
            total,
        })
    }

    /// Explicit cancellation, allowed from any non-terminal status.
    pub fn cancel(&self, id: TransactionId) -> Result<TransactionView, BookingError> {
        self.assignment.cancel(id)?;
        self.get(id)
    }

    /// Staff-driven status change (e.g. marking COMPLETED when a hiker
    /// exits). Same transition table as the reconciler; statuses the
    /// table only reaches through payment events cannot be forced.
    pub fn update_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<TransactionView, BookingError> {
        match status {
            TransactionStatus::Completed => self.assignment.complete(id)?,
            TransactionStatus::Cancelled => self.assignment.cancel(id)?,
            TransactionStatus::Active => {
                return Err(BookingError::InvalidTransition {
                    from: self.get(id)?.status,
                    event: "manually activate",
                });
            }
            TransactionStatus::PendingPayment => {
                return Err(BookingError::InvalidTransition {
                    from: self.get(id)?.status,
                    event: "manually mark pending payment on",
                });
            }
            TransactionStatus::Created => {
                return Err(BookingError::InvalidTransition {
                    from: self.get(id)?.status,
                    event: "reset",
                });
            }
        }
        self.get(id)
    }
}
