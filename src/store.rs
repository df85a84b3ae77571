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

//! Shared transaction store.
//!
//! Transactions are kept behind `Arc` so webhook handling, staff actions,
//! and reads can all hold the same entity while its own mutex serializes
//! mutation per transaction.

use crate::base::TransactionId;
use crate::error::BookingError;
use crate::transaction::Transaction;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Store owning all transaction records, indexed by id.
#[derive(Debug, Default)]
pub struct TransactionStore {
    transactions: DashMap<TransactionId, Arc<Transaction>>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self {
            transactions: DashMap::new(),
        }
    }

    /// Adds a transaction to the store.
    ///
    /// # Errors
    ///
    /// [`BookingError::Conflict`] if the id already exists.
    pub fn insert(&self, transaction: Transaction) -> Result<Arc<Transaction>, BookingError> {
        let id = transaction.id();
        match self.transactions.entry(id) {
            Entry::Occupied(_) => Err(BookingError::Conflict(format!(
                "transaction {id} already exists"
            ))),
            Entry::Vacant(entry) => {
                let transaction = Arc::new(transaction);
                entry.insert(Arc::clone(&transaction));
                Ok(transaction)
            }
        }
    }

    pub fn get(&self, id: TransactionId) -> Option<Arc<Transaction>> {
        self.transactions.get(&id).map(|t| Arc::clone(&t))
    }

    /// Like [`get`](Self::get) but failing with `NotFound`.
    pub fn expect(&self, id: TransactionId) -> Result<Arc<Transaction>, BookingError> {
        self.get(id)
            .ok_or_else(|| BookingError::NotFound(format!("transaction {id}")))
    }

    /// Correlates a gateway order reference back to a transaction.
    ///
    /// # Errors
    ///
    /// [`BookingError::Validation`] for a reference that is not a
    /// well-formed id, [`BookingError::NotFound`] for an unknown one.
    pub fn resolve_order_ref(&self, order_ref: &str) -> Result<Arc<Transaction>, BookingError> {
        let id = TransactionId::from_order_ref(order_ref).ok_or_else(|| {
            BookingError::Validation(format!("malformed order reference '{order_ref}'"))
        })?;
        self.get(id).ok_or_else(|| {
            BookingError::NotFound(format!("transaction for order reference '{order_ref}'"))
        })
    }

    /// All transactions, in no particular order.
    pub fn all(&self) -> Vec<Arc<Transaction>> {
        self.transactions.iter().map(|t| Arc::clone(&t)).collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
