use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;

use super::{PriceObservation, PriceQuery, StructuredStore};
use crate::analytics::error::{AnalyticsError, StoreWriteError};
use crate::analytics::lease::RemainingLease;
use crate::analytics::source::SourceError;
use crate::analytics::town::TownKey;
use crate::analytics::window::{MonthWindow, YearMonth};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FlatId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

/// Physical unit, unique on (town, street, block).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flat {
    pub id: FlatId,
    pub town: TownKey,
    pub street: String,
    pub block: String,
    pub lease_start_year: i32,
}

/// A stored resale event.
///
/// `remaining_lease` is derived from the transaction month and the owning flat's
/// lease start year; the store rewrites it on every write touching either input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub flat_id: FlatId,
    pub month: YearMonth,
    pub price: f64,
    pub floor_area_sqm: f64,
    pub flat_type: String,
    pub flat_model: String,
    pub storey_range: String,
    remaining_lease: RemainingLease,
}

impl Transaction {
    pub fn remaining_lease(&self) -> RemainingLease {
        self.remaining_lease
    }
}

#[derive(Debug, Clone)]
pub struct NewFlat {
    pub town: String,
    pub street: String,
    pub block: String,
    pub lease_start_year: i32,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub flat_id: FlatId,
    pub month: YearMonth,
    pub price: f64,
    pub floor_area_sqm: f64,
    pub flat_type: String,
    pub flat_model: String,
    pub storey_range: String,
}

type FlatAddress = (TownKey, String, String);

#[derive(Debug, Default)]
struct StructuredState {
    towns: BTreeSet<TownKey>,
    flats: BTreeMap<FlatId, Flat>,
    flat_index: HashMap<FlatAddress, FlatId>,
    transactions: BTreeMap<TransactionId, Transaction>,
    next_flat: u64,
    next_transaction: u64,
}

impl StructuredState {
    fn flat(&self, id: FlatId) -> Result<&Flat, StoreWriteError> {
        self.flats.get(&id).ok_or(StoreWriteError::NotFound {
            entity: "flat",
            id: id.0,
        })
    }

    fn town_of(&self, transaction: &Transaction) -> Option<&TownKey> {
        self.flats.get(&transaction.flat_id).map(|flat| &flat.town)
    }
}

/// Structured store adapter holding towns, flats and transactions in memory.
#[derive(Debug, Default)]
pub struct InMemoryStructuredStore {
    state: Mutex<StructuredState>,
}

impl InMemoryStructuredStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> Result<MutexGuard<'_, StructuredState>, StoreWriteError> {
        self.state.lock().map_err(|_| StoreWriteError::Poisoned)
    }

    fn read(&self) -> Result<MutexGuard<'_, StructuredState>, SourceError> {
        self.state
            .lock()
            .map_err(|_| SourceError::Unavailable("structured store state poisoned".to_string()))
    }

    pub fn insert_flat(&self, flat: NewFlat) -> Result<FlatId, StoreWriteError> {
        let (address, lease_start_year) = validate_flat(&flat)?;
        let mut state = self.write()?;
        if state.flat_index.contains_key(&address) {
            return Err(StoreWriteError::Conflict(format!(
                "flat at block {} {} in {} already exists",
                address.2, address.1, address.0
            )));
        }
        Ok(insert_flat_locked(&mut state, address, lease_start_year))
    }

    /// Returns the flat at the same address, inserting it when missing.
    ///
    /// An existing flat with a different lease start year is a conflict.
    pub fn find_or_insert_flat(&self, flat: NewFlat) -> Result<FlatId, StoreWriteError> {
        let (address, lease_start_year) = validate_flat(&flat)?;
        let mut state = self.write()?;
        if let Some(id) = state.flat_index.get(&address).copied() {
            let existing = state.flat(id)?;
            if existing.lease_start_year != lease_start_year {
                return Err(StoreWriteError::Conflict(format!(
                    "flat {} already recorded with lease start {}, got {}",
                    id.0, existing.lease_start_year, lease_start_year
                )));
            }
            return Ok(id);
        }
        Ok(insert_flat_locked(&mut state, address, lease_start_year))
    }

    /// Changes a flat's lease start year and re-derives the remaining lease of
    /// every transaction on that flat. Returns how many transactions changed.
    pub fn update_flat_lease_start(
        &self,
        flat_id: FlatId,
        lease_start_year: i32,
    ) -> Result<usize, StoreWriteError> {
        let mut state = self.write()?;
        state.flat(flat_id)?;

        let mut rederived = Vec::new();
        for transaction in state.transactions.values() {
            if transaction.flat_id == flat_id {
                let lease = RemainingLease::at(lease_start_year, transaction.month)?;
                rederived.push((transaction.id, lease));
            }
        }

        // All derivations succeeded, so apply the flat and its transactions together.
        if let Some(flat) = state.flats.get_mut(&flat_id) {
            flat.lease_start_year = lease_start_year;
        }
        let changed = rederived.len();
        for (id, lease) in rederived {
            if let Some(transaction) = state.transactions.get_mut(&id) {
                transaction.remaining_lease = lease;
            }
        }

        tracing::debug!(flat = flat_id.0, lease_start_year, changed, "re-derived remaining lease");
        Ok(changed)
    }

    /// Deletes a flat that no transaction references.
    pub fn delete_flat(&self, flat_id: FlatId) -> Result<Flat, StoreWriteError> {
        let mut state = self.write()?;
        state.flat(flat_id)?;
        let transactions = state
            .transactions
            .values()
            .filter(|transaction| transaction.flat_id == flat_id)
            .count();
        if transactions > 0 {
            return Err(StoreWriteError::Restricted {
                flat: flat_id.0,
                transactions,
            });
        }

        let flat = state.flats.remove(&flat_id).ok_or(StoreWriteError::NotFound {
            entity: "flat",
            id: flat_id.0,
        })?;
        state
            .flat_index
            .remove(&(flat.town.clone(), flat.street.clone(), flat.block.clone()));
        Ok(flat)
    }

    pub fn insert_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionId, StoreWriteError> {
        if !(transaction.price.is_finite() && transaction.price > 0.0) {
            return Err(AnalyticsError::invalid("price must be positive").into());
        }
        if !(transaction.floor_area_sqm.is_finite() && transaction.floor_area_sqm > 0.0) {
            return Err(AnalyticsError::invalid("floor area must be positive").into());
        }

        let mut state = self.write()?;
        let lease_start_year = state.flat(transaction.flat_id)?.lease_start_year;
        let remaining_lease = RemainingLease::at(lease_start_year, transaction.month)?;

        state.next_transaction += 1;
        let id = TransactionId(state.next_transaction);
        state.transactions.insert(
            id,
            Transaction {
                id,
                flat_id: transaction.flat_id,
                month: transaction.month,
                price: transaction.price,
                floor_area_sqm: transaction.floor_area_sqm,
                flat_type: transaction.flat_type.trim().to_uppercase(),
                flat_model: transaction.flat_model.trim().to_string(),
                storey_range: transaction.storey_range.trim().to_string(),
                remaining_lease,
            },
        );
        Ok(id)
    }

    /// Moves a transaction to another month, re-deriving its remaining lease.
    pub fn update_transaction_month(
        &self,
        id: TransactionId,
        month: YearMonth,
    ) -> Result<(), StoreWriteError> {
        let mut state = self.write()?;
        let flat_id = state
            .transactions
            .get(&id)
            .map(|transaction| transaction.flat_id)
            .ok_or(StoreWriteError::NotFound {
                entity: "transaction",
                id: id.0,
            })?;
        let remaining_lease = RemainingLease::at(state.flat(flat_id)?.lease_start_year, month)?;

        if let Some(transaction) = state.transactions.get_mut(&id) {
            transaction.month = month;
            transaction.remaining_lease = remaining_lease;
        }
        Ok(())
    }

    pub fn delete_transaction(&self, id: TransactionId) -> Result<Transaction, StoreWriteError> {
        self.write()?
            .transactions
            .remove(&id)
            .ok_or(StoreWriteError::NotFound {
                entity: "transaction",
                id: id.0,
            })
    }

    pub fn transaction(&self, id: TransactionId) -> Option<Transaction> {
        self.read().ok()?.transactions.get(&id).cloned()
    }

    pub fn flat(&self, id: FlatId) -> Option<Flat> {
        self.read().ok()?.flats.get(&id).cloned()
    }

    pub fn transaction_count(&self) -> usize {
        self.read()
            .map(|state| state.transactions.len())
            .unwrap_or_default()
    }
}

fn validate_flat(flat: &NewFlat) -> Result<(FlatAddress, i32), StoreWriteError> {
    let town = TownKey::parse(&flat.town)?;
    let street = flat.street.split_whitespace().collect::<Vec<_>>().join(" ");
    let block = flat.block.trim().to_uppercase();
    if street.is_empty() || block.is_empty() {
        return Err(AnalyticsError::invalid("flat needs a street and a block").into());
    }
    if flat.lease_start_year < 0 {
        return Err(AnalyticsError::invalid(format!(
            "lease start year must not be negative, got {}",
            flat.lease_start_year
        ))
        .into());
    }
    Ok(((town, street.to_uppercase(), block), flat.lease_start_year))
}

fn insert_flat_locked(
    state: &mut StructuredState,
    address: FlatAddress,
    lease_start_year: i32,
) -> FlatId {
    state.next_flat += 1;
    let id = FlatId(state.next_flat);
    let (town, street, block) = address.clone();
    state.towns.insert(town.clone());
    state.flats.insert(
        id,
        Flat {
            id,
            town,
            street,
            block,
            lease_start_year,
        },
    );
    state.flat_index.insert(address, id);
    id
}

#[async_trait]
impl StructuredStore for InMemoryStructuredStore {
    async fn price_observations(
        &self,
        query: &PriceQuery,
    ) -> Result<Vec<PriceObservation>, SourceError> {
        let state = self.read()?;
        let observations = state
            .transactions
            .values()
            .filter(|transaction| query.window.contains(transaction.month))
            .filter(|transaction| query.matches_flat_type(&transaction.flat_type))
            .filter_map(|transaction| {
                let town = state.town_of(transaction)?;
                if query.town.as_ref().is_some_and(|wanted| wanted != town) {
                    return None;
                }
                Some(PriceObservation {
                    town: town.clone(),
                    flat_type: transaction.flat_type.clone(),
                    month: transaction.month,
                    price: transaction.price,
                    floor_area_sqm: transaction.floor_area_sqm,
                })
            })
            .collect();
        Ok(observations)
    }

    async fn towns(&self) -> Result<Vec<TownKey>, SourceError> {
        Ok(self.read()?.towns.iter().cloned().collect())
    }

    async fn flat_types(&self) -> Result<Vec<String>, SourceError> {
        let state = self.read()?;
        let types: BTreeSet<&String> = state
            .transactions
            .values()
            .map(|transaction| &transaction.flat_type)
            .collect();
        Ok(types.into_iter().cloned().collect())
    }

    async fn month_bounds(&self) -> Result<Option<MonthWindow>, SourceError> {
        let state = self.read()?;
        let mut months = state.transactions.values().map(|transaction| transaction.month);
        let Some(first) = months.next() else {
            return Ok(None);
        };
        let (start, end) = months.fold((first, first), |(start, end), month| {
            (start.min(month), end.max(month))
        });
        Ok(MonthWindow::new(start, end).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(raw: &str) -> YearMonth {
        raw.parse().expect("valid month")
    }

    fn flat(store: &InMemoryStructuredStore, town: &str, block: &str, lease: i32) -> FlatId {
        store
            .insert_flat(NewFlat {
                town: town.to_string(),
                street: "Ang Mo Kio Ave 10".to_string(),
                block: block.to_string(),
                lease_start_year: lease,
            })
            .expect("flat inserted")
    }

    fn sale(store: &InMemoryStructuredStore, flat_id: FlatId, at: &str) -> TransactionId {
        store
            .insert_transaction(NewTransaction {
                flat_id,
                month: month(at),
                price: 450_000.0,
                floor_area_sqm: 92.0,
                flat_type: "4 room".to_string(),
                flat_model: "New Generation".to_string(),
                storey_range: "07 TO 09".to_string(),
            })
            .expect("transaction inserted")
    }

    #[test]
    fn insert_derives_remaining_lease() {
        let store = InMemoryStructuredStore::new();
        let flat_id = flat(&store, "Ang Mo Kio", "406", 1990);
        let id = sale(&store, flat_id, "2020-06");

        let stored = store.transaction(id).expect("stored");
        assert_eq!(stored.remaining_lease().months(), 834);
        assert_eq!(stored.flat_type, "4 ROOM");
    }

    #[test]
    fn lease_year_edit_rederives_only_that_flats_transactions() {
        let store = InMemoryStructuredStore::new();
        let edited = flat(&store, "Ang Mo Kio", "406", 1990);
        let untouched = flat(&store, "Ang Mo Kio", "407", 1990);
        let first = sale(&store, edited, "2020-06");
        let second = sale(&store, edited, "2021-06");
        let other = sale(&store, untouched, "2020-06");

        let changed = store
            .update_flat_lease_start(edited, 1995)
            .expect("lease updated");

        assert_eq!(changed, 2);
        assert_eq!(store.transaction(first).unwrap().remaining_lease().months(), 834 + 60);
        assert_eq!(store.transaction(second).unwrap().remaining_lease().months(), 822 + 60);
        assert_eq!(store.transaction(other).unwrap().remaining_lease().months(), 834);
        assert_eq!(store.flat(edited).unwrap().lease_start_year, 1995);
    }

    #[test]
    fn month_edit_rederives_remaining_lease() {
        let store = InMemoryStructuredStore::new();
        let flat_id = flat(&store, "Bedok", "12", 1990);
        let id = sale(&store, flat_id, "2020-06");

        store
            .update_transaction_month(id, month("2100-01"))
            .expect("month updated");
        let stored = store.transaction(id).unwrap();
        assert_eq!(stored.month, month("2100-01"));
        assert!(stored.remaining_lease().is_expired());

        // Reapplying the same edit is a no-op.
        store
            .update_transaction_month(id, month("2100-01"))
            .expect("month updated again");
        assert_eq!(store.transaction(id).unwrap(), stored);
    }

    #[test]
    fn rejected_lease_edit_leaves_state_untouched() {
        let store = InMemoryStructuredStore::new();
        let flat_id = flat(&store, "Bedok", "12", 1990);
        let id = sale(&store, flat_id, "2020-06");

        let err = store
            .update_flat_lease_start(flat_id, -5)
            .expect_err("negative year rejected");
        assert!(matches!(err, StoreWriteError::Invalid(_)));
        assert_eq!(store.flat(flat_id).unwrap().lease_start_year, 1990);
        assert_eq!(store.transaction(id).unwrap().remaining_lease().months(), 834);
    }

    #[test]
    fn delete_flat_is_restricted_while_referenced() {
        let store = InMemoryStructuredStore::new();
        let flat_id = flat(&store, "Bedok", "12", 1990);
        let id = sale(&store, flat_id, "2020-06");

        match store.delete_flat(flat_id) {
            Err(StoreWriteError::Restricted { transactions, .. }) => assert_eq!(transactions, 1),
            other => panic!("expected restricted delete, got {other:?}"),
        }

        store.delete_transaction(id).expect("transaction removed");
        let removed = store.delete_flat(flat_id).expect("flat removed");
        assert_eq!(removed.block, "12");
        assert!(store.flat(flat_id).is_none());
    }

    #[test]
    fn flat_address_is_unique_after_normalization() {
        let store = InMemoryStructuredStore::new();
        flat(&store, "Bedok", "12", 1990);
        let err = store
            .insert_flat(NewFlat {
                town: " bedok ".to_string(),
                street: "ang mo kio  ave 10".to_string(),
                block: "12".to_string(),
                lease_start_year: 1990,
            })
            .expect_err("duplicate address");
        assert!(matches!(err, StoreWriteError::Conflict(_)));
    }

    #[test]
    fn find_or_insert_reuses_matching_flat() {
        let store = InMemoryStructuredStore::new();
        let new_flat = NewFlat {
            town: "Tampines".to_string(),
            street: "Tampines St 21".to_string(),
            block: "201".to_string(),
            lease_start_year: 1984,
        };
        let first = store.find_or_insert_flat(new_flat.clone()).unwrap();
        let second = store.find_or_insert_flat(new_flat.clone()).unwrap();
        assert_eq!(first, second);

        let conflicting = NewFlat {
            lease_start_year: 1985,
            ..new_flat
        };
        assert!(matches!(
            store.find_or_insert_flat(conflicting),
            Err(StoreWriteError::Conflict(_))
        ));
    }

    #[test]
    fn rejects_non_positive_prices() {
        let store = InMemoryStructuredStore::new();
        let flat_id = flat(&store, "Bedok", "12", 1990);
        let err = store
            .insert_transaction(NewTransaction {
                flat_id,
                month: month("2020-06"),
                price: 0.0,
                floor_area_sqm: 90.0,
                flat_type: "3 ROOM".to_string(),
                flat_model: "Improved".to_string(),
                storey_range: "01 TO 03".to_string(),
            })
            .expect_err("zero price rejected");
        assert!(matches!(err, StoreWriteError::Invalid(_)));
    }

    #[tokio::test]
    async fn observations_respect_window_town_and_flat_type() {
        let store = InMemoryStructuredStore::new();
        let amk = flat(&store, "Ang Mo Kio", "406", 1990);
        let bedok = flat(&store, "Bedok", "12", 1990);
        sale(&store, amk, "2024-01");
        sale(&store, amk, "2023-12");
        sale(&store, bedok, "2024-02");

        let window = MonthWindow::new(month("2024-01"), month("2024-12")).unwrap();
        let query = PriceQuery {
            window,
            town: Some(TownKey::parse("ang mo kio").unwrap()),
            flat_type: Some("4 ROOM".to_string()),
        };
        let rows = store.price_observations(&query).await.expect("read");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].town.as_str(), "ANG MO KIO");

        let bounds = store.month_bounds().await.unwrap().expect("non-empty");
        assert_eq!(bounds.start(), month("2023-12"));
        assert_eq!(bounds.end(), month("2024-02"));
        assert_eq!(store.flat_types().await.unwrap(), vec!["4 ROOM".to_string()]);
    }
}
