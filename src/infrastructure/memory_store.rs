//! 内存存储
//!
//! 用于测试和演练（dry run），选择条件与 SQLite 实现一致。

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::record_store::{sort_for_submission, NumberingRule, RecordStore, StoreError};
use crate::models::{BillingRecord, ConfirmationCode, Period};

#[derive(Debug, Clone)]
struct StoredRecord {
    period: Period,
    service_active: bool,
    record: BillingRecord,
    confirmation: Option<ConfirmationCode>,
}

#[derive(Debug, Default)]
struct Inner {
    /// 用户编号 -> 是否有效
    subscribers: BTreeMap<String, bool>,
    records: BTreeMap<i64, StoredRecord>,
    active_period: Option<Period>,
}

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    inner: RwLock<Inner>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|e| StoreError::Database(format!("内存存储锁已损坏: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|e| StoreError::Database(format!("内存存储锁已损坏: {e}")))
    }

    /// 登记用户
    pub fn add_subscriber(&self, account_id: impl Into<String>, active: bool) -> Result<(), StoreError> {
        self.write()?.subscribers.insert(account_id.into(), active);
        Ok(())
    }

    /// 插入一条服务有效的计费记录
    pub fn insert_record(&self, period: &Period, record: BillingRecord) -> Result<(), StoreError> {
        self.insert_with_service(period, record, true)
    }

    pub fn insert_with_service(
        &self,
        period: &Period,
        record: BillingRecord,
        service_active: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        inner.records.insert(
            record.record_id,
            StoredRecord {
                period: period.clone(),
                service_active,
                record,
                confirmation: None,
            },
        );
        Ok(())
    }

    pub fn set_active_period(&self, period: Option<Period>) -> Result<(), StoreError> {
        self.write()?.active_period = period;
        Ok(())
    }

    /// 查询记录的确认码
    pub fn confirmation_of(&self, record_id: i64) -> Result<Option<ConfirmationCode>, StoreError> {
        let inner = self.read()?;
        let stored = inner
            .records
            .get(&record_id)
            .ok_or(StoreError::NotFound(record_id))?;
        Ok(stored.confirmation.clone())
    }

    /// 查询记录当前序号
    pub fn sequence_of(&self, record_id: i64) -> Result<i64, StoreError> {
        let inner = self.read()?;
        inner
            .records
            .get(&record_id)
            .map(|s| s.record.sequence_number)
            .ok_or(StoreError::NotFound(record_id))
    }

    /// 本期已写入确认码的记录数
    pub fn confirmed_count(&self, period: &Period) -> Result<usize, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .records
            .values()
            .filter(|s| &s.period == period && s.confirmation.is_some())
            .count())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn eligible_batch(&self, period: &Period) -> Result<Vec<BillingRecord>, StoreError> {
        let inner = self.read()?;
        let mut batch: Vec<BillingRecord> = inner
            .records
            .values()
            .filter(|s| {
                &s.period == period
                    && s.service_active
                    && s.record.charges.invoiced_total > 0.0
                    && s.confirmation.is_none()
            })
            .map(|s| s.record.clone())
            .collect();
        sort_for_submission(&mut batch);
        Ok(batch)
    }

    async fn missing_readings(&self, period: &Period) -> Result<BTreeSet<String>, StoreError> {
        let inner = self.read()?;
        let with_reading: BTreeSet<&str> = inner
            .records
            .values()
            .filter(|s| &s.period == period && s.service_active)
            .map(|s| s.record.account_id.as_str())
            .collect();

        Ok(inner
            .subscribers
            .iter()
            .filter(|(account, active)| **active && !with_reading.contains(account.as_str()))
            .map(|(account, _)| account.clone())
            .collect())
    }

    async fn apply_numbering_correction(
        &self,
        period: &Period,
        rule: NumberingRule,
    ) -> Result<u64, StoreError> {
        let mut inner = self.write()?;
        let mut updated = 0;
        for stored in inner.records.values_mut() {
            if &stored.period == period && stored.record.sequence_number == 0 {
                stored.record.sequence_number = rule.sequence_for(stored.record.record_id);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn set_confirmation(
        &self,
        record_id: i64,
        code: &ConfirmationCode,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let stored = inner
            .records
            .get_mut(&record_id)
            .ok_or(StoreError::NotFound(record_id))?;

        if let Some(existing) = &stored.confirmation {
            return Err(StoreError::AlreadyConfirmed {
                record_id,
                existing: existing.to_string(),
            });
        }
        stored.confirmation = Some(code.clone());
        Ok(())
    }

    async fn active_period(&self) -> Result<Option<Period>, StoreError> {
        Ok(self.read()?.active_period.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Charges;

    fn record(record_id: i64, account: &str, sequence: i64, total: f64) -> BillingRecord {
        BillingRecord {
            record_id,
            sequence_number: sequence,
            account_id: account.to_string(),
            charges: Charges {
                base_total: total,
                invoiced_total: total,
                ..Charges::default()
            },
            ..BillingRecord::default()
        }
    }

    fn period() -> Period {
        Period::parse("2024-05").unwrap()
    }

    #[tokio::test]
    async fn test_eligible_batch_predicate_and_order() {
        let store = InMemoryRecordStore::new();
        let p = period();
        let other = Period::parse("2024-04").unwrap();

        store.insert_record(&p, record(10, "A", 3, 50.0)).unwrap();
        store.insert_record(&p, record(11, "B", 1, 20.0)).unwrap();
        store.insert_record(&p, record(12, "C", 2, 0.0)).unwrap();
        store
            .insert_with_service(&p, record(13, "D", 4, 30.0), false)
            .unwrap();
        store.insert_record(&other, record(14, "E", 5, 30.0)).unwrap();
        store.insert_record(&p, record(15, "F", 6, 30.0)).unwrap();
        store
            .set_confirmation(15, &ConfirmationCode::new("CUF-15").unwrap())
            .await
            .unwrap();

        let batch = store.eligible_batch(&p).await.unwrap();
        let ids: Vec<i64> = batch.iter().map(|r| r.record_id).collect();
        assert_eq!(ids, vec![11, 10]);
    }

    #[tokio::test]
    async fn test_missing_readings_only_active_subscribers() {
        let store = InMemoryRecordStore::new();
        let p = period();
        store.add_subscriber("A", true).unwrap();
        store.add_subscriber("B", true).unwrap();
        store.add_subscriber("C", false).unwrap();
        store.add_subscriber("D", true).unwrap();
        store.insert_record(&p, record(1, "A", 1, 10.0)).unwrap();
        store
            .insert_with_service(&p, record(2, "D", 2, 10.0), false)
            .unwrap();

        let missing = store.missing_readings(&p).await.unwrap();
        assert_eq!(
            missing.into_iter().collect::<Vec<_>>(),
            vec!["B".to_string(), "D".to_string()]
        );
    }

    #[tokio::test]
    async fn test_numbering_correction_is_idempotent() {
        let store = InMemoryRecordStore::new();
        let p = period();
        store.insert_record(&p, record(1707500, "A", 0, 10.0)).unwrap();
        store.insert_record(&p, record(1707501, "B", 9, 10.0)).unwrap();
        let rule = NumberingRule::new(1707433);

        assert_eq!(store.apply_numbering_correction(&p, rule).await.unwrap(), 1);
        assert_eq!(store.sequence_of(1707500).unwrap(), 67);
        assert_eq!(store.sequence_of(1707501).unwrap(), 9);
        assert_eq!(store.apply_numbering_correction(&p, rule).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_confirmation_is_immutable() {
        let store = InMemoryRecordStore::new();
        store.insert_record(&period(), record(7, "A", 1, 10.0)).unwrap();

        let first = ConfirmationCode::new("FIRST").unwrap();
        let second = ConfirmationCode::new("SECOND").unwrap();
        store.set_confirmation(7, &first).await.unwrap();

        let err = store.set_confirmation(7, &second).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyConfirmed { record_id: 7, .. }));
        assert_eq!(store.confirmation_of(7).unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_set_confirmation_unknown_record() {
        let store = InMemoryRecordStore::new();
        let err = store
            .set_confirmation(99, &ConfirmationCode::new("X").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(99)));
    }
}
