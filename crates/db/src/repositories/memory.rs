use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;

use fitsync_core::domain::customer::{CustomerProfile, CustomerRecord, ExternalCustomerId};

use super::{CustomerRepository, RepositoryError};

#[derive(Default)]
struct CustomerTable {
    next_id: i64,
    rows: BTreeMap<String, CustomerRecord>,
}

/// Map-backed store with the same uniqueness semantics as the SQL table.
#[derive(Default)]
pub struct InMemoryCustomerRepository {
    table: RwLock<CustomerTable>,
}

#[async_trait::async_trait]
impl CustomerRepository for InMemoryCustomerRepository {
    async fn find_by_external_id(
        &self,
        id: &ExternalCustomerId,
    ) -> Result<Option<CustomerRecord>, RepositoryError> {
        let table = self.table.read().await;
        Ok(table.rows.get(id.as_str()).cloned())
    }

    async fn list(&self) -> Result<Vec<CustomerRecord>, RepositoryError> {
        let table = self.table.read().await;
        let mut records: Vec<CustomerRecord> = table.rows.values().cloned().collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    async fn insert(
        &self,
        id: &ExternalCustomerId,
        profile: &CustomerProfile,
    ) -> Result<CustomerRecord, RepositoryError> {
        let mut table = self.table.write().await;
        if table.rows.contains_key(id.as_str()) {
            return Err(RepositoryError::Conflict(id.to_string()));
        }

        table.next_id += 1;
        let now = Utc::now();
        let record = CustomerRecord {
            id: table.next_id,
            customer_id: id.clone(),
            profile: profile.clone(),
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(id.0.clone(), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: &ExternalCustomerId,
        profile: &CustomerProfile,
    ) -> Result<CustomerRecord, RepositoryError> {
        let mut table = self.table.write().await;
        let record = table
            .rows
            .get_mut(id.as_str())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;

        record.profile = profile.clone();
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, id: &ExternalCustomerId) -> Result<bool, RepositoryError> {
        let mut table = self.table.write().await;
        Ok(table.rows.remove(id.as_str()).is_some())
    }
}

#[cfg(test)]
mod tests {
    use fitsync_core::domain::customer::{CustomerProfile, ExternalCustomerId};

    use crate::repositories::{CustomerRepository, InMemoryCustomerRepository, RepositoryError};

    #[tokio::test]
    async fn in_memory_customer_repo_round_trip() {
        let repo = InMemoryCustomerRepository::default();
        let id = ExternalCustomerId("A1".to_string());
        let profile =
            CustomerProfile { neck: Some("15.5".to_string()), ..CustomerProfile::default() };

        let created = repo.insert(&id, &profile).await.expect("insert");
        let found = repo.find_by_external_id(&id).await.expect("find");

        assert_eq!(found, Some(created));
    }

    #[tokio::test]
    async fn in_memory_customer_repo_enforces_unique_external_id() {
        let repo = InMemoryCustomerRepository::default();
        let id = ExternalCustomerId("A1".to_string());
        repo.insert(&id, &CustomerProfile::default()).await.expect("insert");

        let error = repo.insert(&id, &CustomerProfile::default()).await.expect_err("duplicate");

        assert!(matches!(error, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn in_memory_customer_repo_lists_by_id_and_deletes() {
        let repo = InMemoryCustomerRepository::default();
        for key in ["Z9", "A1"] {
            repo.insert(&ExternalCustomerId(key.to_string()), &CustomerProfile::default())
                .await
                .expect("insert");
        }

        let listed = repo.list().await.expect("list");
        assert_eq!(listed[0].customer_id.0, "Z9");
        assert_eq!(listed[1].customer_id.0, "A1");

        assert!(repo.delete(&ExternalCustomerId("Z9".to_string())).await.expect("delete"));
        assert_eq!(repo.list().await.expect("list").len(), 1);
    }
}
