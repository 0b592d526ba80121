use std::{collections::HashMap, env, sync::Arc};
use aws_sdk_dynamodb::types::AttributeValue;
use cqrs_es::{
    persist::{PersistedEventStore, ViewRepository},
    CqrsFramework,
};
use dynamo_es::{DynamoEventRepository, DynamoViewRepository};
use crate::errors::Error;
use super::{Dispatch, DynamoReferenceData, Query, Services, View, ViewLookup};

pub type DispatchCqrs = CqrsFramework<Dispatch, PersistedEventStore<DynamoEventRepository, Dispatch>>;
pub type DispatchViewRepository = Arc<Box<dyn ViewRepository<View, Dispatch>>>;

const SNAPSHOT_EVERY: usize = 5;

/// Table names, from the environment with local defaults.
#[derive(Clone, Debug)]
pub struct TableConfig {
    pub event_log: String,
    pub event_snapshots: String,
    pub dispatches_view: String,
    pub reference_data: String,
}

impl TableConfig {
    pub fn from_env() -> Self {
        Self {
            event_log: env::var("DYNAMODB_EVENT_LOG_TABLE")
                .unwrap_or("pharmacy-dispatch-event-log".to_string()),
            event_snapshots: env::var("DYNAMODB_EVENT_SNAPSHOTS_TABLE")
                .unwrap_or("pharmacy-dispatch-event-snapshots".to_string()),
            dispatches_view: env::var("DYNAMODB_DISPATCHES_VIEW_TABLE")
                .unwrap_or("pharmacy-dispatch-dispatches-view".to_string()),
            reference_data: env::var("DYNAMODB_REFERENCE_TABLE")
                .unwrap_or("pharmacy-dispatch-reference-data".to_string()),
        }
    }
}

pub fn init(
    client: aws_sdk_dynamodb::Client,
    repo: DispatchViewRepository,
    tables: &TableConfig,
) -> Arc<DispatchCqrs> {
    let store: PersistedEventStore<DynamoEventRepository, Dispatch> =
        PersistedEventStore::new_snapshot_store(
            DynamoEventRepository::new(client.clone())
                .with_tables(&tables.event_log, &tables.event_snapshots),
            SNAPSHOT_EVERY,
        );

    let query = Box::new(Query::new(repo.clone()));
    let services = Services::new(
        ViewLookup::new(repo),
        DynamoReferenceData::new(client, tables.reference_data.clone()),
    );

    Arc::new(CqrsFramework::new(store, vec![query], services))
}

pub fn init_repo(client: aws_sdk_dynamodb::Client, tables: &TableConfig) -> DispatchViewRepository {
    Arc::new(Box::new(DynamoViewRepository::new(&tables.dispatches_view, client)))
}

/// Scans the view table. Used by reports, which need every dispatch in a period.
pub async fn list_dispatches(
    client: &aws_sdk_dynamodb::Client,
    tables: &TableConfig,
) -> Result<Vec<Dispatch>, Error> {
    let mut dispatches = Vec::new();
    let mut start_key: Option<HashMap<String, AttributeValue>> = None;

    loop {
        let output = client
            .scan()
            .table_name(&tables.dispatches_view)
            .set_exclusive_start_key(start_key.take())
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: e.to_string(),
            })?;

        for item in output.items() {
            let Some(AttributeValue::B(payload)) = item.get("Payload") else {
                tracing::warn!("Skipping view item without payload");
                continue;
            };
            let view: View = serde_json::from_slice(payload.as_ref()).map_err(|e| Error::Storage {
                message: format!("Corrupt dispatch view: {e}"),
            })?;
            dispatches.push(view.dispatch);
        }

        match output.last_evaluated_key() {
            Some(key) if !key.is_empty() => start_key = Some(key.clone()),
            _ => break,
        }
    }

    Ok(dispatches)
}
