//! Collaborators the aggregate consults while handling commands.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use cqrs_es::{persist::ViewRepository, EventEnvelope, Query};

use crate::errors::Error;

use super::aggregate::Dispatch;
use super::inputs::DispatchChanges;
use super::view::View;

/// Reads existing dispatches, e.g. the original of a resend.
#[async_trait]
pub trait DispatchLookup: Send + Sync {
    async fn load_dispatch(&self, id: &str) -> Result<Option<Dispatch>, Error>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ReferenceKind {
    Pharmacy,
    Rider,
    Vehicle,
}

impl ReferenceKind {
    pub fn key_prefix(&self) -> &'static str {
        match self {
            ReferenceKind::Pharmacy => "PHARMACY",
            ReferenceKind::Rider => "RIDER",
            ReferenceKind::Vehicle => "VEHICLE",
        }
    }

    fn entity(&self) -> &'static str {
        match self {
            ReferenceKind::Pharmacy => "Pharmacy",
            ReferenceKind::Rider => "Rider",
            ReferenceKind::Vehicle => "Vehicle",
        }
    }
}

/// Pharmacies, riders and vehicles are owned elsewhere; the core only checks they exist.
#[async_trait]
pub trait ReferenceData: Send + Sync {
    async fn exists(&self, kind: ReferenceKind, id: &str) -> Result<bool, Error>;
}

pub struct Services {
    pub dispatches: Arc<dyn DispatchLookup>,
    pub references: Arc<dyn ReferenceData>,
}

impl Services {
    pub fn new(
        dispatches: impl DispatchLookup + 'static,
        references: impl ReferenceData + 'static,
    ) -> Self {
        Self {
            dispatches: Arc::new(dispatches),
            references: Arc::new(references),
        }
    }

    pub(crate) async fn ensure_references_exist(&self, dispatch: &Dispatch) -> Result<(), Error> {
        self.ensure_exists(ReferenceKind::Pharmacy, &dispatch.origin_pharmacy_id)
            .await?;
        if let Some(secondary) = &dispatch.secondary_pharmacy_id {
            self.ensure_exists(ReferenceKind::Pharmacy, secondary).await?;
        }
        if let Some(rider_id) = &dispatch.rider_id {
            self.ensure_exists(ReferenceKind::Rider, rider_id).await?;
        }
        if let Some(vehicle_id) = &dispatch.vehicle_id {
            self.ensure_exists(ReferenceKind::Vehicle, vehicle_id).await?;
        }
        Ok(())
    }

    pub(crate) async fn ensure_assignment_exists(
        &self,
        changes: &DispatchChanges,
    ) -> Result<(), Error> {
        if let Some(rider_id) = &changes.rider_id {
            self.ensure_exists(ReferenceKind::Rider, rider_id).await?;
        }
        if let Some(vehicle_id) = &changes.vehicle_id {
            self.ensure_exists(ReferenceKind::Vehicle, vehicle_id).await?;
        }
        Ok(())
    }

    async fn ensure_exists(&self, kind: ReferenceKind, id: &str) -> Result<(), Error> {
        if self.references.exists(kind, id).await? {
            Ok(())
        } else {
            Err(Error::not_found(kind.entity(), id))
        }
    }
}

/// Looks dispatches up in the read model.
pub struct ViewLookup {
    repo: Arc<Box<dyn ViewRepository<View, Dispatch>>>,
}

impl ViewLookup {
    pub fn new(repo: Arc<Box<dyn ViewRepository<View, Dispatch>>>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl DispatchLookup for ViewLookup {
    async fn load_dispatch(&self, id: &str) -> Result<Option<Dispatch>, Error> {
        let view = self.repo.load(id).await.map_err(|e| Error::Storage {
            message: e.to_string(),
        })?;

        Ok(view.map(|view| view.dispatch))
    }
}

/// Reference table keyed by `pk = "<KIND>#<id>"`.
pub struct DynamoReferenceData {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl DynamoReferenceData {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl ReferenceData for DynamoReferenceData {
    async fn exists(&self, kind: ReferenceKind, id: &str) -> Result<bool, Error> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(
                "pk",
                AttributeValue::S(format!("{}#{}", kind.key_prefix(), id)),
            )
            .projection_expression("pk")
            .send()
            .await
            .map_err(|e| Error::Storage {
                message: e.to_string(),
            })?;

        Ok(output.item().is_some())
    }
}

/// Process-local dispatch store. Register it as a query so it follows committed events.
#[derive(Clone, Default)]
pub struct InMemoryDispatches {
    dispatches: Arc<RwLock<HashMap<String, Dispatch>>>,
}

impl InMemoryDispatches {
    pub fn insert(&self, dispatch: Dispatch) {
        self.dispatches
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dispatch.id.clone(), dispatch);
    }

    pub fn get(&self, id: &str) -> Option<Dispatch> {
        self.dispatches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Dispatch> {
        self.dispatches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DispatchLookup for InMemoryDispatches {
    async fn load_dispatch(&self, id: &str) -> Result<Option<Dispatch>, Error> {
        Ok(self.get(id))
    }
}

#[async_trait]
impl Query<Dispatch> for InMemoryDispatches {
    async fn dispatch(&self, dispatch_id: &str, events: &[EventEnvelope<Dispatch>]) {
        use cqrs_es::Aggregate;

        let mut dispatches = self
            .dispatches
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let dispatch = dispatches.entry(dispatch_id.to_string()).or_default();
        for event in events {
            dispatch.apply(event.payload.clone());
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryReferenceData {
    known: HashSet<(ReferenceKind, String)>,
}

impl InMemoryReferenceData {
    pub fn with_pharmacies<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(ReferenceKind::Pharmacy, ids)
    }

    pub fn with_riders<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(ReferenceKind::Rider, ids)
    }

    pub fn with_vehicles<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(ReferenceKind::Vehicle, ids)
    }

    fn with<I, S>(mut self, kind: ReferenceKind, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known
            .extend(ids.into_iter().map(|id| (kind, id.into())));
        self
    }
}

#[async_trait]
impl ReferenceData for InMemoryReferenceData {
    async fn exists(&self, kind: ReferenceKind, id: &str) -> Result<bool, Error> {
        Ok(self.known.contains(&(kind, id.to_string())))
    }
}
