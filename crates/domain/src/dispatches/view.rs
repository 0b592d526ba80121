use std::sync::Arc;
use async_trait::async_trait;
use cqrs_es::{
    persist::{PersistenceError, ViewContext, ViewRepository},
    Aggregate, EventEnvelope, View as CqrsView,
};
use serde::{Deserialize, Serialize};
use super::{Dispatch, AGGREGATE_TYPE};

#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct View {
    pub aggregate_type: String,
    pub command_id: String,
    pub id: String,
    pub dispatch: Dispatch,
}

impl CqrsView<Dispatch> for View {
    fn update(&mut self, event: &EventEnvelope<Dispatch>) {
        self.id.clone_from(&event.aggregate_id);
        self.aggregate_type = AGGREGATE_TYPE.to_string();
        self.command_id = event
            .metadata
            .get("command_id")
            .cloned()
            .unwrap_or_default();
        self.dispatch.apply(event.payload.clone());
    }
}

/// Keeps the dispatch view table in step with committed events. Failures are logged, not returned.
pub struct Query {
    repo: Arc<Box<dyn ViewRepository<View, Dispatch>>>,
}

impl Query {
    pub fn new(repo: Arc<Box<dyn ViewRepository<View, Dispatch>>>) -> Self {
        Self { repo }
    }

    async fn update(
        &self,
        dispatch_id: &str,
        events: &[EventEnvelope<Dispatch>],
    ) -> Result<(), PersistenceError> {
        let (mut view, view_context) = match self.repo.load_with_context(dispatch_id).await? {
            None => {
                let view_context = ViewContext::new(dispatch_id.to_string(), 0);
                (Default::default(), view_context)
            }
            Some((view, context)) => (view, context),
        };

        for event in events {
            view.update(event);
        }

        self.repo.update_view(view, view_context).await
    }
}

#[async_trait]
impl cqrs_es::Query<Dispatch> for Query {
    async fn dispatch(&self, dispatch_id: &str, events: &[EventEnvelope<Dispatch>]) {
        if let Err(err) = self.update(dispatch_id, events).await {
            tracing::error!(dispatch_id, "Dispatch view update failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;

    use super::*;
    use crate::dispatches::Event;

    #[test]
    fn view_tracks_command_and_state() {
        let mut view = View::default();
        let mut metadata = HashMap::new();
        metadata.insert("command_id".to_string(), "cmd-1".to_string());

        view.update(&EventEnvelope {
            aggregate_id: "D1".to_string(),
            sequence: 1,
            payload: Event::DeliveryStarted {
                id: "D1".to_string(),
                updated_at: Utc::now(),
            },
            metadata,
        });

        assert_eq!(view.id, "D1");
        assert_eq!(view.aggregate_type, "Dispatch");
        assert_eq!(view.command_id, "cmd-1");
        assert_eq!(view.dispatch.status, crate::dispatches::DispatchStatus::InProgress);
    }
}
