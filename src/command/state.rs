// Collaborators that diagram commands read from and write to
//
// Commands never own diagram data. They capture a DiagramContext at
// construction time and go through two narrow capabilities:
// - DiagramStore: the local cache (read current state, update it)
// - RemoteSync: the persistence backend (push a change)

use crate::command::trait_def::{CommandError, CommandResult};
use crate::diagram::types::{Connector, ConnectorId, Diagram, DiagramChange, Shape, ShapeId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Local, synchronously readable diagram state
pub trait DiagramStore: Send + Sync {
    fn shape(&self, diagram: &str, id: ShapeId) -> Option<Shape>;
    fn put_shape(&self, diagram: &str, shape: Shape);
    fn remove_shape(&self, diagram: &str, id: ShapeId) -> Option<Shape>;

    fn connector(&self, diagram: &str, id: ConnectorId) -> Option<Connector>;
    fn put_connector(&self, diagram: &str, connector: Connector);
    fn remove_connector(&self, diagram: &str, id: ConnectorId) -> Option<Connector>;

    /// Connectors with `shape` as source or target
    fn connectors_for(&self, diagram: &str, shape: ShapeId) -> Vec<Connector>;
}

/// Remote persistence of diagram changes
#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// Persist one change
    ///
    /// Implementations report failures as `CommandError::Sync`.
    async fn push(&self, diagram: &str, change: DiagramChange) -> CommandResult<()>;
}

/// RemoteSync for offline editing: accepts every change
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSync;

#[async_trait]
impl RemoteSync for NoopSync {
    async fn push(&self, _diagram: &str, _change: DiagramChange) -> CommandResult<()> {
        Ok(())
    }
}

/// In-memory DiagramStore
#[derive(Default)]
pub struct InMemoryDiagramStore {
    diagrams: Mutex<HashMap<String, Diagram>>,
}

impl InMemoryDiagramStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of a diagram's current state
    pub fn snapshot(&self, diagram: &str) -> Diagram {
        self.lock().get(diagram).cloned().unwrap_or_default()
    }

    /// Replace a diagram's state, e.g. after loading it
    pub fn load(&self, diagram: &str, state: Diagram) {
        self.lock().insert(diagram.to_string(), state);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Diagram>> {
        self.diagrams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DiagramStore for InMemoryDiagramStore {
    fn shape(&self, diagram: &str, id: ShapeId) -> Option<Shape> {
        self.lock().get(diagram)?.shapes.get(&id).cloned()
    }

    fn put_shape(&self, diagram: &str, shape: Shape) {
        self.lock()
            .entry(diagram.to_string())
            .or_default()
            .shapes
            .insert(shape.id, shape);
    }

    fn remove_shape(&self, diagram: &str, id: ShapeId) -> Option<Shape> {
        self.lock().get_mut(diagram)?.shapes.remove(&id)
    }

    fn connector(&self, diagram: &str, id: ConnectorId) -> Option<Connector> {
        self.lock().get(diagram)?.connectors.get(&id).cloned()
    }

    fn put_connector(&self, diagram: &str, connector: Connector) {
        self.lock()
            .entry(diagram.to_string())
            .or_default()
            .connectors
            .insert(connector.id, connector);
    }

    fn remove_connector(&self, diagram: &str, id: ConnectorId) -> Option<Connector> {
        self.lock().get_mut(diagram)?.connectors.remove(&id)
    }

    fn connectors_for(&self, diagram: &str, shape: ShapeId) -> Vec<Connector> {
        self.lock()
            .get(diagram)
            .map(|d| {
                d.connectors
                    .values()
                    .filter(|c| c.touches(shape))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Everything a diagram command needs to reach its diagram
///
/// Changes are pushed to the remote first and applied to the local store
/// only once the push succeeded, so a failed sync leaves the local state
/// untouched.
#[derive(Clone)]
pub struct DiagramContext {
    pub diagram: String,
    store: Arc<dyn DiagramStore>,
    sync: Arc<dyn RemoteSync>,
}

impl DiagramContext {
    pub fn new(
        diagram: impl Into<String>,
        store: Arc<dyn DiagramStore>,
        sync: Arc<dyn RemoteSync>,
    ) -> Self {
        Self {
            diagram: diagram.into(),
            store,
            sync,
        }
    }

    /// Context without remote persistence
    pub fn local(diagram: impl Into<String>, store: Arc<dyn DiagramStore>) -> Self {
        Self::new(diagram, store, Arc::new(NoopSync))
    }

    pub fn shape(&self, id: ShapeId) -> Option<Shape> {
        self.store.shape(&self.diagram, id)
    }

    /// Current state of a shape, or `NotFound`
    pub fn require_shape(&self, id: ShapeId) -> CommandResult<Shape> {
        self.shape(id)
            .ok_or_else(|| CommandError::NotFound(format!("shape {} in diagram {}", id, self.diagram)))
    }

    pub fn connector(&self, id: ConnectorId) -> Option<Connector> {
        self.store.connector(&self.diagram, id)
    }

    pub fn require_connector(&self, id: ConnectorId) -> CommandResult<Connector> {
        self.connector(id).ok_or_else(|| {
            CommandError::NotFound(format!("connector {} in diagram {}", id, self.diagram))
        })
    }

    pub fn connectors_for(&self, shape: ShapeId) -> Vec<Connector> {
        self.store.connectors_for(&self.diagram, shape)
    }

    pub async fn upsert_shape(&self, shape: Shape) -> CommandResult<()> {
        self.sync
            .push(&self.diagram, DiagramChange::ShapeUpserted(shape.clone()))
            .await?;
        self.store.put_shape(&self.diagram, shape);
        Ok(())
    }

    pub async fn remove_shape(&self, id: ShapeId) -> CommandResult<()> {
        self.sync
            .push(&self.diagram, DiagramChange::ShapeRemoved(id))
            .await?;
        self.store.remove_shape(&self.diagram, id);
        Ok(())
    }

    pub async fn upsert_connector(&self, connector: Connector) -> CommandResult<()> {
        self.sync
            .push(&self.diagram, DiagramChange::ConnectorUpserted(connector.clone()))
            .await?;
        self.store.put_connector(&self.diagram, connector);
        Ok(())
    }

    pub async fn remove_connector(&self, id: ConnectorId) -> CommandResult<()> {
        self.sync
            .push(&self.diagram, DiagramChange::ConnectorRemoved(id))
            .await?;
        self.store.remove_connector(&self.diagram, id);
        Ok(())
    }
}
