// Concrete diagram editor commands

use crate::command::state::DiagramContext;
use crate::command::trait_def::{Command, CommandError, CommandResult};
use crate::diagram::types::{Bounds, Connector, ConnectorId, Point, Shape, ShapeId, ShapeKind};
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashSet;

/// Command to add a shape to the diagram
pub struct AddShapeCommand {
    ctx: DiagramContext,
    shape: Shape,
    applied: bool,
}

impl AddShapeCommand {
    pub fn new(ctx: DiagramContext, shape: Shape) -> Self {
        Self {
            ctx,
            shape,
            applied: false,
        }
    }

    pub fn shape_id(&self) -> ShapeId {
        self.shape.id
    }
}

#[async_trait]
impl Command for AddShapeCommand {
    async fn execute(&mut self) -> CommandResult<()> {
        if self.ctx.shape(self.shape.id).is_some() {
            return Err(CommandError::InvalidState(format!(
                "shape {} already exists",
                self.shape.id
            )));
        }
        self.ctx.upsert_shape(self.shape.clone()).await?;
        self.applied = true;
        Ok(())
    }

    async fn undo(&mut self) -> CommandResult<()> {
        if !self.applied {
            return Err(CommandError::UndoFailed("Shape was never added".into()));
        }
        self.ctx.remove_shape(self.shape.id).await?;
        self.applied = false;
        Ok(())
    }

    fn description(&self) -> String {
        format!("Add {:?} '{}'", self.shape.kind, self.shape.label)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Command to delete a shape together with its attached connectors
pub struct DeleteShapeCommand {
    ctx: DiagramContext,
    shape_id: ShapeId,
    removed: Option<(Shape, Vec<Connector>)>,
}

impl DeleteShapeCommand {
    pub fn new(ctx: DiagramContext, shape_id: ShapeId) -> Self {
        Self {
            ctx,
            shape_id,
            removed: None,
        }
    }

    /// Put back connectors removed by a failed execute, newest first
    async fn restore_connectors(&self, removed: &[Connector]) {
        for connector in removed.iter().rev() {
            if let Err(e) = self.ctx.upsert_connector(connector.clone()).await {
                log::error!("Could not restore connector {}: {}", connector.id, e);
            }
        }
    }
}

#[async_trait]
impl Command for DeleteShapeCommand {
    async fn execute(&mut self) -> CommandResult<()> {
        let shape = self.ctx.require_shape(self.shape_id)?;
        let connectors = self.ctx.connectors_for(self.shape_id);

        for (done, connector) in connectors.iter().enumerate() {
            if let Err(e) = self.ctx.remove_connector(connector.id).await {
                self.restore_connectors(&connectors[..done]).await;
                return Err(e);
            }
        }
        if let Err(e) = self.ctx.remove_shape(self.shape_id).await {
            self.restore_connectors(&connectors).await;
            return Err(e);
        }

        self.removed = Some((shape, connectors));
        Ok(())
    }

    async fn undo(&mut self) -> CommandResult<()> {
        let (shape, connectors) = self
            .removed
            .clone()
            .ok_or_else(|| CommandError::UndoFailed("No deleted shape stored".into()))?;

        // Shape first: connectors refer to it
        self.ctx.upsert_shape(shape).await?;
        for connector in connectors {
            self.ctx.upsert_connector(connector).await?;
        }
        Ok(())
    }

    fn description(&self) -> String {
        match &self.removed {
            Some((shape, _)) => format!("Delete '{}'", shape.label),
            None => "Delete shape".to_string(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Command to move a shape
///
/// Consecutive moves of the same shape merge, so a drag undoes in one step.
pub struct MoveShapeCommand {
    ctx: DiagramContext,
    shape_id: ShapeId,
    to: Point,
    from: Option<Point>,
}

impl MoveShapeCommand {
    pub fn new(ctx: DiagramContext, shape_id: ShapeId, to: Point) -> Self {
        Self {
            ctx,
            shape_id,
            to,
            from: None,
        }
    }

    async fn place(&self, origin: Point) -> CommandResult<()> {
        let mut shape = self.ctx.require_shape(self.shape_id)?;
        shape.bounds = shape.bounds.moved_to(origin);
        self.ctx.upsert_shape(shape).await
    }
}

#[async_trait]
impl Command for MoveShapeCommand {
    async fn execute(&mut self) -> CommandResult<()> {
        let shape = self.ctx.require_shape(self.shape_id)?;
        self.place(self.to).await?;
        self.from = Some(shape.bounds.origin);
        Ok(())
    }

    async fn undo(&mut self) -> CommandResult<()> {
        let from = self
            .from
            .ok_or_else(|| CommandError::UndoFailed("No previous position stored".into()))?;
        self.place(from).await
    }

    fn description(&self) -> String {
        "Move shape".to_string()
    }

    fn merge(&mut self, next: &dyn Command) -> bool {
        match next.as_any().downcast_ref::<MoveShapeCommand>() {
            Some(other) if other.shape_id == self.shape_id && other.ctx.diagram == self.ctx.diagram => {
                // Keep our original `from`
                self.to = other.to;
                true
            }
            _ => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Command to resize a shape through one of its handles
///
/// Takes full bounds since dragging a top/left handle also moves the origin.
pub struct ResizeShapeCommand {
    ctx: DiagramContext,
    shape_id: ShapeId,
    to: Bounds,
    from: Option<Bounds>,
}

impl ResizeShapeCommand {
    /// # Errors
    /// Rejects non-positive or non-finite sizes.
    pub fn new(ctx: DiagramContext, shape_id: ShapeId, to: Bounds) -> CommandResult<Self> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(to.width) || !valid(to.height) {
            return Err(CommandError::InvalidState(format!(
                "invalid size {}x{}",
                to.width, to.height
            )));
        }
        Ok(Self {
            ctx,
            shape_id,
            to,
            from: None,
        })
    }

    async fn apply(&self, bounds: Bounds) -> CommandResult<()> {
        let mut shape = self.ctx.require_shape(self.shape_id)?;
        shape.bounds = bounds;
        self.ctx.upsert_shape(shape).await
    }
}

#[async_trait]
impl Command for ResizeShapeCommand {
    async fn execute(&mut self) -> CommandResult<()> {
        let shape = self.ctx.require_shape(self.shape_id)?;
        self.apply(self.to).await?;
        self.from = Some(shape.bounds);
        Ok(())
    }

    async fn undo(&mut self) -> CommandResult<()> {
        let from = self
            .from
            .ok_or_else(|| CommandError::UndoFailed("No previous bounds stored".into()))?;
        self.apply(from).await
    }

    fn description(&self) -> String {
        format!("Resize shape to {:.0}x{:.0}", self.to.width, self.to.height)
    }

    fn merge(&mut self, next: &dyn Command) -> bool {
        match next.as_any().downcast_ref::<ResizeShapeCommand>() {
            Some(other) if other.shape_id == self.shape_id && other.ctx.diagram == self.ctx.diagram => {
                self.to = other.to;
                true
            }
            _ => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Command to change a shape's label
pub struct RenameShapeCommand {
    ctx: DiagramContext,
    shape_id: ShapeId,
    label: String,
    previous: Option<String>,
}

impl RenameShapeCommand {
    pub fn new(ctx: DiagramContext, shape_id: ShapeId, label: impl Into<String>) -> Self {
        Self {
            ctx,
            shape_id,
            label: label.into(),
            previous: None,
        }
    }

    async fn set_label(&self, label: String) -> CommandResult<()> {
        let mut shape = self.ctx.require_shape(self.shape_id)?;
        shape.label = label;
        self.ctx.upsert_shape(shape).await
    }
}

#[async_trait]
impl Command for RenameShapeCommand {
    async fn execute(&mut self) -> CommandResult<()> {
        let shape = self.ctx.require_shape(self.shape_id)?;
        self.set_label(self.label.clone()).await?;
        self.previous = Some(shape.label);
        Ok(())
    }

    async fn undo(&mut self) -> CommandResult<()> {
        let previous = self
            .previous
            .clone()
            .ok_or_else(|| CommandError::UndoFailed("No previous label stored".into()))?;
        self.set_label(previous).await
    }

    fn description(&self) -> String {
        format!("Rename to '{}'", self.label)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Command to connect two shapes
pub struct AddConnectorCommand {
    ctx: DiagramContext,
    connector: Connector,
    applied: bool,
}

impl AddConnectorCommand {
    pub fn new(ctx: DiagramContext, connector: Connector) -> Self {
        Self {
            ctx,
            connector,
            applied: false,
        }
    }

    pub fn connector_id(&self) -> ConnectorId {
        self.connector.id
    }
}

#[async_trait]
impl Command for AddConnectorCommand {
    async fn execute(&mut self) -> CommandResult<()> {
        self.ctx.require_shape(self.connector.source)?;
        self.ctx.require_shape(self.connector.target)?;
        self.ctx.upsert_connector(self.connector.clone()).await?;
        self.applied = true;
        Ok(())
    }

    async fn undo(&mut self) -> CommandResult<()> {
        if !self.applied {
            return Err(CommandError::UndoFailed("Connector was never added".into()));
        }
        self.ctx.remove_connector(self.connector.id).await?;
        self.applied = false;
        Ok(())
    }

    fn description(&self) -> String {
        format!("Add {:?} connector", self.connector.kind)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Command to delete a connector
pub struct DeleteConnectorCommand {
    ctx: DiagramContext,
    connector_id: ConnectorId,
    removed: Option<Connector>,
}

impl DeleteConnectorCommand {
    pub fn new(ctx: DiagramContext, connector_id: ConnectorId) -> Self {
        Self {
            ctx,
            connector_id,
            removed: None,
        }
    }
}

#[async_trait]
impl Command for DeleteConnectorCommand {
    async fn execute(&mut self) -> CommandResult<()> {
        let connector = self.ctx.require_connector(self.connector_id)?;
        self.ctx.remove_connector(self.connector_id).await?;
        self.removed = Some(connector);
        Ok(())
    }

    async fn undo(&mut self) -> CommandResult<()> {
        let connector = self
            .removed
            .clone()
            .ok_or_else(|| CommandError::UndoFailed("No deleted connector stored".into()))?;
        self.ctx.upsert_connector(connector).await
    }

    fn description(&self) -> String {
        "Delete connector".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn require_enumeration(shape: &Shape) -> CommandResult<()> {
    if shape.kind != ShapeKind::Enumeration {
        return Err(CommandError::InvalidState(format!(
            "'{}' is a {:?}, not an enumeration",
            shape.label, shape.kind
        )));
    }
    Ok(())
}

/// Command to append a literal to an enumeration shape
pub struct AddEnumerationLiteralCommand {
    ctx: DiagramContext,
    shape_id: ShapeId,
    literal: String,
    added_at: Option<usize>,
}

impl AddEnumerationLiteralCommand {
    pub fn new(ctx: DiagramContext, shape_id: ShapeId, literal: impl Into<String>) -> Self {
        Self {
            ctx,
            shape_id,
            literal: literal.into().trim().to_string(),
            added_at: None,
        }
    }
}

#[async_trait]
impl Command for AddEnumerationLiteralCommand {
    async fn execute(&mut self) -> CommandResult<()> {
        if self.literal.is_empty() {
            return Err(CommandError::InvalidState("Literal is empty".into()));
        }
        let mut shape = self.ctx.require_shape(self.shape_id)?;
        require_enumeration(&shape)?;
        if shape.literals.contains(&self.literal) {
            return Err(CommandError::InvalidState(format!(
                "'{}' already has literal '{}'",
                shape.label, self.literal
            )));
        }

        let index = shape.literals.len();
        shape.literals.push(self.literal.clone());
        self.ctx.upsert_shape(shape).await?;
        self.added_at = Some(index);
        Ok(())
    }

    async fn undo(&mut self) -> CommandResult<()> {
        let index = self
            .added_at
            .ok_or_else(|| CommandError::UndoFailed("Literal was never added".into()))?;
        let mut shape = self.ctx.require_shape(self.shape_id)?;

        // Later edits may have shifted it
        let position = if shape.literals.get(index) == Some(&self.literal) {
            Some(index)
        } else {
            shape.literals.iter().position(|l| *l == self.literal)
        };
        let position = position.ok_or_else(|| {
            CommandError::UndoFailed(format!("Literal '{}' no longer present", self.literal))
        })?;

        shape.literals.remove(position);
        self.ctx.upsert_shape(shape).await?;
        self.added_at = None;
        Ok(())
    }

    fn description(&self) -> String {
        format!("Add literal '{}'", self.literal)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Command to remove a literal from an enumeration shape
pub struct RemoveEnumerationLiteralCommand {
    ctx: DiagramContext,
    shape_id: ShapeId,
    literal: String,
    removed_at: Option<usize>,
}

impl RemoveEnumerationLiteralCommand {
    pub fn new(ctx: DiagramContext, shape_id: ShapeId, literal: impl Into<String>) -> Self {
        Self {
            ctx,
            shape_id,
            literal: literal.into(),
            removed_at: None,
        }
    }
}

#[async_trait]
impl Command for RemoveEnumerationLiteralCommand {
    async fn execute(&mut self) -> CommandResult<()> {
        let mut shape = self.ctx.require_shape(self.shape_id)?;
        require_enumeration(&shape)?;
        let index = shape
            .literals
            .iter()
            .position(|l| *l == self.literal)
            .ok_or_else(|| CommandError::NotFound(format!("literal '{}'", self.literal)))?;

        shape.literals.remove(index);
        self.ctx.upsert_shape(shape).await?;
        self.removed_at = Some(index);
        Ok(())
    }

    async fn undo(&mut self) -> CommandResult<()> {
        let index = self
            .removed_at
            .ok_or_else(|| CommandError::UndoFailed("Literal was never removed".into()))?;
        let mut shape = self.ctx.require_shape(self.shape_id)?;
        let index = index.min(shape.literals.len());
        shape.literals.insert(index, self.literal.clone());
        self.ctx.upsert_shape(shape).await?;
        self.removed_at = None;
        Ok(())
    }

    fn description(&self) -> String {
        format!("Remove literal '{}'", self.literal)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Command for dropping a shape into a folder (or back to the root)
pub struct MoveToFolderCommand {
    ctx: DiagramContext,
    shape_id: ShapeId,
    folder: Option<ShapeId>,
    previous: Option<Option<ShapeId>>,
}

impl MoveToFolderCommand {
    /// `folder == None` moves the shape to the diagram root
    pub fn new(ctx: DiagramContext, shape_id: ShapeId, folder: Option<ShapeId>) -> Self {
        Self {
            ctx,
            shape_id,
            folder,
            previous: None,
        }
    }

    /// Reject folders that are not containers, or that sit inside the shape
    fn check_target(&self) -> CommandResult<()> {
        let Some(folder_id) = self.folder else {
            return Ok(());
        };
        let folder = self.ctx.require_shape(folder_id)?;
        if !folder.kind.is_container() {
            return Err(CommandError::InvalidState(format!(
                "'{}' is not a folder",
                folder.label
            )));
        }

        let mut visited = HashSet::new();
        let mut ancestor = Some(folder);
        while let Some(current) = ancestor {
            if current.id == self.shape_id {
                return Err(CommandError::InvalidState(
                    "Cannot move a folder into itself".into(),
                ));
            }
            if !visited.insert(current.id) {
                return Err(CommandError::InvalidState(format!(
                    "folder cycle through '{}'",
                    current.label
                )));
            }
            ancestor = current.folder.and_then(|parent| self.ctx.shape(parent));
        }
        Ok(())
    }

    async fn set_folder(&self, folder: Option<ShapeId>) -> CommandResult<()> {
        let mut shape = self.ctx.require_shape(self.shape_id)?;
        shape.folder = folder;
        self.ctx.upsert_shape(shape).await
    }
}

#[async_trait]
impl Command for MoveToFolderCommand {
    async fn execute(&mut self) -> CommandResult<()> {
        let shape = self.ctx.require_shape(self.shape_id)?;
        self.check_target()?;
        self.set_folder(self.folder).await?;
        self.previous = Some(shape.folder);
        Ok(())
    }

    async fn undo(&mut self) -> CommandResult<()> {
        let previous = self
            .previous
            .ok_or_else(|| CommandError::UndoFailed("No previous folder stored".into()))?;
        self.set_folder(previous).await
    }

    fn description(&self) -> String {
        match self.folder {
            Some(_) => "Move to folder".to_string(),
            None => "Move to root".to_string(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
