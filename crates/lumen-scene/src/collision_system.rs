//! Ray queries against registered collidables.
//!
//! Each collidable is reduced to a local-space box or sphere at registration,
//! and again whenever its entity gains a component.
//! Dynamic shapes follow the entity's world matrix at query time; static
//! shapes are frozen in world space the first time they are queried with a
//! valid world matrix.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{Mat4, Vec3};
use lumen_core::{Aabb, EntityGuid, Ray};
use lumen_ecs::components::{Collidable, CollisionShape, Renderable, Transform};
use lumen_ecs::message::fields;
use lumen_ecs::{
    ComponentType, EntityObject, Message, MessageSender, MessageType, System, SystemBase,
    SystemType, World,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

/// One ray hit, serialized as `{guid, name, hit_position}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollisionHit {
    pub guid: EntityGuid,
    pub name: String,
    pub hit_position: Vec3,
}

/// Hits of a message-driven query, kept until the requester collects them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollisionQueryResult {
    pub event: String,
    pub hits: Vec<CollisionHit>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Box(Aabb),
    Sphere { center: Vec3, radius: f32 },
}

impl Shape {
    fn to_world(self, matrix: &Mat4) -> Shape {
        match self {
            Shape::Box(aabb) => Shape::Box(aabb.transformed(matrix)),
            Shape::Sphere { center, radius } => {
                let (scale, _, _) = matrix.to_scale_rotation_translation();
                Shape::Sphere {
                    center: matrix.transform_point3(center),
                    radius: radius * scale.abs().max_element(),
                }
            }
        }
    }

    fn intersect(&self, ray: &Ray) -> Option<f32> {
        match self {
            Shape::Box(aabb) => aabb.intersect_ray(ray),
            Shape::Sphere { center, radius } => ray.intersect_sphere(*center, *radius),
        }
    }
}

#[derive(Debug, Clone)]
struct CollisionEntry {
    guid: EntityGuid,
    name: String,
    local: Shape,
    is_static: bool,
    frozen: Option<Shape>,
    enabled: bool,
}

#[derive(Debug, Clone)]
struct PendingQuery {
    ray: Ray,
    requester: String,
    event: String,
}

impl PendingQuery {
    fn from_message(message: &Message) -> anyhow::Result<Self> {
        Ok(Self {
            ray: message.ray(fields::RAY)?,
            requester: message.text(fields::REQUESTER)?.to_string(),
            event: if message.has_field(fields::EVENT) {
                message.text(fields::EVENT)?.to_string()
            } else {
                String::new()
            },
        })
    }
}

pub struct CollisionSystem {
    base: SystemBase,
    entries: Vec<CollisionEntry>,
    debug_visualization: bool,
    queries: Arc<Mutex<Vec<PendingQuery>>>,
    results: HashMap<String, Vec<CollisionQueryResult>>,
    result_sink: Option<MessageSender>,
}

impl CollisionSystem {
    pub fn new() -> Self {
        Self {
            base: SystemBase::new(SystemType::Collision),
            entries: Vec::new(),
            debug_visualization: false,
            queries: Arc::new(Mutex::new(Vec::new())),
            results: HashMap::new(),
            result_sink: None,
        }
    }

    /// Announce finished message-driven queries on another bus.
    pub fn set_result_sink(&mut self, sink: MessageSender) {
        self.result_sink = Some(sink);
    }

    /// Register an entity carrying a [`Collidable`]. Returns `false` if it has
    /// none or is already registered.
    pub fn register(&mut self, world: &World, entity: &EntityObject) -> bool {
        let guid = entity.guid();
        if self.entries.iter().any(|e| e.guid == guid) {
            warn!("Collidable {} is already registered", entity);
            return false;
        }
        let Some(collidable) = world.get::<Collidable>(guid) else {
            return false;
        };
        let local = Self::local_shape(world, guid, collidable);
        self.entries.push(CollisionEntry {
            guid,
            name: entity.name().to_string(),
            local,
            is_static: collidable.is_static,
            frozen: None,
            enabled: collidable.enabled,
        });
        debug!("Registered collidable {} as {:?}", entity, local);
        true
    }

    fn local_shape(world: &World, guid: EntityGuid, collidable: &Collidable) -> Shape {
        let renderable_bounds = || {
            world.get::<Renderable>(guid).map(|r| r.bounds).unwrap_or_else(|| {
                warn!("Collidable {} has no renderable to match, using a unit box", guid);
                Aabb::unit()
            })
        };
        if collidable.is_static && collidable.match_attached_object {
            return Shape::Box(renderable_bounds());
        }
        match collidable.shape {
            CollisionShape::MatchRenderable => Shape::Box(renderable_bounds()),
            CollisionShape::Box {
                center,
                half_extents,
            } => Shape::Box(Aabb::from_center_half_extents(center, half_extents)),
            CollisionShape::Sphere { center, radius } => Shape::Sphere { center, radius },
        }
    }

    /// Resolve a registered collidable's shape again, for instance once the
    /// renderable it matches has been attached. A frozen static shape is thawed
    /// when the shape changes.
    pub fn refresh_shape(&mut self, world: &World, guid: EntityGuid) -> bool {
        let Some(collidable) = world.get::<Collidable>(guid) else {
            return false;
        };
        let local = Self::local_shape(world, guid, collidable);
        let Some(entry) = self.entries.iter_mut().find(|e| e.guid == guid) else {
            return false;
        };
        if entry.local != local {
            debug!("Collidable {} reshaped to {:?}", guid, local);
            entry.local = local;
            entry.frozen = None;
        }
        true
    }

    pub fn unregister(&mut self, guid: EntityGuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.guid != guid);
        before != self.entries.len()
    }

    pub fn is_registered(&self, guid: EntityGuid) -> bool {
        self.entries.iter().any(|e| e.guid == guid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Include or exclude one entity from queries. Returns `false` if it is not registered.
    pub fn set_enabled(&mut self, world: &mut World, guid: EntityGuid, enabled: bool) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.guid == guid) else {
            warn!("Cannot toggle unknown collidable {}", guid);
            return false;
        };
        entry.enabled = enabled;
        if let Some(collidable) = world.get_mut::<Collidable>(guid) {
            collidable.enabled = enabled;
        }
        true
    }

    pub fn is_enabled(&self, guid: EntityGuid) -> Option<bool> {
        self.entries.iter().find(|e| e.guid == guid).map(|e| e.enabled)
    }

    /// Toggle the debug wireframe of every collidable.
    pub fn set_debug_visualization(&mut self, enabled: bool) {
        if self.debug_visualization != enabled {
            info!("Collision debug visualization {}", if enabled { "on" } else { "off" });
        }
        self.debug_visualization = enabled;
    }

    pub fn debug_visualization(&self) -> bool {
        self.debug_visualization
    }

    /// Hits of `ray` against every enabled collidable, nearest first.
    pub fn query(&mut self, world: &World, ray: &Ray) -> Vec<CollisionHit> {
        let mut hits: Vec<(f32, CollisionHit)> = Vec::new();
        for entry in self.entries.iter_mut().filter(|e| e.enabled) {
            let shape = match entry.frozen {
                Some(frozen) => frozen,
                None => {
                    let (matrix, valid) = match world.get::<Transform>(entry.guid) {
                        Some(transform) => (
                            transform.last_world_matrix(),
                            transform.world_matrix().is_some(),
                        ),
                        None => (Mat4::IDENTITY, true),
                    };
                    let shape = entry.local.to_world(&matrix);
                    if entry.is_static && valid {
                        entry.frozen = Some(shape);
                    }
                    shape
                }
            };
            if let Some(t) = shape.intersect(ray) {
                let hit_position = ray.at(t);
                hits.push((
                    (hit_position - ray.origin).length_squared(),
                    CollisionHit {
                        guid: entry.guid,
                        name: entry.name.clone(),
                        hit_position,
                    },
                ));
            }
        }
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().map(|(_, hit)| hit).collect()
    }

    /// Collect the results of every message-driven query made by `requester`.
    pub fn take_results(&mut self, requester: &str) -> Vec<CollisionQueryResult> {
        self.results.remove(requester).unwrap_or_default()
    }

    fn run_pending_queries(&mut self, world: &World) {
        let queries = std::mem::take(&mut *self.queries.lock());
        for query in queries {
            let hits = self.query(world, &query.ray);
            if let Some(sink) = &self.result_sink {
                let message = Message::new(MessageType::CollisionResult)
                    .with(fields::REQUESTER, query.requester.as_str())
                    .with(fields::EVENT, query.event.as_str())
                    .with(fields::COUNT, hits.len() as i64);
                if let Err(e) = sink.send(message) {
                    warn!("Failed to announce collision result: {}", e);
                }
            }
            self.results
                .entry(query.requester)
                .or_default()
                .push(CollisionQueryResult {
                    event: query.event,
                    hits,
                });
        }
    }
}

impl Default for CollisionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for CollisionSystem {
    fn base(&self) -> &SystemBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SystemBase {
        &mut self.base
    }

    fn on_initialize(&mut self, _world: &mut World) -> anyhow::Result<()> {
        let queries = Arc::clone(&self.queries);
        self.base
            .register_handler(MessageType::CollisionQuery, move |message| {
                queries.lock().push(PendingQuery::from_message(message)?);
                Ok(())
            });
        Ok(())
    }

    fn update(&mut self, world: &mut World) -> anyhow::Result<()> {
        self.run_pending_queries(world);
        Ok(())
    }

    fn on_entity_added(&mut self, world: &mut World, entity: &EntityObject) -> anyhow::Result<()> {
        let guid = entity.guid();
        if !world.has(guid, ComponentType::Collidable) {
            return Ok(());
        }
        if self.is_registered(guid) {
            self.refresh_shape(world, guid);
        } else {
            self.register(world, entity);
        }
        Ok(())
    }

    fn on_entity_removed(&mut self, _world: &World, entity: &EntityObject) {
        self.unregister(entity.guid());
    }

    fn on_destroy(&mut self, _world: &mut World) {
        self.entries.clear();
        self.results.clear();
        self.queries.lock().clear();
    }
}
