use anyhow::Context;
use tracing::{debug, info, warn};

use crate::bus::{DrainReport, HandlerId, MessageBus, MessageSender};
use crate::entity::EntityObject;
use crate::error::{EcsError, MessageError};
use crate::identity::{Identifiable, SystemType, TypeTag};
use crate::message::{Message, MessageType};
use crate::world::World;

/// Lifecycle of a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemState {
    Uninitialized,
    Initialized,
    Destroyed,
}

/// State shared by every system: its identity, lifecycle and private message bus.
///
/// The bus refuses messages until the system is initialized and again once it
/// is destroyed.
pub struct SystemBase {
    system_type: SystemType,
    state: SystemState,
    bus: MessageBus,
}

impl SystemBase {
    pub fn new(system_type: SystemType) -> Self {
        let bus = MessageBus::new();
        bus.set_open(false);
        Self {
            system_type,
            state: SystemState::Uninitialized,
            bus,
        }
    }

    pub fn system_type(&self) -> SystemType {
        self.system_type
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state == SystemState::Initialized
    }

    fn transition(&mut self, to: SystemState) -> Result<(), EcsError> {
        let allowed = matches!(
            (self.state, to),
            (SystemState::Uninitialized, SystemState::Initialized)
                | (SystemState::Uninitialized, SystemState::Destroyed)
                | (SystemState::Initialized, SystemState::Destroyed)
        );
        if !allowed {
            return Err(EcsError::InvalidTransition {
                system: self.system_type,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    pub fn initialize(&mut self) -> Result<(), EcsError> {
        self.transition(SystemState::Initialized)?;
        self.bus.set_open(true);
        Ok(())
    }

    /// Close the bus, drop pending messages and every handler.
    pub fn destroy(&mut self) -> Result<(), EcsError> {
        self.transition(SystemState::Destroyed)?;
        self.bus.set_open(false);
        self.bus.clear_handlers();
        Ok(())
    }

    pub fn send(&self, message: Message) -> Result<(), MessageError> {
        self.bus.send(message)
    }

    /// Handle for other threads or systems to enqueue onto this system.
    pub fn sender(&self) -> MessageSender {
        self.bus.sender()
    }

    pub fn register_handler<F>(&self, message_type: MessageType, handler: F) -> HandlerId
    where
        F: Fn(&Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.register_handler(message_type, handler)
    }

    pub fn unregister_handlers(&self, message_type: MessageType) -> usize {
        self.bus.unregister_handlers(message_type)
    }

    pub fn clear_handlers(&self) {
        self.bus.clear_handlers();
    }

    pub fn pending(&self) -> usize {
        self.bus.pending()
    }

    pub fn drain(&self) -> DrainReport {
        self.bus.drain()
    }
}

impl Identifiable for SystemBase {
    fn type_tag(&self) -> TypeTag {
        TypeTag::System(self.system_type)
    }
}

/// A lifecycle participant driven once per frame.
///
/// Message handlers run during the drain that precedes [`System::update`] and
/// cannot reach the [`World`]; they record work that `update` then applies.
pub trait System: Send {
    fn base(&self) -> &SystemBase;
    fn base_mut(&mut self) -> &mut SystemBase;

    fn system_type(&self) -> SystemType {
        self.base().system_type()
    }

    /// Called once after the base has been initialized. Register handlers here.
    fn on_initialize(&mut self, _world: &mut World) -> anyhow::Result<()> {
        Ok(())
    }

    fn update(&mut self, world: &mut World) -> anyhow::Result<()>;

    /// An entity went live in the scene.
    fn on_entity_added(
        &mut self,
        _world: &mut World,
        _entity: &EntityObject,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// An entity is about to leave the scene. Its components are still in `world`.
    fn on_entity_removed(&mut self, _world: &World, _entity: &EntityObject) {}

    fn on_destroy(&mut self, _world: &mut World) {}
}

/// Initialize a system's base then run its hook.
pub fn initialize_system(system: &mut dyn System, world: &mut World) -> anyhow::Result<()> {
    system.base_mut().initialize()?;
    system
        .on_initialize(world)
        .with_context(|| format!("initializing {} system", system.system_type()))?;
    debug!("{} system initialized", system.system_type());
    Ok(())
}

/// Drain a system's queue then update it.
pub fn run_system(system: &mut dyn System, world: &mut World) -> anyhow::Result<()> {
    if !system.base().is_initialized() {
        return Err(EcsError::InvalidTransition {
            system: system.system_type(),
            from: system.base().state(),
            to: SystemState::Initialized,
        }
        .into());
    }
    system.base().drain();
    system
        .update(world)
        .with_context(|| format!("updating {} system", system.system_type()))
}

/// Run the destroy hook then tear down the base. Already-destroyed systems are skipped.
pub fn destroy_system(system: &mut dyn System, world: &mut World) {
    if system.base().state() == SystemState::Destroyed {
        return;
    }
    system.on_destroy(world);
    if let Err(e) = system.base_mut().destroy() {
        warn!("Failed to destroy {} system: {}", system.system_type(), e);
    }
}

/// Wraps a closure as a system with no message handling of its own.
pub struct FnSystem<F> {
    base: SystemBase,
    run: F,
}

impl<F> FnSystem<F>
where
    F: FnMut(&mut World) -> anyhow::Result<()> + Send,
{
    pub fn new(system_type: SystemType, run: F) -> Self {
        Self {
            base: SystemBase::new(system_type),
            run,
        }
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut World) -> anyhow::Result<()> + Send,
{
    fn base(&self) -> &SystemBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut SystemBase {
        &mut self.base
    }

    fn update(&mut self, world: &mut World) -> anyhow::Result<()> {
        (self.run)(world)
    }
}

/// An ordered list of systems to run each frame.
pub struct SystemSchedule {
    systems: Vec<Box<dyn System>>,
}

impl SystemSchedule {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
        }
    }

    /// Add a system to the end of the schedule.
    pub fn add_system<S: System + 'static>(&mut self, system: S) {
        info!("Scheduled {} system", system.system_type());
        self.systems.push(Box::new(system));
    }

    /// Initialize every system that has not been initialized yet.
    pub fn initialize_all(&mut self, world: &mut World) -> anyhow::Result<()> {
        for system in &mut self.systems {
            if system.base().state() == SystemState::Uninitialized {
                initialize_system(system.as_mut(), world)?;
            }
        }
        Ok(())
    }

    /// Drain and update all systems in order on the given world.
    pub fn run_all(&mut self, world: &mut World) -> anyhow::Result<()> {
        for system in &mut self.systems {
            run_system(system.as_mut(), world)?;
        }
        Ok(())
    }

    pub fn notify_added(&mut self, world: &mut World, entity: &EntityObject) -> anyhow::Result<()> {
        for system in &mut self.systems {
            system.on_entity_added(world, entity)?;
        }
        Ok(())
    }

    pub fn notify_removed(&mut self, world: &World, entity: &EntityObject) {
        for system in &mut self.systems {
            system.on_entity_removed(world, entity);
        }
    }

    /// Destroy in reverse registration order.
    pub fn destroy_all(&mut self, world: &mut World) {
        for system in self.systems.iter_mut().rev() {
            destroy_system(system.as_mut(), world);
        }
    }

    pub fn system(&self, system_type: SystemType) -> Option<&dyn System> {
        self.systems
            .iter()
            .find(|s| s.system_type() == system_type)
            .map(|s| s.as_ref())
    }

    /// Number of systems in the schedule.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

impl Default for SystemSchedule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn lifecycle_transitions() {
        let mut base = SystemBase::new(SystemType::Custom(1));
        assert_eq!(base.state(), SystemState::Uninitialized);
        assert_eq!(
            base.send(Message::new(MessageType::Custom(0))),
            Err(MessageError::BusClosed)
        );

        base.initialize().unwrap();
        assert!(base.send(Message::new(MessageType::Custom(0))).is_ok());
        assert_eq!(
            base.initialize(),
            Err(EcsError::InvalidTransition {
                system: SystemType::Custom(1),
                from: SystemState::Initialized,
                to: SystemState::Initialized,
            })
        );

        base.register_handler(MessageType::Custom(0), |_| Ok(()));
        base.destroy().unwrap();
        assert_eq!(base.pending(), 0);
        assert_eq!(base.unregister_handlers(MessageType::Custom(0)), 0);
        assert!(base.destroy().is_err());
        assert!(base.initialize().is_err());
    }

    #[test]
    fn type_tag_is_system_type() {
        let base = SystemBase::new(SystemType::Collision);
        assert_eq!(base.type_tag(), TypeTag::System(SystemType::Collision));
    }

    #[test]
    fn schedule_ordering() {
        let mut world = World::new();
        let log = Arc::new(Mutex::new(Vec::<u32>::new()));

        let mut schedule = SystemSchedule::new();
        for n in 1..=3u16 {
            let log = Arc::clone(&log);
            schedule.add_system(FnSystem::new(SystemType::Custom(n), move |_| {
                log.lock().push(n as u32);
                Ok(())
            }));
        }

        schedule.initialize_all(&mut world).unwrap();
        schedule.run_all(&mut world).unwrap();
        assert_eq!(*log.lock(), vec![1, 2, 3]);
        assert_eq!(schedule.len(), 3);
    }

    #[test]
    fn run_before_initialize_is_an_error() {
        let mut world = World::new();
        let mut schedule = SystemSchedule::new();
        schedule.add_system(FnSystem::new(SystemType::Custom(0), |_| Ok(())));
        assert!(schedule.run_all(&mut world).is_err());
    }

    #[test]
    fn run_drains_before_update() {
        let mut world = World::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut system = FnSystem::new(SystemType::Custom(5), {
            let seen = Arc::clone(&seen);
            move |_| {
                seen.lock().push("update");
                Ok(())
            }
        });
        initialize_system(&mut system, &mut world).unwrap();
        let sink = Arc::clone(&seen);
        system
            .base()
            .register_handler(MessageType::Custom(5), move |_| {
                sink.lock().push("handler");
                Ok(())
            });
        system.base().send(Message::new(MessageType::Custom(5))).unwrap();

        run_system(&mut system, &mut world).unwrap();
        assert_eq!(*seen.lock(), vec!["handler", "update"]);
    }

    #[test]
    fn destroy_all_runs_once() {
        let mut world = World::new();
        let mut schedule = SystemSchedule::new();
        schedule.add_system(FnSystem::new(SystemType::Custom(0), |_| Ok(())));
        schedule.initialize_all(&mut world).unwrap();
        schedule.destroy_all(&mut world);
        schedule.destroy_all(&mut world);
        let system = schedule.system(SystemType::Custom(0)).unwrap();
        assert_eq!(system.base().state(), SystemState::Destroyed);
    }
}
