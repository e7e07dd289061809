//! Lumen - scene core demo host
//!
//! Builds a small scene, runs a few frames and prints what a ray from the
//! origin hits, as JSON.

mod settings;

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use lumen_core::{Color, Ray};
use lumen_ecs::components::{
    Collidable, Light, LightKind, Material, MaterialValue, Renderable, Transform,
};
use lumen_ecs::message::fields;
use lumen_ecs::{EntityBuilder, Message, MessageBus, MessageType, System};
use lumen_scene::{IndirectLight, MaterialDefinition, Scene, Skybox};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use settings::Settings;

const REQUESTER: &str = "lumen-demo";

fn build_scene(scene: &mut Scene) -> Result<()> {
    scene.materials_mut().register_definition(
        MaterialDefinition::new("lit")
            .with_default("baseColor", MaterialValue::Color(Color::WHITE))
            .with_default("roughness", MaterialValue::Scalar(0.5)),
    );

    let origin = scene.spawn(
        EntityBuilder::new()
            .with_name("origin")
            .with_component(Transform::new()),
        None,
    )?;

    scene.spawn(
        EntityBuilder::new()
            .with_name("sun")
            .with_component(Transform::from_trs(
                Vec3::new(0.0, 10.0, 0.0),
                Quat::from_rotation_x(-std::f32::consts::FRAC_PI_4),
                Vec3::ONE,
            )?)
            .with_component(Light::new(LightKind::Sun).with_color(Color::from_hex(0xfff4e0))),
        Some(origin.guid()),
    )?;

    scene.spawn(
        EntityBuilder::new()
            .with_name("near cube")
            .with_component(Transform::from_position(Vec3::new(0.0, 0.0, -2.0))?)
            .with_component(Renderable::default())
            .with_component(Collidable::matching_renderable())
            .with_component(Material::new("lit").with_parameter(
                "baseColor",
                MaterialValue::Color(Color::from_hex(0x3366cc)),
            )),
        Some(origin.guid()),
    )?;

    let pillar = scene.spawn(
        EntityBuilder::new()
            .with_name("pillar")
            .with_component(Transform::from_trs(
                Vec3::new(0.0, 0.0, -6.0),
                Quat::IDENTITY,
                Vec3::new(1.0, 4.0, 1.0),
            )?)
            .with_component(Renderable::default())
            .with_component(Collidable::unit_box().as_static(true)),
        Some(origin.guid()),
    )?;

    scene.spawn(
        EntityBuilder::new()
            .with_name("far sphere")
            .with_component(Transform::from_position(Vec3::new(0.0, 0.0, 4.0))?)
            .with_component(Collidable::sphere(0.75)),
        Some(pillar.guid()),
    )?;

    Ok(())
}

fn main() -> Result<()> {
    let (settings, notes) = Settings::load();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.level())
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    for note in notes {
        info!("{}", note);
    }
    info!("Starting Lumen scene demo...");

    let mut scene = Scene::new(settings.scene.clone()).context("Failed to create scene")?;
    scene.load_skybox(&Skybox::Color(Color::from_hex(0x87ceeb)));
    scene.load_indirect_light(&IndirectLight::Default);
    build_scene(&mut scene).context("Failed to build demo scene")?;

    // Collision results announced by the scene land here
    let outbox = MessageBus::new();
    outbox.register_handler(MessageType::CollisionResult, |message| {
        info!(
            "Collision query '{}' for {} hit {} entities",
            message.text(fields::EVENT)?,
            message.text(fields::REQUESTER)?,
            message.int(fields::COUNT)?
        );
        Ok(())
    });
    scene.collisions_mut().set_result_sink(outbox.sender());

    let ray = Ray::new(Vec3::ZERO, Vec3::NEG_Z).context("Demo ray has no direction")?;
    scene
        .collisions()
        .base()
        .send(
            Message::new(MessageType::CollisionQuery)
                .with(fields::RAY, ray)
                .with(fields::REQUESTER, REQUESTER)
                .with(fields::EVENT, "startup"),
        )
        .context("Failed to queue collision query")?;

    for _ in 0..settings.frames.max(1) {
        scene
            .update()
            .with_context(|| format!("Frame {} failed", scene.frame()))?;
        outbox.drain();
    }

    let dirty = scene.materials_mut().take_dirty();
    info!("{} materials need rebuilding", dirty.len());
    if scene.skybox().is_none() {
        warn!("Skybox still loading after {} frames", scene.frame());
    }

    for result in scene.collisions_mut().take_results(REQUESTER) {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    let hits = scene.raycast(&ray);
    println!("{}", serde_json::to_string_pretty(&hits)?);

    scene.shutdown();

    // Leave a file behind to edit
    if let Err(e) = settings.save() {
        warn!("Failed to save settings: {}", e);
    }
    Ok(())
}
