//! Posture CLI - inspect and administer a scenario
//!
//! Loads a JSON scenario (objects, affordances, actors and the interactions
//! they run), admits everything through the normal add path, then runs one
//! introspection or administrative subcommand against the result.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use posture::runtime::actor::Age;
use posture::runtime::control::Control;
use posture::runtime::geometry::Area;
use posture::runtime::ids::{AffordanceId, ObjectId, TaskId};
use posture::runtime::interaction::{Affordance, NewInteraction, Priority};
use posture::runtime::objects::WorldObject;
use posture::runtime::posture::{PostureNode, PostureType};
use posture::runtime::storage::Storage;
use posture::{Runtime, RuntimeConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "posture")]
#[command(about = "Inspect interaction admission and posture state", long_about = None)]
struct Cli {
    /// Root directory for snapshots and configuration
    #[arg(short, long, default_value = ".posture")]
    root: PathBuf,

    /// Scenario file (JSON)
    #[arg(short, long)]
    scenario: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List an actor's interactions, highest precedence first
    Active {
        /// Actor name
        actor: String,
    },

    /// Show an actor's posture aspects
    Aspects {
        /// Actor name
        actor: String,
    },

    /// Evict an interaction without running its hooks
    Displace {
        /// Actor name
        actor: String,
        /// Affordance of the interaction
        affordance: String,
    },

    /// Remove an interaction through its exit sequence
    Remove {
        /// Actor name
        actor: String,
        /// Affordance of the interaction
        affordance: String,
    },

    /// Write an actor snapshot under the root directory
    Save {
        /// Actor name
        actor: String,
    },
}

#[derive(Deserialize)]
struct Scenario {
    #[serde(default)]
    objects: Vec<ScenarioObject>,
    #[serde(default)]
    affordances: Vec<ScenarioAffordance>,
    actors: Vec<ScenarioActor>,
}

#[derive(Deserialize)]
struct ScenarioObject {
    name: String,
    #[serde(default)]
    carryable: bool,
    #[serde(default)]
    part_of: Option<String>,
}

#[derive(Deserialize)]
struct ScenarioAffordance {
    #[serde(flatten)]
    affordance: Affordance,
    #[serde(default)]
    constraint: Option<Area>,
}

#[derive(Deserialize)]
struct ScenarioActor {
    name: String,
    #[serde(default = "default_age")]
    age: Age,
    #[serde(default)]
    posture: Option<String>,
    #[serde(default)]
    interactions: Vec<ScenarioInteraction>,
}

#[derive(Deserialize)]
struct ScenarioInteraction {
    affordance: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    priority: Option<i32>,
    #[serde(default)]
    guaranteed: bool,
}

fn default_age() -> Age {
    Age::Adult
}

struct World {
    runtime: Runtime<Area>,
    names: HashMap<String, ObjectId>,
}

impl World {
    fn actor(&self, name: &str) -> Result<ObjectId> {
        self.names
            .get(name)
            .copied()
            .filter(|id| self.runtime.actor(*id).is_some())
            .ok_or_else(|| anyhow!("unknown actor '{name}'"))
    }

    fn find_task(&mut self, actor: ObjectId, affordance: &str) -> Result<TaskId> {
        let control = Control::new(&mut self.runtime);
        control
            .list_active(actor)?
            .into_iter()
            .find(|row| row.affordance == affordance)
            .map(|row| row.task)
            .ok_or_else(|| anyhow!("no active '{affordance}' interaction"))
    }
}

fn build(scenario: Scenario, config: RuntimeConfig) -> Result<World> {
    let mut runtime = Runtime::new(config);
    let mut names = HashMap::new();

    for object in scenario.objects {
        let mut world_object = WorldObject::new(ObjectId::new());
        if object.carryable {
            world_object = world_object.carryable();
        }
        if let Some(owner) = &object.part_of {
            let owner = names
                .get(owner)
                .copied()
                .ok_or_else(|| anyhow!("'{}' is part of unknown object '{owner}'", object.name))?;
            world_object = world_object.part_of(owner);
        }
        names.insert(object.name, runtime.add_object(world_object));
    }

    let mut constraints: HashMap<AffordanceId, Area> = HashMap::new();
    for entry in scenario.affordances {
        if let Some(constraint) = entry.constraint {
            constraints.insert(entry.affordance.id.clone(), constraint);
        }
        runtime.register_affordance(entry.affordance);
    }

    for actor in &scenario.actors {
        let posture = actor
            .posture
            .as_deref()
            .map_or_else(PostureType::stand, PostureType::new);
        let id = runtime.spawn_actor(actor.age, PostureNode::origin(posture));
        names.insert(actor.name.clone(), id);
    }

    for actor in scenario.actors {
        let actor_id = names[&actor.name];
        for entry in actor.interactions {
            let affordance_id = AffordanceId::new(entry.affordance);
            let affordance = runtime
                .affordance(&affordance_id)
                .ok_or_else(|| anyhow!("unknown affordance '{affordance_id}'"))?;
            let mut request = NewInteraction::new(actor_id, affordance)
                .priority(entry.priority.map(Priority));
            if let Some(target) = &entry.target {
                let target = names
                    .get(target)
                    .copied()
                    .ok_or_else(|| anyhow!("unknown target '{target}'"))?;
                request = request.target(target);
            }
            if entry.guaranteed {
                request = request.guaranteed();
            }
            if let Some(constraint) = constraints.get(&affordance_id) {
                request = request.constraint(constraint.clone());
            }

            let task = runtime.create_interaction(request)?;
            if let Err(err) = runtime.add(task) {
                tracing::warn!(actor = %actor.name, affordance = %affordance_id, error = %err, "not admitted");
            }
        }
    }

    Ok(World { runtime, names })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(cli.root.clone());
    let config = if storage.config_path().exists() {
        storage.load_config()?
    } else {
        RuntimeConfig::default()
    };
    config.validate()?;

    let data = std::fs::read(&cli.scenario)
        .with_context(|| format!("Failed to read scenario: {:?}", cli.scenario))?;
    let scenario: Scenario =
        serde_json::from_slice(&data).context("Failed to parse scenario")?;
    let mut world = build(scenario, config)?;

    match cli.command {
        Commands::Active { actor } => {
            let id = world.actor(&actor)?;
            let rows = Control::new(&mut world.runtime).list_active(id)?;
            if rows.is_empty() {
                println!("{actor} is idle");
            }
            for row in rows {
                let priority = row.priority.map_or("-".to_string(), |p| p.to_string());
                let mut flags = Vec::new();
                if row.guaranteed {
                    flags.push("guaranteed");
                }
                if row.posture_source {
                    flags.push("posture");
                }
                if row.removing {
                    flags.push("removing");
                }
                println!(
                    "{}  {:<20} {:?}/{:?} prio={} {}",
                    row.task,
                    row.affordance,
                    row.role,
                    row.phase,
                    priority,
                    flags.join(",")
                );
            }
        }

        Commands::Aspects { actor } => {
            let id = world.actor(&actor)?;
            let aspects = Control::new(&mut world.runtime).posture_aspects(id)?;
            println!("body:    {}", aspects.body);
            println!("carry:   {}", aspects.carry);
            println!("surface: {}", aspects.surface);
            if let Some(source) = aspects.posture_source {
                println!("source:  {source}");
            }
        }

        Commands::Displace { actor, affordance } => {
            let id = world.actor(&actor)?;
            let task = world.find_task(id, &affordance)?;
            Control::new(&mut world.runtime).force_displace(task)?;
            println!("Displaced {task} ({affordance})");
        }

        Commands::Remove { actor, affordance } => {
            let id = world.actor(&actor)?;
            let task = world.find_task(id, &affordance)?;
            let outcome = world.runtime.remove(task).await;
            println!("{task} ({affordance}): {outcome:?}");
        }

        Commands::Save { actor } => {
            let id = world.actor(&actor)?;
            let snapshot = world.runtime.save_actor(id)?;
            if snapshot.interactions.is_empty() {
                bail!("{actor} has nothing to save");
            }
            let path = storage.write_snapshot(&snapshot)?;
            println!("Saved {} interactions to {}", snapshot.interactions.len(), path.display());
        }
    }

    Ok(())
}
