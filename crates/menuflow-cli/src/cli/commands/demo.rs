use anyhow::{Context, Result};
use menuflow_core::config::Config;

use crate::scene::Scene;
use crate::stage::Stage;

const DEMO_SCENE: &str = include_str!("../../../scenes/demo.toml");

pub async fn run(mut config: Config, sequential: bool, realtime: bool) -> Result<()> {
    if sequential {
        config.navigation.sequential_transitions = true;
    }
    let scene = Scene::parse(DEMO_SCENE).context("parse built-in demo scene")?;

    let mut stage = Stage::build(&scene, &config, realtime)?;
    stage.run_steps(&scene.steps).await
}
