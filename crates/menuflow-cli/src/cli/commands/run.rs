use std::path::Path;

use anyhow::Result;
use menuflow_core::config::Config;
use tracing::info;

use crate::scene::Scene;
use crate::stage::Stage;

pub async fn run(scene_path: &Path, config: &Config, realtime: bool) -> Result<()> {
    let scene = Scene::load(scene_path)?;
    info!(scene = %scene_path.display(), steps = scene.steps.len(), "running scene");

    let mut stage = Stage::build(&scene, config, realtime)?;
    stage.run_steps(&scene.steps).await
}
