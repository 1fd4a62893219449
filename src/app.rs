use std::sync::Arc;

use anyhow::{Context, Result};

use crate::assets;
use crate::config;
use crate::embed;
use crate::ui;

pub fn run() -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;

    let asset_cfg = assets::Config {
        roots: cfg.assets.roots.clone(),
        workers: cfg.assets.workers,
    };
    let resolver = assets::Resolver::new(asset_cfg).ok();
    let handle = resolver.as_ref().map(|resolver| resolver.handle());

    let activator = embed::Activator::new(Arc::new(embed::SimulatedRuntime::new()));

    let options = ui::Options {
        tick_rate: cfg.ui.tick_rate,
        speed: cfg.playback.speed,
        theme: ui::Theme::named(&cfg.ui.theme),
        intro_timing: cfg.intro.timing(),
        assets: handle,
        activator,
    };

    let mut model = ui::Model::new(options);
    model.run()?;

    drop(resolver);

    Ok(())
}
