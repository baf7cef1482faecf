// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod menu;

use std::path::PathBuf;

use anito_core::config::DEFAULT_CONFIG_PATH;
use anito_core::{init_tracing, load_config_or_default, AppCfg, VsyncMode};
use anito_platform::PlatformWindow;
use anito_render::{Selection, WindowSource};
use anito_render_vk::{
    required_window_extensions, vk, ContextDesc, FrameLoop, FrameLoopDesc, GraphicsContext,
    LoopExit, PresentationSurface, VkVsyncMode,
};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use crate::menu::{MenuOverlay, RENDERERS};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; missing means defaults
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// OBJ model loaded once a renderer is chosen
    #[arg(long)]
    model: Option<PathBuf>,
    /// Never request the validation layer
    #[arg(long)]
    no_validation: bool,
}

impl Args {
    fn apply(&self, cfg: &mut AppCfg) {
        if let Some(w) = self.width {
            cfg.window.width = w;
        }
        if let Some(h) = self.height {
            cfg.window.height = h;
        }
        if let Some(model) = &self.model {
            cfg.mesh.model = Some(model.clone());
        }
        if self.no_validation {
            cfg.render.validation = false;
        }
    }
}

fn vk_vsync(mode: VsyncMode) -> VkVsyncMode {
    match mode {
        VsyncMode::Fifo => VkVsyncMode::Fifo,
        VsyncMode::Mailbox => VkVsyncMode::Mailbox,
        VsyncMode::Immediate => VkVsyncMode::Immediate,
    }
}

/// Brings up Vulkan on `window` and runs the menu until something is
/// chosen or the window closes. Everything Vulkan is torn down on return.
fn run_menu(cfg: &AppCfg, window: &mut PlatformWindow) -> Result<LoopExit> {
    let extensions = required_window_extensions(&*window).context("querying surface extensions")?;
    let [major, minor] = cfg.render.min_api_version;
    let context = GraphicsContext::create(&ContextDesc {
        app_name: &cfg.window.title,
        required_extensions: &extensions,
        min_api_version: vk::make_api_version(0, major, minor, 0),
        validation: cfg.render.validation,
    })
    .context("creating Vulkan context")?;
    let surface = PresentationSurface::bind(&context, &*window).context("binding window surface")?;

    let size = window.current_extent();
    let mut frame_loop = FrameLoop::new(
        &context,
        &surface,
        FrameLoopDesc {
            extent: vk::Extent2D {
                width: size.width,
                height: size.height,
            },
            image_count: cfg.render.image_count,
            vsync: vk_vsync(cfg.render.vsync_mode),
            clear_color: cfg.render.clear_color,
        },
    )
    .context("building swapchain")?;

    let mut menu = MenuOverlay::new(&RENDERERS, window.keys());
    info!("select a renderer: {}", menu.describe());
    window.set_title(&format!("{} | {}", cfg.window.title, menu.describe()));

    let exit = frame_loop.run(window, &mut menu)?;
    Ok(exit)
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut cfg = load_config_or_default(&args.config);
    args.apply(&mut cfg);

    let mut window = PlatformWindow::open(&cfg.window.title, cfg.window.width, cfg.window.height)
        .context("opening window")?;

    match run_menu(&cfg, &mut window)? {
        LoopExit::Closed => info!("closed without a selection"),
        LoopExit::Selected(Selection::Renderer(k)) => {
            let name = RENDERERS.get(k.get() as usize - 1).copied().unwrap_or("?");
            info!("renderer {} selected ({name})", k.get());
            match &cfg.mesh.model {
                Some(path) => {
                    let mesh = anito_mesh::load_mesh(path)
                        .with_context(|| format!("loading {}", path.display()))?;
                    info!(
                        "loaded {}: {} vertices, {} triangles",
                        path.display(),
                        mesh.vertices.len(),
                        mesh.triangle_count()
                    );
                }
                None => warn!("no model configured, nothing to load"),
            }
        }
        LoopExit::Selected(selection) => info!("menu dismissed (selection {})", selection.as_raw()),
    }
    Ok(())
}
