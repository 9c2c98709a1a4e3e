//! Loader/update-loop simulation.
//!
//! Mimics an engine streaming terrain:
//!
//! ```text
//! loader 0..N ──insert/remove tiles──► TileGraph
//!             ──notify_*─────────────► Terrain queue
//! main thread ──fire_pending per frame► listeners
//!             ──get_height───────────► live graph / patch
//! ```
//!
//! Listeners registered by the simulation:
//! - `stats`: counts every added and removed tile
//! - `first-n`: stops listening after a fixed number of tiles
//! - `weak-probe`: held weakly, its target is dropped halfway through

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use tilewatch::config::TilewatchConfig;
use tilewatch::coord::TileKey;
use tilewatch::graph::{Tile, TileGraph, TileHandle};
use tilewatch::profile::{MapProfile, SpatialReference};
use tilewatch::terrain::{
    callback_fn, DispatchReport, SharedTerrainCallback, Terrain, TerrainCallback,
    TerrainCallbackContext, TerrainResolver, WeakTerrainCallback,
};
use tilewatch::TilewatchError;

use crate::error::CliError;

/// Level of detail loaders stream tiles at.
const LOADER_LOD: u32 = 6;

/// Posts per tile edge.
const TILE_POSTS: usize = 5;

/// Chance a loader unloads one of its tiles instead of loading a new one.
const UNLOAD_PROBABILITY: f64 = 0.2;

/// Points sampled from the live graph and the patch at the end.
const HEIGHT_PROBES: usize = 1000;

/// Arguments for `tilewatch simulate`.
#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Number of loader threads
    #[arg(long, default_value_t = 4)]
    pub loaders: usize,

    /// Tiles each loader loads before stopping
    #[arg(long, default_value_t = 250)]
    pub tiles: usize,

    /// Update frames to run while loaders are busy
    #[arg(long, default_value_t = 120)]
    pub frames: usize,

    /// Milliseconds between update frames
    #[arg(long, default_value_t = 5)]
    pub frame_ms: u64,

    /// Unregister the `first-n` listener after this many tiles
    #[arg(long, default_value_t = 50)]
    pub first_n: usize,

    /// Random seed for reproducible runs
    #[arg(long, default_value_t = 0x7131_e5ee)]
    pub seed: u64,

    /// INI configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl SimulateArgs {
    fn validate(&self) -> Result<(), CliError> {
        if self.loaders == 0 {
            return Err(CliError::Args("--loaders must be at least 1".to_string()));
        }
        if self.frames == 0 {
            return Err(CliError::Args("--frames must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Final counts from a simulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationSummary {
    pub tiles_loaded: usize,
    pub tiles_unloaded: usize,
    pub tiles_resident: usize,
    pub seen_added: usize,
    pub seen_removed: usize,
    pub first_n_seen: usize,
    pub weak_probe_seen: usize,
    pub listeners_left: usize,
    pub frames: usize,
    pub live_hits: usize,
    pub patch_hits: usize,
    pub faults: usize,
}

// ============================================================================
// Listeners
// ============================================================================

/// Counts every tile event it hears.
#[derive(Default)]
struct TileStats {
    added: AtomicUsize,
    removed: AtomicUsize,
}

impl TerrainCallback for TileStats {
    fn on_tile_added(
        &self,
        _key: &TileKey,
        _tile: &TileHandle,
        _context: &mut TerrainCallbackContext<'_>,
    ) {
        self.added.fetch_add(1, Ordering::Relaxed);
    }

    fn on_tiles_removed(&self, keys: &[TileKey], _context: &mut TerrainCallbackContext<'_>) {
        self.removed.fetch_add(keys.len(), Ordering::Relaxed);
    }

    fn name(&self) -> &str {
        "stats"
    }
}

/// Counts tile additions only.
#[derive(Default)]
struct Probe {
    seen: AtomicUsize,
}

impl TerrainCallback for Probe {
    fn on_tile_added(
        &self,
        _key: &TileKey,
        _tile: &TileHandle,
        _context: &mut TerrainCallbackContext<'_>,
    ) {
        self.seen.fetch_add(1, Ordering::Relaxed);
    }

    fn name(&self) -> &str {
        "weak-probe"
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// Run the `simulate` command and print a summary.
pub fn run(args: SimulateArgs, config: &TilewatchConfig, quiet: bool) -> Result<(), CliError> {
    args.validate()?;
    let summary = simulate(&args, config, quiet)?;
    print_summary(&args, &summary);
    Ok(())
}

/// Run the simulation without printing anything.
pub fn simulate(
    args: &SimulateArgs,
    config: &TilewatchConfig,
    quiet: bool,
) -> Result<SimulationSummary, CliError> {
    let profile = Arc::new(MapProfile::global_geodetic());
    let graph = Arc::new(TileGraph::new(Arc::clone(&profile)));
    let terrain = Arc::new(Terrain::with_options(
        Arc::clone(&profile),
        &graph,
        config.terrain_options(),
    ));

    // Base layer so height queries always find something.
    for x in 0..2 {
        let key = profile
            .tile_key(0, x, 0)
            .map_err(TilewatchError::from)?;
        graph.insert(Tile::flat(key, 2, 2, 0.0).map_err(TilewatchError::from)?);
    }

    let stats = Arc::new(TileStats::default());
    terrain.add_terrain_callback(Arc::clone(&stats) as SharedTerrainCallback);

    let first_n_seen = Arc::new(AtomicUsize::new(0));
    let first_n_limit = args.first_n;
    let counter = Arc::clone(&first_n_seen);
    terrain.add_terrain_callback(callback_fn("first-n", move |_, _, context| {
        if counter.fetch_add(1, Ordering::Relaxed) + 1 >= first_n_limit {
            context.remove();
        }
    }));

    let mut probe = Some(Arc::new(Probe::default()));
    if let Some(target) = &probe {
        terrain.add_terrain_callback(WeakTerrainCallback::wrap(target));
    }
    let mut weak_probe_seen = 0;

    info!(
        loaders = args.loaders,
        tiles = args.tiles,
        frames = args.frames,
        policy = %config.duplicate_policy,
        "Starting simulation"
    );

    let loaded = Arc::new(AtomicUsize::new(0));
    let unloaded = Arc::new(AtomicUsize::new(0));
    let loaders: Vec<_> = (0..args.loaders)
        .map(|index| {
            let ctx = LoaderContext {
                index,
                tiles: args.tiles,
                seed: args.seed.wrapping_add(index as u64),
                graph: Arc::clone(&graph),
                terrain: Arc::clone(&terrain),
                loaded: Arc::clone(&loaded),
                unloaded: Arc::clone(&unloaded),
            };
            thread::Builder::new()
                .name(format!("loader-{}", index))
                .spawn(move || run_loader(ctx))
                .map_err(|e| CliError::Simulate(format!("failed to spawn loader: {}", e)))
        })
        .collect::<Result<_, _>>()?;

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(args.frames as u64)
    };
    progress.set_style(
        ProgressStyle::with_template("{spinner} frame {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let frame = Duration::from_millis(args.frame_ms);
    let mut totals = DispatchReport::default();
    for n in 0..args.frames {
        let started = Instant::now();
        accumulate(&mut totals, terrain.fire_pending());

        if n == args.frames / 2 {
            if let Some(target) = probe.take() {
                weak_probe_seen = target.seen.load(Ordering::Relaxed);
                debug!(seen = weak_probe_seen, "Dropping weak probe target");
            }
        }

        progress.set_message(format!("{} tiles", loaded.load(Ordering::Relaxed)));
        progress.inc(1);
        if let Some(rest) = frame.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
    progress.finish_and_clear();

    for handle in loaders {
        if handle.join().is_err() {
            warn!("Loader thread panicked");
        }
    }
    accumulate(&mut totals, terrain.fire_pending());
    if let Some(target) = probe.take() {
        weak_probe_seen = target.seen.load(Ordering::Relaxed);
    }

    let (live_hits, patch_hits) = probe_heights(&terrain, args.seed);

    Ok(SimulationSummary {
        tiles_loaded: loaded.load(Ordering::Relaxed),
        tiles_unloaded: unloaded.load(Ordering::Relaxed),
        tiles_resident: graph.len(),
        seen_added: stats.added.load(Ordering::Relaxed),
        seen_removed: stats.removed.load(Ordering::Relaxed),
        first_n_seen: first_n_seen.load(Ordering::Relaxed),
        weak_probe_seen,
        listeners_left: terrain.callback_count(),
        frames: args.frames,
        live_hits,
        patch_hits,
        faults: totals.faults,
    })
}

fn accumulate(totals: &mut DispatchReport, pass: DispatchReport) {
    totals.events += pass.events;
    totals.invocations += pass.invocations;
    totals.removed += pass.removed;
    totals.stale += pass.stale;
    totals.faults += pass.faults;
}

struct LoaderContext {
    index: usize,
    tiles: usize,
    seed: u64,
    graph: Arc<TileGraph>,
    terrain: Arc<Terrain>,
    loaded: Arc<AtomicUsize>,
    unloaded: Arc<AtomicUsize>,
}

/// Load `tiles` random tiles, occasionally unloading an earlier one.
fn run_loader(ctx: LoaderContext) {
    let mut rng = StdRng::seed_from_u64(ctx.seed);
    let profile = Arc::clone(ctx.graph.profile());
    let (cols, rows) = profile.tile_count(LOADER_LOD);
    let mut mine: Vec<TileKey> = Vec::new();

    let mut count = 0;
    while count < ctx.tiles {
        if !mine.is_empty() && rng.random_bool(UNLOAD_PROBABILITY) {
            let key = mine.swap_remove(rng.random_range(0..mine.len()));
            if ctx.graph.remove(&key).is_some() {
                ctx.unloaded.fetch_add(1, Ordering::Relaxed);
                ctx.terrain.notify_tiles_removed(vec![key]);
            }
            continue;
        }

        let key = match profile.tile_key(
            LOADER_LOD,
            rng.random_range(0..cols),
            rng.random_range(0..rows),
        ) {
            Ok(key) => key,
            Err(e) => {
                warn!(loader = ctx.index, error = %e, "Generated invalid tile key");
                continue;
            }
        };
        let heights = (0..TILE_POSTS * TILE_POSTS)
            .map(|_| rng.random_range(-50.0..4000.0))
            .collect();
        let tile = match Tile::new(key, TILE_POSTS, TILE_POSTS, heights) {
            Ok(tile) => tile,
            Err(e) => {
                warn!(loader = ctx.index, error = %e, "Failed to build tile");
                continue;
            }
        };

        let handle = ctx.graph.insert(tile);
        ctx.terrain.notify_tile_added(key, handle);
        mine.push(key);
        ctx.loaded.fetch_add(1, Ordering::Relaxed);
        count += 1;

        if count % 32 == 0 {
            thread::yield_now();
        }
    }
    debug!(loader = ctx.index, tiles = count, "Loader finished");
}

/// Sample random points from the live graph and from a patch taken now.
fn probe_heights(terrain: &Terrain, seed: u64) -> (usize, usize) {
    let Some(patch) = terrain.create_patch() else {
        warn!("Graph does not support patches");
        return (0, 0);
    };
    let mut rng = StdRng::seed_from_u64(seed ^ 0xa5a5);
    let mut live_hits = 0;
    let mut patch_hits = 0;
    for _ in 0..HEIGHT_PROBES {
        let lon = rng.random_range(-180.0..180.0);
        let lat = rng.random_range(-90.0..90.0);
        if terrain
            .get_height(SpatialReference::Geographic, lon, lat)
            .is_some()
        {
            live_hits += 1;
        }
        if terrain
            .get_height_in(&patch, SpatialReference::Geographic, lon, lat)
            .is_some()
        {
            patch_hits += 1;
        }
    }
    (live_hits, patch_hits)
}

fn print_summary(args: &SimulateArgs, summary: &SimulationSummary) {
    println!("Simulation complete");
    println!("  Loaders:          {}", args.loaders);
    println!("  Frames:           {}", summary.frames);
    println!();
    println!("Tiles");
    println!("  Loaded:           {}", summary.tiles_loaded);
    println!("  Unloaded:         {}", summary.tiles_unloaded);
    println!("  Resident:         {}", summary.tiles_resident);
    println!();
    println!("Listeners");
    println!(
        "  stats:            {} added, {} removed",
        summary.seen_added, summary.seen_removed
    );
    println!("  first-n:          {} tiles", summary.first_n_seen);
    println!("  weak-probe:       {} tiles", summary.weak_probe_seen);
    println!("  Still registered: {}", summary.listeners_left);
    println!("  Faults:           {}", summary.faults);
    println!();
    println!("Heights ({} probes)", HEIGHT_PROBES);
    println!("  Live graph hits:  {}", summary.live_hits);
    println!("  Patch hits:       {}", summary.patch_hits);
}
