use bubbletree::engine::{self, Normalization, PipelineOptions};
use bubbletree::metadata::{self, GroupOrder, DEFAULT_SAMPLE_COLUMN};
use bubbletree::render::{self, Display, RenderOptions};
use bubbletree::table::{self, DEFAULT_FEATURE_COLUMN};
use bubbletree::tree::Phylogeny;
use clap::{Parser, ValueEnum};
use log::{debug, error, info, warn};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bubbletree")]
#[command(
    about = "Plot sample abundances as a bubble chart or heatmap ordered by a phylogenetic tree.",
    long_about = None
)]
struct Args {
    // MANDATORY OPTIONS
    /// Load the abundance table (TSV, features x samples) from this FILE.
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: PathBuf,

    /// Load the tree in Newick format from this FILE. Its leaves name the features.
    #[arg(short = 't', long = "tree", value_name = "FILE")]
    tree: PathBuf,

    /// Load the sample mapping (TSV) from this FILE.
    #[arg(short = 'm', long = "map", value_name = "FILE")]
    map: PathBuf,

    /// Group samples by this column of the mapping file.
    #[arg(short = 'c', long = "category", value_name = "NAME")]
    category: String,

    // Output Options
    /// Write the figure to this FILE (PDF, SVG or PNG based on extension).
    /// Defaults to <category>_bubblePlot.pdf or <category>_heatPlot.pdf.
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    out: Option<PathBuf>,

    /// Also write the final normalized, reordered matrix as TSV to this FILE.
    #[arg(long = "write-matrix", value_name = "FILE")]
    write_matrix: Option<PathBuf>,

    // Display Options
    /// Draw cells as bubbles or as a heatmap.
    #[arg(short = 'd', long = "display", value_enum, default_value_t = DisplayArg::Bubblechart)]
    display: DisplayArg,

    /// Width and height in pixels of one matrix cell (4 to 256).
    #[arg(long = "cell-size", value_name = "N", default_value_t = 16)]
    cell_size: u32,

    /// Width in pixels of the tree drawing.
    #[arg(long = "tree-width", value_name = "N", default_value_t = 200)]
    tree_width: u32,

    /// Don't draw feature and sample labels.
    #[arg(long = "hide-labels")]
    hide_labels: bool,

    // Normalization Options
    /// Per-row normalization applied before plotting.
    #[arg(short = 'n', long = "norm", value_enum, default_value_t = NormArg::Row)]
    norm: NormArg,

    /// Multiply normalized values by this FLOAT before export with --write-matrix
    /// [default: 100 for bubblechart, 1 for heatmap]. Bubble and color scales
    /// follow the range of the matrix, so the figure itself does not change.
    #[arg(long = "scale", value_name = "FLOAT")]
    scale: Option<f64>,

    /// Drop rows that cannot be normalized (constant or all missing) instead of failing.
    #[arg(long = "skip-degenerate")]
    skip_degenerate: bool,

    /// Add this FLOAT to every present value before normalization.
    #[arg(long = "pseudocount", value_name = "FLOAT")]
    pseudocount: Option<f64>,

    // Input Columns
    /// Name of the feature identifier column in the abundance table.
    #[arg(short = 'a', long = "feature-column", value_name = "NAME", default_value = DEFAULT_FEATURE_COLUMN)]
    feature_column: String,

    /// Name of the sample identifier column in the mapping file.
    #[arg(short = 's', long = "sample-column", value_name = "NAME", default_value = DEFAULT_SAMPLE_COLUMN)]
    sample_column: String,

    /// Order groups by label or by first appearance in the mapping file.
    #[arg(long = "group-order", value_enum, default_value_t = GroupOrderArg::Sorted)]
    group_order: GroupOrderArg,

    // Threading
    /// Number of threads to use for parallel operations.
    #[arg(long = "threads", value_name = "N")]
    threads: Option<usize>,

    // Logging
    /// Verbosity level (0 = error, 1 = info, 2 = debug).
    #[arg(short = 'v', long = "verbose", value_name = "N", default_value_t = 1)]
    verbose: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DisplayArg {
    Bubblechart,
    Heatmap,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum NormArg {
    /// Scale each row to [0, 1] between its min and max.
    Row,
    /// log10 of each value.
    Log,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum GroupOrderArg {
    Sorted,
    FirstSeen,
}

impl Args {
    fn display(&self) -> Display {
        match self.display {
            DisplayArg::Bubblechart => Display::Bubblechart,
            DisplayArg::Heatmap => Display::Heatmap,
        }
    }

    fn pipeline_options(&self) -> PipelineOptions {
        let default_scale = match self.display() {
            Display::Bubblechart => 100.0,
            Display::Heatmap => 1.0,
        };
        PipelineOptions {
            normalization: match self.norm {
                NormArg::Row => Normalization::RowScale,
                NormArg::Log => Normalization::Log,
            },
            multiplier: self.scale.unwrap_or(default_scale),
            skip_degenerate: self.skip_degenerate,
            pseudocount: self.pseudocount,
        }
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            display: self.display(),
            cell_size: self.cell_size,
            tree_width: self.tree_width,
            show_labels: !self.hide_labels,
            ..RenderOptions::default()
        }
    }

    fn group_order(&self) -> GroupOrder {
        match self.group_order {
            GroupOrderArg::Sorted => GroupOrder::Sorted,
            GroupOrderArg::FirstSeen => GroupOrder::FirstSeen,
        }
    }

    fn out_path(&self) -> PathBuf {
        self.out.clone().unwrap_or_else(|| {
            let suffix = match self.display() {
                Display::Bubblechart => "bubblePlot",
                Display::Heatmap => "heatPlot",
            };
            PathBuf::from(format!("{}_{}.pdf", self.category, suffix))
        })
    }
}

fn plot(args: &Args) -> bubbletree::Result<()> {
    let matrix = table::read_abundance_table(&args.input, &args.feature_column)?;

    let tree = Phylogeny::from_file(&args.tree)?;
    let leaf_order = tree.leaf_order()?;

    let groups = metadata::read_sample_groups(
        &args.map,
        &args.sample_column,
        &args.category,
        args.group_order(),
    )?;

    let options = args.pipeline_options();
    debug!("Pipeline options: {:?}", options);
    let grouped = engine::run(&matrix, &leaf_order, &groups, &options)?;

    if let Some(ref path) = args.write_matrix {
        info!("Writing final matrix to {:?}...", path);
        grouped.matrix().write_tsv(path)?;
    }

    let scene = render::build_scene(&grouped, &tree.layout(), &args.render_options())?;
    debug!("Figure is {}x{} pixels", scene.width, scene.height);
    render::write_scene(&scene, &args.out_path())
}

fn main() {
    let args = Args::parse();

    // Initialize logger based on verbosity
    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    if let Some(threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            warn!("Could not size the thread pool to {}: {}", threads, e);
        }
    }

    info!("Starting {} plot...", args.category);

    if let Err(e) = plot(&args) {
        error!("{}", e);
        std::process::exit(1);
    }

    info!("Done.");
}
