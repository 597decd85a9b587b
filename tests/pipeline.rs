use approx::assert_relative_eq;
use bubbletree::prelude::*;
use bubbletree::metadata::DEFAULT_SAMPLE_COLUMN;
use bubbletree::render::Scene;
use bubbletree::table::DEFAULT_FEATURE_COLUMN;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TABLE: &str = "# Constructed from biom file\n\
                     #OTU ID\ts1\ts2\ts3\ts4\ttaxonomy\n\
                     otu1\t1\t2\t3\t0\tk__Bacteria; p__Firmicutes\n\
                     otu2\t10\t20\t30\t40\tk__Bacteria; p__Bacteroidetes\n\
                     otu4\t0\t4\t8\tNA\tk__Bacteria\n";

const TREE: &str = "((otu2:1,otu1:1):0.5,(otu4:1,otu5:2):1);\n";

const MAPPING: &str = "#SampleID\tBarcode\tsite\n\
                       s1\tAAA\tskin\n\
                       s2\tCCC\tgut\n\
                       s3\tGGG\tskin\n\
                       s4\tTTT\tgut\n\
                       s5\tACG\tgut\n\
                       s6\tCGT\t\n";

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new(table: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        fs::write(root.join("otu_table.txt"), table).unwrap();
        fs::write(root.join("tree.nwk"), TREE).unwrap();
        fs::write(root.join("mapping.txt"), MAPPING).unwrap();
        Self { _dir: dir, root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn load(&self, order: GroupOrder) -> (AbundanceMatrix, Phylogeny, SampleGroups) {
        let matrix =
            read_abundance_table(self.path("otu_table.txt"), DEFAULT_FEATURE_COLUMN).unwrap();
        let tree = Phylogeny::from_file(self.path("tree.nwk")).unwrap();
        let groups = read_sample_groups(
            self.path("mapping.txt"),
            DEFAULT_SAMPLE_COLUMN,
            "site",
            order,
        )
        .unwrap();
        (matrix, tree, groups)
    }
}

fn scaled(multiplier: f64) -> PipelineOptions {
    PipelineOptions {
        multiplier,
        ..PipelineOptions::default()
    }
}

fn assert_row(actual: &[Option<f64>], expected: &[Option<f64>]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        match (a, e) {
            (Some(a), Some(e)) => assert_relative_eq!(*a, *e, epsilon = 1e-9),
            _ => assert_eq!(a, e),
        }
    }
}

#[test]
fn test_rows_follow_tree_and_columns_follow_groups() {
    let fixture = Fixture::new(TABLE);
    let (matrix, tree, groups) = fixture.load(GroupOrder::Sorted);
    assert_eq!(matrix.sample_ids(), &["s1", "s2", "s3", "s4"]);

    let grouped = run(&matrix, &tree.leaf_order().unwrap(), &groups, &scaled(100.0)).unwrap();
    let out = grouped.matrix();

    assert_eq!(out.feature_ids(), &["otu2", "otu1", "otu4", "otu5"]);
    assert_eq!(out.sample_ids(), &["s2", "s4", "s1", "s3"]);

    let third = 100.0 / 3.0;
    assert_row(out.row(0), &[Some(third), Some(100.0), Some(0.0), Some(2.0 * third)]);
    assert_row(out.row(1), &[Some(2.0 * third), Some(0.0), Some(third), Some(100.0)]);
    // NA becomes 0 after row scaling
    assert_row(out.row(2), &[Some(50.0), Some(0.0), Some(0.0), Some(100.0)]);
    // leaf without a table row stays blank
    assert_row(out.row(3), &[None; 4]);

    // s5 is not in the table and s6 has no site
    let labels: Vec<&str> = grouped.groups().iter().map(|g| g.label.as_str()).collect();
    assert_eq!(labels, ["gut", "skin"]);
    assert_eq!(grouped.groups().groups()[0].members, ["s2", "s4"]);
    assert_eq!(grouped.column_groups(), [0, 0, 1, 1]);
}

#[test]
fn test_first_seen_group_order() {
    let fixture = Fixture::new(TABLE);
    let (matrix, tree, groups) = fixture.load(GroupOrder::FirstSeen);
    let grouped = run(&matrix, &tree.leaf_order().unwrap(), &groups, &scaled(1.0)).unwrap();
    assert_eq!(grouped.matrix().sample_ids(), &["s1", "s3", "s2", "s4"]);
}

#[test]
fn test_runs_are_identical() {
    let fixture = Fixture::new(TABLE);
    let (matrix, tree, groups) = fixture.load(GroupOrder::Sorted);
    let leaves = tree.leaf_order().unwrap();
    let first = run(&matrix, &leaves, &groups, &scaled(100.0)).unwrap();
    let second = run(&matrix, &leaves, &groups, &scaled(100.0)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_constant_row_needs_opt_in() {
    let table = format!("{}otu3\t5\t5\t5\t5\tk__Bacteria\n", TABLE);
    let fixture = Fixture::new(&table);
    let (matrix, tree, groups) = fixture.load(GroupOrder::Sorted);
    let leaves = tree.leaf_order().unwrap();

    let err = run(&matrix, &leaves, &groups, &scaled(100.0)).unwrap_err();
    assert!(matches!(err, BubbleError::InvalidRow { ref feature, .. } if feature == "otu3"));

    let options = PipelineOptions {
        skip_degenerate: true,
        ..scaled(100.0)
    };
    let grouped = run(&matrix, &leaves, &groups, &options).unwrap();
    assert_eq!(grouped.matrix().n_features(), 4);
}

#[test]
fn test_log_with_pseudocount() {
    let fixture = Fixture::new(TABLE);
    let (matrix, tree, groups) = fixture.load(GroupOrder::Sorted);
    let leaves = tree.leaf_order().unwrap();

    let plain = PipelineOptions {
        normalization: Normalization::Log,
        ..PipelineOptions::default()
    };
    assert!(matches!(
        run(&matrix, &leaves, &groups, &plain),
        Err(BubbleError::InvalidRow { .. })
    ));

    let shifted = PipelineOptions {
        pseudocount: Some(1.0),
        ..plain
    };
    let grouped = run(&matrix, &leaves, &groups, &shifted).unwrap();
    // otu1 in column order s2, s4, s1, s3: log10 of 3, 1, 2, 4
    assert_row(
        grouped.matrix().row(1),
        &[
            Some(3f64.log10()),
            Some(0.0),
            Some(2f64.log10()),
            Some(4f64.log10()),
        ],
    );
    // missing stays missing under log
    assert_eq!(grouped.matrix().get(2, 1), None);
}

fn render_to(fixture: &Fixture, display: Display, name: &str) -> (Scene, PathBuf) {
    let (matrix, tree, groups) = fixture.load(GroupOrder::Sorted);
    let grouped = run(&matrix, &tree.leaf_order().unwrap(), &groups, &scaled(100.0)).unwrap();
    let options = RenderOptions {
        display,
        ..RenderOptions::default()
    };
    let scene = build_scene(&grouped, &tree.layout(), &options).unwrap();
    let out = fixture.path(name);
    write_scene(&scene, &out).unwrap();
    (scene, out)
}

#[test]
fn test_bubble_chart_png() {
    let fixture = Fixture::new(TABLE);
    let (scene, out) = render_to(&fixture, Display::Bubblechart, "site_bubblePlot.png");
    let img = image::open(&out).unwrap();
    assert_eq!((img.width(), img.height()), (scene.width, scene.height));
}

#[test]
fn test_heatmap_svg_and_matrix_export() {
    let fixture = Fixture::new(TABLE);
    let (_, out) = render_to(&fixture, Display::Heatmap, "site_heatPlot.svg");
    let svg = fs::read_to_string(&out).unwrap();
    assert!(svg.starts_with("<?xml"));
    for label in ["otu1", "otu5", "s4", "gut", "skin"] {
        assert!(svg.contains(&format!(">{}</text>", label)), "missing label {label}");
    }

    let (matrix, tree, groups) = fixture.load(GroupOrder::Sorted);
    let grouped = run(&matrix, &tree.leaf_order().unwrap(), &groups, &scaled(1.0)).unwrap();
    let exported = fixture.path("matrix.tsv");
    grouped.matrix().write_tsv(&exported).unwrap();
    let reread = read_abundance_table(&exported, "feature_id").unwrap();
    assert_eq!(&reread, grouped.matrix());
}

#[test]
fn test_missing_inputs_and_columns() {
    let fixture = Fixture::new(TABLE);
    assert!(matches!(
        read_abundance_table(fixture.path("nope.txt"), DEFAULT_FEATURE_COLUMN),
        Err(BubbleError::MissingInputFile(_))
    ));
    assert!(matches!(
        Phylogeny::from_file(Path::new("/nonexistent/tree.nwk")),
        Err(BubbleError::MissingInputFile(_))
    ));
    assert!(matches!(
        read_sample_groups(
            fixture.path("mapping.txt"),
            DEFAULT_SAMPLE_COLUMN,
            "body_site",
            GroupOrder::Sorted
        ),
        Err(BubbleError::SchemaMismatch { ref column, .. }) if column == "body_site"
    ));
}

#[test]
fn test_bubble_chart_pdf() {
    let fixture = Fixture::new(TABLE);
    let (_, out) = render_to(&fixture, Display::Bubblechart, "site_bubblePlot.pdf");
    let bytes = fs::read(&out).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[test]
fn test_relative_abundance_log_bubbles() {
    let table = "#OTU ID\ts1\ts2\ts3\ts4\n\
                 otu1\t0.01\t0.2\t0.5\t0.02\n\
                 otu2\t0.05\t0.3\t0.9\t0.1\n\
                 otu4\t0.4\t0.02\t0.03\t0.6\n";
    let fixture = Fixture::new(table);
    let (matrix, tree, groups) = fixture.load(GroupOrder::Sorted);
    let options = PipelineOptions {
        normalization: Normalization::Log,
        ..PipelineOptions::default()
    };
    let grouped = run(&matrix, &tree.leaf_order().unwrap(), &groups, &options).unwrap();
    let scene = build_scene(&grouped, &tree.layout(), &RenderOptions::default()).unwrap();
    let bubbles = scene
        .shapes
        .iter()
        .filter(|s| matches!(s, bubbletree::render::Shape::Circle { .. }))
        .count();
    // every present cell of the three table rows gets a bubble, otu5 stays blank
    assert_eq!(bubbles, 12);
}
