use indicatif::{ProgressBar, ProgressStyle};
use std::fs;

use taxdiv_rs::{
    load_analysis, AlphaMetric, BargraphOptions, BetaMetric, Field, Normalize, RankRequest,
    Setting,
};

fn spinner(color: &str, msg: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template(&format!("{{spinner:.{color}}} {{msg}}"))
            .expect("Invalid spinner template"),
    );
    bar.set_message(msg.to_string());
    bar
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: taxdiv-rs <taxonomy.tsv[.gz]> <counts.tsv[.gz]> [rank]");
        std::process::exit(1);
    }
    let rank = if args.len() > 3 {
        RankRequest::parse(&args[3]).expect("Invalid rank")
    } else {
        RankRequest::Auto
    };

    // 1. Load taxonomy and counts
    let bar = spinner("blue", "Loading taxonomy and counts...");
    let analysis =
        load_analysis(&args[1], &args[2], Field::Readcount).expect("Could not load analysis");
    bar.finish_with_message("Loaded taxonomy and counts.");

    // 2. Diversity measures
    let bar = spinner("green", "Computing diversity measures...");

    let shannon = analysis
        .alpha_diversity(AlphaMetric::Shannon, rank)
        .expect("Alpha diversity failed");

    let braycurtis = analysis
        .beta_diversity(BetaMetric::BrayCurtis, rank)
        .expect("Beta diversity failed");

    let unifrac = analysis
        .unifrac(true, rank)
        .expect("UniFrac failed");

    bar.finish_with_message("Diversity measures computed.");

    // 3. Bargraph long table
    let bar = spinner("yellow", "Shaping bargraph table...");
    let graph = analysis
        .bargraph()
        .build(&BargraphOptions {
            rank: Some(rank),
            normalize: Normalize::Yes,
            top_n: Setting::Value(10),
            ..Default::default()
        })
        .expect("Bargraph shaping failed");
    bar.finish_with_message("Bargraph table shaped.");

    // 4. Write outputs
    let bar = spinner("cyan", "Writing output files...");

    fs::write("alpha_shannon.tsv", shannon.to_tsv())
        .expect("Could not write alpha_shannon.tsv");

    fs::write("beta_braycurtis.tsv", braycurtis.to_tsv())
        .expect("Could not write beta_braycurtis.tsv");

    fs::write("weighted_unifrac.tsv", unifrac.to_tsv())
        .expect("Could not write weighted_unifrac.tsv");

    fs::write("bargraph.tsv", graph.to_tsv())
        .expect("Could not write bargraph.tsv");

    bar.finish_with_message("Output files created.");
}
