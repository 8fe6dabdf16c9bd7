//! Driver for the demo project under `demos/hello`: five C translation
//! units plus `main.c` compiled into objects, then linked. Run with `-j`
//! to build the objects concurrently, `-B` to force a full rebuild,
//! `--clean` to remove the artifacts.

use clap::Parser;
use env_logger::Env;
use log::{error, info};
use mason::{build, Cli, Graph, Scheduler, Source};

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let opts = Cli::parse();

    if let Err(err) = run(&opts) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(opts: &Cli) -> anyhow::Result<()> {
    let mut graph = Graph::new();
    let units = ["part1", "part2", "part3", "part4", "part5", "main"];
    let objects: Vec<_> = units
        .iter()
        .map(|unit| {
            graph.target(
                format!("demos/hello/{unit}.o"),
                ["cc", "-Wall", "-Werror", "-c"],
                [
                    Source::header("demos/hello/parts.h"),
                    Source::file(format!("demos/hello/{unit}.c")),
                ],
            )
        })
        .collect();
    let hello = graph.target(
        "demos/hello/hello",
        ["cc"],
        objects.into_iter().map(Source::target),
    );

    if opts.clean {
        graph.clean(hello)?;
        return Ok(());
    }

    if opts.jobs > 1 {
        Scheduler::new(opts.jobs)
            .always_rebuild(opts.always_build)
            .build(&mut graph, hello)?;
    } else if !build(&mut graph, hello, opts.always_build)? {
        info!("No need to rebuild `{}`", graph[hello].artifact().display());
    }
    Ok(())
}
