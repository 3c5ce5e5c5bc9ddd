//! Analyse two small loops with both value domains.
//!
//! ```text
//! count:      i := 0;  while i <u LIMIT { i := i + STEP }
//! countdown:  i := 20; while 0 <s i     { i := i - 3 }
//! ```

use clap::Parser;
use wrapint_rs::analysis::Analysis;
use wrapint_rs::config::Options;
use wrapint_rs::congruence::CcInterval;
use wrapint_rs::domain::ValueDomain;
use wrapint_rs::expr::{Edge, Expr, Location, Stmt, Var};
use wrapint_rs::interval::Interval;

#[derive(Debug, Parser)]
#[command(author, version, about = "Wrapped interval analysis of counting loops")]
struct Cli {
    /// Loop bound of the counting loop.
    #[arg(long, value_name = "INT", default_value = "100")]
    limit: u64,

    /// Increment of the counting loop.
    #[arg(long, value_name = "INT", default_value = "4")]
    step: u64,

    /// Bit width of the loop counter.
    #[arg(long, value_name = "INT", default_value = "8")]
    width: u32,

    /// Refinements after which merge starts widening.
    #[clap(long, value_name = "INT", default_value = "5")]
    widen_threshold: usize,

    /// Capacity of the operator cache (0 disables it).
    #[clap(long, value_name = "INT", default_value = "4096")]
    cache: usize,

    /// Report unsupported constructs as errors.
    #[clap(long)]
    fail_fast: bool,

    /// Log every transfer function.
    #[clap(long)]
    debug: bool,
}

fn count(i: &Var, step: u64, limit: u64) -> Vec<Edge> {
    let w = i.width();
    let v = || Expr::var(i);
    vec![
        Edge::new(0, Stmt::Assign(i.clone(), Expr::num(0, w)), 1),
        Edge::new(1, Stmt::Assume(v().ult(Expr::num(limit, w))), 2),
        Edge::new(1, Stmt::Assume(v().ult(Expr::num(limit, w)).not()), 3),
        Edge::new(2, Stmt::Assign(i.clone(), v().add(Expr::num(step, w))), 1),
    ]
}

fn countdown(i: &Var) -> Vec<Edge> {
    let w = i.width();
    let v = || Expr::var(i);
    vec![
        Edge::new(0, Stmt::Assign(i.clone(), Expr::num(20, w)), 1),
        Edge::new(1, Stmt::Assume(Expr::num(0, w).slt(v())), 2),
        Edge::new(1, Stmt::Assume(Expr::num(0, w).slt(v()).not()), 3),
        Edge::new(2, Stmt::Assign(i.clone(), v().sub(Expr::num(3, w))), 1),
    ]
}

fn analyse<D: ValueDomain>(options: &Options, name: &str, edges: &[Edge], i: &Var) -> color_eyre::Result<()> {
    let time = std::time::Instant::now();
    let analysis = Analysis::<D>::new(options.clone());
    let reached = analysis.run(edges, Location(0))?;
    println!(
        "{} / {}: {} iterations in {:.3} s",
        name,
        D::NAME,
        reached.iterations(),
        time.elapsed().as_secs_f64()
    );
    if !reached.converged() {
        println!("  stopped before reaching a fixpoint");
    }
    for (location, state) in reached.iter() {
        println!("  {}: {} = {}", location, i, state.var(i));
    }
    let cache = analysis.cache().borrow();
    println!("  cache: {} hits, {} misses", cache.hits(), cache.misses());
    Ok(())
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        if args.debug {
            simplelog::LevelFilter::Debug
        } else {
            simplelog::LevelFilter::Info
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    println!("args = {:?}", args);

    let options = Options::new()
        .with_widen_threshold(args.widen_threshold)
        .with_cache_capacity(args.cache)
        .with_fail_fast(args.fail_fast);

    let i = Var::new("i", args.width);
    let programs = [("count", count(&i, args.step, args.limit)), ("countdown", countdown(&i))];
    for (name, edges) in &programs {
        for edge in edges {
            println!("  {}", edge);
        }
        analyse::<Interval>(&options, name, edges, &i)?;
        analyse::<CcInterval>(&options, name, edges, &i)?;
    }

    Ok(())
}
